//! Responses and call results.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

/// A fully received upstream response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Body as UTF-8 text, lossy.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// The value a successful call hands back.
#[derive(Debug, Clone)]
pub enum Reply {
    /// The upstream answered with a success status.
    Upstream(Response),
    /// A failover Suppress rule replaced the failure with this default.
    Fallback(Bytes),
}

impl Reply {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Reply::Fallback(_))
    }

    pub fn body(&self) -> &Bytes {
        match self {
            Reply::Upstream(response) => &response.body,
            Reply::Fallback(body) => body,
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(self.body()).into_owned()
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Reply::Upstream(response) => Some(response.status),
            Reply::Fallback(_) => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            Reply::Upstream(response) => Some(response),
            Reply::Fallback(_) => None,
        }
    }
}
