//! Request descriptors.
//!
//! # Responsibilities
//! - Parse and validate the target URI (absolute, http or https)
//! - Derive the pool key (scheme, host, port) for the target
//! - Carry the retry-safety flag, defaulting to the method's idempotency
//! - Render an HTTP/1.1 origin-form request for each attempt
//!
//! # Design Decisions
//! - Descriptors are immutable once built and borrowed by the facade
//! - Build errors are deferred to `build()` so the builder chains cleanly
//! - The body is `Bytes` so every attempt can resend it without copying

use std::fmt;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, HOST};
use http::{HeaderMap, Method, Request};
use http_body_util::Full;
use url::{Host, Url};

use crate::error::{ClientResult, Failure};

/// Header carrying the per-call correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Transport scheme of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => write!(f, "http"),
            Scheme::Https => write!(f, "https"),
        }
    }
}

/// The authority a connection is opened to. This is the pool key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub scheme: Scheme,
    /// Host name or IP literal, without IPv6 brackets.
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    fn from_url(url: &Url) -> ClientResult<Self> {
        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => {
                return Err(Failure::InvalidRequest(format!(
                    "unsupported scheme `{other}`"
                )))
            }
        };
        let host = match url.host() {
            Some(Host::Domain(d)) => d.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(Failure::InvalidRequest("target has no host".into())),
        };
        let port = url.port().unwrap_or_else(|| scheme.default_port());
        Ok(Self::new(scheme, host, port))
    }

    /// Value for the `Host` header: the port is omitted when it is the scheme default.
    pub fn host_header(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == self.scheme.default_port() {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", self.scheme, self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
        }
    }
}

/// An immutable description of one logical request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    url: Url,
    endpoint: Endpoint,
    headers: HeaderMap,
    body: Option<Bytes>,
    retry_safe: bool,
}

impl RequestDescriptor {
    /// Start building a request for `target`.
    pub fn builder(method: Method, target: &str) -> RequestBuilder {
        RequestBuilder::new(method, target)
    }

    /// Shorthand for a body-less GET.
    pub fn get(target: &str) -> ClientResult<Self> {
        Self::builder(Method::GET, target).build()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Whether the policy may send this request more than once.
    pub fn is_retry_safe(&self) -> bool {
        self.retry_safe
    }

    /// Render the request for one attempt, adding the call id unless the caller set one.
    pub(crate) fn to_http(&self, call_id: &str) -> ClientResult<Request<Full<Bytes>>> {
        let mut target = self.url.path().to_string();
        if let Some(query) = self.url.query() {
            target.push('?');
            target.push_str(query);
        }

        let mut builder = Request::builder()
            .method(self.method.clone())
            .uri(target);

        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers.clone());
            if !headers.contains_key(HOST) {
                let host = HeaderValue::from_str(&self.endpoint.host_header())
                    .map_err(|e| Failure::InvalidRequest(e.to_string()))?;
                headers.insert(HOST, host);
            }
            if !headers.contains_key(X_REQUEST_ID) {
                if let Ok(id) = HeaderValue::from_str(call_id) {
                    headers.insert(X_REQUEST_ID, id);
                }
            }
        }

        builder
            .body(Full::new(self.body.clone().unwrap_or_default()))
            .map_err(|e| Failure::InvalidRequest(e.to_string()))
    }
}

/// Builder for [`RequestDescriptor`].
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    url: ClientResult<Url>,
    headers: HeaderMap,
    body: Option<Bytes>,
    retry_safe: Option<bool>,
    error: Option<Failure>,
}

impl RequestBuilder {
    fn new(method: Method, target: &str) -> Self {
        let url = Url::parse(target)
            .map_err(|e| Failure::InvalidRequest(format!("invalid target `{target}`: {e}")));
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            retry_safe: None,
            error: None,
        }
    }

    /// Append a header. Invalid names or values surface from `build()`.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        let parsed = HeaderName::try_from(name)
            .map_err(|e| e.to_string())
            .and_then(|n| HeaderValue::try_from(value).map(|v| (n, v)).map_err(|e| e.to_string()));
        match parsed {
            Ok((n, v)) => {
                self.headers.append(n, v);
            }
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(Failure::InvalidRequest(format!("header `{name}`: {e}")));
                }
            }
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Override the retry-safety flag (defaults to the method's idempotency).
    pub fn retry_safe(mut self, retry_safe: bool) -> Self {
        self.retry_safe = Some(retry_safe);
        self
    }

    pub fn build(self) -> ClientResult<RequestDescriptor> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let url = self.url?;
        let endpoint = Endpoint::from_url(&url)?;
        let retry_safe = self.retry_safe.unwrap_or_else(|| self.method.is_idempotent());
        Ok(RequestDescriptor {
            method: self.method,
            url,
            endpoint,
            headers: self.headers,
            body: self.body,
            retry_safe,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_default_ports() {
        let req = RequestDescriptor::get("http://example.com/a?b=1").unwrap();
        assert_eq!(req.endpoint(), &Endpoint::new(Scheme::Http, "example.com", 80));
        assert_eq!(req.endpoint().host_header(), "example.com");

        let req = RequestDescriptor::get("https://example.com:8443/").unwrap();
        assert_eq!(req.endpoint().port, 8443);
        assert_eq!(req.endpoint().host_header(), "example.com:8443");
    }

    #[test]
    fn test_ipv6_host() {
        let req = RequestDescriptor::get("http://[::1]:9000/").unwrap();
        assert_eq!(req.endpoint().host, "::1");
        assert_eq!(req.endpoint().host_header(), "[::1]:9000");
        assert_eq!(req.endpoint().to_string(), "http://[::1]:9000");
    }

    #[test]
    fn test_rejects_bad_targets() {
        assert!(matches!(
            RequestDescriptor::get("ftp://example.com/"),
            Err(Failure::InvalidRequest(_))
        ));
        assert!(matches!(
            RequestDescriptor::get("/relative"),
            Err(Failure::InvalidRequest(_))
        ));
        let bad_header = RequestDescriptor::builder(Method::GET, "http://example.com")
            .header("bad header", "v")
            .build();
        assert!(matches!(bad_header, Err(Failure::InvalidRequest(_))));
    }

    #[test]
    fn test_retry_safe_defaults_to_idempotency() {
        assert!(RequestDescriptor::get("http://a.test/").unwrap().is_retry_safe());

        let post = RequestDescriptor::builder(Method::POST, "http://a.test/")
            .body("x")
            .build()
            .unwrap();
        assert!(!post.is_retry_safe());

        let forced = RequestDescriptor::builder(Method::POST, "http://a.test/")
            .retry_safe(true)
            .build()
            .unwrap();
        assert!(forced.is_retry_safe());
    }

    #[test]
    fn test_to_http_sets_host_and_request_id() {
        let req = RequestDescriptor::builder(Method::GET, "http://a.test:8080/p?q=1")
            .header("accept", "text/plain")
            .build()
            .unwrap();
        let http_req = req.to_http("call-1").unwrap();
        assert_eq!(http_req.uri(), "/p?q=1");
        assert_eq!(http_req.headers()[HOST], "a.test:8080");
        assert_eq!(http_req.headers()[X_REQUEST_ID], "call-1");
        assert_eq!(http_req.headers()["accept"], "text/plain");

        let with_id = RequestDescriptor::builder(Method::GET, "http://a.test/")
            .header(X_REQUEST_ID, "mine")
            .build()
            .unwrap();
        assert_eq!(with_id.to_http("call-2").unwrap().headers()[X_REQUEST_ID], "mine");
    }
}
