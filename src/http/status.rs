//! Status classification.
//!
//! # Responsibilities
//! - Map a status code to Success / ClientError / ServerError
//! - Apply ordered status rules that turn selected codes into named failures
//!
//! # Design Decisions
//! - Anything that is neither 2xx nor 4xx is a server error, never a success
//! - Rules are data (serde), first match wins

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::http::outcome::{Outcome, OutcomeTag};
use crate::http::response::Response;

/// Classify a bare status code.
pub fn classify(status: StatusCode) -> OutcomeTag {
    if status.is_success() {
        OutcomeTag::Success
    } else if status.is_client_error() {
        OutcomeTag::ClientError
    } else {
        // 5xx, but also 1xx/3xx reaching us as final and non-standard codes.
        OutcomeTag::ServerError
    }
}

/// Which statuses a [`StatusRule`] applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusMatch {
    ClientError,
    ServerError,
    Status(u16),
    /// Inclusive range.
    Range { from: u16, to: u16 },
}

impl StatusMatch {
    pub fn matches(&self, status: StatusCode) -> bool {
        match self {
            StatusMatch::ClientError => classify(status) == OutcomeTag::ClientError,
            StatusMatch::ServerError => classify(status) == OutcomeTag::ServerError,
            StatusMatch::Status(code) => status.as_u16() == *code,
            StatusMatch::Range { from, to } => (*from..=*to).contains(&status.as_u16()),
        }
    }
}

/// Converts matching responses into `Outcome::Flagged` with `label`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRule {
    pub when: StatusMatch,
    pub label: String,
}

impl StatusRule {
    pub fn new(when: StatusMatch, label: impl Into<String>) -> Self {
        Self {
            when,
            label: label.into(),
        }
    }
}

/// Ordered status rules plus the base classification.
#[derive(Debug, Clone, Default)]
pub struct StatusClassifier {
    rules: Vec<StatusRule>,
}

impl StatusClassifier {
    pub fn new(rules: Vec<StatusRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[StatusRule] {
        &self.rules
    }

    /// Turn a complete response into the attempt's outcome.
    ///
    /// Rules never apply to 2xx responses.
    pub fn classify(&self, response: Response) -> Outcome {
        let tag = classify(response.status);
        if tag == OutcomeTag::Success {
            return Outcome::Success(response);
        }

        if let Some(rule) = self.rules.iter().find(|r| r.when.matches(response.status)) {
            return Outcome::Flagged {
                label: rule.label.clone(),
                response,
            };
        }

        match tag {
            OutcomeTag::ClientError => Outcome::ClientError(response),
            _ => Outcome::ServerError(response),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::HeaderMap;

    fn response(code: u16) -> Response {
        Response::new(StatusCode::from_u16(code).unwrap(), HeaderMap::new(), Bytes::new())
    }

    #[test]
    fn test_classify_ranges() {
        assert_eq!(classify(StatusCode::OK), OutcomeTag::Success);
        assert_eq!(classify(StatusCode::NO_CONTENT), OutcomeTag::Success);
        assert_eq!(classify(StatusCode::BAD_REQUEST), OutcomeTag::ClientError);
        assert_eq!(classify(StatusCode::NOT_FOUND), OutcomeTag::ClientError);
        assert_eq!(classify(StatusCode::INTERNAL_SERVER_ERROR), OutcomeTag::ServerError);
        assert_eq!(classify(StatusCode::SERVICE_UNAVAILABLE), OutcomeTag::ServerError);
    }

    #[test]
    fn test_unknown_codes_are_server_errors() {
        assert_eq!(classify(StatusCode::MOVED_PERMANENTLY), OutcomeTag::ServerError);
        assert_eq!(classify(StatusCode::from_u16(199).unwrap()), OutcomeTag::ServerError);
        assert_eq!(classify(StatusCode::from_u16(799).unwrap()), OutcomeTag::ServerError);
    }

    #[test]
    fn test_rules_flag_in_order() {
        let classifier = StatusClassifier::new(vec![
            StatusRule::new(StatusMatch::Status(404), "missing"),
            StatusRule::new(StatusMatch::ClientError, "client"),
            StatusRule::new(StatusMatch::Range { from: 500, to: 503 }, "server"),
        ]);

        match classifier.classify(response(404)) {
            Outcome::Flagged { label, .. } => assert_eq!(label, "missing"),
            other => panic!("unexpected: {other:?}"),
        }
        match classifier.classify(response(400)) {
            Outcome::Flagged { label, .. } => assert_eq!(label, "client"),
            other => panic!("unexpected: {other:?}"),
        }
        match classifier.classify(response(502)) {
            Outcome::Flagged { label, .. } => assert_eq!(label, "server"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(classifier.classify(response(504)), Outcome::ServerError(_)));
        assert!(matches!(classifier.classify(response(200)), Outcome::Success(_)));
    }
}
