use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaApiErrorKind {
    TokenExpired,
    PermissionDenied,
    RateLimited,
    InvalidRequest,
    Other,
}

/// A failed Graph API call, decoded far enough to tell the user what to do about it.
#[derive(Debug, Clone)]
pub struct MetaApiError {
    pub kind: MetaApiErrorKind,
    pub status: u16,
    pub code: Option<i64>,
    pub subcode: Option<i64>,
    pub message: String,
    pub fbtrace_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphErrorBody,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    error_subcode: Option<i64>,
    #[serde(default)]
    fbtrace_id: Option<String>,
}

impl MetaApiError {
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<GraphErrorEnvelope>(body) {
            Ok(env) => Self {
                kind: classify(env.error.code),
                status,
                code: env.error.code,
                subcode: env.error.error_subcode,
                message: env.error.message,
                fbtrace_id: env.error.fbtrace_id,
            },
            Err(_) => Self {
                kind: if status == 401 {
                    MetaApiErrorKind::TokenExpired
                } else {
                    MetaApiErrorKind::Other
                },
                status,
                code: None,
                subcode: None,
                message: body.chars().take(300).collect(),
                fbtrace_id: None,
            },
        }
    }

    pub fn remediation(&self) -> &'static str {
        match self.kind {
            MetaApiErrorKind::TokenExpired => {
                "The access token is invalid or expired: regenerate it (Graph API Explorer or \
                 a System User token) and update META_ACCESS_TOKEN."
            }
            MetaApiErrorKind::PermissionDenied => {
                "The token lacks access to this ad account: grant the ads_read permission and \
                 check META_AD_ACCOUNT_ID."
            }
            MetaApiErrorKind::RateLimited => {
                "The Graph API rate limit was hit: wait a few minutes, then refresh."
            }
            MetaApiErrorKind::InvalidRequest => {
                "The request was rejected: check META_AD_ACCOUNT_ID and META_API_VERSION."
            }
            MetaApiErrorKind::Other => {
                "The ads API call failed: check connectivity and the Meta status page, then refresh."
            }
        }
    }
}

fn classify(code: Option<i64>) -> MetaApiErrorKind {
    match code {
        Some(190) | Some(102) => MetaApiErrorKind::TokenExpired,
        Some(10) | Some(200..=299) => MetaApiErrorKind::PermissionDenied,
        Some(4) | Some(17) | Some(32) | Some(613) | Some(80004) => MetaApiErrorKind::RateLimited,
        Some(100) => MetaApiErrorKind::InvalidRequest,
        _ => MetaApiErrorKind::Other,
    }
}

impl fmt::Display for MetaApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Meta API error (status={}, code={:?}, subcode={:?}): {}",
            self.status, self.code, self.subcode, self.message
        )
    }
}

impl std::error::Error for MetaApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_token_is_recognized() {
        let body = r#"{"error":{"message":"Error validating access token: Session has expired","type":"OAuthException","code":190,"error_subcode":463,"fbtrace_id":"AbC"}}"#;
        let err = MetaApiError::from_response(400, body);
        assert_eq!(err.kind, MetaApiErrorKind::TokenExpired);
        assert_eq!(err.subcode, Some(463));
        assert_eq!(err.fbtrace_id.as_deref(), Some("AbC"));
        assert!(err.remediation().contains("META_ACCESS_TOKEN"));
        assert!(err.to_string().contains("Session has expired"));
    }

    #[test]
    fn classifies_permission_and_rate_limit_codes() {
        let perm = MetaApiError::from_response(403, r#"{"error":{"message":"x","code":272}}"#);
        assert_eq!(perm.kind, MetaApiErrorKind::PermissionDenied);
        let rl = MetaApiError::from_response(400, r#"{"error":{"message":"x","code":17}}"#);
        assert_eq!(rl.kind, MetaApiErrorKind::RateLimited);
    }

    #[test]
    fn non_json_bodies_fall_back_on_status() {
        let err = MetaApiError::from_response(401, "<html>nope</html>");
        assert_eq!(err.kind, MetaApiErrorKind::TokenExpired);
        let err = MetaApiError::from_response(502, "bad gateway");
        assert_eq!(err.kind, MetaApiErrorKind::Other);
        assert_eq!(err.message, "bad gateway");
    }
}
