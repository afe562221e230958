use thiserror::Error;

/// Error code the issuer sends when a refresh token was deleted or never existed.
pub const ERR_INVALID_REFRESH_TOKEN: &str = "ErrInvalidRefreshToken";

/// Error code the issuer sends when the account behind a token is gone.
pub const ERR_INVALID_USER: &str = "ErrInvalidUser";

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Refresh token has been deleted")]
    InvalidRefreshToken,

    #[error("User has been deleted")]
    InvalidUser,

    #[error("Session expired{}", .cause.as_ref().map(|c| format!(": {c}")).unwrap_or_default())]
    SessionExpired {
        #[source]
        cause: Option<Box<AuthError>>,
    },

    #[error("Issuer error: {code}")]
    Issuer { code: String },

    #[error("Status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Token storage error: {0}")]
    Storage(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Body shape the issuer uses for structured failures.
#[derive(Debug, serde::Deserialize)]
struct IssuerErrorBody {
    error: String,
}

impl AuthError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Map a failed response to either a typed issuer error or a plain status error.
    pub fn from_response(status: reqwest::StatusCode, body: &str) -> Self {
        match serde_json::from_str::<IssuerErrorBody>(body) {
            Ok(parsed) => Self::from_code(parsed.error),
            Err(_) => AuthError::Status {
                status,
                body: Self::truncate_body(body),
            },
        }
    }

    fn from_code(code: String) -> Self {
        match code.as_str() {
            ERR_INVALID_REFRESH_TOKEN => AuthError::InvalidRefreshToken,
            ERR_INVALID_USER => AuthError::InvalidUser,
            _ => AuthError::Issuer { code },
        }
    }

    pub(crate) fn session_expired(cause: Option<AuthError>) -> Self {
        AuthError::SessionExpired {
            cause: cause.map(Box::new),
        }
    }

    /// True when the error means the session is gone and the user must log in again.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            AuthError::SessionExpired { .. } | AuthError::InvalidRefreshToken | AuthError::InvalidUser
        )
    }

    /// True for network/timeout failures, including ones that ended a session.
    pub fn is_transport(&self) -> bool {
        match self {
            AuthError::Transport(_) => true,
            AuthError::SessionExpired { cause: Some(cause) } => cause.is_transport(),
            _ => false,
        }
    }

    /// The error that caused a session to expire, if any.
    pub fn cause(&self) -> Option<&AuthError> {
        match self {
            AuthError::SessionExpired { cause } => cause.as_deref(),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Storage(format!("{err:#}"))
    }
}

// ============================================================================
// Tests
// ============================================================================
