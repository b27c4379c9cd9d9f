use std::fmt;
use std::time::Duration;

const FORBIDDEN_MESSAGE: &str = "You do not have permission to perform this action.";
const RATE_LIMITED_MESSAGE: &str = "Too many requests. Please wait a moment and try again.";
const VALIDATION_FALLBACK: &str = "Validation failed";
const REQUEST_FALLBACK: &str = "Request failed";

#[derive(Debug)]
pub enum AdminError {
    Network(reqwest::Error),
    Json(serde_json::Error),
    Io(std::io::Error),
    Config(String),
    Api(ApiError),
}

impl fmt::Display for AdminError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminError::Network(e) => write!(f, "Network error: {}", e),
            AdminError::Json(e) => write!(f, "JSON parsing error: {}", e),
            AdminError::Io(e) => write!(f, "IO error: {}", e),
            AdminError::Config(e) => write!(f, "Configuration error: {}", e),
            AdminError::Api(e) => write!(f, "API error: {}", e),
        }
    }
}

impl std::error::Error for AdminError {}

impl From<reqwest::Error> for AdminError {
    fn from(err: reqwest::Error) -> Self {
        AdminError::Network(err)
    }
}

impl From<serde_json::Error> for AdminError {
    fn from(err: serde_json::Error) -> Self {
        AdminError::Json(err)
    }
}

impl From<std::io::Error> for AdminError {
    fn from(err: std::io::Error) -> Self {
        AdminError::Io(err)
    }
}

impl From<ApiError> for AdminError {
    fn from(err: ApiError) -> Self {
        AdminError::Api(err)
    }
}

/// A failed API call, classified by the transport from the HTTP status and
/// error body before it reaches a controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// 401. The transport has already dropped the session token.
    Unauthorized { message: Option<String> },
    /// 403.
    Forbidden { message: Option<String> },
    /// 422 with a field -> messages map, in the order the server sent it.
    Validation {
        errors: Vec<(String, Vec<String>)>,
        message: Option<String>,
    },
    /// 429, with the `Retry-After` hint when the server gave one.
    RateLimited { retry_after: Option<Duration> },
    /// 5xx.
    Server { status: u16, message: Option<String> },
    /// Any other non-2xx status.
    Http { status: u16, message: Option<String> },
    /// No HTTP response at all (connect, timeout, undecodable body).
    Transport(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Forbidden { .. } => Some(403),
            ApiError::Validation { .. } => Some(422),
            ApiError::RateLimited { .. } => Some(429),
            ApiError::Server { status, .. } | ApiError::Http { status, .. } => Some(*status),
            ApiError::Transport(_) => None,
        }
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, ApiError::Forbidden { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. })
    }

    /// Message shown to the admin user in the error banner.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Validation { errors, message } => errors
                .first()
                .and_then(|(_, messages)| messages.first())
                .or(message.as_ref())
                .cloned()
                .unwrap_or_else(|| VALIDATION_FALLBACK.to_string()),
            ApiError::Forbidden { .. } => FORBIDDEN_MESSAGE.to_string(),
            ApiError::RateLimited { .. } => RATE_LIMITED_MESSAGE.to_string(),
            ApiError::Unauthorized { message }
            | ApiError::Server { message, .. }
            | ApiError::Http { message, .. } => format!(
                "Error {}: {}",
                self.status().unwrap_or_default(),
                message.as_deref().unwrap_or(REQUEST_FALLBACK)
            ),
            ApiError::Transport(message) => message.clone(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(format!("Network error: {}", err))
    }
}
