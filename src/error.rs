use serde::Serialize;

/// Failures raised by the printer collaborator (HTTP client or live feed).
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "code", content = "detail")]
pub enum ApiError {
    #[error("Connection failed: {message}")]
    Connection { message: String },
    #[error("Authentication rejected: {message}")]
    Auth { message: String },
    #[error("Request timed out: {message}")]
    Timeout { message: String },
    #[error("Moonraker error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Remote { status: Option<u16>, message: String },
    #[error("Protocol error: {message}")]
    Protocol { message: String },
    #[error("Live feed disconnected")]
    Disconnected,
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl ApiError {
    pub fn protocol(message: impl Into<String>) -> Self {
        ApiError::Protocol {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        let message = e.to_string();
        if e.is_timeout() {
            return ApiError::Timeout { message };
        }
        if e.is_connect() {
            return ApiError::Connection { message };
        }
        if let Some(status) = e.status() {
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return ApiError::Auth { message };
            }
            return ApiError::Remote {
                status: Some(status.as_u16()),
                message,
            };
        }
        if e.is_decode() {
            return ApiError::Protocol { message };
        }
        ApiError::Connection { message }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::Io {
            message: e.to_string(),
        }
    }
}

/// Failure of a single leaf command handler.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "code", content = "detail")]
pub enum HandlerError {
    #[error(transparent)]
    Api(#[from] ApiError),
    /// A value passed schema coercion but fails a domain check (e.g. AMOUNT=0).
    #[error("Invalid value for {param}: {reason}")]
    Invalid {
        param: String,
        value: String,
        reason: String,
    },
    #[error("{message}")]
    Failed { message: String },
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed {
            message: message.into(),
        }
    }

    pub fn invalid(param: &str, value: impl ToString, reason: impl Into<String>) -> Self {
        HandlerError::Invalid {
            param: param.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(e: std::io::Error) -> Self {
        HandlerError::Io {
            message: e.to_string(),
        }
    }
}

/// Everything that can surface at the dispatcher boundary. Only
/// `DuplicateCommand` and `Config` are allowed to abort the process, and only
/// during startup.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "code", content = "detail")]
pub enum ShellError {
    #[error("Parse error: {message}")]
    Parse { message: String },
    #[error("Unknown command: {name}{}", did_you_mean(.suggestions))]
    NotFound {
        name: String,
        suggestions: Vec<String>,
    },
    #[error("Command already registered: {name}")]
    DuplicateCommand { name: String },
    #[error("{command}: unknown parameter {param}")]
    UnknownParameter { command: String, param: String },
    #[error("{command}: missing required parameter {param}")]
    MissingParameter { command: String, param: String },
    #[error("{command}: invalid value for {param} ({value:?}): {reason}")]
    InvalidValue {
        command: String,
        param: String,
        value: String,
        reason: String,
    },
    #[error("{command} failed: {cause}")]
    HandlerFailure {
        command: String,
        #[source]
        cause: HandlerError,
    },
    #[error("Console stream failed: {cause}")]
    ConsumerFailed {
        #[source]
        cause: ApiError,
    },
    #[error("Console mode is already active")]
    ConsoleBusy,
    #[error("Configuration error: {message}")]
    Config { message: String },
    #[error("Terminal error: {message}")]
    Terminal { message: String },
}

fn did_you_mean(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(". Did you mean: {}?", suggestions.join(", "))
    }
}

impl ShellError {
    pub fn parse(message: impl Into<String>) -> Self {
        ShellError::Parse {
            message: message.into(),
        }
    }

    pub fn terminal(e: impl std::fmt::Display) -> Self {
        ShellError::Terminal {
            message: e.to_string(),
        }
    }

    /// Map a handler failure into the dispatcher taxonomy. Domain validation
    /// failures become `InvalidValue`, everything else is wrapped.
    pub fn from_handler(command: &str, cause: HandlerError) -> Self {
        match cause {
            HandlerError::Invalid {
                param,
                value,
                reason,
            } => ShellError::InvalidValue {
                command: command.to_string(),
                param,
                value,
                reason,
            },
            cause => ShellError::HandlerFailure {
                command: command.to_string(),
                cause,
            },
        }
    }
}
