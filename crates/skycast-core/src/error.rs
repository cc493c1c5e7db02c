//! Domain error taxonomy shared by every Skycast layer.
//!
//! Every fallible operation returns an [`Outcome`], whose failure side is a
//! [`ServiceError`]. Errors are classified once, at the point of detection,
//! and then passed upward unchanged:
//! - the display message is built when the error is constructed and never
//!   rewritten afterwards
//! - the originating transport or internal error stays attached as `source`
//!   so logs keep the full chain, while callers only ever see the message

use std::error::Error as StdError;

use serde_json::Value;
use thiserror::Error;

/// Boxed error kept for diagnostics only.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Success-with-data or failure-with-error.
pub type Outcome<T> = std::result::Result<T, ServiceError>;

const DEFAULT_SERVICE: &str = "External Service";

/// Field-less tag for each [`ServiceError`] variant, used by classification tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Application,
    ExternalApi,
    Network,
    InvalidInput,
    NotFound,
    Validation,
}

impl ErrorKind {
    /// Stable name used in logs and error envelopes.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Application => "ApplicationError",
            ErrorKind::ExternalApi => "ExternalApiError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::InvalidInput => "InvalidInputError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Validation => "ValidationError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of domain errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Generic internal fault.
    #[error("{message}")]
    Application {
        message: String,
        original_http_status: Option<u16>,
        #[source]
        source: Option<BoxError>,
    },

    /// The remote service replied but signaled failure.
    #[error("{message}")]
    ExternalApi {
        message: String,
        service_name: Option<String>,
        status_code: u16,
        response_body: Option<Value>,
        original_http_status: Option<u16>,
    },

    /// Transport-level failure (timeout, refused connection).
    #[error("{message}")]
    Network {
        message: String,
        service_name: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    /// Caller-supplied data failed a precondition.
    #[error("{message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
        reason: Option<String>,
        status_code: u16,
    },

    /// The remote lookup produced no match.
    #[error("{message}")]
    NotFound {
        message: String,
        service_name: Option<String>,
        status_code: u16,
        response_body: Option<Value>,
        original_http_status: Option<u16>,
    },

    /// A constructed domain object failed its own invariants.
    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
        reason: Option<String>,
    },
}

impl ServiceError {
    /// Generic internal fault with no underlying cause.
    pub fn application(message: impl Into<String>) -> Self {
        ServiceError::Application {
            message: message.into(),
            original_http_status: None,
            source: None,
        }
    }

    /// Wrap an untyped fault raised while executing `stage`.
    pub fn unexpected<E>(stage: &str, error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        ServiceError::Application {
            message: format!("Unexpected error during {}: {}", stage, error),
            original_http_status: None,
            source: Some(Box::new(error)),
        }
    }

    /// Remote service failure. `status_code` defaults to 503 when unknown.
    pub fn external_api(
        service_name: Option<&str>,
        status_code: Option<u16>,
        message: impl AsRef<str>,
    ) -> Self {
        let status_code = status_code.unwrap_or(503);
        ServiceError::ExternalApi {
            message: service_message(service_name, status_code, message.as_ref()),
            service_name: service_name.map(str::to_owned),
            status_code,
            response_body: None,
            original_http_status: None,
        }
    }

    /// Transport failure wrapping the originating error.
    pub fn network<E>(service_name: Option<&str>, message: impl AsRef<str>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let mut full = format!(
            "[{}] {}",
            service_name.unwrap_or(DEFAULT_SERVICE),
            message.as_ref()
        );
        let source_message = source.to_string();
        if !source_message.is_empty() {
            full.push_str(": ");
            full.push_str(&source_message);
        }
        ServiceError::Network {
            message: full,
            service_name: service_name.map(str::to_owned),
            source: Some(Box::new(source)),
        }
    }

    /// Precondition failure on caller input (HTTP 400).
    pub fn invalid_input(message: impl AsRef<str>) -> Self {
        ServiceError::InvalidInput {
            message: field_message(message.as_ref(), None, None),
            field: None,
            reason: None,
            status_code: 400,
        }
    }

    /// Precondition failure naming the offending field and why.
    pub fn invalid_field(
        message: impl AsRef<str>,
        field: impl Into<String>,
        reason: Option<&str>,
    ) -> Self {
        let field = field.into();
        ServiceError::InvalidInput {
            message: field_message(message.as_ref(), Some(&field), reason),
            field: Some(field),
            reason: reason.map(str::to_owned),
            status_code: 400,
        }
    }

    /// Remote lookup returned no match (404).
    pub fn not_found(service_name: Option<&str>, message: impl AsRef<str>) -> Self {
        ServiceError::NotFound {
            message: service_message(service_name, 404, message.as_ref()),
            service_name: service_name.map(str::to_owned),
            status_code: 404,
            response_body: None,
            original_http_status: None,
        }
    }

    /// Domain object invariant failure (422).
    pub fn validation(message: impl AsRef<str>) -> Self {
        ServiceError::Validation {
            message: field_message(message.as_ref(), None, None),
            field: None,
            reason: None,
        }
    }

    /// Domain object invariant failure naming the offending field.
    pub fn validation_field(
        message: impl AsRef<str>,
        field: impl Into<String>,
        reason: Option<&str>,
    ) -> Self {
        let field = field.into();
        ServiceError::Validation {
            message: field_message(message.as_ref(), Some(&field), reason),
            field: Some(field),
            reason: reason.map(str::to_owned),
        }
    }

    /// Build the error for a classified HTTP failure.
    ///
    /// `message` is already fully prefixed by the caller; only the per-kind
    /// decoration (service/status bracket, field suffix) is added here.
    pub fn from_classification(
        kind: ErrorKind,
        service_name: Option<&str>,
        status_code: u16,
        message: impl AsRef<str>,
    ) -> Self {
        let message = message.as_ref();
        match kind {
            ErrorKind::Application => ServiceError::application(message),
            ErrorKind::ExternalApi => {
                ServiceError::external_api(service_name, Some(status_code), message)
            }
            ErrorKind::NotFound => ServiceError::NotFound {
                message: service_message(service_name, status_code, message),
                service_name: service_name.map(str::to_owned),
                status_code,
                response_body: None,
                original_http_status: None,
            },
            ErrorKind::InvalidInput => ServiceError::InvalidInput {
                message: field_message(message, None, None),
                field: None,
                reason: None,
                status_code,
            },
            ErrorKind::Validation => ServiceError::validation(message),
            ErrorKind::Network => ServiceError::Network {
                message: format!("[{}] {}", service_name.unwrap_or(DEFAULT_SERVICE), message),
                service_name: service_name.map(str::to_owned),
                source: None,
            },
        }
    }

    /// Attach the raw response body (ExternalApi and NotFound only).
    pub fn with_response_body(mut self, body: Value) -> Self {
        match &mut self {
            ServiceError::ExternalApi { response_body, .. }
            | ServiceError::NotFound { response_body, .. } => *response_body = Some(body),
            _ => {}
        }
        self
    }

    /// Record the transport status that carried this error.
    pub fn with_original_http_status(mut self, status: u16) -> Self {
        match &mut self {
            ServiceError::ExternalApi {
                original_http_status,
                ..
            }
            | ServiceError::NotFound {
                original_http_status,
                ..
            }
            | ServiceError::Application {
                original_http_status,
                ..
            } => *original_http_status = Some(status),
            _ => {}
        }
        self
    }

    /// Override the semantic status of an input error (e.g. 422 for form validation).
    pub fn with_status_code(mut self, status: u16) -> Self {
        if let ServiceError::InvalidInput { status_code, .. } = &mut self {
            *status_code = status;
        }
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Application { .. } => ErrorKind::Application,
            ServiceError::ExternalApi { .. } => ErrorKind::ExternalApi,
            ServiceError::Network { .. } => ErrorKind::Network,
            ServiceError::InvalidInput { .. } => ErrorKind::InvalidInput,
            ServiceError::NotFound { .. } => ErrorKind::NotFound,
            ServiceError::Validation { .. } => ErrorKind::Validation,
        }
    }

    /// The constructed display message.
    pub fn message(&self) -> &str {
        match self {
            ServiceError::Application { message, .. }
            | ServiceError::ExternalApi { message, .. }
            | ServiceError::Network { message, .. }
            | ServiceError::InvalidInput { message, .. }
            | ServiceError::NotFound { message, .. }
            | ServiceError::Validation { message, .. } => message,
        }
    }

    /// Semantic status code carried by the error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Application { .. } => 500,
            ServiceError::ExternalApi { status_code, .. } => *status_code,
            ServiceError::Network { .. } => 503,
            ServiceError::InvalidInput { status_code, .. } => *status_code,
            ServiceError::NotFound { status_code, .. } => *status_code,
            ServiceError::Validation { .. } => 422,
        }
    }

    /// Status the inbound boundary should answer with.
    ///
    /// Upstream failures surface as 503 whatever status the provider used.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::Application { .. } => 500,
            ServiceError::ExternalApi { .. } | ServiceError::Network { .. } => 503,
            ServiceError::InvalidInput { status_code, .. } => *status_code,
            ServiceError::NotFound { .. } => 404,
            ServiceError::Validation { .. } => 422,
        }
    }

    pub fn service_name(&self) -> Option<&str> {
        match self {
            ServiceError::ExternalApi { service_name, .. }
            | ServiceError::Network { service_name, .. }
            | ServiceError::NotFound { service_name, .. } => service_name.as_deref(),
            _ => None,
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            ServiceError::InvalidInput { field, .. } | ServiceError::Validation { field, .. } => {
                field.as_deref()
            }
            _ => None,
        }
    }

    pub fn response_body(&self) -> Option<&Value> {
        match self {
            ServiceError::ExternalApi { response_body, .. }
            | ServiceError::NotFound { response_body, .. } => response_body.as_ref(),
            _ => None,
        }
    }

    pub fn original_http_status(&self) -> Option<u16> {
        match self {
            ServiceError::ExternalApi {
                original_http_status,
                ..
            }
            | ServiceError::NotFound {
                original_http_status,
                ..
            }
            | ServiceError::Application {
                original_http_status,
                ..
            } => *original_http_status,
            _ => None,
        }
    }

    /// Messages of every error in the `source` chain, outermost first.
    pub fn source_chain(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = StdError::source(self);
        while let Some(err) = current {
            chain.push(err.to_string());
            current = err.source();
        }
        chain
    }
}

fn service_message(service_name: Option<&str>, status_code: u16, message: &str) -> String {
    format!(
        "[{}] (Status: {}) {}",
        service_name.unwrap_or(DEFAULT_SERVICE),
        status_code,
        message
    )
}

fn field_message(message: &str, field: Option<&str>, reason: Option<&str>) -> String {
    let mut full = message.to_owned();
    if let Some(field) = field {
        full.push_str(&format!(" (Field: {})", field));
    }
    if let Some(reason) = reason {
        full.push_str(&format!(" - {}", reason));
    }
    full
}
