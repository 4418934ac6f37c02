use serde::Serialize;

use crate::domain::order::OrderError;
use crate::store::StoreError;
use crate::utils::IsTransient;

// ============================================================================
// Service Errors and the Response Envelope
// ============================================================================
//
// Every produced operation returns a `ServiceResponse`. Nothing below this
// boundary leaks out: store failures become a bare 500 "Unexpected error"
// after being logged with the operation's span context.
//
// ============================================================================

pub const UNEXPECTED_ERROR: &str = "Unexpected error";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Rejected(#[from] OrderError),

    #[error("Order not found")]
    OrderNotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Order was changed by a concurrent request, please retry")]
    Conflict,

    #[error("Cart changed during checkout, please review it and try again")]
    CartChanged,

    #[error("Store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict => ServiceError::Conflict,
            other => ServiceError::Store(other),
        }
    }
}

impl IsTransient for ServiceError {
    fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Conflict)
    }
}

impl ServiceError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Rejected(e) if e.is_client_fault() => 400,
            ServiceError::Rejected(_) => 500,
            ServiceError::OrderNotFound => 404,
            ServiceError::Forbidden => 403,
            ServiceError::Conflict | ServiceError::CartChanged => 409,
            ServiceError::Store(_) => 500,
        }
    }

    pub fn is_client_fault(&self) -> bool {
        self.status_code() < 500
    }

    /// Text shown to the caller.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::Store(_) => UNEXPECTED_ERROR.to_string(),
            other => other.to_string(),
        }
    }

    /// Log at the level the failure deserves. Span fields carry the context.
    pub fn log(&self, operation: &'static str) {
        match self {
            ServiceError::Store(e) => {
                tracing::error!(operation, error = %e, "Operation failed")
            }
            ServiceError::Rejected(e) if !e.is_client_fault() => {
                tracing::error!(operation, error = %e, "Operation failed, operator attention required")
            }
            other => {
                tracing::warn!(operation, reason = %other, status_code = other.status_code(), "Operation rejected")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceResponse<T> {
    pub status_code: u16,
    pub message: String,
    pub data: Option<T>,
    /// The same request may succeed if sent again
    pub retryable: bool,
}

impl<T> ServiceResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            message: message.into(),
            data: Some(data),
            retryable: false,
        }
    }

    pub fn fail(error: &ServiceError) -> Self {
        Self {
            status_code: error.status_code(),
            message: error.public_message(),
            data: None,
            retryable: error.is_transient(),
        }
    }

    pub fn from_result(
        result: Result<T, ServiceError>,
        operation: &'static str,
        success_message: &str,
    ) -> Self {
        match result {
            Ok(data) => Self::ok(data, success_message),
            Err(error) => {
                error.log(operation);
                Self::fail(&error)
            }
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}
