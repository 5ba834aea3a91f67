use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use stage_commerce_engine::{CartApiError, IdentityApiError, OrderFlowApiError, SessionApiError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("The account has not been verified yet")]
    NotVerified,
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("{0}")]
    PolicyViolation(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::NotVerified => StatusCode::FORBIDDEN,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::PolicyViolation(_) => StatusCode::CONFLICT,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<IdentityApiError> for ServerError {
    fn from(e: IdentityApiError) -> Self {
        match e {
            IdentityApiError::DatabaseError(e) => Self::BackendError(format!("Database error: {e}")),
            IdentityApiError::PasswordHashError(e) => Self::BackendError(format!("Password hashing error: {e}")),
            IdentityApiError::EmailTaken(_) | IdentityApiError::BadEmail(_) => {
                Self::InvalidRequestBody(e.to_string())
            },
            IdentityApiError::InvalidCredentials => Self::InvalidCredentials,
            IdentityApiError::NotVerified => Self::NotVerified,
            IdentityApiError::AccountNotFound => Self::NoRecordFound("Account not found".to_string()),
            IdentityApiError::CodeMismatch | IdentityApiError::CodeExpired => {
                Self::InvalidRequestBody(e.to_string())
            },
        }
    }
}

impl From<CartApiError> for ServerError {
    fn from(e: CartApiError) -> Self {
        match e {
            CartApiError::DatabaseError(e) => Self::BackendError(format!("Database error: {e}")),
            CartApiError::LineNotFound(id) => Self::NoRecordFound(format!("Cart line {id} not found")),
            CartApiError::EmptyPatch => Self::InvalidRequestBody(e.to_string()),
        }
    }
}

impl From<OrderFlowApiError> for ServerError {
    fn from(e: OrderFlowApiError) -> Self {
        match e {
            OrderFlowApiError::DatabaseError(e) => Self::BackendError(format!("Database error: {e}")),
            // Existence is never confirmed: a foreign order and a missing one give the same answer.
            OrderFlowApiError::OrderNotFound | OrderFlowApiError::NoResolutionTarget => {
                Self::NoRecordFound(e.to_string())
            },
            OrderFlowApiError::EmptyCart => Self::InvalidRequestBody(e.to_string()),
            OrderFlowApiError::PromoAlreadyRedeemed(_) | OrderFlowApiError::DeliveryNotAllowed(_) => {
                Self::PolicyViolation(e.to_string())
            },
        }
    }
}

impl From<SessionApiError> for ServerError {
    fn from(e: SessionApiError) -> Self {
        match e {
            SessionApiError::DatabaseError(e) => Self::BackendError(format!("Database error: {e}")),
            SessionApiError::SessionNotFound => Self::NoRecordFound(e.to_string()),
            SessionApiError::SessionRevoked => Self::Unauthenticated,
            SessionApiError::CooldownActive(_) | SessionApiError::SelfRevocation => {
                Self::PolicyViolation(e.to_string())
            },
        }
    }
}
