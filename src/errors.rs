use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::decimal::Decimal;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Email is already registered")]
    EmailTaken,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Refresh token is invalid, expired or revoked")]
    InvalidRefresh,
    #[error("Refresh token not found or already revoked")]
    NotFoundOrRevoked,
    #[error("Password reset token is invalid, expired or already used")]
    InvalidResetToken,
    #[error("Missing, malformed or expired access token")]
    InvalidAccessToken,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Portfolio not found")]
    PortfolioNotFound,
    #[error("A portfolio with this name already exists")]
    DuplicatePortfolioName,
    #[error("Invalid transaction field '{field}': {message}")]
    TransactionValidation { field: &'static str, message: String },
    #[error("Insufficient shares of {symbol}: requested {requested}, available {available}")]
    InsufficientShares {
        symbol: String,
        requested: Decimal,
        available: Decimal,
    },
    #[error("Invalid lot selection: {0}")]
    InvalidLotSelection(String),
    #[error("Transaction {transaction_id} created a lot that has since been consumed")]
    LotConsumed {
        transaction_id: Uuid,
        lot_id: Option<Uuid>,
    },
    #[error("{0}")]
    Irreversible(String),
    #[error("Invalid corporate action field '{field}': {message}")]
    CorporateActionValidation { field: &'static str, message: String },
    #[error("A pending proposal already exists for this corporate action")]
    ProposalAlreadyExists,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Operation cancelled")]
    OperationCancelled,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn transaction_field(field: &'static str, message: impl Into<String>) -> Self {
        AppError::TransactionValidation {
            field,
            message: message.into(),
        }
    }

    pub fn action_field(field: &'static str, message: impl Into<String>) -> Self {
        AppError::CorporateActionValidation {
            field,
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::EmailTaken => "EMAIL_TAKEN",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::InvalidRefresh => "INVALID_REFRESH",
            AppError::NotFoundOrRevoked => "NOT_FOUND_OR_REVOKED",
            AppError::InvalidResetToken => "INVALID_RESET_TOKEN",
            AppError::InvalidAccessToken => "INVALID_ACCESS_TOKEN",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::PortfolioNotFound => "PORTFOLIO_NOT_FOUND",
            AppError::DuplicatePortfolioName => "DUPLICATE_PORTFOLIO_NAME",
            AppError::TransactionValidation { .. } => "TRANSACTION_VALIDATION",
            AppError::InsufficientShares { .. } => "INSUFFICIENT_SHARES",
            AppError::InvalidLotSelection(_) => "INVALID_LOT_SELECTION",
            AppError::LotConsumed { .. } => "LOT_CONSUMED",
            AppError::Irreversible(_) => "IRREVERSIBLE",
            AppError::CorporateActionValidation { .. } => "CORPORATE_ACTION_VALIDATION",
            AppError::ProposalAlreadyExists => "PROPOSAL_ALREADY_EXISTS",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION",
            AppError::RateLimited => "RATE_LIMITED",
            AppError::OperationCancelled => "OPERATION_CANCELLED",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::TransactionValidation { .. }
            | AppError::CorporateActionValidation { .. }
            | AppError::Validation(_)
            | AppError::InvalidLotSelection(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials
            | AppError::InvalidRefresh
            | AppError::InvalidResetToken
            | AppError::InvalidAccessToken => StatusCode::UNAUTHORIZED,
            AppError::Unauthorized => StatusCode::FORBIDDEN,
            AppError::PortfolioNotFound | AppError::NotFound(_) | AppError::NotFoundOrRevoked => {
                StatusCode::NOT_FOUND
            }
            AppError::EmailTaken
            | AppError::DuplicatePortfolioName
            | AppError::ProposalAlreadyExists
            | AppError::LotConsumed { .. }
            | AppError::Irreversible(_) => StatusCode::CONFLICT,
            AppError::InsufficientShares { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            // nginx's "client closed request"
            AppError::OperationCancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let mut error = json!({
            "code": self.code(),
            "message": message,
        });
        match &self {
            AppError::TransactionValidation { field, .. }
            | AppError::CorporateActionValidation { field, .. } => {
                error["field"] = json!(field);
            }
            AppError::InsufficientShares {
                requested,
                available,
                ..
            } => {
                error["shortfall"] = json!((requested - available).to_string());
            }
            AppError::LotConsumed {
                transaction_id,
                lot_id,
            } => {
                error["transaction_id"] = json!(transaction_id);
                error["lot_id"] = json!(lot_id);
            }
            _ => {}
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();
        if let AppError::RateLimited = self {
            response
                .headers_mut()
                .insert("Retry-After", http::HeaderValue::from_static("60"));
        }
        response
    }
}

impl From<sqlx::Error> for AppError {
    fn from(value: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", value);
        AppError::Internal(value.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(value: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(value.to_string())
    }
}

/// True when the error is a unique-constraint violation (SQLSTATE 23505).
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}
