use actix_web::http::{StatusCode, header};
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// 字段级校验错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Validation error: {} invalid field(s)", .0.len())]
    InvalidFields(Vec<FieldError>),

    #[error("Auth error: {0}")]
    AuthError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Cooldown active, {hours_left} hour(s) left")]
    CooldownActive { hours_left: i64 },

    #[error("Too many claim requests, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: i64 },

    #[error("No coupons available")]
    NoCouponsAvailable,

    #[error("Coupon was claimed by a concurrent request")]
    ClaimConflict,

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl AppError {
    /// 机器可读的错误码
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) | AppError::InvalidFields(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) | AppError::JwtError(_) => "AUTH_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Forbidden => "FORBIDDEN",
            AppError::CooldownActive { .. } => "COOLDOWN_ACTIVE",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::NoCouponsAvailable => "NO_COUPONS_AVAILABLE",
            AppError::ClaimConflict => "CLAIM_CONFLICT",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::InvalidFields(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) | AppError::JwtError(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) | AppError::NoCouponsAvailable => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::CooldownActive { .. } | AppError::RateLimited { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::ClaimConflict => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let code = self.code();
        let mut builder = HttpResponse::build(status_code);

        let error = match self {
            AppError::ValidationError(msg) => {
                log::warn!("Validation error: {msg}");
                json!({ "code": code, "message": msg })
            }
            AppError::InvalidFields(details) => {
                log::warn!("Validation error: {details:?}");
                json!({
                    "code": code,
                    "message": "Validation error",
                    "details": details,
                })
            }
            AppError::AuthError(msg) => {
                log::warn!("Authentication error: {msg}");
                json!({ "code": code, "message": msg })
            }
            AppError::JwtError(err) => {
                log::warn!("Authentication error: {err}");
                json!({ "code": code, "message": "Invalid token" })
            }
            AppError::NotFound(msg) => json!({ "code": code, "message": msg }),
            AppError::Forbidden => {
                log::warn!("Forbidden access");
                json!({ "code": code, "message": "Forbidden" })
            }
            // 领取流程中的预期结果, 不按错误记录
            AppError::CooldownActive { hours_left } => {
                log::info!("Claim rejected: cooldown active ({hours_left}h left)");
                builder.insert_header((header::RETRY_AFTER, (hours_left * 3600).to_string()));
                json!({
                    "code": code,
                    "message": format!("Please wait {hours_left} hours before claiming another coupon."),
                    "retry_after_hours": hours_left,
                })
            }
            AppError::RateLimited { retry_after_secs } => {
                log::info!("Claim rejected: rate limited");
                builder.insert_header((header::RETRY_AFTER, retry_after_secs.to_string()));
                json!({
                    "code": code,
                    "message": "Too many coupon claims from this IP, please try again later",
                    "retry_after_secs": retry_after_secs,
                })
            }
            AppError::NoCouponsAvailable => {
                log::info!("Claim rejected: no coupons available");
                json!({ "code": code, "message": "No available coupons" })
            }
            AppError::ClaimConflict => {
                log::info!("Claim rejected: lost race for candidate coupon");
                json!({
                    "code": code,
                    "message": "Coupon was just claimed by someone else, please retry",
                })
            }
            AppError::DatabaseError(err) => {
                log::error!("Database error: {err}");
                json!({ "code": code, "message": "Database error" })
            }
            _ => {
                log::error!("Internal error: {self}");
                json!({ "code": code, "message": "Internal server error" })
            }
        };

        builder.json(json!({
            "success": false,
            "error": error,
        }))
    }
}
