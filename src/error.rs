//! Error Module
//! カタログ操作のエラー分類と HTTP レスポンスへの変換

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, warn};

// ========================================
// Error Code
// ========================================

/// API に返すエラーコード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ValidationFailed,
    NotFound,
    Conflict,
    PersistenceFailed,
    Internal,
}

// ========================================
// Field Errors
// ========================================

/// フィールド単位のエラー（"variants.1.sku" → ["variant #2: ..."]）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.0.values().flatten().map(String::as_str)
    }

    /// エラーがあれば Validation エラーとして返す
    pub fn into_result(self) -> Result<(), CatalogError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CatalogError::Validation(self))
        }
    }
}

impl IntoIterator for FieldErrors {
    type Item = (String, Vec<String>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ========================================
// Write Failure (永続化層の構造化コード)
// ========================================

/// 書き込みトランザクション中の失敗理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFailure {
    NoActiveVariant,
    CategoryInactive,
    SubcategoryInactive,
    StaleVersion,
    FileStorage,
    Database,
}

impl WriteFailure {
    /// 利用者向けメッセージ（ストレージの生エラーは含めない）
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NoActiveVariant => {
                "Product cannot be activated: it must have at least one active variant"
            }
            Self::CategoryInactive => {
                "Product cannot be activated: its category is inactive or deleted"
            }
            Self::SubcategoryInactive => {
                "Product cannot be activated: its subcategory is inactive or deleted"
            }
            Self::StaleVersion => {
                "Product was modified by another request; reload it and submit again"
            }
            Self::FileStorage => "Failed to store product images",
            Self::Database => "Failed to save product",
        }
    }
}

// ========================================
// Catalog Error
// ========================================

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("The given data was invalid")]
    Validation(FieldErrors),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{message}")]
    Conflict { message: String, errors: FieldErrors },

    #[error("{}", .0.user_message())]
    Persistence(WriteFailure),
}

impl CatalogError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    pub fn conflict(message: impl Into<String>, errors: FieldErrors) -> Self {
        Self::Conflict {
            message: message.into(),
            errors,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Conflict { .. } | Self::Persistence(WriteFailure::StaleVersion) => {
                ErrorCode::Conflict
            }
            Self::Persistence(_) => ErrorCode::PersistenceFailed,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict { .. } | Self::Persistence(WriteFailure::StaleVersion) => {
                StatusCode::CONFLICT
            }
            Self::Persistence(
                WriteFailure::NoActiveVariant
                | WriteFailure::CategoryInactive
                | WriteFailure::SubcategoryInactive,
            ) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            Self::Conflict { errors, .. } if !errors.is_empty() => Some(errors),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for CatalogError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db_err) = e.as_database_error() {
            if db_err.is_unique_violation() {
                warn!("Unique constraint violated during write: {}", db_err);
                return Self::conflict(
                    "A product or variant with the same SKU or slug already exists",
                    FieldErrors::new(),
                );
            }
        }
        if let sqlx::Error::RowNotFound = e {
            return Self::not_found("Record");
        }
        error!("DB error: {}", e);
        Self::Persistence(WriteFailure::Database)
    }
}

// ========================================
// HTTP Response
// ========================================

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub code: ErrorCode,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        warn!("API Error: {} ({})", self, status);
        let body = ErrorResponse {
            success: false,
            code: self.code(),
            error: self.to_string(),
            errors: self.field_errors().cloned(),
        };
        (status, Json(body)).into_response()
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
