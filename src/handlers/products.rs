//! Products API Handlers
//! /api/products エンドポイント

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Multipart, Path, Request, State},
    http::{header, request::Parts, StatusCode},
    response::Json,
};
use serde::Serialize;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};

use crate::catalog::{form_fields_to_value, ProductPayload};
use crate::error::CatalogError;
use crate::models::{ProductAggregate, UploadedImage};
use crate::storage::inspect_upload;
use crate::AppState;

/// 画像ファイルとして扱う multipart フィールド名
const IMAGE_FIELDS: &[&str] = &["images", "images[]", "image"];

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
pub struct ProductResponse {
    pub success: bool,
    pub product: ProductAggregate,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

// ========================================
// Extractors
// ========================================

/// 監査用の呼び出し元 (x-user-id ヘッダー)
pub struct Caller(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Ok(Caller(user_id))
    }
}

/// JSON または multipart/form-data の商品入力
pub struct ProductForm {
    pub payload: ProductPayload,
    pub uploads: Vec<UploadedImage>,
}

#[async_trait]
impl FromRequest<Arc<AppState>> for ProductForm {
    type Rejection = CatalogError;

    async fn from_request(req: Request, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("multipart/form-data"))
            .unwrap_or(false);

        if !is_multipart {
            let Json(value) = Json::<Value>::from_request(req, state)
                .await
                .map_err(|e| CatalogError::validation("payload", e.body_text()))?;
            return Ok(Self {
                payload: ProductPayload::from_value(&value)?,
                uploads: Vec::new(),
            });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| CatalogError::validation("payload", format!("Multipart error: {}", e)))?;

        let mut fields = Vec::new();
        let mut uploads = Vec::new();
        while let Some(field) = multipart.next_field().await.map_err(|e| {
            CatalogError::validation("payload", format!("Multipart error: {}", e))
        })? {
            let name = field.name().unwrap_or("").to_string();
            if IMAGE_FIELDS.contains(&name.as_str()) {
                let file_name = field.file_name().map(|s| s.to_string());
                let content_type = field.content_type().map(|s| s.to_string());
                let data = field.bytes().await.map_err(|e| {
                    CatalogError::validation("images", format!("File read error: {}", e))
                })?;
                let upload = inspect_upload(
                    file_name,
                    content_type,
                    data.to_vec(),
                    state.config.max_body_bytes,
                );
                if let Some(reason) = &upload.error {
                    warn!("Rejected upload {:?}: {}", upload.file_name, reason);
                }
                uploads.push(upload);
            } else {
                let text = field.text().await.map_err(|e| {
                    CatalogError::validation(name.clone(), format!("Field read error: {}", e))
                })?;
                fields.push((name, text));
            }
        }

        let payload = ProductPayload::from_value(&form_fields_to_value(fields))?;
        Ok(Self { payload, uploads })
    }
}

// ========================================
// Handlers
// ========================================

/// POST /api/products - Product作成（JSON / Multipart）
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    form: ProductForm,
) -> Result<(StatusCode, Json<ProductResponse>), CatalogError> {
    let product = state
        .catalog
        .create_product(&form.payload, &form.uploads, caller.as_deref())
        .await?;

    info!("Product created via API: id={}", product.product.id);
    Ok((
        StatusCode::CREATED,
        Json(ProductResponse {
            success: true,
            product,
        }),
    ))
}

/// GET /api/products/:id - Product詳細
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ProductResponse>, CatalogError> {
    let product = state.catalog.get_product(id).await?;
    Ok(Json(ProductResponse {
        success: true,
        product,
    }))
}

/// PUT /api/products/:id - Product更新（POST でも可）
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Caller(caller): Caller,
    form: ProductForm,
) -> Result<Json<ProductResponse>, CatalogError> {
    let product = state
        .catalog
        .update_product(id, &form.payload, &form.uploads, caller.as_deref())
        .await?;
    Ok(Json(ProductResponse {
        success: true,
        product,
    }))
}

/// DELETE /api/products/:id - Product論理削除
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Caller(caller): Caller,
) -> Result<Json<DeleteResponse>, CatalogError> {
    state.catalog.delete_product(id, caller.as_deref()).await?;
    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Product {} deleted", id),
    }))
}

/// DELETE /api/products/:id/purge - 論理削除済みProductの物理削除
pub async fn purge_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Caller(caller): Caller,
) -> Result<Json<DeleteResponse>, CatalogError> {
    state.catalog.purge_product(id).await?;
    info!("🔥 Purge requested by {:?}: product {}", caller, id);
    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Product {} purged", id),
    }))
}
