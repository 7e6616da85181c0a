//! Catalog Server
//! 商品カタログ API（商品・バリアント・画像・タグの作成／更新）

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod storage;

use axum::{
    extract::DefaultBodyLimit,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::catalog::ProductCatalogService;
use crate::config::AppConfig;
use crate::db::DbPool;
use crate::handlers::products;
use crate::storage::LocalFileStore;

/// ハンドラ共通の状態
pub struct AppState {
    pub catalog: ProductCatalogService,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        let files = Arc::new(LocalFileStore::new(config.base_data_dir.clone()));
        let catalog = ProductCatalogService::new(db, files, config.public_base_url.clone());
        Self { catalog, config }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
}

/// ヘルスチェック
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "catalog-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// ルーター構築
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/products", post(products::create_product))
        .route(
            "/api/products/:id",
            get(products::get_product)
                .put(products::update_product)
                .post(products::update_product)
                .delete(products::delete_product),
        )
        .route("/api/products/:id/purge", delete(products::purge_product))
        // 保存済み画像の配信
        .nest_service("/media", ServeDir::new(&state.config.base_data_dir))
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
