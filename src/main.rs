use std::sync::Arc;
use tokio::fs;
use tracing::info;

use catalog_server::{build_router, config::AppConfig, db::init_db, AppState};

// ========================================
// メイン
// ========================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ログ初期化
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::from_env();

    // 画像保存先
    fs::create_dir_all(&config.base_data_dir).await?;
    if let Some(db_dir) = std::path::Path::new(&config.database_path).parent() {
        fs::create_dir_all(db_dir).await?;
    }

    let db = init_db(&config.database_path).await?;

    let addr = config.bind_addr.clone();
    let max_body_mb = config.max_body_bytes / (1024 * 1024);
    let data_dir = config.base_data_dir.clone();

    let state = Arc::new(AppState::new(db, config));
    let app = build_router(state);

    info!("🚀 Catalog Server listening on {}", addr);
    info!("📦 Max body size: {}MB", max_body_mb);
    info!("🗂️  Image directory: {:?}", data_dir);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
