//! 設定

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 画像ファイルの保存ルート
    pub base_data_dir: PathBuf,
    /// 画像URLの組み立てに使う公開ベースURL
    pub public_base_url: String,
    pub database_path: String,
    pub bind_addr: String,
    pub max_body_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_data_dir: PathBuf::from("/data/catalog"),
            public_base_url: "http://localhost:3000/media".to_string(),
            database_path: "/data/catalog/catalog.db".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            max_body_bytes: 50 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    /// 環境変数で既定値を上書き
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("CATALOG_DATA_DIR") {
            config.base_data_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("CATALOG_PUBLIC_BASE_URL") {
            config.public_base_url = url;
        }
        if let Ok(path) = std::env::var("CATALOG_DB_PATH") {
            config.database_path = path;
        }
        if let Ok(addr) = std::env::var("CATALOG_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(bytes) = std::env::var("CATALOG_MAX_BODY_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.max_body_bytes = bytes;
        }
        config
    }
}
