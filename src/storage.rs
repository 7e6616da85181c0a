//! File Storage
//! 商品画像ファイルの保存・削除

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::models::{StoredImage, UploadedImage};

/// 対応する画像拡張子
const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

/// ファイル保存先の抽象化
#[async_trait]
pub trait FileStore: Send + Sync {
    /// ファイルを保存し、ベースディレクトリからの相対パスを返す
    async fn store(&self, upload: &UploadedImage) -> std::io::Result<StoredImage>;

    /// 相対パスのファイルを削除（存在しなければ何もしない）
    async fn delete(&self, path: &str) -> std::io::Result<()>;
}

/// ローカルディスクへの保存
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    base_dir: PathBuf,
}

impl LocalFileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    pub fn full_path(&self, path: &str) -> PathBuf {
        self.base_dir.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store(&self, upload: &UploadedImage) -> std::io::Result<StoredImage> {
        let ext = image_extension(upload);
        let now = chrono::Utc::now();
        let relative = format!(
            "products/{}/{}.{}",
            now.format("%Y/%m"),
            uuid::Uuid::new_v4(),
            ext
        );
        let target = self.full_path(&relative);

        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir).await?;
        }

        let mut file = fs::File::create(&target).await?;
        file.write_all(&upload.bytes).await?;
        file.flush().await?;

        info!("Image saved: {:?} ({} bytes)", target, upload.bytes.len());

        Ok(StoredImage {
            path: relative,
            checksum: compute_sha256(&upload.bytes),
        })
    }

    async fn delete(&self, path: &str) -> std::io::Result<()> {
        let target = self.full_path(path);
        match fs::remove_file(&target).await {
            Ok(()) => {
                info!("Image deleted: {:?}", target);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Image already missing: {:?}", target);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// 受信した画像の検査。問題があれば error を埋める
pub fn inspect_upload(
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
    max_bytes: usize,
) -> UploadedImage {
    let error = if bytes.is_empty() {
        Some("empty file".to_string())
    } else if bytes.len() > max_bytes {
        Some(format!("file too large: {} bytes (max {})", bytes.len(), max_bytes))
    } else if image::guess_format(&bytes).is_err() {
        Some("unsupported image format".to_string())
    } else {
        None
    };

    UploadedImage { file_name, content_type, bytes, error }
}

/// 拡張子の決定（内容から判定、だめならファイル名）
fn image_extension(upload: &UploadedImage) -> String {
    if let Ok(format) = image::guess_format(&upload.bytes) {
        if let Some(ext) = format.extensions_str().first() {
            return ext.to_string();
        }
    }
    upload
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .filter(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or_else(|| "bin".to_string())
}

fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
