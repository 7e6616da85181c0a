//! ProductCatalogService
//!
//! 検証 → 派生フィールド → 重複チェック → 画像判定 → ファイル保存 →
//! トランザクション書き込み → 集約の再構築、の順に処理する。
//! 書き込み前のどの段階で失敗しても DB にもファイルにも何も残らない。

use std::sync::Arc;
use tracing::{error, info, warn};

use super::derived::apply_derived_fields;
use super::images::{has_new_images, reconcile};
use super::payload::ProductPayload;
use super::uniqueness::{
    check_ownership, check_references, check_sku_availability, check_slug_availability,
    check_variant_uniqueness,
};
use super::validator::{validate, ValidationMode};
use super::writer::{self, WriteRequest};
use crate::db::DbPool;
use crate::error::{CatalogError, CatalogResult, WriteFailure};
use crate::models::{ProductAggregate, StoredImage, UploadedImage};
use crate::storage::FileStore;

#[derive(Clone)]
pub struct ProductCatalogService {
    pool: DbPool,
    files: Arc<dyn FileStore>,
    public_base_url: String,
}

impl ProductCatalogService {
    pub fn new(pool: DbPool, files: Arc<dyn FileStore>, public_base_url: impl Into<String>) -> Self {
        Self {
            pool,
            files,
            public_base_url: public_base_url.into(),
        }
    }

    pub async fn create_product(
        &self,
        payload: &ProductPayload,
        uploads: &[UploadedImage],
        caller: Option<&str>,
    ) -> CatalogResult<ProductAggregate> {
        let mut draft = validate(payload, ValidationMode::Create)?;
        apply_derived_fields(&mut draft);

        let variants = draft.variants.as_deref().unwrap_or_default();
        check_variant_uniqueness(variants)?;
        if let (Some(category_id), Some(subcategory_id)) =
            (draft.fields.category_id, draft.fields.subcategory_id)
        {
            check_references(&self.pool, category_id, subcategory_id).await?;
        }
        if let Some(slug) = &draft.fields.slug {
            check_slug_availability(&self.pool, slug, None).await?;
        }
        check_sku_availability(&self.pool, variants, None).await?;

        let plan = reconcile(&[], &payload.images, has_new_images(uploads));
        let stored = self.store_uploads(uploads).await?;

        info!(
            "📦 Creating product {:?}: {} variant(s), {} image(s)",
            draft.fields.name,
            variants.len(),
            stored.len()
        );

        let written = writer::create_product(
            &self.pool,
            WriteRequest {
                draft: &draft,
                plan: &plan,
                directives: &payload.images,
                new_images: &stored,
                caller,
            },
        )
        .await;

        let outcome = match written {
            Ok(outcome) => outcome,
            Err(e) => {
                self.discard_stored(&stored).await;
                return Err(e);
            }
        };

        writer::load_aggregate(&self.pool, outcome.product_id, &self.public_base_url).await
    }

    pub async fn update_product(
        &self,
        product_id: i64,
        payload: &ProductPayload,
        uploads: &[UploadedImage],
        caller: Option<&str>,
    ) -> CatalogResult<ProductAggregate> {
        let mut draft = validate(payload, ValidationMode::Update)?;
        let current = writer::find_product(&self.pool, product_id).await?;
        apply_derived_fields(&mut draft);

        let variants = draft.variants.as_deref().unwrap_or_default();
        check_variant_uniqueness(variants)?;
        if draft.fields.category_id.is_some() || draft.fields.subcategory_id.is_some() {
            check_references(
                &self.pool,
                draft.fields.category_id.unwrap_or(current.category_id),
                draft.fields.subcategory_id.unwrap_or(current.subcategory_id),
            )
            .await?;
        }
        if let Some(slug) = &draft.fields.slug {
            check_slug_availability(&self.pool, slug, Some(product_id)).await?;
        }
        check_ownership(&self.pool, product_id, &draft, &payload.images).await?;
        check_sku_availability(&self.pool, variants, Some(product_id)).await?;

        let existing = writer::image_ids(&self.pool, product_id).await?;
        let plan = reconcile(&existing, &payload.images, has_new_images(uploads));
        let stored = self.store_uploads(uploads).await?;

        info!(
            "📝 Updating product {}: {} variant(s) submitted, {} deleted, {} new image(s), {} image(s) removed",
            product_id,
            variants.len(),
            draft.delete_variant_ids.len(),
            stored.len(),
            plan.delete_ids.len()
        );

        let written = writer::update_product(
            &self.pool,
            product_id,
            WriteRequest {
                draft: &draft,
                plan: &plan,
                directives: &payload.images,
                new_images: &stored,
                caller,
            },
        )
        .await;

        let outcome = match written {
            Ok(outcome) => outcome,
            Err(e) => {
                self.discard_stored(&stored).await;
                return Err(e);
            }
        };

        self.remove_files(&outcome.removed_paths).await;
        writer::load_aggregate(&self.pool, product_id, &self.public_base_url).await
    }

    pub async fn get_product(&self, product_id: i64) -> CatalogResult<ProductAggregate> {
        writer::load_aggregate(&self.pool, product_id, &self.public_base_url).await
    }

    pub async fn delete_product(&self, product_id: i64, caller: Option<&str>) -> CatalogResult<()> {
        writer::soft_delete_product(&self.pool, product_id, caller).await
    }

    /// 論理削除済みの商品を物理削除し、画像ファイルも消す
    pub async fn purge_product(&self, product_id: i64) -> CatalogResult<()> {
        let paths = writer::purge_product(&self.pool, product_id).await?;
        self.remove_files(&paths).await;
        Ok(())
    }

    // ========================================
    // File handling
    // ========================================

    /// エラーのないアップロードだけを保存する。途中で失敗したら保存済み分を消す
    async fn store_uploads(&self, uploads: &[UploadedImage]) -> CatalogResult<Vec<StoredImage>> {
        let mut stored = Vec::new();
        for upload in uploads {
            if let Some(reason) = &upload.error {
                warn!("Skipping upload {:?}: {}", upload.file_name, reason);
                continue;
            }
            if !upload.is_usable() {
                continue;
            }
            match self.files.store(upload).await {
                Ok(image) => stored.push(image),
                Err(e) => {
                    error!("Failed to store upload {:?}: {}", upload.file_name, e);
                    self.discard_stored(&stored).await;
                    return Err(CatalogError::Persistence(WriteFailure::FileStorage));
                }
            }
        }
        Ok(stored)
    }

    /// ロールバックされた書き込みのために保存したファイルを消す
    async fn discard_stored(&self, stored: &[StoredImage]) {
        let paths: Vec<String> = stored.iter().map(|image| image.path.clone()).collect();
        self.remove_files(&paths).await;
    }

    async fn remove_files(&self, paths: &[String]) {
        for path in paths {
            if let Err(e) = self.files.delete(path).await {
                warn!("Failed to delete image file {}: {}", path, e);
            }
        }
    }
}
