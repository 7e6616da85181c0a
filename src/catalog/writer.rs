//! Aggregate writer
//! 商品・バリアント・画像・タグを1トランザクションで書き込む
//!
//! トランザクション中はプール経由のクエリを発行しない（すべて `&mut *tx`）。

use sqlx::types::Json;
use sqlx::SqliteConnection;
use tracing::{info, warn};

use super::derived::slugify;
use super::images::ImagePlan;
use crate::db::DbPool;
use crate::error::{CatalogError, CatalogResult, WriteFailure};
use crate::models::{
    CatalogSummary, ImageDirectives, ImageResponse, Product, ProductAggregate, ProductDraft,
    ProductImage, Status, StoredImage, Tag, Variant, VariantDraft,
};

/// 書き込み内容
pub struct WriteRequest<'a> {
    pub draft: &'a ProductDraft,
    pub plan: &'a ImagePlan,
    pub directives: &'a ImageDirectives,
    /// トランザクション前に保存済みの新規画像
    pub new_images: &'a [StoredImage],
    pub caller: Option<&'a str>,
}

#[derive(Debug, Default)]
pub struct WriteOutcome {
    pub product_id: i64,
    /// コミット後にファイルを消す画像パス
    pub removed_paths: Vec<String>,
}

// ========================================
// Create / Update
// ========================================

pub async fn create_product(pool: &DbPool, req: WriteRequest<'_>) -> CatalogResult<WriteOutcome> {
    let fields = &req.draft.fields;
    let name = required(fields.name.clone(), "name")?;
    let category_id = required(fields.category_id, "category_id")?;
    let subcategory_id = required(fields.subcategory_id, "subcategory_id")?;
    let status = required(fields.status, "status")?;
    let product_type = required(fields.product_type, "product_type")?;
    let now_ms = chrono::Utc::now().timestamp_millis();

    let mut tx = pool.begin().await?;

    let slug = match &fields.slug {
        Some(slug) => slug.clone(),
        None => unique_slug(&mut tx, &slugify(&name)).await?,
    };

    let product_id = sqlx::query(r#"
        INSERT INTO products (
            name, slug, description, short_description, category_id, subcategory_id,
            status, product_type, tax_rate, cgst_rate, sgst_rate, igst_rate,
            is_vegetarian, display_order, version, created_by, updated_by,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?, ?)
    "#)
    .bind(&name)
    .bind(&slug)
    .bind(&fields.description)
    .bind(&fields.short_description)
    .bind(category_id)
    .bind(subcategory_id)
    .bind(status)
    .bind(product_type)
    .bind(fields.tax_rate)
    .bind(fields.cgst_rate)
    .bind(fields.sgst_rate)
    .bind(fields.igst_rate)
    .bind(fields.is_vegetarian.unwrap_or(false))
    .bind(fields.display_order.unwrap_or(0))
    .bind(req.caller)
    .bind(req.caller)
    .bind(now_ms)
    .bind(now_ms)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    if let Some(variants) = &req.draft.variants {
        write_variants(&mut tx, product_id, variants, now_ms).await?;
    }
    insert_images(&mut tx, product_id, req.new_images, now_ms).await?;
    apply_image_layout(&mut tx, product_id, req.directives).await?;
    if let Some(tags) = &req.draft.tags {
        replace_tags(&mut tx, product_id, tags).await?;
    }
    ensure_activatable(&mut tx, product_id).await?;

    tx.commit().await?;

    info!("✅ Product created: id={}, slug={}", product_id, slug);
    Ok(WriteOutcome {
        product_id,
        removed_paths: Vec::new(),
    })
}

pub async fn update_product(
    pool: &DbPool,
    product_id: i64,
    req: WriteRequest<'_>,
) -> CatalogResult<WriteOutcome> {
    let fields = &req.draft.fields;
    let now_ms = chrono::Utc::now().timestamp_millis();

    let mut tx = pool.begin().await?;

    let current: Product =
        sqlx::query_as("SELECT * FROM products WHERE id = ? AND deleted_at IS NULL")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CatalogError::not_found(format!("Product {product_id}")))?;

    if let Some(expected) = req.draft.expected_version {
        if expected != current.version {
            warn!(
                "Stale update for product {}: expected version {}, found {}",
                product_id, expected, current.version
            );
            return Err(CatalogError::Persistence(WriteFailure::StaleVersion));
        }
    }

    // version を比較しつつ更新（指定のないフィールドは既存値のまま）
    let updated = sqlx::query(r#"
        UPDATE products SET
            name = COALESCE(?, name),
            slug = COALESCE(?, slug),
            description = COALESCE(?, description),
            short_description = COALESCE(?, short_description),
            category_id = COALESCE(?, category_id),
            subcategory_id = COALESCE(?, subcategory_id),
            status = COALESCE(?, status),
            product_type = COALESCE(?, product_type),
            tax_rate = COALESCE(?, tax_rate),
            cgst_rate = COALESCE(?, cgst_rate),
            sgst_rate = COALESCE(?, sgst_rate),
            igst_rate = COALESCE(?, igst_rate),
            is_vegetarian = COALESCE(?, is_vegetarian),
            display_order = COALESCE(?, display_order),
            updated_by = COALESCE(?, updated_by),
            updated_at = ?,
            version = version + 1
        WHERE id = ? AND version = ?
    "#)
    .bind(&fields.name)
    .bind(&fields.slug)
    .bind(&fields.description)
    .bind(&fields.short_description)
    .bind(fields.category_id)
    .bind(fields.subcategory_id)
    .bind(fields.status)
    .bind(fields.product_type)
    .bind(fields.tax_rate)
    .bind(fields.cgst_rate)
    .bind(fields.sgst_rate)
    .bind(fields.igst_rate)
    .bind(fields.is_vegetarian)
    .bind(fields.display_order)
    .bind(req.caller)
    .bind(now_ms)
    .bind(product_id)
    .bind(current.version)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(CatalogError::Persistence(WriteFailure::StaleVersion));
    }

    for variant_id in &req.draft.delete_variant_ids {
        sqlx::query("DELETE FROM product_variants WHERE id = ? AND product_id = ?")
            .bind(variant_id)
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
    }
    if let Some(variants) = &req.draft.variants {
        write_variants(&mut tx, product_id, variants, now_ms).await?;
    }

    let mut removed_paths = Vec::new();
    for image_id in &req.plan.delete_ids {
        let path: Option<String> = sqlx::query_scalar(
            "SELECT image_path FROM product_images WHERE id = ? AND product_id = ?",
        )
        .bind(image_id)
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(path) = path {
            sqlx::query("DELETE FROM product_images WHERE id = ?")
                .bind(image_id)
                .execute(&mut *tx)
                .await?;
            removed_paths.push(path);
        }
    }
    insert_images(&mut tx, product_id, req.new_images, now_ms).await?;
    apply_image_layout(&mut tx, product_id, req.directives).await?;

    if let Some(tags) = &req.draft.tags {
        replace_tags(&mut tx, product_id, tags).await?;
    }
    ensure_activatable(&mut tx, product_id).await?;

    tx.commit().await?;

    info!(
        "✅ Product updated: id={}, version={}, images removed={}",
        product_id,
        current.version + 1,
        removed_paths.len()
    );
    Ok(WriteOutcome {
        product_id,
        removed_paths,
    })
}

// ========================================
// Soft delete / Purge
// ========================================

pub async fn soft_delete_product(
    pool: &DbPool,
    product_id: i64,
    caller: Option<&str>,
) -> CatalogResult<()> {
    let now_ms = chrono::Utc::now().timestamp_millis();
    let result = sqlx::query(r#"
        UPDATE products SET
            deleted_at = ?, deleted_by = ?, status = 'inactive',
            updated_at = ?, version = version + 1
        WHERE id = ? AND deleted_at IS NULL
    "#)
    .bind(now_ms)
    .bind(caller)
    .bind(now_ms)
    .bind(product_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CatalogError::not_found(format!("Product {product_id}")));
    }
    info!("🗑️ Product soft-deleted: id={}", product_id);
    Ok(())
}

/// 論理削除済みの商品を子レコードごと物理削除し、画像パスを返す
pub async fn purge_product(pool: &DbPool, product_id: i64) -> CatalogResult<Vec<String>> {
    let mut tx = pool.begin().await?;

    let deleted_at: Option<Option<i64>> =
        sqlx::query_scalar("SELECT deleted_at FROM products WHERE id = ?")
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?;
    match deleted_at {
        None => return Err(CatalogError::not_found(format!("Product {product_id}"))),
        Some(None) => {
            return Err(CatalogError::conflict(
                "Product must be deleted before it can be purged",
                Default::default(),
            ))
        }
        Some(Some(_)) => {}
    }

    let paths: Vec<String> =
        sqlx::query_scalar("SELECT image_path FROM product_images WHERE product_id = ?")
            .bind(product_id)
            .fetch_all(&mut *tx)
            .await?;

    for sql in [
        "DELETE FROM product_tags WHERE product_id = ?",
        "DELETE FROM product_images WHERE product_id = ?",
        "DELETE FROM product_variants WHERE product_id = ?",
        "DELETE FROM products WHERE id = ?",
    ] {
        sqlx::query(sql).bind(product_id).execute(&mut *tx).await?;
    }

    tx.commit().await?;

    info!("🔥 Product purged: id={}, images={}", product_id, paths.len());
    Ok(paths)
}

// ========================================
// Read back
// ========================================

/// 論理削除されていない商品行
pub async fn find_product(pool: &DbPool, product_id: i64) -> CatalogResult<Product> {
    sqlx::query_as("SELECT * FROM products WHERE id = ? AND deleted_at IS NULL")
        .bind(product_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CatalogError::not_found(format!("Product {product_id}")))
}

pub async fn image_ids(pool: &DbPool, product_id: i64) -> CatalogResult<Vec<i64>> {
    let ids = sqlx::query_scalar("SELECT id FROM product_images WHERE product_id = ? ORDER BY id")
        .bind(product_id)
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

/// コミット済みの集約を読み直してレスポンス形に組み立てる
pub async fn load_aggregate(
    pool: &DbPool,
    product_id: i64,
    base_url: &str,
) -> CatalogResult<ProductAggregate> {
    let product = find_product(pool, product_id).await?;

    let variants: Vec<Variant> = sqlx::query_as(
        "SELECT * FROM product_variants WHERE product_id = ? ORDER BY display_order, id",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    let images: Vec<ProductImage> = sqlx::query_as(
        "SELECT * FROM product_images WHERE product_id = ? ORDER BY display_order, id",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    let tags: Vec<String> = sqlx::query_scalar(r#"
        SELECT t.name FROM tags t
        JOIN product_tags pt ON pt.tag_id = t.id
        WHERE pt.product_id = ?
        ORDER BY t.name
    "#)
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    let category = summary(pool, "categories", product.category_id).await?;
    let subcategory = summary(pool, "subcategories", product.subcategory_id).await?;

    Ok(ProductAggregate {
        images: images
            .iter()
            .map(|image| ImageResponse::from_image(image, base_url))
            .collect(),
        product,
        variants,
        tags,
        category,
        subcategory,
    })
}

async fn summary(pool: &DbPool, table: &str, id: i64) -> CatalogResult<Option<CatalogSummary>> {
    let sql = format!("SELECT id, name, status FROM {table} WHERE id = ?");
    let row: Option<(i64, String, Status)> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(id, name, status)| CatalogSummary { id, name, status }))
}

// ========================================
// Transaction steps
// ========================================

fn required<T>(value: Option<T>, field: &str) -> CatalogResult<T> {
    value.ok_or_else(|| CatalogError::validation(field, format!("{field} is required")))
}

/// 衝突しなければ base、衝突したら base-2, base-3, ...
async fn unique_slug(conn: &mut SqliteConnection, base: &str) -> CatalogResult<String> {
    let mut candidate = base.to_string();
    let mut suffix = 2;
    loop {
        let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM products WHERE slug = ?")
            .bind(&candidate)
            .fetch_optional(&mut *conn)
            .await?;
        if taken.is_none() {
            return Ok(candidate);
        }
        candidate = format!("{base}-{suffix}");
        suffix += 1;
    }
}

/// id なしは追加、id ありは同じ商品の行を更新
///
/// SKU を変える既存行は先に一時 SKU へ退避するので、同じ商品内での
/// 入れ替えは一意インデックスに掛からない。
async fn write_variants(
    conn: &mut SqliteConnection,
    product_id: i64,
    variants: &[VariantDraft],
    now_ms: i64,
) -> CatalogResult<()> {
    for variant in variants {
        if let Some(variant_id) = variant.id {
            sqlx::query(
                "UPDATE product_variants SET sku = '~tmp-' || id WHERE id = ? AND product_id = ? AND sku <> ?",
            )
            .bind(variant_id)
            .bind(product_id)
            .bind(&variant.sku)
            .execute(&mut *conn)
            .await?;
        }
    }

    // 追加分は既存バリアントの後ろに並べる
    let mut next_order: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(display_order) + 1, 0) FROM product_variants WHERE product_id = ?",
    )
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;

    for variant in variants {
        let dimensions = variant.dimensions.clone().map(Json);
        match variant.id {
            Some(variant_id) => {
                let result = sqlx::query(r#"
                    UPDATE product_variants SET
                        variant_name = ?, sku = ?, price = ?, sale_price = ?,
                        discount_percentage = ?, weight = ?, weight_unit = ?, dimensions = ?,
                        status = ?, min_order_quantity = ?, max_order_quantity = ?,
                        display_order = COALESCE(?, display_order), updated_at = ?
                    WHERE id = ? AND product_id = ?
                "#)
                .bind(&variant.variant_name)
                .bind(&variant.sku)
                .bind(variant.price)
                .bind(variant.sale_price)
                .bind(variant.discount_percentage)
                .bind(variant.weight)
                .bind(&variant.weight_unit)
                .bind(dimensions)
                .bind(variant.status)
                .bind(variant.min_order_quantity)
                .bind(variant.max_order_quantity)
                .bind(variant.display_order)
                .bind(now_ms)
                .bind(variant_id)
                .bind(product_id)
                .execute(&mut *conn)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(CatalogError::not_found(format!("Variant {variant_id}")));
                }
            }
            None => {
                sqlx::query(r#"
                    INSERT INTO product_variants (
                        product_id, variant_name, sku, price, sale_price, discount_percentage,
                        weight, weight_unit, dimensions, status, min_order_quantity,
                        max_order_quantity, display_order, created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#)
                .bind(product_id)
                .bind(&variant.variant_name)
                .bind(&variant.sku)
                .bind(variant.price)
                .bind(variant.sale_price)
                .bind(variant.discount_percentage)
                .bind(variant.weight)
                .bind(&variant.weight_unit)
                .bind(dimensions)
                .bind(variant.status)
                .bind(variant.min_order_quantity)
                .bind(variant.max_order_quantity)
                .bind(variant.display_order.unwrap_or(next_order))
                .bind(now_ms)
                .bind(now_ms)
                .execute(&mut *conn)
                .await?;
                next_order += 1;
            }
        }
    }
    Ok(())
}

/// 新規画像は既存の末尾に並べる
async fn insert_images(
    conn: &mut SqliteConnection,
    product_id: i64,
    images: &[StoredImage],
    now_ms: i64,
) -> CatalogResult<()> {
    if images.is_empty() {
        return Ok(());
    }
    let next: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(display_order) + 1, 0) FROM product_images WHERE product_id = ?",
    )
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;

    for (offset, image) in images.iter().enumerate() {
        sqlx::query(r#"
            INSERT INTO product_images (product_id, image_path, is_primary, display_order, checksum, created_at)
            VALUES (?, ?, 0, ?, ?, ?)
        "#)
        .bind(product_id)
        .bind(&image.path)
        .bind(next + offset as i64)
        .bind(&image.checksum)
        .bind(now_ms)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// image_order で並び順を振り直し、primary_image_id を唯一の代表画像にする
async fn apply_image_layout(
    conn: &mut SqliteConnection,
    product_id: i64,
    directives: &ImageDirectives,
) -> CatalogResult<()> {
    if !directives.image_order.is_empty() {
        let current: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM product_images WHERE product_id = ? ORDER BY display_order, id",
        )
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

        // 指定順 → 指定外（既存の順序のまま）
        let listed: Vec<i64> = directives
            .image_order
            .iter()
            .filter(|id| current.contains(id))
            .copied()
            .collect();
        let rest = current.iter().filter(|id| !listed.contains(id)).copied();
        let ordered: Vec<i64> = listed.iter().copied().chain(rest).collect();

        for (position, image_id) in ordered.iter().enumerate() {
            sqlx::query("UPDATE product_images SET display_order = ? WHERE id = ?")
                .bind(position as i64)
                .bind(image_id)
                .execute(&mut *conn)
                .await?;
        }
    }

    if let Some(primary_id) = directives.primary_image_id {
        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM product_images WHERE id = ? AND product_id = ?",
        )
        .bind(primary_id)
        .bind(product_id)
        .fetch_one(&mut *conn)
        .await?;

        if exists > 0 {
            sqlx::query(
                "UPDATE product_images SET is_primary = CASE WHEN id = ? THEN 1 ELSE 0 END WHERE product_id = ?",
            )
            .bind(primary_id)
            .bind(product_id)
            .execute(&mut *conn)
            .await?;
        } else {
            warn!("primary_image_id {} is not an image of product {}", primary_id, product_id);
        }
    }

    // 代表画像がなければ先頭の画像を代表にする
    sqlx::query(r#"
        UPDATE product_images SET is_primary = 1
        WHERE id = (
            SELECT id FROM product_images WHERE product_id = ?
            ORDER BY display_order, id LIMIT 1
        )
        AND NOT EXISTS (
            SELECT 1 FROM product_images WHERE product_id = ? AND is_primary = 1
        )
    "#)
    .bind(product_id)
    .bind(product_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// タグの紐付けを丸ごと置き換える
async fn replace_tags(
    conn: &mut SqliteConnection,
    product_id: i64,
    tags: &[String],
) -> CatalogResult<()> {
    sqlx::query("DELETE FROM product_tags WHERE product_id = ?")
        .bind(product_id)
        .execute(&mut *conn)
        .await?;

    for name in tags {
        sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?)")
            .bind(name)
            .execute(&mut *conn)
            .await?;
        let tag: Tag = sqlx::query_as("SELECT id, name FROM tags WHERE name = ? COLLATE NOCASE")
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;
        sqlx::query("INSERT OR IGNORE INTO product_tags (product_id, tag_id) VALUES (?, ?)")
            .bind(product_id)
            .bind(tag.id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// active な商品はカテゴリ・サブカテゴリが active で、active なバリアントを1件以上持つこと
async fn ensure_activatable(conn: &mut SqliteConnection, product_id: i64) -> CatalogResult<()> {
    let (status, category_id, subcategory_id): (Status, i64, i64) =
        sqlx::query_as("SELECT status, category_id, subcategory_id FROM products WHERE id = ?")
            .bind(product_id)
            .fetch_one(&mut *conn)
            .await?;
    if status != Status::Active {
        return Ok(());
    }

    let category: Option<Status> =
        sqlx::query_scalar("SELECT status FROM categories WHERE id = ? AND deleted_at IS NULL")
            .bind(category_id)
            .fetch_optional(&mut *conn)
            .await?;
    if category != Some(Status::Active) {
        warn!("Activation blocked for product {}: category {} inactive", product_id, category_id);
        return Err(CatalogError::Persistence(WriteFailure::CategoryInactive));
    }

    let subcategory: Option<Status> =
        sqlx::query_scalar("SELECT status FROM subcategories WHERE id = ? AND deleted_at IS NULL")
            .bind(subcategory_id)
            .fetch_optional(&mut *conn)
            .await?;
    if subcategory != Some(Status::Active) {
        warn!(
            "Activation blocked for product {}: subcategory {} inactive",
            product_id, subcategory_id
        );
        return Err(CatalogError::Persistence(WriteFailure::SubcategoryInactive));
    }

    let active_variants: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM product_variants WHERE product_id = ? AND status = ?",
    )
    .bind(product_id)
    .bind(Status::Active.as_str())
    .fetch_one(&mut *conn)
    .await?;
    if active_variants == 0 {
        warn!("Activation blocked for product {}: no active variant", product_id);
        return Err(CatalogError::Persistence(WriteFailure::NoActiveVariant));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::{create_draft, seed_catalog, seed_catalog_with_status};
    use crate::db::init_memory_db;

    fn stored(name: &str) -> StoredImage {
        StoredImage {
            path: format!("products/2026/10/{name}.png"),
            checksum: "0".repeat(64),
        }
    }

    async fn create(pool: &DbPool, draft: &ProductDraft, images: &[StoredImage]) -> CatalogResult<WriteOutcome> {
        create_product(
            pool,
            WriteRequest {
                draft,
                plan: &ImagePlan::default(),
                directives: &ImageDirectives::default(),
                new_images: images,
                caller: Some("admin-1"),
            },
        )
        .await
    }

    async fn count(pool: &DbPool, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
    }

    #[tokio::test]
    async fn create_writes_full_aggregate() {
        let pool = init_memory_db().await.unwrap();
        let (cat, sub) = seed_catalog(&pool).await;
        let mut draft = create_draft(cat, sub, "Masala Chai");
        draft.tags = Some(vec!["Tea".to_string(), "Spiced".to_string()]);

        let outcome = create(&pool, &draft, &[stored("a"), stored("b")]).await.unwrap();
        let aggregate = load_aggregate(&pool, outcome.product_id, "http://cdn.test/media")
            .await
            .unwrap();

        assert_eq!(aggregate.product.slug, "masala-chai");
        assert_eq!(aggregate.product.version, 1);
        assert_eq!(aggregate.product.created_by.as_deref(), Some("admin-1"));
        assert_eq!(aggregate.variants.len(), 1);
        assert_eq!(aggregate.tags, vec!["Spiced".to_string(), "Tea".to_string()]);
        assert_eq!(aggregate.images.len(), 2);
        assert!(aggregate.images[0].is_primary);
        assert!(!aggregate.images[1].is_primary);
        assert_eq!(aggregate.images[0].url, "http://cdn.test/media/products/2026/10/a.png");
        assert_eq!(aggregate.category.unwrap().id, cat);
    }

    #[tokio::test]
    async fn derived_slug_gets_numeric_suffix() {
        let pool = init_memory_db().await.unwrap();
        let (cat, sub) = seed_catalog(&pool).await;

        let mut first = create_draft(cat, sub, "Masala Chai");
        let a = create(&pool, &first, &[]).await.unwrap();
        first.variants.as_mut().unwrap()[0].sku = "CHAI-2".to_string();
        let b = create(&pool, &first, &[]).await.unwrap();
        first.variants.as_mut().unwrap()[0].sku = "CHAI-3".to_string();
        let c = create(&pool, &first, &[]).await.unwrap();

        let slug = |id: i64| {
            let pool = pool.clone();
            async move {
                sqlx::query_scalar::<_, String>("SELECT slug FROM products WHERE id = ?")
                    .bind(id)
                    .fetch_one(&pool)
                    .await
                    .unwrap()
            }
        };
        assert_eq!(slug(a.product_id).await, "masala-chai");
        assert_eq!(slug(b.product_id).await, "masala-chai-2");
        assert_eq!(slug(c.product_id).await, "masala-chai-3");
    }

    #[tokio::test]
    async fn inactive_variants_block_activation_and_roll_back() {
        let pool = init_memory_db().await.unwrap();
        let (cat, sub) = seed_catalog(&pool).await;
        let mut draft = create_draft(cat, sub, "Masala Chai");
        draft.variants.as_mut().unwrap()[0].status = Status::Inactive;
        draft.tags = Some(vec!["Tea".to_string()]);

        let err = create(&pool, &draft, &[stored("a")]).await.unwrap_err();
        assert!(matches!(err, CatalogError::Persistence(WriteFailure::NoActiveVariant)));

        assert_eq!(count(&pool, "SELECT COUNT(*) FROM products").await, 0);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM product_variants").await, 0);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM product_images").await, 0);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM product_tags").await, 0);
    }

    #[tokio::test]
    async fn inactive_category_blocks_activation() {
        let pool = init_memory_db().await.unwrap();
        let (cat, sub) = seed_catalog_with_status(&pool, "inactive", "active").await;
        let err = create(&pool, &create_draft(cat, sub, "Masala Chai"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Persistence(WriteFailure::CategoryInactive)));

        let (cat, sub) = seed_catalog_with_status(&pool, "active", "inactive").await;
        let err = create(&pool, &create_draft(cat, sub, "Masala Chai"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Persistence(WriteFailure::SubcategoryInactive)));

        // inactive な商品なら作成できる
        let mut draft = create_draft(cat, sub, "Masala Chai");
        draft.fields.status = Some(Status::Inactive);
        assert!(create(&pool, &draft, &[]).await.is_ok());
    }

    #[tokio::test]
    async fn update_reorders_images_and_moves_primary() {
        let pool = init_memory_db().await.unwrap();
        let (cat, sub) = seed_catalog(&pool).await;
        let draft = create_draft(cat, sub, "Masala Chai");
        let product_id = create(&pool, &draft, &[stored("a"), stored("b"), stored("c")])
            .await
            .unwrap()
            .product_id;
        let before = load_aggregate(&pool, product_id, "").await.unwrap();
        let ids: Vec<i64> = before.images.iter().map(|i| i.id).collect();

        let directives = ImageDirectives {
            image_order: vec![ids[2], ids[0]],
            primary_image_id: Some(ids[2]),
            ..Default::default()
        };
        let plan = ImagePlan {
            delete_ids: [ids[1]].into_iter().collect(),
            keep_ids: [ids[0], ids[2]].into_iter().collect(),
        };
        let outcome = update_product(
            &pool,
            product_id,
            WriteRequest {
                draft: &ProductDraft::default(),
                plan: &plan,
                directives: &directives,
                new_images: &[stored("d")],
                caller: Some("editor-2"),
            },
        )
        .await
        .unwrap();
        assert_eq!(outcome.removed_paths, vec!["products/2026/10/b.png".to_string()]);

        let after = load_aggregate(&pool, product_id, "").await.unwrap();
        let order: Vec<&str> = after.images.iter().map(|i| i.image_path.as_str()).collect();
        assert_eq!(
            order,
            vec!["products/2026/10/c.png", "products/2026/10/a.png", "products/2026/10/d.png"]
        );
        let primaries: Vec<i64> = after.images.iter().filter(|i| i.is_primary).map(|i| i.id).collect();
        assert_eq!(primaries, vec![ids[2]]);
        assert_eq!(after.product.version, 2);
        assert_eq!(after.product.updated_by.as_deref(), Some("editor-2"));
        assert_eq!(after.product.name, "Masala Chai");
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let pool = init_memory_db().await.unwrap();
        let (cat, sub) = seed_catalog(&pool).await;
        let product_id = create(&pool, &create_draft(cat, sub, "Masala Chai"), &[])
            .await
            .unwrap()
            .product_id;

        let mut draft = ProductDraft::default();
        draft.fields.name = Some("Ginger Chai".to_string());
        draft.expected_version = Some(7);
        let err = update_product(
            &pool,
            product_id,
            WriteRequest {
                draft: &draft,
                plan: &ImagePlan::default(),
                directives: &ImageDirectives::default(),
                new_images: &[],
                caller: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CatalogError::Persistence(WriteFailure::StaleVersion)));

        let name: String = sqlx::query_scalar("SELECT name FROM products WHERE id = ?")
            .bind(product_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(name, "Masala Chai");
    }

    #[tokio::test]
    async fn purge_requires_soft_delete_first() {
        let pool = init_memory_db().await.unwrap();
        let (cat, sub) = seed_catalog(&pool).await;
        let product_id = create(&pool, &create_draft(cat, sub, "Masala Chai"), &[stored("a")])
            .await
            .unwrap()
            .product_id;

        assert!(matches!(
            purge_product(&pool, product_id).await,
            Err(CatalogError::Conflict { .. })
        ));

        soft_delete_product(&pool, product_id, Some("admin-1")).await.unwrap();
        assert!(matches!(
            load_aggregate(&pool, product_id, "").await,
            Err(CatalogError::NotFound(_))
        ));
        assert!(matches!(
            soft_delete_product(&pool, product_id, None).await,
            Err(CatalogError::NotFound(_))
        ));

        let paths = purge_product(&pool, product_id).await.unwrap();
        assert_eq!(paths, vec!["products/2026/10/a.png".to_string()]);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM product_variants").await, 0);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM products").await, 0);
    }
}
