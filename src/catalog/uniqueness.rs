//! Uniqueness / reference checks
//! 送信内容どうし、および保存済みデータとの突き合わせ（読み取りのみ）

use sqlx::{QueryBuilder, Sqlite};
use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::db::DbPool;
use crate::error::{CatalogError, FieldErrors};
use crate::models::{Category, ImageDirectives, ProductDraft, Subcategory, VariantDraft};

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// 送信されたバリアント内で variant_name / sku の重複を検出する
///
/// 1 回の走査で見つかった重複はすべて報告する。
pub fn check_variant_uniqueness(variants: &[VariantDraft]) -> Result<(), CatalogError> {
    let mut errors = FieldErrors::new();
    let mut names: HashMap<String, usize> = HashMap::new();
    let mut skus: HashMap<String, usize> = HashMap::new();

    for (i, variant) in variants.iter().enumerate() {
        for (field, value, seen) in [
            ("variant_name", &variant.variant_name, &mut names),
            ("sku", &variant.sku, &mut skus),
        ] {
            let key = normalize(value);
            match seen.get(&key) {
                Some(&first) => errors.push(
                    format!("variants.{i}.{field}"),
                    format!(
                        "variant #{}: duplicate {field} '{value}' (same as variant #{})",
                        i + 1,
                        first + 1
                    ),
                ),
                None => {
                    seen.insert(key, i);
                }
            }
        }
    }

    errors.into_result()
}

/// 保存済みバリアントとの SKU 衝突チェック
///
/// 作成時 (`exclude_product_id = None`) は全 SKU を、更新時は id を持たない
/// バリアントだけを、対象商品以外の行と突き合わせる。
pub async fn check_sku_availability(
    pool: &DbPool,
    variants: &[VariantDraft],
    exclude_product_id: Option<i64>,
) -> Result<(), CatalogError> {
    let candidates: Vec<(usize, &VariantDraft)> = variants
        .iter()
        .enumerate()
        .filter(|(_, v)| exclude_product_id.is_none() || v.id.is_none())
        .collect();
    if candidates.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Sqlite>::new("SELECT sku FROM product_variants WHERE lower(sku) IN (");
    let mut sep = qb.separated(", ");
    for (_, variant) in &candidates {
        sep.push_bind(normalize(&variant.sku));
    }
    sep.push_unseparated(")");
    if let Some(product_id) = exclude_product_id {
        qb.push(" AND product_id != ").push_bind(product_id);
    }

    let taken: HashSet<String> = qb
        .build_query_as::<(String,)>()
        .fetch_all(pool)
        .await?
        .iter()
        .map(|(sku,)| normalize(sku))
        .collect();

    let mut errors = FieldErrors::new();
    for (i, variant) in candidates {
        if taken.contains(&normalize(&variant.sku)) {
            errors.push(
                format!("variants.{i}.sku"),
                format!("variant #{}: sku '{}' is already in use", i + 1, variant.sku),
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        warn!("SKU collision: {} variant(s) already in use", errors.len());
        Err(CatalogError::conflict("One or more SKUs are already in use", errors))
    }
}

/// 明示指定されたスラッグが他の商品と衝突していないか
pub async fn check_slug_availability(
    pool: &DbPool,
    slug: &str,
    exclude_product_id: Option<i64>,
) -> Result<(), CatalogError> {
    let owner: Option<i64> = sqlx::query_scalar("SELECT id FROM products WHERE slug = ?")
        .bind(slug)
        .fetch_optional(pool)
        .await?;

    match owner {
        Some(id) if Some(id) != exclude_product_id => Err(CatalogError::conflict(
            format!("Slug '{slug}' is already in use"),
            FieldErrors::single("slug", format!("slug '{slug}' is already in use")),
        )),
        _ => Ok(()),
    }
}

/// カテゴリ・サブカテゴリの存在と親子関係を確認する
pub async fn check_references(
    pool: &DbPool,
    category_id: i64,
    subcategory_id: i64,
) -> Result<(), CatalogError> {
    let category: Option<Category> =
        sqlx::query_as("SELECT * FROM categories WHERE id = ? AND deleted_at IS NULL")
            .bind(category_id)
            .fetch_optional(pool)
            .await?;
    if category.is_none() {
        return Err(CatalogError::not_found(format!("Category {category_id}")));
    }

    let subcategory: Option<Subcategory> =
        sqlx::query_as("SELECT * FROM subcategories WHERE id = ? AND deleted_at IS NULL")
            .bind(subcategory_id)
            .fetch_optional(pool)
            .await?;

    match subcategory {
        Some(sub) if sub.category_id == category_id => Ok(()),
        _ => Err(CatalogError::not_found(format!(
            "Subcategory {subcategory_id} in category {category_id}"
        ))),
    }
}

/// 更新リクエストが参照する variant / image の id がこの商品のものか確認する
pub async fn check_ownership(
    pool: &DbPool,
    product_id: i64,
    draft: &ProductDraft,
    directives: &ImageDirectives,
) -> Result<(), CatalogError> {
    let variant_ids: HashSet<i64> =
        sqlx::query_scalar::<_, i64>("SELECT id FROM product_variants WHERE product_id = ?")
            .bind(product_id)
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect();
    let image_ids: HashSet<i64> =
        sqlx::query_scalar::<_, i64>("SELECT id FROM product_images WHERE product_id = ?")
            .bind(product_id)
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect();

    let mut errors = FieldErrors::new();

    for (i, variant) in draft.variants.iter().flatten().enumerate() {
        if let Some(id) = variant.id {
            if !variant_ids.contains(&id) {
                errors.push(
                    format!("variants.{i}.id"),
                    format!("variant #{}: variant {id} does not belong to this product", i + 1),
                );
            }
        }
    }

    let foreign = |field: &str, ids: &[i64], owned: &HashSet<i64>, errors: &mut FieldErrors| {
        for id in ids.iter().filter(|id| !owned.contains(id)) {
            errors.push(field, format!("{id} does not belong to this product"));
        }
    };
    foreign("delete_variant_ids", &draft.delete_variant_ids, &variant_ids, &mut errors);
    foreign("image_ids", &directives.image_ids, &image_ids, &mut errors);
    foreign("image_order", &directives.image_order, &image_ids, &mut errors);
    foreign("delete_image_ids", &directives.delete_image_ids, &image_ids, &mut errors);

    if !errors.is_empty() {
        warn!("Ownership check failed for product {}: {:?}", product_id, errors);
    }
    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::{draft_variant, seed_catalog, seed_image, seed_product, seed_variant};
    use crate::db::init_memory_db;

    #[test]
    fn reports_every_duplicate_in_one_pass() {
        let variants = vec![
            draft_variant("250g", "CHAI-250"),
            draft_variant("500g", "chai-250 "),
            draft_variant("250G", "CHAI-1KG"),
            draft_variant("1kg", "CHAI-1kg"),
        ];
        let err = check_variant_uniqueness(&variants).unwrap_err();
        let CatalogError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.contains_field("variants.1.sku"));
        assert!(errors.contains_field("variants.2.variant_name"));
        assert!(errors.contains_field("variants.3.sku"));
        assert_eq!(errors.len(), 3);
        assert!(errors.messages().any(|m| m.contains("'chai-250 '") && m.contains("variant #1")));
    }

    #[tokio::test]
    async fn create_path_reports_all_taken_skus() {
        let pool = init_memory_db().await.unwrap();
        let (cat, sub) = seed_catalog(&pool).await;
        let product = seed_product(&pool, cat, sub, "Tea", "tea").await;
        seed_variant(&pool, product, "TEA-1", "active").await;
        seed_variant(&pool, product, "TEA-2", "active").await;

        let variants = vec![
            draft_variant("a", "tea-1"),
            draft_variant("b", "TEA-2"),
            draft_variant("c", "TEA-3"),
        ];
        let err = check_sku_availability(&pool, &variants, None).await.unwrap_err();
        let errors = err.field_errors().unwrap();
        assert!(errors.contains_field("variants.0.sku"));
        assert!(errors.contains_field("variants.1.sku"));
        assert!(!errors.contains_field("variants.2.sku"));
        assert!(errors.messages().all(|m| m.contains("already in use")));
    }

    #[tokio::test]
    async fn update_path_checks_only_new_variants_of_other_products() {
        let pool = init_memory_db().await.unwrap();
        let (cat, sub) = seed_catalog(&pool).await;
        let own = seed_product(&pool, cat, sub, "Tea", "tea").await;
        let other = seed_product(&pool, cat, sub, "Coffee", "coffee").await;
        let own_variant = seed_variant(&pool, own, "TEA-1", "active").await;
        seed_variant(&pool, other, "COF-1", "active").await;

        let mut existing = draft_variant("a", "TEA-1");
        existing.id = Some(own_variant);
        let renamed_new = draft_variant("b", "TEA-1-NEW");
        assert!(check_sku_availability(&pool, &[existing.clone(), renamed_new], Some(own))
            .await
            .is_ok());

        // 自分の商品の SKU を新規バリアントで再利用するのは許可
        let reuse_own = draft_variant("c", "tea-1");
        assert!(check_sku_availability(&pool, &[reuse_own], Some(own)).await.is_ok());

        let steal = draft_variant("d", "COF-1");
        assert!(matches!(
            check_sku_availability(&pool, &[existing, steal], Some(own)).await,
            Err(CatalogError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn references_must_exist_and_match() {
        let pool = init_memory_db().await.unwrap();
        let (cat, sub) = seed_catalog(&pool).await;
        let (other_cat, other_sub) = seed_catalog(&pool).await;

        assert!(check_references(&pool, cat, sub).await.is_ok());
        assert!(matches!(
            check_references(&pool, cat, other_sub).await,
            Err(CatalogError::NotFound(_))
        ));
        assert!(matches!(
            check_references(&pool, 999, sub).await,
            Err(CatalogError::NotFound(_))
        ));
        assert!(check_references(&pool, other_cat, other_sub).await.is_ok());
    }

    #[tokio::test]
    async fn explicit_slug_collision_is_conflict() {
        let pool = init_memory_db().await.unwrap();
        let (cat, sub) = seed_catalog(&pool).await;
        let tea = seed_product(&pool, cat, sub, "Tea", "tea").await;

        assert!(check_slug_availability(&pool, "tea", Some(tea)).await.is_ok());
        assert!(check_slug_availability(&pool, "coffee", None).await.is_ok());
        assert!(matches!(
            check_slug_availability(&pool, "tea", None).await,
            Err(CatalogError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn foreign_ids_are_rejected() {
        let pool = init_memory_db().await.unwrap();
        let (cat, sub) = seed_catalog(&pool).await;
        let own = seed_product(&pool, cat, sub, "Tea", "tea").await;
        let other = seed_product(&pool, cat, sub, "Coffee", "coffee").await;
        let own_variant = seed_variant(&pool, own, "TEA-1", "active").await;
        let other_variant = seed_variant(&pool, other, "COF-1", "active").await;
        let own_image = seed_image(&pool, own, "products/a.png", true, 0).await;
        let other_image = seed_image(&pool, other, "products/b.png", true, 0).await;

        let mut mine = draft_variant("a", "TEA-1");
        mine.id = Some(own_variant);
        let mut theirs = draft_variant("b", "COF-1");
        theirs.id = Some(other_variant);

        let draft = ProductDraft {
            variants: Some(vec![mine.clone()]),
            ..Default::default()
        };
        let directives = ImageDirectives {
            image_order: vec![own_image],
            ..Default::default()
        };
        assert!(check_ownership(&pool, own, &draft, &directives).await.is_ok());

        let draft = ProductDraft {
            variants: Some(vec![mine, theirs]),
            delete_variant_ids: vec![other_variant],
            ..Default::default()
        };
        let directives = ImageDirectives {
            delete_image_ids: vec![other_image],
            ..Default::default()
        };
        let err = check_ownership(&pool, own, &draft, &directives).await.unwrap_err();
        let errors = err.field_errors().unwrap();
        assert!(errors.contains_field("variants.1.id"));
        assert!(errors.contains_field("delete_variant_ids"));
        assert!(errors.contains_field("delete_image_ids"));
    }
}
