//! Field validation
//! 入力の構造・値の検査（I/O なし）。エラーはフィールド単位でまとめて返す

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use super::payload::{ProductPayload, VariantPayload};
use crate::error::{CatalogError, FieldErrors};
use crate::models::{ProductDraft, ProductFields, ProductType, Status, VariantDraft};

const NAME_MIN: usize = 3;
const NAME_MAX: usize = 255;
const SKU_MAX: usize = 50;
const TAG_MAX: usize = 50;
const SHORT_DESCRIPTION_LIMIT: usize = 500;
const WEIGHT_UNIT_MAX: usize = 20;

/// 作成か更新か（更新時は省略フィールドを既存値のまま残す）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Create,
    Update,
}

/// 入力を検査して ProductDraft に変換する
pub fn validate(payload: &ProductPayload, mode: ValidationMode) -> Result<ProductDraft, CatalogError> {
    let mut errors = FieldErrors::new();

    let fields = validate_fields(payload, mode, &mut errors);

    let variants = match (&payload.variants, mode) {
        (None, ValidationMode::Create) => {
            errors.push("variants", "at least one variant is required");
            None
        }
        (Some(items), ValidationMode::Create) if items.is_empty() => {
            errors.push("variants", "at least one variant is required");
            None
        }
        (None, ValidationMode::Update) => None,
        (Some(items), _) => Some(
            items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| validate_variant(i, item, mode, &mut errors))
                .collect::<Vec<_>>(),
        ),
    };

    if mode == ValidationMode::Create && !payload.delete_variant_ids.is_empty() {
        errors.push("delete_variant_ids", "delete_variant_ids is not allowed when creating");
    }
    if let Some(items) = &payload.variants {
        for (i, item) in items.iter().enumerate() {
            if let Some(id) = item.id {
                if payload.delete_variant_ids.contains(&id) {
                    errors.push(
                        format!("variants.{i}.id"),
                        format!("variant #{}: variant {id} is also listed for deletion", i + 1),
                    );
                }
            }
        }
    }

    let tags = payload
        .tags
        .as_ref()
        .map(|tags| normalize_tags(tags, &mut errors));

    if let Some(version) = payload.version {
        if version < 1 {
            errors.push("version", "version must be a positive integer");
        }
    }

    errors.into_result()?;

    Ok(ProductDraft {
        fields,
        variants,
        delete_variant_ids: payload.delete_variant_ids.clone(),
        tags,
        expected_version: payload.version,
    })
}

fn validate_fields(
    payload: &ProductPayload,
    mode: ValidationMode,
    errors: &mut FieldErrors,
) -> ProductFields {
    if mode == ValidationMode::Create {
        let required = [
            ("name", payload.name.is_some()),
            ("category_id", payload.category_id.is_some()),
            ("subcategory_id", payload.subcategory_id.is_some()),
            ("status", payload.status.is_some()),
            ("product_type", payload.product_type.is_some()),
        ];
        for (field, present) in required {
            if !present {
                errors.push(field, format!("{field} is required"));
            }
        }
    }

    if let Some(name) = &payload.name {
        check_name(name, errors);
    }

    if let Some(slug) = &payload.slug {
        if slug.len() > NAME_MAX || !slug_pattern().is_match(slug) {
            errors.push("slug", "slug may only contain lower-case letters, digits and single hyphens");
        }
    }

    if let Some(short) = &payload.short_description {
        if short.chars().count() > SHORT_DESCRIPTION_LIMIT {
            errors.push(
                "short_description",
                format!("short_description must not exceed {SHORT_DESCRIPTION_LIMIT} characters"),
            );
        }
    }

    for (field, id) in [
        ("category_id", payload.category_id),
        ("subcategory_id", payload.subcategory_id),
    ] {
        if matches!(id, Some(id) if id < 1) {
            errors.push(field, format!("{field} must be a positive id"));
        }
    }

    let status = payload.status.as_deref().and_then(|raw| {
        let parsed = Status::parse(raw);
        if parsed.is_none() {
            errors.push("status", "status must be one of: active, inactive");
        }
        parsed
    });

    let product_type = payload.product_type.as_deref().and_then(|raw| {
        let parsed = ProductType::parse(raw);
        if parsed.is_none() {
            errors.push("product_type", "product_type must be one of: global, local, takeaway");
        }
        parsed
    });

    for (field, rate) in [
        ("tax_rate", payload.tax_rate),
        ("cgst_rate", payload.cgst_rate),
        ("sgst_rate", payload.sgst_rate),
        ("igst_rate", payload.igst_rate),
    ] {
        if matches!(rate, Some(r) if !(0.0..=100.0).contains(&r)) {
            errors.push(field, format!("{field} must be between 0 and 100"));
        }
    }

    if matches!(payload.display_order, Some(o) if o < 0) {
        errors.push("display_order", "display_order must not be negative");
    }

    ProductFields {
        name: payload.name.clone(),
        slug: payload.slug.clone(),
        description: payload.description.clone(),
        short_description: payload.short_description.clone(),
        category_id: payload.category_id,
        subcategory_id: payload.subcategory_id,
        status,
        product_type,
        tax_rate: payload.tax_rate,
        cgst_rate: payload.cgst_rate,
        sgst_rate: payload.sgst_rate,
        igst_rate: payload.igst_rate,
        is_vegetarian: payload.is_vegetarian,
        display_order: payload.display_order,
    }
}

fn check_name(name: &str, errors: &mut FieldErrors) {
    let len = name.chars().count();
    if !(NAME_MIN..=NAME_MAX).contains(&len) {
        errors.push(
            "name",
            format!("name must be between {NAME_MIN} and {NAME_MAX} characters"),
        );
    }
    if name.contains(['<', '>', '{', '}']) {
        errors.push("name", "name must not contain <, >, { or }");
    }
}

/// バリアント1件の検査。必須項目が欠けていれば None
fn validate_variant(
    index: usize,
    item: &VariantPayload,
    mode: ValidationMode,
    errors: &mut FieldErrors,
) -> Option<VariantDraft> {
    let before = errors.len();
    let mut fail = |field: &str, message: String| {
        errors.push(
            format!("variants.{index}.{field}"),
            format!("variant #{}: {}", index + 1, message),
        );
    };

    if mode == ValidationMode::Create && item.id.is_some() {
        fail("id", "id is not allowed when creating".to_string());
    }
    if matches!(item.id, Some(id) if id < 1) {
        fail("id", "id must be a positive integer".to_string());
    }

    match &item.variant_name {
        None => fail("variant_name", "variant_name is required".to_string()),
        Some(name) if name.chars().count() > NAME_MAX => fail(
            "variant_name",
            format!("variant_name must not exceed {NAME_MAX} characters"),
        ),
        Some(_) => {}
    }

    match &item.sku {
        None => fail("sku", "sku is required".to_string()),
        Some(sku) => {
            if sku.len() > SKU_MAX {
                fail("sku", format!("sku must not exceed {SKU_MAX} characters"));
            }
            if !sku_pattern().is_match(sku) {
                fail(
                    "sku",
                    "sku may only contain letters, digits, '_', '-' and '.'".to_string(),
                );
            }
        }
    }

    match item.price {
        None => fail("price", "price is required".to_string()),
        Some(p) if p <= 0.0 => fail("price", "price must be greater than 0".to_string()),
        Some(_) => {}
    }

    if let Some(sale) = item.sale_price {
        if sale < 0.0 {
            fail("sale_price", "sale_price must not be negative".to_string());
        } else if matches!(item.price, Some(price) if sale > price) {
            fail(
                "sale_price",
                "sale_price must be less than or equal to price".to_string(),
            );
        }
    }

    if matches!(item.discount_percentage, Some(d) if !(0.0..=100.0).contains(&d)) {
        fail(
            "discount_percentage",
            "discount_percentage must be between 0 and 100".to_string(),
        );
    }

    if matches!(item.weight, Some(w) if w <= 0.0) {
        fail("weight", "weight must be greater than 0".to_string());
    }
    if matches!(&item.weight_unit, Some(u) if u.len() > WEIGHT_UNIT_MAX) {
        fail(
            "weight_unit",
            format!("weight_unit must not exceed {WEIGHT_UNIT_MAX} characters"),
        );
    }

    if let Some(dims) = &item.dimensions {
        if dims.length <= 0.0 || dims.width <= 0.0 || dims.height <= 0.0 {
            fail(
                "dimensions",
                "dimensions must be greater than 0".to_string(),
            );
        }
    }

    let status = match item.status.as_deref() {
        None => {
            fail("status", "status is required".to_string());
            None
        }
        Some(raw) => {
            let parsed = Status::parse(raw);
            if parsed.is_none() {
                fail("status", "status must be one of: active, inactive".to_string());
            }
            parsed
        }
    };

    if matches!(item.min_order_quantity, Some(q) if q < 1) {
        fail(
            "min_order_quantity",
            "min_order_quantity must be at least 1".to_string(),
        );
    }
    if let (Some(min), Some(max)) = (item.min_order_quantity, item.max_order_quantity) {
        if max < min {
            fail(
                "max_order_quantity",
                "max_order_quantity must be greater than or equal to min_order_quantity"
                    .to_string(),
            );
        }
    } else if matches!(item.max_order_quantity, Some(q) if q < 1) {
        fail(
            "max_order_quantity",
            "max_order_quantity must be at least 1".to_string(),
        );
    }

    if matches!(item.display_order, Some(o) if o < 0) {
        fail("display_order", "display_order must not be negative".to_string());
    }

    if errors.len() > before {
        return None;
    }

    Some(VariantDraft {
        id: item.id,
        variant_name: item.variant_name.clone()?,
        sku: item.sku.clone()?,
        price: item.price?,
        sale_price: item.sale_price,
        discount_percentage: item.discount_percentage,
        weight: item.weight,
        weight_unit: item.weight_unit.clone(),
        dimensions: item.dimensions.clone(),
        status: status?,
        min_order_quantity: item.min_order_quantity,
        max_order_quantity: item.max_order_quantity,
        display_order: item.display_order,
    })
}

/// 空要素を除き、大文字小文字を無視して重複を取り除く（先勝ち）
fn normalize_tags(tags: &[String], errors: &mut FieldErrors) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        if tag.chars().count() > TAG_MAX {
            errors.push("tags", format!("tag '{tag}' must not exceed {TAG_MAX} characters"));
            continue;
        }
        if seen.insert(tag.to_lowercase()) {
            out.push(tag.to_string());
        }
    }
    out
}

fn sku_pattern() -> &'static Regex {
    static SKU: OnceLock<Regex> = OnceLock::new();
    SKU.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("valid sku regex"))
}

fn slug_pattern() -> &'static Regex {
    static SLUG: OnceLock<Regex> = OnceLock::new();
    SLUG.get_or_init(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("valid slug regex"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> ProductPayload {
        ProductPayload::from_value(&value).unwrap()
    }

    fn create_payload() -> serde_json::Value {
        json!({
            "name": "Masala Chai",
            "category_id": 1,
            "subcategory_id": 2,
            "status": "active",
            "product_type": "global",
            "tags": ["Tea", " tea ", "", "Spiced"],
            "variants": [
                {"variant_name": "250g", "sku": "CHAI-250", "price": 120, "status": "active"},
                {"variant_name": "500g", "sku": "CHAI-500", "price": 220, "sale_price": 200, "status": "inactive"}
            ]
        })
    }

    fn field_errors(err: CatalogError) -> FieldErrors {
        match err {
            CatalogError::Validation(errors) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_create_payload_becomes_draft() {
        let draft = validate(&payload(create_payload()), ValidationMode::Create).unwrap();

        assert_eq!(draft.fields.status, Some(Status::Active));
        assert_eq!(draft.fields.product_type, Some(ProductType::Global));
        assert_eq!(draft.variants.as_ref().unwrap().len(), 2);
        assert_eq!(draft.tags, Some(vec!["Tea".to_string(), "Spiced".to_string()]));
    }

    #[test]
    fn create_requires_core_fields() {
        let errors = field_errors(validate(&payload(json!({})), ValidationMode::Create).unwrap_err());
        for field in ["name", "category_id", "subcategory_id", "status", "product_type", "variants"] {
            assert!(errors.contains_field(field), "missing error for {field}");
        }
    }

    #[test]
    fn update_accepts_partial_payload() {
        let draft = validate(&payload(json!({"tax_rate": 5})), ValidationMode::Update).unwrap();
        assert_eq!(draft.fields.tax_rate, Some(5.0));
        assert!(draft.fields.name.is_none());
        assert!(draft.variants.is_none());
        assert!(draft.tags.is_none());
    }

    #[test]
    fn rejects_bad_name_and_product_type() {
        let mut value = create_payload();
        value["name"] = json!("<b>");
        value["product_type"] = json!("digital");
        let errors = field_errors(validate(&payload(value), ValidationMode::Create).unwrap_err());
        assert!(errors.contains_field("name"));
        assert!(errors.contains_field("product_type"));
    }

    #[test]
    fn sale_price_above_price_names_variant_index() {
        let mut value = create_payload();
        value["variants"][1]["sale_price"] = json!(500);
        let errors = field_errors(validate(&payload(value), ValidationMode::Create).unwrap_err());
        assert!(errors.contains_field("variants.1.sale_price"));
        assert!(errors.messages().any(|m| m.starts_with("variant #2:")));
    }

    #[test]
    fn sku_format_and_length_are_checked() {
        let mut value = create_payload();
        value["variants"][0]["sku"] = json!("CHAI 250");
        value["variants"][1]["sku"] = json!("X".repeat(51));
        let errors = field_errors(validate(&payload(value), ValidationMode::Create).unwrap_err());
        assert!(errors.contains_field("variants.0.sku"));
        assert!(errors.contains_field("variants.1.sku"));
    }

    #[test]
    fn variant_requires_name_sku_price_status() {
        let mut value = create_payload();
        value["variants"] = json!([{"price": 0}]);
        let errors = field_errors(validate(&payload(value), ValidationMode::Create).unwrap_err());
        for field in ["variant_name", "sku", "price", "status"] {
            assert!(errors.contains_field(&format!("variants.0.{field}")));
        }
    }

    #[test]
    fn variant_cannot_be_updated_and_deleted_together() {
        let value = json!({
            "variants": [{"id": 4, "variant_name": "1kg", "sku": "A-1", "price": 10, "status": "active"}],
            "delete_variant_ids": [4]
        });
        let errors = field_errors(validate(&payload(value), ValidationMode::Update).unwrap_err());
        assert!(errors.contains_field("variants.0.id"));
    }

    #[test]
    fn order_quantities_must_be_consistent() {
        let mut value = create_payload();
        value["variants"][0]["min_order_quantity"] = json!(5);
        value["variants"][0]["max_order_quantity"] = json!(2);
        let errors = field_errors(validate(&payload(value), ValidationMode::Create).unwrap_err());
        assert!(errors.contains_field("variants.0.max_order_quantity"));
    }
}
