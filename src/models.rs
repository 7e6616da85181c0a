//! Data Models
//! Product, Variant, Image, Tag などのデータ構造定義

use serde::{Deserialize, Serialize};
use sqlx::types::Json;

// ========================================
// Enums
// ========================================

/// 商品・バリアント共通のステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Status {
    Active,
    Inactive,
}

impl Status {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ProductType {
    Global,
    Local,
    Takeaway,
}

impl ProductType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "global" => Some(Self::Global),
            "local" => Some(Self::Local),
            "takeaway" => Some(Self::Takeaway),
            _ => None,
        }
    }
}

/// 外形寸法
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default = "default_dimension_unit")]
    pub unit: String,
}

fn default_dimension_unit() -> String { "cm".to_string() }

// ========================================
// Category / Subcategory (参照のみ)
// ========================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub status: Status,
    pub deleted_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subcategory {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    pub status: Status,
    pub deleted_at: Option<i64>,
}

/// レスポンス用の簡易表示
#[derive(Debug, Clone, Serialize)]
pub struct CatalogSummary {
    pub id: i64,
    pub name: String,
    pub status: Status,
}

// ========================================
// Product
// ========================================

/// Product (DB row)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub category_id: i64,
    pub subcategory_id: i64,
    pub status: Status,
    pub product_type: ProductType,
    pub tax_rate: Option<f64>,
    pub cgst_rate: Option<f64>,
    pub sgst_rate: Option<f64>,
    pub igst_rate: Option<f64>,
    pub is_vegetarian: bool,
    pub display_order: i64,
    pub version: i64,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
    pub deleted_by: Option<String>,
}

/// Variant (DB row)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Variant {
    pub id: i64,
    pub product_id: i64,
    pub variant_name: String,
    pub sku: String,
    pub price: f64,
    pub sale_price: Option<f64>,
    pub discount_percentage: Option<f64>,
    pub weight: Option<f64>,
    pub weight_unit: Option<String>,
    pub dimensions: Option<Json<Dimensions>>,
    pub status: Status,
    pub min_order_quantity: Option<i64>,
    pub max_order_quantity: Option<i64>,
    pub display_order: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Image (DB row)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductImage {
    pub id: i64,
    pub product_id: i64,
    pub image_path: String,
    pub is_primary: bool,
    pub display_order: i64,
    pub checksum: Option<String>,
    pub created_at: i64,
}

/// Tag (DB row)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

// ========================================
// Draft（検証済み入力）
// ========================================

/// 商品本体の入力値。None は「指定なし」（更新時は既存値を保持）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFields {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub status: Option<Status>,
    pub product_type: Option<ProductType>,
    pub tax_rate: Option<f64>,
    pub cgst_rate: Option<f64>,
    pub sgst_rate: Option<f64>,
    pub igst_rate: Option<f64>,
    pub is_vegetarian: Option<bool>,
    pub display_order: Option<i64>,
}

/// バリアントの入力値。id があれば既存行の更新
#[derive(Debug, Clone, PartialEq)]
pub struct VariantDraft {
    pub id: Option<i64>,
    pub variant_name: String,
    pub sku: String,
    pub price: f64,
    pub sale_price: Option<f64>,
    pub discount_percentage: Option<f64>,
    pub weight: Option<f64>,
    pub weight_unit: Option<String>,
    pub dimensions: Option<Dimensions>,
    pub status: Status,
    pub min_order_quantity: Option<i64>,
    pub max_order_quantity: Option<i64>,
    pub display_order: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductDraft {
    pub fields: ProductFields,
    /// None = variants フィールド自体が省略された
    pub variants: Option<Vec<VariantDraft>>,
    pub delete_variant_ids: Vec<i64>,
    /// None = tags 省略（既存の紐付けを保持）
    pub tags: Option<Vec<String>>,
    pub expected_version: Option<i64>,
}

/// 画像に関する指示（UpdateRequest の画像部分）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageDirectives {
    pub image_ids: Vec<i64>,
    pub image_order: Vec<i64>,
    pub primary_image_id: Option<i64>,
    pub keep_existing_images: bool,
    pub delete_all_images: bool,
    pub delete_image_ids: Vec<i64>,
}

/// アップロードされた画像ファイル
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    /// 受信時のエラー（空ファイル・非対応形式など）
    pub error: Option<String>,
}

impl UploadedImage {
    pub fn is_usable(&self) -> bool {
        self.error.is_none() && !self.bytes.is_empty()
    }
}

/// 保存済みの新規画像（トランザクション前にファイル書き込み済み）
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub path: String,
    pub checksum: String,
}

// ========================================
// Response
// ========================================

#[derive(Debug, Clone, Serialize)]
pub struct ImageResponse {
    pub id: i64,
    pub image_path: String,
    pub url: String,
    pub is_primary: bool,
    pub display_order: i64,
}

impl ImageResponse {
    pub fn from_image(image: &ProductImage, base_url: &str) -> Self {
        Self {
            id: image.id,
            image_path: image.image_path.clone(),
            url: format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                image.image_path.trim_start_matches('/')
            ),
            is_primary: image.is_primary,
            display_order: image.display_order,
        }
    }
}

/// 商品集約（レスポンス用に再構築したもの）
#[derive(Debug, Clone, Serialize)]
pub struct ProductAggregate {
    #[serde(flatten)]
    pub product: Product,
    pub variants: Vec<Variant>,
    pub images: Vec<ImageResponse>,
    pub tags: Vec<String>,
    pub category: Option<CatalogSummary>,
    pub subcategory: Option<CatalogSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_url_joins_base_and_path() {
        let image = ProductImage {
            id: 1,
            product_id: 7,
            image_path: "/products/7/abc.jpg".to_string(),
            is_primary: true,
            display_order: 0,
            checksum: None,
            created_at: 0,
        };
        let resp = ImageResponse::from_image(&image, "https://cdn.example.com/media/");
        assert_eq!(resp.url, "https://cdn.example.com/media/products/7/abc.jpg");
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(Status::parse(" Active "), Some(Status::Active));
        assert_eq!(Status::parse("draft"), None);
        assert_eq!(ProductType::parse("TAKEAWAY"), Some(ProductType::Takeaway));
    }
}
