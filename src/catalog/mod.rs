//! Product catalog
//! 商品集約（商品・バリアント・画像・タグ）の作成・更新

pub mod derived;
pub mod images;
pub mod payload;
pub mod service;
pub mod uniqueness;
pub mod validator;
pub mod writer;

pub use payload::{form_fields_to_value, ProductPayload};
pub use service::ProductCatalogService;
