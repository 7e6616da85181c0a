//! Payload normalization
//!
//! Clients send product payloads either as JSON or as multipart form fields.
//! List-valued fields (variants, tags, id lists) may arrive as native arrays
//! or as JSON-encoded strings, and scalars may arrive as strings. Everything
//! is decoded here into [`ProductPayload`] so the rest of the catalog only
//! sees typed values.

use serde_json::{Map, Value};

use crate::error::{CatalogError, FieldErrors};
use crate::models::{Dimensions, ImageDirectives};

/// 型だけ揃えた入力（値の妥当性は validator で検査）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductPayload {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub category_id: Option<i64>,
    pub subcategory_id: Option<i64>,
    pub status: Option<String>,
    pub product_type: Option<String>,
    pub tax_rate: Option<f64>,
    pub cgst_rate: Option<f64>,
    pub sgst_rate: Option<f64>,
    pub igst_rate: Option<f64>,
    pub is_vegetarian: Option<bool>,
    pub display_order: Option<i64>,
    pub variants: Option<Vec<VariantPayload>>,
    pub delete_variant_ids: Vec<i64>,
    pub tags: Option<Vec<String>>,
    pub version: Option<i64>,
    pub images: ImageDirectives,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantPayload {
    pub id: Option<i64>,
    pub variant_name: Option<String>,
    pub sku: Option<String>,
    pub price: Option<f64>,
    pub sale_price: Option<f64>,
    pub discount_percentage: Option<f64>,
    pub weight: Option<f64>,
    pub weight_unit: Option<String>,
    pub dimensions: Option<Dimensions>,
    pub status: Option<String>,
    pub min_order_quantity: Option<i64>,
    pub max_order_quantity: Option<i64>,
    pub display_order: Option<i64>,
}

impl ProductPayload {
    /// JSON 値から入力を組み立てる。型が合わないフィールドはまとめてエラー
    pub fn from_value(value: &Value) -> Result<Self, CatalogError> {
        let obj = value
            .as_object()
            .ok_or_else(|| CatalogError::validation("payload", "payload must be an object"))?;

        let mut d = Decoder::default();
        let variants = d.list(obj, "variants").map(|items| {
            items
                .iter()
                .enumerate()
                .map(|(i, item)| d.variant(i, item))
                .collect::<Vec<_>>()
        });

        let payload = Self {
            name: d.string(obj, "name"),
            slug: d.string(obj, "slug"),
            description: d.string(obj, "description"),
            short_description: d.string(obj, "short_description"),
            category_id: d.integer(obj, "category_id"),
            subcategory_id: d.integer(obj, "subcategory_id"),
            status: d.string(obj, "status"),
            product_type: d.string(obj, "product_type"),
            tax_rate: d.number(obj, "tax_rate"),
            cgst_rate: d.number(obj, "cgst_rate"),
            sgst_rate: d.number(obj, "sgst_rate"),
            igst_rate: d.number(obj, "igst_rate"),
            is_vegetarian: d.boolean(obj, "is_vegetarian"),
            display_order: d.integer(obj, "display_order"),
            variants,
            delete_variant_ids: d.id_list(obj, "delete_variant_ids"),
            tags: d.string_list(obj, "tags"),
            version: d.integer(obj, "version"),
            images: ImageDirectives {
                image_ids: d.id_list(obj, "image_ids"),
                image_order: d.id_list(obj, "image_order"),
                primary_image_id: d.integer(obj, "primary_image_id"),
                keep_existing_images: d.boolean(obj, "keep_existing_images").unwrap_or(false),
                delete_all_images: d.boolean(obj, "delete_all_images").unwrap_or(false),
                delete_image_ids: d.id_list(obj, "delete_image_ids"),
            },
        };

        d.errors.into_result()?;
        Ok(payload)
    }
}

/// multipart のテキストフィールドを JSON オブジェクトにまとめる
///
/// `name[]` の繰り返しは配列に、同じキーの繰り返しは最後の値を採用する。
pub fn form_fields_to_value(fields: Vec<(String, String)>) -> Value {
    let mut obj = Map::new();
    for (key, text) in fields {
        if let Some(base) = key.strip_suffix("[]") {
            let entry = obj
                .entry(base.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match entry {
                Value::Array(items) => items.push(Value::String(text)),
                other => *other = Value::Array(vec![Value::String(text)]),
            }
        } else {
            obj.insert(key, Value::String(text));
        }
    }
    Value::Object(obj)
}

// ========================================
// Decoder
// ========================================

#[derive(Default)]
struct Decoder {
    errors: FieldErrors,
}

impl Decoder {
    fn variant(&mut self, index: usize, item: &Value) -> VariantPayload {
        let item = match item {
            Value::String(s) => serde_json::from_str::<Value>(s).unwrap_or(Value::Null),
            other => other.clone(),
        };
        let Some(obj) = item.as_object() else {
            self.errors.push(
                format!("variants.{index}"),
                format!("variant #{}: must be an object", index + 1),
            );
            return VariantPayload::default();
        };

        let mut scoped = Decoder::default();
        let variant = VariantPayload {
            id: scoped.integer(obj, "id"),
            variant_name: scoped.string(obj, "variant_name"),
            sku: scoped.string(obj, "sku"),
            price: scoped.number(obj, "price"),
            sale_price: scoped.number(obj, "sale_price"),
            discount_percentage: scoped.number(obj, "discount_percentage"),
            weight: scoped.number(obj, "weight"),
            weight_unit: scoped.string(obj, "weight_unit"),
            dimensions: scoped.dimensions(obj, "dimensions"),
            status: scoped.string(obj, "status"),
            min_order_quantity: scoped.integer(obj, "min_order_quantity"),
            max_order_quantity: scoped.integer(obj, "max_order_quantity"),
            display_order: scoped.integer(obj, "display_order"),
        };

        // "price" → "variants.0.price", メッセージに 1 始まりの番号を付ける
        for (field, messages) in scoped.errors {
            for message in messages {
                self.errors.push(
                    format!("variants.{index}.{field}"),
                    format!("variant #{}: {}", index + 1, message),
                );
            }
        }
        variant
    }

    fn string(&mut self, obj: &Map<String, Value>, key: &str) -> Option<String> {
        match obj.get(key)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => {
                self.errors.push(key, format!("{key} must be a string"));
                None
            }
        }
    }

    fn integer(&mut self, obj: &Map<String, Value>, key: &str) -> Option<i64> {
        match obj.get(key)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            value => {
                let parsed = match value {
                    Value::Number(n) => n
                        .as_i64()
                        .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                };
                if parsed.is_none() {
                    self.errors.push(key, format!("{key} must be an integer"));
                }
                parsed
            }
        }
    }

    fn number(&mut self, obj: &Map<String, Value>, key: &str) -> Option<f64> {
        match obj.get(key)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            value => {
                let parsed = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                }
                .filter(|f| f.is_finite());
                if parsed.is_none() {
                    self.errors.push(key, format!("{key} must be a number"));
                }
                parsed
            }
        }
    }

    fn boolean(&mut self, obj: &Map<String, Value>, key: &str) -> Option<bool> {
        match obj.get(key)? {
            Value::Null => None,
            Value::Bool(b) => Some(*b),
            Value::Number(n) => Some(n.as_f64().unwrap_or(0.0) != 0.0),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "" => None,
                "1" | "true" | "on" | "yes" => Some(true),
                "0" | "false" | "off" | "no" => Some(false),
                _ => {
                    self.errors.push(key, format!("{key} must be a boolean"));
                    None
                }
            },
            _ => {
                self.errors.push(key, format!("{key} must be a boolean"));
                None
            }
        }
    }

    /// 配列 / JSON文字列 / 単一値 をすべて配列として扱う
    fn list(&mut self, obj: &Map<String, Value>, key: &str) -> Option<Vec<Value>> {
        match obj.get(key)? {
            Value::Null => None,
            Value::Array(items) => Some(flatten_encoded(items)),
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Some(Vec::new());
                }
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(Value::Array(items)) => Some(items),
                    Ok(Value::Object(o)) => Some(vec![Value::Object(o)]),
                    Ok(scalar @ (Value::Number(_) | Value::String(_))) => Some(vec![scalar]),
                    // JSON でなければカンマ区切りとして扱う
                    _ if !trimmed.starts_with(['[', '{']) => Some(
                        trimmed
                            .split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(|s| Value::String(s.to_string()))
                            .collect(),
                    ),
                    _ => {
                        self.errors.push(key, format!("{key} must be a list"));
                        None
                    }
                }
            }
            scalar @ Value::Number(_) => Some(vec![scalar.clone()]),
            _ => {
                self.errors.push(key, format!("{key} must be a list"));
                None
            }
        }
    }

    fn id_list(&mut self, obj: &Map<String, Value>, key: &str) -> Vec<i64> {
        let Some(items) = self.list(obj, key) else {
            return Vec::new();
        };
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let id = match &item {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            match id {
                Some(id) if !ids.contains(&id) => ids.push(id),
                Some(_) => {}
                None => self.errors.push(key, format!("{key} must contain only integer ids")),
            }
        }
        ids
    }

    fn string_list(&mut self, obj: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
        let items = self.list(obj, key)?;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::String(s) => out.push(s.trim().to_string()),
                Value::Number(n) => out.push(n.to_string()),
                // {"name": "..."} 形式も受け付ける
                Value::Object(o) => match o.get("name").and_then(Value::as_str) {
                    Some(name) => out.push(name.trim().to_string()),
                    None => self.errors.push(key, format!("{key} must contain only names")),
                },
                _ => self.errors.push(key, format!("{key} must contain only names")),
            }
        }
        Some(out)
    }

    fn dimensions(&mut self, obj: &Map<String, Value>, key: &str) -> Option<Dimensions> {
        let value = match obj.get(key)? {
            Value::Null => return None,
            Value::String(s) if s.trim().is_empty() => return None,
            Value::String(s) => serde_json::from_str::<Value>(s).unwrap_or(Value::Null),
            other => other.clone(),
        };
        let Some(dims) = value.as_object() else {
            self.errors.push(key, format!("{key} must be an object"));
            return None;
        };

        let mut inner = Decoder::default();
        let length = inner.number(dims, "length");
        let width = inner.number(dims, "width");
        let height = inner.number(dims, "height");
        let unit = inner.string(dims, "unit").unwrap_or_else(|| "cm".to_string());

        match (length, width, height) {
            (Some(length), Some(width), Some(height)) if inner.errors.is_empty() => {
                Some(Dimensions { length, width, height, unit })
            }
            _ => {
                self.errors.push(
                    key,
                    format!("{key} requires numeric length, width and height"),
                );
                None
            }
        }
    }
}

/// ["[1,2]"] のように配列の中に JSON 文字列が入っているケースを展開
fn flatten_encoded(items: &[Value]) -> Vec<Value> {
    if let [Value::String(s)] = items {
        if let Ok(Value::Array(inner)) = serde_json::from_str::<Value>(s.trim()) {
            return inner;
        }
    }
    items.to_vec()
}
