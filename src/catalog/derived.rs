//! Derived fields
//! 税率の分割・割引率・短い説明文・スラッグの算出（I/O なし）

use regex::Regex;
use std::sync::OnceLock;

use crate::models::ProductDraft;

/// 短い説明文の既定最大長（文字数）
pub const SHORT_DESCRIPTION_MAX: usize = 160;

const ELLIPSIS: char = '…';

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GstSplit {
    pub cgst: f64,
    pub sgst: f64,
    pub igst: f64,
}

/// igst = tax_rate, cgst = sgst = tax_rate / 2
pub fn compute_gst(tax_rate: f64) -> GstSplit {
    let half = tax_rate / 2.0;
    GstSplit {
        cgst: half,
        sgst: half,
        igst: tax_rate,
    }
}

/// 割引率 (%)。sale_price が price 未満の正の値の時だけ算出
pub fn compute_discount_percentage(price: f64, sale_price: Option<f64>) -> Option<f64> {
    let sale = sale_price?;
    if price > 0.0 && sale > 0.0 && sale < price {
        Some(round2((price - sale) / price * 100.0))
    } else {
        None
    }
}

/// マークアップを除去し、最大長を超える場合は単語境界で切って "…" を付ける
pub fn short_description(description: &str, max_len: usize) -> String {
    let text = strip_markup(description);
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        return text;
    }

    let boundary = chars[..=max_len]
        .iter()
        .rposition(|c| c.is_whitespace())
        .filter(|&pos| pos > 0);

    let cut = boundary.unwrap_or(max_len);
    let mut out: String = chars[..cut].iter().collect();
    out.truncate(out.trim_end().len());
    out.push(ELLIPSIS);
    out
}

/// 商品名からスラッグを作る（英数字以外は "-" に）
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "product".to_string()
    } else {
        slug
    }
}

/// 入力に派生フィールドを補完する。既に指定された値は上書きしない
pub fn apply_derived_fields(draft: &mut ProductDraft) {
    let fields = &mut draft.fields;

    if let Some(tax_rate) = fields.tax_rate {
        if fields.cgst_rate.is_none() || fields.sgst_rate.is_none() || fields.igst_rate.is_none() {
            let split = compute_gst(tax_rate);
            fields.cgst_rate = Some(split.cgst);
            fields.sgst_rate = Some(split.sgst);
            fields.igst_rate = Some(split.igst);
        }
    }

    if fields.short_description.is_none() {
        if let Some(description) = &fields.description {
            let short = short_description(description, SHORT_DESCRIPTION_MAX);
            if !short.is_empty() {
                fields.short_description = Some(short);
            }
        }
    }

    if let Some(variants) = draft.variants.as_mut() {
        for variant in variants.iter_mut() {
            if variant.discount_percentage.is_none() {
                variant.discount_percentage =
                    compute_discount_percentage(variant.price, variant.sale_price);
            }
        }
    }
}

fn strip_markup(input: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
    let spaces = SPACES.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"));

    let without_tags = tags.replace_all(input, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    spaces.replace_all(decoded.trim(), " ").into_owned()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
