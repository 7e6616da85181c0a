//! Image reconciliation
//! 既存画像と更新リクエストから削除・保持する画像 id を決める（I/O なし）

use std::collections::BTreeSet;

use crate::models::{ImageDirectives, UploadedImage};

/// 画像の処理方針
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImagePlan {
    pub delete_ids: BTreeSet<i64>,
    pub keep_ids: BTreeSet<i64>,
}

impl ImagePlan {
    fn from_deletes(existing: &BTreeSet<i64>, delete_ids: BTreeSet<i64>) -> Self {
        let keep_ids = existing.difference(&delete_ids).copied().collect();
        Self { delete_ids, keep_ids }
    }
}

/// エラーのない新規アップロードが1件以上あるか
pub fn has_new_images(uploads: &[UploadedImage]) -> bool {
    uploads.iter().any(UploadedImage::is_usable)
}

/// 削除対象の画像 id を決める
///
/// 判定順:
/// 1. `delete_all_images` なら既存をすべて削除して終了
/// 2. 保持指定 = `image_ids` ∪ `image_order` ∪ 既存を指す `primary_image_id`
/// 3. 新規画像あり: 保持指定も `keep_existing_images` もなければ全置換、
///    それ以外は保持指定以外を削除
/// 4. 新規画像なし: 保持指定があればそれ以外を削除、なければ何も消さない
/// 5. 最後に `delete_image_ids` を加える
pub fn reconcile(existing: &[i64], directives: &ImageDirectives, has_new_images: bool) -> ImagePlan {
    let existing: BTreeSet<i64> = existing.iter().copied().collect();

    if directives.delete_all_images {
        return ImagePlan::from_deletes(&existing, existing.clone());
    }

    let mut kept: BTreeSet<i64> = directives
        .image_ids
        .iter()
        .chain(directives.image_order.iter())
        .copied()
        .collect();
    if let Some(primary) = directives.primary_image_id {
        if existing.contains(&primary) {
            kept.insert(primary);
        }
    }

    let mut delete_ids: BTreeSet<i64> = if has_new_images {
        if !directives.keep_existing_images && kept.is_empty() {
            existing.clone()
        } else {
            existing.difference(&kept).copied().collect()
        }
    } else if !kept.is_empty() {
        existing.difference(&kept).copied().collect()
    } else {
        BTreeSet::new()
    };

    delete_ids.extend(directives.delete_image_ids.iter().copied());

    ImagePlan::from_deletes(&existing, delete_ids)
}
