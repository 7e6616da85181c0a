//! Database Module
//! SQLite を使用した categories/products/variants/images/tags の管理

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use tracing::info;

/// データベース接続プール
pub type DbPool = Pool<Sqlite>;

/// データベースを初期化
pub async fn init_db(db_path: &str) -> Result<DbPool> {
    // SQLite接続文字列
    let db_url = format!("sqlite:{}?mode=rwc", db_path);

    info!("Initializing database: {}", db_path);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    create_schema(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// テスト用のインメモリDB（接続は1本に固定）
pub async fn init_memory_db() -> Result<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// スキーマ作成
pub async fn create_schema(pool: &DbPool) -> Result<()> {
    // categories テーブル（CRUD は別サービス、ここでは参照のみ）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            deleted_at INTEGER
        )
    "#)
    .execute(pool)
    .await?;

    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS subcategories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            deleted_at INTEGER,
            FOREIGN KEY (category_id) REFERENCES categories(id)
        )
    "#)
    .execute(pool)
    .await?;

    // products テーブル（version で楽観ロック）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            slug TEXT NOT NULL,
            description TEXT,
            short_description TEXT,
            category_id INTEGER NOT NULL,
            subcategory_id INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'inactive',
            product_type TEXT NOT NULL DEFAULT 'global',
            tax_rate REAL,
            cgst_rate REAL,
            sgst_rate REAL,
            igst_rate REAL,
            is_vegetarian INTEGER NOT NULL DEFAULT 0,
            display_order INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 1,
            created_by TEXT,
            updated_by TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER,
            deleted_by TEXT,
            FOREIGN KEY (category_id) REFERENCES categories(id),
            FOREIGN KEY (subcategory_id) REFERENCES subcategories(id)
        )
    "#)
    .execute(pool)
    .await?;

    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_products_slug ON products(slug)")
        .execute(pool).await?;

    // product_variants テーブル
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS product_variants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            product_id INTEGER NOT NULL,
            variant_name TEXT NOT NULL,
            sku TEXT NOT NULL,
            price REAL NOT NULL,
            sale_price REAL,
            discount_percentage REAL,
            weight REAL,
            weight_unit TEXT,
            dimensions TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            min_order_quantity INTEGER,
            max_order_quantity INTEGER,
            display_order INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (product_id) REFERENCES products(id)
        )
    "#)
    .execute(pool)
    .await?;

    // SKU は全体で一意（大文字小文字を区別しない）
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_variants_sku ON product_variants(sku COLLATE NOCASE)"
    )
    .execute(pool).await?;

    // product_images テーブル
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS product_images (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            product_id INTEGER NOT NULL,
            image_path TEXT NOT NULL,
            is_primary INTEGER NOT NULL DEFAULT 0,
            display_order INTEGER NOT NULL DEFAULT 0,
            checksum TEXT,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (product_id) REFERENCES products(id)
        )
    "#)
    .execute(pool)
    .await?;

    // tags / product_tags（多対多）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        )
    "#)
    .execute(pool)
    .await?;

    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_tags_name ON tags(name COLLATE NOCASE)")
        .execute(pool).await?;

    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS product_tags (
            product_id INTEGER NOT NULL,
            tag_id INTEGER NOT NULL,
            PRIMARY KEY (product_id, tag_id),
            FOREIGN KEY (product_id) REFERENCES products(id),
            FOREIGN KEY (tag_id) REFERENCES tags(id)
        )
    "#)
    .execute(pool)
    .await?;

    // インデックス作成
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_subcategories_category ON subcategories(category_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_products_category ON products(category_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_products_deleted_at ON products(deleted_at)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_variants_product ON product_variants(product_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_images_product ON product_images(product_id)")
        .execute(pool).await?;

    Ok(())
}
