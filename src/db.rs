// src/db.rs - Database migrations and setup

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Enable foreign keys and WAL mode
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    // Users: admins own the inventory, employees act on their admin's data
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE CHECK(length(username) >= 3 AND length(username) <= 50),
            email TEXT NOT NULL UNIQUE CHECK(length(email) >= 5 AND length(email) <= 255),
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'admin' CHECK(role IN ('admin', 'employee')),
            admin_id TEXT,
            is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1)),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (admin_id) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS suppliers (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
            company_name TEXT CHECK(company_name IS NULL OR length(company_name) <= 255),
            contact_name TEXT CHECK(contact_name IS NULL OR length(contact_name) <= 255),
            phone TEXT CHECK(phone IS NULL OR length(phone) <= 50),
            email TEXT CHECK(email IS NULL OR length(email) <= 255),
            address TEXT CHECK(address IS NULL OR length(address) <= 1000),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS warehouses (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
            location TEXT CHECK(location IS NULL OR length(location) <= 255),
            description TEXT CHECK(description IS NULL OR length(description) <= 1000),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
            barcode TEXT NOT NULL CHECK(length(barcode) > 0 AND length(barcode) <= 100),
            category TEXT CHECK(category IS NULL OR length(category) <= 100),
            unit TEXT CHECK(unit IS NULL OR length(unit) <= 20),
            price REAL NOT NULL DEFAULT 0 CHECK(price >= 0),
            description TEXT CHECK(description IS NULL OR length(description) <= 1000),
            image_url TEXT CHECK(image_url IS NULL OR length(image_url) <= 500),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id),
            UNIQUE(user_id, barcode)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One stock row per (owner, product, warehouse); total_quantity is the sum
    // over the active lots of the stock
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stocks (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            product_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            barcode TEXT NOT NULL,
            location TEXT NOT NULL,
            supplier_id TEXT,
            supplier_name TEXT,
            total_quantity INTEGER NOT NULL DEFAULT 0,
            threshold INTEGER NOT NULL DEFAULT 5 CHECK(threshold >= 0),
            status TEXT NOT NULL DEFAULT 'สินค้าพร้อมขาย',
            is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1)),
            last_restocked DATETIME,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id),
            FOREIGN KEY (product_id) REFERENCES products (id) ON DELETE CASCADE,
            UNIQUE(user_id, product_id, location)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stock_lots (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            stock_id TEXT NOT NULL,
            product_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            barcode TEXT,
            batch_number TEXT NOT NULL CHECK(length(batch_number) > 0 AND length(batch_number) <= 100),
            purchase_order_id TEXT,
            purchase_order_number TEXT,
            supplier_id TEXT,
            location TEXT NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 0 CHECK(quantity >= 0),
            remaining_qty INTEGER NOT NULL DEFAULT 0 CHECK(remaining_qty >= 0),
            failed_quantity INTEGER NOT NULL DEFAULT 0 CHECK(failed_quantity >= 0),
            cost_price REAL NOT NULL DEFAULT 0 CHECK(cost_price >= 0),
            sale_price REAL NOT NULL DEFAULT 0 CHECK(sale_price >= 0),
            status TEXT NOT NULL DEFAULT 'รอตรวจสอบ QC',
            qc_status TEXT NOT NULL DEFAULT 'รอตรวจสอบ',
            return_status TEXT,
            reason TEXT CHECK(reason IS NULL OR length(reason) <= 500),
            is_active INTEGER NOT NULL DEFAULT 0 CHECK(is_active IN (0, 1)),
            is_temporary INTEGER NOT NULL DEFAULT 1 CHECK(is_temporary IN (0, 1)),
            expiry_date DATETIME,
            last_restocked DATETIME,
            closed_by TEXT,
            closed_at DATETIME,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id),
            FOREIGN KEY (stock_id) REFERENCES stocks (id) ON DELETE CASCADE,
            UNIQUE(user_id, batch_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS purchase_orders (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            purchase_order_number TEXT NOT NULL,
            invoice_number TEXT,
            supplier_id TEXT NOT NULL,
            supplier_company TEXT,
            location TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'รอดำเนินการ',
            qc_status TEXT NOT NULL DEFAULT 'รอตรวจสอบ',
            total_amount REAL NOT NULL DEFAULT 0 CHECK(total_amount >= 0),
            total_returned_value REAL NOT NULL DEFAULT 0 CHECK(total_returned_value >= 0),
            total_amount_after_return REAL NOT NULL DEFAULT 0,
            notes TEXT CHECK(notes IS NULL OR length(notes) <= 1000),
            created_by TEXT,
            updated_by TEXT,
            received_at DATETIME,
            qc_checked_at DATETIME,
            returned_at DATETIME,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id),
            FOREIGN KEY (supplier_id) REFERENCES suppliers (id),
            UNIQUE(user_id, purchase_order_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS purchase_order_items (
            id TEXT PRIMARY KEY,
            purchase_order_id TEXT NOT NULL,
            product_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            barcode TEXT,
            quantity INTEGER NOT NULL CHECK(quantity > 0),
            cost_price REAL NOT NULL CHECK(cost_price >= 0),
            sale_price REAL NOT NULL DEFAULT 0 CHECK(sale_price >= 0),
            total REAL NOT NULL CHECK(total >= 0),
            batch_number TEXT,
            stock_lot_id TEXT,
            expiry_date DATETIME,
            is_returned INTEGER NOT NULL DEFAULT 0 CHECK(is_returned IN (0, 1)),
            returned_quantity INTEGER NOT NULL DEFAULT 0 CHECK(returned_quantity >= 0),
            returned_value REAL NOT NULL DEFAULT 0 CHECK(returned_value >= 0),
            FOREIGN KEY (purchase_order_id) REFERENCES purchase_orders (id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS po_return_history (
            id TEXT PRIMARY KEY,
            purchase_order_id TEXT NOT NULL,
            product_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            batch_number TEXT,
            returned_quantity INTEGER NOT NULL CHECK(returned_quantity > 0),
            returned_value REAL NOT NULL CHECK(returned_value >= 0),
            reason TEXT CHECK(reason IS NULL OR length(reason) <= 500),
            processed_by TEXT,
            returned_at DATETIME NOT NULL,
            FOREIGN KEY (purchase_order_id) REFERENCES purchase_orders (id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only movement ledger; RESTOCK rows double as the idempotency
    // guard for QC stock intake
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stock_transactions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            stock_id TEXT,
            stock_lot_id TEXT,
            product_id TEXT NOT NULL,
            transaction_type TEXT NOT NULL CHECK(
                transaction_type IN ('RESTOCK', 'ADJUSTMENT', 'RETURN', 'SALE')
            ),
            quantity INTEGER NOT NULL,
            cost_price REAL,
            reference_id TEXT,
            source TEXT,
            location TEXT,
            notes TEXT CHECK(notes IS NULL OR length(notes) <= 500),
            created_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quality_controls (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            batch_number TEXT NOT NULL,
            product_id TEXT,
            supplier_id TEXT,
            warehouse_id TEXT,
            status TEXT NOT NULL DEFAULT 'รอตรวจสอบ',
            total_quantity INTEGER NOT NULL DEFAULT 0 CHECK(total_quantity >= 0),
            passed_quantity INTEGER NOT NULL DEFAULT 0 CHECK(passed_quantity >= 0),
            failed_quantity INTEGER NOT NULL DEFAULT 0 CHECK(failed_quantity >= 0),
            temperature REAL,
            humidity REAL,
            issues TEXT,
            attachments TEXT,
            remarks TEXT CHECK(remarks IS NULL OR length(remarks) <= 1000),
            inspected_by TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            sale_id TEXT,
            payment_method TEXT NOT NULL,
            amount REAL NOT NULL CHECK(amount >= 0),
            status TEXT NOT NULL DEFAULT 'completed',
            employee_name TEXT,
            created_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS receipts (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            payment_id TEXT NOT NULL,
            employee_name TEXT,
            items TEXT NOT NULL DEFAULT '[]',
            total_price REAL NOT NULL CHECK(total_price >= 0),
            amount_paid REAL NOT NULL CHECK(amount_paid >= 0),
            change_amount REAL NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users (id),
            FOREIGN KEY (payment_id) REFERENCES payments (id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // ==================== CREATE INDEXES ====================

    let index_queries = [
        "CREATE INDEX IF NOT EXISTS idx_suppliers_user ON suppliers(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_warehouses_user ON warehouses(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_products_user ON products(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_products_barcode ON products(barcode)",
        "CREATE INDEX IF NOT EXISTS idx_stocks_user ON stocks(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_stocks_barcode ON stocks(barcode)",
        "CREATE INDEX IF NOT EXISTS idx_stocks_product ON stocks(product_id)",
        "CREATE INDEX IF NOT EXISTS idx_stocks_updated ON stocks(updated_at)",
        "CREATE INDEX IF NOT EXISTS idx_stock_lots_user ON stock_lots(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_stock_lots_stock ON stock_lots(stock_id)",
        "CREATE INDEX IF NOT EXISTS idx_stock_lots_po ON stock_lots(purchase_order_id)",
        "CREATE INDEX IF NOT EXISTS idx_stock_lots_batch ON stock_lots(batch_number)",
        "CREATE INDEX IF NOT EXISTS idx_stock_lots_expiry ON stock_lots(expiry_date)",
        "CREATE INDEX IF NOT EXISTS idx_po_user ON purchase_orders(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_po_status ON purchase_orders(status)",
        "CREATE INDEX IF NOT EXISTS idx_po_items_po ON purchase_order_items(purchase_order_id)",
        "CREATE INDEX IF NOT EXISTS idx_po_returns_po ON po_return_history(purchase_order_id)",
        "CREATE INDEX IF NOT EXISTS idx_txn_lot ON stock_transactions(stock_lot_id)",
        "CREATE INDEX IF NOT EXISTS idx_txn_type ON stock_transactions(transaction_type)",
        "CREATE INDEX IF NOT EXISTS idx_txn_reference ON stock_transactions(reference_id)",
        "CREATE INDEX IF NOT EXISTS idx_qc_batch ON quality_controls(batch_number)",
        "CREATE INDEX IF NOT EXISTS idx_qc_user ON quality_controls(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_receipts_payment ON receipts(payment_id)",
        "CREATE INDEX IF NOT EXISTS idx_receipts_created ON receipts(created_at)",
    ];

    for query in index_queries.iter() {
        let _ = sqlx::query(query).execute(pool).await;
    }

    migrate_existing_tables(pool).await?;

    Ok(())
}

// ==================== MIGRATION FOR EXISTING DATABASES ====================

pub async fn migrate_existing_tables(pool: &SqlitePool) -> Result<()> {
    // Additive columns for databases created by earlier versions
    let migration_queries = [
        "ALTER TABLE stocks ADD COLUMN supplier_id TEXT",
        "ALTER TABLE stocks ADD COLUMN supplier_name TEXT",
        "ALTER TABLE stock_lots ADD COLUMN return_status TEXT",
        "ALTER TABLE stock_lots ADD COLUMN reason TEXT",
        "ALTER TABLE stock_lots ADD COLUMN closed_by TEXT",
        "ALTER TABLE stock_lots ADD COLUMN closed_at DATETIME",
        "ALTER TABLE purchase_orders ADD COLUMN invoice_number TEXT",
        "ALTER TABLE purchase_orders ADD COLUMN returned_at DATETIME",
        "ALTER TABLE purchase_order_items ADD COLUMN expiry_date DATETIME",
        "ALTER TABLE purchase_order_items ADD COLUMN returned_quantity INTEGER NOT NULL DEFAULT 0",
        "ALTER TABLE purchase_order_items ADD COLUMN returned_value REAL NOT NULL DEFAULT 0",
        "ALTER TABLE quality_controls ADD COLUMN temperature REAL",
        "ALTER TABLE quality_controls ADD COLUMN humidity REAL",
        "ALTER TABLE quality_controls ADD COLUMN attachments TEXT",
    ];

    for query in migration_queries.iter() {
        // Ignore errors for existing columns
        let _ = sqlx::query(query).execute(pool).await;
    }

    Ok(())
}

// ==================== DATABASE RESET (DEVELOPMENT ONLY) ====================

pub async fn reset_database(pool: &SqlitePool) -> Result<()> {
    log::warn!("Resetting database - all data will be lost!");

    let drop_queries = [
        "DROP TABLE IF EXISTS receipts",
        "DROP TABLE IF EXISTS payments",
        "DROP TABLE IF EXISTS quality_controls",
        "DROP TABLE IF EXISTS stock_transactions",
        "DROP TABLE IF EXISTS po_return_history",
        "DROP TABLE IF EXISTS purchase_order_items",
        "DROP TABLE IF EXISTS purchase_orders",
        "DROP TABLE IF EXISTS stock_lots",
        "DROP TABLE IF EXISTS stocks",
        "DROP TABLE IF EXISTS products",
        "DROP TABLE IF EXISTS warehouses",
        "DROP TABLE IF EXISTS suppliers",
        "DROP TABLE IF EXISTS users",
    ];

    for query in drop_queries.iter() {
        let _ = sqlx::query(query).execute(pool).await;
    }

    run_migrations(pool).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();

        for expected in [
            "users",
            "suppliers",
            "warehouses",
            "products",
            "stocks",
            "stock_lots",
            "purchase_orders",
            "purchase_order_items",
            "po_return_history",
            "stock_transactions",
            "quality_controls",
            "payments",
            "receipts",
        ] {
            assert!(names.contains(&expected), "missing table {}", expected);
        }
    }
}
