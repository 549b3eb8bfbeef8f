//! SQLite schema for documents, purchase records and unknown products.

use rusqlite::Connection;

/// Schema revision, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 1;

/// Set connection pragmas. Every connection needs these, not only the writer.
pub fn configure(conn: &Connection) -> rusqlite::Result<()> {
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}

/// Create tables and indexes if they do not exist yet.
pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_hash TEXT UNIQUE NOT NULL,
            path TEXT NOT NULL,
            kind TEXT NOT NULL,
            document_number TEXT,
            purchase_date TEXT,
            total_amount TEXT,
            savings TEXT,
            rules_version INTEGER,
            raw_text TEXT NOT NULL DEFAULT '',
            imported_at TEXT NOT NULL
        )",
        [],
    )?;

    // Amounts are decimal text, never REAL
    conn.execute(
        "CREATE TABLE IF NOT EXISTS purchase_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            line_number INTEGER NOT NULL,
            product TEXT NOT NULL,
            product_key TEXT NOT NULL,
            quantity TEXT NOT NULL,
            unit TEXT NOT NULL,
            unit_price TEXT NOT NULL,
            total TEXT NOT NULL,
            purchase_date TEXT NOT NULL,
            category TEXT NOT NULL,
            subcategory TEXT,
            line_kind TEXT NOT NULL,
            vat_rate TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS unknown_products (
            product_key TEXT PRIMARY KEY,
            first_seen TEXT NOT NULL,
            occurrences INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_purchase_date ON purchase_records(purchase_date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_category ON purchase_records(category)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_document ON purchase_records(document_id)",
        [],
    )?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    Ok(())
}
