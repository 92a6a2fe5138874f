//! Database schema definitions
//!
//! Timestamps are integer epoch seconds. `last_get = 0` means the URL was
//! never fetched; `status = -1` and `content_length = -1` mean unknown.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Every known URL
CREATE TABLE IF NOT EXISTS urls (
    url TEXT PRIMARY KEY NOT NULL,
    created INTEGER NOT NULL,
    updated INTEGER NOT NULL,
    last_get INTEGER NOT NULL DEFAULT 0,
    host TEXT NOT NULL DEFAULT '',
    status INTEGER NOT NULL DEFAULT -1,
    content_type TEXT NOT NULL DEFAULT '',
    content_length INTEGER NOT NULL DEFAULT -1,
    title TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_urls_created ON urls(created);
CREATE INDEX IF NOT EXISTS idx_urls_host ON urls(host);

-- Hyperlink graph
CREATE TABLE IF NOT EXISTS links (
    created INTEGER NOT NULL,
    updated INTEGER NOT NULL,
    src TEXT NOT NULL REFERENCES urls(url) ON DELETE CASCADE,
    dst TEXT NOT NULL REFERENCES urls(url) ON DELETE CASCADE,
    PRIMARY KEY (src, dst)
);

CREATE INDEX IF NOT EXISTS idx_links_dst ON links(dst);

-- Fetch history
CREATE TABLE IF NOT EXISTS snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL REFERENCES urls(url) ON DELETE CASCADE,
    created INTEGER NOT NULL,
    status INTEGER NOT NULL DEFAULT -1,
    duration INTEGER NOT NULL DEFAULT 0,
    headers TEXT NOT NULL DEFAULT '[]',
    hash TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_snapshots_url ON snapshots(url);
CREATE INDEX IF NOT EXISTS idx_snapshots_hash ON snapshots(hash);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
