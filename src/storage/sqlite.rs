//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.

use crate::archive::ContentDigest;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{LinkStore, SnapshotStore, StorageError, StorageResult, UrlStore};
use crate::storage::{
    decode_sentinel, encode_sentinel, from_epoch, to_epoch, LinkRecord, Snapshot, UrlRecord,
};
use crate::url::{extract_host, normalize};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;

const URL_COLUMNS: &str =
    "url, created, updated, last_get, host, status, content_type, content_length, title";

const LINK_COLUMNS: &str = "created, updated, src, dst";

const SNAPSHOT_COLUMNS: &str = "url, created, status, duration, headers, hash";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn write_url(&self, sql: &str, record: &UrlRecord) -> rusqlite::Result<usize> {
        self.conn.execute(
            sql,
            params![
                record.url,
                to_epoch(&record.created),
                to_epoch(&record.updated),
                record.last_get.as_ref().map(to_epoch).unwrap_or(0),
                record.host,
                encode_sentinel(record.status),
                record.content_type,
                encode_sentinel(record.content_length),
                record.title,
            ],
        )
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn strings(&self, sql: &str, key: &str) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let values = stmt
            .query_map(params![key], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(values)
    }
}

/// Normalizes the key and re-derives the host before a write
fn canonical_record(record: &UrlRecord) -> StorageResult<UrlRecord> {
    let url = normalize(&record.url, None)?;
    let mut record = record.clone();
    record.host = extract_host(&url).unwrap_or_default();
    record.url = url.into();
    Ok(record)
}

/// Builds a `LIKE` substring pattern with wildcards in the filter escaped
fn like_pattern(filter: Option<&str>) -> String {
    let needle = filter
        .unwrap_or("")
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", needle)
}

/// Classifies constraint failures raised by inserts
fn map_insert_error(err: rusqlite::Error, key: String) -> StorageError {
    let constraint = match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            Some(failure.extended_code)
        }
        _ => None,
    };

    match constraint {
        Some(code)
            if code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY || code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            StorageError::AlreadyExists(key)
        }
        Some(_) => StorageError::ConstraintViolation(format!("{}: {}", key, err)),
        None => StorageError::Sqlite(err),
    }
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    from_epoch(secs).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}

fn url_from_row(row: &Row) -> rusqlite::Result<UrlRecord> {
    let last_get: i64 = row.get(3)?;
    Ok(UrlRecord {
        url: row.get(0)?,
        created: timestamp_column(row, 1)?,
        updated: timestamp_column(row, 2)?,
        last_get: if last_get > 0 {
            from_epoch(last_get)
        } else {
            None
        },
        host: row.get(4)?,
        status: decode_sentinel(row.get(5)?),
        content_type: row.get(6)?,
        content_length: decode_sentinel(row.get(7)?),
        title: row.get(8)?,
    })
}

fn link_from_row(row: &Row) -> rusqlite::Result<LinkRecord> {
    Ok(LinkRecord {
        created: timestamp_column(row, 0)?,
        updated: timestamp_column(row, 1)?,
        src: row.get(2)?,
        dst: row.get(3)?,
    })
}

fn snapshot_from_row(row: &Row) -> rusqlite::Result<Snapshot> {
    let headers_json: String = row.get(4)?;
    let headers = serde_json::from_str(&headers_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    let hash: String = row.get(5)?;
    let hash = if hash.is_empty() {
        None
    } else {
        Some(
            ContentDigest::parse(&hash).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e))
            })?,
        )
    };

    Ok(Snapshot {
        url: row.get(0)?,
        created: timestamp_column(row, 1)?,
        status: decode_sentinel(row.get(2)?),
        duration_ms: row.get(3)?,
        headers,
        hash,
    })
}

impl UrlStore for SqliteStorage {
    fn get_url(&self, url: &str) -> StorageResult<UrlRecord> {
        let sql = format!("SELECT {} FROM urls WHERE url = ?1", URL_COLUMNS);
        self.conn
            .query_row(&sql, params![url], url_from_row)
            .optional()?
            .ok_or_else(|| StorageError::UrlNotFound(url.to_string()))
    }

    fn insert_url(&mut self, record: &UrlRecord) -> StorageResult<()> {
        let record = canonical_record(record)?;
        let sql = format!(
            "INSERT INTO urls ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            URL_COLUMNS
        );
        self.write_url(&sql, &record)
            .map_err(|e| map_insert_error(e, record.url.clone()))?;
        Ok(())
    }

    fn insert_url_if_absent(&mut self, record: &UrlRecord) -> StorageResult<bool> {
        let record = canonical_record(record)?;
        let sql = format!(
            "INSERT OR IGNORE INTO urls ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            URL_COLUMNS
        );
        let inserted = self.write_url(&sql, &record)?;
        Ok(inserted == 1)
    }

    fn update_url(&mut self, record: &UrlRecord) -> StorageResult<()> {
        let record = canonical_record(record)?;
        let changed = self.write_url(
            "UPDATE urls SET created = ?2, updated = ?3, last_get = ?4, host = ?5, status = ?6,
             content_type = ?7, content_length = ?8, title = ?9 WHERE url = ?1",
            &record,
        )?;

        if changed == 0 {
            return Err(StorageError::UrlNotFound(record.url));
        }
        Ok(())
    }

    fn delete_url(&mut self, url: &str) -> StorageResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM urls WHERE url = ?1", params![url])?;

        if changed == 0 {
            return Err(StorageError::UrlNotFound(url.to_string()));
        }
        Ok(())
    }

    fn list_urls(
        &self,
        limit: u32,
        offset: u32,
        filter: Option<&str>,
    ) -> StorageResult<Vec<UrlRecord>> {
        let sql = format!(
            "SELECT {} FROM urls WHERE url LIKE ?3 ESCAPE '\\'
             ORDER BY created DESC, url ASC LIMIT ?1 OFFSET ?2",
            URL_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let urls = stmt
            .query_map(params![limit, offset, like_pattern(filter)], url_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(urls)
    }

    fn count_urls(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM urls")
    }

    fn count_fetched_urls(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM urls WHERE last_get > 0")
    }

    fn count_hosts(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(DISTINCT host) FROM urls WHERE host != ''")
    }

    fn inbound_link_urls(&self, dst: &str) -> StorageResult<Vec<String>> {
        self.strings("SELECT src FROM links WHERE dst = ?1 ORDER BY src", dst)
    }

    fn outbound_link_urls(&self, src: &str) -> StorageResult<Vec<String>> {
        self.strings("SELECT dst FROM links WHERE src = ?1 ORDER BY dst", src)
    }
}

impl LinkStore for SqliteStorage {
    fn get_link(&self, src: &str, dst: &str) -> StorageResult<LinkRecord> {
        let sql = format!(
            "SELECT {} FROM links WHERE src = ?1 AND dst = ?2",
            LINK_COLUMNS
        );
        self.conn
            .query_row(&sql, params![src, dst], link_from_row)
            .optional()?
            .ok_or_else(|| StorageError::LinkNotFound {
                src: src.to_string(),
                dst: dst.to_string(),
            })
    }

    fn insert_link(&mut self, link: &LinkRecord) -> StorageResult<()> {
        self.conn
            .execute(
                "INSERT INTO links (created, updated, src, dst) VALUES (?1, ?2, ?3, ?4)",
                params![
                    to_epoch(&link.created),
                    to_epoch(&link.updated),
                    link.src,
                    link.dst
                ],
            )
            .map_err(|e| map_insert_error(e, format!("{} -> {}", link.src, link.dst)))?;
        Ok(())
    }

    fn update_link(&mut self, link: &LinkRecord) -> StorageResult<()> {
        let changed = self.conn.execute(
            "UPDATE links SET created = ?1, updated = ?2 WHERE src = ?3 AND dst = ?4",
            params![
                to_epoch(&link.created),
                to_epoch(&link.updated),
                link.src,
                link.dst
            ],
        )?;

        if changed == 0 {
            return Err(StorageError::LinkNotFound {
                src: link.src.clone(),
                dst: link.dst.clone(),
            });
        }
        Ok(())
    }

    fn upsert_link(
        &mut self,
        src: &str,
        dst: &str,
        seen_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.conn
            .execute(
                "INSERT INTO links (created, updated, src, dst) VALUES (?1, ?1, ?2, ?3)
                 ON CONFLICT(src, dst) DO UPDATE SET updated = excluded.updated",
                params![to_epoch(&seen_at), src, dst],
            )
            .map_err(|e| map_insert_error(e, format!("{} -> {}", src, dst)))?;
        Ok(())
    }

    fn delete_link(&mut self, src: &str, dst: &str) -> StorageResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM links WHERE src = ?1 AND dst = ?2",
            params![src, dst],
        )?;

        if changed == 0 {
            return Err(StorageError::LinkNotFound {
                src: src.to_string(),
                dst: dst.to_string(),
            });
        }
        Ok(())
    }

    fn list_links(
        &self,
        limit: u32,
        offset: u32,
        filter: Option<&str>,
    ) -> StorageResult<Vec<LinkRecord>> {
        let sql = format!(
            "SELECT {} FROM links WHERE src LIKE ?3 ESCAPE '\\'
             ORDER BY created DESC, src ASC, dst ASC LIMIT ?1 OFFSET ?2",
            LINK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let links = stmt
            .query_map(params![limit, offset, like_pattern(filter)], link_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    fn count_links(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM links")
    }
}

impl SnapshotStore for SqliteStorage {
    fn insert_snapshot(&mut self, snapshot: &Snapshot) -> StorageResult<i64> {
        let headers = serde_json::to_string(&snapshot.headers)?;
        let hash = snapshot
            .hash
            .as_ref()
            .map(|h| h.as_str().to_string())
            .unwrap_or_default();

        self.conn
            .execute(
                "INSERT INTO snapshots (url, created, status, duration, headers, hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    snapshot.url,
                    to_epoch(&snapshot.created),
                    encode_sentinel(snapshot.status),
                    snapshot.duration_ms.max(0),
                    headers,
                    hash
                ],
            )
            .map_err(|e| map_insert_error(e, snapshot.url.clone()))?;

        Ok(self.conn.last_insert_rowid())
    }

    fn snapshots_for_url(&self, url: &str) -> StorageResult<Vec<Snapshot>> {
        let sql = format!(
            "SELECT {} FROM snapshots WHERE url = ?1 ORDER BY created ASC, id ASC",
            SNAPSHOT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let snapshots = stmt
            .query_map(params![url], snapshot_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(snapshots)
    }

    fn list_snapshots(
        &self,
        limit: u32,
        offset: u32,
        filter: Option<&str>,
    ) -> StorageResult<Vec<Snapshot>> {
        let sql = format!(
            "SELECT {} FROM snapshots WHERE url LIKE ?3 ESCAPE '\\'
             ORDER BY created DESC, id DESC LIMIT ?1 OFFSET ?2",
            SNAPSHOT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let snapshots = stmt
            .query_map(params![limit, offset, like_pattern(filter)], snapshot_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(snapshots)
    }

    fn urls_for_hash(&self, hash: &ContentDigest) -> StorageResult<Vec<String>> {
        self.strings(
            "SELECT DISTINCT url FROM snapshots WHERE hash = ?1 ORDER BY url",
            hash.as_str(),
        )
    }

    fn count_snapshots(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM snapshots")
    }

    fn count_failed_snapshots(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM snapshots WHERE status < 0")
    }
}
