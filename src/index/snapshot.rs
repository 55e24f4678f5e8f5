// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed snapshot of a vector index and its passages.
//!
//! A snapshot is a single file holding the bound dimension, every passage in
//! position order and its embedding. Saving writes a sibling temporary file
//! inside one transaction and renames it over the destination, so readers
//! only ever see a complete snapshot.

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::{RagError, Result};
use crate::index::VectorIndex;

/// Snapshot layout version written to the `meta` table.
pub const SCHEMA_VERSION: &str = "1";

const F32_BYTES: usize = std::mem::size_of::<f32>();

/// Metadata recorded alongside the index when saving.
#[derive(Debug, Clone, Default)]
pub struct SnapshotMeta {
    /// Identifier of the embedding model that produced the vectors
    pub model: String,
    /// blake3 hash of the source text the index was first built from
    pub source_hash: Option<String>,
}

/// Summary of a snapshot on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotInfo {
    pub path: PathBuf,
    pub schema_version: String,
    pub dimension: usize,
    pub passages: usize,
    pub model: Option<String>,
    pub source_hash: Option<String>,
    /// Unix timestamp of the save
    pub created_at: i64,
}

/// Writes `index` to `path`, replacing any existing snapshot.
pub fn save(path: &Path, index: &VectorIndex, meta: &SnapshotMeta) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path(path);
    if tmp_path.exists() {
        std::fs::remove_file(&tmp_path)?;
    }

    let mut conn = Connection::open(&tmp_path)?;
    init_schema(&conn)?;

    let created_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    let tx = conn.transaction()?;
    {
        let mut set_meta =
            tx.prepare("INSERT INTO meta (key, value) VALUES (?1, ?2)")?;
        set_meta.execute(params!["schema_version", SCHEMA_VERSION])?;
        set_meta.execute(params!["dimension", index.dimension().to_string()])?;
        set_meta.execute(params!["model", meta.model])?;
        set_meta.execute(params!["created_at", created_at.to_string()])?;
        if let Some(hash) = &meta.source_hash {
            set_meta.execute(params!["source_hash", hash])?;
        }

        let mut insert = tx.prepare(
            "INSERT INTO passages (position, text, embedding) VALUES (?1, ?2, ?3)",
        )?;
        for (passage, vector) in index.entries() {
            insert.execute(params![
                passage.position as i64,
                passage.text,
                embedding_to_blob(vector)
            ])?;
        }
    }
    tx.commit()?;
    conn.close().map_err(|(_, e)| e)?;

    std::fs::rename(&tmp_path, path)?;
    debug!(
        path = %path.display(),
        passages = index.len(),
        dimension = index.dimension(),
        "snapshot saved"
    );
    Ok(())
}

/// Reads a snapshot back into an index.
///
/// Positions must run contiguously from zero and every embedding must have
/// the recorded dimension; anything else is `CorruptSnapshot`.
pub fn load(path: &Path) -> Result<(VectorIndex, SnapshotInfo)> {
    let conn = open_read_only(path)?;
    let mut info = read_meta(&conn, path)?;

    let blob_len = info
        .dimension
        .checked_mul(F32_BYTES)
        .ok_or_else(|| RagError::CorruptSnapshot(format!("dimension {} is too large", info.dimension)))?;

    let mut index = VectorIndex::create(info.dimension)?;
    let mut texts = Vec::new();
    let mut vectors = Vec::new();
    {
        let mut stmt =
            conn.prepare("SELECT position, text, embedding FROM passages ORDER BY position")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let position: i64 = row.get(0)?;
            if position != texts.len() as i64 {
                return Err(RagError::CorruptSnapshot(format!(
                    "expected passage position {}, found {}",
                    texts.len(),
                    position
                )));
            }
            let blob: Vec<u8> = row.get(2)?;
            if blob.len() != blob_len {
                return Err(RagError::CorruptSnapshot(format!(
                    "embedding at position {} has {} bytes, expected {}",
                    position,
                    blob.len(),
                    blob_len
                )));
            }
            texts.push(row.get::<_, String>(1)?);
            vectors.push(blob_to_embedding(&blob));
        }
    }
    index.add(texts, vectors)?;
    info.passages = index.len();

    debug!(
        path = %path.display(),
        passages = info.passages,
        dimension = info.dimension,
        "snapshot loaded"
    );
    Ok((index, info))
}

/// Reads snapshot metadata and the passage count without loading vectors.
pub fn read_info(path: &Path) -> Result<SnapshotInfo> {
    let conn = open_read_only(path)?;
    let mut info = read_meta(&conn, path)?;
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM passages", [], |row| row.get(0))?;
    info.passages = count as usize;
    Ok(info)
}

fn open_read_only(path: &Path) -> Result<Connection> {
    if !path.is_file() {
        return Err(RagError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("snapshot not found: {}", path.display()),
        )));
    }
    Ok(Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS passages (
            position INTEGER PRIMARY KEY,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn read_meta(conn: &Connection, path: &Path) -> Result<SnapshotInfo> {
    let get = |key: &str| -> Result<Option<String>> {
        let value = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    };

    let schema_version = get("schema_version")?
        .ok_or_else(|| RagError::CorruptSnapshot("missing schema_version".to_string()))?;
    if schema_version != SCHEMA_VERSION {
        return Err(RagError::CorruptSnapshot(format!(
            "unsupported schema version {} (expected {})",
            schema_version, SCHEMA_VERSION
        )));
    }

    let dimension = get("dimension")?
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|d| *d > 0)
        .ok_or_else(|| RagError::CorruptSnapshot("missing or invalid dimension".to_string()))?;

    let created_at = get("created_at")?
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);

    Ok(SnapshotInfo {
        path: path.to_path_buf(),
        schema_version,
        dimension,
        passages: 0,
        model: get("model")?,
        source_hash: get("source_hash")?,
        created_at,
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Converts an embedding vector to a compact blob.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Converts a blob back to an embedding vector.
fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(F32_BYTES)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
