//! Persistent vector store for indexed chunks.
//!
//! One redb table maps chunk id to an encoded row. Binary format per entry:
//!
//! - 4 bytes: `line_start` (u32 LE)
//! - 4 bytes: `line_end` (u32 LE)
//! - 8 bytes: `timestamp` in ms (u64 LE)
//! - 4 bytes: vector dimension D (u32 LE)
//! - length-prefixed (u32 LE) hash, filepath, and content strings
//! - D * 4 bytes: f32 LE vector values
//!
//! Queries run an exact scan under a redb read transaction, so searches see
//! a consistent snapshot while the indexer writes.

use std::{collections::HashSet, path::Path};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::{chunk_id::ChunkId, error::Result};

const CHUNKS: TableDefinition<u128, &[u8]> = TableDefinition::new("chunks");

/// Fixed-size prefix: line_start + line_end + timestamp + dimension.
const HEADER_SIZE: usize = 20;

/// One indexed region of a file, as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub id: ChunkId,
    pub filepath: String,
    pub content: String,
    pub line_start: u32,
    pub line_end: u32,
    pub vector: Vec<f32>,
    /// Hex SHA-256 of the whole file at indexing time.
    pub hash: String,
    /// Insertion wall-clock time in ms.
    pub timestamp: u64,
}

/// A ranked search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: ChunkId,
    pub filepath: String,
    pub content: String,
    pub line_start: u32,
    pub line_end: u32,
    /// `1 / (1 + distance)`; higher is closer.
    pub score: f32,
}

/// Aggregate store counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub total_chunks: u64,
    pub unique_files: u64,
}

/// Chunk rows keyed by id, persisted in a single redb database.
pub struct VectorStore {
    db: Database,
}

impl VectorStore {
    /// Open or create the store at the given path. Idempotent.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(CHUNKS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Append rows in a single transaction. Each row carries its own id.
    pub fn insert(&self, rows: &[ChunkRecord]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(CHUNKS)?;
            for row in rows {
                let encoded = encode_row(row);
                table.insert(row.id.value(), encoded.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Remove rows by id. Absent ids are not an error.
    pub fn delete_by_ids(&self, ids: &[ChunkId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(CHUNKS)?;
            for id in ids {
                table.remove(id.value())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Remove every row whose filepath equals `path`. Returns the number of
    /// rows removed.
    pub fn delete_by_filepath(&self, path: &str) -> Result<usize> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(CHUNKS)?;
            let mut doomed = Vec::new();
            for entry in table.iter()? {
                let (k, v) = entry?;
                if let Some(row_path) = decode_filepath(v.value())
                    && row_path == path
                {
                    doomed.push(k.value());
                }
            }
            for id in &doomed {
                table.remove(id)?;
            }
            doomed.len()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Nearest-neighbor search by L2 distance, ascending.
    ///
    /// With `path_prefix`, only rows whose filepath begins with the prefix
    /// are considered. The prefix is compared structurally against decoded
    /// rows, so quotes, backslashes, and control characters in a
    /// user-supplied path need no escaping.
    pub fn search(
        &self,
        query: &[f32],
        limit: usize,
        path_prefix: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CHUNKS)?;

        let mut scored: Vec<(f32, SearchHit)> = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            let Some(row) = decode_row(ChunkId::from_value(k.value()), v.value()) else {
                continue;
            };
            if let Some(prefix) = path_prefix
                && !row.filepath.starts_with(prefix)
            {
                continue;
            }

            let (distance, score) = if row.vector.len() == query.len() {
                let d = l2_distance(query, &row.vector);
                (d, 1.0 / (1.0 + d))
            } else {
                (f32::INFINITY, 0.0)
            };
            scored.push((
                distance,
                SearchHit {
                    id: row.id,
                    filepath: row.filepath,
                    content: row.content,
                    line_start: row.line_start,
                    line_end: row.line_end,
                    score,
                },
            ));
        }

        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(_, hit)| hit).collect())
    }

    /// Fetch one row by id, mainly for tests and diagnostics.
    pub fn get(&self, id: ChunkId) -> Result<Option<ChunkRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CHUNKS)?;
        let Some(guard) = table.get(id.value())? else {
            return Ok(None);
        };
        Ok(decode_row(id, guard.value()))
    }

    pub fn count(&self) -> Result<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CHUNKS)?;
        let mut total = 0u64;
        for entry in table.iter()? {
            entry?;
            total += 1;
        }
        Ok(total)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(CHUNKS)?;

        let mut total = 0u64;
        let mut files = HashSet::new();
        for entry in table.iter()? {
            let (_, v) = entry?;
            total += 1;
            if let Some(path) = decode_filepath(v.value()) {
                files.insert(path);
            }
        }
        Ok(StoreStats {
            total_chunks: total,
            unique_files: files.len() as u64,
        })
    }

    /// Truncate all rows.
    pub fn clear(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.delete_table(CHUNKS)?;
        txn.open_table(CHUNKS)?;
        txn.commit()?;
        Ok(())
    }
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore").finish_non_exhaustive()
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

fn encode_row(row: &ChunkRecord) -> Vec<u8> {
    let dim = row.vector.len() as u32;
    let mut out = Vec::with_capacity(
        HEADER_SIZE
            + 12
            + row.hash.len()
            + row.filepath.len()
            + row.content.len()
            + row.vector.len() * 4,
    );
    out.extend_from_slice(&row.line_start.to_le_bytes());
    out.extend_from_slice(&row.line_end.to_le_bytes());
    out.extend_from_slice(&row.timestamp.to_le_bytes());
    out.extend_from_slice(&dim.to_le_bytes());
    for field in [&row.hash, &row.filepath, &row.content] {
        out.extend_from_slice(&(field.len() as u32).to_le_bytes());
        out.extend_from_slice(field.as_bytes());
    }
    out.extend_from_slice(bytemuck::cast_slice(&row.vector));
    out
}

/// Decode a stored row. Returns `None` for entries whose layout does not
/// match, rather than failing the whole scan.
fn decode_row(id: ChunkId, bytes: &[u8]) -> Option<ChunkRecord> {
    if bytes.len() < HEADER_SIZE {
        return None;
    }
    let line_start = u32::from_le_bytes(bytes[0..4].try_into().ok()?);
    let line_end = u32::from_le_bytes(bytes[4..8].try_into().ok()?);
    let timestamp = u64::from_le_bytes(bytes[8..16].try_into().ok()?);
    let dim = u32::from_le_bytes(bytes[16..20].try_into().ok()?) as usize;

    let mut offset = HEADER_SIZE;
    let mut strings = Vec::with_capacity(3);
    for _ in 0..3 {
        let len = u32::from_le_bytes(bytes.get(offset..offset + 4)?.try_into().ok()?) as usize;
        offset += 4;
        let raw = bytes.get(offset..offset + len)?;
        strings.push(std::str::from_utf8(raw).ok()?.to_string());
        offset += len;
    }
    let content = strings.pop()?;
    let filepath = strings.pop()?;
    let hash = strings.pop()?;

    let raw_vector = bytes.get(offset..)?;
    if raw_vector.len() != dim * 4 {
        return None;
    }
    let vector: Vec<f32> = bytemuck::pod_collect_to_vec(raw_vector);

    Some(ChunkRecord {
        id,
        filepath,
        content,
        line_start,
        line_end,
        vector,
        hash,
        timestamp,
    })
}

/// Decode only the filepath field, skipping the rest of the row.
fn decode_filepath(bytes: &[u8]) -> Option<String> {
    let mut offset = HEADER_SIZE;
    let hash_len = u32::from_le_bytes(bytes.get(offset..offset + 4)?.try_into().ok()?) as usize;
    offset += 4 + hash_len;
    let path_len = u32::from_le_bytes(bytes.get(offset..offset + 4)?.try_into().ok()?) as usize;
    offset += 4;
    let raw = bytes.get(offset..offset + path_len)?;
    std::str::from_utf8(raw).ok().map(str::to_string)
}
