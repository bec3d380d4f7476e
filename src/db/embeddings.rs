//! Embedding storage and nearest-neighbor distance queries.
//!
//! Vectors are stored as little-endian f32 blobs keyed by asset rowid and
//! scanned brute-force; distance is `1 - cosine similarity`, so smaller
//! means more similar and an asset's distance to itself is 0.

use anyhow::Result;
use rusqlite::params;

use super::Database;

/// Embedding record from the database.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub asset_id: i64,
    pub embedding: Vec<f32>,
    pub model_name: String,
}

impl Database {
    /// Store an embedding for an asset, replacing any previous one.
    pub fn store_embedding(&self, asset_id: i64, embedding: &[f32], model_name: &str) -> Result<()> {
        let bytes = embedding_to_bytes(embedding);
        let conn = self.conn();
        conn.execute(
            r#"
            INSERT OR REPLACE INTO embeddings (asset_id, embedding, embedding_dim, model_name, created_at)
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
            "#,
            params![asset_id, bytes, embedding.len() as i64, model_name],
        )?;
        Ok(())
    }

    pub fn get_embedding(&self, asset_id: i64) -> Result<Option<Vec<f32>>> {
        let conn = self.conn();
        let result = conn.query_row(
            "SELECT embedding FROM embeddings WHERE asset_id = ?",
            [asset_id],
            |row| row.get::<_, Vec<u8>>(0),
        );
        match result {
            Ok(bytes) => Ok(Some(bytes_to_embedding(&bytes))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn all_embeddings(&self) -> Result<Vec<EmbeddingRecord>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT asset_id, embedding, model_name FROM embeddings")?;
        let records = stmt
            .query_map([], |row| {
                let bytes: Vec<u8> = row.get(1)?;
                Ok(EmbeddingRecord {
                    asset_id: row.get(0)?,
                    embedding: bytes_to_embedding(&bytes),
                    model_name: row.get(2)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(records)
    }

    pub fn count_embeddings(&self) -> Result<i64> {
        let conn = self.conn();
        let count = conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Nearest neighbors of a query vector as `(asset_id, distance)`
    /// pairs, ascending by distance, bounded by `limit`.
    pub fn nearest_neighbors(
        &self,
        query: &[f32],
        limit: usize,
        exclude: Option<i64>,
    ) -> Result<Vec<(i64, f32)>> {
        let embeddings = self.all_embeddings()?;

        let mut results: Vec<(i64, f32)> = embeddings
            .iter()
            .filter(|record| Some(record.asset_id) != exclude)
            .map(|record| {
                let distance = 1.0 - cosine_similarity(query, &record.embedding);
                (record.asset_id, distance)
            })
            .collect();

        results.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }
}

/// Convert an f32 slice to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}

/// Convert stored bytes back to an f32 vector.
fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| {
            let mut arr = [0u8; 4];
            arr.copy_from_slice(chunk);
            f32::from_le_bytes(arr)
        })
        .collect()
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
