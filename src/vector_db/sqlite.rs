//! SQLite-backed [`VectorDatabase`].
//!
//! Each collection is a row in `collections`; points live in `points`
//! with their embedding stored as a little-endian f32 BLOB. Search loads
//! every vector in the collection and ranks by cosine similarity.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use tracing::info;

use habit_context_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use habit_context_core::{Chunk, ContextError, ScoredChunk};

use super::{VectorDatabase, VectorPoint};
use crate::db;

pub struct SqliteVectorDatabase {
    path: PathBuf,
    pool: SqlitePool,
}

impl SqliteVectorDatabase {
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            pool,
        })
    }

    async fn collection_dims(&self, collection: &str) -> Result<Option<usize>> {
        let dims: Option<i64> = sqlx::query_scalar("SELECT dims FROM collections WHERE name = ?")
            .bind(collection)
            .fetch_optional(&self.pool)
            .await?;
        Ok(dims.map(|d| d as usize))
    }
}

async fn write_points(
    conn: &mut sqlx::SqliteConnection,
    collection: &str,
    dims: usize,
    points: &[VectorPoint],
) -> Result<()> {
    for point in points {
        if point.vector.len() != dims {
            bail!(
                "embedding dimension mismatch: collection {} has {}, got {}",
                collection,
                dims,
                point.vector.len()
            );
        }
        sqlx::query(
            r#"
            INSERT INTO points (collection, id, source, chunk_index, text, hash, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET
                source = excluded.source,
                chunk_index = excluded.chunk_index,
                text = excluded.text,
                hash = excluded.hash,
                embedding = excluded.embedding
            "#,
        )
        .bind(collection)
        .bind(&point.chunk.id)
        .bind(&point.chunk.source)
        .bind(point.chunk.chunk_index)
        .bind(&point.chunk.text)
        .bind(&point.chunk.hash)
        .bind(vec_to_blob(&point.vector))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl VectorDatabase for SqliteVectorDatabase {
    fn describe(&self) -> String {
        format!("sqlite {}", self.path.display())
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.collection_dims(collection).await?.is_some())
    }

    async fn create_collection(
        &self,
        collection: &str,
        dims: usize,
        points: &[VectorPoint],
    ) -> Result<()> {
        // One transaction: a failed populate rolls the collection back too.
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO collections (name, dims, created_at) VALUES (?, ?, ?) ON CONFLICT(name) DO NOTHING",
        )
        .bind(collection)
        .bind(dims as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if inserted == 0 {
            bail!("collection {} already exists", collection);
        }

        write_points(&mut tx, collection, dims, points).await?;
        tx.commit().await?;

        info!(collection, dims, points = points.len(), "created sqlite collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: &[VectorPoint]) -> Result<()> {
        let Some(dims) = self.collection_dims(collection).await? else {
            return Err(ContextError::NotInitialized(format!(
                "collection {} does not exist",
                collection
            ))
            .into());
        };
        let mut tx = self.pool.begin().await?;
        write_points(&mut tx, collection, dims, points).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let rows = sqlx::query(
            "SELECT id, source, chunk_index, text, hash, embedding FROM points WHERE collection = ?",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ScoredChunk {
                    score: cosine_similarity(vector, &blob_to_vec(&blob)) as f64,
                    chunk: Chunk {
                        id: row.get("id"),
                        source: row.get("source"),
                        chunk_index: row.get("chunk_index"),
                        text: row.get("text"),
                        hash: row.get("hash"),
                    },
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM points WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}
