//! Document repository over the key-value table.
//!
//! Every write batch runs in one transaction together with the revision bump.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::RevisionInfo;

/// Stable document keys, one per concern.
pub mod keys {
    pub const SETTINGS: &str = "nomina_settings";
    pub const WORKERS: &str = "nomina_workers";
    pub const INVOICES: &str = "nomina_pending_invoices";
    pub const ID_WATERMARK: &str = "nomina_id_watermark";

    const NOTE_PREFIX: &str = "nomina_doc_";

    /// Key of the note belonging to `worker_id`.
    pub fn note(worker_id: i64) -> String {
        format!("{}{}", NOTE_PREFIX, worker_id)
    }
}

/// One change inside a write batch.
#[derive(Debug, Clone)]
pub enum DocumentWrite {
    Put { key: String, value: String },
    Delete { key: String },
}

impl DocumentWrite {
    /// Serialize `value` as the new content of `key`.
    pub fn put<T: Serialize + ?Sized>(key: impl Into<String>, value: &T) -> Result<Self, AppError> {
        Ok(DocumentWrite::Put {
            key: key.into(),
            value: serde_json::to_string(value)?,
        })
    }

    pub fn delete(key: impl Into<String>) -> Self {
        DocumentWrite::Delete { key: key.into() }
    }
}

/// Database repository for all document operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Get revision info.
    pub async fn get_revision_info(&self) -> Result<RevisionInfo, AppError> {
        let row = sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(RevisionInfo {
            revision_id: row.get("revision_id"),
            generated_at: row.get("generated_at"),
        })
    }

    /// Read and deserialize one document.
    pub async fn get_document<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AppError> {
        let row = sqlx::query("SELECT value FROM documents WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let value: String = row.get("value");
                Ok(Some(serde_json::from_str(&value)?))
            }
            None => Ok(None),
        }
    }

    /// Whether a document exists under `key`.
    pub async fn has_document(&self, key: &str) -> Result<bool, AppError> {
        let row = sqlx::query("SELECT 1 AS present FROM documents WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Apply a batch of writes atomically and return the new revision ID.
    pub async fn write_documents(&self, writes: &[DocumentWrite]) -> Result<i64, AppError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for write in writes {
            match write {
                DocumentWrite::Put { key, value } => {
                    sqlx::query(
                        "INSERT INTO documents (key, value, updated_at) VALUES (?, ?, ?) \
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    )
                    .bind(key)
                    .bind(value)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await?;
                }
                DocumentWrite::Delete { key } => {
                    sqlx::query("DELETE FROM documents WHERE key = ?")
                        .bind(key)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
            .bind(&now)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&mut *tx)
            .await?;
        let revision_id: i64 = row.get("revision_id");

        tx.commit().await?;

        tracing::debug!(writes = writes.len(), revision_id, "Committed document batch");
        Ok(revision_id)
    }
}
