//! Long-term memory repository
//!
//! Two kinds of rows: explicit facts the user asked the assistant to
//! remember, and past question/answer exchanges consulted as a cache before
//! asking the chat model.

use chrono::Utc;
use uuid::Uuid;

use super::DbPool;
use crate::{Error, Result};

/// Minimum keyword length used for fact recall matching
const MIN_KEYWORD_CHARS: usize = 4;

/// Repository for facts and cached exchanges
#[derive(Clone)]
pub struct MemoryRepo {
    pool: DbPool,
}

impl MemoryRepo {
    /// Create a repository over the pool
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Store an explicit fact
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails
    pub fn store_fact(&self, content: &str) -> Result<()> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        conn.execute(
            "INSERT INTO facts (id, content, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                content,
                Utc::now().to_rfc3339()
            ],
        )?;
        tracing::debug!(content, "fact stored");
        Ok(())
    }

    /// Find the most recent fact matching any keyword of the query
    ///
    /// # Errors
    ///
    /// Returns error if the query fails
    pub fn recall(&self, query: &str) -> Result<Option<String>> {
        let keywords: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .filter(|w| w.chars().count() >= MIN_KEYWORD_CHARS)
            .map(String::from)
            .collect();

        if keywords.is_empty() {
            return Ok(None);
        }

        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT content FROM facts WHERE lower(content) LIKE ?1
             ORDER BY created_at DESC LIMIT 1",
        )?;

        for keyword in keywords {
            let pattern = format!("%{keyword}%");
            let found: Option<String> = stmt
                .query_row([&pattern], |row| row.get(0))
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;
            if found.is_some() {
                return Ok(found);
            }
        }

        Ok(None)
    }

    /// Persist one question/answer exchange
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails
    pub fn store_exchange(&self, question: &str, answer: &str) -> Result<()> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        conn.execute(
            "INSERT INTO exchanges (id, question, answer, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                question.to_lowercase().trim(),
                answer,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Look up a cached answer for an identical past question
    ///
    /// # Errors
    ///
    /// Returns error if the query fails
    pub fn cached_answer(&self, question: &str) -> Result<Option<String>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        let normalized = question.to_lowercase();
        let normalized = normalized.trim();

        let answer = conn
            .query_row(
                "SELECT answer FROM exchanges WHERE question = ?1
                 ORDER BY created_at DESC LIMIT 1",
                [normalized],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        Ok(answer)
    }
}
