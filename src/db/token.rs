//! Refresh token storage.
//!
//! Only a keyed hash of each refresh token is stored. Rows are never deleted;
//! revocation flips `is_revoked`. At most one row per user is active at a time:
//! every insert revokes the user's previous active rows in the same transaction.

use sqlx::sqlite::SqlitePool;
use sqlx::{Sqlite, Transaction};

/// A stored refresh token record.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub username: String,
    pub token_hash: String,
    /// Expiry as a Unix timestamp (seconds)
    pub expires_at: i64,
    pub is_revoked: bool,
}

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    id: i64,
    username: String,
    token_hash: String,
    expires_at: i64,
    is_revoked: i32,
}

impl From<RefreshTokenRow> for RefreshTokenRecord {
    fn from(row: RefreshTokenRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            token_hash: row.token_hash,
            expires_at: row.expires_at,
            is_revoked: row.is_revoked != 0,
        }
    }
}

/// Store for refresh token records.
pub struct RefreshTokenStore {
    pool: SqlitePool,
}

impl RefreshTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the most recently created refresh token for a user, revoked or not.
    pub async fn latest_for_user(
        &self,
        username: &str,
    ) -> Result<Option<RefreshTokenRecord>, sqlx::Error> {
        let row: Option<RefreshTokenRow> = sqlx::query_as(
            "SELECT id, username, token_hash, expires_at, is_revoked FROM refresh_tokens WHERE username = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RefreshTokenRecord::from))
    }

    /// Revoke all active tokens for a user and insert a new one, atomically.
    /// Returns the new record's ID.
    pub async fn issue(
        &self,
        username: &str,
        token_hash: &str,
        expires_at: i64,
    ) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        revoke_active(&mut tx, username).await?;
        let id = insert(&mut tx, username, token_hash, expires_at).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Exchange `previous_id` for a new token, atomically.
    ///
    /// The previous row is revoked with a conditional update; if another
    /// rotation already revoked it, nothing is written and `None` is returned.
    pub async fn rotate(
        &self,
        previous_id: i64,
        username: &str,
        token_hash: &str,
        expires_at: i64,
    ) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = 1 WHERE id = ? AND username = ? AND is_revoked = 0",
        )
        .bind(previous_id)
        .bind(username)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        revoke_active(&mut tx, username).await?;
        let id = insert(&mut tx, username, token_hash, expires_at).await?;
        tx.commit().await?;
        Ok(Some(id))
    }

    /// Count a user's non-revoked tokens.
    pub async fn active_count(&self, username: &str) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM refresh_tokens WHERE username = ? AND is_revoked = 0",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }

    /// Revoke all of a user's tokens, signing them out everywhere.
    pub async fn revoke_all(&self, username: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = 1 WHERE username = ? AND is_revoked = 0",
        )
        .bind(username)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

async fn revoke_active(
    tx: &mut Transaction<'_, Sqlite>,
    username: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE refresh_tokens SET is_revoked = 1 WHERE username = ? AND is_revoked = 0",
    )
    .bind(username)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

async fn insert(
    tx: &mut Transaction<'_, Sqlite>,
    username: &str,
    token_hash: &str,
    expires_at: i64,
) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO refresh_tokens (username, token_hash, expires_at) VALUES (?, ?, ?)",
    )
    .bind(username)
    .bind(token_hash)
    .bind(expires_at)
    .execute(&mut **tx)
    .await?;
    Ok(result.last_insert_rowid())
}
