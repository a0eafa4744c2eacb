//! Database layer — migrations plus subscription, verification and chat
//! queries.

use std::str::FromStr;

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::errors::Result;

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    // Make sure the file is created if it doesn't exist yet.
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

    // Every in-memory connection is its own database, so keep exactly one.
    let pool = if url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    }
    .connect_with(options)
    .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Subscriptions
// ─────────────────────────────────────────────────────────

/// Store `email`. Returns `false` when it was already subscribed.
pub async fn insert_subscription(pool: &SqlitePool, email: &str, subscribed_at: i64) -> Result<bool> {
    let rows_affected = sqlx::query(
        "INSERT OR IGNORE INTO subscriptions (email, subscribed_at) VALUES (?1, ?2)",
    )
    .bind(email)
    .bind(subscribed_at)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(rows_affected == 1)
}

// ─────────────────────────────────────────────────────────
// Verifications
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct VerificationRecord {
    /// Lower-cased wallet address.
    pub user_id: String,
    pub verified: bool,
    /// Unix seconds.
    pub timestamp: i64,
    pub attestation_id: String,
    /// Disclosed attributes as a JSON document.
    pub disclose_output: String,
}

/// Insert or replace the record for `record.user_id`.
pub async fn upsert_verification(pool: &SqlitePool, record: &VerificationRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO verifications (user_id, verified, timestamp, attestation_id, disclose_output)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(user_id) DO UPDATE SET
            verified        = excluded.verified,
            timestamp       = excluded.timestamp,
            attestation_id  = excluded.attestation_id,
            disclose_output = excluded.disclose_output
        "#,
    )
    .bind(&record.user_id)
    .bind(record.verified)
    .bind(record.timestamp)
    .bind(&record.attestation_id)
    .bind(&record.disclose_output)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_verification(pool: &SqlitePool, user_id: &str) -> Result<Option<VerificationRecord>> {
    let row = sqlx::query_as::<_, VerificationRecord>(
        r#"
        SELECT user_id, verified, timestamp, attestation_id, disclose_output
        FROM   verifications
        WHERE  user_id = ?1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

// ─────────────────────────────────────────────────────────
// Chat messages
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub network: String,
    pub contract_address: String,
    pub sender: String,
    pub content: String,
    pub timestamp: i64,
    pub edited: bool,
}

pub async fn insert_message(
    pool: &SqlitePool,
    network: &str,
    contract_address: &str,
    sender: &str,
    content: &str,
    timestamp: i64,
) -> Result<ChatMessage> {
    let id = sqlx::query(
        r#"
        INSERT INTO messages (network, contract_address, sender, content, timestamp)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(network)
    .bind(contract_address)
    .bind(sender)
    .bind(content)
    .bind(timestamp)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(ChatMessage {
        id,
        network: network.to_string(),
        contract_address: contract_address.to_string(),
        sender: sender.to_string(),
        content: content.to_string(),
        timestamp,
        edited: false,
    })
}

/// All messages of one pool, oldest first.
pub async fn list_messages(
    pool: &SqlitePool,
    network: &str,
    contract_address: &str,
) -> Result<Vec<ChatMessage>> {
    let rows = sqlx::query_as::<_, ChatMessage>(
        r#"
        SELECT id, network, contract_address, sender, content, timestamp, edited
        FROM   messages
        WHERE  network = ?1 AND contract_address = ?2
        ORDER  BY timestamp ASC, id ASC
        "#,
    )
    .bind(network)
    .bind(contract_address)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_message(
    pool: &SqlitePool,
    network: &str,
    contract_address: &str,
    id: i64,
) -> Result<Option<ChatMessage>> {
    let row = sqlx::query_as::<_, ChatMessage>(
        r#"
        SELECT id, network, contract_address, sender, content, timestamp, edited
        FROM   messages
        WHERE  id = ?1 AND network = ?2 AND contract_address = ?3
        "#,
    )
    .bind(id)
    .bind(network)
    .bind(contract_address)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn update_message(pool: &SqlitePool, id: i64, content: &str) -> Result<()> {
    sqlx::query("UPDATE messages SET content = ?1, edited = TRUE WHERE id = ?2")
        .bind(content)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_message(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM messages WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
