//! Conversation persistence
//!
//! One row per sender. Updates are partial: only fields carried by the
//! [`ConversationUpdate`] are written, and `Patch::Clear` writes NULL.

use chrono::{DateTime, Utc};
use fleetspot_common::time;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqlitePool};

use super::{retry_on_lock, MAX_LOCK_WAIT_MS};
use crate::error::IngestResult;
use crate::models::{Conversation, ConversationState, ConversationUpdate, Patch};

const CONVERSATION_COLUMNS: &str = "sender, state, pending_image_ref, pending_plate, \
     pending_latitude, pending_longitude, pending_timestamp, pending_borough, \
     pending_image_timestamp, created_at, updated_at";

fn conversation_from_row(row: &SqliteRow) -> IngestResult<Conversation> {
    let state: String = row.get("state");
    let borough: Option<String> = row.get("pending_borough");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Conversation {
        sender: row.get("sender"),
        state: ConversationState::from_db(&state),
        pending_image_ref: row.get("pending_image_ref"),
        pending_plate: row.get("pending_plate"),
        pending_latitude: row.get("pending_latitude"),
        pending_longitude: row.get("pending_longitude"),
        pending_timestamp: time::parse_optional_db_string(
            "pending_timestamp",
            row.get("pending_timestamp"),
        )?,
        // An unknown stored borough is dropped rather than failing the turn
        pending_borough: borough.and_then(|name| name.parse().ok()),
        pending_image_timestamp: time::parse_optional_db_string(
            "pending_image_timestamp",
            row.get("pending_image_timestamp"),
        )?,
        created_at: time::parse_db_string("created_at", &created_at)?,
        updated_at: time::parse_db_string("updated_at", &updated_at)?,
    })
}

pub async fn find(pool: &SqlitePool, sender: &str) -> IngestResult<Option<Conversation>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM conversations WHERE sender = ?",
        CONVERSATION_COLUMNS
    ))
    .bind(sender)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(conversation_from_row).transpose()
}

/// Load the sender's conversation, creating an idle one if missing
///
/// The flag is true when the row was created by this call.
pub async fn get_or_create(pool: &SqlitePool, sender: &str) -> IngestResult<(Conversation, bool)> {
    let now = time::to_db_string(&time::now());
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO conversations (sender, state, created_at, updated_at) VALUES (?, 'idle', ?, ?)",
    )
    .bind(sender)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?
    .rows_affected()
        > 0;

    let conversation = find(pool, sender).await?.ok_or_else(|| {
        fleetspot_common::Error::Internal(format!("Conversation for {} vanished after insert", sender))
    })?;

    if inserted {
        tracing::debug!(sender = %sender, "New conversation created");
    }
    Ok((conversation, inserted))
}

fn push_patch<'a, T>(
    builder: &mut QueryBuilder<'a, Sqlite>,
    column: &str,
    patch: &Patch<T>,
    encode: impl Fn(&T) -> BindValue,
) {
    let Some(value) = patch.as_write() else {
        return;
    };
    builder.push(", ").push(column).push(" = ");
    match value.map(encode) {
        None => builder.push("NULL"),
        Some(BindValue::Text(s)) => builder.push_bind(s),
        Some(BindValue::Real(f)) => builder.push_bind(f),
    };
}

/// Owned value bound into a partial update
enum BindValue {
    Text(String),
    Real(f64),
}

fn text(value: &String) -> BindValue {
    BindValue::Text(value.clone())
}

fn real(value: &f64) -> BindValue {
    BindValue::Real(*value)
}

fn timestamp(value: &DateTime<Utc>) -> BindValue {
    BindValue::Text(time::to_db_string(value))
}

/// Build the UPDATE statement for a normalized update
fn build_update<'a>(
    sender: &'a str,
    update: &ConversationUpdate,
    updated_at: &DateTime<Utc>,
) -> QueryBuilder<'a, Sqlite> {
    let mut builder = QueryBuilder::new("UPDATE conversations SET ");
    builder.push("updated_at = ");
    builder.push_bind(time::to_db_string(updated_at));

    if let Some(state) = &update.state {
        builder.push(", state = ");
        builder.push_bind(state.as_str().to_string());
    }
    push_patch(&mut builder, "pending_image_ref", &update.pending_image_ref, text);
    push_patch(&mut builder, "pending_plate", &update.pending_plate, text);
    push_patch(&mut builder, "pending_latitude", &update.pending_latitude, real);
    push_patch(&mut builder, "pending_longitude", &update.pending_longitude, real);
    push_patch(&mut builder, "pending_timestamp", &update.pending_timestamp, timestamp);
    push_patch(&mut builder, "pending_borough", &update.pending_borough, |b| {
        BindValue::Text(b.name().to_string())
    });
    push_patch(
        &mut builder,
        "pending_image_timestamp",
        &update.pending_image_timestamp,
        timestamp,
    );

    builder.push(" WHERE sender = ");
    builder.push_bind(sender);
    builder
}

/// Apply a partial update, enforcing the coordinate rule
pub async fn apply_update(
    pool: &SqlitePool,
    sender: &str,
    update: ConversationUpdate,
) -> IngestResult<()> {
    let update = update.normalized();
    if update.is_empty() {
        return Ok(());
    }
    let now = time::now();

    tracing::debug!(sender = %sender, state = ?update.state, "Updating conversation");

    retry_on_lock("update_conversation", MAX_LOCK_WAIT_MS, || async {
        build_update(sender, &update, &now)
            .build()
            .execute(pool)
            .await?;
        Ok(())
    })
    .await?;

    Ok(())
}

/// Reset to idle with every pending field cleared
pub async fn reset(pool: &SqlitePool, sender: &str) -> IngestResult<()> {
    apply_update(pool, sender, ConversationUpdate::reset()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_sql_lists_only_touched_columns() {
        let update = ConversationUpdate {
            pending_plate: Patch::Set("T123456C".to_string()),
            pending_borough: Patch::Clear,
            ..Default::default()
        };
        let now = time::now();
        let builder = build_update("+15550001111", &update, &now);
        let sql = builder.sql();

        assert!(sql.contains("pending_plate = ?"));
        assert!(sql.contains("pending_borough = NULL"));
        assert!(!sql.contains("pending_latitude"));
        assert!(!sql.contains("state ="));
        assert!(sql.ends_with("WHERE sender = ?"));
    }

    #[test]
    fn test_update_sql_with_state() {
        let update = ConversationUpdate::to_state(ConversationState::AwaitingPlate).normalized();
        let now = time::now();
        let builder = build_update("+15550001111", &update, &now);
        let sql = builder.sql();

        assert!(sql.contains(", state = ?"));
        assert!(sql.contains("pending_latitude = NULL"));
        assert!(sql.contains("pending_longitude = NULL"));
    }
}
