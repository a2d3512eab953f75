//! Contributor persistence

use fleetspot_common::db::Contributor;
use fleetspot_common::time;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::error::IngestResult;

/// Result of offering a preferred name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameChange {
    Saved(String),
    /// Contributor already has a name; it is never overwritten
    AlreadyNamed(String),
    /// Sender has never recorded a sighting
    UnknownSender,
}

fn contributor_from_row(row: &SqliteRow) -> Contributor {
    Contributor {
        id: row.get("id"),
        sender: row.get("sender"),
        external_handle: row.get("external_handle"),
        preferred_name: row.get("preferred_name"),
    }
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> IngestResult<Option<Contributor>> {
    let row = sqlx::query(
        "SELECT id, sender, external_handle, preferred_name FROM contributors WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(contributor_from_row))
}

pub async fn find_by_sender(pool: &SqlitePool, sender: &str) -> IngestResult<Option<Contributor>> {
    let row = sqlx::query(
        "SELECT id, sender, external_handle, preferred_name FROM contributors WHERE sender = ?",
    )
    .bind(sender)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(contributor_from_row))
}

/// Contributor for `sender`, created on first use
pub async fn get_or_create_by_sender(pool: &SqlitePool, sender: &str) -> IngestResult<Contributor> {
    sqlx::query("INSERT OR IGNORE INTO contributors (sender, created_at) VALUES (?, ?)")
        .bind(sender)
        .bind(time::to_db_string(&time::now()))
        .execute(pool)
        .await?;

    find_by_sender(pool, sender).await?.ok_or_else(|| {
        fleetspot_common::Error::Internal(format!("Contributor for {} vanished after insert", sender))
            .into()
    })
}

/// Store a preferred name unless one is already set
pub async fn set_name_if_absent(pool: &SqlitePool, sender: &str, name: &str) -> IngestResult<NameChange> {
    let Some(contributor) = find_by_sender(pool, sender).await? else {
        return Ok(NameChange::UnknownSender);
    };
    if let Some(existing) = contributor.preferred_name {
        return Ok(NameChange::AlreadyNamed(existing));
    }

    let updated = sqlx::query(
        "UPDATE contributors SET preferred_name = ? WHERE id = ? AND preferred_name IS NULL",
    )
    .bind(name)
    .bind(contributor.id)
    .execute(pool)
    .await?
    .rows_affected();

    if updated == 0 {
        // Named concurrently
        let current = find_by_id(pool, contributor.id)
            .await?
            .and_then(|c| c.preferred_name)
            .unwrap_or_default();
        return Ok(NameChange::AlreadyNamed(current));
    }

    tracing::info!(contributor_id = contributor.id, "Preferred name saved");
    Ok(NameChange::Saved(name.to_string()))
}
