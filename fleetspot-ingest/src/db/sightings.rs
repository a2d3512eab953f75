//! Sighting persistence and the unposted queue

use chrono::{DateTime, Utc};
use fleetspot_common::db::{Contributor, Sighting};
use fleetspot_common::time;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use super::{retry_on_lock, MAX_LOCK_WAIT_MS};
use crate::error::IngestResult;
use crate::models::{NewSighting, QueuedSighting};

/// Insert a sighting and return its id
///
/// A content hash that already exists fails with a UNIQUE violation, which
/// callers treat as a duplicate.
pub async fn insert(
    pool: &SqlitePool,
    sighting: &NewSighting,
    created_at: DateTime<Utc>,
) -> IngestResult<i64> {
    let timestamp = time::to_db_string(&sighting.timestamp);
    let created_at = time::to_db_string(&created_at);
    let borough = sighting.borough.map(|b| b.name());

    let id = retry_on_lock("insert_sighting", MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            r#"
            INSERT INTO sightings (
                plate, timestamp, latitude, longitude, borough, contributor_id,
                image_ref, content_hash, perceptual_hash, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sighting.plate)
        .bind(&timestamp)
        .bind(sighting.latitude)
        .bind(sighting.longitude)
        .bind(borough)
        .bind(sighting.contributor_id)
        .bind(&sighting.image_ref)
        .bind(&sighting.content_hash)
        .bind(&sighting.perceptual_hash)
        .bind(&created_at)
        .execute(pool)
        .await?;
        Ok(result.last_insert_rowid())
    })
    .await?;

    Ok(id)
}

pub async fn find_by_content_hash(pool: &SqlitePool, content_hash: &str) -> IngestResult<Option<i64>> {
    let id: Option<i64> = sqlx::query_scalar("SELECT id FROM sightings WHERE content_hash = ? LIMIT 1")
        .bind(content_hash)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

/// All stored perceptual hashes with their sighting ids
pub async fn perceptual_hashes(pool: &SqlitePool) -> IngestResult<Vec<(i64, String)>> {
    let rows: Vec<(i64, String)> = sqlx::query_as(
        "SELECT id, perceptual_hash FROM sightings WHERE perceptual_hash IS NOT NULL ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> IngestResult<Option<Sighting>> {
    let row = sqlx::query(
        r#"
        SELECT id, plate, timestamp, latitude, longitude, borough, contributor_id, image_ref,
               content_hash, perceptual_hash, created_at, posted_at, post_reference, publish_error
        FROM sightings
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let timestamp: String = row.get("timestamp");
    let created_at: String = row.get("created_at");
    Ok(Some(Sighting {
        id: row.get("id"),
        plate: row.get("plate"),
        timestamp: time::parse_db_string("timestamp", &timestamp)?,
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        borough: row.get("borough"),
        contributor_id: row.get("contributor_id"),
        image_ref: row.get("image_ref"),
        content_hash: row.get("content_hash"),
        perceptual_hash: row.get("perceptual_hash"),
        created_at: time::parse_db_string("created_at", &created_at)?,
        posted_at: time::parse_optional_db_string("posted_at", row.get("posted_at"))?,
        post_reference: row.get("post_reference"),
        publish_error: row.get("publish_error"),
    }))
}

/// Unposted sightings, oldest first, with their contributors
///
/// Sightings withdrawn by `mark_unpublishable` are left out.
pub async fn unposted_queue(pool: &SqlitePool) -> IngestResult<Vec<QueuedSighting>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.plate, s.image_ref, s.created_at,
               c.id AS contributor_id, c.sender, c.external_handle, c.preferred_name
        FROM sightings s
        JOIN contributors c ON c.id = s.contributor_id
        WHERE s.posted_at IS NULL AND s.publish_error IS NULL
        ORDER BY s.created_at ASC, s.id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let created_at: String = row.get("created_at");
            Ok(QueuedSighting {
                id: row.get("id"),
                plate: row.get("plate"),
                image_ref: row.get("image_ref"),
                created_at: time::parse_db_string("created_at", &created_at)?,
                contributor: Contributor {
                    id: row.get("contributor_id"),
                    sender: row.get("sender"),
                    external_handle: row.get("external_handle"),
                    preferred_name: row.get("preferred_name"),
                },
            })
        })
        .collect()
}

/// Mark sightings as posted under one reference
///
/// Runs in one transaction and only touches rows not yet posted, so
/// `posted_at` is set at most once. Returns the number of rows changed.
pub async fn mark_posted(
    pool: &SqlitePool,
    ids: &[i64],
    post_reference: &str,
    posted_at: DateTime<Utc>,
) -> IngestResult<u64> {
    let posted_at = time::to_db_string(&posted_at);
    let mut tx = pool.begin().await?;
    let mut changed = 0;
    for id in ids {
        changed += sqlx::query(
            "UPDATE sightings SET posted_at = ?, post_reference = ? WHERE id = ? AND posted_at IS NULL",
        )
        .bind(&posted_at)
        .bind(post_reference)
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }
    tx.commit().await?;
    Ok(changed)
}

/// Withdraw an unposted sighting from publishing, recording why
pub async fn mark_unpublishable(pool: &SqlitePool, id: i64, reason: &str) -> IngestResult<u64> {
    let changed = sqlx::query(
        "UPDATE sightings SET publish_error = ? WHERE id = ? AND posted_at IS NULL",
    )
    .bind(reason)
    .bind(id)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(changed)
}

/// Sightings recorded for one plate
pub async fn count_for_plate(pool: &SqlitePool, plate: &str) -> IngestResult<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sightings WHERE plate = ?")
        .bind(plate)
        .fetch_one(pool)
        .await?;
    Ok(n)
}

pub async fn count_all(pool: &SqlitePool) -> IngestResult<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sightings")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

pub async fn count_for_contributor(pool: &SqlitePool, contributor_id: i64) -> IngestResult<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sightings WHERE contributor_id = ?")
        .bind(contributor_id)
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// All-time sighting count per contributor
pub async fn totals_by_contributor(pool: &SqlitePool) -> IngestResult<HashMap<i64, i64>> {
    let rows: Vec<(i64, i64)> =
        sqlx::query_as("SELECT contributor_id, COUNT(*) FROM sightings GROUP BY contributor_id")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().collect())
}

/// Number of distinct plates ever sighted
pub async fn distinct_plate_count(pool: &SqlitePool) -> IngestResult<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT plate) FROM sightings")
        .fetch_one(pool)
        .await?;
    Ok(n)
}
