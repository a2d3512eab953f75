//! Read-only vehicle registry lookups

use fleetspot_common::db::RegistryEntry;
use sqlx::SqlitePool;

use crate::error::IngestResult;

const ENTRY_COLUMNS: &str =
    "plate, owner_name, vehicle_id, vehicle_year, base_name, base_type";

/// Exact lookup; `plate` must already be normalized
pub async fn find_by_plate(pool: &SqlitePool, plate: &str) -> IngestResult<Option<RegistryEntry>> {
    let entry = sqlx::query_as::<_, RegistryEntry>(&format!(
        "SELECT {} FROM registry_vehicles WHERE plate = ?",
        ENTRY_COLUMNS
    ))
    .bind(plate)
    .fetch_optional(pool)
    .await?;
    Ok(entry)
}

/// Entries whose plate has `len` characters, ordered by plate
pub async fn entries_with_length(pool: &SqlitePool, len: usize) -> IngestResult<Vec<RegistryEntry>> {
    let entries = sqlx::query_as::<_, RegistryEntry>(&format!(
        "SELECT {} FROM registry_vehicles WHERE length(plate) = ? ORDER BY plate",
        ENTRY_COLUMNS
    ))
    .bind(len as i64)
    .fetch_all(pool)
    .await?;
    Ok(entries)
}

/// Plates with `len` characters, ordered
pub async fn plates_with_length(pool: &SqlitePool, len: usize) -> IngestResult<Vec<String>> {
    let plates: Vec<String> = sqlx::query_scalar(
        "SELECT plate FROM registry_vehicles WHERE length(plate) = ? ORDER BY plate",
    )
    .bind(len as i64)
    .fetch_all(pool)
    .await?;
    Ok(plates)
}

/// Number of registered vehicles
pub async fn count(pool: &SqlitePool) -> IngestResult<i64> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM registry_vehicles")
        .fetch_one(pool)
        .await?;
    Ok(total)
}

/// Insert or replace an entry
///
/// Used by seeding and tests; the conversation path never writes the registry.
pub async fn upsert(pool: &SqlitePool, entry: &RegistryEntry) -> IngestResult<()> {
    sqlx::query(
        r#"
        INSERT INTO registry_vehicles (plate, owner_name, vehicle_id, vehicle_year, base_name, base_type)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(plate) DO UPDATE SET
            owner_name = excluded.owner_name,
            vehicle_id = excluded.vehicle_id,
            vehicle_year = excluded.vehicle_year,
            base_name = excluded.base_name,
            base_type = excluded.base_type
        "#,
    )
    .bind(entry.plate.trim().to_uppercase())
    .bind(&entry.owner_name)
    .bind(&entry.vehicle_id)
    .bind(&entry.vehicle_year)
    .bind(&entry.base_name)
    .bind(&entry.base_type)
    .execute(pool)
    .await?;
    Ok(())
}
