//! # Fake Registry Repository
//!
//! Part numbers declared counterfeit, either by an operator or by the sync
//! engine after a part exhausted its resolution attempts.
//!
//! Registering a part removes it from the sync queue in the same
//! transaction, so a queued part number ends in exactly one store.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use icv_core::{FakeRegistryEntry, FakeReport, FakeSource, Page, Paginated, PartNumber};

use crate::error::{DbError, DbResult};
use crate::repository::part_number_pattern;

/// Row shape; `manufacturers_checked` is a JSON array column.
#[derive(Debug, sqlx::FromRow)]
struct FakeRow {
    part_number: PartNumber,
    reason: String,
    source: FakeSource,
    reported_by: Option<String>,
    added_at: DateTime<Utc>,
    scrape_attempts: i64,
    manufacturers_checked: String,
}

impl TryFrom<FakeRow> for FakeRegistryEntry {
    type Error = DbError;

    fn try_from(row: FakeRow) -> Result<Self, Self::Error> {
        Ok(FakeRegistryEntry {
            part_number: row.part_number,
            reason: row.reason,
            source: row.source,
            reported_by: row.reported_by,
            added_at: row.added_at,
            scrape_attempts: row.scrape_attempts,
            manufacturers_checked: serde_json::from_str(&row.manufacturers_checked)?,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT part_number, reason, source, reported_by, added_at,
           scrape_attempts, manufacturers_checked
    FROM fake_registry
"#;

/// Repository for fake registry operations.
#[derive(Debug, Clone)]
pub struct FakeRegistryRepository {
    pool: SqlitePool,
}

impl FakeRegistryRepository {
    /// Creates a new FakeRegistryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        FakeRegistryRepository { pool }
    }

    /// Exact-match lookup.
    pub async fn get(&self, part_number: &PartNumber) -> DbResult<Option<FakeRegistryEntry>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, part_number).await
    }

    /// Exact-match lookup on an existing connection or transaction.
    pub async fn get_in(
        conn: &mut SqliteConnection,
        part_number: &PartNumber,
    ) -> DbResult<Option<FakeRegistryEntry>> {
        let sql = format!("{SELECT_COLUMNS} WHERE part_number = ?1");
        let row = sqlx::query_as::<_, FakeRow>(&sql)
            .bind(part_number)
            .fetch_optional(&mut *conn)
            .await?;
        row.map(FakeRegistryEntry::try_from).transpose()
    }

    /// Registers a fake and removes the part from the sync queue.
    ///
    /// ## Returns
    /// * `Ok(entry)` - Newly registered entry
    /// * `Err(DbError::UniqueViolation)` - Part number already registered
    pub async fn register(&self, report: &FakeReport) -> DbResult<FakeRegistryEntry> {
        let mut tx = self.pool.begin().await?;

        let entry = Self::insert_in(&mut tx, report, Utc::now())
            .await?
            .ok_or_else(|| DbError::duplicate("part_number", report.part_number.as_str()))?;

        sqlx::query("DELETE FROM sync_queue WHERE part_number = ?1")
            .bind(&report.part_number)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            part_number = %entry.part_number,
            source = ?entry.source,
            "Part number registered as counterfeit"
        );
        Ok(entry)
    }

    /// Inserts a registry row unless one exists.
    ///
    /// ## Returns
    /// `Some(entry)` when a row was inserted, `None` when the part number was
    /// already registered (the existing row is left untouched).
    pub async fn insert_in(
        conn: &mut SqliteConnection,
        report: &FakeReport,
        now: DateTime<Utc>,
    ) -> DbResult<Option<FakeRegistryEntry>> {
        let checked = serde_json::to_string(&report.manufacturers_checked)?;

        let result = sqlx::query(
            r#"
            INSERT INTO fake_registry (
                part_number, reason, source, reported_by, added_at,
                scrape_attempts, manufacturers_checked
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(part_number) DO NOTHING
            "#,
        )
        .bind(&report.part_number)
        .bind(&report.reason)
        .bind(report.source)
        .bind(&report.reported_by)
        .bind(now)
        .bind(report.scrape_attempts)
        .bind(&checked)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            debug!(part_number = %report.part_number, "Already in fake registry");
            return Ok(None);
        }

        Ok(Some(FakeRegistryEntry {
            part_number: report.part_number.clone(),
            reason: report.reason.clone(),
            source: report.source,
            reported_by: report.reported_by.clone(),
            added_at: now,
            scrape_attempts: report.scrape_attempts,
            manufacturers_checked: report.manufacturers_checked.clone(),
        }))
    }

    /// Removes a part number from the registry.
    pub async fn delete(&self, part_number: &PartNumber) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM fake_registry WHERE part_number = ?1")
            .bind(part_number)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("FakeRegistryEntry", part_number.as_str()));
        }

        info!(part_number = %part_number, "Part number removed from fake registry");
        Ok(())
    }

    /// Lists registry entries, newest first.
    pub async fn list(
        &self,
        search: Option<&str>,
        page: Page,
    ) -> DbResult<Paginated<FakeRegistryEntry>> {
        let pattern = part_number_pattern(search);
        let where_clause = r#"WHERE (?1 IS NULL OR part_number LIKE ?1 ESCAPE '\')"#;

        let sql = format!(
            "{SELECT_COLUMNS} {where_clause} ORDER BY added_at DESC, part_number LIMIT ?2 OFFSET ?3"
        );
        let rows = sqlx::query_as::<_, FakeRow>(&sql)
            .bind(&pattern)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM fake_registry {where_clause}"
        ))
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        Ok(Paginated {
            items: rows
                .into_iter()
                .map(FakeRegistryEntry::try_from)
                .collect::<DbResult<Vec<_>>>()?,
            total,
            limit: page.limit,
            offset: page.offset,
        })
    }

    /// Counts registry entries.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fake_registry")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
