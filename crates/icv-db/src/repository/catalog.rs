//! # Catalog Repository
//!
//! Golden records keyed by normalized part number.
//!
//! ## Merge Semantics
//! ```text
//! stored:   { manufacturer: "TI", pin_count: 8,    package: NULL    }
//! upsert:   { manufacturer: NULL, pin_count: NULL, package: "PDIP-8" }
//!                                   │
//!                                   ▼  COALESCE(new, old)
//! result:   { manufacturer: "TI", pin_count: 8,    package: "PDIP-8" }
//! ```
//! A NULL in an upsert never erases a stored value.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use icv_core::{CatalogEntry, NewCatalogEntry, Page, Paginated, PartNumber};

use crate::error::{DbError, DbResult};
use crate::repository::part_number_pattern;

/// Filters for listing catalog entries.
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    /// Exact manufacturer name, case-insensitive.
    pub manufacturer: Option<String>,
    /// Substring of the part number.
    pub search: Option<String>,
}

const SELECT_COLUMNS: &str = r#"
    SELECT part_number, manufacturer, pin_count, package_type, description,
           datasheet_url, source, bottom_terminated, created_at, updated_at
    FROM catalog
"#;

/// Repository for catalog operations.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Looks up a catalog entry by exact part number.
    pub async fn get(&self, part_number: &PartNumber) -> DbResult<Option<CatalogEntry>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, part_number).await
    }

    /// Looks up a catalog entry on an existing connection or transaction.
    pub async fn get_in(
        conn: &mut SqliteConnection,
        part_number: &PartNumber,
    ) -> DbResult<Option<CatalogEntry>> {
        let sql = format!("{SELECT_COLUMNS} WHERE part_number = ?1");
        let entry = sqlx::query_as::<_, CatalogEntry>(&sql)
            .bind(part_number)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(entry)
    }

    /// Inserts or merges a catalog entry.
    pub async fn upsert(&self, entry: &NewCatalogEntry) -> DbResult<CatalogEntry> {
        let mut conn = self.pool.acquire().await?;
        Self::upsert_in(&mut conn, entry, Utc::now()).await
    }

    /// Inserts or merges a catalog entry on an existing connection.
    ///
    /// ## Returns
    /// The row as stored after the merge.
    pub async fn upsert_in(
        conn: &mut SqliteConnection,
        entry: &NewCatalogEntry,
        now: DateTime<Utc>,
    ) -> DbResult<CatalogEntry> {
        debug!(part_number = %entry.part_number, source = %entry.source, "Upserting catalog entry");

        sqlx::query(
            r#"
            INSERT INTO catalog (
                part_number, manufacturer, pin_count, package_type, description,
                datasheet_url, source, bottom_terminated, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            ON CONFLICT(part_number) DO UPDATE SET
                manufacturer      = COALESCE(excluded.manufacturer, catalog.manufacturer),
                pin_count         = COALESCE(excluded.pin_count, catalog.pin_count),
                package_type      = COALESCE(excluded.package_type, catalog.package_type),
                description       = COALESCE(excluded.description, catalog.description),
                datasheet_url     = COALESCE(excluded.datasheet_url, catalog.datasheet_url),
                bottom_terminated = COALESCE(excluded.bottom_terminated, catalog.bottom_terminated),
                source            = excluded.source,
                updated_at        = excluded.updated_at
            "#,
        )
        .bind(&entry.part_number)
        .bind(&entry.manufacturer)
        .bind(entry.pin_count)
        .bind(&entry.package_type)
        .bind(&entry.description)
        .bind(&entry.datasheet_url)
        .bind(&entry.source)
        .bind(entry.bottom_terminated)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Self::get_in(conn, &entry.part_number)
            .await?
            .ok_or_else(|| DbError::not_found("CatalogEntry", entry.part_number.as_str()))
    }

    /// Deletes a catalog entry (manual curation only; engines never delete).
    pub async fn delete(&self, part_number: &PartNumber) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM catalog WHERE part_number = ?1")
            .bind(part_number)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CatalogEntry", part_number.as_str()));
        }

        debug!(part_number = %part_number, "Catalog entry deleted");
        Ok(())
    }

    /// Lists catalog entries ordered by part number.
    pub async fn list(
        &self,
        filter: &CatalogFilter,
        page: Page,
    ) -> DbResult<Paginated<CatalogEntry>> {
        let pattern = part_number_pattern(filter.search.as_deref());
        let where_clause = r#"
            WHERE (?1 IS NULL OR manufacturer = ?1 COLLATE NOCASE)
              AND (?2 IS NULL OR part_number LIKE ?2 ESCAPE '\')
        "#;

        let sql = format!("{SELECT_COLUMNS} {where_clause} ORDER BY part_number LIMIT ?3 OFFSET ?4");
        let items = sqlx::query_as::<_, CatalogEntry>(&sql)
            .bind(&filter.manufacturer)
            .bind(&pattern)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM catalog {where_clause}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(&filter.manufacturer)
            .bind(&pattern)
            .fetch_one(&self.pool)
            .await?;

        Ok(Paginated {
            items,
            total,
            limit: page.limit,
            offset: page.offset,
        })
    }

    /// Counts catalog entries.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
