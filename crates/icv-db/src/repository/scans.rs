//! # Scan Repository
//!
//! One row per verification attempt. Rows are inserted by `verify` and
//! rewritten only by a bottom-scan follow-up or a manual override.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use icv_core::{ActionRequired, Page, Paginated, PartNumber, Scan, ScanStatus};

use crate::error::{DbError, DbResult};

/// Row shape; `match_details` is a JSON object column.
#[derive(Debug, sqlx::FromRow)]
struct ScanRow {
    id: String,
    ocr_text: Option<String>,
    ocr_confidence: Option<f64>,
    part_number_detected: Option<String>,
    part_number_verified: Option<PartNumber>,
    status: ScanStatus,
    action_required: ActionRequired,
    confidence: f64,
    detected_pins: i64,
    expected_pins: Option<i64>,
    manufacturer_detected: Option<String>,
    match_details: Option<String>,
    message: String,
    queued_for_sync: bool,
    was_manual_override: bool,
    override_note: Option<String>,
    scanned_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ScanRow> for Scan {
    type Error = DbError;

    fn try_from(row: ScanRow) -> Result<Self, Self::Error> {
        let match_details = match row.match_details {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };

        Ok(Scan {
            id: row.id,
            ocr_text: row.ocr_text,
            ocr_confidence: row.ocr_confidence,
            part_number_detected: row.part_number_detected,
            part_number_verified: row.part_number_verified,
            status: row.status,
            action_required: row.action_required,
            confidence: row.confidence,
            detected_pins: row.detected_pins,
            expected_pins: row.expected_pins,
            manufacturer_detected: row.manufacturer_detected,
            match_details,
            message: row.message,
            queued_for_sync: row.queued_for_sync,
            was_manual_override: row.was_manual_override,
            override_note: row.override_note,
            scanned_at: row.scanned_at,
            completed_at: row.completed_at,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, ocr_text, ocr_confidence, part_number_detected, part_number_verified,
           status, action_required, confidence, detected_pins, expected_pins,
           manufacturer_detected, match_details, message, queued_for_sync,
           was_manual_override, override_note, scanned_at, completed_at
    FROM scans
"#;

/// Filters for listing scans.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub status: Option<ScanStatus>,
    pub part_number: Option<PartNumber>,
}

/// Repository for scan records.
#[derive(Debug, Clone)]
pub struct ScanRepository {
    pool: SqlitePool,
}

impl ScanRepository {
    /// Creates a new ScanRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ScanRepository { pool }
    }

    /// Looks up a scan by id.
    pub async fn get(&self, id: &str) -> DbResult<Option<Scan>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, id).await
    }

    /// Looks up a scan on an existing connection or transaction.
    pub async fn get_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Scan>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let row = sqlx::query_as::<_, ScanRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        row.map(Scan::try_from).transpose()
    }

    /// Inserts a new scan record.
    pub async fn insert(&self, scan: &Scan) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_in(&mut conn, scan).await
    }

    /// Inserts a new scan record on an existing transaction.
    pub async fn insert_in(conn: &mut SqliteConnection, scan: &Scan) -> DbResult<()> {
        let details = scan
            .match_details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO scans (
                id, ocr_text, ocr_confidence, part_number_detected, part_number_verified,
                status, action_required, confidence, detected_pins, expected_pins,
                manufacturer_detected, match_details, message, queued_for_sync,
                was_manual_override, override_note, scanned_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
        )
        .bind(&scan.id)
        .bind(&scan.ocr_text)
        .bind(scan.ocr_confidence)
        .bind(&scan.part_number_detected)
        .bind(&scan.part_number_verified)
        .bind(scan.status)
        .bind(scan.action_required)
        .bind(scan.confidence)
        .bind(scan.detected_pins)
        .bind(scan.expected_pins)
        .bind(&scan.manufacturer_detected)
        .bind(&details)
        .bind(&scan.message)
        .bind(scan.queued_for_sync)
        .bind(scan.was_manual_override)
        .bind(&scan.override_note)
        .bind(scan.scanned_at)
        .bind(scan.completed_at)
        .execute(&mut *conn)
        .await?;

        debug!(scan_id = %scan.id, status = scan.status.as_str(), "Scan recorded");
        Ok(())
    }

    /// Rewrites the verdict columns of an existing scan.
    ///
    /// `id`, `ocr_text`, `ocr_confidence` and `scanned_at` are immutable.
    pub async fn update(&self, scan: &Scan) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::update_in(&mut conn, scan).await
    }

    /// [`update`](Self::update) on an existing transaction.
    pub async fn update_in(conn: &mut SqliteConnection, scan: &Scan) -> DbResult<()> {
        let details = scan
            .match_details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE scans SET
                part_number_detected  = ?2,
                part_number_verified  = ?3,
                status                = ?4,
                action_required       = ?5,
                confidence            = ?6,
                detected_pins         = ?7,
                expected_pins         = ?8,
                manufacturer_detected = ?9,
                match_details         = ?10,
                message               = ?11,
                queued_for_sync       = ?12,
                was_manual_override   = ?13,
                override_note         = ?14,
                completed_at          = ?15
            WHERE id = ?1
            "#,
        )
        .bind(&scan.id)
        .bind(&scan.part_number_detected)
        .bind(&scan.part_number_verified)
        .bind(scan.status)
        .bind(scan.action_required)
        .bind(scan.confidence)
        .bind(scan.detected_pins)
        .bind(scan.expected_pins)
        .bind(&scan.manufacturer_detected)
        .bind(&details)
        .bind(&scan.message)
        .bind(scan.queued_for_sync)
        .bind(scan.was_manual_override)
        .bind(&scan.override_note)
        .bind(scan.completed_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Scan", &scan.id));
        }

        debug!(scan_id = %scan.id, status = scan.status.as_str(), "Scan updated");
        Ok(())
    }

    /// Lists scans, newest first.
    pub async fn list(&self, filter: &ScanFilter, page: Page) -> DbResult<Paginated<Scan>> {
        let where_clause = r#"
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR part_number_verified = ?2)
        "#;

        let sql = format!(
            "{SELECT_COLUMNS} {where_clause} ORDER BY scanned_at DESC, rowid DESC LIMIT ?3 OFFSET ?4"
        );
        let rows = sqlx::query_as::<_, ScanRow>(&sql)
            .bind(filter.status)
            .bind(&filter.part_number)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM scans {where_clause}"))
            .bind(filter.status)
            .bind(&filter.part_number)
            .fetch_one(&self.pool)
            .await?;

        Ok(Paginated {
            items: rows
                .into_iter()
                .map(Scan::try_from)
                .collect::<DbResult<Vec<_>>>()?,
            total,
            limit: page.limit,
            offset: page.offset,
        })
    }

    /// Counts scan rows.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scans")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use icv_core::MatchDetails;

    fn scan(id: &str, status: ScanStatus) -> Scan {
        Scan {
            id: id.to_string(),
            ocr_text: Some("TI LM555CN".into()),
            ocr_confidence: Some(0.93),
            part_number_detected: Some("LM555CN".into()),
            part_number_verified: Some(PartNumber::parse("LM555CN").unwrap()),
            status,
            action_required: ActionRequired::None,
            confidence: 0.93,
            detected_pins: 8,
            expected_pins: Some(8),
            manufacturer_detected: Some("TI".into()),
            match_details: None,
            message: "ok".into(),
            queued_for_sync: false,
            was_manual_override: false,
            override_note: None,
            scanned_at: Utc::now(),
            completed_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_with_details() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut record = scan("scan-1", ScanStatus::Fail);
        record.match_details = Some(MatchDetails {
            pin_count_match: Some(false),
            manufacturer_match: Some(true),
            expected_pins: Some(8),
            detected_pins: 14,
            expected_manufacturer: Some("Texas Instruments".into()),
            detected_manufacturer: Some("TI".into()),
            failures: vec!["pin count mismatch: expected 8, detected 14".into()],
        });
        db.scans().insert(&record).await.unwrap();

        let fetched = db.scans().get("scan-1").await.unwrap().unwrap();
        assert_eq!(fetched.status, ScanStatus::Fail);
        assert_eq!(fetched.match_details, record.match_details);
        assert_eq!(fetched.part_number_verified, record.part_number_verified);
    }

    #[tokio::test]
    async fn test_update_missing_scan_is_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.scans().update(&scan("nope", ScanStatus::Pass)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_rewrites_verdict() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut record = scan("scan-1", ScanStatus::Partial);
        record.action_required = ActionRequired::ScanBottom;
        record.completed_at = None;
        db.scans().insert(&record).await.unwrap();

        record.status = ScanStatus::Pass;
        record.action_required = ActionRequired::None;
        record.completed_at = Some(Utc::now());
        db.scans().update(&record).await.unwrap();

        let fetched = db.scans().get("scan-1").await.unwrap().unwrap();
        assert_eq!(fetched.status, ScanStatus::Pass);
        assert_eq!(fetched.action_required, ActionRequired::None);
        assert!(fetched.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.scans().insert(&scan("a", ScanStatus::Pass)).await.unwrap();
        db.scans().insert(&scan("b", ScanStatus::Fail)).await.unwrap();
        db.scans().insert(&scan("c", ScanStatus::Pass)).await.unwrap();

        let filter = ScanFilter {
            status: Some(ScanStatus::Pass),
            part_number: None,
        };
        let page = db.scans().list(&filter, Page::first(10)).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].id, "c");
        assert_eq!(db.scans().count().await.unwrap(), 3);
    }
}
