//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. All timestamps are stored
//! as fixed-width RFC 3339 TEXT (UTC) so string comparison in SQL is
//! chronological comparison.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::model::{
    ClickEvent, FollowUpDefinition, Lead, NewQueueItem, QueueItem, SendingAccount,
};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp write format: fixed-width UTC with microseconds,
/// `Z` suffix. Lexicographic order == chronological order.
fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

const ITEM_COLUMNS: &str = "id, campaign_id, lead_id, recipient, subject, body, sequence, \
                            scheduled_for, sent_at, sent_from, claimed_at, attempts, last_error";

/// Map a libsql row to a QueueItem. Column order matches ITEM_COLUMNS.
fn row_to_item(row: &libsql::Row) -> Result<QueueItem, libsql::Error> {
    Ok(QueueItem {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        lead_id: row.get(2)?,
        recipient: row.get(3)?,
        subject: row.get(4)?,
        body: row.get(5)?,
        sequence: row.get(6)?,
        scheduled_for: parse_datetime(&row.get::<String>(7)?),
        sent_at: row.get::<String>(8).ok().map(|s| parse_datetime(&s)),
        sent_from: row.get(9).ok(),
        claimed_at: row.get::<String>(10).ok().map(|s| parse_datetime(&s)),
        attempts: row.get(11)?,
        last_error: row.get(12).ok(),
    })
}

const ACCOUNT_COLUMNS: &str = "email, display_name, smtp_host, smtp_port, smtp_username, \
                               sealed_smtp_password, imap_host, imap_port";

fn row_to_account(row: &libsql::Row) -> Result<SendingAccount, libsql::Error> {
    Ok(SendingAccount {
        email: row.get(0)?,
        display_name: row.get(1)?,
        smtp_host: row.get(2)?,
        smtp_port: row.get::<i64>(3)? as u16,
        smtp_username: row.get(4)?,
        sealed_smtp_password: row.get(5)?,
        imap_host: row.get(6).ok(),
        imap_port: row.get::<i64>(7).ok().map(|p| p as u16),
    })
}

const LEAD_COLUMNS: &str =
    "id, email, name, last_name, company, list_name, custom_fields, responded, responded_at";

fn row_to_lead(row: &libsql::Row) -> Result<Lead, libsql::Error> {
    let custom_raw: String = row.get(6)?;
    let custom_fields = serde_json::from_str(&custom_raw).unwrap_or_else(|e| {
        warn!(lead = row.get::<i64>(0).unwrap_or(0), "Unparsable custom_fields, ignoring: {e}");
        Default::default()
    });
    Ok(Lead {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        last_name: row.get(3)?,
        company: row.get(4)?,
        list_name: row.get(5)?,
        custom_fields,
        responded: row.get::<i64>(7)? != 0,
        responded_at: row.get::<String>(8).ok().map(|s| parse_datetime(&s)),
    })
}

// ── Database trait implementation ───────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Sending accounts ────────────────────────────────────────────

    async fn upsert_account(&self, account: &SendingAccount) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO accounts \
                 (email, display_name, smtp_host, smtp_port, smtp_username, \
                  sealed_smtp_password, imap_host, imap_port) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    account.email.as_str(),
                    account.display_name.as_str(),
                    account.smtp_host.as_str(),
                    i64::from(account.smtp_port),
                    account.smtp_username.as_str(),
                    account.sealed_smtp_password.as_str(),
                    account.imap_host.as_deref(),
                    account.imap_port.map(i64::from),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_account: {e}")))?;
        Ok(())
    }

    async fn accounts(&self) -> Result<Vec<SendingAccount>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY email ASC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("accounts: {e}")))?;

        let mut out = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_account(&row) {
                Ok(account) => out.push(account),
                Err(e) => warn!("Skipping account row: {e}"),
            }
        }
        Ok(out)
    }

    async fn account(&self, email: &str) -> Result<Option<SendingAccount>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?1"),
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("account: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_account(&row).map_err(|e| {
                DatabaseError::Query(format!("account row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("account: {e}"))),
        }
    }

    // ── Daily quota ledger ──────────────────────────────────────────

    async fn sent_count(
        &self,
        account_email: &str,
        day: NaiveDate,
    ) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT sent FROM daily_quota WHERE account_email = ?1 AND day = ?2",
                params![account_email, day.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("sent_count: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("sent_count row parse: {e}"))),
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("sent_count: {e}"))),
        }
    }

    async fn increment_sent_count(
        &self,
        account_email: &str,
        day: NaiveDate,
    ) -> Result<i64, DatabaseError> {
        // Single atomic upsert; overlapping passes cannot lose updates.
        let mut rows = self
            .conn()
            .query(
                "INSERT INTO daily_quota (account_email, day, sent) VALUES (?1, ?2, 1) \
                 ON CONFLICT(account_email, day) DO UPDATE SET sent = sent + 1 \
                 RETURNING sent",
                params![account_email, day.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("increment_sent_count: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("increment_sent_count: {e}")))?
            .ok_or_else(|| {
                DatabaseError::Query("increment_sent_count returned no row".to_string())
            })?;
        let sent: i64 = row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("increment_sent_count row parse: {e}")))?;
        debug!(account = account_email, %day, sent, "Quota incremented");
        Ok(sent)
    }

    // ── Send queue ──────────────────────────────────────────────────

    async fn enqueue(&self, item: &NewQueueItem) -> Result<i64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "INSERT INTO queue_items \
                 (campaign_id, lead_id, recipient, subject, body, sequence, scheduled_for) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) RETURNING id",
                params![
                    item.campaign_id,
                    item.lead_id,
                    item.recipient.as_str(),
                    item.subject.as_str(),
                    item.body.as_str(),
                    item.sequence,
                    fmt_ts(item.scheduled_for),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("enqueue: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("enqueue: {e}")))?
            .ok_or_else(|| DatabaseError::Query("enqueue returned no row".to_string()))?;
        row.get(0)
            .map_err(|e| DatabaseError::Query(format!("enqueue row parse: {e}")))
    }

    async fn due_queue_items(
        &self,
        now: DateTime<Utc>,
        reclaim_before: DateTime<Utc>,
        max_attempts: i64,
        limit: usize,
    ) -> Result<Vec<QueueItem>, DatabaseError> {
        let select: String = ITEM_COLUMNS
            .split(", ")
            .map(|c| format!("q.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {select} FROM queue_items q \
                     JOIN leads l ON l.id = q.lead_id \
                     WHERE q.sent_at IS NULL \
                       AND q.scheduled_for <= ?1 \
                       AND q.attempts < ?2 \
                       AND l.responded = 0 \
                       AND (q.claimed_at IS NULL OR q.claimed_at < ?3) \
                     ORDER BY q.id ASC LIMIT ?4"
                ),
                params![
                    fmt_ts(now),
                    max_attempts,
                    fmt_ts(reclaim_before),
                    limit as i64
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("due_queue_items: {e}")))?;

        let mut items = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_item(&row) {
                Ok(item) => items.push(item),
                Err(e) => warn!("Skipping queue row: {e}"),
            }
        }
        Ok(items)
    }

    async fn claim_queue_item(
        &self,
        id: i64,
        now: DateTime<Utc>,
        reclaim_before: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE queue_items SET claimed_at = ?1 \
                 WHERE id = ?2 AND sent_at IS NULL \
                   AND (claimed_at IS NULL OR claimed_at < ?3)",
                params![fmt_ts(now), id, fmt_ts(reclaim_before)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("claim_queue_item: {e}")))?;
        Ok(affected == 1)
    }

    async fn release_claim(&self, id: i64) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE queue_items SET claimed_at = NULL WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("release_claim: {e}")))?;
        Ok(())
    }

    async fn mark_sent(
        &self,
        id: i64,
        sent_at: DateTime<Utc>,
        account_email: &str,
    ) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE queue_items \
                 SET sent_at = ?1, sent_from = ?2, claimed_at = NULL \
                 WHERE id = ?3 AND sent_at IS NULL",
                params![fmt_ts(sent_at), account_email, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_sent: {e}")))?;

        debug!(item = id, account = account_email, "Queue item marked sent");
        Ok(affected == 1)
    }

    async fn record_failure(&self, id: i64, error: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE queue_items \
                 SET attempts = attempts + 1, last_error = ?1, claimed_at = NULL \
                 WHERE id = ?2",
                params![error, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_failure: {e}")))?;
        Ok(())
    }

    async fn queue_item(&self, id: i64) -> Result<Option<QueueItem>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {ITEM_COLUMNS} FROM queue_items WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("queue_item: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_item(&row).map_err(|e| {
                DatabaseError::Query(format!("queue_item row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("queue_item: {e}"))),
        }
    }

    // ── Lead/campaign account assignments ───────────────────────────

    async fn assignment_for(
        &self,
        lead_id: i64,
        campaign_id: i64,
    ) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT account_email FROM assignments WHERE lead_id = ?1 AND campaign_id = ?2",
                params![lead_id, campaign_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("assignment_for: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row.get(0).map_err(|e| {
                DatabaseError::Query(format!("assignment_for row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("assignment_for: {e}"))),
        }
    }

    async fn record_assignment(
        &self,
        lead_id: i64,
        campaign_id: i64,
        account_email: &str,
    ) -> Result<(), DatabaseError> {
        // DO NOTHING keeps the first writer: at most one assignment per
        // (lead, campaign), immutable once set.
        self.conn()
            .execute(
                "INSERT INTO assignments (lead_id, campaign_id, account_email) \
                 VALUES (?1, ?2, ?3) \
                 ON CONFLICT(lead_id, campaign_id) DO NOTHING",
                params![lead_id, campaign_id, account_email],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_assignment: {e}")))?;
        Ok(())
    }

    // ── Follow-up definitions ───────────────────────────────────────

    async fn followup_definition(
        &self,
        campaign_id: i64,
        sequence: i64,
    ) -> Result<Option<FollowUpDefinition>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT campaign_id, sequence, subject, body, delay_days \
                 FROM followups WHERE campaign_id = ?1 AND sequence = ?2",
                params![campaign_id, sequence],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("followup_definition: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(FollowUpDefinition {
                campaign_id: row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("followup row parse: {e}")))?,
                sequence: row
                    .get(1)
                    .map_err(|e| DatabaseError::Query(format!("followup row parse: {e}")))?,
                subject: row
                    .get(2)
                    .map_err(|e| DatabaseError::Query(format!("followup row parse: {e}")))?,
                body: row
                    .get(3)
                    .map_err(|e| DatabaseError::Query(format!("followup row parse: {e}")))?,
                delay_days: row
                    .get(4)
                    .map_err(|e| DatabaseError::Query(format!("followup row parse: {e}")))?,
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("followup_definition: {e}"))),
        }
    }

    async fn insert_followup(&self, def: &FollowUpDefinition) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO followups (campaign_id, sequence, subject, body, delay_days) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    def.campaign_id,
                    def.sequence,
                    def.subject.as_str(),
                    def.body.as_str(),
                    def.delay_days,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_followup: {e}")))?;
        Ok(())
    }

    // ── Leads ───────────────────────────────────────────────────────

    async fn insert_lead(&self, lead: &Lead) -> Result<i64, DatabaseError> {
        let custom = serde_json::to_string(&lead.custom_fields)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let mut rows = self
            .conn()
            .query(
                "INSERT INTO leads \
                 (email, name, last_name, company, list_name, custom_fields, responded, responded_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) RETURNING id",
                params![
                    lead.email.as_str(),
                    lead.name.as_str(),
                    lead.last_name.as_str(),
                    lead.company.as_str(),
                    lead.list_name.as_str(),
                    custom,
                    i64::from(lead.responded),
                    lead.responded_at.map(fmt_ts),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_lead: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_lead: {e}")))?
            .ok_or_else(|| DatabaseError::Query("insert_lead returned no row".to_string()))?;
        row.get(0)
            .map_err(|e| DatabaseError::Query(format!("insert_lead row parse: {e}")))
    }

    async fn lead(&self, id: i64) -> Result<Option<Lead>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("lead: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_lead(&row).map_err(|e| {
                DatabaseError::Query(format!("lead row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("lead: {e}"))),
        }
    }

    async fn mark_lead_responded(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE leads SET responded = 1, responded_at = ?1 WHERE id = ?2",
                params![fmt_ts(at), id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_lead_responded: {e}")))?;
        Ok(())
    }

    // ── Click events ────────────────────────────────────────────────

    async fn record_click(&self, click: &ClickEvent) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO clicks (lead_id, campaign_id, queue_item_id, url) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    click.lead_id,
                    click.campaign_id,
                    click.queue_item_id,
                    click.url.as_str(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_click: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn lead_fixture(email: &str) -> Lead {
        Lead {
            id: 0,
            email: email.into(),
            name: "Test".into(),
            last_name: "Lead".into(),
            company: "Acme".into(),
            list_name: "default".into(),
            custom_fields: Default::default(),
            responded: false,
            responded_at: None,
        }
    }

    fn item_fixture(lead_id: i64, scheduled_for: DateTime<Utc>) -> NewQueueItem {
        NewQueueItem {
            campaign_id: 1,
            lead_id,
            recipient: "to@example.com".into(),
            subject: "Hello".into(),
            body: "<p>Hi</p>".into(),
            sequence: 0,
            scheduled_for,
        }
    }

    async fn backend_with_lead() -> (LibSqlBackend, i64) {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let lead_id = db.insert_lead(&lead_fixture("l1@example.com")).await.unwrap();
        (db, lead_id)
    }

    fn window(now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::minutes(10)
    }

    #[tokio::test]
    async fn due_selection_respects_schedule() {
        let (db, lead_id) = backend_with_lead().await;
        let now = Utc::now();

        let past = db.enqueue(&item_fixture(lead_id, now - Duration::hours(1))).await.unwrap();
        let _future = db.enqueue(&item_fixture(lead_id, now + Duration::hours(1))).await.unwrap();

        let due = db.due_queue_items(now, window(now), 3, 100).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, past);
    }

    #[tokio::test]
    async fn due_selection_skips_responded_leads() {
        let (db, lead_id) = backend_with_lead().await;
        let now = Utc::now();
        db.enqueue(&item_fixture(lead_id, now - Duration::hours(1))).await.unwrap();
        db.mark_lead_responded(lead_id, now).await.unwrap();

        let due = db.due_queue_items(now, window(now), 3, 100).await.unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn due_selection_caps_attempts() {
        let (db, lead_id) = backend_with_lead().await;
        let now = Utc::now();
        let id = db.enqueue(&item_fixture(lead_id, now - Duration::hours(1))).await.unwrap();

        for _ in 0..3 {
            db.record_failure(id, "relay down").await.unwrap();
        }

        let due = db.due_queue_items(now, window(now), 3, 100).await.unwrap();
        assert!(due.is_empty());

        let item = db.queue_item(id).await.unwrap().unwrap();
        assert_eq!(item.attempts, 3);
        assert_eq!(item.last_error.as_deref(), Some("relay down"));
    }

    #[tokio::test]
    async fn claim_is_exclusive_until_released() {
        let (db, lead_id) = backend_with_lead().await;
        let now = Utc::now();
        let id = db.enqueue(&item_fixture(lead_id, now - Duration::hours(1))).await.unwrap();

        assert!(db.claim_queue_item(id, now, window(now)).await.unwrap());
        assert!(!db.claim_queue_item(id, now, window(now)).await.unwrap());

        db.release_claim(id).await.unwrap();
        assert!(db.claim_queue_item(id, now, window(now)).await.unwrap());
    }

    #[tokio::test]
    async fn stale_claims_are_reclaimable() {
        let (db, lead_id) = backend_with_lead().await;
        let now = Utc::now();
        let id = db.enqueue(&item_fixture(lead_id, now - Duration::hours(1))).await.unwrap();

        let old = now - Duration::hours(2);
        assert!(db.claim_queue_item(id, old, window(old)).await.unwrap());

        // The stale claim neither hides the item nor blocks a new claim.
        let due = db.due_queue_items(now, window(now), 3, 100).await.unwrap();
        assert_eq!(due.len(), 1);
        assert!(db.claim_queue_item(id, now, window(now)).await.unwrap());
    }

    #[tokio::test]
    async fn mark_sent_transitions_exactly_once() {
        let (db, lead_id) = backend_with_lead().await;
        let now = Utc::now();
        let id = db.enqueue(&item_fixture(lead_id, now - Duration::hours(1))).await.unwrap();

        assert!(db.mark_sent(id, now, "a@pool.example").await.unwrap());
        assert!(!db.mark_sent(id, now, "b@pool.example").await.unwrap());

        let item = db.queue_item(id).await.unwrap().unwrap();
        assert_eq!(item.sent_from.as_deref(), Some("a@pool.example"));
        assert!(item.sent_at.is_some());

        // Sent items are no longer due.
        let due = db.due_queue_items(now, window(now), 3, 100).await.unwrap();
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn quota_record_created_lazily_and_increments() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let day = Utc::now().date_naive();

        assert_eq!(db.sent_count("a@pool.example", day).await.unwrap(), 0);
        assert_eq!(db.increment_sent_count("a@pool.example", day).await.unwrap(), 1);
        assert_eq!(db.increment_sent_count("a@pool.example", day).await.unwrap(), 2);
        assert_eq!(db.sent_count("a@pool.example", day).await.unwrap(), 2);

        // Other accounts and other days are independent.
        assert_eq!(db.sent_count("b@pool.example", day).await.unwrap(), 0);
        assert_eq!(
            db.sent_count("a@pool.example", day.succ_opt().unwrap()).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn assignment_is_immutable_once_set() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.record_assignment(1, 1, "first@pool.example").await.unwrap();
        db.record_assignment(1, 1, "second@pool.example").await.unwrap();

        assert_eq!(
            db.assignment_for(1, 1).await.unwrap().as_deref(),
            Some("first@pool.example")
        );
        assert_eq!(db.assignment_for(1, 2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn followup_definition_roundtrip() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.insert_followup(&FollowUpDefinition {
            campaign_id: 7,
            sequence: 1,
            subject: "Re: {name}".into(),
            body: "Just checking in".into(),
            delay_days: 3,
        })
        .await
        .unwrap();

        let def = db.followup_definition(7, 1).await.unwrap().unwrap();
        assert_eq!(def.delay_days, 3);
        assert!(db.followup_definition(7, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn account_roundtrip_with_optional_imap() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.upsert_account(&SendingAccount {
            email: "a@pool.example".into(),
            display_name: "Pool A".into(),
            smtp_host: "smtp.pool.example".into(),
            smtp_port: 587,
            smtp_username: "a@pool.example".into(),
            sealed_smtp_password: "c2VhbGVk".into(),
            imap_host: None,
            imap_port: None,
        })
        .await
        .unwrap();

        let account = db.account("a@pool.example").await.unwrap().unwrap();
        assert_eq!(account.smtp_port, 587);
        assert!(account.imap_host.is_none());
        assert_eq!(db.accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lead_custom_fields_roundtrip() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let mut lead = lead_fixture("custom@example.com");
        lead.custom_fields.insert("city".into(), "Austin".into());

        let id = db.insert_lead(&lead).await.unwrap();
        let loaded = db.lead(id).await.unwrap().unwrap();
        assert_eq!(loaded.custom_fields.get("city").map(String::as_str), Some("Austin"));
        assert!(!loaded.responded);
    }

    #[tokio::test]
    async fn click_events_accept_absent_ids() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.record_click(&ClickEvent {
            lead_id: None,
            campaign_id: Some(3),
            queue_item_id: None,
            url: "https://example.com/page".into(),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn file_backed_database_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dripmail.db");
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        db.insert_lead(&lead_fixture("file@example.com")).await.unwrap();
        assert!(path.exists());
    }
}
