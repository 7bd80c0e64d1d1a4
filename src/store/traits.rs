//! Unified `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::DatabaseError;
use crate::model::{
    ClickEvent, FollowUpDefinition, Lead, NewQueueItem, QueueItem, SendingAccount,
};

/// Backend-agnostic database trait covering accounts, quotas, the send
/// queue, assignments, follow-up definitions, leads, and click events.
///
/// Accounts and leads are written by external collaborators (provisioning,
/// lead import, reply detection); their write operations live here so tests
/// and tooling share one interface, but the dispatch engine itself only
/// reads them.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Sending accounts ────────────────────────────────────────────

    /// Insert or replace a sending account.
    async fn upsert_account(&self, account: &SendingAccount) -> Result<(), DatabaseError>;

    /// All configured sending accounts, ordered by email.
    async fn accounts(&self) -> Result<Vec<SendingAccount>, DatabaseError>;

    /// Look up one account by its email identity.
    async fn account(&self, email: &str) -> Result<Option<SendingAccount>, DatabaseError>;

    // ── Daily quota ledger ──────────────────────────────────────────

    /// Messages sent from `account_email` on `day` (0 if no record yet).
    async fn sent_count(&self, account_email: &str, day: NaiveDate)
    -> Result<i64, DatabaseError>;

    /// Atomically increment the day's sent count, creating the record
    /// lazily on the first send. Returns the new persisted count.
    ///
    /// This is a single conditional upsert, never a read-then-overwrite,
    /// so overlapping passes cannot lose updates.
    async fn increment_sent_count(
        &self,
        account_email: &str,
        day: NaiveDate,
    ) -> Result<i64, DatabaseError>;

    // ── Send queue ──────────────────────────────────────────────────

    /// Enqueue a new message. Returns the queue item id.
    async fn enqueue(&self, item: &NewQueueItem) -> Result<i64, DatabaseError>;

    /// Fetch up to `limit` due items in storage order: unsent, scheduled at
    /// or before `now`, under the attempts cap, lead not responded, and not
    /// carrying a live claim (claims from before `reclaim_before` count as
    /// abandoned).
    async fn due_queue_items(
        &self,
        now: DateTime<Utc>,
        reclaim_before: DateTime<Utc>,
        max_attempts: i64,
        limit: usize,
    ) -> Result<Vec<QueueItem>, DatabaseError>;

    /// Atomically claim an item for this pass. Returns false if the item
    /// was already sent or is live-claimed by another pass.
    async fn claim_queue_item(
        &self,
        id: i64,
        now: DateTime<Utc>,
        reclaim_before: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Release a claim without sending (failed or skipped item).
    async fn release_claim(&self, id: i64) -> Result<(), DatabaseError>;

    /// Stamp `sent_at`/`sent_from` and clear the claim. Conditional on the
    /// item being unsent; returns false if another pass won.
    async fn mark_sent(
        &self,
        id: i64,
        sent_at: DateTime<Utc>,
        account_email: &str,
    ) -> Result<bool, DatabaseError>;

    /// Record a failed send attempt and release the claim.
    async fn record_failure(&self, id: i64, error: &str) -> Result<(), DatabaseError>;

    /// Look up one queue item.
    async fn queue_item(&self, id: i64) -> Result<Option<QueueItem>, DatabaseError>;

    // ── Lead/campaign account assignments ───────────────────────────

    /// The account assigned to a (lead, campaign) pair, if any.
    async fn assignment_for(
        &self,
        lead_id: i64,
        campaign_id: i64,
    ) -> Result<Option<String>, DatabaseError>;

    /// Record an assignment. A pre-existing assignment for the pair is
    /// left untouched (at most one per pair, immutable once set).
    async fn record_assignment(
        &self,
        lead_id: i64,
        campaign_id: i64,
        account_email: &str,
    ) -> Result<(), DatabaseError>;

    // ── Follow-up definitions ───────────────────────────────────────

    /// The follow-up definition for (campaign, sequence), if any.
    async fn followup_definition(
        &self,
        campaign_id: i64,
        sequence: i64,
    ) -> Result<Option<FollowUpDefinition>, DatabaseError>;

    /// Insert a follow-up definition.
    async fn insert_followup(&self, def: &FollowUpDefinition) -> Result<(), DatabaseError>;

    // ── Leads ───────────────────────────────────────────────────────

    /// Insert a lead. Returns the lead id.
    async fn insert_lead(&self, lead: &Lead) -> Result<i64, DatabaseError>;

    /// Look up one lead.
    async fn lead(&self, id: i64) -> Result<Option<Lead>, DatabaseError>;

    /// Mark a lead as responded (write contract of the external
    /// reply-detection job).
    async fn mark_lead_responded(&self, id: i64, at: DateTime<Utc>) -> Result<(), DatabaseError>;

    // ── Click events ────────────────────────────────────────────────

    /// Record a tracking-link click.
    async fn record_click(&self, click: &ClickEvent) -> Result<(), DatabaseError>;
}
