//! Per-pass quota ledger — in-memory snapshot of today's sent counts.
//!
//! The snapshot is built once at pass start and mutated locally as sends
//! succeed, so one pass stays self-consistent without re-reading storage
//! per item. Persistence happens through the store's atomic increment; the
//! returned count refreshes the snapshot so overlapping passes converge on
//! the persisted truth.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::error::DatabaseError;
use crate::model::AccountCapacity;
use crate::store::Database;

/// Fixed daily send cap, shared by every account.
pub const DAILY_QUOTA_CAP: i64 = 50;

/// In-memory view of per-account sent counts for one calendar day.
pub struct QuotaLedger {
    day: NaiveDate,
    counts: HashMap<String, i64>,
}

impl QuotaLedger {
    /// Build the snapshot for `day` across the given accounts.
    pub async fn load(
        store: &Arc<dyn Database>,
        accounts: &[String],
        day: NaiveDate,
    ) -> Result<Self, DatabaseError> {
        let mut counts = HashMap::with_capacity(accounts.len());
        for email in accounts {
            let sent = store.sent_count(email, day).await?;
            counts.insert(email.clone(), sent);
        }
        debug!(%day, accounts = counts.len(), "Quota ledger loaded");
        Ok(Self { day, counts })
    }

    /// The day this snapshot covers.
    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// Remaining capacity for an account (0 for unknown accounts).
    pub fn remaining(&self, email: &str) -> i64 {
        match self.counts.get(email) {
            Some(sent) => (DAILY_QUOTA_CAP - sent).max(0),
            None => 0,
        }
    }

    /// Persist one send and refresh the snapshot from the returned count.
    /// Returns the account's new remaining capacity.
    pub async fn record_send(
        &mut self,
        store: &Arc<dyn Database>,
        email: &str,
    ) -> Result<i64, DatabaseError> {
        let sent = store.increment_sent_count(email, self.day).await?;
        self.counts.insert(email.to_string(), sent);
        Ok((DAILY_QUOTA_CAP - sent).max(0))
    }

    /// Advance the snapshot without persistence. Used when the increment
    /// write failed after an irreversible send: the operator-visible count
    /// may undercount (that is logged), but this pass must still stop
    /// allocating against capacity it has already used.
    pub fn record_send_unpersisted(&mut self, email: &str) -> i64 {
        let sent = self.counts.entry(email.to_string()).or_insert(0);
        *sent += 1;
        (DAILY_QUOTA_CAP - *sent).max(0)
    }

    /// Accounts that can still send today, for seeding the allocator.
    pub fn accounts_with_capacity(&self) -> Vec<AccountCapacity> {
        self.counts
            .iter()
            .filter(|(_, sent)| **sent < DAILY_QUOTA_CAP)
            .map(|(email, sent)| AccountCapacity {
                email: email.clone(),
                remaining: DAILY_QUOTA_CAP - sent,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    async fn ledger_with(
        counts: &[(&str, i64)],
    ) -> (Arc<dyn Database>, QuotaLedger) {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let day = chrono::Utc::now().date_naive();
        let emails: Vec<String> = counts.iter().map(|(e, _)| e.to_string()).collect();
        for (email, sent) in counts {
            for _ in 0..*sent {
                store.increment_sent_count(email, day).await.unwrap();
            }
        }
        let ledger = QuotaLedger::load(&store, &emails, day).await.unwrap();
        (store, ledger)
    }

    #[tokio::test]
    async fn remaining_reflects_persisted_counts() {
        let (_store, ledger) = ledger_with(&[("a@x", 10), ("b@x", 0)]).await;
        assert_eq!(ledger.remaining("a@x"), 40);
        assert_eq!(ledger.remaining("b@x"), 50);
        assert_eq!(ledger.remaining("unknown@x"), 0);
    }

    #[tokio::test]
    async fn record_send_persists_and_refreshes() {
        let (store, mut ledger) = ledger_with(&[("a@x", 0)]).await;
        let remaining = ledger.record_send(&store, "a@x").await.unwrap();
        assert_eq!(remaining, 49);
        assert_eq!(ledger.remaining("a@x"), 49);
        assert_eq!(
            store.sent_count("a@x", ledger.day()).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn capped_account_has_no_capacity() {
        let (_store, ledger) = ledger_with(&[("a@x", DAILY_QUOTA_CAP)]).await;
        assert_eq!(ledger.remaining("a@x"), 0);
        assert!(ledger.accounts_with_capacity().is_empty());
    }

    #[tokio::test]
    async fn unpersisted_send_still_debits_snapshot() {
        let (_store, mut ledger) = ledger_with(&[("a@x", 0)]).await;
        assert_eq!(ledger.record_send_unpersisted("a@x"), 49);
        assert_eq!(ledger.remaining("a@x"), 49);
    }
}
