//! One dispatch pass — fetch due items, allocate, send, account, chain.
//!
//! A pass is a single stateless batch invocation: allocator and ledger
//! state live only for its duration and every per-item write goes through
//! an atomic conditional update, so overlapping passes never deliver the
//! same item twice. Items are processed strictly sequentially because each
//! send mutates the quota/allocation view the next item depends on.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::dispatch::allocator::{AccountPool, Pick};
use crate::dispatch::followup;
use crate::dispatch::ledger::QuotaLedger;
use crate::dispatch::tracker;
use crate::error::Error;
use crate::relay::{OutboundEmail, Relay};
use crate::store::Database;
use crate::vault::Vault;

/// Failed sends per item before it stops being selected (dead-letter cap).
pub const MAX_SEND_ATTEMPTS: i64 = 3;

/// Claims older than this are treated as abandoned by a crashed pass.
pub const CLAIM_TTL_MINUTES: i64 = 10;

/// Aggregate outcome counts for one pass. Failures are reported here, not
/// raised per item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Due items fetched this pass (bounded by batch size).
    pub selected: usize,
    pub sent: usize,
    pub failed: usize,
    /// Items left queued for a later pass (exhausted sticky account,
    /// concurrent claim, credential failure).
    pub skipped: usize,
    pub followups_queued: usize,
    /// Sends whose quota increment failed to persist; the operator-visible
    /// count undercounts by this many.
    pub ledger_errors: usize,
}

/// Run one batch pass. Returns the aggregate report; an `Err` means the
/// pass itself could not proceed (storage unavailable), not that any
/// individual send failed.
pub async fn run_pass(
    store: &Arc<dyn Database>,
    vault: &Vault,
    relay: &dyn Relay,
    base_url: &str,
    batch_size: usize,
) -> Result<PassReport, Error> {
    let now = Utc::now();
    let reclaim_before = now - Duration::minutes(CLAIM_TTL_MINUTES);

    let items = store
        .due_queue_items(now, reclaim_before, MAX_SEND_ATTEMPTS, batch_size)
        .await?;
    let mut report = PassReport {
        selected: items.len(),
        ..Default::default()
    };
    if items.is_empty() {
        debug!("No queue items due");
        return Ok(report);
    }

    let accounts: HashMap<String, _> = store
        .accounts()
        .await?
        .into_iter()
        .map(|a| (a.email.clone(), a))
        .collect();
    let emails: Vec<String> = accounts.keys().cloned().collect();

    let mut ledger = QuotaLedger::load(store, &emails, now.date_naive()).await?;
    let mut pool = AccountPool::new(ledger.accounts_with_capacity());
    if pool.is_empty() {
        info!(due = items.len(), "Every sending account is at its daily cap, halting pass");
        return Ok(report);
    }

    debug!(due = items.len(), "Dispatch pass started");

    for item in items {
        let existing = store.assignment_for(item.lead_id, item.campaign_id).await?;

        let account_email = match pool.pick(existing.as_deref()) {
            Pick::Exhausted => {
                info!("Sending capacity exhausted mid-pass, remaining items wait");
                break;
            }
            Pick::Skip => {
                debug!(
                    item = item.id,
                    account = existing.as_deref().unwrap_or(""),
                    "Assigned account has no capacity today, leaving item queued"
                );
                report.skipped += 1;
                continue;
            }
            Pick::Sticky(email) => email,
            Pick::Fresh(email) => {
                // Recorded at allocation time so the rest of the sequence
                // sticks to this sender even if today's send fails.
                store
                    .record_assignment(item.lead_id, item.campaign_id, &email)
                    .await?;
                email
            }
        };

        let Some(account) = accounts.get(&account_email) else {
            warn!(account = %account_email, "Account vanished from configuration, dropping from rotation");
            pool.remove(&account_email);
            report.skipped += 1;
            continue;
        };

        // Claim before the network send: no two concurrent passes may both
        // deliver this item.
        if !store.claim_queue_item(item.id, now, reclaim_before).await? {
            debug!(item = item.id, "Item claimed by a concurrent pass, skipping");
            report.skipped += 1;
            continue;
        }

        let password = match vault.open(&account.sealed_smtp_password) {
            Ok(p) => p,
            Err(e) => {
                error!(account = %account.email, error = %e, "Cannot open relay credentials, skipping account this pass");
                pool.remove(&account.email);
                store.release_claim(item.id).await?;
                report.skipped += 1;
                continue;
            }
        };

        let email = OutboundEmail {
            to: item.recipient.clone(),
            subject: item.subject.clone(),
            html_body: tracker::rewrite_links(
                &item.body,
                item.lead_id,
                item.campaign_id,
                item.id,
                base_url,
            ),
        };

        if let Err(e) = relay.send(account, &password, &email).await {
            warn!(item = item.id, account = %account.email, error = %e, "Send failed, item stays queued");
            store.record_failure(item.id, &e.to_string()).await?;
            report.failed += 1;
            continue;
        }

        let sent_at = Utc::now();
        if !store.mark_sent(item.id, sent_at, &account.email).await? {
            // The delivery already happened; a concurrent pass beat us to
            // the confirm. Surface it, nothing to roll back.
            warn!(item = item.id, "Item was already marked sent by a concurrent pass");
        }

        let remaining = match ledger.record_send(store, &account.email).await {
            Ok(remaining) => remaining,
            Err(e) => {
                // The send is irreversible, so the item stays sent and the
                // operator-visible count undercounts. Never silent.
                error!(account = %account.email, error = %e, "Quota increment failed after send");
                report.ledger_errors += 1;
                ledger.record_send_unpersisted(&account.email)
            }
        };
        pool.debit(&account.email, remaining);

        match followup::schedule_next(store, &item, sent_at).await {
            Ok(Some(_)) => report.followups_queued += 1,
            Ok(None) => {}
            Err(e) => {
                error!(item = item.id, error = %e, "Failed to schedule follow-up");
            }
        }

        report.sent += 1;
    }

    info!(
        selected = report.selected,
        sent = report.sent,
        failed = report.failed,
        skipped = report.skipped,
        followups = report.followups_queued,
        "Dispatch pass complete"
    );
    Ok(report)
}
