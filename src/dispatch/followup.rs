//! Follow-up scheduling — chains the next message after a successful send.
//!
//! This is how one initial send becomes an unattended drip sequence: each
//! send looks up the definition for the next sequence slot and enqueues it
//! with the campaign's configured delay. No definition means the sequence
//! is complete, which is not an error.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::DatabaseError;
use crate::model::{NewQueueItem, QueueItem};
use crate::store::Database;
use crate::template;

/// Enqueue the follow-up to a just-sent item, if its campaign defines one.
///
/// Returns the new queue item id, or `None` when the sequence ends here —
/// either no definition for the next slot, the lead is gone, or the lead
/// has responded (hard stop: a conversation has started, the drip must
/// not continue).
pub async fn schedule_next(
    store: &Arc<dyn Database>,
    sent_item: &QueueItem,
    now: DateTime<Utc>,
) -> Result<Option<i64>, DatabaseError> {
    let next_sequence = sent_item.sequence + 1;

    let Some(def) = store
        .followup_definition(sent_item.campaign_id, next_sequence)
        .await?
    else {
        return Ok(None);
    };

    let Some(lead) = store.lead(sent_item.lead_id).await? else {
        return Ok(None);
    };
    if lead.responded {
        debug!(
            lead = lead.id,
            campaign = sent_item.campaign_id,
            "Lead has responded, not chaining follow-up"
        );
        return Ok(None);
    }

    let fields = lead.template_fields();
    let item = NewQueueItem {
        campaign_id: sent_item.campaign_id,
        lead_id: sent_item.lead_id,
        recipient: lead.email.clone(),
        subject: template::render(&def.subject, &fields),
        body: template::render(&def.body, &fields),
        sequence: next_sequence,
        scheduled_for: now + Duration::days(def.delay_days),
    };

    let id = store.enqueue(&item).await?;
    debug!(
        item = id,
        campaign = sent_item.campaign_id,
        lead = sent_item.lead_id,
        sequence = next_sequence,
        delay_days = def.delay_days,
        "Follow-up enqueued"
    );
    Ok(Some(id))
}
