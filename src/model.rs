//! Domain types — sending accounts, queue items, leads, follow-ups.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An SMTP sending account from the pool.
///
/// Created by provisioning, read-only to the engine. The SMTP password is
/// vault-sealed; the engine opens it transiently at send time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendingAccount {
    /// From address; also the account's identity everywhere else.
    pub email: String,
    pub display_name: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    /// Vault-sealed SMTP password (base64 nonce ‖ ciphertext).
    pub sealed_smtp_password: String,
    /// IMAP endpoint, used only by the external reply-detection job.
    pub imap_host: Option<String>,
    pub imap_port: Option<u16>,
}

/// A queued outbound message.
///
/// `scheduled_for` is set at enqueue time and never mutated.
/// `sent_at` transitions NULL → non-NULL exactly once.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub id: i64,
    pub campaign_id: i64,
    pub lead_id: i64,
    /// Recipient address (denormalized from the lead at enqueue time).
    pub recipient: String,
    pub subject: String,
    pub body: String,
    /// Position in the campaign chain: 0 = initial send, N = Nth follow-up.
    pub sequence: i64,
    pub scheduled_for: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    /// Account the message was sent from, stamped on success.
    pub sent_from: Option<String>,
    /// Claim marker guarding against concurrent passes (see dispatch::pass).
    pub claimed_at: Option<DateTime<Utc>>,
    /// Failed send attempts so far.
    pub attempts: i64,
    pub last_error: Option<String>,
}

/// Fields for enqueueing a new message.
#[derive(Debug, Clone)]
pub struct NewQueueItem {
    pub campaign_id: i64,
    pub lead_id: i64,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub sequence: i64,
    pub scheduled_for: DateTime<Utc>,
}

/// A follow-up message definition for one campaign sequence slot.
#[derive(Debug, Clone)]
pub struct FollowUpDefinition {
    pub campaign_id: i64,
    pub sequence: i64,
    /// Subject template with `{field}` placeholders.
    pub subject: String,
    /// Body template with `{field}` placeholders.
    pub body: String,
    /// Days after the previous message in the sequence.
    pub delay_days: i64,
}

/// A recipient profile used to fill message templates.
#[derive(Debug, Clone)]
pub struct Lead {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub last_name: String,
    pub company: String,
    pub list_name: String,
    /// Free-form extra fields, available to templates alongside the
    /// built-in columns.
    pub custom_fields: BTreeMap<String, String>,
    /// Set by the external reply-detection job. A responded lead is a hard
    /// stop: nothing further is sent or enqueued for it.
    pub responded: bool,
    pub responded_at: Option<DateTime<Utc>>,
}

impl Lead {
    /// The substitution map templates render against: built-in columns
    /// first, then custom fields (custom fields win on name collision).
    pub fn template_fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert("email".to_string(), self.email.clone());
        fields.insert("name".to_string(), self.name.clone());
        fields.insert("last_name".to_string(), self.last_name.clone());
        fields.insert("company".to_string(), self.company.clone());
        fields.insert("list_name".to_string(), self.list_name.clone());
        for (k, v) in &self.custom_fields {
            fields.insert(k.clone(), v.clone());
        }
        fields
    }
}

/// An account together with its remaining daily capacity, as seen by the
/// allocator for one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountCapacity {
    pub email: String,
    pub remaining: i64,
}

/// A recorded tracking-link click.
///
/// Identifier fields are optional: the redirect endpoint records unparsable
/// ids as absent rather than failing the redirect.
#[derive(Debug, Clone)]
pub struct ClickEvent {
    pub lead_id: Option<i64>,
    pub campaign_id: Option<i64>,
    pub queue_item_id: Option<i64>,
    pub url: String,
}
