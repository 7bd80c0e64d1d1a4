//! Account allocation — sticky assignments with round-robin fallback.
//!
//! A lead's whole campaign sequence must come from one sender (consistent
//! From address for deliverability and reply threading), so an existing
//! assignment always wins while its account has capacity. Unassigned leads
//! draw from a round-robin rotation over the accounts that can still send
//! today.

use crate::model::AccountCapacity;

/// Outcome of an allocation attempt for one queue item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pick {
    /// Existing assignment, account still has capacity. Cursor untouched.
    Sticky(String),
    /// No assignment existed; this account was chosen round-robin and the
    /// caller must record the new assignment.
    Fresh(String),
    /// Existing assignment but its account is exhausted: leave the item
    /// queued for a later pass, never reassign mid-sequence.
    Skip,
    /// No account has remaining capacity; the pass halts.
    Exhausted,
}

/// The per-pass allocation state machine.
///
/// Rotation order is pinned for determinism: remaining capacity
/// descending, ties broken by email ascending.
pub struct AccountPool {
    accounts: Vec<AccountCapacity>,
    cursor: usize,
}

impl AccountPool {
    /// Build the pool from accounts with `remaining > 0`.
    pub fn new(mut accounts: Vec<AccountCapacity>) -> Self {
        accounts.retain(|a| a.remaining > 0);
        accounts.sort_by(|a, b| {
            b.remaining
                .cmp(&a.remaining)
                .then_with(|| a.email.cmp(&b.email))
        });
        Self {
            accounts,
            cursor: 0,
        }
    }

    /// Whether any account can still send.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Choose the account for an item, honoring an existing assignment.
    pub fn pick(&mut self, existing_assignment: Option<&str>) -> Pick {
        if self.accounts.is_empty() {
            return Pick::Exhausted;
        }

        if let Some(assigned) = existing_assignment {
            return if self.accounts.iter().any(|a| a.email == assigned) {
                Pick::Sticky(assigned.to_string())
            } else {
                Pick::Skip
            };
        }

        if self.cursor >= self.accounts.len() {
            self.cursor = 0;
        }
        let email = self.accounts[self.cursor].email.clone();
        self.cursor += 1;
        Pick::Fresh(email)
    }

    /// Update an account after a successful send. Removes it from rotation
    /// when its capacity hits zero, keeping the cursor on the account that
    /// would have been next.
    pub fn debit(&mut self, email: &str, new_remaining: i64) {
        let Some(idx) = self.accounts.iter().position(|a| a.email == email) else {
            return;
        };
        if new_remaining > 0 {
            self.accounts[idx].remaining = new_remaining;
        } else {
            self.accounts.remove(idx);
            if idx < self.cursor {
                self.cursor -= 1;
            }
            if !self.accounts.is_empty() && self.cursor >= self.accounts.len() {
                self.cursor = 0;
            }
        }
    }

    /// Drop an account from rotation for the rest of the pass (e.g. its
    /// credentials failed to open).
    pub fn remove(&mut self, email: &str) {
        self.debit(email, 0);
    }
}
