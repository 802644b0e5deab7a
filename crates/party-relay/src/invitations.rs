//! Pending invitations, queued per target user
//!
//! Each target user has an append-ordered mailbox. Nothing prevents the same
//! (target, session) pair from being queued twice; accepting or declining
//! removes every entry for that pair in one pass.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

/// Caller-supplied fields of an invitation. None of them are validated.
#[derive(Clone, Debug, Default)]
pub struct InvitationRequest {
    pub session_id: String,
    pub host_user_uuid: String,
    pub host_display_name: Option<String>,
    pub target_user_uuid: String,
    pub media_title: Option<String>,
    pub media_thumb: Option<String>,
}

/// A queued invitation
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub session_id: String,
    #[serde(rename = "hostUserUUID")]
    pub host_user_uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_display_name: Option<String>,
    #[serde(rename = "targetUserUUID")]
    pub target_user_uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_thumb: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Monotonic expiry used for every expiry decision
    #[serde(skip)]
    deadline: Instant,
}

impl Invitation {
    pub fn new(request: InvitationRequest, ttl: Duration, now: Instant) -> Self {
        let created_at = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            session_id: request.session_id,
            host_user_uuid: request.host_user_uuid,
            host_display_name: request.host_display_name,
            target_user_uuid: request.target_user_uuid,
            media_title: request.media_title,
            media_thumb: request.media_thumb,
            created_at,
            expires_at,
            deadline: now + ttl,
        }
    }

    /// Whether the TTL has elapsed at `now`
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

/// Server-wide invitation queues keyed by target user
#[derive(Debug, Default)]
pub struct InvitationTable {
    queues: HashMap<String, Vec<Invitation>>,
}

impl InvitationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the target's queue
    pub fn push(&mut self, invitation: Invitation) {
        self.queues
            .entry(invitation.target_user_uuid.clone())
            .or_default()
            .push(invitation);
    }

    /// Unexpired invitations for `target`, in the order they were sent
    pub fn pending(&self, target: &str, now: Instant) -> Vec<Invitation> {
        self.queues
            .get(target)
            .map(|queue| {
                queue
                    .iter()
                    .filter(|inv| !inv.is_expired(now))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove every invitation for (target, session).
    ///
    /// Returns the unexpired ones; an empty result means there was nothing
    /// to accept or decline. Expired matches are dropped as well.
    pub fn take(&mut self, target: &str, session_id: &str, now: Instant) -> Vec<Invitation> {
        let Some(queue) = self.queues.get_mut(target) else {
            return Vec::new();
        };

        let mut taken = Vec::new();
        queue.retain(|inv| {
            if inv.session_id != session_id {
                return true;
            }
            if !inv.is_expired(now) {
                taken.push(inv.clone());
            }
            false
        });

        if queue.is_empty() {
            self.queues.remove(target);
        }
        taken
    }

    /// Drop expired invitations, and queues left empty.
    ///
    /// Returns the number of invitations removed.
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        self.queues.retain(|_, queue| {
            let before = queue.len();
            queue.retain(|inv| !inv.is_expired(now));
            removed += before - queue.len();
            !queue.is_empty()
        });
        removed
    }

    /// Total queued invitations, expired or not
    pub fn len(&self) -> usize {
        self.queues.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
