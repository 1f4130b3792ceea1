//! In-memory credential storage
//!
//! Holds at most one Fitbit credential for the lifetime of the process.
//! Nothing is persisted; a restart starts unauthenticated.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

/// A record is treated as expired this many seconds before its literal expiry
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// The Fitbit credential: an access/refresh token pair and its expiry
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    /// Bearer token for resource calls
    pub access_token: String,
    /// Single-use token exchanged for the next record
    pub refresh_token: String,
    /// Absolute instant after which `access_token` is unusable
    pub expires_at: DateTime<Utc>,
    /// Fitbit user id, only used for status reporting
    pub subject_id: String,
}

impl CredentialRecord {
    /// Build a record from a token grant, anchoring the lifetime at `now`
    pub fn from_grant(
        access_token: String,
        refresh_token: String,
        expires_in_secs: u64,
        subject_id: String,
        now: DateTime<Utc>,
    ) -> Self {
        let lifetime = i64::try_from(expires_in_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);

        Self {
            access_token,
            refresh_token,
            expires_at: now.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC),
            subject_id,
        }
    }

    /// Whether the record counts as expired at `now` (margin included)
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.signed_duration_since(now) <= TimeDelta::seconds(EXPIRY_MARGIN_SECS)
    }
}

// Tokens never reach logs through Debug.
impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("subject_id", &self.subject_id)
            .finish()
    }
}

/// Owner of the current credential record
#[derive(Debug, Default)]
pub struct CredentialStore {
    current: RwLock<Option<CredentialRecord>>,
}

impl CredentialStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored record wholesale
    pub fn save(&self, record: CredentialRecord) {
        info!(subject = %record.subject_id, expires_at = %record.expires_at, "Saved Fitbit credential");
        *self.current.write() = Some(record);
    }

    /// Current record, if any
    pub fn get(&self) -> Option<CredentialRecord> {
        self.current.read().clone()
    }

    /// `true` when absent, or when now is within the margin of expiry
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Same as [`Self::is_expired`] against an explicit instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.current
            .read()
            .as_ref()
            .is_none_or(|record| record.is_expired_at(now))
    }

    /// Drop the stored record
    pub fn clear(&self) {
        if self.current.write().take().is_some() {
            info!("Cleared Fitbit credential");
        } else {
            debug!("Clear requested on empty credential store");
        }
    }
}
