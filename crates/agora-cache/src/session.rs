//! TTL-backed session store layered on the cache client.
//!
//! Sessions are plain cache entries under the `session:` prefix. Expiry is
//! entirely delegated to the store's TTL; there is no separate sweeper, so a
//! session that is not touched within its lifetime simply disappears.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

use agora_core::events::{EventBroadcaster, SessionEvent};

use crate::client::{CacheClient, WriteOptions};

/// Default session lifetime: 24 hours.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(86_400);

fn session_key(session_id: &str) -> String {
    format!("session:{session_id}")
}

/// A stored session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    /// Arbitrary per-user preference data carried with the session.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub preferences: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl SessionRecord {
    /// Create a session for a user with the given role.
    pub fn new(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            role: role.into(),
            permissions: Vec::new(),
            preferences: serde_json::Value::Null,
            last_activity: OffsetDateTime::now_utc(),
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip_address = Some(ip);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Partial update applied to an existing session.
///
/// Only the fields that are `Some` are changed; `last_activity` is always
/// refreshed.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub email: Option<String>,
    pub role: Option<String>,
    pub permissions: Option<Vec<String>>,
    pub preferences: Option<serde_json::Value>,
    pub ip_address: Option<IpAddr>,
    pub user_agent: Option<String>,
}

impl SessionPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_preferences(mut self, preferences: serde_json::Value) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip_address = Some(ip);
        self
    }

    /// Apply the set fields onto a record and refresh `last_activity`.
    pub fn merge_into(self, record: &mut SessionRecord) {
        if let Some(email) = self.email {
            record.email = Some(email);
        }
        if let Some(role) = self.role {
            record.role = role;
        }
        if let Some(permissions) = self.permissions {
            record.permissions = permissions;
        }
        if let Some(preferences) = self.preferences {
            record.preferences = preferences;
        }
        if let Some(ip) = self.ip_address {
            record.ip_address = Some(ip);
        }
        if let Some(user_agent) = self.user_agent {
            record.user_agent = Some(user_agent);
        }
        record.last_activity = OffsetDateTime::now_utc();
    }
}

/// Session store over a [`CacheClient`].
///
/// Writes refresh the TTL, so a session stays alive as long as it is touched
/// within its lifetime. An optional broadcaster emits lifecycle events.
#[derive(Clone)]
pub struct SessionStore {
    client: CacheClient,
    default_ttl: Duration,
    broadcaster: Option<Arc<EventBroadcaster>>,
}

impl SessionStore {
    pub fn new(client: CacheClient, default_ttl: Duration) -> Self {
        Self {
            client,
            default_ttl,
            broadcaster: None,
        }
    }

    /// Attach a broadcaster; `set_session` and `delete_session` will emit
    /// created/revoked events.
    pub fn with_broadcaster(mut self, broadcaster: Arc<EventBroadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.send_session(event);
        }
    }

    /// Persist a session under the caller-supplied id with the default TTL.
    /// Returns `false` on store failure.
    pub async fn set_session(&self, session_id: &str, record: &SessionRecord) -> bool {
        self.set_session_with_ttl(session_id, record, self.default_ttl)
            .await
    }

    /// Persist a session with an explicit TTL.
    pub async fn set_session_with_ttl(
        &self,
        session_id: &str,
        record: &SessionRecord,
        ttl: Duration,
    ) -> bool {
        let stored = self
            .client
            .set(
                &session_key(session_id),
                record,
                WriteOptions::new().with_ttl(ttl),
            )
            .await;
        if stored {
            let mut event = SessionEvent::created(session_id, &record.user_id);
            if let Some(ip) = record.ip_address {
                event = event.with_ip(ip);
            }
            self.emit(event);
        }
        stored
    }

    /// Fetch a session by id. Expired or unknown ids return `None`.
    pub async fn get_session(&self, session_id: &str) -> Option<SessionRecord> {
        self.client.get(&session_key(session_id)).await
    }

    /// Apply a patch to an existing session and re-store it with the default
    /// TTL. Returns `false` when the session is absent; never creates one.
    pub async fn update_session(&self, session_id: &str, patch: SessionPatch) -> bool {
        let Some(mut record) = self.get_session(session_id).await else {
            return false;
        };
        patch.merge_into(&mut record);
        self.client
            .set(
                &session_key(session_id),
                &record,
                WriteOptions::new().with_ttl(self.default_ttl),
            )
            .await
    }

    /// Delete a session. Returns whether it existed.
    pub async fn delete_session(&self, session_id: &str) -> bool {
        let Some(record) = self.get_session(session_id).await else {
            return false;
        };
        let removed = self.client.delete(&session_key(session_id)).await;
        if removed {
            self.emit(SessionEvent::revoked(session_id, &record.user_id));
        }
        removed
    }

    /// Refresh `last_activity` and the TTL without other changes.
    pub async fn touch(&self, session_id: &str) -> bool {
        self.update_session(session_id, SessionPatch::new()).await
    }

    /// All live sessions for a user, as `(session_id, record)` pairs.
    ///
    /// Scans the full `session:*` keyspace and filters client-side. O(n) in
    /// the number of sessions; acceptable at current scale.
    pub async fn get_user_sessions(&self, user_id: &str) -> Vec<(String, SessionRecord)> {
        let keys = self.client.keys("session:*").await;
        let records: Vec<Option<SessionRecord>> = self.client.mget(&keys).await;
        keys.into_iter()
            .zip(records)
            .filter_map(|(key, record)| {
                let record = record?;
                if record.user_id == user_id {
                    let id = key.strip_prefix("session:").unwrap_or(&key).to_string();
                    Some((id, record))
                } else {
                    None
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("default_ttl", &self.default_ttl)
            .field("has_broadcaster", &self.broadcaster.is_some())
            .finish()
    }
}
