//! Per-host session affinity.
//!
//! A host keeps talking to the same proxy with the same user agent until a
//! block forces rotation or the session sits idle past its TTL.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// None means a direct connection
    pub proxy_id: Option<usize>,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub requests: u64,
}

pub struct SessionTable {
    sessions: DashMap<String, Session>,
    ttl: Duration,
}

impl SessionTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, host: &str) -> Option<Session> {
        self.sessions.get(host).map(|s| s.value().clone())
    }

    /// Existing session for `host`, or one built by `create`.
    pub fn get_or_create(&self, host: &str, create: impl FnOnce() -> Session) -> Session {
        self.sessions
            .entry(host.to_string())
            .or_insert_with(create)
            .value()
            .clone()
    }

    pub fn replace(&self, host: &str, session: Session) {
        self.sessions.insert(host.to_string(), session);
    }

    pub fn touch(&self, host: &str, now: DateTime<Utc>) {
        if let Some(mut session) = self.sessions.get_mut(host) {
            session.last_used_at = now;
            session.requests += 1;
        }
    }

    pub fn remove(&self, host: &str) {
        self.sessions.remove(host);
    }

    /// Forget every session pinned to a proxy, e.g. after quarantining it.
    pub fn drop_for_proxy(&self, proxy_id: usize) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.proxy_id != Some(proxy_id));
        before.saturating_sub(self.sessions.len())
    }

    /// Evict sessions idle past the TTL. Returns how many were removed.
    pub fn cleanup_idle(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| now - s.last_used_at < self.ttl);
        before.saturating_sub(self.sessions.len())
    }

    pub fn clear(&self) {
        self.sessions.clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session(proxy_id: Option<usize>, at: DateTime<Utc>) -> Session {
        Session {
            proxy_id,
            user_agent: "ua".into(),
            created_at: at,
            last_used_at: at,
            requests: 0,
        }
    }

    #[test]
    fn test_cleanup_idle_evicts_only_stale() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap();
        let table = SessionTable::new(Duration::minutes(10));
        table.replace("old.example.com", session(Some(0), t0));
        table.replace("fresh.example.com", session(Some(1), t0 + Duration::minutes(8)));

        assert_eq!(table.cleanup_idle(t0 + Duration::minutes(11)), 1);
        assert!(table.get("old.example.com").is_none());
        assert!(table.get("fresh.example.com").is_some());
    }

    #[test]
    fn test_get_or_create_keeps_affinity() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap();
        let table = SessionTable::new(Duration::minutes(10));
        let first = table.get_or_create("a.com", || session(Some(2), t0));
        let second = table.get_or_create("a.com", || session(Some(5), t0));
        assert_eq!(first.proxy_id, second.proxy_id);

        table.touch("a.com", t0 + Duration::minutes(1));
        assert_eq!(table.get("a.com").unwrap().requests, 1);
        assert_eq!(table.drop_for_proxy(2), 1);
        assert!(table.is_empty());
    }
}
