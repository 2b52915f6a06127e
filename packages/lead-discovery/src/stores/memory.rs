//! In-memory configuration provider and lead sink for testing and development.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::{BoxError, SinkError};
use crate::traits::{ConfigurationProvider, LeadSink};
use crate::types::{Configuration, Lead};

/// Configurations, user status and saved leads in process memory.
///
/// Not suitable for production as data is lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    configurations: RwLock<HashMap<Uuid, Configuration>>,
    inactive_users: RwLock<HashSet<Uuid>>,
    leads: RwLock<HashMap<Uuid, Vec<Lead>>>,
    reject_saves: AtomicBool,
    save_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configurations(configurations: impl IntoIterator<Item = Configuration>) -> Self {
        let store = Self::new();
        for config in configurations {
            store.insert_configuration(config);
        }
        store
    }

    /// Insert or replace a configuration.
    pub fn insert_configuration(&self, config: Configuration) {
        write(&self.configurations).insert(config.id, config);
    }

    pub fn remove_configuration(&self, id: Uuid) -> Option<Configuration> {
        write(&self.configurations).remove(&id)
    }

    pub fn configuration_snapshot(&self, id: Uuid) -> Option<Configuration> {
        read(&self.configurations).get(&id).cloned()
    }

    pub fn configurations(&self) -> Vec<Configuration> {
        read(&self.configurations).values().cloned().collect()
    }

    /// Users are active unless marked otherwise.
    pub fn set_user_active(&self, user_id: Uuid, active: bool) {
        let mut inactive = write(&self.inactive_users);
        if active {
            inactive.remove(&user_id);
        } else {
            inactive.insert(user_id);
        }
    }

    /// Make every subsequent save fail.
    pub fn set_reject_saves(&self, reject: bool) {
        self.reject_saves.store(reject, Ordering::SeqCst);
    }

    pub fn leads_for(&self, user_id: Uuid) -> Vec<Lead> {
        read(&self.leads).get(&user_id).cloned().unwrap_or_default()
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigurationProvider for MemoryStore {
    async fn configuration(&self, id: Uuid) -> Result<Option<Configuration>, BoxError> {
        Ok(self.configuration_snapshot(id))
    }

    async fn is_user_active(&self, user_id: Uuid) -> Result<bool, BoxError> {
        Ok(!read(&self.inactive_users).contains(&user_id))
    }
}

#[async_trait]
impl LeadSink for MemoryStore {
    async fn save_leads(&self, user_id: Uuid, leads: &[Lead]) -> Result<usize, SinkError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_saves.load(Ordering::SeqCst) {
            return Err(SinkError::Rejected("store is rejecting writes".into()));
        }

        let mut all = write(&self.leads);
        let saved = all.entry(user_id).or_default();
        let mut stored = 0;
        for lead in leads {
            if saved.iter().any(|existing| existing.url == lead.url) {
                continue;
            }
            saved.push(lead.clone());
            stored += 1;
        }
        debug!(
            user_id = %user_id,
            offered = leads.len(),
            stored = stored,
            "Leads saved"
        );
        Ok(stored)
    }

    async fn record_run(
        &self,
        config_id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), SinkError> {
        if let Some(config) = write(&self.configurations).get_mut(&config_id) {
            config.last_run_at = Some(last_run_at);
            config.next_run_at = next_run_at;
        }
        Ok(())
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Completeness, LeadFields, SourceKind};

    fn lead(url: &str) -> Lead {
        let fields = LeadFields::default();
        Lead {
            title: "Hotel".into(),
            url: url.into(),
            source: SourceKind::Tavily,
            verified_source: true,
            published_at: None,
            completeness: Completeness::of(&fields),
            fields,
            description: String::new(),
            confidence: 10,
            verification_note: None,
        }
    }

    #[tokio::test]
    async fn test_save_dedups_per_user() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();

        let stored = store
            .save_leads(user, &[lead("https://a.com"), lead("https://b.com")])
            .await
            .unwrap();
        assert_eq!(stored, 2);

        let stored = store
            .save_leads(user, &[lead("https://a.com"), lead("https://c.com")])
            .await
            .unwrap();
        assert_eq!(stored, 1);

        // Same URL, different user
        assert_eq!(store.save_leads(other, &[lead("https://a.com")]).await.unwrap(), 1);
        assert_eq!(store.leads_for(user).len(), 3);
    }

    #[tokio::test]
    async fn test_rejecting_store() {
        let store = MemoryStore::new();
        store.set_reject_saves(true);
        let err = store
            .save_leads(Uuid::new_v4(), &[lead("https://a.com")])
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Rejected(_)));
        assert_eq!(store.save_calls(), 1);
    }

    #[tokio::test]
    async fn test_user_activity_and_record_run() {
        let user = Uuid::new_v4();
        let config = Configuration::new(user, "Hotels", ["hotel"]);
        let id = config.id;
        let store = MemoryStore::from_configurations([config]);

        assert!(store.is_user_active(user).await.unwrap());
        store.set_user_active(user, false);
        assert!(!store.is_user_active(user).await.unwrap());

        let now = Utc::now();
        store.record_run(id, now, None).await.unwrap();
        let snapshot = store.configuration_snapshot(id).unwrap();
        assert_eq!(snapshot.last_run_at, Some(now));
        assert!(snapshot.next_run_at.is_none());
    }
}
