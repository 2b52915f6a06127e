//! Proxy pool with rolling health.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::transport::ProxyEndpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyHealth {
    Healthy,
    Quarantined,
}

/// Thresholds for quarantining and restoring proxies.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthPolicy {
    /// Number of recent outcomes kept per proxy
    pub window: usize,
    /// Outcomes required before a proxy can be judged
    pub min_samples: usize,
    pub min_success_rate: f64,
    /// How long a proxy sits out before it may be restored
    pub cooldown: Duration,
    /// Probed through a quarantined proxy before restoring it. None restores on cooldown alone.
    pub probe_url: Option<String>,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            window: 20,
            min_samples: 5,
            min_success_rate: 0.5,
            cooldown: Duration::from_secs(300),
            probe_url: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyRecord {
    pub id: usize,
    pub endpoint: ProxyEndpoint,
    pub health: ProxyHealth,
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub quarantined_at: Option<DateTime<Utc>>,
    recent: VecDeque<bool>,
}

impl ProxyRecord {
    fn new(id: usize, endpoint: ProxyEndpoint) -> Self {
        Self {
            id,
            endpoint,
            health: ProxyHealth::Healthy,
            requests: 0,
            successes: 0,
            failures: 0,
            last_failure_at: None,
            quarantined_at: None,
            recent: VecDeque::new(),
        }
    }

    /// Success rate over the rolling window, None until anything was recorded.
    pub fn success_rate(&self) -> Option<f64> {
        if self.recent.is_empty() {
            return None;
        }
        let ok = self.recent.iter().filter(|s| **s).count();
        Some(ok as f64 / self.recent.len() as f64)
    }

    pub fn samples(&self) -> usize {
        self.recent.len()
    }
}

/// Serializable view of one proxy, credentials left out.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyStatus {
    pub id: usize,
    pub address: String,
    pub health: ProxyHealth,
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: Option<f64>,
}

pub struct ProxyPool {
    records: RwLock<Vec<ProxyRecord>>,
    cursor: AtomicUsize,
    policy: HealthPolicy,
}

impl ProxyPool {
    pub fn new(endpoints: Vec<ProxyEndpoint>, policy: HealthPolicy) -> Self {
        let records = endpoints
            .into_iter()
            .enumerate()
            .map(|(id, endpoint)| ProxyRecord::new(id, endpoint))
            .collect();
        Self {
            records: RwLock::new(records),
            cursor: AtomicUsize::new(0),
            policy,
        }
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn healthy_count(&self) -> usize {
        self.read()
            .iter()
            .filter(|r| r.health == ProxyHealth::Healthy)
            .count()
    }

    /// Next healthy proxy in round-robin order, skipping `exclude` when there is
    /// any other choice.
    pub fn select(&self, exclude: Option<usize>) -> Option<(usize, ProxyEndpoint)> {
        let records = self.read();
        let healthy: Vec<&ProxyRecord> = records
            .iter()
            .filter(|r| r.health == ProxyHealth::Healthy)
            .collect();
        if healthy.is_empty() {
            return None;
        }

        let candidates: Vec<&ProxyRecord> = if healthy.len() > 1 {
            healthy
                .iter()
                .copied()
                .filter(|r| Some(r.id) != exclude)
                .collect()
        } else {
            healthy
        };
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
        let chosen = candidates[index];
        Some((chosen.id, chosen.endpoint.clone()))
    }

    pub fn endpoint(&self, id: usize) -> Option<(ProxyEndpoint, ProxyHealth)> {
        self.read()
            .iter()
            .find(|r| r.id == id)
            .map(|r| (r.endpoint.clone(), r.health))
    }

    pub fn record_outcome(&self, id: usize, success: bool, at: DateTime<Utc>) {
        let mut records = self.write();
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return;
        };
        record.requests += 1;
        if success {
            record.successes += 1;
        } else {
            record.failures += 1;
            record.last_failure_at = Some(at);
        }
        record.recent.push_back(success);
        while record.recent.len() > self.policy.window {
            record.recent.pop_front();
        }
    }

    /// Quarantine healthy proxies whose rolling success rate fell below the threshold.
    /// Returns the ids quarantined.
    pub fn quarantine_failing(&self, now: DateTime<Utc>) -> Vec<usize> {
        let mut records = self.write();
        let mut quarantined = Vec::new();
        for record in records.iter_mut() {
            if record.health != ProxyHealth::Healthy || record.samples() < self.policy.min_samples
            {
                continue;
            }
            if record
                .success_rate()
                .is_some_and(|rate| rate < self.policy.min_success_rate)
            {
                record.health = ProxyHealth::Quarantined;
                record.quarantined_at = Some(now);
                quarantined.push(record.id);
            }
        }
        quarantined
    }

    /// Quarantined proxies whose cooldown has elapsed.
    pub fn due_for_restore(&self, now: DateTime<Utc>) -> Vec<(usize, ProxyEndpoint)> {
        let cooldown = chrono::Duration::from_std(self.policy.cooldown)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        self.read()
            .iter()
            .filter(|r| r.health == ProxyHealth::Quarantined)
            .filter(|r| r.quarantined_at.is_some_and(|at| now - at >= cooldown))
            .map(|r| (r.id, r.endpoint.clone()))
            .collect()
    }

    /// Put a proxy back into rotation with a clean window.
    pub fn restore(&self, id: usize) {
        let mut records = self.write();
        if let Some(record) = records.iter_mut().find(|r| r.id == id) {
            record.health = ProxyHealth::Healthy;
            record.quarantined_at = None;
            record.recent.clear();
        }
    }

    /// Restart the cooldown of a proxy whose probe failed.
    pub fn extend_quarantine(&self, id: usize, now: DateTime<Utc>) {
        let mut records = self.write();
        if let Some(record) = records.iter_mut().find(|r| r.id == id) {
            record.quarantined_at = Some(now);
        }
    }

    pub fn snapshot(&self) -> Vec<ProxyStatus> {
        self.read()
            .iter()
            .map(|r| ProxyStatus {
                id: r.id,
                address: r.endpoint.address.clone(),
                health: r.health,
                requests: r.requests,
                successes: r.successes,
                failures: r.failures,
                success_rate: r.success_rate(),
            })
            .collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<ProxyRecord>> {
        self.records.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<ProxyRecord>> {
        self.records.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pool(n: usize) -> ProxyPool {
        let endpoints = (0..n)
            .map(|i| ProxyEndpoint::new(format!("http://10.0.0.{}:8080", i + 1)))
            .collect();
        ProxyPool::new(endpoints, HealthPolicy::default())
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_select_excludes_previous_when_possible() {
        let pool = pool(2);
        for _ in 0..4 {
            let (id, _) = pool.select(Some(0)).unwrap();
            assert_eq!(id, 1);
        }
        let single = self::pool(1);
        assert_eq!(single.select(Some(0)).unwrap().0, 0);
    }

    #[test]
    fn test_quarantine_needs_min_samples() {
        let pool = pool(1);
        for _ in 0..4 {
            pool.record_outcome(0, false, t0());
        }
        assert!(pool.quarantine_failing(t0()).is_empty());
        pool.record_outcome(0, false, t0());
        assert_eq!(pool.quarantine_failing(t0()), vec![0]);
        assert!(pool.select(None).is_none());
    }

    #[test]
    fn test_restore_after_cooldown() {
        let pool = pool(1);
        for _ in 0..5 {
            pool.record_outcome(0, false, t0());
        }
        pool.quarantine_failing(t0());

        assert!(pool.due_for_restore(t0() + chrono::Duration::minutes(1)).is_empty());
        let due = pool.due_for_restore(t0() + chrono::Duration::minutes(5));
        assert_eq!(due.len(), 1);

        pool.restore(0);
        assert_eq!(pool.healthy_count(), 1);
        assert_eq!(pool.snapshot()[0].success_rate, None);
    }

    #[test]
    fn test_window_rolls() {
        let pool = pool(1);
        for _ in 0..20 {
            pool.record_outcome(0, false, t0());
        }
        for _ in 0..20 {
            pool.record_outcome(0, true, t0());
        }
        let status = &pool.snapshot()[0];
        assert_eq!(status.success_rate, Some(1.0));
        assert_eq!(status.requests, 40);
        assert_eq!(status.failures, 20);
    }
}
