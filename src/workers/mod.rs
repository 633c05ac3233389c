//! Concurrency gates: running/io semaphores, per-host limits, and the
//! process-wide rescan budget.
//!
//! Workers hold a running permit for CPU/local work and trade it for an io
//! session around network or external-process calls. An io session first
//! acquires the per-host semaphore (regex rules, longest-pattern-wins),
//! then an io slot, so one slow site cannot monopolize io concurrency.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use regex::Regex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{error, warn};

use crate::config::WorkersConfig;

/// Holds one running-state slot.
pub struct RunningGuard {
    _permit: OwnedSemaphorePermit,
}

/// Holds one io-state slot plus the matched host's slot.
///
/// Callers drop their [`RunningGuard`] before entering io and re-acquire
/// it afterwards, so blocked io never starves scan work.
pub struct IoSession {
    host: String,
    _host_permit: Option<OwnedSemaphorePermit>,
    _io_permit: OwnedSemaphorePermit,
}

impl IoSession {
    pub fn host(&self) -> &str {
        &self.host
    }
}

pub struct Throttle {
    running: Arc<Semaphore>,
    io: Arc<Semaphore>,
    host_rules: Vec<(String, Regex, usize)>,
    /// Built lazily on first sight of a host, read without locking after.
    host_semaphores: DashMap<String, Option<Arc<Semaphore>>>,
}

impl Throttle {
    pub fn new(config: &WorkersConfig) -> Self {
        let host_rules = config
            .host_limits
            .iter()
            .filter_map(|rule| {
                match Regex::new(&format!("(?i){}", rule.pattern)) {
                    Ok(re) => Some((rule.pattern.clone(), re, rule.limit)),
                    Err(err) => {
                        warn!(pattern = %rule.pattern, %err, "invalid host limit pattern ignored");
                        None
                    }
                }
            })
            .collect();
        Self {
            running: Arc::new(Semaphore::new(config.running.max(1))),
            io: Arc::new(Semaphore::new(config.io.max(1))),
            host_rules,
            host_semaphores: DashMap::new(),
        }
    }

    pub async fn enter_running(&self) -> RunningGuard {
        // acquire can only fail on a closed semaphore, which never happens
        // within a run
        let permit = self
            .running
            .clone()
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("running semaphore closed mid-run"));
        RunningGuard { _permit: permit }
    }

    /// Enter io state for `host`.
    ///
    /// Nested entry for the same host is a no-op (`None`). Entry for a
    /// different host while already in io is a likely bug: logged, then
    /// tolerated.
    pub async fn enter_io(&self, host: &str, outer: Option<&IoSession>) -> Option<IoSession> {
        if let Some(outer) = outer {
            if outer.host.eq_ignore_ascii_case(host) {
                return None;
            }
            error!(
                outer = %outer.host,
                inner = %host,
                "nested io entry for a different host, likely unbalanced enter/leave"
            );
        }

        let host_permit = match self.host_semaphore(host) {
            Some(sem) => Some(
                sem.acquire_owned()
                    .await
                    .unwrap_or_else(|_| unreachable!("host semaphore closed mid-run")),
            ),
            None => None,
        };
        let io_permit = self
            .io
            .clone()
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("io semaphore closed mid-run"));
        Some(IoSession {
            host: host.to_string(),
            _host_permit: host_permit,
            _io_permit: io_permit,
        })
    }

    /// Semaphore for the rule matching `host`, longest pattern wins.
    fn host_semaphore(&self, host: &str) -> Option<Arc<Semaphore>> {
        if let Some(existing) = self.host_semaphores.get(host) {
            return existing.clone();
        }
        let best = self
            .host_rules
            .iter()
            .filter(|(_, re, _)| re.is_match(host))
            .max_by_key(|(pattern, _, _)| pattern.len())
            .map(|(_, _, limit)| Arc::new(Semaphore::new(*limit)));
        self.host_semaphores.insert(host.to_string(), best.clone());
        best
    }
}

/// Token bucket capping the movies fully rescanned per invocation.
///
/// No replenishment within a run; exhaustion is a deliberate throttle,
/// not an error.
pub struct ScanBudget {
    limit: usize,
    used: AtomicUsize,
}

impl ScanBudget {
    /// `limit` of 0 means unlimited.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
        }
    }

    /// Take one token; false once the bucket is exhausted.
    pub fn try_take(&self) -> bool {
        if self.limit == 0 {
            return true;
        }
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < self.limit).then_some(used + 1)
            })
            .is_ok()
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostLimit;

    fn workers(host_limits: Vec<HostLimit>) -> WorkersConfig {
        WorkersConfig {
            running: 2,
            io: 2,
            host_limits,
            max_scans: 0,
        }
    }

    #[tokio::test]
    async fn nested_same_host_is_noop() {
        let throttle = Throttle::new(&workers(vec![]));
        let outer = throttle.enter_io("themoviedb.org", None).await.unwrap();
        let nested = throttle.enter_io("themoviedb.org", Some(&outer)).await;
        assert!(nested.is_none());
    }

    #[tokio::test]
    async fn host_limit_throttles_one_site() {
        let throttle = Throttle::new(&workers(vec![HostLimit {
            pattern: r".*themoviedb\.org".to_string(),
            limit: 1,
        }]));
        let first = throttle.enter_io("api.themoviedb.org", None).await.unwrap();
        // the second entry for the same site must block on the host slot
        let second = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            throttle.enter_io("api.themoviedb.org", None),
        )
        .await;
        assert!(second.is_err(), "host slot still held");
        drop(first);
        let third = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            throttle.enter_io("api.themoviedb.org", None),
        )
        .await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn unmatched_host_has_no_host_limit() {
        let throttle = Throttle::new(&workers(vec![HostLimit {
            pattern: r".*themoviedb\.org".to_string(),
            limit: 1,
        }]));
        let _a = throttle.enter_io("other.example.com", None).await.unwrap();
        let b = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            throttle.enter_io("other.example.com", None),
        )
        .await;
        assert!(b.is_ok(), "only the io gate applies");
    }

    #[test]
    fn budget_exhausts_exactly() {
        let budget = ScanBudget::new(3);
        assert!(budget.try_take());
        assert!(budget.try_take());
        assert!(budget.try_take());
        assert!(!budget.try_take());
        assert_eq!(budget.used(), 3);
    }

    #[test]
    fn zero_budget_is_unlimited() {
        let budget = ScanBudget::new(0);
        for _ in 0..100 {
            assert!(budget.try_take());
        }
    }
}
