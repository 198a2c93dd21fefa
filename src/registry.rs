// Token registry - short callback tokens standing in for long links
//
// Callback payloads are capped at 64 bytes by the messaging transport, so a
// social-media URL is replaced by the md5 hex digest of itself. Entries live
// in memory only and expire after `max_age`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info};

/// Length of every token id (md5 hex digest)
pub const TOKEN_LEN: usize = 32;

/// Time source for expiry decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Age and size bounds applied on every prune pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryLimits {
    pub max_age: Duration,
    pub max_size: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(30 * 60),
            max_size: 1024,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    payload: String,
    created_at: Instant,
    /// Insertion order, breaks timestamp ties
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

pub struct TokenRegistry {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    limits: RegistryLimits,
}

/// Deterministic token for a payload
pub fn token_for(payload: &str) -> String {
    format!("{:x}", md5::compute(payload.as_bytes()))
}

impl TokenRegistry {
    pub fn new(limits: RegistryLimits) -> Self {
        Self::with_clock(limits, Arc::new(SystemClock))
    }

    pub fn with_clock(limits: RegistryLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
            limits,
        }
    }

    /// Insert or refresh `payload` and return its token
    pub fn register(&self, payload: &str) -> String {
        let id = token_for(payload);
        let now = self.clock.now();

        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            id.clone(),
            Entry {
                payload: payload.to_string(),
                created_at: now,
                seq,
            },
        );
        Self::prune_locked(&mut inner, now, self.limits.max_age, self.limits.max_size);

        debug!(token = %id, size = inner.entries.len(), "token registered");
        id
    }

    /// Look up a token without refreshing it.
    ///
    /// Entries older than `max_age` resolve to `None` even if no prune pass
    /// has removed them yet.
    pub fn resolve(&self, id: &str) -> Option<String> {
        let now = self.clock.now();
        let inner = self.lock();
        let entry = inner.entries.get(id)?;
        if now.saturating_duration_since(entry.created_at) > self.limits.max_age {
            debug!(token = %id, "token is stale");
            return None;
        }
        Some(entry.payload.clone())
    }

    /// Drop entries older than `max_age`, then the oldest until at most `max_size` remain
    pub fn prune(&self, max_age: Duration, max_size: usize) {
        let now = self.clock.now();
        let mut inner = self.lock();
        Self::prune_locked(&mut inner, now, max_age, max_size);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune_locked(inner: &mut Inner, now: Instant, max_age: Duration, max_size: usize) {
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, entry| now.saturating_duration_since(entry.created_at) <= max_age);

        if inner.entries.len() > max_size {
            let mut by_age: Vec<(Instant, u64, String)> = inner
                .entries
                .iter()
                .map(|(id, entry)| (entry.created_at, entry.seq, id.clone()))
                .collect();
            by_age.sort();
            let excess = inner.entries.len() - max_size;
            for (_, _, id) in by_age.into_iter().take(excess) {
                inner.entries.remove(&id);
            }
        }

        let removed = before - inner.entries.len();
        if removed > 0 {
            info!(removed, remaining = inner.entries.len(), "registry pruned");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // a panic while holding the lock cannot leave an entry half-written
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeClock;

    fn registry(clock: &Arc<FakeClock>, max_age_secs: u64, max_size: usize) -> TokenRegistry {
        TokenRegistry::with_clock(
            RegistryLimits {
                max_age: Duration::from_secs(max_age_secs),
                max_size,
            },
            clock.clone(),
        )
    }

    #[test]
    fn test_register_then_resolve() {
        let clock = FakeClock::new();
        let reg = registry(&clock, 60, 10);
        for payload in ["https://www.instagram.com/p/abc/", "", "тест ✓"] {
            let id = reg.register(payload);
            assert_eq!(reg.resolve(&id).as_deref(), Some(payload));
        }
    }

    #[test]
    fn test_token_is_fixed_length_ascii_and_stable() {
        let clock = FakeClock::new();
        let reg = registry(&clock, 60, 10);
        let long = format!("https://www.tiktok.com/@user/video/{}", "9".repeat(300));
        let a = reg.register(&long);
        let b = reg.register(&long);

        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
        assert_eq!(a.len(), TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, reg.register("https://www.tiktok.com/other"));
    }

    #[test]
    fn test_size_bound_keeps_most_recent() {
        let clock = FakeClock::new();
        let reg = registry(&clock, 3600, 3);
        let ids: Vec<String> = (0..7).map(|i| {
            let id = reg.register(&format!("link-{}", i));
            assert!(reg.len() <= 3);
            id
        }).collect();

        // identical timestamps: insertion order decides
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(reg.resolve(id).is_some(), i >= 4, "entry {}", i);
        }
    }

    #[test]
    fn test_re_register_refreshes_position() {
        let clock = FakeClock::new();
        let reg = registry(&clock, 3600, 2);
        let first = reg.register("a");
        clock.advance(Duration::from_secs(1));
        reg.register("b");
        clock.advance(Duration::from_secs(1));
        reg.register("a");
        clock.advance(Duration::from_secs(1));
        reg.register("c");

        assert!(reg.resolve(&first).is_some());
        assert!(reg.resolve(&token_for("b")).is_none());
    }

    #[test]
    fn test_resolve_checks_freshness_without_prune() {
        let clock = FakeClock::new();
        let reg = registry(&clock, 60, 10);
        let id = reg.register("https://vk.com/video1");

        clock.advance(Duration::from_secs(60));
        assert!(reg.resolve(&id).is_some());
        clock.advance(Duration::from_secs(1));
        assert!(reg.resolve(&id).is_none());
        // still stored until the next prune pass
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_resolve_does_not_slide_expiry() {
        let clock = FakeClock::new();
        let reg = registry(&clock, 60, 10);
        let id = reg.register("x");
        clock.advance(Duration::from_secs(40));
        assert!(reg.resolve(&id).is_some());
        clock.advance(Duration::from_secs(40));
        assert!(reg.resolve(&id).is_none());
    }

    #[test]
    fn test_register_prunes_stale_entries() {
        let clock = FakeClock::new();
        let reg = registry(&clock, 60, 10);
        reg.register("old-1");
        reg.register("old-2");
        clock.advance(Duration::from_secs(120));
        reg.register("new");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_explicit_prune_is_deterministic() {
        let clock = FakeClock::new();
        let reg = registry(&clock, 3600, 100);
        for i in 0..5 {
            reg.register(&i.to_string());
            clock.advance(Duration::from_secs(10));
        }
        // ages are now 50, 40, 30, 20, 10
        reg.prune(Duration::from_secs(35), 2);
        assert_eq!(reg.len(), 2);
        assert!(reg.resolve(&token_for("3")).is_some());
        assert!(reg.resolve(&token_for("4")).is_some());
    }

    #[test]
    fn test_unknown_token() {
        let clock = FakeClock::new();
        let reg = registry(&clock, 60, 10);
        assert!(reg.resolve("0123456789abcdef0123456789abcdef").is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_concurrent_registration_loses_nothing() {
        let clock = FakeClock::new();
        let reg = Arc::new(registry(&clock, 3600, 10_000));
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        reg.register(&format!("{}-{}", t, i));
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().unwrap();
        }
        assert_eq!(reg.len(), 800);
    }
}
