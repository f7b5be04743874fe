//! Per-tenant donation state: one active donation, a FIFO queue behind it,
//! and a short-lived ledger used to drop rapid duplicate deliveries.
//!
//! Each tenant's state sits behind its own mutex so operations on one tenant
//! are serialized without blocking any other tenant. The outer map lock is
//! only held long enough to find or create a tenant's entry.

use crate::metrics_defs::{DEDUPE_HITS, DONATIONS_EXPIRED, DONATIONS_PROMOTED};
use crate::platform::{Donation, Platform};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use sha2::{Digest, Sha256};
use shared::counter;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum StoreError {
    #[error("donation queue is full ({limit} pending)")]
    QueueFull { limit: usize },
}

/// Windows for duplicate suppression.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DedupeSettings {
    /// Identical deliveries closer together than this are duplicates.
    pub exact_window: Duration,
    /// Ledger entries older than this are dropped.
    pub retention: Duration,
    pub max_entries: usize,
}

impl Default for DedupeSettings {
    fn default() -> Self {
        DedupeSettings {
            exact_window: Duration::from_secs(3),
            retention: Duration::from_secs(5),
            max_entries: 50,
        }
    }
}

#[derive(Clone, Debug)]
pub struct QueueEntry {
    pub id: String,
    pub donation: Donation,
    pub enqueued_at: Instant,
    pub received_at: DateTime<Utc>,
}

impl QueueEntry {
    fn new(donation: Donation, now: Instant) -> Self {
        let received_at = Utc::now();
        QueueEntry {
            id: entry_id(&donation, received_at),
            donation,
            enqueued_at: now,
            received_at,
        }
    }
}

/// Short id from platform, name, amount, time and a random salt. Unique
/// enough to tell queue entries apart, not a security token.
fn entry_id(donation: &Donation, received_at: DateTime<Utc>) -> String {
    let salt: u64 = rand::random();
    let mut hasher = Sha256::new();
    hasher.update(donation.platform.as_str().as_bytes());
    hasher.update(donation.display_name().as_bytes());
    hasher.update(donation.amount.to_bits().to_be_bytes());
    hasher.update(received_at.timestamp_millis().to_be_bytes());
    hasher.update(salt.to_be_bytes());
    hex::encode(&hasher.finalize()[..8])
}

#[derive(Clone, Debug)]
struct ProcessedRecord {
    platform: Platform,
    display_name: String,
    amount: f64,
    at: Instant,
}

impl ProcessedRecord {
    fn matches(&self, donation: &Donation) -> bool {
        self.platform == donation.platform
            && self.amount == donation.amount
            && self.display_name == donation.display_name()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantStats {
    pub total_received: u64,
    pub total_queued: u64,
    pub total_processed: u64,
    pub total_expired: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
struct ActiveDonation {
    donation: Donation,
    since: Instant,
}

#[derive(Debug, PartialEq)]
pub enum Enqueued {
    /// Waiting behind the active donation at this 1-based position.
    Queued { position: usize },
    /// Nothing was active, so the donation went straight to the active slot.
    Promoted,
}

#[derive(Debug, PartialEq)]
pub struct ClearOutcome {
    pub cleared: Donation,
    pub promoted: bool,
    pub queue_size: usize,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceCleared {
    pub cleared_active: bool,
    pub dropped: usize,
}

#[derive(Debug, Default)]
pub struct TenantState {
    active: Option<ActiveDonation>,
    queue: VecDeque<QueueEntry>,
    recently_processed: VecDeque<ProcessedRecord>,
    stats: TenantStats,
    /// Set by `init_tenant`. State created lazily for an unknown key is
    /// dropped by the sweep once it holds nothing.
    registered: bool,
}

impl TenantState {
    pub fn has_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<&Donation> {
        self.active.as_ref().map(|active| &active.donation)
    }

    pub fn active_since(&self) -> Option<Instant> {
        self.active.as_ref().map(|active| active.since)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> &TenantStats {
        &self.stats
    }

    fn touch(&mut self) {
        self.stats.last_activity = Some(Utc::now());
    }

    /// Replaces whatever is active. Callers check `has_active` first.
    pub fn set_active(&mut self, donation: Donation, now: Instant) {
        self.active = Some(ActiveDonation {
            donation,
            since: now,
        });
        self.touch();
    }

    /// Removes the active donation without promoting.
    pub fn clear_active(&mut self) -> Option<Donation> {
        let cleared = self.active.take().map(|active| active.donation);
        if cleared.is_some() {
            self.touch();
        }
        cleared
    }

    pub fn enqueue(
        &mut self,
        donation: Donation,
        max_size: usize,
        now: Instant,
    ) -> Result<Enqueued, StoreError> {
        if self.queue.len() >= max_size {
            return Err(StoreError::QueueFull { limit: max_size });
        }

        self.queue.push_back(QueueEntry::new(donation, now));
        self.stats.total_queued += 1;
        self.touch();

        if self.promote(now) {
            Ok(Enqueued::Promoted)
        } else {
            Ok(Enqueued::Queued {
                position: self.queue.len(),
            })
        }
    }

    /// Moves the head of the queue into the active slot. Does nothing when
    /// the queue is empty or a donation is already active.
    pub fn promote(&mut self, now: Instant) -> bool {
        if self.active.is_some() {
            return false;
        }
        let Some(entry) = self.queue.pop_front() else {
            return false;
        };

        tracing::debug!(
            entry = %entry.id,
            platform = %entry.donation.platform,
            waited_ms = now.saturating_duration_since(entry.enqueued_at).as_millis() as u64,
            "Promoted queued donation"
        );
        counter!(DONATIONS_PROMOTED).increment(1);
        self.set_active(entry.donation, now);
        true
    }

    /// Clears the active donation as processed and promotes the next one in
    /// the same step, so nothing queued is stranded between the two.
    pub fn retire_active(&mut self, now: Instant) -> Option<ClearOutcome> {
        let cleared = self.clear_active()?;
        self.stats.total_processed += 1;
        let promoted = self.promote(now);
        Some(ClearOutcome {
            cleared,
            promoted,
            queue_size: self.queue.len(),
        })
    }

    pub fn force_clear(&mut self) -> ForceCleared {
        let cleared_active = self.clear_active().is_some();
        let dropped = self.queue.len();
        self.queue.clear();
        self.touch();
        ForceCleared {
            cleared_active,
            dropped,
        }
    }

    pub fn record_received(&mut self) {
        self.stats.total_received += 1;
        self.touch();
    }

    fn prune_ledger(&mut self, now: Instant, retention: Duration) {
        while let Some(oldest) = self.recently_processed.front() {
            if now.saturating_duration_since(oldest.at) > retention {
                self.recently_processed.pop_front();
            } else {
                break;
            }
        }
    }

    /// True when an identical (platform, name, amount) was processed within
    /// the exact-match window. Prunes expired ledger entries first.
    pub fn is_duplicate(
        &mut self,
        donation: &Donation,
        now: Instant,
        settings: &DedupeSettings,
    ) -> bool {
        self.prune_ledger(now, settings.retention);
        let duplicate = self.recently_processed.iter().any(|record| {
            record.matches(donation)
                && now.saturating_duration_since(record.at) <= settings.exact_window
        });
        if duplicate {
            counter!(DEDUPE_HITS).increment(1);
        }
        duplicate
    }

    pub fn mark_processed(&mut self, donation: &Donation, now: Instant, settings: &DedupeSettings) {
        self.recently_processed.push_back(ProcessedRecord {
            platform: donation.platform,
            display_name: donation.display_name().to_string(),
            amount: donation.amount,
            at: now,
        });
        while self.recently_processed.len() > settings.max_entries {
            self.recently_processed.pop_front();
        }
    }

    /// Clears an active donation older than `timeout` and promotes the next
    /// one. Returns the expired donation, if any.
    pub fn expire_stale_active(&mut self, now: Instant, timeout: Duration) -> Option<Donation> {
        let since = self.active_since()?;
        if now.saturating_duration_since(since) <= timeout {
            return None;
        }
        let expired = self.clear_active()?;
        self.stats.total_expired += 1;
        counter!(DONATIONS_EXPIRED).increment(1);
        self.promote(now);
        Some(expired)
    }

    /// Prunes the dedupe ledger and releases its allocation once empty.
    /// Returns true when the ledger ended up released.
    pub fn sweep_ledger(&mut self, now: Instant, retention: Duration) -> bool {
        if self.recently_processed.is_empty() {
            return false;
        }
        self.prune_ledger(now, retention);
        if self.recently_processed.is_empty() {
            self.recently_processed = VecDeque::new();
            return true;
        }
        false
    }

    fn is_idle(&self) -> bool {
        self.active.is_none() && self.queue.is_empty() && self.recently_processed.is_empty()
    }

    #[cfg(test)]
    fn ledger_len(&self) -> usize {
        self.recently_processed.len()
    }

    pub fn snapshot(&self, now: Instant) -> TenantSnapshot {
        TenantSnapshot {
            active: self.active().cloned(),
            active_for_secs: self
                .active_since()
                .map(|since| now.saturating_duration_since(since).as_secs()),
            queue: self
                .queue
                .iter()
                .map(|entry| QueuedSummary {
                    id: entry.id.clone(),
                    platform: entry.donation.platform,
                    donor_name: entry.donation.display_name().to_string(),
                    amount: entry.donation.amount,
                    received_at: entry.received_at,
                })
                .collect(),
            queue_size: self.queue.len(),
            stats: self.stats.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedSummary {
    pub id: String,
    pub platform: Platform,
    pub donor_name: String,
    #[serde(serialize_with = "crate::platform::serialize_amount")]
    pub amount: f64,
    pub received_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSnapshot {
    pub active: Option<Donation>,
    pub active_for_secs: Option<u64>,
    pub queue: Vec<QueuedSummary>,
    pub queue_size: usize,
    pub stats: TenantStats,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub tenants_scanned: usize,
    pub expired: usize,
    pub promoted: usize,
    pub ledgers_released: usize,
    pub orphans_dropped: usize,
    pub queued: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreTotals {
    pub tenants: usize,
    pub active: usize,
    pub queued: usize,
    pub total_received: u64,
    pub total_queued: u64,
    pub total_processed: u64,
    pub total_expired: u64,
}

type SharedTenant = Arc<Mutex<TenantState>>;

/// Owner of every tenant's donation state.
pub struct DonationStore {
    tenants: RwLock<HashMap<String, SharedTenant>>,
    dedupe: DedupeSettings,
}

impl DonationStore {
    pub fn new(dedupe: DedupeSettings) -> Self {
        DonationStore {
            tenants: RwLock::new(HashMap::new()),
            dedupe,
        }
    }

    pub fn dedupe(&self) -> &DedupeSettings {
        &self.dedupe
    }

    fn existing(&self, key: &str) -> Option<SharedTenant> {
        self.tenants.read().get(key).cloned()
    }

    /// Creates the tenant's bookkeeping if it does not exist yet and marks
    /// it as belonging to a registered tenant.
    pub fn init_tenant(&self, key: &str) {
        self.tenant(key).lock().registered = true;
    }

    fn tenant(&self, key: &str) -> SharedTenant {
        if let Some(tenant) = self.existing(key) {
            return tenant;
        }
        self.tenants
            .write()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// Runs `f` with exclusive access to one tenant's state, creating it on
    /// first use. Multi-step operations that must not interleave with other
    /// requests for the same tenant go through here.
    pub fn with_tenant<R>(&self, key: &str, f: impl FnOnce(&mut TenantState) -> R) -> R {
        let tenant = self.tenant(key);
        let mut state = tenant.lock();
        f(&mut state)
    }

    fn read_tenant<R>(&self, key: &str, f: impl FnOnce(&TenantState) -> R) -> Option<R> {
        let tenant = self.existing(key)?;
        let state = tenant.lock();
        Some(f(&state))
    }

    pub fn has_active(&self, key: &str) -> bool {
        self.read_tenant(key, TenantState::has_active)
            .unwrap_or(false)
    }

    pub fn get_active(&self, key: &str) -> Option<Donation> {
        self.read_tenant(key, |state| state.active().cloned())
            .flatten()
    }

    pub fn set_active(&self, key: &str, donation: Donation) {
        self.with_tenant(key, |state| state.set_active(donation, Instant::now()));
    }

    pub fn clear_active(&self, key: &str) -> bool {
        self.with_tenant(key, |state| state.clear_active().is_some())
    }

    pub fn enqueue(
        &self,
        key: &str,
        donation: Donation,
        max_size: usize,
    ) -> Result<Enqueued, StoreError> {
        self.with_tenant(key, |state| state.enqueue(donation, max_size, Instant::now()))
    }

    pub fn promote(&self, key: &str) -> bool {
        self.with_tenant(key, |state| state.promote(Instant::now()))
    }

    pub fn is_duplicate(&self, key: &str, donation: &Donation) -> bool {
        let settings = self.dedupe;
        self.with_tenant(key, |state| {
            state.is_duplicate(donation, Instant::now(), &settings)
        })
    }

    pub fn mark_processed(&self, key: &str, donation: &Donation) {
        let settings = self.dedupe;
        self.with_tenant(key, |state| {
            state.mark_processed(donation, Instant::now(), &settings)
        });
    }

    /// Retires the active donation and promotes the next queued one.
    /// Returns `None` when nothing was active.
    pub fn clear_and_promote(&self, key: &str) -> Option<ClearOutcome> {
        self.with_tenant(key, |state| state.retire_active(Instant::now()))
    }

    pub fn force_clear(&self, key: &str) -> ForceCleared {
        self.with_tenant(key, TenantState::force_clear)
    }

    pub fn snapshot(&self, key: &str) -> Option<TenantSnapshot> {
        self.read_tenant(key, |state| state.snapshot(Instant::now()))
    }

    /// Drops all state for a tenant that is no longer registered.
    pub fn remove_tenant(&self, key: &str) -> bool {
        self.tenants.write().remove(key).is_some()
    }

    fn all_tenants(&self) -> Vec<(String, SharedTenant)> {
        self.tenants
            .read()
            .iter()
            .map(|(key, tenant)| (key.clone(), tenant.clone()))
            .collect()
    }

    /// Expires stuck active donations and prunes dedupe ledgers.
    ///
    /// Tenants are locked one at a time with the same mutex request handlers
    /// use, so a sweep never interleaves with an in-flight enqueue or clear.
    pub fn sweep(&self, now: Instant, active_timeout: Duration) -> SweepReport {
        let mut report = SweepReport::default();
        let mut orphans = Vec::new();

        for (key, tenant) in self.all_tenants() {
            let mut state = tenant.lock();
            report.tenants_scanned += 1;

            if let Some(expired) = state.expire_stale_active(now, active_timeout) {
                report.expired += 1;
                let promoted = state.has_active();
                if promoted {
                    report.promoted += 1;
                }
                tracing::warn!(
                    tenant = %key,
                    platform = %expired.platform,
                    donor = %expired.display_name(),
                    promoted,
                    "Auto-cleared stuck donation"
                );
            }

            if state.sweep_ledger(now, self.dedupe.retention) {
                report.ledgers_released += 1;
            }
            report.queued += state.queue_len();
            if !state.registered && state.is_idle() {
                orphans.push(key);
            }
        }

        if !orphans.is_empty() {
            report.orphans_dropped = self.drop_orphans(&orphans);
        }
        report
    }

    /// Removes idle state left behind for unregistered keys, such as a
    /// webhook that raced a tenant deletion. Rechecked under the map lock so
    /// a concurrent `init_tenant` keeps its entry.
    fn drop_orphans(&self, keys: &[String]) -> usize {
        let mut tenants = self.tenants.write();
        let mut dropped = 0;
        for key in keys {
            let orphaned = tenants.get(key).is_some_and(|tenant| {
                let state = tenant.lock();
                !state.registered && state.is_idle()
            });
            if orphaned {
                tenants.remove(key);
                tracing::debug!(tenant = %key, "Dropped state for unregistered tenant");
                dropped += 1;
            }
        }
        dropped
    }

    pub fn totals(&self) -> StoreTotals {
        let mut totals = StoreTotals::default();
        for (_, tenant) in self.all_tenants() {
            let state = tenant.lock();
            totals.tenants += 1;
            totals.active += usize::from(state.has_active());
            totals.queued += state.queue_len();
            totals.total_received += state.stats.total_received;
            totals.total_queued += state.stats.total_queued;
            totals.total_processed += state.stats.total_processed;
            totals.total_expired += state.stats.total_expired;
        }
        totals
    }
}

impl Default for DonationStore {
    fn default() -> Self {
        DonationStore::new(DedupeSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::donation;

    const KEY: &str = "AAAA-BBBB-CCCC-DDDD";

    #[test]
    fn test_init_tenant_is_idempotent() {
        let store = DonationStore::default();
        store.init_tenant(KEY);
        store.set_active(KEY, donation(Platform::Tako, "A", 100.0));
        store.init_tenant(KEY);
        assert!(store.has_active(KEY));
        assert_eq!(store.totals().tenants, 1);
    }

    #[test]
    fn test_unknown_tenant_reads_empty() {
        let store = DonationStore::default();
        assert!(!store.has_active("nobody"));
        assert_eq!(store.get_active("nobody"), None);
        assert!(store.snapshot("nobody").is_none());
        assert_eq!(store.clear_and_promote("nobody"), None);
    }

    #[test]
    fn test_enqueue_without_active_promotes_immediately() {
        let now = Instant::now();
        let mut state = TenantState::default();
        let d = donation(Platform::Saweria, "A", 100.0);

        assert_eq!(state.enqueue(d.clone(), 5, now), Ok(Enqueued::Promoted));
        assert_eq!(state.active(), Some(&d));
        assert_eq!(state.queue_len(), 0);
        assert_eq!(state.stats().total_queued, 1);
    }

    #[test]
    fn test_fifo_promotion_order() {
        let now = Instant::now();
        let mut state = TenantState::default();
        state.set_active(donation(Platform::Saweria, "Active", 1.0), now);

        for (i, name) in ["D1", "D2", "D3"].into_iter().enumerate() {
            let result = state.enqueue(donation(Platform::Tako, name, 10.0), 10, now);
            assert_eq!(result, Ok(Enqueued::Queued { position: i + 1 }));
        }

        let mut order = Vec::new();
        while let Some(outcome) = state.retire_active(now) {
            if let Some(active) = state.active() {
                order.push(active.donor_name.clone());
            }
            if !outcome.promoted {
                break;
            }
        }
        assert_eq!(order, vec!["D1", "D2", "D3"]);
        assert_eq!(state.stats().total_processed, 4);
    }

    #[test]
    fn test_queue_is_bounded() {
        let now = Instant::now();
        let mut state = TenantState::default();
        state.set_active(donation(Platform::Saweria, "Active", 1.0), now);

        for i in 0..3 {
            state
                .enqueue(donation(Platform::Tako, &format!("D{i}"), 10.0), 3, now)
                .unwrap();
        }
        let overflow = state.enqueue(donation(Platform::Tako, "extra", 10.0), 3, now);
        assert_eq!(overflow, Err(StoreError::QueueFull { limit: 3 }));
        assert_eq!(state.queue_len(), 3);
        assert_eq!(state.stats().total_queued, 3);
    }

    #[test]
    fn test_promote_is_noop_when_active_or_empty() {
        let now = Instant::now();
        let mut state = TenantState::default();
        assert!(!state.promote(now));

        state.set_active(donation(Platform::Saweria, "Active", 1.0), now);
        state
            .enqueue(donation(Platform::Tako, "Next", 1.0), 5, now)
            .unwrap();
        assert!(!state.promote(now));
        assert_eq!(state.queue_len(), 1);

        assert!(state.clear_active().is_some());
        assert!(state.promote(now));
        assert_eq!(state.active().unwrap().donor_name, "Next");
    }

    #[test]
    fn test_duplicate_window() {
        let settings = DedupeSettings::default();
        let t0 = Instant::now();
        let mut state = TenantState::default();
        let d = donation(Platform::Trakteer, "Bob", 5000.0);

        assert!(!state.is_duplicate(&d, t0, &settings));
        state.mark_processed(&d, t0, &settings);

        assert!(state.is_duplicate(&d, t0 + Duration::from_secs(2), &settings));
        // Outside the exact window but inside retention: not a duplicate.
        assert!(!state.is_duplicate(&d, t0 + Duration::from_millis(4000), &settings));
        assert!(!state.is_duplicate(&d, t0 + Duration::from_secs(10), &settings));
        assert_eq!(state.ledger_len(), 0);
    }

    #[test]
    fn test_duplicate_requires_identical_key() {
        let settings = DedupeSettings::default();
        let now = Instant::now();
        let mut state = TenantState::default();
        state.mark_processed(&donation(Platform::Trakteer, "Bob", 5000.0), now, &settings);

        assert!(!state.is_duplicate(&donation(Platform::Tako, "Bob", 5000.0), now, &settings));
        assert!(!state.is_duplicate(&donation(Platform::Trakteer, "Rob", 5000.0), now, &settings));
        assert!(!state.is_duplicate(&donation(Platform::Trakteer, "Bob", 5001.0), now, &settings));
    }

    #[test]
    fn test_ledger_is_capped() {
        let settings = DedupeSettings::default();
        let now = Instant::now();
        let mut state = TenantState::default();
        for i in 0..(settings.max_entries + 10) {
            state.mark_processed(&donation(Platform::Tako, "A", i as f64 + 1.0), now, &settings);
        }
        assert_eq!(state.ledger_len(), settings.max_entries);
        // The oldest entries were evicted first.
        assert!(!state.is_duplicate(&donation(Platform::Tako, "A", 1.0), now, &settings));
        let newest = (settings.max_entries + 10) as f64;
        assert!(state.is_duplicate(&donation(Platform::Tako, "A", newest), now, &settings));
    }

    #[test]
    fn test_force_clear_wipes_everything() {
        let now = Instant::now();
        let mut state = TenantState::default();
        state.set_active(donation(Platform::Saweria, "Active", 1.0), now);
        state.enqueue(donation(Platform::Tako, "Q1", 1.0), 5, now).unwrap();
        state.enqueue(donation(Platform::Tako, "Q2", 1.0), 5, now).unwrap();

        assert_eq!(
            state.force_clear(),
            ForceCleared {
                cleared_active: true,
                dropped: 2
            }
        );
        assert!(!state.has_active());
        assert_eq!(state.queue_len(), 0);
    }

    #[test]
    fn test_sweep_expires_stuck_active_and_promotes() {
        let store = DonationStore::default();
        let timeout = Duration::from_secs(60);
        store.set_active(KEY, donation(Platform::Saweria, "Stuck", 1.0));
        store
            .enqueue(KEY, donation(Platform::Tako, "Next", 2.0), 5)
            .unwrap();

        let early = store.sweep(Instant::now() + Duration::from_secs(30), timeout);
        assert_eq!(early.expired, 0);

        let late = store.sweep(Instant::now() + Duration::from_secs(61), timeout);
        assert_eq!(late.expired, 1);
        assert_eq!(late.promoted, 1);
        assert_eq!(store.get_active(KEY).unwrap().donor_name, "Next");
        assert_eq!(store.snapshot(KEY).unwrap().stats.total_expired, 1);
    }

    #[test]
    fn test_sweep_releases_stale_ledgers() {
        let store = DonationStore::default();
        let d = donation(Platform::Saweria, "A", 1.0);
        store.mark_processed(KEY, &d);

        let report = store.sweep(Instant::now(), Duration::from_secs(60));
        assert_eq!(report.ledgers_released, 0);

        let report = store.sweep(Instant::now() + Duration::from_secs(6), Duration::from_secs(60));
        assert_eq!(report.ledgers_released, 1);
        assert!(!store.is_duplicate(KEY, &d));
    }

    #[test]
    fn test_sweep_drops_idle_state_of_deleted_tenant() {
        let store = DonationStore::default();
        store.init_tenant(KEY);
        store.init_tenant("KEEP-KEEP-KEEP-KEEP");
        assert!(store.remove_tenant(KEY));

        // A webhook that resolved the tenant before deletion lands afterwards.
        let d = donation(Platform::Saweria, "Late", 1.0);
        store.mark_processed(KEY, &d);
        assert_eq!(store.totals().tenants, 2);

        let report = store.sweep(Instant::now(), Duration::from_secs(60));
        assert_eq!(report.orphans_dropped, 0);

        let report = store.sweep(Instant::now() + Duration::from_secs(6), Duration::from_secs(60));
        assert_eq!(report.orphans_dropped, 1);
        assert!(store.snapshot(KEY).is_none());
        assert!(store.snapshot("KEEP-KEEP-KEEP-KEEP").is_some());
        assert_eq!(store.totals().tenants, 1);
    }

    #[test]
    fn test_entry_ids_differ_for_identical_donations() {
        let now = Instant::now();
        let d = donation(Platform::Tako, "A", 1.0);
        let a = QueueEntry::new(d.clone(), now);
        let b = QueueEntry::new(d, now);
        assert_eq!(a.id.len(), 16);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_concurrent_enqueue_never_exceeds_bound() {
        let store = Arc::new(DonationStore::default());
        store.set_active(KEY, donation(Platform::Saweria, "Active", 1.0));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|i| {
                            let d = donation(Platform::Tako, &format!("{t}-{i}"), 1.0);
                            store.enqueue(KEY, d, 25).is_ok()
                        })
                        .count()
                })
            })
            .collect();

        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(accepted, 25);
        assert_eq!(store.snapshot(KEY).unwrap().queue_size, 25);
    }
}
