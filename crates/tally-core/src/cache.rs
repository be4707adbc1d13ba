//! TTL-bounded views over the user table.
//!
//! Both caches are computed lazily on first access and stay valid until
//! their TTL expires or the tracker invalidates them, whichever comes
//! first. Invalidation always wins over an unexpired TTL.
//!
//! - [`RankingCache`] -- users ordered by points, for leaderboards and ranks.
//! - [`ActiveCountCache`] -- users active within a window of days, one
//!   entry per window length.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use tally_types::{UserId, UserRecord, UserTable};

use crate::clock::{calendar_date, days_before};

/// Whether a value computed at `computed_at` is still within `ttl` at `now`.
fn within_ttl(computed_at: DateTime<Utc>, ttl: TimeDelta, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(computed_at) < ttl
}

// =============================================================================
// RankingCache
// =============================================================================

/// A computed leaderboard.
#[derive(Debug, Clone)]
struct RankedOrder {
    /// User ids, best first.
    ids: Vec<UserId>,
    /// Zero-based position of each id in `ids`.
    positions: HashMap<UserId, usize>,
    /// When the order was computed.
    computed_at: DateTime<Utc>,
}

impl RankedOrder {
    /// Sort every user by points descending.
    ///
    /// Ties go to the user who joined first, then to the lower id, so the
    /// order is deterministic.
    fn compute(users: &UserTable, now: DateTime<Utc>) -> Self {
        let mut records: Vec<&UserRecord> = users.values().collect();
        records.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then_with(|| a.joined_at.cmp(&b.joined_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        let ids: Vec<UserId> = records.iter().map(|r| r.id).collect();
        let positions = ids
            .iter()
            .enumerate()
            .map(|(pos, id)| (*id, pos))
            .collect();

        tracing::debug!(users = ids.len(), "Recomputed ranking");
        Self {
            ids,
            positions,
            computed_at: now,
        }
    }
}

/// Lazily recomputed ordering of users by points.
#[derive(Debug, Clone)]
pub struct RankingCache {
    /// How long a computed order stays valid.
    ttl: TimeDelta,
    /// The current order, if one is valid.
    order: Option<RankedOrder>,
}

impl RankingCache {
    /// Create an empty cache.
    pub const fn new(ttl: TimeDelta) -> Self {
        Self { ttl, order: None }
    }

    /// Drop the computed order so the next access recomputes it.
    pub fn invalidate(&mut self) {
        self.order = None;
    }

    /// Whether a computed order exists and is within its TTL at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.order
            .as_ref()
            .is_some_and(|order| within_ttl(order.computed_at, self.ttl, now))
    }

    /// Return the valid order, recomputing it if stale.
    fn ensure(&mut self, users: &UserTable, now: DateTime<Utc>) -> &RankedOrder {
        if !self.is_fresh(now) {
            self.order = None;
        }
        self.order
            .get_or_insert_with(|| RankedOrder::compute(users, now))
    }

    /// Up to `n` user ids, best first.
    pub fn top(&mut self, users: &UserTable, n: usize, now: DateTime<Utc>) -> Vec<UserId> {
        self.ensure(users, now).ids.iter().take(n).copied().collect()
    }

    /// 1-based rank of `id`, or `None` if the user is unknown.
    pub fn rank(&mut self, users: &UserTable, id: UserId, now: DateTime<Utc>) -> Option<usize> {
        self.ensure(users, now)
            .positions
            .get(&id)
            .map(|pos| pos.saturating_add(1))
    }
}

// =============================================================================
// ActiveCountCache
// =============================================================================

/// One cached count.
#[derive(Debug, Clone, Copy)]
struct CachedCount {
    /// Number of active users.
    count: usize,
    /// When the count was computed.
    computed_at: DateTime<Utc>,
}

/// Lazily recomputed counts of recently active users, keyed by window
/// length in days.
///
/// Window `0` means "today" by calendar date in the configured offset, not
/// the last 24 hours. Every other window counts users whose last activity
/// lies in `[now - days, now]`.
#[derive(Debug, Clone)]
pub struct ActiveCountCache {
    /// How long each count stays valid.
    ttl: TimeDelta,
    /// Offset used to decide the calendar date.
    offset: FixedOffset,
    /// Cached counts by window length.
    entries: BTreeMap<u32, CachedCount>,
}

impl ActiveCountCache {
    /// Create an empty cache.
    pub const fn new(ttl: TimeDelta, offset: FixedOffset) -> Self {
        Self {
            ttl,
            offset,
            entries: BTreeMap::new(),
        }
    }

    /// Drop every cached count.
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    /// Whether the count for `window_days` is cached and fresh at `now`.
    pub fn is_fresh(&self, window_days: u32, now: DateTime<Utc>) -> bool {
        self.entries
            .get(&window_days)
            .is_some_and(|entry| within_ttl(entry.computed_at, self.ttl, now))
    }

    /// Number of users active within `window_days` of `now`.
    pub fn count(&mut self, users: &UserTable, window_days: u32, now: DateTime<Utc>) -> usize {
        if self.is_fresh(window_days, now) {
            if let Some(entry) = self.entries.get(&window_days) {
                return entry.count;
            }
        }

        let count = self.compute(users, window_days, now);
        self.entries.insert(
            window_days,
            CachedCount {
                count,
                computed_at: now,
            },
        );
        count
    }

    fn compute(&self, users: &UserTable, window_days: u32, now: DateTime<Utc>) -> usize {
        if window_days == 0 {
            let today = calendar_date(now, self.offset);
            return users
                .values()
                .filter(|u| calendar_date(u.last_active_at, self.offset) == today)
                .count();
        }

        let cutoff = days_before(now, window_days);
        users
            .values()
            .filter(|u| u.last_active_at >= cutoff && u.last_active_at <= now)
            .count()
    }
}
