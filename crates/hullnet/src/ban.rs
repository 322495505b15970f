//! Address bans.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// One banned address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanEntry {
    pub reason: String,
    /// `None` bans forever.
    pub expires_at: Option<Instant>,
}

impl BanEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Banned IP addresses, each with a reason and an optional expiry.
///
/// Expired entries are dropped lazily, the next time they are looked up.
#[derive(Debug, Clone, Default)]
pub struct BanList {
    entries: HashMap<IpAddr, BanEntry>,
}

impl BanList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bans `ip`, replacing any earlier ban on it.
    pub fn ban(&mut self, ip: IpAddr, reason: impl Into<String>, duration: Option<Duration>) {
        let entry = BanEntry {
            reason: reason.into(),
            expires_at: duration.map(|d| Instant::now() + d),
        };
        tracing::info!(%ip, reason = %entry.reason, ?duration, "address banned");
        self.entries.insert(ip, entry);
    }

    /// Lifts a ban. Returns whether there was one.
    pub fn unban(&mut self, ip: IpAddr) -> bool {
        self.entries.remove(&ip).is_some()
    }

    /// The active ban on `ip`, if any.
    pub fn lookup(&mut self, ip: IpAddr) -> Option<&BanEntry> {
        if self.entries.get(&ip)?.is_expired(Instant::now()) {
            self.entries.remove(&ip);
            return None;
        }
        self.entries.get(&ip)
    }

    pub fn is_banned(&mut self, ip: IpAddr) -> bool {
        self.lookup(ip).is_some()
    }

    /// Entries currently stored, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
