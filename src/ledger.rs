//! Bounded activity ledger of actuator state changes.
//!
//! Entries are kept in insertion (= chronological) order. When the ledger
//! is full, recording a new entry evicts exactly the oldest one.

use crate::actuator::ActuatorState;
use crate::clock::Tick;
use std::collections::VecDeque;
use std::fmt;

/// Default capacity of the ledger.
pub const MAX_LOGS: usize = 50;

/// One state transition. Never modified after it is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub username: String,
    pub state: ActuatorState,
    pub timestamp: Tick,
}

/// Wire form: `username,STATE,millis`.
impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.username, self.state, self.timestamp)
    }
}

/// Result of [`ActivityLedger::recent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecentLogs<'a> {
    /// Nothing has ever been recorded.
    NoLogs,
    /// Most recent first.
    Entries(Vec<&'a LogEntry>),
}

#[derive(Debug)]
pub struct ActivityLedger {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl ActivityLedger {
    pub fn new() -> Self {
        Self::with_capacity(MAX_LOGS)
    }

    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry stamped `now`, evicting the oldest one if full.
    pub fn record(&mut self, username: &str, state: ActuatorState, now: Tick) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            username: username.to_string(),
            state,
            timestamp: now,
        });
    }

    /// Up to `n` entries, newest first.
    pub fn recent(&self, n: usize) -> RecentLogs<'_> {
        // Capacity is at least one and eviction only happens on insert,
        // so an empty ledger has never been written to.
        if self.entries.is_empty() {
            return RecentLogs::NoLogs;
        }
        RecentLogs::Entries(self.entries.iter().rev().take(n).collect())
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }
}

impl Default for ActivityLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(ledger: &mut ActivityLedger, n: u64) {
        for i in 0..n {
            let state = ActuatorState::from(i % 2 == 0);
            ledger.record(&format!("user{i}"), state, Tick::from_millis(i));
        }
    }

    #[test]
    fn recent_on_fresh_ledger_is_no_logs() {
        let ledger = ActivityLedger::new();
        assert_eq!(ledger.recent(10), RecentLogs::NoLogs);
        assert_eq!(ledger.count(), 0);
    }

    #[test]
    fn single_write_is_returned() {
        let mut ledger = ActivityLedger::new();
        ledger.record("alice", ActuatorState::On, Tick::from_millis(42));

        let RecentLogs::Entries(entries) = ledger.recent(10) else {
            panic!("expected entries");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].username, "alice");
        assert_eq!(entries[0].state, ActuatorState::On);
        assert_eq!(entries[0].timestamp, Tick::from_millis(42));
    }

    #[test]
    fn recent_is_newest_first_and_limited() {
        let mut ledger = ActivityLedger::new();
        fill(&mut ledger, 15);

        let RecentLogs::Entries(entries) = ledger.recent(10) else {
            panic!("expected entries");
        };
        let names: Vec<&str> = entries.iter().map(|e| e.username.as_str()).collect();
        assert_eq!(names.len(), 10);
        assert_eq!(names[0], "user14");
        assert_eq!(names[9], "user5");
    }

    #[test]
    fn overflow_evicts_oldest_one_at_a_time() {
        let mut ledger = ActivityLedger::new();
        fill(&mut ledger, MAX_LOGS as u64 + 3);

        assert_eq!(ledger.count(), MAX_LOGS);
        let first: Vec<&str> = ledger.iter().take(1).map(|e| e.username.as_str()).collect();
        assert_eq!(first, ["user3"]);
        assert!(ledger.iter().all(|e| e.username != "user0"));
        assert!(ledger.iter().all(|e| e.username != "user2"));
        assert_eq!(ledger.iter().last().unwrap().username, "user52");
    }

    #[test]
    fn full_ledger_recent_returns_everything_requested() {
        let mut ledger = ActivityLedger::with_capacity(3);
        fill(&mut ledger, 5);

        let RecentLogs::Entries(entries) = ledger.recent(10) else {
            panic!("expected entries");
        };
        let names: Vec<&str> = entries.iter().map(|e| e.username.as_str()).collect();
        assert_eq!(names, ["user4", "user3", "user2"]);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut ledger = ActivityLedger::with_capacity(0);
        assert_eq!(ledger.capacity(), 1);
        fill(&mut ledger, 2);
        assert_eq!(ledger.count(), 1);
    }

    #[test]
    fn entry_wire_format() {
        let entry = LogEntry {
            username: "alice".into(),
            state: ActuatorState::Off,
            timestamp: Tick::from_millis(9001),
        };
        assert_eq!(entry.to_string(), "alice,OFF,9001");
    }
}
