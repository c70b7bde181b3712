//! One conversation's working memory.
//!
//! Fields are private so the monotonic invariants hold by construction:
//! access only rises, attempts only grow (saturating at the ceiling), the
//! phase never regresses and a terminated session stays terminated.

use std::collections::BTreeMap;

use crate::core::normalize::normalize_key;
use crate::core::types::{AccessLevel, SessionSnapshot};
use crate::record::Record;
use crate::scenario::Scenario;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    record: Option<Record>,
    attempts: u32,
    access: AccessLevel,
    phase: usize,
    turn: u32,
    terminated: bool,
    /// Attempts spent per normalized record key, so switching records never
    /// refunds attempts.
    spent_attempts: BTreeMap<String, u32>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            record: None,
            attempts: 0,
            access: AccessLevel::Unverified,
            phase: 0,
            turn: 0,
            terminated: false,
            spent_attempts: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    pub fn record_key(&self) -> Option<&str> {
        self.record.as_ref().map(|record| record.key.as_str())
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn access(&self) -> AccessLevel {
        self.access
    }

    pub fn phase(&self) -> usize {
        self.phase
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn is_verified(&self) -> bool {
        self.access >= AccessLevel::Verified
    }

    /// Attempts already spent on the record addressed by `key` in this session.
    pub fn attempts_spent_on(&self, key: &str) -> u32 {
        self.spent_attempts
            .get(&normalize_key(key))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn next_turn(&mut self) {
        self.turn = self.turn.saturating_add(1);
    }

    pub(crate) fn raise_access(&mut self, level: AccessLevel) {
        self.access = self.access.max(level);
    }

    pub(crate) fn advance_phase(&mut self, target: usize) {
        self.phase = self.phase.max(target);
    }

    /// Spend one verification attempt on the loaded record, saturating at `ceiling`.
    pub(crate) fn spend_attempt(&mut self, ceiling: u32) {
        if self.attempts < ceiling {
            self.attempts += 1;
        }
        if let Some(key) = self.record_key().map(normalize_key) {
            self.spent_attempts.insert(key, self.attempts);
        }
    }

    pub(crate) fn terminate(&mut self) {
        self.terminated = true;
    }

    /// Replace the loaded record copy (same key) without touching session flags.
    pub(crate) fn refresh_record(&mut self, record: Record) {
        self.record = Some(record);
    }

    /// Start a sub-session on `record`: access resets, attempts come from the
    /// per-key ledger and the phase restarts at `phase`.
    pub(crate) fn begin_sub_session(&mut self, record: Record, phase: usize) {
        self.attempts = self.attempts_spent_on(&record.key);
        self.access = AccessLevel::Unverified;
        self.phase = phase;
        self.record = Some(record);
    }

    pub(crate) fn record_mut(&mut self) -> Option<&mut Record> {
        self.record.as_mut()
    }

    pub fn snapshot(&self, scenario: &Scenario) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            record_key: self.record_key().map(str::to_string),
            attempts: self.attempts,
            max_attempts: scenario.max_attempts,
            access: self.access,
            phase: scenario.phase_name(self.phase).to_string(),
            turn: self.turn,
            terminated: self.terminated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_never_decreases() {
        let mut session = Session::new("s-1");
        session.raise_access(AccessLevel::Verified);
        session.raise_access(AccessLevel::Unverified);
        assert_eq!(session.access(), AccessLevel::Verified);
    }

    #[test]
    fn phase_never_regresses() {
        let mut session = Session::new("s-1");
        session.advance_phase(3);
        session.advance_phase(1);
        assert_eq!(session.phase(), 3);
    }

    #[test]
    fn attempts_saturate_at_ceiling_and_are_tracked_per_key() {
        let mut session = Session::new("s-1");
        session.begin_sub_session(Record::new("C-100", "open"), 0);
        session.spend_attempt(2);
        session.spend_attempt(2);
        session.spend_attempt(2);
        assert_eq!(session.attempts(), 2);
        assert_eq!(session.attempts_spent_on("c-100"), 2);

        session.begin_sub_session(Record::new("C-200", "open"), 0);
        assert_eq!(session.attempts(), 0);
        session.begin_sub_session(Record::new("C-100", "open"), 0);
        assert_eq!(session.attempts(), 2);
    }

    #[test]
    fn sub_session_resets_access() {
        let mut session = Session::new("s-1");
        session.begin_sub_session(Record::new("C-100", "open"), 0);
        session.raise_access(AccessLevel::Verified);
        session.begin_sub_session(Record::new("C-200", "open"), 0);
        assert!(!session.is_verified());
        assert_eq!(session.record_key(), Some("C-200"));
    }
}
