//! Bounded, in-memory decision history.

use std::collections::VecDeque;

use scalegrid_core::ScalingDecision;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Sliding window of the most recent decisions; the oldest entry is
/// dropped once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct DecisionHistory {
    capacity: usize,
    entries: VecDeque<ScalingDecision>,
}

impl Default for DecisionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl DecisionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, decision: ScalingDecision) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(decision);
    }

    /// Up to `limit` most recent decisions, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<ScalingDecision> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Up to `limit` most recent decisions for one service, oldest first.
    pub fn recent_for(&self, service: &str, limit: usize) -> Vec<ScalingDecision> {
        let mut matching: Vec<ScalingDecision> = self
            .entries
            .iter()
            .rev()
            .filter(|d| d.service_name == service)
            .take(limit)
            .cloned()
            .collect();
        matching.reverse();
        matching
    }

    pub fn latest(&self) -> Option<&ScalingDecision> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
