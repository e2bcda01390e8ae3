//! Sorted set with integer scores
//!
//! Ordering matches Redis: ascending score, ties broken by member bytes.
//! Reverse ranges walk the same order backwards.

use ahash::AHashMap;
use std::collections::BTreeSet;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortedSet {
    /// O(1) score lookup by member
    members: AHashMap<String, i64>,
    /// (score, member) in rank order
    ordered: BTreeSet<(i64, String)>,
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(debug_assertions)]
    fn verify_invariants(&self) {
        debug_assert_eq!(
            self.members.len(),
            self.ordered.len(),
            "Invariant violated: members.len() ({}) != ordered.len() ({})",
            self.members.len(),
            self.ordered.len()
        );
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    fn verify_invariants(&self) {}

    /// Add `amount` to the member's score, creating it at zero. Returns the new score.
    pub fn incr_by(&mut self, member: &str, amount: i64) -> i64 {
        let score = match self.members.get_mut(member) {
            Some(score) => {
                self.ordered.remove(&(*score, member.to_string()));
                *score += amount;
                *score
            }
            None => {
                self.members.insert(member.to_string(), amount);
                amount
            }
        };
        self.ordered.insert((score, member.to_string()));
        self.verify_invariants();
        score
    }

    /// Remove member. Returns true if removed.
    pub fn remove(&mut self, member: &str) -> bool {
        match self.members.remove(member) {
            Some(score) => {
                self.ordered.remove(&(score, member.to_string()));
                self.verify_invariants();
                true
            }
            None => false,
        }
    }

    pub fn score(&self, member: &str) -> Option<i64> {
        self.members.get(member).copied()
    }

    /// Get range by rank [start, stop] (inclusive, negative counts from the end)
    pub fn range(&self, start: i64, stop: i64) -> Vec<(String, i64)> {
        match self.normalize(start, stop) {
            Some((start, stop)) => self
                .ordered
                .iter()
                .skip(start)
                .take(stop - start + 1)
                .map(|(score, member)| (member.clone(), *score))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Get range in reverse by rank
    pub fn rev_range(&self, start: i64, stop: i64) -> Vec<(String, i64)> {
        match self.normalize(start, stop) {
            Some((start, stop)) => self
                .ordered
                .iter()
                .rev()
                .skip(start)
                .take(stop - start + 1)
                .map(|(score, member)| (member.clone(), *score))
                .collect(),
            None => Vec::new(),
        }
    }

    /// ZREMRANGEBYRANK - remove members in ascending rank range. Returns count removed.
    pub fn remove_range_by_rank(&mut self, start: i64, stop: i64) -> usize {
        let doomed = self.range(start, stop);
        for (member, _) in &doomed {
            self.remove(member);
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Clamp Redis-style rank bounds to `[0, len)`; None when empty.
    fn normalize(&self, start: i64, stop: i64) -> Option<(usize, usize)> {
        let len = self.ordered.len() as i64;
        if len == 0 {
            return None;
        }

        let start = if start < 0 {
            (len + start).max(0)
        } else {
            start.min(len)
        };
        let stop = if stop < 0 {
            (len + stop).max(-1)
        } else {
            stop.min(len - 1)
        };

        if start > stop || start >= len {
            return None;
        }
        Some((start as usize, stop as usize))
    }
}
