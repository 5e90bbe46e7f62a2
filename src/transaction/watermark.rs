// Watermark
//
// Tracks the read timestamps of running transactions as a multiset. The
// watermark is the smallest of them, or the last commit timestamp when
// nothing runs; versions at or below it are visible to every possible
// reader.

use std::collections::BTreeMap;

use crate::common::types::Timestamp;

pub struct Watermark {
    commit_ts: Timestamp,
    current_reads: BTreeMap<Timestamp, usize>,
}

impl Watermark {
    pub fn new(commit_ts: Timestamp) -> Self {
        Self {
            commit_ts,
            current_reads: BTreeMap::new(),
        }
    }

    pub fn add_txn(&mut self, read_ts: Timestamp) {
        *self.current_reads.entry(read_ts).or_insert(0) += 1;
    }

    pub fn remove_txn(&mut self, read_ts: Timestamp) {
        if let Some(count) = self.current_reads.get_mut(&read_ts) {
            *count -= 1;
            if *count == 0 {
                self.current_reads.remove(&read_ts);
            }
        }
    }

    /// Advance the idle floor; the watermark never goes backwards because
    /// commit timestamps are monotone.
    pub fn update_commit_ts(&mut self, commit_ts: Timestamp) {
        self.commit_ts = commit_ts;
    }

    pub fn watermark(&self) -> Timestamp {
        match self.current_reads.keys().next() {
            Some(&min) => min,
            None => self.commit_ts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watermark_is_min_running_read_ts() {
        let mut w = Watermark::new(0);
        w.add_txn(5);
        w.add_txn(3);
        w.add_txn(7);
        assert_eq!(w.watermark(), 3);
        w.remove_txn(3);
        assert_eq!(w.watermark(), 5);
    }

    #[test]
    fn test_duplicate_read_ts_counted() {
        let mut w = Watermark::new(0);
        w.add_txn(4);
        w.add_txn(4);
        w.remove_txn(4);
        assert_eq!(w.watermark(), 4);
        w.remove_txn(4);
        assert_eq!(w.watermark(), 0);
    }

    #[test]
    fn test_idle_watermark_follows_commit_ts() {
        let mut w = Watermark::new(2);
        assert_eq!(w.watermark(), 2);
        w.update_commit_ts(9);
        assert_eq!(w.watermark(), 9);
    }

    #[test]
    fn test_watermark_monotone_across_txn_lifecycle() {
        let mut w = Watermark::new(0);
        let mut last = w.watermark();

        w.add_txn(0);
        assert!(w.watermark() >= last);
        last = w.watermark();

        w.update_commit_ts(1);
        w.remove_txn(0);
        assert!(w.watermark() >= last);
        last = w.watermark();

        w.add_txn(1);
        w.update_commit_ts(2);
        w.remove_txn(1);
        assert!(w.watermark() >= last);
    }
}
