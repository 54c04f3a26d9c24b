//! Backtracking unifier over a burst's action records.
//!
//! Patterns are matched in declaration order. For each pattern the records
//! are scanned newest to oldest; the first compatible record extends the
//! binding and the search moves to the next pattern. When a later pattern
//! cannot be satisfied the search backtracks and tries the next older
//! candidate for the earlier one. Each record satisfies at most one pattern
//! of a rule.

use std::sync::Arc;

use crate::pattern::{Binding, Pattern};
use crate::record::ActionRecord;

/// A complete, consistent solution for one rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub binding: Binding,
    /// Sequence number of the record chosen for each pattern, in pattern order.
    pub records: Vec<u64>,
}

struct Search<'a> {
    patterns: &'a [Pattern],
    records: &'a [Arc<ActionRecord>],
    /// Pattern index pinned to a specific record.
    anchor: Option<(usize, &'a ActionRecord)>,
    /// Records newer than this are invisible.
    horizon: u64,
    accept: &'a dyn Fn(&Binding) -> bool,
    chosen: Vec<u64>,
}

impl<'a> Search<'a> {
    fn solve(&mut self, idx: usize, binding: &Binding) -> Option<Binding> {
        if idx == self.patterns.len() {
            return (self.accept)(binding).then(|| binding.clone());
        }
        let patterns = self.patterns;
        let pattern = &patterns[idx];

        if let Some((pinned, trigger)) = self.anchor {
            if pinned == idx {
                return self.try_record(idx, pattern, trigger, binding);
            }
        }

        let records = self.records;
        for record in records.iter().rev() {
            if record.seq > self.horizon {
                continue;
            }
            if let Some(found) = self.try_record(idx, pattern, record, binding) {
                return Some(found);
            }
        }
        None
    }

    fn try_record(
        &mut self,
        idx: usize,
        pattern: &Pattern,
        record: &ActionRecord,
        binding: &Binding,
    ) -> Option<Binding> {
        if self.chosen.contains(&record.seq) {
            return None;
        }
        if let Some((pinned, trigger)) = self.anchor {
            // The anchored record belongs to its own pattern only.
            if pinned != idx && trigger.seq == record.seq {
                return None;
            }
        }
        let next = pattern.unify(record, binding)?;
        self.chosen.push(record.seq);
        let found = self.solve(idx + 1, &next);
        if found.is_none() {
            self.chosen.pop();
        }
        found
    }
}

/// Newest consistent match of every pattern against `records`.
pub fn find_match(
    patterns: &[Pattern],
    records: &[Arc<ActionRecord>],
    accept: &dyn Fn(&Binding) -> bool,
) -> Option<Match> {
    if patterns.is_empty() {
        return None;
    }
    let mut search = Search {
        patterns,
        records,
        anchor: None,
        horizon: u64::MAX,
        accept,
        chosen: Vec::with_capacity(patterns.len()),
    };
    let binding = search.solve(0, &Binding::new())?;
    Some(Match {
        binding,
        records: search.chosen,
    })
}

/// Newest consistent match in which pattern `anchor` is satisfied by
/// `trigger` itself. Only records appended no later than `trigger` are
/// considered for the other patterns.
pub fn find_anchored(
    patterns: &[Pattern],
    records: &[Arc<ActionRecord>],
    anchor: usize,
    trigger: &ActionRecord,
    accept: &dyn Fn(&Binding) -> bool,
) -> Option<Match> {
    if anchor >= patterns.len() {
        return None;
    }
    let mut search = Search {
        patterns,
        records,
        anchor: Some((anchor, trigger)),
        horizon: trigger.seq,
        accept,
        chosen: Vec::with_capacity(patterns.len()),
    };
    let binding = search.solve(0, &Binding::new())?;
    Some(Match {
        binding,
        records: search.chosen,
    })
}
