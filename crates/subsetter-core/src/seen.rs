//! The seen-work hash: two-level at-most-once dedup (spec.md §3, §4.3).
//!
//! The spec describes this as a hash set; we key on the actual tuple
//! instead of a computed integer hash so two distinct work items can never
//! collide onto the same bucket by chance — the dedup guarantee (invariant
//! 3 in spec.md §8) has to be exact, not merely hash-coincidence-free.

use std::collections::HashSet;

use crate::model::SubjectId;
use crate::schema::ColumnTuple;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SeenKey {
    Unfiltered {
        subject: SubjectId,
        table: String,
        sticky: bool,
    },
    Filtered {
        subject: SubjectId,
        table: String,
        cols: ColumnTuple,
        sticky: bool,
        value: Vec<Value>,
    },
}

/// At-most-once work tracker, keyed by `(subject, table, sticky)` for
/// unfiltered work items, or `(subject, table, cols, sticky, value)` per
/// individual value tuple for filtered ones.
#[derive(Debug, Default)]
pub struct SeenWorkSet {
    seen: HashSet<SeenKey>,
}

impl SeenWorkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if this unfiltered `(subject, table, sticky)` has already been
    /// processed.
    pub fn contains_unfiltered(&self, subject: &SubjectId, table: &str, sticky: bool) -> bool {
        self.seen.contains(&SeenKey::Unfiltered {
            subject: subject.clone(),
            table: table.to_string(),
            sticky,
        })
    }

    pub fn mark_unfiltered(&mut self, subject: &SubjectId, table: &str, sticky: bool) {
        self.seen.insert(SeenKey::Unfiltered {
            subject: subject.clone(),
            table: table.to_string(),
            sticky,
        });
    }

    /// Partition `values` into those not yet seen for `(subject, table,
    /// cols, sticky)`. Does not mark anything seen — call
    /// `mark_filtered` for the *whole* original value list afterward,
    /// including values that were already seen (spec.md §4.3: "mark all
    /// of W.values, including originally-seen, as seen").
    pub fn unseen_values(
        &self,
        subject: &SubjectId,
        table: &str,
        cols: &ColumnTuple,
        sticky: bool,
        values: &[Vec<Value>],
    ) -> Vec<Vec<Value>> {
        values
            .iter()
            .filter(|v| {
                !self.seen.contains(&SeenKey::Filtered {
                    subject: subject.clone(),
                    table: table.to_string(),
                    cols: cols.clone(),
                    sticky,
                    value: (*v).clone(),
                })
            })
            .cloned()
            .collect()
    }

    pub fn mark_filtered(&mut self, subject: &SubjectId, table: &str, cols: &ColumnTuple, sticky: bool, values: &[Vec<Value>]) {
        for value in values {
            self.seen.insert(SeenKey::Filtered {
                subject: subject.clone(),
                table: table.to_string(),
                cols: cols.clone(),
                sticky,
                value: value.clone(),
            });
        }
    }
}
