//! The extraction model: subjects, relations, and the merge step that
//! resolves global + subject-local relations into one list per subject
//! (spec.md §3 "Entities owned by the core", §4.1, §9).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schema::ForeignKey;
use crate::value::Value;

/// Identity of a subject, used as the key in `ResultsRow::subjects` and in
/// the seen-work hash. Subjects are otherwise compared by name, not by
/// structural equality of their tables/relations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(pub String);

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A relation steering the traversal across one foreign key, or "bring in
/// the whole table" when no foreign key applies.
///
/// Modeled as a sum type per spec.md §9 rather than an optional-`foreign_key`
/// struct, so the direction and "whole table" case can't be represented
/// inconsistently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    /// Rows in the table seeding this relation pull in rows of the table
    /// that refers to them via `foreign_key` (traverse against the FK
    /// direction).
    IncomingFk {
        foreign_key: ForeignKey,
        propagate_sticky: bool,
        only_if_sticky: bool,
    },
    /// Rows in the table owning `foreign_key` pull in the rows they point
    /// at (traverse with the FK direction).
    OutgoingFk {
        foreign_key: ForeignKey,
        propagate_sticky: bool,
        only_if_sticky: bool,
    },
    /// Bring in every row of `table`, unfiltered.
    WholeTable {
        table: String,
        propagate_sticky: bool,
        only_if_sticky: bool,
    },
}

impl Relation {
    pub fn propagate_sticky(&self) -> bool {
        match self {
            Relation::IncomingFk { propagate_sticky, .. }
            | Relation::OutgoingFk { propagate_sticky, .. }
            | Relation::WholeTable { propagate_sticky, .. } => *propagate_sticky,
        }
    }

    pub fn only_if_sticky(&self) -> bool {
        match self {
            Relation::IncomingFk { only_if_sticky, .. }
            | Relation::OutgoingFk { only_if_sticky, .. }
            | Relation::WholeTable { only_if_sticky, .. } => *only_if_sticky,
        }
    }

    /// Key identifying "the same edge" for merge purposes: same foreign
    /// key + direction, or same whole-table target.
    fn merge_key(&self) -> (u8, String) {
        match self {
            Relation::IncomingFk { foreign_key, .. } => (0, foreign_key.name.clone()),
            Relation::OutgoingFk { foreign_key, .. } => (1, foreign_key.name.clone()),
            Relation::WholeTable { table, .. } => (2, table.clone()),
        }
    }

    fn with_flags(&self, propagate_sticky: bool, only_if_sticky: bool) -> Relation {
        match self.clone() {
            Relation::IncomingFk { foreign_key, .. } => Relation::IncomingFk {
                foreign_key,
                propagate_sticky,
                only_if_sticky,
            },
            Relation::OutgoingFk { foreign_key, .. } => Relation::OutgoingFk {
                foreign_key,
                propagate_sticky,
                only_if_sticky,
            },
            Relation::WholeTable { table, .. } => Relation::WholeTable {
                table,
                propagate_sticky,
                only_if_sticky,
            },
        }
    }
}

/// Merge global and subject-local relations. Relations describing the same
/// edge (same FK + direction, or same whole-table target) are collapsed
/// into one, OR-folding both `propagate_sticky` and `only_if_sticky` —
/// same-edge duplicates are treated as merged permissively in both flags
/// (see DESIGN.md Open Question 1).
pub fn merge_relations(relations: impl IntoIterator<Item = Relation>) -> Vec<Relation> {
    let mut merged: Vec<Relation> = Vec::new();
    for relation in relations {
        if let Some(existing) = merged
            .iter_mut()
            .find(|r: &&mut Relation| r.merge_key() == relation.merge_key())
        {
            let propagate = existing.propagate_sticky() || relation.propagate_sticky();
            let only_if = existing.only_if_sticky() || relation.only_if_sticky();
            *existing = existing.with_flags(propagate, only_if);
        } else {
            merged.push(relation);
        }
    }
    merged
}

/// One seed table in a subject: either filtered by `values` on `col`, or
/// the whole table when `col`/`values` are absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedTable {
    pub table: String,
    pub col: Option<String>,
    pub values: Option<Vec<Value>>,
}

/// A root of the traversal: its own seed tables plus relation overrides
/// that apply only while processing this subject's work items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub tables: Vec<SeedTable>,
    pub relations: Vec<Relation>,
}

/// The full extraction model: every subject plus relations that apply to
/// all of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionModel {
    pub subjects: Vec<Subject>,
    pub relations: Vec<Relation>,
}
