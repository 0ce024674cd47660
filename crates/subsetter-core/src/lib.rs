//! Core types and traversal engine for referentially-consistent database
//! subsetting.
//!
//! This crate provides:
//! - The schema model (`Schema`, `Table`, `ForeignKey`)
//! - The extraction model (`ExtractionModel`, `Subject`, `Relation`)
//! - The `Engine`: breadth-first, at-most-once traversal of the FK graph
//! - Result accumulation with FK nulling and effective-primary-key merging
//!
//! It never talks to a real database directly; `Database` and
//! `SchemaSource` are the narrow traits a concrete adapter (see the
//! `subsetter-db` crate) must implement.

#![forbid(unsafe_code)]

pub mod database;
pub mod engine;
pub mod error;
pub mod model;
pub mod results;
pub mod schema;
pub mod seen;
pub mod value;
pub mod work_item;

pub use database::{Database, SchemaSource};
pub use engine::Engine;
pub use error::{Error, Result};
pub use model::{merge_relations, ExtractionModel, Relation, SeedTable, Subject, SubjectId};
pub use results::{ResultStore, ResultsRow};
pub use schema::{Column, ColumnTuple, ForeignKey, Schema, Table};
pub use seen::SeenWorkSet;
pub use value::{OrderedFloat, Row, Value};
pub use work_item::{HistoryEntry, WorkItem};
