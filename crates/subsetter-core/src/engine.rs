//! The extraction engine: relation resolution, the work queue/processor,
//! relation expansion, and result accumulation wired together (spec.md §4).

use std::collections::{HashSet, VecDeque};

use tracing::{debug, trace};

use crate::database::Database;
use crate::error::{Error, Result};
use crate::model::{ExtractionModel, Relation, Subject, SubjectId};
use crate::results::{ResultStore, ResultsRow};
use crate::schema::{ColumnTuple, Schema, Table};
use crate::value::{Row, Value};
use crate::work_item::WorkItem;

/// One resolved traversal edge out of a table, produced by the relation
/// resolver (spec.md §4.1).
#[derive(Debug, Clone)]
struct Edge {
    dst_table: String,
    src_cols: Option<ColumnTuple>,
    dst_cols: Option<ColumnTuple>,
    propagate_sticky: bool,
    only_if_sticky: bool,
}

/// Adjacency list for one subject: table name -> outgoing edges, visited
/// in the order the resolver produced them (spec.md §5: observable via
/// explain mode).
type Adjacency = std::collections::HashMap<String, Vec<Edge>>;

/// The single-threaded, breadth-first traversal engine.
pub struct Engine<'d> {
    database: &'d mut dyn Database,
    schema: Schema,
    subjects: std::collections::HashMap<SubjectId, Subject>,
    adjacency: std::collections::HashMap<SubjectId, Adjacency>,
    queue: VecDeque<WorkItem>,
    seen: crate::seen::SeenWorkSet,
    store: ResultStore,
    pub explain: bool,
    pub verbosity: u8,
    pub fetch_count: u64,
    pub fetched_row_count: u64,
    pub fetched_row_count_per_table: indexmap::IndexMap<String, u64>,
    pub max_depth: u32,
    explain_trace: Vec<String>,
}

impl<'d> Engine<'d> {
    pub fn new(database: &'d mut dyn Database, schema: Schema, model: ExtractionModel) -> Self {
        let mut subjects = std::collections::HashMap::new();
        let mut adjacency = std::collections::HashMap::new();
        let mut queue = VecDeque::new();

        for subject in model.subjects {
            adjacency.insert(subject.id.clone(), resolve_adjacency(&model.relations, &subject));

            for seed in &subject.tables {
                let item = match (&seed.col, &seed.values) {
                    (Some(col), Some(values)) => {
                        let value_tuples: Vec<Vec<Value>> = values.iter().map(|v| vec![v.clone()]).collect();
                        WorkItem::seed(subject.id.clone(), seed.table.clone(), Some(vec![col.clone()]), Some(value_tuples))
                    }
                    _ => WorkItem::seed(subject.id.clone(), seed.table.clone(), None, None),
                };
                queue.push_back(item);
            }

            subjects.insert(subject.id.clone(), subject);
        }

        Engine {
            database,
            schema,
            subjects,
            adjacency,
            queue,
            seen: crate::seen::SeenWorkSet::new(),
            store: ResultStore::new(),
            explain: false,
            verbosity: 0,
            fetch_count: 0,
            fetched_row_count: 0,
            fetched_row_count_per_table: indexmap::IndexMap::new(),
            max_depth: 0,
            explain_trace: Vec::new(),
        }
    }

    /// Drain the work queue. Safe to call again afterward: the queue is
    /// empty by then, so a second call is a no-op and `flat_results()`
    /// is unchanged (spec.md §6 "idempotent after first call").
    pub fn run(&mut self) -> Result<&mut Self> {
        while let Some(mut item) = self.queue.pop_front() {
            let should_process = self.dedup(&mut item);
            if should_process {
                self.process_work_item(item)?;
            }
        }
        Ok(self)
    }

    /// Returns whether `item` should be processed, mutating `item.values`
    /// down to the unseen subset when value-filtered (spec.md §4.3).
    fn dedup(&mut self, item: &mut WorkItem) -> bool {
        match &item.cols {
            None => {
                let already = self.seen.contains_unfiltered(&item.subject, &item.table, item.sticky);
                self.seen.mark_unfiltered(&item.subject, &item.table, item.sticky);
                !already
            }
            Some(cols) => {
                let values = item.values.clone().expect("cols.is_some() implies values.is_some()");
                let unseen = self.seen.unseen_values(&item.subject, &item.table, cols, item.sticky, &values);
                self.seen.mark_filtered(&item.subject, &item.table, cols, item.sticky, &values);
                if unseen.is_empty() {
                    false
                } else {
                    item.values = Some(unseen);
                    true
                }
            }
        }
    }

    fn process_work_item(&mut self, item: WorkItem) -> Result<()> {
        if item.depth > self.max_depth {
            self.max_depth = item.depth;
        }

        if self.explain {
            self.explain_trace.push(item.render_history());
        }
        if self.verbosity >= 2 {
            trace!(
                pass = self.fetch_count + 1,
                queued = self.queue.len(),
                depth = self.max_depth,
                table = %item.table,
                "processing work item"
            );
        }

        let table_def = self
            .schema
            .table(&item.table)
            .cloned()
            .ok_or_else(|| Error::Invariant(format!("unknown table in work item: {}", item.table)))?;

        trace!(table = %item.table, subject = %item.subject, sticky = item.sticky, "fetching rows");
        let rows = self
            .database
            .fetch_rows(&item.table, item.cols.as_ref(), item.values.as_deref())
            .map_err(|source| Error::Fetch {
                table: item.table.clone(),
                source,
            })?;
        self.fetch_count += 1;

        if rows.is_empty() {
            return Ok(());
        }

        let edges = self
            .adjacency
            .get(&item.subject)
            .and_then(|a| a.get(&item.table))
            .cloned()
            .unwrap_or_default();

        let processed_outgoing_fk_cols = self.expand_relations(&item, &table_def, &rows, &edges);

        debug!(
            table = %item.table,
            rows = rows.len(),
            sticky = item.sticky,
            "accumulating rows"
        );
        *self.fetched_row_count_per_table.entry(item.table.clone()).or_insert(0) += rows.len() as u64;
        self.fetched_row_count += rows.len() as u64;
        self.store.accumulate(&table_def, &item.subject, item.sticky, rows, &processed_outgoing_fk_cols);

        Ok(())
    }

    /// Relation Expansion (spec.md §4.4): derive and enqueue child work
    /// items for each outgoing edge, returning the set of this table's own
    /// FK columns whose outgoing relation was traversed.
    fn expand_relations(&mut self, item: &WorkItem, table_def: &Table, rows: &[Row], edges: &[Edge]) -> HashSet<String> {
        let mut processed_outgoing_fk_cols = HashSet::new();
        let mut to_enqueue = Vec::new();

        for edge in edges {
            if edge.only_if_sticky && !item.sticky {
                continue;
            }
            let child_sticky = item.sticky && edge.propagate_sticky;

            match (&edge.src_cols, &edge.dst_cols) {
                (Some(src_cols), Some(dst_cols)) => {
                    processed_outgoing_fk_cols.extend(src_cols.iter().cloned());

                    let src_indexes: Vec<usize> = src_cols
                        .iter()
                        .filter_map(|c| table_def.column_index(c))
                        .collect();

                    let mut distinct_values: Vec<Vec<Value>> = Vec::new();
                    let mut seen_values: HashSet<Vec<Value>> = HashSet::new();
                    let mut first_row_for_value: Vec<&Row> = Vec::new();

                    for row in rows {
                        let projected: Vec<Value> = src_indexes.iter().map(|&i| row[i].clone()).collect();
                        if projected.iter().any(Value::is_null) {
                            continue;
                        }
                        if seen_values.insert(projected.clone()) {
                            distinct_values.push(projected);
                            first_row_for_value.push(row);
                        }
                    }

                    if distinct_values.is_empty() {
                        continue;
                    }

                    if self.explain {
                        for (value, origin_row) in distinct_values.iter().zip(first_row_for_value.iter()) {
                            let origin_results_row = ResultsRow::new(item.table.clone(), (*origin_row).clone(), child_sticky);
                            to_enqueue.push(WorkItem::child(
                                item,
                                edge.dst_table.clone(),
                                Some(dst_cols.clone()),
                                Some(vec![value.clone()]),
                                child_sticky,
                                Some(table_def),
                                Some(&origin_results_row),
                            ));
                        }
                    } else {
                        to_enqueue.push(WorkItem::child(
                            item,
                            edge.dst_table.clone(),
                            Some(dst_cols.clone()),
                            Some(distinct_values),
                            child_sticky,
                            None,
                            None,
                        ));
                    }
                }
                _ => {
                    to_enqueue.push(WorkItem::child(item, edge.dst_table.clone(), None, None, child_sticky, None, None));
                }
            }
        }

        for child in to_enqueue {
            self.queue.push_back(child);
        }
        processed_outgoing_fk_cols
    }

    /// Flat Results Exporter (spec.md §4.6).
    pub fn flat_results(&self) -> Vec<(String, Row)> {
        self.store.flat_results()
    }

    /// Per-work-item provenance lines recorded while `explain` was set,
    /// in processing order. Empty when `explain` is `false`. The engine
    /// never prints these itself — printing is the caller's concern.
    pub fn explain_trace(&self) -> &[String] {
        &self.explain_trace
    }
}

/// Relation Resolver (spec.md §4.1): merge global + subject relations and
/// index them by source table.
fn resolve_adjacency(global_relations: &[Relation], subject: &Subject) -> Adjacency {
    let merged = crate::model::merge_relations(global_relations.iter().cloned().chain(subject.relations.iter().cloned()));

    let mut adjacency: Adjacency = std::collections::HashMap::new();
    for relation in merged {
        match relation {
            Relation::IncomingFk {
                foreign_key,
                propagate_sticky,
                only_if_sticky,
            } => {
                adjacency.entry(foreign_key.dst_table.clone()).or_default().push(Edge {
                    dst_table: foreign_key.src_table.clone(),
                    src_cols: Some(foreign_key.dst_cols.clone()),
                    dst_cols: Some(foreign_key.src_cols.clone()),
                    propagate_sticky,
                    only_if_sticky,
                });
            }
            Relation::OutgoingFk {
                foreign_key,
                propagate_sticky,
                only_if_sticky,
            } => {
                adjacency.entry(foreign_key.src_table.clone()).or_default().push(Edge {
                    dst_table: foreign_key.dst_table.clone(),
                    src_cols: Some(foreign_key.src_cols.clone()),
                    dst_cols: Some(foreign_key.dst_cols.clone()),
                    propagate_sticky,
                    only_if_sticky,
                });
            }
            Relation::WholeTable {
                table,
                propagate_sticky,
                only_if_sticky,
            } => {
                adjacency.entry(table.clone()).or_default().push(Edge {
                    dst_table: table,
                    src_cols: None,
                    dst_cols: None,
                    propagate_sticky,
                    only_if_sticky,
                });
            }
        }
    }
    adjacency
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SeedTable;
    use crate::schema::{Column, ForeignKey};
    use std::collections::HashMap;

    /// An in-memory fixture database: tables keyed by name, each a list of
    /// rows in column order. `fetch_rows` filters in-process, the way a
    /// real adapter would filter in SQL.
    struct FixtureDatabase {
        data: HashMap<String, Vec<Row>>,
    }

    impl Database for FixtureDatabase {
        fn fetch_rows(
            &mut self,
            table: &str,
            cols: Option<&ColumnTuple>,
            values: Option<&[Vec<Value>]>,
        ) -> std::result::Result<Vec<Row>, Box<dyn std::error::Error + Send + Sync>> {
            let rows = self.data.get(table).cloned().unwrap_or_default();
            let Some(_cols) = cols else {
                return Ok(rows);
            };
            let values = values.unwrap();
            // Fixture convention: filter column is always column 0 for
            // the tables these tests use.
            Ok(rows
                .into_iter()
                .filter(|row| values.iter().any(|v| v[0] == row[0]))
                .collect())
        }
    }

    fn users_posts_tags_schema() -> Schema {
        let mut schema = Schema::new();
        schema.insert_table(Table {
            name: "users".into(),
            columns: vec![
                Column { name: "id".into(), nullable: false },
                Column { name: "name".into(), nullable: false },
                Column { name: "manager_id".into(), nullable: true },
            ],
            primary_key: Some(vec!["id".into()]),
            unique_indexes: vec![],
            foreign_keys: vec![ForeignKey {
                name: "users_manager_id_fkey".into(),
                src_table: "users".into(),
                src_cols: vec!["manager_id".into()],
                dst_table: "users".into(),
                dst_cols: vec!["id".into()],
            }],
        });
        schema.insert_table(Table {
            name: "posts".into(),
            columns: vec![
                Column { name: "id".into(), nullable: false },
                Column { name: "user_id".into(), nullable: true },
                Column { name: "title".into(), nullable: false },
            ],
            primary_key: Some(vec!["id".into()]),
            unique_indexes: vec![],
            foreign_keys: vec![ForeignKey {
                name: "posts_user_id_fkey".into(),
                src_table: "posts".into(),
                src_cols: vec!["user_id".into()],
                dst_table: "users".into(),
                dst_cols: vec!["id".into()],
            }],
        });
        schema
    }

    fn users_posts_fk() -> ForeignKey {
        ForeignKey {
            name: "posts_user_id_fkey".into(),
            src_table: "posts".into(),
            src_cols: vec!["user_id".into()],
            dst_table: "users".into(),
            dst_cols: vec!["id".into()],
        }
    }

    fn subject(id: &str, tables: Vec<SeedTable>, relations: Vec<Relation>) -> Subject {
        Subject {
            id: SubjectId(id.to_string()),
            tables,
            relations,
        }
    }

    // S1: seed by value, no relations configured.
    #[test]
    fn s1_seed_by_value_no_relations() {
        let schema = users_posts_tags_schema();
        let mut db = FixtureDatabase {
            data: HashMap::from([
                (
                    "users".to_string(),
                    vec![
                        vec![Value::Int(1), Value::Text("a".into()), Value::Null],
                        vec![Value::Int(2), Value::Text("b".into()), Value::Int(1)],
                    ],
                ),
                ("posts".to_string(), vec![vec![Value::Int(10), Value::Int(1), Value::Text("p".into())]]),
            ]),
        };
        let model = ExtractionModel {
            subjects: vec![subject(
                "s1",
                vec![SeedTable { table: "users".into(), col: Some("id".into()), values: Some(vec![Value::Int(1)]) }],
                vec![],
            )],
            relations: vec![],
        };
        let mut engine = Engine::new(&mut db, schema, model);
        engine.run().unwrap();
        assert_eq!(
            engine.flat_results(),
            vec![("users".to_string(), vec![Value::Int(1), Value::Text("a".into()), Value::Null])]
        );
    }

    // S2: seed by value, outgoing FK relation traversed.
    #[test]
    fn s2_outgoing_fk_traversed() {
        let schema = users_posts_tags_schema();
        let mut db = FixtureDatabase {
            data: HashMap::from([
                (
                    "users".to_string(),
                    vec![
                        vec![Value::Int(1), Value::Text("a".into()), Value::Null],
                        vec![Value::Int(2), Value::Text("b".into()), Value::Int(1)],
                    ],
                ),
                (
                    "posts".to_string(),
                    vec![
                        vec![Value::Int(10), Value::Int(1), Value::Text("p".into())],
                        vec![Value::Int(11), Value::Int(2), Value::Text("q".into())],
                    ],
                ),
            ]),
        };
        let model = ExtractionModel {
            subjects: vec![subject(
                "s1",
                vec![SeedTable { table: "posts".into(), col: Some("id".into()), values: Some(vec![Value::Int(10)]) }],
                vec![],
            )],
            relations: vec![Relation::OutgoingFk {
                foreign_key: users_posts_fk(),
                propagate_sticky: true,
                only_if_sticky: false,
            }],
        };
        let mut engine = Engine::new(&mut db, schema, model);
        engine.run().unwrap();
        assert_eq!(
            engine.flat_results(),
            vec![
                ("posts".to_string(), vec![Value::Int(10), Value::Int(1), Value::Text("p".into())]),
                ("users".to_string(), vec![Value::Int(1), Value::Text("a".into()), Value::Null]),
            ]
        );
    }

    // S3: incoming relation pulls children.
    #[test]
    fn s3_incoming_fk_pulls_children() {
        let schema = users_posts_tags_schema();
        let mut db = FixtureDatabase {
            data: HashMap::from([
                (
                    "users".to_string(),
                    vec![vec![Value::Int(1), Value::Text("a".into()), Value::Null]],
                ),
                (
                    "posts".to_string(),
                    vec![
                        vec![Value::Int(10), Value::Int(1), Value::Text("p".into())],
                        vec![Value::Int(11), Value::Int(2), Value::Text("q".into())],
                    ],
                ),
            ]),
        };
        let model = ExtractionModel {
            subjects: vec![subject(
                "s1",
                vec![SeedTable { table: "users".into(), col: Some("id".into()), values: Some(vec![Value::Int(1)]) }],
                vec![],
            )],
            relations: vec![Relation::IncomingFk {
                foreign_key: users_posts_fk(),
                propagate_sticky: true,
                only_if_sticky: false,
            }],
        };
        let mut engine = Engine::new(&mut db, schema, model);
        engine.run().unwrap();
        assert_eq!(
            engine.flat_results(),
            vec![
                ("posts".to_string(), vec![Value::Int(10), Value::Int(1), Value::Text("p".into())]),
                ("users".to_string(), vec![Value::Int(1), Value::Text("a".into()), Value::Null]),
            ]
        );
    }

    // S4: FK column nulled when relation not followed.
    #[test]
    fn s4_fk_column_nulled_when_not_traversed() {
        let schema = users_posts_tags_schema();
        let mut db = FixtureDatabase {
            data: HashMap::from([
                (
                    "users".to_string(),
                    vec![vec![Value::Int(1), Value::Text("a".into()), Value::Null]],
                ),
                ("posts".to_string(), vec![vec![Value::Int(10), Value::Int(1), Value::Text("p".into())]]),
            ]),
        };
        let model = ExtractionModel {
            subjects: vec![subject(
                "s1",
                vec![SeedTable { table: "posts".into(), col: Some("id".into()), values: Some(vec![Value::Int(10)]) }],
                vec![],
            )],
            relations: vec![],
        };
        let mut engine = Engine::new(&mut db, schema, model);
        engine.run().unwrap();
        assert_eq!(
            engine.flat_results(),
            vec![("posts".to_string(), vec![Value::Int(10), Value::Null, Value::Text("p".into())])]
        );
    }

    // S5: only_if_sticky gates propagation based on the current item's
    // sticky flag, which a subject's own relations (propagate_sticky along
    // the way in) determine. Seed users id=2 (manager_id=1): the seed item
    // itself is sticky, but the self-FK hop to its manager (user id=1) is
    // marked `propagate_sticky: false`, so the manager item arrives
    // non-sticky. An only_if_sticky incoming-FK edge from `users` to
    // `posts` then fires for the sticky seed (pulling user 2's post) but
    // not for the non-sticky manager item (user 1's post stays untouched)
    // — unless the subject's own relation override drops the gate.
    fn manager_self_fk() -> ForeignKey {
        ForeignKey {
            name: "users_manager_id_fkey".into(),
            src_table: "users".into(),
            src_cols: vec!["manager_id".into()],
            dst_table: "users".into(),
            dst_cols: vec!["id".into()],
        }
    }

    fn posts_incoming_fk() -> ForeignKey {
        ForeignKey {
            name: "posts_user_id_fkey".into(),
            src_table: "posts".into(),
            src_cols: vec!["user_id".into()],
            dst_table: "users".into(),
            dst_cols: vec!["id".into()],
        }
    }

    fn s5_fixture() -> (Schema, FixtureDatabase) {
        let schema = users_posts_tags_schema();
        let db = FixtureDatabase {
            data: HashMap::from([
                (
                    "users".to_string(),
                    vec![
                        vec![Value::Int(1), Value::Text("a".into()), Value::Null],
                        vec![Value::Int(2), Value::Text("b".into()), Value::Int(1)],
                    ],
                ),
                (
                    "posts".to_string(),
                    vec![
                        vec![Value::Int(10), Value::Int(1), Value::Text("p1".into())],
                        vec![Value::Int(20), Value::Int(2), Value::Text("p2".into())],
                    ],
                ),
            ]),
        };
        (schema, db)
    }

    #[test]
    fn s5_only_if_sticky_blocks_propagation_from_a_non_sticky_item() {
        let (schema, mut db) = s5_fixture();
        let model = ExtractionModel {
            subjects: vec![subject(
                "gated",
                vec![SeedTable { table: "users".into(), col: Some("id".into()), values: Some(vec![Value::Int(2)]) }],
                vec![
                    Relation::OutgoingFk {
                        foreign_key: manager_self_fk(),
                        propagate_sticky: false,
                        only_if_sticky: false,
                    },
                    Relation::IncomingFk {
                        foreign_key: posts_incoming_fk(),
                        propagate_sticky: true,
                        only_if_sticky: true,
                    },
                ],
            )],
            relations: vec![],
        };
        let mut engine = Engine::new(&mut db, schema, model);
        engine.run().unwrap();
        let post_ids: Vec<i64> = engine
            .flat_results()
            .iter()
            .filter(|(t, _)| t == "posts")
            .map(|(_, r)| match &r[0] {
                Value::Int(i) => *i,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(post_ids, vec![20], "only the sticky seed's own post is pulled, not the manager's");
    }

    #[test]
    fn s5_only_if_sticky_override_lets_non_sticky_propagation_through() {
        let (schema, mut db) = s5_fixture();
        let model = ExtractionModel {
            subjects: vec![subject(
                "ungated",
                vec![SeedTable { table: "users".into(), col: Some("id".into()), values: Some(vec![Value::Int(2)]) }],
                vec![
                    Relation::OutgoingFk {
                        foreign_key: manager_self_fk(),
                        propagate_sticky: false,
                        only_if_sticky: false,
                    },
                    Relation::IncomingFk {
                        foreign_key: posts_incoming_fk(),
                        propagate_sticky: true,
                        only_if_sticky: false,
                    },
                ],
            )],
            relations: vec![],
        };
        let mut engine = Engine::new(&mut db, schema, model);
        engine.run().unwrap();
        let mut post_ids: Vec<i64> = engine
            .flat_results()
            .iter()
            .filter(|(t, _)| t == "posts")
            .map(|(_, r)| match &r[0] {
                Value::Int(i) => *i,
                _ => unreachable!(),
            })
            .collect();
        post_ids.sort_unstable();
        assert_eq!(post_ids, vec![10, 20], "without the gate, the manager's post is pulled too");
    }

    // S6: cycle termination.
    #[test]
    fn s6_cycle_terminates() {
        let schema = users_posts_tags_schema();
        let mut db = FixtureDatabase {
            data: HashMap::from([(
                "users".to_string(),
                vec![
                    vec![Value::Int(1), Value::Text("a".into()), Value::Int(2)],
                    vec![Value::Int(2), Value::Text("b".into()), Value::Int(1)],
                ],
            )]),
        };
        let model = ExtractionModel {
            subjects: vec![subject(
                "s1",
                vec![SeedTable { table: "users".into(), col: Some("id".into()), values: Some(vec![Value::Int(1)]) }],
                vec![],
            )],
            relations: vec![Relation::OutgoingFk {
                foreign_key: ForeignKey {
                    name: "users_manager_id_fkey".into(),
                    src_table: "users".into(),
                    src_cols: vec!["manager_id".into()],
                    dst_table: "users".into(),
                    dst_cols: vec!["id".into()],
                },
                propagate_sticky: true,
                only_if_sticky: false,
            }],
        };
        let mut engine = Engine::new(&mut db, schema, model);
        engine.run().unwrap();
        assert_eq!(
            engine.flat_results(),
            vec![
                ("users".to_string(), vec![Value::Int(1), Value::Text("a".into()), Value::Int(2)]),
                ("users".to_string(), vec![Value::Int(2), Value::Text("b".into()), Value::Int(1)]),
            ]
        );
    }

    #[test]
    fn run_is_idempotent() {
        let schema = users_posts_tags_schema();
        let mut db = FixtureDatabase {
            data: HashMap::from([(
                "users".to_string(),
                vec![vec![Value::Int(1), Value::Text("a".into()), Value::Null]],
            )]),
        };
        let model = ExtractionModel {
            subjects: vec![subject(
                "s1",
                vec![SeedTable { table: "users".into(), col: Some("id".into()), values: Some(vec![Value::Int(1)]) }],
                vec![],
            )],
            relations: vec![],
        };
        let mut engine = Engine::new(&mut db, schema, model);
        engine.run().unwrap();
        let first = engine.flat_results();
        engine.run().unwrap();
        let second = engine.flat_results();
        assert_eq!(first, second);
    }
}
