#[cfg(test)]
mod table_core_tests {
    use std::sync::Arc;

    use kestrel_common::config::{DbSettings, LockMode};
    use kestrel_common::datum::{Datum, Row};
    use kestrel_common::error::DbError;
    use kestrel_common::schema::{ColumnDef, IndexColumn, TableSchema};
    use kestrel_common::types::{ColumnId, DataType, IndexId, RowId, TableId};

    use crate::database::Database;
    use crate::index::{IndexType, TableIndex};
    use crate::session::Session;
    use crate::table::{Constraint, Table};

    fn test_settings() -> DbSettings {
        DbSettings { analyze_auto: 0, ..DbSettings::default() }
    }

    fn setup() -> (Arc<Database>, Arc<Session>) {
        setup_with(test_settings())
    }

    fn setup_with(settings: DbSettings) -> (Arc<Database>, Arc<Session>) {
        let db = Database::new(settings);
        let session = db.create_session(None);
        (db, session)
    }

    fn test_schema(id: u64, name: &str, persist_data: bool) -> TableSchema {
        TableSchema {
            id: TableId(id),
            name: name.to_string(),
            columns: vec![
                ColumnDef {
                    id: ColumnId(0),
                    name: "id".into(),
                    data_type: DataType::Int64,
                    nullable: false,
                    primary_key: true,
                },
                ColumnDef {
                    id: ColumnId(1),
                    name: "c".into(),
                    data_type: DataType::Text,
                    nullable: true,
                    primary_key: false,
                },
            ],
            persist_data,
            hidden: false,
            temporary: false,
            global_temporary: false,
        }
    }

    fn create_table(
        db: &Arc<Database>,
        session: &Arc<Session>,
        id: u64,
        name: &str,
    ) -> Arc<Table> {
        db.create_table(session, test_schema(id, name, true)).unwrap()
    }

    fn insert(table: &Arc<Table>, session: &Arc<Session>, id: i64, c: &str) -> RowId {
        table
            .add_row(session, Row::new(vec![Datum::Int64(id), Datum::Text(c.into())]))
            .unwrap()
    }

    // ── Round trip and mutation ──────────────────────────────────────

    #[test]
    fn test_add_row_round_trips_through_primary() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        let key = insert(&table, &session, 7, "x");
        let row = table.get_row(&session, key).unwrap().unwrap();
        assert_eq!(row.values[0], Datum::Int64(7));
        assert_eq!(row.values[1], Datum::Text("x".into()));
        assert_eq!(table.row_count(&session).unwrap(), 1);
    }

    #[test]
    fn test_remove_row_leaves_no_trace() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        let key = insert(&table, &session, 1, "a");
        let row = table.get_row(&session, key).unwrap().unwrap();
        table.remove_row(&session, &row).unwrap();
        assert_eq!(table.row_count(&session).unwrap(), 0);
        assert!(table.get_row(&session, key).unwrap().is_none());
    }

    #[test]
    fn test_remove_missing_row_is_internal_check_and_rolls_back() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        let key = insert(&table, &session, 1, "a");
        let row = table.get_row(&session, key).unwrap().unwrap();
        table.remove_row(&session, &row).unwrap();
        let err = table.remove_row(&session, &row).unwrap_err();
        assert!(matches!(err, DbError::InternalCheck(_)));
        assert_eq!(table.row_count(&session).unwrap(), 0);
    }

    #[test]
    fn test_truncate_is_idempotent() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        for i in 0..5 {
            insert(&table, &session, i, "v");
        }
        table.truncate(&session).unwrap();
        assert_eq!(table.row_count(&session).unwrap(), 0);
        table.truncate(&session).unwrap();
        assert_eq!(table.row_count(&session).unwrap(), 0);
    }

    #[test]
    fn test_modification_id_is_monotonic() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        let before = table.max_data_modification_id();
        insert(&table, &session, 1, "a");
        let after_insert = table.max_data_modification_id();
        assert!(after_insert > before);
        table.truncate(&session).unwrap();
        assert!(table.max_data_modification_id() > after_insert);
    }

    // ── Unique index failure semantics ───────────────────────────────

    #[test]
    fn test_duplicate_key_rolls_back_whole_statement() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        let index = table
            .add_index(
                &session,
                "t_c_unique",
                IndexId(10),
                vec![IndexColumn::asc(1)],
                IndexType::unique(false),
            )
            .unwrap();
        insert(&table, &session, 1, "a");
        insert(&table, &session, 2, "b");

        let err = table
            .add_row(&session, Row::new(vec![Datum::Int64(3), Datum::Text("a".into())]))
            .unwrap_err();
        assert!(matches!(err, DbError::DuplicateKey { .. }), "got {err}");
        assert_eq!(table.row_count(&session).unwrap(), 2);
        assert_eq!(index.row_count(&session), 2);
    }

    #[test]
    fn test_uncommitted_conflict_is_concurrent_update() {
        let (db, s1) = setup();
        let s2 = db.create_session(None);
        let table = create_table(&db, &s1, 1, "t");
        table
            .add_index(
                &s1,
                "t_c_unique",
                IndexId(10),
                vec![IndexColumn::asc(1)],
                IndexType::unique(false),
            )
            .unwrap();

        insert(&table, &s1, 1, "a");
        let err = table
            .add_row(&s2, Row::new(vec![Datum::Int64(2), Datum::Text("a".into())]))
            .unwrap_err();
        assert!(matches!(err, DbError::ConcurrentUpdate(_)), "got {err}");

        // once the first writer commits, the same conflict is a plain
        // duplicate key
        s1.commit();
        let err = table
            .add_row(&s2, Row::new(vec![Datum::Int64(2), Datum::Text("a".into())]))
            .unwrap_err();
        assert!(matches!(err, DbError::DuplicateKey { .. }), "got {err}");
    }

    #[test]
    fn test_unique_index_allows_multiple_nulls() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        table
            .add_index(
                &session,
                "t_c_unique",
                IndexId(10),
                vec![IndexColumn::asc(1)],
                IndexType::unique(false),
            )
            .unwrap();
        table
            .add_row(&session, Row::new(vec![Datum::Int64(1), Datum::Null]))
            .unwrap();
        table
            .add_row(&session, Row::new(vec![Datum::Int64(2), Datum::Null]))
            .unwrap();
        assert_eq!(table.row_count(&session).unwrap(), 2);
    }

    // ── Index selection policy ───────────────────────────────────────

    #[test]
    fn test_promotable_primary_key_becomes_delegate() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        let maps_before = db.store().map_count();

        let index = table
            .add_index(
                &session,
                "t_pk",
                IndexId(10),
                vec![IndexColumn::asc(0)],
                IndexType::primary_key(false),
            )
            .unwrap();
        assert!(matches!(index.as_ref(), TableIndex::Delegate(_)));
        // zero storage cost: no new backing map
        assert_eq!(db.store().map_count(), maps_before);

        for id in [1, 2, 3] {
            insert(&table, &session, id, "v");
        }
        // the main column value is the row id
        let row = table.get_row(&session, RowId(2)).unwrap().unwrap();
        assert_eq!(row.values[0], Datum::Int64(2));

        let key = [Datum::Int64(2)];
        let mut cursor = index
            .find(&session, Some(key.as_slice()), Some(key.as_slice()))
            .unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get().unwrap().key, RowId(2));
        assert!(!cursor.next().unwrap());
    }

    #[test]
    fn test_promotion_blocked_on_non_empty_table() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        insert(&table, &session, 1, "a");
        let index = table
            .add_index(
                &session,
                "t_pk",
                IndexId(10),
                vec![IndexColumn::asc(0)],
                IndexType::primary_key(false),
            )
            .unwrap();
        assert!(matches!(index.as_ref(), TableIndex::Secondary(_)));
    }

    #[test]
    fn test_promotion_blocked_while_starting_with_existing_map() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        db.store().open_map("index.10").unwrap();
        db.set_starting(true);
        let index = table
            .add_index(
                &session,
                "t_pk",
                IndexId(10),
                vec![IndexColumn::asc(0)],
                IndexType::primary_key(false),
            )
            .unwrap();
        db.set_starting(false);
        assert!(matches!(index.as_ref(), TableIndex::Secondary(_)));
    }

    #[test]
    fn test_hash_type_with_one_column_selects_hash_index() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        let unique = table
            .add_index(
                &session,
                "t_c_hash",
                IndexId(10),
                vec![IndexColumn::asc(1)],
                IndexType::unique(true),
            )
            .unwrap();
        assert!(matches!(unique.as_ref(), TableIndex::HashUnique(_)));

        let non_unique = table
            .add_index(
                &session,
                "t_c_hash2",
                IndexId(11),
                vec![IndexColumn::asc(1)],
                IndexType::non_unique(true),
            )
            .unwrap();
        assert!(matches!(non_unique.as_ref(), TableIndex::HashNonUnique(_)));
    }

    #[test]
    fn test_nullable_primary_key_column_rejected_at_creation() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        let err = table
            .add_index(
                &session,
                "t_pk",
                IndexId(10),
                vec![IndexColumn::asc(1)], // column "c" is nullable
                IndexType::primary_key(false),
            )
            .unwrap_err();
        assert!(matches!(err, DbError::ColumnNotNullable(ref c) if c == "c"));
    }

    // ── Hash index behavior ──────────────────────────────────────────

    #[test]
    fn test_hash_index_equality_lookup() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        insert(&table, &session, 1, "a");
        insert(&table, &session, 2, "b");
        let index = table
            .add_index(
                &session,
                "t_c_hash",
                IndexId(10),
                vec![IndexColumn::asc(1)],
                IndexType::non_unique(true),
            )
            .unwrap();

        let probe = [Datum::Text("b".into())];
        let mut cursor = index
            .find(&session, Some(probe.as_slice()), Some(probe.as_slice()))
            .unwrap();
        assert!(cursor.next().unwrap());
        assert_eq!(cursor.get().unwrap().values[0], Datum::Int64(2));
        assert!(!cursor.next().unwrap());
    }

    #[test]
    fn test_hash_index_rejects_range_scan() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        let index = table
            .add_index(
                &session,
                "t_c_hash",
                IndexId(10),
                vec![IndexColumn::asc(1)],
                IndexType::non_unique(true),
            )
            .unwrap();
        let lo = [Datum::Text("a".into())];
        let hi = [Datum::Text("b".into())];
        let err = index
            .find(&session, Some(lo.as_slice()), Some(hi.as_slice()))
            .unwrap_err();
        assert!(matches!(err, DbError::UnsupportedScan(_)));
        let err = index.find(&session, None, None).unwrap_err();
        assert!(matches!(err, DbError::UnsupportedScan(_)));
    }

    #[test]
    fn test_unique_hash_index_rejects_duplicates() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        table
            .add_index(
                &session,
                "t_c_hash",
                IndexId(10),
                vec![IndexColumn::asc(1)],
                IndexType::unique(true),
            )
            .unwrap();
        insert(&table, &session, 1, "a");
        let err = table
            .add_row(&session, Row::new(vec![Datum::Int64(2), Datum::Text("a".into())]))
            .unwrap_err();
        assert!(matches!(err, DbError::DuplicateKey { .. }));
        assert_eq!(table.row_count(&session).unwrap(), 1);
    }

    // ── Secondary index scans ────────────────────────────────────────

    #[test]
    fn test_secondary_range_scan_orders_by_key() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        for (id, c) in [(1, "pear"), (2, "apple"), (3, "quince"), (4, "fig")] {
            insert(&table, &session, id, c);
        }
        let index = table
            .add_index(
                &session,
                "t_c",
                IndexId(10),
                vec![IndexColumn::asc(1)],
                IndexType::non_unique(false),
            )
            .unwrap();

        let mut seen = Vec::new();
        let mut cursor = index.find(&session, None, None).unwrap();
        while cursor.next().unwrap() {
            seen.push(cursor.get().unwrap().values[1].to_string());
        }
        assert_eq!(seen, vec!["'apple'", "'fig'", "'pear'", "'quince'"]);

        let lo = [Datum::Text("b".into())];
        let hi = [Datum::Text("pear".into())];
        let mut cursor = index
            .find(&session, Some(lo.as_slice()), Some(hi.as_slice()))
            .unwrap();
        let mut bounded = Vec::new();
        while cursor.next().unwrap() {
            bounded.push(cursor.get().unwrap().values[0].clone());
        }
        assert_eq!(bounded, vec![Datum::Int64(4), Datum::Int64(1)]);
    }

    #[test]
    fn test_descending_column_reverses_scan_order() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        for (id, c) in [(1, "a"), (2, "c"), (3, "b")] {
            insert(&table, &session, id, c);
        }
        let index = table
            .add_index(
                &session,
                "t_c_desc",
                IndexId(10),
                vec![IndexColumn::desc(1)],
                IndexType::non_unique(false),
            )
            .unwrap();
        let mut seen = Vec::new();
        let mut cursor = index.find(&session, None, None).unwrap();
        while cursor.next().unwrap() {
            seen.push(cursor.get().unwrap().values[1].to_string());
        }
        assert_eq!(seen, vec!["'c'", "'b'", "'a'"]);
    }

    #[test]
    fn test_cursor_fails_after_transaction_commit() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        insert(&table, &session, 1, "a");
        insert(&table, &session, 2, "b");
        let scan = table.get_scan_index().unwrap();
        let mut cursor = scan.find(&session, None, None).unwrap();
        assert!(cursor.next().unwrap());
        session.commit();
        let err = cursor.next().unwrap_err();
        assert!(matches!(err, DbError::TransactionClosed));
    }

    // ── Index builder ────────────────────────────────────────────────

    #[test]
    fn test_block_merge_rebuild_spills_and_merges() {
        let settings = DbSettings { analyze_auto: 0, max_memory_rows: 1000, ..DbSettings::default() };
        let (db, session) = setup_with(settings);
        let table = create_table(&db, &session, 1, "t");
        for i in 0..10_000i64 {
            // shuffle the insertion order so blocks really need sorting
            let v = (i * 7919) % 10_000;
            insert(&table, &session, v, &format!("c{v:05}"));
        }

        let temp_before: u64 = db.store().next_temporary_map_name()["temp.".len()..]
            .parse()
            .unwrap();
        let index = table
            .add_index(
                &session,
                "t_c",
                IndexId(10),
                vec![IndexColumn::asc(1)],
                IndexType::non_unique(false),
            )
            .unwrap();
        let temp_after: u64 = db.store().next_temporary_map_name()["temp.".len()..]
            .parse()
            .unwrap();

        assert_eq!(index.row_count(&session), 10_000);
        // 500-row blocks over 10k rows: at least 10 temporary maps
        assert!(temp_after - temp_before - 1 >= 10, "used {} temp maps", temp_after - temp_before - 1);
        // all temporary maps are gone again
        assert!(db.store().map_names().iter().all(|n| !n.starts_with("temp.")));
    }

    #[test]
    fn test_buffered_and_block_merge_builds_agree() {
        let (db, session) = setup();
        let mem = db
            .create_table(&session, test_schema(1, "mem", false))
            .unwrap();
        let disk = db
            .create_table(&session, test_schema(2, "disk", true))
            .unwrap();
        for (id, c) in [(5, "e"), (1, "a"), (4, "d"), (2, "b"), (3, "c")] {
            insert(&mem, &session, id, c);
            insert(&disk, &session, id, c);
        }
        let mem_index = mem
            .add_index(&session, "mem_c", IndexId(10), vec![IndexColumn::asc(1)], IndexType::non_unique(false))
            .unwrap();
        let disk_index = disk
            .add_index(&session, "disk_c", IndexId(11), vec![IndexColumn::asc(1)], IndexType::non_unique(false))
            .unwrap();

        let collect = |index: &Arc<TableIndex>| -> Vec<(Datum, RowId)> {
            let mut cursor = index.find(&session, None, None).unwrap();
            let mut out = Vec::new();
            while cursor.next().unwrap() {
                let row = cursor.get().unwrap();
                out.push((row.values[1].clone(), row.key));
            }
            out
        };
        assert_eq!(collect(&mem_index), collect(&disk_index));
        assert_eq!(mem_index.row_count(&session), 5);
    }

    #[test]
    fn test_failed_rebuild_removes_index_and_frees_name() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        insert(&table, &session, 1, "a");
        insert(&table, &session, 2, "a");

        let err = table
            .add_index(
                &session,
                "t_c_unique",
                IndexId(10),
                vec![IndexColumn::asc(1)],
                IndexType::unique(false),
            )
            .unwrap_err();
        assert!(matches!(err, DbError::DuplicateKey { .. }), "got {err}");
        // the failed index left no backing map and no schema object
        assert!(!db.store().has_map("index.10"));
        assert!(db.schema().remove_schema_object("t_c_unique").is_none());
        assert_eq!(table.get_indexes().len(), 1);
        // the name is free for the next attempt
        assert!(db.schema().reserve_unique_name("t_c_unique"));
    }

    #[test]
    fn test_build_progress_is_reported() {
        use std::sync::atomic::{AtomicU64, Ordering};

        struct Counter(Arc<AtomicU64>);
        impl crate::database::ProgressListener for Counter {
            fn index_build_progress(&self, target: &str, _current: u64, total: u64) {
                assert_eq!(target, "t:t_c");
                assert_eq!(total, 20);
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let (db, session) = setup();
        let calls = Arc::new(AtomicU64::new(0));
        db.set_progress_listener(Box::new(Counter(Arc::clone(&calls))));
        let table = create_table(&db, &session, 1, "t");
        for i in 0..20 {
            insert(&table, &session, i, "v");
        }
        table
            .add_index(&session, "t_c", IndexId(10), vec![IndexColumn::asc(1)], IndexType::non_unique(false))
            .unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 20);
    }

    // ── Analyze cadence ──────────────────────────────────────────────

    #[test]
    fn test_analyze_cadence_doubles() {
        let settings = DbSettings { analyze_auto: 100, analyze_sample: 1000, ..DbSettings::default() };
        let (db, session) = setup_with(settings);
        let table = create_table(&db, &session, 1, "t");

        for i in 0..101 {
            insert(&table, &session, i, "v");
        }
        assert_eq!(table.analyze_cadence(), 200, "analyze must have run exactly once");
        let stats = table.statistics().expect("statistics recorded");
        assert!(stats.sampled_rows > 0);

        for i in 101..301 {
            insert(&table, &session, i, "v");
        }
        assert_eq!(table.analyze_cadence(), 400, "analyze must have run a second time");
    }

    #[test]
    fn test_analyze_disabled_when_auto_is_zero() {
        let (db, session) = setup(); // analyze_auto = 0
        let table = create_table(&db, &session, 1, "t");
        for i in 0..50 {
            insert(&table, &session, i, "v");
        }
        assert!(table.statistics().is_none());
        assert_eq!(table.analyze_cadence(), 0);
    }

    #[test]
    fn test_analyze_statistics_content() {
        let settings = DbSettings { analyze_auto: 4, analyze_sample: 1000, ..DbSettings::default() };
        let (db, session) = setup_with(settings);
        let table = create_table(&db, &session, 1, "t");
        insert(&table, &session, 10, "a");
        insert(&table, &session, 30, "b");
        insert(&table, &session, 20, "a");
        table
            .add_row(&session, Row::new(vec![Datum::Int64(40), Datum::Null]))
            .unwrap();

        let stats = table.statistics().expect("statistics recorded");
        assert_eq!(stats.sampled_rows, 4);
        let id = &stats.columns[0];
        assert_eq!(id.null_count, 0);
        assert_eq!(id.distinct_count, 4);
        assert_eq!(id.min, Some(Datum::Int64(10)));
        assert_eq!(id.max, Some(Datum::Int64(40)));
        let c = &stats.columns[1];
        assert_eq!(c.null_count, 1);
        assert_eq!(c.distinct_count, 2);
    }

    // ── Truncate / drop policy ───────────────────────────────────────

    #[test]
    fn test_can_truncate_respects_incoming_references() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        assert!(table.can_truncate());
        table.add_constraint(Constraint::Referential {
            name: "fk_other_t".into(),
            ref_table: table.id(),
        });
        assert!(!table.can_truncate());
    }

    #[test]
    fn test_can_truncate_ignores_outgoing_references() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        table.add_constraint(Constraint::Referential {
            name: "fk_t_other".into(),
            ref_table: TableId(99),
        });
        assert!(table.can_truncate());
    }

    #[test]
    fn test_drop_table_releases_maps_and_schema_objects() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        insert(&table, &session, 1, "a");
        table
            .add_index(&session, "t_c", IndexId(10), vec![IndexColumn::asc(1)], IndexType::non_unique(false))
            .unwrap();
        assert!(db.store().has_map("index.1"));
        assert!(db.store().has_map("index.10"));

        db.drop_table(&session, TableId(1)).unwrap();
        assert!(!db.store().has_map("index.1"));
        assert!(!db.store().has_map("index.10"));
        assert!(matches!(db.get_table(TableId(1)), Err(DbError::TableNotFound(_))));
        assert!(db.schema().remove_schema_object("t_c").is_none());
    }

    // ── Locking fast paths (single session) ──────────────────────────

    #[test]
    fn test_reentrant_lock_is_a_noop() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        table.lock(&session, true, false).unwrap();
        table.lock(&session, true, false).unwrap();
        assert!(table.is_locked_exclusively_by(&session));
        table.unlock(&session);
        assert!(!table.is_locked_exclusively());
    }

    #[test]
    fn test_sole_shared_holder_upgrades_immediately() {
        let (db, session) = setup();
        let table = create_table(&db, &session, 1, "t");
        table.lock(&session, false, false).unwrap();
        assert_eq!(table.shared_lock_holders(), vec![session.id()]);
        table.lock(&session, true, false).unwrap();
        assert!(table.is_locked_exclusively_by(&session));
        // never in both holder sets
        assert!(table.shared_lock_holders().is_empty());
    }

    #[test]
    fn test_mvcc_downgrades_writes_and_skips_reads() {
        let settings = DbSettings { analyze_auto: 0, mvcc: true, ..DbSettings::default() };
        let (db, session) = setup_with(settings);
        let table = create_table(&db, &session, 1, "t");
        // a read acquires nothing
        table.lock(&session, false, false).unwrap();
        assert!(table.shared_lock_holders().is_empty());
        // a write takes a shared lock, not an exclusive one
        table.lock(&session, true, false).unwrap();
        assert!(!table.is_locked_exclusively());
        assert_eq!(table.shared_lock_holders(), vec![session.id()]);
        // forced exclusive stays exclusive
        table.unlock(&session);
        table.lock(&session, true, true).unwrap();
        assert!(table.is_locked_exclusively_by(&session));
    }

    #[test]
    fn test_read_committed_single_threaded_shared_is_free() {
        let settings = DbSettings {
            analyze_auto: 0,
            lock_mode: LockMode::ReadCommitted,
            multi_threaded: false,
            ..DbSettings::default()
        };
        let (db, session) = setup_with(settings);
        let table = create_table(&db, &session, 1, "t");
        table.lock(&session, false, false).unwrap();
        assert!(table.shared_lock_holders().is_empty());
        assert!(session.held_locks().is_empty());
    }

    #[test]
    fn test_lock_mode_off_never_locks() {
        let settings = DbSettings { analyze_auto: 0, lock_mode: LockMode::Off, ..DbSettings::default() };
        let (db, session) = setup_with(settings);
        let table = create_table(&db, &session, 1, "t");
        table.lock(&session, true, false).unwrap();
        assert!(!table.is_locked_exclusively());
    }

    // ── Session-temporary tables ─────────────────────────────────────

    #[test]
    fn test_session_temporary_index_is_not_schema_visible() {
        let (db, session) = setup();
        let mut schema = test_schema(1, "tmp", true);
        schema.temporary = true;
        let table = db.create_table(&session, schema).unwrap();
        table
            .add_index(&session, "tmp_c", IndexId(10), vec![IndexColumn::asc(1)], IndexType::non_unique(false))
            .unwrap();
        assert!(db.schema().remove_schema_object("tmp_c").is_none());
        assert_eq!(table.get_indexes().len(), 2);
    }
}
