//! Persist pipeline tests against SQLite.

use rowgraph_core::persist::OperationType;
use rowgraph_core::{Capabilities, Dialect, PessimisticValidation, SqlValue};
use rowgraph_testkit::init_tracing;
use rowgraph_testkit::prelude::*;
use rust_decimal::Decimal;

fn new_author(ctx: &mut EntityContext, id: i64, name: &str) -> EntityId {
    let author = ctx.new_entity("Author").unwrap();
    ctx.set_value(author, "id", id).unwrap();
    ctx.set_value(author, "name", name).unwrap();
    author
}

fn new_book(ctx: &mut EntityContext, author: EntityId, title: &str) -> EntityId {
    let book = ctx.new_entity("Book").unwrap();
    ctx.set_value(book, "title", title).unwrap();
    ctx.add_to_many(author, "books", book).unwrap();
    book
}

fn load_author(ctx: &mut EntityContext, id: i64) -> EntityId {
    let mut query = ctx.environment().query("Author");
    let key = query.prop("id");
    query.filter(key.eq(id));
    ctx.perform_query(&query).unwrap().first().unwrap()
}

#[test]
fn insert_marks_entities_loaded() {
    init_tracing();
    let env = TestEnvironment::memory();
    let mut ctx = env.context();
    let author = new_author(&mut ctx, 1, "Ursula");

    let result = ctx.persist(PersistRequest::new().insert(author)).unwrap();
    assert_eq!(result.inserted(), 1);
    assert_eq!(env.count("AUTHOR"), 1);

    let entity = ctx.entity(author).unwrap();
    assert_eq!(entity.state(), EntityState::Loaded);
    assert!(entity.constraints().must_exist_in_db);
    assert!(matches!(entity.lock_value(), Some(Value::Long(_))));
}

#[test]
fn referenced_rows_are_inserted_first() {
    let env = TestEnvironment::memory();
    let mut ctx = env.context();
    let author = new_author(&mut ctx, 1, "Ursula");
    let book = ctx.new_entity("Book").unwrap();
    ctx.set_value(book, "title", "The Dispossessed").unwrap();
    ctx.set_reference(book, "author", Some(author)).unwrap();

    // book requested first; the foreign key forces the author ahead
    let result = ctx
        .persist(PersistRequest::new().insert(book).insert(author))
        .unwrap();
    assert_eq!(result.inserted(), 2);

    let dml = env.log.dml();
    assert!(dml[0].starts_with("insert into AUTHOR"), "{dml:?}");
    assert!(dml[1].starts_with("insert into BOOK"), "{dml:?}");

    let rows = env.query("select AUTHOR_ID from BOOK", &[]);
    assert_eq!(rows.value(0, 0), Some(&SqlValue::Integer(1)));
}

#[test]
fn framework_keys_count_up() {
    let env = TestEnvironment::memory();
    env.execute("insert into AUTHOR (ID, NAME) values (1, 'Ursula')", &[]);
    env.execute("insert into BOOK (ID, TITLE, AUTHOR_ID) values (7, 'Lathe', 1)", &[]);

    let mut ctx = env.context();
    let author = load_author(&mut ctx, 1);
    let first = ctx.new_entity("Book").unwrap();
    ctx.set_value(first, "title", "Earthsea").unwrap();
    ctx.set_reference(first, "author", Some(author)).unwrap();
    let second = ctx.new_entity("Book").unwrap();
    ctx.set_value(second, "title", "Tehanu").unwrap();
    ctx.set_reference(second, "author", Some(author)).unwrap();

    ctx.persist(PersistRequest::new().insert(first).insert(second)).unwrap();
    assert_eq!(ctx.entity(first).unwrap().key(), Some(&Value::Long(8)));
    assert_eq!(ctx.entity(second).unwrap().key(), Some(&Value::Long(9)));
    assert_eq!(ctx.find("Book", &Value::Long(9)), Some(second));
}

#[test]
fn missing_key_without_generation_is_rejected() {
    let env = TestEnvironment::memory();
    let mut ctx = env.context();
    let author = ctx.new_entity("Author").unwrap();
    ctx.set_value(author, "name", "Anonymous").unwrap();

    let err = ctx.persist(PersistRequest::new().insert(author)).unwrap_err();
    assert!(matches!(err, CoreError::SortPersist { .. }), "{err}");
    assert_eq!(env.count("AUTHOR"), 0);
}

#[test]
fn unsaved_reference_target_is_rejected() {
    let env = TestEnvironment::memory();
    let mut ctx = env.context();
    let author = new_author(&mut ctx, 1, "Ursula");
    let book = ctx.new_entity("Book").unwrap();
    ctx.set_value(book, "title", "Orphan").unwrap();
    ctx.set_reference(book, "author", Some(author)).unwrap();

    let err = ctx.persist(PersistRequest::new().insert(book)).unwrap_err();
    assert!(matches!(err, CoreError::SortPersist { .. }), "{err}");
    assert_eq!(env.count("BOOK"), 0);
}

#[test]
fn save_creates_owned_children() {
    let env = TestEnvironment::memory();
    let mut ctx = env.context();
    let author = new_author(&mut ctx, 1, "Ursula");
    new_book(&mut ctx, author, "Earthsea");
    new_book(&mut ctx, author, "Tehanu");

    let result = ctx.persist(PersistRequest::new().save(author)).unwrap();
    assert_eq!(result.inserted(), 3);
    assert_eq!(env.count("BOOK"), 2);
}

#[test]
fn second_persist_writes_nothing() {
    let env = TestEnvironment::memory();
    let mut ctx = env.context();
    let author = new_author(&mut ctx, 1, "Ursula");
    new_book(&mut ctx, author, "Earthsea");
    ctx.persist(PersistRequest::new().save(author)).unwrap();

    env.log.clear();
    let result = ctx.persist(PersistRequest::new().save(author)).unwrap();
    assert_eq!(result.statements(), 0);
    assert!(result.audit().is_empty());
    assert!(env.log.dml().is_empty(), "{:?}", env.log.dml());
}

#[test]
fn narrow_keys_keep_one_entity_per_row() {
    let env = TestEnvironment::memory();
    let mut ctx = env.context();
    let author = ctx.new_entity("Author").unwrap();
    ctx.set_value(author, "id", 1_i32).unwrap();
    ctx.set_value(author, "name", "Ursula").unwrap();
    assert_eq!(ctx.entity(author).unwrap().key(), Some(&Value::Long(1)));
    ctx.persist(PersistRequest::new().insert(author)).unwrap();

    assert_eq!(load_author(&mut ctx, 1), author);
    assert_eq!(ctx.find("Author", &Value::Long(1)), Some(author));
    assert_eq!(ctx.find("Author", &Value::Integer(1)), Some(author));
    assert_eq!(ctx.new_entity_with_key("Author", 1_i32).unwrap(), author);

    // reassigning the same key in the narrow type is not a change
    env.log.clear();
    ctx.set_value(author, "id", 1_i32).unwrap();
    let result = ctx.persist(PersistRequest::new().save(author)).unwrap();
    assert_eq!(result.updated(), 0);
    assert!(env.log.dml().is_empty(), "{:?}", env.log.dml());

    let err = ctx.set_value(author, "name", 5_i32).unwrap_err();
    assert!(matches!(err, CoreError::TypeConversion { .. }), "{err}");
    assert_eq!(ctx.entity(author).unwrap().value("name"), Some(&Value::from("Ursula")));
}

#[test]
fn update_writes_changed_rows_only() {
    let env = TestEnvironment::memory();
    let mut ctx = env.context();
    let first = new_author(&mut ctx, 1, "Ursula");
    let second = new_author(&mut ctx, 2, "Octavia");
    ctx.persist(PersistRequest::new().insert(first).insert(second)).unwrap();
    let stamp = ctx.entity(first).unwrap().lock_value().cloned().unwrap();

    ctx.set_value(first, "name", "Ursula K.").unwrap();
    let result = ctx
        .persist(PersistRequest::new().update(first).update(second))
        .unwrap();
    assert_eq!(result.updated(), 1);

    let rows = env.query("select NAME, VERSION from AUTHOR where ID = 1", &[]);
    assert_eq!(rows.value(0, 0), Some(&SqlValue::from("Ursula K.")));
    let written = rows.value(0, 1).and_then(SqlValue::as_i64).unwrap();
    assert!(Value::Long(written) > stamp);
    assert_eq!(ctx.entity(first).unwrap().lock_value(), Some(&Value::Long(written)));
}

#[test]
fn counter_locks_increment() {
    let env = TestEnvironment::memory();
    let mut ctx = env.context();
    let publisher = ctx.new_entity("Publisher").unwrap();
    ctx.set_value(publisher, "id", 1i64).unwrap();
    ctx.set_value(publisher, "name", "Ace").unwrap();
    ctx.persist(PersistRequest::new().insert(publisher)).unwrap();
    assert_eq!(ctx.entity(publisher).unwrap().lock_value(), Some(&Value::Integer(1)));

    ctx.set_value(publisher, "name", "Ace Books").unwrap();
    ctx.persist(PersistRequest::new().update(publisher)).unwrap();
    assert_eq!(ctx.entity(publisher).unwrap().lock_value(), Some(&Value::Integer(2)));
    let rows = env.query("select VERSION from PUBLISHER", &[]);
    assert_eq!(rows.value(0, 0), Some(&SqlValue::Integer(2)));
}

#[test]
fn stale_update_is_rejected() {
    let env = TestEnvironment::memory();
    env.execute("insert into AUTHOR (ID, NAME, VERSION) values (1, 'Ursula', 100)", &[]);

    let mut first = env.context();
    let mut second = env.context();
    let a = load_author(&mut first, 1);
    let b = load_author(&mut second, 1);

    second.set_value(b, "name", "Second").unwrap();
    second.persist(PersistRequest::new().update(b)).unwrap();

    first.set_value(a, "name", "First").unwrap();
    let err = first.persist(PersistRequest::new().update(a)).unwrap_err();
    match &err {
        CoreError::OptimisticLockMismatch { expected, .. } => assert_eq!(expected, &Value::Long(100)),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_concurrency_error());

    let rows = env.query("select NAME from AUTHOR", &[]);
    assert_eq!(rows.value(0, 0), Some(&SqlValue::from("Second")));
}

#[test]
fn update_of_deleted_row_reports_missing() {
    let env = TestEnvironment::memory();
    env.execute("insert into AUTHOR (ID, NAME) values (1, 'Ursula')", &[]);
    let mut ctx = env.context();
    let author = load_author(&mut ctx, 1);
    env.execute("delete from AUTHOR", &[]);

    ctx.set_value(author, "name", "Gone").unwrap();
    let err = ctx.persist(PersistRequest::new().update(author)).unwrap_err();
    assert!(matches!(err, CoreError::EntityMissing { .. }), "{err}");
}

/// Changes author 1 on the persist transaction right after the first
/// snapshot select of `AUTHOR` returns.
fn after_author_snapshot(env: &TestEnvironment, sql: &'static str) {
    let mut fired = false;
    env.after_query(Box::new(move |query, conn| {
        if !fired && query.contains("from AUTHOR t0 where (") {
            fired = true;
            conn.execute(sql, &[])?;
        }
        Ok(())
    }));
}

#[test]
fn row_changed_after_snapshot_fails_the_update() {
    let env = TestEnvironment::memory();
    env.execute("insert into AUTHOR (ID, NAME, VERSION) values (1, 'Ursula', 10)", &[]);
    let mut ctx = env.context();
    let author = load_author(&mut ctx, 1);
    ctx.set_value(author, "name", "Changed").unwrap();
    after_author_snapshot(&env, "update AUTHOR set VERSION = 11 where ID = 1");
    env.log.clear();

    let err = ctx.persist(PersistRequest::new().update(author)).unwrap_err();
    match &err {
        CoreError::OptimisticLockMismatch { entity, expected, actual, .. } => {
            assert_eq!(*entity, author);
            assert_eq!(expected, &Value::Long(10));
            assert_eq!(actual, &Value::Long(11));
        }
        other => panic!("unexpected error: {other}"),
    }

    // the one update matched nothing and the transaction was rolled back
    let dml = env.log.dml();
    assert_eq!(dml.len(), 1, "{dml:?}");
    assert!(dml[0].starts_with("update AUTHOR"), "{dml:?}");
    let rows = env.query("select NAME, VERSION from AUTHOR where ID = 1", &[]);
    assert_eq!(rows.value(0, 0), Some(&SqlValue::from("Ursula")));
    assert_eq!(rows.value(0, 1), Some(&SqlValue::Integer(10)));
    assert_eq!(ctx.entity(author).unwrap().lock_value(), Some(&Value::Long(10)));
}

#[test]
fn row_removed_after_snapshot_fails_the_delete() {
    let env = TestEnvironment::memory();
    env.execute("insert into AUTHOR (ID, NAME, VERSION) values (1, 'Ursula', 10)", &[]);
    let mut ctx = env.context();
    let author = load_author(&mut ctx, 1);
    after_author_snapshot(&env, "delete from AUTHOR where ID = 1");
    env.log.clear();

    let err = ctx.persist(PersistRequest::new().delete(author)).unwrap_err();
    match &err {
        CoreError::EntityMissing { entity, key, .. } => {
            assert_eq!(*entity, author);
            assert_eq!(key, &Value::Long(1));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_concurrency_error());

    let dml = env.log.dml();
    assert_eq!(dml.len(), 1, "{dml:?}");
    assert!(dml[0].starts_with("delete from AUTHOR"), "{dml:?}");
    assert_eq!(env.count("AUTHOR"), 1);
    assert_eq!(ctx.entity(author).unwrap().state(), EntityState::Loaded);
}

#[test]
fn snapshot_selects_are_chunked() {
    let env = TestEnvironment::builder()
        .config(Config::new().max_batch_conditions(2))
        .build();
    for id in 1..=5 {
        env.execute(
            "insert into AUTHOR (ID, NAME, VERSION) values (?, ?, 1)",
            &[SqlValue::Integer(id), SqlValue::from(format!("Author {id}"))],
        );
    }
    let mut ctx = env.context();
    let mut request = PersistRequest::new();
    for id in 1..=5 {
        let author = load_author(&mut ctx, id);
        ctx.set_value(author, "name", format!("Renamed {id}")).unwrap();
        request = request.update(author);
    }
    env.log.clear();

    let result = ctx.persist(request).unwrap();
    assert_eq!(result.updated(), 5);

    let selects: Vec<String> = env
        .log
        .queries()
        .into_iter()
        .filter(|q| q.contains("from AUTHOR t0 where ("))
        .collect();
    assert_eq!(selects.len(), 3, "{selects:?}");
    let conditions: Vec<usize> = selects.iter().map(|q| q.matches('?').count()).collect();
    assert_eq!(conditions, vec![2, 2, 1]);
}

#[test]
fn snapshot_locks_referenced_rows_first() {
    let env = TestEnvironment::memory();
    env.execute("insert into PUBLISHER (ID, NAME, VERSION) values (1, 'Ace', 1)", &[]);
    env.execute("insert into AUTHOR (ID, NAME, VERSION) values (1, 'Ursula', 1)", &[]);
    env.execute(
        "insert into BOOK (ID, TITLE, AUTHOR_ID, PUBLISHER_ID) values (1, 'Lathe', 1, 1)",
        &[],
    );
    let mut ctx = env.context();
    let mut query = ctx.environment().query("Publisher");
    let key = query.prop("id");
    query.filter(key.eq(1_i64));
    let publisher = ctx.perform_query(&query).unwrap().first().unwrap();
    let author = load_author(&mut ctx, 1);
    ctx.set_value(publisher, "name", "Ace Books").unwrap();
    env.log.clear();

    // the book is deleted ahead of its author but read after both rows
    // it references
    let result = ctx
        .persist(PersistRequest::new().update(publisher).delete(author))
        .unwrap();
    assert_eq!(result.updated(), 1);
    assert_eq!(result.deleted(), 2);

    let tables: Vec<String> = env
        .log
        .queries()
        .iter()
        .filter(|q| q.contains("t0 where (t0.ID = ?"))
        .filter_map(|q| q.split(" from ").nth(1))
        .filter_map(|rest| rest.split(' ').next())
        .map(str::to_string)
        .collect();
    assert_eq!(tables, vec!["PUBLISHER", "AUTHOR", "BOOK"]);
}

#[test]
fn duplicate_insert_rolls_back_the_batch() {
    let env = TestEnvironment::memory();
    env.execute("insert into AUTHOR (ID, NAME) values (1, 'Ursula')", &[]);
    let mut ctx = env.context();
    let fresh = new_author(&mut ctx, 5, "Octavia");
    let duplicate = new_author(&mut ctx, 1, "Impostor");

    let err = ctx
        .persist(PersistRequest::new().insert(fresh).insert(duplicate))
        .unwrap_err();
    match err {
        CoreError::PrimaryKeyExists { entity, key, .. } => {
            assert_eq!(entity, duplicate);
            assert_eq!(key, Value::Long(1));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(env.count("AUTHOR"), 1);
    assert_eq!(ctx.entity(fresh).unwrap().state(), EntityState::NotInDb);
}

#[test]
fn delete_cascades_to_owned_children() {
    let env = TestEnvironment::memory();
    let mut ctx = env.context();
    let author = new_author(&mut ctx, 1, "Ursula");
    new_book(&mut ctx, author, "Earthsea");
    new_book(&mut ctx, author, "Tehanu");
    ctx.persist(PersistRequest::new().save(author)).unwrap();

    let mut ctx = env.context();
    let author = load_author(&mut ctx, 1);
    env.log.clear();
    let result = ctx.persist(PersistRequest::new().delete(author)).unwrap();
    assert_eq!(result.deleted(), 3);
    assert_eq!(env.count("BOOK"), 0);
    assert_eq!(env.count("AUTHOR"), 0);

    // children go before the row they reference
    let dml = env.log.dml();
    assert!(dml.last().unwrap().starts_with("delete from AUTHOR"), "{dml:?}");
    assert_eq!(ctx.entity(author).unwrap().state(), EntityState::NotInDb);
    assert_eq!(ctx.find("Author", &Value::Long(1)), None);
}

#[test]
fn removed_children_are_deleted() {
    let env = TestEnvironment::memory();
    let mut ctx = env.context();
    let author = new_author(&mut ctx, 1, "Ursula");
    new_book(&mut ctx, author, "Earthsea");
    new_book(&mut ctx, author, "Tehanu");
    ctx.persist(PersistRequest::new().save(author)).unwrap();

    let mut ctx = env.context();
    let author = load_author(&mut ctx, 1);
    ctx.fetch(author, "books").unwrap();
    let books = ctx.entity(author).unwrap().to_many("books").unwrap().entities().to_vec();
    assert_eq!(books.len(), 2);
    assert_eq!(ctx.entity(books[0]).unwrap().value("title"), Some(&Value::from("Earthsea")));

    ctx.remove_from_many(author, "books", books[0]).unwrap();
    let result = ctx.persist(PersistRequest::new().save(author)).unwrap();
    assert_eq!(result.deleted(), 1);
    // the owner's lock moves with its unlocked children
    assert_eq!(result.updated(), 1);
    let rows = env.query("select TITLE from BOOK", &[]);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows.value(0, 0), Some(&SqlValue::from("Tehanu")));
}

#[test]
fn save_classifies_by_existence() {
    let env = TestEnvironment::memory();
    env.execute("insert into AUTHOR (ID, NAME) values (1, 'Ursula')", &[]);
    let mut ctx = env.context();

    let existing = ctx.new_entity_with_key("Author", 1i64).unwrap();
    ctx.set_value(existing, "name", "Ursula K.").unwrap();
    let missing = ctx.new_entity_with_key("Author", 2i64).unwrap();
    ctx.set_value(missing, "name", "Octavia").unwrap();

    let result = ctx
        .persist(PersistRequest::new().save(existing).save(missing))
        .unwrap();
    assert_eq!(result.updated(), 1);
    assert_eq!(result.inserted(), 1);

    let rows = env.query("select NAME from AUTHOR order by ID", &[]);
    assert_eq!(rows.value(0, 0), Some(&SqlValue::from("Ursula K.")));
    assert_eq!(rows.value(1, 0), Some(&SqlValue::from("Octavia")));
}

#[test]
fn contradicting_operations_are_rejected() {
    let env = TestEnvironment::memory();
    let mut ctx = env.context();
    let author = new_author(&mut ctx, 1, "Ursula");

    let err = ctx
        .persist(PersistRequest::new().insert(author).delete(author))
        .unwrap_err();
    assert!(matches!(err, CoreError::SortPersist { .. }), "{err}");

    let err = ctx.persist(PersistRequest::new().update(author)).unwrap_err();
    assert!(matches!(err, CoreError::SortPersist { .. }), "{err}");
}

#[test]
fn depends_on_validates_unwritten_rows() {
    let env = TestEnvironment::memory();
    env.execute("insert into AUTHOR (ID, NAME, VERSION) values (1, 'Ursula', 5)", &[]);
    let mut ctx = env.context();
    let author = load_author(&mut ctx, 1);
    env.execute("update AUTHOR set VERSION = 6", &[]);

    let book = ctx.new_entity("Book").unwrap();
    ctx.set_value(book, "title", "Late").unwrap();
    ctx.set_reference(book, "author", Some(author)).unwrap();
    let err = ctx
        .persist(PersistRequest::new().insert(book).depends_on(author))
        .unwrap_err();
    assert!(matches!(err, CoreError::OptimisticLockMismatch { .. }), "{err}");
    assert_eq!(env.count("BOOK"), 0);
}

#[test]
fn audit_records_reach_the_auditor() {
    let env = TestEnvironment::memory();
    let mut ctx = env.context();
    let author = new_author(&mut ctx, 1, "Ursula");
    let result = ctx.persist(PersistRequest::new().insert(author)).unwrap();

    let record = result.audit().record(author).unwrap();
    assert_eq!(record.operation, OperationType::Insert);
    assert_eq!(record.key, Value::Long(1));
    assert_eq!(record.change("name").unwrap().new, Value::from("Ursula"));
    assert_eq!(record.changes.last().unwrap().node, "version");

    ctx.set_value(author, "name", "Ursula K.").unwrap();
    ctx.persist(PersistRequest::new().update(author)).unwrap();

    let records = env.auditor.take();
    assert_eq!(records.len(), 2);
    let update = &records[1];
    assert_eq!(update.operation, OperationType::Update);
    let change = update.change("name").unwrap();
    assert_eq!(change.old, Value::from("Ursula"));
    assert_eq!(change.new, Value::from("Ursula K."));
    assert!(update.change("born").is_none());

    let json = serde_json::to_value(update).unwrap();
    assert_eq!(json["operation"], "update");
}

#[test]
fn disabled_audit_skips_the_auditor() {
    let env = TestEnvironment::builder()
        .config(Config::new().audit_enabled(false))
        .build();
    let mut ctx = env.context();
    let author = new_author(&mut ctx, 1, "Ursula");
    let result = ctx.persist(PersistRequest::new().insert(author)).unwrap();
    assert_eq!(result.audit().len(), 1);
    assert!(env.auditor.records().is_empty());
}

#[test]
fn pessimistic_validation_without_lock_support_still_persists() {
    let env = TestEnvironment::builder()
        .config(Config::new().pessimistic_validation(PessimisticValidation::Always))
        .build();
    let mut ctx = env.context();
    let author = new_author(&mut ctx, 1, "Ursula");
    ctx.persist(PersistRequest::new().insert(author)).unwrap();
    ctx.set_value(author, "name", "Ursula K.").unwrap();
    let result = ctx.persist(PersistRequest::new().update(author)).unwrap();
    assert_eq!(result.updated(), 1);
    assert!(env.log.queries().iter().all(|q| !q.contains("for update")));
}

#[test]
fn snapshot_waits_for_row_locks_where_supported() {
    for (config, clause) in [
        (Config::new(), "for update wait 10"),
        (Config::new().lock_wait_seconds(None), "for update"),
    ] {
        let env = TestEnvironment::builder()
            .config(config)
            .capabilities(Capabilities::for_dialect(Dialect::Oracle))
            .build();
        env.execute("insert into AUTHOR (ID, NAME, VERSION) values (1, 'Ursula', 1)", &[]);
        let mut ctx = env.context();
        let author = load_author(&mut ctx, 1);
        ctx.set_value(author, "name", "Ursula K.").unwrap();
        env.log.clear();

        // no update counts, so validation locks the rows it reads; SQLite
        // rejects the clause
        let err = ctx.persist(PersistRequest::new().update(author)).unwrap_err();
        assert!(matches!(err, CoreError::Sql(_)), "{err}");
        let queries = env.log.queries();
        assert_eq!(queries.len(), 1, "{queries:?}");
        assert!(queries[0].contains("from AUTHOR t0 where (t0.ID = ?)"), "{queries:?}");
        assert!(queries[0].ends_with(clause), "{queries:?}");
        assert!(env.log.dml().is_empty());
    }
}

#[test]
fn explicit_transaction_commits_on_demand() {
    let env = TestEnvironment::builder()
        .file()
        .config(Config::new().autocommit(false))
        .build();
    let mut ctx = env.context();
    assert!(!ctx.is_autocommit());
    let author = new_author(&mut ctx, 1, "Ursula");
    ctx.persist(PersistRequest::new().insert(author)).unwrap();
    assert!(ctx.in_transaction());
    assert_eq!(env.count("AUTHOR"), 0);

    ctx.commit().unwrap();
    assert!(!ctx.in_transaction());
    assert_eq!(env.count("AUTHOR"), 1);
}

#[test]
fn explicit_transaction_rolls_back() {
    let env = TestEnvironment::builder()
        .file()
        .config(Config::new().autocommit(false))
        .build();
    let mut ctx = env.context();
    let author = new_author(&mut ctx, 1, "Ursula");
    ctx.persist(PersistRequest::new().insert(author)).unwrap();
    ctx.rollback().unwrap();
    assert_eq!(env.count("AUTHOR"), 0);
}

#[test]
fn discriminated_entities_insert_with_fixed_values() {
    let env = TestEnvironment::memory();
    let mut ctx = env.context();
    let circle = ctx.new_entity("Circle").unwrap();
    ctx.set_value(circle, "id", 1i64).unwrap();
    ctx.set_value(circle, "radius", Decimal::new(25, 1)).unwrap();
    assert!(ctx.set_value(circle, "kind", "S").is_err());
    assert!(ctx.new_entity("Shape").is_err());

    ctx.persist(PersistRequest::new().insert(circle)).unwrap();
    let rows = env.query("select KIND, RADIUS from SHAPE", &[]);
    assert_eq!(rows.value(0, 0), Some(&SqlValue::from("C")));
    assert_eq!(rows.value(0, 1), Some(&SqlValue::from("2.5")));
}
