use rbdb::{Database, RbdbError, SqlValue};

fn count(db: &Database, sql: &str) -> i64 {
    let mut cursor = db.sql(sql, Vec::new()).expect("count query");
    match cursor.next().expect("one row").values()[0] {
        SqlValue::Integer(count) => count,
        ref other => panic!("expected an integer count, got {:?}", other),
    }
}

#[test]
fn declaration_records_the_predicate_and_one_entity() {
    let db = Database::open_in_memory().unwrap();
    let before = count(&db, "SELECT count(*) FROM _entity");
    db.sql("CREATE TABLE human(name)", Vec::new()).unwrap();
    assert_eq!(count(&db, "SELECT count(*) FROM _entity"), before + 1);
    assert_eq!(
        count(&db, "SELECT count(*) FROM _predicate WHERE name = 'human'"),
        1
    );
    let mut cursor = db
        .sql(
            "SELECT json(column_names) AS columns FROM _predicate WHERE name = 'human'",
            Vec::new(),
        )
        .unwrap();
    let row = cursor.next().unwrap();
    assert_eq!(
        row.get("columns"),
        Some(&SqlValue::from(r#"["name"]"#.to_string()))
    );
}

#[test]
fn no_physical_table_is_created() {
    let db = Database::open_in_memory().unwrap();
    db.sql("CREATE TABLE human(name)", Vec::new()).unwrap();
    assert_eq!(
        count(
            &db,
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'human'"
        ),
        0
    );
    // What SELECT sees is the session view, present right after declaration.
    assert_eq!(
        count(
            &db,
            "SELECT count(*) FROM sqlite_temp_master WHERE type = 'view' AND name = 'human'"
        ),
        1
    );
    assert_eq!(count(&db, "SELECT count(*) FROM human"), 0);
}

#[test]
fn if_not_exists_duplicate_leaks_no_entity() {
    let db = Database::open_in_memory().unwrap();
    db.sql("CREATE TABLE human(name)", Vec::new()).unwrap();
    let before = count(&db, "SELECT count(*) FROM _entity");
    db.sql("CREATE TABLE IF NOT EXISTS human(name)", Vec::new())
        .unwrap();
    assert_eq!(count(&db, "SELECT count(*) FROM _entity"), before);
    assert_eq!(
        count(&db, "SELECT count(*) FROM _predicate WHERE name = 'human'"),
        1
    );
}

#[test]
fn plain_duplicate_declaration_raises() {
    let db = Database::open_in_memory().unwrap();
    db.sql("CREATE TABLE human(name)", Vec::new()).unwrap();
    assert!(db.sql("CREATE TABLE human(name)", Vec::new()).is_err());
}

#[test]
fn table_names_are_lowercased_and_unwrapped() {
    let db = Database::open_in_memory().unwrap();
    db.sql(r#"CREATE TABLE "Human"(name)"#, Vec::new()).unwrap();
    assert_eq!(
        count(&db, "SELECT count(*) FROM _predicate WHERE name = 'human'"),
        1
    );
}

#[test]
fn table_constraints_are_discarded() {
    let db = Database::open_in_memory().unwrap();
    db.sql(
        "CREATE TABLE score(
            player TEXT NOT NULL,
            points INTEGER,
            PRIMARY KEY (player),
            UNIQUE (points),
            CHECK (points >= 0),
            CONSTRAINT named UNIQUE (player, points),
            FOREIGN KEY (player) REFERENCES human (name)
        )",
        Vec::new(),
    )
    .unwrap();
    let mut cursor = db
        .sql(
            "SELECT json(column_names) AS columns FROM _predicate WHERE name = 'score'",
            Vec::new(),
        )
        .unwrap();
    let row = cursor.next().unwrap();
    assert_eq!(
        row.get("columns"),
        Some(&SqlValue::from(r#"["player","points"]"#.to_string()))
    );
}

#[test]
fn quoted_column_names_are_rejected() {
    let db = Database::open_in_memory().unwrap();
    match db.sql(r#"CREATE TABLE human("name")"#, Vec::new()) {
        Err(RbdbError::QuotedColumnNotSupported) => {}
        other => panic!("expected QuotedColumnNotSupported, got {:?}", other),
    }
}

#[test]
fn comments_do_not_defeat_recognition() {
    let db = Database::open_in_memory().unwrap();
    db.sql(
        "create /* predicates are tables */ table -- really\n human(name)",
        Vec::new(),
    )
    .unwrap();
    assert_eq!(
        count(&db, "SELECT count(*) FROM _predicate WHERE name = 'human'"),
        1
    );
}

#[test]
fn other_statements_pass_through_untouched() {
    let db = Database::open_in_memory().unwrap();
    // An index on the rule store is ordinary SQL and must reach the engine.
    db.sql(
        "CREATE INDEX IF NOT EXISTS _rule_by_id ON _rule(id)",
        Vec::new(),
    )
    .unwrap();
}
