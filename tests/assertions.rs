use rbdb::symbol::Variable;
use rbdb::{Database, Formula, Predicate, RbdbError, SqlValue, Term};

fn human_fact(name: &str) -> Formula {
    Formula::fact(Predicate::new("human", vec![Term::from(name)]))
}

#[test]
fn asserted_facts_show_up_in_the_view() {
    // Scenario: declare human(name), assert human("Socrates"), SELECT.
    let db = Database::open_in_memory().unwrap();
    db.sql("CREATE TABLE human(name)", Vec::new()).unwrap();
    db.assert(&human_fact("Socrates")).unwrap();
    let rows: Vec<_> = db.sql("SELECT * FROM human", Vec::new()).unwrap().collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("name"),
        Some(&SqlValue::from("Socrates".to_string()))
    );
}

#[test]
fn reasserting_the_same_fact_is_a_duplicate() {
    let db = Database::open_in_memory().unwrap();
    db.sql("CREATE TABLE human(name)", Vec::new()).unwrap();
    db.assert(&human_fact("Socrates")).unwrap();
    match db.assert(&human_fact("Socrates")) {
        Err(RbdbError::DuplicateAssertion) => {}
        other => panic!("expected DuplicateAssertion, got {:?}", other),
    }
}

#[test]
fn sql_inserts_and_assertions_store_identical_encodings() {
    // The INSTEAD-OF-INSERT trigger and the assertion coordinator must
    // agree byte for byte, or uniqueness could not catch cross-surface
    // duplicates.
    let db = Database::open_in_memory().unwrap();
    db.sql("CREATE TABLE human(name)", Vec::new()).unwrap();
    db.sql("INSERT INTO human VALUES ('Socrates')", Vec::new())
        .unwrap();
    match db.assert(&human_fact("Socrates")) {
        Err(RbdbError::DuplicateAssertion) => {}
        other => panic!("expected DuplicateAssertion, got {:?}", other),
    }
}

#[test]
fn asserting_to_an_undeclared_predicate_fails() {
    let db = Database::open_in_memory().unwrap();
    match db.assert(&human_fact("Socrates")) {
        Err(RbdbError::UnknownPredicate(name)) => assert_eq!(name, "human"),
        other => panic!("expected UnknownPredicate, got {:?}", other),
    }
}

#[test]
fn unsafe_rules_are_rejected() {
    // Scenario: mortal(X, Y) :- human(X) leaves Y free.
    let db = Database::open_in_memory().unwrap();
    db.sql(
        "CREATE TABLE human(name); CREATE TABLE mortal(name, age)",
        Vec::new(),
    )
    .unwrap();
    let x = Variable::fresh();
    let y = Variable::fresh();
    let unsafe_rule = Formula::rule(
        Predicate::new("mortal", vec![Term::from(x), Term::from(y)]),
        vec![Predicate::new("human", vec![Term::from(x)])],
    );
    match db.assert(&unsafe_rule) {
        Err(RbdbError::UnsafeVariables(names)) => assert_eq!(names, vec!["B".to_string()]),
        other => panic!("expected UnsafeVariables, got {:?}", other),
    }
}

#[test]
fn failed_assertions_leak_no_entity() {
    let db = Database::open_in_memory().unwrap();
    db.sql("CREATE TABLE human(name)", Vec::new()).unwrap();
    db.assert(&human_fact("Socrates")).unwrap();
    let before = {
        let mut cursor = db
            .sql("SELECT count(*) AS n FROM _entity", Vec::new())
            .unwrap();
        cursor.next().unwrap().get("n").unwrap().clone()
    };
    let _ = db.assert(&human_fact("Socrates"));
    let after = {
        let mut cursor = db
            .sql("SELECT count(*) AS n FROM _entity", Vec::new())
            .unwrap();
        cursor.next().unwrap().get("n").unwrap().clone()
    };
    assert_eq!(before, after);
}

#[test]
fn numbers_and_booleans_are_assertable() {
    let db = Database::open_in_memory().unwrap();
    db.sql("CREATE TABLE reading(sensor, value, valid)", Vec::new())
        .unwrap();
    db.assert(&Formula::fact(Predicate::new(
        "reading",
        vec![Term::from("t0"), Term::from(21.5), Term::from(true)],
    )))
    .unwrap();
    let rows: Vec<_> = db
        .sql("SELECT * FROM reading", Vec::new())
        .unwrap()
        .collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("value"), Some(&SqlValue::Real(21.5)));
    // Booleans surface as the engine's 0/1.
    assert_eq!(rows[0].get("valid"), Some(&SqlValue::Integer(1)));
}
