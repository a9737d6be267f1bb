use rbdb::symbol::Variable;
use rbdb::{Database, Formula, Predicate, SqlValue, Term};

fn text(value: &str) -> SqlValue {
    SqlValue::from(value.to_string())
}

#[test]
fn rules_derive_through_the_view() {
    // Scenario: mortal(X) :- human(X); the rule assertion drops the stale
    // mortal view and the next read rebuilds it with the rule included.
    let db = Database::open_in_memory().unwrap();
    db.sql(
        "CREATE TABLE human(name); CREATE TABLE mortal(name)",
        Vec::new(),
    )
    .unwrap();
    db.sql("INSERT INTO human VALUES ('Socrates')", Vec::new())
        .unwrap();
    let x = Variable::fresh();
    db.assert(&Formula::rule(
        Predicate::new("mortal", vec![Term::from(x)]),
        vec![Predicate::new("human", vec![Term::from(x)])],
    ))
    .unwrap();
    let rows: Vec<_> = db
        .sql("SELECT * FROM mortal", Vec::new())
        .unwrap()
        .collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&text("Socrates")));
}

#[test]
fn rescue_rebuilds_a_dropped_dependency_view() {
    // Scenario B's tail: dropping the human view does not break mortal,
    // because the missing relation is rescued and the statement retried.
    let db = Database::open_in_memory().unwrap();
    db.sql(
        "CREATE TABLE human(name); CREATE TABLE mortal(name)",
        Vec::new(),
    )
    .unwrap();
    db.sql("INSERT INTO human VALUES ('Socrates')", Vec::new())
        .unwrap();
    let x = Variable::fresh();
    db.assert(&Formula::rule(
        Predicate::new("mortal", vec![Term::from(x)]),
        vec![Predicate::new("human", vec![Term::from(x)])],
    ))
    .unwrap();
    let rows: Vec<_> = db
        .sql("SELECT * FROM mortal", Vec::new())
        .unwrap()
        .collect();
    assert_eq!(rows.len(), 1);

    db.sql("DROP VIEW human", Vec::new()).unwrap();
    let rows: Vec<_> = db
        .sql("SELECT * FROM mortal", Vec::new())
        .unwrap()
        .collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&text("Socrates")));
}

#[test]
fn recursive_rules_reach_a_fixpoint() {
    // Scenario: ancestor over parent, two rules, one of them recursive.
    let db = Database::open_in_memory().unwrap();
    db.sql(
        "CREATE TABLE parent(a, b); CREATE TABLE ancestor(a, b)",
        Vec::new(),
    )
    .unwrap();
    let (x, y) = (Variable::fresh(), Variable::fresh());
    db.assert(&Formula::rule(
        Predicate::new("ancestor", vec![Term::from(x), Term::from(y)]),
        vec![Predicate::new("parent", vec![Term::from(x), Term::from(y)])],
    ))
    .unwrap();
    let (x, y, z) = (Variable::fresh(), Variable::fresh(), Variable::fresh());
    db.assert(&Formula::rule(
        Predicate::new("ancestor", vec![Term::from(x), Term::from(z)]),
        vec![
            Predicate::new("parent", vec![Term::from(x), Term::from(y)]),
            Predicate::new("ancestor", vec![Term::from(y), Term::from(z)]),
        ],
    ))
    .unwrap();
    db.sql(
        "INSERT INTO parent VALUES ('john', 'douglas'); \
         INSERT INTO parent VALUES ('mary', 'john')",
        Vec::new(),
    )
    .unwrap();
    let rows: Vec<_> = db
        .sql("SELECT * FROM ancestor ORDER BY a, b", Vec::new())
        .unwrap()
        .collect();
    assert_eq!(rows.len(), 3);
    let pairs: Vec<(Option<&SqlValue>, Option<&SqlValue>)> =
        rows.iter().map(|row| (row.get("a"), row.get("b"))).collect();
    assert_eq!(
        pairs,
        vec![
            (Some(&text("john")), Some(&text("douglas"))),
            (Some(&text("mary")), Some(&text("douglas"))),
            (Some(&text("mary")), Some(&text("john"))),
        ]
    );
}

#[test]
fn multi_join_rules_alias_repeated_relations() {
    // Scenario: grandparent(X, Z) :- parent(X, Y), parent(Y, Z).
    let db = Database::open_in_memory().unwrap();
    db.sql(
        "CREATE TABLE parent(parent, child); \
         CREATE TABLE grandparent(grandparent, grandchild)",
        Vec::new(),
    )
    .unwrap();
    db.sql(
        "INSERT INTO parent VALUES ('Alice', 'Bob'); \
         INSERT INTO parent VALUES ('Bob', 'Charlie')",
        Vec::new(),
    )
    .unwrap();
    let (x, y, z) = (Variable::fresh(), Variable::fresh(), Variable::fresh());
    db.assert(&Formula::rule(
        Predicate::new("grandparent", vec![Term::from(x), Term::from(z)]),
        vec![
            Predicate::new("parent", vec![Term::from(x), Term::from(y)]),
            Predicate::new("parent", vec![Term::from(y), Term::from(z)]),
        ],
    ))
    .unwrap();
    let rows: Vec<_> = db
        .sql("SELECT * FROM grandparent", Vec::new())
        .unwrap()
        .collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("grandparent"), Some(&text("Alice")));
    assert_eq!(rows[0].get("grandchild"), Some(&text("Charlie")));
}

#[test]
fn new_facts_show_without_rebuilding_the_view() {
    // The view selects from the rule store, so fact inserts are visible
    // immediately; only rule arrivals invalidate it.
    let db = Database::open_in_memory().unwrap();
    db.sql("CREATE TABLE human(name)", Vec::new()).unwrap();
    db.sql("INSERT INTO human VALUES ('Socrates')", Vec::new())
        .unwrap();
    db.sql("INSERT INTO human VALUES ('Plato')", Vec::new())
        .unwrap();
    let rows: Vec<_> = db
        .sql("SELECT * FROM human ORDER BY name", Vec::new())
        .unwrap()
        .collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("name"), Some(&text("Plato")));
    assert_eq!(rows[1].get("name"), Some(&text("Socrates")));
}

#[test]
fn rules_with_constant_arguments_filter_and_project() {
    // advisor("Socrates", X) :- student(X): a constant in the head projects
    // a literal; a constant in the body filters the source.
    let db = Database::open_in_memory().unwrap();
    db.sql(
        "CREATE TABLE student(name, school); CREATE TABLE advisor(advisor, student)",
        Vec::new(),
    )
    .unwrap();
    db.sql(
        "INSERT INTO student VALUES ('Plato', 'Athens'); \
         INSERT INTO student VALUES ('Xenophon', 'Elsewhere')",
        Vec::new(),
    )
    .unwrap();
    let x = Variable::fresh();
    db.assert(&Formula::rule(
        Predicate::new("advisor", vec![Term::from("Socrates"), Term::from(x)]),
        vec![Predicate::new(
            "student",
            vec![Term::from(x), Term::from("Athens")],
        )],
    ))
    .unwrap();
    let rows: Vec<_> = db
        .sql("SELECT * FROM advisor", Vec::new())
        .unwrap()
        .collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("advisor"), Some(&text("Socrates")));
    assert_eq!(rows[0].get("student"), Some(&text("Plato")));
}
