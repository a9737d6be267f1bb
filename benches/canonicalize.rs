use criterion::{black_box, criterion_group, criterion_main, Criterion};

use rbdb::codec;
use rbdb::symbol::{Formula, Predicate, Term, Variable};

fn grandparent_rule() -> Formula {
    let (x, y, z) = (Variable::fresh(), Variable::fresh(), Variable::fresh());
    Formula::rule(
        Predicate::new("grandparent", vec![Term::from(x), Term::from(z)]),
        vec![
            Predicate::new("parent", vec![Term::from(x), Term::from(y)]),
            Predicate::new("parent", vec![Term::from(y), Term::from(z)]),
        ],
    )
}

fn wide_rule(width: usize) -> Formula {
    let variables: Vec<Variable> = (0..width).map(|_| Variable::fresh()).collect();
    let body = variables
        .windows(2)
        .map(|pair| {
            Predicate::new(
                "edge",
                vec![Term::from(pair[0]), Term::from(pair[1])],
            )
        })
        .collect();
    Formula::rule(
        Predicate::new(
            "path",
            vec![
                Term::from(variables[0]),
                Term::from(variables[width - 1]),
            ],
        ),
        body,
    )
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let rule = grandparent_rule();
    c.bench_function("canonicalize grandparent", |b| {
        b.iter(|| black_box(&rule).canonicalize().unwrap())
    });
    let canonical = rule.canonicalize().unwrap();
    c.bench_function("encode grandparent", |b| {
        b.iter(|| codec::encode(black_box(&canonical)).unwrap())
    });
    let wide = wide_rule(64);
    c.bench_function("canonicalize 64-variable chain", |b| {
        b.iter(|| black_box(&wide).canonicalize().unwrap())
    });
    let wide_canonical = wide.canonicalize().unwrap();
    c.bench_function("encode 64-variable chain", |b| {
        b.iter(|| codec::encode(black_box(&wide_canonical)).unwrap())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
