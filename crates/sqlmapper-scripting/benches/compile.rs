//! Benchmarks for statement compilation and parameter binding.

#![allow(missing_docs, clippy::unwrap_used)]

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use sqlmapper_reflection::{MetaObject, Property, Reflect, Value};
use sqlmapper_scripting::{Config, StatementRegistry, tokenizer::tokenize};

#[derive(Reflect, Default)]
struct Address {
    city: String,
}

#[derive(Reflect, Default)]
struct Filter {
    name: Option<String>,
    min_age: Option<i32>,
    address: Option<Address>,
    ids: Vec<i64>,
}

const MAPPER: &str = r#"{"statements": [
    {"id": "search", "body": [
        {"type": "text", "text": "SELECT id, name FROM users"},
        {"type": "where", "contents": [
            {"type": "if", "test": "name != null", "contents": [
                {"type": "bind", "name": "pattern", "value": "'%' + name + '%'"},
                {"type": "text", "text": "AND name LIKE #{pattern}"}
            ]},
            {"type": "if", "test": "min_age != null and min_age > 0", "contents": [
                {"type": "text", "text": "AND age >= #{min_age, jdbcType=INTEGER}"}
            ]},
            {"type": "if", "test": "address != null", "contents": [
                {"type": "text", "text": "AND city = #{address.city}"}
            ]},
            {"type": "foreach", "collection": "ids", "item": "id", "nullable": true,
             "open": "AND id IN (", "close": ")", "separator": ",",
             "contents": [{"type": "text", "text": "#{id}"}]}
        ]}
    ]},
    {"id": "byId", "body": [{"type": "text", "text": "SELECT * FROM users WHERE id = #{id}"}]}
]}"#;

fn filter() -> Filter {
    Filter {
        name: Some("ann".into()),
        min_age: Some(18),
        address: Some(Address {
            city: "Oslo".into(),
        }),
        ids: (0..20).collect(),
    }
}

fn bench_compile(c: &mut Criterion) {
    let mut registry = StatementRegistry::new(Config::default());
    registry.load_json(MAPPER).unwrap();
    let filter = filter();

    c.bench_function("compile_dynamic", |b| {
        b.iter(|| {
            let bound = registry.compile("search", black_box(&filter)).unwrap();
            black_box(bound.sql().len())
        });
    });

    c.bench_function("compile_and_bind_dynamic", |b| {
        b.iter(|| {
            let bound = registry.compile("search", black_box(&filter)).unwrap();
            black_box(bound.parameter_values().unwrap())
        });
    });

    let id = Value::map([("id", 7)]);
    c.bench_function("compile_static", |b| {
        b.iter(|| black_box(registry.compile("byId", black_box(&id)).unwrap().sql().len()));
    });
}

fn bench_tokenize(c: &mut Criterion) {
    let text = "UPDATE users SET name = #{name, jdbcType=VARCHAR}, age = #{age} \
                WHERE id = #{id} AND tenant = ${tenant}";
    c.bench_function("tokenize", |b| b.iter(|| tokenize(black_box(text)).unwrap()));
}

fn bench_property_access(c: &mut Criterion) {
    let filter = filter();
    c.bench_function("cached_nested_get", |b| {
        b.iter(|| {
            MetaObject::new(black_box(&filter))
                .get_value("address.city")
                .unwrap()
                .to_value()
        });
    });
}

criterion_group!(benches, bench_compile, bench_tokenize, bench_property_access);
criterion_main!(benches);
