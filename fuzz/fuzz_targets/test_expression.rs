//! Fuzz expression parsing and evaluation against a small parameter map.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sqlmapper_reflection::Value;
use sqlmapper_scripting::{Config, DynamicContext, Expression};

#[derive(Debug, Arbitrary)]
struct Input {
    source: String,
    name: Option<String>,
    age: Option<i64>,
    score: f64,
    ids: Vec<i64>,
}

fuzz_target!(|input: Input| {
    let expression = match Expression::parse(&input.source) {
        Ok(expression) => expression,
        Err(e) => {
            assert!(e.position() <= input.source.len());
            return;
        }
    };

    let params = Value::map([
        ("name", input.name.map_or(Value::Null, Value::Text)),
        ("age", input.age.map_or(Value::Null, Value::Int)),
        ("score", Value::Float(input.score)),
        ("ids", Value::list(input.ids)),
    ]);
    let config = Config::default();
    let ctx = DynamicContext::new(&config, &params);
    let _ = expression.evaluate_bool(&ctx);
    let _ = expression.evaluate_iterable(&ctx, true);
});
