//! Fuzz the bound parameter attribute grammar.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sqlmapper_scripting::ParameterMapping;

fuzz_target!(|body: &str| {
    match ParameterMapping::parse(body) {
        Ok(mapping) => assert!(!mapping.property.is_empty()),
        Err(e) => assert!(e.position() <= body.len()),
    }
});
