//! Fuzz the placeholder tokenizer and text node parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sqlmapper_scripting::node::TextNode;
use sqlmapper_scripting::tokenizer::{Fragment, tokenize};

fuzz_target!(|text: &str| {
    match tokenize(text) {
        Ok(fragments) => {
            for fragment in fragments {
                if let Fragment::Bound(token) | Fragment::Raw(token) = fragment {
                    assert!(token.position < text.len());
                    assert!(!token.body.trim().is_empty());
                }
            }
        }
        Err(e) => assert!(e.position() <= text.len()),
    }

    if let Err(e) = TextNode::parse(text) {
        assert!(e.position() <= text.len());
    }
});
