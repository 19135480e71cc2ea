//! Placeholder tokenizer.
//!
//! Splits statement text into literal text, bound placeholders (`#{...}`)
//! and raw substitutions (`${...}`).
//!
//! Escaping:
//! - `\#{` and `\${` outside a placeholder produce the delimiter literally.
//! - Inside a placeholder `\{` and `\}` are literal braces that do not
//!   affect nesting. Other backslashes are kept as written.
//! - Unescaped `{`/`}` pairs nest, so a placeholder ends at the matching
//!   top-level `}`.

use crate::error::GrammarError;

/// A placeholder found in statement text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The placeholder content, with escapes resolved.
    pub body: String,
    /// Byte offset of the opening delimiter.
    pub position: usize,
}

impl Token {
    /// Byte offset of the first body character.
    #[must_use]
    pub fn body_position(&self) -> usize {
        self.position + 2
    }
}

/// One piece of tokenized statement text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Literal text.
    Text(String),
    /// A bound placeholder, `#{...}`.
    Bound(Token),
    /// A raw substitution, `${...}`.
    Raw(Token),
}

/// Split `text` into fragments.
///
/// Adjacent literal text is merged into one fragment and empty text
/// fragments are never produced.
pub fn tokenize(text: &str) -> Result<Vec<Fragment>, GrammarError> {
    let bytes = text.as_bytes();
    let mut fragments = Vec::new();
    let mut literal = String::new();
    let mut segment_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if b == b'\\'
            && matches!(bytes.get(i + 1), Some(b'#' | b'$'))
            && bytes.get(i + 2) == Some(&b'{')
        {
            literal.push_str(&text[segment_start..i]);
            literal.push_str(&text[i + 1..i + 3]);
            i += 3;
            segment_start = i;
            continue;
        }

        if matches!(b, b'#' | b'$') && bytes.get(i + 1) == Some(&b'{') {
            literal.push_str(&text[segment_start..i]);
            let (body, end) = scan_body(text, i)?;
            if body.trim().is_empty() {
                return Err(GrammarError::EmptyToken {
                    position: i,
                    fragment: text[i..end].to_string(),
                });
            }
            if !literal.is_empty() {
                fragments.push(Fragment::Text(std::mem::take(&mut literal)));
            }
            let token = Token { body, position: i };
            fragments.push(if b == b'#' {
                Fragment::Bound(token)
            } else {
                Fragment::Raw(token)
            });
            i = end;
            segment_start = i;
            continue;
        }

        i += 1;
    }

    literal.push_str(&text[segment_start..]);
    if !literal.is_empty() {
        fragments.push(Fragment::Text(literal));
    }
    Ok(fragments)
}

// Scan a placeholder body starting at the opening delimiter `open`.
// Returns the body and the offset just past the closing brace.
fn scan_body(text: &str, open: usize) -> Result<(String, usize), GrammarError> {
    let bytes = text.as_bytes();
    let mut body = String::new();
    let mut depth = 0usize;
    let mut segment_start = open + 2;
    let mut j = segment_start;

    while j < bytes.len() {
        match bytes[j] {
            b'\\' if matches!(bytes.get(j + 1), Some(b'{' | b'}')) => {
                body.push_str(&text[segment_start..j]);
                body.push_str(&text[j + 1..j + 2]);
                j += 2;
                segment_start = j;
                continue;
            }
            b'{' => depth += 1,
            b'}' if depth == 0 => {
                body.push_str(&text[segment_start..j]);
                return Ok((body, j + 1));
            }
            b'}' => depth -= 1,
            _ => {}
        }
        j += 1;
    }

    Err(GrammarError::UnterminatedToken {
        position: open,
        fragment: text[open..].to_string(),
    })
}

/// Check whether text contains any raw substitution.
///
/// Malformed text reports `true` so that callers take the path that
/// surfaces the grammar error.
#[must_use]
pub fn has_raw_substitution(text: &str) -> bool {
    tokenize(text).map_or(true, |fragments| {
        fragments.iter().any(|f| matches!(f, Fragment::Raw(_)))
    })
}
