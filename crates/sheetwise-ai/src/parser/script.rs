//! Chart.js configuration written as a JavaScript snippet

use std::iter::Peekable;
use std::str::CharIndices;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::{balanced_object, fenced_blocks, has_block};
use crate::chart::VisualizationSpec;

const SCRIPT_LANGS: &[&str] = &["javascript", "js", "jsx", "typescript", "ts"];

static CHART_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\btype\s*:\s*['"`]([A-Za-z]+)['"`]"#).expect("type pattern is valid")
});

/// `data: {` inside a config literal, or `const data = {` hoisted above it.
static DATA_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bdata\s*:\s*\{|\b(?:const|let|var)\s+\w*[dD]ata\s*=\s*\{").expect("data pattern is valid")
});

static OPTIONS_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\boptions\s*:\s*\{|\b(?:const|let|var)\s+\w*[oO]ptions\s*=\s*\{").expect("options pattern is valid")
});

pub fn has_script_block(text: &str) -> bool {
    has_block(text, SCRIPT_LANGS)
}

pub fn extract(text: &str) -> Option<VisualizationSpec> {
    fenced_blocks(text)
        .filter(|block| block.is_lang(SCRIPT_LANGS))
        .find_map(|block| extract_from_source(block.body))
}

fn extract_from_source(source: &str) -> Option<VisualizationSpec> {
    let chart_type = CHART_TYPE.captures(source)?.get(1)?.as_str();
    let data = object_literal(&DATA_OPEN, source)?;

    // Options often carry callbacks that are not data; drop them rather than the chart.
    let options = object_literal(&OPTIONS_OPEN, source).unwrap_or_else(|| Value::Object(Map::new()));

    let mut config = Map::new();
    config.insert("type".to_string(), Value::String(chart_type.to_string()));
    config.insert("data".to_string(), data);
    config.insert("options".to_string(), options);
    VisualizationSpec::from_value(&Value::Object(config))
}

fn object_literal(pattern: &Regex, source: &str) -> Option<Value> {
    pattern.find_iter(source).find_map(|found| {
        // Every pattern ends on the opening brace.
        let open = found.end() - 1;
        let literal = balanced_object(source, open)?;
        serde_json::from_str(&js_to_json(literal)).ok()
    })
}

/// Rewrite a JavaScript object literal as JSON.
///
/// Handles bare keys, single and backtick quoted strings, line and block
/// comments, trailing commas, and `undefined`. Anything else (function
/// calls, variable references) is passed through and left for the JSON
/// parser to reject.
pub fn js_to_json(source: &str) -> String {
    let mut out = String::with_capacity(source.len() + 16);
    let mut chars = source.char_indices().peekable();
    let mut pending_comma = false;

    while let Some((i, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => out.push(c),
            '/' if matches!(chars.peek(), Some((_, '/'))) => {
                while chars.next_if(|(_, c)| *c != '\n').is_some() {}
            }
            '/' if matches!(chars.peek(), Some((_, '*'))) => {
                chars.next();
                let mut prev = '\0';
                for (_, c) in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            ',' => {
                if pending_comma {
                    out.push(',');
                }
                pending_comma = true;
            }
            '}' | ']' => {
                pending_comma = false;
                out.push(c);
            }
            _ => {
                if pending_comma {
                    out.push(',');
                    pending_comma = false;
                }
                match c {
                    '"' | '\'' | '`' => push_string(&mut out, &mut chars, c),
                    c if c.is_alphabetic() || c == '_' || c == '$' => {
                        let word = take_word(source, i, &mut chars);
                        push_word(&mut out, word, &mut chars);
                    }
                    c => out.push(c),
                }
            }
        }
    }

    if pending_comma {
        out.push(',');
    }
    out
}

/// Re-emit a quoted string with double quotes.
fn push_string(out: &mut String, chars: &mut Peekable<CharIndices<'_>>, quote: char) {
    out.push('"');
    while let Some((_, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, '\'')) => out.push('\''),
                Some((_, '`')) => out.push('`'),
                Some((_, escaped)) => {
                    out.push('\\');
                    out.push(escaped);
                }
                None => break,
            },
            c if c == quote => break,
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn take_word<'a>(source: &'a str, start: usize, chars: &mut Peekable<CharIndices<'a>>) -> &'a str {
    let mut end = source.len();
    while let Some(&(i, c)) = chars.peek() {
        if c.is_alphanumeric() || c == '_' || c == '$' {
            chars.next();
        } else {
            end = i;
            break;
        }
    }
    &source[start..end]
}

fn push_word(out: &mut String, word: &str, chars: &mut Peekable<CharIndices<'_>>) {
    let mut lookahead = chars.clone();
    let is_key = loop {
        match lookahead.next() {
            Some((_, c)) if c.is_whitespace() => continue,
            Some((_, ':')) => break true,
            _ => break false,
        }
    };

    match word {
        _ if is_key => {
            out.push('"');
            out.push_str(word);
            out.push('"');
        }
        "undefined" => out.push_str("null"),
        _ => out.push_str(word),
    }
}
