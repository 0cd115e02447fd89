//! Visualization extraction from completion text
//!
//! Completion answers are free-form markdown. A chart may be embedded as a
//! fenced JSON block, a bare JSON object, a Chart.js snippet, or a matplotlib
//! script. Each dialect is handled by one [`Strategy`]; strategies are tried
//! in order and the first one that yields a spec wins. Every strategy is
//! total: malformed input falls through to the next one.

pub mod json;
pub mod plot;
pub mod script;

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use crate::chart::VisualizationSpec;

/// One extraction dialect.
#[derive(Debug, Clone, Copy)]
pub struct Strategy {
    pub name: &'static str,
    /// Cheap pre-filter; `extract` is only called when this returns true
    pub matches: fn(&str) -> bool,
    pub extract: fn(&str) -> Option<VisualizationSpec>,
}

/// Strategies in priority order.
pub const STRATEGIES: &[Strategy] = &[
    Strategy {
        name: "fenced_json",
        matches: json::has_fenced_json,
        extract: json::extract_fenced,
    },
    Strategy {
        name: "bare_json",
        matches: json::has_bare_object,
        extract: json::extract_bare,
    },
    Strategy {
        name: "chart_script",
        matches: script::has_script_block,
        extract: script::extract,
    },
    Strategy {
        name: "plot_script",
        matches: plot::has_python_block,
        extract: plot::extract,
    },
];

/// Extract the first chart specification found in `text`.
///
/// Returns `None` when the answer carries no recognizable chart, which is
/// a normal outcome.
pub fn extract_visualization(text: &str) -> Option<VisualizationSpec> {
    extract_with(STRATEGIES, text)
}

pub fn extract_with(strategies: &[Strategy], text: &str) -> Option<VisualizationSpec> {
    for strategy in strategies {
        if !(strategy.matches)(text) {
            continue;
        }
        if let Some(spec) = (strategy.extract)(text) {
            trace!(strategy = strategy.name, chart_type = %spec.chart_type, "Extracted visualization");
            return Some(spec);
        }
    }
    None
}

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+\-]*)[^\n]*\n(.*?)```").expect("fence pattern is valid")
});

/// A markdown code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FencedBlock<'a> {
    /// Info string, possibly empty
    pub lang: &'a str,
    pub body: &'a str,
}

impl FencedBlock<'_> {
    pub fn is_lang(&self, names: &[&str]) -> bool {
        names.iter().any(|name| self.lang.eq_ignore_ascii_case(name))
    }
}

pub fn fenced_blocks(text: &str) -> impl Iterator<Item = FencedBlock<'_>> {
    FENCE.captures_iter(text).filter_map(|caps| {
        Some(FencedBlock {
            lang: caps.get(1)?.as_str(),
            body: caps.get(2)?.as_str(),
        })
    })
}

/// Whether `text` contains a fenced block tagged with one of `names`.
pub fn has_block(text: &str, names: &[&str]) -> bool {
    text.contains("```") && fenced_blocks(text).any(|block| block.is_lang(names))
}

/// Slice of `text` from the brace at `open` through its matching close.
///
/// Braces inside string literals (single, double, or backtick quoted) and
/// inside `//` or `/* */` comments are ignored. Returns `None` when `open` is
/// not a `{` or the object never closes.
pub fn balanced_object(text: &str, open: usize) -> Option<&str> {
    if text.get(open..)?.chars().next()? != '{' {
        return None;
    }

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut chars = text[open..].char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
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
            '"' | '\'' | '`' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = open + offset + c.len_utf8();
                    return Some(&text[open..end]);
                }
            }
            _ => {}
        }
    }
    None
}
