//! matplotlib scripts turned into a chart spec
//!
//! Only literal data is recovered: the first two bracketed lists made of
//! numbers and strings become the values and the labels. Scripts that build
//! their data from a DataFrame yield nothing.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value, json};

use super::{fenced_blocks, has_block};
use crate::chart::{ChartData, ChartType, DataPoint, Series, VisualizationSpec};

const PYTHON_LANGS: &[&str] = &["python", "py", "python3"];

pub const PALETTE: [&str; 10] = [
    "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc948", "#b07aa1", "#ff9da7", "#9c755f", "#bab0ac",
];

static PLOT_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.(barh|bar|plot|pie|scatter)\s*\(").expect("plot pattern is valid"));

static TITLE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.(?:title|set_title|suptitle)\s*\(\s*(?:'([^'\n]*)'|"([^"\n]*)")"#).expect("title pattern is valid")
});

static BRACKET_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]]*)\]").expect("list pattern is valid"));

pub fn has_python_block(text: &str) -> bool {
    has_block(text, PYTHON_LANGS)
}

pub fn extract(text: &str) -> Option<VisualizationSpec> {
    fenced_blocks(text)
        .filter(|block| block.is_lang(PYTHON_LANGS))
        .find_map(|block| extract_from_script(block.body))
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Number(f64, String),
    Text(String),
}

impl Literal {
    fn number(&self) -> Option<f64> {
        match self {
            Literal::Number(value, _) => Some(*value),
            Literal::Text(_) => None,
        }
    }

    fn label(&self) -> String {
        match self {
            Literal::Number(_, raw) => raw.clone(),
            Literal::Text(text) => text.clone(),
        }
    }
}

fn all_numeric(list: &[Literal]) -> bool {
    list.iter().all(|item| item.number().is_some())
}

fn extract_from_script(script: &str) -> Option<VisualizationSpec> {
    let chart_type = chart_type(script);

    let mut lists = literal_lists(script).take(2);
    let (values, labels) = match (lists.next(), lists.next()) {
        (Some(first), Some(second)) if !all_numeric(&first) && all_numeric(&second) => (second, first),
        (Some(first), second) => (first, second.unwrap_or_default()),
        (None, _) => return None,
    };
    if !all_numeric(&values) {
        return None;
    }

    let values: Vec<f64> = values.iter().filter_map(Literal::number).collect();
    let labels: Vec<String> = if labels.len() == values.len() {
        labels.iter().map(Literal::label).collect()
    } else {
        (1..=values.len()).map(|n| format!("Category {n}")).collect()
    };

    let title = TITLE_CALL
        .captures(script)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string());

    let data = values
        .iter()
        .enumerate()
        .map(|(i, &y)| match chart_type {
            ChartType::Scatter => DataPoint::Point { x: i as f64, y },
            _ => DataPoint::Value(y),
        })
        .collect();

    let mut style = Map::new();
    if chart_type.colors_per_point() {
        let colors = PALETTE.iter().cycle().take(values.len()).map(|c| json!(c)).collect();
        style.insert("backgroundColor".to_string(), Value::Array(colors));
    } else {
        style.insert("backgroundColor".to_string(), json!(PALETTE[0]));
        style.insert("borderColor".to_string(), json!(PALETTE[0]));
    }

    let mut spec = VisualizationSpec::new(
        chart_type,
        ChartData {
            labels,
            datasets: vec![Series {
                label: title.clone().unwrap_or_else(|| "Values".to_string()),
                data,
                style,
            }],
        },
    );
    if let Some(title) = title {
        spec.options = json!({"plugins": {"title": {"display": true, "text": title}}});
    }
    Some(spec)
}

fn chart_type(script: &str) -> ChartType {
    let call = PLOT_CALL.captures(script).and_then(|caps| caps.get(1)).map(|m| m.as_str());
    match call {
        Some("plot") => ChartType::Line,
        Some("pie") => ChartType::Pie,
        Some("scatter") => ChartType::Scatter,
        _ => ChartType::Bar,
    }
}

/// Non-empty bracketed lists made only of literals, in source order.
///
/// Subscripts such as `df['revenue']` are skipped, as are brackets that sit
/// inside a string literal or a `#` comment.
fn literal_lists(script: &str) -> impl Iterator<Item = Vec<Literal>> + '_ {
    let masked = non_code_spans(script);
    BRACKET_LIST.captures_iter(script).filter_map(move |caps| {
        let whole = caps.get(0)?;
        if masked.iter().any(|span| span.contains(&whole.start())) {
            return None;
        }
        let preceding = script[..whole.start()].chars().next_back();
        if preceding.is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | ']' | ')')) {
            return None;
        }
        parse_list(caps.get(1)?.as_str()).filter(|items| !items.is_empty())
    })
}

/// Byte ranges of string literals and comments.
fn non_code_spans(script: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut chars = script.char_indices();

    while let Some((start, c)) = chars.next() {
        match c {
            '#' => {
                let end = chars.find(|(_, c)| *c == '\n').map_or(script.len(), |(i, _)| i);
                spans.push(start..end);
            }
            '\'' | '"' => {
                let mut end = script.len();
                while let Some((i, ch)) = chars.next() {
                    match ch {
                        '\\' => {
                            chars.next();
                        }
                        ch if ch == c || ch == '\n' => {
                            end = i + 1;
                            break;
                        }
                        _ => {}
                    }
                }
                spans.push(start..end);
            }
            _ => {}
        }
    }
    spans
}

fn parse_list(inner: &str) -> Option<Vec<Literal>> {
    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&c) = chars.peek() else { break };

        match c {
            '\'' | '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next()? {
                        '\\' => text.push(chars.next()?),
                        ch if ch == c => break,
                        ch => text.push(ch),
                    }
                }
                items.push(Literal::Text(text));
            }
            _ => {
                let mut raw = String::new();
                while let Some(ch) = chars.next_if(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '+' | '_')) {
                    raw.push(ch);
                }
                let value = raw.replace('_', "").parse::<f64>().ok().filter(|v| v.is_finite())?;
                items.push(Literal::Number(value, raw));
            }
        }

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            Some(',') | None => {}
            Some(_) => return None,
        }
    }
    Some(items)
}
