//! Chart specs written directly as JSON

use serde_json::Value;

use super::{fenced_blocks, has_block};
use crate::chart::VisualizationSpec;

const JSON_LANGS: &[&str] = &["json", "json5", "jsonc"];

/// Bound on candidate positions tried by the bare-object scan.
const MAX_BARE_ATTEMPTS: usize = 512;

pub fn has_fenced_json(text: &str) -> bool {
    has_block(text, JSON_LANGS)
}

pub fn extract_fenced(text: &str) -> Option<VisualizationSpec> {
    fenced_blocks(text)
        .filter(|block| block.is_lang(JSON_LANGS))
        .find_map(|block| {
            let value: Value = serde_json::from_str(block.body.trim()).ok()?;
            VisualizationSpec::from_value(&value)
        })
}

pub fn has_bare_object(text: &str) -> bool {
    text.contains('{') && text.contains("\"type\"") && text.contains("\"data\"")
}

/// Scan for the first `{` that starts a complete chart object.
pub fn extract_bare(text: &str) -> Option<VisualizationSpec> {
    text.char_indices()
        .filter(|(_, c)| *c == '{')
        .take(MAX_BARE_ATTEMPTS)
        .find_map(|(start, _)| {
            let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
            let value = values.next()?.ok()?;
            VisualizationSpec::from_value(&value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{ChartType, DataPoint};
    use serde_json::json;

    #[test]
    fn test_fenced_block_roundtrip() {
        let text = r##"Here is the breakdown.

```json
{
  "type": "bar",
  "data": {
    "labels": ["North", "South"],
    "datasets": [{"label": "Revenue", "data": [1200, 950], "backgroundColor": "#4e79a7"}]
  },
  "options": {"plugins": {"legend": {"display": false}}}
}
```

North leads."##;
        let spec = extract_fenced(text).unwrap();
        assert_eq!(spec.chart_type, ChartType::Bar);
        assert_eq!(spec.data.labels, vec!["North", "South"]);
        assert_eq!(spec.data.datasets[0].label, "Revenue");
        assert_eq!(spec.data.datasets[0].data, vec![DataPoint::Value(1200.0), DataPoint::Value(950.0)]);
        assert_eq!(spec.data.datasets[0].style["backgroundColor"], json!("#4e79a7"));
        assert_eq!(spec.options, json!({"plugins": {"legend": {"display": false}}}));
    }

    #[test]
    fn test_skips_unusable_fenced_blocks() {
        let text = "```json\n{\"note\": \"not a chart\"}\n```\n```json\n{\"type\": \"line\", \"data\": {\"labels\": [\"a\"], \"datasets\": [{\"data\": [1]}]}}\n```";
        assert_eq!(extract_fenced(text).unwrap().chart_type, ChartType::Line);

        assert!(extract_fenced("```json\n{\"type\": \"bar\", \"data\": \n```").is_none());
    }

    #[test]
    fn test_bare_object_in_prose() {
        let text = r#"The chart config is {"type": "pie", "data": {"labels": ["A", "B"], "datasets": [{"data": [60, 40]}]}} as requested."#;
        assert!(has_bare_object(text));
        let spec = extract_bare(text).unwrap();
        assert_eq!(spec.chart_type, ChartType::Pie);
        assert_eq!(spec.data.labels, vec!["A", "B"]);
    }

    #[test]
    fn test_bare_object_nested_in_wrapper() {
        let text = r#"{"chart": {"type": "doughnut", "data": {"datasets": [{"data": [1, 2]}]}}}"#;
        assert_eq!(extract_bare(text).unwrap().chart_type, ChartType::Doughnut);
    }

    #[test]
    fn test_bare_object_rejects_broken_json() {
        assert!(extract_bare(r#"{"type": "bar", "data": {"datasets": [ }"#).is_none());
        assert!(!has_bare_object("no braces here"));
    }
}
