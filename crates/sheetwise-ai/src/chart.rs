//! Visualization payload returned alongside an analysis

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Chart families the dashboard can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Doughnut,
    Scatter,
}

impl ChartType {
    /// Parse a chart type name as written by the model, tolerating common aliases.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bar" | "horizontalbar" | "column" => Some(ChartType::Bar),
            "line" | "area" => Some(ChartType::Line),
            "pie" => Some(ChartType::Pie),
            "doughnut" | "donut" => Some(ChartType::Doughnut),
            "scatter" => Some(ChartType::Scatter),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Pie => "pie",
            ChartType::Doughnut => "doughnut",
            ChartType::Scatter => "scatter",
        }
    }

    /// Part-of-whole charts colour each slice separately.
    pub fn colors_per_point(&self) -> bool {
        matches!(self, ChartType::Bar | ChartType::Pie | ChartType::Doughnut)
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured chart description, serialized in the shape chart libraries expect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationSpec {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub data: ChartData,
    /// Free-form rendering hints; always an object
    pub options: Value,
}

impl VisualizationSpec {
    pub fn new(chart_type: ChartType, data: ChartData) -> Self {
        Self {
            chart_type,
            data,
            options: Value::Object(Map::new()),
        }
    }

    /// Build from a decoded `{type, data, options?}` object.
    ///
    /// Returns `None` for unknown chart types, data without any series, or
    /// anything that does not have the expected shape.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let chart_type = ChartType::parse(object.get("type")?.as_str()?)?;
        let data: ChartData = serde_json::from_value(object.get("data")?.clone()).ok()?;
        if data.datasets.is_empty() {
            return None;
        }
        let options = object
            .get("options")
            .filter(|options| options.is_object())
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        Some(Self {
            chart_type,
            data,
            options,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    #[serde(default, deserialize_with = "scalar_labels")]
    pub labels: Vec<String>,
    pub datasets: Vec<Series>,
}

/// One named series plus whatever styling keys the model supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub label: String,
    pub data: Vec<DataPoint>,
    /// `backgroundColor`, `borderColor`, `fill`, ... kept verbatim
    #[serde(flatten)]
    pub style: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataPoint {
    Value(f64),
    Point { x: f64, y: f64 },
    Missing,
}

impl DataPoint {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DataPoint::Value(v) => Some(*v),
            DataPoint::Point { y, .. } => Some(*y),
            DataPoint::Missing => None,
        }
    }
}

/// Labels may arrive as numbers, strings, or multi-line arrays.
fn scalar_labels<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    Ok(raw.iter().map(label_text).collect())
}

fn label_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(parts) => parts.iter().map(label_text).collect::<Vec<_>>().join(" "),
        other => other.to_string(),
    }
}
