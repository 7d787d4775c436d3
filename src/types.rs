use geo::{Point, Rect};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single cell as delivered by the host. Parsing is always explicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    #[default]
    Null,
}

impl Value {
    /// Finite numeric reading of the cell, if it has one.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            Value::Number(n) => *n,
            Value::Text(s) => s.trim().parse::<f64>().ok()?,
            Value::Null => return None,
        };
        n.is_finite().then_some(n)
    }

    pub fn number_or_zero(&self) -> f64 {
        self.as_number().unwrap_or(0.0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // -0 prints as 0
            Value::Number(n) if *n == 0.0 => f.write_str("0"),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Null => Ok(()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

static NULL: Value = Value::Null;

/// One data point: column name -> value. Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: HashMap<String, Value>,
}

impl Row {
    pub fn new(cells: HashMap<String, Value>) -> Self {
        Self { cells }
    }

    /// Absent columns read as `Null`.
    pub fn get(&self, column: &str) -> &Value {
        self.cells.get(column).unwrap_or(&NULL)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            cells: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Latitude,
    Longitude,
    Location,
    Color,
    Measure,
    Selection,
}

impl ColumnRole {
    pub const ALL: [ColumnRole; 6] = [
        ColumnRole::Latitude,
        ColumnRole::Longitude,
        ColumnRole::Location,
        ColumnRole::Color,
        ColumnRole::Measure,
        ColumnRole::Selection,
    ];

    /// Role token used by the host data-binding contract.
    pub fn token(&self) -> &'static str {
        match self {
            ColumnRole::Latitude => "latitude",
            ColumnRole::Longitude => "longitude",
            ColumnRole::Location => "location",
            ColumnRole::Color => "color",
            ColumnRole::Measure => "measure",
            ColumnRole::Selection => "selection",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub column: String,
    pub label: String,
}

impl RoleBinding {
    pub fn new(column: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            label: label.into(),
        }
    }
}

/// Resolved role map. Any role may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roles {
    pub latitude: Option<RoleBinding>,
    pub longitude: Option<RoleBinding>,
    pub location: Option<RoleBinding>,
    pub color: Option<RoleBinding>,
    pub measure: Option<RoleBinding>,
    pub selection: Option<RoleBinding>,
}

impl Roles {
    pub fn get(&self, role: ColumnRole) -> Option<&RoleBinding> {
        match role {
            ColumnRole::Latitude => self.latitude.as_ref(),
            ColumnRole::Longitude => self.longitude.as_ref(),
            ColumnRole::Location => self.location.as_ref(),
            ColumnRole::Color => self.color.as_ref(),
            ColumnRole::Measure => self.measure.as_ref(),
            ColumnRole::Selection => self.selection.as_ref(),
        }
    }

    pub fn set(&mut self, role: ColumnRole, binding: Option<RoleBinding>) {
        let slot = match role {
            ColumnRole::Latitude => &mut self.latitude,
            ColumnRole::Longitude => &mut self.longitude,
            ColumnRole::Location => &mut self.location,
            ColumnRole::Color => &mut self.color,
            ColumnRole::Measure => &mut self.measure,
            ColumnRole::Selection => &mut self.selection,
        };
        *slot = binding;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(into = "String")]
pub enum DisplayMode {
    #[default]
    Raw,
    Percentual,
}

impl From<&str> for DisplayMode {
    fn from(s: &str) -> Self {
        match s {
            "Percentual" => DisplayMode::Percentual,
            _ => DisplayMode::Raw,
        }
    }
}

impl From<String> for DisplayMode {
    fn from(s: String) -> Self {
        DisplayMode::from(s.as_str())
    }
}

// Only the exact string "Percentual" selects percentages; any other
// value, of any type, reads as Raw.
impl<'de> Deserialize<'de> for DisplayMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Mode {
            Text(String),
            Other(IgnoredAny),
        }

        Ok(match Mode::deserialize(deserializer)? {
            Mode::Text(s) => DisplayMode::from(s),
            Mode::Other(_) => DisplayMode::Raw,
        })
    }
}

impl From<DisplayMode> for String {
    fn from(mode: DisplayMode) -> Self {
        match mode {
            DisplayMode::Raw => "Raw".to_string(),
            DisplayMode::Percentual => "Percentual".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerStyle {
    pub fill_color: String,
    pub stroke_color: String,
    pub weight: f64,
    pub opacity: f64,
    pub fill_opacity: f64,
    pub radius: f64,
}

/// Popup text for a marker: bold title plus optional labelled lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Popup {
    pub title: String,
    pub measure: Option<(String, String)>,
    pub category: Option<(String, String)>,
}

impl Popup {
    pub fn lines(&self) -> impl Iterator<Item = &(String, String)> {
        self.measure.iter().chain(self.category.iter())
    }

    pub fn to_html(&self) -> String {
        let mut html = format!("<b>{}</b>", escape_html(&self.title));
        for (label, text) in self.lines() {
            html.push_str(&format!("<br>{}: {}", escape_html(label), escape_html(text)));
        }
        html
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerDescriptor {
    /// Position of the source row in the original dataset.
    pub row_index: usize,
    // x = longitude, y = latitude
    pub position: Point<f64>,
    pub style: MarkerStyle,
    pub popup: Popup,
}

impl MarkerDescriptor {
    pub fn lat(&self) -> f64 {
        self.position.y()
    }

    pub fn lon(&self) -> f64 {
        self.position.x()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub markers: Vec<MarkerDescriptor>,
    pub bounds: Option<Rect<f64>>,
}
