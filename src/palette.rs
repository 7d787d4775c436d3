//! Deterministic category -> color assignment.

use crate::types::Value;
use std::collections::HashMap;

/// Category palette, assigned cyclically in first-seen order.
pub const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd",
    "#8c564b", "#e377c2", "#7f7f7f", "#bcbd22", "#17becf",
];

/// Returned for lookups of a value the palette was not built from.
pub const UNASSIGNED_COLOR: &str = "#000000";

// Identity of a category value. Numbers compare by value with -0 == 0 and
// every NaN equal to every other NaN.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CategoryKey {
    Number(u64),
    Text(String),
    Null,
}

impl From<&Value> for CategoryKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Number(n) if n.is_nan() => CategoryKey::Number(f64::NAN.to_bits()),
            Value::Number(n) if *n == 0.0 => CategoryKey::Number(0f64.to_bits()),
            Value::Number(n) => CategoryKey::Number(n.to_bits()),
            Value::Text(s) => CategoryKey::Text(s.clone()),
            Value::Null => CategoryKey::Null,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ColorPalette {
    assigned: HashMap<CategoryKey, &'static str>,
}

impl ColorPalette {
    pub fn new<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut assigned = HashMap::new();
        for value in values {
            let next = assigned.len();
            assigned
                .entry(CategoryKey::from(value))
                .or_insert(PALETTE[next % PALETTE.len()]);
        }
        Self { assigned }
    }

    pub fn color_of(&self, value: &Value) -> &'static str {
        self.assigned
            .get(&CategoryKey::from(value))
            .copied()
            .unwrap_or(UNASSIGNED_COLOR)
    }

    /// Number of distinct categories seen.
    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}
