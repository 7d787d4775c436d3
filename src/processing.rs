use crate::palette::ColorPalette;
use crate::types::{
    DisplayMode, MarkerDescriptor, MarkerStyle, Popup, Projection, RoleBinding, Roles, Row,
};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::{MultiPoint, Point};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};
use tracing::debug;

pub const DEFAULT_MARKER_SIZE: f64 = 10.0;
pub const DEFAULT_FILL_OPACITY: f64 = 0.7;
/// Fill used when no color role is bound.
pub const DEFAULT_FILL: &str = "#3388ff";
pub const STROKE_COLOR: &str = "gray";
const STROKE_WEIGHT: f64 = 1.0;
const STROKE_OPACITY: f64 = 1.0;

/// Options supplied by the host. Wrong-typed values fall back to defaults
/// instead of failing.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct DisplayOptions {
    #[serde(deserialize_with = "lenient_marker_size")]
    pub marker_size: f64,
    #[serde(deserialize_with = "lenient_fill_opacity")]
    pub fill_opacity: f64,
    pub display_mode: DisplayMode,
}

// A number, a numeric string, or anything else.
#[derive(Deserialize)]
#[serde(untagged)]
enum LenientNumber {
    Number(f64),
    Text(String),
    Other(IgnoredAny),
}

fn lenient_f64<'de, D>(deserializer: D, default: f64) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match LenientNumber::deserialize(deserializer)? {
        LenientNumber::Number(n) => Some(n),
        LenientNumber::Text(s) => s.trim().parse::<f64>().ok(),
        LenientNumber::Other(_) => None,
    };
    Ok(value.filter(|n| n.is_finite()).unwrap_or(default))
}

fn lenient_marker_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    lenient_f64(deserializer, DEFAULT_MARKER_SIZE)
}

fn lenient_fill_opacity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    lenient_f64(deserializer, DEFAULT_FILL_OPACITY)
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            marker_size: DEFAULT_MARKER_SIZE,
            fill_opacity: DEFAULT_FILL_OPACITY,
            display_mode: DisplayMode::Raw,
        }
    }
}

impl DisplayOptions {
    /// Marker radius; zero, negative or NaN falls back to the default.
    pub fn radius(&self) -> f64 {
        if self.marker_size.is_finite() && self.marker_size > 0.0 {
            self.marker_size
        } else {
            DEFAULT_MARKER_SIZE
        }
    }

    pub fn fill_opacity(&self) -> f64 {
        if self.fill_opacity.is_finite() && self.fill_opacity > 0.0 {
            self.fill_opacity.min(1.0)
        } else {
            DEFAULT_FILL_OPACITY
        }
    }
}

/// Sum of the measure over every row, unparsable values counting as zero.
/// Coordinate validity plays no part here.
pub fn total_measure(rows: &[Row], measure: &RoleBinding) -> f64 {
    rows.iter()
        .map(|row| row.get(&measure.column).number_or_zero())
        .sum()
}

/// Rounds to `digits` fraction digits with ties away from zero.
fn round_half_away(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    let scaled = (value * scale).round() / scale;
    if scaled.is_finite() {
        scaled
    } else {
        value
    }
}

// `{}` on f64 keeps the sign of zero.
fn unsigned_zero(n: f64) -> f64 {
    if n == 0.0 {
        0.0
    } else {
        n
    }
}

/// en-US number formatting: `,` grouping, up to three rounded fraction digits.
pub fn format_raw(value: f64) -> String {
    let fixed = format!("{:.3}", round_half_away(value, 3));
    let fixed = if fixed.contains('.') {
        fixed.trim_end_matches('0').trim_end_matches('.')
    } else {
        fixed.as_str()
    };

    let (negative, unsigned) = match fixed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, fixed),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let mut out = String::new();
    // "-0" rounds away
    if negative && (grouped != "0" || frac_part.is_some()) {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

pub fn format_percentage(value: f64, total: f64) -> String {
    let percentage = if total > 0.0 { value / total * 100.0 } else { 0.0 };
    format!("{:.1}%", unsigned_zero(round_half_away(percentage, 1)))
}

/// Turns rows into marker descriptors plus the region framing them.
///
/// Rows whose latitude or longitude does not parse to a finite number are
/// skipped. Each marker keeps the index of its row in `rows`.
pub fn project_markers(rows: &[Row], roles: &Roles, options: &DisplayOptions) -> Projection {
    let (Some(lat_role), Some(lon_role)) = (&roles.latitude, &roles.longitude) else {
        debug!("latitude or longitude role unbound, no markers");
        return Projection::default();
    };

    let colors = roles
        .color
        .as_ref()
        .map(|color| ColorPalette::new(rows.iter().map(|row| row.get(&color.column))));

    let total = match (&roles.measure, options.display_mode) {
        (Some(measure), DisplayMode::Percentual) => total_measure(rows, measure),
        _ => 0.0,
    };

    let radius = options.radius();
    let fill_opacity = options.fill_opacity();

    let markers: Vec<MarkerDescriptor> = rows
        .iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let lat = row.get(&lat_role.column).as_number()?;
            let lon = row.get(&lon_role.column).as_number()?;

            let title = match &roles.location {
                Some(location) => row.get(&location.column).to_string(),
                None => format!("{}, {}", unsigned_zero(lat), unsigned_zero(lon)),
            };

            let measure = roles.measure.as_ref().map(|measure| {
                let value = row.get(&measure.column).number_or_zero();
                let text = match options.display_mode {
                    DisplayMode::Percentual => format_percentage(value, total),
                    DisplayMode::Raw => format_raw(value),
                };
                (measure.label.clone(), text)
            });

            let (fill_color, category) = match (&roles.color, &colors) {
                (Some(color), Some(palette)) => {
                    let value = row.get(&color.column);
                    (
                        palette.color_of(value),
                        Some((color.label.clone(), value.to_string())),
                    )
                }
                _ => (DEFAULT_FILL, None),
            };

            Some(MarkerDescriptor {
                row_index: index,
                position: Point::new(lon, lat),
                style: MarkerStyle {
                    fill_color: fill_color.to_string(),
                    stroke_color: STROKE_COLOR.to_string(),
                    weight: STROKE_WEIGHT,
                    opacity: STROKE_OPACITY,
                    fill_opacity,
                    radius,
                },
                popup: Popup {
                    title,
                    measure,
                    category,
                },
            })
        })
        .collect();

    debug!("Projected {} markers from {} rows", markers.len(), rows.len());

    let bounds = MultiPoint::from(
        markers.iter().map(|m| m.position).collect::<Vec<Point<f64>>>(),
    )
    .bounding_rect();

    Projection { markers, bounds }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::PALETTE;
    use crate::types::Value;

    fn roles() -> Roles {
        Roles {
            latitude: Some(RoleBinding::new("lat", "Latitude")),
            longitude: Some(RoleBinding::new("lon", "Longitude")),
            ..Roles::default()
        }
    }

    fn row(lat: impl Into<Value>, lon: impl Into<Value>) -> Row {
        let (lat, lon): (Value, Value) = (lat.into(), lon.into());
        [("lat", lat), ("lon", lon)].into_iter().collect()
    }

    fn measured(lat: f64, lon: f64, sales: impl Into<Value>) -> Row {
        [
            ("lat", Value::Number(lat)),
            ("lon", Value::Number(lon)),
            ("sales", sales.into()),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn raw_format_groups_thousands() {
        assert_eq!(format_raw(1234.5), "1,234.5");
        assert_eq!(format_raw(1234567.0), "1,234,567");
        assert_eq!(format_raw(999.0), "999");
        assert_eq!(format_raw(0.0), "0");
        assert_eq!(format_raw(-1234.5), "-1,234.5");
    }

    #[test]
    fn raw_format_rounds_to_three_fraction_digits() {
        assert_eq!(format_raw(1.23456), "1.235");
        assert_eq!(format_raw(0.1), "0.1");
        assert_eq!(format_raw(-0.0001), "0");
        assert_eq!(format_raw(12.5), "12.5");
    }

    #[test]
    fn ties_round_away_from_zero() {
        assert_eq!(format_percentage(5.0, 16.0), "31.3%");
        assert_eq!(format_percentage(1.0, 400.0), "0.3%");
        assert_eq!(format_raw(0.0625), "0.063");
        assert_eq!(format_raw(1234.5625), "1,234.563");
        assert_eq!(format_raw(-0.0625), "-0.063");
    }

    #[test]
    fn synthesized_location_drops_negative_zero() {
        let rows = vec![row("-0", -0.0)];
        let projection = project_markers(&rows, &roles(), &DisplayOptions::default());
        assert_eq!(projection.markers[0].popup.title, "0, 0");
    }

    #[test]
    fn percentage_handles_zero_total() {
        assert_eq!(format_percentage(5.0, 0.0), "0.0%");
        assert_eq!(format_percentage(1.0, 3.0), "33.3%");
    }

    #[test]
    fn skips_rows_without_coordinates() {
        let rows = vec![
            row(53.3, -6.2),
            row("north", -6.2),
            row(Value::Null, 1.0),
            row("51.9", "-8.4"),
        ];
        let projection = project_markers(&rows, &roles(), &DisplayOptions::default());

        let indices: Vec<usize> = projection.markers.iter().map(|m| m.row_index).collect();
        assert_eq!(indices, vec![0, 3]);
    }

    #[test]
    fn synthesizes_location_from_coordinates() {
        let rows = vec![row(53.5, -6.0)];
        let projection = project_markers(&rows, &roles(), &DisplayOptions::default());

        let popup = &projection.markers[0].popup;
        assert_eq!(popup.title, "53.5, -6");
        assert_eq!(popup.measure, None);
        assert_eq!(popup.category, None);
    }

    #[test]
    fn location_role_used_verbatim() {
        let mut roles = roles();
        roles.location = Some(RoleBinding::new("town", "Town"));
        let rows: Vec<Row> = vec![[
            ("lat", Value::Number(1.0)),
            ("lon", Value::Number(2.0)),
            ("town", Value::from("Galway")),
        ]
        .into_iter()
        .collect()];

        let projection = project_markers(&rows, &roles, &DisplayOptions::default());
        assert_eq!(projection.markers[0].popup.title, "Galway");
    }

    #[test]
    fn percentual_mode_divides_by_total() {
        let mut roles = roles();
        roles.measure = Some(RoleBinding::new("sales", "Sales"));
        let rows: Vec<Row> = [10.0, 20.0, 30.0, 40.0]
            .iter()
            .map(|v| measured(1.0, 1.0, *v))
            .collect();
        let options = DisplayOptions {
            display_mode: DisplayMode::Percentual,
            ..DisplayOptions::default()
        };

        let projection = project_markers(&rows, &roles, &options);
        let texts: Vec<&str> = projection
            .markers
            .iter()
            .map(|m| m.popup.measure.as_ref().unwrap().1.as_str())
            .collect();
        assert_eq!(texts, vec!["10.0%", "20.0%", "30.0%", "40.0%"]);
    }

    #[test]
    fn total_includes_rows_without_coordinates() {
        let mut roles = roles();
        roles.measure = Some(RoleBinding::new("sales", "Sales"));
        let rows = vec![
            measured(1.0, 1.0, 25.0),
            [("lat", Value::from("?")), ("sales", Value::Number(75.0))]
                .into_iter()
                .collect(),
        ];
        let options = DisplayOptions {
            display_mode: DisplayMode::Percentual,
            ..DisplayOptions::default()
        };

        let projection = project_markers(&rows, &roles, &options);
        assert_eq!(projection.markers.len(), 1);
        assert_eq!(projection.markers[0].popup.measure.as_ref().unwrap().1, "25.0%");
    }

    #[test]
    fn zero_total_renders_zero_percent() {
        let mut roles = roles();
        roles.measure = Some(RoleBinding::new("sales", "Sales"));
        let rows = vec![measured(1.0, 1.0, 0.0), measured(2.0, 2.0, "n/a")];
        let options = DisplayOptions {
            display_mode: DisplayMode::Percentual,
            ..DisplayOptions::default()
        };

        let projection = project_markers(&rows, &roles, &options);
        for marker in &projection.markers {
            assert_eq!(marker.popup.measure.as_ref().unwrap().1, "0.0%");
        }
    }

    #[test]
    fn raw_mode_formats_and_labels_measure() {
        let mut roles = roles();
        roles.measure = Some(RoleBinding::new("sales", "Sales"));
        let rows = vec![measured(1.0, 1.0, "1234.5"), measured(1.0, 1.0, "bad")];

        let projection = project_markers(&rows, &roles, &DisplayOptions::default());
        assert_eq!(
            projection.markers[0].popup.measure,
            Some(("Sales".to_string(), "1,234.5".to_string()))
        );
        assert_eq!(projection.markers[1].popup.measure.as_ref().unwrap().1, "0");
    }

    #[test]
    fn color_role_sets_fill_and_popup_line() {
        let mut roles = roles();
        roles.color = Some(RoleBinding::new("region", "Region"));
        let rows: Vec<Row> = ["east", "west", "east"]
            .iter()
            .map(|r| {
                [
                    ("lat", Value::Number(1.0)),
                    ("lon", Value::Number(1.0)),
                    ("region", Value::from(*r)),
                ]
                .into_iter()
                .collect()
            })
            .collect();

        let projection = project_markers(&rows, &roles, &DisplayOptions::default());
        let fills: Vec<&str> = projection
            .markers
            .iter()
            .map(|m| m.style.fill_color.as_str())
            .collect();
        assert_eq!(fills, vec![PALETTE[0], PALETTE[1], PALETTE[0]]);
        assert_eq!(
            projection.markers[1].popup.category,
            Some(("Region".to_string(), "west".to_string()))
        );
    }

    #[test]
    fn palette_counts_categories_of_skipped_rows() {
        let mut roles = roles();
        roles.color = Some(RoleBinding::new("region", "Region"));
        let rows: Vec<Row> = vec![
            [("lat", Value::Null), ("lon", Value::Null), ("region", Value::from("a"))]
                .into_iter()
                .collect(),
            [("lat", Value::Number(1.0)), ("lon", Value::Number(1.0)), ("region", Value::from("b"))]
                .into_iter()
                .collect(),
        ];

        let projection = project_markers(&rows, &roles, &DisplayOptions::default());
        assert_eq!(projection.markers[0].style.fill_color, PALETTE[1]);
    }

    #[test]
    fn uniform_style_without_color_role() {
        let rows = vec![row(1.0, 1.0)];
        let projection = project_markers(&rows, &roles(), &DisplayOptions::default());
        let style = &projection.markers[0].style;

        assert_eq!(style.fill_color, DEFAULT_FILL);
        assert_eq!(style.stroke_color, STROKE_COLOR);
        assert_eq!(style.weight, 1.0);
        assert_eq!(style.opacity, 1.0);
        assert_eq!(style.fill_opacity, 0.7);
        assert_eq!(style.radius, 10.0);
    }

    #[test]
    fn zero_options_fall_back_to_defaults() {
        let options = DisplayOptions {
            marker_size: 0.0,
            fill_opacity: 0.0,
            display_mode: DisplayMode::Raw,
        };
        assert_eq!(options.radius(), DEFAULT_MARKER_SIZE);
        assert_eq!(options.fill_opacity(), DEFAULT_FILL_OPACITY);

        let custom = DisplayOptions {
            marker_size: 4.0,
            fill_opacity: 0.3,
            display_mode: DisplayMode::Raw,
        };
        assert_eq!(custom.radius(), 4.0);
        assert_eq!(custom.fill_opacity(), 0.3);
    }

    #[test]
    fn bounds_cover_valid_markers_only() {
        let rows = vec![row(10.0, -5.0), row("x", 100.0), row(-2.0, 7.0)];
        let projection = project_markers(&rows, &roles(), &DisplayOptions::default());

        let bounds = projection.bounds.unwrap();
        assert_eq!(bounds.min().x, -5.0);
        assert_eq!(bounds.max().x, 7.0);
        assert_eq!(bounds.min().y, -2.0);
        assert_eq!(bounds.max().y, 10.0);
    }

    #[test]
    fn no_markers_means_no_bounds() {
        let rows = vec![row("a", "b")];
        let projection = project_markers(&rows, &roles(), &DisplayOptions::default());
        assert!(projection.markers.is_empty());
        assert!(projection.bounds.is_none());

        assert_eq!(project_markers(&[], &roles(), &DisplayOptions::default()), Projection::default());
    }

    #[test]
    fn unbound_coordinates_yield_nothing() {
        let rows = vec![row(1.0, 1.0)];
        let projection = project_markers(&rows, &Roles::default(), &DisplayOptions::default());
        assert!(projection.markers.is_empty());
    }
}
