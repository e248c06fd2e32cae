use indexmap::IndexMap;

use crate::error::{AnalysisError, Result};

/// A point in data coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// The parts of a chart axis that bracket placement depends on.
#[derive(Debug, Clone)]
pub struct AxisView {
    /// Visible vertical range `(bottom, top)`.
    pub ylim: (f64, f64),
    /// Horizontal tick positions with their labels.
    pub ticks: Vec<(f64, String)>,
}

impl AxisView {
    pub fn y_span(&self) -> f64 {
        self.ylim.1 - self.ylim.0
    }

    fn tick_position(&self, category: &str) -> Option<f64> {
        self.ticks
            .iter()
            .find(|(_, label)| label == category)
            .map(|(x, _)| *x)
    }
}

/// Bracket sizing. `height` and `text_offset` are fractions of the visible
/// vertical span.
#[derive(Debug, Clone, Copy)]
pub struct BracketStyle {
    pub height: f64,
    pub text_offset: f64,
    pub line_width: f64,
    pub font_size: f64,
}

impl Default for BracketStyle {
    fn default() -> Self {
        Self {
            height: 0.02,
            text_offset: 0.01,
            line_width: 1.5,
            font_size: 12.0,
        }
    }
}

/// Label anchored at its bottom centre.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPlacement {
    pub anchor: Point,
    pub text: String,
    pub font_size: f64,
}

/// A drawable significance bracket: a polyline up, across and down, plus
/// its label.
#[derive(Debug, Clone, PartialEq)]
pub struct Bracket {
    pub points: [Point; 4],
    pub line_width: f64,
    pub text: TextPlacement,
}

/// Compute one bracket per comparison.
///
/// Horizontal positions come from `xmap` when given, otherwise from the
/// axis tick labels. Each bracket starts at its baseline `y`, rises by
/// `style.height` of the vertical span and carries its label a further
/// `style.text_offset` above. Endpoints are ordered left to right.
///
/// # Errors
/// [`AnalysisError::DimensionMismatch`] if `y_positions` or `labels` do not
/// match `comparisons` in length, [`AnalysisError::CategoryNotFound`] for
/// a category that cannot be placed.
pub fn bracket_geometry(
    view: &AxisView,
    comparisons: &[(&str, &str)],
    y_positions: &[f64],
    labels: &[&str],
    style: &BracketStyle,
    xmap: Option<&IndexMap<String, f64>>,
) -> Result<Vec<Bracket>> {
    for (got, context) in [(y_positions.len(), "y_positions"), (labels.len(), "labels")] {
        if got != comparisons.len() {
            return Err(AnalysisError::DimensionMismatch {
                expected: comparisons.len(),
                got,
                context: format!("bracket {}", context),
            });
        }
    }

    let span = view.y_span();
    let rise = style.height * span;
    let gap = style.text_offset * span;

    let position = |category: &str| -> Result<f64> {
        let found = match xmap {
            Some(map) => map.get(category).copied(),
            None => view.tick_position(category),
        };
        found.ok_or_else(|| AnalysisError::CategoryNotFound {
            category: category.to_string(),
            available: match xmap {
                Some(map) => map.keys().cloned().collect(),
                None => view.ticks.iter().map(|(_, l)| l.clone()).collect(),
            },
        })
    };

    comparisons
        .iter()
        .zip(y_positions)
        .zip(labels)
        .map(|((&(g1, g2), &y), &label)| {
            let mut x1 = position(g1)?;
            let mut x2 = position(g2)?;
            if x1 > x2 {
                std::mem::swap(&mut x1, &mut x2);
            }
            let top = y + rise;
            Ok(Bracket {
                points: [
                    Point { x: x1, y },
                    Point { x: x1, y: top },
                    Point { x: x2, y: top },
                    Point { x: x2, y },
                ],
                line_width: style.line_width,
                text: TextPlacement {
                    anchor: Point {
                        x: (x1 + x2) / 2.0,
                        y: top + gap,
                    },
                    text: label.to_string(),
                    font_size: style.font_size,
                },
            })
        })
        .collect()
}
