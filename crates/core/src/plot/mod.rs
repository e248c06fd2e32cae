//! Chart annotation geometry. Nothing here draws; callers render the
//! returned primitives with their plotting library of choice.

mod brackets;

pub use brackets::{bracket_geometry, AxisView, Bracket, BracketStyle, Point, TextPlacement};
