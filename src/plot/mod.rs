//! Charts of the daily series: a terminal rendering and an SVG file.

pub mod ascii;
pub mod svg;

pub use ascii::render_ascii_chart;
pub use svg::write_svg_chart;
