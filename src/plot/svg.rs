//! SVG chart of a candidate series, drawn with Plotters.
//!
//! The x axis is the day index (labelled with dates), the y axis the share in
//! percent. A missing day ends the current line segment; each candidate keeps
//! one colour and one legend entry however many segments it has.

use std::error::Error;
use std::path::Path;

use plotters::prelude::*;

use crate::domain::CandidateSeries;
use crate::error::AppError;

const PALETTE: [RGBColor; 8] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
];

/// Write `series` as an SVG file of `size` pixels.
pub fn write_svg_chart(path: &Path, series: &CandidateSeries, size: (u32, u32)) -> Result<(), AppError> {
    if size.0 < 200 || size.1 < 150 {
        return Err(AppError::Plot(format!(
            "chart size {}x{} is too small (minimum 200x150)",
            size.0, size.1
        )));
    }
    draw(path, series, size).map_err(|e| AppError::Plot(format!("{}: {e}", path.display())))
}

fn draw(path: &Path, series: &CandidateSeries, size: (u32, u32)) -> Result<(), Box<dyn Error>> {
    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let x_max = series.days.saturating_sub(1).max(1) as f64;
    let (y_min, y_max) = percent_bounds(series);

    let mut chart = ChartBuilder::on(&root)
        .caption(series.kind.file_stem().replace('_', " "), ("sans-serif", 20))
        .margin(10)
        .set_label_area_size(LabelAreaPosition::Left, 50)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(0.0..x_max, y_min..y_max)?;

    let start = series.start;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(6)
        .y_labels(8)
        .x_label_formatter(&|v| (start + chrono::Days::new(v.max(0.0).round() as u64)).to_string())
        .y_label_formatter(&|v| format!("{v:.0}%"))
        .y_desc("share")
        .draw()?;

    for (i, (name, column)) in series.columns.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let mut labelled = false;
        for run in runs(&column.values) {
            let anno = chart.draw_series(LineSeries::new(run, color.stroke_width(2)))?;
            if !labelled {
                anno.label(name.as_str()).legend(move |(x, y)| {
                    PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
                });
                labelled = true;
            }
        }
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Contiguous runs of present values as `(day, percent)` points.
fn runs(values: &[Option<f64>]) -> Vec<Vec<(f64, f64)>> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    for (day, value) in values.iter().enumerate() {
        match value {
            Some(v) => current.push((day as f64, v * 100.0)),
            None if !current.is_empty() => out.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn percent_bounds(series: &CandidateSeries) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for v in series.columns.values().flat_map(|c| c.values.iter().flatten()) {
        lo = lo.min(v * 100.0);
        hi = hi.max(v * 100.0);
    }
    if !lo.is_finite() || !hi.is_finite() || hi <= lo {
        return (0.0, 100.0);
    }
    let pad = ((hi - lo) * 0.05).max(0.5);
    ((lo - pad).max(0.0), hi + pad)
}
