//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! Each candidate is drawn as a line of its own marker character; the
//! legend under the grid maps markers to names. Missing days break the line.

use std::collections::BTreeSet;

use crate::domain::CandidateSeries;

/// Render every column of `series` into one chart.
pub fn render_ascii_chart(series: &CandidateSeries, width: usize, height: usize) -> String {
    let (lo, hi) = share_bounds(series);
    let mut canvas = Canvas::new(width.max(10), height.max(5), lo, hi);
    let last_day = series.days.saturating_sub(1).max(1);
    let markers = assign_markers(series.columns.keys().map(String::as_str));

    for (column, &marker) in series.columns.values().zip(&markers) {
        let mut prev = None;
        for (day, value) in column.values.iter().enumerate() {
            let Some(v) = value else {
                prev = None;
                continue;
            };
            let cell = (canvas.column(day, last_day), canvas.row(*v));
            canvas.segment(prev.unwrap_or(cell), cell, marker);
            prev = Some(cell);
        }
    }

    let mut out = format!(
        "Plot: {} | dates=[{}, {}] | share=[{:.1}%, {:.1}%]\n",
        series.kind.file_stem(),
        series.start,
        series.end(),
        lo * 100.0,
        hi * 100.0,
    );
    for line in canvas.lines() {
        out.push_str(&line);
        out.push('\n');
    }

    let legend: Vec<String> = series
        .columns
        .keys()
        .zip(&markers)
        .map(|(name, marker)| format!("{marker}={name}"))
        .collect();
    out.push_str(&legend.join("  "));
    out.push('\n');
    out
}

/// Character grid; row 0 is the top (highest share).
struct Canvas {
    cells: Vec<Vec<char>>,
    lo: f64,
    hi: f64,
}

impl Canvas {
    fn new(width: usize, height: usize, lo: f64, hi: f64) -> Self {
        Self {
            cells: vec![vec![' '; width]; height],
            lo,
            hi,
        }
    }

    fn width(&self) -> usize {
        self.cells.first().map_or(0, Vec::len)
    }

    fn column(&self, day: usize, last_day: usize) -> usize {
        let span = self.width() - 1;
        ((day.min(last_day) * span + last_day / 2) / last_day).min(span)
    }

    fn row(&self, share: f64) -> usize {
        let bottom = (self.cells.len() - 1) as f64;
        let u = ((share - self.lo) / (self.hi - self.lo)).clamp(0.0, 1.0);
        (bottom * (1.0 - u)).round() as usize
    }

    /// Straight segment between two cells, inclusive, stepping along the
    /// longer axis.
    fn segment(&mut self, from: (usize, usize), to: (usize, usize), marker: char) {
        let (x0, y0) = (from.0 as f64, from.1 as f64);
        let (dx, dy) = (to.0 as f64 - x0, to.1 as f64 - y0);
        let steps = dx.abs().max(dy.abs()) as usize;
        for i in 0..=steps {
            let t = if steps == 0 { 0.0 } else { i as f64 / steps as f64 };
            let x = (x0 + dx * t).round() as usize;
            let y = (y0 + dy * t).round() as usize;
            if let Some(cell) = self.cells.get_mut(y).and_then(|row| row.get_mut(x)) {
                *cell = marker;
            }
        }
    }

    fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.cells
            .iter()
            .map(|row| row.iter().collect::<String>().trim_end().to_string())
    }
}

/// First letter of each name; later collisions fall back to digits.
fn assign_markers<'a>(names: impl Iterator<Item = &'a str>) -> Vec<char> {
    let mut used = BTreeSet::new();
    let mut spare = ('1'..='9').chain('a'..='z');
    names
        .map(|name| {
            let first = name.chars().next().map(|c| c.to_ascii_uppercase());
            match first {
                Some(c) if c.is_ascii_alphanumeric() && used.insert(c) => c,
                _ => spare.find(|c| used.insert(*c)).unwrap_or('#'),
            }
        })
        .collect()
}

/// Padded share range over every present value; `[0, 1]` when flat or empty.
fn share_bounds(series: &CandidateSeries) -> (f64, f64) {
    let (lo, hi) = series
        .columns
        .values()
        .flat_map(|c| c.values.iter().flatten())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let (lo, hi) = if lo.is_finite() && hi > lo { (lo, hi) } else { (0.0, 1.0) };
    let pad = ((hi - lo) * 0.05).max(1e-12);
    (lo - pad, hi + pad)
}
