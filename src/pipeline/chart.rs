//! Result charts.

use std::path::Path;

use plotters::prelude::*;

use crate::conversation::ReportData;
use crate::error::ChartError;

/// What to plot. The first declared variable is the x axis, the second the y
/// axis; further columns are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub points: Vec<(f64, f64)>,
}

impl ChartSpec {
    /// Build a spec from the report's data table, or `None` when there is
    /// nothing to plot.
    pub fn from_report(data: &ReportData) -> Option<Self> {
        if !data.is_chartable() {
            return None;
        }
        let x_label = data.variables[0].clone();
        let y_label = data.variables[1].clone();
        let points = data
            .rows
            .iter()
            .map(|row| {
                (
                    row.first().copied().unwrap_or(0.0),
                    row.get(1).copied().unwrap_or(0.0),
                )
            })
            .collect();

        Some(Self {
            title: format!("Resultados: {y_label} vs {x_label}"),
            x_label,
            y_label,
            points,
        })
    }
}

/// Renders a chart image to a file. Implementations are blocking.
pub trait ChartRenderer: Send + Sync {
    fn render(&self, spec: &ChartSpec, dest: &Path) -> Result<(), ChartError>;
}

/// Line-and-marker scatter plot written as PNG.
#[derive(Debug, Clone)]
pub struct ScatterChart {
    pub width: u32,
    pub height: u32,
}

impl Default for ScatterChart {
    fn default() -> Self {
        Self {
            width: 600,
            height: 400,
        }
    }
}

impl ChartRenderer for ScatterChart {
    fn render(&self, spec: &ChartSpec, dest: &Path) -> Result<(), ChartError> {
        let (x_min, x_max) = padded_range(spec.points.iter().map(|p| p.0));
        let (y_min, y_max) = padded_range(spec.points.iter().map(|p| p.1));

        let root = BitMapBackend::new(dest, (self.width, self.height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption(&spec.title, ("sans-serif", 20))
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(55)
            .build_cartesian_2d(x_min..x_max, y_min..y_max)
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .x_desc(spec.x_label.as_str())
            .y_desc(spec.y_label.as_str())
            .draw()
            .map_err(render_err)?;

        chart
            .draw_series(LineSeries::new(spec.points.iter().copied(), &BLUE))
            .map_err(render_err)?;
        chart
            .draw_series(
                spec.points
                    .iter()
                    .map(|&(x, y)| Circle::new((x, y), 4, BLUE.filled())),
            )
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
        Ok(())
    }
}

fn render_err(e: impl std::fmt::Display) -> ChartError {
    ChartError::Render(e.to_string())
}

/// Min and max of `values` with 5% padding on each side. A flat series is
/// widened by 1.0 so the axis has a span.
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    let span = max - min;
    let pad = if span == 0.0 { 1.0 } else { span * 0.05 };
    (min - pad, max + pad)
}
