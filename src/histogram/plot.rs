use std::path::{Path, PathBuf};

use plotters::prelude::*;
use thiserror::Error;

use super::aggregator::contains_nan;
use super::density::*;
use super::histogram_window::HistogramData;
use super::inspector::*;
use crate::signal_analysis::gaussian_component::GaussianComponent;

pub const MARGINAL_BIN_WIDTH: f64 = 0.02;
pub const N_CURVE_POINTS: usize = 300;

/// Left edges from -0.1 in steps of 0.02, stopping before 1.1.
pub fn marginal_bin_edges() -> Vec<f64> {
    let n_edges = ((DENSITY_DOMAIN.1 - DENSITY_DOMAIN.0) / MARGINAL_BIN_WIDTH).round() as usize;
    (0..n_edges).map(|i| DENSITY_DOMAIN.0 + MARGINAL_BIN_WIDTH * i as f64).collect()
}

/// Histogram over `edges` normalised so that its area is one. The last bin includes its
/// right edge; NaN and out-of-range values are ignored.
pub fn density_histogram(values: &[f64], edges: &[f64]) -> Vec<f64> {
    if edges.len() < 2 {
        return Vec::new();
    }

    let n_bins = edges.len() - 1;
    let (lo, hi) = (edges[0], edges[n_bins]);
    let mut counts = vec![0usize; n_bins];

    for &value in values.iter().filter(|v| !v.is_nan()) {
        if value < lo || value > hi {
            continue;
        }
        // Edges are sorted, the partition point is the first edge above the value
        let idx = edges.partition_point(|edge| *edge <= value).saturating_sub(1).min(n_bins - 1);
        counts[idx] += 1;
    }

    let total: usize = counts.iter().sum();
    if total == 0 {
        return vec![0.0; n_bins];
    }

    counts
        .iter()
        .zip(edges.windows(2))
        .map(|(count, edge)| *count as f64 / (total as f64 * (edge[1] - edge[0])))
        .collect()
}

#[derive(Debug, Clone)]
pub struct MarginalHistogram {
    pub edges: Vec<f64>,
    pub density: Vec<f64>,
    pub color: PlotColor,
}

impl MarginalHistogram {
    pub fn new(values: &[f64], color: PlotColor) -> Self {
        let edges = marginal_bin_edges();
        let density = density_histogram(values, &edges);
        Self { edges, density, color }
    }

    pub fn max_density(&self) -> f64 {
        self.density.iter().cloned().fold(0.0, f64::max)
    }
}

/// Fitted components evaluated on the plotting grid, with their sum.
#[derive(Debug, Clone)]
pub struct GaussianCurves {
    pub x: Vec<f64>,
    pub components: Vec<Vec<f64>>,
    pub joint: Vec<f64>,
}

impl GaussianCurves {
    pub fn evaluate(params: &[GaussianComponent]) -> Self {
        let x = linspace(DENSITY_DOMAIN.0, DENSITY_DOMAIN.1, N_CURVE_POINTS);
        let components: Vec<Vec<f64>> =
            params.iter().map(|c| x.iter().map(|xi| c.weighted_pdf(*xi)).collect()).collect();

        let mut joint = vec![0.0; x.len()];
        for curve in components.iter() {
            for (total, y) in joint.iter_mut().zip(curve) {
                *total += y;
            }
        }

        Self { x, components, joint }
    }
}

#[derive(Debug, Clone)]
pub struct CenterPanel {
    pub e: Vec<f64>,
    pub s: Vec<f64>,
    pub density: Option<DensitySurface>,
    pub colormap: ColorMapKind,
    /// Opacity of the scatter overlay, `None` when points are hidden.
    pub point_alpha: Option<f64>,
}

/// Everything a renderer needs to draw the E/S figure.
#[derive(Debug, Clone, Default)]
pub struct HistogramPlot {
    pub corrected: bool,
    pub top: Option<MarginalHistogram>,
    pub fit: Option<GaussianCurves>,
    pub right: Option<MarginalHistogram>,
    pub center: Option<CenterPanel>,
    pub annotations: Vec<String>,
}

impl HistogramPlot {
    /// Axes only, drawn when there is no data.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn build(
        data: &HistogramData,
        gauss_params: Option<&[GaussianComponent]>,
        corrected: bool,
        params: &DensityInspectorParams,
    ) -> Self {
        let (e, s) = data.active_es(corrected);
        let Some(e) = e else {
            return Self::empty();
        };

        let top = Some(MarginalHistogram::new(e, params.e_color()));
        let fit = gauss_params.map(GaussianCurves::evaluate);

        let s = s.filter(|s| !s.is_empty() && !contains_nan(s));
        let right = s.map(|s| MarginalHistogram::new(s, params.s_color()));
        let center = s.map(|s| {
            let density = params.show_density().then(|| {
                contour_2d(
                    e,
                    s,
                    params.normalized_bandwidth(),
                    params.resolution(),
                    Kernel::Linear,
                    params.n_colors(),
                )
            });

            CenterPanel {
                e: e.to_vec(),
                s: s.to_vec(),
                density,
                colormap: params.colormap(),
                point_alpha: params.overlay_points().then(|| params.normalized_point_alpha()),
            }
        });

        let mut annotations = vec![
            format!("N_traces = {}", data.n_samples()),
            format!("N_data = {}", data.n_points()),
        ];
        if let Some(gauss_params) = gauss_params {
            for (n, component) in gauss_params.iter().enumerate() {
                annotations.push(format!("mu_{} = {}", n + 1, component));
            }
        }
        let factors = data.factors;
        for (name, value) in [("alpha", factors.alpha), ("delta", factors.delta), ("beta", factors.beta), ("gamma", factors.gamma)]
        {
            annotations.push(format!("{} = {:.2}", name, value));
        }

        Self { corrected, top, fit, right, center, annotations }
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_none()
    }
}

/// Anything that can put a `HistogramPlot` on screen or on disk.
pub trait PlotRenderer {
    fn render(&mut self, plot: &HistogramPlot) -> Result<(), PlotError>;
}

#[derive(Debug, Clone, Error)]
pub enum PlotError {
    #[error("drawing backend failed: {reason}")]
    Backend { reason: String },
}

/// Writes the figure to a PNG file.
#[derive(Debug, Clone)]
pub struct BitMapRenderer {
    path: PathBuf,
    size: (u32, u32),
}

impl BitMapRenderer {
    pub fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf(), size: (900, 900) }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = (width, height);
        self
    }

    pub fn get_path(&self) -> &Path {
        &self.path
    }
}

impl PlotRenderer for BitMapRenderer {
    fn render(&mut self, plot: &HistogramPlot) -> Result<(), PlotError> {
        draw_histogram_plot(&self.path, self.size, plot).map_err(|err| PlotError::Backend { reason: err.to_string() })?;
        log::info!("Saved histogram figure to {:?}", self.path);
        Ok(())
    }
}

fn rgb(color: (u8, u8, u8)) -> RGBColor {
    RGBColor(color.0, color.1, color.2)
}

fn draw_histogram_plot(path: &Path, size: (u32, u32), plot: &HistogramPlot) -> Result<(), Box<dyn std::error::Error>> {
    let root_area = BitMapBackend::new(path, size).into_drawing_area();
    root_area.fill(&WHITE)?;

    let (width, height) = (size.0 as i32, size.1 as i32);
    let (upper, lower) = root_area.split_vertically(height / 4);
    let (top_area, _corner) = upper.split_horizontally(width * 3 / 4);
    let (center_area, right_area) = lower.split_horizontally(width * 3 / 4);

    let domain = DENSITY_DOMAIN.0..DENSITY_DOMAIN.1;

    // Top: E histogram and fitted gaussians
    let fit_max = plot.fit.as_ref().map_or(0.0, |fit| fit.joint.iter().cloned().fold(0.0, f64::max));
    let top_max = plot.top.as_ref().map_or(1.0, |top| top.max_density()).max(fit_max).max(1e-3) * 1.1;
    let label = if plot.corrected { "E (corrected)" } else { "E (apparent)" };

    let mut top_chart = ChartBuilder::on(&top_area)
        .caption(label, ("sans-serif", 20).into_font())
        .margin(10)
        .x_label_area_size(20)
        .y_label_area_size(30)
        .build_cartesian_2d(domain.clone(), 0.0..top_max)?;
    top_chart.configure_mesh().disable_mesh().draw()?;

    if let Some(top) = &plot.top {
        let color = rgb(top.color.rgb()).mix(0.8).filled();
        top_chart.draw_series(
            top.edges
                .windows(2)
                .zip(&top.density)
                .map(|(edge, d)| Rectangle::new([(edge[0], 0.0), (edge[1], *d)], color)),
        )?;
    }

    if let Some(fit) = &plot.fit {
        for curve in fit.components.iter() {
            top_chart.draw_series(LineSeries::new(fit.x.iter().cloned().zip(curve.iter().cloned()), &BLACK))?;
        }
        top_chart.draw_series(LineSeries::new(
            fit.x.iter().cloned().zip(fit.joint.iter().cloned()),
            rgb(PlotColor::Grey.rgb()).stroke_width(2),
        ))?;
    }

    // Right: S histogram, horizontal
    let right_max = plot.right.as_ref().map_or(1.0, |right| right.max_density()).max(1e-3) * 1.1;
    let mut right_chart = ChartBuilder::on(&right_area)
        .margin(10)
        .x_label_area_size(20)
        .y_label_area_size(30)
        .build_cartesian_2d(0.0..right_max, domain.clone())?;
    right_chart.configure_mesh().disable_mesh().y_desc("S").draw()?;

    if let Some(right) = &plot.right {
        let color = rgb(right.color.rgb()).mix(0.8).filled();
        right_chart.draw_series(
            right
                .edges
                .windows(2)
                .zip(&right.density)
                .map(|(edge, d)| Rectangle::new([(0.0, edge[0]), (*d, edge[1])], color)),
        )?;
    }

    // Center: density surface, points and text
    let mut center_chart = ChartBuilder::on(&center_area)
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(30)
        .build_cartesian_2d(domain.clone(), domain)?;
    center_chart.configure_mesh().disable_mesh().x_desc("E").y_desc("S").draw()?;

    if let Some(center) = &plot.center {
        if let Some(surface) = &center.density {
            let n = surface.resolution();
            let half_step = (surface.x[1] - surface.x[0]) / 2.0;
            let top_band = surface.n_bands().saturating_sub(1).max(1) as f64;
            let mut cells = Vec::with_capacity(n * n);
            for i in 0..n {
                for j in 0..n {
                    let color = rgb(center.colormap.sample(surface.band(i, j) as f64 / top_band)).filled();
                    let (x, y) = (surface.x[i], surface.y[j]);
                    cells.push(Rectangle::new([(x - half_step, y - half_step), (x + half_step, y + half_step)], color));
                }
            }
            center_chart.draw_series(cells)?;
        }

        if let Some(alpha) = center.point_alpha {
            let style = BLACK.mix(alpha).filled();
            center_chart.draw_series(center.e.iter().zip(&center.s).map(|(e, s)| Circle::new((*e, *s), 2, style)))?;
        }

        center_chart.draw_series(LineSeries::new(
            [(DENSITY_DOMAIN.0, 0.5), (DENSITY_DOMAIN.1, 0.5)],
            &BLACK.mix(0.3),
        ))?;
    }

    center_chart.draw_series(
        plot.annotations
            .iter()
            .enumerate()
            .map(|(n, line)| Text::new(line.clone(), (0.0, 1.05 - 0.05 * n as f64), ("sans-serif", 14).into_font())),
    )?;

    root_area.present()?;
    Ok(())
}
