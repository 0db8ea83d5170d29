use std::f64::consts::PI;
use std::fmt;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Both axes of the E/S plane span this interval.
pub const DENSITY_DOMAIN: (f64, f64) = (-0.1, 1.1);
/// Bandwidths at or below zero are raised to this value.
pub const MIN_BANDWIDTH: f64 = 1e-3;
pub const MIN_RESOLUTION: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kernel {
    Gaussian,
    Tophat,
    Epanechnikov,
    #[default]
    Linear,
}

impl Kernel {
    /// Normalised 2D kernel value at distance `r` for bandwidth `h`.
    pub fn evaluate(&self, r: f64, h: f64) -> f64 {
        let u = r / h;
        let h2 = h * h;
        match self {
            Kernel::Gaussian => (-0.5 * u * u).exp() / (2.0 * PI * h2),
            Kernel::Tophat => {
                if u < 1.0 { 1.0 / (PI * h2) } else { 0.0 }
            }
            Kernel::Epanechnikov => {
                if u < 1.0 { 2.0 * (1.0 - u * u) / (PI * h2) } else { 0.0 }
            }
            Kernel::Linear => {
                if u < 1.0 { 3.0 * (1.0 - u) / (PI * h2) } else { 0.0 }
            }
        }
    }

    fn support(&self, h: f64) -> f64 {
        match self {
            // Beyond 8 sigma the contribution is below double precision noise
            Kernel::Gaussian => 8.0 * h,
            _ => h,
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kernel::Gaussian => write!(f, "gaussian"),
            Kernel::Tophat => write!(f, "tophat"),
            Kernel::Epanechnikov => write!(f, "epanechnikov"),
            Kernel::Linear => write!(f, "linear"),
        }
    }
}

/// Density values on a square grid over the E/S plane. `z[(i, j)]` belongs to `(x[i], y[j])`.
#[derive(Debug, Clone)]
pub struct DensitySurface {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: DMatrix<f64>,
    pub levels: Vec<f64>,
    pub bandwidth: f64,
}

impl DensitySurface {
    pub fn resolution(&self) -> usize {
        self.x.len()
    }

    pub fn max_density(&self) -> f64 {
        self.z.iter().cloned().fold(0.0, f64::max)
    }

    /// Index of the highest contour level not above the value of cell `(i, j)`.
    /// A flat zero surface sits entirely in the lowest band.
    pub fn band(&self, i: usize, j: usize) -> usize {
        // The top level is the surface maximum
        if self.levels.last().map_or(true, |top| *top <= 0.0) {
            return 0;
        }
        let value = self.z[(i, j)];
        self.levels.iter().rposition(|level| *level <= value).unwrap_or(0)
    }

    pub fn n_bands(&self) -> usize {
        self.levels.len()
    }
}

pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| if i == n - 1 { end } else { start + step * i as f64 }).collect()
        }
    }
}

/// 2D kernel density estimate of (xdata, ydata) on a `resolution` x `resolution` grid,
/// quantised into `n_colors` levels. Never fails: empty input gives an all-zero surface.
pub fn contour_2d(
    xdata: &[f64],
    ydata: &[f64],
    bandwidth: f64,
    resolution: usize,
    kernel: Kernel,
    n_colors: usize,
) -> DensitySurface {
    let bandwidth = if bandwidth.is_finite() && bandwidth > MIN_BANDWIDTH { bandwidth } else { MIN_BANDWIDTH };
    let resolution = resolution.max(MIN_RESOLUTION);

    let grid = linspace(DENSITY_DOMAIN.0, DENSITY_DOMAIN.1, resolution);

    let points: Vec<(f64, f64)> = xdata
        .iter()
        .zip(ydata)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .collect();

    let mut z = DMatrix::<f64>::zeros(resolution, resolution);

    if !points.is_empty() {
        let support = kernel.support(bandwidth);
        let weight = 1.0 / points.len() as f64;

        for (i, gx) in grid.iter().enumerate() {
            for (j, gy) in grid.iter().enumerate() {
                let mut density = 0.0;
                for (px, py) in points.iter() {
                    let dx = gx - px;
                    let dy = gy - py;
                    if dx.abs() > support || dy.abs() > support {
                        continue;
                    }
                    density += kernel.evaluate((dx * dx + dy * dy).sqrt(), bandwidth);
                }
                z[(i, j)] = density * weight;
            }
        }
    }

    let max_density = z.iter().cloned().fold(0.0, f64::max);
    let levels = linspace(0.0, max_density, n_colors.max(1));

    log::debug!(
        "Density surface: {} points, bandwidth {:.4}, {}x{} grid, max {:.3}",
        points.len(),
        bandwidth,
        resolution,
        resolution,
        max_density
    );

    DensitySurface { x: grid.clone(), y: grid, z, levels, bandwidth }
}
