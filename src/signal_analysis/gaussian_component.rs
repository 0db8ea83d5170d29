use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One weighted normal component of a mixture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianComponent {
    pub mean: f64,
    pub sigma: f64,
    pub weight: f64,
}

impl GaussianComponent {
    pub fn new(mean: f64, sigma: f64, weight: f64) -> Result<Self, GaussianComponentError> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(GaussianComponentError::InvalidSigma { sigma });
        }
        if !(0.0..=1.0).contains(&weight) {
            return Err(GaussianComponentError::InvalidWeight { weight });
        }
        if !mean.is_finite() {
            return Err(GaussianComponentError::InvalidMean { mean });
        }

        Ok(Self { mean, sigma, weight })
    }

    pub fn variance(&self) -> f64 {
        self.sigma * self.sigma
    }

    /// Unweighted normal density at `x`.
    pub fn pdf(&self, x: f64) -> f64 {
        let exponent = -(x - self.mean).powi(2) / (2.0 * self.variance());
        exponent.exp() / (self.sigma * (2.0 * PI).sqrt())
    }

    pub fn ln_pdf(&self, x: f64) -> f64 {
        -(x - self.mean).powi(2) / (2.0 * self.variance()) - self.sigma.ln() - 0.5 * (2.0 * PI).ln()
    }

    /// Density scaled by the component weight, as drawn over a normalised histogram.
    pub fn weighted_pdf(&self, x: f64) -> f64 {
        self.weight * self.pdf(x)
    }
}

impl fmt::Display for GaussianComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} ± {:.2} ({:.2})", self.mean, self.sigma, self.weight)
    }
}

/// Sum of the weighted densities of all components.
pub fn joint_density(components: &[GaussianComponent], x: f64) -> f64 {
    components.iter().map(|c| c.weighted_pdf(x)).sum()
}

#[derive(Debug, Clone, Error)]
pub enum GaussianComponentError {
    #[error("sigma must be positive, got {sigma}")]
    InvalidSigma { sigma: f64 },
    #[error("weight must lie in [0, 1], got {weight}")]
    InvalidWeight { weight: f64 },
    #[error("mean must be finite, got {mean}")]
    InvalidMean { mean: f64 },
}
