//! Population-level beta/gamma estimate from apparent E and S.
//!
//! Based on the linear dependence of the inverse apparent stoichiometry on the apparent
//! efficiency described in Lee et al., "Accurate FRET measurements within single diffusing
//! biomolecules using alternating-laser excitation", Biophys. J. 88 (2005):
//!
//! 1/S = Omega + Sigma * E,  beta = Omega + Sigma - 1,  gamma = (Omega - 1) / (Omega + Sigma - 1)

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

use super::aggregator::{contains_nan, trim_es};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsembleFactors {
    pub beta: f64,
    pub gamma: f64,
}

/// Least-squares fit of 1/S against E. Fails on empty, NaN-containing or degenerate samples.
pub fn beta_gamma_factor(e_app: &[f64], s_app: &[f64]) -> Result<EnsembleFactors, EnsembleCorrectionError> {
    if e_app.len() != s_app.len() {
        return Err(EnsembleCorrectionError::LengthMismatch { e_len: e_app.len(), s_len: s_app.len() });
    }
    if contains_nan(s_app) {
        return Err(EnsembleCorrectionError::MissingStoichiometry);
    }

    let (e_app, s_app) = trim_es(e_app, s_app);
    if e_app.len() < 2 {
        return Err(EnsembleCorrectionError::NotEnoughPoints { found: e_app.len() });
    }
    if s_app.iter().any(|s| *s == 0.0) {
        return Err(EnsembleCorrectionError::ZeroStoichiometry);
    }

    let n = e_app.len();
    let mean_e = e_app.iter().sum::<f64>() / n as f64;
    let var_e = e_app.iter().map(|e| (e - mean_e).powi(2)).sum::<f64>() / n as f64;
    if var_e <= f64::EPSILON {
        return Err(EnsembleCorrectionError::ZeroVariance);
    }

    // Design matrix [1, E], target 1/S
    let design = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { e_app[i] });
    let target = DVector::from_iterator(n, s_app.iter().map(|s| 1.0 / s));

    let coefficients = design
        .svd(true, true)
        .solve(&target, 1e-12)
        .map_err(|_| EnsembleCorrectionError::SingularSystem)?;

    let intercept = coefficients[0];
    let slope = coefficients[1];

    let beta = intercept + slope - 1.0;
    let gamma = (intercept - 1.0) / beta;

    if !beta.is_finite() || !gamma.is_finite() || beta <= 0.0 || gamma <= 0.0 {
        return Err(EnsembleCorrectionError::NonPhysicalFactors { beta, gamma });
    }

    log::debug!("Ensemble correction from {} points: beta = {:.3}, gamma = {:.3}", n, beta, gamma);

    Ok(EnsembleFactors { beta, gamma })
}

#[derive(Debug, Clone, Error)]
pub enum EnsembleCorrectionError {
    #[error("E has {e_len} values but S has {s_len}")]
    LengthMismatch { e_len: usize, s_len: usize },
    #[error("stoichiometry is missing (non-ALEX data)")]
    MissingStoichiometry,
    #[error("not enough points for the fit ({found})")]
    NotEnoughPoints { found: usize },
    #[error("stoichiometry contains zeros")]
    ZeroStoichiometry,
    #[error("apparent E has zero variance")]
    ZeroVariance,
    #[error("least-squares system is singular")]
    SingularSystem,
    #[error("fit produced non-physical factors (beta = {beta}, gamma = {gamma})")]
    NonPhysicalFactors { beta: f64, gamma: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    // Apparent E/S of a molecule with true efficiency `e` for the given detection/excitation factors
    fn apparent(e: f64, beta: f64, gamma: f64) -> (f64, f64) {
        let n = 1000.0;
        let dd = n * (1.0 - e) / gamma;
        let da = n * e;
        let aa = beta * n;
        (da / (dd + da), (dd + da) / (dd + da + aa))
    }

    #[test]
    fn test_recovers_known_factors() {
        let (beta_true, gamma_true) = (0.8, 1.6);
        let (e_app, s_app): (Vec<f64>, Vec<f64>) = [0.2, 0.35, 0.5, 0.65, 0.8]
            .iter()
            .map(|e| apparent(*e, beta_true, gamma_true))
            .unzip();

        let factors = beta_gamma_factor(&e_app, &s_app).unwrap();
        assert!((factors.beta - beta_true).abs() < 1e-6);
        assert!((factors.gamma - gamma_true).abs() < 1e-6);
    }

    #[test]
    fn test_missing_stoichiometry_is_rejected() {
        let result = beta_gamma_factor(&[0.5, 0.4], &[f64::NAN, f64::NAN]);
        assert!(matches!(result, Err(EnsembleCorrectionError::MissingStoichiometry)));
    }

    #[test]
    fn test_empty_and_degenerate_samples() {
        assert!(matches!(beta_gamma_factor(&[], &[]), Err(EnsembleCorrectionError::NotEnoughPoints { found: 0 })));

        let result = beta_gamma_factor(&[0.5, 0.5, 0.5], &[0.4, 0.5, 0.6]);
        assert!(matches!(result, Err(EnsembleCorrectionError::ZeroVariance)));
    }

    #[test]
    fn test_length_mismatch() {
        let result = beta_gamma_factor(&[0.5, 0.4], &[0.5]);
        assert!(matches!(result, Err(EnsembleCorrectionError::LengthMismatch { .. })));
    }
}
