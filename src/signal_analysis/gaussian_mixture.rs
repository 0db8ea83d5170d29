use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use super::gaussian_component::GaussianComponent;
use super::kmeans::{k_means_1_d, KMEANS_MAX_ITERS_DEFAULT, KMEANS_TOLERANCE_DEFAULT};
use super::occams_razor::{bayes_information_criterion_search, compute_bic, mixture_num_parameters};

pub const MIN_POINTS_FOR_FIT: usize = 2;
pub const AUTO_MIN_COMPONENTS: usize = 1;
pub const AUTO_MAX_COMPONENTS: usize = 6;

const N_INIT_DEFAULT: usize = 3;
const MAX_ITER_DEFAULT: usize = 200;
const TOLERANCE_DEFAULT: f64 = 1e-4;
const REG_COVAR_DEFAULT: f64 = 1e-6;

/// Which component counts to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaussianFitMode {
    Auto,
    Fixed(usize),
}

impl GaussianFitMode {
    pub fn component_range(&self) -> (usize, usize) {
        match self {
            GaussianFitMode::Auto => (AUTO_MIN_COMPONENTS, AUTO_MAX_COMPONENTS),
            GaussianFitMode::Fixed(k) => (*k, *k),
        }
    }
}

impl FromStr for GaussianFitMode {
    type Err = GaussianMixtureError;

    /// `auto` or a positive number of components.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(GaussianFitMode::Auto);
        }
        match s.parse::<usize>() {
            Ok(k) if k > 0 => Ok(GaussianFitMode::Fixed(k)),
            _ => Err(GaussianMixtureError::UnknownFitMode { value: s.to_string() }),
        }
    }
}

/// A converged (or iteration-capped) mixture for one component count.
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    components: Vec<GaussianComponent>,
    log_likelihood: f64,
    n_iter: usize,
    converged: bool,
}

impl GaussianMixture {
    pub fn get_components(&self) -> &[GaussianComponent] {
        &self.components
    }

    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    pub fn get_log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    pub fn get_n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn has_converged(&self) -> bool {
        self.converged
    }

    pub fn bic(&self, n_samples: usize) -> f64 {
        compute_bic(self.log_likelihood, mixture_num_parameters(self.n_components()), n_samples)
    }
}

/// Result of the model selection over several component counts.
#[derive(Debug, Clone)]
pub struct MixtureSelection {
    pub best_model: GaussianMixture,
    pub best_k: usize,
    pub bic: f64,
}

impl MixtureSelection {
    pub fn get_components(&self) -> &[GaussianComponent] {
        self.best_model.get_components()
    }
}

#[derive(Debug, Clone)]
pub struct GaussianMixtureFitter {
    n_init: usize,
    max_iter: usize,
    tolerance: f64,
    reg_covar: f64,
    seed: Option<u64>,
}

impl Default for GaussianMixtureFitter {
    fn default() -> Self {
        Self {
            n_init: N_INIT_DEFAULT,
            max_iter: MAX_ITER_DEFAULT,
            tolerance: TOLERANCE_DEFAULT,
            reg_covar: REG_COVAR_DEFAULT,
            seed: None,
        }
    }
}

impl GaussianMixtureFitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_seed(&mut self, seed: Option<u64>) {
        self.seed = seed;
    }

    pub fn set_n_init(&mut self, n_init: usize) -> Result<(), GaussianMixtureError> {
        if n_init == 0 {
            return Err(GaussianMixtureError::InvalidInput);
        }
        self.n_init = n_init;
        Ok(())
    }

    pub fn set_termination(&mut self, max_iter: usize, tolerance: f64) -> Result<(), GaussianMixtureError> {
        if max_iter == 0 || tolerance.is_nan() || tolerance <= 0.0 {
            return Err(GaussianMixtureError::InvalidInput);
        }
        self.max_iter = max_iter;
        self.tolerance = tolerance;
        Ok(())
    }

    fn make_rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Fits every count in `min_k..=max_k` and keeps the lowest BIC, ties to the smaller count.
    /// Counts larger than the number of points are not tried.
    pub fn fit(&self, data: &[f64], min_k: usize, max_k: usize) -> Result<MixtureSelection, GaussianMixtureError> {
        if min_k == 0 || max_k == 0 {
            return Err(GaussianMixtureError::InvalidInput);
        }
        if max_k < min_k {
            return Err(GaussianMixtureError::IncompatibleInputs { min_k, max_k });
        }

        let data: Vec<f64> = data.iter().cloned().filter(|v| v.is_finite()).collect();
        if data.len() < MIN_POINTS_FOR_FIT {
            return Err(GaussianMixtureError::NotEnoughPoints { found: data.len() });
        }

        let max_k = max_k.min(data.len());
        if max_k < min_k {
            return Err(GaussianMixtureError::NotEnoughPoints { found: data.len() });
        }

        let mut rng = self.make_rng();
        let mut models: Vec<Option<GaussianMixture>> = Vec::with_capacity(max_k - min_k + 1);

        let (best_k, bic) = bayes_information_criterion_search(
            |k| {
                let model = self.fit_k_with_rng(&data, k, &mut rng).ok();
                let trial = model
                    .as_ref()
                    .map(|m| (m.get_log_likelihood(), mixture_num_parameters(k), data.len()));
                models.push(model);
                trial
            },
            min_k,
            max_k,
        )
        .ok_or(GaussianMixtureError::NoModelConverged)?;

        let best_model = models
            .into_iter()
            .nth(best_k - min_k)
            .flatten()
            .ok_or(GaussianMixtureError::NoModelConverged)?;

        log::debug!("Gaussian mixture selection: best k = {} (BIC {:.2}) over {} points", best_k, bic, data.len());

        Ok(MixtureSelection { best_model, best_k, bic })
    }

    /// Best of `n_init` EM runs with `k` components.
    pub fn fit_k(&self, data: &[f64], k: usize) -> Result<GaussianMixture, GaussianMixtureError> {
        let mut rng = self.make_rng();
        self.fit_k_with_rng(data, k, &mut rng)
    }

    fn fit_k_with_rng<R: Rng + ?Sized>(&self, data: &[f64], k: usize, rng: &mut R) -> Result<GaussianMixture, GaussianMixtureError> {
        if k == 0 {
            return Err(GaussianMixtureError::InvalidInput);
        }
        if data.len() < k.max(MIN_POINTS_FOR_FIT) {
            return Err(GaussianMixtureError::NotEnoughPoints { found: data.len() });
        }

        let mut best: Option<GaussianMixture> = None;
        for _ in 0..self.n_init {
            let Some(model) = self.run_em(data, k, rng) else { continue };
            if best.as_ref().map_or(true, |b| model.log_likelihood > b.log_likelihood) {
                best = Some(model);
            }
        }

        best.ok_or(GaussianMixtureError::NoModelConverged)
    }

    fn initial_parameters<R: Rng + ?Sized>(&self, data: &[f64], k: usize, rng: &mut R) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let n = data.len() as f64;
        let overall_mean = data.iter().sum::<f64>() / n;
        let overall_var = data.iter().map(|x| (x - overall_mean).powi(2)).sum::<f64>() / n + self.reg_covar;

        let (mut centers, assignments) = k_means_1_d(data, k, KMEANS_MAX_ITERS_DEFAULT, KMEANS_TOLERANCE_DEFAULT, rng);
        // Duplicate-heavy data can leave fewer distinct samples than components
        while centers.len() < k {
            centers.push(overall_mean);
        }

        let mut sums_sq = vec![0.0; k];
        let mut counts = vec![0usize; k];
        for (&x, &assignment) in data.iter().zip(&assignments) {
            sums_sq[assignment] += (x - centers[assignment]).powi(2);
            counts[assignment] += 1;
        }

        let variances = (0..k)
            .map(|c| {
                if counts[c] > 1 {
                    sums_sq[c] / counts[c] as f64 + self.reg_covar
                } else {
                    overall_var
                }
            })
            .collect();
        let weights = counts.iter().map(|&count| (count.max(1) as f64) / n).collect::<Vec<f64>>();
        let weight_sum: f64 = weights.iter().sum();
        let weights = weights.into_iter().map(|w| w / weight_sum).collect();

        (centers, variances, weights)
    }

    fn run_em<R: Rng + ?Sized>(&self, data: &[f64], k: usize, rng: &mut R) -> Option<GaussianMixture> {
        let n = data.len();
        let (mut means, mut variances, mut weights) = self.initial_parameters(data, k, rng);

        let mut log_resp = vec![vec![0.0; k]; n];
        let mut prev_mean_ll = f64::NEG_INFINITY;
        let mut converged = false;
        let mut n_iter = 0;

        for iter in 1..=self.max_iter {
            n_iter = iter;

            // E-step
            let mut log_likelihood: f64 = 0.0;
            for (i, &x) in data.iter().enumerate() {
                for c in 0..k {
                    log_resp[i][c] = weights[c].ln() + ln_normal(x, means[c], variances[c]);
                }
                let lse = log_sum_exp(&log_resp[i]);
                for value in log_resp[i].iter_mut() {
                    *value -= lse;
                }
                log_likelihood += lse;
            }

            if !log_likelihood.is_finite() {
                return None;
            }

            // M-step
            for c in 0..k {
                let resp: Vec<f64> = log_resp.iter().map(|row| row[c].exp()).collect();
                let nk = resp.iter().sum::<f64>() + 10.0 * f64::EPSILON;

                let mean = resp.iter().zip(data).map(|(r, x)| r * x).sum::<f64>() / nk;
                let var = resp.iter().zip(data).map(|(r, x)| r * (x - mean).powi(2)).sum::<f64>() / nk + self.reg_covar;

                means[c] = mean;
                variances[c] = var;
                weights[c] = nk / n as f64;
            }
            let weight_sum: f64 = weights.iter().sum();
            weights.iter_mut().for_each(|w| *w /= weight_sum);

            let mean_ll = log_likelihood / n as f64;
            if (mean_ll - prev_mean_ll).abs() < self.tolerance {
                converged = true;
                break;
            }
            prev_mean_ll = mean_ll;
        }

        // Likelihood of the final parameters
        let log_likelihood: f64 = data
            .iter()
            .map(|&x| {
                let terms: Vec<f64> = (0..k).map(|c| weights[c].ln() + ln_normal(x, means[c], variances[c])).collect();
                log_sum_exp(&terms)
            })
            .sum();

        if !converged {
            log::debug!("EM with {} components stopped after {} iterations without converging", k, n_iter);
        }

        let mut components = (0..k)
            .map(|c| GaussianComponent::new(means[c], variances[c].sqrt(), weights[c].clamp(0.0, 1.0)))
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        components.sort_by(|a, b| a.mean.total_cmp(&b.mean));

        Some(GaussianMixture { components, log_likelihood, n_iter, converged })
    }
}

/// Selects the mixture for `data` with the default fitter.
pub fn fit_gaussian_mixture(data: &[f64], min_k: usize, max_k: usize) -> Result<MixtureSelection, GaussianMixtureError> {
    GaussianMixtureFitter::new().fit(data, min_k, max_k)
}

fn ln_normal(x: f64, mean: f64, variance: f64) -> f64 {
    -0.5 * ((2.0 * std::f64::consts::PI * variance).ln() + (x - mean).powi(2) / variance)
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

#[derive(Debug, Clone, Error)]
pub enum GaussianMixtureError {
    #[error("component counts and iteration settings must be positive")]
    InvalidInput,
    #[error("min components ({min_k}) exceeds max components ({max_k})")]
    IncompatibleInputs { min_k: usize, max_k: usize },
    #[error("not enough points to fit a mixture ({found})")]
    NotEnoughPoints { found: usize },
    #[error("'{value}' is neither 'auto' nor a positive number of components")]
    UnknownFitMode { value: String },
    #[error("no mixture could be fitted")]
    NoModelConverged,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_distr::{Distribution, Normal};

    fn two_populations(seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let low = Normal::new(0.2, 0.04).unwrap();
        let high = Normal::new(0.7, 0.05).unwrap();
        let mut data: Vec<f64> = (0..400).map(|_| low.sample(&mut rng)).collect();
        data.extend((0..600).map(|_| high.sample(&mut rng)));
        data
    }

    fn seeded_fitter() -> GaussianMixtureFitter {
        let mut fitter = GaussianMixtureFitter::new();
        fitter.set_seed(Some(11));
        fitter
    }

    #[test]
    fn test_fixed_two_components() {
        let data = two_populations(1);
        let model = seeded_fitter().fit_k(&data, 2).unwrap();
        let components = model.get_components();

        assert_eq!(components.len(), 2);
        assert!((components[0].mean - 0.2).abs() < 0.02);
        assert!((components[1].mean - 0.7).abs() < 0.02);
        assert!((components[0].weight - 0.4).abs() < 0.05);
        assert!((components[1].sigma - 0.05).abs() < 0.01);

        let weight_sum: f64 = components.iter().map(|c| c.weight).sum();
        assert!((weight_sum - 1.0).abs() < 1e-9);
        assert!(components.iter().all(|c| c.sigma > 0.0));
    }

    #[test]
    fn test_log_likelihood_matches_final_components() {
        use crate::signal_analysis::gaussian_component::joint_density;

        let data = two_populations(3);
        let model = seeded_fitter().fit_k(&data, 2).unwrap();

        let expected: f64 = data.iter().map(|&x| joint_density(model.get_components(), x).ln()).sum();
        assert!(model.get_log_likelihood().is_finite());
        assert!((model.get_log_likelihood() - expected).abs() < 1e-6 * expected.abs().max(1.0));
    }

    #[test]
    fn test_auto_selects_two_components() {
        let data = two_populations(2);
        let (min_k, max_k) = GaussianFitMode::Auto.component_range();
        let selection = seeded_fitter().fit(&data, min_k, max_k).unwrap();

        assert_eq!(selection.best_k, 2);
        assert_eq!(selection.get_components().len(), 2);
    }

    #[test]
    fn test_single_population_prefers_one_component() {
        let mut rng = StdRng::seed_from_u64(5);
        let normal = Normal::new(0.5, 0.05).unwrap();
        let data: Vec<f64> = (0..500).map(|_| normal.sample(&mut rng)).collect();

        let selection = seeded_fitter().fit(&data, 1, 4).unwrap();
        assert_eq!(selection.best_k, 1);
        assert!((selection.get_components()[0].mean - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_not_enough_points() {
        let result = fit_gaussian_mixture(&[0.5], 1, 6);
        assert!(matches!(result, Err(GaussianMixtureError::NotEnoughPoints { found: 1 })));

        let result = fit_gaussian_mixture(&[], 1, 6);
        assert!(matches!(result, Err(GaussianMixtureError::NotEnoughPoints { found: 0 })));
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(matches!(fit_gaussian_mixture(&[0.1, 0.2], 0, 2), Err(GaussianMixtureError::InvalidInput)));
        assert!(matches!(
            fit_gaussian_mixture(&[0.1, 0.2], 3, 2),
            Err(GaussianMixtureError::IncompatibleInputs { min_k: 3, max_k: 2 })
        ));
    }

    #[test]
    fn test_identical_values_fit() {
        let selection = seeded_fitter().fit(&[0.5, 0.5, 0.5], 1, 6).unwrap();
        assert_eq!(selection.best_k, 1);
        assert!((selection.get_components()[0].mean - 0.5).abs() < 1e-9);
        assert!(selection.get_components()[0].sigma > 0.0);
    }

    #[test]
    fn test_fit_mode_from_str() {
        assert_eq!("auto".parse::<GaussianFitMode>().unwrap(), GaussianFitMode::Auto);
        assert_eq!(" 3 ".parse::<GaussianFitMode>().unwrap(), GaussianFitMode::Fixed(3));
        assert!("0".parse::<GaussianFitMode>().is_err());
        assert!("many".parse::<GaussianFitMode>().is_err());
        assert_eq!(GaussianFitMode::Fixed(2).component_range(), (2, 2));
    }

    #[test]
    fn test_log_sum_exp() {
        let value = log_sum_exp(&[0.0_f64.ln(), 1.0_f64.ln(), 3.0_f64.ln()]);
        assert!((value - 4.0_f64.ln()).abs() < 1e-12);
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY]), f64::NEG_INFINITY);
    }
}
