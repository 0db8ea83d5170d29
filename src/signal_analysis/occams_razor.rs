/// Evaluates every candidate count in `min_n..=max_n` and keeps the one with the lowest
/// Bayesian information criterion. Ties go to the smaller count. Candidates for which
/// `test_function` returns `None` are skipped.
pub fn bayes_information_criterion_search<F>(mut test_function: F, min_n: usize, max_n: usize) -> Option<(usize, f64)>
where
    F: FnMut(usize) -> Option<(f64, usize, usize)>, // log-likelihood, total num parameters, num samples
{
    let mut best: Option<(usize, f64)> = None;

    for n in min_n..=max_n {
        let Some((log_likelihood, num_parameters, num_samples)) = test_function(n) else {
            continue;
        };
        let bic = compute_bic(log_likelihood, num_parameters, num_samples);

        match best {
            Some((_, best_bic)) if bic >= best_bic => {}
            _ => best = Some((n, bic)),
        }
    }

    best
}

pub fn compute_bic(log_likelihood: f64, k: usize, n_samples: usize) -> f64 {
    -2.0 * log_likelihood + (k as f64) * (n_samples as f64).ln()
}

/// Free parameters of a 1D mixture with `k` components: k means, k variances, k - 1 weights.
pub fn mixture_num_parameters(k: usize) -> usize {
    (3 * k).saturating_sub(1)
}
