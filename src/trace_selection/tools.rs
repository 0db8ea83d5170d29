pub fn median_filter(values: &[f64], window_size: usize) -> Vec<f64> {
    let mut filtered = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        let start = i.saturating_sub(window_size / 2);
        let end = (i + window_size / 2 + 1).min(values.len());

        let mut window: Vec<f64> = values[start..end].to_vec();
        window.sort_by(|a, b| a.total_cmp(b));

        let median = if window.len() % 2 == 0 {
            (window[window.len() / 2 - 1] + window[window.len() / 2]) / 2.0
        } else {
            window[window.len() / 2]
        };

        filtered.push(median);
    }
    filtered
}

pub fn compute_gradient(filtered_values: &[f64]) -> Vec<f64> {
    filtered_values.windows(2).map(|pair| pair[1] - pair[0]).collect()
}

/// Mean and sample standard deviation. Fewer than two values give a zero std.
pub fn compute_mean_and_std(values: &[f64]) -> [f64; 2] {
    if values.is_empty() {
        return [f64::NAN, 0.0];
    }
    let mean: f64 = values.iter().sum::<f64>() / values.len() as f64;
    if values.len() < 2 {
        return [mean, 0.0];
    }
    let variance: f64 = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    [mean, variance.sqrt()]
}

/// Pearson correlation of two equally long series. `None` when either side is flat.
pub fn pearson_correlation(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }

    let mean_x = x[..n].iter().sum::<f64>() / n as f64;
    let mean_y = y[..n].iter().sum::<f64>() / n as f64;

    let mut numerator = 0.0;
    let mut sum_sq_x = 0.0;
    let mut sum_sq_y = 0.0;
    for (a, b) in x[..n].iter().zip(&y[..n]) {
        numerator += (a - mean_x) * (b - mean_y);
        sum_sq_x += (a - mean_x).powi(2);
        sum_sq_y += (b - mean_y).powi(2);
    }

    let denominator = (sum_sq_x * sum_sq_y).sqrt();
    if denominator == 0.0 {
        return None;
    }
    Some(numerator / denominator)
}
