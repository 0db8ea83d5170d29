use rand::seq::SliceRandom;
use rand::Rng;

pub const KMEANS_MAX_ITERS_DEFAULT: usize = 100;
pub const KMEANS_TOLERANCE_DEFAULT: f64 = 1e-6;

/// Lloyd's algorithm on 1D data, starting from `k` distinct samples picked at random.
/// Returns the cluster centres and the centre index assigned to each point.
pub fn k_means_1_d<R: Rng + ?Sized>(
    data: &[f64],
    k: usize,
    max_iterations: usize,
    tolerance: f64,
    rng: &mut R,
) -> (Vec<f64>, Vec<usize>) {
    if k == 0 || data.is_empty() {
        return (Vec::new(), vec![0; data.len()]);
    }

    let mut centers: Vec<f64> = data.choose_multiple(rng, k.min(data.len())).cloned().collect();

    let mut assignments = vec![0; data.len()];
    let mut iter = 0;

    loop {
        let mut changes = 0;

        // Assign points to the nearest cluster center
        for (i, &point) in data.iter().enumerate() {
            let closest_center = centers
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| (*a - point).abs().total_cmp(&(*b - point).abs()))
                .map(|(idx, _)| idx)
                .unwrap_or(0);

            if assignments[i] != closest_center {
                changes += 1;
                assignments[i] = closest_center;
            }
        }

        // Recompute cluster centers as the mean of assigned points
        let mut new_centers = vec![0.0; centers.len()];
        let mut counts = vec![0usize; centers.len()];

        for (assignment, &point) in assignments.iter().zip(data.iter()) {
            new_centers[*assignment] += point;
            counts[*assignment] += 1;
        }

        for i in 0..centers.len() {
            if counts[i] > 0 {
                new_centers[i] /= counts[i] as f64;
            } else {
                // Empty cluster keeps its previous centre
                new_centers[i] = centers[i];
            }
        }

        let max_shift = centers
            .iter()
            .zip(&new_centers)
            .map(|(old, new)| (old - new).abs())
            .fold(0.0, f64::max);

        centers = new_centers;

        iter += 1;
        if max_shift < tolerance || (changes == 0 && iter > 1) || iter >= max_iterations {
            break;
        }
    }

    (centers, assignments)
}
