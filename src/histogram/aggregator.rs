use serde::{Deserialize, Serialize};

/// How many frames of each trace go into the histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrameSelection {
    #[default]
    All,
    FirstN(usize),
}

impl FrameSelection {
    pub fn max_frames(&self) -> Option<usize> {
        match self {
            FrameSelection::All => None,
            FrameSelection::FirstN(n) => Some(*n),
        }
    }
}

/// Pooled E/S pairs of a set of traces. `e` and `s` always have equal length.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PooledSample {
    pub e: Vec<f64>,
    pub s: Vec<f64>,
    pub n_samples: usize,
}

impl PooledSample {
    /// Concatenates per-trace results in trace order and trims them.
    pub fn pool(per_trace: &[(Vec<f64>, Vec<f64>)]) -> Self {
        let mut e_app = Vec::new();
        let mut s_app = Vec::new();

        for (e, s) in per_trace {
            e_app.extend_from_slice(e);
            s_app.extend_from_slice(s);
        }

        let (e, s) = trim_es(&e_app, &s_app);

        Self { e, s, n_samples: per_trace.len() }
    }

    pub fn n_points(&self) -> usize {
        self.e.len()
    }

    pub fn is_empty(&self) -> bool {
        self.e.is_empty()
    }

    /// True when the sample carries stoichiometry (ALEX) information.
    pub fn has_stoichiometry(&self) -> bool {
        !self.s.is_empty() && !contains_nan(&self.s)
    }
}

pub fn contains_nan(values: &[f64]) -> bool {
    values.iter().any(|v| v.is_nan())
}

/// Drops invalid pairs while keeping E and S aligned.
///
/// Without stoichiometry (any S is NaN) only the E value decides whether a pair is kept,
/// otherwise a NaN on either side removes the pair.
pub fn trim_es(e: &[f64], s: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let non_alex = contains_nan(s);

    e.iter()
        .zip(s)
        .filter(|(e, s)| {
            if non_alex {
                !e.is_nan()
            } else {
                !e.is_nan() && !s.is_nan()
            }
        })
        .map(|(e, s)| (*e, *s))
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_alex_drops_nan_pairs() {
        let e = vec![0.1, f64::NAN, 0.3, 0.4];
        let s = vec![0.5, 0.5, 0.5, 0.6];
        let (e_trim, s_trim) = trim_es(&e, &s);
        assert_eq!(e_trim, vec![0.1, 0.3, 0.4]);
        assert_eq!(s_trim, vec![0.5, 0.5, 0.6]);
    }

    #[test]
    fn test_trim_non_alex_keeps_e() {
        let e = vec![0.5, 0.5, f64::NAN];
        let s = vec![f64::NAN; 3];
        let (e_trim, s_trim) = trim_es(&e, &s);
        assert_eq!(e_trim, vec![0.5, 0.5]);
        assert_eq!(s_trim.len(), 2);
        assert!(s_trim.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_trim_empty() {
        let (e, s) = trim_es(&[], &[]);
        assert!(e.is_empty() && s.is_empty());
    }

    #[test]
    fn test_pool_counts() {
        let per_trace = vec![
            (vec![0.2, 0.3], vec![0.5, 0.5]),
            (vec![], vec![]),
            (vec![0.7], vec![0.4]),
        ];
        let pooled = PooledSample::pool(&per_trace);

        assert_eq!(pooled.n_samples, 3);
        assert_eq!(pooled.n_points(), 3);
        assert_eq!(pooled.e, vec![0.2, 0.3, 0.7]);
        assert!(pooled.has_stoichiometry());
    }

    #[test]
    fn test_frame_selection() {
        assert_eq!(FrameSelection::All.max_frames(), None);
        assert_eq!(FrameSelection::FirstN(25).max_frames(), Some(25));
    }
}
