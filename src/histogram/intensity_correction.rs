use serde::{Deserialize, Serialize};

use crate::trace_selection::fret_trace::{FretTrace, Intensities};

/// E and S values are clipped to this range before pooling.
pub const CLIP_RANGE: (f64, f64) = (-0.3, 1.3);

/// Leakage (alpha), direct excitation (delta), excitation (beta) and detection (gamma) factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectionFactors {
    pub alpha: f64,
    pub delta: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl CorrectionFactors {
    /// Only alpha and delta applied, beta and gamma left at identity.
    pub fn new(alpha: f64, delta: f64) -> Self {
        Self { alpha, delta, beta: 1.0, gamma: 1.0 }
    }

    pub fn with_ensemble(self, beta: f64, gamma: f64) -> Self {
        Self { beta, gamma, ..self }
    }

    pub fn is_ensemble_corrected(&self) -> bool {
        self.beta != 1.0 || self.gamma != 1.0
    }
}

impl Default for CorrectionFactors {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Background-subtracted channels with the leakage/direct-excitation corrected acceptor signal.
#[derive(Debug, Clone)]
pub struct CorrectedChannels {
    pub f_da: Vec<f64>,
    pub i_dd: Vec<f64>,
    pub i_da: Vec<f64>,
    pub i_aa: Vec<f64>,
}

pub fn correct_da(intensities: &Intensities, alpha: f64, delta: f64) -> CorrectedChannels {
    let subtract = |int: &[f64], bg: &[f64]| -> Vec<f64> { int.iter().zip(bg).map(|(i, b)| i - b).collect() };

    let i_dd = subtract(&intensities.grn_int, &intensities.grn_bg);
    let i_da = subtract(&intensities.acc_int, &intensities.acc_bg);
    let i_aa = subtract(&intensities.red_int, &intensities.red_bg);

    // A missing acceptor excitation channel must not poison E through the delta term
    let f_da = i_da
        .iter()
        .zip(&i_dd)
        .zip(&i_aa)
        .map(|((da, dd), aa)| {
            let direct = if aa.is_nan() { 0.0 } else { delta * aa };
            da - alpha * dd - direct
        })
        .collect();

    CorrectedChannels { f_da, i_dd, i_da, i_aa }
}

fn clip(value: f64) -> f64 {
    // NaN passes through untouched
    if value.is_nan() {
        value
    } else {
        value.clamp(CLIP_RANGE.0, CLIP_RANGE.1)
    }
}

/// Per-frame FRET efficiency. With gamma = 1 this is the apparent efficiency.
pub fn calc_e(intensities: &Intensities, alpha: f64, delta: f64, gamma: f64) -> Vec<f64> {
    let channels = correct_da(intensities, alpha, delta);

    channels
        .f_da
        .iter()
        .zip(&channels.i_dd)
        .map(|(f_da, dd)| clip(f_da / (gamma * dd + f_da)))
        .collect()
}

/// Per-frame stoichiometry. NaN everywhere when the trace has no acceptor excitation.
pub fn calc_s(intensities: &Intensities, alpha: f64, delta: f64, beta: f64, gamma: f64) -> Vec<f64> {
    let channels = correct_da(intensities, alpha, delta);
    let inv_beta = 1.0 / beta;

    channels
        .f_da
        .iter()
        .zip(&channels.i_dd)
        .zip(&channels.i_aa)
        .map(|((f_da, dd), aa)| {
            let donor_excited = gamma * dd + f_da;
            clip(donor_excited / (donor_excited + inv_beta * aa))
        })
        .collect()
}

/// End of the usable frame window: before the first bleach and within `max_frames`.
pub fn valid_frame_end(len: usize, first_bleach: Option<usize>, max_frames: Option<usize>) -> usize {
    let bleach_end = first_bleach.unwrap_or(len).min(len);
    max_frames.map_or(bleach_end, |max| bleach_end.min(max))
}

/// Removes the frames inside `[start, end)` blink intervals. Intervals reaching past the
/// end of `values` are clipped.
pub fn exclude_blink_intervals(values: &[f64], intervals: &[[usize; 2]]) -> Vec<f64> {
    if intervals.is_empty() {
        return values.to_vec();
    }

    let mut keep = vec![true; values.len()];
    for &[start, end] in intervals {
        let start = start.min(values.len());
        let end = end.min(values.len());
        for flag in keep[start..end.max(start)].iter_mut() {
            *flag = false;
        }
    }

    values
        .iter()
        .zip(keep)
        .filter_map(|(value, keep)| keep.then_some(*value))
        .collect()
}

/// E and S of one trace restricted to the frames before bleaching, optionally truncated to
/// `max_frames`, with blinks removed. Both sequences always have equal length.
pub fn drop_bleached_frames(
    intensities: &Intensities,
    bleaches: [Option<usize>; 2],
    factors: &CorrectionFactors,
    max_frames: Option<usize>,
    blink_intervals: &[[usize; 2]],
) -> (Vec<f64>, Vec<f64>) {
    let first_bleach = match bleaches {
        [Some(grn), Some(red)] => Some(grn.min(red)),
        [grn, red] => grn.or(red),
    };
    let end = valid_frame_end(intensities.len(), first_bleach, max_frames);

    let e_trace = calc_e(intensities, factors.alpha, factors.delta, factors.gamma);
    let s_trace = calc_s(intensities, factors.alpha, factors.delta, factors.beta, factors.gamma);

    let e_trace = exclude_blink_intervals(&e_trace[..end], blink_intervals);
    let s_trace = exclude_blink_intervals(&s_trace[..end], blink_intervals);

    (e_trace, s_trace)
}

/// Corrected E/S sequences of a single trace.
pub fn correct(trace: &FretTrace, factors: &CorrectionFactors, max_frames: Option<usize>) -> (Vec<f64>, Vec<f64>) {
    drop_bleached_frames(
        &trace.get_intensities(),
        trace.get_bleaches(),
        factors,
        max_frames,
        &trace.blink_intervals,
    )
}

/// Background-subtracted DD and DA of a trace up to its first bleach, blinks removed.
/// Unlike `correct`, the frame limit of the histogram does not apply here.
pub fn donor_excitation_channels(trace: &FretTrace) -> (Vec<f64>, Vec<f64>) {
    let channels = correct_da(&trace.get_intensities(), 0.0, 0.0);
    let end = valid_frame_end(trace.len(), trace.first_bleach(), None);

    (
        exclude_blink_intervals(&channels.i_dd[..end], &trace.blink_intervals),
        exclude_blink_intervals(&channels.i_da[..end], &trace.blink_intervals),
    )
}
