use std::fmt;

use thiserror::Error;

use super::tools::*;
use crate::histogram::intensity_correction::calc_s;

/// Channels of an ALEX trace file. Background channels are optional and read as zero when absent.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub enum TraceType {
    DemDexc,
    AemDexc,
    AemAexc,
    BackgroundDemDexc,
    BackgroundAemDexc,
    BackgroundAemAexc,
}

impl fmt::Display for TraceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceType::DemDexc => write!(f, "D-Dexc"),
            TraceType::AemDexc => write!(f, "A-Dexc"),
            TraceType::AemAexc => write!(f, "A-Aexc"),
            TraceType::BackgroundDemDexc => write!(f, "D-Dexc-bg"),
            TraceType::BackgroundAemDexc => write!(f, "A-Dexc-bg"),
            TraceType::BackgroundAemAexc => write!(f, "A-Aexc-bg"),
        }
    }
}

/// Raw intensities of one trace, in the order (grn, grn bg, acc, acc bg, red, red bg).
/// A missing acceptor-excitation channel is filled with NaN, missing backgrounds with zeros.
#[derive(Debug, Clone)]
pub struct Intensities {
    pub grn_int: Vec<f64>,
    pub grn_bg: Vec<f64>,
    pub acc_int: Vec<f64>,
    pub acc_bg: Vec<f64>,
    pub red_int: Vec<f64>,
    pub red_bg: Vec<f64>,
}

impl Intensities {
    pub fn len(&self) -> usize {
        self.grn_int.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grn_int.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PhotobleachingFilterValues {
    pub median_filter_window_size: usize,
    pub noise_threshold_multiple: f64,
}

impl Default for PhotobleachingFilterValues {
    fn default() -> Self {
        Self {
            median_filter_window_size: 9,
            noise_threshold_multiple: 4.0,
        }
    }
}

#[derive(Clone)]
pub struct FretTrace {
    name: String,

    dd: Vec<f64>,
    da: Vec<f64>,
    aa: Option<Vec<f64>>,
    dd_bg: Option<Vec<f64>>,
    da_bg: Option<Vec<f64>>,
    aa_bg: Option<Vec<f64>>,

    grn_bleach: Option<usize>,
    red_bleach: Option<usize>,
    pub blink_intervals: Vec<[usize; 2]>,

    is_checked: bool,
    stoi: Option<Vec<f64>>,
}

impl FretTrace {
    pub fn new(name: &str, dd: Vec<f64>, da: Vec<f64>, aa: Option<Vec<f64>>) -> Result<Self, FretTraceError> {
        check_channel_validity(&dd, TraceType::DemDexc, None)?;
        check_channel_validity(&da, TraceType::AemDexc, Some(dd.len()))?;
        if let Some(aa) = &aa {
            check_channel_validity(aa, TraceType::AemAexc, Some(dd.len()))?;
        }

        Ok(Self {
            name: name.to_string(),
            dd,
            da,
            aa,
            dd_bg: None,
            da_bg: None,
            aa_bg: None,
            grn_bleach: None,
            red_bleach: None,
            blink_intervals: Vec::new(),
            is_checked: false,
            stoi: None,
        })
    }

    pub fn set_background(&mut self, trace_type: TraceType, values: Vec<f64>) -> Result<(), FretTraceError> {
        check_channel_validity(&values, trace_type, Some(self.len()))?;

        match trace_type {
            TraceType::BackgroundDemDexc => self.dd_bg = Some(values),
            TraceType::BackgroundAemDexc => self.da_bg = Some(values),
            TraceType::BackgroundAemAexc => {
                if self.aa.is_none() {
                    return Err(FretTraceError::ChannelNotPresent { trace_type: TraceType::AemAexc });
                }
                self.aa_bg = Some(values)
            }
            _ => return Err(FretTraceError::NotABackgroundChannel { trace_type }),
        }

        // Cached stoichiometry is stale now
        self.stoi = None;

        Ok(())
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.dd.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dd.is_empty()
    }

    pub fn is_alex(&self) -> bool {
        self.aa.is_some()
    }

    pub fn is_checked(&self) -> bool {
        self.is_checked
    }

    pub fn set_checked(&mut self, checked: bool) {
        self.is_checked = checked;
    }

    pub fn get_channel(&self, trace_type: TraceType) -> Option<&[f64]> {
        match trace_type {
            TraceType::DemDexc => Some(&self.dd),
            TraceType::AemDexc => Some(&self.da),
            TraceType::AemAexc => self.aa.as_deref(),
            TraceType::BackgroundDemDexc => self.dd_bg.as_deref(),
            TraceType::BackgroundAemDexc => self.da_bg.as_deref(),
            TraceType::BackgroundAemAexc => self.aa_bg.as_deref(),
        }
    }

    pub fn get_intensities(&self) -> Intensities {
        let n = self.len();
        let zeros = || vec![0.0; n];

        Intensities {
            grn_int: self.dd.clone(),
            grn_bg: self.dd_bg.clone().unwrap_or_else(zeros),
            acc_int: self.da.clone(),
            acc_bg: self.da_bg.clone().unwrap_or_else(zeros),
            red_int: self.aa.clone().unwrap_or_else(|| vec![f64::NAN; n]),
            red_bg: self.aa_bg.clone().unwrap_or_else(zeros),
        }
    }

    pub fn set_bleaches(&mut self, grn_bleach: Option<usize>, red_bleach: Option<usize>) {
        self.grn_bleach = grn_bleach;
        self.red_bleach = red_bleach;
    }

    /// (donor bleach frame, acceptor bleach frame)
    pub fn get_bleaches(&self) -> [Option<usize>; 2] {
        [self.grn_bleach, self.red_bleach]
    }

    /// Earliest of the two bleach frames, ignoring the ones that were never detected.
    pub fn first_bleach(&self) -> Option<usize> {
        match (self.grn_bleach, self.red_bleach) {
            (Some(grn), Some(red)) => Some(grn.min(red)),
            (Some(grn), None) => Some(grn),
            (None, red) => red,
        }
    }

    pub fn add_blink_interval(&mut self, start: usize, end: usize) -> Result<(), FretTraceError> {
        if end <= start {
            return Err(FretTraceError::InvalidBlinkInterval { start, end });
        }
        self.blink_intervals.push([start, end]);
        self.blink_intervals.sort();
        Ok(())
    }

    /// Computes and caches the apparent per-frame stoichiometry.
    pub fn calculate_stoi(&mut self) -> &[f64] {
        let stoi = calc_s(&self.get_intensities(), 0.0, 0.0, 1.0, 1.0);
        self.stoi.insert(stoi)
    }

    pub fn get_stoi(&self) -> Option<&[f64]> {
        self.stoi.as_deref()
    }

    /// Looks for step-like drops on the donor-excited total intensity (donor bleaching)
    /// and on the acceptor-excited channel (acceptor bleaching). Non-ALEX traces use
    /// the acceptor emission under donor excitation for the latter.
    pub fn detect_bleaching(&mut self, params: &PhotobleachingFilterValues) -> [Option<usize>; 2] {
        let window_size = params.median_filter_window_size;
        let threshold = params.noise_threshold_multiple;

        let total: Vec<f64> = self.dd.iter().zip(&self.da).map(|(d, a)| d + a).collect();
        let red = self.aa.as_ref().unwrap_or(&self.da);

        let grn_bleach = detect_photobleaching_events(&total, threshold, window_size).last().map(|idx| idx + 1);
        let red_bleach = detect_photobleaching_events(red, threshold, window_size).last().map(|idx| idx + 1);

        self.set_bleaches(grn_bleach, red_bleach);
        [grn_bleach, red_bleach]
    }
}

impl fmt::Debug for FretTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FretTrace")
            .field("name", &self.name)
            .field("length", &self.dd.len())
            .field("alex", &self.aa.is_some())
            .field("bleaches", &[self.grn_bleach, self.red_bleach])
            .field("blinks", &self.blink_intervals.len())
            .field("checked", &self.is_checked)
            .finish()
    }
}

pub fn detect_photobleaching_events(values: &[f64], threshold: f64, window_size: usize) -> Vec<usize> {
    if values.len() < 2 {
        return Vec::new();
    }

    // Apply median filter
    let filtered_values = median_filter(values, window_size);
    let gradient = compute_gradient(&filtered_values);

    let [_, std] = compute_mean_and_std(&gradient);
    let noise_threshold = threshold * std;
    if noise_threshold <= 0.0 {
        return Vec::new();
    }

    let mut photobleaching_events = Vec::new();
    let mut in_event = false;

    for (i, &grad) in gradient.iter().enumerate() {
        if grad < -noise_threshold {
            if !in_event {
                photobleaching_events.push(i);
                in_event = true;
            }
        } else {
            in_event = false;
        }
    }

    photobleaching_events
}

fn check_channel_validity(values: &[f64], trace_type: TraceType, expected_len: Option<usize>) -> Result<(), FretTraceError> {
    if values.is_empty() {
        return Err(FretTraceError::EmptyTraceVector { trace_type });
    }

    if values.iter().any(|v| v.is_nan()) {
        return Err(FretTraceError::IncludesNaNs { trace_type });
    }

    if let Some(expected) = expected_len {
        if values.len() != expected {
            return Err(FretTraceError::LengthMismatch { trace_type, expected, found: values.len() });
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Error)]
pub enum FretTraceError {
    #[error("channel {trace_type} is empty")]
    EmptyTraceVector { trace_type: TraceType },
    #[error("channel {trace_type} contains NaN values")]
    IncludesNaNs { trace_type: TraceType },
    #[error("channel {trace_type} has {found} frames, expected {expected}")]
    LengthMismatch { trace_type: TraceType, expected: usize, found: usize },
    #[error("channel {trace_type} is not present in this trace")]
    ChannelNotPresent { trace_type: TraceType },
    #[error("{trace_type} is not a background channel")]
    NotABackgroundChannel { trace_type: TraceType },
    #[error("invalid blink interval [{start}, {end})")]
    InvalidBlinkInterval { start: usize, end: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn step_trace(len: usize, drop_at: usize, high: f64, low: f64, rng: &mut StdRng) -> Vec<f64> {
        let noise = Normal::new(0.0, 1.0).unwrap();
        (0..len)
            .map(|i| if i < drop_at { high } else { low } + noise.sample(rng))
            .collect()
    }

    #[test]
    fn test_trace_creation_checks_lengths() {
        let ok = FretTrace::new("ok", vec![1.0, 2.0], vec![1.0, 2.0], None);
        assert!(ok.is_ok());

        let mismatch = FretTrace::new("bad", vec![1.0, 2.0], vec![1.0], None);
        assert!(matches!(mismatch, Err(FretTraceError::LengthMismatch { trace_type: TraceType::AemDexc, .. })));

        let nan = FretTrace::new("nan", vec![1.0, f64::NAN], vec![1.0, 2.0], None);
        assert!(matches!(nan, Err(FretTraceError::IncludesNaNs { .. })));

        let empty = FretTrace::new("empty", vec![], vec![], None);
        assert!(matches!(empty, Err(FretTraceError::EmptyTraceVector { .. })));
    }

    #[test]
    fn test_missing_channels_in_intensities() {
        let trace = FretTrace::new("t", vec![10.0, 20.0], vec![5.0, 5.0], None).unwrap();
        let intensities = trace.get_intensities();

        assert_eq!(intensities.grn_bg, vec![0.0, 0.0]);
        assert!(intensities.red_int.iter().all(|v| v.is_nan()));
        assert!(!trace.is_alex());
    }

    #[test]
    fn test_background_needs_acceptor_channel() {
        let mut trace = FretTrace::new("t", vec![10.0, 20.0], vec![5.0, 5.0], None).unwrap();
        let result = trace.set_background(TraceType::BackgroundAemAexc, vec![1.0, 1.0]);
        assert!(matches!(result, Err(FretTraceError::ChannelNotPresent { .. })));

        let result = trace.set_background(TraceType::DemDexc, vec![1.0, 1.0]);
        assert!(matches!(result, Err(FretTraceError::NotABackgroundChannel { .. })));

        trace.set_background(TraceType::BackgroundDemDexc, vec![1.0, 2.0]).unwrap();
        assert_eq!(trace.get_intensities().grn_bg, vec![1.0, 2.0]);
    }

    #[test]
    fn test_first_bleach() {
        let mut trace = FretTrace::new("t", vec![1.0; 10], vec![1.0; 10], None).unwrap();
        assert_eq!(trace.first_bleach(), None);

        trace.set_bleaches(None, Some(7));
        assert_eq!(trace.first_bleach(), Some(7));

        trace.set_bleaches(Some(4), Some(7));
        assert_eq!(trace.first_bleach(), Some(4));

        trace.set_bleaches(Some(0), None);
        assert_eq!(trace.first_bleach(), Some(0));
    }

    #[test]
    fn test_blink_intervals_sorted_and_validated() {
        let mut trace = FretTrace::new("t", vec![1.0; 10], vec![1.0; 10], None).unwrap();
        trace.add_blink_interval(6, 8).unwrap();
        trace.add_blink_interval(1, 3).unwrap();
        assert_eq!(trace.blink_intervals, vec![[1, 3], [6, 8]]);

        assert!(trace.add_blink_interval(5, 5).is_err());
    }

    #[test]
    fn test_calculate_stoi_caches() {
        let mut trace = FretTrace::new("t", vec![30.0; 4], vec![20.0; 4], Some(vec![50.0; 4])).unwrap();
        assert!(trace.get_stoi().is_none());

        let stoi = trace.calculate_stoi().to_vec();
        assert_eq!(stoi.len(), 4);
        assert!(stoi.iter().all(|s| (s - 0.5).abs() < 1e-12));
        assert!(trace.get_stoi().is_some());
    }

    #[test]
    fn test_detect_bleaching_on_steps() {
        let mut rng = StdRng::seed_from_u64(7);
        let dd = step_trace(200, 150, 300.0, 0.0, &mut rng);
        let da = step_trace(200, 150, 300.0, 0.0, &mut rng);
        let aa = step_trace(200, 90, 500.0, 0.0, &mut rng);

        let mut trace = FretTrace::new("steps", dd, da, Some(aa)).unwrap();
        let [grn, red] = trace.detect_bleaching(&PhotobleachingFilterValues::default());

        let grn = grn.expect("donor bleaching should be detected");
        let red = red.expect("acceptor bleaching should be detected");
        assert!((grn as i64 - 150).abs() <= 2, "donor bleach at {}", grn);
        assert!((red as i64 - 90).abs() <= 2, "acceptor bleach at {}", red);
        assert_eq!(trace.first_bleach(), Some(red));
    }

    #[test]
    fn test_no_bleaching_on_flat_trace() {
        let events = detect_photobleaching_events(&[5.0; 50], 4.0, 9);
        assert!(events.is_empty());
    }
}
