use rand::Rng;
use rand_distr::{Distribution, Normal};
use thiserror::Error;

use super::fret_trace::*;

/// Shape of a simulated smFRET trace. The molecule hops between `fret_states` and both dyes
/// go dark at `bleach_frame`.
#[derive(Debug, Clone)]
pub struct TraceSimulationParams {
    pub len: usize,
    pub fret_states: Vec<f64>,
    pub switch_probability: f64,
    pub total_intensity: f64,
    pub noise_std: f64,
    pub beta: f64,
    pub gamma: f64,
    pub bleach_frame: Option<usize>,
    pub alex: bool,
}

impl Default for TraceSimulationParams {
    fn default() -> Self {
        Self {
            len: 300,
            fret_states: vec![0.3, 0.7],
            switch_probability: 0.02,
            total_intensity: 1000.0,
            noise_std: 30.0,
            beta: 0.8,
            gamma: 1.2,
            bleach_frame: None,
            alex: true,
        }
    }
}

/// Generates the raw channels of one molecule. Detected intensities follow
/// DD = N (1 - E) / gamma, DA = N E and AA = beta N, plus gaussian noise.
pub fn simulate_trace<R: Rng + ?Sized>(
    name: &str,
    params: &TraceSimulationParams,
    rng: &mut R,
) -> Result<FretTrace, SimulationError> {
    if params.fret_states.is_empty() {
        return Err(SimulationError::NoStates);
    }
    if !(0.0..=1.0).contains(&params.switch_probability) {
        return Err(SimulationError::InvalidProbability { value: params.switch_probability });
    }
    if params.gamma <= 0.0 || params.beta <= 0.0 {
        return Err(SimulationError::InvalidFactors { beta: params.beta, gamma: params.gamma });
    }
    let noise = Normal::new(0.0, params.noise_std).map_err(|_| SimulationError::InvalidNoise { std: params.noise_std })?;

    let n = params.total_intensity;
    let bleach = params.bleach_frame.unwrap_or(params.len);

    let mut dd = Vec::with_capacity(params.len);
    let mut da = Vec::with_capacity(params.len);
    let mut aa = Vec::with_capacity(params.len);

    let mut current_state = rng.gen_range(0..params.fret_states.len());
    for frame in 0..params.len {
        if params.fret_states.len() > 1 && rng.gen_bool(params.switch_probability) {
            // Jump to any other state
            let offset = rng.gen_range(1..params.fret_states.len());
            current_state = (current_state + offset) % params.fret_states.len();
        }

        let (grn, acc, red) = if frame < bleach {
            let e = params.fret_states[current_state];
            (n * (1.0 - e) / params.gamma, n * e, params.beta * n)
        } else {
            (0.0, 0.0, 0.0)
        };

        dd.push(grn + noise.sample(rng));
        da.push(acc + noise.sample(rng));
        aa.push(red + noise.sample(rng));
    }

    let aa = params.alex.then_some(aa);
    FretTrace::new(name, dd, da, aa).map_err(|err| SimulationError::FretTraceError { err })
}

#[derive(Debug, Clone, Error)]
pub enum SimulationError {
    #[error("at least one FRET state is needed")]
    NoStates,
    #[error("switch probability must lie in [0, 1], got {value}")]
    InvalidProbability { value: f64 },
    #[error("beta and gamma must be positive, got {beta} and {gamma}")]
    InvalidFactors { beta: f64, gamma: f64 },
    #[error("invalid noise level {std}")]
    InvalidNoise { std: f64 },
    #[error(transparent)]
    FretTraceError { err: FretTraceError },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_single_state_intensities() {
        let mut rng = StdRng::seed_from_u64(3);
        let params = TraceSimulationParams {
            len: 500,
            fret_states: vec![0.4],
            noise_std: 1.0,
            beta: 1.0,
            gamma: 1.0,
            ..TraceSimulationParams::default()
        };
        let trace = simulate_trace("single", &params, &mut rng).unwrap();

        let da = trace.get_channel(TraceType::AemDexc).unwrap();
        let mean_da = da.iter().sum::<f64>() / da.len() as f64;
        assert!((mean_da - 400.0).abs() < 1.0);
        assert!(trace.is_alex());
    }

    #[test]
    fn test_bleaching_is_detectable() {
        let mut rng = StdRng::seed_from_u64(4);
        let params = TraceSimulationParams {
            len: 200,
            fret_states: vec![0.5],
            bleach_frame: Some(120),
            ..TraceSimulationParams::default()
        };
        let mut trace = simulate_trace("bleach", &params, &mut rng).unwrap();

        let first = trace.detect_bleaching(&PhotobleachingFilterValues::default());
        let grn = first[0].expect("donor bleaching should be found");
        assert!((grn as i64 - 120).abs() <= 2);
    }

    #[test]
    fn test_non_alex_has_no_acceptor_channel() {
        let mut rng = StdRng::seed_from_u64(5);
        let params = TraceSimulationParams { alex: false, ..TraceSimulationParams::default() };
        let trace = simulate_trace("plain", &params, &mut rng).unwrap();
        assert!(!trace.is_alex());
    }

    #[test]
    fn test_invalid_params() {
        let mut rng = StdRng::seed_from_u64(6);
        let no_states = TraceSimulationParams { fret_states: vec![], ..TraceSimulationParams::default() };
        assert!(matches!(simulate_trace("x", &no_states, &mut rng), Err(SimulationError::NoStates)));

        let bad_noise = TraceSimulationParams { noise_std: -1.0, ..TraceSimulationParams::default() };
        assert!(matches!(simulate_trace("x", &bad_noise, &mut rng), Err(SimulationError::InvalidNoise { .. })));

        let empty = TraceSimulationParams { len: 0, ..TraceSimulationParams::default() };
        assert!(matches!(simulate_trace("x", &empty, &mut rng), Err(SimulationError::FretTraceError { .. })));
    }
}
