use super::aggregator::*;
use super::ensemble_correction::*;
use super::intensity_correction::*;
use super::plot::*;
use crate::config::AnalysisConfig;
use crate::signal_analysis::gaussian_component::GaussianComponent;
use crate::signal_analysis::gaussian_mixture::*;
use crate::trace_selection::tools::pearson_correlation;
use crate::trace_selection::trace_set::TraceSet;

/// Pooled results of one aggregation pass over the checked traces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramData {
    pub uncorrected: PooledSample,
    /// Only present for ALEX data where the ensemble correction succeeded.
    pub corrected: Option<PooledSample>,
    pub dd: Vec<f64>,
    pub da: Vec<f64>,
    /// Per-trace DD/DA Pearson correlation, `None` for traces without usable frames.
    pub corrs: Vec<Option<f64>>,
    pub factors: CorrectionFactors,
}

impl HistogramData {
    pub fn n_samples(&self) -> usize {
        self.uncorrected.n_samples
    }

    pub fn n_points(&self) -> usize {
        self.uncorrected.n_points()
    }

    pub fn e_un(&self) -> &[f64] {
        &self.uncorrected.e
    }

    pub fn s_un(&self) -> &[f64] {
        &self.uncorrected.s
    }

    /// Corrected E, falling back to the apparent E when no correction is available.
    /// `None` when no frame survived the filtering.
    pub fn e(&self) -> Option<&[f64]> {
        match &self.corrected {
            Some(corrected) => Some(&corrected.e),
            None if !self.uncorrected.is_empty() => Some(&self.uncorrected.e),
            None => None,
        }
    }

    pub fn s(&self) -> Option<&[f64]> {
        self.corrected.as_ref().map(|corrected| corrected.s.as_slice())
    }

    /// (E, S) pair shown with the correction toggle in the given state.
    pub fn active_es(&self, corrected: bool) -> (Option<&[f64]>, Option<&[f64]>) {
        if corrected {
            (self.e(), self.s())
        } else if self.uncorrected.is_empty() {
            (None, None)
        } else {
            (Some(self.e_un()), Some(self.s_un()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Plotted { corrected: bool },
    NoData,
    RenderFailed,
}

/// Pooled E/S histogram of the checked traces, with the mixture fitted on top of it.
#[derive(Debug, Clone)]
pub struct HistogramWindow {
    data: HistogramData,
    gauss_params: Option<Vec<GaussianComponent>>,
    best_k: Option<usize>,
    apply_corrections: bool,
    fitter: GaussianMixtureFitter,
}

impl Default for HistogramWindow {
    fn default() -> Self {
        Self {
            data: HistogramData::default(),
            gauss_params: None,
            best_k: None,
            apply_corrections: true,
            fitter: GaussianMixtureFitter::default(),
        }
    }
}

impl HistogramWindow {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self { apply_corrections: config.apply_corrections, ..Self::default() }
    }

    pub fn get_data(&self) -> &HistogramData {
        &self.data
    }

    pub fn get_gauss_params(&self) -> Option<&[GaussianComponent]> {
        self.gauss_params.as_deref()
    }

    pub fn get_best_k(&self) -> Option<usize> {
        self.best_k
    }

    pub fn applies_corrections(&self) -> bool {
        self.apply_corrections
    }

    pub fn set_apply_corrections(&mut self, apply: bool) {
        self.apply_corrections = apply;
    }

    pub fn get_fitter_mut(&mut self) -> &mut GaussianMixtureFitter {
        &mut self.fitter
    }

    /// Recomputes every pooled quantity from the checked traces.
    ///
    /// The apparent E/S come from alpha and delta only. When all of them carry stoichiometry,
    /// beta and gamma are estimated from that pool and the traces are corrected a second time.
    pub fn get_histogram_data(&mut self, traces: &mut TraceSet, config: &AnalysisConfig, frames: FrameSelection) -> &HistogramData {
        traces.calculate_checked_stoi();
        let checked = traces.checked_traces();

        let factors = config.correction_factors();
        let max_frames = frames.max_frames();

        let mut per_trace = Vec::with_capacity(checked.len());
        let mut dd = Vec::new();
        let mut da = Vec::new();
        let mut corrs = Vec::with_capacity(checked.len());

        for trace in checked.iter() {
            per_trace.push(correct(trace, &factors, max_frames));

            let (i_dd, i_da) = donor_excitation_channels(trace);
            corrs.push(pearson_correlation(&i_dd, &i_da));
            dd.extend(i_dd);
            da.extend(i_da);
        }

        let uncorrected = PooledSample::pool(&per_trace);
        let mut data = HistogramData { uncorrected, corrected: None, dd, da, corrs, factors };

        if data.uncorrected.has_stoichiometry() {
            match beta_gamma_factor(data.e_un(), data.s_un()) {
                Ok(EnsembleFactors { beta, gamma }) => {
                    let ensemble = factors.with_ensemble(beta, gamma);
                    let per_trace: Vec<_> = checked.iter().map(|trace| correct(trace, &ensemble, max_frames)).collect();
                    data.corrected = Some(PooledSample::pool(&per_trace));
                    data.factors = ensemble;
                }
                Err(err) => log::warn!("Ensemble correction skipped: {}", err),
            }
        }

        log::debug!(
            "Histogram data: {} traces, {} points, corrected: {}",
            data.n_samples(),
            data.n_points(),
            data.corrected.is_some()
        );

        self.data = data;
        &self.data
    }

    /// Fits the E values currently on display. Fewer than two points, or a failed fit,
    /// leave the window without a fit.
    pub fn fit_gaussians(&mut self, mode: GaussianFitMode) -> Option<usize> {
        let (e, _) = self.data.active_es(self.apply_corrections);

        let e = match e {
            Some(e) if e.len() >= MIN_POINTS_FOR_FIT => e,
            _ => {
                self.invalidate_fit();
                return None;
            }
        };

        let (min_k, max_k) = mode.component_range();
        match self.fitter.fit(e, min_k, max_k) {
            Ok(selection) => {
                log::info!("Fitted {} gaussian(s) to {} points", selection.best_k, e.len());
                self.gauss_params = Some(selection.get_components().to_vec());
                self.best_k = Some(selection.best_k);
            }
            Err(err) => {
                log::warn!("Gaussian fit failed: {}", err);
                self.invalidate_fit();
            }
        }

        self.best_k
    }

    pub fn invalidate_fit(&mut self) {
        self.gauss_params = None;
        self.best_k = None;
    }

    /// Recomputes the data and redraws. Never fails: drawing errors are logged and the
    /// previous figure stays wherever the renderer put it.
    pub fn refresh_plot(
        &mut self,
        traces: &mut TraceSet,
        config: &AnalysisConfig,
        renderer: &mut dyn PlotRenderer,
    ) -> RefreshOutcome {
        self.get_histogram_data(traces, config, config.frames);

        let (plot, outcome) = if self.data.e().is_some() {
            if self.data.s().is_none() && self.apply_corrections {
                log::info!("No corrected stoichiometry available, showing apparent values");
                self.apply_corrections = false;
            }
            let corrected = self.apply_corrections;
            let plot = HistogramPlot::build(&self.data, self.gauss_params.as_deref(), corrected, &config.inspector);
            (plot, RefreshOutcome::Plotted { corrected })
        } else {
            (HistogramPlot::empty(), RefreshOutcome::NoData)
        };

        match renderer.render(&plot) {
            Ok(()) => outcome,
            Err(err) => {
                log::warn!("Plot refresh failed: {}", err);
                RefreshOutcome::RenderFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace_selection::fret_trace::FretTrace;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    #[derive(Default)]
    struct RecordingRenderer {
        plots: Vec<HistogramPlot>,
        fail: bool,
    }

    impl PlotRenderer for RecordingRenderer {
        fn render(&mut self, plot: &HistogramPlot) -> Result<(), PlotError> {
            if self.fail {
                return Err(PlotError::Backend { reason: "test".to_string() });
            }
            self.plots.push(plot.clone());
            Ok(())
        }
    }

    /// ALEX trace with detected photons following E = `e`, with detection factor `gamma`
    /// and excitation factor `beta`.
    fn alex_trace(name: &str, len: usize, e: f64, beta: f64, gamma: f64, rng: &mut StdRng) -> FretTrace {
        let noise = Normal::new(0.0, 2.0).unwrap();
        let n = 1000.0;
        let dd = (0..len).map(|_| n * (1.0 - e) / gamma + noise.sample(rng)).collect();
        let da = (0..len).map(|_| n * e + noise.sample(rng)).collect();
        let aa = (0..len).map(|_| beta * n + noise.sample(rng)).collect();
        FretTrace::new(name, dd, da, Some(aa)).unwrap()
    }

    fn checked_set(traces: Vec<FretTrace>) -> TraceSet {
        let mut set = TraceSet::new();
        for trace in traces {
            set.insert(trace).unwrap();
        }
        set.check_all();
        set
    }

    fn mean(values: &[f64]) -> f64 {
        values.iter().sum::<f64>() / values.len() as f64
    }

    #[test]
    fn test_counts_follow_checked_traces() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut set = checked_set(vec![
            alex_trace("a", 30, 0.3, 1.0, 1.0, &mut rng),
            alex_trace("b", 20, 0.6, 1.0, 1.0, &mut rng),
            alex_trace("c", 10, 0.6, 1.0, 1.0, &mut rng),
        ]);
        set.set_checked("c", false).unwrap();

        let mut window = HistogramWindow::default();
        let data = window.get_histogram_data(&mut set, &AnalysisConfig::default(), FrameSelection::All);

        assert_eq!(data.n_samples(), 2);
        assert_eq!(data.n_points(), 50);
        assert_eq!(data.e_un().len(), data.s_un().len());
        assert_eq!(data.dd.len(), 50);
        assert_eq!(data.corrs.len(), 2);
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut set = checked_set(vec![
            alex_trace("a", 40, 0.25, 0.8, 1.4, &mut rng),
            alex_trace("b", 40, 0.7, 0.8, 1.4, &mut rng),
        ]);

        let mut window = HistogramWindow::default();
        let first = window.get_histogram_data(&mut set, &AnalysisConfig::default(), FrameSelection::All).clone();
        let second = window.get_histogram_data(&mut set, &AnalysisConfig::default(), FrameSelection::All).clone();
        assert_eq!(first, second);
    }

    #[test]
    fn test_bleached_trace_counts_as_sample_only() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut bleached = alex_trace("bleached", 25, 0.5, 1.0, 1.0, &mut rng);
        bleached.set_bleaches(Some(0), None);
        let mut set = checked_set(vec![alex_trace("ok", 25, 0.5, 1.0, 1.0, &mut rng), bleached]);

        let mut window = HistogramWindow::default();
        let data = window.get_histogram_data(&mut set, &AnalysisConfig::default(), FrameSelection::All);

        assert_eq!(data.n_samples(), 2);
        assert_eq!(data.n_points(), 25);
        assert_eq!(data.corrs[1], None);
    }

    #[test]
    fn test_nothing_checked() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut set = checked_set(vec![
            alex_trace("a", 10, 0.5, 1.0, 1.0, &mut rng),
            alex_trace("b", 10, 0.5, 1.0, 1.0, &mut rng),
            alex_trace("c", 10, 0.5, 1.0, 1.0, &mut rng),
        ]);
        set.uncheck_all();

        let mut window = HistogramWindow::default();
        let mut renderer = RecordingRenderer::default();
        let outcome = window.refresh_plot(&mut set, &AnalysisConfig::default(), &mut renderer);

        let data = window.get_data();
        assert_eq!(data.n_samples(), 0);
        assert_eq!(data.n_points(), 0);
        assert!(data.e().is_none());
        assert!(data.s().is_none());
        assert_eq!(outcome, RefreshOutcome::NoData);
        assert!(renderer.plots[0].is_empty());
    }

    #[test]
    fn test_non_alex_trace_skips_ensemble_correction() {
        // DD = DA gives E = 0.5 on every frame
        let trace = FretTrace::new("non_alex", vec![100.0; 3], vec![100.0; 3], None).unwrap();
        let mut set = checked_set(vec![trace]);

        let mut window = HistogramWindow::default();
        let data = window.get_histogram_data(&mut set, &AnalysisConfig::default(), FrameSelection::All);

        assert_eq!(data.e_un(), &[0.5, 0.5, 0.5]);
        assert!(data.corrected.is_none());
        assert!(data.s().is_none());
        assert_eq!(data.e(), Some(&[0.5, 0.5, 0.5][..]));
        assert!(!data.factors.is_ensemble_corrected());
    }

    #[test]
    fn test_refresh_forces_apparent_values_without_stoichiometry() {
        let trace = FretTrace::new("non_alex", vec![100.0; 3], vec![100.0; 3], None).unwrap();
        let mut set = checked_set(vec![trace]);

        let mut window = HistogramWindow::new(&AnalysisConfig::default());
        assert!(window.applies_corrections());

        let mut renderer = RecordingRenderer::default();
        let outcome = window.refresh_plot(&mut set, &AnalysisConfig::default(), &mut renderer);

        assert_eq!(outcome, RefreshOutcome::Plotted { corrected: false });
        assert!(!window.applies_corrections());
        let plot = &renderer.plots[0];
        assert!(plot.top.is_some());
        assert!(plot.center.is_none());
        assert!(plot.right.is_none());
    }

    #[test]
    fn test_single_point_gives_no_fit() {
        let trace = FretTrace::new("short", vec![100.0], vec![50.0], None).unwrap();
        let mut set = checked_set(vec![trace]);

        let mut window = HistogramWindow::default();
        window.get_histogram_data(&mut set, &AnalysisConfig::default(), FrameSelection::All);

        assert_eq!(window.fit_gaussians(GaussianFitMode::Auto), None);
        assert!(window.get_gauss_params().is_none());
        assert!(window.get_best_k().is_none());
    }

    #[test]
    fn test_ensemble_correction_centres_stoichiometry() {
        let mut rng = StdRng::seed_from_u64(5);
        let (beta, gamma) = (0.6, 1.5);
        let mut set = checked_set(vec![
            alex_trace("low", 60, 0.2, beta, gamma, &mut rng),
            alex_trace("mid", 60, 0.5, beta, gamma, &mut rng),
            alex_trace("high", 60, 0.8, beta, gamma, &mut rng),
        ]);

        let mut window = HistogramWindow::default();
        let data = window.get_histogram_data(&mut set, &AnalysisConfig::default(), FrameSelection::All);

        let corrected = data.corrected.as_ref().expect("ALEX data should be corrected");
        assert!((mean(&corrected.s) - 0.5).abs() < 0.02, "mean S = {}", mean(&corrected.s));
        assert!((data.factors.beta - beta).abs() < 0.05);
        assert!((data.factors.gamma - gamma).abs() < 0.1);
        assert!((mean(data.s_un()) - 0.5).abs() > 0.05);
    }

    #[test]
    fn test_fit_and_refresh_with_alex_data() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut set = checked_set(vec![
            alex_trace("low", 80, 0.25, 1.0, 1.0, &mut rng),
            alex_trace("high", 80, 0.75, 1.0, 1.0, &mut rng),
        ]);
        let config = AnalysisConfig::default();

        let mut window = HistogramWindow::new(&config);
        window.get_fitter_mut().set_seed(Some(11));
        window.get_histogram_data(&mut set, &config, FrameSelection::All);
        let best_k = window.fit_gaussians(GaussianFitMode::Fixed(2));
        assert_eq!(best_k, Some(2));

        let means: Vec<f64> = window.get_gauss_params().unwrap().iter().map(|c| c.mean).collect();
        assert!((means[0] - 0.25).abs() < 0.05);
        assert!((means[1] - 0.75).abs() < 0.05);

        let mut renderer = RecordingRenderer::default();
        let outcome = window.refresh_plot(&mut set, &config, &mut renderer);
        assert_eq!(outcome, RefreshOutcome::Plotted { corrected: true });

        let plot = &renderer.plots[0];
        assert!(plot.center.as_ref().unwrap().density.is_some());
        assert_eq!(plot.fit.as_ref().unwrap().components.len(), 2);
        assert!(plot.annotations.iter().any(|line| line == "N_traces = 2"));
        assert!(plot.annotations.iter().any(|line| line == "N_data = 160"));
    }

    #[test]
    fn test_renderer_failure_is_swallowed() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut set = checked_set(vec![alex_trace("a", 20, 0.5, 1.0, 1.0, &mut rng)]);

        let mut window = HistogramWindow::default();
        let mut renderer = RecordingRenderer { fail: true, ..RecordingRenderer::default() };
        let outcome = window.refresh_plot(&mut set, &AnalysisConfig::default(), &mut renderer);

        assert_eq!(outcome, RefreshOutcome::RenderFailed);
        assert_eq!(window.get_data().n_points(), 20);
    }

    #[test]
    fn test_first_frames_limit() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut set = checked_set(vec![
            alex_trace("a", 30, 0.3, 1.0, 1.0, &mut rng),
            alex_trace("b", 30, 0.6, 1.0, 1.0, &mut rng),
        ]);

        let mut window = HistogramWindow::default();
        let data = window.get_histogram_data(&mut set, &AnalysisConfig::default(), FrameSelection::FirstN(5));

        assert_eq!(data.n_points(), 10);
        // DD and DA keep every frame before bleaching
        assert_eq!(data.dd.len(), 60);
    }
}
