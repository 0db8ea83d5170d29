use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use fret_hist::config::AnalysisConfig;
use fret_hist::histogram::aggregator::FrameSelection;
use fret_hist::histogram::exporter::HistogramExporter;
use fret_hist::histogram::histogram_window::{HistogramWindow, RefreshOutcome};
use fret_hist::histogram::plot::BitMapRenderer;
use fret_hist::signal_analysis::gaussian_mixture::GaussianFitMode;
use fret_hist::trace_selection::trace_set::{TraceSet, TraceSetError};
use fret_hist::trace_selection::trace_simulator::{simulate_trace, TraceSimulationParams};

#[derive(Parser, Debug)]
#[command(author, version, about = "Pooled E/S histograms of smFRET traces")]
struct Args {
    /// Directory of exported trace files (synthetic traces when omitted)
    #[arg(value_name = "TRACE_DIR")]
    trace_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the exported table and the figure
    #[arg(long, default_value = ".")]
    output: PathBuf,

    /// Only use the first N frames of every trace
    #[arg(long)]
    first_frames: Option<usize>,

    /// Show and export apparent values only
    #[arg(long, default_value_t = false)]
    uncorrected: bool,

    /// Number of gaussian states to fit, or "auto"
    #[arg(long, default_value = "auto")]
    states: GaussianFitMode,

    /// Number of synthetic traces in demo mode
    #[arg(long, default_value_t = 40)]
    demo_traces: usize,

    /// Seed for the synthetic traces and the mixture fit
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AnalysisConfig::load(path).with_context(|| format!("loading configuration {:?}", path))?,
        None => AnalysisConfig::default(),
    };
    if let Some(n) = args.first_frames {
        config.frames = FrameSelection::FirstN(n);
    }
    if args.uncorrected {
        config.apply_corrections = false;
    }
    config.validate()?;

    let mut traces = match &args.trace_dir {
        Some(dir) => load_traces(dir)?,
        None => demo_traces(args.demo_traces, args.seed)?,
    };
    traces.detect_bleaching();
    traces.check_all();
    log::info!("{} traces checked", traces.n_checked());

    fs::create_dir_all(&args.output).with_context(|| format!("creating output directory {:?}", args.output))?;

    let mut window = HistogramWindow::new(&config);
    window.get_fitter_mut().set_seed(args.seed);

    window.get_histogram_data(&mut traces, &config, config.frames);
    match window.fit_gaussians(args.states) {
        Some(best_k) => log::info!("Best number of states: {}", best_k),
        None => log::info!("Not enough data for a gaussian fit"),
    }

    let mut renderer = BitMapRenderer::new(&args.output.join("E_S_Histogram.png"));
    let outcome = window.refresh_plot(&mut traces, &config, &mut renderer);

    let corrected = match outcome {
        RefreshOutcome::Plotted { corrected } => corrected,
        RefreshOutcome::NoData => {
            log::warn!("No data to plot");
            false
        }
        RefreshOutcome::RenderFailed => window.applies_corrections(),
    };

    let exported = HistogramExporter::in_directory(&args.output).export(window.get_data(), corrected)?;

    let data = window.get_data();
    println!("N_traces: {}", data.n_samples());
    println!("N_data: {}", data.n_points());
    println!(
        "alpha = {:.2}, delta = {:.2}, beta = {:.2}, gamma = {:.2}",
        data.factors.alpha, data.factors.delta, data.factors.beta, data.factors.gamma
    );
    if let Some(params) = window.get_gauss_params() {
        for (n, component) in params.iter().enumerate() {
            println!("mu_{} = {}", n + 1, component);
        }
    }
    println!("Table written to {:?}", exported);

    Ok(())
}

fn load_traces(dir: &Path) -> Result<TraceSet> {
    let dir_str = dir.to_str().with_context(|| format!("{:?} is not valid unicode", dir))?;
    let mut traces = TraceSet::new();

    match traces.add_traces_from_dir(dir_str) {
        Ok(()) => {}
        Err(TraceSetError::FailedToLoadFiles { fails }) => {
            for (file, err) in fails.iter() {
                log::warn!("Skipped {}: {}", file, err);
            }
        }
        Err(err) => return Err(err).with_context(|| format!("loading traces from {:?}", dir)),
    }

    Ok(traces)
}

fn demo_traces(n_traces: usize, seed: Option<u64>) -> Result<TraceSet> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut traces = TraceSet::new();
    for i in 0..n_traces {
        let len = rng.gen_range(150..400);
        let params = TraceSimulationParams {
            len,
            bleach_frame: Some(rng.gen_range(len / 2..len)),
            ..TraceSimulationParams::default()
        };
        let trace = simulate_trace(&format!("demo_{:03}", i), &params, &mut rng)?;
        traces.insert(trace)?;
    }

    log::info!("Generated {} synthetic traces", n_traces);
    Ok(traces)
}
