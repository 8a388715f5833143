mod config;
mod error;
mod output;
mod solver;
mod state;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use error::SimResult;
use output::{Recorder, RunParameters, Sample};
use solver::diagnostics::DivergenceMonitor;
use solver::Stepper;
use state::{SimState, PHI};

/// Multi-scale spectral Navier-Stokes stepper with golden-ratio scale coupling.
#[derive(Parser, Debug)]
#[command(name = "phicascade", version, about)]
struct Cli {
    /// YAML config file (default: ./phicascade.yaml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory for the time series and run summary
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Simulated duration, overriding time.duration
    #[arg(short, long)]
    duration: Option<f64>,

    /// Diffusion only: switch off every forcing term
    #[arg(long)]
    no_forcing: bool,
}

impl Cli {
    fn apply(&self, cfg: &mut Config) {
        if let Some(dir) = &self.output {
            cfg.output.dir = dir.clone();
        }
        if let Some(duration) = self.duration {
            cfg.time.duration = duration;
        }
        if self.no_forcing {
            cfg.physics.forcing = false;
        }
    }
}

/// How a run ended.
#[derive(Debug)]
struct RunOutcome {
    steps_completed: u64,
    interrupted: bool,
    diverged: bool,
    summary: PathBuf,
    last: Sample,
}

fn run_parameters(cfg: &Config) -> RunParameters {
    RunParameters {
        n: cfg.grid.n,
        length: cfg.grid.length,
        scale_min: cfg.scales.min,
        scale_max: cfg.scales.max,
        phi: PHI,
        duration: cfg.time.duration,
        dt: cfg.time.dt,
        viscosity: cfg.physics.viscosity,
        forcing: cfg.physics.forcing,
        seed: cfg.init.seed,
    }
}

/// Step the cascade for the configured duration, sampling every
/// `snapshot_every` steps and on the final step. `running` is checked between
/// steps; clearing it ends the run early with the samples taken so far.
fn run(cfg: &Config, running: &AtomicBool) -> SimResult<RunOutcome> {
    cfg.validate()?;
    let grid = cfg.grid();
    let params = cfg.solver_params();
    let total_steps = cfg.steps();
    let dt = cfg.time.dt;
    let every = cfg.time.snapshot_every;

    let mut state = SimState::new(grid, cfg.scales.min..=cfg.scales.max, &cfg.initial_condition(), params.field_bound);
    let mut stepper = Stepper::new(&grid, params);
    let mut recorder = Recorder::create(&cfg.output.dir)?;
    let mut monitor = DivergenceMonitor::new(cfg.output.divergence_threshold, cfg.output.divergence_patience);

    tracing::info!(
        n = grid.n,
        scale_min = state.scale_min(),
        scale_max = state.scale_max(),
        steps = total_steps,
        dt,
        forcing = stepper.params().forcing,
        "starting run"
    );

    let first = Sample::new(0, state.time, &stepper.measure(&state));
    tracing::info!(total_energy = first.total_energy, max_vorticity = first.max_vorticity, "initial state");
    let mut last = first.clone();
    recorder.record(first)?;

    let mut interrupted = false;
    while state.steps < total_steps {
        if !running.load(Ordering::SeqCst) {
            interrupted = true;
            tracing::warn!(step = state.steps, "interrupted, writing partial results");
            break;
        }
        if let Err(e) = stepper.step(&mut state, dt) {
            tracing::error!(step = state.steps, "step failed: {e}");
            return Err(e);
        }

        if state.steps % every == 0 || state.steps == total_steps {
            let sample = Sample::new(state.steps, state.time, &stepper.measure(&state));
            if recorder.samples().len() % 10 == 0 {
                tracing::info!(
                    step = sample.step,
                    total_energy = sample.total_energy,
                    max_vorticity = sample.max_vorticity,
                    "progress"
                );
            }
            tracing::debug!(
                step = sample.step,
                time = sample.time,
                total_energy = sample.total_energy,
                max_vorticity = sample.max_vorticity,
                saturation = sample.saturation,
                "snapshot"
            );
            if monitor.observe(sample.saturation) {
                tracing::warn!(
                    step = sample.step,
                    saturation = sample.saturation,
                    "fields pinned at the clamp bound; run is likely diverging"
                );
            }
            last = sample.clone();
            recorder.record(sample)?;
        }
    }

    let diverged = monitor.diverged();
    let summary = recorder.finish(run_parameters(cfg), state.steps, interrupted, diverged)?;
    tracing::info!(
        steps = state.steps,
        total_energy = last.total_energy,
        summary = %summary.display(),
        "run finished"
    );
    Ok(RunOutcome { steps_completed: state.steps, interrupted, diverged, summary, last })
}

/// Filter built from `RUST_LOG`-style directives, `info` when absent or invalid.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn main() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(log_filter(directives.as_deref()))
        .init();

    let cli = Cli::parse();
    let mut cfg = match config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };
    cli.apply(&mut cfg);

    // Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)) {
        tracing::warn!("could not install Ctrl+C handler: {e}");
    }

    match run(&cfg, &running) {
        Ok(outcome) => {
            if outcome.diverged {
                tracing::warn!("run ended with saturated fields");
            }
            if outcome.interrupted {
                tracing::info!(steps = outcome.steps_completed, "stopped early");
            }
        }
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;
    use crate::output::{read_series, RunSummary, SERIES_FILE};

    fn small_config(dir: &std::path::Path) -> Config {
        let mut cfg = Config::default();
        cfg.grid.n = 4;
        cfg.time.duration = 0.05;
        cfg.time.snapshot_every = 2;
        cfg.output.dir = dir.to_path_buf();
        cfg
    }

    #[test]
    fn test_run_samples_every_interval_and_last_step() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = small_config(dir.path());
        let outcome = run(&cfg, &AtomicBool::new(true)).unwrap();
        assert_eq!(outcome.steps_completed, 5);
        assert!(!outcome.interrupted);
        assert_eq!(outcome.last.step, 5);

        let series = read_series(&dir.path().join(SERIES_FILE)).unwrap();
        let steps: Vec<u64> = series.iter().map(|s| s.step).collect();
        assert_eq!(steps, vec![0, 2, 4, 5]);
        for s in &series {
            assert_eq!(s.scale_energy.len(), 3, "one energy per scale");
            assert!(s.total_energy.is_finite());
        }
        assert!((series[3].time - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_run_writes_summary() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = small_config(dir.path());
        let outcome = run(&cfg, &AtomicBool::new(true)).unwrap();
        let summary: RunSummary =
            serde_json::from_str(&std::fs::read_to_string(&outcome.summary).unwrap()).unwrap();
        assert_eq!(summary.steps_completed, 5);
        assert_eq!(summary.samples.len(), 4);
        assert_eq!(summary.parameters.n, 4);
        assert_eq!(summary.parameters.phi, PHI);
    }

    #[test]
    fn test_cleared_flag_stops_before_first_step() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = small_config(dir.path());
        let outcome = run(&cfg, &AtomicBool::new(false)).unwrap();
        assert!(outcome.interrupted);
        assert_eq!(outcome.steps_completed, 0);
        let series = read_series(&dir.path().join(SERIES_FILE)).unwrap();
        assert_eq!(series.len(), 1, "initial sample is still written");
    }

    #[test]
    fn test_unforced_run_loses_energy() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = small_config(dir.path());
        cfg.physics.forcing = false;
        cfg.time.duration = 0.2;
        run(&cfg, &AtomicBool::new(true)).unwrap();
        let series = read_series(&dir.path().join(SERIES_FILE)).unwrap();
        for pair in series.windows(2) {
            assert!(
                pair[1].total_energy <= pair[0].total_energy,
                "energy rose from {} to {} at step {}",
                pair[0].total_energy,
                pair[1].total_energy,
                pair[1].step
            );
        }
    }

    #[test]
    fn test_invalid_config_is_rejected_before_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = small_config(&dir.path().join("never"));
        cfg.time.dt = 0.0;
        let err = run(&cfg, &AtomicBool::new(true)).unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
        assert!(!dir.path().join("never").exists());
    }

    #[test]
    fn test_log_filter_honours_debug_directive() {
        use tracing::level_filters::LevelFilter;
        assert_eq!(log_filter(Some("debug")).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(log_filter(Some("phicascade=trace")).max_level_hint(), Some(LevelFilter::TRACE));
        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "phicascade",
            "--output",
            "out/a",
            "--duration",
            "2.5",
            "--no-forcing",
        ])
        .unwrap();
        let mut cfg = Config::default();
        cli.apply(&mut cfg);
        assert_eq!(cfg.output.dir, PathBuf::from("out/a"));
        assert_eq!(cfg.time.duration, 2.5);
        assert!(!cfg.physics.forcing);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_defaults_leave_config_untouched() {
        let cli = Cli::try_parse_from(["phicascade"]).unwrap();
        let mut cfg = Config::default();
        cli.apply(&mut cfg);
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn test_cli_rejects_bad_duration() {
        assert!(Cli::try_parse_from(["phicascade", "--duration", "soon"]).is_err());
    }
}
