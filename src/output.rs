//! Time-series recorder: one JSON line per snapshot plus a run summary.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SimResult;
use crate::solver::Diagnostics;

pub const SERIES_FILE: &str = "timeseries.jsonl";
pub const SUMMARY_FILE: &str = "simulation_data.json";

/// One row of the time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub step: u64,
    pub time: f64,
    pub total_energy: f64,
    /// Energy per scale index.
    pub scale_energy: BTreeMap<i32, f64>,
    pub max_vorticity: f64,
    pub saturation: f64,
}

impl Sample {
    pub fn new(step: u64, time: f64, diag: &Diagnostics) -> Self {
        Self {
            step,
            time,
            total_energy: diag.total_energy,
            scale_energy: diag.scale_energy.iter().copied().collect(),
            max_vorticity: diag.max_vorticity,
            saturation: diag.saturation,
        }
    }
}

/// Parameters echoed into the summary file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    pub n: usize,
    pub length: f64,
    pub scale_min: i32,
    pub scale_max: i32,
    pub phi: f64,
    pub duration: f64,
    pub dt: f64,
    pub viscosity: f64,
    pub forcing: bool,
    pub seed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub parameters: RunParameters,
    pub steps_completed: u64,
    pub interrupted: bool,
    pub diverged: bool,
    pub samples: Vec<Sample>,
}

/// Owns the output directory's file handles for the duration of a run.
/// Handles are closed on drop, including on early error returns.
pub struct Recorder {
    dir: PathBuf,
    series: BufWriter<File>,
    samples: Vec<Sample>,
}

impl Recorder {
    /// Create `dir` (and parents) and start a fresh time-series file in it.
    pub fn create(dir: &Path) -> SimResult<Self> {
        fs::create_dir_all(dir)?;
        let series = BufWriter::new(File::create(dir.join(SERIES_FILE))?);
        Ok(Self { dir: dir.to_path_buf(), series, samples: Vec::new() })
    }

    /// Append one sample. Flushed immediately so an interrupted run keeps it.
    pub fn record(&mut self, sample: Sample) -> SimResult<()> {
        serde_json::to_writer(&mut self.series, &sample)?;
        self.series.write_all(b"\n")?;
        self.series.flush()?;
        self.samples.push(sample);
        Ok(())
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Write the summary file and close the time series. Returns the summary path.
    pub fn finish(mut self, parameters: RunParameters, steps_completed: u64, interrupted: bool, diverged: bool) -> SimResult<PathBuf> {
        self.series.flush()?;
        let summary = RunSummary {
            parameters,
            steps_completed,
            interrupted,
            diverged,
            samples: std::mem::take(&mut self.samples),
        };
        let path = self.dir.join(SUMMARY_FILE);
        let mut out = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut out, &summary)?;
        out.flush()?;
        Ok(path)
    }
}

/// Read back a time-series file written by [`Recorder`].
#[cfg(test)]
pub fn read_series(path: &Path) -> SimResult<Vec<Sample>> {
    let contents = fs::read_to_string(path)?;
    let mut samples = Vec::new();
    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        samples.push(serde_json::from_str(line)?);
    }
    Ok(samples)
}
