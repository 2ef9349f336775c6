use gridclear_types::{GridClearError, IterationTrace, MarketKind, Result, SimTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::hashing::{trace_fingerprint, HashRef};

/// Directory the trajectory files go to, relative to the run root
pub const CONVERGENCE_DIR: &str = "convergence";

/// Append-only failure log, relative to the run root
pub const FAILURE_LOG: &str = "Consensus_reports.txt";

/// Files written for one market window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowReport {
    pub paths: Vec<PathBuf>,
    pub fingerprint: HashRef,
}

/// One line of the failure log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub agent: String,
    pub kind: MarketKind,
    pub time: SimTime,
    pub iterations: usize,
    pub backoffs: usize,
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed to reach {} consensus at t={}: iteration {}, backoffs {}",
            self.agent, self.kind, self.time, self.iterations, self.backoffs
        )
    }
}

/// Writes per-iteration trajectories as CSV and appends failure records.
///
/// Rows are horizon slots (a single row for real-time), columns are the
/// iterations actually used. Day-ahead windows also get the per-peer message
/// arrival times.
#[derive(Debug, Clone)]
pub struct ConvergenceRecorder {
    dir: PathBuf,
    failure_log: PathBuf,
}

impl ConvergenceRecorder {
    pub fn new(dir: impl Into<PathBuf>, failure_log: impl Into<PathBuf>) -> Self {
        ConvergenceRecorder {
            dir: dir.into(),
            failure_log: failure_log.into(),
        }
    }

    /// Standard layout under `root`: `convergence/` and `Consensus_reports.txt`
    pub fn in_dir(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::new(root.join(CONVERGENCE_DIR), root.join(FAILURE_LOG))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn failure_log(&self) -> &Path {
        &self.failure_log
    }

    /// Write the trajectories of one window. `columns` is the number of
    /// iterations to keep; files are named after the integer part of `granted`.
    pub fn record_window(
        &self,
        agent: &str,
        kind: MarketKind,
        granted: SimTime,
        trace: &IterationTrace,
        columns: usize,
    ) -> Result<WindowReport> {
        fs::create_dir_all(&self.dir)?;
        let stamp = granted.trunc() as i64;
        let tag = kind.tag();

        let mut files = vec![
            (format!("{agent}_lamda_{tag}_{stamp}.csv"), trace.price_rows(0, columns)),
            (format!("{agent}_PG_{tag}_{stamp}.csv"), trace.quantity_rows(0, columns)),
        ];
        if kind.is_day_ahead() {
            files.push((format!("{agent}_Delay_P_{stamp}.csv"), trace.delay_price_rows(columns)));
            files.push((format!("{agent}_Delay_Q_{stamp}.csv"), trace.delay_quantity_rows(columns)));
        }

        let mut paths = Vec::with_capacity(files.len());
        for (name, rows) in files {
            let path = self.dir.join(name);
            write_rows(&path, &rows)?;
            paths.push(path);
        }

        Ok(WindowReport {
            paths,
            fingerprint: trace_fingerprint(trace, columns)?,
        })
    }

    /// Append one line to the failure log. Safe for concurrent writers.
    pub fn append_failure(&self, record: &FailureRecord) -> Result<()> {
        if let Some(parent) = self.failure_log.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.failure_log)?;
        writeln!(file, "{record}")?;
        Ok(())
    }
}

fn write_rows(path: &Path, rows: &[Vec<f64>]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    for row in rows {
        let record: Vec<String> = row.iter().map(|v| format!("{v:.18e}")).collect();
        wtr.write_record(&record).map_err(|e| csv_error(path, e))?;
    }

    wtr.flush()?;
    Ok(())
}

fn csv_error(path: &Path, err: csv::Error) -> GridClearError {
    GridClearError::Io(format!("writing {}: {err}", path.display()))
}
