use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;

use super::histogram_window::{HistogramData, HistogramWindow};

pub const EXPORT_HEADER: &str = "Exported by fret-hist";
pub const DEFAULT_EXPORT_NAME: &str = "E_S_Histogram.txt";

/// Writes pooled E/S tables next to a small header block.
pub struct HistogramExporter {
    pub path: PathBuf,
}

impl HistogramExporter {
    /// `.txt` is appended when the file name lacks it.
    pub fn new(path: &Path) -> Self {
        Self { path: with_txt_extension(path) }
    }

    /// Exporter writing the default file name into `dir`.
    pub fn in_directory(dir: &Path) -> Self {
        Self::new(&dir.join(DEFAULT_EXPORT_NAME))
    }

    pub fn export(&self, data: &HistogramData, corrected: bool) -> Result<PathBuf, ExportError> {
        let io_err = |err: std::io::Error| ExportError::Io { path: self.path.clone(), reason: err.to_string() };

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = File::create(&self.path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "{}", EXPORT_HEADER).map_err(io_err)?;
        writeln!(writer, "Date: {}", Local::now().format("%Y-%m-%d, %H:%M")).map_err(io_err)?;
        writeln!(writer, "N_traces: {}", data.n_samples()).map_err(io_err)?;
        writeln!(writer).map_err(io_err)?;

        match data.active_es(corrected) {
            (Some(e), Some(s)) if !s.iter().all(|v| v.is_nan()) => {
                writeln!(writer, "E\tS").map_err(io_err)?;
                for (e, s) in e.iter().zip(s) {
                    writeln!(writer, "{}\t{}", format_value(*e), format_value(*s)).map_err(io_err)?;
                }
            }
            (Some(e), _) => {
                // Only non-ALEX traces, so there is no stoichiometry column
                writeln!(writer, "E").map_err(io_err)?;
                for e in e {
                    writeln!(writer, "{}", format_value(*e)).map_err(io_err)?;
                }
            }
            (None, _) => writeln!(writer, "E\tS").map_err(io_err)?,
        }

        writer.flush().map_err(io_err)?;
        log::info!("Exported histogram data to {:?}", self.path);

        Ok(self.path.clone())
    }
}

/// Exports the data currently held by `window`. Returns the path actually written.
pub fn export_histogram_data(window: &HistogramWindow, path: &Path, corrected: bool) -> Result<PathBuf, ExportError> {
    HistogramExporter::new(path).export(window.get_data(), corrected)
}

fn with_txt_extension(path: &Path) -> PathBuf {
    let has_txt = path.file_name().and_then(|name| name.to_str()).is_some_and(|name| name.ends_with(".txt"));
    if has_txt {
        return path.to_path_buf();
    }
    let mut name = OsString::from(path.as_os_str());
    name.push(".txt");
    PathBuf::from(name)
}

/// Four decimals at most, trailing zeros dropped, NaN spelled out.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    let rounded = (value * 1e4).round() / 1e4;
    // Avoid printing "-0"
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{}", rounded)
}

/// Table read back from an export file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedTable {
    pub n_traces: usize,
    pub e: Vec<f64>,
    pub s: Option<Vec<f64>>,
}

pub fn read_histogram_export(path: &Path) -> Result<ExportedTable, ExportError> {
    let text = fs::read_to_string(path).map_err(|err| ExportError::Io { path: path.to_path_buf(), reason: err.to_string() })?;
    let invalid = |reason: &str| ExportError::InvalidFormat { reason: reason.to_string() };

    let mut lines = text.lines();

    let n_traces = lines
        .by_ref()
        .take_while(|line| !line.trim().is_empty())
        .find_map(|line| line.strip_prefix("N_traces:"))
        .ok_or_else(|| invalid("missing N_traces line"))?
        .trim()
        .parse::<usize>()
        .map_err(|_| invalid("N_traces is not a number"))?;

    // Skips the blank line that closes the header block
    let header = lines
        .by_ref()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| invalid("missing table header"))?;

    let columns: Vec<&str> = header.split('\t').map(str::trim).collect();
    let with_s = match columns.as_slice() {
        ["E"] => false,
        ["E", "S"] => true,
        _ => return Err(invalid("unexpected table header")),
    };

    let mut e = Vec::new();
    let mut s = Vec::new();
    for line in lines.filter(|line| !line.trim().is_empty()) {
        let values: Vec<f64> = line
            .split('\t')
            .map(|token| token.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| invalid("table contains a value that is not a number"))?;

        match (with_s, values.as_slice()) {
            (false, [e_value]) => e.push(*e_value),
            (true, [e_value, s_value]) => {
                e.push(*e_value);
                s.push(*s_value);
            }
            _ => return Err(invalid("row does not match the table header")),
        }
    }

    Ok(ExportedTable { n_traces, e, s: with_s.then_some(s) })
}

#[derive(Debug, Clone, Error)]
pub enum ExportError {
    #[error("cannot write {path:?}: {reason}")]
    Io { path: PathBuf, reason: String },
    #[error("invalid export file: {reason}")]
    InvalidFormat { reason: String },
}
