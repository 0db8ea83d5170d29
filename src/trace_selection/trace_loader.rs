use std::collections::HashMap;
use std::fs;
use std::fs::File;
use std::io::{self, BufRead};
use std::path::Path;

use thiserror::Error;

use super::fret_trace::*;

/// Header text of a column, mapped to its channel. Unrecognised headers give `None` and the column is skipped.
fn parse_trace_type(header: &str) -> Option<TraceType> {
    match header {
        "D-Dexc-rw." => Some(TraceType::DemDexc),
        "A-Dexc-rw." => Some(TraceType::AemDexc),
        "A-Aexc-rw." => Some(TraceType::AemAexc),
        "D-Dexc-bg." => Some(TraceType::BackgroundDemDexc),
        "A-Dexc-bg." => Some(TraceType::BackgroundAemDexc),
        "A-Aexc-bg." => Some(TraceType::BackgroundAemAexc),
        _ => None,
    }
}

/// Metadata lines at the top of a trace file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceFileMetadata {
    pub date: String,
    pub movie_filename: String,
    pub fret_pair: usize,
}

fn expect_prefix<'a>(line: &'a str, prefix: &str) -> Result<&'a str, TraceLoaderError> {
    line.trim()
        .strip_prefix(prefix)
        .map(str::trim)
        .ok_or_else(|| TraceLoaderError::InvalidLine { reason: format!("expected line to start with '{}'", prefix) })
}

/// Parses one trace file. The trace is named after the file stem.
pub fn parse_file(file_path: &str) -> Result<FretTrace, TraceLoaderError> {
    parse_file_with_metadata(file_path).map(|(trace, _)| trace)
}

pub fn parse_file_with_metadata(file_path: &str) -> Result<(FretTrace, TraceFileMetadata), TraceLoaderError> {
    let path = Path::new(file_path);
    let file = File::open(path).map_err(|_| TraceLoaderError::FailedToLoadSingleFile { file: file_path.to_string() })?;
    let reader = io::BufReader::new(file);

    let mut metadata = TraceFileMetadata::default();
    let mut headers: Vec<Option<TraceType>> = Vec::new();
    let mut columns: HashMap<TraceType, Vec<f64>> = HashMap::new();
    let mut line_count = 0;

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|_| TraceLoaderError::FailedToAnalyzeFile)?;
        line_count += 1;

        match index {
            0 => continue,
            1 => metadata.date = expect_prefix(&line, "Date:")?.to_string(),
            2 => metadata.movie_filename = expect_prefix(&line, "Movie filename:")?.to_string(),
            3 => {
                metadata.fret_pair = expect_prefix(&line, "FRET pair #")?
                    .parse::<usize>()
                    .map_err(|_| TraceLoaderError::InvalidLine { reason: "invalid FRET pair number".to_string() })?;
            }
            4 => {
                headers = line.split_whitespace().map(parse_trace_type).collect();
                if headers.is_empty() {
                    return Err(TraceLoaderError::InvalidLine { reason: "header line is empty".to_string() });
                }
                for trace_type in headers.iter().flatten() {
                    columns.insert(*trace_type, Vec::new());
                }
            }
            _ => {
                if line.trim().is_empty() {
                    continue;
                }
                let values: Vec<f64> = line
                    .split_whitespace()
                    .map(|token| token.parse::<f64>())
                    .collect::<Result<_, _>>()
                    .map_err(|_| TraceLoaderError::InvalidValue { line_num: index + 1 })?;

                if values.len() != headers.len() {
                    return Err(TraceLoaderError::LineHasWrongValueCount {
                        line_num: index + 1,
                        num_line_values: values.len(),
                        num_header_values: headers.len(),
                    });
                }

                for (header, value) in headers.iter().zip(values) {
                    if let Some(trace_type) = header {
                        if let Some(column) = columns.get_mut(trace_type) {
                            column.push(value);
                        }
                    }
                }
            }
        }
    }

    if line_count < 6 {
        return Err(TraceLoaderError::InvalidLine { reason: "file ends before the first data row".to_string() });
    }

    let dd = columns
        .remove(&TraceType::DemDexc)
        .ok_or(TraceLoaderError::MissingColumn { trace_type: TraceType::DemDexc })?;
    let da = columns
        .remove(&TraceType::AemDexc)
        .ok_or(TraceLoaderError::MissingColumn { trace_type: TraceType::AemDexc })?;
    let aa = columns.remove(&TraceType::AemAexc);

    let name = path.file_stem().and_then(|stem| stem.to_str()).unwrap_or(file_path);
    let mut trace = FretTrace::new(name, dd, da, aa).map_err(|err| TraceLoaderError::FretTraceError { err })?;

    for bg_type in [TraceType::BackgroundDemDexc, TraceType::BackgroundAemDexc, TraceType::BackgroundAemAexc] {
        if let Some(values) = columns.remove(&bg_type) {
            trace.set_background(bg_type, values).map_err(|err| TraceLoaderError::FretTraceError { err })?;
        }
    }

    Ok((trace, metadata))
}

pub fn load_traces_from_directory(dir: &str) -> Result<Vec<FretTrace>, TraceLoaderError> {
    let mut successful_traces = Vec::new();
    let mut failed_files: Vec<(String, TraceLoaderError)> = Vec::new();

    let entries = fs::read_dir(dir).map_err(|_| TraceLoaderError::InvalidDirectoryName { dir: dir.to_string() })?;

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    for path in paths {
        let file_path = path.to_string_lossy().to_string();
        log::info!("Loading file: {}", file_path);

        match parse_file(&file_path) {
            Ok(trace) => successful_traces.push(trace),
            Err(err) => {
                log::warn!("Failed to load {}: {}", file_path, err);
                failed_files.push((file_path, err));
            }
        }
    }

    if !failed_files.is_empty() {
        Err(TraceLoaderError::FailedToLoadFiles { successful_traces, failed_files })
    } else {
        Ok(successful_traces)
    }
}

#[derive(Debug, Clone, Error)]
pub enum TraceLoaderError {
    #[error("line {line_num} has {num_line_values} values but the header has {num_header_values}")]
    LineHasWrongValueCount { line_num: usize, num_line_values: usize, num_header_values: usize },
    #[error("line {line_num} contains a value that is not a number")]
    InvalidValue { line_num: usize },
    #[error("required column {trace_type} is missing")]
    MissingColumn { trace_type: TraceType },
    #[error(transparent)]
    FretTraceError { err: FretTraceError },
    #[error("could not open {file}")]
    FailedToLoadSingleFile { file: String },
    #[error("{} file(s) failed to load", .failed_files.len())]
    FailedToLoadFiles { successful_traces: Vec<FretTrace>, failed_files: Vec<(String, TraceLoaderError)> },
    #[error("could not read the file contents")]
    FailedToAnalyzeFile,
    #[error("could not read directory {dir}")]
    InvalidDirectoryName { dir: String },
    #[error("invalid line: {reason}")]
    InvalidLine { reason: String },
}
