//! `TrimEngine` backed by the atropos command line
//!
//! Every call runs `atropos trim` or `atropos detect` with a JSON report
//! written to a scratch directory, then maps the report onto the engine
//! summary types.

use crate::adapters::AdapterEnd;
use crate::engine::{
    AdapterMatch, DetectRequest, DetectionCandidate, DetectionReport, EngineOutcome, TrimEngine,
    TrimRequest, TrimSummary,
};
use crate::error::{Result, TrimError};
use log::{debug, info};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Status reported when atropos could not be started or its report was unusable
pub const NO_STATUS: i32 = -1;

#[derive(Debug, Deserialize)]
struct RawTrimReport {
    #[serde(default)]
    total_record_count: u64,
    trim: RawTrim,
}

#[derive(Debug, Deserialize)]
struct RawTrim {
    #[serde(default)]
    modifiers: BTreeMap<String, RawModifier>,
    formatters: RawFormatters,
}

#[derive(Debug, Default, Deserialize)]
struct RawModifier {
    #[serde(default)]
    adapters: Vec<BTreeMap<String, RawAdapter>>,
    #[serde(default)]
    fraction_records_with_adapters: Vec<Option<f64>>,
    #[serde(default)]
    total_records_with_adapters: u64,
}

#[derive(Debug, Deserialize)]
struct RawAdapter {
    #[serde(rename = "where")]
    location: RawWhere,
    sequence: String,
    #[serde(default)]
    adjacent_bases: BTreeMap<String, u64>,
    #[serde(default)]
    lengths_back: BTreeMap<usize, u64>,
}

#[derive(Debug, Deserialize)]
struct RawWhere {
    desc: AdapterEnd,
}

#[derive(Debug, Deserialize)]
struct RawFormatters {
    #[serde(default)]
    records_written: u64,
    #[serde(default)]
    total_bp_written: u64,
    #[serde(default)]
    fraction_records_written: f64,
}

#[derive(Debug, Deserialize)]
struct RawDetectReport {
    detect: RawDetect,
}

#[derive(Debug, Deserialize)]
struct RawDetect {
    #[serde(default)]
    matches: Vec<Vec<DetectionCandidate>>,
}

pub fn parse_trim_report(json: &str) -> Result<TrimSummary> {
    let raw: RawTrimReport = serde_json::from_str(json)?;
    let RawTrim {
        mut modifiers,
        formatters,
    } = raw.trim;

    let cutter = match modifiers.remove("AdapterCutter") {
        Some(cutter) => cutter,
        None => modifiers
            .into_values()
            .find(|m| !m.adapters.is_empty())
            .ok_or_else(|| TrimError::Report("no adapter cutter in trim report".to_string()))?,
    };

    let adapters = cutter
        .adapters
        .into_iter()
        .map(|per_read| {
            per_read
                .into_iter()
                .map(|(name, adapter)| AdapterMatch {
                    name,
                    end: adapter.location.desc,
                    sequence: adapter.sequence,
                    adjacent_bases: adapter.adjacent_bases,
                    lengths_back: adapter.lengths_back,
                })
                .collect()
        })
        .collect();

    Ok(TrimSummary {
        total_record_count: raw.total_record_count,
        total_records_with_adapters: cutter.total_records_with_adapters,
        fraction_records_with_adapters: cutter
            .fraction_records_with_adapters
            .into_iter()
            .map(|f| f.unwrap_or(0.0))
            .collect(),
        adapters,
        records_written: formatters.records_written,
        total_bp_written: formatters.total_bp_written,
        fraction_records_written: formatters.fraction_records_written,
    })
}

pub fn parse_detect_report(json: &str) -> Result<DetectionReport> {
    let raw: RawDetectReport = serde_json::from_str(json)?;
    Ok(DetectionReport {
        matches: raw.detect.matches,
    })
}

pub struct AtroposEngine {
    pub program: PathBuf,
}

impl Default for AtroposEngine {
    fn default() -> Self {
        Self {
            program: PathBuf::from("atropos"),
        }
    }
}

fn push<S: Into<OsString>>(args: &mut Vec<OsString>, values: impl IntoIterator<Item = S>) {
    args.extend(values.into_iter().map(Into::into));
}

struct Finished {
    status: i32,
    stderr: String,
}

impl AtroposEngine {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments of `atropos trim` for a request
    pub fn trim_args(request: &TrimRequest<'_>, report: &Path) -> Vec<OsString> {
        let options = request.options;
        let mut args: Vec<OsString> = Vec::new();
        push(&mut args, ["trim", "--threads"]);
        push(&mut args, [options.threads.to_string()]);
        push(&mut args, ["--process-timeout".to_string(), options.process_timeout.to_string()]);
        if let Some(log) = request.log_file {
            push(&mut args, [OsString::from("--log-file"), log.into()]);
        }
        push(
            &mut args,
            [
                "--times".to_string(),
                options.times.to_string(),
                "--overlap".to_string(),
                options.overlap.to_string(),
                "--minimum-length".to_string(),
                options.min_length.to_string(),
                "--quiet".to_string(),
            ],
        );
        push(&mut args, [OsString::from("--report-file"), report.into()]);
        push(&mut args, ["--report-formats", "json"]);

        let reads = request.reads;
        match (reads.r2(), request.outputs.r2.as_ref()) {
            (Some(r2), Some(out2)) => {
                push(
                    &mut args,
                    [
                        OsString::from("-pe1"),
                        reads.r1().into(),
                        "-pe2".into(),
                        r2.into(),
                        "-o".into(),
                        request.outputs.r1.clone().into(),
                        "-p".into(),
                        out2.clone().into(),
                    ],
                );
            }
            _ => {
                push(
                    &mut args,
                    [
                        OsString::from("-se"),
                        reads.r1().into(),
                        "-o".into(),
                        request.outputs.r1.clone().into(),
                    ],
                );
            }
        }

        for (slot, sequence) in request.adapters.populated(reads.end_mode()) {
            push(&mut args, [slot.flag(), sequence]);
        }
        args
    }

    /// Arguments of `atropos detect` for a request
    pub fn detect_args(request: &DetectRequest<'_>, report: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        push(
            &mut args,
            [
                "detect".to_string(),
                "--quiet".to_string(),
                "--max-reads".to_string(),
                request.max_reads.to_string(),
                "--detector".to_string(),
                request.algorithm.to_string(),
                "--kmer-size".to_string(),
                request.kmer_size.to_string(),
            ],
        );
        if let Some(log) = request.log_file {
            push(&mut args, [OsString::from("--log-file"), log.into()]);
        }
        push(&mut args, [OsString::from("--report-file"), report.into()]);
        push(&mut args, ["--report-formats", "json"]);

        let reads = request.reads;
        match reads.r2() {
            Some(r2) => push(
                &mut args,
                [OsString::from("-pe1"), reads.r1().into(), "-pe2".into(), r2.into()],
            ),
            None => push(&mut args, [OsString::from("-se"), reads.r1().into()]),
        }
        if let Some(fasta) = request.contaminant_file {
            push(&mut args, [OsString::from("-F"), fasta.into()]);
        }
        if !request.default_contaminants {
            push(&mut args, ["--no-default-contaminants"]);
        }
        args
    }

    /// Run atropos, appending its stdout to `log_file` when one is given
    fn execute(
        &self,
        args: &[OsString],
        log_file: Option<&Path>,
    ) -> std::result::Result<Finished, String> {
        debug!(
            "{} {}",
            self.program.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let stdout = match log_file {
            Some(path) => OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map(Stdio::from)
                .map_err(|e| format!("cannot open log file {}: {}", path.display(), e))?,
            None => Stdio::null(),
        };

        let output = Command::new(&self.program)
            .args(args)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| format!("cannot run {}: {}", self.program.display(), e))?;

        Ok(Finished {
            status: output.status.code().unwrap_or(NO_STATUS),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn run<T>(
        &self,
        args: Vec<OsString>,
        report: &Path,
        log_file: Option<&Path>,
        parse: impl FnOnce(&str) -> Result<T>,
        on_stderr: impl FnOnce(&str) -> Option<T>,
    ) -> EngineOutcome<T> {
        let finished = match self.execute(&args, log_file) {
            Ok(finished) => finished,
            Err(diagnostics) => {
                return EngineOutcome::Failed {
                    status: NO_STATUS,
                    diagnostics,
                }
            }
        };

        if let Some(value) = on_stderr(&finished.stderr) {
            return EngineOutcome::Success(value);
        }
        if finished.status != 0 {
            return EngineOutcome::Failed {
                status: finished.status,
                diagnostics: finished.stderr,
            };
        }

        match read_report(report).and_then(|json| parse(&json)) {
            Ok(value) => EngineOutcome::Success(value),
            Err(e) => EngineOutcome::Failed {
                status: NO_STATUS,
                diagnostics: e.to_string(),
            },
        }
    }
}

/// atropos may or may not add the format extension to the report name
fn read_report(prefix: &Path) -> Result<String> {
    let with_extension = prefix.with_extension("json");
    let path = if with_extension.exists() {
        with_extension
    } else {
        prefix.to_path_buf()
    };
    std::fs::read_to_string(&path)
        .map_err(|e| TrimError::Report(format!("{}: {}", path.display(), e)))
}

fn scratch_report() -> std::result::Result<(tempfile::TempDir, PathBuf), String> {
    let dir = tempfile::Builder::new()
        .prefix("atropos_report_")
        .tempdir()
        .map_err(|e| format!("cannot create report directory: {}", e))?;
    let report = dir.path().join("report");
    Ok((dir, report))
}

impl TrimEngine for AtroposEngine {
    fn trim(&self, request: &TrimRequest<'_>) -> EngineOutcome<TrimSummary> {
        let (_dir, report) = match scratch_report() {
            Ok(scratch) => scratch,
            Err(diagnostics) => {
                return EngineOutcome::Failed {
                    status: NO_STATUS,
                    diagnostics,
                }
            }
        };
        let args = Self::trim_args(request, &report);
        self.run(args, &report, request.log_file, parse_trim_report, |_| None)
    }

    fn detect(&self, request: &DetectRequest<'_>) -> EngineOutcome<DetectionReport> {
        let (_dir, report) = match scratch_report() {
            Ok(scratch) => scratch,
            Err(diagnostics) => {
                return EngineOutcome::Failed {
                    status: NO_STATUS,
                    diagnostics,
                }
            }
        };
        let read_count = request.reads.end_mode().read_count();
        let args = Self::detect_args(request, &report);
        // atropos dies with an IndexError when it has no candidate at all
        self.run(args, &report, request.log_file, parse_detect_report, |stderr| {
            if stderr.contains("IndexError") {
                info!("Atropos does not find any adapters.");
                Some(DetectionReport::empty(read_count))
            } else {
                None
            }
        })
    }
}
