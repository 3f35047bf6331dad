//! Trimming session: trim, correct missing adapter bases, detect adapters
//!
//! A session owns one read source and the adapter set used against it. Each
//! trim call inspects the bases found right before every adapter match: when
//! one base dominates, the adapter sequence is most likely missing that
//! leading base, so it is prepended and the trim is run again.

use crate::adapters::{AdapterSet, AdapterSlot};
use crate::engine::{
    DetectRequest, DetectionAlgorithm, DetectionCandidate, DetectionReport, EngineOutcome,
    TrimEngine, TrimOptions, TrimRequest, TrimSummary,
};
use crate::error::{Result, TrimError};
use crate::reads::{EndMode, OutputPaths, ReadSource};
use crate::reporting::TrimmingReport;
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Adjacent-base histograms must hold strictly more samples than this
pub const MIN_ADJACENT_SAMPLE: u64 = 20;

/// Share of the dominant adjacent base flagging a missing adapter base
pub const MIN_DOMINANT_SHARE: f64 = 0.8;

/// Pause before the single retry of a failed engine call
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

pub const DEFAULT_KMER_SIZE: usize = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionPolicy {
    pub min_sample: u64,
    pub min_share: f64,
    /// Amplicon fragments have fixed ends, so a skewed adjacent base is expected
    pub amplicon: bool,
}

impl Default for CorrectionPolicy {
    fn default() -> Self {
        Self {
            min_sample: MIN_ADJACENT_SAMPLE,
            min_share: MIN_DOMINANT_SHARE,
            amplicon: false,
        }
    }
}

/// An adapter whose matches are nearly always preceded by the same base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingBase {
    pub slot: AdapterSlot,
    pub base: String,
    /// Engine-reported adapter with the missing base prepended
    pub corrected: String,
}

impl CorrectionPolicy {
    pub fn amplicon() -> Self {
        Self {
            amplicon: true,
            ..Self::default()
        }
    }

    /// Dominant base of a histogram, if it passes both thresholds
    pub fn dominant_base<'h>(&self, histogram: &'h BTreeMap<String, u64>) -> Option<&'h str> {
        let total: u64 = histogram.values().sum();
        if total <= self.min_sample {
            return None;
        }

        histogram
            .iter()
            .filter(|(base, _)| !base.is_empty())
            .find(|(_, &count)| count as f64 / total as f64 >= self.min_share)
            .map(|(base, _)| base.as_str())
    }

    /// Every skewed adapter in a trim summary, whatever the amplicon setting
    pub fn missing_bases(&self, summary: &TrimSummary, mode: EndMode) -> Vec<MissingBase> {
        let mut found = Vec::new();

        for (read_index, matches) in summary.adapters.iter().enumerate().take(mode.read_count()) {
            for adapter in matches {
                let Some(slot) = AdapterSlot::for_alignment(adapter.end, read_index) else {
                    continue;
                };
                if let Some(base) = self.dominant_base(&adapter.adjacent_bases) {
                    found.push(MissingBase {
                        slot,
                        base: base.to_string(),
                        corrected: format!("{}{}", base, adapter.sequence),
                    });
                }
            }
        }

        found
    }

    /// Corrections to apply: none at all in amplicon mode
    pub fn corrections(&self, summary: &TrimSummary, mode: EndMode) -> Vec<MissingBase> {
        if self.amplicon {
            Vec::new()
        } else {
            self.missing_bases(summary, mode)
        }
    }
}

/// Best known adapter proposed by the detector for one read position
#[derive(Debug, Clone, PartialEq)]
pub struct KnownAdapter {
    pub read_index: usize,
    pub name: String,
    pub sequence: String,
    pub longest_kmer: String,
    pub kmer_freq: f64,
    pub match_fraction: f64,
}

impl KnownAdapter {
    pub fn score(&self) -> f64 {
        self.kmer_freq * self.match_fraction
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetectionHit {
    Known(KnownAdapter),
    Unknown,
}

impl DetectionHit {
    fn from_candidate(read_index: usize, candidate: &DetectionCandidate) -> DetectionHit {
        match (candidate.known_names.first(), candidate.known_seqs.first()) {
            (Some(name), Some(sequence)) if candidate.is_known => DetectionHit::Known(KnownAdapter {
                read_index,
                name: name.clone(),
                sequence: sequence.clone(),
                longest_kmer: candidate.longest_kmer.clone(),
                kmer_freq: candidate.kmer_freq,
                match_fraction: candidate.match_fraction,
            }),
            _ => DetectionHit::Unknown,
        }
    }

    pub fn known(&self) -> Option<&KnownAdapter> {
        match self {
            DetectionHit::Known(adapter) => Some(adapter),
            DetectionHit::Unknown => None,
        }
    }
}

/// Pick one hit per read position: first known candidate, replaced only
/// by a later one with a strictly higher score
pub fn best_hits(report: &DetectionReport, read_count: usize) -> Vec<DetectionHit> {
    let mut best = vec![DetectionHit::Unknown; read_count];

    for (read_index, candidates) in report.matches.iter().enumerate().take(read_count) {
        for candidate in candidates {
            let hit = DetectionHit::from_candidate(read_index, candidate);
            let DetectionHit::Known(hit) = hit else {
                continue;
            };
            let replace = match &best[read_index] {
                DetectionHit::Unknown => true,
                DetectionHit::Known(current) => hit.score() > current.score(),
            };
            if replace {
                best[read_index] = DetectionHit::Known(hit);
            }
        }
    }

    best
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrimResult {
    pub summary: TrimSummary,
    /// Adapters the final summary was produced with
    pub adapters: AdapterSet,
    /// Engine trim calls that produced a summary
    pub passes: usize,
}

impl TrimResult {
    pub fn adapter_fraction(&self, read_index: usize) -> f64 {
        self.summary.adapter_fraction(read_index)
    }
}

/// Remove a stale engine log file; a directory in its place is an error
pub fn reset_log_file(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Err(TrimError::Configuration(format!(
            "log file {} already exists as a directory",
            path.display()
        )));
    }
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn call_with_retry<T>(
    command: &str,
    delay: Duration,
    mut call: impl FnMut() -> EngineOutcome<T>,
) -> Result<T> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = call();
        let retry = attempt == 1 && outcome.is_retryable();
        match outcome {
            EngineOutcome::Success(value) => return Ok(value),
            EngineOutcome::Failed { status, .. } if retry => {
                warn!(
                    "atropos {} exited with status {}, retrying in {}s",
                    command,
                    status,
                    delay.as_secs()
                );
                std::thread::sleep(delay);
            }
            EngineOutcome::Failed { status, diagnostics } => {
                error!("Atropos {} did not work.", command);
                return Err(TrimError::EngineFailure {
                    command: command.to_string(),
                    status,
                    diagnostics,
                });
            }
        }
    }
}

pub struct TrimmingSession<'e, E: TrimEngine + ?Sized> {
    engine: &'e E,
    reads: ReadSource,
    adapters: AdapterSet,
    log_file: Option<PathBuf>,
    policy: CorrectionPolicy,
    retry_delay: Duration,
    kmer_size: usize,
    contaminant_file: Option<PathBuf>,
    trimming: Option<TrimSummary>,
    detection: Option<DetectionReport>,
}

impl<'e, E: TrimEngine + ?Sized> TrimmingSession<'e, E> {
    pub fn new(engine: &'e E, reads: ReadSource, adapters: AdapterSet) -> Self {
        Self {
            engine,
            reads,
            adapters,
            log_file: None,
            policy: CorrectionPolicy::default(),
            retry_delay: RETRY_DELAY,
            kmer_size: DEFAULT_KMER_SIZE,
            contaminant_file: None,
            trimming: None,
            detection: None,
        }
    }

    pub fn with_log_file(mut self, log_file: Option<PathBuf>) -> Self {
        self.log_file = log_file;
        self
    }

    pub fn with_policy(mut self, policy: CorrectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_kmer_size(mut self, kmer_size: usize) -> Self {
        self.kmer_size = kmer_size;
        self
    }

    pub fn with_contaminant_file(mut self, path: Option<PathBuf>) -> Self {
        self.contaminant_file = path;
        self
    }

    pub fn reads(&self) -> &ReadSource {
        &self.reads
    }

    pub fn adapters(&self) -> &AdapterSet {
        &self.adapters
    }

    pub fn set_adapters(&mut self, adapters: AdapterSet) {
        self.adapters = adapters;
    }

    /// Summary of the last completed trim, if any
    pub fn trimming(&self) -> Option<&TrimSummary> {
        self.trimming.as_ref()
    }

    /// Report of the last completed detection, if any
    pub fn detection(&self) -> Option<&DetectionReport> {
        self.detection.as_ref()
    }

    /// Trim, and re-trim with corrected adapters up to `max_iterations` times
    pub fn trim_with_correction(
        &mut self,
        outputs: &OutputPaths,
        options: &TrimOptions,
        max_iterations: usize,
    ) -> Result<TrimResult> {
        let mode = self.reads.end_mode();
        self.adapters.validate(mode)?;
        outputs.validate_for(&self.reads)?;

        let mut remaining = max_iterations;
        let mut passes = 0;

        let summary = loop {
            let summary = self.run_trim(outputs, options)?;
            passes += 1;

            for skew in self.policy.missing_bases(&summary, mode) {
                warn!(
                    "A '{}' is missing in the adapter sequence of option '{}'.",
                    skew.base, skew.slot
                );
            }

            let corrections = self.policy.corrections(&summary, mode);
            if corrections.is_empty() {
                break summary;
            }
            if remaining == 0 {
                warn!("No correction passes left, keeping the current adapters.");
                break summary;
            }
            remaining -= 1;

            for correction in corrections {
                info!(
                    "New adapter for option {} is {}",
                    correction.slot, correction.corrected
                );
                self.adapters.set(correction.slot, Some(correction.corrected));
            }
            info!("Rerun adapter removal with new adapters.");
        };

        self.trimming = Some(summary.clone());
        Ok(TrimResult {
            summary,
            adapters: self.adapters.clone(),
            passes,
        })
    }

    fn run_trim(&self, outputs: &OutputPaths, options: &TrimOptions) -> Result<TrimSummary> {
        let request = TrimRequest {
            reads: &self.reads,
            outputs,
            adapters: &self.adapters,
            options,
            log_file: self.log_file.as_deref(),
        };
        debug!(
            "Atropos trim on {} with adapters [{}]",
            self.reads.r1().display(),
            self.adapters
                .populated(self.reads.end_mode())
                .map(|(slot, seq)| format!("{} {}", slot, seq))
                .collect::<Vec<_>>()
                .join(", ")
        );

        call_with_retry("trim", self.retry_delay, || self.engine.trim(&request))
    }

    /// Report of the last trim, or of the untouched input if nothing was trimmed
    pub fn trimming_report(&self) -> Result<TrimmingReport> {
        let read_lengths = self.reads.read_lengths()?;
        Ok(match &self.trimming {
            Some(summary) => TrimmingReport::from_trim(
                summary,
                &self.adapters,
                self.reads.end_mode(),
                &read_lengths,
            ),
            None => {
                info!("No trimming ran. Basic statistics are written.");
                TrimmingReport::untrimmed(&self.adapters, &read_lengths)
            }
        })
    }

    /// Detect 3' adapters, one hit per read position
    ///
    /// When every position has a known hit, its sequence is installed in the
    /// matching 3' slot of the session adapters.
    pub fn guess_adapters(
        &mut self,
        algorithm: DetectionAlgorithm,
        max_reads: usize,
    ) -> Result<Vec<DetectionHit>> {
        let request = DetectRequest {
            reads: &self.reads,
            algorithm,
            kmer_size: self.kmer_size,
            max_reads,
            contaminant_file: self.contaminant_file.as_deref(),
            default_contaminants: true,
            log_file: self.log_file.as_deref(),
        };
        debug!(
            "Atropos detect ({}, {} reads) on {}",
            algorithm,
            max_reads,
            self.reads.r1().display()
        );

        let report = call_with_retry("detect", self.retry_delay, || self.engine.detect(&request))?;
        let hits = best_hits(&report, self.reads.end_mode().read_count());
        self.detection = Some(report);

        let known: Vec<&KnownAdapter> = hits.iter().filter_map(DetectionHit::known).collect();
        if known.len() == hits.len() {
            for hit in known {
                self.adapters
                    .set(AdapterSlot::THREE_PRIME[hit.read_index], Some(hit.sequence.clone()));
            }
        } else {
            info!("No adapters detected.");
        }

        Ok(hits)
    }
}
