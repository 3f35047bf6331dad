//! Contract with the external adapter trimming engine
//!
//! The engine offers two primitives over a read set: trim with a given
//! adapter set, and detect the most likely adapters. Both are blocking,
//! may be called repeatedly and are safe to retry.

use crate::adapters::{AdapterEnd, AdapterSet};
use crate::reads::{OutputPaths, ReadSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Exit status the engine uses for rejected command lines
pub const USAGE_ERROR_STATUS: i32 = 2;

/// Default per-call ceiling handed to the engine, in seconds
pub const DEFAULT_PROCESS_TIMEOUT: u64 = 600;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutcome<T> {
    Success(T),
    Failed { status: i32, diagnostics: String },
}

impl<T> EngineOutcome<T> {
    /// Usage errors will fail the same way again; everything else may not
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineOutcome::Success(_) => false,
            EngineOutcome::Failed { status, .. } => *status != USAGE_ERROR_STATUS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimOptions {
    /// Remove up to this many adapters from each read
    pub times: u32,
    /// Minimum read/adapter overlap for a match
    pub overlap: u32,
    /// Discard trimmed reads shorter than this
    pub min_length: u32,
    pub threads: u32,
    pub process_timeout: u64,
}

impl Default for TrimOptions {
    fn default() -> Self {
        Self {
            times: 1,
            overlap: 3,
            min_length: 0,
            threads: 2,
            process_timeout: DEFAULT_PROCESS_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionAlgorithm {
    /// Match against a library of known adapter sequences
    Known,
    /// Kmer-based discovery; more sensitive, quadratic in read length
    Heuristic,
}

impl DetectionAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            DetectionAlgorithm::Known => "known",
            DetectionAlgorithm::Heuristic => "heuristic",
        }
    }

    /// Number of reads the detector is allowed to look at
    pub fn max_reads(self) -> usize {
        match self {
            DetectionAlgorithm::Known => 50_000,
            DetectionAlgorithm::Heuristic => 20_000,
        }
    }
}

impl fmt::Display for DetectionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DetectionAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "known" => Ok(DetectionAlgorithm::Known),
            "heuristic" => Ok(DetectionAlgorithm::Heuristic),
            other => Err(format!("unknown detection algorithm '{}'", other)),
        }
    }
}

pub struct TrimRequest<'a> {
    pub reads: &'a ReadSource,
    pub outputs: &'a OutputPaths,
    pub adapters: &'a AdapterSet,
    pub options: &'a TrimOptions,
    pub log_file: Option<&'a Path>,
}

pub struct DetectRequest<'a> {
    pub reads: &'a ReadSource,
    pub algorithm: DetectionAlgorithm,
    pub kmer_size: usize,
    pub max_reads: usize,
    /// FASTA of extra candidate adapter sequences
    pub contaminant_file: Option<&'a Path>,
    pub default_contaminants: bool,
    pub log_file: Option<&'a Path>,
}

/// Statistics for one adapter aligned on one read position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterMatch {
    pub name: String,
    pub end: AdapterEnd,
    pub sequence: String,
    /// Base found right before the adapter match, "" when at the read start
    pub adjacent_bases: BTreeMap<String, u64>,
    /// Number of reads trimmed by each length
    pub lengths_back: BTreeMap<usize, u64>,
}

/// Result of one trim call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrimSummary {
    pub total_record_count: u64,
    pub total_records_with_adapters: u64,
    /// Per read position
    pub fraction_records_with_adapters: Vec<f64>,
    /// Per read position
    pub adapters: Vec<Vec<AdapterMatch>>,
    pub records_written: u64,
    pub total_bp_written: u64,
    pub fraction_records_written: f64,
}

impl TrimSummary {
    pub fn adapter_fraction(&self, read_index: usize) -> f64 {
        self.fraction_records_with_adapters
            .get(read_index)
            .copied()
            .unwrap_or(0.0)
    }
}

/// One candidate proposed by the detector for a read position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionCandidate {
    pub is_known: bool,
    #[serde(default)]
    pub known_names: Vec<String>,
    #[serde(default)]
    pub known_seqs: Vec<String>,
    #[serde(default)]
    pub longest_kmer: String,
    #[serde(default)]
    pub kmer_freq: f64,
    #[serde(default, rename = "known_to_contaminant_match_frac")]
    pub match_fraction: f64,
}

/// Result of one detect call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Candidates per read position
    pub matches: Vec<Vec<DetectionCandidate>>,
}

impl DetectionReport {
    /// The detector found nothing at all
    pub fn empty(read_count: usize) -> Self {
        Self {
            matches: vec![Vec::new(); read_count],
        }
    }
}

pub trait TrimEngine {
    fn trim(&self, request: &TrimRequest<'_>) -> EngineOutcome<TrimSummary>;

    fn detect(&self, request: &DetectRequest<'_>) -> EngineOutcome<DetectionReport>;
}
