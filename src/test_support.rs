//! Scripted engine and subsampler doubles for unit tests

use crate::adapters::{AdapterEnd, AdapterSet};
use crate::engine::{
    AdapterMatch, DetectRequest, DetectionAlgorithm, DetectionCandidate, DetectionReport,
    EngineOutcome, TrimEngine, TrimRequest, TrimSummary,
};
use crate::error::Result;
use crate::reads::{OutputPaths, ReadSource};
use crate::subsample::Subsampler;
use std::cell::RefCell;
use std::path::{Path, PathBuf};

type TrimScript = Box<dyn Fn(&TrimRequest<'_>, usize) -> EngineOutcome<TrimSummary>>;
type DetectScript = Box<dyn Fn(&DetectRequest<'_>, usize) -> EngineOutcome<DetectionReport>>;

#[derive(Debug, Clone)]
pub(crate) struct RecordedTrim {
    pub reads: ReadSource,
    pub outputs: OutputPaths,
    pub adapters: AdapterSet,
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedDetect {
    pub reads: ReadSource,
    pub algorithm: DetectionAlgorithm,
    pub max_reads: usize,
}

/// Engine whose answers are computed by closures, given the request and
/// the zero-based index of the call
pub(crate) struct StubEngine {
    trim_script: Option<TrimScript>,
    detect_script: Option<DetectScript>,
    trims: RefCell<Vec<RecordedTrim>>,
    detects: RefCell<Vec<RecordedDetect>>,
}

impl StubEngine {
    pub fn new() -> Self {
        Self {
            trim_script: None,
            detect_script: None,
            trims: RefCell::new(Vec::new()),
            detects: RefCell::new(Vec::new()),
        }
    }

    pub fn on_trim<F>(mut self, script: F) -> Self
    where
        F: Fn(&TrimRequest<'_>, usize) -> EngineOutcome<TrimSummary> + 'static,
    {
        self.trim_script = Some(Box::new(script));
        self
    }

    pub fn on_detect<F>(mut self, script: F) -> Self
    where
        F: Fn(&DetectRequest<'_>, usize) -> EngineOutcome<DetectionReport> + 'static,
    {
        self.detect_script = Some(Box::new(script));
        self
    }

    pub fn trim_calls(&self) -> Vec<RecordedTrim> {
        self.trims.borrow().clone()
    }

    pub fn detect_calls(&self) -> Vec<RecordedDetect> {
        self.detects.borrow().clone()
    }
}

impl TrimEngine for StubEngine {
    fn trim(&self, request: &TrimRequest<'_>) -> EngineOutcome<TrimSummary> {
        let call = self.trims.borrow().len();
        self.trims.borrow_mut().push(RecordedTrim {
            reads: request.reads.clone(),
            outputs: request.outputs.clone(),
            adapters: request.adapters.clone(),
        });
        match &self.trim_script {
            Some(script) => script(request, call),
            None => EngineOutcome::Success(TrimSummary::default()),
        }
    }

    fn detect(&self, request: &DetectRequest<'_>) -> EngineOutcome<DetectionReport> {
        let call = self.detects.borrow().len();
        self.detects.borrow_mut().push(RecordedDetect {
            reads: request.reads.clone(),
            algorithm: request.algorithm,
            max_reads: request.max_reads,
        });
        match &self.detect_script {
            Some(script) => script(request, call),
            None => EngineOutcome::Success(DetectionReport::empty(
                request.reads.end_mode().read_count(),
            )),
        }
    }
}

/// Subsampler that copies its input and remembers where it wrote
pub(crate) struct CopySubsampler {
    pub written: RefCell<Vec<PathBuf>>,
    pub fail: bool,
}

impl CopySubsampler {
    pub fn new() -> Self {
        Self {
            written: RefCell::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            written: RefCell::new(Vec::new()),
            fail: true,
        }
    }
}

impl Subsampler for CopySubsampler {
    fn sample(&self, input: &Path, _size: usize, _seed: u64, output: &Path) -> Result<()> {
        if self.fail {
            return Err(crate::error::TrimError::Subsample {
                program: "copy".to_string(),
                diagnostics: "refusing to sample".to_string(),
            });
        }
        std::fs::copy(input, output)?;
        self.written.borrow_mut().push(output.to_path_buf());
        Ok(())
    }
}

pub(crate) fn summary_with(total: u64, with_adapters: u64, fractions: &[f64]) -> TrimSummary {
    TrimSummary {
        total_record_count: total,
        total_records_with_adapters: with_adapters,
        fraction_records_with_adapters: fractions.to_vec(),
        adapters: vec![Vec::new(); fractions.len()],
        records_written: total,
        total_bp_written: total * 100 * fractions.len() as u64,
        fraction_records_written: 1.0,
    }
}

pub(crate) fn adapter_match(
    end: AdapterEnd,
    sequence: &str,
    adjacent: &[(&str, u64)],
) -> AdapterMatch {
    AdapterMatch {
        name: "1".to_string(),
        end,
        sequence: sequence.to_string(),
        adjacent_bases: adjacent.iter().map(|(b, n)| (b.to_string(), *n)).collect(),
        lengths_back: Default::default(),
    }
}

pub(crate) fn known_candidate(
    name: &str,
    sequence: &str,
    longest_kmer: &str,
    kmer_freq: f64,
    match_fraction: f64,
) -> DetectionCandidate {
    DetectionCandidate {
        is_known: true,
        known_names: vec![name.to_string()],
        known_seqs: vec![sequence.to_string()],
        longest_kmer: longest_kmer.to_string(),
        kmer_freq,
        match_fraction,
    }
}

/// Write `count` identical FASTQ records with reads of `length` bases
pub(crate) fn write_fastq(path: &Path, length: usize, count: usize) {
    let seq = "ACGT".repeat(length / 4 + 1)[..length].to_string();
    let qual = "I".repeat(length);
    let mut content = String::new();
    for i in 0..count {
        content.push_str(&format!("@read{}\n{}\n+\n{}\n", i, seq, qual));
    }
    std::fs::write(path, content).unwrap();
}
