//! Automatic adapter discovery and trimming
//!
//! Adapters are discovered on a bounded subsample of the reads:
//!
//! 1. detect the most likely 3' adapter of each read position
//! 2. trim with the detected orientation and with its reverse complement,
//!    keeping per read position the orientation that matched more reads
//! 3. trim with the best orientation and detect again on the trimmed reads;
//!    finding the same adapter again means it was not removed, so the
//!    longest common kmer of the first detection is used instead
//! 4. trim the full read files with the resulting adapters
//!
//! No adapter on any read position ends the run early: the inputs are
//! linked through as the trimmed outputs.

use crate::adapters::{AdapterSet, AdapterSlot};
use crate::engine::{DetectionAlgorithm, TrimEngine, TrimOptions};
use crate::error::Result;
use crate::reads::{first_read_length, OutputPaths, ReadSource};
use crate::reporting::{link_through, TrimmingReport};
use crate::session::{
    CorrectionPolicy, DetectionHit, KnownAdapter, TrimResult, TrimmingSession, RETRY_DELAY,
};
use crate::subsample::{Subsampler, SubsampleWorkspace, DEFAULT_SEED, DEFAULT_SUBSAMPLE_SIZE};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;

/// Read lengths handled by the heuristic detector; its cost is quadratic
pub const HEURISTIC_MIN_LENGTH: usize = 50;
pub const HEURISTIC_MAX_LENGTH: usize = 151;

pub const DEFAULT_CORRECTION_PASSES: usize = 3;

#[derive(Debug, Clone)]
pub struct AutoDetectConfig {
    pub subsample_size: usize,
    pub seed: u64,
    /// Picked from the read length when unset
    pub algorithm: Option<DetectionAlgorithm>,
    pub temp_dir: PathBuf,
    pub kmer_size: usize,
    pub contaminant_file: Option<PathBuf>,
}

impl Default for AutoDetectConfig {
    fn default() -> Self {
        Self {
            subsample_size: DEFAULT_SUBSAMPLE_SIZE,
            seed: DEFAULT_SEED,
            algorithm: None,
            temp_dir: std::env::temp_dir(),
            kmer_size: crate::session::DEFAULT_KMER_SIZE,
            contaminant_file: None,
        }
    }
}

pub fn select_algorithm(read_length: usize) -> DetectionAlgorithm {
    if (HEURISTIC_MIN_LENGTH..=HEURISTIC_MAX_LENGTH).contains(&read_length) {
        DetectionAlgorithm::Heuristic
    } else {
        DetectionAlgorithm::Known
    }
}

/// Per read position, the used adapter of the orientation that matched the
/// larger fraction of records; ties keep the forward orientation
pub fn choose_orientation(
    forward: &TrimResult,
    reverse: &TrimResult,
    slots: &[AdapterSlot],
) -> AdapterSet {
    let mut best = forward.adapters.clone();
    for (i, &slot) in slots.iter().enumerate() {
        if reverse.adapter_fraction(i) > forward.adapter_fraction(i) {
            best.set(slot, reverse.adapters.get(slot).map(str::to_string));
        }
    }
    best
}

/// What detection on the trimmed subsample says about one read position
#[derive(Debug, Clone, PartialEq)]
pub enum ReDetection {
    /// Nothing left to detect
    Clean,
    /// The same adapter is still there
    NotRemoved { longest_kmer: String },
    /// Another adapter shows up; left to the operator
    Ambiguous(KnownAdapter),
}

pub fn judge_redetection(original: &KnownAdapter, redetected: &DetectionHit) -> ReDetection {
    match redetected {
        DetectionHit::Unknown => ReDetection::Clean,
        DetectionHit::Known(hit) if hit.sequence == original.sequence => ReDetection::NotRemoved {
            longest_kmer: original.longest_kmer.clone(),
        },
        DetectionHit::Known(hit) => ReDetection::Ambiguous(hit.clone()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AutoDetectOutcome {
    Trimmed {
        result: TrimResult,
        report: TrimmingReport,
        algorithm: DetectionAlgorithm,
    },
    /// No adapter found; the inputs were linked through untouched
    NoAdapter { report: TrimmingReport },
}

impl AutoDetectOutcome {
    pub fn report(&self) -> &TrimmingReport {
        match self {
            AutoDetectOutcome::Trimmed { report, .. } => report,
            AutoDetectOutcome::NoAdapter { report } => report,
        }
    }
}

fn describe(hit: &KnownAdapter) -> String {
    format!(
        concat!(
            "   - adapter_name: {}\n",
            "   - sequence: {}\n",
            "   - longest_kmer: {}\n",
            "   - kmer_freq: {}\n",
            "   - match_fraction: {}",
        ),
        hit.name, hit.sequence, hit.longest_kmer, hit.kmer_freq, hit.match_fraction
    )
}

pub struct AutoDetectDriver<'a, E: TrimEngine + ?Sized> {
    engine: &'a E,
    subsampler: &'a dyn Subsampler,
    config: AutoDetectConfig,
    options: TrimOptions,
    max_iterations: usize,
    policy: CorrectionPolicy,
    log_file: Option<PathBuf>,
    retry_delay: Duration,
}

impl<'a, E: TrimEngine + ?Sized> AutoDetectDriver<'a, E> {
    pub fn new(engine: &'a E, subsampler: &'a dyn Subsampler, config: AutoDetectConfig) -> Self {
        Self {
            engine,
            subsampler,
            config,
            options: TrimOptions::default(),
            max_iterations: DEFAULT_CORRECTION_PASSES,
            policy: CorrectionPolicy::default(),
            log_file: None,
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn with_options(mut self, options: TrimOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_policy(mut self, policy: CorrectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_log_file(mut self, log_file: Option<PathBuf>) -> Self {
        self.log_file = log_file;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn session(&self, reads: ReadSource, adapters: AdapterSet) -> TrimmingSession<'a, E> {
        TrimmingSession::new(self.engine, reads, adapters)
            .with_log_file(self.log_file.clone())
            .with_policy(self.policy.clone())
            .with_retry_delay(self.retry_delay)
            .with_kmer_size(self.config.kmer_size)
            .with_contaminant_file(self.config.contaminant_file.clone())
    }

    /// Discover adapters on a subsample, then trim `reads` into `outputs`
    ///
    /// `operator` holds adapters supplied up front; detected 3' adapters are
    /// added on top of them.
    pub fn run(
        &self,
        reads: &ReadSource,
        operator: &AdapterSet,
        outputs: &OutputPaths,
    ) -> Result<AutoDetectOutcome> {
        let mode = reads.end_mode();
        operator.validate(mode)?;
        outputs.validate_for(reads)?;

        // removed on every return path below
        let workspace = SubsampleWorkspace::create(&self.config.temp_dir)?;
        let sub_reads = workspace.subsample(
            self.subsampler,
            reads,
            self.config.subsample_size,
            self.config.seed,
        )?;

        let algorithm = match self.config.algorithm {
            Some(algorithm) => algorithm,
            None => select_algorithm(first_read_length(sub_reads.r1())?),
        };
        let max_reads = algorithm.max_reads();
        info!("Detect adapters with the {} algorithm on {} reads", algorithm, max_reads);

        let mut sub_session = self.session(sub_reads.clone(), operator.clone());
        let detected = sub_session.guess_adapters(algorithm, max_reads)?;
        let known: Vec<KnownAdapter> = detected
            .iter()
            .filter_map(DetectionHit::known)
            .cloned()
            .collect();

        if known.len() < detected.len() {
            info!("Nothing to trim, symlinks are generated.");
            link_through(reads.r1(), &outputs.r1)?;
            if let (Some(r2), Some(out2)) = (reads.r2(), outputs.r2.as_ref()) {
                link_through(r2, out2)?;
            }
            let report = TrimmingReport::untrimmed(operator, &reads.read_lengths()?);
            return Ok(AutoDetectOutcome::NoAdapter { report });
        }

        for hit in &known {
            info!(
                "An adapter is detected at the 3' end of reads {}:\n{}",
                hit.read_index + 1,
                describe(hit)
            );
        }

        let slots = &AdapterSlot::THREE_PRIME[..mode.read_count()];
        let sub_outputs = workspace.trimmed_outputs(&sub_reads);

        info!("Run the trimming with detected adapters...");
        let forward_adapters = sub_session.adapters().clone();
        let forward =
            sub_session.trim_with_correction(&sub_outputs, &self.options, self.max_iterations)?;

        info!("Run the trimming with reverse complement adapters...");
        sub_session.set_adapters(forward_adapters.reverse_complemented(slots));
        let reverse =
            sub_session.trim_with_correction(&sub_outputs, &self.options, self.max_iterations)?;

        sub_session.set_adapters(choose_orientation(&forward, &reverse, slots));
        sub_session.trim_with_correction(&sub_outputs, &self.options, self.max_iterations)?;

        info!("Try to re-detect adapters...");
        let trimmed_reads = ReadSource::new(sub_outputs.r1.clone(), sub_outputs.r2.clone());
        let redetected = self
            .session(trimmed_reads, AdapterSet::new())
            .guess_adapters(algorithm, max_reads)?;

        let mut adapters = sub_session.adapters().clone();
        let mut rerun = false;
        for (first, second) in known.iter().zip(&redetected) {
            let read = first.read_index + 1;
            match judge_redetection(first, second) {
                ReDetection::Clean => {
                    info!(
                        "Adapters for R{} are perfectly trimmed. No known sequence detected.",
                        read
                    );
                }
                ReDetection::NotRemoved { longest_kmer } => {
                    warn!("Adapters are not properly removed at the 3' end of R{}.", read);
                    if longest_kmer.is_empty() {
                        warn!("No longest kmer was reported for R{}, keeping the adapter.", read);
                        continue;
                    }
                    adapters.set(slots[first.read_index], Some(longest_kmer));
                    rerun = true;
                }
                ReDetection::Ambiguous(other) => {
                    warn!(
                        "Another sequence is detected at the 3' end of R{}:\n{}",
                        read,
                        describe(&other)
                    );
                }
            }
        }
        sub_session.set_adapters(adapters);

        // The known-library detector does not get this refinement round.
        if rerun && algorithm == DetectionAlgorithm::Heuristic {
            let refined = sub_session.guess_adapters(algorithm, max_reads)?;
            let kmers: Option<Vec<&KnownAdapter>> =
                refined.iter().map(DetectionHit::known).collect();
            match kmers {
                Some(hits) => {
                    info!("Run the trimming with detected longest kmer...");
                    let mut adapters = sub_session.adapters().clone();
                    for hit in hits.into_iter().filter(|hit| !hit.longest_kmer.is_empty()) {
                        adapters.set(slots[hit.read_index], Some(hit.longest_kmer.clone()));
                    }
                    sub_session.set_adapters(adapters);
                    sub_session.trim_with_correction(
                        &sub_outputs,
                        &self.options,
                        self.max_iterations,
                    )?;
                }
                None => {
                    info!("Longest kmer refinement found no adapter, keeping current adapters.")
                }
            }
        }

        let final_adapters = sub_session.adapters().clone();
        drop(workspace);

        info!("Run trimming on the file.");
        let mut session = self.session(reads.clone(), final_adapters);
        let result = session.trim_with_correction(outputs, &self.options, self.max_iterations)?;
        let report = session.trimming_report()?;

        Ok(AutoDetectOutcome::Trimmed {
            result,
            report,
            algorithm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{DetectionReport, EngineOutcome, TrimSummary};
    use crate::error::TrimError;
    use crate::test_support::{
        known_candidate, summary_with, write_fastq, CopySubsampler, StubEngine,
    };
    use std::path::Path;

    const ADAPTER: &str = "AACGTGATCGGAAGAGC";

    struct Fixture {
        inputs: tempfile::TempDir,
        scratch: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                inputs: tempfile::tempdir().unwrap(),
                scratch: tempfile::tempdir().unwrap(),
            }
        }

        fn single(&self, length: usize) -> (ReadSource, OutputPaths) {
            let r1 = self.inputs.path().join("in_R1.fastq");
            write_fastq(&r1, length, 8);
            let out = OutputPaths::new(self.inputs.path().join("out_R1.fastq"), None);
            (ReadSource::single(r1), out)
        }

        fn paired(&self, length: usize) -> (ReadSource, OutputPaths) {
            let r1 = self.inputs.path().join("in_R1.fastq");
            let r2 = self.inputs.path().join("in_R2.fastq");
            write_fastq(&r1, length, 8);
            write_fastq(&r2, length, 8);
            let out = OutputPaths::new(
                self.inputs.path().join("out_R1.fastq"),
                Some(self.inputs.path().join("out_R2.fastq")),
            );
            (ReadSource::paired(r1, r2), out)
        }

        fn config(&self, algorithm: Option<DetectionAlgorithm>) -> AutoDetectConfig {
            AutoDetectConfig {
                algorithm,
                temp_dir: self.scratch.path().to_path_buf(),
                ..AutoDetectConfig::default()
            }
        }

        fn scratch_is_empty(&self) -> bool {
            std::fs::read_dir(self.scratch.path()).unwrap().next().is_none()
        }
    }

    fn on_trimmed_reads(path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().starts_with("trimmed_"))
            .unwrap_or(false)
    }

    fn hit_report(sequences: &[(&str, &str)]) -> DetectionReport {
        DetectionReport {
            matches: sequences
                .iter()
                .map(|(seq, kmer)| vec![known_candidate("TruSeq", seq, kmer, 100.0, 0.9)])
                .collect(),
        }
    }

    /// Reverse-complemented adapters match more reads than the forward ones
    fn orientation_summary(adapter: Option<&str>) -> TrimSummary {
        let fraction = if adapter == Some(reverse_adapter().as_str()) { 0.6 } else { 0.2 };
        summary_with(100, (fraction * 100.0) as u64, &[fraction])
    }

    fn reverse_adapter() -> String {
        crate::adapters::reverse_complement(ADAPTER)
    }

    fn trim_result(adapters: AdapterSet, fractions: &[f64]) -> TrimResult {
        TrimResult {
            summary: summary_with(100, 10, fractions),
            adapters,
            passes: 1,
        }
    }

    #[test]
    fn test_select_algorithm_by_read_length() {
        assert_eq!(select_algorithm(49), DetectionAlgorithm::Known);
        assert_eq!(select_algorithm(50), DetectionAlgorithm::Heuristic);
        assert_eq!(select_algorithm(100), DetectionAlgorithm::Heuristic);
        assert_eq!(select_algorithm(151), DetectionAlgorithm::Heuristic);
        assert_eq!(select_algorithm(152), DetectionAlgorithm::Known);
        assert_eq!(select_algorithm(300), DetectionAlgorithm::Known);
    }

    #[test]
    fn test_choose_orientation_per_read_position() {
        let slots = &AdapterSlot::THREE_PRIME;
        let forward_set = AdapterSet::new()
            .with(AdapterSlot::ThreePrimeR1, "AACG")
            .with(AdapterSlot::ThreePrimeR2, "AACG");
        let reverse_set = forward_set.reverse_complemented(slots);

        let forward = trim_result(forward_set, &[0.4, 0.5]);
        let reverse = trim_result(reverse_set, &[0.6, 0.5]);
        let best = choose_orientation(&forward, &reverse, slots);

        assert_eq!(best.get(AdapterSlot::ThreePrimeR1), Some("CGTT"));
        // tie keeps the forward orientation
        assert_eq!(best.get(AdapterSlot::ThreePrimeR2), Some("AACG"));
    }

    #[test]
    fn test_judge_redetection() {
        let original = KnownAdapter {
            read_index: 0,
            name: "TruSeq".to_string(),
            sequence: ADAPTER.to_string(),
            longest_kmer: "GATCGGAAGAGC".to_string(),
            kmer_freq: 10.0,
            match_fraction: 1.0,
        };
        let other = KnownAdapter {
            sequence: "CTGTCTCTTATACACATCT".to_string(),
            ..original.clone()
        };

        assert_eq!(judge_redetection(&original, &DetectionHit::Unknown), ReDetection::Clean);
        assert_eq!(
            judge_redetection(&original, &DetectionHit::Known(original.clone())),
            ReDetection::NotRemoved {
                longest_kmer: "GATCGGAAGAGC".to_string()
            }
        );
        assert_eq!(
            judge_redetection(&original, &DetectionHit::Known(other.clone())),
            ReDetection::Ambiguous(other)
        );
    }

    #[test]
    fn test_no_adapter_links_paired_reads_through() {
        let fixture = Fixture::new();
        let (reads, outputs) = fixture.paired(100);
        let engine = StubEngine::new().on_detect(|_, _| {
            EngineOutcome::Success(DetectionReport {
                matches: vec![vec![], vec![known_candidate("TruSeq", ADAPTER, "GATC", 9.0, 1.0)]],
            })
        });
        let sampler = CopySubsampler::new();
        let driver = AutoDetectDriver::new(&engine, &sampler, fixture.config(None));

        let outcome = driver.run(&reads, &AdapterSet::new(), &outputs).unwrap();

        let AutoDetectOutcome::NoAdapter { report } = outcome else {
            panic!("expected the no-adapter outcome");
        };
        assert_eq!(report.percent_trim, 0.0);
        assert_eq!(report.percent_discard, 0.0);
        assert_eq!(report.mean_read_length, 100.0);
        assert_eq!(
            std::fs::read_link(&outputs.r1).unwrap(),
            std::fs::canonicalize(reads.r1()).unwrap()
        );
        assert_eq!(
            std::fs::read_link(outputs.r2.as_ref().unwrap()).unwrap(),
            std::fs::canonicalize(reads.r2().unwrap()).unwrap()
        );
        assert!(engine.trim_calls().is_empty());
        assert!(fixture.scratch_is_empty());
    }

    #[test]
    fn test_heuristic_selected_for_short_reads() {
        let fixture = Fixture::new();
        let (reads, outputs) = fixture.single(100);
        let engine = StubEngine::new();
        let sampler = CopySubsampler::new();

        AutoDetectDriver::new(&engine, &sampler, fixture.config(None))
            .run(&reads, &AdapterSet::new(), &outputs)
            .unwrap();

        let detect = &engine.detect_calls()[0];
        assert_eq!(detect.algorithm, DetectionAlgorithm::Heuristic);
        assert_eq!(detect.max_reads, 20_000);
        assert!(detect.reads.r1().starts_with(fixture.scratch.path()));
    }

    #[test]
    fn test_known_library_selected_for_long_reads() {
        let fixture = Fixture::new();
        let (reads, outputs) = fixture.single(300);
        let engine = StubEngine::new();
        let sampler = CopySubsampler::new();

        AutoDetectDriver::new(&engine, &sampler, fixture.config(None))
            .run(&reads, &AdapterSet::new(), &outputs)
            .unwrap();

        let detect = &engine.detect_calls()[0];
        assert_eq!(detect.algorithm, DetectionAlgorithm::Known);
        assert_eq!(detect.max_reads, 50_000);
    }

    #[test]
    fn test_best_orientation_is_used_on_full_reads() {
        let fixture = Fixture::new();
        let (reads, outputs) = fixture.single(100);
        let engine = StubEngine::new()
            .on_detect(|request, _| {
                if on_trimmed_reads(request.reads.r1()) {
                    EngineOutcome::Success(DetectionReport::empty(1))
                } else {
                    EngineOutcome::Success(hit_report(&[(ADAPTER, "GATCGGAAGAGC")]))
                }
            })
            .on_trim(|request, _| {
                let adapter = request.adapters.get(AdapterSlot::ThreePrimeR1);
                EngineOutcome::Success(orientation_summary(adapter))
            });
        let sampler = CopySubsampler::new();
        let driver = AutoDetectDriver::new(&engine, &sampler, fixture.config(None));

        let outcome = driver.run(&reads, &AdapterSet::new(), &outputs).unwrap();

        let trims = engine.trim_calls();
        // forward, reverse complement, best orientation, full reads
        assert_eq!(trims.len(), 4);
        assert_eq!(trims[0].adapters.get(AdapterSlot::ThreePrimeR1), Some(ADAPTER));
        assert_eq!(
            trims[1].adapters.get(AdapterSlot::ThreePrimeR1),
            Some(reverse_adapter().as_str())
        );
        let last = trims.last().unwrap();
        assert_eq!(last.reads, reads);
        assert_eq!(last.outputs, outputs);
        assert_eq!(last.adapters.get(AdapterSlot::ThreePrimeR1), Some(reverse_adapter().as_str()));

        let AutoDetectOutcome::Trimmed { report, algorithm, .. } = outcome else {
            panic!("expected a trimmed outcome");
        };
        assert_eq!(algorithm, DetectionAlgorithm::Heuristic);
        assert_eq!(report.percent_trim, 60.0);
        assert!(fixture.scratch_is_empty());
    }

    #[test]
    fn test_operator_adapters_are_kept_next_to_detected_ones() {
        let fixture = Fixture::new();
        let (reads, outputs) = fixture.single(100);
        let engine = StubEngine::new()
            .on_detect(|request, _| {
                if on_trimmed_reads(request.reads.r1()) {
                    EngineOutcome::Success(DetectionReport::empty(1))
                } else {
                    EngineOutcome::Success(hit_report(&[(ADAPTER, "GATCGGAAGAGC")]))
                }
            })
            .on_trim(|_, _| EngineOutcome::Success(summary_with(100, 20, &[0.2])));
        let sampler = CopySubsampler::new();
        let operator = AdapterSet::new().with(AdapterSlot::FivePrimeR1, "ACACTCTTTCCC");

        AutoDetectDriver::new(&engine, &sampler, fixture.config(None))
            .run(&reads, &operator, &outputs)
            .unwrap();

        let last = engine.trim_calls().pop().unwrap();
        assert_eq!(last.adapters.get(AdapterSlot::FivePrimeR1), Some("ACACTCTTTCCC"));
        assert_eq!(last.adapters.get(AdapterSlot::ThreePrimeR1), Some(ADAPTER));
    }

    #[test]
    fn test_leftover_adapter_heuristic_gets_longest_kmer_refinement() {
        let fixture = Fixture::new();
        let (reads, outputs) = fixture.single(100);
        let engine = StubEngine::new()
            .on_detect(|_, call| match call {
                0 => EngineOutcome::Success(hit_report(&[(ADAPTER, "GATCGGAAGAGC")])),
                // same adapter still found on the trimmed subsample
                1 => EngineOutcome::Success(hit_report(&[(ADAPTER, "GATCGGAAGAGC")])),
                _ => EngineOutcome::Success(hit_report(&[(ADAPTER, "CGGAAGAGCACAC")])),
            })
            .on_trim(|_, _| EngineOutcome::Success(summary_with(100, 20, &[0.2])));
        let sampler = CopySubsampler::new();
        let config = fixture.config(Some(DetectionAlgorithm::Heuristic));
        let driver = AutoDetectDriver::new(&engine, &sampler, config);

        driver.run(&reads, &AdapterSet::new(), &outputs).unwrap();

        assert_eq!(engine.detect_calls().len(), 3);
        let trims = engine.trim_calls();
        // forward, reverse, best, refinement, full reads
        assert_eq!(trims.len(), 5);
        assert_eq!(trims[3].adapters.get(AdapterSlot::ThreePrimeR1), Some("CGGAAGAGCACAC"));
        assert_eq!(
            trims.last().unwrap().adapters.get(AdapterSlot::ThreePrimeR1),
            Some("CGGAAGAGCACAC")
        );
        assert!(fixture.scratch_is_empty());
    }

    /// Documented policy: only heuristic detection gets the extra longest
    /// kmer round, the known-library detector keeps the first longest kmer.
    #[test]
    fn test_leftover_adapter_known_library_skips_refinement() {
        let fixture = Fixture::new();
        let (reads, outputs) = fixture.single(100);
        let engine = StubEngine::new()
            .on_detect(|_, _| EngineOutcome::Success(hit_report(&[(ADAPTER, "GATCGGAAGAGC")])))
            .on_trim(|_, _| EngineOutcome::Success(summary_with(100, 20, &[0.2])));
        let sampler = CopySubsampler::new();
        let config = fixture.config(Some(DetectionAlgorithm::Known));
        let driver = AutoDetectDriver::new(&engine, &sampler, config);

        driver.run(&reads, &AdapterSet::new(), &outputs).unwrap();

        assert_eq!(engine.detect_calls().len(), 2);
        let trims = engine.trim_calls();
        assert_eq!(trims.len(), 4);
        assert_eq!(
            trims.last().unwrap().adapters.get(AdapterSlot::ThreePrimeR1),
            Some("GATCGGAAGAGC")
        );
    }

    #[test]
    fn test_ambiguous_redetection_does_not_touch_adapters() {
        let fixture = Fixture::new();
        let (reads, outputs) = fixture.paired(100);
        let engine = StubEngine::new()
            .on_detect(|request, _| {
                if on_trimmed_reads(request.reads.r1()) {
                    EngineOutcome::Success(hit_report(&[
                        ("CTGTCTCTTATACACATCT", "CTGTCTCTTATA"),
                        ("CTGTCTCTTATACACATCT", "CTGTCTCTTATA"),
                    ]))
                } else {
                    EngineOutcome::Success(hit_report(&[(ADAPTER, "GATCGG"), (ADAPTER, "GATCGG")]))
                }
            })
            .on_trim(|_, _| EngineOutcome::Success(summary_with(100, 40, &[0.2, 0.2])));
        let sampler = CopySubsampler::new();
        let config = fixture.config(Some(DetectionAlgorithm::Heuristic));
        let driver = AutoDetectDriver::new(&engine, &sampler, config);

        let outcome = driver.run(&reads, &AdapterSet::new(), &outputs).unwrap();

        assert_eq!(engine.detect_calls().len(), 2);
        let last = engine.trim_calls().pop().unwrap();
        assert_eq!(last.adapters.get(AdapterSlot::ThreePrimeR1), Some(ADAPTER));
        assert_eq!(last.adapters.get(AdapterSlot::ThreePrimeR2), Some(ADAPTER));
        assert_eq!(outcome.report().percent_trim, 20.0);
    }

    #[test]
    fn test_subsample_failure_is_fatal_before_any_engine_call() {
        let fixture = Fixture::new();
        let (reads, outputs) = fixture.single(100);
        let engine = StubEngine::new();
        let sampler = CopySubsampler::failing();

        let err = AutoDetectDriver::new(&engine, &sampler, fixture.config(None))
            .run(&reads, &AdapterSet::new(), &outputs)
            .unwrap_err();

        assert!(matches!(err, TrimError::Subsample { .. }));
        assert!(engine.detect_calls().is_empty());
        assert!(fixture.scratch_is_empty());
        assert!(!outputs.r1.exists());
    }

    #[test]
    fn test_engine_failure_still_cleans_workspace() {
        let fixture = Fixture::new();
        let (reads, outputs) = fixture.single(100);
        let engine = StubEngine::new()
            .on_detect(|_, _| EngineOutcome::Success(hit_report(&[(ADAPTER, "GATCGG")])))
            .on_trim(|_, _| EngineOutcome::Failed {
                status: 1,
                diagnostics: "killed".to_string(),
            });
        let sampler = CopySubsampler::new();
        let driver = AutoDetectDriver::new(&engine, &sampler, fixture.config(None))
            .with_retry_delay(Duration::ZERO);

        let err = driver.run(&reads, &AdapterSet::new(), &outputs).unwrap_err();

        assert!(matches!(err, TrimError::EngineFailure { .. }));
        assert_eq!(engine.trim_calls().len(), 2);
        assert!(fixture.scratch_is_empty());
    }
}
