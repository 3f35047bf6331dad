//! Adapter trimming with atropos
//!
//! Trims adapters given on the command line, or discovers them on a
//! subsample of the reads with `--auto`, and writes a JSON trimming report.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use log::info;
use rawqc_tools::adapters::{AdapterSet, AdapterSlot};
use rawqc_tools::atropos::AtroposEngine;
use rawqc_tools::autodetect::{AutoDetectConfig, AutoDetectDriver, AutoDetectOutcome};
use rawqc_tools::engine::{DetectionAlgorithm, TrimOptions};
use rawqc_tools::reads::{OutputPaths, ReadSource};
use rawqc_tools::reporting::TrimmingReport;
use rawqc_tools::session::{reset_log_file, CorrectionPolicy, TrimmingSession};
use rawqc_tools::subsample::SeqtkSubsampler;
use rawqc_tools::TrimError;
use std::path::PathBuf;

const ADAPTER_ARGS: [(AdapterSlot, char, &str, &str); 6] = [
    (AdapterSlot::ThreePrimeR1, 'a', "three-prime-adapter-r1", "3' adapter of read 1"),
    (AdapterSlot::ThreePrimeR2, 'A', "three-prime-adapter-r2", "3' adapter of read 2"),
    (AdapterSlot::FivePrimeR1, 'g', "five-prime-adapter-r1", "5' adapter of read 1"),
    (AdapterSlot::FivePrimeR2, 'G', "five-prime-adapter-r2", "5' adapter of read 2"),
    (
        AdapterSlot::EitherEndR1,
        'b',
        "both-prime-adapter-r1",
        "Adapter of read 1 that may be at either end",
    ),
    (
        AdapterSlot::EitherEndR2,
        'B',
        "both-prime-adapter-r2",
        "Adapter of read 2 that may be at either end",
    ),
];

fn cli() -> Command {
    let mut command = Command::new("rawqc-atropos")
        .version("0.1.0")
        .about("Adapter trimming of FASTQ files with atropos, with optional adapter auto-detection")
        .author("Megan Johnson")
        .arg(
            Arg::new("read1")
                .short('1')
                .long("read1")
                .value_name("FASTQ")
                .help("Input FASTQ file of read 1")
                .required(true),
        )
        .arg(
            Arg::new("read2")
                .short('2')
                .long("read2")
                .value_name("FASTQ")
                .help("Input FASTQ file of read 2 (paired-end)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FASTQ")
                .help("Trimmed output of read 1")
                .required(true),
        )
        .arg(
            Arg::new("paired_output")
                .short('p')
                .long("paired-output")
                .value_name("FASTQ")
                .help("Trimmed output of read 2"),
        );

    for (slot, short, long, help) in ADAPTER_ARGS {
        command = command.arg(
            Arg::new(slot.flag())
                .short(short)
                .long(long)
                .value_name("ADAPTER")
                .help(help),
        );
    }

    command
        .arg(
            Arg::new("sub_size")
                .short('s')
                .long("sub-size")
                .value_name("READS")
                .help("Number of reads subsampled for adapter detection")
                .default_value("500000"),
        )
        .arg(
            Arg::new("minimum_length")
                .short('m')
                .long("minimum-length")
                .value_name("LENGTH")
                .help("Discard trimmed reads shorter than LENGTH")
                .default_value("0"),
        )
        .arg(
            Arg::new("times")
                .short('n')
                .long("times")
                .value_name("COUNT")
                .help("Remove up to COUNT adapters from each read")
                .default_value("1"),
        )
        .arg(
            Arg::new("overlap")
                .short('O')
                .long("overlap")
                .value_name("MINLENGTH")
                .help("Minimum overlap between read and adapter")
                .default_value("3"),
        )
        .arg(
            Arg::new("auto")
                .long("auto")
                .help("Detect adapters on a subsample of the reads")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("algorithm")
                .long("algorithm")
                .value_name("ALGORITHM")
                .help("Detection algorithm, chosen from read length when absent")
                .value_parser(["known", "heuristic"]),
        )
        .arg(
            Arg::new("amplicon")
                .long("amplicon")
                .help("Amplicon data: never correct adapters for a missing base")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("nb_pass")
                .long("nb-pass")
                .value_name("PASSES")
                .help("Maximum number of re-trims correcting a missing adapter base")
                .default_value("3"),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_name("THREADS")
                .help("Number of atropos threads")
                .default_value("2"),
        )
        .arg(
            Arg::new("logs")
                .short('l')
                .long("logs")
                .value_name("FILE")
                .help("Atropos log file"),
        )
        .arg(
            Arg::new("json")
                .short('j')
                .long("json")
                .value_name("PREFIX")
                .help("Write the trimming report to PREFIX.trim.json"),
        )
        .arg(
            Arg::new("temp_dir")
                .long("temp-dir")
                .value_name("DIR")
                .help("Directory for the subsamples (default: system temp dir)"),
        )
        .arg(
            Arg::new("atropos")
                .long("atropos")
                .value_name("PATH")
                .help("Atropos executable")
                .default_value("atropos"),
        )
        .arg(
            Arg::new("seqtk")
                .long("seqtk")
                .value_name("PATH")
                .help("Seqtk executable")
                .default_value("seqtk"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Debug logging")
                .action(ArgAction::SetTrue),
        )
}

fn parsed<T>(matches: &clap::ArgMatches, id: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = matches
        .get_one::<String>(id)
        .with_context(|| format!("missing value for {}", id))?;
    value
        .parse()
        .with_context(|| format!("invalid value for {}: {}", id, value))
}

fn main() -> Result<()> {
    let matches = cli().get_matches();

    let level = if matches.get_flag("debug") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    // Parse arguments
    let read1 = matches.get_one::<String>("read1").map(PathBuf::from);
    let read2 = matches.get_one::<String>("read2").map(PathBuf::from);
    let output = matches.get_one::<String>("output").map(PathBuf::from);
    let paired_output = matches.get_one::<String>("paired_output").map(PathBuf::from);
    let (Some(read1), Some(output)) = (read1, output) else {
        anyhow::bail!("--read1 and --output are required");
    };
    let log_file = matches.get_one::<String>("logs").map(PathBuf::from);
    let json_prefix = matches.get_one::<String>("json").map(PathBuf::from);
    let auto = matches.get_flag("auto");
    let nb_pass: usize = parsed(&matches, "nb_pass")?;

    let options = TrimOptions {
        times: parsed(&matches, "times")?,
        overlap: parsed(&matches, "overlap")?,
        min_length: parsed(&matches, "minimum_length")?,
        threads: parsed(&matches, "threads")?,
        ..TrimOptions::default()
    };
    let policy = if matches.get_flag("amplicon") {
        CorrectionPolicy::amplicon()
    } else {
        CorrectionPolicy::default()
    };

    let reads = ReadSource::new(read1, read2);
    for file in reads.files() {
        if !file.exists() {
            return Err(TrimError::Configuration(format!(
                "input file does not exist: {}",
                file.display()
            ))
            .into());
        }
    }
    let outputs = OutputPaths::new(output, paired_output);
    outputs.validate_for(&reads)?;

    let mut adapters = AdapterSet::new();
    for (slot, _, _, _) in ADAPTER_ARGS {
        adapters.set(slot, matches.get_one::<String>(slot.flag()).cloned());
    }
    adapters.validate(reads.end_mode())?;
    adapters.require_any(auto)?;

    if let Some(log) = &log_file {
        reset_log_file(log)?;
    }

    let atropos = matches.get_one::<String>("atropos").map_or("atropos", String::as_str);
    let engine = AtroposEngine::new(atropos);

    let report: TrimmingReport = if auto {
        let algorithm = match matches.get_one::<String>("algorithm") {
            Some(name) => Some(name.parse::<DetectionAlgorithm>().map_err(anyhow::Error::msg)?),
            None => None,
        };
        let config = AutoDetectConfig {
            subsample_size: parsed(&matches, "sub_size")?,
            algorithm,
            temp_dir: matches
                .get_one::<String>("temp_dir")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            ..AutoDetectConfig::default()
        };
        let seqtk = matches.get_one::<String>("seqtk").map_or("seqtk", String::as_str);
        let subsampler = SeqtkSubsampler::new(seqtk);

        let outcome = AutoDetectDriver::new(&engine, &subsampler, config)
            .with_options(options)
            .with_max_iterations(nb_pass)
            .with_policy(policy)
            .with_log_file(log_file)
            .run(&reads, &adapters, &outputs)?;

        match &outcome {
            AutoDetectOutcome::Trimmed { result, algorithm, .. } => {
                info!("Adapters detected with the {} algorithm.", algorithm);
                for (slot, sequence) in result.adapters.iter() {
                    info!("  {} {}", slot, sequence);
                }
            }
            AutoDetectOutcome::NoAdapter { .. } => {
                info!("No adapter detected, reads were linked to the outputs.");
            }
        }
        outcome.report().clone()
    } else {
        let mut session = TrimmingSession::new(&engine, reads, adapters)
            .with_log_file(log_file)
            .with_policy(policy);
        let result = session.trim_with_correction(&outputs, &options, nb_pass)?;
        info!("Trimming done in {} pass(es).", result.passes);
        session.trimming_report()?
    };

    println!("Summary Statistics:");
    println!("==================");
    println!("Mean read length: {:.1}", report.mean_read_length);
    println!("Reads with adapters: {:.2}%", report.percent_trim);
    println!("Reads discarded: {:.2}%", report.percent_discard);

    if let Some(prefix) = json_prefix {
        let path = report.export_json(&prefix)?;
        println!("Report written to: {}", path.display());
    }

    Ok(())
}
