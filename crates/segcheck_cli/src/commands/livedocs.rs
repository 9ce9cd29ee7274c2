//! Livedocs command implementation.

use super::CommandError;
use segcheck_core::codec::codec_for_name;
use segcheck_storage::{FsDirectory, RamDirectory};
use segcheck_testkit::{ConformanceConfig, HarnessSummary, LiveDocsHarness};
use std::path::PathBuf;
use tracing::error;

/// Options of one conformance run.
#[derive(Debug, Clone)]
pub struct Options {
    /// Random trials to run.
    pub trials: usize,
    /// Fixed seed, if any.
    pub seed: Option<u64>,
    /// Smallest random document count.
    pub min_docs: u32,
    /// Largest random document count.
    pub max_docs: u32,
    /// Codec name.
    pub codec: String,
    /// On-disk directory for trial files.
    pub dir: Option<PathBuf>,
    /// Run the overflow probe.
    pub expensive: bool,
    /// Print JSON instead of text.
    pub json: bool,
}

impl Options {
    /// Builds the harness configuration, starting from the environment so
    /// `SEGCHECK_SEED` and friends apply unless overridden by flags.
    fn config(&self) -> Result<ConformanceConfig, Box<dyn std::error::Error>> {
        let mut config = ConformanceConfig::from_env()?
            .random_trials(self.trials)
            .doc_range(self.min_docs, self.max_docs);
        if self.expensive {
            config = config.expensive(true);
        }
        if let Some(seed) = self.seed {
            config = config.seed(seed);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Runs the livedocs command.
///
/// A failing trial is reported with its full context and turned into an
/// error, so the process exits non-zero.
pub fn run(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let codec = codec_for_name(&options.codec)
        .ok_or_else(|| CommandError::UnknownCodec(options.codec.clone()))?;
    let config = options.config()?;
    let mut harness = LiveDocsHarness::new(codec, config)?;
    let seed = harness.seed();

    let result = match &options.dir {
        Some(path) => {
            let dir = FsDirectory::open(path)?;
            harness.run_all(&dir)
        }
        None => harness.run_all(&RamDirectory::new()),
    };

    match result {
        Ok(summary) => {
            if options.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_text_output(&options.codec, &summary);
            }
            Ok(())
        }
        Err(err) => {
            error!(seed, error = %err, "live docs conformance failed");
            eprintln!("FAILED (rerun with --seed {seed}): {err}");
            Err(err.into())
        }
    }
}

fn print_text_output(codec: &str, summary: &HarnessSummary) {
    println!("Live docs conformance: codec {codec}, seed {}", summary.seed);
    println!("  Edge cases:     {} passed", summary.edge_cases.len());
    println!("  Random trials:  {} passed", summary.random.len());
    match &summary.overflow_probe {
        Some(report) => println!(
            "  Overflow probe: passed at {} docs ({} encoding, {} bytes)",
            report.context.max_docs, report.encoding, report.file_len
        ),
        None => println!("  Overflow probe: skipped (use --expensive)"),
    }

    let all = summary
        .edge_cases
        .iter()
        .chain(&summary.random)
        .chain(&summary.overflow_probe);
    let mut by_encoding = std::collections::BTreeMap::<&str, usize>::new();
    let mut bytes = 0u64;
    for report in all {
        *by_encoding.entry(report.encoding.as_str()).or_default() += 1;
        bytes += report.file_len;
    }
    for (encoding, count) in by_encoding {
        println!("  {encoding:<15} {count} files");
    }
    println!("  Total written:  {bytes} bytes");
}
