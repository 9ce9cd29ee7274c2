//! Live-docs round-trip conformance harness.
//!
//! One trial builds a liveness pattern with an exact number of live bits,
//! hands it to a codec's live-docs writer as either a [`FixedBitSet`] or an
//! opaque [`PredicateBits`], reads it back through the codec's reader at the
//! next delete generation, and compares every bit.
//!
//! ## Example
//!
//! ```rust
//! use segcheck_core::DefaultCodec;
//! use segcheck_storage::RamDirectory;
//! use segcheck_testkit::{BitsRepresentation, ConformanceConfig, LiveDocsHarness};
//!
//! let mut harness = LiveDocsHarness::new(
//!     Box::new(DefaultCodec::default()),
//!     ConformanceConfig::default().seed(7),
//! )
//! .unwrap();
//! let dir = RamDirectory::new();
//! let report = harness
//!     .run_trial(&dir, 10, 1, BitsRepresentation::Predicate)
//!     .unwrap();
//! assert_eq!(report.context.num_live_docs, 1);
//! ```

use crate::config::ConformanceConfig;
use crate::error::{BitsRepresentation, HarnessError, HarnessResult, TrialContext, TrialPhase};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use segcheck_core::codec::{LiveDocsHeader, HEADER_LEN};
use segcheck_core::{Bits, Codec, FixedBitSet, PredicateBits, SegmentDescriptor, SegmentId};
use segcheck_storage::{Directory, IoContext};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, trace};

/// Live docs left in place by the overflow probe.
const OVERFLOW_PROBE_DELETES: u32 = 7;

/// Builds a pattern of `max_docs` bits with exactly `num_live` set.
///
/// Mostly-live patterns start full and clear random bits; the rest start
/// empty and set random bits, so either way at most half the bits are
/// drawn.
///
/// # Errors
///
/// Returns [`HarnessError::InvalidTrial`] if `num_live > max_docs`.
pub fn build_pattern<R: Rng + ?Sized>(
    max_docs: u32,
    num_live: u32,
    rng: &mut R,
) -> HarnessResult<FixedBitSet> {
    if num_live > max_docs {
        return Err(HarnessError::invalid_trial(format!(
            "num_live {num_live} exceeds max_docs {max_docs}"
        )));
    }
    let length = max_docs as usize;
    if num_live > max_docs / 2 {
        let mut bits = FixedBitSet::full(max_docs);
        for doc in sample(rng, length, (max_docs - num_live) as usize) {
            bits.clear(doc as u32);
        }
        Ok(bits)
    } else {
        let mut bits = FixedBitSet::new(max_docs);
        for doc in sample(rng, length, num_live as usize) {
            bits.set(doc as u32);
        }
        Ok(bits)
    }
}

/// Outcome of one passing trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialReport {
    /// Trial parameters.
    #[serde(flatten)]
    pub context: TrialContext,
    /// Encoding the codec chose, e.g. `sparse-deleted`.
    pub encoding: String,
    /// Bytes written.
    pub file_len: u64,
    /// Wall time of write, read and compare.
    pub elapsed_micros: u64,
}

/// All trials of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HarnessSummary {
    /// Seed every trial derived from.
    pub seed: u64,
    /// Edge-case trials.
    pub edge_cases: Vec<TrialReport>,
    /// Random trials.
    pub random: Vec<TrialReport>,
    /// The overflow probe, if it ran.
    pub overflow_probe: Option<TrialReport>,
}

impl HarnessSummary {
    /// Total number of trials.
    #[must_use]
    pub fn total(&self) -> usize {
        self.edge_cases.len() + self.random.len() + usize::from(self.overflow_probe.is_some())
    }
}

/// Drives live-docs round trips against one codec.
///
/// Trials are single-threaded. Independent harnesses may run concurrently
/// as long as each has its own directory.
pub struct LiveDocsHarness {
    codec: Box<dyn Codec>,
    config: ConformanceConfig,
    seed: u64,
    rng: StdRng,
    trials: usize,
}

impl LiveDocsHarness {
    /// Creates a harness. Without a configured seed one is drawn and logged.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidTrial`] if the configuration is invalid.
    pub fn new(codec: Box<dyn Codec>, config: ConformanceConfig) -> HarnessResult<Self> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(rand::random);
        info!(seed, codec = codec.name(), "live docs harness ready");
        Ok(Self {
            codec,
            rng: StdRng::seed_from_u64(seed),
            config,
            seed,
            trials: 0,
        })
    }

    /// Seed of this run.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &ConformanceConfig {
        &self.config
    }

    /// Runs one round trip in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Storage`] if the directory fails,
    /// [`HarnessError::Codec`] if the codec rejects the data, and
    /// [`HarnessError::Mismatch`] if the bits read back differ.
    pub fn run_trial(
        &mut self,
        dir: &dyn Directory,
        max_docs: u32,
        num_live: u32,
        representation: BitsRepresentation,
    ) -> HarnessResult<TrialReport> {
        if max_docs == 0 || max_docs > self.config.max_docs_limit {
            return Err(HarnessError::invalid_trial(format!(
                "max_docs {max_docs} outside 1..={}",
                self.config.max_docs_limit
            )));
        }
        let started = Instant::now();
        let trial = self.trials;
        self.trials += 1;

        let pattern = build_pattern(max_docs, num_live, &mut self.rng)?;
        let id = SegmentId::from_bytes(self.rng.gen());
        let context = TrialContext {
            codec: self.codec.name().to_string(),
            segment_id: id.to_hex(),
            max_docs,
            num_live_docs: num_live,
            representation,
            seed: self.seed,
            trial,
        };
        let written = SegmentDescriptor::new(format!("_t{trial}"), id, max_docs)
            .map_err(|e| HarnessError::invalid_trial(e.to_string()))?;
        let deletes = max_docs - num_live;

        let format = self.codec.live_docs_format();
        let ctx = IoContext::Flush { num_docs: max_docs };
        let write_result = match representation {
            BitsRepresentation::FixedBitSet => {
                format.write_live_docs(&pattern, dir, &written, deletes, &ctx)
            }
            BitsRepresentation::Predicate => {
                let opaque = PredicateBits::new(max_docs, |doc| pattern.get(doc));
                format.write_live_docs(&opaque, dir, &written, deletes, &ctx)
            }
        };
        write_result.map_err(|e| HarnessError::from_core(TrialPhase::Write, context.clone(), e))?;

        let reopened = written
            .advance_del_gen(deletes)
            .map_err(|e| HarnessError::from_core(TrialPhase::Read, context.clone(), e))?;
        let file_name = reopened.live_docs_file_name(reopened.del_gen());
        let read = format
            .read_live_docs(dir, &reopened, &IoContext::ReadOnce)
            .map_err(|e| HarnessError::from_core(TrialPhase::Read, context.clone(), e))?;

        compare(&pattern, read.as_ref()).map_err(|message| HarnessError::Mismatch {
            context: context.clone(),
            message,
        })?;

        let header = read_header(dir, &file_name)
            .map_err(|e| HarnessError::from_core(TrialPhase::Read, context.clone(), e))?;
        let file_len = dir
            .file_length(&file_name)
            .map_err(|e| HarnessError::from_core(TrialPhase::Read, context.clone(), e.into()))?;
        dir.delete_file(&file_name)
            .map_err(|e| HarnessError::from_core(TrialPhase::Read, context.clone(), e.into()))?;

        let report = TrialReport {
            context,
            encoding: header.encoding.to_string(),
            file_len,
            elapsed_micros: u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
        };
        trace!(
            trial,
            max_docs,
            num_live,
            %representation,
            encoding = %report.encoding,
            file_len,
            "live docs trial passed"
        );
        Ok(report)
    }

    /// Runs the mandated boundaries at `max_docs` with both representations:
    /// all but one doc live, no doc live, and a single live doc.
    ///
    /// # Errors
    ///
    /// Returns the first failing trial's error.
    pub fn run_edge_cases(
        &mut self,
        dir: &dyn Directory,
        max_docs: u32,
    ) -> HarnessResult<Vec<TrialReport>> {
        if max_docs < 2 {
            return Err(HarnessError::invalid_trial(format!(
                "edge cases need max_docs >= 2, got {max_docs}"
            )));
        }
        let mut reports = Vec::new();
        for num_live in [max_docs - 1, 0, 1] {
            for representation in BitsRepresentation::ALL {
                reports.push(self.run_trial(dir, max_docs, num_live, representation)?);
            }
        }
        Ok(reports)
    }

    /// Runs the configured number of random trials, drawing `max_docs` from
    /// the configured range and everything else uniformly.
    ///
    /// # Errors
    ///
    /// Returns the first failing trial's error.
    pub fn run_random_trials(&mut self, dir: &dyn Directory) -> HarnessResult<Vec<TrialReport>> {
        let mut reports = Vec::with_capacity(self.config.random_trials);
        for _ in 0..self.config.random_trials {
            let max_docs = self.rng.gen_range(self.config.min_docs..=self.config.max_docs);
            let num_live = self.rng.gen_range(0..max_docs);
            let representation = if self.rng.gen_bool(0.5) {
                BitsRepresentation::FixedBitSet
            } else {
                BitsRepresentation::Predicate
            };
            reports.push(self.run_trial(dir, max_docs, num_live, representation)?);
        }
        Ok(reports)
    }

    /// Round-trips a segment at the document limit with a few deletions,
    /// probing bit-count and byte-length arithmetic near overflow.
    ///
    /// Returns `None` unless the configuration enables expensive mode. Needs
    /// roughly 600 MiB of memory at the default limit.
    ///
    /// # Errors
    ///
    /// Returns the trial's error.
    pub fn run_overflow_probe(&mut self, dir: &dyn Directory) -> HarnessResult<Option<TrialReport>> {
        if !self.config.expensive {
            debug!("overflow probe skipped; expensive mode is off");
            return Ok(None);
        }
        let max_docs = self.config.max_docs_limit;
        let num_live = max_docs.saturating_sub(OVERFLOW_PROBE_DELETES);
        info!(max_docs, num_live, "running live docs overflow probe");
        self.run_trial(dir, max_docs, num_live, BitsRepresentation::FixedBitSet)
            .map(Some)
    }

    /// Runs edge cases at the configured minimum and maximum sizes, the
    /// random trials, then the overflow probe.
    ///
    /// # Errors
    ///
    /// Returns the first failing trial's error.
    pub fn run_all(&mut self, dir: &dyn Directory) -> HarnessResult<HarnessSummary> {
        let mut edge_cases = self.run_edge_cases(dir, self.config.min_docs)?;
        if self.config.max_docs != self.config.min_docs {
            edge_cases.extend(self.run_edge_cases(dir, self.config.max_docs)?);
        }
        let random = self.run_random_trials(dir)?;
        let overflow_probe = self.run_overflow_probe(dir)?;
        let summary = HarnessSummary {
            seed: self.seed,
            edge_cases,
            random,
            overflow_probe,
        };
        info!(seed = self.seed, trials = summary.total(), "live docs conformance passed");
        Ok(summary)
    }
}

impl std::fmt::Debug for LiveDocsHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveDocsHarness")
            .field("codec", &self.codec.name())
            .field("config", &self.config)
            .field("seed", &self.seed)
            .field("trials", &self.trials)
            .finish_non_exhaustive()
    }
}

/// Compares `read` against `expected`, describing the first difference.
fn compare(expected: &FixedBitSet, read: &dyn Bits) -> Result<(), String> {
    if read.len() != expected.len() {
        return Err(format!(
            "length {} read back, {} written",
            read.len(),
            expected.len()
        ));
    }
    if let Some(set) = read.as_fixed_bitset() {
        if set.words() == expected.words() {
            return Ok(());
        }
    }
    match (0..expected.len()).find(|&doc| read.get(doc) != expected.get(doc)) {
        Some(doc) => Err(format!(
            "doc {doc} read back as {}, written as {}",
            liveness(read.get(doc)),
            liveness(expected.get(doc))
        )),
        None => Ok(()),
    }
}

const fn liveness(live: bool) -> &'static str {
    if live {
        "live"
    } else {
        "deleted"
    }
}

fn read_header(
    dir: &dyn Directory,
    name: &str,
) -> segcheck_core::CoreResult<LiveDocsHeader> {
    let prefix = dir.open_input(name, &IoContext::ReadOnce)?.read_at(0, HEADER_LEN)?;
    LiveDocsHeader::parse_prefix(&prefix)
}
