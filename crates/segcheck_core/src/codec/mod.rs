//! Segment codecs.
//!
//! A [`Codec`] bundles the formats used to persist a segment's structural
//! data. Only the live-docs format is persisted here; the other per-segment
//! formats are exposed through the producer traits in [`producers`].

pub mod checksum;
mod live_docs;
mod memory;
pub mod producers;

pub use live_docs::{
    inspect_live_docs, AdaptiveLiveDocsFormat, DenseLiveDocsFormat, LiveDocsEncoding,
    LiveDocsFormat, LiveDocsHeader, FOOTER_LEN, HEADER_LEN, LIVE_DOCS_MAGIC, LIVE_DOCS_VERSION,
};
pub use memory::{
    MemoryDocValues, MemoryNorms, MemorySegmentBuilder, MemoryStats, MemoryStoredFields,
    ProducerStats,
};
pub use producers::{
    same_instance, DocValuesProducer, NormsProducer, StoredDocument, StoredFieldsReader,
};

use std::fmt;

/// A pluggable bundle of segment formats.
pub trait Codec: Send + Sync + fmt::Debug {
    /// Codec name, recorded in reports.
    fn name(&self) -> &'static str;

    /// Format used for live docs.
    fn live_docs_format(&self) -> &dyn LiveDocsFormat;
}

/// The default codec: adaptive live-docs encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCodec {
    live_docs: AdaptiveLiveDocsFormat,
}

impl Codec for DefaultCodec {
    fn name(&self) -> &'static str {
        "default"
    }

    fn live_docs_format(&self) -> &dyn LiveDocsFormat {
        &self.live_docs
    }
}

/// Codec that always writes dense live docs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseCodec {
    live_docs: DenseLiveDocsFormat,
}

impl Codec for DenseCodec {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn live_docs_format(&self) -> &dyn LiveDocsFormat {
        &self.live_docs
    }
}

/// Looks up a codec by name.
///
/// Accepts `"default"` (alias `"adaptive"`) and `"dense"`.
#[must_use]
pub fn codec_for_name(name: &str) -> Option<Box<dyn Codec>> {
    match name {
        "default" | "adaptive" => Some(Box::new(DefaultCodec::default())),
        "dense" => Some(Box::new(DenseCodec::default())),
        _ => None,
    }
}
