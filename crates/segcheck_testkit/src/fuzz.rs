//! Fuzz testing harnesses for segcheck.
//!
//! This module provides fuzz targets that can be used with cargo-fuzz
//! or other fuzzing frameworks. Every target accepts arbitrary bytes and
//! must never panic.

use segcheck_core::bits::cardinality;
use segcheck_core::codec::{inspect_live_docs, AdaptiveLiveDocsFormat, LiveDocsFormat};
use segcheck_core::merge::{LogMergePolicy, SegmentSizeInfo};
use segcheck_core::{Bits, SegmentDescriptor};
use segcheck_storage::{Directory, IoContext, RamDirectory};

/// Largest declared document count the decode target will materialize.
pub const FUZZ_MAX_DOCS: u32 = 1 << 20;

/// Fuzz target for live-docs header and checksum validation.
pub fn fuzz_live_docs_inspect(data: &[u8]) {
    let _ = inspect_live_docs(data);
}

/// Fuzz target for the full live-docs read path.
///
/// Inputs that pass framing checks are stored under the name their header
/// implies and read back through the codec. A successful read must agree
/// with the header's counts.
pub fn fuzz_live_docs_decode(data: &[u8]) {
    let Ok(header) = inspect_live_docs(data) else {
        return;
    };
    if header.gen == 0 || header.max_docs > FUZZ_MAX_DOCS || header.live_docs > header.max_docs {
        return;
    }
    let Ok(descriptor) = SegmentDescriptor::new("_f", header.segment_id, header.max_docs)
        .and_then(|d| d.with_deletes(header.max_docs - header.live_docs, header.gen))
    else {
        return;
    };

    let dir = RamDirectory::new();
    let name = descriptor.live_docs_file_name(header.gen);
    if dir.write_file(&name, data, &IoContext::Default).is_err() {
        return;
    }
    if let Ok(bits) = AdaptiveLiveDocsFormat.read_live_docs(&dir, &descriptor, &IoContext::ReadOnce)
    {
        assert_eq!(bits.len(), header.max_docs, "decoded length disagrees with header");
        assert_eq!(
            cardinality(bits.as_ref()),
            u64::from(header.live_docs),
            "decoded cardinality disagrees with header"
        );
    }
}

/// Fuzz target for merge selection.
///
/// Consumes the input as a sequence of 12-byte records (`u64` size,
/// `u32` doc count) and checks that every proposed merge names known,
/// distinct segments.
pub fn fuzz_merge_selection(data: &[u8]) {
    let Some((&factor, rest)) = data.split_first() else {
        return;
    };
    let segments: Vec<SegmentSizeInfo> = rest
        .chunks_exact(12)
        .enumerate()
        .map(|(i, chunk)| {
            let mut size = [0u8; 8];
            size.copy_from_slice(&chunk[..8]);
            let mut docs = [0u8; 4];
            docs.copy_from_slice(&chunk[8..]);
            SegmentSizeInfo {
                name: format!("_{i}"),
                size_in_bytes: u64::from_le_bytes(size),
                max_docs: u32::from_le_bytes(docs),
                del_count: 0,
            }
        })
        .collect();

    let policy = LogMergePolicy::default().merge_factor(usize::from(factor % 16));
    let Ok(candidates) = policy.find_merges(&segments) else {
        return;
    };
    let mut seen = std::collections::HashSet::new();
    for candidate in candidates {
        assert!(candidate.segments.len() >= 2, "merge of a single segment");
        for name in &candidate.segments {
            assert!(seen.insert(name.clone()), "segment {name} merged twice");
            assert!(
                segments.iter().any(|s| &s.name == name),
                "unknown segment {name}"
            );
        }
    }
}
