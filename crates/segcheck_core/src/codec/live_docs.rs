//! Live-docs file format.
//!
//! One file per delete generation, named by
//! [`SegmentDescriptor::live_docs_file_name`].
//!
//! ```text
//! | magic "LIVD" (4) | version (1) | encoding (1) | segment id (16) | gen (8) |
//! | max_docs (4) | live_docs (4) | payload (N) | crc32 (4) |
//! ```
//!
//! All integers are little-endian. Payload by encoding:
//!
//! - `Dense` - `ceil(max_docs / 64)` bitset words, 8 bytes each
//! - `SparseLive` - ascending live doc ids, 4 bytes each
//! - `SparseDeleted` - ascending deleted doc ids, 4 bytes each
//!
//! Lengths are computed in 64-bit arithmetic so that segments near
//! [`crate::MAX_DOCS`] do not wrap.

use crate::bits::{bits_to_words, cardinality, Bits, FixedBitSet};
use crate::codec::checksum::{compute_crc32, Crc32};
use crate::error::{CoreError, CoreResult};
use crate::types::{DocId, SegmentDescriptor, SegmentId, SEGMENT_ID_LEN};
use segcheck_storage::{Directory, IoContext, StorageBackend};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Magic bytes opening every live-docs file.
pub const LIVE_DOCS_MAGIC: [u8; 4] = *b"LIVD";
/// Current format version.
pub const LIVE_DOCS_VERSION: u8 = 1;
/// Header length in bytes.
pub const HEADER_LEN: usize = 4 + 1 + 1 + SEGMENT_ID_LEN + 8 + 4 + 4;
/// Footer (checksum) length in bytes.
pub const FOOTER_LEN: usize = 4;

const CHUNK_SIZE: usize = 64 * 1024;

/// Physical layout of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiveDocsEncoding {
    /// Raw bitset words.
    Dense,
    /// List of live doc ids.
    SparseLive,
    /// List of deleted doc ids.
    SparseDeleted,
}

impl LiveDocsEncoding {
    const fn to_byte(self) -> u8 {
        match self {
            Self::Dense => 0,
            Self::SparseLive => 1,
            Self::SparseDeleted => 2,
        }
    }

    const fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Dense),
            1 => Some(Self::SparseLive),
            2 => Some(Self::SparseDeleted),
            _ => None,
        }
    }

    /// Payload length in bytes for a segment of `max_docs` with `live` live docs.
    #[must_use]
    pub const fn payload_len(self, max_docs: u32, live: u32) -> u64 {
        match self {
            Self::Dense => bits_to_words(max_docs) as u64 * 8,
            Self::SparseLive => live as u64 * 4,
            Self::SparseDeleted => (max_docs - live) as u64 * 4,
        }
    }

    /// The encoding with the shortest payload; dense wins ties.
    #[must_use]
    pub fn smallest(max_docs: u32, live: u32) -> Self {
        [Self::Dense, Self::SparseLive, Self::SparseDeleted]
            .into_iter()
            .min_by_key(|e| e.payload_len(max_docs, live))
            .unwrap_or(Self::Dense)
    }
}

impl fmt::Display for LiveDocsEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dense => "dense",
            Self::SparseLive => "sparse-live",
            Self::SparseDeleted => "sparse-deleted",
        })
    }
}

/// Decoded header of a live-docs file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveDocsHeader {
    /// Format version.
    pub version: u8,
    /// Payload encoding.
    pub encoding: LiveDocsEncoding,
    /// Id of the segment the file belongs to.
    pub segment_id: SegmentId,
    /// Delete generation the file was written for.
    pub gen: u64,
    /// Declared document count.
    pub max_docs: u32,
    /// Number of live documents.
    pub live_docs: u32,
}

impl LiveDocsHeader {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        buf.extend_from_slice(&LIVE_DOCS_MAGIC);
        buf.push(self.version);
        buf.push(self.encoding.to_byte());
        buf.extend_from_slice(self.segment_id.as_bytes());
        buf.extend_from_slice(&self.gen.to_le_bytes());
        buf.extend_from_slice(&self.max_docs.to_le_bytes());
        buf.extend_from_slice(&self.live_docs.to_le_bytes());
        buf
    }

    fn decode(bytes: &[u8], resource: &str) -> CoreResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(CoreError::corrupt(resource, "truncated header"));
        }
        if bytes[0..4] != LIVE_DOCS_MAGIC {
            return Err(CoreError::corrupt(resource, "bad magic"));
        }
        let version = bytes[4];
        if version != LIVE_DOCS_VERSION {
            return Err(CoreError::corrupt(
                resource,
                format!("unsupported version {version}"),
            ));
        }
        let encoding = LiveDocsEncoding::from_byte(bytes[5]).ok_or_else(|| {
            CoreError::corrupt(resource, format!("unknown encoding {}", bytes[5]))
        })?;
        let mut id = [0u8; SEGMENT_ID_LEN];
        id.copy_from_slice(&bytes[6..6 + SEGMENT_ID_LEN]);
        let gen = read_u64_le(bytes, 22);
        let max_docs = read_u32_le(bytes, 30);
        let live_docs = read_u32_le(bytes, 34);
        if live_docs > max_docs {
            return Err(CoreError::corrupt(
                resource,
                format!("live docs {live_docs} exceed max docs {max_docs}"),
            ));
        }
        Ok(Self {
            version,
            encoding,
            segment_id: SegmentId::from_bytes(id),
            gen,
            max_docs,
            live_docs,
        })
    }

    /// Decodes the header at the start of `bytes` without checking the
    /// payload or checksum.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptIndex`] on truncation, bad magic, or an
    /// unknown version or encoding.
    pub fn parse_prefix(bytes: &[u8]) -> CoreResult<Self> {
        Self::decode(bytes, "live docs header")
    }

    /// Total file length implied by this header.
    #[must_use]
    pub fn file_len(&self) -> u64 {
        HEADER_LEN as u64
            + self.encoding.payload_len(self.max_docs, self.live_docs)
            + FOOTER_LEN as u64
    }
}

fn read_u32_le(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_u64_le(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

/// Validates framing and checksum of a live-docs file and returns its header.
///
/// # Errors
///
/// Returns [`CoreError::CorruptIndex`] on truncation, bad magic, unknown
/// version or encoding, length mismatch, or checksum mismatch.
pub fn inspect_live_docs(bytes: &[u8]) -> CoreResult<LiveDocsHeader> {
    inspect_named(bytes, "live docs")
}

fn inspect_named(bytes: &[u8], resource: &str) -> CoreResult<LiveDocsHeader> {
    if bytes.len() < HEADER_LEN + FOOTER_LEN {
        return Err(CoreError::corrupt(
            resource,
            format!("truncated file: {} bytes", bytes.len()),
        ));
    }
    let header = LiveDocsHeader::decode(&bytes[..HEADER_LEN], resource)?;
    let expected = header.file_len();
    if bytes.len() as u64 != expected {
        return Err(CoreError::corrupt(
            resource,
            format!("file is {} bytes, header implies {expected}", bytes.len()),
        ));
    }
    let body_end = bytes.len() - FOOTER_LEN;
    let stored = read_u32_le(bytes, body_end);
    let computed = compute_crc32(&bytes[..body_end]);
    if stored != computed {
        return Err(CoreError::corrupt(
            resource,
            format!("checksum mismatch: expected {stored:08x}, got {computed:08x}"),
        ));
    }
    Ok(header)
}

/// Reads and writes a segment's live docs.
///
/// Implementations must accept any [`Bits`] of the right length and must
/// not assume a concrete representation.
pub trait LiveDocsFormat: Send + Sync {
    /// Short format name for logs and reports.
    fn name(&self) -> &'static str;

    /// Persists `bits` as the live docs of `descriptor.next_del_gen()`.
    ///
    /// `new_del_count` is the number of deletions on top of
    /// `descriptor.del_count()`; the cleared bits must equal their sum.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if the bits disagree with the
    /// descriptor, or a storage error if the file cannot be written.
    fn write_live_docs(
        &self,
        bits: &dyn Bits,
        dir: &dyn Directory,
        descriptor: &SegmentDescriptor,
        new_del_count: u32,
        ctx: &IoContext,
    ) -> CoreResult<()>;

    /// Reads the live docs of `descriptor.del_gen()`.
    ///
    /// The returned bits have length `descriptor.max_docs()`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptIndex`] if the file fails validation, or a
    /// storage error if it cannot be read.
    fn read_live_docs(
        &self,
        dir: &dyn Directory,
        descriptor: &SegmentDescriptor,
        ctx: &IoContext,
    ) -> CoreResult<Arc<dyn Bits>>;

    /// Files this format holds for the descriptor's current generation.
    fn files(&self, descriptor: &SegmentDescriptor) -> Vec<String> {
        if descriptor.has_deletions() {
            vec![descriptor.live_docs_file_name(descriptor.del_gen())]
        } else {
            Vec::new()
        }
    }
}

/// Always writes the dense bitset encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseLiveDocsFormat;

impl LiveDocsFormat for DenseLiveDocsFormat {
    fn name(&self) -> &'static str {
        "dense"
    }

    fn write_live_docs(
        &self,
        bits: &dyn Bits,
        dir: &dyn Directory,
        descriptor: &SegmentDescriptor,
        new_del_count: u32,
        ctx: &IoContext,
    ) -> CoreResult<()> {
        write_live_docs_file(bits, dir, descriptor, new_del_count, ctx, |_, _| {
            LiveDocsEncoding::Dense
        })
    }

    fn read_live_docs(
        &self,
        dir: &dyn Directory,
        descriptor: &SegmentDescriptor,
        ctx: &IoContext,
    ) -> CoreResult<Arc<dyn Bits>> {
        read_live_docs_file(dir, descriptor, ctx)
    }
}

/// Writes whichever encoding gives the shortest payload.
///
/// Mostly-live segments store their deletions, mostly-dead ones store their
/// survivors, and everything in between falls back to the bitset.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptiveLiveDocsFormat;

impl LiveDocsFormat for AdaptiveLiveDocsFormat {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn write_live_docs(
        &self,
        bits: &dyn Bits,
        dir: &dyn Directory,
        descriptor: &SegmentDescriptor,
        new_del_count: u32,
        ctx: &IoContext,
    ) -> CoreResult<()> {
        write_live_docs_file(
            bits,
            dir,
            descriptor,
            new_del_count,
            ctx,
            LiveDocsEncoding::smallest,
        )
    }

    fn read_live_docs(
        &self,
        dir: &dyn Directory,
        descriptor: &SegmentDescriptor,
        ctx: &IoContext,
    ) -> CoreResult<Arc<dyn Bits>> {
        read_live_docs_file(dir, descriptor, ctx)
    }
}

/// Buffers output, checksumming each chunk as it is appended.
struct ChecksumWriter<'a> {
    out: &'a mut dyn StorageBackend,
    crc: Crc32,
    buf: Vec<u8>,
    written: u64,
}

impl<'a> ChecksumWriter<'a> {
    fn new(out: &'a mut dyn StorageBackend) -> Self {
        Self {
            out,
            crc: Crc32::new(),
            buf: Vec::with_capacity(CHUNK_SIZE),
            written: 0,
        }
    }

    fn write(&mut self, bytes: &[u8]) -> CoreResult<()> {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() >= CHUNK_SIZE {
            self.drain()?;
        }
        Ok(())
    }

    fn drain(&mut self) -> CoreResult<()> {
        if !self.buf.is_empty() {
            self.crc.update(&self.buf);
            self.out.append(&self.buf)?;
            self.written += self.buf.len() as u64;
            self.buf.clear();
        }
        Ok(())
    }

    fn finish(mut self) -> CoreResult<u64> {
        self.drain()?;
        self.out.append(&self.crc.value().to_le_bytes())?;
        self.out.flush()?;
        self.out.sync()?;
        Ok(self.written + FOOTER_LEN as u64)
    }
}

/// Calls `f` for every doc whose bit equals `live`, in ascending order.
fn for_each_doc(
    bits: &dyn Bits,
    live: bool,
    mut f: impl FnMut(DocId) -> CoreResult<()>,
) -> CoreResult<()> {
    let Some(set) = bits.as_fixed_bitset() else {
        for doc in 0..bits.len() {
            if bits.get(doc) == live {
                f(doc)?;
            }
        }
        return Ok(());
    };

    let used = set.len() & 63;
    let last = set.words().len().saturating_sub(1);
    for (index, &word) in set.words().iter().enumerate() {
        let mut word = if live { word } else { !word };
        if index == last && used != 0 {
            word &= (1u64 << used) - 1;
        }
        while word != 0 {
            f(index as u32 * 64 + word.trailing_zeros())?;
            word &= word - 1;
        }
    }
    Ok(())
}

fn write_payload(
    writer: &mut ChecksumWriter<'_>,
    bits: &dyn Bits,
    encoding: LiveDocsEncoding,
) -> CoreResult<()> {
    match encoding {
        LiveDocsEncoding::Dense => match bits.as_fixed_bitset() {
            Some(set) => {
                for word in set.words() {
                    writer.write(&word.to_le_bytes())?;
                }
                Ok(())
            }
            None => {
                let len = u64::from(bits.len());
                for index in 0..bits_to_words(bits.len()) as u64 {
                    let base = index * 64;
                    let mut word = 0u64;
                    for doc in base..(base + 64).min(len) {
                        if bits.get(doc as DocId) {
                            word |= 1u64 << (doc - base);
                        }
                    }
                    writer.write(&word.to_le_bytes())?;
                }
                Ok(())
            }
        },
        LiveDocsEncoding::SparseLive => {
            for_each_doc(bits, true, |doc| writer.write(&doc.to_le_bytes()))
        }
        LiveDocsEncoding::SparseDeleted => {
            for_each_doc(bits, false, |doc| writer.write(&doc.to_le_bytes()))
        }
    }
}

fn write_live_docs_file(
    bits: &dyn Bits,
    dir: &dyn Directory,
    descriptor: &SegmentDescriptor,
    new_del_count: u32,
    ctx: &IoContext,
    choose: impl Fn(u32, u32) -> LiveDocsEncoding,
) -> CoreResult<()> {
    let max_docs = descriptor.max_docs();
    if bits.len() != max_docs {
        return Err(CoreError::invalid_argument(format!(
            "bits length {} does not match max_docs {max_docs} of {}",
            bits.len(),
            descriptor.name()
        )));
    }

    let live = cardinality(bits);
    let deleted = u64::from(max_docs) - live;
    let declared = u64::from(descriptor.del_count()) + u64::from(new_del_count);
    if deleted != declared {
        return Err(CoreError::invalid_argument(format!(
            "bits clear {deleted} docs but {} declares {} + {new_del_count} deletions",
            descriptor.name(),
            descriptor.del_count()
        )));
    }
    let live = u32::try_from(live)
        .map_err(|_| CoreError::invalid_argument("live count exceeds u32"))?;

    let encoding = choose(max_docs, live);
    let gen = descriptor.next_del_gen();
    let name = descriptor.live_docs_file_name(gen);
    let header = LiveDocsHeader {
        version: LIVE_DOCS_VERSION,
        encoding,
        segment_id: descriptor.id(),
        gen,
        max_docs,
        live_docs: live,
    };

    let mut output = dir.create_output(&name, ctx)?;
    let written = write_contents(output.as_mut(), &header, bits);
    drop(output);
    let bytes = match written {
        Ok(bytes) => bytes,
        Err(err) => {
            match dir.delete_file(&name) {
                Ok(()) => warn!(file = %name, error = %err, "removed partial live docs file"),
                Err(cleanup) => {
                    warn!(file = %name, error = %err, cleanup = %cleanup, "failed to remove partial live docs file");
                }
            }
            return Err(err);
        }
    };

    debug!(file = %name, %encoding, bytes, live, max_docs, "wrote live docs");
    Ok(())
}

fn write_contents(
    output: &mut dyn StorageBackend,
    header: &LiveDocsHeader,
    bits: &dyn Bits,
) -> CoreResult<u64> {
    let mut writer = ChecksumWriter::new(output);
    writer.write(&header.encode())?;
    write_payload(&mut writer, bits, header.encoding)?;
    writer.finish()
}

fn decode_payload(
    header: &LiveDocsHeader,
    payload: &[u8],
    resource: &str,
) -> CoreResult<FixedBitSet> {
    let max_docs = header.max_docs;
    match header.encoding {
        LiveDocsEncoding::Dense => {
            let words = payload
                .chunks_exact(8)
                .map(|c| read_u64_le(c, 0))
                .collect::<Vec<_>>();
            FixedBitSet::from_words(words, max_docs)
                .map_err(|e| CoreError::corrupt(resource, e.to_string()))
        }
        LiveDocsEncoding::SparseLive | LiveDocsEncoding::SparseDeleted => {
            let live = header.encoding == LiveDocsEncoding::SparseLive;
            let mut set = if live {
                FixedBitSet::new(max_docs)
            } else {
                FixedBitSet::full(max_docs)
            };
            let mut previous: Option<DocId> = None;
            for chunk in payload.chunks_exact(4) {
                let doc = read_u32_le(chunk, 0);
                if doc >= max_docs {
                    return Err(CoreError::corrupt(
                        resource,
                        format!("doc {doc} out of bounds for max_docs {max_docs}"),
                    ));
                }
                if previous.is_some_and(|p| p >= doc) {
                    return Err(CoreError::corrupt(
                        resource,
                        format!("doc ids not strictly ascending at {doc}"),
                    ));
                }
                previous = Some(doc);
                if live {
                    set.set(doc);
                } else {
                    set.clear(doc);
                }
            }
            Ok(set)
        }
    }
}

fn read_live_docs_file(
    dir: &dyn Directory,
    descriptor: &SegmentDescriptor,
    ctx: &IoContext,
) -> CoreResult<Arc<dyn Bits>> {
    let gen = descriptor.del_gen();
    if gen == 0 {
        return Err(CoreError::invalid_argument(format!(
            "segment {} has no live docs file",
            descriptor.name()
        )));
    }
    let name = descriptor.live_docs_file_name(gen);
    let bytes = dir.read_file(&name, ctx)?;
    let header = inspect_named(&bytes, &name)?;

    if header.segment_id != descriptor.id() {
        return Err(CoreError::corrupt(
            &name,
            format!(
                "segment id mismatch: expected {}, got {}",
                descriptor.id(),
                header.segment_id
            ),
        ));
    }
    if header.gen != gen {
        return Err(CoreError::corrupt(
            &name,
            format!("generation mismatch: expected {gen}, got {}", header.gen),
        ));
    }
    if header.max_docs != descriptor.max_docs() {
        return Err(CoreError::corrupt(
            &name,
            format!(
                "max_docs mismatch: expected {}, got {}",
                descriptor.max_docs(),
                header.max_docs
            ),
        ));
    }

    let payload = &bytes[HEADER_LEN..bytes.len() - FOOTER_LEN];
    let set = decode_payload(&header, payload, &name)?;
    let live = set.cardinality();
    if live != u64::from(header.live_docs) {
        return Err(CoreError::corrupt(
            &name,
            format!("header declares {} live docs, payload has {live}", header.live_docs),
        ));
    }
    if live != u64::from(descriptor.num_live_docs()) {
        return Err(CoreError::corrupt(
            &name,
            format!(
                "expected {} live docs, found {live}",
                descriptor.num_live_docs()
            ),
        ));
    }

    debug!(file = %name, encoding = %header.encoding, live, "read live docs");
    Ok(Arc::new(set))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::PredicateBits;
    use segcheck_storage::{RamDirectory, StorageError, StorageResult};

    fn descriptor(max_docs: u32) -> SegmentDescriptor {
        SegmentDescriptor::new("_3", SegmentId::from_bytes([9; 16]), max_docs).unwrap()
    }

    fn write_and_read(
        format: &dyn LiveDocsFormat,
        bits: &dyn Bits,
        max_docs: u32,
    ) -> (RamDirectory, Arc<dyn Bits>) {
        let dir = RamDirectory::new();
        let d0 = descriptor(max_docs);
        let deleted = max_docs - cardinality(bits) as u32;
        format
            .write_live_docs(bits, &dir, &d0, deleted, &IoContext::Default)
            .unwrap();
        let d1 = d0.advance_del_gen(deleted).unwrap();
        let read = format
            .read_live_docs(&dir, &d1, &IoContext::ReadOnce)
            .unwrap();
        (dir, read)
    }

    #[test]
    fn single_live_doc_roundtrips() {
        let mut set = FixedBitSet::new(10);
        set.set(7);

        for format in [&DenseLiveDocsFormat as &dyn LiveDocsFormat, &AdaptiveLiveDocsFormat] {
            let (_, read) = write_and_read(format, &set, 10);
            assert_eq!(read.len(), 10);
            for doc in 0..10 {
                assert_eq!(read.get(doc), doc == 7, "doc {doc} via {}", format.name());
            }
        }
    }

    #[test]
    fn adaptive_picks_sparse_encodings() {
        assert_eq!(LiveDocsEncoding::smallest(1000, 3), LiveDocsEncoding::SparseLive);
        assert_eq!(LiveDocsEncoding::smallest(1000, 997), LiveDocsEncoding::SparseDeleted);
        assert_eq!(LiveDocsEncoding::smallest(1000, 500), LiveDocsEncoding::Dense);
        // 2 words = 16 bytes; 4 ids = 16 bytes: tie goes to dense
        assert_eq!(LiveDocsEncoding::smallest(128, 4), LiveDocsEncoding::Dense);
        assert_eq!(LiveDocsEncoding::smallest(0, 0), LiveDocsEncoding::Dense);
    }

    #[test]
    fn file_lengths_follow_encoding() {
        let mut set = FixedBitSet::full(1000);
        set.clear(17);

        let (dir, _) = write_and_read(&DenseLiveDocsFormat, &set, 1000);
        assert_eq!(
            dir.file_length("_3_1.liv").unwrap(),
            (HEADER_LEN + 16 * 8 + FOOTER_LEN) as u64
        );

        let (dir, _) = write_and_read(&AdaptiveLiveDocsFormat, &set, 1000);
        assert_eq!(
            dir.file_length("_3_1.liv").unwrap(),
            (HEADER_LEN + 4 + FOOTER_LEN) as u64
        );
    }

    #[test]
    fn predicate_and_bitset_write_identical_bytes() {
        let mut set = FixedBitSet::new(300);
        for doc in (0..300).step_by(7) {
            set.set(doc);
        }
        let shared = Arc::new(set.clone());
        let predicate = PredicateBits::new(300, move |i| shared.get(i));

        for format in [&DenseLiveDocsFormat as &dyn LiveDocsFormat, &AdaptiveLiveDocsFormat] {
            let (a, _) = write_and_read(format, &set, 300);
            let (b, _) = write_and_read(format, &predicate, 300);
            assert_eq!(
                a.read_file("_3_1.liv", &IoContext::Default).unwrap(),
                b.read_file("_3_1.liv", &IoContext::Default).unwrap()
            );
        }
    }

    #[test]
    fn write_rejects_wrong_delete_count() {
        let dir = RamDirectory::new();
        let set = FixedBitSet::new(10);
        let result =
            DenseLiveDocsFormat.write_live_docs(&set, &dir, &descriptor(10), 9, &IoContext::Default);
        assert!(matches!(result, Err(CoreError::InvalidArgument { .. })));
        assert!(dir.list_all().unwrap().is_empty());
    }

    #[test]
    fn write_rejects_wrong_length() {
        let dir = RamDirectory::new();
        let set = FixedBitSet::full(11);
        let result =
            DenseLiveDocsFormat.write_live_docs(&set, &dir, &descriptor(10), 0, &IoContext::Default);
        assert!(matches!(result, Err(CoreError::InvalidArgument { .. })));
    }

    #[test]
    fn read_detects_flipped_byte() {
        let mut set = FixedBitSet::full(64);
        set.clear(5);
        let (dir, _) = write_and_read(&DenseLiveDocsFormat, &set, 64);

        let mut bytes = dir.read_file("_3_1.liv", &IoContext::Default).unwrap();
        bytes[HEADER_LEN] ^= 0x01;
        let corrupted = RamDirectory::new();
        corrupted
            .write_file("_3_1.liv", &bytes, &IoContext::Default)
            .unwrap();

        let d1 = descriptor(64).advance_del_gen(1).unwrap();
        let err = DenseLiveDocsFormat
            .read_live_docs(&corrupted, &d1, &IoContext::Default)
            .err()
            .unwrap();
        assert!(err.to_string().contains("checksum mismatch"), "{err}");
    }

    #[test]
    fn read_checks_descriptor() {
        let mut set = FixedBitSet::full(20);
        set.clear(0);
        let (dir, _) = write_and_read(&AdaptiveLiveDocsFormat, &set, 20);

        let other_id = SegmentDescriptor::new("_3", SegmentId::from_bytes([1; 16]), 20)
            .unwrap()
            .advance_del_gen(1)
            .unwrap();
        let err = AdaptiveLiveDocsFormat
            .read_live_docs(&dir, &other_id, &IoContext::Default)
            .err()
            .unwrap();
        assert!(matches!(err, CoreError::CorruptIndex { .. }));

        let wrong_count = descriptor(20).advance_del_gen(2).unwrap();
        let err = AdaptiveLiveDocsFormat
            .read_live_docs(&dir, &wrong_count, &IoContext::Default)
            .err()
            .unwrap();
        assert!(matches!(err, CoreError::CorruptIndex { .. }));
    }

    #[test]
    fn read_without_deletions_fails() {
        let dir = RamDirectory::new();
        let result = DenseLiveDocsFormat.read_live_docs(&dir, &descriptor(5), &IoContext::Default);
        assert!(matches!(result, Err(CoreError::InvalidArgument { .. })));
    }

    #[test]
    fn missing_file_is_storage_error() {
        let dir = RamDirectory::new();
        let d1 = descriptor(5).advance_del_gen(0).unwrap();
        let err = DenseLiveDocsFormat
            .read_live_docs(&dir, &d1, &IoContext::Default)
            .err()
            .unwrap();
        assert!(err.is_storage());
    }

    /// A disk that accepts file creation but fails every sync.
    struct FullDisk(RamDirectory);

    struct UnsyncableOutput(Box<dyn StorageBackend>);

    impl StorageBackend for UnsyncableOutput {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.0.read_at(offset, len)
        }
        fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
            self.0.append(data)
        }
        fn flush(&mut self) -> StorageResult<()> {
            self.0.flush()
        }
        fn size(&self) -> StorageResult<u64> {
            self.0.size()
        }
        fn sync(&mut self) -> StorageResult<()> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "no space left",
            )))
        }
    }

    impl Directory for FullDisk {
        fn create_output(
            &self,
            name: &str,
            ctx: &IoContext,
        ) -> StorageResult<Box<dyn StorageBackend>> {
            Ok(Box::new(UnsyncableOutput(self.0.create_output(name, ctx)?)))
        }
        fn open_input(&self, name: &str, ctx: &IoContext) -> StorageResult<Box<dyn StorageBackend>> {
            self.0.open_input(name, ctx)
        }
        fn list_all(&self) -> StorageResult<Vec<String>> {
            self.0.list_all()
        }
        fn file_length(&self, name: &str) -> StorageResult<u64> {
            self.0.file_length(name)
        }
        fn delete_file(&self, name: &str) -> StorageResult<()> {
            self.0.delete_file(name)
        }
        fn sync(&self, names: &[String]) -> StorageResult<()> {
            self.0.sync(names)
        }
    }

    #[test]
    fn failed_write_leaves_no_partial_file() {
        let dir = FullDisk(RamDirectory::new());
        let set = FixedBitSet::full(64);
        let err = AdaptiveLiveDocsFormat
            .write_live_docs(&set, &dir, &descriptor(64), 0, &IoContext::Default)
            .err()
            .unwrap();
        assert!(err.is_storage());
        assert!(dir.list_all().unwrap().is_empty());

        // A file that was already there is not touched.
        dir.0
            .write_file("_3_1.liv", b"old", &IoContext::Default)
            .unwrap();
        let err = AdaptiveLiveDocsFormat
            .write_live_docs(&set, &dir, &descriptor(64), 0, &IoContext::Default)
            .err()
            .unwrap();
        assert!(err.is_storage());
        assert_eq!(
            dir.0.read_file("_3_1.liv", &IoContext::Default).unwrap(),
            b"old"
        );
    }

    #[test]
    fn inspect_reports_header() {
        let set = FixedBitSet::new(100);
        let (dir, _) = write_and_read(&AdaptiveLiveDocsFormat, &set, 100);
        let bytes = dir.read_file("_3_1.liv", &IoContext::Default).unwrap();

        let header = inspect_live_docs(&bytes).unwrap();
        assert_eq!(header.encoding, LiveDocsEncoding::SparseLive);
        assert_eq!(header.gen, 1);
        assert_eq!(header.max_docs, 100);
        assert_eq!(header.live_docs, 0);
        assert_eq!(header.file_len(), bytes.len() as u64);

        assert!(inspect_live_docs(&bytes[..10]).is_err());
    }

    #[test]
    fn files_lists_current_generation() {
        let d0 = descriptor(4);
        assert!(DenseLiveDocsFormat.files(&d0).is_empty());
        let d2 = d0.advance_del_gen(1).unwrap().advance_del_gen(1).unwrap();
        assert_eq!(DenseLiveDocsFormat.files(&d2), vec!["_3_2.liv".to_string()]);
    }
}
