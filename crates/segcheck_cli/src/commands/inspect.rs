//! Inspect command implementation.

use super::OutputFormat;
use segcheck_core::codec::{inspect_live_docs, LiveDocsHeader};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Decoded live-docs file header.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// File path.
    pub path: String,
    /// File size in bytes.
    pub file_len: u64,
    /// Format version.
    pub version: u8,
    /// Payload encoding.
    pub encoding: String,
    /// Hex segment id.
    pub segment_id: String,
    /// Delete generation.
    pub gen: u64,
    /// Declared document count.
    pub max_docs: u32,
    /// Live documents.
    pub live_docs: u32,
    /// Deleted documents.
    pub deleted_docs: u32,
}

impl InspectResult {
    fn new(path: &Path, file_len: u64, header: &LiveDocsHeader) -> Self {
        Self {
            path: path.display().to_string(),
            file_len,
            version: header.version,
            encoding: header.encoding.to_string(),
            segment_id: header.segment_id.to_hex(),
            gen: header.gen,
            max_docs: header.max_docs,
            live_docs: header.live_docs,
            deleted_docs: header.max_docs.saturating_sub(header.live_docs),
        }
    }
}

/// Runs the inspect command.
///
/// The whole file is validated, checksum included, before anything is
/// printed.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let format = OutputFormat::parse(format)?;
    let bytes = fs::read(path)?;
    let header = inspect_live_docs(&bytes)?;
    let result = InspectResult::new(path, bytes.len() as u64, &header);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Live docs: {}", result.path);
    println!("  Size:        {} bytes", result.file_len);
    println!("  Version:     {}", result.version);
    println!("  Encoding:    {}", result.encoding);
    println!("  Segment id:  {}", result.segment_id);
    println!("  Generation:  {}", result.gen);
    println!("  Max docs:    {}", result.max_docs);
    println!(
        "  Live docs:   {} ({} deleted)",
        result.live_docs, result.deleted_docs
    );
}
