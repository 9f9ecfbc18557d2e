use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::compress::Compressor;
use crate::domain::{Accession, OutputDestinations, ReadStream};
use crate::error::PipelineError;
use crate::fs_util;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub stream: ReadStream,
    pub source: Utf8PathBuf,
    pub destination: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedOutput {
    pub stream: ReadStream,
    pub source: Utf8PathBuf,
    pub destination: Utf8PathBuf,
    pub bytes_in: u64,
}

/// Pairs each FASTQ that `fasterq-dump` may write with the caller's destination for it.
/// Rebuilt for every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMapping {
    entries: Vec<MappingEntry>,
}

impl OutputMapping {
    pub fn new(workspace: &Utf8Path, id: &Accession, destinations: &OutputDestinations) -> Self {
        let entries = ReadStream::ALL
            .into_iter()
            .map(|stream| MappingEntry {
                stream,
                source: id.fastq_path(workspace, stream),
                destination: destinations.for_stream(stream).map(Utf8Path::to_path_buf),
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    /// Compresses every non-empty temp file to its destination, in mapping order.
    ///
    /// Missing or empty files are skipped, which is how single-end and paired-end runs are
    /// told apart. A non-empty file without a destination stops the walk with
    /// [`PipelineError::MissingDestination`].
    pub fn apply<C: Compressor + ?Sized>(
        &self,
        compressor: &C,
    ) -> Result<Vec<CompressedOutput>, PipelineError> {
        let mut outputs = Vec::new();
        for entry in &self.entries {
            let Some(bytes_in) = fs_util::has_content(&entry.source) else {
                info!("'{}' does not exist or is empty, skipping", entry.source);
                continue;
            };
            let Some(destination) = &entry.destination else {
                return Err(PipelineError::MissingDestination {
                    stream: entry.stream,
                    path: entry.source.clone(),
                });
            };

            info!("compressing '{}' to '{destination}'", entry.source);
            compressor.compress(&entry.source, destination)?;
            outputs.push(CompressedOutput {
                stream: entry.stream,
                source: entry.source.clone(),
                destination: destination.clone(),
                bytes_in,
            });
        }
        Ok(outputs)
    }
}
