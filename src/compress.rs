use std::fs;
use std::io::{self, BufReader, BufWriter};

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::error::PipelineError;
use crate::fs_util;
use crate::runner::{CommandRunner, Invocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CompressorKind {
    /// Parallel gzip through the external `pigz` binary.
    #[default]
    Pigz,
    /// In-process gzip, for hosts without pigz.
    Builtin,
}

/// Writes a gzip copy of `source` at `destination`. The source is left in place.
pub trait Compressor {
    fn compress(&self, source: &Utf8Path, destination: &Utf8Path) -> Result<(), PipelineError>;
}

impl<C: Compressor + ?Sized> Compressor for Box<C> {
    fn compress(&self, source: &Utf8Path, destination: &Utf8Path) -> Result<(), PipelineError> {
        (**self).compress(source, destination)
    }
}

impl<C: Compressor + ?Sized> Compressor for &C {
    fn compress(&self, source: &Utf8Path, destination: &Utf8Path) -> Result<(), PipelineError> {
        (**self).compress(source, destination)
    }
}

pub struct PigzCompressor<R: CommandRunner> {
    runner: R,
    program: Utf8PathBuf,
    threads: usize,
}

impl<R: CommandRunner> PigzCompressor<R> {
    pub fn new(runner: R, program: impl Into<Utf8PathBuf>, threads: usize) -> Self {
        Self {
            runner,
            program: program.into(),
            threads: threads.max(1),
        }
    }

    pub fn invocation(&self, source: &Utf8Path, destination: &Utf8Path) -> Invocation {
        Invocation::new(&self.program)
            .args(["-c".to_string(), "-p".to_string(), self.threads.to_string()])
            .arg(source.as_str())
            .stdout_to(destination)
    }
}

impl<R: CommandRunner> Compressor for PigzCompressor<R> {
    fn compress(&self, source: &Utf8Path, destination: &Utf8Path) -> Result<(), PipelineError> {
        fs_util::ensure_parent(destination)?;
        let invocation = self.invocation(source, destination);
        let output = self.runner.run(&invocation);
        if matches!(&output, Ok(output) if output.success()) {
            return Ok(());
        }
        let _ = fs::remove_file(destination);
        let output = output?;
        Err(PipelineError::Compression(format!(
            "{source} -> {destination}: {}",
            output.failure_message(invocation.tool_name())
        )))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: Compression,
}

impl GzipCompressor {
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Compressor for GzipCompressor {
    fn compress(&self, source: &Utf8Path, destination: &Utf8Path) -> Result<(), PipelineError> {
        let fail = |err: io::Error| {
            PipelineError::Compression(format!("{source} -> {destination}: {err}"))
        };
        fs_util::ensure_parent(destination)?;
        let dir = match destination.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };

        let mut reader = BufReader::new(fs::File::open(source).map_err(fail)?);
        let staging = NamedTempFile::new_in(dir).map_err(fail)?;
        let mut encoder = GzEncoder::new(BufWriter::new(staging), self.level);
        io::copy(&mut reader, &mut encoder).map_err(fail)?;
        let staging = encoder
            .finish()
            .map_err(fail)?
            .into_inner()
            .map_err(|err| fail(err.into_error()))?;
        staging.persist(destination).map_err(|err| fail(err.error))?;
        Ok(())
    }
}
