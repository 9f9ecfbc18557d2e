use std::fs;

use camino::Utf8Path;
use tracing::{info, warn};

use crate::domain::{AccessKey, Accession};
use crate::error::PipelineError;
use crate::runner::CommandRunner;
use crate::toolkit::SraToolkit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOptions {
    pub threads: usize,
    /// Delete `<ws>/<id>/` once the reads have been extracted.
    pub remove_archive: bool,
}

pub struct Converter<'a, R: CommandRunner> {
    runner: &'a R,
    toolkit: &'a SraToolkit,
    options: ConvertOptions,
}

impl<'a, R: CommandRunner> Converter<'a, R> {
    pub fn new(runner: &'a R, toolkit: &'a SraToolkit, options: ConvertOptions) -> Self {
        Self {
            runner,
            toolkit,
            options,
        }
    }

    /// Single extraction run. A failure here is final: retrying would need a fresh download.
    pub fn convert(
        &self,
        id: &Accession,
        key: Option<&AccessKey>,
        workspace: &Utf8Path,
    ) -> Result<(), PipelineError> {
        info!("converting '{id}.sra' to fastq with {} thread(s)", self.options.threads);
        let invocation = self
            .toolkit
            .extract(id, key, workspace, self.options.threads.max(1));
        let output = self.runner.run(&invocation)?;
        if !output.success() {
            return Err(PipelineError::Conversion(
                output.failure_message(invocation.tool_name()),
            ));
        }

        if self.options.remove_archive {
            let archive_dir = id.archive_dir(workspace);
            if archive_dir.is_dir() {
                if let Err(err) = fs::remove_dir_all(&archive_dir) {
                    warn!("could not remove '{archive_dir}': {err}");
                }
            }
        }
        Ok(())
    }
}
