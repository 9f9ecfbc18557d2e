use std::borrow::Borrow;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

use crate::domain::ReadStream;

#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error("invalid SRA accession: {0}")]
    InvalidAccession(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("required tool not found: {0}")]
    #[diagnostic(help("install the SRA Toolkit and pigz, or point the config file at them"))]
    MissingTool(String),

    #[error("failed to launch {program}: {message}")]
    Launch { program: String, message: String },

    #[error("'{accession}' did not validate after {attempts} download attempt(s) (last status: {})", display_status(.last_status))]
    DownloadExhausted {
        accession: String,
        attempts: u32,
        last_status: Option<i32>,
    },

    #[error("sra conversion failed: {0}")]
    Conversion(String),

    #[error("compression failed: {0}")]
    Compression(String),

    #[error("'{path}' holds {stream} reads but no output path was given for them")]
    #[diagnostic(help("pass --output-{stream}-fastq-gz for this accession"))]
    MissingDestination {
        stream: ReadStream,
        path: Utf8PathBuf,
    },
}

impl PipelineError {
    /// Process exit code for this failure; 0 is never returned.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::InvalidAccession(_)
            | PipelineError::InvalidConfig(_)
            | PipelineError::ConfigRead(_)
            | PipelineError::ConfigParse(_)
            | PipelineError::Filesystem(_) => 1,
            PipelineError::MissingDestination { .. } => 2,
            PipelineError::MissingTool(_) | PipelineError::Launch { .. } => 3,
            PipelineError::DownloadExhausted { .. } => 4,
            PipelineError::Conversion(_) => 5,
            PipelineError::Compression(_) => 6,
        }
    }
}

pub(crate) fn display_status(status: impl Borrow<Option<i32>>) -> String {
    match status.borrow() {
        Some(code) => code.to_string(),
        None => "killed by signal".to_string(),
    }
}
