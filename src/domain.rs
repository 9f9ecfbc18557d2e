use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

use crate::error::PipelineError;

static ACCESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap());

/// Run accession such as `SRR000001`. Only path-safe characters are accepted since the id is
/// spliced into every intermediate file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Accession(String);

impl Accession {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Where `prefetch` leaves the archive when run inside `workspace`.
    pub fn archive_dir(&self, workspace: &Utf8Path) -> Utf8PathBuf {
        workspace.join(&self.0)
    }

    pub fn archive_path(&self, workspace: &Utf8Path) -> Utf8PathBuf {
        self.archive_dir(workspace).join(format!("{}.sra", self.0))
    }

    pub fn fastq_path(&self, workspace: &Utf8Path, stream: ReadStream) -> Utf8PathBuf {
        workspace.join(format!("{}{}.fastq", self.0, stream.file_suffix()))
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Accession {
    type Err = PipelineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if !ACCESSION_RE.is_match(normalized) {
            return Err(PipelineError::InvalidAccession(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// dbGaP `.ngc` file for controlled-access runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKey(Utf8PathBuf);

impl AccessKey {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self(path.into())
    }

    /// Checks that the key exists and pins it to an absolute path. Tools run inside the
    /// workspace, so a path relative to the launch directory would not resolve there.
    pub fn from_file(path: &Utf8Path) -> Result<Self, PipelineError> {
        if !path.is_file() {
            return Err(PipelineError::InvalidConfig(format!(
                "access key file not found: {path}"
            )));
        }
        let absolute = path
            .canonicalize_utf8()
            .map_err(|err| PipelineError::Filesystem(format!("resolve {path}: {err}")))?;
        Ok(Self(absolute))
    }

    pub fn path(&self) -> &Utf8Path {
        &self.0
    }

    pub fn args(key: Option<&AccessKey>) -> Vec<String> {
        match key {
            Some(key) => vec!["--ngc".to_string(), key.0.to_string()],
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadStream {
    Forward,
    Reverse,
    Single,
}

impl ReadStream {
    /// Mapping order used when collecting outputs.
    pub const ALL: [ReadStream; 3] = [ReadStream::Forward, ReadStream::Reverse, ReadStream::Single];

    fn file_suffix(self) -> &'static str {
        match self {
            ReadStream::Forward => "_1",
            ReadStream::Reverse => "_2",
            ReadStream::Single => "",
        }
    }
}

impl fmt::Display for ReadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadStream::Forward => write!(f, "forward"),
            ReadStream::Reverse => write!(f, "reverse"),
            ReadStream::Single => write!(f, "single"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputDestinations {
    pub forward: Option<Utf8PathBuf>,
    pub reverse: Option<Utf8PathBuf>,
    pub single: Option<Utf8PathBuf>,
}

impl OutputDestinations {
    pub fn for_stream(&self, stream: ReadStream) -> Option<&Utf8Path> {
        match stream {
            ReadStream::Forward => self.forward.as_deref(),
            ReadStream::Reverse => self.reverse.as_deref(),
            ReadStream::Single => self.single.as_deref(),
        }
    }

    /// Joins every destination onto `prefix`; absolute destinations are left as they are.
    pub fn under_prefix(self, prefix: Option<&Utf8Path>) -> Self {
        let Some(prefix) = prefix else {
            return self;
        };
        let join = |path: Option<Utf8PathBuf>| path.map(|path| prefix.join(path));
        Self {
            forward: join(self.forward),
            reverse: join(self.reverse),
            single: join(self.single),
        }
    }
}
