use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::compress::CompressorKind;
use crate::domain::{AccessKey, Accession};
use crate::error::PipelineError;
use crate::runner::{CommandRunner, Invocation, find_in_path, tool_version};

/// Program names or paths of the external tools, as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub prefetch: String,
    pub vdb_validate: String,
    pub fasterq_dump: String,
    pub pigz: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            prefetch: "prefetch".to_string(),
            vdb_validate: "vdb-validate".to_string(),
            fasterq_dump: "fasterq-dump".to_string(),
            pigz: "pigz".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub sra_toolkit: Option<String>,
    pub pigz: Option<String>,
}

/// Builds the command lines for the SRA Toolkit and pigz. Nothing here runs a process.
#[derive(Debug, Clone)]
pub struct SraToolkit {
    prefetch: Utf8PathBuf,
    vdb_validate: Utf8PathBuf,
    fasterq_dump: Utf8PathBuf,
    pigz: Utf8PathBuf,
}

impl SraToolkit {
    /// Resolves each tool against `PATH`. pigz is only looked up when it will be used.
    pub fn resolve(paths: &ToolPaths, compressor: CompressorKind) -> Result<Self, PipelineError> {
        let require = |name: &str| {
            find_in_path(name).ok_or_else(|| PipelineError::MissingTool(name.to_string()))
        };
        let pigz = match compressor {
            CompressorKind::Pigz => require(&paths.pigz)?,
            CompressorKind::Builtin => Utf8PathBuf::from(&paths.pigz),
        };
        Ok(Self {
            prefetch: require(&paths.prefetch)?,
            vdb_validate: require(&paths.vdb_validate)?,
            fasterq_dump: require(&paths.fasterq_dump)?,
            pigz,
        })
    }

    /// Uses the configured names as they are, without looking at `PATH`.
    pub fn verbatim(paths: &ToolPaths) -> Self {
        Self {
            prefetch: Utf8PathBuf::from(&paths.prefetch),
            vdb_validate: Utf8PathBuf::from(&paths.vdb_validate),
            fasterq_dump: Utf8PathBuf::from(&paths.fasterq_dump),
            pigz: Utf8PathBuf::from(&paths.pigz),
        }
    }

    pub fn pigz(&self) -> &Utf8Path {
        &self.pigz
    }

    /// `prefetch <id> [--ngc key] --max-size u`
    pub fn fetch(&self, id: &Accession, key: Option<&AccessKey>, workspace: &Utf8Path) -> Invocation {
        Invocation::new(&self.prefetch)
            .arg(id.as_str())
            .args(AccessKey::args(key))
            .args(["--max-size", "u"])
            .current_dir(workspace)
    }

    /// `vdb-validate <ws>/<id>/<id>.sra [--ngc key]`
    pub fn validate(
        &self,
        id: &Accession,
        key: Option<&AccessKey>,
        workspace: &Utf8Path,
    ) -> Invocation {
        Invocation::new(&self.vdb_validate)
            .arg(id.archive_path(workspace).as_str())
            .args(AccessKey::args(key))
            .current_dir(workspace)
    }

    /// `fasterq-dump <id> -e <threads> -O <ws> [--ngc key]`
    pub fn extract(
        &self,
        id: &Accession,
        key: Option<&AccessKey>,
        workspace: &Utf8Path,
        threads: usize,
    ) -> Invocation {
        Invocation::new(&self.fasterq_dump)
            .arg(id.as_str())
            .args(["-e".to_string(), threads.to_string()])
            .args(["-O", workspace.as_str()])
            .args(AccessKey::args(key))
            .current_dir(workspace)
    }

    pub fn tool_info(&self, runner: &dyn CommandRunner) -> ToolInfo {
        ToolInfo {
            sra_toolkit: tool_version(runner, &self.fasterq_dump),
            pigz: tool_version(runner, &self.pigz),
        }
    }
}
