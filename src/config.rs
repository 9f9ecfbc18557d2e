use std::fs;
use std::num::NonZeroU32;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::Deserialize;

use crate::compress::CompressorKind;
use crate::convert::ConvertOptions;
use crate::download::RetryPolicy;
use crate::error::PipelineError;
use crate::fs_util;
use crate::toolkit::ToolPaths;

pub const WORKSPACE_VAR: &str = "TEMPDIR";
pub const OUTPUT_PREFIX_VAR: &str = "HOME";

/// Optional JSON config file. Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub retry_backoff_ms: Option<u64>,
    #[serde(default)]
    pub compressor: Option<CompressorKind>,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub remove_archive: Option<bool>,
    #[serde(default)]
    pub tools: ToolPaths,
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub max_attempts: Option<u32>,
    pub compressor: Option<CompressorKind>,
    pub threads: Option<usize>,
    pub keep_archive: bool,
}

/// Everything a run needs from its surroundings, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub workspace: Utf8PathBuf,
    pub output_prefix: Option<Utf8PathBuf>,
    pub retry: RetryPolicy,
    pub compressor: CompressorKind,
    pub threads: usize,
    pub remove_archive: bool,
    pub tools: ToolPaths,
}

impl Settings {
    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            threads: self.threads,
            remove_archive: self.remove_archive,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn read(path: &Utf8Path) -> Result<Config, PipelineError> {
        let content =
            fs::read_to_string(path).map_err(|_| PipelineError::ConfigRead(path.to_path_buf()))?;
        serde_json::from_str(&content).map_err(|err| PipelineError::ConfigParse(err.to_string()))
    }

    /// Reads the config file (if any) and the process environment.
    pub fn resolve(path: Option<&Utf8Path>, overrides: Overrides) -> Result<Settings, PipelineError> {
        let config = match path {
            Some(path) => Self::read(path)?,
            None => Config::default(),
        };
        Self::resolve_with(config, overrides, |name| std::env::var(name).ok())
    }

    /// `env` stands in for the process environment.
    pub fn resolve_with(
        config: Config,
        overrides: Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Settings, PipelineError> {
        let non_empty = |name: &str| env(name).filter(|value| !value.trim().is_empty());

        let workspace = match non_empty(WORKSPACE_VAR) {
            Some(dir) => fs_util::absolute(Utf8Path::new(&dir))?,
            None => Utf8PathBuf::from_path_buf(std::env::temp_dir()).map_err(|path| {
                PipelineError::InvalidConfig(format!(
                    "temp directory is not valid UTF-8: {}",
                    path.display()
                ))
            })?,
        };

        let output_prefix = non_empty(OUTPUT_PREFIX_VAR)
            .map(Utf8PathBuf::from)
            .or_else(|| {
                BaseDirs::new()
                    .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().to_path_buf()).ok())
            });

        let attempts = overrides
            .max_attempts
            .or(config.max_attempts)
            .unwrap_or(crate::download::DEFAULT_MAX_ATTEMPTS.get());
        let max_attempts = NonZeroU32::new(attempts).ok_or_else(|| {
            PipelineError::InvalidConfig("max_attempts must be at least 1".to_string())
        })?;

        let threads = match overrides.threads.or(config.threads) {
            Some(0) => {
                return Err(PipelineError::InvalidConfig(
                    "threads must be at least 1".to_string(),
                ));
            }
            Some(threads) => threads,
            None => num_cpus::get(),
        };

        Ok(Settings {
            workspace,
            output_prefix,
            retry: RetryPolicy {
                max_attempts,
                backoff: Duration::from_millis(config.retry_backoff_ms.unwrap_or(0)),
            },
            compressor: overrides.compressor.or(config.compressor).unwrap_or_default(),
            threads,
            remove_archive: !overrides.keep_archive && config.remove_archive.unwrap_or(true),
            tools: config.tools,
        })
    }
}
