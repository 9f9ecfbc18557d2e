use std::num::NonZeroU32;
use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use tracing::{info, warn};

use crate::domain::{AccessKey, Accession};
use crate::error::{PipelineError, display_status};
use crate::runner::{CommandRunner, ToolOutput};
use crate::toolkit::SraToolkit;

pub const DEFAULT_MAX_ATTEMPTS: NonZeroU32 = NonZeroU32::new(8).unwrap();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: NonZeroU32,
    /// Sleep between a failed validation and the next fetch.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Validated { attempts: u32 },
    Exhausted { attempts: u32, last_status: Option<i32> },
}

impl DownloadOutcome {
    pub fn into_result(self, id: &Accession) -> Result<u32, PipelineError> {
        match self {
            DownloadOutcome::Validated { attempts } => Ok(attempts),
            DownloadOutcome::Exhausted {
                attempts,
                last_status,
            } => Err(PipelineError::DownloadExhausted {
                accession: id.to_string(),
                attempts,
                last_status,
            }),
        }
    }
}

/// Runs the integrity check on the archive `prefetch` left in `workspace`. Retrying is the
/// caller's business.
pub fn validate<R: CommandRunner>(
    runner: &R,
    toolkit: &SraToolkit,
    id: &Accession,
    key: Option<&AccessKey>,
    workspace: &Utf8Path,
) -> Result<ToolOutput, PipelineError> {
    runner.run(&toolkit.validate(id, key, workspace))
}

pub struct Downloader<'a, R: CommandRunner> {
    runner: &'a R,
    toolkit: &'a SraToolkit,
    policy: RetryPolicy,
}

impl<'a, R: CommandRunner> Downloader<'a, R> {
    pub fn new(runner: &'a R, toolkit: &'a SraToolkit, policy: RetryPolicy) -> Self {
        Self {
            runner,
            toolkit,
            policy,
        }
    }

    /// Fetches and validates until a validation passes or the attempt budget runs out.
    /// Launch failures abort immediately; tool exit statuses never do.
    pub fn download(
        &self,
        id: &Accession,
        key: Option<&AccessKey>,
        workspace: &Utf8Path,
    ) -> Result<DownloadOutcome, PipelineError> {
        let max = self.policy.max_attempts.get();
        let mut last_status = None;

        for attempt in 1..=max {
            info!("attempt #{attempt} to download '{id}'");
            let fetched = self.runner.run(&self.toolkit.fetch(id, key, workspace))?;
            if !fetched.success() {
                warn!(
                    "prefetch exited with status {} on attempt #{attempt}",
                    display_status(fetched.code)
                );
            }

            let validated = validate(self.runner, self.toolkit, id, key, workspace)?;
            if validated.success() {
                info!("'{id}' validated after {attempt} attempt(s)");
                return Ok(DownloadOutcome::Validated { attempts: attempt });
            }
            warn!(
                "validation of '{id}' failed with status {} on attempt #{attempt}",
                display_status(validated.code)
            );
            last_status = validated.code;

            if attempt < max && !self.policy.backoff.is_zero() {
                thread::sleep(self.policy.backoff);
            }
        }

        Ok(DownloadOutcome::Exhausted {
            attempts: max,
            last_status,
        })
    }
}
