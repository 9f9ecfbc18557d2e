use std::fmt;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::compress::Compressor;
use crate::config::Settings;
use crate::convert::Converter;
use crate::domain::{AccessKey, Accession, OutputDestinations};
use crate::download::Downloader;
use crate::error::PipelineError;
use crate::fs_util;
use crate::mapping::{CompressedOutput, OutputMapping};
use crate::runner::CommandRunner;
use crate::toolkit::SraToolkit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Downloading,
    Converting,
    Mapping,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Init => "init",
            PipelineState::Downloading => "downloading",
            PipelineState::Converting => "converting",
            PipelineState::Mapping => "mapping",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub state: PipelineState,
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Sends progress to the tracing subscriber.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match (event.state, event.elapsed) {
            (PipelineState::Failed, _) => error!("{}", event.message),
            (state, Some(elapsed)) => {
                info!("[{state}] {} ({:.1}s)", event.message, elapsed.as_secs_f64())
            }
            (state, None) => info!("[{state}] {}", event.message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub accession: Accession,
    pub key: Option<AccessKey>,
    pub destinations: OutputDestinations,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub accession: Accession,
    pub download_attempts: u32,
    pub outputs: Vec<CompressedOutput>,
    pub elapsed: Duration,
}

/// Download, convert and compress one accession, strictly in that order.
pub struct Pipeline<R: CommandRunner, C: Compressor> {
    settings: Settings,
    toolkit: SraToolkit,
    runner: R,
    compressor: C,
    state: PipelineState,
}

impl<R: CommandRunner, C: Compressor> Pipeline<R, C> {
    pub fn new(settings: Settings, toolkit: SraToolkit, runner: R, compressor: C) -> Self {
        Self {
            settings,
            toolkit,
            runner,
            compressor,
            state: PipelineState::Init,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn run(
        &mut self,
        request: &RunRequest,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();
        self.state = PipelineState::Init;
        match self.stages(request, sink, started) {
            Ok(summary) => {
                self.enter(PipelineState::Done, sink, "all stages finished", Some(started));
                Ok(summary)
            }
            Err(err) => {
                self.enter(PipelineState::Failed, sink, &err.to_string(), Some(started));
                Err(err)
            }
        }
    }

    fn stages(
        &mut self,
        request: &RunRequest,
        sink: &dyn ProgressSink,
        started: Instant,
    ) -> Result<RunSummary, PipelineError> {
        let id = &request.accession;
        let key = request.key.as_ref();

        self.enter(
            PipelineState::Init,
            sink,
            &format!("using workspace '{}'", self.settings.workspace),
            None,
        );
        // tools run with the workspace as cwd and also get workspace paths as arguments
        let workspace = fs_util::absolute(&self.settings.workspace)?;
        fs_util::ensure_dir(&workspace)?;

        self.enter(
            PipelineState::Downloading,
            sink,
            &format!("fetching '{id}'"),
            Some(started),
        );
        let attempts = Downloader::new(&self.runner, &self.toolkit, self.settings.retry)
            .download(id, key, &workspace)?
            .into_result(id)?;

        self.enter(
            PipelineState::Converting,
            sink,
            &format!("extracting reads from '{id}'"),
            Some(started),
        );
        Converter::new(&self.runner, &self.toolkit, self.settings.convert_options())
            .convert(id, key, &workspace)?;

        self.enter(
            PipelineState::Mapping,
            sink,
            "compressing fastq outputs",
            Some(started),
        );
        let outputs = OutputMapping::new(&workspace, id, &request.destinations)
            .apply(&self.compressor)?;

        Ok(RunSummary {
            accession: id.clone(),
            download_attempts: attempts,
            outputs,
            elapsed: started.elapsed(),
        })
    }

    fn enter(
        &mut self,
        state: PipelineState,
        sink: &dyn ProgressSink,
        message: &str,
        started: Option<Instant>,
    ) {
        self.state = state;
        sink.event(ProgressEvent {
            state,
            message: message.to_string(),
            elapsed: started.map(|at| at.elapsed()),
        });
    }
}
