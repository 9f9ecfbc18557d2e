use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::io::Read;
use std::num::NonZeroU32;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;

use sra_fastq::compress::{Compressor, CompressorKind, GzipCompressor};
use sra_fastq::config::Settings;
use sra_fastq::domain::{AccessKey, Accession, OutputDestinations, ReadStream};
use sra_fastq::download::RetryPolicy;
use sra_fastq::error::PipelineError;
use sra_fastq::pipeline::{Pipeline, PipelineState, ProgressEvent, ProgressSink, RunRequest};
use sra_fastq::runner::{CommandRunner, Invocation, ToolOutput};
use sra_fastq::toolkit::{SraToolkit, ToolPaths};

const READS: &str = "@SRR.1 1 length=4\nACGT\n+SRR.1 1 length=4\nIIII\n";

/// Stands in for prefetch, vdb-validate and fasterq-dump.
struct FakeToolchain {
    validations: RefCell<VecDeque<i32>>,
    produces: Vec<(ReadStream, &'static str)>,
    extract_code: i32,
    calls: RefCell<Vec<Invocation>>,
}

impl FakeToolchain {
    fn new(validations: &[i32], produces: &[(ReadStream, &'static str)]) -> Self {
        Self {
            validations: RefCell::new(validations.iter().copied().collect()),
            produces: produces.to_vec(),
            extract_code: 0,
            calls: RefCell::new(Vec::new()),
        }
    }

    fn count(&self, tool: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.tool_name() == tool)
            .count()
    }
}

impl CommandRunner for FakeToolchain {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, PipelineError> {
        self.calls.borrow_mut().push(invocation.clone());
        let workspace = invocation.cwd.clone().unwrap();
        let id: Accession = invocation.args[0]
            .rsplit('/')
            .next()
            .unwrap()
            .trim_end_matches(".sra")
            .parse()
            .unwrap();
        match invocation.tool_name() {
            "prefetch" => {
                fs::create_dir_all(id.archive_dir(&workspace)).unwrap();
                fs::write(id.archive_path(&workspace), b"NCBI.sra").unwrap();
                Ok(ToolOutput::with_code(0))
            }
            "vdb-validate" => {
                let code = self.validations.borrow_mut().pop_front().unwrap_or(1);
                Ok(ToolOutput::with_code(code))
            }
            "fasterq-dump" => {
                if self.extract_code == 0 {
                    for (stream, body) in &self.produces {
                        fs::write(id.fastq_path(&workspace, *stream), body).unwrap();
                    }
                }
                Ok(ToolOutput::with_code(self.extract_code))
            }
            other => panic!("unexpected tool {other}"),
        }
    }
}

#[derive(Default)]
struct RecordingCompressor {
    calls: RefCell<Vec<(Utf8PathBuf, Utf8PathBuf)>>,
}

impl Compressor for RecordingCompressor {
    fn compress(&self, source: &Utf8Path, destination: &Utf8Path) -> Result<(), PipelineError> {
        self.calls
            .borrow_mut()
            .push((source.to_path_buf(), destination.to_path_buf()));
        GzipCompressor::default().compress(source, destination)
    }
}

#[derive(Default)]
struct RecordingSink {
    states: RefCell<Vec<PipelineState>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.states.borrow_mut().push(event.state);
    }
}

struct Scratch {
    _temp: tempfile::TempDir,
    workspace: Utf8PathBuf,
    out: Utf8PathBuf,
}

fn scratch() -> Scratch {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    Scratch {
        workspace: root.join("work"),
        out: root.join("out"),
        _temp: temp,
    }
}

fn settings(workspace: &Utf8Path) -> Settings {
    Settings {
        workspace: workspace.to_path_buf(),
        output_prefix: None,
        retry: RetryPolicy::default(),
        compressor: CompressorKind::Builtin,
        threads: 2,
        remove_archive: true,
        tools: ToolPaths::default(),
    }
}

fn request(id: &str, destinations: OutputDestinations) -> RunRequest {
    RunRequest {
        accession: id.parse().unwrap(),
        key: None,
        destinations,
    }
}

fn gunzip(path: &Utf8Path) -> String {
    let mut text = String::new();
    GzDecoder::new(fs::File::open(path).unwrap())
        .read_to_string(&mut text)
        .unwrap();
    text
}

#[test]
fn single_end_run_compresses_only_the_single_file() {
    let dirs = scratch();
    let tools = FakeToolchain::new(&[0], &[(ReadStream::Single, READS)]);
    let compressor = RecordingCompressor::default();
    let sink = RecordingSink::default();
    let destinations = OutputDestinations {
        single: Some(dirs.out.join("out.fastq.gz")),
        ..OutputDestinations::default()
    };

    let mut pipeline = Pipeline::new(
        settings(&dirs.workspace),
        SraToolkit::verbatim(&ToolPaths::default()),
        &tools,
        &compressor,
    );
    let summary = pipeline
        .run(&request("SRR000001", destinations), &sink)
        .unwrap();

    assert_eq!(pipeline.state(), PipelineState::Done);
    assert_eq!(summary.download_attempts, 1);
    assert_eq!(summary.outputs.len(), 1);
    assert_eq!(
        *compressor.calls.borrow(),
        vec![(
            dirs.workspace.join("SRR000001.fastq"),
            dirs.out.join("out.fastq.gz")
        )]
    );
    assert_eq!(gunzip(&dirs.out.join("out.fastq.gz")), READS);
    assert_eq!(
        *sink.states.borrow(),
        vec![
            PipelineState::Init,
            PipelineState::Downloading,
            PipelineState::Converting,
            PipelineState::Mapping,
            PipelineState::Done,
        ]
    );
    // archive removed, temp fastq left behind
    assert!(!dirs.workspace.join("SRR000001").exists());
    assert!(dirs.workspace.join("SRR000001.fastq").exists());
}

#[test]
fn paired_run_compresses_both_mates() {
    let dirs = scratch();
    let tools = FakeToolchain::new(
        &[0],
        &[(ReadStream::Forward, READS), (ReadStream::Reverse, READS)],
    );
    let compressor = RecordingCompressor::default();
    let destinations = OutputDestinations {
        forward: Some(dirs.out.join("r1.fastq.gz")),
        reverse: Some(dirs.out.join("r2.fastq.gz")),
        single: None,
    };

    let mut pipeline = Pipeline::new(
        settings(&dirs.workspace),
        SraToolkit::verbatim(&ToolPaths::default()),
        &tools,
        &compressor,
    );
    let summary = pipeline
        .run(&request("SRR000002", destinations), &RecordingSink::default())
        .unwrap();

    let streams: Vec<_> = summary.outputs.iter().map(|out| out.stream).collect();
    assert_eq!(streams, vec![ReadStream::Forward, ReadStream::Reverse]);
    assert_eq!(compressor.calls.borrow().len(), 2);
    assert_eq!(gunzip(&dirs.out.join("r1.fastq.gz")), READS);
    assert_eq!(gunzip(&dirs.out.join("r2.fastq.gz")), READS);
}

#[test]
fn produced_stream_without_destination_fails_the_run() {
    let dirs = scratch();
    let tools = FakeToolchain::new(&[0], &[(ReadStream::Forward, READS)]);
    let compressor = RecordingCompressor::default();
    let sink = RecordingSink::default();
    let destinations = OutputDestinations {
        reverse: Some(dirs.out.join("r2.fastq.gz")),
        single: Some(dirs.out.join("se.fastq.gz")),
        ..OutputDestinations::default()
    };

    let mut pipeline = Pipeline::new(
        settings(&dirs.workspace),
        SraToolkit::verbatim(&ToolPaths::default()),
        &tools,
        &compressor,
    );
    let err = pipeline
        .run(&request("SRR000003", destinations), &sink)
        .unwrap_err();

    assert_matches!(
        err,
        PipelineError::MissingDestination { stream: ReadStream::Forward, ref path }
            if path.ends_with("SRR000003_1.fastq")
    );
    assert_ne!(err.exit_code(), 0);
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(sink.states.borrow().last(), Some(&PipelineState::Failed));
    assert!(compressor.calls.borrow().is_empty());
    assert!(!dirs.out.exists());
}

#[test]
fn exhausted_download_aborts_before_conversion() {
    let dirs = scratch();
    let tools = FakeToolchain::new(&[], &[(ReadStream::Single, READS)]);
    let compressor = RecordingCompressor::default();
    let destinations = OutputDestinations {
        single: Some(dirs.out.join("out.fastq.gz")),
        ..OutputDestinations::default()
    };

    let mut pipeline = Pipeline::new(
        settings(&dirs.workspace),
        SraToolkit::verbatim(&ToolPaths::default()),
        &tools,
        &compressor,
    );
    let err = pipeline
        .run(&request("SRR000004", destinations), &RecordingSink::default())
        .unwrap_err();

    assert_matches!(
        err,
        PipelineError::DownloadExhausted {
            attempts: 8,
            last_status: Some(1),
            ..
        }
    );
    assert_eq!(err.exit_code(), 4);
    assert_eq!(tools.count("prefetch"), 8);
    assert_eq!(tools.count("vdb-validate"), 8);
    assert_eq!(tools.count("fasterq-dump"), 0);
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

#[test]
fn conversion_failure_is_not_retried() {
    let dirs = scratch();
    let mut tools = FakeToolchain::new(&[0], &[]);
    tools.extract_code = 3;
    let compressor = RecordingCompressor::default();

    let mut pipeline = Pipeline::new(
        settings(&dirs.workspace),
        SraToolkit::verbatim(&ToolPaths::default()),
        &tools,
        &compressor,
    );
    let err = pipeline
        .run(
            &request("SRR000005", OutputDestinations::default()),
            &RecordingSink::default(),
        )
        .unwrap_err();

    assert_matches!(err, PipelineError::Conversion(_));
    assert_eq!(err.exit_code(), 5);
    assert_eq!(tools.count("fasterq-dump"), 1);
    assert_eq!(tools.count("prefetch"), 1);
    assert!(dirs.workspace.join("SRR000005").exists());
}

#[test]
fn key_is_forwarded_to_every_sra_tool() {
    let dirs = scratch();
    let tools = FakeToolchain::new(&[0], &[(ReadStream::Single, READS)]);
    let compressor = RecordingCompressor::default();
    let mut req = request(
        "SRR000006",
        OutputDestinations {
            single: Some(dirs.out.join("se.fastq.gz")),
            ..OutputDestinations::default()
        },
    );
    req.key = Some(AccessKey::new("/keys/prj_1234.ngc"));

    let mut settings = settings(&dirs.workspace);
    settings.threads = 6;
    settings.retry = RetryPolicy {
        max_attempts: NonZeroU32::new(2).unwrap(),
        backoff: Duration::from_millis(1),
    };
    let mut pipeline = Pipeline::new(
        settings,
        SraToolkit::verbatim(&ToolPaths::default()),
        &tools,
        &compressor,
    );
    pipeline.run(&req, &RecordingSink::default()).unwrap();

    for call in tools.calls.borrow().iter() {
        let position = call.args.iter().position(|arg| arg == "--ngc");
        let value = position.map(|at| call.args[at + 1].as_str());
        assert_eq!(value, Some("/keys/prj_1234.ngc"), "{}", call.command_line());
        assert_eq!(call.cwd.as_deref(), Some(dirs.workspace.as_path()));
    }
    let extract = tools
        .calls
        .borrow()
        .iter()
        .find(|call| call.tool_name() == "fasterq-dump")
        .cloned()
        .unwrap();
    assert_eq!(extract.args[1..3], ["-e".to_string(), "6".to_string()]);
}

#[test]
fn relative_workspace_resolves_against_launch_dir() {
    let local = tempfile::tempdir_in(".").unwrap();
    let name = local.path().file_name().unwrap().to_str().unwrap();
    let relative = Utf8PathBuf::from(name).join("work");
    let absolute = Utf8PathBuf::from_path_buf(std::env::current_dir().unwrap())
        .unwrap()
        .join(&relative);

    let tools = FakeToolchain::new(&[0], &[(ReadStream::Single, READS)]);
    let out = absolute.parent().unwrap().join("out/se.fastq.gz");
    let destinations = OutputDestinations {
        single: Some(out.clone()),
        ..OutputDestinations::default()
    };
    let mut pipeline = Pipeline::new(
        settings(&relative),
        SraToolkit::verbatim(&ToolPaths::default()),
        &tools,
        GzipCompressor::default(),
    );
    pipeline
        .run(&request("SRR000008", destinations), &RecordingSink::default())
        .unwrap();

    let validate = tools
        .calls
        .borrow()
        .iter()
        .find(|call| call.tool_name() == "vdb-validate")
        .cloned()
        .unwrap();
    assert_eq!(validate.cwd.as_deref(), Some(absolute.as_path()));
    assert_eq!(
        validate.args[0],
        absolute.join("SRR000008/SRR000008.sra").as_str()
    );
    assert_eq!(gunzip(&out), READS);
}

struct NoBinaries;

impl CommandRunner for NoBinaries {
    fn run(&self, invocation: &Invocation) -> Result<ToolOutput, PipelineError> {
        Err(PipelineError::Launch {
            program: invocation.program.to_string(),
            message: "No such file or directory (os error 2)".to_string(),
        })
    }
}

#[test]
fn missing_tool_stops_without_retrying() {
    let dirs = scratch();
    let mut pipeline = Pipeline::new(
        settings(&dirs.workspace),
        SraToolkit::verbatim(&ToolPaths::default()),
        NoBinaries,
        GzipCompressor::default(),
    );
    let err = pipeline
        .run(
            &request("SRR000007", OutputDestinations::default()),
            &RecordingSink::default(),
        )
        .unwrap_err();
    assert_matches!(err, PipelineError::Launch { ref program, .. } if program == "prefetch");
    assert_eq!(err.exit_code(), 3);
    assert_eq!(pipeline.state(), PipelineState::Failed);
}
