use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

use sra_fastq::compress::{Compressor, CompressorKind, GzipCompressor, PigzCompressor};
use sra_fastq::config::{ConfigLoader, Overrides};
use sra_fastq::domain::{AccessKey, Accession, OutputDestinations};
use sra_fastq::error::PipelineError;
use sra_fastq::pipeline::{LogSink, Pipeline, RunRequest};
use sra_fastq::runner::SystemRunner;
use sra_fastq::toolkit::SraToolkit;

#[derive(Parser)]
#[command(name = "sra-fastq")]
#[command(about = "Download and process SRA files")]
#[command(version)]
struct Cli {
    #[arg(long, help = "SRA run accession")]
    sra_id: String,

    #[arg(long, help = "dbGaP access key file")]
    ngc_key_file: Option<Utf8PathBuf>,

    #[arg(long, help = "Forward strand fastq.gz file")]
    output_forward_fastq_gz: Option<Utf8PathBuf>,

    #[arg(long, help = "Reverse strand fastq.gz file")]
    output_reverse_fastq_gz: Option<Utf8PathBuf>,

    #[arg(long, help = "Single reads fastq.gz file")]
    output_single_fastq_gz: Option<Utf8PathBuf>,

    #[arg(long, help = "JSON config file")]
    config: Option<Utf8PathBuf>,

    #[arg(long)]
    compressor: Option<CompressorKind>,

    #[arg(long, help = "Download attempts before giving up")]
    max_attempts: Option<u32>,

    #[arg(long, help = "Worker threads for fasterq-dump and pigz")]
    threads: Option<usize>,

    #[arg(long, help = "Keep the downloaded .sra after conversion")]
    keep_archive: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<PipelineError>() {
            return ExitCode::from(err.exit_code());
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let accession: Accession = cli.sra_id.parse()?;
    let key = cli
        .ngc_key_file
        .as_deref()
        .map(AccessKey::from_file)
        .transpose()?;

    let overrides = Overrides {
        max_attempts: cli.max_attempts,
        compressor: cli.compressor,
        threads: cli.threads,
        keep_archive: cli.keep_archive,
    };
    let settings = ConfigLoader::resolve(cli.config.as_deref(), overrides)?;

    let destinations = OutputDestinations {
        forward: cli.output_forward_fastq_gz,
        reverse: cli.output_reverse_fastq_gz,
        single: cli.output_single_fastq_gz,
    }
    .under_prefix(settings.output_prefix.as_deref());

    let toolkit = SraToolkit::resolve(&settings.tools, settings.compressor)?;
    if tracing::enabled!(Level::DEBUG) {
        let info = toolkit.tool_info(&SystemRunner);
        debug!(
            sra_toolkit = info.sra_toolkit.as_deref().unwrap_or("unknown"),
            pigz = info.pigz.as_deref().unwrap_or("unknown"),
            "tool versions"
        );
    }

    let compressor: Box<dyn Compressor> = match settings.compressor {
        CompressorKind::Pigz => Box::new(PigzCompressor::new(
            SystemRunner,
            toolkit.pigz(),
            settings.threads,
        )),
        CompressorKind::Builtin => Box::new(GzipCompressor::default()),
    };

    let request = RunRequest {
        accession,
        key,
        destinations,
    };
    let mut pipeline = Pipeline::new(settings, toolkit, SystemRunner, compressor);
    let summary = pipeline.run(&request, &LogSink)?;

    for output in &summary.outputs {
        info!(
            "{} reads: '{}' ({} bytes uncompressed)",
            output.stream, output.destination, output.bytes_in
        );
    }
    info!(
        "finished '{}' in {:.1}s after {} download attempt(s)",
        summary.accession,
        summary.elapsed.as_secs_f64(),
        summary.download_attempts
    );
    Ok(())
}
