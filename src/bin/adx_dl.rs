use std::process::ExitCode;
use std::thread;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use adx_bundler::app::{App, JobReport};
use adx_bundler::archive::list_entries;
use adx_bundler::config::{ConfigLoader, FetchSettings};
use adx_bundler::delivery::DirectorySink;
use adx_bundler::domain::{ItemIdentity, ResourceRequests, ResourceRole};
use adx_bundler::error::AdxError;
use adx_bundler::fetch::{CancelToken, HttpFetcher};
use adx_bundler::notify::{self, JobStatus};
use adx_bundler::output::{JsonOutput, OutputMode, TerminalProgress};

#[derive(Parser)]
#[command(name = "adx-dl")]
#[command(about = "Download a chart's assets and pack them into an .adx archive")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download one chart")]
    Fetch(FetchArgs),
    #[command(about = "Download every chart listed in adx.json")]
    Batch(BatchArgs),
    #[command(about = "List the entries of an .adx archive")]
    Inspect(InspectArgs),
}

#[derive(Args)]
struct FetchArgs {
    #[arg(long)]
    artist: String,

    #[arg(long)]
    title: String,

    #[arg(long, alias = "mv")]
    video: Option<String>,

    #[arg(long, alias = "jacket")]
    image: Option<String>,

    #[arg(long)]
    audio: Option<String>,

    #[arg(long, alias = "chart")]
    data: Option<String>,

    #[arg(long)]
    without_video: bool,

    #[arg(long)]
    out: Option<Utf8PathBuf>,

    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_secs: Option<u64>,
}

#[derive(Args)]
struct BatchArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    out: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct InspectArgs {
    path: Utf8PathBuf,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(adx) = report.downcast_ref::<AdxError>() {
                return ExitCode::from(map_exit_code(adx));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &AdxError) -> u8 {
    match error {
        err if err.is_configuration() => 2,
        AdxError::NoFilesDownloaded { .. } | AdxError::HttpClient(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Fetch(args) => run_fetch(args, output_mode),
        Commands::Batch(args) => run_batch(args, output_mode),
        Commands::Inspect(args) => run_inspect(args, output_mode),
    }
}

fn run_fetch(args: FetchArgs, output_mode: OutputMode) -> miette::Result<ExitCode> {
    let FetchArgs {
        artist,
        title,
        video,
        image,
        audio,
        data,
        without_video,
        out,
        timeout_secs,
    } = args;

    let mut resources = ResourceRequests::default();
    for (role, url) in [
        (ResourceRole::Video, video),
        (ResourceRole::Image, image),
        (ResourceRole::Audio, audio),
        (ResourceRole::Data, data),
    ] {
        resources.set(role, url);
    }
    if without_video {
        resources = resources.without_video();
    }
    if !resources.is_downloadable() {
        warn!("neither audio nor chart data requested; the archive will not be playable");
    }

    let mut settings = FetchSettings::default();
    if let Some(timeout_secs) = timeout_secs {
        settings.timeout_secs = timeout_secs;
    }
    let app = App::new(HttpFetcher::new(&settings)?, sink_for(out)?);
    let item = ItemIdentity::new(artist, title);

    let report = match output_mode {
        OutputMode::NonInteractive => {
            let report =
                app.download_item_with(item, &resources, &JsonOutput, &CancelToken::new());
            JsonOutput::print_report(&report).into_diagnostic()?;
            report
        }
        OutputMode::Interactive => {
            let printer = spawn_status_printer(1);
            let progress = TerminalProgress::default();
            let report =
                app.download_item_with(item, &resources, &progress, &CancelToken::new());
            join_status_printer(printer);
            print_report_details(&report);
            report
        }
    };
    finish(report)
}

fn run_batch(args: BatchArgs, output_mode: OutputMode) -> miette::Result<ExitCode> {
    let resolved = ConfigLoader::resolve(args.config.as_deref())?;
    let app = App::new(
        HttpFetcher::new(&resolved.settings)?,
        sink_for(args.out)?,
    );

    let result = match output_mode {
        OutputMode::NonInteractive => {
            let result = app.download_items(&resolved.items, &JsonOutput);
            JsonOutput::print_batch(&result).into_diagnostic()?;
            result
        }
        OutputMode::Interactive => {
            let printer = spawn_status_printer(resolved.items.len());
            let progress = TerminalProgress::default();
            let result = app.download_items(&resolved.items, &progress);
            join_status_printer(printer);
            for report in &result.jobs {
                print_report_details(report);
            }
            result
        }
    };

    let failed = result.jobs.iter().filter(|job| !job.is_success()).count();
    if failed == 0 {
        Ok(ExitCode::SUCCESS)
    } else if failed == result.jobs.len() {
        Ok(ExitCode::from(3))
    } else {
        Ok(ExitCode::from(1))
    }
}

fn run_inspect(args: InspectArgs, output_mode: OutputMode) -> miette::Result<ExitCode> {
    let bytes = std::fs::read(args.path.as_std_path())
        .map_err(|err| AdxError::Filesystem(format!("read {}: {err}", args.path)))?;
    let entries = list_entries(&bytes)?;
    match output_mode {
        OutputMode::NonInteractive => {
            JsonOutput::print_inspect(args.path.as_str(), &entries).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            println!("{}", args.path);
            for entry in &entries {
                let method = if entry.stored { "stored" } else { "compressed" };
                println!("  {:<14} {:>12} bytes  {method}", entry.name, entry.size);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn sink_for(out: Option<Utf8PathBuf>) -> miette::Result<DirectorySink> {
    match out {
        Some(dir) => Ok(DirectorySink::new(dir)),
        None => Ok(DirectorySink::downloads()?),
    }
}

fn finish(report: JobReport) -> miette::Result<ExitCode> {
    match report.error {
        None => Ok(ExitCode::SUCCESS),
        Some(err) => Ok(ExitCode::from(map_exit_code(&err))),
    }
}

/// Prints job statuses until `jobs` terminal statuses have been seen.
fn spawn_status_printer(jobs: usize) -> thread::JoinHandle<()> {
    let receiver = notify::center().subscribe();
    thread::spawn(move || {
        let green = "\x1b[32m";
        let cyan = "\x1b[36m";
        let red = "\x1b[31m";
        let reset = "\x1b[0m";

        let mut remaining = jobs;
        while remaining > 0 {
            let Ok(notification) = receiver.recv() else {
                break;
            };
            match &notification.status {
                JobStatus::Loading(message) => println!("{cyan}⬇️  {message}{reset}"),
                JobStatus::Success(message) => println!("{green}✅ {message}{reset}"),
                JobStatus::Failure(message) => println!("{red}❌ {message}{reset}"),
            }
            if notification.status.is_terminal() {
                remaining -= 1;
            }
        }
    })
}

fn join_status_printer(printer: thread::JoinHandle<()>) {
    if printer.join().is_err() {
        warn!("status printer thread panicked; some job statuses were not shown");
    }
}

fn print_report_details(report: &JobReport) {
    let yellow = "\x1b[33m";
    let reset = "\x1b[0m";

    if let Some(delivery) = &report.delivery {
        println!("   📁 {} ({} bytes)", delivery.path, delivery.bytes);
    }
    for failure in &report.failures {
        println!("{yellow}   ⚠️ {}: {}{reset}", failure.role, failure.reason);
    }
}
