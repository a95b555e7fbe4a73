use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::process::Command;

use crilog_logs::{
    CaptureManager, EngineConfig, LineFilter, LogicalLine, RecordReader, SharedSink, StreamType,
    TailBuffer,
};

mod config;

/// crilog - capture container output into CRI-style log files
#[derive(Parser, Debug)]
#[command(name = "crilog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a command and capture its stdout/stderr into a log file
    Capture(CaptureArgs),

    /// Print the lines stored in a log file
    Read(ReadArgs),
}

#[derive(Args, Debug)]
struct CaptureArgs {
    /// Log file to append records to (created if missing)
    #[arg(long, value_name = "FILE")]
    log_path: PathBuf,

    /// TOML file with engine settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum content length of a single record
    #[arg(long)]
    buf_size: Option<usize>,

    /// Command to run, with its arguments
    #[arg(required = true, last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

#[derive(Args, Debug)]
struct ReadArgs {
    /// Log file to read
    #[arg(value_name = "FILE")]
    path: PathBuf,

    /// TOML file with engine settings (must match the writer's format)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Only show lines from this stream
    #[arg(long, value_enum)]
    stream: Option<StreamArg>,

    /// Only show lines matching this regex
    #[arg(long, value_name = "REGEX")]
    grep: Option<String>,

    /// Match the regex case-insensitively
    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// Show lines that do not match the regex
    #[arg(long)]
    invert: bool,

    /// Only show the last N lines
    #[arg(long, value_name = "N")]
    tail: Option<usize>,

    /// Prefix each line with its timestamp
    #[arg(long)]
    timestamps: bool,

    /// Print records one by one instead of reassembling partial lines
    #[arg(long)]
    raw: bool,

    /// Print one JSON object per line
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StreamArg {
    Stdout,
    Stderr,
}

impl From<StreamArg> for StreamType {
    fn from(arg: StreamArg) -> Self {
        match arg {
            StreamArg::Stdout => StreamType::Stdout,
            StreamArg::Stderr => StreamType::Stderr,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Diagnostics go to stderr so they never mix with `read` output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Capture(args) => capture(args).await,
        Commands::Read(args) => read(args).await.map(|()| 0),
    };

    match result {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            Err(e)
        }
    }
}

fn load_config(path: Option<&Path>, buf_size: Option<usize>) -> Result<EngineConfig> {
    let mut config = config::load(path)?;
    if let Some(buf_size) = buf_size {
        config.buf_size = buf_size;
    }
    config.validate().context("Invalid engine configuration")?;
    Ok(config)
}

async fn open_log_file(path: &Path) -> Result<tokio::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }

    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Run the command and capture both streams; returns the exit code to use
async fn capture(args: CaptureArgs) -> Result<i32> {
    let config = load_config(args.config.as_deref(), args.buf_size)?;
    let file = open_log_file(&args.log_path).await?;

    let (program, program_args) = args
        .command
        .split_first()
        .context("No command given")?;

    let mut child = Command::new(program)
        .args(program_args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to start {}", program))?;

    let stdout = child.stdout.take().context("Child stdout was not captured")?;
    let stderr = child.stderr.take().context("Child stderr was not captured")?;

    let label = args.log_path.display().to_string();
    let mut manager = CaptureManager::new(label.clone(), SharedSink::new(file), config);
    manager.attach(StreamType::Stdout, stdout);
    manager.attach(StreamType::Stderr, stderr);

    let status = child.wait().await.context("Failed to wait for child")?;
    let results = manager
        .wait()
        .await
        .with_context(|| format!("Failed to close log file {}", label))?;

    let mut capture_failed = false;
    for result in results {
        match result {
            Ok(summary) => tracing::info!(
                stream = %summary.stream,
                records = summary.records,
                partial = summary.partial_records,
                bytes = summary.bytes,
                "Stream captured"
            ),
            Err(e) => {
                capture_failed = true;
                eprintln!("Error: {:#}", anyhow::Error::from(e));
            }
        }
    }

    let code = status.code().unwrap_or(1);
    Ok(if code == 0 && capture_failed { 1 } else { code })
}

/// JSON rendering of a logical line
#[derive(Serialize)]
struct JsonLine<'a> {
    timestamp: String,
    stream: &'static str,
    log: Cow<'a, str>,
    complete: bool,
}

async fn read(args: ReadArgs) -> Result<()> {
    let config = load_config(args.config.as_deref(), None)?;

    let filter = match &args.grep {
        Some(pattern) if args.ignore_case => LineFilter::new_case_insensitive(pattern),
        Some(pattern) => LineFilter::new(pattern),
        None => LineFilter::new(""),
    }
    .context("Invalid --grep pattern")?
    .with_stream(args.stream.map(StreamType::from));
    let filter = if args.invert { filter.inverted() } else { filter };

    let file = tokio::fs::File::open(&args.path)
        .await
        .with_context(|| format!("Failed to open log file {}", args.path.display()))?;
    let records = RecordReader::new(file, config.format.clone());

    let mut out = BufWriter::new(tokio::io::stdout());
    let mut tail = args.tail.map(TailBuffer::new);

    let context = || format!("Failed to read log file {}", args.path.display());
    if args.raw {
        let mut records = records;
        while let Some(record) = records.next_record().await.with_context(context)? {
            let line = LogicalLine::from_record(record);
            emit(&mut out, &mut tail, &filter, &args, line).await?;
        }
    } else {
        let mut lines = records.lines();
        while let Some(line) = lines.next_line().await.with_context(context)? {
            emit(&mut out, &mut tail, &filter, &args, line).await?;
        }
    }

    if let Some(tail) = tail {
        for line in tail.into_vec() {
            write_line(&mut out, &args, &line).await?;
        }
    }

    out.flush().await?;
    Ok(())
}

async fn emit<W: AsyncWrite + Unpin>(
    out: &mut W,
    tail: &mut Option<TailBuffer<LogicalLine>>,
    filter: &LineFilter,
    args: &ReadArgs,
    line: LogicalLine,
) -> Result<()> {
    if !filter.matches(&line) {
        return Ok(());
    }
    match tail {
        Some(tail) => tail.push(line),
        None => write_line(out, args, &line).await?,
    }
    Ok(())
}

async fn write_line<W: AsyncWrite + Unpin>(
    out: &mut W,
    args: &ReadArgs,
    line: &LogicalLine,
) -> Result<()> {
    let timestamp = line
        .timestamp
        .to_rfc3339_opts(chrono::SecondsFormat::Nanos, true);

    if args.json {
        let json = JsonLine {
            timestamp,
            stream: line.stream.as_str(),
            log: line.content_lossy(),
            complete: line.complete,
        };
        let mut rendered = serde_json::to_vec(&json)?;
        rendered.push(b'\n');
        out.write_all(&rendered).await?;
        return Ok(());
    }

    let mut rendered = Vec::with_capacity(line.content.len() + 48);
    if args.timestamps {
        rendered.extend_from_slice(timestamp.as_bytes());
        rendered.push(b' ');
    }
    rendered.extend_from_slice(&line.content);
    rendered.push(b'\n');
    out.write_all(&rendered).await?;
    Ok(())
}
