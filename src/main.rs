use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{error, warn};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use flow_replay::config::ReplayConfig;
use flow_replay::frame_codec::FrameParser;
use flow_replay::paths::FLOW_REPLAY_PATHS;
use flow_replay::session::Session;
use flow_replay::types::{NavigationAction, PlaybackCommand};

#[derive(Parser, Debug)]
#[command(version, about = "Trace a program and replay its execution step-by-step")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Trace a file and drive playback over stdio.
    ///
    /// Inbound commands, one per line: `first`, `prev`, `next`, `last`,
    /// `navigate <action>`, `seek <index>`, `quit`. Outbound updates are
    /// printed as one JSON object per line, tagged with `command`.
    Run {
        /// Program file to trace and visualize.
        file: PathBuf,
        /// Tracer command, whitespace-separated (overrides config).
        #[arg(long)]
        tracer: Option<String>,
        /// Path to the tracer program's entry script (overrides config).
        #[arg(long)]
        tracer_entry: Option<PathBuf>,
        /// Log file path (overrides config).
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Mock tracer for integration tests.
    ///
    /// Invoked the way a real tracer is: the last three positional
    /// arguments are `<entry> <target> <port>`. Any preceding arguments
    /// configure the mock: `--elements N` (frames to send, default 3),
    /// `--bad-frame` (append one malformed frame), `--exit-code N`
    /// (exit status after closing the connection), `--no-connect`
    /// (exit without ever connecting).
    #[command(trailing_var_arg = true)]
    MockTracer {
        /// All positional arguments; the last one is the port.
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            file,
            tracer,
            tracer_entry,
            log_file,
        } => run(file, tracer, tracer_entry, log_file).await,
        Commands::MockTracer { args } => {
            flexi_logger::init();
            run_mock_tracer(&args).await
        }
    }
}

// ---------------------------------------------------------------------------
// Run subcommand
// ---------------------------------------------------------------------------

async fn run(
    file: PathBuf,
    tracer: Option<String>,
    tracer_entry: Option<PathBuf>,
    log_file: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let mut config = ReplayConfig::load();
    if let Some(tracer) = tracer {
        let cmd: Vec<String> = tracer.split_whitespace().map(str::to_string).collect();
        if cmd.is_empty() {
            warn!("--tracer is empty, keeping configured command");
        } else {
            config.tracer_cmd = cmd;
        }
    }
    if let Some(entry) = tracer_entry {
        config.tracer_entry = Some(entry);
    }
    if let Some(path) = log_file {
        config.log_file = Some(path);
    }
    init_logging(&config);

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    let mut session = Session::new(config, ui_tx)?;
    session.start_visualization(&file).await?;

    // Updates go out as one JSON line each; logs go to the log file, so
    // stdout stays machine-readable.
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(update) = ui_rx.recv().await {
            match serde_json::to_string(&update) {
                Ok(mut line) => {
                    line.push('\n');
                    if stdout.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                    let _ = stdout.flush().await;
                }
                Err(err) => error!("can't serialize update: {err}"),
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse_input(line) {
                    Some(InputCommand::Quit) => break,
                    Some(InputCommand::Playback(command)) => {
                        if !session.send_command(command) {
                            warn!("no active visualization, dropping: {line}");
                        }
                    }
                    None => warn!("unknown command: {line}"),
                }
            }
            Ok(None) => break,
            Err(err) => {
                error!("stdin read failed: {err}");
                break;
            }
        }
    }

    session.dispose().await;
    drop(session);
    let _ = writer.await;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputCommand {
    Playback(PlaybackCommand),
    Quit,
}

fn parse_input(line: &str) -> Option<InputCommand> {
    let mut words = line.split_whitespace();
    let head = words.next()?;

    let action = |action| Some(InputCommand::Playback(PlaybackCommand::Navigate(action)));
    match head {
        "quit" | "q" | "exit" => Some(InputCommand::Quit),
        "first" => action(NavigationAction::First),
        "prev" => action(NavigationAction::Prev),
        "next" => action(NavigationAction::Next),
        "last" => action(NavigationAction::Last),
        "navigate" => match words.next()? {
            "first" => action(NavigationAction::First),
            "prev" => action(NavigationAction::Prev),
            "next" => action(NavigationAction::Next),
            "last" => action(NavigationAction::Last),
            _ => None,
        },
        "seek" => {
            let index = words.next()?.parse::<usize>().ok()?;
            Some(InputCommand::Playback(PlaybackCommand::Seek(index)))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Configures logging for a run.
///
/// If a log file path is configured, writes logs next to it. Otherwise
/// writes under the well-known temp directory. Falls back to stderr if file
/// logging cannot be set up.
fn init_logging(config: &ReplayConfig) {
    let log_path = config.log_file.clone().or_else(|| {
        let paths = FLOW_REPLAY_PATHS.lock().ok()?;
        Some(paths.log_dir().join("flow-replay.log"))
    });

    if let Some(path) = log_path {
        // Ensure the parent directory exists.
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let dir = path
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .to_path_buf();
        let basename = path
            .file_stem()
            .unwrap_or_else(|| std::ffi::OsStr::new("flow-replay"))
            .to_string_lossy()
            .to_string();

        match flexi_logger::Logger::try_with_str("info") {
            Ok(logger) => {
                let result = logger
                    .log_to_file(
                        flexi_logger::FileSpec::default()
                            .directory(dir)
                            .basename(basename),
                    )
                    .start();
                match result {
                    Ok(handle) => {
                        // Kept alive for the whole process lifetime.
                        std::mem::forget(handle);
                        return;
                    }
                    Err(e) => {
                        eprintln!("Warning: could not start file logging: {e}");
                    }
                }
            }
            Err(e) => {
                eprintln!("Warning: could not configure logger: {e}");
            }
        }
    }

    // Fallback: basic stderr logging.
    flexi_logger::init();
}

// ---------------------------------------------------------------------------
// MockTracer subcommand (used by integration tests)
// ---------------------------------------------------------------------------

fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a String> {
    args.iter()
        .position(|arg| arg == name)
        .and_then(|i| args.get(i + 1))
}

async fn run_mock_tracer(args: &[String]) -> Result<(), Box<dyn Error>> {
    if args.len() < 3 {
        return Err("mock-tracer: expected <entry> <target> <port> as trailing arguments".into());
    }
    let port: u16 = args[args.len() - 1].parse()?;
    let target = args[args.len() - 2].clone();
    let elements: usize = flag_value(args, "--elements")
        .and_then(|v| v.parse().ok())
        .unwrap_or(3);
    let exit_code: i32 = flag_value(args, "--exit-code")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let bad_frame = args.iter().any(|arg| arg == "--bad-frame");

    if args.iter().any(|arg| arg == "--no-connect") {
        println!("mock tracer exiting without connecting");
        if exit_code != 0 {
            std::process::exit(exit_code);
        }
        return Ok(());
    }

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await?;
    for i in 0..elements {
        let line = (i + 1) as i64;
        let element = json!({
            "line": line,
            "filePath": target,
            "stack": [{
                "frameName": "<module>",
                "locals": [{"name": "i", "type": "int", "value": i}],
            }],
            "heap": {},
            "stdout": format!("step {line}\n"),
        });
        stream.write_all(&FrameParser::encode(&element)).await?;
    }
    if bad_frame {
        let garbage = b"{not json";
        let mut frame = (garbage.len() as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(garbage);
        stream.write_all(&frame).await?;
    }
    stream.shutdown().await?;
    drop(stream);

    println!("mock tracer sent {elements} elements");
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
