//! Live trace acquisition.
//!
//! One producer run equals one tracer execution for one target file:
//!
//! 1. A one-shot loopback listener is opened on an ephemeral port.
//! 2. The tracer subprocess is spawned with
//!    `<entry-path> <target-file> <port>`, cwd = the target's directory.
//! 3. Exactly one inbound connection is accepted; frames are decoded with
//!    [`FrameParser`](crate::frame_codec::FrameParser) and each element is
//!    forwarded immediately — incremental, never batched.
//! 4. Subprocess stdout/stderr chunks are pumped into a separate log
//!    channel, off the trace path.
//!
//! The consumer cancels by dropping the [`TraceStream`] receivers: the
//! element sender's `closed()` future fires and the subprocess is killed and
//! the socket released, at whatever protocol stage the run happens to be in.
//! `kill_on_drop` backstops the kill if the supervision task itself dies.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;

use crate::config::ReplayConfig;
use crate::errors::LaunchError;
use crate::frame_codec::FrameParser;
use crate::types::TraceElement;

/// How long to wait for the tracer to exit on its own after the stream ends
/// before killing it.
const CHILD_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period for accepting a connection the tracer made just before it
/// exited (the data is still queued on the listener).
const ACCEPT_GRACE: Duration = Duration::from_millis(500);

/// One message on the element channel.
///
/// Exactly one terminal event (`Complete` or `Failed`) ends every stream
/// that was not cancelled by the consumer.
#[derive(Debug, PartialEq)]
pub enum TraceEvent {
    Element(TraceElement),
    /// The tracer delivered all frames, closed the connection and exited
    /// cleanly.
    Complete,
    /// The run ended without completing: malformed frame, socket error, or
    /// non-zero tracer exit. Already-delivered elements stay valid, but the
    /// trace must not be cached.
    Failed { reason: String },
}

/// The consumer side of one producer run.
///
/// Dropping the stream is the cancellation signal: the subprocess is killed
/// and the socket released, with no further events delivered.
#[derive(Debug)]
pub struct TraceStream {
    pub elements: UnboundedReceiver<TraceEvent>,
    pub logs: UnboundedReceiver<String>,
}

/// Starts one tracer run for `target`.
///
/// Fails before any element is produced if the listener can't be bound or
/// the tracer executable can't be spawned.
pub async fn spawn_trace(config: &ReplayConfig, target: &Path) -> Result<TraceStream, LaunchError> {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .map_err(LaunchError::Bind)?;
    let port = listener.local_addr().map_err(LaunchError::Bind)?.port();

    let mut command = build_command(config, target, port)?;
    let mut child = command.spawn().map_err(|err| LaunchError::Spawn {
        program: config.tracer_cmd[0].clone(),
        source: err,
    })?;

    let (element_tx, element_rx) = mpsc::unbounded_channel();
    let (log_tx, log_rx) = mpsc::unbounded_channel();

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump_output(stdout, log_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump_output(stderr, log_tx.clone()));
    }

    tokio::spawn(supervise(listener, child, element_tx, log_tx));

    Ok(TraceStream {
        elements: element_rx,
        logs: log_rx,
    })
}

fn build_command(
    config: &ReplayConfig,
    target: &Path,
    port: u16,
) -> Result<Command, LaunchError> {
    let program = config
        .tracer_cmd
        .first()
        .ok_or(LaunchError::MissingTracerCommand)?;
    let entry = config
        .tracer_entry
        .as_ref()
        .ok_or(LaunchError::MissingTracerEntry)?;

    let mut command = Command::new(program);
    command
        .args(&config.tracer_cmd[1..])
        .arg(entry)
        .arg(target)
        .arg(port.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = target.parent() {
        if !dir.as_os_str().is_empty() {
            command.current_dir(dir);
        }
    }
    Ok(command)
}

/// Forwards raw output chunks from a child pipe into the log channel.
async fn pump_output<R: AsyncReadExt + Unpin>(mut reader: R, log_tx: UnboundedSender<String>) {
    let mut buf = vec![0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(cnt) => {
                let text = String::from_utf8_lossy(&buf[..cnt]).into_owned();
                if log_tx.send(text).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

enum StreamEnd {
    /// Peer closed the connection after the last frame.
    Eof,
    /// Protocol or socket failure; the run can't complete.
    Fatal(String),
    /// The consumer dropped its receivers.
    Detached,
}

async fn supervise(
    listener: TcpListener,
    mut child: Child,
    element_tx: UnboundedSender<TraceEvent>,
    log_tx: UnboundedSender<String>,
) {
    let socket = tokio::select! {
        accepted = listener.accept() => match accepted {
            Ok((socket, _addr)) => socket,
            Err(err) => {
                let _ = log_tx.send(format!("trace socket accept failed: {err}\n"));
                shutdown_child(&mut child, true, &log_tx).await;
                return;
            }
        },
        _ = element_tx.closed() => {
            shutdown_child(&mut child, true, &log_tx).await;
            return;
        }
        status = child.wait() => {
            // The tracer is already gone. It may still have connected and
            // sent everything just before exiting, so give the listener a
            // moment; otherwise the run died before producing anything.
            match timeout(ACCEPT_GRACE, listener.accept()).await {
                Ok(Ok((socket, _addr))) => socket,
                _ => {
                    let reason = match status {
                        Ok(status) if !status.success() => {
                            format!("trace generator failed with code {}", status.code().unwrap_or(-1))
                        }
                        Ok(_) => "trace generator exited without connecting".to_string(),
                        Err(err) => format!("waiting for trace generator failed: {err}"),
                    };
                    let _ = log_tx.send(format!("{reason}\n"));
                    let _ = element_tx.send(TraceEvent::Failed { reason });
                    return;
                }
            }
        }
    };
    // One-shot listener: no further connections are accepted.
    drop(listener);

    match read_frames(socket, &element_tx).await {
        StreamEnd::Detached => {
            shutdown_child(&mut child, true, &log_tx).await;
        }
        StreamEnd::Fatal(reason) => {
            let _ = log_tx.send(format!("{reason}\n"));
            shutdown_child(&mut child, true, &log_tx).await;
            let _ = element_tx.send(TraceEvent::Failed { reason });
        }
        StreamEnd::Eof => {
            // The tracer closes the connection after the last frame and then
            // exits. A non-zero exit is a terminal failure: the elements stay
            // visible but the run never counts as complete.
            match shutdown_child(&mut child, false, &log_tx).await {
                Some(status) if !status.success() => {
                    let code = status.code().unwrap_or(-1);
                    let reason = format!("trace generator failed with code {code}");
                    let _ = log_tx.send(format!("{reason}\n"));
                    let _ = element_tx.send(TraceEvent::Failed { reason });
                }
                _ => {
                    let _ = element_tx.send(TraceEvent::Complete);
                }
            }
        }
    }
}

async fn read_frames(
    mut socket: TcpStream,
    element_tx: &UnboundedSender<TraceEvent>,
) -> StreamEnd {
    let mut parser = FrameParser::new();
    let mut buf = vec![0u8; 8 * 1024];

    loop {
        tokio::select! {
            _ = element_tx.closed() => return StreamEnd::Detached,
            read = socket.read(&mut buf) => match read {
                Ok(0) => return StreamEnd::Eof,
                Ok(cnt) => {
                    parser.add_bytes(&buf[..cnt]);
                    loop {
                        match parser.next_frame() {
                            Some(Ok(value)) => {
                                match serde_json::from_value::<TraceElement>(value) {
                                    Ok(element) => {
                                        if element_tx.send(TraceEvent::Element(element)).is_err() {
                                            return StreamEnd::Detached;
                                        }
                                    }
                                    Err(err) => {
                                        return StreamEnd::Fatal(format!(
                                            "JSON parsing of trace element failed: {err}"
                                        ));
                                    }
                                }
                            }
                            Some(Err(err)) => {
                                return StreamEnd::Fatal(format!(
                                    "JSON parsing of trace element failed: {err}"
                                ));
                            }
                            None => break,
                        }
                    }
                }
                Err(err) => {
                    return StreamEnd::Fatal(format!("trace socket read failed: {err}"));
                }
            }
        }
    }
}

/// Waits for the child to exit, optionally killing it first.
///
/// Also kills it if it fails to exit within [`CHILD_EXIT_TIMEOUT`] after the
/// stream ended.
async fn shutdown_child(
    child: &mut Child,
    kill: bool,
    log_tx: &UnboundedSender<String>,
) -> Option<ExitStatus> {
    if kill {
        // start_kill errors when the process has already exited; that's fine.
        let _ = child.start_kill();
    }
    match timeout(CHILD_EXIT_TIMEOUT, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(err)) => {
            let _ = log_tx.send(format!("waiting for trace generator failed: {err}\n"));
            None
        }
        Err(_elapsed) => {
            let _ = log_tx.send("trace generator did not exit after stream end, killing it\n".to_string());
            let _ = child.start_kill();
            child.wait().await.ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config() -> ReplayConfig {
        ReplayConfig {
            tracer_cmd: vec!["python3".to_string(), "-u".to_string()],
            tracer_entry: Some(PathBuf::from("/tracer/main.py")),
            log_file: None,
        }
    }

    #[test]
    fn test_command_line_assembly() {
        let command = build_command(&config(), Path::new("/work/example.py"), 4242).unwrap();
        let std = command.as_std();

        assert_eq!(std.get_program(), "python3");
        let args: Vec<String> = std
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, vec!["-u", "/tracer/main.py", "/work/example.py", "4242"]);
        assert_eq!(std.get_current_dir(), Some(Path::new("/work")));
    }

    #[test]
    fn test_relative_target_without_directory() {
        let command = build_command(&config(), Path::new("example.py"), 1).unwrap();
        // No cwd override for a bare file name.
        assert_eq!(command.as_std().get_current_dir(), None);
    }

    #[test]
    fn test_missing_tracer_entry() {
        let mut cfg = config();
        cfg.tracer_entry = None;
        let result = build_command(&cfg, Path::new("/work/example.py"), 1);
        assert!(matches!(result, Err(LaunchError::MissingTracerEntry)));
    }

    #[test]
    fn test_missing_tracer_command() {
        let mut cfg = config();
        cfg.tracer_cmd = vec![];
        let result = build_command(&cfg, Path::new("/work/example.py"), 1);
        assert!(matches!(result, Err(LaunchError::MissingTracerCommand)));
    }
}
