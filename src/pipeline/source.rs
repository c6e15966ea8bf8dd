//! Source stage: reads sensor JSON lines and decodes them into readings.

use crate::config::SourceCommand;
use crate::counters::{PipelineCounters, SharedCounters};
use crate::error::PipelineError;
use crate::pipeline::shutdown::Shutdown;
use crate::pipeline::stage::{conduit, forward, receive, Forward, Received, Stage};
use crate::reading::Reading;
use crossbeam_channel::{Receiver, Sender};
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::thread;
use tracing::{debug, error, info, trace, warn};

/// Where sensor lines come from.
pub enum SourceInput {
    /// A subprocess whose stdout carries the lines. Killed unless its
    /// output ends first.
    Command(SourceCommand),
    /// Any line-oriented reader, e.g. a capture file or stdin.
    Reader(Box<dyn BufRead + Send>),
}

impl SourceInput {
    pub fn reader(reader: impl BufRead + Send + 'static) -> Self {
        SourceInput::Reader(Box::new(reader))
    }
}

impl std::fmt::Debug for SourceInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceInput::Command(cmd) => f.debug_tuple("Command").field(cmd).finish(),
            SourceInput::Reader(_) => f.write_str("Reader"),
        }
    }
}

/// First stage of the pipeline. Malformed lines are logged and skipped.
pub struct SourceStage {
    input: SourceInput,
    output: Sender<Reading>,
    counters: SharedCounters,
}

impl SourceStage {
    pub fn new(input: SourceInput, output: Sender<Reading>, counters: SharedCounters) -> Self {
        Self {
            input,
            output,
            counters,
        }
    }
}

impl Stage for SourceStage {
    fn name(&self) -> &'static str {
        "source"
    }

    fn run(self: Box<Self>, shutdown: &Shutdown) -> Result<(), PipelineError> {
        let SourceStage {
            input,
            output,
            counters,
        } = *self;

        let (mut child, reader) = match input {
            SourceInput::Command(cmd) => {
                let (child, reader) = spawn_command(&cmd)?;
                (Some(child), reader)
            }
            SourceInput::Reader(reader) => (None, reader),
        };
        let lines = spawn_line_reader(reader)?;

        // Only a stream that ran dry leaves the process to exit on its own
        let mut exhausted = false;
        loop {
            match receive(&lines, shutdown) {
                Received::Item(line) => {
                    let Some(reading) = decode(&line, &counters) else {
                        continue;
                    };
                    match forward(&output, reading, shutdown) {
                        Forward::Delivered => {}
                        Forward::Closed => {
                            debug!("Downstream closed, stopping source");
                            break;
                        }
                        Forward::Cancelled => break,
                    }
                }
                Received::Closed => {
                    info!("Sensor stream ended");
                    exhausted = true;
                    break;
                }
                Received::Cancelled => break,
            }
        }

        if let Some(child) = child.as_mut() {
            reap(child, !exhausted);
        }
        Ok(())
    }
}

/// Decode one line. Blank lines yield `None` without counting as errors.
fn decode(line: &str, counters: &PipelineCounters) -> Option<Reading> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    counters.record_line();
    trace!(line, "Sensor line");

    match Reading::from_json_line(line) {
        Ok(reading) => Some(reading),
        Err(e) => {
            error!(error = %e, "Dropping sensor line");
            counters.record_decode_error();
            None
        }
    }
}

fn spawn_command(cmd: &SourceCommand) -> Result<(Child, Box<dyn BufRead + Send>), PipelineError> {
    info!(command = %cmd, "Starting sensor source");

    let spawn_error = |source| PipelineError::Spawn {
        program: cmd.program.clone(),
        source,
    };

    let mut child = Command::new(&cmd.program)
        .args(&cmd.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .spawn()
        .map_err(spawn_error)?;

    let Some(stdout) = child.stdout.take() else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(spawn_error(std::io::Error::other("stdout not captured")));
    };

    Ok((child, Box::new(BufReader::new(stdout))))
}

/// Stop (if still running) and wait for the source process.
fn reap(child: &mut Child, kill: bool) {
    if kill {
        if let Err(e) = child.kill() {
            debug!(error = %e, "Sensor source already exited");
        }
    }
    match child.wait() {
        Ok(status) => info!(%status, "Sensor source exited"),
        Err(e) => warn!(error = %e, "Failed to wait for sensor source"),
    }
}

/// Pump lines from `reader` into a rendezvous conduit on a helper thread.
///
/// Lines are split on `\n`; invalid UTF-8 is replaced rather than ending the
/// stream. The thread exits at end of input or once the stage hangs up.
fn spawn_line_reader(mut reader: Box<dyn BufRead + Send>) -> Result<Receiver<String>, PipelineError> {
    let (tx, rx) = conduit();

    thread::Builder::new()
        .name("source-reader".to_string())
        .spawn(move || {
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf).into_owned();
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Sensor stream read failed");
                        break;
                    }
                }
            }
        })?;

    Ok(rx)
}
