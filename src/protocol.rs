//! JSON lines protocol between the host process and the worker.
//!
//! Requests arrive one JSON object per line. Every response is a single line, flushed
//! as soon as it is written so the host can render progress without buffering.
//! Failures never escape a single request: they become an error response and the loop
//! keeps reading. Only `shutdown`, end of input, or an unwritable output stops it.

use std::io::{BufRead, Write};
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use crate::errors::{CutoutError, Result};
use crate::traits::SegmentationEngine;
use crate::CutoutProcessor;

/// Request sent by the host.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum Command {
    /// Cut out the subject of a base64 or data URI encoded image.
    Process {
        #[serde(default)]
        image: Option<String>,
    },
    Health,
    Warmup,
    Shutdown,
}

/// Events of a `process` request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Progress {
        value: u8,
    },
    #[serde(rename = "result")]
    Outcome {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ready,
    Bye,
}

/// Anything the worker writes to its output.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Response {
    Event(Event),
    Status { success: bool, status: Status },
}

impl Response {
    pub const fn progress(value: u8) -> Self {
        Self::Event(Event::Progress { value })
    }

    pub const fn success(image: String) -> Self {
        Self::Event(Event::Outcome {
            success: true,
            image: Some(image),
            error: None,
        })
    }

    pub fn failure(error: &CutoutError) -> Self {
        Self::Event(Event::Outcome {
            success: false,
            image: None,
            error: Some(error.to_string()),
        })
    }

    pub const fn status(status: Status) -> Self {
        Self::Status {
            success: true,
            status,
        }
    }
}

/// Whether the loop should keep reading after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

/// Serve requests from `input` until `shutdown` or end of input.
pub fn run<M, R, W>(processor: &CutoutProcessor<M>, input: R, output: &mut W) -> Result<()>
where
    M: SegmentationEngine,
    R: BufRead,
    W: Write,
{
    tracing::info!(engine = processor.engine().name(), "waiting for commands");

    for line in input.split(b'\n') {
        let line = line.map_err(|e| CutoutError::internal("request read", e))?;
        let flow = match std::str::from_utf8(&line) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => handle_line(processor, line, output)?,
            Err(e) => {
                let error = CutoutError::protocol(format!("request is not valid UTF-8: {e}"));
                tracing::warn!(error = %error, "rejected request");
                write_response(output, &Response::failure(&error))?;
                Flow::Continue
            }
        };

        if flow == Flow::Shutdown {
            tracing::info!("shutdown requested");
            return Ok(());
        }
    }

    tracing::info!("input closed");
    Ok(())
}

/// Handle one request line. An `Err` means the output is no longer writable.
pub fn handle_line<M, W>(processor: &CutoutProcessor<M>, line: &str, output: &mut W) -> Result<Flow>
where
    M: SegmentationEngine,
    W: Write,
{
    let command = match serde_json::from_str::<Command>(line.trim()) {
        Ok(command) => command,
        Err(e) => {
            let error = CutoutError::from(e);
            tracing::warn!(error = %error, "rejected request");
            write_response(output, &Response::failure(&error))?;
            return Ok(Flow::Continue);
        }
    };

    match command {
        Command::Health | Command::Warmup => {
            tracing::debug!("status request");
            write_response(output, &Response::status(Status::Ready))?;
            Ok(Flow::Continue)
        }
        Command::Shutdown => {
            write_response(output, &Response::status(Status::Bye))?;
            Ok(Flow::Shutdown)
        }
        Command::Process { image } => {
            process(processor, image.as_deref(), output)?;
            Ok(Flow::Continue)
        }
    }
}

/// Run one `process` request: progress events, then exactly one result event.
fn process<M, W>(processor: &CutoutProcessor<M>, image: Option<&str>, output: &mut W) -> Result<()>
where
    M: SegmentationEngine,
    W: Write,
{
    tracing::info!(payload_len = image.map_or(0, str::len), "process request");

    let mut write_error = None;
    let mut last_progress = 0;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let payload =
            image.ok_or_else(|| CutoutError::decode("payload", "`image` field is missing"))?;
        processor.process_payload(payload, |value| {
            last_progress = value.max(last_progress);
            if write_error.is_none() {
                write_error = write_response(output, &Response::progress(last_progress)).err();
            }
        })
    }))
    .unwrap_or_else(|panic| {
        Err(CutoutError::internal(
            "pipeline",
            format!("panicked: {}", panic_message(panic.as_ref())),
        ))
    });

    if let Some(error) = write_error {
        return Err(error);
    }

    let response = match outcome {
        Ok(image) => {
            tracing::info!(output_len = image.len(), "process succeeded");
            Response::success(image)
        }
        Err(error) => {
            tracing::warn!(kind = error.kind(), error = %error, "process failed");
            Response::failure(&error)
        }
    };
    write_response(output, &response)
}

pub fn write_response<W: Write>(output: &mut W, response: &Response) -> Result<()> {
    let line = serde_json::to_string(response)
        .map_err(|e| CutoutError::internal("response serialization", e))?;
    writeln!(output, "{line}")?;
    output.flush()?;
    Ok(())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
