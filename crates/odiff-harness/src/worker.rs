//! Worker side of the process boundary
//!
//! The `odiff-worker` binary hosts exactly one legacy instance and answers
//! requests from a [`crate::proxy::LegacyProxy`] until it is told to shut
//! down or its input closes. Requests are handled strictly one at a time.

use crate::protocol::{decode_line, write_message, FailureKind, Hello, Request, Response, WireValue};
use odiff_model::{AttrValue, ModelError, ModelInstance, RoutineArgs};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};

/// How a serve loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
    /// The instance could not be constructed; only the hello was sent
    StartupFailed,
    /// A shutdown request was acknowledged
    Shutdown {
        /// Requests handled, including the shutdown
        requests: u64,
    },
    /// Input closed without a shutdown request
    Eof {
        /// Requests handled
        requests: u64,
    },
}

/// Send the handshake for `loaded`, then serve it
pub async fn host<R, W>(
    loaded: Result<Box<dyn ModelInstance>, ModelError>,
    library: &str,
    setup: Option<&str>,
    reader: R,
    writer: &mut W,
) -> io::Result<Served>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match loaded {
        Ok(mut model) => {
            let hello = Hello::Ready {
                library: library.to_string(),
                setup: setup.map(str::to_string),
                pid: std::process::id(),
            };
            write_message(writer, &hello).await?;
            tracing::info!(library, "worker ready");
            serve(model.as_mut(), reader, writer).await
        }
        Err(e) => {
            tracing::error!("legacy instance failed to load: {}", e);
            let hello = Hello::StartupFailed { message: e.to_string() };
            write_message(writer, &hello).await?;
            Ok(Served::StartupFailed)
        }
    }
}

/// Answer requests line by line until shutdown or end of input
pub async fn serve<R, W>(model: &mut dyn ModelInstance, reader: R, writer: &mut W) -> io::Result<Served>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut requests = 0;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        requests += 1;
        let response = match decode_line::<Request>(&line) {
            Ok(Request::Shutdown) => {
                write_message(writer, &Response::Done).await?;
                tracing::debug!(requests, "worker shutting down");
                return Ok(Served::Shutdown { requests });
            }
            Ok(request) => handle(model, request),
            Err(e) => protocol_failure(&e),
        };
        write_message(writer, &response).await?;
    }
    tracing::warn!(requests, "worker input closed without shutdown");
    Ok(Served::Eof { requests })
}

fn protocol_failure(error: &impl std::fmt::Display) -> Response {
    Response::Failed {
        kind: FailureKind::Protocol,
        message: error.to_string(),
    }
}

fn done_or_failure(result: Result<(), ModelError>) -> Response {
    match result {
        Ok(()) => Response::Done,
        Err(e) => Response::failure(&e),
    }
}

fn handle(model: &mut dyn ModelInstance, request: Request) -> Response {
    match request {
        Request::GetAttribute { name } => Response::Value {
            value: model.get_attribute(&name).as_ref().map(WireValue::from),
        },
        Request::SetAttribute { name, value } => match AttrValue::try_from(value) {
            Ok(value) => done_or_failure(model.set_attribute(&name, value)),
            Err(e) => protocol_failure(&e),
        },
        Request::CallRoutine { name, args } => match RoutineArgs::try_from(args) {
            Ok(args) => {
                tracing::debug!(routine = %name, "calling legacy routine");
                match model.call_routine(&name, &args) {
                    Ok(value) => Response::Value {
                        value: value.as_ref().map(WireValue::from),
                    },
                    Err(e) => Response::failure(&e),
                }
            }
            Err(e) => protocol_failure(&e),
        },
        Request::Setup => done_or_failure(model.setup()),
        Request::Run => done_or_failure(model.run()),
        Request::Shutdown => Response::Done,
    }
}
