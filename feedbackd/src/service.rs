//! The daemon run loop
//!
//! A single task multiplexes client commands, Event signals and the
//! shutdown trigger, so Event state transitions never overlap. Status
//! reports are flushed to the client after every step.

use std::future::Future;
use std::sync::Arc;

use feedback_core::{RequestId, Services};
use feedback_store::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::backends;
use crate::config::DaemonConfig;
use crate::daemon::Daemon;
use crate::error::{ConfigError, Result};
use crate::transport::{Command, Response};

/// Wire configuration, context and simulated backends into [`Services`]
pub fn build_services(config: &DaemonConfig) -> std::result::Result<Services, ConfigError> {
    config.validate()?;
    let manager = config.build_manager()?;

    let context = Arc::new(Context::new());
    for (key, value) in &config.context {
        context.set_value(key.clone(), value.clone());
    }

    Ok(Services::new(context, manager)
        .with_backends(backends::simulated(config))
        .with_config(config.core_config()))
}

/// Serve commands from `input` until shutdown
///
/// When `input` reaches end of file the loop keeps running until every
/// active Event has reported, then returns. `shutdown` resolving stops all
/// Events at once.
pub async fn run<R, W, S>(services: Arc<Services>, input: R, mut output: W, shutdown: S) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let (mut daemon, mut signals) = Daemon::new(services);
    daemon.initialize();

    let mut lines = input.lines();
    let mut input_open = true;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line(), if input_open => {
                match line? {
                    Some(line) => {
                        if let Some(response) = handle_line(&mut daemon, &line) {
                            write_response(&mut output, &response).await?;
                        }
                    }
                    None => {
                        input_open = false;
                        tracing::info!("Input closed, waiting for {} active events", daemon.active_count());
                    }
                }
            }

            Some((id, signal)) = signals.recv() => {
                daemon.handle_signal(id, signal);
            }

            _ = &mut shutdown => {
                tracing::info!("Shutdown requested");
                break;
            }
        }

        for report in daemon.take_reports() {
            write_response(&mut output, &Response::from(report)).await?;
        }

        if !input_open && daemon.active_count() == 0 {
            break;
        }
    }

    daemon.shutdown();
    for report in daemon.take_reports() {
        write_response(&mut output, &Response::from(report)).await?;
    }
    output.flush().await?;
    Ok(())
}

/// Apply one command line; returns the immediate response, if any
pub fn handle_line(daemon: &mut Daemon, line: &str) -> Option<Response> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(e) => {
            tracing::warn!("Ignoring malformed command: {}", e);
            return Some(Response::Error {
                message: format!("Invalid command: {}", e),
            });
        }
    };

    match command {
        Command::Play { event, properties } => {
            let id = match daemon.play(&event, properties) {
                Ok(id) => id.as_u32(),
                Err(rejection) => {
                    tracing::info!("Rejected {}: {}", event, rejection);
                    0
                }
            };
            Some(Response::Accepted { id })
        }
        Command::Stop { id } => {
            daemon.stop(RequestId::new(id));
            None
        }
        Command::Pause { id, paused } => {
            daemon.pause(RequestId::new(id), paused);
            None
        }
    }
}

async fn write_response<W>(output: &mut W, response: &Response) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = response.to_line().map_err(std::io::Error::from)?;
    output.write_all(line.as_bytes()).await?;
    output.flush().await?;
    Ok(())
}
