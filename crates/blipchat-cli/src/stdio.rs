//! Host method channel over newline-delimited JSON
//!
//! Each input line is a [`MethodCall`]; each call gets exactly one
//! [`MethodResponse`] line back. [`HostEvent`]s are interleaved as their own
//! lines whenever the session produces them.

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use blipchat_core::host::CHANNEL_NAME;
use blipchat_core::{HostChannel, HostError, HostErrorCode, HostEvent, MethodCall, MethodResponse, SessionEvents};

use crate::error::Result;

/// Serve `channel` until `input` reaches end of file, then stop the session
pub async fn serve<R, W>(channel: HostChannel, mut events: SessionEvents, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut events_open = true;
    info!("Serving {} over JSON lines", CHANNEL_NAME);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading method call")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let response = respond(&channel, &line).await;
                write_line(&mut output, &serde_json::to_string(&response)?).await?;
            }
            event = events.recv(), if events_open => {
                let Some(event) = event else {
                    events_open = false;
                    continue;
                };
                if let Some(event) = HostEvent::from_session(event) {
                    write_line(&mut output, &serde_json::to_string(&event)?).await?;
                }
            }
        }
    }

    info!("Host input closed, stopping session");
    channel.session().stop().await;
    Ok(())
}

async fn respond(channel: &HostChannel, line: &str) -> MethodResponse {
    match serde_json::from_str::<MethodCall>(line) {
        Ok(call) => channel.handle(&call).await.into(),
        Err(e) => {
            debug!("Unparseable method call: {}", e);
            MethodResponse::Error(HostError::new(
                HostErrorCode::InvalidArguments,
                format!("Malformed method call: {}", e),
            ))
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, line: &str) -> Result<()> {
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}
