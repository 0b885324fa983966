//! Live stream lifecycle: start, poll, stop.

use super::{parse_args, to_fields};
use crate::envelope::Fields;
use crate::streams::{FrameTicket, StreamInfo};
use crate::tools::context::ToolContext;
use crate::tools::registry::ToolHandler;
use crate::types::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
struct StartArgs {
    stream_type: String,
    frame_rate: f64,
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct StreamIdArgs {
    stream_id: String,
}

#[derive(Debug, Serialize)]
struct StreamReply {
    #[serde(flatten)]
    info: StreamInfo,
    message: String,
}

#[derive(Debug, Serialize)]
struct Frame {
    #[serde(flatten)]
    ticket: FrameTicket,
    width: usize,
    height: usize,
    data: Vec<Vec<f64>>,
}

/// Start a live stream session.
#[derive(Debug, Default, Clone, Copy)]
pub struct StartLiveStream;

#[async_trait]
impl ToolHandler for StartLiveStream {
    async fn call(&self, ctx: &ToolContext, args: Map<String, Value>) -> Result<Fields> {
        let args: StartArgs = parse_args(args)?;
        let info = ctx
            .streams
            .start(&args.stream_type, args.frame_rate, args.duration)
            .await?;
        let message = format!(
            "Live {} stream started with ID {}",
            info.stream_type, info.stream_id
        );
        to_fields(&StreamReply { info, message })
    }
}

/// Fetch the next frame of a live stream.
///
/// The instrument is read between the liveness check and frame assignment
/// with no session lock held; a stop that lands in between wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct GetStreamFrame;

#[async_trait]
impl ToolHandler for GetStreamFrame {
    async fn call(&self, ctx: &ToolContext, args: Map<String, Value>) -> Result<Fields> {
        let args: StreamIdArgs = parse_args(args)?;
        ctx.streams.ensure_live(&args.stream_id).await?;

        let (width, height) = ctx.frame_size;
        let image = ctx.instrument.current_image().await?.resized(width, height)?;

        let ticket = ctx.streams.next_frame(&args.stream_id).await?;
        tracing::trace!(stream_id = %ticket.stream_id, frame_number = ticket.frame_number, "stream_frame");
        to_fields(&Frame {
            ticket,
            width: image.width,
            height: image.height,
            data: image.data,
        })
    }
}

/// Stop a live stream. Stopping twice succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct StopStream;

#[async_trait]
impl ToolHandler for StopStream {
    async fn call(&self, ctx: &ToolContext, args: Map<String, Value>) -> Result<Fields> {
        let args: StreamIdArgs = parse_args(args)?;
        let info = ctx.streams.stop(&args.stream_id).await?;
        let message = format!("Stream {} stopped successfully", info.stream_id);
        to_fields(&StreamReply { info, message })
    }
}
