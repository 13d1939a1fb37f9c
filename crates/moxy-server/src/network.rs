//! The per-connection request loop.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use moxy_wire::{decode, encode, ResponseSink, WireError};

use crate::error::Result;
use crate::modules::Pipeline;

/// Drive one client connection to completion.
///
/// Each iteration decodes one request, runs it through the pipeline with
/// a fresh sink, and writes back whatever response the chain produced.
/// Requests are strictly serial within a connection, so responses go out
/// in arrival order. Returns `Ok` on clean end-of-stream; any framing,
/// encoding, or write error tears the connection down.
pub async fn handle_connection<S>(mut stream: S, pipeline: Pipeline) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    loop {
        let (request, header) = match decode(&mut stream).await {
            Ok(decoded) => decoded,
            Err(WireError::ConnectionClosed) => {
                tracing::debug!("client closed the connection");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        tracing::trace!(
            request_id = header.request_id,
            op_code = header.op_code,
            "decoded request"
        );

        let mut sink = ResponseSink::new();
        pipeline.dispatch(&request, &mut sink).await;

        // Some requests legitimately get no reply (fire-and-forget write
        // opcodes); skip the write and wait for the next frame.
        let Some(response) = sink.into_response() else {
            continue;
        };

        let frame = encode(&header, &response)?;
        stream.write_all(&frame).await?;
    }
}
