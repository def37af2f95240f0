use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{TransportFactory, TransportSink, TransportStream};
use crate::types::error::{RealtimeError, Result};
use crate::types::message::EventMessage;

/// WebSocket transport: JSON text frames in both directions.
pub struct WebSocketFactory;

impl TransportFactory for WebSocketFactory {
    fn connect<'a>(
        &'a self,
        url: &'a str,
    ) -> BoxFuture<'a, Result<(TransportSink, TransportStream)>> {
        Box::pin(async move {
            tracing::debug!(url, "opening WebSocket connection");
            let (ws_stream, _response) = connect_async(url).await?;
            let (write_half, read_half) = ws_stream.split();

            let sink: TransportSink = Box::pin(write_half.with(|message: EventMessage| {
                async move {
                    let json = serde_json::to_string(&message)?;
                    Ok::<Message, RealtimeError>(Message::Text(json.into()))
                }
            }));

            let stream: TransportStream = Box::pin(read_half.filter_map(|item| async move {
                match item {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<EventMessage>(text.as_str()) {
                            Ok(message) => Some(Ok(message)),
                            Err(e) => {
                                tracing::error!(error = %e, raw = %text, "failed to parse inbound message");
                                None
                            }
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|f| format!("code={}, reason={}", f.code, f.reason))
                            .unwrap_or_else(|| "no close frame".to_string());
                        Some(Err(RealtimeError::Connection(format!(
                            "server closed connection: {reason}"
                        ))))
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
                    Ok(Message::Binary(data)) => {
                        tracing::warn!(bytes = data.len(), "ignoring unexpected binary message");
                        None
                    }
                    Err(e) => Some(Err(RealtimeError::WebSocket(e))),
                }
            }));

            Ok((sink, stream))
        })
    }
}
