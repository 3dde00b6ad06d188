use crate::context::AppContext;
use crate::router;
use crate::subsystems::broadcast::{SubscriberId, Topic};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::path::Path;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use waymark_core::ipc::{TrackPush, TrackRequest, TrackResponse};

pub async fn run_unix_server(
    socket_path: &str,
    ctx: AppContext,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    tracing::info!("IPC Server listening on {}", socket_path);

    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, _) = res?;
                let ctx = ctx.clone();
                tokio::spawn(handle_connection(stream, ctx));
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutting down IPC server...");
                break;
            }
        }
    }

    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    Ok(())
}

/// One task per connection. Responses and broadcast pushes are multiplexed
/// onto the same socket by a dedicated writer task; a dropped connection
/// simply ends both loops and tears down its subscription.
async fn handle_connection(stream: UnixStream, ctx: AppContext) {
    let (read, write) = stream.into_split();
    // Wire format: 4-byte Little Endian length prefix + MessagePack payload
    let le_codec = || LengthDelimitedCodec::builder().little_endian().new_codec();
    let mut framed_read = FramedRead::new(read, le_codec());
    let mut framed_write = FramedWrite::new(write, le_codec());

    let queue_capacity = ctx.config.broadcast.queue_capacity;
    let (resp_tx, mut resp_rx) = mpsc::channel::<TrackResponse>(queue_capacity);
    let (push_tx, mut push_rx) = mpsc::channel::<TrackPush>(queue_capacity);

    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                maybe_resp = resp_rx.recv() => {
                    match maybe_resp {
                        Some(resp) => {
                            if write_frame(&mut framed_write, &resp).await.is_err() {
                                break;
                            }
                        }
                        // Reader is done; no more responses will come.
                        None => break,
                    }
                }
                Some(push) = push_rx.recv() => {
                    if write_frame(&mut framed_write, &push).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut subscription: Option<SubscriberId> = None;

    while let Some(frame) = framed_read.next().await {
        match frame {
            Ok(bytes_mut) => {
                let request: TrackRequest = match rmp_serde::from_slice(&bytes_mut) {
                    Ok(req) => req,
                    Err(e) => {
                        let resp = TrackResponse::err(format!("Deserialization error: {}", e));
                        if resp_tx.send(resp).await.is_err() {
                            break;
                        }
                        continue;
                    }
                };

                let response = match request {
                    TrackRequest::Subscribe { topics } => {
                        if let Some(id) = subscription.take() {
                            ctx.broadcaster.unsubscribe(id).await;
                        }
                        let topics: Vec<Topic> = topics.iter().map(Topic::from).collect();
                        let id = ctx.broadcaster.subscribe(topics, push_tx.clone()).await;
                        subscription = Some(id);
                        TrackResponse::ok(serde_json::json!({"subscribed": true}))
                    }
                    TrackRequest::Unsubscribe => {
                        if let Some(id) = subscription.take() {
                            ctx.broadcaster.unsubscribe(id).await;
                        }
                        TrackResponse::ok(serde_json::json!({"subscribed": false}))
                    }
                    other => router::handle_request(other, &ctx).await,
                };

                if resp_tx.send(response).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::error!("Frame error: {}", e);
                break;
            }
        }
    }

    if let Some(id) = subscription {
        ctx.broadcaster.unsubscribe(id).await;
    }

    // Closing the response channel lets the writer drain and exit.
    drop(resp_tx);
    drop(push_tx);
    let _ = writer.await;
}

async fn write_frame<W, T>(
    framed: &mut FramedWrite<W, LengthDelimitedCodec>,
    message: &T,
) -> Result<(), ()>
where
    W: tokio::io::AsyncWrite + Unpin,
    T: Serialize,
{
    match rmp_serde::to_vec_named(message) {
        Ok(bytes) => {
            if let Err(e) = framed.send(Bytes::from(bytes)).await {
                tracing::error!("Failed to send frame: {}", e);
                return Err(());
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Failed to serialize frame: {}", e);
            Err(())
        }
    }
}
