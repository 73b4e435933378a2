//! WebSocket transport so the session core reaches real backends out of the box.
//!
//! Bridges the async socket into the synchronous session loop: inbound text
//! frames are decoded to [`TransportEvent`]s and pushed onto the loop's
//! channel, outbound payloads are queued from the session thread and written
//! by a tokio task. `close` is fire-and-forget; the epoch check at the session
//! loop neutralizes anything a dying task still delivers.

use anyhow::{bail, Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tungstenite::Message;

use super::{ClientPayload, Transport, TransportEvent, TransportSender};

pub struct WsTransport {
    url: String,
    runtime: Runtime,
    outbound: Option<UnboundedSender<Message>>,
    task: Option<JoinHandle<()>>,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let runtime = Runtime::new().context("failed to start websocket runtime")?;
        Ok(Self {
            url: url.into(),
            runtime,
            outbound: None,
            task: None,
        })
    }

    fn abandon_task(&mut self) {
        self.outbound = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Transport for WsTransport {
    fn open(&mut self, events: TransportSender) -> Result<()> {
        // One attempt at a time; a still-running predecessor is abandoned.
        self.abandon_task();

        let (outbound_tx, mut outbound_rx) = unbounded_channel::<Message>();
        self.outbound = Some(outbound_tx);
        let url = self.url.clone();

        let task = self.runtime.spawn(async move {
            let stream = match connect_async(url.as_str()).await {
                Ok((stream, _response)) => {
                    events.send(TransportEvent::Opened);
                    stream
                }
                Err(err) => {
                    events.send(TransportEvent::Failed {
                        reason: err.to_string(),
                    });
                    return;
                }
            };
            let (mut sink, mut source) = stream.split();

            loop {
                tokio::select! {
                    outgoing = outbound_rx.recv() => {
                        match outgoing {
                            Some(message) => {
                                if let Err(err) = sink.send(message).await {
                                    events.send(TransportEvent::Error {
                                        reason: err.to_string(),
                                    });
                                    break;
                                }
                            }
                            // Sender dropped: the session asked for a close.
                            None => {
                                let _ = sink.send(Message::Close(None)).await;
                                break;
                            }
                        }
                    }
                    incoming = source.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<TransportEvent>(&text) {
                                    Ok(event) => {
                                        if !events.send(event) {
                                            break;
                                        }
                                    }
                                    Err(err) => {
                                        tracing::debug!(
                                            error = %err,
                                            "dropping unparseable backend frame"
                                        );
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                events.send(TransportEvent::Closed);
                                break;
                            }
                            // Control and binary frames carry nothing for us.
                            Some(Ok(_)) => {}
                            Some(Err(err)) => {
                                events.send(TransportEvent::Error {
                                    reason: err.to_string(),
                                });
                                break;
                            }
                        }
                    }
                }
            }
        });
        self.task = Some(task);
        Ok(())
    }

    fn send(&mut self, payload: ClientPayload) -> Result<()> {
        let Some(outbound) = self.outbound.as_ref() else {
            bail!("transport is not open");
        };
        let json = serde_json::to_string(&payload).context("failed to encode payload")?;
        if outbound.send(Message::Text(json)).is_err() {
            bail!("transport connection is gone");
        }
        Ok(())
    }

    fn close(&mut self) {
        self.abandon_task();
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.abandon_task();
    }
}
