use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::config::SessionConfig;
use crate::error::SignalingError;
use crate::events::{ChatMode, ClientRequest, ServerEvent};
use crate::logger::log;

/// What the controller sees coming out of the channel.
pub enum ChannelEvent {
    Event(ServerEvent),
    /// The transport closed or failed. Reported exactly once; the channel is
    /// never reopened automatically.
    Lost,
}

/// Persistent, ordered, bidirectional transport to the matchmaking server.
///
/// Outbound requests go through an unbounded queue drained by a writer task;
/// inbound frames are parsed and forwarded in arrival order by a reader task.
/// Dropping every outbound sender closes the websocket with a Close frame.
pub struct SignalingChannel {
    outbound: mpsc::UnboundedSender<ClientRequest>,
    inbound: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl SignalingChannel {
    /// Opens `{server_url}/ws/{nickname}/{mode}`. The server derives session
    /// identity from this connection; there is no separate login step.
    pub async fn connect(
        config: &SessionConfig,
        nickname: &str,
        mode: ChatMode,
    ) -> Result<Self, SignalingError> {
        let url = endpoint_url(&config.server_url, nickname, mode)?;
        log(&format!("Connecting signaling channel: {}", url));

        let (ws, _response) = connect_async(url.as_str()).await?;
        let (mut write, mut read) = ws.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientRequest>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<ChannelEvent>();

        tokio::spawn(async move {
            while let Some(req) = out_rx.recv().await {
                let text = match serde_json::to_string(&req) {
                    Ok(text) => text,
                    Err(e) => {
                        log(&format!("Failed to serialize request: {e}"));
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(text)).await {
                    log(&format!("Signaling send failed: {e}"));
                    break;
                }
            }
            // all senders gone: orderly shutdown
            let _ = write.send(Message::Close(None)).await;
        });

        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if in_tx.send(ChannelEvent::Event(event)).is_err() {
                                return;
                            }
                        }
                        Err(e) => log(&format!("Skipping unparsable signaling frame: {e}")),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        log(&format!("Signaling read failed: {e}"));
                        break;
                    }
                }
            }
            let _ = in_tx.send(ChannelEvent::Lost);
        });

        Ok(SignalingChannel {
            outbound: out_tx,
            inbound: in_rx,
        })
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<ClientRequest> {
        self.outbound.clone()
    }

    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<ClientRequest>,
        mpsc::UnboundedReceiver<ChannelEvent>,
    ) {
        (self.outbound, self.inbound)
    }
}

fn endpoint_url(base: &str, nickname: &str, mode: ChatMode) -> Result<Url, SignalingError> {
    let mut url = Url::parse(base)?;
    url.path_segments_mut()
        .map_err(|_| SignalingError::CannotBeABase)?
        .push("ws")
        .push(nickname)
        .push(mode.as_str());
    Ok(url)
}
