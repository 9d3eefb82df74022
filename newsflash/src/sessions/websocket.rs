use rocket::futures::{SinkExt, StreamExt};
use rocket::{get, State};
use rocket_ws::{Channel, Message, WebSocket};
use tracing::{debug, error, info, warn};

use crate::item::AlertMessage;

/// WebSocket subscriber endpoint. Each connection is one session; breaking
/// alerts are pushed as JSON text frames until either side closes.
#[get("/alerts")]
pub fn alerts_websocket(ws: WebSocket, state: &State<crate::server::AppState>) -> Channel<'static> {
    let registry = state.registry.clone();

    ws.channel(move |mut stream| {
        Box::pin(async move {
            let session_id = uuid::Uuid::new_v4().to_string();
            let mut subscription = match registry.on_connect(session_id.clone()) {
                Ok(sub) => sub,
                Err(e) => {
                    error!(session = %session_id, error = %e, "failed to register subscriber");
                    return Ok(());
                }
            };

            loop {
                tokio::select! {
                    alert = subscription.recv() => {
                        let Some(item) = alert else {
                            info!(session = %session_id, "session removed from registry");
                            break;
                        };
                        let text = match serde_json::to_string(&AlertMessage::from(item.as_ref())) {
                            Ok(text) => text,
                            Err(e) => {
                                error!(item = %item.id, error = %e, "failed to encode alert");
                                continue;
                            }
                        };
                        if let Err(e) = stream.send(Message::Text(text)).await {
                            warn!(session = %session_id, item = %item.id, error = %e, "failed to send alert");
                            break;
                        }
                    }
                    incoming = stream.next() => match incoming {
                        Some(Ok(Message::Close(_))) | None => {
                            info!(session = %session_id, "WebSocket closed");
                            break;
                        }
                        Some(Ok(_)) => {
                            debug!(session = %session_id, "ignoring client frame");
                        }
                        Some(Err(e)) => {
                            warn!(session = %session_id, error = %e, "WebSocket error");
                            break;
                        }
                    }
                }
            }

            // Unregisters the session
            drop(subscription);
            Ok(())
        })
    })
}
