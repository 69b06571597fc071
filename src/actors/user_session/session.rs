use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};
use uuid::Uuid;

use super::handlers::{self, EventContext};
use crate::actors::chat_store::StoreHandle;
use crate::actors::presence::PresenceMessage;
use crate::actors::room_router::RouterMessage;
use crate::config::Config;
use crate::error::ChatError;
use crate::events::{ClientEvent, ServerEvent};
use crate::identity::{Identity, ProfileResolver};
use crate::metrics::Metrics;
use crate::rate_limit::TokenBucket;

/// Admission check run before dispatch; only write-class events spend a
/// token. A rejection mutates nothing.
pub(crate) fn admit(event: &ClientEvent, bucket: &mut TokenBucket) -> Result<(), ChatError> {
    if event.is_write_class() && !bucket.try_acquire() {
        return Err(ChatError::RateLimited);
    }
    Ok(())
}

/// One live connection: registered in the router, counted as online, fed by
/// its outbound channel, reading inbound frames until either side closes.
pub struct UserSession {
    session_id: Uuid,
    identity: Identity,
    socket: WebSocket,
    router_sender: mpsc::UnboundedSender<RouterMessage>,
    presence_sender: mpsc::UnboundedSender<PresenceMessage>,
    store: StoreHandle,
    profiles: Arc<dyn ProfileResolver>,
    session_receiver: mpsc::Receiver<ServerEvent>,
    session_sender: mpsc::Sender<ServerEvent>,
    bucket: TokenBucket,
}

impl UserSession {
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        socket: WebSocket,
        identity: Identity,
        router_sender: mpsc::UnboundedSender<RouterMessage>,
        presence_sender: mpsc::UnboundedSender<PresenceMessage>,
        store: StoreHandle,
        profiles: Arc<dyn ProfileResolver>,
        config: &Config,
    ) -> Result<Self, ChatError> {
        let session_id = Uuid::new_v4();
        let (session_sender, session_receiver) = mpsc::channel(config.session_buffer);

        // Register with the room router; this also joins the user room and
        // tenant room for the connection's lifetime.
        let (respond_to, response) = oneshot::channel();
        router_sender
            .send(RouterMessage::RegisterSession {
                session_id,
                user_id: identity.user_id.clone(),
                tenant_id: identity.tenant_id.clone(),
                sender: session_sender.clone(),
                respond_to,
            })
            .map_err(|_| ChatError::Internal("room router is gone".to_string()))?;

        match response.await {
            Ok(Ok(())) => {
                debug!("session {session_id} registered for {}", identity.user_id);
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(ChatError::Internal(
                    "room router dropped the registration".to_string(),
                ));
            }
        }

        presence_sender
            .send(PresenceMessage::SetOnline {
                tenant_id: identity.tenant_id.clone(),
                user_id: identity.user_id.clone(),
                is_online: true,
                respond_to: None,
            })
            .map_err(|_| ChatError::Internal("presence tracker is gone".to_string()))?;

        let bucket = TokenBucket::new(config.rate_limit_capacity, config.rate_limit_refill_per_sec);

        Ok(Self {
            session_id,
            identity,
            socket,
            router_sender,
            presence_sender,
            store,
            profiles,
            session_receiver,
            session_sender,
            bucket,
        })
    }

    pub async fn run(self) {
        let UserSession {
            session_id,
            identity,
            socket,
            router_sender,
            presence_sender,
            store,
            profiles,
            mut session_receiver,
            session_sender,
            mut bucket,
        } = self;

        let (mut ws_sender, mut ws_receiver) = socket.split();

        // Outbound: everything the router (or our own handlers) queued for
        // this session goes out as one JSON text frame per event.
        let send_user = identity.user_id.clone();
        let mut send_task = tokio::spawn(async move {
            while let Some(event) = session_receiver.recv().await {
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if ws_sender.send(Message::Text(json.into())).await.is_err() {
                            debug!("websocket send failed for {send_user}, likely disconnected");
                            break;
                        }
                        Metrics::websocket_frame_sent();
                    }
                    Err(e) => {
                        error!("failed to serialize event for {send_user}: {e}");
                    }
                }
            }
        });

        let ctx = EventContext {
            session_id,
            identity: identity.clone(),
            router: router_sender.clone(),
            presence: presence_sender.clone(),
            store,
            profiles,
            reply: session_sender.clone(),
        };

        // Inbound: decode, admit, dispatch. Handler failures answer on the
        // wire and never end the session.
        let mut recv_task = tokio::spawn(async move {
            while let Some(Ok(Message::Text(text))) = ws_receiver.next().await {
                Metrics::websocket_frame_received();

                let event = match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        debug!("unparseable frame from {}: {e}", ctx.identity.user_id);
                        ctx.respond(ServerEvent::Error {
                            message: "unrecognized event".to_string(),
                        })
                        .await;
                        continue;
                    }
                };

                let name = event.name();
                if let Err(e) = admit(&event, &mut bucket) {
                    Metrics::rate_limited(name);
                    ctx.respond(ServerEvent::Error {
                        message: e.wire_message(),
                    })
                    .await;
                    continue;
                }

                match handlers::dispatch(&ctx, event).await {
                    Ok(()) => Metrics::chat_event(name, "ok"),
                    Err(e) => {
                        Metrics::chat_event(name, "error");
                        debug!("{name} from {} failed: {e}", ctx.identity.user_id);
                        ctx.respond(ServerEvent::Error {
                            message: e.wire_message(),
                        })
                        .await;
                    }
                }
            }
        });

        tokio::select! {
            _ = &mut send_task => {
                debug!("send task completed for {}", identity.user_id);
                recv_task.abort();
            }
            _ = &mut recv_task => {
                debug!("receive task completed for {}", identity.user_id);
                send_task.abort();
            }
        }

        // Committed writes stay committed; teardown is presence-off plus
        // leaving every room.
        let _ = presence_sender.send(PresenceMessage::SetOnline {
            tenant_id: identity.tenant_id.clone(),
            user_id: identity.user_id.clone(),
            is_online: false,
            respond_to: None,
        });
        let _ = router_sender.send(RouterMessage::UnregisterSession { session_id });

        debug!("session {session_id} ended for {}", identity.user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageKind;

    #[test]
    fn admission_spends_tokens_only_on_write_class_events() {
        let mut bucket = TokenBucket::new(1, 0.0);
        let typing = ClientEvent::Typing {
            conversation_id: Uuid::new_v4(),
        };
        let send = ClientEvent::SendMessage {
            conversation_id: Uuid::new_v4(),
            content: "hi".to_string(),
            kind: MessageKind::Text,
            file_data: None,
        };

        // Read-class events never drain the bucket.
        for _ in 0..10 {
            assert!(admit(&typing, &mut bucket).is_ok());
        }
        assert!(admit(&send, &mut bucket).is_ok());
        assert!(matches!(
            admit(&send, &mut bucket),
            Err(ChatError::RateLimited)
        ));
        // Non-write events still pass after exhaustion.
        assert!(admit(&typing, &mut bucket).is_ok());
    }
}
