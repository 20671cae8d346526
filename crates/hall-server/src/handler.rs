//! Per-connection handler: lifecycle hooks, request dispatch, replies.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register the connection with the hall and open its outbound queue
//!   2. Spawn the writer task that drains the queue into the socket
//!   3. Loop: receive frames, dispatch each request in its own task
//!   4. On close, unregister everything (see [`ConnectionGuard`])

use std::sync::Arc;

use hall::{
    AnnouncementSource, BalanceStore, HallError, LedgerStore, MODULE_NAME, ProfileCache, Reply,
    RequestContext, UserService,
};
use hall_protocol::{Codec, ConnectionId, Message};
use hall_transport::{Connection, WebSocketConnection};

use crate::ServerError;
use crate::server::ServerState;

/// Unregisters a connection when the handler exits, even on panic.
///
/// Both cleanup calls are synchronous, so they run directly in `drop`.
struct ConnectionGuard<U, S, B, L, P> {
    id: ConnectionId,
    state: Arc<ServerState<U, S, B, L, P>>,
}

impl<U, S, B, L, P> Drop for ConnectionGuard<U, S, B, L, P> {
    fn drop(&mut self) {
        self.state.outbound.unregister(&self.id);
        self.state.hall.on_disconnect(&self.id);
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<U, S, B, L, P>(
    conn: WebSocketConnection,
    state: Arc<ServerState<U, S, B, L, P>>,
) -> Result<(), ServerError>
where
    U: UserService,
    S: AnnouncementSource,
    B: BalanceStore,
    L: LedgerStore,
    P: ProfileCache,
{
    let conn = Arc::new(conn);
    let id = conn.id();
    tracing::debug!(connection_id = %id, "handling new connection");

    state.hall.on_connect(&id);
    let mut outbound = state.outbound.register(&id);
    let _guard = ConnectionGuard {
        id: id.clone(),
        state: Arc::clone(&state),
    };

    let writer = {
        let conn = Arc::clone(&conn);
        let id = id.clone();
        tokio::spawn(async move {
            while let Some(frame) = outbound.recv().await {
                if let Err(e) = conn.send(&frame).await {
                    tracing::debug!(connection_id = %id, error = %e, "write failed");
                    break;
                }
            }
        })
    };

    let result = loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!(connection_id = %id, "connection closed cleanly");
                break Ok(());
            }
            Err(e) => break Err(ServerError::Transport(e)),
        };

        let request: Message = match state.codec.decode(&data) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "failed to decode frame");
                continue;
            }
        };

        let state = Arc::clone(&state);
        let id = id.clone();
        tokio::spawn(async move {
            handle_request(&state, id, request).await;
        });
    };

    writer.abort();
    result
}

/// Runs one request and queues its reply frame.
async fn handle_request<U, S, B, L, P>(
    state: &ServerState<U, S, B, L, P>,
    id: ConnectionId,
    request: Message,
) where
    U: UserService,
    S: AnnouncementSource,
    B: BalanceStore,
    L: LedgerStore,
    P: ProfileCache,
{
    let Message {
        module,
        route,
        data,
        reply: correlation_id,
    } = request;
    tracing::debug!(connection_id = %id, %module, %route, "request");

    let reply = if module == MODULE_NAME {
        let (ctx, rx) = RequestContext::new(id.clone(), data);
        state.hall.dispatch(&route, ctx).await;
        match rx.await {
            Ok(reply) => reply,
            Err(_) => {
                tracing::warn!(connection_id = %id, %route, "handler finished without replying");
                Reply::ServerError(HallError::ReplyDropped.to_string())
            }
        }
    } else {
        let err = HallError::InvalidArgument(format!("unknown module {module}"));
        tracing::warn!(connection_id = %id, error = %err, "request rejected");
        Reply::ServerError(err.to_string())
    };

    let data = match reply.encode(&state.codec) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(connection_id = %id, error = %e, "failed to encode reply");
            return;
        }
    };
    if let Err(e) = state
        .outbound
        .send_message(&id, &route, data, &correlation_id)
        .await
    {
        tracing::debug!(connection_id = %id, error = %e, "reply not delivered");
    }
}
