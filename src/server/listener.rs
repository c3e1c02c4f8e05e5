// ABOUTME: Accepts sockets on every configured endpoint and hands each to a fresh Connection
// ABOUTME: New relative to the teacher (SMPP is client-only); one accept task per endpoint, same idiom across the pack's RPC servers

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::connection::Connection;
use crate::error::{ServerError, ServerResult};
use crate::frame::RequestFrame;
use crate::server::router::Router;

pub type SessionNotify = Arc<dyn Fn(&str) + Send + Sync>;

/// Bind every endpoint in `endpoints` and run an accept loop per listener
/// until every one of them returns (which in practice means until the
/// process is torn down; a bind failure surfaces immediately as a
/// propagated error, per spec.md §7).
pub async fn run(
    endpoints: Vec<SocketAddr>,
    router: Arc<Router>,
    connect_notify: Option<SessionNotify>,
    disconnect_notify: Option<SessionNotify>,
) -> ServerResult<()> {
    if endpoints.is_empty() {
        return Err(ServerError::NoEndpoints);
    }

    let mut listeners = Vec::with_capacity(endpoints.len());
    for addr in &endpoints {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr: *addr, source })?;
        tracing::debug!(%addr, "listening");
        listeners.push(listener);
    }

    let tasks: Vec<_> = listeners
        .into_iter()
        .map(|listener| {
            tokio::spawn(accept_loop(
                listener,
                router.clone(),
                connect_notify.clone(),
                disconnect_notify.clone(),
            ))
        })
        .collect();

    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

async fn accept_loop(
    listener: TcpListener,
    router: Arc<Router>,
    connect_notify: Option<SessionNotify>,
    disconnect_notify: Option<SessionNotify>,
) {
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(error) => {
                tracing::warn!(%error, "accept failed");
                continue;
            }
        };

        let dispatch_router = router.clone();
        let disconnect_router = router.clone();
        let disconnect_notify = disconnect_notify.clone();

        let conn = Connection::<RequestFrame>::start(
            socket,
            move |frame, conn| {
                let router = dispatch_router.clone();
                async move { router.handle(frame, conn).await }
            },
            move |conn| {
                disconnect_router.topics().remove_all(conn);
                if let Some(notify) = &disconnect_notify {
                    notify(conn.session_id());
                }
            },
        );

        match conn {
            Ok(conn) => {
                tracing::debug!(session = conn.session_id(), %peer, "accepted connection");
                if let Some(notify) = &connect_notify {
                    notify(conn.session_id());
                }
            }
            Err(error) => tracing::warn!(%peer, %error, "failed to start accepted connection"),
        }
    }
}
