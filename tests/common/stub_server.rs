//! Loopback HTTP server serving canned responses to the clients under test.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;

/// Serves `router` on an ephemeral loopback port and returns its base URL.
pub async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap_or_else(|err| panic!("bind stub listener: {err}"));
    let address = listener
        .local_addr()
        .unwrap_or_else(|err| panic!("read stub address: {err}"));
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{address}")
}
