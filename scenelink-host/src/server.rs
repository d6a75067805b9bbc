//! TCP listener and per-connection exchange.
//!
//! Connections are served strictly one at a time: accept, read one
//! command, dispatch it, write one response, close. The next connection
//! is not accepted until the current one is finished, so handlers never
//! run concurrently against the scene.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use scenelink_proto::{ErrorKind, Response};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

use crate::registry::Registry;
use crate::scene::Scene;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// How a single connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Exchange {
    /// A response was written back.
    Responded,
    /// The peer closed before a complete command arrived; nothing was sent.
    PeerClosed,
    /// The response could not be written (peer already gone).
    WriteFailed,
}

/// Command listener bound to a TCP address.
///
/// Owns the scene: nothing else mutates it while the listener runs.
#[derive(Debug)]
pub struct Listener<S> {
    /// Bound socket.
    socket: TcpListener,
    /// Command handlers.
    registry: Registry,
    /// Scene handle threaded into every handler.
    scene: S,
}

impl<S: Scene> Listener<S> {
    /// Binds the listening socket.
    pub async fn bind(addr: impl ToSocketAddrs, registry: Registry, scene: S) -> io::Result<Self> {
        let socket = TcpListener::bind(addr).await?;
        Ok(Self {
            socket,
            registry,
            scene,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// The scene handle.
    pub const fn scene(&self) -> &S {
        &self.scene
    }

    /// Mutable access to the scene handle between exchanges.
    pub const fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    /// The command registry.
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Accepts one connection and serves it to completion.
    ///
    /// Only an `accept` failure is returned as an error; everything that
    /// happens on the connection is reported through [`Exchange`].
    pub async fn serve_one(&mut self) -> io::Result<Exchange> {
        let (stream, peer) = self.socket.accept().await?;
        Ok(self.exchange(stream, peer).await)
    }

    /// Serves connections forever.
    pub async fn run(&mut self) {
        self.run_until(std::future::pending()).await;
    }

    /// Serves connections until `shutdown` resolves.
    ///
    /// Shutdown is only observed between connections; an exchange in
    /// progress always finishes.
    pub async fn run_until(&mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("listener stopping");
                    return;
                }
                accepted = self.socket.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.exchange(stream, peer).await;
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }
    }

    /// Serves one accepted connection.
    async fn exchange(&mut self, mut stream: TcpStream, peer: SocketAddr) -> Exchange {
        debug!(%peer, "connection accepted");

        let response = match scenelink_proto::recv_frame(&mut stream).await {
            Ok(payload) => self.registry.handle(&mut self.scene, &payload),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!(%peer, error = %e, "rejecting malformed frame");
                Response::error(ErrorKind::Decode, format!("malformed command payload: {e}"))
            }
            Err(e) => {
                debug!(%peer, error = %e, "peer closed before a full command arrived");
                return Exchange::PeerClosed;
            }
        };

        if let Err(e) = scenelink_proto::send(&mut stream, &response).await {
            warn!(%peer, error = %e, "failed to write response");
            return Exchange::WriteFailed;
        }
        // The peer may already be gone; the response is out either way.
        let _ = stream.shutdown().await;
        Exchange::Responded
    }
}
