//! TCP accept front end.
//!
//! Binds the listen socket, accepts clients, and runs one session
//! task per connection. The hardware access layer is shared with
//! every session as a read-only borrow; each session opens its own
//! view of the memory device for dump-ring mappings.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::TcpSocket;
use tracing::{error, info, info_span, warn, Instrument};

use framedump_core::{CaptureBoard, Session, StreamError};

use crate::config::ServerConfig;

/// The stream server: listener plus shared hardware access.
pub struct StreamServer {
    config: ServerConfig,
    port: u16,
    board: Arc<dyn CaptureBoard>,
    running: Arc<AtomicBool>,
}

impl StreamServer {
    pub fn new(config: ServerConfig, port: u16, board: Arc<dyn CaptureBoard>) -> Self {
        Self {
            config,
            port,
            board,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Obtain a handle that stops the accept loop from another task
    /// (the ctrl-c handler).
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Accept and serve clients until stopped.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.running.store(true, Ordering::SeqCst);

        let addr: SocketAddr = format!("{}:{}", self.config.network.bind, self.port).parse()?;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        // Reuse the port after an unexpected exit.
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(self.config.network.backlog)?;
        info!("stream server listening on {addr}");

        while self.running.load(Ordering::SeqCst) {
            let accept = tokio::select! {
                result = listener.accept() => result,
                _ = Self::wait_for_stop(&self.running) => break,
            };

            let (stream, peer) = match accept {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {e}");
                    continue;
                }
            };
            info!("client connected from {peer}");

            let board = Arc::clone(&self.board);
            let mem_device = self.config.capture.mem_device.clone();
            tokio::spawn(
                async move {
                    let mut session = match Session::open(stream, board, &mem_device) {
                        Ok(session) => session,
                        Err(e) => {
                            error!("cannot start session: {e}");
                            return;
                        }
                    };
                    match session.run().await {
                        Ok(()) | Err(StreamError::Disconnected) => info!("session ended"),
                        Err(e) => error!("session failed: {e}"),
                    }
                }
                .instrument(info_span!("session", %peer)),
            );
        }

        self.running.store(false, Ordering::SeqCst);
        info!("stream server stopped");
        Ok(())
    }

    /// Signal the server to stop accepting.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Async helper: resolves when `running` becomes false.
    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }
}
