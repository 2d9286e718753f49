//! TCP Server
//!
//! Accepts connections and gives each its own thread.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::sync::WaitGroup;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::Result;

use super::connection::CommandExecutor;
use super::handler::ConnectionHandler;

/// Sleep between accept attempts while no client is waiting
const ACCEPT_POLL: Duration = Duration::from_millis(25);

/// TCP server for the mock
pub struct Server {
    config: Config,
    executor: Arc<dyn CommandExecutor + Send + Sync>,
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
}

/// Decrements the active connection count when a connection thread ends
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Server {
    /// Bind the listen address and create a server around `engine`
    pub fn new(config: Config, engine: Arc<Engine>) -> Result<Self> {
        Self::with_executor(config, engine)
    }

    /// Bind the listen address and serve frames to any executor
    pub fn with_executor(
        config: Config,
        executor: Arc<dyn CommandExecutor + Send + Sync>,
    ) -> Result<Self> {
        config.validate()?;
        let listener = TcpListener::bind(&config.listen_addr)?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            config,
            executor,
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Start the server (blocking)
    ///
    /// Returns after [`Self::shutdown`] once every connection thread ended.
    pub fn run(&self) -> Result<()> {
        tracing::info!("Listening on {}", self.local_addr()?);
        let wg = WaitGroup::new();

        while !self.shutdown.load(Ordering::Acquire) {
            let (stream, addr) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                    continue;
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    continue;
                }
            };

            if self.active.load(Ordering::Acquire) >= self.config.max_connections {
                tracing::warn!(
                    "Refusing {}: {} connections already open",
                    addr,
                    self.config.max_connections
                );
                drop(stream);
                continue;
            }

            if let Err(e) = stream.set_nonblocking(false) {
                tracing::warn!("Dropping {}: {}", addr, e);
                continue;
            }

            let mut handler = match ConnectionHandler::new(
                stream,
                Arc::clone(&self.executor),
                &self.config,
                Arc::clone(&self.shutdown),
            ) {
                Ok(handler) => handler,
                Err(e) => {
                    tracing::warn!("Dropping {}: {}", addr, e);
                    continue;
                }
            };

            self.active.fetch_add(1, Ordering::AcqRel);
            let guard = ActiveGuard(Arc::clone(&self.active));
            let wg = wg.clone();

            let spawned = thread::Builder::new()
                .name(format!("conn-{}", addr))
                .spawn(move || {
                    // Dropped in reverse: the count falls before the wait group is released
                    let _wg = wg;
                    let _guard = guard;
                    if let Err(e) = handler.handle() {
                        tracing::debug!(
                            "Connection {} ended with error: {}",
                            handler.peer_addr(),
                            e
                        );
                    }
                    tracing::debug!(
                        "Connection {} closed after {} frames",
                        handler.peer_addr(),
                        handler.frames_processed()
                    );
                });
            if let Err(e) = spawned {
                tracing::warn!("Could not spawn thread for {}: {}", addr, e);
            }
        }

        tracing::info!("Shutting down, waiting for {} connections", self.active_connections());
        wg.wait();
        tracing::info!("Server stopped");
        Ok(())
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Flag that stops the server when set, for use from another thread
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }
}
