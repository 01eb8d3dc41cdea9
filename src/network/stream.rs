use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::ListenerState;
use super::config::ListenerConfig;
use super::connection::{ConnectionReader, TransferOutcome};
use crate::error::{Error, Result};
use crate::infrastructure::events::EventPublisher;

/// Connection-oriented listener.
///
/// A single task polls for pending connections and sleeps for the configured
/// interval when there are none. Every accepted connection is read by its own task.
pub struct StreamListener {
    config: ListenerConfig,
    events: EventPublisher,
    state: ListenerState,
    local_addr: Option<SocketAddr>,
    keep_running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl StreamListener {
    pub fn new(config: ListenerConfig, events: EventPublisher) -> Self {
        Self {
            config,
            events,
            state: ListenerState::Stopped,
            local_addr: None,
            keep_running: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ListenerState::Running
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind and spawn the accept loop, returning the bound address
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if self.state != ListenerState::Stopped {
            return Err(Error::AlreadyRunning);
        }
        self.state = ListenerState::Starting;

        let bound = match TcpListener::bind(self.config.bind_addr()).await {
            Ok(listener) => listener.local_addr().map(|addr| (listener, addr)),
            Err(e) => Err(e),
        };
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                self.state = ListenerState::Stopped;
                return Err(e.into());
            }
        };

        self.keep_running.store(true, Ordering::SeqCst);
        let reader = ConnectionReader::new(&self.config.download_dir, self.events.clone());
        self.task = Some(tokio::spawn(accept_loop(
            listener,
            reader,
            self.keep_running.clone(),
            self.config.poll_interval,
        )));

        self.local_addr = Some(local_addr);
        self.state = ListenerState::Running;
        info!("Stream listener running on {}", local_addr);
        Ok(local_addr)
    }

    /// Ask the loop to exit and wait for it; takes effect within one poll interval
    pub async fn stop(&mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Stream listener task ended abnormally: {}", e);
            }
        }
        if self.state != ListenerState::Stopped {
            info!("Stream listener stopped");
        }
        self.local_addr = None;
        self.state = ListenerState::Stopped;
    }
}

impl Drop for StreamListener {
    fn drop(&mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
    }
}

async fn accept_loop(
    listener: TcpListener,
    reader: ConnectionReader,
    keep_running: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    while keep_running.load(Ordering::SeqCst) {
        match listener.accept().now_or_never() {
            Some(Ok((stream, peer))) => {
                debug!("Accepted connection from {}", peer);
                tokio::spawn(handle_connection(reader.clone(), stream, peer));
            }
            Some(Err(e)) => {
                // The listener stays up; the failure is only logged
                warn!("Failed to accept connection: {}", e);
                tokio::time::sleep(poll_interval).await;
            }
            None => tokio::time::sleep(poll_interval).await,
        }
    }
    debug!("Accept loop exited");
}

async fn handle_connection(reader: ConnectionReader, stream: TcpStream, peer: SocketAddr) {
    let mut stream = BufReader::new(stream);
    match reader.read_transfer(&mut stream).await {
        Ok(TransferOutcome::Messages(count)) => {
            debug!("Received {} message packet(s) from {}", count, peer)
        }
        Ok(TransferOutcome::File(path)) => debug!("Received {} from {}", path.display(), peer),
        Err(e) => warn!("Transfer from {} failed: {}", peer, e),
    }
}
