use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::ListenerState;
use super::config::ListenerConfig;
use crate::error::{Error, Result};
use crate::infrastructure::events::{EventPublisher, TransferEvent};
use crate::protocol::Packet;

// Large enough for any UDP payload
const RECV_BUFFER_SIZE: usize = 65_536;

/// Connectionless listener.
///
/// Datagrams are handled one after another in a single task. Each one is a whole
/// packet and is published as a message whatever its kind; file transfers are
/// not reassembled on this transport.
pub struct DatagramListener {
    config: ListenerConfig,
    events: EventPublisher,
    state: ListenerState,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl DatagramListener {
    pub fn new(config: ListenerConfig, events: EventPublisher) -> Self {
        Self {
            config,
            events,
            state: ListenerState::Stopped,
            local_addr: None,
            shutdown_tx: None,
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

    pub async fn start(&mut self) -> Result<SocketAddr> {
        if self.state != ListenerState::Stopped {
            return Err(Error::AlreadyRunning);
        }
        self.state = ListenerState::Starting;

        let bound = match UdpSocket::bind(self.config.bind_addr()).await {
            Ok(socket) => socket.local_addr().map(|addr| (socket, addr)),
            Err(e) => Err(e),
        };
        let (socket, local_addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                self.state = ListenerState::Stopped;
                return Err(e.into());
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(tokio::spawn(receive_loop(
            socket,
            self.events.clone(),
            shutdown_rx,
        )));

        self.local_addr = Some(local_addr);
        self.state = ListenerState::Running;
        info!("Datagram listener running on {}", local_addr);
        Ok(local_addr)
    }

    /// Interrupt the pending receive and close the socket
    pub async fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Datagram listener task ended abnormally: {}", e);
            }
        }
        if self.state != ListenerState::Stopped {
            info!("Datagram listener stopped");
        }
        self.local_addr = None;
        self.state = ListenerState::Stopped;
    }
}

async fn receive_loop(
    socket: UdpSocket,
    events: EventPublisher,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, peer)) => match Packet::decode(&buf[..len]) {
                    Ok(packet) => {
                        debug!("Datagram from {}: {}", peer, packet);
                        events.publish(TransferEvent::MessageReceived(packet));
                    }
                    Err(e) => debug!("Dropping datagram from {}: {}", peer, e),
                },
                Err(e) => debug!("Datagram receive failed: {}", e),
            },
        }
    }
    debug!("Receive loop exited");
}
