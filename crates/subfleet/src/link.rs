use async_trait::async_trait;
use mavlink::common::MavMessage;
use mavlink::peek_reader::PeekReader;
use mavlink::MavHeader;
use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::RwLock;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("link closed")]
    Closed,
    #[error("no route to system {0}")]
    UnknownPeer(u8),
    #[error("codec: {0}")]
    Codec(String),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// One outbound frame as observed on a loopback link.
#[derive(Debug, Clone)]
pub struct LinkFrame {
    pub target_system: u8,
    pub header: MavHeader,
    pub message: MavMessage,
}

/// Transport boundary of the controller: one process-wide receive stream
/// plus a writer keyed by target system id.
///
/// Implementations frame and unframe MAVLink v2; the controller never sees
/// raw bytes.
#[async_trait]
pub trait MavLink: Send + Sync {
    async fn recv(&self) -> Result<(MavHeader, MavMessage), LinkError>;

    async fn send_to(
        &self,
        target_system: u8,
        header: &MavHeader,
        message: &MavMessage,
    ) -> Result<(), LinkError>;
}

// ---------------------------------------------------------------------------
// UDP
// ---------------------------------------------------------------------------

/// Shared-subnet UDP transport. Each vehicle's address is learned from its
/// first inbound frame; outbound frames are routed by that peer table.
/// Datagrams from outside the configured /24 subnet are dropped.
pub struct UdpLink {
    socket: UdpSocket,
    subnet: Option<Ipv4Addr>,
    peers: RwLock<HashMap<u8, SocketAddr>>,
    pending: Mutex<VecDeque<(MavHeader, MavMessage)>>,
}

impl UdpLink {
    pub async fn bind(addr: &str) -> Result<Self, LinkError> {
        Self::bind_with_subnet(addr, None).await
    }

    pub async fn bind_with_subnet(
        addr: &str,
        subnet: Option<Ipv4Addr>,
    ) -> Result<Self, LinkError> {
        let socket = UdpSocket::bind(addr).await?;
        debug!(%addr, ?subnet, "UDP transport bound");
        Ok(Self {
            socket,
            subnet,
            peers: RwLock::new(HashMap::new()),
            pending: Mutex::new(VecDeque::new()),
        })
    }

    fn on_subnet(&self, addr: &SocketAddr) -> bool {
        let Some(subnet) = self.subnet else {
            return true;
        };
        match addr {
            SocketAddr::V4(v4) => v4.ip().octets()[..3] == subnet.octets()[..3],
            SocketAddr::V6(_) => false,
        }
    }

    /// Decodes every complete v2 frame in one datagram.
    fn decode_datagram(datagram: &[u8]) -> Vec<(MavHeader, MavMessage)> {
        let mut reader = PeekReader::new(datagram);
        let mut frames = Vec::new();
        loop {
            match mavlink::read_v2_msg::<MavMessage, _>(&mut reader) {
                Ok(frame) => frames.push(frame),
                Err(err) => {
                    if frames.is_empty() {
                        trace!("undecodable datagram: {err}");
                    }
                    break;
                }
            }
        }
        frames
    }
}

#[async_trait]
impl MavLink for UdpLink {
    async fn recv(&self) -> Result<(MavHeader, MavMessage), LinkError> {
        loop {
            if let Some(frame) = self.pending.lock().await.pop_front() {
                return Ok(frame);
            }

            let mut buf = [0u8; 2048];
            let (len, addr) = self.socket.recv_from(&mut buf).await?;
            if !self.on_subnet(&addr) {
                trace!(%addr, "dropping datagram from outside the fleet subnet");
                continue;
            }
            let frames = Self::decode_datagram(&buf[..len]);

            let mut pending = self.pending.lock().await;
            for (header, message) in frames {
                if header.system_id != 0 {
                    self.peers.write().unwrap().insert(header.system_id, addr);
                }
                pending.push_back((header, message));
            }
        }
    }

    async fn send_to(
        &self,
        target_system: u8,
        header: &MavHeader,
        message: &MavMessage,
    ) -> Result<(), LinkError> {
        let peer = self
            .peers
            .read()
            .unwrap()
            .get(&target_system)
            .copied()
            .ok_or(LinkError::UnknownPeer(target_system))?;

        let mut buf = Vec::with_capacity(280);
        mavlink::write_v2_msg(&mut buf, *header, message)
            .map_err(|err| LinkError::Codec(err.to_string()))?;
        self.socket.send_to(&buf, peer).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Serial
// ---------------------------------------------------------------------------

/// Single shared serial channel; every admitted vehicle shares the writer,
/// so the target system key is ignored on send.
#[cfg(feature = "serial")]
pub struct SerialLink {
    connection: Box<dyn mavlink::AsyncMavConnection<MavMessage> + Sync + Send>,
}

#[cfg(feature = "serial")]
impl SerialLink {
    pub async fn open(port: &str, baud: u32) -> Result<Self, LinkError> {
        let connection = mavlink::connect_async::<MavMessage>(&format!("serial:{port}:{baud}"))
            .await
            .map_err(|err| LinkError::Codec(err.to_string()))?;
        debug!(port, baud, "serial transport opened");
        Ok(Self { connection })
    }
}

#[cfg(feature = "serial")]
#[async_trait]
impl MavLink for SerialLink {
    async fn recv(&self) -> Result<(MavHeader, MavMessage), LinkError> {
        self.connection
            .recv()
            .await
            .map_err(|err| LinkError::Codec(err.to_string()))
    }

    async fn send_to(
        &self,
        _target_system: u8,
        header: &MavHeader,
        message: &MavMessage,
    ) -> Result<(), LinkError> {
        self.connection
            .send(header, message)
            .await
            .map(|_| ())
            .map_err(|err| LinkError::Codec(err.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Loopback
// ---------------------------------------------------------------------------

/// In-process link for simulators and tests. The harness end plays the
/// vehicles: it injects inbound frames and observes everything the station
/// transmits, already demultiplexed by target system.
pub struct LoopbackLink {
    inbound: Mutex<mpsc::UnboundedReceiver<(MavHeader, MavMessage)>>,
    outbound: mpsc::UnboundedSender<LinkFrame>,
}

pub struct LoopbackHarness {
    to_station: mpsc::UnboundedSender<(MavHeader, MavMessage)>,
    from_station: Mutex<mpsc::UnboundedReceiver<LinkFrame>>,
}

impl LoopbackLink {
    pub fn pair() -> (std::sync::Arc<LoopbackLink>, LoopbackHarness) {
        let (to_station, inbound) = mpsc::unbounded_channel();
        let (outbound, from_station) = mpsc::unbounded_channel();
        (
            std::sync::Arc::new(LoopbackLink {
                inbound: Mutex::new(inbound),
                outbound,
            }),
            LoopbackHarness {
                to_station,
                from_station: Mutex::new(from_station),
            },
        )
    }
}

#[async_trait]
impl MavLink for LoopbackLink {
    async fn recv(&self) -> Result<(MavHeader, MavMessage), LinkError> {
        self.inbound
            .lock()
            .await
            .recv()
            .await
            .ok_or(LinkError::Closed)
    }

    async fn send_to(
        &self,
        target_system: u8,
        header: &MavHeader,
        message: &MavMessage,
    ) -> Result<(), LinkError> {
        self.outbound
            .send(LinkFrame {
                target_system,
                header: *header,
                message: message.clone(),
            })
            .map_err(|_| LinkError::Closed)
    }
}

impl LoopbackHarness {
    /// Feeds one frame into the station, as if it arrived from a vehicle.
    pub fn inject(&self, header: MavHeader, message: MavMessage) -> Result<(), LinkError> {
        self.to_station
            .send((header, message))
            .map_err(|_| LinkError::Closed)
    }

    /// Next frame transmitted by the station, or None once the link closed.
    pub async fn next_sent(&self) -> Option<LinkFrame> {
        self.from_station.lock().await.recv().await
    }
}
