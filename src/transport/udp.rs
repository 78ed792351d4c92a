//! MAVLink v2 over UDP.
//!
//! The link is bound to a local port in non-blocking mode. The remote
//! endpoint is either given up front or learned from the first datagram
//! received, which is how vehicles and SITL instances announce themselves.

use std::io::{self, Cursor};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use mavlink::common::{MavAutopilot, MavMessage};
use mavlink::peek_reader::PeekReader;
use mavlink::MavHeader;
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::sender::{Autopilot, Sender};

const MAX_DATAGRAM: usize = 280;

struct Peer {
    addr: Option<SocketAddr>,
    autopilot: Autopilot,
}

/// UDP link implementing [`Sender`].
pub struct UdpLink {
    socket: UdpSocket,
    own_system_id: u8,
    own_component_id: u8,
    target_system_id: u8,
    sequence: AtomicU8,
    peer: Mutex<Peer>,
    recv_buf: Mutex<Vec<u8>>,
}

impl UdpLink {
    /// Bind to `local`, talking to `remote` if known.
    pub fn bind(
        local: SocketAddr,
        remote: Option<SocketAddr>,
        target_system_id: u8,
        config: &LinkConfig,
    ) -> Result<Self, LinkError> {
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        info!(local = %socket.local_addr()?, ?remote, "udp link bound");

        Ok(Self {
            socket,
            own_system_id: config.own_system_id,
            own_component_id: config.own_component_id,
            target_system_id,
            sequence: AtomicU8::new(0),
            peer: Mutex::new(Peer {
                addr: remote,
                autopilot: Autopilot::Unknown,
            }),
            recv_buf: Mutex::new(vec![0u8; MAX_DATAGRAM]),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Drain every datagram waiting on the socket.
    ///
    /// Learns the remote endpoint from the first datagram when none was
    /// configured, and the autopilot flavour from the target's HEARTBEAT.
    pub fn poll_incoming(&self) -> Vec<(MavHeader, MavMessage)> {
        let mut messages = Vec::new();
        let mut buf = self.recv_buf.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((len, addr)) => {
                    let Some((header, message)) = parse_datagram(&buf[..len]) else {
                        debug!(%addr, len, "dropping unparsable datagram");
                        continue;
                    };
                    self.observe(addr, &header, &message);
                    messages.push((header, message));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "udp receive failed");
                    break;
                }
            }
        }
        messages
    }

    fn observe(&self, addr: SocketAddr, header: &MavHeader, message: &MavMessage) {
        let mut peer = self.peer();
        if peer.addr.is_none() {
            info!(%addr, "remote endpoint discovered");
            peer.addr = Some(addr);
        }
        if header.system_id != self.target_system_id {
            return;
        }
        if let MavMessage::HEARTBEAT(heartbeat) = message {
            let autopilot = match heartbeat.autopilot {
                MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA => Autopilot::ArduPilot,
                MavAutopilot::MAV_AUTOPILOT_PX4 => Autopilot::Px4,
                _ => return,
            };
            if peer.autopilot != autopilot {
                info!(?autopilot, "autopilot detected");
                peer.autopilot = autopilot;
            }
        }
    }

    fn peer(&self) -> MutexGuard<'_, Peer> {
        self.peer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn encode(&self, message: &MavMessage) -> Result<Vec<u8>, LinkError> {
        let header = MavHeader {
            system_id: self.own_system_id,
            component_id: self.own_component_id,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        let mut buf = Cursor::new(Vec::with_capacity(MAX_DATAGRAM));
        mavlink::write_v2_msg(&mut buf, header, message)
            .map_err(|e| LinkError::Encode(format!("{e:?}")))?;
        Ok(buf.into_inner())
    }
}

impl Sender for UdpLink {
    fn own_system_id(&self) -> u8 {
        self.own_system_id
    }

    fn own_component_id(&self) -> u8 {
        self.own_component_id
    }

    fn target_system_id(&self) -> u8 {
        self.target_system_id
    }

    fn autopilot(&self) -> Autopilot {
        self.peer().autopilot
    }

    fn send_message(&self, message: &MavMessage) -> bool {
        let Some(addr) = self.peer().addr else {
            debug!("no remote endpoint yet, not sending");
            return false;
        };
        let bytes = match self.encode(message) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "encoding message failed");
                return false;
            }
        };
        match self.socket.send_to(&bytes, addr) {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, %addr, "udp send failed");
                false
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.peer().addr.is_some()
    }
}

fn parse_datagram(data: &[u8]) -> Option<(MavHeader, MavMessage)> {
    let cursor = Cursor::new(data);
    let mut reader = PeekReader::new(cursor);
    mavlink::read_v2_msg::<MavMessage, _>(&mut reader).ok()
}
