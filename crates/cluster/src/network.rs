//! Peer-to-peer networking: length-prefixed JSON framing over TCP, a
//! listener thread accepting incoming peer connections, and a connection
//! pool for outbound requests (spec §4.8's "network manager maintains peer
//! sockets").

use crate::error::{ClusterError, Result};
use crate::message::ClusterMessage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
const READ_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Write one length-prefixed JSON message to `stream`.
pub fn send_message(stream: &mut TcpStream, msg: &ClusterMessage) -> Result<()> {
    let body = serde_json::to_vec(msg)?;
    stream.write_all(&(body.len() as u32).to_le_bytes())?;
    stream.write_all(&body)?;
    stream.flush()?;
    Ok(())
}

/// Read one length-prefixed JSON message from `stream`.
pub fn recv_message(stream: &mut TcpStream) -> Result<ClusterMessage> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body)?;
    Ok(serde_json::from_slice(&body)?)
}

fn dial(addr: SocketAddr) -> Result<TcpStream> {
    let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
        .map_err(|_| ClusterError::PeerUnreachable(addr.to_string()))?;
    stream.set_read_timeout(Some(READ_WRITE_TIMEOUT))?;
    stream.set_write_timeout(Some(READ_WRITE_TIMEOUT))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// One outbound connection to a peer, dialed lazily and redialed on the
/// next send if it was dropped or never opened.
struct PeerSlot {
    addr: SocketAddr,
    stream: Option<TcpStream>,
}

impl PeerSlot {
    fn exchange(&mut self, msg: &ClusterMessage) -> Result<ClusterMessage> {
        if self.stream.is_none() {
            self.stream = Some(dial(self.addr)?);
        }
        let stream = self.stream.as_mut().expect("just dialed");
        match send_message(stream, msg).and_then(|()| recv_message(stream)) {
            Ok(reply) => Ok(reply),
            Err(e) => {
                self.stream = None;
                Err(e)
            }
        }
    }
}

/// Maintains outbound sockets to every configured peer and accepts inbound
/// peer connections on `listen_addr`, dispatching each request to
/// `on_request`.
pub struct NetworkManager {
    local_addr: SocketAddr,
    peers: Mutex<HashMap<u32, PeerSlot>>,
    // Kept only so the listener thread isn't detached from the value that
    // owns it; never joined, since accept() blocks indefinitely.
    _listener: JoinHandle<()>,
}

impl NetworkManager {
    /// Bind `listen_addr`, spawn the accept loop, and register outbound
    /// slots for `peers`. `on_request` answers `VoteRequest`/`PageRequest`
    /// messages arriving from other members; it runs once per inbound
    /// connection, for that connection's lifetime.
    pub fn start(
        listen_addr: SocketAddr,
        peers: Vec<(u32, SocketAddr)>,
        on_request: Arc<dyn Fn(ClusterMessage) -> ClusterMessage + Send + Sync>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(listen_addr)?;
        let local_addr = listener.local_addr()?;
        let handle = std::thread::spawn(move || {
            for incoming in listener.incoming() {
                let Ok(mut stream) = incoming else { continue };
                let on_request = Arc::clone(&on_request);
                std::thread::spawn(move || loop {
                    let msg = match recv_message(&mut stream) {
                        Ok(m) => m,
                        Err(_) => break,
                    };
                    let reply = on_request(msg);
                    if send_message(&mut stream, &reply).is_err() {
                        break;
                    }
                });
            }
        });

        let slots = peers.into_iter().map(|(id, addr)| (id, PeerSlot { addr, stream: None })).collect();

        Ok(NetworkManager { local_addr, peers: Mutex::new(slots), _listener: handle })
    }

    /// The address this manager actually bound to — useful when
    /// `listen_addr` was passed with port `0` and the OS assigned one.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send `msg` to every peer and collect their replies, skipping (and
    /// logging) any peer that is unreachable rather than failing outright —
    /// quorum arithmetic already accounts for missing votes.
    pub fn broadcast(&self, msg: &ClusterMessage) -> Vec<(u32, ClusterMessage)> {
        let mut peers = self.peers.lock();
        let mut replies = Vec::new();
        for (id, slot) in peers.iter_mut() {
            match slot.exchange(msg) {
                Ok(reply) => replies.push((*id, reply)),
                Err(e) => tracing::warn!(peer = id, error = %e, "peer unreachable during broadcast"),
            }
        }
        replies
    }

    /// Send `msg` to one named peer.
    pub fn send_to(&self, peer_id: u32, msg: &ClusterMessage) -> Result<ClusterMessage> {
        let mut peers = self.peers.lock();
        let slot = peers.get_mut(&peer_id).ok_or_else(|| ClusterError::PeerUnreachable(peer_id.to_string()))?;
        slot.exchange(msg)
    }

    /// Number of peers configured (not counting self).
    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }
}
