//! UDP implementation of the voice channel contract.
//!
//! [`UdpVoiceChannel`] wraps a connected [`tokio::net::UdpSocket`] with two
//! background tasks:
//!
//! - a **receive loop** that reads datagrams, splits off the two-byte DTO
//!   name, and invokes the registered handler for that name;
//! - a **send loop** that drains a bounded outbound queue onto the socket.
//!
//! [`send_dto`](UdpVoiceChannel::send_dto) only enqueues, so it is safe to
//! call from the synchronous compressor completion path. When the queue is
//! full the datagram is dropped -- voice frames are perishable and blocking
//! the transmit path would be worse than a gap.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use atcvoice_core::dto::DTO_AUDIO_TX;
use atcvoice_core::{AudioTxOnTransceivers, DtoHandler, Error, Result, VoiceChannel};

/// Receive buffer size. Voice datagrams are one codec frame plus headers;
/// 8 KiB leaves generous headroom.
const RECV_BUFFER_SIZE: usize = 8192;

/// Outbound queue depth. At one datagram per 20 ms this is over a second
/// of backlog; a send loop that far behind should shed load.
const OUTBOUND_QUEUE_DEPTH: usize = 64;

type HandlerMap = Arc<Mutex<HashMap<String, DtoHandler>>>;

/// A voice datagram channel over plain UDP.
pub struct UdpVoiceChannel {
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    handlers: HandlerMap,
    open: Arc<AtomicBool>,
    outbound_tx: mpsc::Sender<Vec<u8>>,
    recv_task: tokio::task::JoinHandle<()>,
    send_task: tokio::task::JoinHandle<()>,
}

impl UdpVoiceChannel {
    /// Bind an ephemeral local port and connect it to the voice server.
    ///
    /// The background receive and send loops start immediately and run
    /// until [`close()`](Self::close) or drop.
    pub async fn connect(remote_addr: SocketAddr) -> Result<Self> {
        tracing::debug!(remote = %remote_addr, "Connecting voice UDP channel");

        let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(|e| {
            tracing::error!(error = %e, "Failed to bind voice UDP socket");
            Error::Io(e)
        })?;
        socket.connect(remote_addr).await.map_err(|e| {
            tracing::error!(remote = %remote_addr, error = %e, "Failed to connect voice UDP socket");
            Error::Io(e)
        })?;
        let local_addr = socket.local_addr().map_err(Error::Io)?;
        let socket = Arc::new(socket);

        let handlers: HandlerMap = Arc::new(Mutex::new(HashMap::new()));
        let open = Arc::new(AtomicBool::new(true));
        let (outbound_tx, outbound_rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_QUEUE_DEPTH);

        let recv_task = {
            let socket = Arc::clone(&socket);
            let handlers = Arc::clone(&handlers);
            let open = Arc::clone(&open);
            tokio::spawn(async move {
                recv_loop(socket, handlers, open).await;
            })
        };

        let send_task = {
            let socket = Arc::clone(&socket);
            tokio::spawn(async move {
                send_loop(socket, outbound_rx).await;
            })
        };

        tracing::debug!(local = %local_addr, remote = %remote_addr, "Voice UDP channel connected");

        Ok(UdpVoiceChannel {
            local_addr,
            remote_addr,
            handlers,
            open,
            outbound_tx,
            recv_task,
            send_task,
        })
    }

    /// The local address the channel is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The voice server address the channel is connected to.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Mark the channel closed and stop both background loops.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            tracing::debug!(remote = %self.remote_addr, "Closing voice UDP channel");
        }
        self.recv_task.abort();
        self.send_task.abort();
    }
}

impl Drop for UdpVoiceChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl VoiceChannel for UdpVoiceChannel {
    fn register_dto_handler(&self, name: &str, handler: DtoHandler) {
        self.handlers.lock().insert(name.to_string(), handler);
    }

    fn unregister_dto_handler(&self, name: &str) {
        self.handlers.lock().remove(name);
    }

    fn send_dto(&self, dto: &AudioTxOnTransceivers) -> Result<()> {
        if !self.is_open() {
            return Err(Error::NotConnected);
        }
        let payload = dto.encode();
        let mut frame = Vec::with_capacity(2 + payload.len());
        frame.extend_from_slice(DTO_AUDIO_TX.as_bytes());
        frame.extend_from_slice(&payload);
        match self.outbound_tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!("outbound voice queue full, dropping datagram");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::StreamClosed),
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

async fn recv_loop(socket: Arc<UdpSocket>, handlers: HandlerMap, open: Arc<AtomicBool>) {
    let mut buf = [0u8; RECV_BUFFER_SIZE];
    loop {
        let n = match socket.recv(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                if open.load(Ordering::Acquire) {
                    tracing::error!(error = %e, "voice channel receive failed");
                    open.store(false, Ordering::Release);
                }
                break;
            }
        };
        dispatch(&buf[..n], &handlers);
    }
}

fn dispatch(datagram: &[u8], handlers: &HandlerMap) {
    if datagram.len() < 2 {
        tracing::warn!(len = datagram.len(), "runt voice datagram dropped");
        return;
    }
    let Ok(name) = std::str::from_utf8(&datagram[..2]) else {
        tracing::warn!("voice datagram with non-ASCII DTO name dropped");
        return;
    };
    let handlers = handlers.lock();
    match handlers.get(name) {
        Some(handler) => handler(&datagram[2..]),
        None => tracing::trace!(name = %name, "no handler for DTO, dropping"),
    }
}

async fn send_loop(socket: Arc<UdpSocket>, mut outbound_rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(frame) = outbound_rx.recv().await {
        if let Err(e) = socket.send(&frame).await {
            tracing::warn!(error = %e, "voice datagram send failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn peer() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    fn test_dto() -> AudioTxOnTransceivers {
        AudioTxOnTransceivers {
            sequence: 42,
            callsign: "LFPG_TWR".into(),
            audio: vec![1, 2, 3],
            last_packet: false,
            transceivers: vec![0, 1],
        }
    }

    #[tokio::test]
    async fn inbound_datagram_reaches_handler() {
        let server = peer().await;
        let channel = UdpVoiceChannel::connect(server.local_addr().unwrap())
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(4);
        channel.register_dto_handler(
            "AR",
            Box::new(move |payload| {
                let _ = tx.try_send(payload.to_vec());
            }),
        );

        let mut datagram = b"AR".to_vec();
        datagram.extend_from_slice(&[0xAA, 0xBB]);
        server
            .send_to(&datagram, channel.local_addr())
            .await
            .unwrap();

        let payload = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload, vec![0xAA, 0xBB]);
    }

    #[tokio::test]
    async fn unknown_and_runt_datagrams_are_ignored() {
        let server = peer().await;
        let channel = UdpVoiceChannel::connect(server.local_addr().unwrap())
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(4);
        channel.register_dto_handler(
            "AR",
            Box::new(move |payload| {
                let _ = tx.try_send(payload.to_vec());
            }),
        );

        // A runt, an unknown DTO, then a valid one.
        server.send_to(b"A", channel.local_addr()).await.unwrap();
        server.send_to(b"ZZ123", channel.local_addr()).await.unwrap();
        server.send_to(b"AR7", channel.local_addr()).await.unwrap();

        let payload = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload, b"7");
    }

    #[tokio::test]
    async fn send_dto_frames_and_delivers() {
        let server = peer().await;
        let channel = UdpVoiceChannel::connect(server.local_addr().unwrap())
            .await
            .unwrap();

        let dto = test_dto();
        channel.send_dto(&dto).unwrap();

        let mut buf = [0u8; 2048];
        let (n, _src) = tokio::time::timeout(Duration::from_secs(2), server.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(&buf[..2], b"AT");
        let decoded = AudioTxOnTransceivers::decode(&buf[2..n]).unwrap();
        assert_eq!(decoded, dto);
    }

    #[tokio::test]
    async fn closed_channel_refuses_sends() {
        let server = peer().await;
        let channel = UdpVoiceChannel::connect(server.local_addr().unwrap())
            .await
            .unwrap();
        assert!(channel.is_open());

        channel.close();
        assert!(!channel.is_open());
        assert!(matches!(
            channel.send_dto(&test_dto()),
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn handler_replacement_and_removal() {
        let server = peer().await;
        let channel = UdpVoiceChannel::connect(server.local_addr().unwrap())
            .await
            .unwrap();

        channel.register_dto_handler("AR", Box::new(|_| {}));
        channel.unregister_dto_handler("AR");
        // A datagram for the removed handler must not crash the loop.
        server.send_to(b"ARxx", channel.local_addr()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(channel.is_open());
    }
}
