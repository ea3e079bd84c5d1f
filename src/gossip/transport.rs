//! UDP transport for gossip messages.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::UdpSocket;

use crate::gossip::message::{Message, MAX_DATAGRAM};
use crate::gossip::GossipError;
use crate::observability::metrics;

/// Datagram counters kept for the status page.
#[derive(Debug, Default)]
pub struct TransportStats {
    pub sent: AtomicU64,
    pub received: AtomicU64,
    pub decode_errors: AtomicU64,
    pub send_errors: AtomicU64,
}

pub struct Transport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    stats: TransportStats,
}

impl Transport {
    pub fn new(socket: UdpSocket) -> std::io::Result<Self> {
        let local_addr = socket.local_addr()?;
        Ok(Self {
            socket,
            local_addr,
            stats: TransportStats::default(),
        })
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    pub async fn send(&self, to: SocketAddr, msg: &Message) -> Result<(), GossipError> {
        let kind = msg.kind();
        let bytes = msg
            .encode()
            .map_err(|source| GossipError::Encode { kind, source })?;
        if bytes.len() > MAX_DATAGRAM {
            return Err(GossipError::TooLarge {
                kind,
                size: bytes.len(),
            });
        }

        if let Err(source) = self.socket.send_to(&bytes, to).await {
            self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
            return Err(GossipError::Send { addr: to, source });
        }
        self.stats.sent.fetch_add(1, Ordering::Relaxed);
        metrics::gossip_sent(kind);
        tracing::trace!(to = %to, kind, bytes = bytes.len(), "gossip sent");
        Ok(())
    }

    /// Send and log failures instead of returning them. Peer errors are
    /// transient and retried by the next round.
    pub async fn send_or_log(&self, to: SocketAddr, msg: &Message) {
        if let Err(e) = self.send(to, msg).await {
            tracing::debug!(to = %to, error = %e, "gossip send failed");
        }
    }

    /// Receive one datagram. Undecodable datagrams yield `None`.
    pub async fn recv(&self, buf: &mut [u8]) -> std::io::Result<(Option<Message>, SocketAddr)> {
        let (len, from) = self.socket.recv_from(buf).await?;
        match Message::decode(&buf[..len]) {
            Ok(msg) => {
                self.stats.received.fetch_add(1, Ordering::Relaxed);
                metrics::gossip_received(msg.kind());
                tracing::trace!(from = %from, kind = msg.kind(), bytes = len, "gossip received");
                Ok((Some(msg), from))
            }
            Err(e) => {
                self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                metrics::decode_error();
                tracing::debug!(from = %from, error = %e, "undecodable gossip datagram");
                Ok((None, from))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn transport() -> Transport {
        Transport::new(UdpSocket::bind("127.0.0.1:0").await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn delivers_messages_and_counts_garbage() {
        let a = transport().await;
        let b = transport().await;
        let msg = Message::Ack {
            seq: 3,
            from: "a".into(),
            records: Vec::new(),
        };
        a.send(b.local_addr(), &msg).await.unwrap();

        let mut buf = vec![0; MAX_DATAGRAM];
        let (received, from) = b.recv(&mut buf).await.unwrap();
        assert_eq!(received, Some(msg));
        assert_eq!(from, a.local_addr());

        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        raw.send_to(b"not json", b.local_addr()).await.unwrap();
        let (received, _) = b.recv(&mut buf).await.unwrap();
        assert_eq!(received, None);
        assert_eq!(b.stats().decode_errors.load(Ordering::Relaxed), 1);
        assert_eq!(b.stats().received.load(Ordering::Relaxed), 1);
    }
}
