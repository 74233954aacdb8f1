use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::error::ProtocolError;
use super::message::{Handshake, Message, HANDSHAKE_LEN};
use super::session::PeerSession;

const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(120);
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Length-prefixed message framing over a TCP stream.
///
/// The byte layer a host wires between the socket and the dispatcher:
/// decoded messages feed `TorrentContext::dispatch`, and the session's
/// outbound queue drains through [`drain_session`](Self::drain_session).
pub struct PeerWire {
    stream: TcpStream,
    read_buf: BytesMut,
}

impl PeerWire {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(32 * 1024),
        }
    }

    pub async fn send_handshake(&mut self, handshake: &Handshake) -> Result<(), ProtocolError> {
        let data = handshake.encode();
        timeout(WRITE_TIMEOUT, self.stream.write_all(&data))
            .await
            .map_err(|_| ProtocolError::Timeout)??;
        Ok(())
    }

    pub async fn receive_handshake(&mut self) -> Result<Handshake, ProtocolError> {
        while self.read_buf.len() < HANDSHAKE_LEN {
            let n = timeout(READ_TIMEOUT, self.stream.read_buf(&mut self.read_buf))
                .await
                .map_err(|_| ProtocolError::Timeout)??;
            if n == 0 {
                return Err(ProtocolError::ConnectionClosed);
            }
        }

        let data = self.read_buf.split_to(HANDSHAKE_LEN);
        Handshake::decode(&data)
    }

    pub async fn send_message(&mut self, message: &Message) -> Result<(), ProtocolError> {
        let data = message.encode();
        timeout(WRITE_TIMEOUT, self.stream.write_all(&data))
            .await
            .map_err(|_| ProtocolError::Timeout)??;
        Ok(())
    }

    /// Transmits the session's queued messages in enqueue order until the
    /// queue is empty.
    pub async fn drain_session(
        &mut self,
        session: &mut PeerSession,
    ) -> Result<(), ProtocolError> {
        while let Some(message) = session.next_outbound() {
            self.send_message(&message).await?;
        }
        Ok(())
    }

    pub async fn receive_message(&mut self) -> Result<Message, ProtocolError> {
        while self.read_buf.len() < 4 {
            let n = timeout(READ_TIMEOUT, self.stream.read_buf(&mut self.read_buf))
                .await
                .map_err(|_| ProtocolError::Timeout)??;
            if n == 0 {
                return Err(ProtocolError::ConnectionClosed);
            }
        }

        let length = u32::from_be_bytes([
            self.read_buf[0],
            self.read_buf[1],
            self.read_buf[2],
            self.read_buf[3],
        ]) as usize;

        if length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::InvalidMessage(format!(
                "message too large: {length}"
            )));
        }

        let total_len = 4 + length;
        while self.read_buf.len() < total_len {
            let n = timeout(READ_TIMEOUT, self.stream.read_buf(&mut self.read_buf))
                .await
                .map_err(|_| ProtocolError::Timeout)??;
            if n == 0 {
                return Err(ProtocolError::ConnectionClosed);
            }
        }

        let data = self.read_buf.split_to(total_len);
        Message::decode(data.freeze())
    }

    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.stream.peer_addr()
    }

    pub fn into_inner(self) -> TcpStream {
        self.stream
    }
}
