//! Mock SmartSDR radio for protocol-level testing.
//!
//! Unlike a request/response script, a SmartSDR radio talks whenever it
//! likes: status broadcasts arrive unprompted and replies may come after
//! the status they describe. [`RadioSession`] therefore exposes the raw
//! operations (read the next command, write a line, send a datagram) and
//! leaves ordering to the test.
//!
//! # Example
//!
//! ```
//! use flexmirror_test_harness::MockRadio;
//!
//! # async fn example() -> flexmirror_core::Result<()> {
//! let radio = MockRadio::new().await?;
//! let port = radio.port();
//! // ... connect a client to 127.0.0.1:port ...
//! let mut session = radio.accept().await?;
//! let create = session.expect_command("memory create").await?;
//! session.status("memory 4 name=\"Repeater\"").await?;
//! session.reply(create.seq, 0, "4").await?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use flexmirror_core::error::{Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, UdpSocket};

/// Version line sent on connect.
pub const HANDSHAKE_VERSION: &str = "V1.4.0.0";

/// Client handle assigned to every session.
pub const CLIENT_HANDLE: u32 = 0x1234_5678;

/// How long [`RadioSession::next_command`] waits by default.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// A listening mock radio.
pub struct MockRadio {
    listener: TcpListener,
    addr: SocketAddr,
}

impl MockRadio {
    /// Bind a listener on a random localhost port.
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock radio: {}", e)))?;
        let addr = listener.local_addr().map_err(Error::Io)?;
        Ok(Self { listener, addr })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Accept one client and send the handshake.
    pub async fn accept(&self) -> Result<RadioSession> {
        let (stream, peer) = self.listener.accept().await.map_err(Error::Io)?;
        tracing::debug!(peer = %peer, "Mock radio accepted client");

        let (read_half, write_half) = stream.into_split();
        let udp = UdpSocket::bind("127.0.0.1:0").await.map_err(Error::Io)?;

        let mut session = RadioSession {
            reader: BufReader::new(read_half),
            writer: write_half,
            peer,
            udp,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        };
        session.send_line(HANDSHAKE_VERSION).await?;
        session
            .send_line(&format!("H{:08X}", CLIENT_HANDLE))
            .await?;
        Ok(session)
    }
}

/// A command the client sent, split at the sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedCommand {
    pub seq: u32,
    pub text: String,
}

/// One connected client.
pub struct RadioSession {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
    udp: UdpSocket,
    command_timeout: Duration,
}

impl RadioSession {
    /// Change how long [`next_command`](Self::next_command) waits.
    pub fn set_command_timeout(&mut self, timeout: Duration) {
        self.command_timeout = timeout;
    }

    /// Read the next `C<seq>|<text>` line.
    pub async fn next_command(&mut self) -> Result<ReceivedCommand> {
        let mut line = String::new();
        let read = tokio::time::timeout(self.command_timeout, self.reader.read_line(&mut line))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(Error::Io)?;
        if read == 0 {
            return Err(Error::ConnectionLost);
        }

        let line = line.trim_end_matches(['\n', '\r']);
        let (seq, text) = line
            .strip_prefix('C')
            .and_then(|rest| rest.split_once('|'))
            .ok_or_else(|| Error::Protocol(format!("not a command line: {line}")))?;
        let seq = seq
            .parse()
            .map_err(|_| Error::Protocol(format!("bad sequence in: {line}")))?;

        tracing::trace!(seq, text = %text, "Mock radio received command");
        Ok(ReceivedCommand {
            seq,
            text: text.to_string(),
        })
    }

    /// Read commands until one whose text is `text`. Commands skipped on
    /// the way are returned to nobody.
    pub async fn expect_command(&mut self, text: &str) -> Result<ReceivedCommand> {
        loop {
            let command = self.next_command().await?;
            if command.text == text {
                return Ok(command);
            }
            tracing::trace!(skipped = %command.text, wanted = %text, "Mock radio skipping command");
        }
    }

    /// Read commands until `client udpport <n>` and return the port.
    pub async fn expect_udp_port(&mut self) -> Result<u16> {
        loop {
            let command = self.next_command().await?;
            if let Some(port) = command.text.strip_prefix("client udpport ") {
                return port
                    .trim()
                    .parse()
                    .map_err(|_| Error::Protocol(format!("bad udpport: {}", command.text)));
            }
        }
    }

    /// Write `R<seq>|<code hex>|<payload>`.
    pub async fn reply(&mut self, seq: u32, code: u32, payload: &str) -> Result<()> {
        self.send_line(&format!("R{}|{:X}|{}", seq, code, payload))
            .await
    }

    /// Write a status broadcast addressed to this session's handle.
    pub async fn status(&mut self, payload: &str) -> Result<()> {
        self.send_line(&format!("S{:08X}|{}", CLIENT_HANDLE, payload))
            .await
    }

    /// Write `M<code hex>|<text>`.
    pub async fn message(&mut self, code: u32, text: &str) -> Result<()> {
        self.send_line(&format!("M{:08X}|{}", code, text)).await
    }

    /// Write one raw line; the newline is appended.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(Error::Io)?;
        self.writer.flush().await.map_err(Error::Io)
    }

    /// Send one datagram to the client's stream port.
    pub async fn send_datagram(&self, port: u16, data: &[u8]) -> Result<()> {
        let target = SocketAddr::new(self.peer.ip(), port);
        self.udp.send_to(data, target).await.map_err(Error::Io)?;
        Ok(())
    }

    /// Close the command channel from the radio side.
    pub async fn close(mut self) -> Result<()> {
        self.writer.shutdown().await.map_err(Error::Io)
    }
}
