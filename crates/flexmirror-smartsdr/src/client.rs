//! Async SmartSDR client.
//!
//! [`MirrorClient`] owns the sockets and background tasks that feed a
//! [`RadioMirror`]:
//!
//! - a writer task draining encoded commands to the TCP stream,
//! - a TCP read loop handing each line to [`RadioMirror::handle_line`],
//! - a UDP read loop handing each datagram to [`RadioMirror::on_datagram`].
//!
//! All three stop when the client is disconnected or dropped. The mirror
//! itself never awaits, so a slow subscriber cannot stall either loop.

use std::borrow::Cow;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use flexmirror_core::{EntityKey, EntityKind, Error, Result};
use flexmirror_transport::{RetryPolicy, UdpTransport, connect_with_retry};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::{self, SmartSdrMessage, SmartSdrVersion};
use crate::entity::Entity;
use crate::events::{Frame, MirrorEvent};
use crate::mirror::{DEFAULT_EVENT_CAPACITY, DEFAULT_SAMPLE_PERIOD, RadioMirror};
use crate::reassembly::StreamStats;
use crate::request::EntityRequest;
use crate::vita49::TxAudioPacketizer;

/// Default SmartSDR TCP command port.
pub const DEFAULT_TCP_PORT: u16 = 4992;

/// Default first local UDP port for stream traffic.
pub const DEFAULT_UDP_PORT: u16 = 4991;

/// Highest local UDP port tried when the preferred one is busy.
pub const DEFAULT_UDP_PORT_MAX: u16 = 5010;

/// Port the radio listens on for DAX TX packets.
pub const RADIO_VITA_PORT: u16 = 4991;

/// Default handshake timeout (5 seconds).
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default client program name.
pub const DEFAULT_CLIENT_NAME: &str = "flexmirror";

/// Largest datagram the UDP loop accepts.
const MAX_DATAGRAM: usize = 16 * 1024;

/// Longest command-channel line kept. The remainder of a longer line is
/// read and discarded.
const MAX_LINE: usize = 64 * 1024;

/// Objects subscribed to after the handshake.
pub const DEFAULT_SUBSCRIPTIONS: [&str; 8] = [
    "slice all",
    "pan all",
    "tnf all",
    "memories all",
    "xvtr all",
    "daxiq all",
    "dax all",
    "audio_stream all",
];

/// Resolved settings for a [`MirrorClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub host: String,
    pub tcp_port: u16,
    /// First local UDP port to try. `0` binds an ephemeral port.
    pub udp_port: u16,
    pub udp_port_max: u16,
    /// Connect attempts, delay and per-attempt timeout.
    pub retry: RetryPolicy,
    pub handshake_timeout: Duration,
    /// Name sent with `client program`.
    pub client_name: String,
    /// Objects passed to `sub` after the handshake, in order.
    pub subscriptions: Vec<String>,
    /// Throughput sampling period for owned streams.
    pub sample_period: Duration,
    /// Capacity of the event and frame broadcast channels.
    pub event_capacity: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            udp_port_max: DEFAULT_UDP_PORT_MAX,
            retry: RetryPolicy::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            subscriptions: DEFAULT_SUBSCRIPTIONS.iter().map(|s| s.to_string()).collect(),
            sample_period: DEFAULT_SAMPLE_PERIOD,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// A connected mirror of one radio.
pub struct MirrorClient {
    mirror: RadioMirror,
    version: SmartSdrVersion,
    udp: Option<Arc<UdpTransport>>,
    /// Where DAX TX packets go; unknown for in-memory transports.
    radio_vita_addr: Option<SocketAddr>,
    packetizers: Mutex<HashMap<u32, TxAudioPacketizer>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl MirrorClient {
    /// Connect to the radio described by `options`.
    ///
    /// Connects with bounded retry, completes the handshake, binds the UDP
    /// stream socket, starts the background loops and sends the startup
    /// commands.
    pub async fn connect(options: ClientOptions) -> Result<Self> {
        let addr = format!("{}:{}", options.host, options.tcp_port);
        let stream = connect_with_retry(&addr, &options.retry).await?;
        let radio_vita_addr = stream
            .peer_addr()
            .ok()
            .map(|peer| SocketAddr::new(peer.ip(), RADIO_VITA_PORT));

        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let (version, handle) = handshake(&mut reader, options.handshake_timeout).await?;

        let udp = UdpTransport::bind_in_range("0.0.0.0", options.udp_port, options.udp_port_max)
            .await?;

        let client = Self::start(
            reader,
            write_half,
            version,
            handle,
            Some(Arc::new(udp)),
            radio_vita_addr,
            &options,
        )?;
        tracing::info!(addr = %addr, udp_port = ?client.udp_port(), "Mirror client connected");
        Ok(client)
    }

    /// Run the client over an already-open command channel, without a UDP
    /// stream socket. Used with in-memory transports in tests.
    pub async fn from_streams<R, W>(reader: R, writer: W, options: ClientOptions) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut reader = BufReader::new(reader);
        let (version, handle) = handshake(&mut reader, options.handshake_timeout).await?;
        Self::start(reader, writer, version, handle, None, None, &options)
    }

    fn start<R, W>(
        reader: R,
        writer: W,
        version: SmartSdrVersion,
        handle: u32,
        udp: Option<Arc<UdpTransport>>,
        radio_vita_addr: Option<SocketAddr>,
        options: &ClientOptions,
    ) -> Result<Self>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, commands) = mpsc::unbounded_channel();
        let mirror = RadioMirror::new(sink, options.sample_period, options.event_capacity);
        mirror.handle_line(&format!("H{:08X}", handle));

        let cancel = CancellationToken::new();
        let mut tasks = vec![
            tokio::spawn(write_loop(writer, commands, cancel.clone())),
            tokio::spawn(read_loop(reader, mirror.clone(), cancel.clone())),
        ];
        if let Some(udp) = &udp {
            tasks.push(tokio::spawn(udp_loop(
                Arc::clone(udp),
                mirror.clone(),
                cancel.clone(),
            )));
        }

        let client = Self {
            mirror,
            version,
            udp,
            radio_vita_addr,
            packetizers: Mutex::new(HashMap::new()),
            cancel,
            tasks: Mutex::new(tasks),
            closed: AtomicBool::new(false),
        };
        client.send_startup(options)?;
        Ok(client)
    }

    fn send_startup(&self, options: &ClientOptions) -> Result<()> {
        self.mirror
            .send(&codec::cmd_client_program(&options.client_name))?;
        if let Some(port) = self.udp_port() {
            self.mirror.send(&codec::cmd_client_udpport(port))?;
        }
        for object in &options.subscriptions {
            self.mirror.send(&codec::cmd_subscribe(object))?;
        }
        Ok(())
    }

    /// The synchronous mirror this client feeds.
    pub fn mirror(&self) -> &RadioMirror {
        &self.mirror
    }

    pub fn version(&self) -> &SmartSdrVersion {
        &self.version
    }

    pub fn client_handle(&self) -> u32 {
        self.mirror.client_handle()
    }

    /// Local UDP port announced to the radio, if a socket is bound.
    pub fn udp_port(&self) -> Option<u16> {
        self.udp.as_ref().map(|udp| udp.port())
    }

    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Relaxed) && self.mirror.is_connected()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MirrorEvent> {
        self.mirror.subscribe()
    }

    pub fn subscribe_frames(&self) -> broadcast::Receiver<Frame> {
        self.mirror.subscribe_frames()
    }

    pub fn entity(&self, key: EntityKey) -> Option<Entity> {
        self.mirror.entity(key)
    }

    pub fn entities(&self) -> Vec<Entity> {
        self.mirror.entities()
    }

    pub fn stream_stats(&self, stream_id: u32) -> Option<StreamStats> {
        self.mirror.stream_stats(stream_id)
    }

    /// Send a raw command without waiting for its reply.
    pub fn send(&self, command: &str) -> Result<u32> {
        self.ensure_connected()?;
        self.mirror.send(command)
    }

    /// Send the creation command for `request`. See [`RadioMirror::request`].
    pub fn request(&self, request: &EntityRequest) -> Result<u32> {
        self.ensure_connected()?;
        self.mirror.request(request)
    }

    /// Send `request` and wait for the radio to assign its key.
    pub async fn create(&self, request: &EntityRequest) -> Result<EntityKey> {
        self.request(request)?;
        request.identified().await
    }

    /// Remove an entity from the radio and the mirror.
    pub fn remove(&self, key: EntityKey) -> Result<()> {
        self.mirror.remove(key)?;
        if key.kind == EntityKind::TxAudioStream {
            self.lock_packetizers().remove(&key.id);
        }
        Ok(())
    }

    /// Transmit audio on an owned DAX TX stream.
    ///
    /// Samples are split into packets of up to 256. Returns the number of
    /// packets sent.
    pub async fn send_tx_audio(&self, stream_id: u32, samples: &[f32]) -> Result<usize> {
        self.ensure_connected()?;
        let key = EntityKey::new(EntityKind::TxAudioStream, stream_id);
        match self.mirror.entity(key) {
            Some(entity) if entity.is_owned() => {}
            Some(_) => {
                return Err(Error::InvalidParameter(format!(
                    "{} is owned by another client",
                    key
                )));
            }
            None => return Err(Error::InvalidParameter(format!("{} is not mirrored", key))),
        }
        let (Some(udp), Some(addr)) = (&self.udp, self.radio_vita_addr) else {
            return Err(Error::Unsupported(
                "no UDP stream socket on this transport".into(),
            ));
        };

        let packets = self
            .lock_packetizers()
            .entry(stream_id)
            .or_insert_with(|| TxAudioPacketizer::new(stream_id))
            .packetize(samples);

        for packet in &packets {
            udp.send_to(packet, addr).await?;
        }
        Ok(packets.len())
    }

    /// Stop the background tasks and mark the mirror disconnected.
    ///
    /// Calling this more than once is a no-op.
    pub async fn disconnect(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        tracing::debug!("Disconnecting mirror client");
        self.cancel.cancel();

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.lock_tasks());
        for task in tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "Background task ended abnormally");
                }
            }
        }

        self.mirror.connection_lost();
        Ok(())
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn lock_packetizers(&self) -> std::sync::MutexGuard<'_, HashMap<u32, TxAudioPacketizer>> {
        self.packetizers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for MirrorClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for MirrorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirrorClient")
            .field("mirror", &self.mirror)
            .field("udp_port", &self.udp_port())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// Read the `V` and `H` lines the radio sends on connect.
async fn handshake<R>(reader: &mut R, timeout: Duration) -> Result<(SmartSdrVersion, u32)>
where
    R: AsyncBufRead + Unpin,
{
    let version = match codec::parse_message(&read_handshake_line(reader, timeout).await?)? {
        SmartSdrMessage::Version(v) => v,
        other => {
            return Err(Error::Protocol(format!(
                "expected version line, got: {:?}",
                other
            )));
        }
    };
    tracing::debug!(
        major = version.major,
        minor = version.minor,
        patch = version.patch,
        build = version.build,
        "SmartSDR version received"
    );

    let handle = match codec::parse_message(&read_handshake_line(reader, timeout).await?)? {
        SmartSdrMessage::Handle(h) => h,
        other => {
            return Err(Error::Protocol(format!(
                "expected handle line, got: {:?}",
                other
            )));
        }
    };
    tracing::debug!(handle = format!("{:08X}", handle), "Client handle received");

    Ok((version, handle))
}

async fn read_handshake_line<R>(reader: &mut R, timeout: Duration) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    match tokio::time::timeout(timeout, reader.read_line(&mut line)).await {
        Ok(Ok(0)) => Err(Error::ConnectionLost),
        Ok(Ok(_)) => Ok(line.trim_end_matches(['\n', '\r']).to_string()),
        Ok(Err(e)) => Err(Error::Transport(format!("handshake read error: {}", e))),
        Err(_) => Err(Error::Timeout),
    }
}

// ---------------------------------------------------------------------------
// Background loops
// ---------------------------------------------------------------------------

async fn write_loop<W>(
    mut writer: W,
    mut commands: mpsc::UnboundedReceiver<Bytes>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = commands.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        let written = match writer.write_all(&line).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::debug!(error = %e, "TCP write failed");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    Line,
    Overlong,
    Closed,
}

/// Read one `\n`-terminated line into `buf` as raw bytes, keeping at most
/// `max` of them.
async fn read_line_capped<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = (&mut *reader).take(max as u64).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(LineRead::Closed);
    }
    if n < max || buf.last() == Some(&b'\n') {
        return Ok(LineRead::Line);
    }

    let mut rest = Vec::new();
    loop {
        rest.clear();
        let n = (&mut *reader).take(max as u64).read_until(b'\n', &mut rest).await?;
        if n == 0 || rest.last() == Some(&b'\n') {
            return Ok(LineRead::Overlong);
        }
    }
}

async fn read_loop<R>(mut reader: R, mirror: RadioMirror, cancel: CancellationToken)
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            read = read_line_capped(&mut reader, &mut buf, MAX_LINE) => read,
        };

        match read {
            Ok(LineRead::Closed) => {
                tracing::info!("TCP connection closed by radio");
                break;
            }
            Ok(LineRead::Overlong) => {
                tracing::warn!(max = MAX_LINE, "Overlong line discarded");
            }
            Ok(LineRead::Line) => {
                let line = String::from_utf8_lossy(&buf);
                if matches!(line, Cow::Owned(_)) {
                    tracing::trace!("Invalid UTF-8 in line replaced");
                }
                let trimmed = line.trim_end_matches(['\n', '\r']);
                if !trimmed.is_empty() {
                    mirror.handle_line(trimmed);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP read error");
                break;
            }
        }
    }
    mirror.connection_lost();
}

async fn udp_loop(udp: Arc<UdpTransport>, mirror: RadioMirror, cancel: CancellationToken) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            received = udp.recv(&mut buf) => received,
        };

        match received {
            Ok(n) => mirror.on_datagram(&buf[..n]),
            Err(e) => {
                // ICMP port-unreachable and similar surface here; keep going.
                tracing::debug!(error = %e, "UDP receive error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, duplex};

    fn options() -> ClientOptions {
        ClientOptions {
            handshake_timeout: Duration::from_millis(200),
            subscriptions: vec!["slice all".into()],
            ..ClientOptions::default()
        }
    }

    #[tokio::test]
    async fn handshake_reads_version_then_handle() {
        let mut reader = BufReader::new(&b"V1.4.0.0\r\nH0000ABCD\n"[..]);
        let (version, handle) = handshake(&mut reader, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(version.major, 1);
        assert_eq!(version.minor, 4);
        assert_eq!(handle, 0xABCD);
    }

    #[tokio::test]
    async fn handshake_rejects_wrong_order() {
        let mut reader = BufReader::new(&b"H0000ABCD\nV1.4.0.0\n"[..]);
        let err = handshake(&mut reader, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn handshake_on_closed_stream() {
        let mut reader = BufReader::new(&b""[..]);
        let err = handshake(&mut reader, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionLost));
    }

    #[tokio::test]
    async fn handshake_times_out() {
        let (_radio, client) = duplex(64);
        let mut reader = BufReader::new(client);
        let err = handshake(&mut reader, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test]
    async fn startup_commands_follow_handshake() {
        let (client_io, mut radio_io) = duplex(4096);
        let (client_read, client_write) = tokio::io::split(client_io);
        radio_io.write_all(b"V1.4.0.0\nH12345678\n").await.unwrap();

        let client = MirrorClient::from_streams(client_read, client_write, options())
            .await
            .unwrap();
        assert_eq!(client.client_handle(), 0x1234_5678);
        assert_eq!(client.udp_port(), None);

        let mut buf = vec![0u8; 256];
        let mut received = String::new();
        while !received.ends_with("sub slice all\n") {
            let n = radio_io.read(&mut buf).await.unwrap();
            received.push_str(std::str::from_utf8(&buf[..n]).unwrap());
        }
        assert_eq!(received, "C1|client program flexmirror\nC2|sub slice all\n");

        client.disconnect().await.unwrap();
        client.disconnect().await.unwrap();
        assert!(!client.is_connected());
        assert!(matches!(client.send("info"), Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn invalid_utf8_line_keeps_connection() {
        let (client_io, mut radio_io) = duplex(4096);
        let (client_read, client_write) = tokio::io::split(client_io);
        radio_io.write_all(b"V1.4.0.0\nH1\n").await.unwrap();
        let client = MirrorClient::from_streams(client_read, client_write, options())
            .await
            .unwrap();

        radio_io
            .write_all(b"S1|memory 1 name=Caf\xE9\nS1|memory 2 mode=USB\n")
            .await
            .unwrap();

        let second = EntityKey::new(EntityKind::Memory, 2);
        tokio::time::timeout(Duration::from_secs(2), async {
            while client.entity(second).is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(client.is_connected());
        let first = client.entity(EntityKey::new(EntityKind::Memory, 1)).unwrap();
        match first.fields() {
            crate::entity::EntityFields::Memory(f) => assert_eq!(f.name, "Caf\u{FFFD}"),
            other => panic!("unexpected fields {:?}", other),
        }
        client.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn overlong_line_is_discarded() {
        let mut reader = BufReader::new(&b"S1|memory 1 name=aaaaaaaa\nS1|ok\npartial"[..]);
        let mut buf = Vec::new();

        let read = read_line_capped(&mut reader, &mut buf, 8).await.unwrap();
        assert_eq!(read, LineRead::Overlong);

        let read = read_line_capped(&mut reader, &mut buf, 8).await.unwrap();
        assert_eq!(read, LineRead::Line);
        assert_eq!(buf, b"S1|ok\n");

        let read = read_line_capped(&mut reader, &mut buf, 8).await.unwrap();
        assert_eq!(read, LineRead::Line);
        assert_eq!(buf, b"partial");

        let read = read_line_capped(&mut reader, &mut buf, 8).await.unwrap();
        assert_eq!(read, LineRead::Closed);
    }

    #[tokio::test]
    async fn tx_audio_requires_owned_stream() {
        let (client_io, mut radio_io) = duplex(4096);
        let (client_read, client_write) = tokio::io::split(client_io);
        radio_io.write_all(b"V1.4.0.0\nH1\n").await.unwrap();
        let client = MirrorClient::from_streams(client_read, client_write, options())
            .await
            .unwrap();

        let err = client.send_tx_audio(0x8400_0000, &[0.0; 4]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));

        client
            .mirror()
            .handle_line("S1|tx_audio_stream 0x84000000 dax_tx=1 ip=10.0.0.2 port=4991");
        let err = client.send_tx_audio(0x8400_0000, &[0.0; 4]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }
}
