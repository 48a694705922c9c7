// flexmirror-monitor -- connect to a FlexRadio, optionally open a
// panadapter and a DAX audio stream, and print what the mirror sees.
//
// Usage:
//   flexmirror-monitor --host 192.168.1.100
//   flexmirror-monitor --host 192.168.1.100 --panadapter 1024x700 --duration 30
//   flexmirror-monitor --host 192.168.1.100 --audio 1 --udp-port 4995
//
// Set RUST_LOG=flexmirror_smartsdr=debug to see lifecycle transitions.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use flexmirror::smartsdr::entity::EntityFields;
use flexmirror::{EntityKey, EntityRequest, FrameData, MirrorBuilder, MirrorClient, MirrorEvent};

/// How long to wait for the radio to assign an id to a created object.
const CREATE_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// flexmirror monitor -- mirrors a FlexRadio and prints entity and stream events.
#[derive(Parser)]
#[command(name = "flexmirror-monitor", version, about)]
struct Cli {
    /// Radio IP address or hostname (e.g. 192.168.1.100).
    #[arg(long)]
    host: String,

    /// SmartSDR TCP command port.
    #[arg(long, default_value_t = 4992)]
    tcp_port: u16,

    /// First local UDP port to try for stream packets.
    #[arg(long, default_value_t = 4991)]
    udp_port: u16,

    /// Create a panadapter of the given size, e.g. 1024x700.
    #[arg(long, value_parser = parse_dimensions)]
    panadapter: Option<(u32, u32)>,

    /// Create a DAX receive audio stream on the given channel (1-8).
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=8))]
    audio: Option<u8>,

    /// Seconds to run before printing the summary and exiting.
    #[arg(long, default_value_t = 10)]
    duration: u64,

    /// Client program name announced to the radio.
    #[arg(long, default_value = "flexmirror-monitor")]
    client_name: String,
}

fn parse_dimensions(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let w: u32 = w.trim().parse().map_err(|_| format!("bad width '{}'", w))?;
    let h: u32 = h.trim().parse().map_err(|_| format!("bad height '{}'", h))?;
    if w == 0 || h == 0 {
        return Err("panadapter dimensions must be non-zero".into());
    }
    Ok((w, h))
}

// ---------------------------------------------------------------------------
// Frame accounting
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct FrameTally {
    frames: u64,
    values: u64,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if cli.duration == 0 {
        bail!("--duration must be at least 1 second");
    }

    println!("Connecting to {}:{}...", cli.host, cli.tcp_port);
    let client = MirrorBuilder::new()
        .host(&cli.host)
        .tcp_port(cli.tcp_port)
        .udp_port(cli.udp_port)
        .client_name(&cli.client_name)
        .build()
        .await
        .with_context(|| format!("failed to connect to {}", cli.host))?;

    let version = client.version();
    println!(
        "Connected: SmartSDR {}.{}.{}.{}, handle 0x{:08X}, UDP port {}",
        version.major,
        version.minor,
        version.patch,
        version.build,
        client.client_handle(),
        client
            .udp_port()
            .map_or_else(|| "-".to_string(), |p| p.to_string())
    );

    // Subscribe before creating so the Added events are not missed.
    let mut events = client.subscribe();
    let mut frames = client.subscribe_frames();

    let mut created = Vec::new();
    if let Some((width, height)) = cli.panadapter {
        let key = create(&client, EntityRequest::panadapter(width, height)).await?;
        println!("Created {} ({}x{})", key, width, height);
        created.push(key);
    }
    if let Some(channel) = cli.audio {
        let key = create(&client, EntityRequest::audio_stream(channel)).await?;
        println!("Created {} on DAX {}", key, channel);
        created.push(key);
    }

    println!("Monitoring for {} seconds...\n", cli.duration);
    let tally = monitor(&mut events, &mut frames, Duration::from_secs(cli.duration)).await;

    print_summary(&client, &tally);

    for key in created {
        if let Err(e) = client.remove(key) {
            tracing::warn!(entity = %key, error = %e, "Failed to remove created object");
        }
    }
    client.disconnect().await?;
    Ok(())
}

async fn create(client: &MirrorClient, request: EntityRequest) -> Result<EntityKey> {
    tokio::time::timeout(CREATE_TIMEOUT, client.create(&request))
        .await
        .with_context(|| format!("'{}' timed out", request.command()))?
        .with_context(|| format!("'{}' failed", request.command()))
}

async fn monitor(
    events: &mut tokio::sync::broadcast::Receiver<MirrorEvent>,
    frames: &mut tokio::sync::broadcast::Receiver<flexmirror::Frame>,
    duration: Duration,
) -> BTreeMap<u32, FrameTally> {
    let start = tokio::time::Instant::now();
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    let mut tally: BTreeMap<u32, FrameTally> = BTreeMap::new();
    let mut frames_open = true;

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => {
                let elapsed = start.elapsed();
                let timestamp = format!("{:>6}.{:03}s", elapsed.as_secs(), elapsed.subsec_millis());
                match event {
                    Ok(MirrorEvent::EntityAdded(entity)) => {
                        println!("{} Added        {}{}", timestamp, entity.key(), describe(entity.fields()));
                    }
                    Ok(MirrorEvent::EntityRemoved(key)) => {
                        println!("{} Removed      {}", timestamp, key);
                    }
                    Ok(MirrorEvent::ThroughputUpdated { stream_id, bytes_per_sec }) => {
                        println!("{} Throughput   0x{:08X} {} B/s", timestamp, stream_id, bytes_per_sec);
                    }
                    Ok(MirrorEvent::Disconnected) => {
                        println!("{} Disconnected", timestamp);
                        break;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => println!("(missed {} events)", n),
                    Err(RecvError::Closed) => break,
                }
            }
            frame = frames.recv(), if frames_open => {
                match frame {
                    Ok(frame) => {
                        let entry = tally.entry(frame.stream_id).or_default();
                        entry.frames += 1;
                        entry.values += match &frame.data {
                            FrameData::Samples(samples) => samples.len() as u64,
                            FrameData::Bins(bins) => bins.len() as u64,
                        };
                    }
                    Err(RecvError::Lagged(n)) => tracing::debug!(missed = n, "Frame subscriber lagged"),
                    Err(RecvError::Closed) => frames_open = false,
                }
            }
        }
    }
    tally
}

fn describe(fields: &EntityFields) -> String {
    match fields {
        EntityFields::Slice(f) => format!(
            " {:.6} MHz {}",
            f.frequency_hz as f64 / 1_000_000.0,
            f.mode
        ),
        EntityFields::Memory(f) if !f.name.is_empty() => format!(" \"{}\"", f.name),
        EntityFields::AudioStream(f) => format!(" DAX {}", f.dax_channel),
        _ => String::new(),
    }
}

fn print_summary(client: &MirrorClient, tally: &BTreeMap<u32, FrameTally>) {
    println!("\n--- Summary ---");
    println!("Entities mirrored: {}", client.entities().len());

    let streams = client.mirror().attached_streams();
    if streams.is_empty() && tally.is_empty() {
        println!("No stream data received.");
        return;
    }

    println!(
        "{:<12} {:>8} {:>10} {:>8} {:>8} {:>10}",
        "Stream", "Frames", "Values", "Packets", "OOO", "Abandoned"
    );
    let mut ids: Vec<u32> = streams;
    ids.extend(tally.keys().copied());
    ids.sort_unstable();
    ids.dedup();

    for id in ids {
        let counted = tally.get(&id);
        let stats = client.stream_stats(id).unwrap_or_default();
        println!(
            "0x{:08X}   {:>8} {:>10} {:>8} {:>8} {:>10}",
            id,
            counted.map_or(0, |t| t.frames),
            counted.map_or(0, |t| t.values),
            stats.total_packets,
            stats.out_of_order,
            stats.frames_abandoned
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_parse() {
        assert_eq!(parse_dimensions("1024x700"), Ok((1024, 700)));
        assert_eq!(parse_dimensions("640X480"), Ok((640, 480)));
        assert!(parse_dimensions("1024").is_err());
        assert!(parse_dimensions("0x700").is_err());
        assert!(parse_dimensions("wide x tall").is_err());
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["flexmirror-monitor", "--host", "10.0.0.5"]);
        assert_eq!(cli.host, "10.0.0.5");
        assert_eq!(cli.tcp_port, 4992);
        assert_eq!(cli.udp_port, 4991);
        assert_eq!(cli.panadapter, None);
        assert_eq!(cli.audio, None);
        assert_eq!(cli.duration, 10);
    }

    #[test]
    fn cli_rejects_out_of_range_dax_channel() {
        assert!(Cli::try_parse_from(["flexmirror-monitor", "--host", "h", "--audio", "9"]).is_err());
    }
}
