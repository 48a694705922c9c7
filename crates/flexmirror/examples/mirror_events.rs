//! Watch the radio's objects appear, change and disappear.
//!
//! Connects to a FlexRadio, subscribes to the mirror's event stream and
//! prints every lifecycle event for 60 seconds. Open a panadapter or tune a
//! slice in SmartSDR while this runs to generate traffic.
//!
//! # Requirements
//!
//! - A FlexRadio 6000/8000 series radio reachable on the network
//!
//! # Usage
//!
//! ```sh
//! cargo run -p flexmirror --example mirror_events -- 192.168.1.100
//! ```

use std::time::Duration;

use flexmirror::smartsdr::entity::EntityFields;
use flexmirror::{MirrorBuilder, MirrorEvent};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let host = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "192.168.1.100".to_string());

    println!("Connecting to {}...", host);

    let client = MirrorBuilder::new().host(&host).build().await?;
    let version = client.version();
    println!(
        "Connected: SmartSDR {}.{}.{}.{} handle 0x{:08X}\n",
        version.major,
        version.minor,
        version.patch,
        version.build,
        client.client_handle()
    );

    let mut events = client.subscribe();
    println!("Monitoring for 60 seconds...\n");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(60);

    println!("{:<12} Event", "Timestamp");
    println!("{:-<12} {:-<50}", "", "");

    let start = tokio::time::Instant::now();

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(event)) => {
                let elapsed = start.elapsed();
                let timestamp = format!("{:>6}.{:03}s", elapsed.as_secs(), elapsed.subsec_millis());

                match event {
                    MirrorEvent::EntityAdded(entity) => {
                        let owner = if entity.is_owned() { "ours" } else { "shared" };
                        match entity.fields() {
                            EntityFields::Slice(f) => println!(
                                "{} EntityAdded       {} {:.6} MHz {} ({})",
                                timestamp,
                                entity.key(),
                                f.frequency_hz as f64 / 1_000_000.0,
                                f.mode,
                                owner
                            ),
                            _ => println!("{} EntityAdded       {} ({})", timestamp, entity.key(), owner),
                        }
                    }
                    MirrorEvent::EntityUpdated { entity, changed } => {
                        println!(
                            "{} EntityUpdated     {} [{}]",
                            timestamp,
                            entity.key(),
                            changed.join(", ")
                        );
                    }
                    MirrorEvent::EntityRemoved(key) => {
                        println!("{} EntityRemoved     {}", timestamp, key);
                    }
                    MirrorEvent::ThroughputUpdated {
                        stream_id,
                        bytes_per_sec,
                    } => {
                        println!(
                            "{} Throughput        0x{:08X} {} B/s",
                            timestamp, stream_id, bytes_per_sec
                        );
                    }
                    MirrorEvent::RadioMessage { code, text } => {
                        println!("{} RadioMessage      0x{:08X} {}", timestamp, code, text);
                    }
                    MirrorEvent::Connected { handle } => {
                        println!("{} Connected         0x{:08X}", timestamp, handle);
                    }
                    MirrorEvent::Disconnected => {
                        println!("{} Disconnected", timestamp);
                        break;
                    }
                }
            }
            Ok(Err(RecvError::Lagged(n))) => {
                println!("(missed {} events -- subscriber fell behind)", n);
            }
            Ok(Err(RecvError::Closed)) => {
                println!("Event channel closed.");
                break;
            }
            Err(_) => break,
        }
    }

    println!("\n{} entities mirrored at exit.", client.entities().len());
    client.disconnect().await?;
    Ok(())
}
