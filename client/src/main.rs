use clap::Parser;
use client::connection::RelayClient;
use client::world::WorldView;
use log::{error, info};
use shared::{axes, Motion};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay WebSocket URL
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8888/ws")]
    url: String,

    /// Session token presented at connect time
    #[arg(short = 't', long)]
    token: String,

    /// Number of updates to send before disconnecting
    #[arg(short = 'n', long, default_value = "100")]
    updates: u32,

    /// Milliseconds between updates
    #[arg(short = 'i', long, default_value = "50")]
    interval_ms: u64,

    /// Radius of the scripted orbit
    #[arg(short = 'r', long, default_value = "20.0")]
    radius: f64,
}

/// Motion along a circle in the xz-plane, facing the direction of travel.
fn orbit(step: u32, radius: f64, period: Duration) -> Motion {
    let angle = step as f64 * 0.1;
    let angular_speed = 0.1 / period.as_secs_f64().max(f64::EPSILON);

    Motion {
        position: axes(radius * angle.cos(), 10.0, radius * angle.sin()),
        rotation: axes(0.0, -angle, 0.0),
        velocity: axes(
            -radius * angular_speed * angle.sin(),
            0.0,
            radius * angular_speed * angle.cos(),
        ),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let period = Duration::from_millis(args.interval_ms.max(1));

    info!("Connecting to: {}", args.url);
    let mut relay = RelayClient::connect(&args.url, &args.token).await?;
    let mut world = WorldView::new();

    world.apply(relay.recv().await?);
    info!(
        "Joined as {} with {} players present",
        world.self_id().map(|id| id.as_str()).unwrap_or("?"),
        world.len()
    );

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sent = 0;

    while sent < args.updates {
        tokio::select! {
            message = relay.next_message() => match message {
                Ok(Some(message)) => world.apply(message),
                Ok(None) => {
                    info!("Relay closed the connection");
                    return Ok(());
                }
                Err(e) => {
                    error!("Error receiving message: {}", e);
                    return Err(e.into());
                }
            },
            _ = ticker.tick() => {
                let motion = orbit(sent, args.radius, period);
                relay.send_update(&motion).await?;
                world.set_own_motion(motion);
                sent += 1;

                if sent % 20 == 0 {
                    info!("Sent {} updates, {} other players visible", sent, world.others().count());
                }
            }
        }
    }

    relay.close().await?;
    info!("Disconnected after {} updates", sent);
    Ok(())
}
