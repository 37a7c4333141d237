//! Headless broadcast server: selects capture parameters from the
//! command line, starts a capture session, and stops it on Ctrl-C.

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use glance_core::{CaptureRegion, CaptureSession, MonitorSource, SessionConfig, list_monitors};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Stream a screen region to connected viewers.
#[derive(Parser, Debug)]
#[command(name = "glance-server", version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// TCP port for the viewer endpoint
    #[arg(long, default_value_t = 3900)]
    port: u16,

    /// Target capture frame rate
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// JPEG quality (1-100)
    #[arg(long, default_value_t = 75)]
    quality: u8,

    /// Monitor id to capture (primary display when omitted)
    #[arg(long)]
    monitor: Option<u32>,

    /// Region within the chosen display (full display when omitted)
    #[arg(long, value_parser = parse_region, value_name = "LEFT,TOP,WIDTHxHEIGHT")]
    region: Option<CaptureRegion>,

    /// List available displays and exit
    #[arg(long)]
    list_monitors: bool,
}

/// Parses `"0,0,1920x1080"` into a capture region.
fn parse_region(s: &str) -> Result<CaptureRegion, String> {
    let err = || format!("expected LEFT,TOP,WIDTHxHEIGHT, got {s:?}");
    let (pos, size) = s.rsplit_once(',').ok_or_else(err)?;
    let (left, top) = pos.split_once(',').ok_or_else(err)?;
    let (width, height) = size.split_once('x').ok_or_else(err)?;

    let region = CaptureRegion::new(
        left.trim().parse().map_err(|_| err())?,
        top.trim().parse().map_err(|_| err())?,
        width.trim().parse().map_err(|_| err())?,
        height.trim().parse().map_err(|_| err())?,
    );
    region.validate().map_err(|e| e.to_string())?;
    Ok(region)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.list_monitors {
        for monitor in list_monitors().context("enumerating displays")? {
            println!("{monitor}");
        }
        return Ok(());
    }

    let source =
        MonitorSource::open(args.monitor, args.region).context("opening capture source")?;
    let region = source.region();
    let listen_addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("invalid listen address")?;

    let config = SessionConfig {
        region,
        target_fps: args.fps,
        quality: args.quality,
        listen_addr,
    };
    let session = CaptureSession::start(config, Box::new(source)).await?;
    info!(addr = %session.local_addr(), "streaming; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    session.stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_parses() {
        let region = parse_region("0,0,1920x1080").unwrap();
        assert_eq!(region, CaptureRegion::new(0, 0, 1920, 1080));

        let region = parse_region("-100, 50, 800x600").unwrap();
        assert_eq!(region, CaptureRegion::new(-100, 50, 800, 600));
    }

    #[test]
    fn bad_region_rejected() {
        assert!(parse_region("1920x1080").is_err());
        assert!(parse_region("0,0,1920").is_err());
        assert!(parse_region("0,0,0x600").is_err());
    }
}
