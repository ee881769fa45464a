use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ppg_link::pipeline::sparkline;
use ppg_link::{ChartPoint, ChartSink, PipelineConfig, PipelineEvent, SessionBuilder, SyntheticCamera};

/// Live PPG measurement against a remote processing backend.
///
/// Streams camera frames to the backend, polls the computed signal back and
/// draws it in the terminal until the measurement duration ends or Ctrl-C.
#[derive(Parser, Debug)]
#[command(name = "ppg")]
#[command(about = "💓 Stream a PPG measurement to a backend and chart the result")]
struct Args {
    /// JSON configuration file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend base URL, e.g. http://127.0.0.1:8000/api
    #[arg(short, long)]
    backend: Option<String>,

    /// Measurement length: 40s, 2m, 1h, or "0" for unbounded
    #[arg(short, long, help = "How long to measure: 40s (40 seconds), 2m (2 minutes), 0 (until Ctrl-C)")]
    duration: Option<String>,

    /// Synthetic camera frame rate
    #[arg(short = 'f', long, default_value_t = 30)]
    fps: u32,

    /// Frames held between camera and uploader
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Concurrent uploads
    #[arg(long)]
    max_in_flight: Option<usize>,

    /// Result polling cadence in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<(PipelineConfig, u32)> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(url) = self.backend {
            config.backend.base_url = url;
        }
        if let Some(duration) = &self.duration {
            let seconds = parse_duration(duration)?;
            config.capture.max_duration_ms = (seconds > 0).then(|| u64::from(seconds) * 1000);
        }
        if let Some(n) = self.queue_capacity {
            config.queue_capacity = n;
        }
        if let Some(k) = self.max_in_flight {
            config.max_in_flight = k;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval_ms = ms;
        }
        config.validate()?;
        Ok((config, self.fps))
    }
}

/// Sparkline chart redrawn in place on stderr.
struct TerminalChart {
    width: usize,
}

impl ChartSink for TerminalChart {
    fn render(&mut self, points: &[ChartPoint]) {
        let Some(last) = points.last() else {
            return;
        };
        let mut err = std::io::stderr().lock();
        // Best effort.
        let _ = write!(
            err,
            "\r\x1b[2K{} {:>8.3}",
            sparkline(points, self.width),
            last.value
        );
        let _ = err.flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (config, fps) = Args::parse().into_config()?;
    info!(backend = %config.backend.base_url, fps, "starting measurement");

    let mut session = SessionBuilder::new()
        .with_config(config)
        .with_camera(SyntheticCamera::new(320, 240, fps))
        .with_chart(TerminalChart { width: 60 })
        .start()
        .await?;

    let stop = session.stop_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.cancel();
        }
    });

    if let Some(mut status) = session.status() {
        tokio::spawn(async move {
            while let Some(event) = status.recv().await {
                match event {
                    PipelineEvent::FrameDropped { sequence, attempts, .. } => {
                        warn!(sequence, attempts, "frame dropped")
                    }
                    PipelineEvent::PollFailed { reason, .. } => warn!(%reason, "poll failed"),
                    PipelineEvent::BackendStatus(status) => info!(%status, "backend"),
                    _ => {}
                }
            }
        });
    }

    let reason = session.wait().await;
    eprintln!();
    info!(?reason, "stopping");
    let summary = session.stop().await;
    println!("{summary}");
    Ok(())
}

/// Parse a duration like "30s", "2m", "1h" or a bare number of seconds.
fn parse_duration(duration: &str) -> Result<u32> {
    let duration = duration.trim();
    if let Ok(seconds) = duration.parse::<u32>() {
        return Ok(seconds);
    }

    let Some((split, unit)) = duration.char_indices().last() else {
        anyhow::bail!("Invalid duration format: {:?}", duration);
    };
    let num_str = &duration[..split];
    let num: u32 = num_str
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid number in duration: {:?}", duration))?;

    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        _ => anyhow::bail!(
            "Invalid duration unit: {:?}. Use 's' for seconds, 'm' for minutes, 'h' for hours",
            unit
        ),
    };
    num.checked_mul(multiplier)
        .ok_or_else(|| anyhow::anyhow!("Duration too long: {}", duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("40").unwrap(), 40);
        assert_eq!(parse_duration("40s").unwrap(), 40);
        assert_eq!(parse_duration("2m").unwrap(), 120);
        assert_eq!(parse_duration("1h").unwrap(), 3600);
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn test_parse_duration_rejects_bad_input_without_panicking() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("1é").is_err());
        assert!(parse_duration("é").is_err());
        assert!(parse_duration("99999999m").is_err());
        assert!(parse_duration("4294967h").is_err());
        assert_eq!(parse_duration("71582788m").unwrap(), 4_294_967_280);
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from([
            "ppg",
            "--backend",
            "http://10.0.0.2:9000/api",
            "--duration",
            "0",
            "--queue-capacity",
            "5",
            "--max-in-flight",
            "4",
        ]);
        let (config, fps) = args.into_config().unwrap();
        assert_eq!(fps, 30);
        assert_eq!(config.backend.base_url, "http://10.0.0.2:9000/api");
        assert_eq!(config.capture.max_duration_ms, None);
        assert_eq!(config.queue_capacity, 5);
        assert_eq!(config.max_in_flight, 4);
        assert_eq!(config.poll_interval_ms, 500);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let args = Args::parse_from(["ppg", "--max-in-flight", "0"]);
        assert!(args.into_config().is_err());
    }
}
