//! Glowsync Report - dashboard series tool
//!
//! Loads the count store and prints display-ready series for both count
//! types, the media correlation table, and active alerts as JSON.
//!
//! Usage:
//!   glowsync-report --config config/dev.toml
//!   glowsync-report --group min --from 2025-12-01 --to 2025-12-02
//!   glowsync-report --season christmas --camera entrance

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use clap::Parser;
use glowsync::domain::timewin::Grouping;
use glowsync::domain::types::CountType;
use glowsync::infra::{BaselineMode, Config};
use glowsync::io::{CountFilter, CountStore, JsonlCountStore};
use glowsync::services::aggregator::{auto_baseline, build_series, correlate, BASELINE_WINDOW_DAYS};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Glowsync Report - aggregated series for the dashboard
#[derive(Parser, Debug)]
#[command(name = "glowsync-report", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Display granularity: min, hour, or day
    #[arg(short, long, default_value = "hour")]
    group: String,

    /// Restrict to one season by name
    #[arg(short, long)]
    season: Option<String>,

    /// Restrict vehicle counts to one camera
    #[arg(long)]
    camera: Option<String>,

    /// Range start, RFC 3339 or local YYYY-MM-DD (inclusive)
    #[arg(long)]
    from: Option<String>,

    /// Range end, RFC 3339 or local YYYY-MM-DD (exclusive)
    #[arg(long)]
    to: Option<String>,

    /// Number of correlation groups to keep
    #[arg(long, default_value_t = 10)]
    top: usize,
}

/// Parse an RFC 3339 instant or a local calendar date (midnight in the
/// display timezone)
fn parse_time(s: &str, tz: Tz) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(dt) = s.parse::<DateTime<Utc>>() {
        return Ok(dt);
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("unparseable time {s}"))?;
    let naive = date.and_hms_opt(0, 0, 0).context("invalid midnight")?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("nonexistent local time {s}"))
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);
    let tz = config.tz();
    let group = Grouping::parse(&args.group);

    let store = JsonlCountStore::open(config.storage_path())?;

    let from = args.from.as_deref().map(|s| parse_time(s, tz)).transpose()?;
    let to = args.to.as_deref().map(|s| parse_time(s, tz)).transpose()?;

    let (baseline_mode, baseline) = match config.baseline_mode() {
        BaselineMode::Manual => ("manual", config.manual_baseline()),
        BaselineMode::Auto => {
            let since = Utc::now() - Duration::days(BASELINE_WINDOW_DAYS);
            let readings = store.device_readings_since(since);
            ("auto", auto_baseline(readings).unwrap_or_else(|| config.manual_baseline()))
        }
    };

    // Camera filtering only applies to the vehicle stream; device counts
    // are site-wide
    let vehicle_filter = CountFilter {
        season: args.season.clone(),
        camera: args.camera.clone(),
        from,
        to,
    };
    let device_filter = CountFilter { season: args.season.clone(), camera: None, from, to };

    let vehicle_rows = store.query(CountType::Vehicle, &vehicle_filter);
    let device_rows = store.query(CountType::DeviceSeen, &device_filter);

    let vehicle = build_series(CountType::Vehicle, &vehicle_rows, group, tz, 0);
    let device_seen = build_series(CountType::DeviceSeen, &device_rows, group, tz, baseline);

    // Which media was playing while vehicles passed
    let primary: Vec<(DateTime<Utc>, i64)> =
        vehicle_rows.iter().map(|r| (r.timestamp, r.value)).collect();
    let top_media = correlate(&primary, &store.state_samples(), args.top);

    let report = serde_json::json!({
        "site": config.site_id(),
        "group": args.group,
        "baseline": { "mode": baseline_mode, "value": baseline },
        "totals": { "vehicle": vehicle.total, "device_seen": device_seen.total },
        "peaks": { "vehicle": vehicle.peak.clone(), "device_seen": device_seen.peak.clone() },
        "vehicle": vehicle,
        "device_seen": device_seen,
        "top_media": top_media,
        "alerts": store.active_alerts(),
    });

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
