//! waymark-cli — operator CLI for the Waymark tracking server
//!
//! Talks to the HTTP API; useful for smoke tests and live inspection.
//!
//! # Subcommands
//! - `status`                                  — show server health
//! - `active [--json]`                         — list currently open timelines
//! - `detail <timeline-id> [--after] [-n]`     — one page of a timeline's observations
//! - `send --event <START|FINISH|PING> ...`    — inject a location event

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use uuid::Uuid;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8767";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "waymark-cli",
    version,
    about = "Waymark device tracking — operator CLI"
)]
struct Cli {
    /// Waymark HTTP server URL (overrides WAYMARK_HTTP_URL env var)
    #[arg(long, env = "WAYMARK_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show Waymark server status
    Status,

    /// List currently open timelines
    Active {
        /// Output the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show one page of a timeline's observations
    Detail {
        /// Timeline id to inspect
        timeline_id: Uuid,

        /// Resume after this sequence number
        #[arg(long)]
        after: Option<i64>,

        /// Maximum number of observations to return
        #[arg(short = 'n', long)]
        limit: Option<u32>,

        /// Output the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Inject a location event (smoke testing)
    Send {
        /// Event type: START, FINISH or PING
        #[arg(long)]
        event: String,

        /// Device id (omit to register a new device)
        #[arg(long)]
        device: Option<Uuid>,

        /// Device display name
        #[arg(long)]
        name: Option<String>,

        /// Device OS label
        #[arg(long)]
        os: Option<String>,

        #[arg(long, default_value_t = 0.0)]
        lat: f64,

        #[arg(long, default_value_t = 0.0)]
        lon: f64,
    },
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTimelineRow {
    pub id: Uuid,
    pub device_id: Uuid,
    pub device_name: String,
    pub device_os: String,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ActiveResponse {
    pub timelines: Vec<ActiveTimelineRow>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRow {
    pub id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub event_type: String,
    pub sequence: i64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailResponse {
    pub timeline_id: Uuid,
    pub observations: Vec<ObservationRow>,
    pub count: usize,
    pub next_after: Option<i64>,
}

// ============================================================================
// Output Formatting
// ============================================================================

/// One line per open timeline: short id, device, os, start time.
pub fn format_timeline_row(row: &ActiveTimelineRow) -> String {
    let id_hex = row.id.simple().to_string();
    format!(
        "#{}  {}  [{}]  since {}",
        &id_hex[..8],
        row.device_name,
        row.device_os,
        row.start_time.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// One line per observation: sequence, coordinates, event type, time.
pub fn format_observation_row(row: &ObservationRow) -> String {
    format!(
        "{:>8}  ({:>9.4}, {:>9.4})  {:<6}  {}",
        row.sequence,
        row.latitude,
        row.longitude,
        row.event_type,
        row.recorded_at.format("%H:%M:%S")
    )
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client() -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?)
}

fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    let resp = client()?.get(&url).send();

    match resp {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Waymark server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:        {}", body["version"].as_str().unwrap_or("?"));
            println!("Store:          {}", body["store"].as_str().unwrap_or("?"));
            println!("Socket:         {}", body["socket"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            let status = r.status();
            eprintln!("waymark-cli: server unhealthy (HTTP {})", status);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("waymark-cli: cannot reach {} — {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn do_active(server: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/timelines/active", server);
    let resp = client()?.get(&url).send();

    let resp = match resp {
        Ok(r) => r,
        Err(e) => {
            eprintln!("waymark-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("waymark-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    if json_output {
        let body: serde_json::Value = resp.json()?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let active: ActiveResponse = match resp.json() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("waymark-cli: failed to parse response: {}", e);
            std::process::exit(1);
        }
    };

    if active.timelines.is_empty() {
        eprintln!("No active timelines.");
        return Ok(());
    }

    for row in &active.timelines {
        println!("{}", format_timeline_row(row));
    }
    println!("\n{} active timeline(s)", active.count);

    Ok(())
}

fn do_detail(
    server: &str,
    timeline_id: Uuid,
    after: Option<i64>,
    limit: Option<u32>,
    json_output: bool,
) -> anyhow::Result<()> {
    let mut url = format!("{}/timelines/{}/observations", server, timeline_id);
    let mut params = Vec::new();
    if let Some(after) = after {
        params.push(format!("after={}", after));
    }
    if let Some(limit) = limit {
        params.push(format!("limit={}", limit));
    }
    if !params.is_empty() {
        url = format!("{}?{}", url, params.join("&"));
    }

    let resp = client()?.get(&url).send();
    let resp = match resp {
        Ok(r) => r,
        Err(e) => {
            eprintln!("waymark-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("waymark-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    if json_output {
        let body: serde_json::Value = resp.json()?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let detail: DetailResponse = match resp.json() {
        Ok(d) => d,
        Err(e) => {
            eprintln!("waymark-cli: failed to parse response: {}", e);
            std::process::exit(1);
        }
    };

    if detail.observations.is_empty() {
        eprintln!("No observations for timeline {}", timeline_id);
        return Ok(());
    }

    for row in &detail.observations {
        println!("{}", format_observation_row(row));
    }
    if let Some(cursor) = detail.next_after {
        println!("\n{} observation(s); continue with --after {}", detail.count, cursor);
    }

    Ok(())
}

fn do_send(
    server: &str,
    event: String,
    device: Option<Uuid>,
    name: Option<String>,
    os: Option<String>,
    lat: f64,
    lon: f64,
) -> anyhow::Result<()> {
    let url = format!("{}/events", server);
    let mut body = serde_json::json!({
        "latitude": lat,
        "longitude": lon,
        "eventType": event,
    });
    if let Some(device) = device {
        body["deviceId"] = serde_json::json!(device);
    }
    if let Some(name) = name {
        body["deviceName"] = serde_json::json!(name);
    }
    if let Some(os) = os {
        body["os"] = serde_json::json!(os);
    }

    let resp = client()?.post(&url).json(&body).send();
    let resp = match resp {
        Ok(r) => r,
        Err(e) => {
            eprintln!("waymark-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let body: serde_json::Value = resp.json().unwrap_or_default();
    if !status.is_success() {
        eprintln!(
            "waymark-cli: event rejected (HTTP {}): {}",
            status,
            body["error"].as_str().unwrap_or("unknown error")
        );
        std::process::exit(1);
    }

    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Status => do_status(&server),
        Commands::Active { json } => do_active(&server, json),
        Commands::Detail {
            timeline_id,
            after,
            limit,
            json,
        } => do_detail(&server, timeline_id, after, limit, json),
        Commands::Send {
            event,
            device,
            name,
            os,
            lat,
            lon,
        } => do_send(&server, event, device, name, os, lat, lon),
    };

    if let Err(e) = result {
        eprintln!("waymark-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_timeline() -> ActiveTimelineRow {
        ActiveTimelineRow {
            id: "7b5c24ab-1234-5678-9abc-def012345678".parse().unwrap(),
            device_id: Uuid::new_v4(),
            device_name: "Pixel 9".to_string(),
            device_os: "Android 15".to_string(),
            start_time: "2026-08-01T09:30:00Z".parse().unwrap(),
        }
    }

    fn mock_observation(sequence: i64) -> ObservationRow {
        ObservationRow {
            id: Uuid::new_v4(),
            latitude: -6.2001,
            longitude: 106.8166,
            event_type: "PING".to_string(),
            sequence,
            recorded_at: "2026-08-01T09:31:05Z".parse().unwrap(),
        }
    }

    #[test]
    fn timeline_row_shows_short_id_and_device() {
        let line = format_timeline_row(&mock_timeline());
        assert!(line.starts_with("#7b5c24ab"), "short id prefix: {}", line);
        assert!(line.contains("Pixel 9"));
        assert!(line.contains("[Android 15]"));
        assert!(line.contains("2026-08-01 09:30:00 UTC"));
    }

    #[test]
    fn observation_row_shows_sequence_and_coordinates() {
        let line = format_observation_row(&mock_observation(42));
        assert!(line.contains("42"));
        assert!(line.contains("-6.2001"));
        assert!(line.contains("106.8166"));
        assert!(line.contains("PING"));
        assert!(line.contains("09:31:05"));
    }

    #[test]
    fn detail_response_parses_wire_format() {
        let body = serde_json::json!({
            "timelineId": "7b5c24ab-1234-5678-9abc-def012345678",
            "observations": [{
                "id": "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee",
                "timelineId": "7b5c24ab-1234-5678-9abc-def012345678",
                "deviceId": "deadbeef-cafe-babe-face-feeddeadbeef",
                "latitude": 1.0,
                "longitude": 2.0,
                "reverseData": null,
                "eventType": "PING",
                "sequence": 7,
                "recordedAt": "2026-08-01T09:31:05Z"
            }],
            "count": 1,
            "nextAfter": 7
        });
        let detail: DetailResponse = serde_json::from_value(body).unwrap();
        assert_eq!(detail.count, 1);
        assert_eq!(detail.observations[0].sequence, 7);
        assert_eq!(detail.next_after, Some(7));
    }
}
