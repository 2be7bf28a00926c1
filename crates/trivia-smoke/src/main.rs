//! SDA Trivia smoke harness.
//!
//! Drives one worker generation through install, activate, online and
//! offline navigation, asset serving, messaging and notification clicks,
//! then submits sample scores to a leaderboard. Prints a JSON report and
//! exits non-zero if any check failed.

mod site;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tokio::sync::mpsc;
use tracing::{error, info};
use trivia_common::init_logging;
use trivia_core::{CallerIdentity, TriviaConfig};
use trivia_leaderboard::{Leaderboard, LeaderboardStore, MemoryStore, SqliteStore};
use trivia_sw::{
    ClientType, EventOutcome, FetchRequest, MessageEvent, Network, Notification,
    NotificationClickEvent, NotificationPayload, ReqwestNetwork, ResponseSource, ServiceWorker,
    WorkerEvent, WorkerMessage, PRAYER_REMINDER,
};

use crate::site::{static_site, SwitchableNetwork};

#[derive(Parser, Debug)]
#[command(name = "trivia-smoke")]
#[command(about = "End-to-end smoke run of the offline worker and leaderboard")]
struct Args {
    /// Config file (falls back to $TRIVIA_CONFIG, then defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the files named in the manifest
    #[arg(long, conflicts_with = "live")]
    site_dir: Option<PathBuf>,

    /// Fetch the manifest from the configured origin instead
    #[arg(long)]
    live: bool,

    /// SQLite leaderboard file (in-memory store when omitted)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Also write the report here
    #[arg(long)]
    report: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short)]
    verbose: bool,
}

/// One named pass/fail result.
#[derive(Debug, Serialize)]
struct Check {
    name: &'static str,
    passed: bool,
    detail: JsonValue,
}

#[derive(Debug, Default, Serialize)]
struct SmokeReport {
    generation: String,
    checks: Vec<Check>,
    duration_ms: u128,
}

impl SmokeReport {
    fn record(&mut self, name: &'static str, passed: bool, detail: JsonValue) {
        if passed {
            info!(check = name, "passed");
        } else {
            error!(check = name, %detail, "FAILED");
        }
        self.checks.push(Check {
            name,
            passed,
            detail,
        });
    }

    fn failures(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }
}

fn source_name(source: &ResponseSource) -> &'static str {
    match source {
        ResponseSource::Network => "network",
        ResponseSource::Cache(step) => step.name(),
    }
}

fn reminder(reminder_id: &str) -> Notification {
    Notification::new(
        "Time to pray",
        NotificationPayload {
            kind: PRAYER_REMINDER.to_string(),
            reminder_id: reminder_id.to_string(),
            prayer_list_id: Some("morning".to_string()),
        },
    )
}

async fn run_worker(config: &TriviaConfig, args: &Args, report: &mut SmokeReport) -> Result<()> {
    let origin = config.worker.origin_url()?;

    let upstream: Arc<dyn Network> = if args.live {
        Arc::new(ReqwestNetwork::new(config.worker.request_timeout())?)
    } else {
        Arc::new(static_site(&origin, &config.worker.manifest, args.site_dir.as_deref())?)
    };
    let network = Arc::new(SwitchableNetwork::new(upstream));

    let (worker, mut state_rx) = ServiceWorker::new(&config.worker, network.clone())?;
    report.generation = worker.generation().to_string();

    let (_window, mut window_rx) = worker
        .clients()
        .write()
        .await
        .connect(origin.clone(), ClientType::Window, true);

    match worker.dispatch(WorkerEvent::Install).await {
        Ok(EventOutcome::Installed(installed)) => report.record(
            "install",
            installed.cached == config.worker.manifest.len(),
            json!({ "cached": installed.cached, "attempts": installed.attempts }),
        ),
        Ok(other) => report.record("install", false, json!(format!("{other:?}"))),
        Err(e) => {
            report.record("install", false, json!(e.to_string()));
            return Ok(());
        }
    }

    let activated = worker.activate().await?;
    let generations = worker.caches().read().await.keys();
    report.record(
        "activate",
        generations == vec![activated.generation.clone()],
        json!({ "generations": generations, "deleted": activated.deleted }),
    );

    let online = worker.fetch(&FetchRequest::navigate(origin.clone())).await;
    report.record(
        "navigate-online",
        online.as_ref().is_ok_and(|r| r.ok() && r.source == ResponseSource::Network),
        json!(online.as_ref().map(|r| source_name(&r.source)).map_err(|e| e.to_string())),
    );

    network.set_offline(true);

    let deep_link = origin.join("/quiz/round-7.html")?;
    let offline = worker.fetch(&FetchRequest::navigate(deep_link)).await;
    report.record(
        "navigate-offline-fallback",
        offline.as_ref().is_ok_and(|r| r.from_cache_hit()),
        json!(offline.as_ref().map(|r| source_name(&r.source)).map_err(|e| e.to_string())),
    );

    if let Some(asset) = config.worker.manifest.iter().find(|p| p.contains('.') && !p.ends_with(".html")) {
        let response = worker.fetch(&FetchRequest::get(origin.join(asset)?)).await;
        report.record(
            "asset-cache-first",
            response.as_ref().is_ok_and(|r| r.from_cache_hit()),
            json!({ "path": asset, "ok": response.is_ok() }),
        );
    }

    network.set_offline(false);

    let (port_tx, mut port_rx) = mpsc::unbounded_channel();
    worker
        .dispatch(WorkerEvent::Message(MessageEvent {
            data: json!({ "type": "ping" }),
            port: Some(port_tx),
        }))
        .await?;
    let reply = port_rx.try_recv().ok();
    report.record(
        "ping-ack",
        reply == Some(WorkerMessage::ack()),
        json!(reply),
    );

    let mut routes = Vec::new();
    for action in [Some("pray"), Some("snooze"), None] {
        let outcome = worker
            .dispatch(WorkerEvent::NotificationClick(NotificationClickEvent {
                notification: reminder("r-1"),
                action: action.map(str::to_string),
            }))
            .await?;
        if let EventOutcome::NotificationClick(click) = outcome {
            routes.push(json!({
                "action": action,
                "route": format!("{:?}", click.route),
                "closed": click.notification.is_closed(),
            }));
        }
    }

    let mut delivered = Vec::new();
    while let Ok(message) = window_rx.try_recv() {
        delivered.push(message);
    }
    report.record(
        "notification-clicks",
        routes.len() == 3 && delivered.len() == 3,
        json!({ "routes": routes, "messages": delivered }),
    );

    let mut states = Vec::new();
    while let Ok(change) = state_rx.try_recv() {
        states.push(format!("{:?}", change.state));
    }
    report.record(
        "lifecycle-events",
        states.last().map(String::as_str) == Some("Activated"),
        json!(states),
    );

    Ok(())
}

fn run_leaderboard<S: LeaderboardStore>(board: Leaderboard<S>, report: &mut SmokeReport) -> Result<()> {
    let player = CallerIdentity::new("smoke-player").with_profile("Smoke Player", None);
    let plausible = json!({
        "score": 500,
        "time": 40,
        "questionCount": 20,
        "correctAnswers": 18,
        "longestStreak": 6,
        "powerUpsUsed": 1,
        "gameMode": "classic",
        "startedAtMs": 0,
        "endedAtMs": 40000,
    });

    let accepted = board.handle_call(Some(&player), &plausible);
    report.record("submit-valid", accepted == json!({ "ok": true }), accepted);

    let too_fast = json!({ "questionCount": 10, "startedAtMs": 1000, "endedAtMs": 1500 });
    let rejected = board.handle_call(Some(&player), &too_fast);
    report.record(
        "submit-too-fast",
        rejected["error"]["code"] == "failed-precondition",
        rejected,
    );

    let anonymous = board.handle_call(None, &plausible);
    report.record(
        "submit-unauthenticated",
        anonymous["error"]["code"] == "unauthenticated",
        anonymous,
    );

    let top = board.top(5)?;
    report.record(
        "leaderboard-top",
        board.store().count()? == 1 && top.first().map(|e| e.score) == Some(500),
        json!(top),
    );

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TriviaConfig::load_or_default(args.config.as_deref()).context("loading config")?;

    let mut log_config = config.logging.to_log_config();
    if args.verbose {
        log_config = log_config.with_filter("debug");
    }
    init_logging(log_config)?;

    let started = Instant::now();
    let mut report = SmokeReport::default();

    run_worker(&config, &args, &mut report).await?;

    match &args.db {
        Some(path) => {
            let store = SqliteStore::open(path)?;
            run_leaderboard(Leaderboard::new(store, config.leaderboard.clone()), &mut report)?;
        }
        None => {
            run_leaderboard(Leaderboard::new(MemoryStore::new(), config.leaderboard.clone()), &mut report)?;
        }
    }

    report.duration_ms = started.elapsed().as_millis();
    let rendered = serde_json::to_string_pretty(&report)?;
    println!("{rendered}");

    if let Some(path) = &args.report {
        std::fs::write(path, &rendered).with_context(|| format!("writing {}", path.display()))?;
    }

    let failures = report.failures();
    if failures > 0 {
        anyhow::bail!("{failures} smoke check(s) failed");
    }
    Ok(())
}
