use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tokio::sync::broadcast;
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::alerts::Alert;
use crate::config::DetectorConfig;
use crate::engine::EngineStats;
use crate::generator::TickGenerator;
use crate::latency::LatencyStats;
use crate::session::SimSession;
use crate::types::{format_clock, RobotState};

#[derive(Clone, Serialize)]
struct DashboardUpdate {
    alerts: Vec<Alert>,
    latency: LatencyUpdate,
    robots: Vec<ActiveRobot>,
    alert_counts: HashMap<String, u64>,
    engine: EngineStats,
    total_ticks: u64,
    robots_injected: u64,
    uptime_secs: u64,
}

#[derive(Clone, Serialize)]
struct LatencyUpdate {
    tick: LatencyStats,
    cycle: LatencyStats,
    detection: LatencyStats,
}

#[derive(Clone, Serialize)]
struct ActiveRobot {
    #[serde(flatten)]
    state: RobotState,
    last_tick_time: String,
}

struct AppState {
    tx: broadcast::Sender<String>,
}

pub async fn run(
    port: u16,
    config: &DetectorConfig,
    robot_rate: f64,
    duration: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, _) = broadcast::channel::<String>(256);
    let state = Arc::new(AppState { tx: tx.clone() });

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .fallback_service(ServeDir::new("static"))
        .with_state(state);

    // Spawn the detection engine
    let engine_tx = tx.clone();
    let engine_config = config.clone();
    tokio::spawn(async move {
        run_engine(engine_tx, engine_config, robot_rate, duration).await;
    });

    let addr = format!("0.0.0.0:{port}");
    info!(%addr, "dashboard at http://localhost:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let rx = state.tx.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, rx))
}

async fn handle_socket(mut socket: WebSocket, mut rx: broadcast::Receiver<String>) {
    while let Ok(msg) = rx.recv().await {
        if socket.send(Message::Text(msg.into())).await.is_err() {
            break;
        }
    }
}

async fn run_engine(tx: broadcast::Sender<String>, config: DetectorConfig, robot_rate: f64, duration: u64) {
    let mut session = SimSession::new(&config, robot_rate);
    let zone = config.display_zone();

    let run_duration = if duration == 0 {
        Duration::from_secs(3600)
    } else {
        Duration::from_secs(duration)
    };

    while session.started.elapsed() < run_duration {
        let alerts = session.step(TickGenerator::now_ms());

        let mut robots: Vec<ActiveRobot> = session
            .engine
            .registry()
            .iter()
            .map(|state| ActiveRobot {
                last_tick_time: format_clock(state.last_tick_ms, zone),
                state: state.clone(),
            })
            .collect();
        robots.sort_by_key(|r| std::cmp::Reverse(r.state.last_tick_ms));

        let update = DashboardUpdate {
            alerts,
            latency: LatencyUpdate {
                tick: session.latency.tick_stats(),
                cycle: session.latency.cycle_stats(),
                detection: session.latency.detection_stats(),
            },
            robots,
            alert_counts: session.alerts.alert_counts().clone(),
            engine: session.engine.stats(),
            total_ticks: session.total_ticks,
            robots_injected: session.generator.robots_injected(),
            uptime_secs: session.uptime_secs(),
        };

        match serde_json::to_string(&update) {
            Ok(json) => {
                // Err only means no dashboard is connected.
                let _ = tx.send(json);
            }
            Err(e) => error!(error = %e, "failed to encode dashboard update"),
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    info!("dashboard engine finished");
}
