//! Prometheus-compatible metrics endpoint
//!
//! Default endpoint: http://localhost:9090/metrics

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

const TICK_HISTORY: usize = 1000;

/// Metrics registry for the dodgeball server
#[derive(Debug)]
pub struct Metrics {
    // Gauges
    pub arenas: AtomicU64,
    pub matches_running: AtomicU64,
    pub active_balls: AtomicU64,
    pub participants: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // Gameplay counters
    pub throws: AtomicU64,
    pub hits: AtomicU64,
    pub catches: AtomicU64,
    pub pickups: AtomicU64,
    pub ball_faults: AtomicU64,
    pub matches_completed: AtomicU64,

    start_time: Instant,
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            arenas: AtomicU64::new(0),
            matches_running: AtomicU64::new(0),
            active_balls: AtomicU64::new(0),
            participants: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            throws: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            catches: AtomicU64::new(0),
            pickups: AtomicU64::new(0),
            ball_faults: AtomicU64::new(0),
            matches_completed: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY)),
        }
    }

    /// Record a tick time and update the rolling p95 / max
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            self.tick_time_p95_us
                .store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us
                .store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("dodgeball_arenas", "Registered arenas", "gauge",
            self.arenas.load(Ordering::Relaxed));
        metric!("dodgeball_matches_running", "Matches in progress", "gauge",
            self.matches_running.load(Ordering::Relaxed));
        metric!("dodgeball_active_balls", "Balls in flight or resting", "gauge",
            self.active_balls.load(Ordering::Relaxed));
        metric!("dodgeball_participants", "Players in any arena", "gauge",
            self.participants.load(Ordering::Relaxed));

        metric!("dodgeball_tick_time_microseconds", "Last tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("dodgeball_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("dodgeball_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("dodgeball_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));

        metric!("dodgeball_throws_total", "Balls thrown", "counter",
            self.throws.load(Ordering::Relaxed));
        metric!("dodgeball_hits_total", "Hits registered", "counter",
            self.hits.load(Ordering::Relaxed));
        metric!("dodgeball_catches_total", "Balls caught", "counter",
            self.catches.load(Ordering::Relaxed));
        metric!("dodgeball_pickups_total", "Neutral balls picked up", "counter",
            self.pickups.load(Ordering::Relaxed));
        metric!("dodgeball_ball_faults_total", "Balls removed after a fault", "counter",
            self.ball_faults.load(Ordering::Relaxed));
        metric!("dodgeball_matches_completed_total", "Matches ended", "counter",
            self.matches_completed.load(Ordering::Relaxed));
        metric!("dodgeball_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// JSON view of the same values
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "gauges": {
                "arenas": self.arenas.load(Ordering::Relaxed),
                "matches_running": self.matches_running.load(Ordering::Relaxed),
                "active_balls": self.active_balls.load(Ordering::Relaxed),
                "participants": self.participants.load(Ordering::Relaxed),
            },
            "performance": {
                "tick_time_us": self.tick_time_us.load(Ordering::Relaxed),
                "tick_time_p95_us": self.tick_time_p95_us.load(Ordering::Relaxed),
                "tick_time_max_us": self.tick_time_max_us.load(Ordering::Relaxed),
                "tick_count": self.tick_count.load(Ordering::Relaxed),
            },
            "gameplay": {
                "throws": self.throws.load(Ordering::Relaxed),
                "hits": self.hits.load(Ordering::Relaxed),
                "catches": self.catches.load(Ordering::Relaxed),
                "pickups": self.pickups.load(Ordering::Relaxed),
                "ball_faults": self.ball_faults.load(Ordering::Relaxed),
                "matches_completed": self.matches_completed.load(Ordering::Relaxed),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    // More specific paths first
                    let response = if request.starts_with("GET /metrics/json") {
                        http_response("application/json", &metrics.to_json())
                    } else if request.starts_with("GET /metrics") {
                        http_response("text/plain; version=0.0.4", &metrics.to_prometheus())
                    } else if request.starts_with("GET /health") {
                        http_response("text/plain", "OK")
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                            .to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_tick_time() {
        let metrics = Metrics::new();
        for i in 0..100 {
            metrics.record_tick_time(Duration::from_micros(100 + i * 10));
        }

        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 100);
        assert_eq!(metrics.tick_time_us.load(Ordering::Relaxed), 1090);
        assert_eq!(metrics.tick_time_max_us.load(Ordering::Relaxed), 1090);
        let p95 = metrics.tick_time_p95_us.load(Ordering::Relaxed);
        assert!((1040..=1060).contains(&p95));
    }

    #[test]
    fn test_tick_history_is_bounded() {
        let metrics = Metrics::new();
        metrics.record_tick_time(Duration::from_millis(50));
        for _ in 0..TICK_HISTORY {
            metrics.record_tick_time(Duration::from_micros(10));
        }
        // The slow sample has rolled out of the window
        assert_eq!(metrics.tick_time_max_us.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.active_balls.store(7, Ordering::Relaxed);
        metrics.hits.store(3, Ordering::Relaxed);

        let output = metrics.to_prometheus();
        assert!(output.contains("dodgeball_active_balls 7"));
        assert!(output.contains("dodgeball_hits_total 3"));
        assert!(output.contains("# TYPE dodgeball_hits_total counter"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.arenas.store(2, Ordering::Relaxed);

        let value: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(value["gauges"]["arenas"], 2);
        assert_eq!(value["gameplay"]["throws"], 0);
    }
}
