//! A small HTTP service standing in for a system under load.
//!
//! Routes (all accept GET and POST):
//!
//! - `/` answers 200 immediately.
//! - `/delay/ms/:delay_ms` answers 200 after a fixed delay.
//! - `/noisy/ms/:mean_ms` answers 200 after a skew-normal delay around the mean.
//! - `/status/:code` answers with the given status.
//! - `/max/:max_tps` answers 200 up to `max_tps` requests per second and 500 beyond.
//! - `/stats` returns the hit count as JSON.
use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    routing::{any, get},
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use metrics::counter;
use rand_distr::{Distribution, SkewNormal};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

#[derive(Clone, Default)]
pub struct ServiceState {
    hits: Arc<AtomicU64>,
    limiters: Arc<RwLock<HashMap<u32, Arc<DefaultDirectRateLimiter>>>>,
}

impl ServiceState {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    fn hit(&self) {
        counter!("mock_service_requests").increment(1);
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn limiter(&self, max_tps: NonZeroU32) -> Arc<DefaultDirectRateLimiter> {
        let read = self
            .limiters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&max_tps.get())
            .cloned();
        if let Some(limiter) = read {
            return limiter;
        }

        self.limiters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(max_tps.get())
            .or_insert_with(|| Arc::new(rate_limiter(max_tps)))
            .clone()
    }
}

pub fn router(state: ServiceState) -> Router {
    Router::new()
        .route("/", any(ok))
        .route("/delay/ms/:delay_ms", any(delay))
        .route("/noisy/ms/:mean_ms", any(noisy))
        .route("/status/:code", any(status))
        .route("/max/:max_tps", any(max))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on `addr` until the process exits.
pub async fn run(addr: SocketAddr) -> anyhow::Result<()> {
    let state = ServiceState::default();
    tokio::spawn(tps_measure_task(state.clone()));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Mock service listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// An instance on an ephemeral local port, for tests.
pub struct MockService {
    addr: SocketAddr,
    state: ServiceState,
    handle: JoinHandle<()>,
}

impl MockService {
    pub async fn start() -> anyhow::Result<Self> {
        let state = ServiceState::default();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let app = router(state.clone());
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!("Mock service failed: {err}");
            }
        });
        debug!("Mock service started on {addr}");

        Ok(Self {
            addr,
            state,
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn hits(&self) -> u64 {
        self.state.hits()
    }
}

impl Drop for MockService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn ok(State(state): State<ServiceState>) {
    state.hit();
}

#[debug_handler]
async fn delay(State(state): State<ServiceState>, Path(delay_ms): Path<u64>) {
    state.hit();
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}

async fn noisy(State(state): State<ServiceState>, Path(mean_ms): Path<u64>) {
    state.hit();
    let mean = mean_ms as f64 / 1000.;
    let latency = match SkewNormal::new(mean, mean / 4., 20.) {
        Ok(normal) => normal.sample(&mut rand::thread_rng()).max(0.),
        Err(_) => mean,
    };
    tokio::time::sleep(Duration::from_secs_f64(latency)).await;
}

async fn status(State(state): State<ServiceState>, Path(code): Path<u16>) -> StatusCode {
    state.hit();
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn max(
    State(state): State<ServiceState>,
    Path(max_tps): Path<u32>,
) -> Result<(), StatusCode> {
    state.hit();
    let max_tps = NonZeroU32::new(max_tps).ok_or(StatusCode::BAD_REQUEST)?;
    state
        .limiter(max_tps)
        .check()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Stats {
    pub hits: u64,
}

async fn stats(State(state): State<ServiceState>) -> Json<Stats> {
    Json(Stats { hits: state.hits() })
}

pub fn rate_limiter(tps: NonZeroU32) -> DefaultDirectRateLimiter {
    RateLimiter::direct(Quota::per_second(tps))
}

async fn tps_measure_task(state: ServiceState) {
    let mut last = 0;
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let hits = state.hits();
        info!("{} TPS", hits - last);
        last = hits;
    }
}
