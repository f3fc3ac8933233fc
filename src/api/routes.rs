use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::epoch::epoch_number;
use crate::error::{AppError, Result};
use crate::metrics::{HealthSnapshot, LatencyStats, LatencySummary, SyncHealth};
use crate::remote::MarketReader;
use crate::types::{ActivityRecord, MarketGroup, PollKey};
use crate::volume::{aggregate_volume, VolumeTotals};

#[derive(Clone)]
pub struct ApiState {
    pub engine: Engine,
    pub reader: Option<Arc<dyn MarketReader>>,
    pub health: Arc<SyncHealth>,
    pub latency: Arc<LatencyStats>,
    pub epoch_secs: u64,
    pub volume_page_size: u64,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/tick", get(get_tick))
        .route("/markets", get(get_markets))
        .route("/markets/:key", get(get_market))
        .route("/markets/load", post(post_load))
        .route("/markets/refresh", post(post_refresh))
        .route("/markets/trim", post(post_trim))
        .route("/activity", get(get_activity))
        .route("/volume/:address", get(get_volume))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / query structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct KeysBody {
    pub keys: Vec<String>,
}

#[derive(Deserialize)]
pub struct TrimBody {
    pub keep: Vec<String>,
}

#[derive(Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct VolumeQuery {
    pub page_size: Option<u64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub enabled: bool,
    pub tick: u64,
    pub loading: bool,
    pub in_flight: usize,
    pub cached: usize,
    pub pending: usize,
    pub sync: HealthSnapshot,
    pub rpc_latency: LatencySummary,
}

#[derive(Serialize)]
pub struct TickResponse {
    pub tick: u64,
    pub epoch: u64,
    pub epoch_secs: u64,
}

#[derive(Serialize)]
pub struct AcceptedResponse {
    pub requested: usize,
    pub pending: usize,
    pub loading: bool,
}

#[derive(Serialize)]
pub struct TrimResponse {
    pub removed: usize,
    pub cached: usize,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let engine = &state.engine;
    Json(HealthResponse {
        enabled: engine.is_enabled(),
        tick: engine.tick(),
        loading: engine.is_loading(),
        in_flight: engine.in_flight(),
        cached: engine.cached_len(),
        pending: engine.pending_len(),
        sync: state.health.snapshot(),
        rpc_latency: state.latency.summary(),
    })
}

async fn get_tick(State(state): State<ApiState>) -> Json<TickResponse> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    Json(TickResponse {
        tick: state.engine.tick(),
        epoch: epoch_number(now, state.epoch_secs),
        epoch_secs: state.epoch_secs,
    })
}

async fn get_markets(State(state): State<ApiState>) -> Json<BTreeMap<PollKey, MarketGroup>> {
    Json(state.engine.snapshot().into_iter().collect())
}

async fn get_market(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> Result<Json<MarketGroup>> {
    state
        .engine
        .get(&key)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("poll {key} is not cached")))
}

async fn post_load(
    State(state): State<ApiState>,
    Json(body): Json<KeysBody>,
) -> (StatusCode, Json<AcceptedResponse>) {
    let requested = body.keys.len();
    state.engine.request_load(body.keys);
    (
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            requested,
            pending: state.engine.pending_len(),
            loading: state.engine.is_loading(),
        }),
    )
}

async fn post_refresh(
    State(state): State<ApiState>,
    Json(body): Json<KeysBody>,
) -> (StatusCode, Json<AcceptedResponse>) {
    let requested = body.keys.len();
    state.engine.force_refresh(body.keys);
    (
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            requested,
            pending: state.engine.pending_len(),
            loading: state.engine.is_loading(),
        }),
    )
}

async fn post_trim(State(state): State<ApiState>, Json(body): Json<TrimBody>) -> Json<TrimResponse> {
    let removed = state.engine.trim(body.keep);
    Json(TrimResponse {
        removed,
        cached: state.engine.cached_len(),
    })
}

async fn get_activity(
    State(state): State<ApiState>,
    Query(params): Query<ActivityQuery>,
) -> Json<Vec<ActivityRecord>> {
    let mut feed = state.engine.activity();
    if let Some(limit) = params.limit {
        feed.truncate(limit);
    }
    Json(feed)
}

async fn get_volume(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Query(params): Query<VolumeQuery>,
) -> Result<Json<VolumeTotals>> {
    let reader = state
        .reader
        .as_ref()
        .ok_or_else(|| AppError::Config("MARKET_RPC_URL is not set".to_string()))?;
    let page_size = params.page_size.unwrap_or(state.volume_page_size);
    Ok(Json(aggregate_volume(reader.as_ref(), &address, page_size).await))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::FetchSettings;
    use crate::testing::MockReader;
    use crate::types::VolumeRecord;

    fn api(reader: Arc<MockReader>) -> ApiState {
        let health = Arc::new(SyncHealth::new());
        let latency = Arc::new(LatencyStats::new());
        let settings = FetchSettings { retry_delay: Duration::ZERO, ..FetchSettings::default() };
        let (engine, worker) =
            Engine::new(reader.clone(), settings, Arc::clone(&health), Arc::clone(&latency));
        tokio::spawn(async move { worker.run().await });
        ApiState {
            engine,
            reader: Some(reader),
            health,
            latency,
            epoch_secs: 300,
            volume_page_size: 2,
        }
    }

    #[tokio::test]
    async fn load_then_read_back() {
        let reader = Arc::new(MockReader::new());
        reader.set_chance("0xa", 250_000_000);
        let state = api(reader);

        let (status, Json(accepted)) = post_load(
            State(state.clone()),
            Json(KeysBody { keys: vec!["0xA".to_string()] }),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(accepted.requested, 1);
        state.engine.idle().await;

        let Json(markets) = get_markets(State(state.clone())).await;
        assert_eq!(markets.keys().cloned().collect::<Vec<_>>(), vec![PollKey::new("0xa")]);

        let Json(group) = get_market(State(state.clone()), Path("0xA".to_string()))
            .await
            .unwrap();
        assert_eq!(group.amm.map(|m| m.yes_chance), Some(250_000_000));

        let Json(health) = get_health(State(state)).await;
        assert!(health.enabled);
        assert_eq!(health.cached, 1);
        assert_eq!(health.sync.remote_calls, 1);
        assert_eq!(health.rpc_latency.samples, 1);
    }

    #[tokio::test]
    async fn unknown_market_is_not_found() {
        let state = api(Arc::new(MockReader::new()));
        let err = get_market(State(state), Path("0xdead".to_string())).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn volume_is_summed_across_pages() {
        let reader = Arc::new(MockReader::new());
        reader.set_volume(
            "0xm",
            vec![
                VolumeRecord { volume: 5, count: 1 },
                VolumeRecord { volume: 7, count: 2 },
                VolumeRecord { volume: 11, count: 3 },
            ],
        );
        let state = api(reader);

        let Json(totals) = get_volume(
            State(state),
            Path("0xm".to_string()),
            Query(VolumeQuery { page_size: None }),
        )
        .await
        .unwrap();
        assert_eq!(totals.volume, 23);
        assert_eq!(totals.count, 6);
        assert_eq!(totals.pages, 2);
    }

    #[tokio::test]
    async fn volume_without_endpoint_is_config_error() {
        let health = Arc::new(SyncHealth::new());
        let state = ApiState {
            engine: Engine::disabled(Arc::clone(&health)),
            reader: None,
            health,
            latency: Arc::new(LatencyStats::new()),
            epoch_secs: 300,
            volume_page_size: 100,
        };
        let err = get_volume(State(state), Path("0xm".to_string()), Query(VolumeQuery { page_size: None }))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
