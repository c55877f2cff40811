use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use powchain_codec::{export_chain, parse_chain, ChainFormat};
use powchain_core::{
    constants::DEFAULT_DIFFICULTY, validate_external_chain, Block, Blockchain, ValidationReport,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

mod constants;
use constants::{DEFAULT_LISTEN, DEFAULT_NONCE_LIMIT};

#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Leading zero hex digits required of every block hash
    #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: usize,

    /// Cap on nonce attempts per mined block; 0 means unbounded
    #[arg(long, default_value_t = DEFAULT_NONCE_LIMIT)]
    nonce_limit: u64,
}

#[derive(Clone)]
struct AppState {
    chain: Arc<RwLock<Blockchain>>,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChainSnapshot {
    difficulty: usize,
    chain: Vec<Block>,
    report: ValidationReport,
}

#[derive(Deserialize)]
struct MineRequest {
    data: Value,
}

#[derive(Serialize)]
struct MineResponse {
    block: Block,
    report: ValidationReport,
}

#[derive(Deserialize)]
struct ValidateParams {
    difficulty: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let nonce_limit = (args.nonce_limit > 0).then_some(args.nonce_limit);
    let chain = Blockchain::with_nonce_limit(args.difficulty, nonce_limit)?;
    let state = AppState {
        chain: Arc::new(RwLock::new(chain)),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/chain", get(get_chain))
        .route("/mine", post(mine))
        .route("/chain/validate", post(validate_upload))
        .route("/chain/export/{format}", get(export))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = args.listen.parse()?;
    info!("powchain-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn get_chain(State(state): State<AppState>) -> Json<ChainSnapshot> {
    let chain = state.chain.read().await;
    Json(ChainSnapshot {
        difficulty: chain.difficulty(),
        chain: chain.blocks().to_vec(),
        report: chain.validate(),
    })
}

/// The only route that mutates the chain. Mining is CPU-bound and holds the
/// single writer for its whole duration, so it runs on the blocking pool.
async fn mine(
    State(state): State<AppState>,
    Json(req): Json<MineRequest>,
) -> Result<Json<MineResponse>, (StatusCode, String)> {
    let chain = state.chain.clone();
    let mined = tokio::task::spawn_blocking(move || {
        let mut guard = chain.blocking_write();
        let block = guard.add_block(req.data)?.clone();
        Ok::<_, powchain_core::Error>((block, guard.validate()))
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    match mined {
        Ok((block, report)) => Ok(Json(MineResponse { block, report })),
        Err(err) => Err((StatusCode::UNPROCESSABLE_ENTITY, err.to_string())),
    }
}

/// Checks an uploaded chain document without touching the live chain. The
/// node's own difficulty applies unless the request overrides it.
async fn validate_upload(
    State(state): State<AppState>,
    Query(params): Query<ValidateParams>,
    body: String,
) -> Result<Json<ValidationReport>, (StatusCode, String)> {
    let records = parse_chain(&body).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let chain = state.chain.read().await;
    let difficulty = params.difficulty.unwrap_or_else(|| chain.difficulty());
    let report = validate_external_chain(&records, difficulty, Some(chain.genesis_hash()));
    Ok(Json(report))
}

async fn export(
    State(state): State<AppState>,
    Path(format): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    let format: ChainFormat = format
        .parse()
        .map_err(|e: powchain_codec::CodecError| (StatusCode::NOT_FOUND, e.to_string()))?;
    let chain = state.chain.read().await;
    let body = export_chain(chain.blocks(), format)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, format.content_type())], body).into_response())
}
