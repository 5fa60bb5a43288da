//! Gauss Web API
//!
//! 启动: cargo run --bin gauss-web --features web
//! 端点: POST /solve、POST /solve/batch、GET /health
//! 批量模式逐题各开一个任务，会话之间不共享可变状态。

#![cfg(feature = "web")]

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use gauss::config::{load_config, AppConfig};
use gauss::llm::{create_llm_from_config, LlmClient};
use gauss::solve::{ProblemStatement, SolveLoop, SolveOptions, SolveSession};
use gauss::verify::Verifier;

/// 共享只读状态：配置 + 神谕客户端
struct AppState {
    config: AppConfig,
    oracle: Arc<dyn LlmClient>,
}

#[derive(Debug, Deserialize)]
struct SolveRequest {
    problem: String,
    #[serde(default)]
    max_rounds: Option<u32>,
    #[serde(default)]
    structured: bool,
    #[serde(default)]
    subject: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchSolveRequest {
    problems: Vec<String>,
    #[serde(default)]
    max_rounds: Option<u32>,
    #[serde(default)]
    structured: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    results: Vec<SolveSession>,
    count: usize,
}

fn build_loop(
    state: &AppState,
    max_rounds: Option<u32>,
    structured: bool,
) -> Result<SolveLoop, (StatusCode, String)> {
    let mut options =
        SolveOptions::from_config(&state.config.solver).with_structured(structured);
    if let Some(r) = max_rounds {
        options.max_rounds = r;
    }
    SolveLoop::new(
        state.oracle.clone(),
        Verifier::from_config(&state.config.solver),
        options,
    )
    .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn solve(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SolveRequest>,
) -> Result<Json<SolveSession>, (StatusCode, String)> {
    let solver = build_loop(&state, req.max_rounds, req.structured)?;
    let mut problem = ProblemStatement::new(req.problem);
    if let Some(subject) = req.subject {
        problem = problem.with_subject(subject);
    }
    Ok(Json(solver.run(problem).await))
}

async fn solve_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchSolveRequest>,
) -> Result<Json<BatchResponse>, (StatusCode, String)> {
    // 逐题开任务并行求解；按提交顺序回收结果
    let mut handles = Vec::with_capacity(req.problems.len());
    for text in req.problems {
        let solver = build_loop(&state, req.max_rounds, req.structured)?;
        handles.push(tokio::spawn(async move {
            solver.run(ProblemStatement::new(text)).await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let session = handle
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        results.push(session);
    }

    let count = results.len();
    Ok(Json(BatchResponse { results, count }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gauss::observability::init();

    let config = load_config(None).unwrap_or_default();
    let oracle = create_llm_from_config(&config);
    let state = Arc::new(AppState { config, oracle });

    let app = Router::new()
        .route("/health", get(health))
        .route("/solve", post(solve))
        .route("/solve/batch", post(solve_batch))
        .with_state(state);

    let addr = "0.0.0.0:8080";
    tracing::info!(addr, "gauss-web listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
