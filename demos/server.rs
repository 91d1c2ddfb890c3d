// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! HTTP front end for the balance ledger.
//!
//! Run with: cargo run --example server
//!
//! # Example Usage
//!
//! ```bash
//! # Win
//! curl -X POST http://localhost:8089/user/1/transaction \
//!   -H "Content-Type: application/json" -H "Source-Type: game" \
//!   -d '{"state": "win", "amount": "10.50", "transactionId": "t1"}'
//!
//! # Lose
//! curl -X POST http://localhost:8089/user/1/transaction \
//!   -H "Content-Type: application/json" -H "Source-Type: payment" \
//!   -d '{"state": "lose", "amount": "2.25", "transactionId": "t2"}'
//!
//! # Balance
//! curl http://localhost:8089/user/1/balance
//! ```

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use balance_ledger::{
    MemoryStore, Outcome, ProcessError, StoreConfig, StoreError, TransactionProcessor,
    TransactionRequest, UserId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

// === Request/Response DTOs ===

/// Request body for `POST /user/{user_id}/transaction`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBody {
    pub state: String,
    pub amount: String,
    pub transaction_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub user_id: u64,
    pub balance: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// === Application State ===

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<TransactionProcessor<MemoryStore>>,
}

// === Error Handling ===

/// Maps processor outcomes onto HTTP responses.
pub struct ApiResponse(Outcome);

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            Outcome::Success { balance } => {
                return (
                    StatusCode::OK,
                    Json(serde_json::json!({ "balance": balance })),
                )
                    .into_response();
            }
            Outcome::ValidationError { message } => (StatusCode::BAD_REQUEST, message),
            Outcome::NotFound { message } => (StatusCode::NOT_FOUND, message),
            Outcome::Conflict { message } => (StatusCode::CONFLICT, message),
            Outcome::InternalError { message } => {
                tracing::error!(%message, "transaction failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

fn parse_user_id(raw: &str) -> Result<u64, ApiResponse> {
    match raw.parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiResponse(Outcome::ValidationError {
            message: "Invalid userId. Must be a positive integer.".to_string(),
        })),
    }
}

// === Handlers ===

/// POST /user/{user_id}/transaction
async fn post_transaction(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<TransactionBody>,
) -> Result<ApiResponse, ApiResponse> {
    let user_id = parse_user_id(&user_id)?;
    let source_type = headers
        .get("Source-Type")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ApiResponse(Outcome::ValidationError {
                message: "Missing Source-Type header".to_string(),
            })
        })?
        .to_string();

    let request = TransactionRequest {
        user_id,
        external_id: body.transaction_id,
        direction: body.state,
        amount: body.amount,
        source_type,
    };

    // The store may block while another request holds the user's row.
    let processor = Arc::clone(&state.processor);
    let outcome = tokio::task::spawn_blocking(move || processor.process(request))
        .await
        .unwrap_or_else(|e| Outcome::InternalError {
            message: e.to_string(),
        });
    Ok(ApiResponse(outcome))
}

/// GET /user/{user_id}/balance
async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiResponse> {
    let user_id = parse_user_id(&user_id)?;
    let user = state
        .processor
        .get_balance(UserId(user_id))
        .map_err(|e: ProcessError| ApiResponse(e.into()))?;

    Ok(Json(BalanceResponse {
        user_id: user.id.0,
        balance: user.balance.to_string(),
    }))
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": { "code": 200, "message": "UP" } }))
}

// === Router ===

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/user/{user_id}/transaction", post(post_transaction))
        .route("/user/{user_id}/balance", get(get_balance))
        .with_state(state)
}

/// Ledger with users 1 to 3 provisioned at zero balance.
fn seeded_state() -> Result<AppState, StoreError> {
    let store = MemoryStore::new(StoreConfig::default());
    for id in 1..=3 {
        store.ensure_user(UserId(id))?;
    }
    Ok(AppState {
        processor: Arc::new(TransactionProcessor::new(store)),
    })
}

// === Main ===

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let state = seeded_state()?;

    let listener = TcpListener::bind("127.0.0.1:8089").await?;
    tracing::info!("balance ledger listening on http://127.0.0.1:8089");

    axum::serve(listener, create_router(state)).await?;
    Ok(())
}
