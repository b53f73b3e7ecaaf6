use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const TEST_TOKEN: &str = "test-token";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Data {
    pub message: String,
    pub value: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct CreateItem {
    pub name: String,
    #[serde(default)]
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct BulkDelete {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Deleted {
    pub deleted: usize,
}

/// What `/echo` saw.
#[derive(Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub content_type: Option<String>,
    pub body: Option<Value>,
}

pub type Db = Arc<RwLock<HashMap<Uuid, Item>>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/data", get(data))
        .route("/bad-value", get(bad_value))
        .route("/status/{code}", get(status))
        .route("/plain-error", get(plain_error))
        .route("/slow/{ms}", get(slow))
        .route("/secure", get(secure))
        .route("/headers", get(headers))
        .route("/empty", get(empty))
        .route("/echo", post(echo).put(echo).delete(echo))
        .route("/items", post(create_item).delete(delete_items))
        .route("/items/{id}", get(get_item))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn sample() -> Data {
    Data {
        message: "success".to_string(),
        value: 123,
    }
}

async fn data() -> Json<Data> {
    Json(sample())
}

async fn bad_value() -> Json<Value> {
    Json(json!({"message": "success", "value": "not-an-int"}))
}

async fn status(Path(code): Path<u16>) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    let reason = status.canonical_reason().unwrap_or("unknown").to_lowercase();
    Ok((status, Json(json!({ "error": reason }))))
}

async fn plain_error() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "internal failure: database unavailable")
}

async fn slow(Path(ms): Path<u64>) -> Json<Data> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(sample())
}

async fn secure(headers: HeaderMap) -> Result<Json<Data>, (StatusCode, &'static str)> {
    let expected = format!("Bearer {TEST_TOKEN}");
    match headers.get(header::AUTHORIZATION) {
        Some(value) if value.as_bytes() == expected.as_bytes() => Ok(Json(sample())),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            "missing or invalid authorization header",
        )),
    }
}

/// Received headers as a JSON object; repeated headers keep the last value.
async fn headers(headers: HeaderMap) -> Json<HashMap<String, String>> {
    let map = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    Json(map)
}

async fn empty() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> Result<Json<Echo>, StatusCode> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = if body.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&body).map_err(|_| StatusCode::BAD_REQUEST)?)
    };
    Ok(Json(Echo {
        method: method.to_string(),
        content_type,
        body,
    }))
}

async fn create_item(
    State(db): State<Db>,
    Json(input): Json<CreateItem>,
) -> (StatusCode, Json<Item>) {
    let item = Item {
        id: Uuid::new_v4(),
        name: input.name,
        quantity: input.quantity,
    };
    db.write().await.insert(item.id, item.clone());
    tracing::debug!(id = %item.id, "item created");
    (StatusCode::CREATED, Json(item))
}

async fn get_item(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
) -> Result<Json<Item>, (StatusCode, Json<Value>)> {
    let items = db.read().await;
    items
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))))
}

async fn delete_items(State(db): State<Db>, Json(input): Json<BulkDelete>) -> Json<Deleted> {
    let mut items = db.write().await;
    let deleted = input.ids.iter().filter(|id| items.remove(*id).is_some()).count();
    tracing::debug!(requested = input.ids.len(), deleted, "bulk delete");
    Json(Deleted { deleted })
}
