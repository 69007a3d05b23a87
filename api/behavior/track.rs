use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::{HeaderMap, Method, StatusCode};
use serde::Deserialize;
use vercel_runtime::{run, service_fn, Error, Request, Response, ResponseBody};

use moodflix_rust::behavior_engine;
use moodflix_rust::db::get_pool;
use moodflix_rust::session;

#[derive(Deserialize)]
struct TrackRequest {
  user_id: String,
  action_type: String,
  content_id: Option<String>,
  content_type: Option<String>,
  metadata: Option<serde_json::Value>,
}

async fn handle_track(method: &Method, headers: &HeaderMap, body: Bytes) -> Result<Response<ResponseBody>, Error> {
  if method != Method::POST {
    return session::json_response(
      StatusCode::METHOD_NOT_ALLOWED,
      serde_json::json!({"ok": false, "error": "method_not_allowed"}),
    );
  }

  if !session::authorized(headers) {
    return session::json_response(
      StatusCode::UNAUTHORIZED,
      serde_json::json!({"ok": false, "error": "unauthorized"}),
    );
  }

  let parsed: TrackRequest = serde_json::from_slice(&body).map_err(|e| -> Error {
    Box::new(std::io::Error::other(format!("invalid json body: {e}")))
  })?;

  if parsed.user_id.is_empty() || parsed.action_type.is_empty() {
    return session::json_response(
      StatusCode::BAD_REQUEST,
      serde_json::json!({"ok": false, "error": "bad_request", "message": "user_id and action_type are required"}),
    );
  }

  if !session::has_database_url() {
    return session::json_response(
      StatusCode::NOT_IMPLEMENTED,
      serde_json::json!({"ok": false, "error": "not_configured", "message": "Missing TIDB_DATABASE_URL (or DATABASE_URL)"}),
    );
  }

  let metadata_json = parsed
    .metadata
    .as_ref()
    .map(|value| value.to_string());

  let pool = get_pool().await?;
  let tracked = behavior_engine::track_behavior(
    pool,
    &parsed.user_id,
    &parsed.action_type,
    parsed.content_id.as_deref(),
    parsed.content_type.as_deref(),
    metadata_json.as_deref(),
  )
  .await;

  session::json_response(StatusCode::OK, serde_json::json!({"ok": true, "tracked": tracked}))
}

async fn handler(req: Request) -> Result<Response<ResponseBody>, Error> {
  let method = req.method().clone();
  let headers = req.headers().clone();
  let bytes = req.into_body().collect().await?.to_bytes();
  handle_track(&method, &headers, bytes).await
}

#[tokio::main]
async fn main() -> Result<(), Error> {
  run(service_fn(handler)).await
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn returns_unauthorized_when_missing_internal_token() {
    std::env::set_var("RUST_INTERNAL_TOKEN", "secret");

    let headers = HeaderMap::new();
    let response = handle_track(&Method::POST, &headers, Bytes::new()).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn requires_an_action_type() {
    std::env::set_var("RUST_INTERNAL_TOKEN", "secret");

    let mut headers = HeaderMap::new();
    headers.insert("authorization", "Bearer secret".parse().unwrap());
    headers.insert("content-type", "application/json".parse().unwrap());

    let body = Bytes::from(r#"{"user_id":"u1","action_type":""}"#);
    let response = handle_track(&Method::POST, &headers, body).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  }
}
