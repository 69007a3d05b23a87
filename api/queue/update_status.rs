use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::{HeaderMap, Method, StatusCode};
use serde::Deserialize;
use vercel_runtime::{run, service_fn, Error, Request, Response, ResponseBody};

use moodflix_rust::db::get_pool;
use moodflix_rust::session::{self, RequestContext};
use moodflix_rust::watch_queue;

#[derive(Deserialize)]
struct UpdateStatusRequest {
  user_id: String,
  content_id: String,
  content_type: String,
  status: String,
}

async fn handle_update(method: &Method, headers: &HeaderMap, body: Bytes) -> Result<Response<ResponseBody>, Error> {
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

  let parsed: UpdateStatusRequest = serde_json::from_slice(&body).map_err(|e| -> Error {
    Box::new(std::io::Error::other(format!("invalid json body: {e}")))
  })?;

  if parsed.user_id.is_empty() || parsed.content_id.is_empty() || parsed.content_type.is_empty() {
    return session::json_response(
      StatusCode::BAD_REQUEST,
      serde_json::json!({"ok": false, "error": "bad_request", "message": "user_id, content_id and content_type are required"}),
    );
  }

  if !watch_queue::is_valid_status(&parsed.status) {
    return session::json_response(
      StatusCode::BAD_REQUEST,
      serde_json::json!({"ok": false, "error": "bad_request", "message": "status must be queued, watching or watched"}),
    );
  }

  if !session::has_database_url() {
    return session::json_response(
      StatusCode::NOT_IMPLEMENTED,
      serde_json::json!({"ok": false, "error": "not_configured", "message": "Missing TIDB_DATABASE_URL (or DATABASE_URL)"}),
    );
  }

  let ctx = RequestContext::new(parsed.user_id);
  let pool = get_pool().await?;
  let updated = watch_queue::update_status(
    pool,
    &ctx.user_id,
    &parsed.content_id,
    &parsed.content_type,
    &parsed.status,
    ctx.now,
  )
  .await;

  session::json_response(StatusCode::OK, serde_json::json!({"ok": true, "updated": updated}))
}

async fn handler(req: Request) -> Result<Response<ResponseBody>, Error> {
  let method = req.method().clone();
  let headers = req.headers().clone();
  let bytes = req.into_body().collect().await?.to_bytes();
  handle_update(&method, &headers, bytes).await
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
    let response = handle_update(&Method::POST, &headers, Bytes::new()).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn rejects_statuses_outside_the_lifecycle() {
    std::env::set_var("RUST_INTERNAL_TOKEN", "secret");

    let mut headers = HeaderMap::new();
    headers.insert("authorization", "Bearer secret".parse().unwrap());
    headers.insert("content-type", "application/json".parse().unwrap());

    let body = Bytes::from(
      r#"{"user_id":"u1","content_id":"42","content_type":"movie","status":"paused"}"#,
    );
    let response = handle_update(&Method::POST, &headers, body).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  }
}
