use hyper::{HeaderMap, Method, StatusCode, Uri};
use vercel_runtime::{run, service_fn, Error, Request, Response, ResponseBody};

use moodflix_rust::db::get_pool;
use moodflix_rust::session;
use moodflix_rust::watch_queue;

async fn handle_list(method: &Method, headers: &HeaderMap, uri: &Uri) -> Result<Response<ResponseBody>, Error> {
  if method != Method::GET {
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

  let user_id = session::query_param(uri.query(), "user_id").unwrap_or_default();
  if user_id.is_empty() {
    return session::json_response(
      StatusCode::BAD_REQUEST,
      serde_json::json!({"ok": false, "error": "bad_request", "message": "user_id is required"}),
    );
  }

  let status = session::query_param(uri.query(), "status");
  if let Some(status) = status.as_deref() {
    if !watch_queue::is_valid_status(status) {
      return session::json_response(
        StatusCode::BAD_REQUEST,
        serde_json::json!({"ok": false, "error": "bad_request", "message": "status must be queued, watching or watched"}),
      );
    }
  }

  if !session::has_database_url() {
    return session::json_response(
      StatusCode::NOT_IMPLEMENTED,
      serde_json::json!({"ok": false, "error": "not_configured", "message": "Missing TIDB_DATABASE_URL (or DATABASE_URL)"}),
    );
  }

  let pool = get_pool().await?;
  let items = watch_queue::get_queue(pool, &user_id, status.as_deref()).await;

  session::json_response(
    StatusCode::OK,
    serde_json::json!({"ok": true, "count": items.len(), "items": items}),
  )
}

async fn handler(req: Request) -> Result<Response<ResponseBody>, Error> {
  handle_list(req.method(), req.headers(), req.uri()).await
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
    let uri: Uri = "/api/queue/list?user_id=u1".parse().unwrap();
    let response = handle_list(&Method::GET, &headers, &uri).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn rejects_an_unknown_status_filter() {
    std::env::set_var("RUST_INTERNAL_TOKEN", "secret");

    let mut headers = HeaderMap::new();
    headers.insert("authorization", "Bearer secret".parse().unwrap());

    let uri: Uri = "/api/queue/list?user_id=u1&status=paused".parse().unwrap();
    let response = handle_list(&Method::GET, &headers, &uri).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  }
}
