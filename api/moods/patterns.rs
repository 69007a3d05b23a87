use hyper::{HeaderMap, Method, StatusCode, Uri};
use vercel_runtime::{run, service_fn, Error, Request, Response, ResponseBody};

use moodflix_rust::db::get_pool;
use moodflix_rust::mood_engine;
use moodflix_rust::session::{self, RequestContext};

async fn handle_patterns(method: &Method, headers: &HeaderMap, uri: &Uri) -> Result<Response<ResponseBody>, Error> {
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

  if !session::has_database_url() {
    return session::json_response(
      StatusCode::NOT_IMPLEMENTED,
      serde_json::json!({"ok": false, "error": "not_configured", "message": "Missing TIDB_DATABASE_URL (or DATABASE_URL)"}),
    );
  }

  let days = session::query_param(uri.query(), "days")
    .and_then(|v| v.parse::<i64>().ok())
    .unwrap_or(30)
    .clamp(1, 365);

  let ctx = RequestContext::new(user_id);
  let pool = get_pool().await?;
  let patterns = mood_engine::mood_patterns(pool, &ctx.user_id, days, ctx.now).await;

  session::json_response(
    StatusCode::OK,
    serde_json::json!({"ok": true, "days": days, "patterns": patterns}),
  )
}

async fn handler(req: Request) -> Result<Response<ResponseBody>, Error> {
  handle_patterns(req.method(), req.headers(), req.uri()).await
}

#[tokio::main]
async fn main() -> Result<(), Error> {
  run(service_fn(handler)).await
}
