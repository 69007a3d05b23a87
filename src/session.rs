use chrono::{DateTime, NaiveDate, Utc};
use hyper::{HeaderMap, StatusCode};
use vercel_runtime::{Error, Response, ResponseBody};

/// Per-request context built by each handler after authentication. Replaces
/// any ambient per-session state: everything a handler passes down travels
/// through this value.
#[derive(Debug, Clone)]
pub struct RequestContext {
  pub user_id: String,
  pub now: DateTime<Utc>,
}

impl RequestContext {
  pub fn new(user_id: impl Into<String>) -> RequestContext {
    RequestContext {
      user_id: user_id.into(),
      now: Utc::now(),
    }
  }

  pub fn today(&self) -> NaiveDate {
    self.now.date_naive()
  }
}

pub fn bearer_token(header_value: Option<&str>) -> Option<&str> {
  let value = header_value?;
  value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))
}

pub fn authorized(headers: &HeaderMap) -> bool {
  let expected = std::env::var("RUST_INTERNAL_TOKEN").unwrap_or_default();
  let provided = bearer_token(headers.get("authorization").and_then(|v| v.to_str().ok()))
    .unwrap_or("");

  !expected.is_empty() && provided == expected
}

pub fn has_database_url() -> bool {
  std::env::var("TIDB_DATABASE_URL")
    .or_else(|_| std::env::var("DATABASE_URL"))
    .map(|v| !v.is_empty())
    .unwrap_or(false)
}

pub fn query_param(query: Option<&str>, key: &str) -> Option<String> {
  let q = query?;
  for pair in q.split('&') {
    let mut it = pair.splitn(2, '=');
    let k = it.next().unwrap_or("");
    let v = it.next().unwrap_or("");
    if k == key {
      return Some(v.replace('+', " "));
    }
  }
  None
}

pub fn json_response(
  status: StatusCode,
  value: serde_json::Value,
) -> Result<Response<ResponseBody>, Error> {
  Ok(
    Response::builder()
      .status(status)
      .header("content-type", "application/json; charset=utf-8")
      .body(ResponseBody::from(value))?,
  )
}
