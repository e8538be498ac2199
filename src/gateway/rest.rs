//! HTTP gateway for the hosted store's table REST endpoint
//!
//! Speaks the PostgREST dialect: `select`/`order`/`limit` query parameters,
//! `column=eq.value` filters and `Prefer: return=representation` so writes
//! echo the stored rows. The hosted realtime socket is not spoken here; the
//! change feed polls the table and diffs consecutive snapshots instead.

use super::{ChangeEvent, ChangeKind, ChangeStream, OrderSpec, RowQuery, SubscriptionHandle, TableGateway};
use crate::config::RemoteConfig;
use crate::core::{ID_COLUMN, RawRow, Result, SyncError, row_id};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

const PREFER_REPRESENTATION: (&str, &str) = ("Prefer", "return=representation");

/// Shared HTTP client for every table of one project.
#[derive(Debug, Clone)]
pub struct RestClient {
    config: RemoteConfig,
    http: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
    /// Signed-in user's token, sent instead of the anon key.
    access_token: Option<String>,
}

impl RestClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        config.validate().map_err(SyncError::Query)?;

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.anon_key)
            .map_err(|err| SyncError::Query(format!("invalid anon key: {err}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.anon_key))
            .map_err(|err| SyncError::Query(format!("invalid anon key: {err}")))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            config: config.clone(),
            http,
            base_url: config.rest_url(),
            poll_interval: config.poll_interval,
            access_token: None,
        })
    }

    /// Client for an optional configuration; `RemoteUnavailable` without one.
    pub fn connect(config: Option<&RemoteConfig>) -> Result<Self> {
        match config {
            Some(config) => Self::new(config),
            None => Err(SyncError::RemoteUnavailable),
        }
    }

    /// Same client acting on behalf of a signed-in user, so row level
    /// policies see that user.
    pub fn with_access_token(&self, token: &str) -> Self {
        Self {
            access_token: Some(token.to_string()),
            ..self.clone()
        }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Gateway bound to one table.
    pub fn table(&self, name: &str) -> RestGateway {
        RestGateway {
            client: self.clone(),
            table: name.to_string(),
        }
    }
}

/// [`TableGateway`] over HTTP for one table.
#[derive(Debug, Clone)]
pub struct RestGateway {
    client: RestClient,
    table: String,
}

impl RestGateway {
    fn request(&self, method: Method) -> RequestBuilder {
        let url = format!("{}/{}", self.client.base_url, self.table);
        let request = self.client.http.request(method, url);
        match &self.client.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn rows(response: Response) -> Result<Vec<RawRow>> {
        let rows = response.json::<Vec<RawRow>>().await?;
        Ok(rows)
    }
}

/// Renders a filter operand: `eq.<value>` or `is.null`.
fn filter_param(value: &Value) -> String {
    match value {
        Value::Null => "is.null".to_string(),
        Value::String(s) => format!("eq.{s}"),
        other => format!("eq.{other}"),
    }
}

fn order_param(order: &OrderSpec) -> String {
    let direction = if order.ascending { "asc" } else { "desc" };
    format!("{}.{}", order.column, direction)
}

fn select_param(columns: Option<&Vec<String>>) -> String {
    match columns {
        Some(columns) if !columns.is_empty() => columns.join(","),
        _ => "*".to_string(),
    }
}

fn query_params(query: &RowQuery) -> Vec<(String, String)> {
    let mut params = vec![
        ("select".to_string(), select_param(query.columns.as_ref())),
        ("limit".to_string(), "1".to_string()),
    ];
    if let Some(order) = &query.order {
        params.push(("order".to_string(), order_param(order)));
    }
    for (column, value) in &query.filters {
        params.push((column.clone(), filter_param(value)));
    }
    params
}

fn id_filter(id: &str) -> [(String, String); 1] {
    [(ID_COLUMN.to_string(), format!("eq.{id}"))]
}

/// Pulls the human readable message out of an error body.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json.get("message")
                .or_else(|| json.get("error_description"))
                .or_else(|| json.get("msg"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("HTTP {status}"))
}

fn classify(status: StatusCode, message: String, write: bool) -> SyncError {
    match status {
        StatusCode::NOT_FOUND => SyncError::NotFound(message),
        s if s.is_client_error() && write => SyncError::WriteRejected(message),
        s if s.is_client_error() => SyncError::Query(message),
        _ => SyncError::Transport(message),
    }
}

async fn check(response: Response, write: bool) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify(status, error_message(status, &body), write))
}

/// Turns two consecutive table snapshots into row-level events.
///
/// Inserts and updates follow the order of `current`; deletes come last in
/// the order of `previous`.
fn diff_rows(previous: &[RawRow], current: &[RawRow]) -> Vec<ChangeEvent> {
    let before: HashMap<String, &RawRow> = previous
        .iter()
        .filter_map(|row| row_id(row).map(|id| (id, row)))
        .collect();
    let mut seen = Vec::with_capacity(current.len());
    let mut events = Vec::new();

    for row in current {
        let Some(id) = row_id(row) else { continue };
        match before.get(&id) {
            None => events.push(ChangeEvent::new(ChangeKind::Insert, row.clone())),
            Some(old) if *old != row => {
                events.push(ChangeEvent::new(ChangeKind::Update, row.clone()))
            }
            Some(_) => {}
        }
        seen.push(id);
    }

    for row in previous {
        if let Some(id) = row_id(row)
            && !seen.contains(&id)
        {
            events.push(ChangeEvent::new(ChangeKind::Delete, row.clone()));
        }
    }
    events
}

#[async_trait]
impl TableGateway for RestGateway {
    fn table(&self) -> &str {
        &self.table
    }

    async fn fetch_all(&self, order: Option<&OrderSpec>) -> Result<Vec<RawRow>> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        if let Some(order) = order {
            params.push(("order".to_string(), order_param(order)));
        }
        let response = self.request(Method::GET).query(&params).send().await?;
        Self::rows(check(response, false).await?).await
    }

    async fn fetch_one(&self, query: &RowQuery) -> Result<RawRow> {
        let response = self
            .request(Method::GET)
            .query(&query_params(query))
            .send()
            .await?;
        let rows = Self::rows(check(response, false).await?).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| SyncError::not_found(format!("no matching row in '{}'", self.table)))
    }

    async fn insert(&self, record: RawRow) -> Result<RawRow> {
        let response = self
            .request(Method::POST)
            .header(PREFER_REPRESENTATION.0, PREFER_REPRESENTATION.1)
            .json(&[record])
            .send()
            .await?;
        let rows = Self::rows(check(response, true).await?).await?;
        rows.into_iter().next().ok_or_else(|| {
            SyncError::Transport(format!("insert into '{}' returned no row", self.table))
        })
    }

    async fn update(&self, id: &str, patch: RawRow) -> Result<()> {
        let response = self
            .request(Method::PATCH)
            .header(PREFER_REPRESENTATION.0, PREFER_REPRESENTATION.1)
            .query(&id_filter(id))
            .json(&patch)
            .send()
            .await?;
        let rows = Self::rows(check(response, true).await?).await?;
        if rows.is_empty() {
            return Err(SyncError::not_found(format!("row '{}' in '{}'", id, self.table)));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE)
            .header(PREFER_REPRESENTATION.0, PREFER_REPRESENTATION.1)
            .query(&id_filter(id))
            .send()
            .await?;
        let rows = Self::rows(check(response, true).await?).await?;
        if rows.is_empty() {
            return Err(SyncError::not_found(format!("row '{}' in '{}'", id, self.table)));
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<ChangeStream> {
        let baseline = self.fetch_all(None).await?;
        let (sender, events) = mpsc::unbounded_channel();
        let gateway = self.clone();
        let period = self.client.poll_interval;

        let task = tokio::spawn(async move {
            let mut known = baseline;
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let current = match gateway.fetch_all(None).await {
                    Ok(rows) => rows,
                    Err(err) => {
                        warn!(table = %gateway.table, error = %err, "change feed poll failed");
                        continue;
                    }
                };
                for event in diff_rows(&known, &current) {
                    debug!(table = %gateway.table, kind = %event.kind, "change feed event");
                    if sender.send(event).is_err() {
                        return;
                    }
                }
                known = current;
            }
        });

        Ok(ChangeStream {
            events,
            handle: SubscriptionHandle::new(move || task.abort()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> RawRow {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_query_params() {
        let query = RowQuery::first()
            .eq("user_id", "u-1")
            .select(&["id", "role"])
            .order(OrderSpec::descending("id"));
        let params = query_params(&query);

        assert!(params.contains(&("select".to_string(), "id,role".to_string())));
        assert!(params.contains(&("limit".to_string(), "1".to_string())));
        assert!(params.contains(&("order".to_string(), "id.desc".to_string())));
        assert!(params.contains(&("user_id".to_string(), "eq.u-1".to_string())));
    }

    #[test]
    fn test_connect_without_config_is_unavailable() {
        assert!(matches!(RestClient::connect(None), Err(SyncError::RemoteUnavailable)));
        assert!(RestClient::connect(Some(&RemoteConfig::new("https://demo.supabase.co", "anon"))).is_ok());
    }

    #[test]
    fn test_filter_param_renders_numbers_and_null() {
        assert_eq!(filter_param(&json!(7)), "eq.7");
        assert_eq!(filter_param(&json!(null)), "is.null");
        assert_eq!(filter_param(&json!(true)), "eq.true");
    }

    #[test]
    fn test_error_classification() {
        let body = r#"{"code":"23514","message":"new row violates check constraint"}"#;
        let message = error_message(StatusCode::BAD_REQUEST, body);
        assert_eq!(message, "new row violates check constraint");

        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, message.clone(), true),
            SyncError::WriteRejected(_)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, message, false),
            SyncError::Query(_)
        ));
        assert!(matches!(
            classify(StatusCode::NOT_FOUND, "gone".into(), false),
            SyncError::NotFound(_)
        ));
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY, error_message(StatusCode::BAD_GATEWAY, "<html>"), false),
            SyncError::Transport(m) if m.contains("502")
        ));
    }

    #[test]
    fn test_diff_rows() {
        let previous = vec![
            row(json!({"id": 1, "name": "a"})),
            row(json!({"id": 2, "name": "b"})),
        ];
        let current = vec![
            row(json!({"id": 2, "name": "b2"})),
            row(json!({"id": 3, "name": "c"})),
        ];

        let events = diff_rows(&previous, &current);
        let summary: Vec<_> = events
            .iter()
            .map(|e| (e.kind, row_id(&e.row).unwrap()))
            .collect();

        assert_eq!(
            summary,
            vec![
                (ChangeKind::Update, "2".to_string()),
                (ChangeKind::Insert, "3".to_string()),
                (ChangeKind::Delete, "1".to_string()),
            ]
        );
        assert!(diff_rows(&current, &current).is_empty());
    }
}
