use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::{Method, StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use tgm_core::{
    domain::Channel,
    errors::Error,
    normalize::{normalize_channel_name, parse_channel_list},
    service::{ChannelPosts, PostsResponse, RefreshOutcome, ServiceStatus},
};

use crate::{error::ApiResult, ApiError, AppState, API_VERSION};

#[derive(Debug, Deserialize)]
pub struct PostsQuery {
    pub channels: Option<String>,
    pub limit: Option<usize>,
    pub days_back: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AddChannel {
    pub username: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

fn query<T>(q: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    q.map(|Query(v)| v)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Telegram channel monitor API",
        "status": "online",
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": API_VERSION }))
}

pub async fn status(State(st): State<AppState>) -> ApiResult<Json<ServiceStatus>> {
    Ok(Json(st.service.status().await?))
}

/// `GET /api/posts?channels=a,b&limit=10&days_back=3`
pub async fn posts(
    State(st): State<AppState>,
    q: Result<Query<PostsQuery>, QueryRejection>,
) -> ApiResult<Json<PostsResponse>> {
    let q = query(q)?;
    let channels = parse_channel_list(q.channels.as_deref().unwrap_or_default());
    if channels.is_empty() {
        return Err(ApiError::BadRequest(
            "query parameter `channels` is required".to_string(),
        ));
    }

    let out = st.service.fetch_posts(&channels, q.limit, q.days_back).await?;
    Ok(Json(out))
}

#[derive(Debug, Serialize)]
pub struct ChannelList {
    pub channels: Vec<Channel>,
}

pub async fn list_channels(State(st): State<AppState>) -> ApiResult<Json<ChannelList>> {
    let channels = st.service.list_channels().await?;
    Ok(Json(ChannelList { channels }))
}

/// Queue a background fetch and answer right away.
pub async fn add_channel(
    State(st): State<AppState>,
    body: Result<Json<AddChannel>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let username = normalize_channel_name(&body.username);
    if username.is_empty() {
        return Err(ApiError::BadRequest("username must not be blank".to_string()));
    }

    st.service.spawn_refresh(username.clone(), body.limit);
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "processing",
            "channel": username,
            "message": format!("Fetching posts from {username} in the background"),
        })),
    ))
}

pub async fn channel_posts(
    State(st): State<AppState>,
    Path(username): Path<String>,
    q: Result<Query<LimitQuery>, QueryRejection>,
) -> ApiResult<Json<ChannelPosts>> {
    let q = query(q)?;
    Ok(Json(st.service.channel_posts(&username, q.limit).await?))
}

pub async fn refresh_channel(
    State(st): State<AppState>,
    Path(username): Path<String>,
    q: Result<Query<LimitQuery>, QueryRejection>,
) -> ApiResult<Json<RefreshOutcome>> {
    let q = query(q)?;
    Ok(Json(st.service.refresh_channel(&username, q.limit).await?))
}

pub async fn no_route(uri: Uri) -> ApiError {
    ApiError::Core(Error::NotFound(format!("no route for {}", uri.path())))
}

pub async fn wrong_method(method: Method, uri: Uri) -> ApiError {
    ApiError::MethodNotAllowed(format!("{method} is not allowed on {}", uri.path()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use tower::ServiceExt;

    use tgm_core::{
        client::types::RawMessage,
        pacing::Pacing,
        pipeline::ChannelFetcher,
        retry::RetryPolicy,
        service::MonitorService,
        supervisor::ClientSupervisor,
        testing::{t0, FakeClient, MemoryStore},
        Error,
    };

    use super::*;

    struct App {
        router: Router,
        store: Arc<MemoryStore>,
        _dir: tempfile::TempDir,
    }

    async fn app(client: FakeClient) -> App {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(client);
        let store = Arc::new(MemoryStore::new());
        let sup = Arc::new(ClientSupervisor::new(client.clone(), dir.path().join("s")));
        sup.start().await.unwrap();
        let fetcher = ChannelFetcher::new(client, RetryPolicy::flood_control(), Pacing::none());
        let svc = Arc::new(MonitorService::new(sup, fetcher, store.clone()));
        App {
            router: crate::router(svc),
            store,
            _dir: dir,
        }
    }

    fn page(ids: &[i64]) -> Vec<RawMessage> {
        ids.iter()
            .map(|&id| {
                let mut m = RawMessage::text(id, t0(), &format!("post {id} #tag"));
                m.views = Some(10);
                m.reactions = Some(vec![]);
                m
            })
            .collect()
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn root_and_health() {
        let app = app(FakeClient::new()).await;

        let (status, body) = send(&app.router, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "online");

        let (status, body) = send(&app.router, get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "version": "1.0.0"}));

        let (status, body) = send(&app.router, get("/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connected"], true);
        assert_eq!(body["channels_stored"], 0);
    }

    #[tokio::test]
    async fn posts_endpoint_strips_names_and_reports_meta() {
        let app = app(FakeClient::new().with_channel("news", 1, page(&[2, 1]))).await;

        let (status, body) =
            send(&app.router, get("/api/posts?channels=%40news,%20ghost&limit=99")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["channels_processed"], 2);
        assert_eq!(body["meta"]["total_posts"], 2);
        assert_eq!(body["posts"][0]["post_url"], "https://t.me/news/2");
        assert_eq!(body["posts"][0]["hashtags"], json!(["tag"]));
        assert_eq!(body["posts"][0]["media_kind"], "none");
        assert_eq!(body["posts"][0]["engagement"]["total"], 10);
        assert_eq!(app.store.post_count(), 0);
    }

    #[tokio::test]
    async fn posts_endpoint_requires_channels() {
        let app = app(FakeClient::new()).await;

        let (status, body) = send(&app.router, get("/api/posts")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");

        let (status, body) = send(&app.router, get("/api/posts?channels=a&limit=lots")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn channel_endpoints_fetch_live_then_serve_stored() {
        let app = app(FakeClient::new().with_channel("news", 1, page(&[3, 2, 1]))).await;

        let (status, body) = send(&app.router, get("/channels/news?limit=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["channel"]["username"], "news");
        assert_eq!(body["posts"].as_array().unwrap().len(), 2);

        let (status, body) = send(&app.router, get("/channels")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["channels"].as_array().unwrap().len(), 1);
        assert_eq!(body["channels"][0]["username"], "news");

        let (status, body) = send(&app.router, get("/refresh/news")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["posts_saved"], 3);
        assert_eq!(body["status"], "complete");
        assert_eq!(app.store.post_count(), 3);
    }

    #[tokio::test]
    async fn unmatched_requests_get_json_errors() {
        let app = app(FakeClient::new()).await;

        let (status, body) = send(&app.router, get("/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
        assert!(body["message"].as_str().unwrap().contains("/nope"));

        let req = Request::delete("/channels").body(Body::empty()).unwrap();
        let (status, body) = send(&app.router, req).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["error"], "method_not_allowed");
    }

    #[tokio::test]
    async fn unknown_channel_is_404_json() {
        let app = app(FakeClient::new()).await;
        let (status, body) = send(&app.router, get("/refresh/ghost")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "channel_unavailable");
    }

    #[tokio::test]
    async fn flood_skip_is_429_with_retry_after() {
        let app = app(
            FakeClient::new()
                .with_channel("news", 1, page(&[1]))
                .with_fetch_error("news", Error::FloodWait { seconds: 600 }),
        )
        .await;
        let (status, body) = send(&app.router, get("/refresh/news")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["retry_after"], 600);
    }

    #[tokio::test]
    async fn add_channel_returns_processing_immediately() {
        let app = app(FakeClient::new().with_channel("news", 1, page(&[1]))).await;

        let req = Request::post("/channels")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"username": "@news"}"#))
            .unwrap();
        let (status, body) = send(&app.router, req).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "processing");
        assert_eq!(body["channel"], "news");

        let req = Request::post("/channels")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"username": "  "}"#))
            .unwrap();
        let (status, _) = send(&app.router, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
