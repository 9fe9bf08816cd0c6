//! Canvas client tests against an in-process mock LMS.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::header::{AUTHORIZATION, LINK};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use rollcall_core::{Credential, Enrollment, LmsCourseId};
use rollcall_daemon::lms::{CanvasClient, CodeExchange, LmsApi, LmsError};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_stream::StreamExt;
use url::Url;

const COURSE_TOKEN: &str = "course-token";

#[derive(Clone)]
struct MockLms {
    base: String,
    /// Records per page, in order.
    pages: Arc<Vec<usize>>,
    requests: Arc<AtomicUsize>,
}

fn page_link(base: &str, path: &str, page: usize) -> String {
    format!("<{}{}?page={}&per_page=100>", base, path, page)
}

async fn listing(
    mock: MockLms,
    path: String,
    course_id: Option<String>,
    query: HashMap<String, String>,
    headers: HeaderMap,
) -> Response {
    mock.requests.fetch_add(1, Ordering::SeqCst);

    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if auth != format!("Bearer {}", COURSE_TOKEN) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match course_id.as_deref() {
        Some("broken") => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Some("slow") => {
            tokio::time::sleep(Duration::from_millis(500)).await;
            return Json(json!([])).into_response();
        }
        _ => {}
    }

    let page: usize = query
        .get("page")
        .and_then(|p| p.parse().ok())
        .unwrap_or(1);
    let count = mock.pages.get(page - 1).copied().unwrap_or(0);
    let records: Vec<_> = (0..count)
        .map(|i| {
            json!({
                "id": page * 1000 + i,
                "type": "StudentEnrollment",
                "course_id": 1001,
                "user": {
                    "id": page * 1000 + i,
                    "login_id": format!("s{}-{}", page, i),
                    "name": "First Middle Last"
                }
            })
        })
        .collect();

    let mut response = Json(records).into_response();
    let next = match course_id.as_deref() {
        Some("loop") => Some(page_link(&mock.base, &path, 1)),
        Some("evil") => Some("<https://attacker.example/steal?page=2>".to_string()),
        _ if page < mock.pages.len() => Some(page_link(&mock.base, &path, page + 1)),
        _ => None,
    };
    let mut links = vec![format!("{}; rel=\"current\"", page_link(&mock.base, &path, page))];
    if let Some(next) = next {
        links.push(format!("{}; rel=\"next\"", next));
    }
    links.push(format!("{}; rel=\"first\"", page_link(&mock.base, &path, 1)));
    response
        .headers_mut()
        .insert(LINK, HeaderValue::from_str(&links.join(",")).unwrap());
    response
}

async fn course_enrollments(
    State(mock): State<MockLms>,
    Path(course_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let path = format!("/api/v1/courses/{}/enrollments", course_id);
    listing(mock, path, Some(course_id), query, headers).await
}

async fn own_enrollments(
    State(mock): State<MockLms>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let path = "/api/v1/users/self/enrollments".to_string();
    listing(mock, path, None, query, headers).await
}

async fn token(Form(form): Form<HashMap<String, String>>) -> Response {
    assert_eq!(form.get("grant_type").map(String::as_str), Some("authorization_code"));
    assert!(form.contains_key("redirect_uri"));
    match form.get("code").map(String::as_str) {
        Some("good") => Json(json!({"access_token": "member-token", "token_type": "Bearer"}))
            .into_response(),
        Some("nofield") => Json(json!({"token_type": "Bearer"})).into_response(),
        _ => (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid_grant"}))).into_response(),
    }
}

/// Start the mock and return its base URL and request counter.
async fn spawn_mock(pages: Vec<usize>) -> (Url, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let requests = Arc::new(AtomicUsize::new(0));

    let mock = MockLms {
        base: base.clone(),
        pages: Arc::new(pages),
        requests: requests.clone(),
    };
    let app = Router::new()
        .route("/api/v1/courses/:id/enrollments", get(course_enrollments))
        .route("/api/v1/users/self/enrollments", get(own_enrollments))
        .route("/login/oauth2/token", post(token))
        .with_state(mock);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (Url::parse(&format!("{}/", base)).unwrap(), requests)
}

fn client(base: Url) -> CanvasClient {
    CanvasClient::new(base, Duration::from_secs(5)).unwrap()
}

async fn collect_all(
    client: &CanvasClient,
    course: &str,
) -> (Vec<Enrollment>, Option<LmsError>) {
    let credential = Credential::new(COURSE_TOKEN);
    let course_id = LmsCourseId::new(course);
    let mut stream = client.fetch_enrollments(&credential, &course_id);

    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(enrollment) => items.push(enrollment),
            Err(e) => return (items, Some(e)),
        }
    }
    (items, None)
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test]
async fn test_follows_next_links_until_absent() {
    let (base, requests) = spawn_mock(vec![100, 100, 100, 30]).await;
    let client = client(base);

    let (items, err) = collect_all(&client, "1001").await;

    assert!(err.is_none());
    assert_eq!(items.len(), 330);
    assert_eq!(requests.load(Ordering::SeqCst), 4);
    assert_eq!(items[0].external_id, "s1-0");
    assert_eq!(items[329].external_id, "s4-29");
    assert_eq!(items[0].display_name().as_deref(), Some("First Last"));
}

#[tokio::test]
async fn test_empty_first_page_is_not_an_error() {
    let (base, requests) = spawn_mock(vec![0]).await;
    let client = client(base);

    let (items, err) = collect_all(&client, "1001").await;

    assert!(err.is_none());
    assert!(items.is_empty());
    assert_eq!(requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_pages_are_fetched_on_demand() {
    let (base, requests) = spawn_mock(vec![100, 100, 100]).await;
    let client = client(base);
    let credential = Credential::new(COURSE_TOKEN);
    let course_id = LmsCourseId::new("1001");

    let stream = client.fetch_enrollments(&credential, &course_id);
    assert_eq!(requests.load(Ordering::SeqCst), 0);

    let first: Vec<_> = stream.take(5).collect().await;
    assert_eq!(first.len(), 5);
    assert_eq!(requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_looping_next_link_is_bounded() {
    let (base, requests) = spawn_mock(vec![2]).await;
    let client = client(base).with_max_pages(3);

    let (items, err) = collect_all(&client, "loop").await;

    assert!(matches!(err, Some(LmsError::TooManyPages(3))));
    assert_eq!(items.len(), 6);
    assert_eq!(requests.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_cross_origin_next_link_is_refused() {
    let (base, requests) = spawn_mock(vec![5]).await;
    let client = client(base);

    let (items, err) = collect_all(&client, "evil").await;

    assert!(matches!(err, Some(LmsError::Decode(_))));
    assert!(items.is_empty());
    assert_eq!(requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_own_enrollments_listing() {
    let (base, requests) = spawn_mock(vec![100, 7]).await;
    let client = client(base);
    let credential = Credential::new(COURSE_TOKEN);

    let items: Vec<_> = client.fetch_own_enrollments(&credential).collect().await;

    assert_eq!(items.len(), 107);
    assert!(items.iter().all(|item| matches!(
        item,
        Ok(e) if e.course_id == LmsCourseId::new("1001")
    )));
    assert_eq!(requests.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Upstream failures
// ============================================================================

#[tokio::test]
async fn test_error_status_ends_stream() {
    let (base, _) = spawn_mock(vec![100]).await;
    let client = client(base);

    let (items, err) = collect_all(&client, "broken").await;

    assert!(items.is_empty());
    assert!(matches!(err, Some(LmsError::Status { status: 500 })));
}

#[tokio::test]
async fn test_bad_credential_is_upstream_error() {
    let (base, _) = spawn_mock(vec![100]).await;
    let client = client(base);
    let credential = Credential::new("wrong");
    let course_id = LmsCourseId::new("1001");

    let first = client
        .fetch_enrollments(&credential, &course_id)
        .next()
        .await
        .unwrap();
    assert!(matches!(first, Err(LmsError::Status { status: 401 })));
}

#[tokio::test]
async fn test_timeout_maps_to_timeout() {
    let (base, _) = spawn_mock(vec![1]).await;
    let client = CanvasClient::new(base, Duration::from_millis(100)).unwrap();

    let (_, err) = collect_all(&client, "slow").await;

    assert!(matches!(err, Some(ref e) if e.is_timeout()));
}

// ============================================================================
// Code exchange
// ============================================================================

fn exchange<'a>(code: &'a str, secret: &'a Credential) -> CodeExchange<'a> {
    CodeExchange {
        code,
        client_id: "10000000000001",
        client_secret: secret,
        redirect_uri: "https://verify.example.org/canvas-callback?guild_id=G&discord_user_id=S",
    }
}

#[tokio::test]
async fn test_exchange_code_returns_access_token() {
    let (base, _) = spawn_mock(vec![]).await;
    let client = client(base);
    let secret = Credential::new("client-secret");

    let token = client.exchange_code(&exchange("good", &secret)).await.unwrap();
    assert_eq!(token.expose(), "member-token");
}

#[tokio::test]
async fn test_exchange_without_access_token_fails() {
    let (base, _) = spawn_mock(vec![]).await;
    let client = client(base);
    let secret = Credential::new("client-secret");

    let err = client
        .exchange_code(&exchange("nofield", &secret))
        .await
        .unwrap_err();
    assert!(matches!(err, LmsError::MissingAccessToken));
}

#[tokio::test]
async fn test_exchange_rejected_code_fails() {
    let (base, _) = spawn_mock(vec![]).await;
    let client = client(base);
    let secret = Credential::new("client-secret");

    let err = client
        .exchange_code(&exchange("stale", &secret))
        .await
        .unwrap_err();
    assert!(matches!(err, LmsError::Status { status: 401 }));
}
