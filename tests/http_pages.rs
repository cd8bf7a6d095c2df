mod support;

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use covid_chart::{
    application::{
        chart::ChartService,
        dataset::{CovidDataService, DatasetTtls, Endpoints},
        fetch::FetchEngine,
    },
    infra::{
        assets::StaticAssets,
        http::{HttpState, build_router},
        memory_store::MemoryCacheStore,
    },
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;

use support::{FixedClock, ScriptedUpstream, utc};

const US_DAILY: &str = r#"[
    {"date": 20200410, "states": 56, "positive": 100, "negative": 400, "death": 3, "total": 500},
    {"date": 20200409, "states": 56, "positive": 80, "negative": 300, "death": 2, "total": 380}
]"#;

const US_CURRENT: &str =
    r#"[{"date": 20200410, "states": 56, "positive": 100, "negative": 400, "death": 3, "total": 500}]"#;

const STATES_DAILY: &str = r#"[
    {"date": 20200410, "state": "CA", "positive": 50, "negative": 100},
    {"date": 20200410, "state": "NY", "positive": 30, "negative": 60},
    {"date": 20200409, "state": "CA", "positive": 40, "negative": 90},
    {"date": 20200409, "state": "NY", "positive": 20, "negative": 55}
]"#;

const STATES_CURRENT: &str = r#"[
    {"date": 20200410, "state": "CA", "positive": 50, "negative": 100},
    {"date": 20200410, "state": "NY", "positive": 30, "negative": 60}
]"#;

struct App {
    router: Router,
    _static_dir: tempfile::TempDir,
}

fn app() -> App {
    let base = Url::parse("https://covidtracking.com/api/").expect("base url");
    let endpoints = Endpoints::from_base(&base).expect("endpoints");

    let upstream = ScriptedUpstream::new();
    upstream.respond(&endpoints.us_daily, US_DAILY);
    upstream.respond(&endpoints.us_most_recent, US_CURRENT);
    upstream.respond(&endpoints.state_daily, STATES_DAILY);
    upstream.respond(&endpoints.state_most_recent, STATES_CURRENT);

    // 13:00 on 2020-04-10 in Los Angeles, so "yesterday" is 2020-04-09.
    let clock = FixedClock::at(utc(2020, 4, 10, 20));
    let engine = FetchEngine::new(Arc::new(MemoryCacheStore::new()), upstream, clock);
    let data = CovidDataService::new(Arc::new(engine), endpoints, DatasetTtls::default());
    let charts = ChartService::new(Arc::new(data), chrono_tz::America::Los_Angeles);

    let static_dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(static_dir.path().join("bundle.js"), b"render(base64data);").expect("write");

    let router = build_router(HttpState {
        charts: Arc::new(charts),
        assets: StaticAssets::new(static_dir.path()),
    });

    App {
        router,
        _static_dir: static_dir,
    }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Option<String>, String) {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    (status, content_type, String::from_utf8_lossy(&bytes).into_owned())
}

fn embedded_payload(html: &str) -> Value {
    let marker = "const base64data = \"";
    let start = html.find(marker).expect("payload marker") + marker.len();
    let len = html[start..].find('"').expect("closing quote");
    let decoded = STANDARD
        .decode(&html[start..start + len])
        .expect("valid base64");
    serde_json::from_slice(&decoded).expect("valid json")
}

#[tokio::test]
async fn national_page_embeds_us_payload() {
    let app = app();
    let (status, content_type, html) = get(&app.router, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap_or_default().starts_with("text/html"));
    assert!(html.contains(r#"<script src="/static/bundle.js"></script>"#));

    let payload = embedded_payload(&html);
    assert_eq!(payload["pageType"], "US");
    assert_eq!(
        payload["confirmed"],
        json!([
            {"date": "2020-04-10T00:00:00Z", "totalPositive": 100, "newPositive": 20},
            {"date": "2020-04-09T00:00:00Z", "totalPositive": 80, "newPositive": 80}
        ])
    );
    assert_eq!(
        payload["dailyPosNeg"][0],
        json!({"date": "2020-04-10T00:00:00Z", "negative": 100, "positive": 20})
    );
    assert_eq!(payload["test"], payload["totalPosNeg"]);

    let diff = &payload["mostRecently"][1];
    assert_eq!(diff["date"], "2020-04-10T00:00:00Z");
    assert_eq!(diff["positive"], 20);
    assert_eq!(diff["negative"], 100);
    assert_eq!(diff["death"], 1);
    assert_eq!(diff["total"], 120);

    let states = payload["stateMostRecent"].as_array().expect("state table");
    assert_eq!(states.len(), 2);
    assert_eq!(states[0]["record"]["state"], "CA");
    assert_eq!(states[0]["diff"]["state"], "CA");
    assert_eq!(states[0]["diff"]["positive"], 10);
    assert_eq!(states[1]["diff"]["negative"], 5);
}

#[tokio::test]
async fn state_page_filters_by_upper_cased_code() {
    let app = app();
    let (status, _, html) = get(&app.router, "/state/ca").await;

    assert_eq!(status, StatusCode::OK);
    let payload = embedded_payload(&html);
    assert_eq!(payload["pageType"], "CA");
    assert!(payload.get("stateMostRecent").is_none());
    assert_eq!(payload["confirmed"].as_array().map(Vec::len), Some(2));
    assert_eq!(payload["confirmed"][0]["newPositive"], 10);
    assert_eq!(payload["mostRecently"][0]["state"], "CA");
    assert_eq!(payload["mostRecently"][1]["positive"], 10);
}

#[tokio::test]
async fn unknown_state_renders_empty_series() {
    let app = app();
    let (status, _, html) = get(&app.router, "/state/zz").await;

    assert_eq!(status, StatusCode::OK);
    let payload = embedded_payload(&html);
    assert_eq!(payload["pageType"], "ZZ");
    assert_eq!(payload["confirmed"], json!([]));
    assert_eq!(payload["mostRecently"][0]["state"], "ZZ");
    assert_eq!(payload["mostRecently"][0]["positive"], 0);
}

#[tokio::test]
async fn static_assets_and_health() {
    let app = app();

    let (status, content_type, body) = get(&app.router, "/static/bundle.js").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap_or_default().contains("javascript"));
    assert_eq!(body, "render(base64data);");

    let (status, _, _) = get(&app.router, "/static/missing.css").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, body) = get(&app.router, "/_health").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    let (status, _, _) = get(&app.router, "/no/such/page").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
