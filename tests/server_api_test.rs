//! Wire-level tests against the router, no live socket needed. Execution
//! endpoints spawn a real interpreter and skip where none is present.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use tabexec::cache::DatasetCache;
use tabexec::exec::sandbox::Sandbox;
use tabexec::remote::wire::{ErrorBody, ExecuteResponse, SampleResponse, UploadResponse};
use tabexec::server::{router, AppState};

const CSV: &str = "region,sales\nnorth,100\nsouth,250\n";

fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn pandas_available() -> bool {
    std::process::Command::new("python3")
        .args(["-c", "import pandas"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn app() -> axum::Router {
    let state = Arc::new(AppState {
        cache: DatasetCache::new(2).unwrap(),
        sandbox: Sandbox::new("python3"),
    });
    router(state)
}

async fn body_json<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn upload_reports_shape_and_columns() {
    let app = app();
    let resp = app
        .oneshot(
            Request::post("/datasets/sales")
                .body(Body::from(CSV))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: UploadResponse = body_json(resp).await;
    assert_eq!(body.rows, 2);
    let names: Vec<&str> = body.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["region", "sales"]);
    assert_eq!(body.columns[1].dtype, "int64");
}

#[tokio::test]
async fn sample_round_trips_uploaded_rows() {
    let app = app();
    let _ = app
        .clone()
        .oneshot(
            Request::post("/datasets/sales")
                .body(Body::from(CSV))
                .unwrap(),
        )
        .await
        .unwrap();
    let resp = app
        .oneshot(
            Request::get("/datasets/sales/sample?rows=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: SampleResponse = body_json(resp).await;
    assert_eq!(body.columns, vec!["region", "sales"]);
    assert_eq!(body.rows, vec![vec!["north".to_string(), "100".to_string()]]);
}

#[tokio::test]
async fn read_utilities_reject_unknown_ids() {
    let app = app();
    for path in [
        "/datasets/ghost/sample",
        "/datasets/ghost/columns",
        "/datasets/ghost/preview",
    ] {
        let resp = app
            .clone()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{path}");
        let body: ErrorBody = body_json(resp).await;
        assert_eq!(body.kind, "not_found");
    }
}

#[tokio::test]
async fn execute_with_unknown_id_runs_unbound() {
    if !python_available() {
        eprintln!("python3 not found; skipping");
        return;
    }
    let app = app();
    let req = serde_json::json!({
        "code": "print('hi')",
        "datasetId": "never-uploaded",
        "captureArtifacts": false,
        "plotsDir": "",
        "plotFormat": "png",
        "outputDir": null,
    });
    let resp = app
        .oneshot(
            Request::post("/execute")
                .header("content-type", "application/json")
                .body(Body::from(req.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    // Unknown ids are "no dataset bound" for /execute, never a 404.
    assert_eq!(resp.status(), StatusCode::OK);
    let body: ExecuteResponse = body_json(resp).await;
    assert_eq!(body.results.as_deref(), Some("hi\n"));
    assert!(body.error.is_none());
}

#[tokio::test]
async fn execute_runtime_error_comes_back_in_band() {
    if !python_available() {
        eprintln!("python3 not found; skipping");
        return;
    }
    let app = app();
    let req = serde_json::json!({
        "code": "raise ValueError('bad')",
        "datasetId": null,
        "captureArtifacts": false,
        "plotsDir": "",
        "plotFormat": "png",
        "outputDir": null,
    });
    let resp = app
        .oneshot(
            Request::post("/execute")
                .header("content-type", "application/json")
                .body(Body::from(req.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: ExecuteResponse = body_json(resp).await;
    assert!(body.results.is_none());
    assert!(body.error.unwrap().contains("ValueError: bad"));
}

#[tokio::test]
async fn successful_execution_writes_the_mutation_back() {
    if !python_available() || !pandas_available() {
        eprintln!("python3/pandas not found; skipping");
        return;
    }
    let app = app();
    let _ = app
        .clone()
        .oneshot(
            Request::post("/datasets/sales")
                .body(Body::from(CSV))
                .unwrap(),
        )
        .await
        .unwrap();
    let req = serde_json::json!({
        "code": "df['double'] = df['sales'] * 2",
        "datasetId": "sales",
        "captureArtifacts": false,
        "plotsDir": "",
        "plotFormat": "png",
        "outputDir": null,
    });
    let resp = app
        .clone()
        .oneshot(
            Request::post("/execute")
                .header("content-type", "application/json")
                .body(Body::from(req.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // A later read against the same id observes the mutation.
    let resp = app
        .oneshot(
            Request::get("/datasets/sales/columns")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body: tabexec::remote::wire::ColumnsResponse = body_json(resp).await;
    let names: Vec<&str> = body.columns.iter().map(|c| c.name.as_str()).collect();
    assert!(names.contains(&"double"));
}
