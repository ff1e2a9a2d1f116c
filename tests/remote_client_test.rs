//! Transport-contract tests for the HTTP client. The refused-connection
//! cases need no server; the rest run against the real router on an
//! ephemeral port, no interpreter required.

use std::sync::Arc;

use tabexec::cache::DatasetCache;
use tabexec::dataset::Dataset;
use tabexec::error::ExecError;
use tabexec::exec::sandbox::Sandbox;
use tabexec::exec::{CodeTask, Executor};
use tabexec::remote::RemoteClient;
use tabexec::server::{router, AppState};

async fn spawn_service() -> String {
    let state = Arc::new(AppState {
        cache: DatasetCache::new(2).unwrap(),
        sandbox: Sandbox::new("python3"),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

// Port 1 is reserved; nothing listens there.
fn unreachable_client() -> RemoteClient {
    RemoteClient::new("http://127.0.0.1:1", 1).unwrap()
}

#[tokio::test]
async fn refused_connection_is_an_infrastructure_error() {
    let task = CodeTask::new("print(1)\n");
    let err = unreachable_client().execute(&task).await.unwrap_err();
    assert!(matches!(err, ExecError::Infrastructure(_)));
}

#[tokio::test]
async fn refused_connection_fails_uploads_the_same_way() {
    let err = unreachable_client()
        .upload_dataset("sales", b"a\n1\n".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::Infrastructure(_)));
}

#[tokio::test]
async fn structured_not_found_body_maps_back_onto_not_found() {
    let base = spawn_service().await;
    let client = RemoteClient::new(base, 5).unwrap();
    let err = client.columns("ghost").await.unwrap_err();
    assert!(matches!(err, ExecError::NotFound(_)));
}

#[tokio::test]
async fn inline_dataset_is_rejected_before_any_request() {
    let task = CodeTask::new("print(len(df))\n")
        .with_dataset(Dataset::from_csv_bytes(b"a\n1\n".to_vec()));
    let err = unreachable_client().execute(&task).await.unwrap_err();
    assert!(matches!(err, ExecError::Config(_)));
}

#[tokio::test]
async fn upload_then_columns_round_trips_without_an_interpreter() {
    let base = spawn_service().await;
    let client = RemoteClient::new(base, 5).unwrap();
    let info = client
        .upload_dataset("sales", b"region,sales\nnorth,100\n".to_vec())
        .await
        .unwrap();
    assert_eq!(info.rows, 1);
    let cols = client.columns("sales").await.unwrap();
    assert_eq!(cols[1].name, "sales");
    assert_eq!(cols[1].dtype, "int64");
}
