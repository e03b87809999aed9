use dsrs_rag::{ColBERTv2, RetrievalError, Retriever};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Serves one HTTP response and hands back the request line it received.
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/wiki17_abstracts", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buffer = vec![0u8; 4096];
        let read = socket.read(&mut buffer).await.unwrap();
        let request = String::from_utf8_lossy(&buffer[..read]).to_string();

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        request.lines().next().unwrap_or_default().to_string()
    });
    (url, handle)
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn colbert_sends_query_and_dedups_topk() {
    let body = r#"{"topk": [
        {"text": "Manchester United F.C. | Founded as Newton Heath in 1878.", "pid": 1, "rank": 1, "score": 25.1, "prob": 0.5},
        {"text": "Manchester United F.C. | Founded as Newton Heath in 1878.", "pid": 1, "rank": 2, "score": 25.1, "prob": 0.3},
        {"text": "Newton Heath | A railway depot club.", "pid": 2, "rank": 3, "score": 20.0, "prob": 0.2}
    ]}"#;
    let (url, server) = serve_once("200 OK", body).await;

    let colbert = ColBERTv2::builder().url(url).build();
    let passages = colbert
        .retrieve("What year was Manchester United formed?", 3)
        .await
        .unwrap();

    assert_eq!(
        passages,
        vec![
            "Manchester United F.C. | Founded as Newton Heath in 1878.".to_string(),
            "Newton Heath | A railway depot club.".to_string(),
        ]
    );
    let request_line = server.await.unwrap();
    assert!(request_line.starts_with("GET /wiki17_abstracts?query=What+year+was+Manchester+United+formed%3F&k=3 "));
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn colbert_reports_http_errors() {
    let (url, _server) = serve_once("503 Service Unavailable", r#"{"error": "busy"}"#).await;
    let colbert = ColBERTv2::builder().url(url).build();

    let err = colbert.retrieve("anything", 3).await.unwrap_err();
    assert!(matches!(err, RetrievalError::InvalidResponse { status: 503, .. }));
    assert_eq!(err.class(), dsrs_rag::ErrorClass::Temporary);
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn colbert_reports_malformed_bodies() {
    let (url, _server) = serve_once("200 OK", r#"{"topk": "nope"}"#).await;
    let colbert = ColBERTv2::builder().url(url).build();

    let err = colbert.retrieve("anything", 3).await.unwrap_err();
    assert!(matches!(err, RetrievalError::Malformed { .. }));
}

#[cfg_attr(miri, ignore)]
#[tokio::test]
async fn colbert_reports_unreachable_endpoints() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/search", listener.local_addr().unwrap());
    drop(listener);

    let colbert = ColBERTv2::builder()
        .url(url)
        .timeout(Duration::from_secs(2))
        .build();
    let err = colbert.retrieve("anything", 3).await.unwrap_err();
    assert!(matches!(
        err,
        RetrievalError::Network { .. } | RetrievalError::Timeout { .. }
    ));
}

#[test]
fn from_env_defaults_to_public_index() {
    // SAFETY: this test binary does not read COLBERT_URL from other threads.
    unsafe { std::env::remove_var("COLBERT_URL") };
    let colbert = ColBERTv2::from_env();
    assert_eq!(colbert.url(), "http://20.102.90.50:2017/wiki17_abstracts");
}
