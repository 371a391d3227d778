//! In-process HTTP stubs for adapter and client tests.

use axum::Router;
use axum::extract::Request;
use axum::http::HeaderMap;
use axum::response::Response;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One request as the stub saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Recorded>>>);

impl Recorder {
    pub fn requests(&self) -> Vec<Recorded> {
        self.0.lock().unwrap().clone()
    }
}

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Answers every request with `respond`, recording what was received.
pub async fn serve_fn<F>(respond: F) -> (String, Recorder)
where
    F: Fn(&Recorded) -> Response + Send + Sync + 'static,
{
    serve_fn_delayed(Duration::ZERO, respond).await
}

/// Like `serve_fn`, but waits `delay` before answering.
pub async fn serve_fn_delayed<F>(delay: Duration, respond: F) -> (String, Recorder)
where
    F: Fn(&Recorded) -> Response + Send + Sync + 'static,
{
    let recorder = Recorder::default();
    let respond = Arc::new(respond);
    let sink = recorder.clone();

    let app = Router::new().fallback(move |request: Request| {
        let respond = respond.clone();
        let sink = sink.clone();
        async move {
            let (parts, body) = request.into_parts();
            let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
            let recorded = Recorded {
                method: parts.method.to_string(),
                path: parts.uri.path().to_string(),
                query: parts.uri.query().map(str::to_string),
                headers: parts.headers,
                body: String::from_utf8_lossy(&body).into_owned(),
            };
            let response = respond(&recorded);
            sink.0.lock().unwrap().push(recorded);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            response
        }
    });

    (serve(app).await, recorder)
}
