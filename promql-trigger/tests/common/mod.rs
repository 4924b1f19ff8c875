//! In-process HTTP servers standing in for webhooks, log-cache and the platform API.
#![allow(dead_code)]

use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use http_body_util::BodyExt;
use hyper::{body::Incoming, service::service_fn};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{net::TcpListener, task::JoinHandle};

#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: String,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|val| val.to_str().ok())
    }
}

type Responder = dyn Fn(&Recorded) -> (StatusCode, String) + Send + Sync;

pub struct MockServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Answer every request the same way
    pub async fn start(status: StatusCode, body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::start_with(move |_| (status, body.clone())).await
    }

    /// Answer every request the same way, but only after `delay`
    pub async fn start_slow(delay: Duration, status: StatusCode, body: impl Into<String>) -> Self {
        let body: String = body.into();
        Self::serve(move |_| (status, body.clone()), delay).await
    }

    /// Answer each request with whatever `responder` picks for it
    pub async fn start_with(
        responder: impl Fn(&Recorded) -> (StatusCode, String) + Send + Sync + 'static,
    ) -> Self {
        Self::serve(responder, Duration::ZERO).await
    }

    async fn serve(
        responder: impl Fn(&Recorded) -> (StatusCode, String) + Send + Sync + 'static,
        delay: Duration,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let responder: Arc<Responder> = Arc::new(responder);

        let thread_requests = requests.clone();
        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    continue;
                };
                let requests = thread_requests.clone();
                let responder = responder.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let requests = requests.clone();
                        let responder = responder.clone();
                        async move {
                            let (parts, incoming) = req.into_parts();
                            let bytes = incoming
                                .collect()
                                .await
                                .map(|collected| collected.to_bytes())
                                .unwrap_or_default();
                            let recorded = Recorded {
                                method: parts.method,
                                uri: parts.uri,
                                headers: parts.headers,
                                body: String::from_utf8_lossy(&bytes).into_owned(),
                            };
                            let (status, body) = responder(&recorded);
                            requests.lock().unwrap().push(recorded);
                            tokio::time::sleep(delay).await;
                            let mut resp = Response::new(body);
                            *resp.status_mut() = status;
                            Ok::<_, Infallible>(resp)
                        }
                    });
                    let _ = auto::Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self {
            addr,
            requests,
            task,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// An address nothing is listening on
pub async fn closed_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
