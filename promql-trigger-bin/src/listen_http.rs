use http::{Method, Request, Response, StatusCode, header::CONTENT_TYPE};
use http_body::Body;
use http_body_util::BodyExt;
use hyper::service::service_fn;
use hyper_util::{rt::TokioIo, server::conn::auto};
use promql_trigger::{Registrar, registration::error_json};
use std::{convert::Infallible, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio_util::bytes::Buf;
use tracing::{error, info, warn};

/// Start the task serving health checks and conversion requests from the function platform
pub fn start_http_task(listener: TcpListener, registrar: Arc<Registrar>) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn(async move {
        loop {
            let Ok((stream, remote_addr)) = listener
                .accept()
                .await
                .inspect_err(|err| error!("Error accepting trigger connection: {err}"))
            else {
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            };
            info!("Function platform connection from {remote_addr}");

            // Registrations are rare, so one task per connection is plenty
            let thread_registrar = registrar.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                // The platform's router may speak either HTTP/1 or h2c to us
                if let Err(err) = auto::Builder::new(hyper_util::rt::TokioExecutor::new())
                    .serve_connection(
                        io,
                        service_fn(|req| handle_http_request(thread_registrar.clone(), req)),
                    )
                    .await
                {
                    error!("Error serving connection: {err}");
                }
            });
        }
    })
}

async fn handle_http_request(
    registrar: Arc<Registrar>,
    req: Request<hyper::body::Incoming>,
) -> Result<Response<String>, Infallible> {
    match handle_http_request_impl(registrar, req).await {
        Ok(resp) => Ok(resp),
        Err(resp) => Ok(resp),
    }
}

fn ok_resp() -> Response<String> {
    Response::new("OK".into())
}

fn err_resp(code: StatusCode, text: impl Into<String>) -> Response<String> {
    let mut resp = Response::new(text.into());
    *resp.status_mut() = code;
    resp
}

fn json_resp(code: StatusCode, text: impl Into<String>) -> Response<String> {
    let mut resp = err_resp(code, text);
    resp.headers_mut().insert(
        CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    resp
}

async fn handle_http_request_impl<B>(
    registrar: Arc<Registrar>,
    req: Request<B>,
) -> Result<Response<String>, Response<String>>
where
    B: Body + Send,
    B::Data: Buf + Send,
    B::Error: std::fmt::Display,
{
    info!(
        "Received http request: {} {} (version: {:?})",
        req.method(),
        req.uri().path(),
        req.version()
    );

    match req.uri().path() {
        "/health" | "/ready" => {
            if !matches!(req.method(), &Method::GET | &Method::HEAD) {
                Ok(err_resp(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "Use GET or HEAD with this route",
                ))
            } else {
                Ok(ok_resp())
            }
        }
        // Conversion requests may arrive on any other path
        _ => {
            if !matches!(req.method(), &Method::POST) {
                return Ok(err_resp(StatusCode::METHOD_NOT_ALLOWED, ""));
            }
            let body_bytes = req
                .into_body()
                .collect()
                .await
                .map_err(|err| {
                    warn!("When reading body bytes: {err}");
                    json_resp(
                        StatusCode::BAD_REQUEST,
                        error_json(format!("When reading body bytes: {err}")),
                    )
                })?
                .to_bytes();

            let registration = registrar.register(&body_bytes).map_err(|err| {
                error!("Rejected conversion request: {err}");
                json_resp(StatusCode::BAD_REQUEST, err.to_json())
            })?;

            let body = registration.response_json().map_err(|err| {
                error!("failed to encode conversion response: {err}");
                err_resp(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            })?;
            // Saving may restart us, so it runs after the response is built
            registrar.persist(registration.queries);
            Ok(json_resp(StatusCode::OK, body))
        }
    }
}
