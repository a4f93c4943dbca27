// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::EntryAdapter;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use tokio::net::TcpListener;
use tracing::warn;

/// Serves the adapter over http1 connections, one task per connection.
/// Runs until the listener fails; callers typically spawn it.
pub async fn serve(adapter: EntryAdapter, listener: TcpListener) -> anyhow::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let adapter = adapter.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |request| {
                let adapter = adapter.clone();
                async move { Ok::<_, Infallible>(handle_hyper(&adapter, request).await) }
            });
            if let Err(e) = hyper::server::conn::http1::Builder::new()
                .serve_connection(io, service)
                .await
            {
                warn!("connection error: {e}");
            }
        });
    }
}

async fn handle_hyper(adapter: &EntryAdapter, request: Request<Incoming>) -> Response<Full<Bytes>> {
    let method = request.method().as_str().to_string();
    let uri = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let body = match request.into_body().collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            if bytes.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
            }
        }
        Err(e) => {
            warn!("failed to read request body: {e}");
            serde_json::Value::Null
        }
    };

    let routed = adapter.handle(&method, &uri, body).await;
    let payload = serde_json::to_vec(&routed.body).unwrap_or_else(|_| b"null".to_vec());
    Response::builder()
        .status(StatusCode::from_u16(routed.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(payload)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"null"))))
}
