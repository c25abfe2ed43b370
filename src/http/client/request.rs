//! Request helpers on top of the shared hyper client.

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::{Method, Request, Uri};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::hyper_client::HyperClient;

pub struct Response {
    pub status: u16,
    pub body: Bytes,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).with_context(|| {
            format!(
                "decode response body (status {}): {}",
                self.status,
                String::from_utf8_lossy(&self.body[..self.body.len().min(256)])
            )
        })
    }

    /// Fails with the body text when the status is not 2xx.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(anyhow::anyhow!(
                "status {}: {}",
                self.status,
                String::from_utf8_lossy(&self.body).trim()
            ))
        }
    }
}

fn body_of(body: Option<Bytes>) -> BoxBody<Bytes, hyper::Error> {
    match body {
        Some(bytes) => Full::new(bytes)
            .map_err(|never: std::convert::Infallible| match never {})
            .boxed(),
        None => Empty::<Bytes>::new()
            .map_err(|never: std::convert::Infallible| match never {})
            .boxed(),
    }
}

fn build(
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Bytes>,
) -> Result<Request<BoxBody<Bytes, hyper::Error>>> {
    let uri: Uri = uri.parse().with_context(|| format!("invalid uri {uri}"))?;
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    Ok(builder.body(body_of(body))?)
}

/// Sends a request and buffers the whole response.
pub async fn send(
    client: &HyperClient,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Bytes>,
    timeout_duration: Duration,
) -> Result<Response> {
    let req = build(method, uri, headers, body)?;

    let response = match timeout(timeout_duration, client.request(req)).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            return Err(anyhow::anyhow!("http client error: {} (uri: {})", e, uri))
                .context("request failed");
        }
        Err(_) => {
            return Err(anyhow::anyhow!(
                "request timed out after {:?} (uri: {})",
                timeout_duration,
                uri
            ))
            .context("request timeout");
        }
    };

    let status = response.status().as_u16();
    let body = timeout(timeout_duration, response.into_body().collect())
        .await
        .map_err(|_| anyhow::anyhow!("reading body timed out (uri: {})", uri))?
        .context("failed to read response body")?
        .to_bytes();

    Ok(Response { status, body })
}

/// POSTs `payload` as JSON.
pub async fn post_json<T: Serialize + ?Sized>(
    client: &HyperClient,
    uri: &str,
    extra_headers: &[(&str, &str)],
    payload: &T,
    timeout_duration: Duration,
) -> Result<Response> {
    let body = Bytes::from(serde_json::to_vec(payload).context("encode request body")?);
    let mut headers = vec![("content-type", "application/json")];
    headers.extend_from_slice(extra_headers);
    send(client, Method::POST, uri, &headers, Some(body), timeout_duration).await
}

pub async fn get(client: &HyperClient, uri: &str, timeout_duration: Duration) -> Result<Response> {
    send(client, Method::GET, uri, &[], None, timeout_duration).await
}

/// Sends a request and forwards each newline-delimited body line as it arrives.
///
/// Used for streaming endpoints such as image pulls, where the final status only
/// shows up at the end of the stream.
pub async fn send_streaming(
    client: &HyperClient,
    method: Method,
    uri: &str,
    lines: mpsc::UnboundedSender<String>,
    timeout_duration: Duration,
) -> Result<u16> {
    let req = build(method, uri, &[], None)?;
    let response = timeout(timeout_duration, client.request(req))
        .await
        .map_err(|_| anyhow::anyhow!("request timed out (uri: {})", uri))?
        .with_context(|| format!("request failed (uri: {uri})"))?;

    let status = response.status().as_u16();
    let mut body = response.into_body();
    let mut pending = Vec::new();
    while let Some(frame) = body.frame().await {
        let frame = frame.context("failed to read streamed body")?;
        let Ok(chunk) = frame.into_data() else { continue };
        pending.extend_from_slice(&chunk);
        while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                let _ = lines.send(text);
            }
        }
    }
    let rest = String::from_utf8_lossy(&pending).trim().to_string();
    if !rest.is_empty() {
        let _ = lines.send(rest);
    }
    Ok(status)
}
