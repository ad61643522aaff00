//! Usage: One-shot loopback listener that receives the provider redirect (`?code=...`).

use crate::oauth::endpoints::parse_http_url;
use crate::shared::error::{AppError, AppResult};
use crate::shared::security::constant_time_eq;
use reqwest::Url;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

const SUCCESS_HTML: &str =
    "<html><body><h1>Spotify authorization complete</h1><p>You may close this window and return to the terminal.</p></body></html>";
const ERROR_HTML: &str = "<html><body><h1>Spotify authorization failed</h1><p>You may close this window and retry.</p></body></html>";
const NOT_FOUND_HTML: &str = "<html><body><h1>Not found</h1></body></html>";
const MAX_REQUEST_BYTES: usize = 8192;
/// Per-connection bound for receiving the request line.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Query parameters the provider appends to the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct OAuthCallbackPayload {
    pub(crate) code: Option<String>,
    pub(crate) state: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) error_description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopbackFamily {
    V4,
    V6,
    Both,
}

/// Where the local listener must bind so the registered redirect URI reaches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CallbackTarget {
    pub(crate) family: LoopbackFamily,
    pub(crate) port: u16,
    pub(crate) path: String,
}

pub(crate) fn callback_target(redirect_uri: &str) -> AppResult<CallbackTarget> {
    let url = parse_http_url("redirect_uri", redirect_uri)?;
    if url.scheme() != "http" {
        return Err(
            "SEC_INVALID_INPUT: redirect_uri must use http to be received by the local listener"
                .to_string()
                .into(),
        );
    }

    let family = match url.host() {
        Some(url::Host::Domain(domain)) if domain.eq_ignore_ascii_case("localhost") => {
            LoopbackFamily::Both
        }
        Some(url::Host::Ipv4(ip)) if ip.is_loopback() => LoopbackFamily::V4,
        Some(url::Host::Ipv6(ip)) if ip.is_loopback() => LoopbackFamily::V6,
        _ => {
            return Err(
                "SEC_INVALID_INPUT: redirect_uri host must be localhost, 127.0.0.1 or [::1]"
                    .to_string()
                    .into(),
            )
        }
    };

    Ok(CallbackTarget {
        family,
        port: url.port_or_known_default().unwrap_or(80),
        path: url.path().to_string(),
    })
}

#[derive(Debug)]
pub(crate) struct BoundCallbackListener {
    port: u16,
    listener_v4: Option<TcpListener>,
    listener_v6: Option<TcpListener>,
}

impl BoundCallbackListener {
    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    async fn accept(&mut self) -> AppResult<TcpStream> {
        let result = match (self.listener_v4.as_mut(), self.listener_v6.as_mut()) {
            (Some(v4), Some(v6)) => {
                tokio::select! {
                    result = v4.accept() => result,
                    result = v6.accept() => result,
                }
            }
            (Some(v4), None) => v4.accept().await,
            (None, Some(v6)) => v6.accept().await,
            (None, None) => {
                return Err("SYSTEM_ERROR: oauth callback listener is not bound"
                    .to_string()
                    .into())
            }
        };
        let (socket, _) =
            result.map_err(|e| format!("SYSTEM_ERROR: oauth callback accept failed: {e}"))?;
        Ok(socket)
    }
}

/// Binds the loopback port named by the redirect URI.
///
/// There is no fallback port: the provider only redirects to the exact registered URI.
/// Port 0 picks a free port (used by tests).
pub(crate) async fn bind_callback_listener(target: &CallbackTarget) -> AppResult<BoundCallbackListener> {
    let mut bind_errors: Vec<String> = Vec::new();
    let mut port = target.port;

    let listener_v4 = if matches!(target.family, LoopbackFamily::V4 | LoopbackFamily::Both) {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                if port == 0 {
                    port = listener
                        .local_addr()
                        .map_err(|e| format!("SYSTEM_ERROR: oauth callback local_addr failed: {e}"))?
                        .port();
                }
                Some(listener)
            }
            Err(err) => {
                bind_errors.push(format!("127.0.0.1:{port} ({err})"));
                None
            }
        }
    } else {
        None
    };

    let listener_v6 = if matches!(target.family, LoopbackFamily::V6 | LoopbackFamily::Both) {
        match TcpListener::bind(("::1", port)).await {
            Ok(listener) => {
                if port == 0 {
                    port = listener
                        .local_addr()
                        .map_err(|e| format!("SYSTEM_ERROR: oauth callback local_addr failed: {e}"))?
                        .port();
                }
                Some(listener)
            }
            Err(err) => {
                bind_errors.push(format!("[::1]:{port} ({err})"));
                None
            }
        }
    } else {
        None
    };

    if listener_v4.is_none() && listener_v6.is_none() {
        return Err(format!(
            "SYSTEM_ERROR: oauth callback bind failed: {}",
            bind_errors.join("; ")
        )
        .into());
    }
    tracing::debug!(port, "oauth callback listener bound");

    Ok(BoundCallbackListener {
        port,
        listener_v4,
        listener_v6,
    })
}

/// Serves requests until one hits `expected_path`, then returns its query parameters.
///
/// Requests for other paths (for example `/favicon.ico`) get a 404 and are skipped.
/// Connections that send no request line (browser preconnects) are dropped after
/// `REQUEST_READ_TIMEOUT`; `timeout` bounds the whole wait either way.
pub(crate) async fn wait_for_callback(
    mut listener: BoundCallbackListener,
    expected_path: &str,
    expected_state: Option<&str>,
    timeout: Duration,
) -> AppResult<OAuthCallbackPayload> {
    let deadline = Instant::now() + timeout;

    loop {
        let mut socket = tokio::time::timeout_at(deadline, listener.accept())
            .await
            .map_err(|_| "SYSTEM_ERROR: oauth callback timed out".to_string())??;

        let read_until = deadline.min(Instant::now() + REQUEST_READ_TIMEOUT);
        let request = match read_request_head(&mut socket, read_until).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                tracing::debug!("oauth callback connection sent no request line");
                continue;
            }
            Err(err) => {
                tracing::debug!(error = %err, "oauth callback read failed");
                continue;
            }
        };

        let url = match extract_request_target(&request).and_then(target_url) {
            Ok(url) => url,
            Err(err) => {
                tracing::debug!("ignoring malformed callback request: {}", err);
                respond(&mut socket, "400 Bad Request", ERROR_HTML).await;
                continue;
            }
        };

        if url.path() != expected_path {
            respond(&mut socket, "404 Not Found", NOT_FOUND_HTML).await;
            continue;
        }

        let payload = payload_from_url(&url);
        if let Err(err) = validate_payload(&payload, expected_state) {
            respond(&mut socket, "400 Bad Request", ERROR_HTML).await;
            return Err(err);
        }

        if payload.error.is_some() {
            respond(&mut socket, "400 Bad Request", ERROR_HTML).await;
        } else {
            respond(&mut socket, "200 OK", SUCCESS_HTML).await;
        }
        return Ok(payload);
    }
}

/// Reads until the request line is complete, the peer closes, or `until` passes.
///
/// Returns `None` when nothing usable arrived in time.
async fn read_request_head(
    socket: &mut TcpStream,
    until: Instant,
) -> std::io::Result<Option<String>> {
    let mut buffer = vec![0u8; MAX_REQUEST_BYTES];
    let mut filled = 0usize;

    while filled < buffer.len() {
        let size = match tokio::time::timeout_at(until, socket.read(&mut buffer[filled..])).await {
            Ok(result) => result?,
            Err(_) => return Ok(None),
        };
        if size == 0 {
            break;
        }
        filled += size;
        if buffer[..filled].contains(&b'\n') {
            break;
        }
    }

    if filled == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&buffer[..filled]).into_owned()))
}

async fn respond(socket: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

fn extract_request_target(request: &str) -> AppResult<&str> {
    let first = request
        .lines()
        .next()
        .ok_or_else(|| "SYSTEM_ERROR: oauth callback malformed request".to_string())?;
    let mut parts = first.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();
    if method != "GET" || target.is_empty() {
        return Err("SYSTEM_ERROR: oauth callback must be GET"
            .to_string()
            .into());
    }
    Ok(target)
}

fn target_url(target: &str) -> AppResult<Url> {
    Url::parse(&format!("http://127.0.0.1{target}"))
        .map_err(|e| format!("SYSTEM_ERROR: invalid oauth callback target: {e}").into())
}

fn payload_from_url(url: &Url) -> OAuthCallbackPayload {
    let mut payload = OAuthCallbackPayload::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => payload.code = Some(value.to_string()),
            "state" => payload.state = Some(value.to_string()),
            "error" => payload.error = Some(value.to_string()),
            "error_description" => payload.error_description = Some(value.to_string()),
            _ => {}
        }
    }
    payload
}

/// Parses a pasted callback location: full URL, `?code=...`, or `code=...`.
///
/// A location without `code` or `error` yields an empty payload; callers treat that
/// as "not yet authorized".
pub(crate) fn parse_location(location: &str) -> AppResult<OAuthCallbackPayload> {
    let trimmed = location.trim();
    let url = if trimmed.contains("://") {
        Url::parse(trimmed)
            .map_err(|e| format!("SEC_INVALID_INPUT: invalid callback url: {e}"))?
    } else {
        let query = trimmed.trim_start_matches('?');
        target_url(&format!("/?{query}"))?
    };
    Ok(payload_from_url(&url))
}

fn validate_payload(payload: &OAuthCallbackPayload, expected_state: Option<&str>) -> AppResult<()> {
    if payload.code.is_none() && payload.error.is_none() {
        return Err(AppError::new(
            "SYSTEM_ERROR",
            "oauth callback missing code/error",
        ));
    }
    let Some(expected_state) = expected_state else {
        return Ok(());
    };
    let state = payload
        .state
        .as_deref()
        .ok_or_else(|| "SEC_INVALID_INPUT: oauth callback missing state".to_string())?;
    if !constant_time_eq(state.as_bytes(), expected_state.as_bytes()) {
        return Err("SEC_INVALID_INPUT: oauth callback state mismatch"
            .to_string()
            .into());
    }
    Ok(())
}
