//! # Readiness gate.
//!
//! One bounded round trip that answers "does the service accept connections and respond?".
//!
//! ## Flow
//! ```text
//! check(address, timeout)
//!   ├─► select: connect to address, retrying every CONNECT_RETRY until the deadline
//!   ├─► send OP_MSG { listDatabases: 1, nameOnly: true, $db: "admin" }
//!   ├─► read exactly one reply
//!   └─► ok: 1 → Ok(()) ; anything else → Err(ProbeError)
//!
//! await_ready(address, timeout) = check(..).is_ok()
//! ```
//!
//! ## Rules
//! - The whole exchange is bounded by `timeout`; a zero timeout means
//!   [`DEFAULT_START_TIMEOUT`].
//! - The request is sent once. Callers that want retries call again with the remaining
//!   budget.
//! - The connection is closed before returning, on every path.

pub mod wire;

use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};

use crate::config::{DEFAULT_PORT, DEFAULT_START_TIMEOUT};
use crate::error::ProbeError;

/// Pause between connection attempts while the service is still starting.
pub const CONNECT_RETRY: Duration = Duration::from_millis(100);

static REQUEST_ID: AtomicI32 = AtomicI32::new(1);

/// Builds the probe address for `host` and an optional port.
///
/// ```
/// assert_eq!(mongovisor::probe::address("localhost", None), "localhost:27017");
/// assert_eq!(mongovisor::probe::address("localhost", Some(27018)), "localhost:27018");
/// ```
pub fn address(host: &str, port: Option<u16>) -> String {
    format!("{host}:{}", port.unwrap_or(DEFAULT_PORT))
}

/// Runs the readiness round trip and reports why it failed, if it did.
pub async fn check(address: &str, timeout: Duration) -> Result<(), ProbeError> {
    let timeout = if timeout.is_zero() {
        DEFAULT_START_TIMEOUT
    } else {
        timeout
    };
    let deadline = Instant::now() + timeout;

    match time::timeout_at(deadline, exchange(address, deadline)).await {
        Ok(res) => res,
        Err(_elapsed) => Err(ProbeError::Timeout { timeout }),
    }
}

/// Returns `true` when the service answered the readiness request within `timeout`.
///
/// Never fails: every error is logged at debug level and reported as `false`.
pub async fn await_ready(address: &str, timeout: Duration) -> bool {
    match check(address, timeout).await {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(address, error = %e, label = e.as_label(), "readiness probe failed");
            false
        }
    }
}

async fn exchange(address: &str, deadline: Instant) -> Result<(), ProbeError> {
    let mut stream = connect(address, deadline).await?;

    let request_id = REQUEST_ID.fetch_add(1, Ordering::Relaxed);
    stream
        .write_all(&wire::encode_list_databases(request_id)?)
        .await?;

    let mut raw = [0u8; wire::HEADER_LEN];
    stream.read_exact(&mut raw).await?;
    let header = wire::Header::decode(&raw);
    if header.op_code != wire::OP_MSG {
        return Err(ProbeError::Protocol(format!(
            "unexpected reply opcode {}",
            header.op_code
        )));
    }
    if header.response_to != request_id {
        return Err(ProbeError::Protocol(format!(
            "reply to request {} while waiting for {request_id}",
            header.response_to
        )));
    }

    let mut body = vec![0u8; header.body_len()?];
    stream.read_exact(&mut body).await?;
    let _ = stream.shutdown().await;

    wire::check_reply(&body)
}

/// Connects, retrying refused/unreachable attempts until just before `deadline`.
async fn connect(address: &str, deadline: Instant) -> Result<TcpStream, ProbeError> {
    loop {
        match TcpStream::connect(address).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                if Instant::now() + CONNECT_RETRY >= deadline {
                    return Err(ProbeError::Refused(e));
                }
                tracing::trace!(address, error = %e, "service not accepting connections yet");
                time::sleep(CONNECT_RETRY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accepts one connection, reads one request, answers with `reply_doc`.
    async fn fake_server(reply_doc: Vec<u8>) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut raw = [0u8; wire::HEADER_LEN];
            sock.read_exact(&mut raw).await.unwrap();
            let header = wire::Header::decode(&raw);
            let mut body = vec![0u8; header.body_len().unwrap()];
            sock.read_exact(&mut body).await.unwrap();
            sock.write_all(&wire::encode_reply(header.request_id, &reply_doc))
                .await
                .unwrap();
            body
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn test_ready_when_server_answers_ok() {
        let doc = wire::DocWriter::new().double("ok", 1.0).finish().unwrap();
        let (addr, server) = fake_server(doc).await;

        assert!(await_ready(&addr, Duration::from_secs(5)).await);

        let request_body = server.await.unwrap();
        let needle = b"listDatabases";
        assert!(request_body.windows(needle.len()).any(|w| w == needle));
    }

    #[tokio::test]
    async fn test_not_ready_when_server_answers_failure() {
        let doc = wire::DocWriter::new()
            .double("ok", 0.0)
            .string("errmsg", "still starting")
            .finish()
            .unwrap();
        let (addr, _server) = fake_server(doc).await;

        let err = check(&addr, Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.as_label(), "probe_protocol");
    }

    #[tokio::test]
    async fn test_no_listener_returns_false_promptly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let started = std::time::Instant::now();
        assert!(!await_ready(&addr, Duration::from_millis(400)).await);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let _server = tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            time::sleep(Duration::from_secs(30)).await;
        });

        let err = check(&addr, Duration::from_millis(300)).await.unwrap_err();
        assert!(matches!(err, ProbeError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_late_listener_is_selected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let doc = wire::DocWriter::new().double("ok", 1.0).finish().unwrap();
        let _server = tokio::spawn(async move {
            time::sleep(Duration::from_millis(250)).await;
            let listener = TcpListener::bind(addr).await.unwrap();
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut raw = [0u8; wire::HEADER_LEN];
            sock.read_exact(&mut raw).await.unwrap();
            let header = wire::Header::decode(&raw);
            let mut body = vec![0u8; header.body_len().unwrap()];
            sock.read_exact(&mut body).await.unwrap();
            sock.write_all(&wire::encode_reply(header.request_id, &doc))
                .await
                .unwrap();
        });

        assert!(await_ready(&addr.to_string(), Duration::from_secs(5)).await);
    }
}
