//! # JSON-lines channel over a byte stream.
//!
//! Each frame is one line of JSON: `{"id": <u64>, "body": <Request|Response>}`.
//! The caller side ([`StreamChannel`]) sends one request and waits for the response with
//! the same id; the host side ([`serve`]) answers requests in arrival order.
//!
//! ```text
//! StreamChannel ──{"id":7,"body":{"type":"prepare_directory",..}}──► serve(..)
//!               ◄─{"id":7,"body":{"type":"directory_prepared"}}────
//! ```
//!
//! Requests are serialized by an internal lock: one exchange in flight at a time. A
//! `read_output` exchange holds the lock for up to the host's output wait (200 ms on a
//! [`LocalChannel`](super::LocalChannel) host) when the process is quiet.
//! Dropping a `call` future mid-exchange leaves the stream out of step; the next call
//! then fails with [`ChannelError::Closed`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::channel::{Channel, Request, Response};
use crate::error::ChannelError;

#[derive(Debug, Serialize, Deserialize)]
struct Frame<T> {
    id: u64,
    body: T,
}

struct Conn<R, W> {
    reader: BufReader<R>,
    writer: W,
    next_id: u64,
    line: String,
}

/// Caller side of a JSON-lines channel.
pub struct StreamChannel<R, W> {
    conn: Mutex<Conn<R, W>>,
}

impl<R, W> StreamChannel<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps the read and write halves of a connection to a host running [`serve`].
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            conn: Mutex::new(Conn {
                reader: BufReader::new(reader),
                writer,
                next_id: 1,
                line: String::new(),
            }),
        }
    }
}

#[async_trait]
impl<R, W> Channel for StreamChannel<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn call(&self, request: Request) -> Result<Response, ChannelError> {
        let mut guard = self.conn.lock().await;
        let conn = &mut *guard;

        let id = conn.next_id;
        conn.next_id = conn.next_id.wrapping_add(1);

        write_frame(&mut conn.writer, &Frame { id, body: request }).await?;

        conn.line.clear();
        if conn.reader.read_line(&mut conn.line).await? == 0 {
            return Err(ChannelError::Closed {
                reason: "peer closed the stream".to_string(),
            });
        }
        let frame: Frame<Response> = serde_json::from_str(conn.line.trim_end())?;
        if frame.id != id {
            return Err(ChannelError::Closed {
                reason: format!("response {} while waiting for {id}", frame.id),
            });
        }
        Ok(frame.body)
    }
}

async fn write_frame<W, T>(writer: &mut W, frame: &Frame<T>) -> Result<(), ChannelError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut buf = serde_json::to_vec(frame)?;
    buf.push(b'\n');
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Host side: answers requests from `reader` on `writer` using `handler` until EOF.
///
/// A line that does not decode is answered with `Failed` under id 0 and the loop goes on;
/// only transport errors end it early.
pub async fn serve<R, W, C>(reader: R, mut writer: W, handler: &C) -> Result<(), ChannelError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    C: Channel + ?Sized,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<Frame<Request>>(&line) {
            Ok(Frame { id, body }) => {
                tracing::debug!(id, request = ?body, "serving request");
                let body = match handler.call(body).await {
                    Ok(resp) => resp,
                    Err(e) => Response::Failed {
                        error: e.as_message(),
                    },
                };
                Frame { id, body }
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed request frame");
                Frame {
                    id: 0,
                    body: Response::Failed {
                        error: format!("malformed request: {e}"),
                    },
                }
            }
        };
        write_frame(&mut writer, &reply).await?;
    }
    Ok(())
}
