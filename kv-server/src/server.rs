//! # Connection server
//!
//! §4.11: accept loop spawning one reader task per connection, repeating
//! `ReadMessage → Dispatch → Write reply` until a read error or idle
//! timeout. TLS wraps the raw socket when configured; metrics and the pub/
//! sub registry are shared across every connection via `Arc`.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use kv_command::{decode_frame, Dispatcher, Session};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::metrics::Metrics;
use crate::pubsub::PubSub;

const IDLE_TIMEOUT: Duration = Duration::from_secs(300);
const READ_BUFFER_INITIAL: usize = 8 * 1024;

/// Either a raw TCP socket or one wrapped in TLS; the reader task is
/// generic over neither, so this flattens both into one concrete type.
enum Conn {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::server::TlsStream<TcpStream>>),
}

impl AsyncRead for Conn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Conn::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Conn::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Conn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Conn::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Conn::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Conn::Plain(s) => Pin::new(s).poll_flush(cx),
            Conn::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Conn::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Conn::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Everything the accept loop shares across every spawned connection task.
pub struct ServerState {
    pub dispatcher: Dispatcher,
    pub metrics: Metrics,
    pub pubsub: PubSub,
    pub tls_acceptor: Option<TlsAcceptor>,
    next_conn_id: AtomicU64,
}

impl ServerState {
    pub fn new(dispatcher: Dispatcher, tls_acceptor: Option<TlsAcceptor>) -> Self {
        ServerState {
            dispatcher,
            metrics: Metrics::new(),
            pubsub: PubSub::new(),
            tls_acceptor,
            next_conn_id: AtomicU64::new(1),
        }
    }

    fn next_conn_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Runs the accept loop until `shutdown` resolves. On shutdown, stops
/// accepting new connections; in-flight connections finish their current
/// frame and close on their own via the idle timeout / read-error path.
pub async fn run(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown: kv_engine::Context,
) -> std::io::Result<()> {
    info!(addr = ?listener.local_addr()?, "connection server listening");
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let conn_id = state.next_conn_id();
                let state = state.clone();
                let conn_ctx = shutdown.child();
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(stream, conn_id, state, conn_ctx).await {
                        debug!(conn_id, %peer, error = %err, "connection closed with error");
                    }
                });
            }
            _ = shutdown.cancelled() => {
                info!("connection server shutting down, no longer accepting");
                return Ok(());
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    conn_id: u64,
    state: Arc<ServerState>,
    ctx: kv_engine::Context,
) -> std::io::Result<()> {
    let _ = stream.set_nodelay(true);
    let mut conn = match &state.tls_acceptor {
        Some(acceptor) => Conn::Tls(Box::new(acceptor.accept(stream).await?)),
        None => Conn::Plain(stream),
    };

    let mut buffer = BytesMut::with_capacity(READ_BUFFER_INITIAL);
    let mut session = Session::unauthenticated_default();

    loop {
        let read = tokio::select! {
            result = tokio::time::timeout(IDLE_TIMEOUT, conn.read_buf(&mut buffer)) => result,
            _ = ctx.cancelled() => {
                debug!(conn_id, "connection cancelled by shutdown");
                let _ = conn.shutdown().await;
                return Ok(());
            }
        };

        let bytes_read = match read {
            Ok(Ok(n)) => n,
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                debug!(conn_id, "connection idle timeout");
                let _ = conn.shutdown().await;
                return Ok(());
            }
        };
        if bytes_read == 0 {
            return Ok(());
        }

        loop {
            let argv = match decode_frame(&mut buffer) {
                Ok(Some(argv)) => argv,
                Ok(None) => break,
                Err(err) => {
                    warn!(conn_id, error = %err, "protocol error, closing connection");
                    let _ = conn.write_all(&kv_command::resp::encode_kv_error(&err)).await;
                    return Ok(());
                }
            };

            state.metrics.record_request_start();
            let started = Instant::now();
            debug!(conn_id, command = %String::from_utf8_lossy(&argv[0]), "dispatching command");

            let reply = state.dispatcher.dispatch(&mut session, argv).await;
            state.metrics.record_request_end(started.elapsed());
            if reply.starts_with(b"-") {
                state.metrics.record_error();
            }
            conn.write_all(&reply).await?;
        }
    }
}
