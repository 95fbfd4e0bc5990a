//! TCP connection server (`SPEC_FULL.md` §4.8): one task per connection,
//! driven by a small `READY -> DISPATCH -> READY` state machine that can
//! divert permanently into `PUBSUB` or `MONITOR` feed mode.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::Instrument;

use crate::command::{self, Context, Outcome};
use crate::resp::{self, Value};

/// Everything a connection task needs, bundled so `Server::run` can clone it
/// cheaply per accepted socket. `connections` tracks every spawned
/// connection task so shutdown can await them with a deadline
/// (`SPEC_FULL.md` §4.8) instead of discarding their handles.
pub struct Server {
    pub ctx: Context,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    connections: Mutex<JoinSet<()>>,
}

impl Server {
    pub fn new(ctx: Context, read_timeout: Duration, write_timeout: Duration) -> Server {
        Server {
            ctx,
            read_timeout,
            write_timeout,
            connections: Mutex::new(JoinSet::new()),
        }
    }

    /// Accept connections until `shutdown` is signaled. Each connection runs
    /// in its own task tracked in `self.connections`; this function returns
    /// once the listener is closed. Callers that need to wait for
    /// outstanding connections to finish should call [`Server::join_connections`].
    pub async fn run(self: Arc<Self>, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(pair) => pair,
                        Err(error) => {
                            tracing::warn!(%error, "accept failed");
                            continue;
                        }
                    };
                    let server = Arc::clone(&self);
                    let shutdown = shutdown.clone();
                    let span = tracing::info_span!("connection", peer = %addr);
                    self.connections
                        .lock()
                        .await
                        .spawn(async move { server.handle_connection(stream, shutdown).await }.instrument(span));
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("listener shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// Await every spawned connection task, abandoning whatever is still
    /// running once `deadline` elapses (`SPEC_FULL.md` §4.8).
    pub async fn join_connections(&self, deadline: Duration) {
        let mut connections = self.connections.lock().await;
        let drain = async {
            while connections.join_next().await.is_some() {}
        };
        if timeout(deadline, drain).await.is_err() {
            tracing::warn!("shutdown deadline elapsed with connections still open; abandoning them");
        }
    }

    async fn handle_connection(&self, stream: TcpStream, mut shutdown: watch::Receiver<bool>) {
        let _ = stream.set_nodelay(true);
        self.ctx.stats.record_connection_opened();
        tracing::debug!("connection accepted");

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        loop {
            let frame = tokio::select! {
                frame = timeout(self.read_timeout, resp::read_value(&mut reader)) => frame,
                _ = shutdown.changed() => {
                    tracing::debug!("connection closing for shutdown");
                    break;
                }
            };
            let value = match frame {
                Ok(Ok(Some(value))) => value,
                Ok(Ok(None)) => {
                    tracing::debug!("connection closed by peer");
                    break;
                }
                Ok(Err(error)) => {
                    tracing::debug!(%error, "protocol error, closing connection");
                    break;
                }
                Err(_) => {
                    tracing::debug!("read deadline exceeded, closing connection");
                    break;
                }
            };
            let Some((name, args)) = value.as_command() else {
                if !write_reply(&mut write_half, &Value::error("ERR invalid request"), self.write_timeout).await {
                    break;
                }
                continue;
            };
            let args: Vec<Bytes> = args
                .iter()
                .map(|item| match item {
                    Value::Bulk(Some(bytes)) => bytes.clone(),
                    other => {
                        let mut buf = Vec::new();
                        resp::encode(other, &mut buf);
                        Bytes::from(buf)
                    }
                })
                .collect();
            self.ctx.stats.record_command(name, &args);

            match command::dispatch(&self.ctx, name, &args) {
                Outcome::Reply(reply) => {
                    if !write_reply(&mut write_half, &reply, self.write_timeout).await {
                        break;
                    }
                }
                Outcome::Subscribe(channel) => {
                    let (id, mut receiver) = self.ctx.pubsub.subscribe(channel.clone());
                    let ack = Value::array(vec![Value::bulk(Bytes::from_static(b"subscribe")), Value::bulk(channel), Value::Integer(1)]);
                    if !write_reply(&mut write_half, &ack, self.write_timeout).await {
                        self.ctx.pubsub.unsubscribe_all(id);
                        break;
                    }
                    tracing::debug!("connection entering pubsub mode");
                    while let Some(message) = receiver.recv().await {
                        if !write_reply(&mut write_half, &message, self.write_timeout).await {
                            break;
                        }
                    }
                    self.ctx.pubsub.unsubscribe_all(id);
                    break;
                }
                Outcome::Monitor => {
                    if !write_reply(&mut write_half, &Value::OK, self.write_timeout).await {
                        break;
                    }
                    tracing::debug!("connection entering monitor mode");
                    let mut receiver = self.ctx.stats.subscribe_monitor();
                    while let Some(line) = receiver.recv().await {
                        let reply = Value::simple(line);
                        if !write_reply(&mut write_half, &reply, self.write_timeout).await {
                            break;
                        }
                    }
                    break;
                }
            }
        }

        self.ctx.stats.record_connection_closed();
        tracing::debug!("connection closed");
    }
}

/// Encode and flush `value`, under `deadline`. Returns whether the write
/// succeeded; the caller closes the connection on `false`.
async fn write_reply<W: AsyncWriteExt + Unpin>(writer: &mut W, value: &Value, deadline: Duration) -> bool {
    let bytes = resp::to_bytes(value);
    matches!(timeout(deadline, async {
        writer.write_all(&bytes).await?;
        writer.flush().await
    }).await, Ok(Ok(())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aof::Aof;
    use crate::command::Context;
    use crate::pubsub::Pubsub;
    use crate::rdb::Rdb;
    use crate::stats::Stats;
    use crate::store::Containers;
    use tokio::io::AsyncReadExt as _;

    fn test_context() -> Context {
        Context {
            containers: Arc::new(Containers::default()),
            pubsub: Arc::new(Pubsub::new()),
            aof: None::<Arc<Aof>>,
            rdb: Arc::new(Rdb::new("/tmp/server-test.rdb")),
            stats: Arc::new(Stats::new()),
            auth_secret: None,
        }
    }

    #[tokio::test]
    async fn write_reply_round_trips_through_a_buffer() {
        let mut buf: Vec<u8> = Vec::new();
        let ok = write_reply(&mut buf, &Value::OK, Duration::from_secs(1)).await;
        assert!(ok);
        assert_eq!(buf, b"+OK\r\n");
    }

    #[tokio::test]
    async fn ping_round_trips_over_a_loopback_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (_tx, rx) = watch::channel(false);
        let server = Arc::new(Server::new(test_context(), Duration::from_secs(5), Duration::from_secs(5)));
        tokio::spawn(server.run(listener, rx));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        let mut buf = vec![0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+PONG\r\n");
    }

    #[tokio::test]
    async fn join_connections_returns_once_the_connection_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (_tx, rx) = watch::channel(false);
        let server = Arc::new(Server::new(test_context(), Duration::from_secs(5), Duration::from_secs(5)));
        tokio::spawn(Arc::clone(&server).run(listener, rx));

        let client = TcpStream::connect(addr).await.unwrap();
        drop(client);

        server.join_connections(Duration::from_secs(5)).await;
    }
}
