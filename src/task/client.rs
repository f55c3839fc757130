use crate::message::Message;
use crate::task::{exchange, Phase, TaskConfig, TaskError, READ_BUFFER_SIZE};
use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, warn};

/// A connection parked after a clean exchange.
struct IdleConnection {
    stream: TcpStream,
    since: Instant,
}

/// Runs request/response tasks against one server address.
///
/// Holds at most one idle connection, reused while it is younger than the
/// configured keep-alive window.
pub struct Client {
    config: TaskConfig,
    idle: Option<IdleConnection>,
}

impl Client {
    pub fn new(config: TaskConfig) -> Self {
        Self { config, idle: None }
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Whether a connection is parked for reuse.
    pub fn has_idle_connection(&self) -> bool {
        self.idle.is_some()
    }

    /// Send `req` and return the completed response.
    ///
    /// The response is a fresh `M` carrying the configured size limit and
    /// a copy of the request's attachment. Transport failures are retried up
    /// to `retry_max` times, each with a new response instance.
    pub async fn request<M>(&mut self, req: &M) -> Result<M, TaskError>
    where
        M: Message + Default,
    {
        let mut retries = 0;
        loop {
            match self.attempt(req).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() && retries < self.config.retry_max => {
                    retries += 1;
                    warn!(
                        addr = %self.config.addr,
                        retry = retries,
                        error = %e,
                        "Task failed, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt<M>(&mut self, req: &M) -> Result<M, TaskError>
    where
        M: Message + Default,
    {
        // A parked connection may have been closed by the peer since; only
        // that failure reconnects without counting against the retry budget.
        if let Some(stream) = self.take_idle() {
            match self.exchange(stream, req).await {
                Err(e) if e.is_peer_closed() => {
                    debug!(error = %e, "Keep-alive connection failed, reconnecting");
                }
                result => return result,
            }
        }

        let stream = self.connect().await?;
        self.exchange(stream, req).await
    }

    async fn exchange<M>(&mut self, mut stream: TcpStream, req: &M) -> Result<M, TaskError>
    where
        M: Message + Default,
    {
        timeout(
            self.config.send_timeout,
            exchange::send(&mut stream, req, self.config.max_segments),
        )
        .await
        .map_err(|_| TaskError::Timeout(Phase::Send))??;

        let mut resp = M::default();
        resp.set_size_limit(self.config.response_size_limit);
        if let Some(attachment) = req.attachment() {
            resp.set_attachment(Arc::clone(attachment));
        }

        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        timeout(
            self.config.receive_timeout,
            exchange::receive(&mut stream, &mut resp, &mut buf),
        )
        .await
        .map_err(|_| TaskError::Timeout(Phase::Receive))??;

        if !buf.is_empty() {
            debug!(bytes = buf.len(), "Trailing bytes after response, closing connection");
        } else if !self.config.keep_alive.is_zero() {
            self.idle = Some(IdleConnection {
                stream,
                since: Instant::now(),
            });
        }

        Ok(resp)
    }

    fn take_idle(&mut self) -> Option<TcpStream> {
        let idle = self.idle.take()?;
        if idle.since.elapsed() < self.config.keep_alive {
            Some(idle.stream)
        } else {
            debug!("Keep-alive window expired, closing idle connection");
            None
        }
    }

    async fn connect(&self) -> Result<TcpStream, TaskError> {
        let addrs: Vec<SocketAddr> = lookup_host(self.config.addr.as_str())
            .await
            .map_err(TaskError::Resolve)?
            .collect();

        let mut last_error = TaskError::Resolve(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses for {}", self.config.addr),
        ));

        for addr in addrs {
            match timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    stream.set_nodelay(true)?;
                    debug!(peer = %addr, "Connected");
                    return Ok(stream);
                }
                Ok(Err(e)) => {
                    debug!(peer = %addr, error = %e, "Connect failed");
                    last_error = TaskError::Connect(e);
                }
                Err(_) => {
                    debug!(peer = %addr, "Connect timed out");
                    last_error = TaskError::Timeout(Phase::Connect);
                }
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Attachment, MessageError};
    use crate::protocols::{LengthPrefixedMessage, PassthroughMessage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    /// Echo each read back on the same connection until the peer closes.
    async fn echo(mut stream: TcpStream) {
        let mut buf = vec![0u8; 1024];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => {
                    if stream.write_all(&buf[..n]).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    fn request(body: &[u8]) -> PassthroughMessage {
        let mut req = PassthroughMessage::new();
        req.set_body(body).unwrap();
        req
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (listener, addr) = listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            echo(stream).await;
        });

        let mut client = Client::new(TaskConfig::new(addr));
        let resp = client.request(&request(b"hello")).await.unwrap();

        assert_eq!(resp.body(), b"hello");
        assert_eq!(resp.size_limit(), 4 * 1024);
    }

    #[tokio::test]
    async fn test_length_prefixed_round_trip() {
        let (listener, addr) = listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            echo(stream).await;
        });

        let mut req = LengthPrefixedMessage::new();
        req.set_body(b"framed").unwrap();

        let mut client = Client::new(TaskConfig::new(addr));
        let resp = client.request(&req).await.unwrap();
        assert_eq!(resp.body(), b"framed");
    }

    #[tokio::test]
    async fn test_keep_alive_reuses_connection() {
        let (listener, addr) = listener().await;
        // Only one connection is ever accepted.
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            echo(stream).await;
        });

        let mut client = Client::new(TaskConfig::new(addr));
        assert_eq!(client.request(&request(b"one")).await.unwrap().body(), b"one");
        assert!(client.has_idle_connection());
        assert_eq!(client.request(&request(b"two")).await.unwrap().body(), b"two");
    }

    #[tokio::test]
    async fn test_keep_alive_disabled() {
        let (listener, addr) = listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            echo(stream).await;
        });

        let mut config = TaskConfig::new(addr);
        config.keep_alive = Duration::ZERO;
        let mut client = Client::new(config);

        client.request(&request(b"once")).await.unwrap();
        assert!(!client.has_idle_connection());
    }

    #[tokio::test]
    async fn test_attachment_copied_to_response() {
        let (listener, addr) = listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            echo(stream).await;
        });

        let attachment: Attachment = Arc::new(42u32);
        let mut req = request(b"tagged");
        req.set_attachment(Arc::clone(&attachment));

        let mut client = Client::new(TaskConfig::new(addr));
        let resp = client.request(&req).await.unwrap();

        let copied = resp.attachment().unwrap();
        assert!(Arc::ptr_eq(copied, &attachment));
        assert_eq!(copied.downcast_ref::<u32>(), Some(&42));
    }

    #[tokio::test]
    async fn test_retry_after_closed_connection() {
        let (listener, addr) = listener().await;
        tokio::spawn(async move {
            // First connection is dropped without a reply.
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf).await;
            drop(stream);

            let (stream, _) = listener.accept().await.unwrap();
            echo(stream).await;
        });

        let mut config = TaskConfig::new(addr);
        config.retry_max = 1;
        let mut client = Client::new(config);

        let resp = client.request(&request(b"again")).await.unwrap();
        assert_eq!(resp.body(), b"again");
    }

    #[tokio::test]
    async fn test_no_retry_reports_closed_connection() {
        let (listener, addr) = listener().await;
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf).await;
        });

        let mut client = Client::new(TaskConfig::new(addr));
        let err = client.request(&request(b"lost")).await.unwrap_err();
        assert!(matches!(err, TaskError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_reconnects_after_peer_closes_idle_connection() {
        let (listener, addr) = listener().await;
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            // First connection answers once, then closes.
            let (mut stream, _) = listener.accept().await.unwrap();
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            stream.write_all(&buf[..n]).await.unwrap();
            drop(stream);

            let (stream, _) = listener.accept().await.unwrap();
            counter.fetch_add(1, Ordering::SeqCst);
            echo(stream).await;
        });

        // No retries: the reconnect must not depend on the retry budget.
        let mut client = Client::new(TaskConfig::new(addr));
        assert_eq!(client.request(&request(b"first")).await.unwrap().body(), b"first");
        assert!(client.has_idle_connection());

        tokio::time::sleep(Duration::from_millis(50)).await;

        let resp = client.request(&request(b"second")).await.unwrap();
        assert_eq!(resp.body(), b"second");
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_server_is_not_sent_request_twice() {
        let (listener, addr) = listener().await;
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                let counter = Arc::clone(&counter);
                tokio::spawn(async move {
                    // Answers the first message only, then stays silent.
                    let mut buf = [0u8; 64];
                    let mut answered = false;
                    loop {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => {
                                counter.fetch_add(1, Ordering::SeqCst);
                                if !answered {
                                    answered = true;
                                    let _ = stream.write_all(&buf[..n]).await;
                                }
                            }
                        }
                    }
                });
            }
        });

        let mut config = TaskConfig::new(addr);
        config.receive_timeout = Duration::from_millis(200);
        let mut client = Client::new(config);

        client.request(&request(b"one")).await.unwrap();
        let err = client.request(&request(b"two")).await.unwrap_err();

        assert!(matches!(err, TaskError::Timeout(Phase::Receive)));
        assert_eq!(received.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_response_over_limit_is_not_retried() {
        let (listener, addr) = listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            echo(stream).await;
        });

        let mut config = TaskConfig::new(addr);
        config.response_size_limit = 4;
        config.retry_max = 3;
        let mut client = Client::new(config);

        let err = client.request(&request(b"0123456789")).await.unwrap_err();
        assert!(matches!(
            err,
            TaskError::Message(MessageError::SizeExceeded { size: 10, limit: 4 })
        ));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let (listener, addr) = listener().await;
        drop(listener);

        let mut client = Client::new(TaskConfig::new(addr));
        let err = client.request(&request(b"nobody")).await.unwrap_err();
        assert!(matches!(err, TaskError::Connect(_)));
    }

    #[tokio::test]
    async fn test_unresolvable_address() {
        let mut client = Client::new(TaskConfig::new("missing-port"));
        let err = client.request(&request(b"x")).await.unwrap_err();
        assert!(matches!(err, TaskError::Resolve(_)));
    }
}
