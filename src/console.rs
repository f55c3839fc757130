//! Interactive request console.
//!
//! Splits the input stream into whitespace-delimited words, sends each as a
//! request, and prints the server's reply. Words longer than `MAX_INPUT`
//! bytes are sent as several requests. Unread words stay buffered for the
//! next prompt. Ends on EOF or after the first failed task.

use crate::config::Config;
use crate::message::Payload;
use crate::task::{Client, TaskConfig, TaskError};
use std::io;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

pub const PROMPT: &str = "Input next request string (Ctrl-D to exit): ";

/// Longest request body taken from the input at once.
pub const MAX_INPUT: usize = 1024;

/// Attached to each request; the response carries the same instance back.
#[derive(Debug)]
pub struct RequestInfo {
    pub seq: u64,
    pub sent_at: Instant,
}

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("console I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Run the console on stdin/stdout against the configured server.
pub async fn run<M: Payload>(config: &Config) -> Result<(), ConsoleError> {
    let client = Client::new(TaskConfig::from(config));
    info!(addr = %client.config().addr, "Console connected to server address");

    let input = BufReader::new(tokio::io::stdin());
    let sent = run_with::<M, _, _, _>(client, input, tokio::io::stdout(), tokio::io::stderr())
        .await?;

    info!(requests = sent, "Console finished");
    Ok(())
}

/// Drive the console loop over arbitrary streams.
///
/// Prompts and responses go to `out`, task failure lines to `err`.
/// Returns the number of requests answered.
pub async fn run_with<M, R, W, E>(
    mut client: Client,
    mut input: R,
    mut out: W,
    mut err: E,
) -> Result<u64, ConsoleError>
where
    M: Payload,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    E: AsyncWrite + Unpin,
{
    let mut seq = 0u64;
    let mut word = Vec::with_capacity(MAX_INPUT);

    loop {
        out.write_all(PROMPT.as_bytes()).await?;
        out.flush().await?;

        next_word(&mut input, &mut word).await?;
        if word.is_empty() {
            out.write_all(b"\n").await?;
            out.flush().await?;
            return Ok(seq);
        }

        seq += 1;
        let mut req = M::default();
        req.set_body(&word).map_err(TaskError::from)?;
        req.set_attachment(Arc::new(RequestInfo {
            seq,
            sent_at: Instant::now(),
        }));

        match client.request(&req).await {
            Ok(resp) => {
                if let Some(info) = resp
                    .attachment()
                    .and_then(|a| a.downcast_ref::<RequestInfo>())
                {
                    debug!(
                        seq = info.seq,
                        bytes = resp.body().len(),
                        latency_us = info.sent_at.elapsed().as_micros() as u64,
                        "Response received"
                    );
                }

                if !resp.body().is_empty() {
                    out.write_all(b"Server Response: ").await?;
                    out.write_all(resp.body()).await?;
                    out.write_all(b"\n").await?;
                }
            }
            Err(e) => {
                err.write_all(failure_line(&e).as_bytes()).await?;
                err.flush().await?;
                return Err(e.into());
            }
        }
    }
}

/// Read the next word into `word`, at most `MAX_INPUT` bytes of it.
///
/// Leading whitespace is skipped; the rest of a longer word stays in
/// `input`. `word` is left empty at EOF.
async fn next_word<R>(input: &mut R, word: &mut Vec<u8>) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    word.clear();

    loop {
        let buf = input.fill_buf().await?;
        if buf.is_empty() {
            return Ok(());
        }
        let skip = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
        let found = skip < buf.len();
        input.consume(skip);
        if found {
            break;
        }
    }

    loop {
        let buf = input.fill_buf().await?;
        if buf.is_empty() {
            return Ok(());
        }
        let take = buf
            .iter()
            .take(MAX_INPUT - word.len())
            .take_while(|b| !b.is_ascii_whitespace())
            .count();
        word.extend_from_slice(&buf[..take]);
        let done = take < buf.len() || word.len() == MAX_INPUT;
        input.consume(take);
        if done {
            return Ok(());
        }
    }
}

fn failure_line(e: &TaskError) -> String {
    match e {
        TaskError::Resolve(source) => format!("DNS error: {}\n", source),
        TaskError::Connect(_)
        | TaskError::Io(_)
        | TaskError::Timeout(_)
        | TaskError::ConnectionClosed => format!("SYS error: {}\n", e),
        TaskError::Message(_) => format!("other error: {}\n", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageError;
    use crate::protocols::PassthroughMessage;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 2048];
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
        });
        addr
    }

    async fn words(mut input: &[u8]) -> Vec<Vec<u8>> {
        let mut words = Vec::new();
        let mut word = Vec::new();
        loop {
            next_word(&mut input, &mut word).await.unwrap();
            if word.is_empty() {
                return words;
            }
            words.push(word.clone());
        }
    }

    #[tokio::test]
    async fn test_next_word_splits_input_stream() {
        assert_eq!(
            words(b"hello world\n").await,
            vec![b"hello".to_vec(), b"world".to_vec()]
        );
        assert_eq!(
            words(b"   padded\n\n\nnext").await,
            vec![b"padded".to_vec(), b"next".to_vec()]
        );
        assert!(words(b"\n \t\n").await.is_empty());
        assert!(words(b"").await.is_empty());
    }

    #[tokio::test]
    async fn test_next_word_splits_long_word() {
        let mut input = b"hello world ".to_vec();
        input.extend(std::iter::repeat(b'x').take(MAX_INPUT + 6));
        input.extend_from_slice(b"\n\n");

        let split = words(&input).await;
        assert_eq!(split.len(), 4);
        assert_eq!(split[0], b"hello");
        assert_eq!(split[1], b"world");
        assert_eq!(split[2], vec![b'x'; MAX_INPUT]);
        assert_eq!(split[3], vec![b'x'; 6]);
    }

    #[test]
    fn test_failure_lines() {
        let dns = TaskError::Resolve(io::Error::new(io::ErrorKind::NotFound, "no such host"));
        assert_eq!(failure_line(&dns), "DNS error: no such host\n");

        assert!(failure_line(&TaskError::ConnectionClosed).starts_with("SYS error: "));

        let other = TaskError::Message(MessageError::Malformed("bad"));
        assert!(failure_line(&other).starts_with("other error: "));
    }

    #[tokio::test]
    async fn test_session_echoes_each_word() {
        let addr = echo_server().await;
        let client = Client::new(TaskConfig::new(addr));

        let input: &[u8] = b"hello world\n\nsecond\n\n";
        let mut out: Vec<u8> = Vec::new();
        let mut err: Vec<u8> = Vec::new();

        let sent = run_with::<PassthroughMessage, _, _, _>(client, input, &mut out, &mut err)
            .await
            .unwrap();

        assert_eq!(sent, 3);
        let expected = format!(
            "{p}Server Response: hello\n{p}Server Response: world\n\
             {p}Server Response: second\n{p}\n",
            p = PROMPT
        );
        assert_eq!(String::from_utf8(out).unwrap(), expected);
        assert!(err.is_empty());
    }

    #[tokio::test]
    async fn test_session_sends_every_piece_of_long_word() {
        let addr = echo_server().await;
        let client = Client::new(TaskConfig::new(addr));

        let mut input = b"hello world ".to_vec();
        input.extend(std::iter::repeat(b'x').take(MAX_INPUT + 6));
        input.extend_from_slice(b"\n\n");
        let mut out: Vec<u8> = Vec::new();

        let sent = run_with::<PassthroughMessage, _, _, _>(
            client,
            &input[..],
            &mut out,
            Vec::<u8>::new(),
        )
        .await
        .unwrap();

        assert_eq!(sent, 4);
        let out = String::from_utf8(out).unwrap();
        assert_eq!(out.matches("Server Response: ").count(), 4);
        assert!(out.contains(&format!("Server Response: {}\n", "x".repeat(MAX_INPUT))));
        assert!(out.contains("Server Response: xxxxxx\n"));
    }

    #[tokio::test]
    async fn test_eof_ends_session_without_requests() {
        let client = Client::new(TaskConfig::new("127.0.0.1:1"));
        let input: &[u8] = b"";
        let mut out: Vec<u8> = Vec::new();

        let sent =
            run_with::<PassthroughMessage, _, _, _>(client, input, &mut out, Vec::<u8>::new())
                .await
                .unwrap();

        assert_eq!(sent, 0);
        assert_eq!(out, format!("{}\n", PROMPT).into_bytes());
    }

    #[tokio::test]
    async fn test_failed_task_ends_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = Client::new(TaskConfig::new(addr));
        let input: &[u8] = b"hello\nnever-sent\n";
        let mut err: Vec<u8> = Vec::new();

        let result =
            run_with::<PassthroughMessage, _, _, _>(client, input, Vec::<u8>::new(), &mut err).await;

        assert!(matches!(
            result,
            Err(ConsoleError::Task(TaskError::Connect(_)))
        ));
        assert!(String::from_utf8(err).unwrap().starts_with("SYS error: "));
    }
}
