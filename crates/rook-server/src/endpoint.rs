//! Connection endpoint: text-frame reads and writes with deadlines over one
//! upgraded socket.
//!
//! Both halves are generic over the `Stream`/`Sink` the socket splits into,
//! so pumps can be driven by in-memory channels in tests.

use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::debug;

/// Why an endpoint stopped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    /// No pong within the read deadline, or a write overran its deadline.
    #[error("deadline exceeded")]
    Timeout,
    /// The peer closed the connection.
    #[error("connection closed")]
    Closed,
    /// The socket reported an error.
    #[error("transport error: {0}")]
    Transport(String),
    /// Inbound frame larger than the configured limit.
    #[error("frame of {size} bytes exceeds limit of {limit}")]
    TooLarge { size: usize, limit: usize },
}

/// Read half with a rolling pong deadline.
pub struct EndpointReader<S> {
    stream: S,
    max_message_size: usize,
    pong_wait: Duration,
    deadline: Instant,
}

impl<S, E> EndpointReader<S>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    pub fn new(stream: S, max_message_size: usize, pong_wait: Duration) -> Self {
        Self {
            stream,
            max_message_size,
            pong_wait,
            deadline: Instant::now() + pong_wait,
        }
    }

    /// Next text payload from the peer.
    ///
    /// Pongs push the read deadline forward. Binary frames holding UTF-8 are
    /// read as text; other binary frames are skipped.
    pub async fn next_text(&mut self) -> Result<String, EndpointError> {
        loop {
            let next = timeout_at(self.deadline, self.stream.next())
                .await
                .map_err(|_| EndpointError::Timeout)?;
            let msg = match next {
                None => return Err(EndpointError::Closed),
                Some(Err(e)) => return Err(EndpointError::Transport(e.to_string())),
                Some(Ok(msg)) => msg,
            };
            match msg {
                Message::Text(text) => {
                    self.check_size(text.len())?;
                    return Ok(text.as_str().to_owned());
                }
                Message::Binary(data) => {
                    self.check_size(data.len())?;
                    match std::str::from_utf8(&data) {
                        Ok(text) => return Ok(text.to_owned()),
                        Err(_) => debug!(len = data.len(), "skipping non-UTF8 binary frame"),
                    }
                }
                Message::Pong(_) => {
                    self.deadline = Instant::now() + self.pong_wait;
                }
                Message::Ping(_) => {}
                Message::Close(_) => return Err(EndpointError::Closed),
            }
        }
    }

    fn check_size(&self, size: usize) -> Result<(), EndpointError> {
        if size > self.max_message_size {
            return Err(EndpointError::TooLarge {
                size,
                limit: self.max_message_size,
            });
        }
        Ok(())
    }
}

/// Write half; every write runs under `write_wait`.
pub struct EndpointWriter<K> {
    sink: K,
    write_wait: Duration,
}

impl<K, E> EndpointWriter<K>
where
    K: Sink<Message, Error = E> + Unpin,
    E: Display,
{
    pub fn new(sink: K, write_wait: Duration) -> Self {
        Self { sink, write_wait }
    }

    /// Write one text frame.
    pub async fn send_text(&mut self, text: String) -> Result<(), EndpointError> {
        self.write(Message::Text(text.into())).await
    }

    /// Write a keepalive ping.
    pub async fn ping(&mut self) -> Result<(), EndpointError> {
        self.write(Message::Ping(Vec::<u8>::new().into())).await
    }

    /// Send a close frame, then close the sink. Errors are ignored, so this
    /// is safe to call on an already-closed connection.
    pub async fn close(&mut self) {
        let _ = self.write(Message::Close(None)).await;
        let _ = timeout(self.write_wait, self.sink.close()).await;
    }

    async fn write(&mut self, msg: Message) -> Result<(), EndpointError> {
        match timeout(self.write_wait, self.sink.send(msg)).await {
            Err(_) => Err(EndpointError::Timeout),
            Ok(Err(e)) => Err(EndpointError::Transport(e.to_string())),
            Ok(Ok(())) => Ok(()),
        }
    }
}
