use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio_util::sync::CancellationToken;

use strand_core::errors::ProviderError;
use strand_core::events::AgentEvent;

use crate::assemble::StreamAssembler;

/// Decodes one vendor's wire framing, applying complete frames to the
/// assembler as they become available in the buffer.
pub(crate) trait FrameParser: Send + 'static {
    /// Drain complete frames from the front of the buffer.
    fn drain(
        &mut self,
        buffer: &mut String,
        assembler: &mut StreamAssembler,
    ) -> Result<Vec<AgentEvent>, ProviderError>;

    /// Flush whatever remains at clean end-of-stream.
    fn finish_buffer(
        &mut self,
        buffer: &mut String,
        assembler: &mut StreamAssembler,
    ) -> Result<Vec<AgentEvent>, ProviderError>;
}

/// Adapts a raw byte stream into the canonical event sequence.
///
/// Owns the vendor frame parser and the assembler, applies the idle timeout,
/// and guarantees termination: whatever happens on the wire (interruption,
/// cancellation, malformed frame, silence), consumers always receive a final
/// message_end/turn_end pair and the stream then ends.
pub(crate) struct WireStream<P: FrameParser> {
    inner: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>,
    parser: P,
    assembler: StreamAssembler,
    buffer: String,
    pending: VecDeque<AgentEvent>,
    idle_deadline: Pin<Box<tokio::time::Sleep>>,
    idle_duration: Duration,
    cancelled: Pin<Box<dyn Future<Output = ()> + Send>>,
    terminal_enqueued: bool,
    finished: bool,
}

impl<P: FrameParser> WireStream<P> {
    pub(crate) fn new(
        byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
        parser: P,
        idle_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            parser,
            assembler: StreamAssembler::new(),
            buffer: String::new(),
            pending: VecDeque::new(),
            idle_deadline: Box::pin(tokio::time::sleep(idle_timeout)),
            idle_duration: idle_timeout,
            cancelled: Box::pin(cancel.clone().cancelled_owned()),
            terminal_enqueued: false,
            finished: false,
        }
    }

    fn enqueue(&mut self, events: Vec<AgentEvent>) {
        for event in events {
            if self.terminal_enqueued {
                break; // nothing may follow turn_end
            }
            if matches!(event, AgentEvent::TurnEnd { .. }) {
                self.terminal_enqueued = true;
            }
            self.pending.push_back(event);
        }
    }

    fn enqueue_failure(&mut self, error: ProviderError) {
        let events = self.assembler.fail(&error);
        self.enqueue(events);
    }
}

impl<P: FrameParser + Unpin> Stream for WireStream<P> {
    type Item = AgentEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                if matches!(event, AgentEvent::TurnEnd { .. }) {
                    self.finished = true;
                }
                return Poll::Ready(Some(event));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            if self.cancelled.as_mut().poll(cx).is_ready() {
                self.enqueue_failure(ProviderError::Cancelled);
                continue;
            }

            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let new_deadline = tokio::time::Instant::now() + self.idle_duration;
                    self.idle_deadline.as_mut().reset(new_deadline);

                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    self.buffer.push_str(&text);

                    let mut buffer = std::mem::take(&mut self.buffer);
                    let drained = {
                        let this = &mut *self;
                        this.parser.drain(&mut buffer, &mut this.assembler)
                    };
                    self.buffer = buffer;
                    match drained {
                        Ok(events) => self.enqueue(events),
                        Err(e) => self.enqueue_failure(e),
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    self.enqueue_failure(ProviderError::StreamInterrupted(e.to_string()));
                }
                Poll::Ready(None) => {
                    let mut buffer = std::mem::take(&mut self.buffer);
                    let flushed = {
                        let this = &mut *self;
                        this.parser.finish_buffer(&mut buffer, &mut this.assembler)
                    };
                    self.buffer = buffer;
                    match flushed {
                        Ok(events) => self.enqueue(events),
                        Err(e) => self.enqueue_failure(e),
                    }
                    if !self.terminal_enqueued {
                        self.enqueue_failure(ProviderError::StreamInterrupted(
                            "connection closed before end of message".into(),
                        ));
                    }
                }
                Poll::Pending => {
                    if self.idle_deadline.as_mut().poll(cx).is_ready() {
                        let secs = self.idle_duration.as_secs();
                        self.enqueue_failure(ProviderError::StreamInterrupted(format!(
                            "idle timeout after {secs}s"
                        )));
                        continue;
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}
