use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};

use crate::chunk::{ChunkEnvelope, decode_line};
use crate::error::StreamError;
use crate::framer::LineFramer;
use crate::ids::MessageId;
use crate::request::ChatRequest;
use crate::transport::{ByteStream, ChatTransport};

pub type ChatWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Decoded stream payload handed to the conversation.
#[derive(Debug)]
pub enum StreamEventPayload {
    Chunk(ChunkEnvelope),
    Done,
    Error(StreamError),
}

#[derive(Debug)]
pub struct StreamEvent {
    pub message_id: MessageId,
    pub payload: StreamEventPayload,
}

/// Receiving half of one chat stream. Dropping it cancels the worker.
pub struct ChatEventStream {
    message_id: MessageId,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
    cancel: CancelState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelState {
    Live,
    // Cancelled; the `Cancelled` event has not been handed out yet.
    Pending,
    Reported,
}

pub struct ChatStreamHandle {
    pub stream: ChatEventStream,
    pub worker: ChatWorker,
}

impl ChatEventStream {
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// Next event. After [`cancel`](Self::cancel) this yields one `Cancelled`
    /// error, then `None`; events queued before the cancel are discarded.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        match self.cancel {
            CancelState::Live => self.events.recv().await,
            _ => self.take_cancelled(),
        }
    }

    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        match self.cancel {
            CancelState::Live => self.events.try_recv().ok(),
            _ => self.take_cancelled(),
        }
    }

    /// Stops the worker. Returns false if the stream was already cancelled.
    pub fn cancel(&mut self) -> bool {
        let Some(cancel_tx) = self.cancel_tx.take() else {
            return false;
        };
        let _ = cancel_tx.send(());
        self.events.close();
        self.cancel = CancelState::Pending;
        true
    }

    fn take_cancelled(&mut self) -> Option<StreamEvent> {
        if self.cancel != CancelState::Pending {
            return None;
        }
        self.cancel = CancelState::Reported;
        Some(StreamEvent {
            message_id: self.message_id,
            payload: StreamEventPayload::Error(StreamError::Cancelled {
                stage: "cancel-chat-stream",
                message_id: self.message_id,
            }),
        })
    }
}

impl Drop for ChatEventStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// Builds the worker future and its event stream for one submitted request.
///
/// The worker does nothing until the caller spawns or awaits it.
pub fn stream_chat(
    transport: Arc<dyn ChatTransport>,
    message_id: MessageId,
    request: ChatRequest,
) -> ChatStreamHandle {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();

    let stream = ChatEventStream {
        message_id,
        events: event_rx,
        cancel_tx: Some(cancel_tx),
        cancel: CancelState::Live,
    };
    let worker: ChatWorker = Box::pin(run_stream_worker(
        transport, message_id, request, event_tx, cancel_rx,
    ));

    ChatStreamHandle { stream, worker }
}

struct EventSink {
    message_id: MessageId,
    event_tx: mpsc::UnboundedSender<StreamEvent>,
}

impl EventSink {
    fn send(&self, payload: StreamEventPayload) -> bool {
        self.event_tx
            .send(StreamEvent {
                message_id: self.message_id,
                payload,
            })
            .is_ok()
    }
}

async fn run_stream_worker(
    transport: Arc<dyn ChatTransport>,
    message_id: MessageId,
    request: ChatRequest,
    event_tx: mpsc::UnboundedSender<StreamEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let sink = EventSink {
        message_id,
        event_tx,
    };

    let opened = tokio::select! {
        _ = &mut cancel_rx => {
            tracing::debug!(%message_id, "chat stream cancelled before the response arrived");
            return;
        }
        opened = transport.open(&request) => opened,
    };

    let body = match opened {
        Ok(body) => body,
        Err(error) => {
            tracing::error!(%message_id, error = %error, "failed to open chat stream");
            sink.send(StreamEventPayload::Error(error));
            return;
        }
    };

    match read_body(body, &sink, &mut cancel_rx).await {
        ReadOutcome::Finished => {
            sink.send(StreamEventPayload::Done);
        }
        ReadOutcome::Cancelled => {
            tracing::debug!(%message_id, "chat stream cancelled");
        }
        ReadOutcome::Failed(error) => {
            tracing::warn!(%message_id, error = %error, "chat stream failed mid-flight");
            sink.send(StreamEventPayload::Error(error));
        }
        ReadOutcome::Abandoned => {}
    }
}

enum ReadOutcome {
    Finished,
    Cancelled,
    Failed(StreamError),
    // Receiver dropped; nobody is listening anymore.
    Abandoned,
}

async fn read_body(
    mut body: ByteStream,
    sink: &EventSink,
    cancel_rx: &mut oneshot::Receiver<()>,
) -> ReadOutcome {
    let mut framer = LineFramer::new();
    let mut skipped_lines = 0usize;

    loop {
        let bytes = tokio::select! {
            _ = &mut *cancel_rx => return ReadOutcome::Cancelled,
            next = body.next() => match next {
                Some(Ok(bytes)) => bytes,
                Some(Err(error)) => return ReadOutcome::Failed(error),
                None => break,
            },
        };

        for line in framer.push(&bytes) {
            if line.trim().is_empty() {
                continue;
            }

            let envelope = match decode_line(&line) {
                Ok(envelope) => envelope,
                Err(error) => {
                    skipped_lines += 1;
                    tracing::debug!(
                        message_id = %sink.message_id,
                        error = %error,
                        "skipping malformed chunk line"
                    );
                    continue;
                }
            };

            let done = envelope.done;
            if !sink.send(StreamEventPayload::Chunk(envelope)) {
                return ReadOutcome::Abandoned;
            }
            if done {
                // Anything after the terminal frame is ignored.
                tracing::debug!(
                    message_id = %sink.message_id,
                    skipped_lines,
                    "chat stream signalled done"
                );
                return ReadOutcome::Finished;
            }
        }
    }

    framer.finish();
    tracing::debug!(
        message_id = %sink.message_id,
        skipped_lines,
        "chat stream reached end of body"
    );
    ReadOutcome::Finished
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;
    use futures::stream;

    use super::*;
    use crate::chunk::ChunkKind;
    use crate::error::StreamResult;
    use crate::request::ChatConfig;
    use crate::transport::BoxFuture;

    /// Transport replaying canned body reads, or failing to open.
    pub(crate) struct ScriptedTransport {
        reads: Mutex<Option<StreamResult<Vec<StreamResult<Bytes>>>>>,
        pending_forever: bool,
    }

    impl ScriptedTransport {
        pub(crate) fn reads(reads: Vec<StreamResult<Bytes>>) -> Self {
            Self {
                reads: Mutex::new(Some(Ok(reads))),
                pending_forever: false,
            }
        }

        pub(crate) fn lines(text: &str) -> Self {
            Self::reads(vec![Ok(Bytes::from(text.to_string()))])
        }

        pub(crate) fn failing(error: StreamError) -> Self {
            Self {
                reads: Mutex::new(Some(Err(error))),
                pending_forever: false,
            }
        }

        pub(crate) fn lines_then_stall(text: &str) -> Self {
            Self::stalled(vec![Ok(Bytes::from(text.to_string()))])
        }

        pub(crate) fn stalled(reads: Vec<StreamResult<Bytes>>) -> Self {
            Self {
                reads: Mutex::new(Some(Ok(reads))),
                pending_forever: true,
            }
        }
    }

    impl ChatTransport for ScriptedTransport {
        fn open<'a>(
            &'a self,
            _request: &'a ChatRequest,
        ) -> BoxFuture<'a, StreamResult<ByteStream>> {
            let scripted = self
                .reads
                .lock()
                .ok()
                .and_then(|mut slot| slot.take())
                .unwrap_or_else(|| Ok(Vec::new()));
            let pending_forever = self.pending_forever;
            Box::pin(async move {
                let reads = scripted?;
                let body = stream::iter(reads);
                if pending_forever {
                    Ok(Box::pin(body.chain(stream::pending())) as ByteStream)
                } else {
                    Ok(Box::pin(body) as ByteStream)
                }
            })
        }
    }

    pub(crate) fn request() -> ChatRequest {
        ChatRequest::new(
            "default_user",
            "hi",
            ChatConfig {
                operator: "openai".to_string(),
                base_model: "gpt-4".to_string(),
                tools_name: Vec::new(),
                short_term_memory: Vec::new(),
                long_term_memory: Vec::new(),
            },
        )
    }

    async fn drain(transport: ScriptedTransport) -> Vec<StreamEventPayload> {
        let handle = stream_chat(Arc::new(transport), MessageId::new_v7(), request());
        let mut stream = handle.stream;
        handle.worker.await;

        let mut payloads = Vec::new();
        while let Some(event) = stream.try_recv() {
            payloads.push(event.payload);
        }
        payloads
    }

    #[tokio::test]
    async fn forwards_decoded_chunks_and_skips_garbage() {
        let payloads = drain(ScriptedTransport::reads(vec![
            Ok(Bytes::from_static(
                b"{\"chunk\":\"Hel\",\"type\":\"output_text\",\"done\":false}\nnot json\n",
            )),
            Ok(Bytes::from_static(b"\n{\"chunk\":\"lo\",\"type\":\"outp")),
            Ok(Bytes::from_static(
                b"ut_text\",\"done\":false}\n{\"chunk\":\"7\",\"done\":true}\n",
            )),
        ]))
        .await;

        assert_eq!(payloads.len(), 4);
        assert!(matches!(
            &payloads[0],
            StreamEventPayload::Chunk(envelope)
                if envelope.chunk == "Hel" && envelope.kind == Some(ChunkKind::OutputText)
        ));
        assert!(matches!(
            &payloads[1],
            StreamEventPayload::Chunk(envelope) if envelope.chunk == "lo"
        ));
        assert!(matches!(&payloads[2], StreamEventPayload::Chunk(envelope) if envelope.done));
        assert!(matches!(payloads[3], StreamEventPayload::Done));
    }

    #[tokio::test]
    async fn stops_reading_after_done_frame() {
        let payloads = drain(ScriptedTransport::lines(
            "{\"chunk\":\"\",\"done\":true}\n{\"chunk\":\"late\",\"type\":\"output_text\"}\n",
        ))
        .await;

        assert_eq!(payloads.len(), 2);
        assert!(matches!(payloads[1], StreamEventPayload::Done));
    }

    #[tokio::test]
    async fn end_of_body_without_done_still_completes() {
        let payloads = drain(ScriptedTransport::lines(
            "{\"chunk\":\"a\",\"type\":\"output_text\"}\n{\"chunk\":\"unterminated\"",
        ))
        .await;

        assert_eq!(payloads.len(), 2);
        assert!(matches!(payloads[1], StreamEventPayload::Done));
    }

    #[tokio::test]
    async fn open_failure_is_reported_once() {
        let payloads = drain(ScriptedTransport::failing(StreamError::EmptyBody {
            stage: "test",
        }))
        .await;

        assert_eq!(payloads.len(), 1);
        assert!(matches!(
            payloads[0],
            StreamEventPayload::Error(StreamError::EmptyBody { .. })
        ));
    }

    #[tokio::test]
    async fn cancel_interrupts_a_stalled_read() {
        let handle = stream_chat(
            Arc::new(ScriptedTransport::stalled(vec![Ok(Bytes::from_static(
                b"{\"chunk\":\"x\",\"type\":\"tool_calls\"}\n",
            ))])),
            MessageId::new_v7(),
            request(),
        );
        let mut stream = handle.stream;
        let worker = tokio::spawn(handle.worker);

        let first = stream.recv().await.expect("first chunk");
        assert!(matches!(first.payload, StreamEventPayload::Chunk(_)));

        assert!(stream.cancel());
        assert!(!stream.cancel());
        worker.await.expect("worker exits after cancel");

        let cancelled = stream.recv().await.expect("cancellation event");
        assert!(matches!(
            cancelled.payload,
            StreamEventPayload::Error(StreamError::Cancelled { .. })
        ));
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancel_discards_events_queued_before_it() {
        let handle = stream_chat(
            Arc::new(ScriptedTransport::lines_then_stall(concat!(
                "{\"chunk\":\"a\",\"type\":\"tool_calls\"}\n",
                "{\"chunk\":\"b\",\"type\":\"tool_calls\"}\n",
            ))),
            MessageId::new_v7(),
            request(),
        );
        let mut stream = handle.stream;
        let mut worker = handle.worker;
        // One poll reads the scripted body and parks on the stalled tail.
        assert!(futures::poll!(&mut worker).is_pending());

        stream.cancel();
        worker.await;

        let payloads: Vec<_> = std::iter::from_fn(|| stream.try_recv())
            .map(|event| event.payload)
            .collect();
        assert_eq!(payloads.len(), 1);
        assert!(matches!(
            payloads[0],
            StreamEventPayload::Error(StreamError::Cancelled { .. })
        ));
    }
}
