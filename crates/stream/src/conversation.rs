use std::sync::Arc;

use crate::error::StreamError;
use crate::ids::MessageId;
use crate::memory::{FinalizeSummary, MemoryRecord, ShortTermMemory, finalize_turn};
use crate::message::Message;
use crate::model::{DEFAULT_BASE_MODEL, ModelInfo, operator_for_model};
use crate::request::{ChatConfig, ChatRequest};
use crate::session::{SessionState, StreamSession};
use crate::transport::ChatTransport;
use crate::upload::AttachedImage;
use crate::worker::{
    ChatEventStream, ChatStreamHandle, StreamEvent, StreamEventPayload, stream_chat,
};

pub const DEFAULT_USER_NAME: &str = "default_user";

/// User input waiting to be sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub text: String,
    pub images: Vec<AttachedImage>,
}

impl Draft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            images: Vec::new(),
        }
    }

    pub fn with_image(mut self, image: AttachedImage) -> Self {
        self.images.push(image);
        self
    }

    fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.images.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejection {
    /// No text and no images.
    Empty,
    /// A reply is still streaming.
    Busy,
}

/// Request prepared by [`Conversation::submit`], ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTurn {
    pub message_id: MessageId,
    pub request: ChatRequest,
}

/// How the transcript reacted to one stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationUpdate {
    Ignored,
    Changed,
    Completed(FinalizeSummary),
    Failed(String),
}

impl ConversationUpdate {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }
}

/// Chat view state: transcript, memory and the in-flight session.
#[derive(Debug, Clone)]
pub struct Conversation {
    user_name: String,
    base_model: String,
    tools_name: Vec<String>,
    catalog: Vec<ModelInfo>,
    messages: Vec<Message>,
    short_term_memory: ShortTermMemory,
    long_term_memory: Vec<String>,
    session: Option<StreamSession>,
    is_loading: bool,
    error: Option<String>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(DEFAULT_USER_NAME)
    }
}

impl Conversation {
    pub fn new(user_name: impl Into<String>) -> Self {
        let user_name = user_name.into().trim().to_string();
        Self {
            user_name: if user_name.is_empty() {
                DEFAULT_USER_NAME.to_string()
            } else {
                user_name
            },
            base_model: DEFAULT_BASE_MODEL.to_string(),
            tools_name: Vec::new(),
            catalog: Vec::new(),
            messages: Vec::new(),
            short_term_memory: ShortTermMemory::new(),
            long_term_memory: Vec::new(),
            session: None,
            is_loading: false,
            error: None,
        }
    }

    /// Seeds the transcript and short-term memory from previously selected exchanges.
    pub fn with_memories(mut self, records: &[MemoryRecord]) -> Self {
        for record in records {
            self.messages.push(Message::user(record.human_input.clone(), Vec::new()));
            self.messages.push(Message::assistant(record.ai_response.clone()));
        }
        self.short_term_memory =
            ShortTermMemory::from_ids(records.iter().filter_map(MemoryRecord::turn_id));
        self
    }

    /// Models the operator is looked up in.
    pub fn with_catalog(mut self, catalog: Vec<ModelInfo>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn select_model(&mut self, base_model: impl Into<String>) {
        self.base_model = base_model.into();
    }

    pub fn set_tool_selected(&mut self, tool_name: &str, selected: bool) {
        if selected {
            if !self.tools_name.iter().any(|name| name == tool_name) {
                self.tools_name.push(tool_name.to_string());
            }
        } else {
            self.tools_name.retain(|name| name != tool_name);
        }
    }

    pub fn set_long_term_memory(&mut self, entries: Vec<String>) {
        self.long_term_memory = entries;
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn base_model(&self) -> &str {
        &self.base_model
    }

    pub fn tools_name(&self) -> &[String] {
        &self.tools_name
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn short_term_memory(&self) -> &ShortTermMemory {
        &self.short_term_memory
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn session_state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(|session| session.state().clone())
            .unwrap_or_default()
    }

    /// Appends the user message, opens a session and builds the request body.
    pub fn submit(&mut self, draft: Draft) -> Result<PendingTurn, SubmitRejection> {
        if self.is_loading {
            return Err(SubmitRejection::Busy);
        }
        if draft.is_blank() {
            return Err(SubmitRejection::Empty);
        }

        let (paths, previews): (Vec<_>, Vec<_>) = draft
            .images
            .into_iter()
            .map(|image| (image.path, image.preview))
            .unzip();
        self.messages.push(Message::user(draft.text.clone(), previews));

        let config = ChatConfig {
            operator: operator_for_model(&self.catalog, &self.base_model).to_string(),
            base_model: self.base_model.clone(),
            tools_name: self.tools_name.clone(),
            short_term_memory: self.short_term_memory.to_vec(),
            long_term_memory: self.long_term_memory.clone(),
        };
        let request =
            ChatRequest::new(self.user_name.clone(), draft.text, config).with_images(paths);

        let message_id = MessageId::new_v7();
        self.session = Some(StreamSession::started(message_id));
        self.is_loading = true;
        self.error = None;

        tracing::info!(
            %message_id,
            base_model = %request.config.base_model,
            operator = %request.config.operator,
            memory_len = request.config.short_term_memory.len(),
            "submitted chat request"
        );
        Ok(PendingTurn {
            message_id,
            request,
        })
    }

    /// Submits `draft` and builds the stream for it. The returned worker must be spawned.
    pub fn send(
        &mut self,
        transport: Arc<dyn ChatTransport>,
        draft: Draft,
    ) -> Result<ChatStreamHandle, SubmitRejection> {
        let turn = self.submit(draft)?;
        Ok(stream_chat(transport, turn.message_id, turn.request))
    }

    /// Applies one worker event. Events from other sessions are ignored.
    pub fn apply_event(&mut self, event: StreamEvent) -> ConversationUpdate {
        let Some(session) = self.session.as_mut() else {
            return ConversationUpdate::Ignored;
        };
        if session.message_id() != event.message_id || session.state().is_terminal() {
            tracing::debug!(message_id = %event.message_id, "ignoring stale stream event");
            return ConversationUpdate::Ignored;
        }

        match event.payload {
            StreamEventPayload::Chunk(envelope) => {
                if session.apply_chunk(&envelope, &mut self.messages).mutated() {
                    ConversationUpdate::Changed
                } else {
                    ConversationUpdate::Ignored
                }
            }
            StreamEventPayload::Done => self.complete(),
            StreamEventPayload::Error(error) => self.fail(error),
        }
    }

    /// Stops the in-flight reply behind `stream` without adding an error message.
    ///
    /// Chunks the worker queued before the cancel are never applied.
    pub fn cancel(&mut self, stream: &mut ChatEventStream) -> ConversationUpdate {
        stream.cancel();
        match stream.try_recv() {
            Some(event) => self.apply_event(event),
            None => ConversationUpdate::Ignored,
        }
    }

    /// Reads `stream` until the reply completes or fails, reporting every change.
    pub async fn drive<F>(&mut self, stream: &mut ChatEventStream, mut on_update: F) -> SessionState
    where
        F: FnMut(&Conversation, &ConversationUpdate),
    {
        while let Some(event) = stream.recv().await {
            let update = self.apply_event(event);
            if update == ConversationUpdate::Ignored {
                continue;
            }
            on_update(self, &update);
            if update.is_terminal() {
                return self.session_state();
            }
        }

        // Worker went away without Done/Error.
        let update = self.fail(StreamError::ChannelClosed {
            stage: "drive-conversation",
            message_id: stream.message_id(),
        });
        if update != ConversationUpdate::Ignored {
            on_update(self, &update);
        }
        self.session_state()
    }

    fn complete(&mut self) -> ConversationUpdate {
        let Some(session) = self.session.as_mut() else {
            return ConversationUpdate::Ignored;
        };
        if session.complete().is_err() {
            return ConversationUpdate::Ignored;
        }

        let summary = finalize_turn(
            &mut self.messages,
            session.message_id(),
            session.turn_id(),
            &mut self.short_term_memory,
        );
        self.is_loading = false;
        ConversationUpdate::Completed(summary)
    }

    fn fail(&mut self, error: StreamError) -> ConversationUpdate {
        let Some(session) = self.session.as_mut() else {
            return ConversationUpdate::Ignored;
        };
        let reason = error.to_string();
        if session.fail(reason.clone()).is_err() {
            return ConversationUpdate::Ignored;
        }

        self.is_loading = false;
        if error.is_cancelled() {
            tracing::info!(message_id = %session.message_id(), "chat stream cancelled");
        } else {
            tracing::error!(
                message_id = %session.message_id(),
                error = %reason,
                "chat stream failed"
            );
            self.messages.push(Message::error_reply(session.message_id()));
            self.error = Some(reason.clone());
        }
        ConversationUpdate::Failed(reason)
    }
}
