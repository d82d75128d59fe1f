use crate::chunk::{ChunkEnvelope, ChunkKind};
use crate::ids::{MessageId, TurnId};
use crate::message::Message;

/// Lifecycle of one submitted request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Streaming,
    Completed,
    Failed(String),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

/// Rejection reason for illegal lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTransitionRejection {
    AlreadyStarted(SessionState),
    NotStreaming(SessionState),
}

pub type SessionTransitionResult = Result<SessionState, SessionTransitionRejection>;

/// Effect of one decoded chunk on the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Nothing changed: empty terminal frame, untyped chunk, or session not streaming.
    Ignored,
    /// The terminal frame carried a conversation-turn id.
    TurnIdCaptured(TurnId),
    Pushed(usize),
    Updated(usize),
}

impl ChunkOutcome {
    pub fn mutated(self) -> bool {
        matches!(self, Self::Pushed(_) | Self::Updated(_))
    }
}

/// Accumulator state for one streamed reply.
///
/// The session never owns the transcript; callers pass it in so the same
/// message list can outlive many sessions.
#[derive(Debug, Clone)]
pub struct StreamSession {
    message_id: MessageId,
    state: SessionState,
    output_text: String,
    reasoning: String,
    turn_id: Option<TurnId>,
}

impl StreamSession {
    pub fn new(message_id: MessageId) -> Self {
        Self {
            message_id,
            state: SessionState::Idle,
            output_text: String::new(),
            reasoning: String::new(),
            turn_id: None,
        }
    }

    /// Creates a session that is already streaming.
    pub fn started(message_id: MessageId) -> Self {
        let mut session = Self::new(message_id);
        session.state = SessionState::Streaming;
        session
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn turn_id(&self) -> Option<TurnId> {
        self.turn_id
    }

    pub fn start(&mut self) -> SessionTransitionResult {
        match self.state {
            SessionState::Idle => {
                self.state = SessionState::Streaming;
                Ok(self.state.clone())
            }
            _ => Err(SessionTransitionRejection::AlreadyStarted(self.state.clone())),
        }
    }

    pub fn complete(&mut self) -> SessionTransitionResult {
        self.finish(SessionState::Completed)
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> SessionTransitionResult {
        self.finish(SessionState::Failed(reason.into()))
    }

    fn finish(&mut self, next: SessionState) -> SessionTransitionResult {
        match self.state {
            SessionState::Streaming => {
                self.state = next;
                Ok(self.state.clone())
            }
            _ => Err(SessionTransitionRejection::NotStreaming(self.state.clone())),
        }
    }

    /// Applies one decoded chunk to `messages`.
    pub fn apply_chunk(
        &mut self,
        envelope: &ChunkEnvelope,
        messages: &mut Vec<Message>,
    ) -> ChunkOutcome {
        if self.state != SessionState::Streaming {
            return ChunkOutcome::Ignored;
        }

        if envelope.done {
            if let Some(turn_id) = envelope.trailing_turn_id() {
                tracing::debug!(
                    message_id = %self.message_id,
                    %turn_id,
                    "captured trailing turn id"
                );
                self.turn_id = Some(turn_id);
                return ChunkOutcome::TurnIdCaptured(turn_id);
            }
            if envelope.chunk.is_empty() {
                return ChunkOutcome::Ignored;
            }
        }

        let Some(kind) = envelope.kind else {
            return ChunkOutcome::Ignored;
        };

        match kind {
            ChunkKind::ToolCalls | ChunkKind::ToolOutput => {
                self.reasoning.clear();
                self.push(messages, kind, envelope.chunk.clone())
            }
            ChunkKind::ReasoningSummary => match self.last_continuing(messages, kind) {
                Some(index) => {
                    self.reasoning.push_str(&envelope.chunk);
                    messages[index].content.clone_from(&self.reasoning);
                    ChunkOutcome::Updated(index)
                }
                None => {
                    self.reasoning.clone_from(&envelope.chunk);
                    self.push(messages, kind, envelope.chunk.clone())
                }
            },
            ChunkKind::OutputText => {
                self.output_text.push_str(&envelope.chunk);
                match self.last_continuing(messages, kind) {
                    Some(index) => {
                        messages[index].content.clone_from(&self.output_text);
                        ChunkOutcome::Updated(index)
                    }
                    None => self.push(messages, kind, self.output_text.clone()),
                }
            }
        }
    }

    fn last_continuing(&self, messages: &[Message], kind: ChunkKind) -> Option<usize> {
        let index = messages.len().checked_sub(1)?;
        messages[index]
            .continues(kind, self.message_id)
            .then_some(index)
    }

    fn push(&self, messages: &mut Vec<Message>, kind: ChunkKind, content: String) -> ChunkOutcome {
        messages.push(Message::chunk(kind, content, self.message_id));
        ChunkOutcome::Pushed(messages.len() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;

    fn chunk(kind: ChunkKind, text: &str) -> ChunkEnvelope {
        ChunkEnvelope::new(text, kind)
    }

    fn feed(session: &mut StreamSession, envelopes: &[ChunkEnvelope]) -> Vec<Message> {
        let mut messages = vec![Message::user("hi", Vec::new())];
        for envelope in envelopes {
            session.apply_chunk(envelope, &mut messages);
        }
        messages
    }

    #[test]
    fn output_text_accumulates_into_one_message() {
        let mut session = StreamSession::started(MessageId::new_v7());
        let messages = feed(
            &mut session,
            &[
                chunk(ChunkKind::OutputText, "Hel"),
                chunk(ChunkKind::OutputText, "lo"),
            ],
        );

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "Hello");
        assert_eq!(messages[1].kind, Some(MessageKind::OutputText));
        assert_eq!(messages[1].message_id, Some(session.message_id()));
    }

    #[test]
    fn tool_calls_never_merge() {
        let mut session = StreamSession::started(MessageId::new_v7());
        let messages = feed(
            &mut session,
            &[
                chunk(ChunkKind::ToolCalls, "search(a)"),
                chunk(ChunkKind::ToolCalls, "search(b)"),
                chunk(ChunkKind::ToolOutput, "result"),
            ],
        );

        let contents = messages[1..]
            .iter()
            .map(|message| (message.content.as_str(), message.folded))
            .collect::<Vec<_>>();
        assert_eq!(
            contents,
            vec![("search(a)", false), ("search(b)", false), ("result", false)]
        );
    }

    #[test]
    fn reasoning_appends_until_a_tool_call_intervenes() {
        let mut session = StreamSession::started(MessageId::new_v7());
        let messages = feed(
            &mut session,
            &[
                chunk(ChunkKind::ReasoningSummary, "First "),
                chunk(ChunkKind::ReasoningSummary, "thought"),
                chunk(ChunkKind::ToolCalls, "lookup()"),
                chunk(ChunkKind::ReasoningSummary, "Second"),
            ],
        );

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, "First thought");
        assert_eq!(messages[2].kind, Some(MessageKind::ToolCalls));
        assert_eq!(messages[3].content, "Second");
        assert_eq!(messages[3].kind, Some(MessageKind::ReasoningSummary));
    }

    #[test]
    fn output_after_tool_call_restarts_with_running_text() {
        let mut session = StreamSession::started(MessageId::new_v7());
        let messages = feed(
            &mut session,
            &[
                chunk(ChunkKind::OutputText, "Let me check. "),
                chunk(ChunkKind::ToolCalls, "lookup()"),
                chunk(ChunkKind::OutputText, "Done."),
            ],
        );

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[3].content, "Let me check. Done.");
    }

    #[test]
    fn does_not_continue_messages_of_a_previous_request() {
        let earlier = MessageId::new_v7();
        let mut messages = vec![Message::chunk(ChunkKind::OutputText, "old", earlier)];
        let mut session = StreamSession::started(MessageId::new_v7());

        let outcome = session.apply_chunk(&chunk(ChunkKind::OutputText, "new"), &mut messages);

        assert_eq!(outcome, ChunkOutcome::Pushed(1));
        assert_eq!(messages[0].content, "old");
        assert_eq!(messages[1].content, "new");
    }

    #[test]
    fn done_frame_with_digits_is_not_displayed() {
        let mut session = StreamSession::started(MessageId::new_v7());
        let mut messages = Vec::new();
        let mut terminal = chunk(ChunkKind::OutputText, " 42 ");
        terminal.done = true;

        let outcome = session.apply_chunk(&terminal, &mut messages);

        assert_eq!(outcome, ChunkOutcome::TurnIdCaptured(TurnId::new(42)));
        assert!(messages.is_empty());
        assert_eq!(session.turn_id(), Some(TurnId::new(42)));
    }

    #[test]
    fn empty_or_untyped_done_frames_are_no_ops() {
        let mut session = StreamSession::started(MessageId::new_v7());
        let mut messages = Vec::new();

        assert_eq!(
            session.apply_chunk(&ChunkEnvelope::terminal(""), &mut messages),
            ChunkOutcome::Ignored
        );
        assert_eq!(
            session.apply_chunk(&ChunkEnvelope::terminal("abc"), &mut messages),
            ChunkOutcome::Ignored
        );
        assert!(messages.is_empty());
        assert_eq!(session.turn_id(), None);
    }

    #[test]
    fn typed_done_frame_without_digits_is_still_dispatched() {
        let mut session = StreamSession::started(MessageId::new_v7());
        let mut messages = Vec::new();
        let mut terminal = chunk(ChunkKind::OutputText, "bye");
        terminal.done = true;

        assert_eq!(
            session.apply_chunk(&terminal, &mut messages),
            ChunkOutcome::Pushed(0)
        );
        assert_eq!(messages[0].content, "bye");
    }

    #[test]
    fn lifecycle_rejects_illegal_transitions() {
        let mut session = StreamSession::new(MessageId::new_v7());
        assert_eq!(
            session.complete(),
            Err(SessionTransitionRejection::NotStreaming(SessionState::Idle))
        );
        assert_eq!(session.start(), Ok(SessionState::Streaming));
        assert!(matches!(
            session.start(),
            Err(SessionTransitionRejection::AlreadyStarted(SessionState::Streaming))
        ));
        assert_eq!(session.complete(), Ok(SessionState::Completed));
        assert!(session.fail("late").is_err());
        assert!(session.state().is_terminal());
    }

    #[test]
    fn terminal_sessions_ignore_further_chunks() {
        let mut session = StreamSession::started(MessageId::new_v7());
        session.fail("connection reset").unwrap();
        let mut messages = Vec::new();

        let outcome = session.apply_chunk(&chunk(ChunkKind::OutputText, "late"), &mut messages);

        assert_eq!(outcome, ChunkOutcome::Ignored);
        assert!(messages.is_empty());
    }
}
