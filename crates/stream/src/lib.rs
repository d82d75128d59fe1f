#![deny(unsafe_code)]

//! Client-side streaming engine for the Peng chat backend.
//!
//! A submitted prompt is POSTed by a [`ChatTransport`], the response body is
//! split into lines by [`LineFramer`], each line is decoded into a
//! [`ChunkEnvelope`] and folded into the transcript by a [`StreamSession`].
//! When the stream ends, [`finalize_turn`] collapses tool/reasoning rows and
//! records the backend turn id in [`ShortTermMemory`].

pub mod auth;
pub mod chunk;
/// Chat view state wiring sessions, memory and the stream worker together.
pub mod conversation;
pub mod error;
pub mod framer;
pub mod ids;
pub mod memory;
pub mod message;
pub mod model;
pub mod request;
/// Per-request reply assembly state machine.
pub mod session;
pub mod transport;
pub mod upload;
pub mod worker;

pub use auth::{MemoryToken, NoToken, TokenProvider};
pub use chunk::{ChunkEnvelope, ChunkKind, decode_line, extract_turn_id};
pub use conversation::{
    Conversation, ConversationUpdate, DEFAULT_USER_NAME, Draft, PendingTurn, SubmitRejection,
};
pub use error::{StreamError, StreamResult};
pub use framer::LineFramer;
pub use ids::{MessageId, TurnId};
pub use memory::{
    FinalizeSummary, MemoryRecord, ShortTermMemory, collapse_newline_runs, finalize_turn,
};
pub use message::{ERROR_REPLY, Message, MessageKind, Role};
pub use model::{
    DEFAULT_BASE_MODEL, DEFAULT_OPERATOR, ModelInfo, fallback_models, operator_for_model,
};
pub use request::{ChatConfig, ChatRequest};
pub use session::{
    ChunkOutcome, SessionState, SessionTransitionRejection, SessionTransitionResult,
    StreamSession,
};
pub use transport::{BoxFuture, ByteStream, ChatTransport, HttpTransport};
pub use upload::{
    AttachedImage, ImageUploader, UploadedImage, attach_image, content_type_from_data_url,
};
pub use worker::{
    ChatEventStream, ChatStreamHandle, ChatWorker, StreamEvent, StreamEventPayload, stream_chat,
};
