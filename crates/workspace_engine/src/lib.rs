//! Workspace engine: push-connection transport, event decoding, chat API
//! and effect execution.
mod api;
mod decode;
mod engine;
mod persist;
mod router;
mod stream;
mod types;

pub use api::{ChatApi, CommitRequest, ReqwestChatApi};
pub use decode::{decode_event, DecodeError, SseDecoder, SseFrame};
pub use engine::EngineHandle;
pub use persist::{ensure_state_dir, AtomicFileWriter, PersistError};
pub use router::StreamRouter;
pub use stream::{ByteStream, EventTransport, ReqwestEventTransport};
pub use types::{
    ApiError, ChannelEventSink, EngineError, EngineEvent, EngineSettings, EventSink,
    ReconnectPolicy, StreamError, StreamTarget,
};
