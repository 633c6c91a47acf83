//! Conversation state and the streamed-reply decoder.

mod decoder;
mod session;
mod turn;

pub use decoder::{decode_stream, DecoderState, Frame, StreamDecoder};
pub use session::{ChatSession, Language, SendOutcome};
pub use turn::{ChatTurn, Role, Transcript};
