//! Chat sessions, messages, and the generation lifecycle
//!
//! - [`types`]: `Session`, `Message`, and title derivation
//! - [`store`]: `ConversationStore`, which owns all sessions and settles
//!   background generations into their placeholder messages

pub mod store;
pub mod types;

pub use store::{ConversationStore, GenerationHandle, SUCCESS_CONTENT};
pub use types::{title_from, Message, Role, Session, DEFAULT_SESSION_TITLE, TITLE_MAX_CHARS};
