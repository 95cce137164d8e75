//! Data models for conversations and their synchronization state

mod conversation;
mod message;
mod sync;

pub use conversation::*;
pub use message::*;
pub use sync::*;
