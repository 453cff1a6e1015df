//! The turn loop: the heart of Roleplayer.
//!
//! Every call follows a **Format → Generate → Parse → Dispatch** cycle:
//!
//! 1. **Format** the history into the prompt the model was trained on
//! 2. **Generate** the next turn via the configured provider
//! 3. **Parse** the reply into language and an optional action
//! 4. **If an action**: run it, append the call and its result, loop back to 1
//! 5. **If plain language** (or the finish action): return it as the answer
//!
//! The loop stops after `max_turn` model calls even if the model keeps
//! asking for tools. [`RoleplayerAgent::chat`] returns once at the end;
//! [`RoleplayerAgent::stream_chat`] yields a snapshot after every update.

pub mod conversation;
pub mod dispatcher;
pub mod loop_runner;
pub mod stream;

#[cfg(test)]
mod test_helpers;

pub use conversation::Conversation;
pub use dispatcher::{Dispatched, Dispatcher, Resolved, SkipReason};
pub use loop_runner::RoleplayerAgent;
