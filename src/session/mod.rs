//! Session module - conversation state for a single run
//!
//! The runtime owns a [`State`] for the duration of one run and is its only
//! writer. Persistence of conversation history lives outside this crate.
//!
//! # Example
//!
//! ```
//! use relaybot::session::{Message, State};
//!
//! let mut state = State::new();
//! state.push(Message::system("You are a helpful assistant."));
//! state.push(Message::user("Hello!"));
//! assert_eq!(state.len(), 2);
//! ```

pub mod types;

pub use types::{Directive, FileSource, Message, Part, Role, State, TOOL_CALLS_METADATA_KEY};
