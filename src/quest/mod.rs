//! Rule-driven quest engine.
//!
//! Quest content is authored as packages of instruction strings: conditions
//! (predicates over a player), events (actions fired at a player or at
//! nobody), objectives (long-lived progress trackers) and conversations
//! (NPC dialogue graphs). The [`engine::QuestEngine`] façade wires them
//! together at runtime; the host game integrates through the
//! [`adapter::GameServer`] trait and player state persists in a sled store.

pub mod adapter;
pub mod backup;
pub mod conditions;
pub mod conversation;
pub mod engine;
pub mod errors;
pub mod events;
pub mod instruction;
pub mod objectives;
pub mod package;
pub mod registry;
pub mod storage;
pub mod types;

pub use adapter::{ConsoleServer, Economy, GameServer, NpcDirectory, Permissions};
pub use conditions::Condition;
pub use conversation::{Conversation, ConversationTurn};
pub use engine::QuestEngine;
pub use errors::QuestError;
pub use events::QuestEvent;
pub use instruction::Instruction;
pub use objectives::{Happening, Objective, Progress};
pub use package::{PackageRegistry, QuestPackage};
pub use registry::TypeRegistry;
pub use storage::{QuestStore, QuestStoreBuilder};
pub use types::{Location, PlayerRecord};
