//! # Questline
//!
//! A rule-driven quest engine. Quest content lives in packages of
//! instruction strings (conditions, events, objectives) plus JSON
//! conversation graphs; the engine evaluates, fires and tracks them for
//! players supplied by a host game server.
//!
//! ## Architecture
//!
//! - [`quest::engine`] - the runtime façade: condition evaluation, the
//!   event firing pipeline, objective lifecycle, conversation sessions
//! - [`quest::package`] - package discovery and raw definition loading
//! - [`quest::registry`] - keyword to factory mapping for instruction types
//! - [`quest::adapter`] - the [`quest::GameServer`] seam a host implements
//! - [`quest::storage`] - sled-backed player state persistence
//! - [`quest::backup`] - snapshot backups of the player database
//! - [`config`] - TOML configuration for the standalone binary
//!
//! ## Embedding
//!
//! ```rust,no_run
//! use questline::quest::{ConsoleServer, QuestEngine, QuestStore};
//!
//! fn main() -> Result<(), questline::quest::QuestError> {
//!     let store = QuestStore::open("./data")?;
//!     let mut engine = QuestEngine::new(Box::new(ConsoleServer), store);
//!     engine.load_packs(std::path::Path::new("./packages"))?;
//!     engine.player_join("alice")?;
//!     engine.fire(Some("alice"), "default.welcome");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod logutil;
pub mod quest;

pub use quest::{QuestEngine, QuestError};
