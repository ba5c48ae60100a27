//! Game-server adapter seam.
//!
//! The engine never talks to a host game server directly; everything it
//! needs is expressed as capabilities on [`GameServer`]. Optional
//! collaborator shims (economy, permissions, NPC directory) hang off the
//! adapter as capability accessors; a missing shim degrades the variants
//! that need it rather than crashing the engine.

use crate::quest::types::Location;

/// Read accessors and gameplay actions supplied by the host game server.
/// All calls happen on the host's single logical game thread.
pub trait GameServer: Send + Sync {
    /// Whether the player currently has a live session.
    fn is_online(&self, player: &str) -> bool;

    /// Current position, if the player is online.
    fn location(&self, player: &str) -> Option<Location>;

    /// Current health, if the player is online.
    fn health(&self, player: &str) -> Option<f64>;

    /// Experience level, if the player is online.
    fn level(&self, player: &str) -> Option<i64>;

    /// Number of empty inventory slots, if the player is online.
    fn empty_slots(&self, player: &str) -> Option<i64>;

    /// How many of `item` the player carries.
    fn item_count(&self, player: &str, item: &str) -> i64;

    /// Display a line of text to the player.
    fn send_message(&self, player: &str, message: &str);

    /// Put items into the player's inventory.
    fn give_item(&self, player: &str, item: &str, amount: i64);

    /// Remove up to `amount` of `item`; returns how many were actually taken.
    fn take_item(&self, player: &str, item: &str, amount: i64) -> i64;

    /// Move the player to a location.
    fn teleport(&self, player: &str, location: &Location);

    /// Run a server console command. Works without a player context.
    fn dispatch_command(&self, command: &str);

    /// Economy shim, when an economy plugin is present.
    fn economy(&self) -> Option<&dyn Economy> {
        None
    }

    /// Permission shim, when a permission plugin is present.
    fn permissions(&self) -> Option<&dyn Permissions> {
        None
    }

    /// NPC directory shim, when an NPC plugin is present.
    fn npcs(&self) -> Option<&dyn NpcDirectory> {
        None
    }
}

/// Capability interface for economy plugins.
pub trait Economy: Send + Sync {
    fn balance(&self, player: &str) -> f64;
    fn deposit(&self, player: &str, amount: f64);
    fn withdraw(&self, player: &str, amount: f64);

    fn has_funds(&self, player: &str, amount: f64) -> bool {
        self.balance(player) >= amount
    }
}

/// Capability interface for permission plugins.
pub trait Permissions: Send + Sync {
    fn has_permission(&self, player: &str, node: &str) -> bool;
    fn set_permission(&self, player: &str, node: &str, value: bool);
}

/// Capability interface for NPC plugins: maps an NPC id to the conversation
/// it should start.
pub trait NpcDirectory: Send + Sync {
    fn conversation_for_npc(&self, npc_id: &str) -> Option<String>;
}

/// A stdout-backed adapter for the CLI. Every player is "online", world
/// accessors return fixed neutral values, and actions print what they would
/// have done. Good enough to walk conversations from a terminal.
pub struct ConsoleServer;

impl GameServer for ConsoleServer {
    fn is_online(&self, _player: &str) -> bool {
        true
    }

    fn location(&self, _player: &str) -> Option<Location> {
        Some(Location {
            x: 0.0,
            y: 64.0,
            z: 0.0,
            world: "world".to_string(),
        })
    }

    fn health(&self, _player: &str) -> Option<f64> {
        Some(20.0)
    }

    fn level(&self, _player: &str) -> Option<i64> {
        Some(0)
    }

    fn empty_slots(&self, _player: &str) -> Option<i64> {
        Some(36)
    }

    fn item_count(&self, _player: &str, _item: &str) -> i64 {
        0
    }

    fn send_message(&self, player: &str, message: &str) {
        println!("[{}] {}", player, message);
    }

    fn give_item(&self, player: &str, item: &str, amount: i64) {
        println!("[{}] received {} x{}", player, item, amount);
    }

    fn take_item(&self, player: &str, item: &str, amount: i64) -> i64 {
        println!("[{}] lost {} x{}", player, item, amount);
        amount
    }

    fn teleport(&self, player: &str, location: &Location) {
        println!("[{}] teleported to {}", player, location.serialize());
    }

    fn dispatch_command(&self, command: &str) {
        println!("[server] /{}", command);
    }
}
