//! Built-in event types.
//!
//! Every event parses its arguments at package-load time and carries an
//! [`EventSpec`] with the shared firing metadata: the `event_conditions:`
//! list (auto-qualified against the owning package) and the static /
//! persistent markers. The firing pipeline itself lives on the engine
//! façade; `run` bodies only perform the action.

use std::sync::Arc;

use log::warn;

use crate::quest::engine::QuestEngine;
use crate::quest::errors::QuestError;
use crate::quest::instruction::{qualify, qualify_all, Instruction};
use crate::quest::registry::TypeRegistry;
use crate::quest::types::Location;

/// Shared firing metadata parsed from every event instruction.
pub struct EventSpec {
    pub pack: String,
    /// Conditions that must all hold when firing. Qualified ids.
    pub conditions: Vec<String>,
    /// Static events may run with no player context.
    pub staticness: bool,
    /// Persistent events may run for an offline player.
    pub persistent: bool,
}

impl EventSpec {
    fn parse(pack: &str, ins: &Instruction) -> Self {
        Self {
            pack: pack.to_string(),
            conditions: qualify_all(pack, &ins.keyed_list("event_conditions")),
            staticness: false,
            persistent: false,
        }
    }

    fn persistent(pack: &str, ins: &Instruction) -> Self {
        Self {
            persistent: true,
            ..Self::parse(pack, ins)
        }
    }
}

/// An action fired for a player (or for nobody, when static).
pub trait QuestEvent: Send + Sync {
    fn spec(&self) -> &EventSpec;

    /// The action body. Gating (static/persistent/conditions) has already
    /// happened by the time this runs.
    fn run(&self, engine: &mut QuestEngine, player: Option<&str>) -> Result<(), QuestError>;
}

fn require_player<'a>(player: Option<&'a str>) -> Result<&'a str, QuestError> {
    player.ok_or_else(|| QuestError::StateViolation("event requires a player".to_string()))
}

pub(crate) fn register_builtins(registry: &mut TypeRegistry) {
    registry.register_event("message", Box::new(MessageEvent::parse));
    registry.register_event("objective", Box::new(ObjectiveEvent::parse));
    registry.register_event("delete", Box::new(DeleteObjectiveEvent::parse));
    registry.register_event("tag", Box::new(TagEvent::parse));
    registry.register_event("point", Box::new(PointEvent::parse));
    registry.register_event("journal", Box::new(JournalEvent::parse));
    registry.register_event("give", Box::new(GiveEvent::parse));
    registry.register_event("take", Box::new(TakeEvent::parse));
    registry.register_event("teleport", Box::new(TeleportEvent::parse));
    registry.register_event("command", Box::new(CommandEvent::parse));
    registry.register_event("conversation", Box::new(ConversationEvent::parse));
    registry.register_event("folder", Box::new(FolderEvent::parse));
    registry.register_event("permission", Box::new(PermissionEvent::parse));
}

/// Joins the tokens after the keyword, dropping `event_conditions:` so the
/// metadata token never leaks into display text.
fn tail_text(ins: &Instruction) -> String {
    ins.raw()
        .split_whitespace()
        .skip(1)
        .filter(|t| !t.starts_with("event_conditions:"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `message <text...>` — show a line of text to the player.
struct MessageEvent {
    spec: EventSpec,
    text: String,
}

impl MessageEvent {
    fn parse(pack: &str, instruction: &str) -> Result<Arc<dyn QuestEvent>, QuestError> {
        let ins = Instruction::new(instruction);
        let text = tail_text(&ins);
        if text.is_empty() {
            return Err(QuestError::missing("message text"));
        }
        Ok(Arc::new(Self {
            spec: EventSpec::parse(pack, &ins),
            text,
        }))
    }
}

impl QuestEvent for MessageEvent {
    fn spec(&self) -> &EventSpec {
        &self.spec
    }

    fn run(&self, engine: &mut QuestEngine, player: Option<&str>) -> Result<(), QuestError> {
        let player = require_player(player)?;
        engine.server().send_message(player, &self.text);
        Ok(())
    }
}

/// `objective <objective instruction...>` — start a new objective for the
/// player. The remainder of the instruction is itself an objective
/// instruction, parsed lazily when the event fires.
struct ObjectiveEvent {
    spec: EventSpec,
    objective: String,
}

impl ObjectiveEvent {
    fn parse(pack: &str, instruction: &str) -> Result<Arc<dyn QuestEvent>, QuestError> {
        let ins = Instruction::new(instruction);
        let objective = tail_text(&ins);
        if objective.is_empty() {
            return Err(QuestError::missing("objective instruction"));
        }
        Ok(Arc::new(Self {
            spec: EventSpec::parse(pack, &ins),
            objective,
        }))
    }
}

impl QuestEvent for ObjectiveEvent {
    fn spec(&self) -> &EventSpec {
        &self.spec
    }

    fn run(&self, engine: &mut QuestEngine, player: Option<&str>) -> Result<(), QuestError> {
        let player = require_player(player)?;
        engine.start_objective(player, &self.spec.pack, &self.objective);
        Ok(())
    }
}

/// `delete <label>` — remove the player's active objective with that label.
/// Persistent: applies to the stored record of an offline player.
struct DeleteObjectiveEvent {
    spec: EventSpec,
    label: String,
}

impl DeleteObjectiveEvent {
    fn parse(pack: &str, instruction: &str) -> Result<Arc<dyn QuestEvent>, QuestError> {
        let ins = Instruction::new(instruction);
        let label = ins.positional(0, "objective label")?.to_string();
        Ok(Arc::new(Self {
            spec: EventSpec::persistent(pack, &ins),
            label,
        }))
    }
}

impl QuestEvent for DeleteObjectiveEvent {
    fn spec(&self) -> &EventSpec {
        &self.spec
    }

    fn run(&self, engine: &mut QuestEngine, player: Option<&str>) -> Result<(), QuestError> {
        let player = require_player(player)?;
        engine.delete_objective(player, &self.label)
    }
}

enum TagAction {
    Add,
    Del,
}

/// `tag add|del <tag,tag,...>` — mutate the player's tag set. Persistent.
struct TagEvent {
    spec: EventSpec,
    action: TagAction,
    tags: Vec<String>,
}

impl TagEvent {
    fn parse(pack: &str, instruction: &str) -> Result<Arc<dyn QuestEvent>, QuestError> {
        let ins = Instruction::new(instruction);
        let action = match ins.positional(0, "tag action")? {
            "add" => TagAction::Add,
            "del" => TagAction::Del,
            other => return Err(QuestError::field("tag action", other)),
        };
        let tags: Vec<String> = ins
            .positional(1, "tag list")?
            .split(',')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        if tags.is_empty() {
            return Err(QuestError::missing("tag list"));
        }
        Ok(Arc::new(Self {
            spec: EventSpec::persistent(pack, &ins),
            action,
            tags,
        }))
    }
}

impl QuestEvent for TagEvent {
    fn spec(&self) -> &EventSpec {
        &self.spec
    }

    fn run(&self, engine: &mut QuestEngine, player: Option<&str>) -> Result<(), QuestError> {
        let player = require_player(player)?;
        let (action, tags) = (&self.action, &self.tags);
        engine.with_record(player, |record| {
            for tag in tags {
                match action {
                    TagAction::Add => record.add_tag(tag),
                    TagAction::Del => record.remove_tag(tag),
                }
            }
        })
    }
}

/// `point <category> <count>` — adjust a point category (count may be
/// negative). Persistent.
struct PointEvent {
    spec: EventSpec,
    category: String,
    count: i64,
}

impl PointEvent {
    fn parse(pack: &str, instruction: &str) -> Result<Arc<dyn QuestEvent>, QuestError> {
        let ins = Instruction::new(instruction);
        let category = ins.positional(0, "point category")?.to_string();
        let raw = ins.positional(1, "point count")?;
        Ok(Arc::new(Self {
            spec: EventSpec::persistent(pack, &ins),
            category,
            count: Instruction::int("point count", raw)?,
        }))
    }
}

impl QuestEvent for PointEvent {
    fn spec(&self) -> &EventSpec {
        &self.spec
    }

    fn run(&self, engine: &mut QuestEngine, player: Option<&str>) -> Result<(), QuestError> {
        let player = require_player(player)?;
        let (category, count) = (&self.category, self.count);
        engine.with_record(player, |record| record.add_points(category, count))
    }
}

/// `journal add|del <entry>` — mutate the player's journal. The entry id is
/// resolved against the owning package. Persistent.
struct JournalEvent {
    spec: EventSpec,
    add: bool,
    entry: String,
}

impl JournalEvent {
    fn parse(pack: &str, instruction: &str) -> Result<Arc<dyn QuestEvent>, QuestError> {
        let ins = Instruction::new(instruction);
        let add = match ins.positional(0, "journal action")? {
            "add" => true,
            "del" => false,
            other => return Err(QuestError::field("journal action", other)),
        };
        let entry = qualify(pack, ins.positional(1, "journal entry")?);
        Ok(Arc::new(Self {
            spec: EventSpec::persistent(pack, &ins),
            add,
            entry,
        }))
    }
}

impl QuestEvent for JournalEvent {
    fn spec(&self) -> &EventSpec {
        &self.spec
    }

    fn run(&self, engine: &mut QuestEngine, player: Option<&str>) -> Result<(), QuestError> {
        let player = require_player(player)?;
        let (add, entry) = (self.add, &self.entry);
        engine.with_record(player, |record| {
            if add {
                record.add_journal_entry(entry);
            } else {
                record.remove_journal_entry(entry);
            }
        })
    }
}

/// `give <item>:<amount>` — put items into the player's inventory.
struct GiveEvent {
    spec: EventSpec,
    item: String,
    amount: i64,
}

impl GiveEvent {
    fn parse(pack: &str, instruction: &str) -> Result<Arc<dyn QuestEvent>, QuestError> {
        let ins = Instruction::new(instruction);
        let raw = ins.positional(0, "item")?;
        let (item, amount) = Instruction::name_count("item", raw)?;
        if amount < 1 {
            return Err(QuestError::field("item amount", raw));
        }
        Ok(Arc::new(Self {
            spec: EventSpec::parse(pack, &ins),
            item,
            amount,
        }))
    }
}

impl QuestEvent for GiveEvent {
    fn spec(&self) -> &EventSpec {
        &self.spec
    }

    fn run(&self, engine: &mut QuestEngine, player: Option<&str>) -> Result<(), QuestError> {
        let player = require_player(player)?;
        engine.server().give_item(player, &self.item, self.amount);
        Ok(())
    }
}

/// `take <item>:<amount>` — remove items from the player's inventory.
struct TakeEvent {
    spec: EventSpec,
    item: String,
    amount: i64,
}

impl TakeEvent {
    fn parse(pack: &str, instruction: &str) -> Result<Arc<dyn QuestEvent>, QuestError> {
        let ins = Instruction::new(instruction);
        let raw = ins.positional(0, "item")?;
        let (item, amount) = Instruction::name_count("item", raw)?;
        if amount < 1 {
            return Err(QuestError::field("item amount", raw));
        }
        Ok(Arc::new(Self {
            spec: EventSpec::parse(pack, &ins),
            item,
            amount,
        }))
    }
}

impl QuestEvent for TakeEvent {
    fn spec(&self) -> &EventSpec {
        &self.spec
    }

    fn run(&self, engine: &mut QuestEngine, player: Option<&str>) -> Result<(), QuestError> {
        let player = require_player(player)?;
        engine.server().take_item(player, &self.item, self.amount);
        Ok(())
    }
}

/// `teleport <x;y;z;world>` — move the player.
struct TeleportEvent {
    spec: EventSpec,
    location: Location,
}

impl TeleportEvent {
    fn parse(pack: &str, instruction: &str) -> Result<Arc<dyn QuestEvent>, QuestError> {
        let ins = Instruction::new(instruction);
        let location = Location::parse("location", ins.positional(0, "location")?)?;
        Ok(Arc::new(Self {
            spec: EventSpec::parse(pack, &ins),
            location,
        }))
    }
}

impl QuestEvent for TeleportEvent {
    fn spec(&self) -> &EventSpec {
        &self.spec
    }

    fn run(&self, engine: &mut QuestEngine, player: Option<&str>) -> Result<(), QuestError> {
        let player = require_player(player)?;
        engine.server().teleport(player, &self.location);
        Ok(())
    }
}

/// `command <command...>` — run a server console command. Static: may fire
/// with no player; `%player%` is substituted when one is present.
struct CommandEvent {
    spec: EventSpec,
    command: String,
}

impl CommandEvent {
    fn parse(pack: &str, instruction: &str) -> Result<Arc<dyn QuestEvent>, QuestError> {
        let ins = Instruction::new(instruction);
        let command = tail_text(&ins);
        if command.is_empty() {
            return Err(QuestError::missing("command"));
        }
        let spec = EventSpec {
            staticness: true,
            ..EventSpec::parse(pack, &ins)
        };
        Ok(Arc::new(Self { spec, command }))
    }
}

impl QuestEvent for CommandEvent {
    fn spec(&self) -> &EventSpec {
        &self.spec
    }

    fn run(&self, engine: &mut QuestEngine, player: Option<&str>) -> Result<(), QuestError> {
        let command = match player {
            Some(p) => self.command.replace("%player%", p),
            None => self.command.clone(),
        };
        engine.server().dispatch_command(&command);
        Ok(())
    }
}

/// `conversation <id>` — start a conversation with the player.
struct ConversationEvent {
    spec: EventSpec,
    conversation: String,
}

impl ConversationEvent {
    fn parse(pack: &str, instruction: &str) -> Result<Arc<dyn QuestEvent>, QuestError> {
        let ins = Instruction::new(instruction);
        let conversation = qualify(pack, ins.positional(0, "conversation id")?);
        Ok(Arc::new(Self {
            spec: EventSpec::parse(pack, &ins),
            conversation,
        }))
    }
}

impl QuestEvent for ConversationEvent {
    fn spec(&self) -> &EventSpec {
        &self.spec
    }

    fn run(&self, engine: &mut QuestEngine, player: Option<&str>) -> Result<(), QuestError> {
        let player = require_player(player)?;
        engine.start_conversation(player, &self.conversation)?;
        Ok(())
    }
}

/// `folder <event,event,...>` — fire a list of events in order. Each inner
/// firing goes through the full pipeline, so gating and conditions apply
/// per event; one event completes fully before the next starts.
struct FolderEvent {
    spec: EventSpec,
    events: Vec<String>,
}

impl FolderEvent {
    fn parse(pack: &str, instruction: &str) -> Result<Arc<dyn QuestEvent>, QuestError> {
        let ins = Instruction::new(instruction);
        let list = ins.positional(0, "event list")?;
        let events: Vec<String> = list.split(',').map(str::to_string).collect();
        if events.iter().any(|e| e.is_empty()) {
            return Err(QuestError::field("event list", list));
        }
        let spec = EventSpec {
            staticness: true,
            persistent: true,
            ..EventSpec::parse(pack, &ins)
        };
        Ok(Arc::new(Self {
            spec,
            events: qualify_all(pack, &events),
        }))
    }
}

impl QuestEvent for FolderEvent {
    fn spec(&self) -> &EventSpec {
        &self.spec
    }

    fn run(&self, engine: &mut QuestEngine, player: Option<&str>) -> Result<(), QuestError> {
        for event in &self.events {
            engine.fire(player, event);
        }
        Ok(())
    }
}

/// `permission add|del <node>` — mutate a permission node through the shim.
/// Without a permission plugin this event degrades to a logged no-op.
struct PermissionEvent {
    spec: EventSpec,
    add: bool,
    node: String,
}

impl PermissionEvent {
    fn parse(pack: &str, instruction: &str) -> Result<Arc<dyn QuestEvent>, QuestError> {
        let ins = Instruction::new(instruction);
        let add = match ins.positional(0, "permission action")? {
            "add" => true,
            "del" => false,
            other => return Err(QuestError::field("permission action", other)),
        };
        let node = ins.positional(1, "permission node")?.to_string();
        Ok(Arc::new(Self {
            spec: EventSpec::parse(pack, &ins),
            add,
            node,
        }))
    }
}

impl QuestEvent for PermissionEvent {
    fn spec(&self) -> &EventSpec {
        &self.spec
    }

    fn run(&self, engine: &mut QuestEngine, player: Option<&str>) -> Result<(), QuestError> {
        let player = require_player(player)?;
        match engine.server().permissions() {
            Some(perms) => perms.set_permission(player, &self.node, self.add),
            None => warn!("permission event fired but no permission plugin is hooked up"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::with_builtins()
    }

    #[test]
    fn event_conditions_are_qualified() {
        let r = registry();
        let event = r
            .create_event("default", "give item1:5 event_conditions:rich,other.lucky")
            .unwrap();
        assert_eq!(
            event.spec().conditions,
            vec!["default.rich".to_string(), "other.lucky".to_string()]
        );
    }

    #[test]
    fn persistent_and_static_markers() {
        let r = registry();
        assert!(r.create_event("p", "point reputation 5").unwrap().spec().persistent);
        assert!(r.create_event("p", "tag add started").unwrap().spec().persistent);
        assert!(r.create_event("p", "command say hi").unwrap().spec().staticness);
        assert!(!r.create_event("p", "message hi").unwrap().spec().staticness);
    }

    #[test]
    fn malformed_events_fail_to_parse() {
        let r = registry();
        assert!(r.create_event("p", "point reputation many").is_err());
        assert!(r.create_event("p", "tag flip started").is_err());
        assert!(r.create_event("p", "give :5").is_err());
        assert!(r.create_event("p", "give item1:0").is_err());
        assert!(r.create_event("p", "teleport 1;2;world").is_err());
        assert!(r.create_event("p", "folder a,,b").is_err());
        assert!(r.create_event("p", "message event_conditions:rich").is_err());
    }

    #[test]
    fn message_text_excludes_condition_token() {
        let r = registry();
        // The metadata token may appear anywhere; it never shows in the text.
        let event = r
            .create_event("p", "message Hello there event_conditions:rich")
            .unwrap();
        assert_eq!(event.spec().conditions, vec!["p.rich".to_string()]);
    }
}
