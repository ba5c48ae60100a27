//! Built-in condition types.
//!
//! A condition is a stateless predicate over (player, parsed-args).
//! Composite conditions (`and`/`or`) recurse through the engine façade
//! rather than calling each other's `check` directly, so negation and
//! cross-package references compose uniformly.

use std::sync::Arc;

use log::warn;
use rand::Rng;

use crate::quest::engine::QuestEngine;
use crate::quest::errors::QuestError;
use crate::quest::instruction::{qualify, qualify_all, Instruction};
use crate::quest::registry::TypeRegistry;
use crate::quest::types::Location;

/// A predicate evaluated for one player. Implementations hold only the
/// fields extracted at parse time, never the raw instruction.
pub trait Condition: Send + Sync {
    fn check(&self, engine: &QuestEngine, player: &str) -> bool;
}

impl std::fmt::Debug for dyn Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Condition")
    }
}

pub(crate) fn register_builtins(registry: &mut TypeRegistry) {
    registry.register_condition("health", Box::new(HealthCondition::parse));
    registry.register_condition("experience", Box::new(ExperienceCondition::parse));
    registry.register_condition("height", Box::new(HeightCondition::parse));
    registry.register_condition("tag", Box::new(TagCondition::parse));
    registry.register_condition("point", Box::new(PointCondition::parse));
    registry.register_condition("journal", Box::new(JournalCondition::parse));
    registry.register_condition("item", Box::new(ItemCondition::parse));
    registry.register_condition("empty", Box::new(EmptySlotsCondition::parse));
    registry.register_condition("location", Box::new(LocationCondition::parse));
    registry.register_condition("random", Box::new(RandomCondition::parse));
    registry.register_condition("and", Box::new(ConjunctionCondition::parse));
    registry.register_condition("or", Box::new(AlternativeCondition::parse));
    registry.register_condition("money", Box::new(MoneyCondition::parse));
    registry.register_condition("permission", Box::new(PermissionCondition::parse));
}

/// `health <amount>` — player health is at least `amount`.
struct HealthCondition {
    amount: f64,
}

impl HealthCondition {
    fn parse(_pack: &str, instruction: &str) -> Result<Arc<dyn Condition>, QuestError> {
        let ins = Instruction::new(instruction);
        let raw = ins.positional(0, "health amount")?;
        Ok(Arc::new(Self {
            amount: Instruction::float("health amount", raw)?,
        }))
    }
}

impl Condition for HealthCondition {
    fn check(&self, engine: &QuestEngine, player: &str) -> bool {
        engine
            .server()
            .health(player)
            .is_some_and(|h| h >= self.amount)
    }
}

/// `experience <level>` — player is at least the given level.
struct ExperienceCondition {
    level: i64,
}

impl ExperienceCondition {
    fn parse(_pack: &str, instruction: &str) -> Result<Arc<dyn Condition>, QuestError> {
        let ins = Instruction::new(instruction);
        let raw = ins.positional(0, "experience level")?;
        Ok(Arc::new(Self {
            level: Instruction::int("experience level", raw)?,
        }))
    }
}

impl Condition for ExperienceCondition {
    fn check(&self, engine: &QuestEngine, player: &str) -> bool {
        engine
            .server()
            .level(player)
            .is_some_and(|l| l >= self.level)
    }
}

/// `height <y>` — player stands at or below the given Y coordinate.
struct HeightCondition {
    height: f64,
}

impl HeightCondition {
    fn parse(_pack: &str, instruction: &str) -> Result<Arc<dyn Condition>, QuestError> {
        let ins = Instruction::new(instruction);
        let raw = ins.positional(0, "height")?;
        Ok(Arc::new(Self {
            height: Instruction::float("height", raw)?,
        }))
    }
}

impl Condition for HeightCondition {
    fn check(&self, engine: &QuestEngine, player: &str) -> bool {
        engine
            .server()
            .location(player)
            .is_some_and(|loc| loc.y <= self.height)
    }
}

/// `tag <name>` — player carries the tag.
struct TagCondition {
    tag: String,
}

impl TagCondition {
    fn parse(_pack: &str, instruction: &str) -> Result<Arc<dyn Condition>, QuestError> {
        let ins = Instruction::new(instruction);
        Ok(Arc::new(Self {
            tag: ins.positional(0, "tag name")?.to_string(),
        }))
    }
}

impl Condition for TagCondition {
    fn check(&self, engine: &QuestEngine, player: &str) -> bool {
        engine
            .player_record(player)
            .is_some_and(|r| r.has_tag(&self.tag))
    }
}

/// `point <category> <count>` — player holds at least `count` points.
struct PointCondition {
    category: String,
    count: i64,
}

impl PointCondition {
    fn parse(_pack: &str, instruction: &str) -> Result<Arc<dyn Condition>, QuestError> {
        let ins = Instruction::new(instruction);
        let category = ins.positional(0, "point category")?.to_string();
        let raw = ins.positional(1, "point count")?;
        Ok(Arc::new(Self {
            category,
            count: Instruction::int("point count", raw)?,
        }))
    }
}

impl Condition for PointCondition {
    fn check(&self, engine: &QuestEngine, player: &str) -> bool {
        engine
            .player_record(player)
            .is_some_and(|r| r.points(&self.category) >= self.count)
    }
}

/// `journal <entry>` — player has unlocked the journal entry. The entry id
/// is resolved against the owning package.
struct JournalCondition {
    entry: String,
}

impl JournalCondition {
    fn parse(pack: &str, instruction: &str) -> Result<Arc<dyn Condition>, QuestError> {
        let ins = Instruction::new(instruction);
        let entry = ins.positional(0, "journal entry")?;
        Ok(Arc::new(Self {
            entry: qualify(pack, entry),
        }))
    }
}

impl Condition for JournalCondition {
    fn check(&self, engine: &QuestEngine, player: &str) -> bool {
        engine
            .player_record(player)
            .is_some_and(|r| r.has_journal_entry(&self.entry))
    }
}

/// `item <name>:<amount>` — player carries at least `amount` of the item.
struct ItemCondition {
    item: String,
    amount: i64,
}

impl ItemCondition {
    fn parse(_pack: &str, instruction: &str) -> Result<Arc<dyn Condition>, QuestError> {
        let ins = Instruction::new(instruction);
        let raw = ins.positional(0, "item")?;
        let (item, amount) = Instruction::name_count("item", raw)?;
        Ok(Arc::new(Self { item, amount }))
    }
}

impl Condition for ItemCondition {
    fn check(&self, engine: &QuestEngine, player: &str) -> bool {
        engine.server().item_count(player, &self.item) >= self.amount
    }
}

/// `empty <count>` — player has at least `count` empty inventory slots.
struct EmptySlotsCondition {
    needed: i64,
}

impl EmptySlotsCondition {
    fn parse(_pack: &str, instruction: &str) -> Result<Arc<dyn Condition>, QuestError> {
        let ins = Instruction::new(instruction);
        let raw = ins.positional(0, "empty slot count")?;
        Ok(Arc::new(Self {
            needed: Instruction::int("empty slot count", raw)?,
        }))
    }
}

impl Condition for EmptySlotsCondition {
    fn check(&self, engine: &QuestEngine, player: &str) -> bool {
        engine
            .server()
            .empty_slots(player)
            .is_some_and(|n| n >= self.needed)
    }
}

/// `location <x;y;z;world> <radius>` — player is within the radius.
struct LocationCondition {
    location: Location,
    radius: f64,
}

impl LocationCondition {
    fn parse(_pack: &str, instruction: &str) -> Result<Arc<dyn Condition>, QuestError> {
        let ins = Instruction::new(instruction);
        let location = Location::parse("location", ins.positional(0, "location")?)?;
        let raw = ins.positional(1, "radius")?;
        Ok(Arc::new(Self {
            location,
            radius: Instruction::float("radius", raw)?,
        }))
    }
}

impl Condition for LocationCondition {
    fn check(&self, engine: &QuestEngine, player: &str) -> bool {
        engine
            .server()
            .location(player)
            .is_some_and(|loc| self.location.within(&loc, self.radius))
    }
}

/// `random <chance>-<range>` — true with probability chance/range.
struct RandomCondition {
    chance: i64,
    range: i64,
}

impl RandomCondition {
    fn parse(_pack: &str, instruction: &str) -> Result<Arc<dyn Condition>, QuestError> {
        let ins = Instruction::new(instruction);
        let raw = ins.positional(0, "random chance")?;
        let Some((chance, range)) = raw.split_once('-') else {
            return Err(QuestError::field("random chance", raw));
        };
        let chance = Instruction::int("random chance", chance)?;
        let range = Instruction::int("random range", range)?;
        if range < 1 || chance < 0 {
            return Err(QuestError::field("random chance", raw));
        }
        Ok(Arc::new(Self { chance, range }))
    }
}

impl Condition for RandomCondition {
    fn check(&self, _engine: &QuestEngine, _player: &str) -> bool {
        rand::thread_rng().gen_range(1..=self.range) <= self.chance
    }
}

/// `and <cond,cond,...>` — every referenced condition holds. Evaluation goes
/// through the façade and short-circuits on the first false.
struct ConjunctionCondition {
    refs: Vec<String>,
}

impl ConjunctionCondition {
    fn parse(pack: &str, instruction: &str) -> Result<Arc<dyn Condition>, QuestError> {
        let ins = Instruction::new(instruction);
        let list = ins.positional(0, "condition list")?;
        let refs: Vec<String> = list.split(',').map(str::to_string).collect();
        if refs.iter().any(|r| r.is_empty()) {
            return Err(QuestError::field("condition list", list));
        }
        Ok(Arc::new(Self {
            refs: qualify_all(pack, &refs),
        }))
    }
}

impl Condition for ConjunctionCondition {
    fn check(&self, engine: &QuestEngine, player: &str) -> bool {
        self.refs.iter().all(|r| engine.condition(player, r))
    }
}

/// `or <cond,cond,...>` — at least one referenced condition holds.
/// Short-circuits on the first true.
struct AlternativeCondition {
    refs: Vec<String>,
}

impl AlternativeCondition {
    fn parse(pack: &str, instruction: &str) -> Result<Arc<dyn Condition>, QuestError> {
        let ins = Instruction::new(instruction);
        let list = ins.positional(0, "condition list")?;
        let refs: Vec<String> = list.split(',').map(str::to_string).collect();
        if refs.iter().any(|r| r.is_empty()) {
            return Err(QuestError::field("condition list", list));
        }
        Ok(Arc::new(Self {
            refs: qualify_all(pack, &refs),
        }))
    }
}

impl Condition for AlternativeCondition {
    fn check(&self, engine: &QuestEngine, player: &str) -> bool {
        self.refs.iter().any(|r| engine.condition(player, r))
    }
}

/// `money <amount>` — player has the funds, per the economy shim. Without
/// an economy plugin this condition degrades to false.
struct MoneyCondition {
    amount: f64,
}

impl MoneyCondition {
    fn parse(_pack: &str, instruction: &str) -> Result<Arc<dyn Condition>, QuestError> {
        let ins = Instruction::new(instruction);
        let raw = ins.positional(0, "money amount")?;
        let amount = Instruction::float("money amount", raw)?.max(0.0);
        Ok(Arc::new(Self { amount }))
    }
}

impl Condition for MoneyCondition {
    fn check(&self, engine: &QuestEngine, player: &str) -> bool {
        match engine.server().economy() {
            Some(economy) => economy.has_funds(player, self.amount),
            None => {
                warn!("money condition checked but no economy plugin is hooked up");
                false
            }
        }
    }
}

/// `permission <node>` — player holds the permission node, per the shim.
struct PermissionCondition {
    node: String,
}

impl PermissionCondition {
    fn parse(_pack: &str, instruction: &str) -> Result<Arc<dyn Condition>, QuestError> {
        let ins = Instruction::new(instruction);
        Ok(Arc::new(Self {
            node: ins.positional(0, "permission node")?.to_string(),
        }))
    }
}

impl Condition for PermissionCondition {
    fn check(&self, engine: &QuestEngine, player: &str) -> bool {
        match engine.server().permissions() {
            Some(perms) => perms.has_permission(player, &self.node),
            None => {
                warn!("permission condition checked but no permission plugin is hooked up");
                false
            }
        }
    }
}
