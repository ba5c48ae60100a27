//! Built-in objective types.
//!
//! An objective is a long-lived, per-player progress tracker identified by a
//! player-scoped `label:`. It observes game happenings, advances internal
//! counters, and reports completion; the engine then fires its `events:`
//! list and drops it. `instruction()` re-encodes live progress back into an
//! instruction string so an objective survives logout/login.

use chrono::{DateTime, TimeZone, Utc};

use crate::quest::errors::QuestError;
use crate::quest::instruction::{qualify_all, Instruction};
use crate::quest::registry::TypeRegistry;
use crate::quest::types::Location;

/// Something that happened in the game world, delivered to a player's
/// active objectives by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Happening {
    MobKilled { mob: String },
    BlockPlaced { block: String },
    BlockBroken { block: String },
    Crafted { item: String, amount: i64 },
    Died,
    Moved { location: Location },
    LevelChanged { level: i64 },
    Tick { now: DateTime<Utc> },
}

/// Result of delivering a happening to an objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The happening was irrelevant to this objective.
    Ignored,
    /// Internal progress advanced but the objective is not done.
    Advanced,
    /// The completion predicate is now satisfied.
    Completed,
}

/// Shared metadata parsed from every objective instruction: the required
/// `label:`, the gating `conditions:` list and the completion `events:`
/// list (both auto-qualified).
#[derive(Debug, Clone)]
pub struct ObjectiveSpec {
    pub pack: String,
    pub label: String,
    pub conditions: Vec<String>,
    pub events: Vec<String>,
}

impl ObjectiveSpec {
    pub fn parse(pack: &str, ins: &Instruction) -> Result<Self, QuestError> {
        let label = ins.keyed_required("label")?.to_string();
        Ok(Self {
            pack: pack.to_string(),
            label,
            conditions: qualify_all(pack, &ins.keyed_list("conditions")),
            events: qualify_all(pack, &ins.keyed_list("events")),
        })
    }

    /// The shared args re-encoded for persistence. References were qualified
    /// at parse time, so the output is package-independent.
    fn suffix(&self) -> String {
        let mut out = String::new();
        if !self.conditions.is_empty() {
            out.push_str(&format!(" conditions:{}", self.conditions.join(",")));
        }
        if !self.events.is_empty() {
            out.push_str(&format!(" events:{}", self.events.join(",")));
        }
        out.push_str(&format!(" label:{}", self.label));
        out
    }
}

/// A long-lived progress tracker for one player.
pub trait Objective: Send {
    fn spec(&self) -> &ObjectiveSpec;

    /// Deliver a happening. Gating conditions have already been checked by
    /// the engine when this is called.
    fn observe(&mut self, happening: &Happening) -> Progress;

    /// Re-encode the objective (including live progress) as an instruction
    /// string suitable for persistence and re-parsing.
    fn instruction(&self) -> String;
}

pub(crate) fn register_builtins(registry: &mut TypeRegistry) {
    registry.register_objective("location", Box::new(LocationObjective::parse));
    registry.register_objective("mobkill", Box::new(MobKillObjective::parse));
    registry.register_objective("block", Box::new(BlockObjective::parse));
    registry.register_objective("craft", Box::new(CraftObjective::parse));
    registry.register_objective("die", Box::new(DieObjective::parse));
    registry.register_objective("experience", Box::new(ExperienceObjective::parse));
    registry.register_objective("delay", Box::new(DelayObjective::parse));
}

/// `location <x;y;z;world> <radius> label:<l>` — reach a place.
struct LocationObjective {
    spec: ObjectiveSpec,
    location: Location,
    radius: f64,
}

impl LocationObjective {
    fn parse(pack: &str, instruction: &str) -> Result<Box<dyn Objective>, QuestError> {
        let ins = Instruction::new(instruction);
        let location = Location::parse("location", ins.positional(0, "location")?)?;
        let radius = Instruction::float("radius", ins.positional(1, "radius")?)?;
        Ok(Box::new(Self {
            spec: ObjectiveSpec::parse(pack, &ins)?,
            location,
            radius,
        }))
    }
}

impl Objective for LocationObjective {
    fn spec(&self) -> &ObjectiveSpec {
        &self.spec
    }

    fn observe(&mut self, happening: &Happening) -> Progress {
        match happening {
            Happening::Moved { location } if self.location.within(location, self.radius) => {
                Progress::Completed
            }
            _ => Progress::Ignored,
        }
    }

    fn instruction(&self) -> String {
        format!(
            "location {} {}{}",
            self.location.serialize(),
            self.radius,
            self.spec.suffix()
        )
    }
}

/// `mobkill <MOB>:<count> label:<l>` — kill a number of mobs of one kind.
struct MobKillObjective {
    spec: ObjectiveSpec,
    mob: String,
    remaining: i64,
}

impl MobKillObjective {
    fn parse(pack: &str, instruction: &str) -> Result<Box<dyn Objective>, QuestError> {
        let ins = Instruction::new(instruction);
        let raw = ins.positional(0, "mob")?;
        let (mob, remaining) = Instruction::name_count("mob", raw)?;
        if remaining < 1 {
            return Err(QuestError::field("mob count", raw));
        }
        Ok(Box::new(Self {
            spec: ObjectiveSpec::parse(pack, &ins)?,
            mob,
            remaining,
        }))
    }
}

impl Objective for MobKillObjective {
    fn spec(&self) -> &ObjectiveSpec {
        &self.spec
    }

    fn observe(&mut self, happening: &Happening) -> Progress {
        match happening {
            Happening::MobKilled { mob } if mob.eq_ignore_ascii_case(&self.mob) => {
                self.remaining -= 1;
                if self.remaining <= 0 {
                    Progress::Completed
                } else {
                    Progress::Advanced
                }
            }
            _ => Progress::Ignored,
        }
    }

    fn instruction(&self) -> String {
        format!("mobkill {}:{}{}", self.mob, self.remaining, self.spec.suffix())
    }
}

/// `block <BLOCK>:<count> label:<l>` — place (positive count) or break
/// (negative count) a number of blocks of one kind.
struct BlockObjective {
    spec: ObjectiveSpec,
    block: String,
    remaining: i64,
}

impl BlockObjective {
    fn parse(pack: &str, instruction: &str) -> Result<Box<dyn Objective>, QuestError> {
        let ins = Instruction::new(instruction);
        let raw = ins.positional(0, "block")?;
        let (block, remaining) = Instruction::name_count("block", raw)?;
        if remaining == 0 {
            return Err(QuestError::field("block count", raw));
        }
        Ok(Box::new(Self {
            spec: ObjectiveSpec::parse(pack, &ins)?,
            block,
            remaining,
        }))
    }

    fn matches(&self, block: &str) -> bool {
        block.eq_ignore_ascii_case(&self.block)
    }
}

impl Objective for BlockObjective {
    fn spec(&self) -> &ObjectiveSpec {
        &self.spec
    }

    fn observe(&mut self, happening: &Happening) -> Progress {
        match happening {
            Happening::BlockPlaced { block } if self.remaining > 0 && self.matches(block) => {
                self.remaining -= 1;
            }
            Happening::BlockBroken { block } if self.remaining < 0 && self.matches(block) => {
                self.remaining += 1;
            }
            _ => return Progress::Ignored,
        }
        if self.remaining == 0 {
            Progress::Completed
        } else {
            Progress::Advanced
        }
    }

    fn instruction(&self) -> String {
        format!("block {}:{}{}", self.block, self.remaining, self.spec.suffix())
    }
}

/// `craft <item>:<amount> label:<l>` — craft a number of items.
struct CraftObjective {
    spec: ObjectiveSpec,
    item: String,
    remaining: i64,
}

impl CraftObjective {
    fn parse(pack: &str, instruction: &str) -> Result<Box<dyn Objective>, QuestError> {
        let ins = Instruction::new(instruction);
        let raw = ins.positional(0, "item")?;
        let (item, remaining) = Instruction::name_count("item", raw)?;
        if remaining < 1 {
            return Err(QuestError::field("item amount", raw));
        }
        Ok(Box::new(Self {
            spec: ObjectiveSpec::parse(pack, &ins)?,
            item,
            remaining,
        }))
    }
}

impl Objective for CraftObjective {
    fn spec(&self) -> &ObjectiveSpec {
        &self.spec
    }

    fn observe(&mut self, happening: &Happening) -> Progress {
        match happening {
            Happening::Crafted { item, amount } if item.eq_ignore_ascii_case(&self.item) => {
                self.remaining -= amount;
                if self.remaining <= 0 {
                    Progress::Completed
                } else {
                    Progress::Advanced
                }
            }
            _ => Progress::Ignored,
        }
    }

    fn instruction(&self) -> String {
        format!("craft {}:{}{}", self.item, self.remaining, self.spec.suffix())
    }
}

/// `die label:<l>` — die once.
struct DieObjective {
    spec: ObjectiveSpec,
}

impl DieObjective {
    fn parse(pack: &str, instruction: &str) -> Result<Box<dyn Objective>, QuestError> {
        let ins = Instruction::new(instruction);
        Ok(Box::new(Self {
            spec: ObjectiveSpec::parse(pack, &ins)?,
        }))
    }
}

impl Objective for DieObjective {
    fn spec(&self) -> &ObjectiveSpec {
        &self.spec
    }

    fn observe(&mut self, happening: &Happening) -> Progress {
        match happening {
            Happening::Died => Progress::Completed,
            _ => Progress::Ignored,
        }
    }

    fn instruction(&self) -> String {
        format!("die{}", self.spec.suffix())
    }
}

/// `experience <level> label:<l>` — reach an experience level.
struct ExperienceObjective {
    spec: ObjectiveSpec,
    level: i64,
}

impl ExperienceObjective {
    fn parse(pack: &str, instruction: &str) -> Result<Box<dyn Objective>, QuestError> {
        let ins = Instruction::new(instruction);
        let raw = ins.positional(0, "experience level")?;
        Ok(Box::new(Self {
            spec: ObjectiveSpec::parse(pack, &ins)?,
            level: Instruction::int("experience level", raw)?,
        }))
    }
}

impl Objective for ExperienceObjective {
    fn spec(&self) -> &ObjectiveSpec {
        &self.spec
    }

    fn observe(&mut self, happening: &Happening) -> Progress {
        match happening {
            Happening::LevelChanged { level } if *level >= self.level => Progress::Completed,
            _ => Progress::Ignored,
        }
    }

    fn instruction(&self) -> String {
        format!("experience {}{}", self.level, self.spec.suffix())
    }
}

/// `delay <minutes> label:<l>` — wait for wall-clock time to pass. The
/// deadline is computed once and persisted as a `date:` argument, so the
/// clock keeps running while the player is offline.
struct DelayObjective {
    spec: ObjectiveSpec,
    minutes: i64,
    deadline: DateTime<Utc>,
}

impl DelayObjective {
    fn parse(pack: &str, instruction: &str) -> Result<Box<dyn Objective>, QuestError> {
        let ins = Instruction::new(instruction);
        let raw = ins.positional(0, "delay minutes")?;
        let minutes = Instruction::int("delay minutes", raw)?;
        if minutes < 1 {
            return Err(QuestError::field("delay minutes", raw));
        }
        let deadline = match ins.keyed("date") {
            Some(ts) => {
                let secs = Instruction::int("date", ts)?;
                Utc.timestamp_opt(secs, 0)
                    .single()
                    .ok_or_else(|| QuestError::field("date", ts))?
            }
            None => Utc::now() + chrono::Duration::minutes(minutes),
        };
        Ok(Box::new(Self {
            spec: ObjectiveSpec::parse(pack, &ins)?,
            minutes,
            deadline,
        }))
    }
}

impl Objective for DelayObjective {
    fn spec(&self) -> &ObjectiveSpec {
        &self.spec
    }

    fn observe(&mut self, happening: &Happening) -> Progress {
        match happening {
            Happening::Tick { now } if *now >= self.deadline => Progress::Completed,
            _ => Progress::Ignored,
        }
    }

    fn instruction(&self) -> String {
        format!(
            "delay {} date:{}{}",
            self.minutes,
            self.deadline.timestamp(),
            self.spec.suffix()
        )
    }
}
