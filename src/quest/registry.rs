//! Keyword → factory registry for condition, event and objective types.
//!
//! The original design looked classes up by reflection; here every type is a
//! factory closure producing a trait object. Factories receive the owning
//! package name and the *full* instruction string and must do nothing beyond
//! argument extraction: no game-state mutation during parse.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::quest::conditions::Condition;
use crate::quest::errors::QuestError;
use crate::quest::events::QuestEvent;
use crate::quest::instruction::Instruction;
use crate::quest::objectives::Objective;

pub type ConditionFactory =
    Box<dyn Fn(&str, &str) -> Result<Arc<dyn Condition>, QuestError> + Send + Sync>;
pub type EventFactory =
    Box<dyn Fn(&str, &str) -> Result<Arc<dyn QuestEvent>, QuestError> + Send + Sync>;
pub type ObjectiveFactory =
    Box<dyn Fn(&str, &str) -> Result<Box<dyn Objective>, QuestError> + Send + Sync>;

/// Registry of instruction type keywords. Registration is last-writer-wins
/// and there is no removal; collaborator shims add their own keywords at
/// boot, after the built-ins.
#[derive(Default)]
pub struct TypeRegistry {
    conditions: HashMap<String, ConditionFactory>,
    events: HashMap<String, EventFactory>,
    objectives: HashMap<String, ObjectiveFactory>,
}

impl TypeRegistry {
    /// An empty registry with no types at all. Mostly useful in tests.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in condition, event and objective type.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::quest::conditions::register_builtins(&mut registry);
        crate::quest::events::register_builtins(&mut registry);
        crate::quest::objectives::register_builtins(&mut registry);
        registry
    }

    pub fn register_condition(&mut self, keyword: &str, factory: ConditionFactory) {
        debug!("Registering {} condition type", keyword);
        self.conditions.insert(keyword.to_string(), factory);
    }

    pub fn register_event(&mut self, keyword: &str, factory: EventFactory) {
        debug!("Registering {} event type", keyword);
        self.events.insert(keyword.to_string(), factory);
    }

    pub fn register_objective(&mut self, keyword: &str, factory: ObjectiveFactory) {
        debug!("Registering {} objective type", keyword);
        self.objectives.insert(keyword.to_string(), factory);
    }

    fn keyword(instruction: &str) -> Result<String, QuestError> {
        let keyword = Instruction::new(instruction).keyword().to_string();
        if keyword.is_empty() {
            return Err(QuestError::Instruction("empty instruction".to_string()));
        }
        Ok(keyword)
    }

    pub fn create_condition(
        &self,
        pack: &str,
        instruction: &str,
    ) -> Result<Arc<dyn Condition>, QuestError> {
        let keyword = Self::keyword(instruction)?;
        let factory = self
            .conditions
            .get(&keyword)
            .ok_or(QuestError::UnknownType(keyword))?;
        factory(pack, instruction)
    }

    pub fn create_event(
        &self,
        pack: &str,
        instruction: &str,
    ) -> Result<Arc<dyn QuestEvent>, QuestError> {
        let keyword = Self::keyword(instruction)?;
        let factory = self
            .events
            .get(&keyword)
            .ok_or(QuestError::UnknownType(keyword))?;
        factory(pack, instruction)
    }

    pub fn create_objective(
        &self,
        pack: &str,
        instruction: &str,
    ) -> Result<Box<dyn Objective>, QuestError> {
        let keyword = Self::keyword(instruction)?;
        let factory = self
            .objectives
            .get(&keyword)
            .ok_or(QuestError::UnknownType(keyword))?;
        factory(pack, instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_is_reported() {
        let registry = TypeRegistry::new();
        match registry.create_condition("default", "nosuch 1 2") {
            Err(QuestError::UnknownType(kw)) => assert_eq!(kw, "nosuch"),
            other => panic!("expected UnknownType, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn empty_instruction_is_rejected() {
        let registry = TypeRegistry::with_builtins();
        assert!(matches!(
            registry.create_event("default", "   "),
            Err(QuestError::Instruction(_))
        ));
    }

    #[test]
    fn last_writer_wins() {
        let mut registry = TypeRegistry::with_builtins();
        // Re-registering an existing keyword replaces the old factory.
        registry.register_condition(
            "health",
            Box::new(|_, _| Err(QuestError::Instruction("shadowed".to_string()))),
        );
        assert!(matches!(
            registry.create_condition("default", "health 10"),
            Err(QuestError::Instruction(msg)) if msg == "shadowed"
        ));
    }
}
