//! Conversation definitions and per-player dialogue sessions.
//!
//! A conversation is a directed graph of NPC options and player options.
//! Definitions are authored as one JSON document per conversation inside a
//! package's `conversations/` directory; list-valued fields (`first`,
//! `conditions`, `events`, `pointers`) are comma-separated strings, matching
//! the instruction micro-format. Condition and event references are
//! qualified at load time; pointers stay local to the conversation.
//!
//! The walking logic (guard filtering, event firing, menu presentation)
//! lives in the engine, which has access to condition evaluation. This
//! module only holds the validated graph and the per-player cursor.

use std::collections::HashMap;

use serde::Deserialize;
use uuid::Uuid;

use crate::quest::errors::QuestError;
use crate::quest::instruction::qualify_all;

#[derive(Debug, Deserialize)]
struct RawConversation {
    quester: String,
    first: String,
    #[serde(default)]
    npc_options: HashMap<String, RawOption>,
    #[serde(default)]
    player_options: HashMap<String, RawOption>,
}

#[derive(Debug, Deserialize)]
struct RawOption {
    text: String,
    #[serde(default)]
    conditions: String,
    #[serde(default)]
    events: String,
    #[serde(default)]
    pointers: String,
}

/// One node of the dialogue graph, NPC-side or player-side.
#[derive(Debug, Clone)]
pub struct ConversationOption {
    pub text: String,
    /// Guard conditions, qualified. All must hold for the option to show.
    pub conditions: Vec<String>,
    /// Events fired when the option is spoken, qualified.
    pub events: Vec<String>,
    /// Candidate follow-up options on the opposite side, local ids.
    pub pointers: Vec<String>,
}

/// A validated conversation graph.
#[derive(Debug, Clone)]
pub struct Conversation {
    /// Qualified id, `package.name`.
    pub id: String,
    /// NPC display name.
    pub quester: String,
    /// Candidate opening NPC options, tried in order.
    pub first: Vec<String>,
    pub npc_options: HashMap<String, ConversationOption>,
    pub player_options: HashMap<String, ConversationOption>,
}

fn split_list(value: &str) -> Vec<String> {
    if value.trim().is_empty() {
        Vec::new()
    } else {
        value.split(',').map(|s| s.trim().to_string()).collect()
    }
}

fn compile_option(pack: &str, raw: &RawOption) -> ConversationOption {
    ConversationOption {
        text: raw.text.clone(),
        conditions: qualify_all(pack, &split_list(&raw.conditions)),
        events: qualify_all(pack, &split_list(&raw.events)),
        pointers: split_list(&raw.pointers),
    }
}

impl Conversation {
    /// Parse and validate one conversation document. Every pointer must
    /// resolve to an option on the opposite side of the graph.
    pub fn parse(pack: &str, name: &str, json: &str) -> Result<Self, QuestError> {
        let raw: RawConversation = serde_json::from_str(json)?;
        let conversation = Self {
            id: format!("{}.{}", pack, name),
            quester: raw.quester,
            first: split_list(&raw.first),
            npc_options: raw
                .npc_options
                .iter()
                .map(|(id, o)| (id.clone(), compile_option(pack, o)))
                .collect(),
            player_options: raw
                .player_options
                .iter()
                .map(|(id, o)| (id.clone(), compile_option(pack, o)))
                .collect(),
        };
        conversation.validate()?;
        Ok(conversation)
    }

    fn validate(&self) -> Result<(), QuestError> {
        if self.first.is_empty() {
            return Err(QuestError::Instruction(format!(
                "conversation {} has no first options",
                self.id
            )));
        }
        for id in &self.first {
            if !self.npc_options.contains_key(id) {
                return Err(self.dangling("first", id));
            }
        }
        for option in self.npc_options.values() {
            for id in &option.pointers {
                if !self.player_options.contains_key(id) {
                    return Err(self.dangling("npc pointer", id));
                }
            }
        }
        for option in self.player_options.values() {
            for id in &option.pointers {
                if !self.npc_options.contains_key(id) {
                    return Err(self.dangling("player pointer", id));
                }
            }
        }
        Ok(())
    }

    fn dangling(&self, kind: &str, id: &str) -> QuestError {
        QuestError::Instruction(format!(
            "conversation {}: {} \"{}\" does not exist",
            self.id, kind, id
        ))
    }

    pub fn npc_option(&self, id: &str) -> Option<&ConversationOption> {
        self.npc_options.get(id)
    }

    pub fn player_option(&self, id: &str) -> Option<&ConversationOption> {
        self.player_options.get(id)
    }
}

/// A player's position inside an active conversation: which NPC option was
/// last spoken and which player options were offered, in menu order.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    /// Id used in log lines about this session.
    pub id: Uuid,
    pub player: String,
    /// Qualified conversation id.
    pub conversation: String,
    /// The NPC option currently on screen.
    pub current_npc: String,
    /// Player option ids offered for the current turn, menu order.
    pub menu: Vec<String>,
}

/// What the player sees for one turn of dialogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub quester: String,
    pub npc_text: String,
    /// Reply texts in menu order; selection is by 1-based index.
    pub replies: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const INNKEEPER: &str = r#"{
        "quester": "Innkeeper",
        "first": "greet",
        "npc_options": {
            "greet": {
                "text": "Welcome, traveler!",
                "pointers": "ask_work,leave"
            },
            "offer": {
                "text": "Fetch me ten logs.",
                "events": "start_fetch",
                "pointers": "leave"
            }
        },
        "player_options": {
            "ask_work": {
                "text": "Any work for me?",
                "conditions": "!other.busy",
                "pointers": "offer"
            },
            "leave": {
                "text": "Goodbye."
            }
        }
    }"#;

    #[test]
    fn parses_and_qualifies() {
        let conv = Conversation::parse("inn", "keeper", INNKEEPER).unwrap();
        assert_eq!(conv.id, "inn.keeper");
        assert_eq!(conv.first, vec!["greet".to_string()]);
        let ask = conv.player_option("ask_work").unwrap();
        assert_eq!(ask.conditions, vec!["!other.busy".to_string()]);
        assert_eq!(ask.pointers, vec!["offer".to_string()]);
        let offer = conv.npc_option("offer").unwrap();
        assert_eq!(offer.events, vec!["inn.start_fetch".to_string()]);
    }

    #[test]
    fn dangling_pointer_is_rejected() {
        let json = r#"{
            "quester": "Guard",
            "first": "halt",
            "npc_options": {
                "halt": { "text": "Halt!", "pointers": "missing" }
            }
        }"#;
        let err = Conversation::parse("castle", "guard", json).unwrap_err();
        assert!(err.to_string().contains("missing"), "{}", err);
    }

    #[test]
    fn missing_first_is_rejected() {
        let json = r#"{ "quester": "Ghost", "first": "" }"#;
        assert!(Conversation::parse("p", "ghost", json).is_err());
    }
}
