//! Instruction string tokenization.
//!
//! An instruction is a single space-tokenized line: token 0 is the type
//! keyword, remaining tokens are positional or `key:value` arguments.
//! List-valued arguments are comma-separated within one token; there is no
//! nested structure. Every accessor produces a diagnostic naming the field
//! and the malformed value so loaders can report precise errors.

use crate::quest::errors::QuestError;

/// A tokenized instruction string. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Instruction {
    raw: String,
    tokens: Vec<String>,
}

impl Instruction {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            tokens: raw.split_whitespace().map(str::to_string).collect(),
        }
    }

    /// The full instruction string as authored.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The type keyword (token 0), or empty string for a blank instruction.
    pub fn keyword(&self) -> &str {
        self.tokens.first().map(String::as_str).unwrap_or("")
    }

    /// Positional argument by index; index 0 is the first token after the
    /// keyword. Errors with the field name when absent.
    pub fn positional(&self, index: usize, field: &str) -> Result<&str, QuestError> {
        self.tokens
            .get(index + 1)
            .map(String::as_str)
            .ok_or_else(|| QuestError::missing(field))
    }

    /// Value of a `key:value` token, if present.
    pub fn keyed(&self, key: &str) -> Option<&str> {
        let prefix = format!("{}:", key);
        self.tokens
            .iter()
            .skip(1)
            .find_map(|t| t.strip_prefix(&prefix))
    }

    /// Required `key:value` token.
    pub fn keyed_required(&self, key: &str) -> Result<&str, QuestError> {
        self.keyed(key).ok_or_else(|| QuestError::missing(key))
    }

    /// Comma list from a `key:value` token. Missing key or empty value yields
    /// an empty list.
    pub fn keyed_list(&self, key: &str) -> Vec<String> {
        match self.keyed(key) {
            Some(v) if !v.is_empty() => v.split(',').map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }

    /// Parse an integer, diagnosing with the field name on failure.
    pub fn int(field: &str, value: &str) -> Result<i64, QuestError> {
        value
            .parse::<i64>()
            .map_err(|_| QuestError::field(field, value))
    }

    /// Parse a float, diagnosing with the field name on failure.
    pub fn float(field: &str, value: &str) -> Result<f64, QuestError> {
        value
            .parse::<f64>()
            .map_err(|_| QuestError::field(field, value))
    }

    /// Split a `NAME:count` pair, e.g. `ZOMBIE:10` or `item1:5`. The count
    /// defaults to 1 when the colon part is absent.
    pub fn name_count(field: &str, value: &str) -> Result<(String, i64), QuestError> {
        match value.split_once(':') {
            Some((name, count)) if !name.is_empty() => {
                Ok((name.to_string(), Self::int(field, count)?))
            }
            Some(_) => Err(QuestError::field(field, value)),
            None => Ok((value.to_string(), 1)),
        }
    }
}

/// Qualify a reference against its owning package: references without a dot
/// resolve inside the package, dotted references are already global.
pub fn qualify(pack: &str, reference: &str) -> String {
    // A leading `!` negates a condition; it stays outside the qualified id.
    let (neg, name) = match reference.strip_prefix('!') {
        Some(rest) => ("!", rest),
        None => ("", reference),
    };
    if name.contains('.') {
        format!("{}{}", neg, name)
    } else {
        format!("{}{}.{}", neg, pack, name)
    }
}

/// Qualify every entry of a comma-list argument.
pub fn qualify_all(pack: &str, refs: &[String]) -> Vec<String> {
    refs.iter().map(|r| qualify(pack, r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_and_positional() {
        let i = Instruction::new("point reputation 25");
        assert_eq!(i.keyword(), "point");
        assert_eq!(i.positional(0, "category").unwrap(), "reputation");
        assert_eq!(i.positional(1, "count").unwrap(), "25");
        assert!(i.positional(2, "extra").is_err());
    }

    #[test]
    fn keyed_arguments() {
        let i = Instruction::new("give item1:5 event_conditions:rich,lucky label:x");
        assert_eq!(i.keyed("label"), Some("x"));
        assert_eq!(
            i.keyed_list("event_conditions"),
            vec!["rich".to_string(), "lucky".to_string()]
        );
        assert!(i.keyed("missing").is_none());
        assert!(i.keyed_list("missing").is_empty());
    }

    #[test]
    fn numeric_diagnostics_name_the_field() {
        let err = Instruction::int("count", "ten").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("count"), "{}", msg);
        assert!(msg.contains("ten"), "{}", msg);
    }

    #[test]
    fn name_count_pairs() {
        assert_eq!(
            Instruction::name_count("mob", "ZOMBIE:10").unwrap(),
            ("ZOMBIE".to_string(), 10)
        );
        assert_eq!(
            Instruction::name_count("mob", "ZOMBIE").unwrap(),
            ("ZOMBIE".to_string(), 1)
        );
        assert!(Instruction::name_count("mob", ":10").is_err());
    }

    #[test]
    fn qualification() {
        assert_eq!(qualify("default", "rich"), "default.rich");
        assert_eq!(qualify("default", "other.rich"), "other.rich");
        assert_eq!(qualify("default", "!rich"), "!default.rich");
        assert_eq!(qualify("default", "!other.rich"), "!other.rich");
    }
}
