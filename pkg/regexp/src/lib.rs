//! A small byte-oriented backtracking regular-expression engine.
//!
//! Supports literals, character classes (`\w`, `\d`, ranges, negation), the
//! anchors `^`/`$`, greedy quantifiers (`*`, `+`, `?`), alternation, capture
//! groups, and numeric back-references (`\1`..`\9`). Matching is a classic
//! backtracking search over bytes, not Unicode scalar values, and is not
//! intended to compete with automaton-based engines on pathological inputs.

pub mod error;
pub mod matcher;
pub mod node;
pub mod parser;
pub mod token;

pub use error::{RegexError, RegexResult};
pub use node::{CharacterClass, CharacterClassMember, Node, Quantifier, Regex};

impl Regex {
    /// Tokenizes and parses `pattern` into a `Regex` ready to match against
    /// byte input.
    pub fn new(pattern: &str) -> RegexResult<Self> {
        let tokens = token::tokenize(pattern.as_bytes())?;
        parser::parse(&tokens)
    }

    /// Searches `input` for any substring matching this pattern.
    pub fn is_match(&self, input: &[u8]) -> bool {
        matcher::matches(self, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_round_trip() {
        let re = Regex::new("(\\d+) (\\w+) and \\1 \\2").unwrap();
        assert!(re.is_match(b"3 red and 3 red"));
        assert!(!re.is_match(b"3 red and 4 red"));
    }

    #[test]
    fn invalid_pattern_surfaces_parse_error() {
        assert_eq!(Regex::new("a("), Err(RegexError::UnclosedParenthesis));
    }
}
