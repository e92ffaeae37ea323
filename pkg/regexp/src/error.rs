use common::errors::*;

/// All failures that can occur while tokenizing or parsing a pattern.
///
/// Exposed as a closed enum (rather than the opaque `common::errors::Error`)
/// so that callers can match on the exact failure mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Fail)]
pub enum RegexError {
    /// A trailing unescaped `\` at the end of the pattern.
    InvalidEscapeSequence,

    /// `[...` reached the end of the pattern without a closing `]`.
    UnclosedCharacterClass,

    /// `(...` reached the end of the pattern (or the enclosing group) without
    /// a closing `)`.
    UnclosedParenthesis,

    /// A `)` with no matching `(`.
    UnexpectedCloseParen,

    /// An escape sequence that is neither `\w`, `\d`, a back-reference digit,
    /// nor one of the literal-whitelisted metacharacters.
    UnsupportedEscape,

    /// A token inside `[...]` that cannot form a class member (e.g. a class
    /// shorthand used as one side of a `-` range).
    UnsupportedCharacterClassToken,

    /// A token encountered where an atom was expected (e.g. a bare `)` at
    /// the top level, or a quantifier with no preceding atom).
    UnsupportedToken,

    /// Two quantifier suffixes stacked directly on the same atom (`a**`).
    StackedQuantifier,

    /// An alternation branch with no atoms (`a||b` or a branch at the very
    /// start/end of an alternation).
    EmptyAlternationBranch,

    /// `a-b` inside a character class where `b` sorts before `a`.
    InvalidCharacterRange,

    /// A back-reference to a group that has not been fully captured yet
    /// (forward reference, or a reference to the group it appears inside).
    InvalidBackreference,
}

impl core::fmt::Display for RegexError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub type RegexResult<T> = core::result::Result<T, RegexError>;
