use thiserror::Error;

/// Errors raised while declaring or compiling a grammar.
///
/// These all point at a defective grammar definition, so compilation stops at
/// the first one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("rule for {lhs} has an empty right-hand side")]
    EmptyRhs { lhs: String },

    #[error("rule for {lhs} has only optional elements; at least one element must be mandatory")]
    AllOptional { lhs: String },

    #[error("rule for {lhs}: invalid element {element:?}: {reason}")]
    InvalidElement { lhs: String, element: String, reason: &'static str },

    #[error("invalid nonterminal name {0:?} (expected `<name>`)")]
    InvalidNonterminalName(String),

    #[error("nonterminal {name} is referenced but never defined")]
    UndefinedNonterminal { name: String },

    #[error("{count} rule(s) could not be lowered (cyclic definition through {names:?})")]
    Unlowerable { count: usize, names: Vec<String> },

    #[error("shard {shard} does not exist (grammar has {num_shards} shard(s))")]
    InvalidShard { shard: usize, num_shards: usize },

    #[error("nonterminal {name} is bound to annotation {annotation:?} and cannot also have rules")]
    AnnotationWithRules { name: String, annotation: String },

    #[error("predefined nonterminal {name} is produced by the lexer and cannot have rules")]
    PredefinedWithRules { name: String },

    #[error("callback id {0} is reserved for built-in callbacks")]
    ReservedCallback(u32),

    #[error("rule for {lhs} has {count} optional elements (at most {max} allowed)")]
    TooManyOptionals { lhs: String, count: usize, max: usize },

    #[error("invalid shard locale: {0}")]
    Locale(#[from] LocaleError),

    #[error("compiled grammar failed verification: {0}")]
    Serialization(#[from] RulesSetError),
}

/// Errors raised when a serialized rule set fails verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RulesSetError {
    #[error("buffer too short for a rule set header ({0} bytes)")]
    TooShort(usize),

    #[error("bad magic bytes {0:?}")]
    BadMagic([u8; 4]),

    #[error("unsupported rule set version {0}")]
    UnsupportedVersion(u32),

    #[error("section {section} is out of bounds (offset {offset}, length {len}, buffer {buffer})")]
    OutOfBounds { section: &'static str, offset: usize, len: usize, buffer: usize },

    #[error("section {section} references {index}, but only {limit} entries exist")]
    DanglingReference { section: &'static str, index: u64, limit: u64 },

    #[error("string at offset {0} is not NUL-terminated UTF-8")]
    BadString(usize),

    #[error("shard {shard} carries an invalid locale tag: {source}")]
    BadLocale { shard: usize, source: LocaleError },
}

/// Errors raised when parsing a locale tag.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocaleError {
    #[error("empty locale tag")]
    Empty,

    #[error("invalid locale tag {0:?}")]
    Invalid(String),
}
