//! Per-engine dialect descriptors.
//!
//! A [`Dialect`] carries the small amount of engine-specific data the query
//! builders need: how to spell a parameter placeholder, how booleans are
//! represented, and which built-in function names differ between engines.
//! It is constructed once per backend and never mutated.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::storage::types::Value;

// =============================================================================
// Building blocks
// =============================================================================

/// Positional parameter syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `?` for every parameter.
    Question,
    /// `$1`, `$2`, ... numbered from one.
    Numbered,
}

impl Placeholder {
    /// Token for the parameter at zero-based `index`.
    pub fn token(self, index: usize) -> Cow<'static, str> {
        match self {
            Self::Question => Cow::Borrowed("?"),
            Self::Numbered => Cow::Owned(format!("${}", index + 1)),
        }
    }
}

/// How the engine represents boolean values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanStyle {
    /// `1` / `0`.
    Integer,
    /// `TRUE` / `FALSE`.
    Keyword,
}

/// Logical names for engine functions whose spelling differs per engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum FunctionKey {
    /// Position of a substring inside a string.
    #[strum(serialize = "string_pos")]
    StringPosition,
}

/// Argument rendered into a function call string.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionArg<'a> {
    /// Quoted as a string literal.
    Str(&'a str),
    /// Rendered bare (integers).
    Int(i64),
    /// Rendered bare (column names, nested expressions).
    Raw(&'a str),
}

impl<'a> From<&'a str> for FunctionArg<'a> {
    fn from(s: &'a str) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for FunctionArg<'_> {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl FunctionArg<'_> {
    fn render(&self) -> String {
        match self {
            Self::Str(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Int(i) => i.to_string(),
            Self::Raw(s) => (*s).to_string(),
        }
    }
}

// =============================================================================
// Dialect
// =============================================================================

/// Immutable engine descriptor shared by the query builders.
#[derive(Debug, Clone)]
pub struct Dialect {
    placeholder: Placeholder,
    booleans: BooleanStyle,
    functions: HashMap<FunctionKey, &'static str>,
}

impl Dialect {
    /// Dialect with integer booleans and the default function names.
    ///
    /// Backends override individual entries with [`Dialect::with_function`].
    pub fn new(placeholder: Placeholder) -> Self {
        let mut functions = HashMap::new();
        functions.insert(FunctionKey::StringPosition, "INSTR");
        Self {
            placeholder,
            booleans: BooleanStyle::Integer,
            functions,
        }
    }

    /// SQLite: `?` placeholders, `1`/`0` booleans, `INSTR`.
    pub fn sqlite() -> Self {
        Self::new(Placeholder::Question)
    }

    /// PostgreSQL: `$n` placeholders, `TRUE`/`FALSE` booleans, `STRPOS`.
    pub fn postgres() -> Self {
        Self::new(Placeholder::Numbered)
            .with_booleans(BooleanStyle::Keyword)
            .with_function(FunctionKey::StringPosition, "STRPOS")
    }

    pub fn with_booleans(mut self, booleans: BooleanStyle) -> Self {
        self.booleans = booleans;
        self
    }

    pub fn with_function(mut self, key: FunctionKey, name: &'static str) -> Self {
        self.functions.insert(key, name);
        self
    }

    #[inline]
    pub fn placeholder(&self) -> Placeholder {
        self.placeholder
    }

    #[inline]
    pub fn booleans(&self) -> BooleanStyle {
        self.booleans
    }

    /// Value callers bind for `true` in filters and mutations.
    pub fn true_value(&self) -> Value {
        match self.booleans {
            BooleanStyle::Integer => Value::Integer(1),
            BooleanStyle::Keyword => Value::Bool(true),
        }
    }

    /// Value callers bind for `false` in filters and mutations.
    pub fn false_value(&self) -> Value {
        match self.booleans {
            BooleanStyle::Integer => Value::Integer(0),
            BooleanStyle::Keyword => Value::Bool(false),
        }
    }

    /// SQL text for `true`.
    pub fn true_literal(&self) -> &'static str {
        match self.booleans {
            BooleanStyle::Integer => "1",
            BooleanStyle::Keyword => "TRUE",
        }
    }

    /// SQL text for `false`.
    pub fn false_literal(&self) -> &'static str {
        match self.booleans {
            BooleanStyle::Integer => "0",
            BooleanStyle::Keyword => "FALSE",
        }
    }

    /// Engine name for a logical function, if mapped.
    pub fn function_name(&self, key: FunctionKey) -> Option<&'static str> {
        self.functions.get(&key).copied()
    }

    /// Render `NAME(arg1, arg2, ...)` for a logical function.
    ///
    /// String arguments are single-quoted. With no arguments the bare name is
    /// returned. Returns `None` when the key is not mapped for this engine.
    pub fn function_call(&self, key: FunctionKey, args: &[FunctionArg<'_>]) -> Option<String> {
        let name = self.function_name(key)?;
        if args.is_empty() {
            return Some(name.to_string());
        }
        let rendered: Vec<String> = args.iter().map(FunctionArg::render).collect();
        Some(format!("{}({})", name, rendered.join(", ")))
    }

    /// Rewrite integer boolean defaults in DDL to this engine's keywords.
    ///
    /// Only `BOOLEAN DEFAULT 1` / `BOOLEAN DEFAULT 0` are touched. Integer-style
    /// engines get the input back unchanged.
    pub fn adapt_schema<'a>(&self, schema: &'a str) -> Cow<'a, str> {
        static BOOLEAN_DEFAULT: OnceLock<Regex> = OnceLock::new();

        if self.booleans == BooleanStyle::Integer {
            return Cow::Borrowed(schema);
        }

        let regex = BOOLEAN_DEFAULT.get_or_init(|| {
            Regex::new(r"(?i)\b(BOOLEAN\s+DEFAULT)\s+([01])\b")
                .expect("failed to compile boolean default regex")
        });

        regex.replace_all(schema, |caps: &regex::Captures| {
            let literal = if &caps[2] == "1" {
                self.true_literal()
            } else {
                self.false_literal()
            };
            format!("{} {}", &caps[1], literal)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_placeholder_tokens() {
        assert_eq!(Placeholder::Question.token(0), "?");
        assert_eq!(Placeholder::Question.token(4), "?");
        assert_eq!(Placeholder::Numbered.token(0), "$1");
        assert_eq!(Placeholder::Numbered.token(9), "$10");
    }

    #[test]
    fn test_function_call_sqlite() {
        let dialect = Dialect::sqlite();
        let sql = dialect.function_call(
            FunctionKey::StringPosition,
            &[FunctionArg::Str("needle"), FunctionArg::Str("haystack")],
        );
        assert_eq!(sql.as_deref(), Some("INSTR('needle', 'haystack')"));
    }

    #[test]
    fn test_function_call_postgres() {
        let dialect = Dialect::postgres();
        let sql = dialect.function_call(
            FunctionKey::StringPosition,
            &[FunctionArg::Str("needle"), FunctionArg::Str("haystack")],
        );
        assert_eq!(sql.as_deref(), Some("STRPOS('needle', 'haystack')"));
    }

    #[test]
    fn test_function_call_mixed_args() {
        let dialect = Dialect::sqlite();
        let sql = dialect.function_call(
            FunctionKey::StringPosition,
            &[FunctionArg::Raw("text"), FunctionArg::Str("it's"), FunctionArg::Int(3)],
        );
        assert_eq!(sql.as_deref(), Some("INSTR(text, 'it''s', 3)"));
    }

    #[test]
    fn test_function_name_without_args() {
        assert_eq!(
            Dialect::postgres().function_call(FunctionKey::StringPosition, &[]),
            Some("STRPOS".to_string())
        );
    }

    #[test]
    fn test_function_key_parse() {
        assert_eq!(
            FunctionKey::from_str("string_pos").unwrap(),
            FunctionKey::StringPosition
        );
        assert!(FunctionKey::from_str("unknown").is_err());
    }

    #[test]
    fn test_boolean_values() {
        assert_eq!(Dialect::sqlite().true_value(), Value::Integer(1));
        assert_eq!(Dialect::sqlite().false_value(), Value::Integer(0));
        assert_eq!(Dialect::postgres().true_value(), Value::Bool(true));
        assert_eq!(Dialect::postgres().false_literal(), "FALSE");
    }

    #[test]
    fn test_adapt_schema_rewrites_for_keyword_booleans() {
        let schema = "CREATE TABLE t (\n  a BOOLEAN DEFAULT 1,\n  b boolean default 0,\n  c INTEGER DEFAULT 1\n);";
        let adapted = Dialect::postgres().adapt_schema(schema);
        assert_eq!(
            adapted,
            "CREATE TABLE t (\n  a BOOLEAN DEFAULT TRUE,\n  b boolean default FALSE,\n  c INTEGER DEFAULT 1\n);"
        );
    }

    #[test]
    fn test_adapt_schema_leaves_sqlite_untouched() {
        let schema = "col BOOLEAN DEFAULT 1";
        let adapted = Dialect::sqlite().adapt_schema(schema);
        assert!(matches!(adapted, Cow::Borrowed(_)));
        assert_eq!(adapted, "col BOOLEAN DEFAULT 1");
        assert_eq!(
            Dialect::postgres().adapt_schema(schema),
            "col BOOLEAN DEFAULT TRUE"
        );
    }

    #[test]
    fn test_adapt_schema_ignores_longer_numbers() {
        let schema = "col BOOLEAN DEFAULT 10";
        assert_eq!(Dialect::postgres().adapt_schema(schema), schema);
    }
}
