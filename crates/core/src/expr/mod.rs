//! Attribute filter expressions.
//!
//! A small infix language compiled to a postfix program and evaluated
//! against each candidate's JSON attributes during filtered search:
//!
//! ```text
//! .year > 1950 and .genre == 'jazz'
//! .rating ** 2 >= 16 or 'classic' in .tags
//! ```
//!
//! Literals are decimal numbers and quoted strings; `.dotted.paths` select
//! fields from the attribute document; `[a, b, c]` tuples feed the `in`
//! operator. Operator precedence, lowest first: `or`/`||`, `and`/`&&`,
//! comparisons and `in`, `+` `-`, `*` `/` `%`, `**` (right-associative),
//! unary `!`/`not`, parentheses.
//!
//! [`Program::compile`] reports syntax errors with a byte offset;
//! evaluation never errors — a candidate whose attributes cannot satisfy
//! (or even run) the program simply does not match.
//!
//! ```
//! use vsim_core::Program;
//!
//! let program = Program::compile(".year > 1950 and .genre == 'jazz'").unwrap();
//! assert!(program.matches(r#"{"year": 1970, "genre": "jazz"}"#));
//! assert!(!program.matches(r#"{"year": 1940, "genre": "jazz"}"#));
//! assert!(!program.matches("{}"));
//! ```

mod compile;
mod eval;
mod token;

pub use compile::Program;
