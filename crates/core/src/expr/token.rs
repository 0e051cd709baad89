//! Tokenizer for filter expressions.
//!
//! Walks the expression left to right, producing numbers, quoted strings,
//! `.dotted.path` selectors, `[...]` tuples of literals, and operators.
//! A `-` is part of a number when a value is expected at that position
//! (start of input, or right after any operator except `)`); otherwise it
//! is the binary minus. Every token records its byte offset so syntax
//! errors point into the source.

use crate::error::ExprError;

/// Operator identifiers, in precedence groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    OParen,
    CParen,
    Not,
    Pow,
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
    In,
    And,
    Or,
}

impl Op {
    pub(crate) fn precedence(self) -> u8 {
        match self {
            Op::Or => 0,
            Op::And => 1,
            Op::Gt | Op::Gte | Op::Lt | Op::Lte | Op::Eq | Op::Neq | Op::In => 2,
            Op::Add | Op::Sub => 3,
            Op::Mul | Op::Div | Op::Mod => 4,
            Op::Pow => 5,
            Op::Not => 6,
            Op::OParen | Op::CParen => 7,
        }
    }

    pub(crate) fn arity(self) -> usize {
        match self {
            Op::OParen | Op::CParen => 0,
            Op::Not => 1,
            _ => 2,
        }
    }

    /// Right-associative operators do not pop equal precedence.
    pub(crate) fn right_assoc(self) -> bool {
        matches!(self, Op::Pow | Op::Not)
    }
}

/// A literal inside a `[...]` tuple.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lit {
    Num(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Num(f64),
    Str(String),
    /// Dotted path, leading dot stripped: `.a.b` → `["a", "b"]`.
    Selector(Vec<String>),
    Tuple(Vec<Lit>),
    Op(Op),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub tok: Tok,
    pub offset: usize,
}

/// Operator spellings, matched longest-first at each position.
/// `&&` and `||` are aliases for `and` / `or`.
const OP_TABLE: &[(&str, Op)] = &[
    ("(", Op::OParen),
    (")", Op::CParen),
    ("!", Op::Not),
    ("not", Op::Not),
    ("**", Op::Pow),
    ("*", Op::Mul),
    ("/", Op::Div),
    ("%", Op::Mod),
    ("+", Op::Add),
    ("-", Op::Sub),
    (">", Op::Gt),
    (">=", Op::Gte),
    ("<", Op::Lt),
    ("<=", Op::Lte),
    ("==", Op::Eq),
    ("!=", Op::Neq),
    ("in", Op::In),
    ("and", Op::And),
    ("&&", Op::And),
    ("or", Op::Or),
    ("||", Op::Or),
];

/// Characters that may appear in a multi-character operator.
const OP_CHARS: &[u8] = b"+-*%/!()<>=|&";

fn is_op_char(b: u8) -> bool {
    OP_CHARS.contains(&b)
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Longest accepted numeric literal, sign included.
const MAX_NUM_LEN: usize = 63;

pub(crate) struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    /// Tokenize the whole expression. The final token is always `Eof`.
    pub(crate) fn tokenize(mut self) -> Result<Vec<Spanned>, ExprError> {
        let mut tokens: Vec<Spanned> = Vec::new();
        loop {
            self.skip_spaces();
            let offset = self.pos;

            // A minus binds to the following number when no value can
            // precede it here.
            let minus_is_number = match tokens.last() {
                None => true,
                Some(t) => matches!(&t.tok, Tok::Op(op) if *op != Op::CParen),
            };

            let tok = match self.peek() {
                None => Tok::Eof,
                Some(b) if b.is_ascii_digit() => self.number()?,
                Some(b'-') if minus_is_number && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => {
                    self.number()?
                }
                Some(b'"') | Some(b'\'') => self.string()?,
                Some(b'[') => self.tuple()?,
                Some(b'.') => self.selector()?,
                Some(b) if b.is_ascii_alphabetic() || is_op_char(b) => self.operator()?,
                Some(_) => return Err(ExprError::Syntax { offset }),
            };

            let done = tok == Tok::Eof;
            tokens.push(Spanned { tok, offset });
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.pos + ahead).copied()
    }

    fn skip_spaces(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn number(&mut self) -> Result<Tok, ExprError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            if self.pos - start >= MAX_NUM_LEN {
                return Err(ExprError::Syntax { offset: start });
            }
            self.pos += 1;
        }
        let text = std::str::from_utf8(&self.src[start..self.pos])
            .expect("digits and minus are valid UTF-8");
        let num: f64 = text
            .parse()
            .map_err(|_| ExprError::Syntax { offset: start })?;
        Ok(Tok::Num(num))
    }

    fn string(&mut self) -> Result<Tok, ExprError> {
        let start = self.pos;
        let quote = self.peek().expect("caller checked");
        self.pos += 1;
        let mut out: Vec<u8> = Vec::new();
        while let Some(b) = self.peek() {
            if b == b'\\' && self.peek_at(1).is_some() {
                out.push(self.src[self.pos + 1]);
                self.pos += 2;
                continue;
            }
            if b == quote {
                self.pos += 1;
                return String::from_utf8(out)
                    .map(Tok::Str)
                    .map_err(|_| ExprError::Syntax { offset: start });
            }
            out.push(b);
            self.pos += 1;
        }
        // Ran off the end without a closing quote.
        Err(ExprError::Syntax { offset: self.pos })
    }

    fn selector(&mut self) -> Result<Tok, ExprError> {
        let mut path = Vec::new();
        loop {
            let dot = self.pos;
            self.pos += 1; // consume '.'
            let seg_start = self.pos;
            while self.peek().is_some_and(is_ident_char) {
                self.pos += 1;
            }
            if self.pos == seg_start {
                return Err(ExprError::Syntax { offset: dot });
            }
            let seg = std::str::from_utf8(&self.src[seg_start..self.pos])
                .expect("identifier bytes are ASCII");
            path.push(seg.to_string());

            let continues = self.peek() == Some(b'.') && self.peek_at(1).is_some_and(is_ident_char);
            if !continues {
                return Ok(Tok::Selector(path));
            }
        }
    }

    fn tuple(&mut self) -> Result<Tok, ExprError> {
        self.pos += 1; // consume '['
        let mut elements = Vec::new();
        loop {
            self.skip_spaces();
            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    return Ok(Tok::Tuple(elements));
                }
                None => return Err(ExprError::Syntax { offset: self.pos }),
                _ => {}
            }
            if !elements.is_empty() {
                if self.peek() != Some(b',') {
                    return Err(ExprError::Syntax { offset: self.pos });
                }
                self.pos += 1;
                self.skip_spaces();
            }
            elements.push(self.tuple_literal()?);
        }
    }

    /// Tuple elements must be literals: numbers or strings.
    fn tuple_literal(&mut self) -> Result<Lit, ExprError> {
        let offset = self.pos;
        match self.peek() {
            Some(b) if b.is_ascii_digit() => match self.number()? {
                Tok::Num(n) => Ok(Lit::Num(n)),
                _ => unreachable!(),
            },
            Some(b'-') if self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) => {
                match self.number()? {
                    Tok::Num(n) => Ok(Lit::Num(n)),
                    _ => unreachable!(),
                }
            }
            Some(b'"') | Some(b'\'') => match self.string()? {
                Tok::Str(s) => Ok(Lit::Str(s)),
                _ => unreachable!(),
            },
            _ => Err(ExprError::Syntax { offset }),
        }
    }

    fn operator(&mut self) -> Result<Tok, ExprError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphabetic() || is_op_char(b))
        {
            self.pos += 1;
        }
        let run = &self.src[start..self.pos];

        // Longest table entry that prefixes the consumed run wins; the
        // cursor backs up to just past it.
        let mut best: Option<(usize, Op)> = None;
        for &(name, op) in OP_TABLE {
            let n = name.as_bytes();
            if n.len() <= run.len()
                && &run[..n.len()] == n
                && best.is_none_or(|(len, _)| n.len() > len)
            {
                best = Some((n.len(), op));
            }
        }
        match best {
            Some((len, op)) => {
                self.pos = start + len;
                Ok(Tok::Op(op))
            }
            None => Err(ExprError::Syntax { offset: start }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Tok> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|s| s.tok)
            .collect()
    }

    fn lex_err(src: &str) -> ExprError {
        Lexer::new(src).tokenize().unwrap_err()
    }

    #[test]
    fn test_numbers_and_operators() {
        assert_eq!(
            lex("1 + 2"),
            vec![Tok::Num(1.0), Tok::Op(Op::Add), Tok::Num(2.0), Tok::Eof]
        );
    }

    #[test]
    fn test_leading_minus_is_number() {
        assert_eq!(lex("-5"), vec![Tok::Num(-5.0), Tok::Eof]);
    }

    #[test]
    fn test_minus_after_value_is_operator() {
        assert_eq!(
            lex("3-5"),
            vec![Tok::Num(3.0), Tok::Op(Op::Sub), Tok::Num(5.0), Tok::Eof]
        );
    }

    #[test]
    fn test_minus_after_operator_is_number() {
        assert_eq!(
            lex("3 * -5"),
            vec![Tok::Num(3.0), Tok::Op(Op::Mul), Tok::Num(-5.0), Tok::Eof]
        );
    }

    #[test]
    fn test_over_long_number_rejected() {
        let long = "9".repeat(MAX_NUM_LEN + 1);
        assert_eq!(lex_err(&long).offset(), 0);

        let expr = format!("1 + {long}");
        assert_eq!(lex_err(&expr).offset(), 4);

        // Exactly at the cap is still fine (sign included).
        let max = "9".repeat(MAX_NUM_LEN);
        assert!(Lexer::new(&max).tokenize().is_ok());
        let signed = format!("-{}", "9".repeat(MAX_NUM_LEN - 1));
        assert!(Lexer::new(&signed).tokenize().is_ok());
        let signed_over = format!("-{}", "9".repeat(MAX_NUM_LEN));
        assert_eq!(lex_err(&signed_over).offset(), 0);
    }

    #[test]
    fn test_minus_after_cparen_is_operator() {
        assert_eq!(
            lex("(3) -5"),
            vec![
                Tok::Op(Op::OParen),
                Tok::Num(3.0),
                Tok::Op(Op::CParen),
                Tok::Op(Op::Sub),
                Tok::Num(5.0),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_string_quotes_and_escapes() {
        assert_eq!(lex("'jazz'"), vec![Tok::Str("jazz".into()), Tok::Eof]);
        assert_eq!(lex("\"rock\""), vec![Tok::Str("rock".into()), Tok::Eof]);
        assert_eq!(lex(r"'it\'s'"), vec![Tok::Str("it's".into()), Tok::Eof]);
    }

    #[test]
    fn test_unterminated_string() {
        let err = lex_err("'oops");
        assert_eq!(err.offset(), 5);
    }

    #[test]
    fn test_selector_paths() {
        assert_eq!(lex(".year"), vec![Tok::Selector(vec!["year".into()]), Tok::Eof]);
        assert_eq!(
            lex(".a.b"),
            vec![Tok::Selector(vec!["a".into(), "b".into()]), Tok::Eof]
        );
    }

    #[test]
    fn test_bare_dot_is_error() {
        assert_eq!(lex_err(". > 1").offset(), 0);
    }

    #[test]
    fn test_word_operators_and_aliases() {
        assert_eq!(
            lex("1 and 2 or 3"),
            vec![
                Tok::Num(1.0),
                Tok::Op(Op::And),
                Tok::Num(2.0),
                Tok::Op(Op::Or),
                Tok::Num(3.0),
                Tok::Eof
            ]
        );
        // The symbolic aliases bind with no trailing-space requirement.
        assert_eq!(
            lex("1&&2||3"),
            vec![
                Tok::Num(1.0),
                Tok::Op(Op::And),
                Tok::Num(2.0),
                Tok::Op(Op::Or),
                Tok::Num(3.0),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_two_char_operators() {
        assert_eq!(
            lex(".x >= 3"),
            vec![
                Tok::Selector(vec!["x".into()]),
                Tok::Op(Op::Gte),
                Tok::Num(3.0),
                Tok::Eof
            ]
        );
        assert_eq!(
            lex("2 ** 3"),
            vec![Tok::Num(2.0), Tok::Op(Op::Pow), Tok::Num(3.0), Tok::Eof]
        );
        assert_eq!(
            lex(".x != 'a'"),
            vec![
                Tok::Selector(vec!["x".into()]),
                Tok::Op(Op::Neq),
                Tok::Str("a".into()),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn test_not_variants() {
        assert_eq!(lex("!1"), vec![Tok::Op(Op::Not), Tok::Num(1.0), Tok::Eof]);
        assert_eq!(lex("not 1"), vec![Tok::Op(Op::Not), Tok::Num(1.0), Tok::Eof]);
    }

    #[test]
    fn test_tuples() {
        assert_eq!(
            lex("[1, 2, 3]"),
            vec![
                Tok::Tuple(vec![Lit::Num(1.0), Lit::Num(2.0), Lit::Num(3.0)]),
                Tok::Eof
            ]
        );
        assert_eq!(
            lex("['a', -2]"),
            vec![
                Tok::Tuple(vec![Lit::Str("a".into()), Lit::Num(-2.0)]),
                Tok::Eof
            ]
        );
        assert_eq!(lex("[]"), vec![Tok::Tuple(vec![]), Tok::Eof]);
    }

    #[test]
    fn test_tuple_rejects_non_literal() {
        // Selectors are not literals inside a tuple.
        let err = lex_err("[.x]");
        assert_eq!(err.offset(), 1);
    }

    #[test]
    fn test_unknown_character() {
        assert_eq!(lex_err("1 # 2").offset(), 2);
    }

    #[test]
    fn test_offsets_recorded() {
        let tokens = Lexer::new("  .x == 5").tokenize().unwrap();
        assert_eq!(tokens[0].offset, 2);
        assert_eq!(tokens[1].offset, 5);
        assert_eq!(tokens[2].offset, 8);
    }
}
