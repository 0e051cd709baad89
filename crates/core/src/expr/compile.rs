//! Infix-to-postfix compilation (Dijkstra's shunting-yard).
//!
//! Values go straight to the program; operators move through a precedence
//! stack. A stack-depth simulator tracks how many values the program would
//! leave on the stack after each emitted instruction, so arity problems are
//! compile errors rather than evaluation surprises: the program is accepted
//! only if exactly one value remains at the end.

use crate::error::ExprError;
use crate::expr::token::{Lexer, Lit, Op, Spanned, Tok};

/// One postfix instruction.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Instr {
    Num(f64),
    Str(String),
    Tuple(Vec<Lit>),
    /// Resolve a dotted path against the attribute document.
    Selector(Vec<String>),
    Apply(Op),
}

/// A compiled filter expression: a postfix program for the evaluator in
/// [`super::eval`].
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub(crate) instrs: Vec<Instr>,
}

struct Compiler {
    instrs: Vec<Instr>,
    /// Offset of the source token behind each emitted instruction.
    offsets: Vec<usize>,
    ops: Vec<(Op, usize)>,
    /// Values that would be on the evaluation stack so far.
    depth: usize,
}

impl Compiler {
    fn new() -> Self {
        Self {
            instrs: Vec::new(),
            offsets: Vec::new(),
            ops: Vec::new(),
            depth: 0,
        }
    }

    fn emit_value(&mut self, instr: Instr, offset: usize) {
        self.instrs.push(instr);
        self.offsets.push(offset);
        self.depth += 1;
    }

    /// Move an operator from the stack into the program, checking that
    /// enough values exist for its arity.
    fn emit_op(&mut self, op: Op, offset: usize) -> Result<(), ExprError> {
        let arity = op.arity();
        if self.depth < arity {
            return Err(ExprError::Syntax { offset });
        }
        if op == Op::In {
            // The right operand of `in` must be a tuple (a literal or a
            // selector that can resolve to one); a plain scalar on the
            // right is rejected at its own offset.
            match self.instrs.last() {
                Some(Instr::Tuple(_)) | Some(Instr::Selector(_)) => {}
                _ => {
                    let offset = self.offsets.last().copied().unwrap_or(offset);
                    return Err(ExprError::Syntax { offset });
                }
            }
        }
        self.instrs.push(Instr::Apply(op));
        self.offsets.push(offset);
        self.depth = self.depth - arity + 1;
        Ok(())
    }

    fn operator(&mut self, op: Op, offset: usize) -> Result<(), ExprError> {
        if op == Op::OParen {
            self.ops.push((op, offset));
            return Ok(());
        }

        if op == Op::CParen {
            loop {
                let Some((top, top_offset)) = self.ops.pop() else {
                    return Err(ExprError::Syntax { offset });
                };
                if top == Op::OParen {
                    return Ok(());
                }
                self.emit_op(top, top_offset)?;
            }
        }

        let prec = op.precedence();
        while let Some(&(top, top_offset)) = self.ops.last() {
            if top == Op::OParen {
                break;
            }
            let top_prec = top.precedence();
            let pops = if op.right_assoc() {
                top_prec > prec
            } else {
                top_prec >= prec
            };
            if !pops {
                break;
            }
            self.ops.pop();
            self.emit_op(top, top_offset)?;
        }
        self.ops.push((op, offset));
        Ok(())
    }

    fn finish(mut self, eof_offset: usize) -> Result<Program, ExprError> {
        while let Some((op, offset)) = self.ops.pop() {
            if op == Op::OParen {
                return Err(ExprError::Syntax { offset });
            }
            self.emit_op(op, offset)?;
        }
        if self.depth != 1 {
            return Err(ExprError::Syntax { offset: eof_offset });
        }
        Ok(Program {
            instrs: self.instrs,
        })
    }
}

impl Program {
    /// Compile an infix filter expression.
    ///
    /// On failure the error carries the byte offset of the offending spot
    /// in `expr`.
    pub fn compile(expr: &str) -> Result<Program, ExprError> {
        let tokens = Lexer::new(expr).tokenize()?;
        let mut compiler = Compiler::new();
        let mut eof_offset = 0;

        for Spanned { tok, offset } in tokens {
            match tok {
                Tok::Num(n) => compiler.emit_value(Instr::Num(n), offset),
                Tok::Str(s) => compiler.emit_value(Instr::Str(s), offset),
                Tok::Tuple(t) => compiler.emit_value(Instr::Tuple(t), offset),
                Tok::Selector(path) => compiler.emit_value(Instr::Selector(path), offset),
                Tok::Op(op) => compiler.operator(op, offset)?,
                Tok::Eof => {
                    eof_offset = offset;
                    break;
                }
            }
        }
        compiler.finish(eof_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(program: &Program) -> Vec<Op> {
        program
            .instrs
            .iter()
            .filter_map(|i| match i {
                Instr::Apply(op) => Some(*op),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_simple_arithmetic_postfix() {
        let p = Program::compile("1 + 2 * 3").unwrap();
        assert_eq!(
            p.instrs,
            vec![
                Instr::Num(1.0),
                Instr::Num(2.0),
                Instr::Num(3.0),
                Instr::Apply(Op::Mul),
                Instr::Apply(Op::Add),
            ]
        );
    }

    #[test]
    fn test_parens_override_precedence() {
        let p = Program::compile("(1 + 2) * 3").unwrap();
        assert_eq!(
            p.instrs,
            vec![
                Instr::Num(1.0),
                Instr::Num(2.0),
                Instr::Apply(Op::Add),
                Instr::Num(3.0),
                Instr::Apply(Op::Mul),
            ]
        );
    }

    #[test]
    fn test_left_assoc_pops_equal_precedence() {
        // 8 - 3 - 2 must evaluate as (8 - 3) - 2.
        let p = Program::compile("8 - 3 - 2").unwrap();
        assert_eq!(ops(&p), vec![Op::Sub, Op::Sub]);
        assert_eq!(
            p.instrs[..3],
            [Instr::Num(8.0), Instr::Num(3.0), Instr::Apply(Op::Sub)]
        );
    }

    #[test]
    fn test_pow_right_assoc() {
        // 2 ** 3 ** 2 must evaluate as 2 ** (3 ** 2): both pows emitted
        // after all three operands.
        let p = Program::compile("2 ** 3 ** 2").unwrap();
        assert_eq!(
            p.instrs,
            vec![
                Instr::Num(2.0),
                Instr::Num(3.0),
                Instr::Num(2.0),
                Instr::Apply(Op::Pow),
                Instr::Apply(Op::Pow),
            ]
        );
    }

    #[test]
    fn test_double_not_compiles() {
        assert!(Program::compile("not not 1").is_ok());
        assert!(Program::compile("!!1").is_ok());
    }

    #[test]
    fn test_stray_open_paren() {
        let err = Program::compile("(1 + 2").unwrap_err();
        assert_eq!(err.offset(), 0);
    }

    #[test]
    fn test_stray_close_paren() {
        let err = Program::compile("1 + 2)").unwrap_err();
        assert_eq!(err.offset(), 5);
    }

    #[test]
    fn test_missing_operand_rejected() {
        assert!(Program::compile("1 +").is_err());
        assert!(Program::compile("and 1").is_err());
    }

    #[test]
    fn test_two_values_no_operator_rejected() {
        assert!(Program::compile("1 2").is_err());
        assert!(Program::compile("").is_err());
    }

    #[test]
    fn test_in_requires_tuple_on_right() {
        assert!(Program::compile("1 in [1,2,3]").is_ok());
        assert!(Program::compile("'x' in .tags").is_ok());
        let err = Program::compile("1 in 5").unwrap_err();
        assert_eq!(err.offset(), 5, "error points at the scalar right operand");
    }

    #[test]
    fn test_mixed_filter_expression() {
        let p = Program::compile(".year > 1950 and .genre == 'jazz'").unwrap();
        assert_eq!(ops(&p), vec![Op::Gt, Op::Eq, Op::And]);
    }
}
