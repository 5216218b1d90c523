// Control-flow lowering: break, while, repeat and both for forms.
//
// The for statements desugar into hidden locals plus a plain loop, the way
// the reference manual specifies them; hidden names carry a `*` prefix so
// they can never collide with source identifiers.

use smol_str::SmolStr;
use wasm_encoder::Instruction;

use crate::ast::*;
use crate::error::{CompileError, Result};
use crate::runtime::RuntimeFn;
use crate::wasm::util::*;
use crate::wasm::{Insn, InsnList};

use super::Compiler;

fn name_exp(name: &str) -> Expression {
    Expression::Prefix(Box::new(PrefixExp::name(Name::new(name))))
}

fn binary(op: BinOperator, lhs: Expression, rhs: Expression) -> Expression {
    Expression::Binary(Box::new(BinOperation { op, lhs, rhs }))
}

fn read_usage() -> UsageRef {
    let usage = new_usage();
    usage.borrow_mut().read_count = 1;
    usage
}

impl<'m> Compiler<'m> {
    fn push_loop(&mut self) -> (SmolStr, SmolStr) {
        let base = self.b.fresh_label("loop");
        let begin = SmolStr::new(format!("{base}_begin"));
        let end = SmolStr::new(format!("{base}_end"));
        self.stack.current_function().loop_stack.push(base);
        (begin, end)
    }

    fn pop_loop(&mut self) {
        self.stack.current_function().loop_stack.pop();
    }

    pub(crate) fn break_statement(&mut self) -> Result<InsnList> {
        let base = self.stack.current_function().loop_stack.last().cloned();
        match base {
            Some(base) => Ok(vec![Insn::Br(SmolStr::new(format!("{base}_end")))]),
            None => Err(CompileError::semantic("break outside loop")),
        }
    }

    pub(crate) fn while_statement(
        &mut self,
        condition: &Expression,
        body: &Block,
    ) -> Result<InsnList> {
        let (begin, end) = self.push_loop();

        let cond_value = self.expression(condition)?;
        let cond = self.single(cond_value);
        let mut inner = self.block(body)?;
        let cond_again_value = self.expression(condition)?;
        inner.extend(self.single(cond_again_value));
        inner.push(self.rt.call(self.b, RuntimeFn::ToBool));
        inner.push(Insn::BrIf(begin.clone()));

        let mut guard = cond;
        guard.push(self.rt.call(self.b, RuntimeFn::ToBoolNot));
        guard.push(Insn::BrIf(end.clone()));
        guard.push(Insn::Loop {
            label: begin,
            result: None,
            body: inner,
        });

        self.pop_loop();
        Ok(vec![Insn::Block {
            label: Some(end),
            result: None,
            body: guard,
        }])
    }

    pub(crate) fn repeat_statement(
        &mut self,
        body: &Block,
        condition: &Expression,
    ) -> Result<InsnList> {
        let (begin, end) = self.push_loop();

        // Body and condition share one scope: the condition may read locals
        // declared in the body.
        self.stack.push_block();
        let mark = {
            let func = self.stack.current_function();
            (
                func.label_stack.len(),
                func.request_label_stack.len(),
            )
        };
        let result = (|| -> Result<InsnList> {
            let mut inner = self.repeat_block_stmts(body, mark.1)?;
            let cond_value = self.expression(condition)?;
            inner.extend(self.single(cond_value));
            inner.push(self.rt.call(self.b, RuntimeFn::ToBoolNot));
            inner.push(Insn::BrIf(begin.clone()));
            Ok(inner)
        })();
        let func = self.stack.current_function();
        func.label_stack.truncate(mark.0);
        self.stack.pop_block();
        let inner = result?;

        self.pop_loop();
        Ok(vec![Insn::Block {
            label: Some(end),
            result: None,
            body: vec![Insn::Loop {
                label: begin,
                result: None,
                body: inner,
            }],
        }])
    }

    fn repeat_block_stmts(&mut self, body: &Block, req_floor: usize) -> Result<InsnList> {
        // Like `block`, but the caller owns the scope.
        self.block_stmts(&body.statements, &body.ret, req_floor)
    }

    /// Numeric for: hidden `*var`, `*limit`, `*step` plus a while loop with
    /// a step-sign-aware limit comparison. A zero step is a runtime error.
    pub(crate) fn numeric_for(
        &mut self,
        var: &Name,
        usage: &UsageRef,
        exps: &[Expression],
        body: &Block,
    ) -> Result<InsnList> {
        self.stack.push_block();
        let result = self.numeric_for_inner(var, usage, exps, body);
        self.stack.pop_block();
        result
    }

    fn numeric_for_inner(
        &mut self,
        var: &Name,
        usage: &UsageRef,
        exps: &[Expression],
        body: &Block,
    ) -> Result<InsnList> {
        let mut explist = exps.to_vec();
        if explist.len() < 3 {
            explist.push(Expression::Integer(1));
        }
        let hidden = Statement::Local {
            names: vec![Name::new("*var"), Name::new("*limit"), Name::new("*step")],
            usage: vec![read_usage(), read_usage(), read_usage()],
            exps: explist,
        };
        let mut out = self.statement(&hidden)?;

        // `for` with a zero step is an error before the first iteration.
        let step = self.get_var("*step")?;
        out.extend(step);
        out.extend([const_i64(0), new_integer()]);
        out.push(self.rt.call(self.b, RuntimeFn::Equality));
        out.push(self.rt.call(self.b, RuntimeFn::ToBool));
        let error = throw_error_str(self.b, "'for' step is zero");
        out.push(Insn::If {
            result: None,
            then_body: error,
            else_body: vec![],
        });

        // (*step > 0 and *var <= *limit) or (*step < 0 and *var >= *limit)
        let positive = binary(
            BinOperator::LogicAnd,
            binary(
                BinOperator::GreaterThan,
                name_exp("*step"),
                Expression::Integer(0),
            ),
            binary(
                BinOperator::LessOrEqual,
                name_exp("*var"),
                name_exp("*limit"),
            ),
        );
        let negative = binary(
            BinOperator::LogicAnd,
            binary(
                BinOperator::LessThan,
                name_exp("*step"),
                Expression::Integer(0),
            ),
            binary(
                BinOperator::GreaterOrEqual,
                name_exp("*var"),
                name_exp("*limit"),
            ),
        );
        let condition = binary(BinOperator::LogicOr, positive, negative);

        let mut while_body = Block {
            statements: vec![Statement::Local {
                names: vec![var.clone()],
                usage: vec![usage.clone()],
                exps: vec![name_exp("*var")],
            }],
            ret: body.ret.clone(),
        };
        while_body.statements.extend(body.statements.iter().cloned());
        while_body.statements.push(Statement::Assignment {
            targets: vec![PrefixExp::name(Name::new("*var"))],
            values: vec![binary(
                BinOperator::Addition,
                name_exp("*var"),
                name_exp("*step"),
            )],
        });

        out.extend(self.while_statement(&condition, &while_body)?);
        Ok(out)
    }

    /// Generic for, after the reference manual: hidden `*f`, `*s`, `*var`,
    /// then call `*f(*s, *var)` each round, stop on a nil first result.
    pub(crate) fn generic_for(
        &mut self,
        names: &[Name],
        usage: &[UsageRef],
        exps: &[Expression],
        body: &Block,
    ) -> Result<InsnList> {
        self.stack.push_block();
        let result = self.generic_for_inner(names, usage, exps, body);
        self.stack.pop_block();
        result
    }

    fn generic_for_inner(
        &mut self,
        names: &[Name],
        usage: &[UsageRef],
        exps: &[Expression],
        body: &Block,
    ) -> Result<InsnList> {
        let hidden = Statement::Local {
            names: vec![Name::new("*f"), Name::new("*s"), Name::new("*var")],
            usage: vec![read_usage(), read_usage(), read_usage()],
            exps: exps.to_vec(),
        };
        let mut out = self.statement(&hidden)?;

        let (begin, end) = self.push_loop();

        let call = Expression::Prefix(Box::new(PrefixExp {
            head: PrefixHead::Name(Name::new("*f")),
            tail: vec![PrefixTail::Call {
                method: None,
                args: vec![name_exp("*s"), name_exp("*var")],
            }],
        }));
        let rebind = Statement::Local {
            names: names.to_vec(),
            usage: usage.to_vec(),
            exps: vec![call],
        };

        self.stack.push_block();
        let inner_result = (|| -> Result<InsnList> {
            let mut inner = self.statement(&rebind)?;
            inner.extend(self.get_var(&names[0])?);
            inner.push(op(Instruction::RefIsNull));
            inner.push(Insn::BrIf(end.clone()));
            let control = self.get_var(&names[0])?;
            inner.extend(self.set_var("*var", control)?);
            inner.extend(self.block(body)?);
            inner.push(Insn::Br(begin.clone()));
            Ok(inner)
        })();
        self.stack.pop_block();
        let inner = inner_result?;

        self.pop_loop();
        out.push(Insn::Loop {
            label: begin,
            result: None,
            body: vec![Insn::Block {
                label: Some(end),
                result: None,
                body: inner,
            }],
        });
        Ok(out)
    }
}
