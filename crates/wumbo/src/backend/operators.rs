// Binary and unary operator lowering. `and`/`or` short-circuit in place;
// everything else calls its runtime helper.

use crate::ast::*;
use crate::error::{CompileError, Result};
use crate::runtime::RuntimeFn;
use crate::wasm::types;
use crate::wasm::util::*;
use crate::wasm::{Insn, InsnList};

use super::Compiler;

impl<'m> Compiler<'m> {
    pub(crate) fn bin_operation(&mut self, operation: &BinOperation) -> Result<InsnList> {
        let lhs_value = self.expression(&operation.lhs)?;
        let lhs = self.single(lhs_value);

        match operation.op {
            BinOperator::LogicAnd => {
                let left = self.stack.alloc_helper(types::anyref());
                let mut out = lhs;
                out.push(local_tee(left as u32));
                out.push(self.rt.call(self.b, RuntimeFn::ToBool));
                let rhs_value = self.expression(&operation.rhs)?;
                let rhs = self.single(rhs_value);
                out.push(Insn::If {
                    result: Some(types::anyref()),
                    then_body: rhs,
                    else_body: vec![local_get(left as u32)],
                });
                self.stack.free_local(left);
                return Ok(out);
            }
            BinOperator::LogicOr => {
                let left = self.stack.alloc_helper(types::anyref());
                let mut out = lhs;
                out.push(local_tee(left as u32));
                out.push(self.rt.call(self.b, RuntimeFn::ToBool));
                let rhs_value = self.expression(&operation.rhs)?;
                let rhs = self.single(rhs_value);
                out.push(Insn::If {
                    result: Some(types::anyref()),
                    then_body: vec![local_get(left as u32)],
                    else_body: rhs,
                });
                self.stack.free_local(left);
                return Ok(out);
            }
            _ => {}
        }

        let rhs_value = self.expression(&operation.rhs)?;
        let rhs = self.single(rhs_value);

        let helper = match operation.op {
            BinOperator::Addition => RuntimeFn::Addition,
            BinOperator::Subtraction => RuntimeFn::Subtraction,
            BinOperator::Multiplication => RuntimeFn::Multiplication,
            BinOperator::Division => RuntimeFn::Division,
            BinOperator::DivisionFloor => RuntimeFn::DivisionFloor,
            BinOperator::Exponentiation => RuntimeFn::Exponentiation,
            BinOperator::Modulo => RuntimeFn::Modulo,
            BinOperator::BinaryOr => RuntimeFn::BinaryOr,
            BinOperator::BinaryAnd => RuntimeFn::BinaryAnd,
            BinOperator::BinaryXor => RuntimeFn::BinaryXor,
            BinOperator::BinaryRightShift => RuntimeFn::BinaryRightShift,
            BinOperator::BinaryLeftShift => RuntimeFn::BinaryLeftShift,
            BinOperator::Equality => RuntimeFn::Equality,
            BinOperator::Inequality => RuntimeFn::Inequality,
            BinOperator::LessThan => RuntimeFn::LessThan,
            BinOperator::GreaterThan => RuntimeFn::GreaterThan,
            BinOperator::LessOrEqual => RuntimeFn::LessOrEqual,
            BinOperator::GreaterOrEqual => RuntimeFn::GreaterOrEqual,
            BinOperator::Concat => RuntimeFn::Concat,
            BinOperator::LogicAnd | BinOperator::LogicOr => {
                return Err(CompileError::semantic("unknown operator"));
            }
        };

        let mut out = lhs;
        out.extend(rhs);
        out.push(self.rt.call(self.b, helper));
        Ok(out)
    }

    pub(crate) fn un_operation(&mut self, operation: &UnOperation) -> Result<InsnList> {
        let value = self.expression(&operation.rhs)?;
        let mut out = self.single(value);
        let helper = match operation.op {
            UnOperator::Minus => RuntimeFn::Minus,
            UnOperator::LogicNot => RuntimeFn::LogicNot,
            UnOperator::Len => RuntimeFn::Len,
            UnOperator::BinaryNot => RuntimeFn::BinaryNot,
        };
        out.push(self.rt.call(self.b, helper));
        Ok(out)
    }
}
