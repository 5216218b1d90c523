// Expression lowering. Every expression produces either a single anyref or
// a reference array (calls and `...`); callers narrow with `single` where
// one value is expected.

use wasm_encoder::Instruction;

use crate::ast::*;
use crate::error::{CompileError, Result};
use crate::wasm::types;
use crate::wasm::util::*;
use crate::wasm::{Insn, InsnList};

use super::{Compiler, Value};

impl<'m> Compiler<'m> {
    pub(crate) fn expression(&mut self, exp: &Expression) -> Result<Value> {
        match exp {
            Expression::Nil => Ok(Value::Single(vec![null()])),
            Expression::Boolean(v) => {
                Ok(Value::Single(vec![const_i32(*v as i32), new_boolean()]))
            }
            Expression::Integer(v) => Ok(Value::Single(vec![const_i64(*v), new_integer()])),
            Expression::Number(v) => Ok(Value::Single(vec![const_f64(*v), new_number()])),
            Expression::Literal(bytes) => Ok(Value::Single(add_string(self.b, bytes))),
            Expression::Ellipsis => {
                let offset = self.stack.current_function().vararg_offset;
                match offset {
                    Some(local) => Ok(Value::Multi(vec![local_get(local as u32)])),
                    None => Err(CompileError::semantic(
                        "cannot use '...' outside a vararg function near '...'",
                    )),
                }
            }
            Expression::Function(body) => Ok(Value::Single(self.body_func_ref(body, None)?)),
            Expression::Prefix(prefix) => self.prefix_exp(prefix),
            Expression::Table(fields) => Ok(Value::Single(self.table_constructor(fields)?)),
            Expression::Binary(operation) => Ok(Value::Single(self.bin_operation(operation)?)),
            Expression::Unary(operation) => Ok(Value::Single(self.un_operation(operation)?)),
        }
    }

    /// Evaluate an expression list into one reference array (null for an
    /// empty list). The last expression keeps its full multi-value bundle;
    /// everything before it is narrowed to a single value.
    pub(crate) fn expression_list(&mut self, list: &[Expression]) -> Result<InsnList> {
        if list.is_empty() {
            return Ok(vec![null()]);
        }

        let fixed = &list[..list.len() - 1];
        let last = self.expression(&list[list.len() - 1])?;

        match last {
            Value::Multi(tail) if fixed.is_empty() => Ok(tail),
            Value::Multi(tail) => self.array_with_tail(fixed, tail),
            Value::Single(last_insns) => {
                let mut out = Vec::new();
                for exp in fixed {
                    let value = self.expression(exp)?;
                    out.extend(self.single(value));
                }
                out.extend(last_insns);
                out.push(op(Instruction::ArrayNewFixed {
                    array_type_index: types::REF_ARRAY,
                    array_size: list.len() as u32,
                }));
                Ok(out)
            }
        }
    }

    /// Build `[fixed…, tail…]` where `tail` is a possibly-null bundle.
    fn array_with_tail(&mut self, fixed: &[Expression], tail: InsnList) -> Result<InsnList> {
        let mut out = Vec::new();

        // Left-to-right evaluation: park the fixed values in helpers before
        // the tail runs.
        let mut helpers = Vec::new();
        for exp in fixed {
            let value = self.expression(exp)?;
            let insns = self.single(value);
            let local = self.stack.alloc_helper(types::anyref());
            out.extend(insns);
            out.push(local_set(local as u32));
            helpers.push(local);
        }

        let tail_local = self.stack.alloc_helper(types::ref_array());
        let size = self.stack.alloc_helper(types::size_type());
        let result = self.stack.alloc_helper(types::ref_array());

        out.extend(tail);
        out.push(local_set(tail_local as u32));

        out.extend([
            const_i32(fixed.len() as i32),
            local_get(tail_local as u32),
            op(Instruction::RefIsNull),
            Insn::If {
                result: Some(types::size_type()),
                then_body: vec![const_i32(0)],
                else_body: vec![
                    local_get(tail_local as u32),
                    op(Instruction::ArrayLen),
                ],
            },
            op(Instruction::I32Add),
            local_set(size as u32),
            null(),
            local_get(size as u32),
            op(Instruction::ArrayNew(types::REF_ARRAY)),
            local_set(result as u32),
        ]);
        for (i, helper) in helpers.iter().enumerate() {
            out.extend([
                local_get(result as u32),
                const_i32(i as i32),
                local_get(*helper as u32),
                op(Instruction::ArraySet(types::REF_ARRAY)),
            ]);
        }
        out.extend([
            local_get(tail_local as u32),
            op(Instruction::RefIsNull),
            op(Instruction::I32Eqz),
            Insn::If {
                result: None,
                then_body: vec![
                    local_get(result as u32),
                    const_i32(fixed.len() as i32),
                    local_get(tail_local as u32),
                    const_i32(0),
                    local_get(tail_local as u32),
                    op(Instruction::ArrayLen),
                    op(Instruction::ArrayCopy {
                        array_type_index_dst: types::REF_ARRAY,
                        array_type_index_src: types::REF_ARRAY,
                    }),
                ],
                else_body: vec![],
            },
            local_get(result as u32),
        ]);

        self.stack.free_local(result);
        self.stack.free_local(size);
        self.stack.free_local(tail_local);
        for helper in helpers {
            self.stack.free_local(helper);
        }
        Ok(out)
    }

    /// Build a fixed reference array from already-lowered single values.
    pub(crate) fn make_ref_array(&mut self, items: Vec<InsnList>) -> InsnList {
        if items.is_empty() {
            return vec![null()];
        }
        let size = items.len() as u32;
        let mut out = Vec::new();
        for item in items {
            out.extend(item);
        }
        out.push(op(Instruction::ArrayNewFixed {
            array_type_index: types::REF_ARRAY,
            array_size: size,
        }));
        out
    }
}
