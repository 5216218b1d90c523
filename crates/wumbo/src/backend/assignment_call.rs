// Prefix-expression chains, assignments, call statements and function
// definition statements.

use wasm_encoder::Instruction;

use crate::ast::*;
use crate::error::{CompileError, Result};
use crate::runtime::RuntimeFn;
use crate::wasm::types;
use crate::wasm::util::*;
use crate::wasm::{Insn, InsnList};

use super::{Compiler, Value};

impl<'m> Compiler<'m> {
    /// `invoke(f, args)`; both operand lists must already be lowered.
    pub(crate) fn call_insns(&mut self, function: InsnList, args: InsnList) -> InsnList {
        let mut out = function;
        out.extend(args);
        out.push(self.rt.call(self.b, RuntimeFn::Invoke));
        out
    }

    fn prefix_head(&mut self, head: &PrefixHead) -> Result<InsnList> {
        match head {
            PrefixHead::Name(name) => self.get_var(name),
            // Parentheses truncate a multi-value bundle to one value.
            PrefixHead::Paren(exp) => {
                let value = self.expression(exp)?;
                Ok(self.single(value))
            }
        }
    }

    /// Apply one tail step to a single-valued prefix.
    fn apply_tail(&mut self, tail: &PrefixTail, current: InsnList) -> Result<Value> {
        match tail {
            PrefixTail::Field(name) => {
                let key = add_string(self.b, name.as_bytes());
                Ok(Value::Single(self.table_get(current, key)))
            }
            PrefixTail::Index(exp) => {
                let value = self.expression(exp)?;
                let key = self.single(value);
                Ok(Value::Single(self.table_get(current, key)))
            }
            PrefixTail::Call { method, args } => {
                let (function, mut arg_items) = match method {
                    Some(name) => {
                        // obj:m(...) loads obj[m] and passes obj first.
                        let receiver = self.stack.alloc_helper(types::anyref());
                        let mut obj = current;
                        obj.push(local_tee(receiver as u32));
                        let key = add_string(self.b, name.as_bytes());
                        let function = self.table_get(obj, key);
                        self.stack.free_local(receiver);
                        (function, vec![vec![local_get(receiver as u32)]])
                    }
                    None => (current, Vec::new()),
                };

                // Argument list: the last argument keeps its full bundle.
                if args.is_empty() {
                    let array = self.make_ref_array(arg_items);
                    return Ok(Value::Multi(self.call_insns(function, array)));
                }
                let fixed = &args[..args.len() - 1];
                for exp in fixed {
                    let value = self.expression(exp)?;
                    let insns = self.single(value);
                    arg_items.push(insns);
                }
                let last = self.expression(&args[args.len() - 1])?;
                let array = match last {
                    Value::Single(insns) => {
                        arg_items.push(insns);
                        self.make_ref_array(arg_items)
                    }
                    Value::Multi(tail) => {
                        if arg_items.is_empty() {
                            tail
                        } else {
                            self.items_with_tail(arg_items, tail)
                        }
                    }
                };
                Ok(Value::Multi(self.call_insns(function, array)))
            }
        }
    }

    /// Glue already-lowered single values in front of a multi-value bundle.
    fn items_with_tail(&mut self, items: Vec<InsnList>, tail: InsnList) -> InsnList {
        let mut helpers = Vec::new();
        let mut out = Vec::new();
        for item in items {
            let local = self.stack.alloc_helper(types::anyref());
            out.extend(item);
            out.push(local_set(local as u32));
            helpers.push(local);
        }
        let tail_local = self.stack.alloc_helper(types::ref_array());
        let size = self.stack.alloc_helper(types::size_type());
        let result = self.stack.alloc_helper(types::ref_array());

        out.extend(tail);
        out.push(local_set(tail_local as u32));
        out.extend([
            const_i32(helpers.len() as i32),
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
                    const_i32(helpers.len() as i32),
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
        out
    }

    pub(crate) fn prefix_exp(&mut self, prefix: &PrefixExp) -> Result<Value> {
        let mut current = Value::Single(self.prefix_head(&prefix.head)?);
        for tail in &prefix.tail {
            let narrowed = self.single(current);
            current = self.apply_tail(tail, narrowed)?;
        }
        Ok(current)
    }

    pub(crate) fn call_statement(&mut self, prefix: &PrefixExp) -> Result<InsnList> {
        match self.prefix_exp(prefix)? {
            Value::Multi(mut insns) => {
                insns.push(op(Instruction::Drop));
                Ok(insns)
            }
            Value::Single(_) => Err(CompileError::semantic("syntax error: not a call")),
        }
    }

    pub(crate) fn assignments(
        &mut self,
        targets: &[PrefixExp],
        values: &[Expression],
    ) -> Result<InsnList> {
        let local = self.stack.alloc_helper(types::ref_array());
        let mut out = self.expression_list(values)?;
        out.push(local_set(local as u32));

        for (i, target) in targets.iter().enumerate() {
            let value = self.at_or_null(local as u32, i as u32, None);
            if target.tail.is_empty() {
                match &target.head {
                    PrefixHead::Name(name) => out.extend(self.set_var(name, value)?),
                    PrefixHead::Paren(_) => {
                        return Err(CompileError::semantic("cannot assign to this expression"));
                    }
                }
                continue;
            }

            let mut obj = self.prefix_head(&target.head)?;
            for tail in &target.tail[..target.tail.len() - 1] {
                let next = self.apply_tail(tail, obj)?;
                obj = self.single(next);
            }
            match target.tail.last() {
                Some(PrefixTail::Field(name)) => {
                    let key = add_string(self.b, name.as_bytes());
                    out.extend(self.table_set(obj, key, value));
                }
                Some(PrefixTail::Index(exp)) => {
                    let key_value = self.expression(exp)?;
                    let key = self.single(key_value);
                    out.extend(self.table_set(obj, key, value));
                }
                _ => {
                    return Err(CompileError::semantic("cannot assign to a call"));
                }
            }
        }

        self.stack.free_local(local);
        Ok(out)
    }

    /// `function a.b.c(…)` / `function a:m(…)`
    pub(crate) fn function_statement(
        &mut self,
        path: &[Name],
        body: &FunctionBody,
    ) -> Result<InsnList> {
        let last = path.last().expect("function name path is never empty");
        let closure = self.body_func_ref(body, Some(last.as_str()))?;
        if path.len() == 1 {
            return self.set_var(&path[0], closure);
        }
        let mut table = self.get_var(&path[0])?;
        for name in &path[1..path.len() - 1] {
            let key = add_string(self.b, name.as_bytes());
            table = self.table_get(table, key);
        }
        let key = add_string(self.b, last.as_bytes());
        Ok(self.table_set(table, key, closure))
    }
}
