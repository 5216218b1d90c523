// Local variable and local function statements.

use wasm_encoder::Instruction;

use crate::ast::*;
use crate::error::Result;
use crate::wasm::types;
use crate::wasm::util::*;
use crate::wasm::InsnList;

use super::Compiler;

impl<'m> Compiler<'m> {
    pub(crate) fn local_variables(
        &mut self,
        names: &[Name],
        usage: &[UsageRef],
        exps: &[Expression],
    ) -> Result<InsnList> {
        let list = self.expression_list(exps)?;
        let local = self.stack.alloc_helper(types::ref_array());
        let mut out = list;
        out.push(local_set(local as u32));
        out.extend(self.unpack_locals(names, usage, local as u32, false));
        self.stack.free_local(local);
        Ok(out)
    }

    /// `local function f` — the binding is visible inside the body, so a
    /// captured `f` gets its cell before the closure is built and the
    /// closure lands inside that same cell.
    pub(crate) fn local_function(
        &mut self,
        name: &Name,
        usage: &UsageRef,
        body: &FunctionBody,
    ) -> Result<InsnList> {
        let is_cell = usage.borrow().is_upvalue();
        let ty = if is_cell {
            types::upvalue()
        } else {
            types::anyref()
        };
        let index = self.stack.alloc_lua_local(name, ty) as u32;

        if is_cell {
            let mut out = vec![
                op(Instruction::StructNewDefault(types::UPVALUE)),
                local_set(index),
                local_get(index),
            ];
            out.extend(self.body_func_ref(body, Some(name.as_str()))?);
            out.push(Self::struct_set(types::UPVALUE, 0));
            Ok(out)
        } else {
            let mut out = self.body_func_ref(body, Some(name.as_str()))?;
            out.push(local_set(index));
            Ok(out)
        }
    }
}
