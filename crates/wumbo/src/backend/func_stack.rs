// Code-generation-time bookkeeping: nested function frames, block scopes,
// a pooled list of wasm locals per frame, loop and goto/label stacks, and
// the requested-upvalue lists that fix each closure's upvalue-array layout.

use smol_str::SmolStr;
use wasm_encoder::ValType;

use crate::ast::Name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Local,
    Upvalue,
    Global,
}

pub struct LocalVar {
    /// Names of every binding that has occupied this slot, concatenated;
    /// `name_offset` is the length of the current one.
    name: String,
    name_offset: usize,
    pub ty: ValType,
    used: bool,
    helper: bool,
}

impl LocalVar {
    pub fn current_name(&self) -> &str {
        &self.name[self.name.len() - self.name_offset..]
    }
}

/// A pending `goto` waiting for its label.
#[derive(Debug, Clone)]
pub struct LabelRequest {
    pub name: Name,
    /// The wasm block label the goto already branched to.
    pub wasm_label: SmolStr,
}

#[derive(Debug, Clone)]
pub struct LabelEntry {
    pub name: Name,
    /// The wasm loop label a backward goto branches to, if any.
    pub wasm_label: Option<SmolStr>,
}

#[derive(Default)]
pub struct FunctionInfo {
    pub offset: usize,
    pub arg_count: usize,
    /// Local index of the reference array holding `...`.
    pub vararg_offset: Option<usize>,
    /// Base names of the loops currently open; `<name>_begin` / `<name>_end`.
    pub loop_stack: Vec<SmolStr>,
    pub label_stack: Vec<LabelEntry>,
    pub request_label_stack: Vec<LabelRequest>,
}

#[derive(Default)]
pub struct FunctionStack {
    pub blocks: Vec<usize>,
    pub functions: Vec<FunctionInfo>,
    /// Per-frame list of requested enclosing-var indices; the position in
    /// the list is the closure's upvalue-array slot.
    pub upvalues: Vec<Vec<usize>>,
    pub vars: Vec<LocalVar>,
}

impl FunctionStack {
    pub fn push_block(&mut self) {
        self.blocks.push(self.vars.len());
    }

    /// Leaving a block releases its Lua locals' slots for reuse.
    pub fn pop_block(&mut self) {
        let mark = self.blocks.pop().unwrap_or(0);
        for var in &mut self.vars[mark..] {
            if !var.helper {
                var.used = false;
            }
        }
    }

    pub fn push_function(&mut self, arg_count: usize, vararg_offset: Option<usize>) {
        self.upvalues.push(Vec::new());
        self.functions.push(FunctionInfo {
            offset: self.vars.len(),
            arg_count,
            vararg_offset,
            ..FunctionInfo::default()
        });
    }

    /// Drop the innermost frame, returning its requested upvalues.
    pub fn pop_function(&mut self) -> Vec<usize> {
        let func = self.functions.pop().expect("frame underflow");
        self.vars.truncate(func.offset);
        self.upvalues.pop().expect("frame underflow")
    }

    pub fn current_function(&mut self) -> &mut FunctionInfo {
        self.functions.last_mut().expect("no current function")
    }

    pub fn local_offset(&self, index: usize) -> usize {
        let func = self.functions.last().expect("no current function");
        func.arg_count + (index - func.offset)
    }

    pub fn is_index_local(&self, index: usize) -> bool {
        let func = self.functions.last().expect("no current function");
        index >= func.offset
    }

    pub fn free_local(&mut self, pos: usize) {
        let func = self.functions.last().expect("no current function");
        self.vars[(pos - func.arg_count) + func.offset].used = false;
    }

    /// Allocate a wasm local of `ty`, reusing a free slot of the same type
    /// when one exists. Returns the local index.
    pub fn alloc_local(&mut self, ty: ValType, name: &str, helper: bool) -> usize {
        let offset = self.functions.last().expect("no current function").offset;
        for i in offset..self.vars.len() {
            let var = &mut self.vars[i];
            if var.ty == ty && !var.used {
                var.name.push_str(name);
                var.name_offset = name.len();
                var.used = true;
                var.helper = helper;
                return self.local_offset(i);
            }
        }
        self.vars.push(LocalVar {
            name: name.to_string(),
            name_offset: name.len(),
            ty,
            used: true,
            helper,
        });
        self.local_offset(self.vars.len() - 1)
    }

    pub fn alloc_helper(&mut self, ty: ValType) -> usize {
        self.alloc_local(ty, "", true)
    }

    pub fn alloc_lua_local(&mut self, name: &str, ty: ValType) -> usize {
        self.alloc_local(ty, name, false)
    }

    /// Resolve a name against the live Lua locals of every frame.
    /// `Local` carries the local index; `Upvalue` the raw var index.
    pub fn find(&self, var_name: &str) -> (VarType, usize, ValType) {
        for (pos, var) in self.vars.iter().enumerate().rev() {
            if !var.helper && var.used && var.current_name() == var_name {
                if self.is_index_local(pos) {
                    return (VarType::Local, self.local_offset(pos), var.ty);
                }
                return (VarType::Upvalue, pos, var.ty);
            }
        }
        (VarType::Global, 0, ValType::I32)
    }

    /// Wasm local declarations of the current frame, in slot order.
    pub fn local_types(&self) -> Vec<ValType> {
        let offset = self.functions.last().expect("no current function").offset;
        self.vars[offset..].iter().map(|v| v.ty).collect()
    }

    /// Debug names for the current frame's named locals.
    pub fn local_names(&self) -> Vec<(u32, SmolStr)> {
        let offset = self.functions.last().expect("no current function").offset;
        self.vars[offset..]
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.current_name().is_empty())
            .map(|(i, v)| {
                (
                    self.local_offset(offset + i) as u32,
                    SmolStr::new(v.current_name()),
                )
            })
            .collect()
    }
}
