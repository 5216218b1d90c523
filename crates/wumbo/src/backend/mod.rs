// Code generator: a recursive walk of the analysed AST producing typed
// WebAssembly instruction lists against the runtime value model.

mod assignment_call;
mod basic_lib;
mod expression;
mod func_stack;
mod locals;
mod loops;
mod operators;
mod table;

use smol_str::SmolStr;
use wasm_encoder::Instruction;

use crate::ast::*;
use crate::error::{CompileError, Result};
use crate::runtime::{Runtime, RuntimeFn};
use crate::wasm::types;
use crate::wasm::util::*;
use crate::wasm::{FuncId, Insn, InsnList, ModuleBuilder};

pub use func_stack::{FunctionStack, VarType};
use func_stack::{LabelEntry, LabelRequest};

/// Every Lua function takes (upvalue-array, arg-array).
pub const UPVALUE_INDEX: u32 = 0;
pub const ARGS_INDEX: u32 = 1;
pub const FUNC_ARG_COUNT: usize = 2;

/// Result of lowering an expression: either a single Lua value or a
/// reference array carrying a multi-value bundle.
pub enum Value {
    Single(InsnList),
    Multi(InsnList),
}

pub struct Compiler<'m> {
    pub(crate) b: &'m mut ModuleBuilder,
    pub(crate) rt: &'m mut Runtime,
    pub(crate) stack: FunctionStack,
    function_name: usize,
}

struct BlockMark {
    label_len: usize,
    req_len: usize,
}

impl<'m> Compiler<'m> {
    pub fn new(b: &'m mut ModuleBuilder, rt: &'m mut Runtime) -> Self {
        Compiler {
            b,
            rt,
            stack: FunctionStack::default(),
            function_name: 0,
        }
    }

    pub(crate) fn struct_get(ty: u32, field: u32) -> Insn {
        op(Instruction::StructGet {
            struct_type_index: ty,
            field_index: field,
        })
    }

    pub(crate) fn struct_set(ty: u32, field: u32) -> Insn {
        op(Instruction::StructSet {
            struct_type_index: ty,
            field_index: field,
        })
    }

    /// Narrow a value to a single Lua value: a multi-value bundle becomes
    /// its first element (or nil when empty).
    pub(crate) fn single(&mut self, value: Value) -> InsnList {
        match value {
            Value::Single(insns) => insns,
            Value::Multi(insns) => {
                let local = self.stack.alloc_helper(types::ref_array());
                let out = self.at_or_null(local as u32, 0, Some(insns));
                self.stack.free_local(local);
                out
            }
        }
    }

    /// `array[index]`, or nil when the array is null or too short.
    /// `pre` optionally stores a freshly computed array into the local first.
    pub(crate) fn at_or_null(
        &mut self,
        array_local: u32,
        index: u32,
        pre: Option<InsnList>,
    ) -> InsnList {
        let mut out = Vec::new();
        match pre {
            Some(insns) => {
                out.extend(insns);
                out.push(local_tee(array_local));
            }
            None => out.push(local_get(array_local)),
        }
        out.push(op(Instruction::RefIsNull));
        out.push(Insn::If {
            result: Some(types::anyref()),
            then_body: vec![null()],
            else_body: vec![
                local_get(array_local),
                op(Instruction::ArrayLen),
                const_i32(index as i32),
                op(Instruction::I32GtU),
                Insn::If {
                    result: Some(types::anyref()),
                    then_body: vec![
                        local_get(array_local),
                        const_i32(index as i32),
                        op(Instruction::ArrayGet(types::REF_ARRAY)),
                    ],
                    else_body: vec![null()],
                },
            ],
        });
        out
    }

    /// Slot of `index` (a var of an enclosing frame) in the current frame's
    /// upvalue array, appending a new request on first sight.
    pub(crate) fn get_upvalue(&mut self, index: usize) -> InsnList {
        let ups = self.stack.upvalues.last_mut().expect("no current frame");
        let slot = match ups.iter().position(|&i| i == index) {
            Some(pos) => pos,
            None => {
                ups.push(index);
                ups.len() - 1
            }
        };
        vec![
            local_get(UPVALUE_INDEX),
            const_i32(slot as i32),
            op(Instruction::ArrayGet(types::UPVALUE_ARRAY)),
        ]
    }

    pub(crate) fn get_var(&mut self, name: &str) -> Result<InsnList> {
        let (kind, index, ty) = self.stack.find(name);
        match kind {
            VarType::Local => {
                if ty == types::upvalue() {
                    Ok(vec![
                        local_get(index as u32),
                        Self::struct_get(types::UPVALUE, 0),
                    ])
                } else {
                    Ok(vec![local_get(index as u32)])
                }
            }
            VarType::Upvalue => {
                let mut out = self.get_upvalue(index);
                out.push(Self::struct_get(types::UPVALUE, 0));
                Ok(out)
            }
            VarType::Global => {
                if name == "_ENV" {
                    return Err(CompileError::semantic("no environment set"));
                }
                let mut out = self.get_var("_ENV")?;
                out.extend(add_string(self.b, name.as_bytes()));
                out.push(self.rt.call(self.b, RuntimeFn::TableGet));
                Ok(out)
            }
        }
    }

    pub(crate) fn set_var(&mut self, name: &str, value: InsnList) -> Result<InsnList> {
        let (kind, index, ty) = self.stack.find(name);
        match kind {
            VarType::Local => {
                if ty == types::upvalue() {
                    let mut out = vec![local_get(index as u32)];
                    out.extend(value);
                    out.push(Self::struct_set(types::UPVALUE, 0));
                    Ok(out)
                } else {
                    let mut out = value;
                    out.push(local_set(index as u32));
                    Ok(out)
                }
            }
            VarType::Upvalue => {
                let mut out = self.get_upvalue(index);
                out.extend(value);
                out.push(Self::struct_set(types::UPVALUE, 0));
                Ok(out)
            }
            VarType::Global => {
                let mut out = self.get_var("_ENV")?;
                out.extend(add_string(self.b, name.as_bytes()));
                out.extend(value);
                out.push(self.rt.call(self.b, RuntimeFn::TableSet));
                Ok(out)
            }
        }
    }

    /// Bind `names` from the reference array held in local `src`: allocate
    /// a slot (or upvalue cell) per name and unpack the available elements
    /// with a branch table on the array length.
    pub(crate) fn unpack_locals(
        &mut self,
        names: &[Name],
        usages: &[UsageRef],
        src: u32,
        vararg: bool,
    ) -> InsnList {
        let mut out = Vec::new();
        if names.is_empty() {
            if vararg {
                self.stack.current_function().vararg_offset = Some(src as usize);
            }
            return out;
        }

        let mut slots = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let cell = usages.get(i).is_some_and(|u| u.borrow().is_upvalue());
            let ty = if cell {
                types::upvalue()
            } else {
                types::anyref()
            };
            let idx = self.stack.alloc_lua_local(name, ty);
            if cell {
                out.push(op(Instruction::StructNewDefault(types::UPVALUE)));
                out.push(local_set(idx as u32));
            }
            slots.push((idx as u32, cell));
        }

        let none_label = self.b.fresh_label("none");
        let param_labels: Vec<SmolStr> =
            names.iter().map(|n| self.b.fresh_label(n)).collect();

        let mut targets = vec![none_label.clone()];
        let (default, vararg_label) = if vararg {
            targets.extend(param_labels.iter().cloned());
            let label = self.b.fresh_label("vararg");
            (label.clone(), Some(label))
        } else {
            targets.extend(param_labels[..param_labels.len() - 1].iter().cloned());
            (param_labels[param_labels.len() - 1].clone(), None)
        };

        let mut inner = vec![
            local_get(src),
            Insn::BrOnNull(none_label.clone()),
            op(Instruction::ArrayLen),
            Insn::BrTable { targets, default },
        ];

        if let Some(label) = vararg_label {
            let va = self.stack.alloc_lua_local("...", types::ref_array());
            self.stack.current_function().vararg_offset = Some(va);
            let size = self.stack.alloc_helper(types::size_type());
            inner = vec![Insn::Block {
                label: Some(label),
                result: None,
                body: inner,
            }];
            inner.extend([
                null(),
                local_get(src),
                op(Instruction::ArrayLen),
                const_i32(names.len() as i32),
                op(Instruction::I32Sub),
                local_tee(size as u32),
                op(Instruction::ArrayNew(types::REF_ARRAY)),
                local_tee(va as u32),
                const_i32(0),
                local_get(src),
                const_i32(names.len() as i32),
                local_get(size as u32),
                op(Instruction::ArrayCopy {
                    array_type_index_dst: types::REF_ARRAY,
                    array_type_index_src: types::REF_ARRAY,
                }),
            ]);
            self.stack.free_local(size);
        }

        for j in (0..names.len()).rev() {
            let mut next = vec![Insn::Block {
                label: Some(param_labels[j].clone()),
                result: None,
                body: inner,
            }];
            let (slot, cell) = slots[j];
            if cell {
                next.extend([
                    local_get(slot),
                    local_get(src),
                    const_i32(j as i32),
                    op(Instruction::ArrayGet(types::REF_ARRAY)),
                    Self::struct_set(types::UPVALUE, 0),
                ]);
            } else {
                next.extend([
                    local_get(src),
                    const_i32(j as i32),
                    op(Instruction::ArrayGet(types::REF_ARRAY)),
                    local_set(slot),
                ]);
            }
            inner = next;
        }

        out.push(Insn::Block {
            label: Some(none_label),
            result: None,
            body: inner,
        });
        out
    }

    /// Compile a Lua function; returns its id and the upvalues it requested
    /// from the frame that is current when this call returns.
    pub(crate) fn add_func<F>(
        &mut self,
        name: &str,
        params: &[Name],
        usages: &[UsageRef],
        vararg: bool,
        f: F,
    ) -> Result<(FuncId, Vec<usize>)>
    where
        F: FnOnce(&mut Self) -> Result<InsnList>,
    {
        self.stack.push_function(FUNC_ARG_COUNT, None);
        let mut body = self.unpack_locals(params, usages, ARGS_INDEX, vararg);
        body.extend(f(self)?);
        body.push(null());
        body.push(op(Instruction::Return));

        if let Some(req) = self.stack.current_function().request_label_stack.first() {
            return Err(CompileError::semantic(format!(
                "no visible label '{}' for goto",
                req.name
            )));
        }

        let locals = self.stack.local_types();
        let mut local_names = vec![
            (UPVALUE_INDEX, SmolStr::new("upvalues")),
            (ARGS_INDEX, SmolStr::new("args")),
        ];
        local_names.extend(self.stack.local_names());
        let id = self
            .b
            .add_func_with_type(name, types::LUA_FUNCTION, locals, local_names, body);
        let ups = self.stack.pop_function();
        Ok((id, ups))
    }

    /// Collect the cells for a freshly compiled closure. A captured plain
    /// local is promoted to a cell here; an existing cell is shared; an
    /// outer upvalue is forwarded.
    pub(crate) fn gather_upvalues(&mut self, requested: &[usize]) -> InsnList {
        let mut out = Vec::new();
        for &index in requested {
            if self.stack.is_index_local(index) {
                let ty = self.stack.vars[index].ty;
                let local = self.stack.local_offset(index) as u32;
                if ty == types::upvalue() {
                    out.push(local_get(local));
                } else {
                    let name = self.stack.vars[index].current_name().to_string();
                    let cell = self.stack.alloc_lua_local(&name, types::upvalue()) as u32;
                    out.extend([
                        local_get(local),
                        op(Instruction::StructNew(types::UPVALUE)),
                        local_tee(cell),
                    ]);
                }
            } else {
                out.extend(self.get_upvalue(index));
            }
        }
        out
    }

    /// Compile a function body and produce the closure value.
    pub(crate) fn add_func_ref<F>(
        &mut self,
        name: &str,
        params: &[Name],
        usages: &[UsageRef],
        vararg: bool,
        f: F,
    ) -> Result<InsnList>
    where
        F: FnOnce(&mut Self) -> Result<InsnList>,
    {
        let (id, requested) = self.add_func(name, params, usages, vararg, f)?;
        let mut out = vec![Insn::RefFunc(id)];
        if requested.is_empty() {
            out.push(null());
        } else {
            out.extend(self.gather_upvalues(&requested));
            out.push(op(Instruction::ArrayNewFixed {
                array_type_index: types::UPVALUE_ARRAY,
                array_size: requested.len() as u32,
            }));
        }
        out.push(op(Instruction::StructNew(types::FUNCTION)));
        Ok(out)
    }

    pub(crate) fn body_func_ref(&mut self, body: &FunctionBody, name: Option<&str>) -> Result<InsnList> {
        let generated;
        let name = match name {
            Some(name) => name,
            None => {
                let mut buffer = itoa::Buffer::new();
                generated = buffer.format(self.function_name).to_string();
                self.function_name += 1;
                &generated
            }
        };
        self.add_func_ref(name, &body.params, &body.usage, body.vararg, |c| {
            c.block(&body.block)
        })
    }

    /// Compile a block: opens a scope, handles labels, emits statements and
    /// the optional trailing return.
    pub(crate) fn block(&mut self, block: &Block) -> Result<InsnList> {
        self.stack.push_block();
        let mark = {
            let func = self.stack.current_function();
            BlockMark {
                label_len: func.label_stack.len(),
                req_len: func.request_label_stack.len(),
            }
        };
        let result = self.block_stmts(&block.statements, &block.ret, mark.req_len);
        let func = self.stack.current_function();
        func.label_stack.truncate(mark.label_len);
        self.stack.pop_block();
        result
    }

    pub(crate) fn block_stmts(
        &mut self,
        stmts: &[Statement],
        ret: &Option<Vec<Expression>>,
        req_floor: usize,
    ) -> Result<InsnList> {
        let mut out = Vec::new();
        for (i, statement) in stmts.iter().enumerate() {
            if let Statement::Label(name) = statement {
                if self
                    .stack
                    .current_function()
                    .label_stack
                    .iter()
                    .any(|l| l.name == *name)
                {
                    return Err(CompileError::semantic(format!(
                        "label '{}' already defined",
                        name
                    )));
                }

                // Forward gotos from this block (or blocks nested in it)
                // land here: close their block around everything so far.
                let resolved = {
                    let func = self.stack.current_function();
                    let mut resolved = Vec::new();
                    let mut j = req_floor;
                    while j < func.request_label_stack.len() {
                        if func.request_label_stack[j].name == *name {
                            resolved.push(func.request_label_stack.remove(j));
                        } else {
                            j += 1;
                        }
                    }
                    resolved
                };
                for req in resolved {
                    out = vec![Insn::Block {
                        label: Some(req.wasm_label),
                        result: None,
                        body: out,
                    }];
                }

                // A later goto jumping back here needs a loop spanning the
                // rest of the block.
                if stmts[i + 1..].iter().any(|s| contains_goto(s, name)) {
                    let back = self.b.fresh_label(name);
                    self.stack.current_function().label_stack.push(LabelEntry {
                        name: name.clone(),
                        wasm_label: Some(back.clone()),
                    });
                    let rest = self.block_stmts(&stmts[i + 1..], ret, req_floor)?;
                    out.push(Insn::Loop {
                        label: back,
                        result: None,
                        body: rest,
                    });
                    return Ok(out);
                }
                self.stack.current_function().label_stack.push(LabelEntry {
                    name: name.clone(),
                    wasm_label: None,
                });
                continue;
            }
            out.extend(self.statement(statement)?);
        }
        if let Some(exps) = ret {
            out.extend(self.expression_list(exps)?);
            out.push(op(Instruction::Return));
        }
        Ok(out)
    }

    pub(crate) fn statement(&mut self, statement: &Statement) -> Result<InsnList> {
        match statement {
            Statement::Assignment { targets, values } => self.assignments(targets, values),
            Statement::Call(prefix) => self.call_statement(prefix),
            Statement::Label(_) => Ok(Vec::new()),
            Statement::Break => self.break_statement(),
            Statement::Goto(name) => self.goto_statement(name),
            Statement::Do(inner) => self.block(inner),
            Statement::While { condition, body } => self.while_statement(condition, body),
            Statement::Repeat { body, condition } => self.repeat_statement(body, condition),
            Statement::If { arms, else_block } => self.if_statement(arms, else_block.as_ref()),
            Statement::NumericFor {
                var,
                usage,
                exps,
                body,
            } => self.numeric_for(var, usage, exps, body),
            Statement::GenericFor {
                names,
                usage,
                exps,
                body,
            } => self.generic_for(names, usage, exps, body),
            Statement::Function { path, body } => self.function_statement(path, body),
            Statement::LocalFunction { name, usage, body } => {
                self.local_function(name, usage, body)
            }
            Statement::Local { names, usage, exps } => self.local_variables(names, usage, exps),
        }
    }

    fn goto_statement(&mut self, name: &Name) -> Result<InsnList> {
        let backward = self
            .stack
            .current_function()
            .label_stack
            .iter()
            .rev()
            .find(|l| l.name == *name)
            .cloned();
        if let Some(entry) = backward {
            return match entry.wasm_label {
                Some(label) => Ok(vec![Insn::Br(label)]),
                None => Err(CompileError::semantic(format!(
                    "cannot jump backwards to label '{}'",
                    name
                ))),
            };
        }

        let pending = self
            .stack
            .current_function()
            .request_label_stack
            .iter()
            .find(|r| r.name == *name)
            .map(|r| r.wasm_label.clone());
        let label = match pending {
            Some(label) => label,
            None => {
                let label = self.b.fresh_label(name);
                self.stack
                    .current_function()
                    .request_label_stack
                    .push(LabelRequest {
                        name: name.clone(),
                        wasm_label: label.clone(),
                    });
                label
            }
        };
        Ok(vec![Insn::Br(label)])
    }

    fn if_statement(
        &mut self,
        arms: &[(Expression, Block)],
        else_block: Option<&Block>,
    ) -> Result<InsnList> {
        let Some((condition, body)) = arms.first() else {
            return match else_block {
                Some(block) => self.block(block),
                None => Ok(Vec::new()),
            };
        };
        let value = self.expression(condition)?;
        let mut out = self.single(value);
        out.push(self.rt.call(self.b, RuntimeFn::ToBool));
        let then_body = self.block(body)?;
        let else_body = self.if_statement(&arms[1..], else_block)?;
        out.push(Insn::If {
            result: None,
            then_body,
            else_body,
        });
        Ok(out)
    }

    /// Wrap the chunk: install `_ENV`, open the basic library, build and run
    /// the `*init` closure, and export `start`. In standalone mode uncaught
    /// Lua errors become a nop at the module boundary; in minimal mode they
    /// propagate to the host.
    pub fn convert(&mut self, chunk: &Block, standalone: bool) -> Result<()> {
        self.stack.push_function(0, None);

        let mut body = self.setup_env()?;
        body.extend(self.open_basic_lib()?);

        let closure = self.add_func_ref("*init", &[], &[], true, |c| c.block(chunk))?;
        body.extend(closure);
        body.push(null());
        body.push(self.rt.call(self.b, RuntimeFn::Invoke));
        body.push(op(Instruction::Drop));

        let body = if standalone {
            let done = self.b.fresh_label("done");
            let caught = self.b.fresh_label("caught");
            vec![Insn::Block {
                label: Some(done.clone()),
                result: None,
                body: vec![
                    Insn::Block {
                        label: Some(caught.clone()),
                        result: Some(types::anyref()),
                        body: vec![
                            Insn::TryTable {
                                tag: types::ERROR_TAG,
                                handler: caught,
                                body,
                            },
                            Insn::Br(done),
                        ],
                    },
                    op(Instruction::Drop),
                ],
            }]
        } else {
            body
        };

        let locals = self.stack.local_types();
        let local_names = self.stack.local_names();
        self.stack.pop_function();

        let ty = self.b.func_type(vec![], vec![]);
        let id = self
            .b
            .add_func_with_type("*invoke_lua", ty, locals, local_names, body);
        self.b.export_func(id, "start");
        Ok(())
    }
}

fn block_contains_goto(block: &Block, name: &str) -> bool {
    block.statements.iter().any(|s| contains_goto(s, name))
}

/// Does this statement (or a block nested in it, functions excluded)
/// contain `goto name`?
fn contains_goto(statement: &Statement, name: &str) -> bool {
    match statement {
        Statement::Goto(n) => n == name,
        Statement::Do(block) => block_contains_goto(block, name),
        Statement::While { body, .. }
        | Statement::Repeat { body, .. }
        | Statement::NumericFor { body, .. }
        | Statement::GenericFor { body, .. } => block_contains_goto(body, name),
        Statement::If { arms, else_block } => {
            arms.iter().any(|(_, b)| block_contains_goto(b, name))
                || else_block
                    .as_ref()
                    .is_some_and(|b| block_contains_goto(b, name))
        }
        _ => false,
    }
}
