// The basic library, installed into a fresh _ENV before the chunk runs.
// Only the functions the runtime can express are real; the rest are stubs.

use wasm_encoder::Instruction;

use crate::ast::*;
use crate::error::Result;
use crate::runtime::RuntimeFn;
use crate::wasm::types::{self, ValueTag};
use crate::wasm::util::*;
use crate::wasm::{FuncId, Insn, InsnList};

use super::{Compiler, ARGS_INDEX};

impl<'m> Compiler<'m> {
    /// `local _ENV = {}`; read through the upvalue path by every closure.
    pub(crate) fn setup_env(&mut self) -> Result<InsnList> {
        let usage = new_usage();
        {
            let mut usage = usage.borrow_mut();
            usage.upvalue = true;
            usage.read_count = 1;
        }
        let statement = Statement::Local {
            names: vec![Name::new("_ENV")],
            usage: vec![usage],
            exps: vec![Expression::Table(Vec::new())],
        };
        self.statement(&statement)
    }

    fn add_builtin<F>(
        &mut self,
        name: &str,
        params: &[&str],
        vararg: bool,
        f: F,
    ) -> Result<InsnList>
    where
        F: FnOnce(&mut Self) -> Result<InsnList>,
    {
        let names: Vec<Name> = params.iter().map(|p| Name::new(p)).collect();
        let usage: Vec<UsageRef> = params.iter().map(|_| new_usage()).collect();
        let closure = self.add_func_ref(name, &names, &usage, vararg, f)?;
        self.set_var(name, closure)
    }

    fn add_stub(&mut self, name: &str, params: &[&str]) -> Result<InsnList> {
        self.add_builtin(name, params, false, |_| {
            Ok(vec![op(Instruction::Unreachable)])
        })
    }

    /// Build `[true, results…]` / `[false, error]` style bundles.
    fn prepend_boolean(&mut self, truth: bool, rest: u32) -> InsnList {
        let size = self.stack.alloc_helper(types::size_type());
        let result = self.stack.alloc_helper(types::ref_array());
        let out = vec![
            const_i32(1),
            local_get(rest),
            op(Instruction::RefIsNull),
            Insn::If {
                result: Some(types::size_type()),
                then_body: vec![const_i32(0)],
                else_body: vec![local_get(rest), op(Instruction::ArrayLen)],
            },
            op(Instruction::I32Add),
            local_set(size as u32),
            null(),
            local_get(size as u32),
            op(Instruction::ArrayNew(types::REF_ARRAY)),
            local_set(result as u32),
            local_get(result as u32),
            const_i32(0),
            const_i32(truth as i32),
            new_boolean(),
            op(Instruction::ArraySet(types::REF_ARRAY)),
            local_get(rest),
            op(Instruction::RefIsNull),
            op(Instruction::I32Eqz),
            Insn::If {
                result: None,
                then_body: vec![
                    local_get(result as u32),
                    const_i32(1),
                    local_get(rest),
                    const_i32(0),
                    local_get(rest),
                    op(Instruction::ArrayLen),
                    op(Instruction::ArrayCopy {
                        array_type_index_dst: types::REF_ARRAY,
                        array_type_index_src: types::REF_ARRAY,
                    }),
                ],
                else_body: vec![],
            },
            local_get(result as u32),
        ];
        self.stack.free_local(result);
        self.stack.free_local(size);
        out
    }

    fn protected_call(&mut self, with_handler: bool) -> Result<InsnList> {
        let function = self.get_var("f")?;
        let va = self
            .stack
            .current_function()
            .vararg_offset
            .expect("pcall is vararg") as u32;
        let results = self.stack.alloc_helper(types::ref_array());
        let exception = self.stack.alloc_helper(types::anyref());

        let mut try_body = function;
        try_body.push(local_get(va));
        try_body.push(self.rt.call(self.b, RuntimeFn::Invoke));
        try_body.push(local_set(results as u32));
        try_body.extend(self.prepend_boolean(true, results as u32));
        try_body.push(op(Instruction::Return));

        let caught = self.b.fresh_label("caught");
        let mut out = vec![
            Insn::Block {
                label: Some(caught.clone()),
                result: Some(types::anyref()),
                body: vec![
                    Insn::TryTable {
                        tag: types::ERROR_TAG,
                        handler: caught,
                        body: try_body,
                    },
                    op(Instruction::Unreachable),
                ],
            },
            local_set(exception as u32),
        ];

        if with_handler {
            let handler = self.get_var("msgh")?;
            let mut call = handler;
            call.extend([
                local_get(exception as u32),
                op(Instruction::ArrayNewFixed {
                    array_type_index: types::REF_ARRAY,
                    array_size: 1,
                }),
            ]);
            call.push(self.rt.call(self.b, RuntimeFn::Invoke));
            call.push(op(Instruction::Drop));
            out.extend(call);
        }

        out.extend([
            const_i32(0),
            new_boolean(),
            local_get(exception as u32),
            op(Instruction::ArrayNewFixed {
                array_type_index: types::REF_ARRAY,
                array_size: 2,
            }),
            op(Instruction::Return),
        ]);

        self.stack.free_local(exception);
        self.stack.free_local(results);
        Ok(out)
    }

    pub(crate) fn open_basic_lib(&mut self) -> Result<InsnList> {
        let stdout: FuncId = self.b.import_func(
            "stdout",
            "native",
            "stdout",
            vec![types::externref()],
            vec![],
        );
        let load_lua = self.b.import_func(
            "load_lua",
            "load",
            "load",
            vec![types::externref()],
            vec![types::concrete(types::LUA_FUNCTION)],
        );

        let mut result = Vec::new();

        result.extend(self.add_builtin("assert", &["v"], false, |c| {
            let condition = c.get_var("v")?;
            let mut out = condition;
            out.push(c.rt.call(c.b, RuntimeFn::ToBool));

            let message = c.stack.alloc_helper(types::anyref());
            let mut fail = c.at_or_null(ARGS_INDEX, 1, None);
            fail.push(local_set(message as u32));
            let default = add_string(c.b, b"assertion failed!");
            fail.extend([
                local_get(message as u32),
                op(Instruction::RefIsNull),
                Insn::If {
                    result: Some(types::anyref()),
                    then_body: default,
                    else_body: vec![local_get(message as u32)],
                },
                op(Instruction::Throw(types::ERROR_TAG)),
            ]);
            c.stack.free_local(message);

            out.push(Insn::If {
                result: None,
                then_body: vec![local_get(ARGS_INDEX), op(Instruction::Return)],
                else_body: fail,
            });
            Ok(out)
        })?);

        result.extend(self.add_builtin("error", &["message", "level"], false, |c| {
            let mut out = c.get_var("message")?;
            out.push(op(Instruction::Throw(types::ERROR_TAG)));
            Ok(out)
        })?);

        result.extend(self.add_builtin(
            "load",
            &["chunk", "chunkname", "mode", "env"],
            false,
            |c| {
                let to_js = c.rt.require(c.b, RuntimeFn::LuaStrToJsArray);
                let chunk = c.get_var("chunk")?;
                Ok(switch_value(
                    c.b,
                    chunk,
                    &[ValueTag::String],
                    &mut |_, case| match case {
                        Case::Tag(ValueTag::String) => vec![
                            Insn::Call(to_js),
                            Insn::Call(load_lua),
                            null(),
                            op(Instruction::StructNew(types::FUNCTION)),
                            op(Instruction::ArrayNewFixed {
                                array_type_index: types::REF_ARRAY,
                                array_size: 1,
                            }),
                            op(Instruction::Return),
                        ],
                        _ => vec![op(Instruction::Unreachable)],
                    },
                ))
            },
        )?);

        result.extend(self.add_builtin("pcall", &["f"], true, |c| c.protected_call(false))?);
        result.extend(
            self.add_builtin("xpcall", &["f", "msgh"], true, |c| c.protected_call(true))?,
        );

        result.extend(self.add_builtin("print", &[], true, |c| {
            let va = c
                .stack
                .current_function()
                .vararg_offset
                .expect("print is vararg") as u32;
            let mut out = c.at_or_null(va, 0, None);
            out.push(c.rt.call(c.b, RuntimeFn::ToString));
            out.push(c.rt.call(c.b, RuntimeFn::LuaStrToJsArray));
            out.push(Insn::Call(stdout));
            out.extend(add_string(c.b, b"\n"));
            out.push(c.rt.call(c.b, RuntimeFn::LuaStrToJsArray));
            out.push(Insn::Call(stdout));
            out.extend([null(), op(Instruction::Return)]);
            Ok(out)
        })?);

        result.extend(self.add_builtin("tonumber", &["e", "base"], false, |c| {
            let mut out = c.get_var("e")?;
            out.push(c.rt.call(c.b, RuntimeFn::ToNumber));
            out.extend([
                op(Instruction::ArrayNewFixed {
                    array_type_index: types::REF_ARRAY,
                    array_size: 1,
                }),
                op(Instruction::Return),
            ]);
            Ok(out)
        })?);

        result.extend(self.add_builtin("tostring", &["v"], false, |c| {
            let mut out = c.get_var("v")?;
            out.push(c.rt.call(c.b, RuntimeFn::ToString));
            out.extend([
                op(Instruction::ArrayNewFixed {
                    array_type_index: types::REF_ARRAY,
                    array_size: 1,
                }),
                op(Instruction::Return),
            ]);
            Ok(out)
        })?);

        result.extend(self.add_builtin("type", &["v"], false, |c| {
            let value = c.get_var("v")?;
            let casts = [
                ValueTag::Boolean,
                ValueTag::Number,
                ValueTag::Integer,
                ValueTag::String,
                ValueTag::Function,
                ValueTag::Table,
                ValueTag::Userdata,
                ValueTag::Thread,
            ];
            Ok(switch_value(c.b, value, &casts, &mut |b, case| {
                let type_name = match case {
                    Case::Nil => "nil",
                    Case::Tag(ValueTag::Integer) | Case::Tag(ValueTag::Number) => "number",
                    Case::Tag(tag) => tag.name(),
                    Case::Default => return vec![op(Instruction::Unreachable)],
                };
                let mut out = match case {
                    Case::Nil => Vec::new(),
                    _ => vec![op(Instruction::Drop)],
                };
                out.extend(add_string(b, type_name.as_bytes()));
                out.extend([
                    op(Instruction::ArrayNewFixed {
                        array_type_index: types::REF_ARRAY,
                        array_size: 1,
                    }),
                    op(Instruction::Return),
                ]);
                out
            }))
        })?);

        for (name, params) in [
            ("collectgarbage", &["opt", "arg"][..]),
            ("dofile", &["filename"][..]),
            ("getmetatable", &["object"][..]),
            ("ipairs", &["t"][..]),
            ("loadfile", &["filename", "mode", "env"][..]),
            ("next", &["table", "index"][..]),
            ("pairs", &["t"][..]),
            ("rawequal", &["v1", "v2"][..]),
            ("rawget", &["table", "index"][..]),
            ("rawlen", &["v"][..]),
            ("rawset", &["table", "index", "value"][..]),
            ("select", &["index"][..]),
            ("setmetatable", &["table", "metatable"][..]),
        ] {
            result.extend(self.add_stub(name, params)?);
        }

        // _G aliases the environment itself
        let env = self.get_var("_ENV")?;
        result.extend(self.set_var("_G", env)?);

        Ok(result)
    }
}
