// Runtime library: a fixed catalogue of helper functions, each keyed by a
// stable name. Helpers are required on demand; depending on the output mode
// they are created in-module, imported from module "runtime", or exported.

mod operator;
mod table;

use ahash::{AHashMap, AHashSet};
use wasm_encoder::{Instruction, ValType};

use crate::wasm::types::{self, ValueTag};
use crate::wasm::util::*;
use crate::wasm::{FuncId, Insn, InsnList, ModuleBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeFn {
    TableGet,
    TableSet,
    ToBool,
    ToBoolNot,
    LogicNot,
    BinaryNot,
    Minus,
    Len,
    Addition,
    Subtraction,
    Multiplication,
    Division,
    DivisionFloor,
    Exponentiation,
    Modulo,
    BinaryOr,
    BinaryAnd,
    BinaryXor,
    BinaryRightShift,
    BinaryLeftShift,
    Equality,
    Inequality,
    LessThan,
    GreaterThan,
    LessOrEqual,
    GreaterOrEqual,
    Concat,
    ToString,
    ToNumber,
    LuaStrToJsArray,
    JsArrayToLuaStr,
    GetType,
    BoxInteger,
    BoxNumber,
    ToHostInteger,
    ToHostString,
    AnyArraySize,
    AnyArrayCreate,
    AnyArrayGet,
    AnyArraySet,
    Invoke,
}

impl RuntimeFn {
    pub const ALL: [RuntimeFn; 41] = [
        RuntimeFn::TableGet,
        RuntimeFn::TableSet,
        RuntimeFn::ToBool,
        RuntimeFn::ToBoolNot,
        RuntimeFn::LogicNot,
        RuntimeFn::BinaryNot,
        RuntimeFn::Minus,
        RuntimeFn::Len,
        RuntimeFn::Addition,
        RuntimeFn::Subtraction,
        RuntimeFn::Multiplication,
        RuntimeFn::Division,
        RuntimeFn::DivisionFloor,
        RuntimeFn::Exponentiation,
        RuntimeFn::Modulo,
        RuntimeFn::BinaryOr,
        RuntimeFn::BinaryAnd,
        RuntimeFn::BinaryXor,
        RuntimeFn::BinaryRightShift,
        RuntimeFn::BinaryLeftShift,
        RuntimeFn::Equality,
        RuntimeFn::Inequality,
        RuntimeFn::LessThan,
        RuntimeFn::GreaterThan,
        RuntimeFn::LessOrEqual,
        RuntimeFn::GreaterOrEqual,
        RuntimeFn::Concat,
        RuntimeFn::ToString,
        RuntimeFn::ToNumber,
        RuntimeFn::LuaStrToJsArray,
        RuntimeFn::JsArrayToLuaStr,
        RuntimeFn::GetType,
        RuntimeFn::BoxInteger,
        RuntimeFn::BoxNumber,
        RuntimeFn::ToHostInteger,
        RuntimeFn::ToHostString,
        RuntimeFn::AnyArraySize,
        RuntimeFn::AnyArrayCreate,
        RuntimeFn::AnyArrayGet,
        RuntimeFn::AnyArraySet,
        RuntimeFn::Invoke,
    ];

    /// Stable symbolic key; also the import/export name.
    pub fn name(self) -> &'static str {
        match self {
            RuntimeFn::TableGet => "table_get",
            RuntimeFn::TableSet => "table_set",
            RuntimeFn::ToBool => "to_bool",
            RuntimeFn::ToBoolNot => "to_bool_not",
            RuntimeFn::LogicNot => "logic_not",
            RuntimeFn::BinaryNot => "binary_not",
            RuntimeFn::Minus => "minus",
            RuntimeFn::Len => "len",
            RuntimeFn::Addition => "addition",
            RuntimeFn::Subtraction => "subtraction",
            RuntimeFn::Multiplication => "multiplication",
            RuntimeFn::Division => "division",
            RuntimeFn::DivisionFloor => "division_floor",
            RuntimeFn::Exponentiation => "exponentiation",
            RuntimeFn::Modulo => "modulo",
            RuntimeFn::BinaryOr => "binary_or",
            RuntimeFn::BinaryAnd => "binary_and",
            RuntimeFn::BinaryXor => "binary_xor",
            RuntimeFn::BinaryRightShift => "binary_right_shift",
            RuntimeFn::BinaryLeftShift => "binary_left_shift",
            RuntimeFn::Equality => "equality",
            RuntimeFn::Inequality => "inequality",
            RuntimeFn::LessThan => "less_than",
            RuntimeFn::GreaterThan => "greater_than",
            RuntimeFn::LessOrEqual => "less_or_equal",
            RuntimeFn::GreaterOrEqual => "greater_or_equal",
            RuntimeFn::Concat => "concat",
            RuntimeFn::ToString => "to_string",
            RuntimeFn::ToNumber => "to_number",
            RuntimeFn::LuaStrToJsArray => "lua_str_to_js_array",
            RuntimeFn::JsArrayToLuaStr => "js_array_to_lua_str",
            RuntimeFn::GetType => "get_type",
            RuntimeFn::BoxInteger => "box_integer",
            RuntimeFn::BoxNumber => "box_number",
            RuntimeFn::ToHostInteger => "to_host_integer",
            RuntimeFn::ToHostString => "to_host_string",
            RuntimeFn::AnyArraySize => "any_array_size",
            RuntimeFn::AnyArrayCreate => "any_array_create",
            RuntimeFn::AnyArrayGet => "any_array_get",
            RuntimeFn::AnyArraySet => "any_array_set",
            RuntimeFn::Invoke => "invoke",
        }
    }

    pub fn signature(self) -> (Vec<ValType>, Vec<ValType>) {
        use types::*;
        let any = anyref();
        match self {
            RuntimeFn::TableGet => (vec![any, any], vec![any]),
            RuntimeFn::TableSet => (vec![any, any, any], vec![]),
            RuntimeFn::ToBool | RuntimeFn::ToBoolNot => (vec![any], vec![bool_type()]),
            RuntimeFn::LogicNot
            | RuntimeFn::BinaryNot
            | RuntimeFn::Minus
            | RuntimeFn::Len
            | RuntimeFn::ToNumber => (vec![any], vec![any]),
            RuntimeFn::Addition
            | RuntimeFn::Subtraction
            | RuntimeFn::Multiplication
            | RuntimeFn::Division
            | RuntimeFn::DivisionFloor
            | RuntimeFn::Exponentiation
            | RuntimeFn::Modulo
            | RuntimeFn::BinaryOr
            | RuntimeFn::BinaryAnd
            | RuntimeFn::BinaryXor
            | RuntimeFn::BinaryRightShift
            | RuntimeFn::BinaryLeftShift
            | RuntimeFn::Equality
            | RuntimeFn::Inequality
            | RuntimeFn::LessThan
            | RuntimeFn::GreaterThan
            | RuntimeFn::LessOrEqual
            | RuntimeFn::GreaterOrEqual
            | RuntimeFn::Concat => (vec![any, any], vec![any]),
            RuntimeFn::ToString => (vec![any], vec![concrete(STRING)]),
            RuntimeFn::LuaStrToJsArray => (vec![concrete(STRING)], vec![externref()]),
            RuntimeFn::JsArrayToLuaStr => (vec![externref()], vec![concrete(STRING)]),
            RuntimeFn::GetType => (vec![any], vec![size_type()]),
            RuntimeFn::BoxInteger => (vec![integer_type()], vec![concrete(INTEGER)]),
            RuntimeFn::BoxNumber => (vec![number_type()], vec![concrete(NUMBER)]),
            RuntimeFn::ToHostInteger => (vec![any], vec![integer_type()]),
            RuntimeFn::ToHostString => (vec![any], vec![externref()]),
            RuntimeFn::AnyArraySize => (vec![ref_array()], vec![size_type()]),
            RuntimeFn::AnyArrayCreate => (vec![size_type()], vec![ref_array()]),
            RuntimeFn::AnyArrayGet => (vec![ref_array(), size_type()], vec![any]),
            RuntimeFn::AnyArraySet => (vec![ref_array(), size_type(), any], vec![]),
            RuntimeFn::Invoke => (vec![any, ref_array()], vec![ref_array()]),
        }
    }
}

/// How the catalogue participates in the module being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionAction {
    None,
    Required,
    All,
}

impl FunctionAction {
    fn applies(self, required: bool) -> bool {
        match self {
            FunctionAction::None => false,
            FunctionAction::Required => required,
            FunctionAction::All => true,
        }
    }
}

pub struct Runtime {
    pub import_functions: FunctionAction,
    pub create_functions: FunctionAction,
    pub export_functions: FunctionAction,
    required: AHashSet<RuntimeFn>,
    ids: AHashMap<RuntimeFn, FuncId>,
    built: AHashSet<RuntimeFn>,
}

impl Runtime {
    fn with_actions(
        import_functions: FunctionAction,
        create_functions: FunctionAction,
        export_functions: FunctionAction,
    ) -> Self {
        Runtime {
            import_functions,
            create_functions,
            export_functions,
            required: AHashSet::new(),
            ids: AHashMap::new(),
            built: AHashSet::new(),
        }
    }

    /// Chunk and runtime in one module.
    pub fn standalone() -> Self {
        Self::with_actions(
            FunctionAction::None,
            FunctionAction::Required,
            FunctionAction::None,
        )
    }

    /// Chunk importing the runtime by name from module "runtime".
    pub fn minimal() -> Self {
        Self::with_actions(
            FunctionAction::Required,
            FunctionAction::None,
            FunctionAction::None,
        )
    }

    /// Runtime module alone, everything exported.
    pub fn runtime_module() -> Self {
        Self::with_actions(
            FunctionAction::None,
            FunctionAction::All,
            FunctionAction::All,
        )
    }

    /// Mark a helper as needed and hand back the id call sites can target.
    pub fn require(&mut self, b: &mut ModuleBuilder, f: RuntimeFn) -> FuncId {
        self.required.insert(f);
        if let Some(&id) = self.ids.get(&f) {
            return id;
        }
        let (params, results) = f.signature();
        let id = if self.import_functions != FunctionAction::None {
            b.import_func(f.name(), "runtime", f.name(), params, results)
        } else {
            b.declare_func(f.name(), params, results)
        };
        self.ids.insert(f, id);
        id
    }

    /// Call instruction for a helper; arguments must already be on the stack.
    pub fn call(&mut self, b: &mut ModuleBuilder, f: RuntimeFn) -> Insn {
        Insn::Call(self.require(b, f))
    }

    /// Emit every required helper (and everything those helpers require).
    pub fn build(&mut self, b: &mut ModuleBuilder) {
        if self.create_functions == FunctionAction::All
            || self.export_functions == FunctionAction::All
        {
            for f in RuntimeFn::ALL {
                self.require(b, f);
            }
        }

        if self.create_functions != FunctionAction::None {
            loop {
                let next = RuntimeFn::ALL
                    .into_iter()
                    .find(|f| self.required.contains(f) && !self.built.contains(f));
                let Some(f) = next else { break };
                self.built.insert(f);
                let id = self.require(b, f);
                let (locals, body) = self.build_fn(b, f);
                b.set_body(id, locals, Vec::new(), body);
            }
        }

        for f in RuntimeFn::ALL {
            if self.export_functions.applies(self.required.contains(&f)) {
                if let Some(&id) = self.ids.get(&f) {
                    b.export_func(id, f.name());
                }
            }
        }
    }

    fn build_fn(&mut self, b: &mut ModuleBuilder, f: RuntimeFn) -> (Vec<ValType>, InsnList) {
        match f {
            RuntimeFn::TableGet => self.table_get(b),
            RuntimeFn::TableSet => self.table_set(b),
            RuntimeFn::ToBool => self.to_bool(b),
            RuntimeFn::ToBoolNot => self.to_bool_not(b),
            RuntimeFn::LogicNot => self.logic_not(b),
            RuntimeFn::BinaryNot => self.binary_not(b),
            RuntimeFn::Minus => self.minus(b),
            RuntimeFn::Len => self.len(b),
            RuntimeFn::Addition => self.addition(b),
            RuntimeFn::Subtraction => self.subtraction(b),
            RuntimeFn::Multiplication => self.multiplication(b),
            RuntimeFn::Division => self.division(b),
            RuntimeFn::DivisionFloor => self.division_floor(b),
            RuntimeFn::Exponentiation => self.exponentiation(b),
            RuntimeFn::Modulo => self.modulo(b),
            RuntimeFn::BinaryOr => self.binary_or(b),
            RuntimeFn::BinaryAnd => self.binary_and(b),
            RuntimeFn::BinaryXor => self.binary_xor(b),
            RuntimeFn::BinaryRightShift => self.binary_right_shift(b),
            RuntimeFn::BinaryLeftShift => self.binary_left_shift(b),
            RuntimeFn::Equality => self.equality(b),
            RuntimeFn::Inequality => self.inequality(b),
            RuntimeFn::LessThan => self.less_than(b),
            RuntimeFn::GreaterThan => self.greater_than(b),
            RuntimeFn::LessOrEqual => self.less_or_equal(b),
            RuntimeFn::GreaterOrEqual => self.greater_or_equal(b),
            RuntimeFn::Concat => self.concat(b),
            RuntimeFn::ToString => self.to_string(b),
            RuntimeFn::ToNumber => self.to_number(b),
            RuntimeFn::LuaStrToJsArray => self.lua_str_to_js_array(b),
            RuntimeFn::JsArrayToLuaStr => self.js_array_to_lua_str(b),
            RuntimeFn::GetType => self.get_type(b),
            RuntimeFn::BoxInteger => self.box_integer(b),
            RuntimeFn::BoxNumber => self.box_number(b),
            RuntimeFn::ToHostInteger => self.to_host_integer(b),
            RuntimeFn::ToHostString => self.to_host_string(b),
            RuntimeFn::AnyArraySize => self.any_array_size(b),
            RuntimeFn::AnyArrayCreate => self.any_array_create(b),
            RuntimeFn::AnyArrayGet => self.any_array_get(b),
            RuntimeFn::AnyArraySet => self.any_array_set(b),
            RuntimeFn::Invoke => self.invoke(b),
        }
    }

    fn to_bool(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        let body = switch_value(
            b,
            vec![local_get(0)],
            &[ValueTag::Boolean],
            &mut |_, case| match case {
                Case::Nil => vec![const_i32(0), op(Instruction::Return)],
                Case::Tag(_) => vec![op(Instruction::I31GetU), op(Instruction::Return)],
                Case::Default => vec![const_i32(1), op(Instruction::Return)],
            },
        );
        (vec![], body)
    }

    fn to_bool_not(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        let body = switch_value(
            b,
            vec![local_get(0)],
            &[ValueTag::Boolean],
            &mut |_, case| match case {
                Case::Nil => vec![const_i32(1), op(Instruction::Return)],
                Case::Tag(_) => vec![
                    op(Instruction::I31GetU),
                    op(Instruction::I32Eqz),
                    op(Instruction::Return),
                ],
                Case::Default => vec![const_i32(0), op(Instruction::Return)],
            },
        );
        (vec![], body)
    }

    fn logic_not(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        let to_bool_not = self.require(b, RuntimeFn::ToBoolNot);
        (
            vec![],
            vec![local_get(0), Insn::Call(to_bool_not), new_boolean()],
        )
    }

    fn to_string(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        let int_to_str = b.import_func(
            "int_to_str",
            "native",
            "toString",
            vec![types::integer_type()],
            vec![types::externref()],
        );
        let num_to_str = b.import_func(
            "num_to_str",
            "native",
            "toString",
            vec![types::number_type()],
            vec![types::externref()],
        );
        let js_to_str = self.require(b, RuntimeFn::JsArrayToLuaStr);

        let casts = [
            ValueTag::String,
            ValueTag::Boolean,
            ValueTag::Number,
            ValueTag::Integer,
        ];
        let body = switch_value(b, vec![local_get(0)], &casts, &mut |b, case| match case {
            Case::Nil => {
                let mut out = add_string(b, b"nil");
                out.push(op(Instruction::Return));
                out
            }
            Case::Tag(ValueTag::String) => vec![op(Instruction::Return)],
            Case::Tag(ValueTag::Boolean) => {
                let t = add_string(b, b"true");
                let f = add_string(b, b"false");
                vec![
                    op(Instruction::I31GetU),
                    Insn::If {
                        result: Some(types::concrete(types::STRING)),
                        then_body: t,
                        else_body: f,
                    },
                    op(Instruction::Return),
                ]
            }
            Case::Tag(ValueTag::Integer) => vec![
                unbox_integer(),
                Insn::Call(int_to_str),
                Insn::Call(js_to_str),
                op(Instruction::Return),
            ],
            Case::Tag(ValueTag::Number) => vec![
                unbox_number(),
                Insn::Call(num_to_str),
                Insn::Call(js_to_str),
                op(Instruction::Return),
            ],
            Case::Tag(_) | Case::Default => vec![null(), op(Instruction::Return)],
        });
        (vec![], body)
    }

    fn to_number(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        b.import_func(
            "str_to_int",
            "native",
            "toInt",
            vec![types::externref()],
            vec![types::integer_type()],
        );
        let str_to_num = b.import_func(
            "str_to_num",
            "native",
            "toNum",
            vec![types::externref()],
            vec![types::number_type()],
        );
        let to_js = self.require(b, RuntimeFn::LuaStrToJsArray);

        let scratch = 1u32; // f64
        let casts = [ValueTag::String, ValueTag::Number, ValueTag::Integer];
        let body = switch_value(b, vec![local_get(0)], &casts, &mut |_, case| match case {
            Case::Tag(ValueTag::String) => vec![
                Insn::Call(to_js),
                Insn::Call(str_to_num),
                local_tee(scratch),
                local_get(scratch),
                // NaN means the host could not parse it
                op(Instruction::F64Ne),
                Insn::If {
                    result: Some(types::anyref()),
                    then_body: vec![null()],
                    else_body: vec![local_get(scratch), new_number()],
                },
                op(Instruction::Return),
            ],
            Case::Tag(ValueTag::Integer) | Case::Tag(ValueTag::Number) => {
                vec![op(Instruction::Return)]
            }
            Case::Nil => vec![null(), op(Instruction::Return)],
            Case::Tag(_) | Case::Default => vec![null(), op(Instruction::Return)],
        });
        (vec![types::number_type()], body)
    }

    fn lua_str_to_js_array(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        let buffer_new = b.import_func(
            "buffer_new",
            "buffer",
            "new",
            vec![types::size_type()],
            vec![types::externref()],
        );
        let buffer_set = b.import_func(
            "buffer_set",
            "buffer",
            "set",
            vec![types::externref(), types::size_type(), types::char_type()],
            vec![],
        );

        let len = 1u32;
        let buf = 2u32;
        let l = b.fresh_label("copy");
        let body = vec![
            local_get(0),
            op(Instruction::ArrayLen),
            local_tee(len),
            Insn::Call(buffer_new),
            local_set(buf),
            local_get(len),
            Insn::If {
                result: None,
                then_body: vec![Insn::Loop {
                    label: l.clone(),
                    result: None,
                    body: vec![
                        local_get(buf),
                        local_get(len),
                        const_i32(1),
                        op(Instruction::I32Sub),
                        local_tee(len),
                        local_get(0),
                        local_get(len),
                        op(Instruction::ArrayGetU(types::STRING)),
                        Insn::Call(buffer_set),
                        local_get(len),
                        Insn::BrIf(l),
                    ],
                }],
                else_body: vec![],
            },
            local_get(buf),
            op(Instruction::Return),
        ];
        (vec![types::size_type(), types::externref()], body)
    }

    fn js_array_to_lua_str(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        let buffer_size = b.import_func(
            "buffer_size",
            "buffer",
            "size",
            vec![types::externref()],
            vec![types::size_type()],
        );
        let buffer_get = b.import_func(
            "buffer_get",
            "buffer",
            "get",
            vec![types::externref(), types::size_type()],
            vec![types::char_type()],
        );

        let len = 1u32;
        let arr = 2u32;
        let l = b.fresh_label("copy");
        let body = vec![
            local_get(0),
            Insn::Call(buffer_size),
            local_tee(len),
            op(Instruction::ArrayNewDefault(types::STRING)),
            local_set(arr),
            local_get(len),
            Insn::If {
                result: None,
                then_body: vec![Insn::Loop {
                    label: l.clone(),
                    result: None,
                    body: vec![
                        local_get(arr),
                        local_get(len),
                        const_i32(1),
                        op(Instruction::I32Sub),
                        local_tee(len),
                        local_get(0),
                        local_get(len),
                        Insn::Call(buffer_get),
                        op(Instruction::ArraySet(types::STRING)),
                        local_get(len),
                        Insn::BrIf(l),
                    ],
                }],
                else_body: vec![],
            },
            local_get(arr),
            op(Instruction::Return),
        ];
        (
            vec![types::size_type(), types::concrete(types::STRING)],
            body,
        )
    }

    fn get_type(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
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
        let body = switch_value(b, vec![local_get(0)], &casts, &mut |_, case| match case {
            Case::Nil => vec![const_i32(ValueTag::Nil.num()), op(Instruction::Return)],
            Case::Tag(tag) => vec![
                op(Instruction::Drop),
                const_i32(tag.num()),
                op(Instruction::Return),
            ],
            Case::Default => vec![op(Instruction::Unreachable)],
        });
        (vec![], body)
    }

    fn box_integer(&mut self, _b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        (vec![], vec![local_get(0), new_integer()])
    }

    fn box_number(&mut self, _b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        (vec![], vec![local_get(0), new_number()])
    }

    fn to_host_integer(&mut self, _b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        (
            vec![],
            vec![
                local_get(0),
                op(Instruction::RefCastNonNull(
                    ValueTag::Integer.heap_type(),
                )),
                unbox_integer(),
            ],
        )
    }

    fn to_host_string(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        let to_js = self.require(b, RuntimeFn::LuaStrToJsArray);
        (
            vec![],
            vec![
                local_get(0),
                op(Instruction::RefCastNonNull(ValueTag::String.heap_type())),
                Insn::Call(to_js),
            ],
        )
    }

    fn any_array_size(&mut self, _b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        (vec![], vec![local_get(0), op(Instruction::ArrayLen)])
    }

    fn any_array_create(&mut self, _b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        (
            vec![],
            vec![
                null(),
                local_get(0),
                op(Instruction::ArrayNew(types::REF_ARRAY)),
            ],
        )
    }

    fn any_array_get(&mut self, _b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        (
            vec![],
            vec![
                local_get(0),
                local_get(1),
                op(Instruction::ArrayGet(types::REF_ARRAY)),
            ],
        )
    }

    fn any_array_set(&mut self, _b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        (
            vec![],
            vec![
                local_get(0),
                local_get(1),
                local_get(2),
                op(Instruction::ArraySet(types::REF_ARRAY)),
            ],
        )
    }

    /// The call trampoline: unpack the closure and tail-call its code.
    fn invoke(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        let closure = 2u32;
        let body = switch_value(
            b,
            vec![local_get(0)],
            &[ValueTag::Function],
            &mut |b, case| match case {
                Case::Tag(ValueTag::Function) => vec![
                    local_set(closure),
                    local_get(closure),
                    op(Instruction::StructGet {
                        struct_type_index: types::FUNCTION,
                        field_index: types::FN_UPVALUES_FIELD,
                    }),
                    local_get(1),
                    local_get(closure),
                    op(Instruction::StructGet {
                        struct_type_index: types::FUNCTION,
                        field_index: types::FN_REF_FIELD,
                    }),
                    op(Instruction::ReturnCallRef(types::LUA_FUNCTION)),
                ],
                _ => throw_error_str(b, "not a function"),
            },
        );
        (vec![types::concrete(types::FUNCTION)], body)
    }
}
