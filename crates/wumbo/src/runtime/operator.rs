// Arithmetic, comparison and unary helpers.
//
// Binary operators dispatch on the left operand's tag into a per-tag inner
// function (reached by return_call), which re-dispatches on the right
// operand. Integer/number combinations follow Lua 5.3 §3.4: mixed operands
// widen the integer side; `/` and `^` widen even for two integers.

use wasm_encoder::{Instruction, ValType};

use crate::wasm::types::{self, ValueTag};
use crate::wasm::util::*;
use crate::wasm::{FuncId, Insn, InsnList, ModuleBuilder};

use super::{Runtime, RuntimeFn};

// Scratch locals shared by every per-tag inner function, after the two
// parameters: i64, f64, i64, i64, f64.
const SCRATCH_I: u32 = 2;
const SCRATCH_F: u32 = 3;
const SCRATCH_A: u32 = 4;
const SCRATCH_B: u32 = 5;
const SCRATCH_G: u32 = 6;

fn aux_locals() -> Vec<ValType> {
    vec![
        ValType::I64,
        ValType::F64,
        ValType::I64,
        ValType::I64,
        ValType::F64,
    ]
}

#[derive(Clone)]
enum BoxAs {
    Integer,
    Number,
    Boolean,
}

impl BoxAs {
    fn insn(&self) -> Insn {
        match self {
            BoxAs::Integer => new_integer(),
            BoxAs::Number => new_number(),
            BoxAs::Boolean => new_boolean(),
        }
    }
}

/// Behaviour for two integer operands.
#[derive(Clone)]
enum IntRule {
    /// Combine the two i64 values on the stack.
    Apply(InsnList, BoxAs),
    /// Widen both sides and use the number path (`/`, `^`).
    Widen,
}

#[derive(Clone)]
struct BinRule {
    int: Option<IntRule>,
    /// Combine two f64 values on the stack; `None` makes any number operand
    /// an error (bitwise operators are integer-only).
    num: Option<(InsnList, BoxAs)>,
}

impl Runtime {
    fn bin_aux(
        &mut self,
        b: &mut ModuleBuilder,
        name: &str,
        left: ValueTag,
        rule: &BinRule,
    ) -> FuncId {
        let aux_name = format!("*{}_{}", name, left.name());
        if let Some(id) = b.func_by_name(&aux_name) {
            return id;
        }

        let casts = [ValueTag::Integer, ValueTag::Number];
        let rule = rule.clone();
        let body = switch_value(b, vec![local_get(1)], &casts, &mut |b, case| {
            let right = match case {
                Case::Tag(tag) => tag,
                _ => return throw_error_str(b, "unexpected type"),
            };
            // Unbox the right operand into a scratch local, then lay out
            // (left, right) on the stack in operand order.
            let mut out = Vec::new();
            let wide = left == ValueTag::Number
                || right == ValueTag::Number
                || matches!(&rule.int, Some(IntRule::Widen) | None);
            if wide {
                let Some((ops, box_as)) = &rule.num else {
                    return throw_error_str(b, "unexpected type");
                };
                match right {
                    ValueTag::Integer => out.extend([
                        unbox_integer(),
                        op(Instruction::F64ConvertI64S),
                        local_set(SCRATCH_F),
                    ]),
                    _ => out.extend([unbox_number(), local_set(SCRATCH_F)]),
                }
                out.push(local_get(0));
                match left {
                    ValueTag::Integer => out.extend([
                        op(Instruction::StructGet {
                            struct_type_index: types::INTEGER,
                            field_index: 0,
                        }),
                        op(Instruction::F64ConvertI64S),
                    ]),
                    _ => out.push(op(Instruction::StructGet {
                        struct_type_index: types::NUMBER,
                        field_index: 0,
                    })),
                }
                out.push(local_get(SCRATCH_F));
                out.extend(ops.iter().cloned());
                out.push(box_as.insn());
            } else {
                let Some(IntRule::Apply(ops, box_as)) = &rule.int else {
                    return throw_error_str(b, "unexpected type");
                };
                out.extend([unbox_integer(), local_set(SCRATCH_I)]);
                out.push(local_get(0));
                out.push(op(Instruction::StructGet {
                    struct_type_index: types::INTEGER,
                    field_index: 0,
                }));
                out.push(local_get(SCRATCH_I));
                out.extend(ops.iter().cloned());
                out.push(box_as.insn());
            }
            out.push(op(Instruction::Return));
            out
        });

        b.add_func(
            &aux_name,
            vec![left.val_type(), types::anyref()],
            vec![types::anyref()],
            aux_locals(),
            body,
        )
    }

    fn bin_dispatch(
        &mut self,
        b: &mut ModuleBuilder,
        name: &str,
        rule: BinRule,
    ) -> (Vec<ValType>, InsnList) {
        let casts = [ValueTag::Integer, ValueTag::Number];
        let mut aux = Vec::new();
        for tag in casts {
            aux.push((tag, self.bin_aux(b, name, tag, &rule)));
        }
        let body = switch_value(b, vec![local_get(0)], &casts, &mut |b, case| match case {
            Case::Tag(tag) => {
                let id = aux
                    .iter()
                    .find(|(t, _)| *t == tag)
                    .map(|(_, id)| *id)
                    .expect("aux function for every cast");
                vec![local_get(1), Insn::ReturnCall(id)]
            }
            _ => throw_error_str(b, "unexpected type"),
        });
        (vec![], body)
    }

    fn arith(
        &mut self,
        b: &mut ModuleBuilder,
        name: &str,
        int_op: Instruction<'static>,
        num_op: Instruction<'static>,
    ) -> (Vec<ValType>, InsnList) {
        self.bin_dispatch(
            b,
            name,
            BinRule {
                int: Some(IntRule::Apply(vec![op(int_op)], BoxAs::Integer)),
                num: Some((vec![op(num_op)], BoxAs::Number)),
            },
        )
    }

    fn cmp(
        &mut self,
        b: &mut ModuleBuilder,
        name: &str,
        int_op: Instruction<'static>,
        num_op: Instruction<'static>,
    ) -> (Vec<ValType>, InsnList) {
        self.bin_dispatch(
            b,
            name,
            BinRule {
                int: Some(IntRule::Apply(vec![op(int_op)], BoxAs::Boolean)),
                num: Some((vec![op(num_op)], BoxAs::Boolean)),
            },
        )
    }

    fn bit(
        &mut self,
        b: &mut ModuleBuilder,
        name: &str,
        int_op: Instruction<'static>,
    ) -> (Vec<ValType>, InsnList) {
        self.bin_dispatch(
            b,
            name,
            BinRule {
                int: Some(IntRule::Apply(vec![op(int_op)], BoxAs::Integer)),
                num: None,
            },
        )
    }

    pub(super) fn addition(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        self.arith(b, "addition", Instruction::I64Add, Instruction::F64Add)
    }

    pub(super) fn subtraction(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        self.arith(b, "subtraction", Instruction::I64Sub, Instruction::F64Sub)
    }

    pub(super) fn multiplication(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        self.arith(
            b,
            "multiplication",
            Instruction::I64Mul,
            Instruction::F64Mul,
        )
    }

    /// `/` always produces a number.
    pub(super) fn division(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        self.bin_dispatch(
            b,
            "division",
            BinRule {
                int: Some(IntRule::Widen),
                num: Some((vec![op(Instruction::F64Div)], BoxAs::Number)),
            },
        )
    }

    pub(super) fn division_floor(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        let zero = throw_error_str(b, "attempt to perform 'n//0'");
        let int_ops = vec![
            local_set(SCRATCH_B),
            local_set(SCRATCH_A),
            local_get(SCRATCH_B),
            op(Instruction::I64Eqz),
            Insn::If {
                result: None,
                then_body: zero,
                else_body: vec![],
            },
            local_get(SCRATCH_A),
            local_get(SCRATCH_B),
            op(Instruction::I64DivS),
            local_set(SCRATCH_I),
            local_get(SCRATCH_A),
            local_get(SCRATCH_B),
            op(Instruction::I64RemS),
            local_set(SCRATCH_A),
            // floor adjustment when remainder and divisor disagree in sign
            local_get(SCRATCH_A),
            const_i64(0),
            op(Instruction::I64Ne),
            local_get(SCRATCH_A),
            local_get(SCRATCH_B),
            op(Instruction::I64Xor),
            const_i64(0),
            op(Instruction::I64LtS),
            op(Instruction::I32And),
            Insn::If {
                result: None,
                then_body: vec![
                    local_get(SCRATCH_I),
                    const_i64(1),
                    op(Instruction::I64Sub),
                    local_set(SCRATCH_I),
                ],
                else_body: vec![],
            },
            local_get(SCRATCH_I),
        ];
        self.bin_dispatch(
            b,
            "division_floor",
            BinRule {
                int: Some(IntRule::Apply(int_ops, BoxAs::Integer)),
                num: Some((
                    vec![op(Instruction::F64Div), op(Instruction::F64Floor)],
                    BoxAs::Number,
                )),
            },
        )
    }

    pub(super) fn exponentiation(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        let pow = b.import_func(
            "pow",
            "native",
            "pow",
            vec![types::number_type(), types::number_type()],
            vec![types::number_type()],
        );
        self.bin_dispatch(
            b,
            "exponentiation",
            BinRule {
                int: Some(IntRule::Widen),
                num: Some((vec![Insn::Call(pow)], BoxAs::Number)),
            },
        )
    }

    pub(super) fn modulo(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        let zero = throw_error_str(b, "attempt to perform 'n%0'");
        let int_ops = vec![
            local_set(SCRATCH_B),
            local_set(SCRATCH_A),
            local_get(SCRATCH_B),
            op(Instruction::I64Eqz),
            Insn::If {
                result: None,
                then_body: zero,
                else_body: vec![],
            },
            local_get(SCRATCH_A),
            local_get(SCRATCH_B),
            op(Instruction::I64RemS),
            local_set(SCRATCH_I),
            local_get(SCRATCH_I),
            const_i64(0),
            op(Instruction::I64Ne),
            local_get(SCRATCH_I),
            local_get(SCRATCH_B),
            op(Instruction::I64Xor),
            const_i64(0),
            op(Instruction::I64LtS),
            op(Instruction::I32And),
            Insn::If {
                result: None,
                then_body: vec![
                    local_get(SCRATCH_I),
                    local_get(SCRATCH_B),
                    op(Instruction::I64Add),
                    local_set(SCRATCH_I),
                ],
                else_body: vec![],
            },
            local_get(SCRATCH_I),
        ];
        // a - floor(a/b)*b on numbers
        let num_ops = vec![
            local_set(SCRATCH_G),
            local_set(SCRATCH_F),
            local_get(SCRATCH_F),
            local_get(SCRATCH_F),
            local_get(SCRATCH_G),
            op(Instruction::F64Div),
            op(Instruction::F64Floor),
            local_get(SCRATCH_G),
            op(Instruction::F64Mul),
            op(Instruction::F64Sub),
        ];
        self.bin_dispatch(
            b,
            "modulo",
            BinRule {
                int: Some(IntRule::Apply(int_ops, BoxAs::Integer)),
                num: Some((num_ops, BoxAs::Number)),
            },
        )
    }

    pub(super) fn binary_or(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        self.bit(b, "binary_or", Instruction::I64Or)
    }

    pub(super) fn binary_and(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        self.bit(b, "binary_and", Instruction::I64And)
    }

    pub(super) fn binary_xor(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        self.bit(b, "binary_xor", Instruction::I64Xor)
    }

    pub(super) fn binary_right_shift(
        &mut self,
        b: &mut ModuleBuilder,
    ) -> (Vec<ValType>, InsnList) {
        self.bit(b, "binary_right_shift", Instruction::I64ShrU)
    }

    pub(super) fn binary_left_shift(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        self.bit(b, "binary_left_shift", Instruction::I64Shl)
    }

    pub(super) fn less_than(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        self.cmp(b, "less_than", Instruction::I64LtS, Instruction::F64Lt)
    }

    pub(super) fn greater_than(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        self.cmp(b, "greater_than", Instruction::I64GtS, Instruction::F64Gt)
    }

    pub(super) fn less_or_equal(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        self.cmp(b, "less_or_equal", Instruction::I64LeS, Instruction::F64Le)
    }

    pub(super) fn greater_or_equal(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        self.cmp(
            b,
            "greater_or_equal",
            Instruction::I64GeS,
            Instruction::F64Ge,
        )
    }

    /// Equality covers every tag: numeric values compare after widening,
    /// strings element-wise, everything else by reference identity.
    pub(super) fn equality(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        let num_rule = BinRule {
            int: Some(IntRule::Apply(
                vec![op(Instruction::I64Eq)],
                BoxAs::Boolean,
            )),
            num: Some((vec![op(Instruction::F64Eq)], BoxAs::Boolean)),
        };
        let eq_int = self.eq_num_aux(b, ValueTag::Integer, &num_rule);
        let eq_num = self.eq_num_aux(b, ValueTag::Number, &num_rule);
        let eq_str = self.eq_string_aux(b);
        let eq_ident = self.eq_ident_aux(b);

        let casts = [
            ValueTag::Integer,
            ValueTag::Number,
            ValueTag::String,
            ValueTag::Boolean,
            ValueTag::Function,
            ValueTag::Table,
            ValueTag::Userdata,
            ValueTag::Thread,
        ];
        let body = switch_value(b, vec![local_get(0)], &casts, &mut |_, case| match case {
            Case::Nil => vec![
                local_get(1),
                op(Instruction::RefIsNull),
                new_boolean(),
                op(Instruction::Return),
            ],
            Case::Tag(ValueTag::Integer) => vec![local_get(1), Insn::ReturnCall(eq_int)],
            Case::Tag(ValueTag::Number) => vec![local_get(1), Insn::ReturnCall(eq_num)],
            Case::Tag(ValueTag::String) => vec![local_get(1), Insn::ReturnCall(eq_str)],
            Case::Tag(_) => vec![local_get(1), Insn::ReturnCall(eq_ident)],
            Case::Default => vec![const_i32(0), new_boolean(), op(Instruction::Return)],
        });
        (vec![], body)
    }

    /// Numeric equality inner function; non-numeric right operands compare
    /// unequal instead of erroring.
    fn eq_num_aux(&mut self, b: &mut ModuleBuilder, left: ValueTag, rule: &BinRule) -> FuncId {
        let aux_name = format!("*equality_{}", left.name());
        if let Some(id) = b.func_by_name(&aux_name) {
            return id;
        }
        let casts = [ValueTag::Integer, ValueTag::Number];
        let rule = rule.clone();
        let body = switch_value(b, vec![local_get(1)], &casts, &mut |_, case| {
            let right = match case {
                Case::Tag(tag) => tag,
                _ => {
                    return vec![const_i32(0), new_boolean(), op(Instruction::Return)];
                }
            };
            let mut out = Vec::new();
            if left == ValueTag::Integer && right == ValueTag::Integer {
                let Some(IntRule::Apply(ops, box_as)) = &rule.int else {
                    unreachable!()
                };
                out.extend([unbox_integer(), local_set(SCRATCH_I), local_get(0)]);
                out.push(op(Instruction::StructGet {
                    struct_type_index: types::INTEGER,
                    field_index: 0,
                }));
                out.push(local_get(SCRATCH_I));
                out.extend(ops.iter().cloned());
                out.push(box_as.insn());
            } else {
                let Some((ops, box_as)) = &rule.num else {
                    unreachable!()
                };
                match right {
                    ValueTag::Integer => out.extend([
                        unbox_integer(),
                        op(Instruction::F64ConvertI64S),
                        local_set(SCRATCH_F),
                    ]),
                    _ => out.extend([unbox_number(), local_set(SCRATCH_F)]),
                }
                out.push(local_get(0));
                match left {
                    ValueTag::Integer => out.extend([
                        op(Instruction::StructGet {
                            struct_type_index: types::INTEGER,
                            field_index: 0,
                        }),
                        op(Instruction::F64ConvertI64S),
                    ]),
                    _ => out.push(op(Instruction::StructGet {
                        struct_type_index: types::NUMBER,
                        field_index: 0,
                    })),
                }
                out.push(local_get(SCRATCH_F));
                out.extend(ops.iter().cloned());
                out.push(box_as.insn());
            }
            out.push(op(Instruction::Return));
            out
        });
        b.add_func(
            &aux_name,
            vec![left.val_type(), types::anyref()],
            vec![types::anyref()],
            aux_locals(),
            body,
        )
    }

    fn eq_string_aux(&mut self, b: &mut ModuleBuilder) -> FuncId {
        let aux_name = "*equality_string";
        if let Some(id) = b.func_by_name(aux_name) {
            return id;
        }
        let compare = self.key_compare(b, ValueTag::String);
        let body = switch_value(
            b,
            vec![local_get(1)],
            &[ValueTag::String],
            &mut |_, case| match case {
                Case::Tag(ValueTag::String) => vec![
                    op(Instruction::Drop),
                    local_get(0),
                    local_get(1),
                    Insn::Call(compare),
                    new_boolean(),
                    op(Instruction::Return),
                ],
                _ => vec![const_i32(0), new_boolean(), op(Instruction::Return)],
            },
        );
        b.add_func(
            aux_name,
            vec![ValueTag::String.val_type(), types::anyref()],
            vec![types::anyref()],
            vec![],
            body,
        )
    }

    /// Reference identity for tables, functions, userdata and threads.
    fn eq_ident_aux(&mut self, b: &mut ModuleBuilder) -> FuncId {
        let aux_name = "*equality_ident";
        if let Some(id) = b.func_by_name(aux_name) {
            return id;
        }
        let eq_heap = wasm_encoder::HeapType::Eq;
        let body = vec![
            local_get(1),
            op(Instruction::RefTestNonNull(eq_heap)),
            Insn::If {
                result: Some(types::anyref()),
                then_body: vec![
                    local_get(0),
                    local_get(1),
                    op(Instruction::RefCastNonNull(eq_heap)),
                    op(Instruction::RefEq),
                    new_boolean(),
                ],
                else_body: vec![const_i32(0), new_boolean()],
            },
            op(Instruction::Return),
        ];
        b.add_func(
            aux_name,
            vec![
                ValType::Ref(wasm_encoder::RefType {
                    nullable: false,
                    heap_type: eq_heap,
                }),
                types::anyref(),
            ],
            vec![types::anyref()],
            vec![],
            body,
        )
    }

    pub(super) fn inequality(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        let equality = self.require(b, RuntimeFn::Equality);
        let to_bool_not = self.require(b, RuntimeFn::ToBoolNot);
        (
            vec![],
            vec![
                local_get(0),
                local_get(1),
                Insn::Call(equality),
                Insn::Call(to_bool_not),
                new_boolean(),
            ],
        )
    }

    /// `..` concatenates strings and numbers.
    pub(super) fn concat(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        let aux = self.concat_aux(b);
        let to_string = self.require(b, RuntimeFn::ToString);
        let casts = [ValueTag::String, ValueTag::Integer, ValueTag::Number];
        let body = switch_value(b, vec![local_get(0)], &casts, &mut |b, case| match case {
            Case::Tag(ValueTag::String) => vec![local_get(1), Insn::ReturnCall(aux)],
            Case::Tag(ValueTag::Integer) | Case::Tag(ValueTag::Number) => vec![
                Insn::Call(to_string),
                op(Instruction::RefAsNonNull),
                local_get(1),
                Insn::ReturnCall(aux),
            ],
            _ => throw_error_str(b, "unexpected type"),
        });
        (vec![], body)
    }

    fn concat_aux(&mut self, b: &mut ModuleBuilder) -> FuncId {
        let aux_name = "*concat_string";
        if let Some(id) = b.func_by_name(aux_name) {
            return id;
        }
        let to_string = self.require(b, RuntimeFn::ToString);

        let rhs = 2u32; // (ref null string)
        let out_arr = 3u32; // (ref null string)
        let l1 = 4u32; // i32
        let casts = [ValueTag::String, ValueTag::Integer, ValueTag::Number];
        let body = switch_value(b, vec![local_get(1)], &casts, &mut |b, case| {
            let mut head = match case {
                Case::Tag(ValueTag::String) => vec![local_set(rhs)],
                Case::Tag(ValueTag::Integer) | Case::Tag(ValueTag::Number) => {
                    vec![Insn::Call(to_string), local_set(rhs)]
                }
                _ => return throw_error_str(b, "unexpected type"),
            };
            head.extend([
                // allocate and fill the result
                local_get(0),
                op(Instruction::ArrayLen),
                local_tee(l1),
                local_get(rhs),
                op(Instruction::ArrayLen),
                op(Instruction::I32Add),
                op(Instruction::ArrayNewDefault(types::STRING)),
                local_set(out_arr),
                local_get(out_arr),
                const_i32(0),
                local_get(0),
                const_i32(0),
                local_get(l1),
                op(Instruction::ArrayCopy {
                    array_type_index_dst: types::STRING,
                    array_type_index_src: types::STRING,
                }),
                local_get(out_arr),
                local_get(l1),
                local_get(rhs),
                const_i32(0),
                local_get(rhs),
                op(Instruction::ArrayLen),
                op(Instruction::ArrayCopy {
                    array_type_index_dst: types::STRING,
                    array_type_index_src: types::STRING,
                }),
                local_get(out_arr),
                op(Instruction::Return),
            ]);
            head
        });
        b.add_func(
            aux_name,
            vec![ValueTag::String.val_type(), types::anyref()],
            vec![types::anyref()],
            vec![
                types::concrete(types::STRING),
                types::concrete(types::STRING),
                types::size_type(),
            ],
            body,
        )
    }

    pub(super) fn minus(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        let casts = [ValueTag::Integer, ValueTag::Number];
        let body = switch_value(b, vec![local_get(0)], &casts, &mut |b, case| match case {
            Case::Tag(ValueTag::Integer) => vec![
                unbox_integer(),
                const_i64(-1),
                op(Instruction::I64Mul),
                new_integer(),
                op(Instruction::Return),
            ],
            Case::Tag(ValueTag::Number) => vec![
                unbox_number(),
                op(Instruction::F64Neg),
                new_number(),
                op(Instruction::Return),
            ],
            _ => throw_error_str(b, "unexpected type"),
        });
        (vec![], body)
    }

    pub(super) fn binary_not(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        let body = switch_value(
            b,
            vec![local_get(0)],
            &[ValueTag::Integer],
            &mut |b, case| match case {
                Case::Tag(ValueTag::Integer) => vec![
                    unbox_integer(),
                    const_i64(-1),
                    op(Instruction::I64Xor),
                    new_integer(),
                    op(Instruction::Return),
                ],
                _ => throw_error_str(b, "unexpected type"),
            },
        );
        (vec![], body)
    }

    pub(super) fn len(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        let part = 1u32; // (ref null ref_array)
        let casts = [ValueTag::String, ValueTag::Table];
        let body = switch_value(b, vec![local_get(0)], &casts, &mut |b, case| match case {
            Case::Tag(ValueTag::String) => vec![
                op(Instruction::ArrayLen),
                op(Instruction::I64ExtendI32U),
                new_integer(),
                op(Instruction::Return),
            ],
            // Table length: size of the array part.
            Case::Tag(ValueTag::Table) => vec![
                op(Instruction::StructGet {
                    struct_type_index: types::TABLE,
                    field_index: types::TBL_ARRAY_FIELD,
                }),
                local_tee(part),
                op(Instruction::RefIsNull),
                Insn::If {
                    result: Some(ValType::I64),
                    then_body: vec![const_i64(0)],
                    else_body: vec![
                        local_get(part),
                        op(Instruction::ArrayLen),
                        op(Instruction::I64ExtendI32U),
                    ],
                },
                new_integer(),
                op(Instruction::Return),
            ],
            _ => throw_error_str(b, "unexpected type"),
        });
        (vec![types::ref_array()], body)
    }
}
