// Table access: per-key-tag get/set helpers over the array part and the
// open [key, value, …] hash part, with linear-scan lookup.
//
// Integer keys consult the array part first (1-based, in bounds) and fall
// back to the hash part; a store at length+1 appends to the array part.
// Float keys that are integral in value are redirected to the integer path
// at dispatch time, so `t[1]` and `t[1.0]` always meet the same slot.

use wasm_encoder::{Instruction, ValType};

use crate::wasm::types::{self, ValueTag};
use crate::wasm::util::*;
use crate::wasm::{FuncId, Insn, InsnList, ModuleBuilder};

use super::Runtime;

fn struct_get(ty: u32, field: u32) -> Insn {
    op(Instruction::StructGet {
        struct_type_index: ty,
        field_index: field,
    })
}

fn struct_set(ty: u32, field: u32) -> Insn {
    op(Instruction::StructSet {
        struct_type_index: ty,
        field_index: field,
    })
}

impl Runtime {
    /// `*key_compare_<tag>(key, entry) -> i32`: does a stored key equal the
    /// typed probe key?
    pub(super) fn key_compare(&mut self, b: &mut ModuleBuilder, tag: ValueTag) -> FuncId {
        let name = format!("*key_compare_{}", tag.name());
        if let Some(id) = b.func_by_name(&name) {
            return id;
        }

        let (param, locals, body): (ValType, Vec<ValType>, InsnList) = match tag {
            ValueTag::Integer => {
                let scratch = 2u32;
                let body = switch_value(
                    b,
                    vec![local_get(1)],
                    &[ValueTag::Integer],
                    &mut |_, case| match case {
                        Case::Tag(ValueTag::Integer) => vec![
                            unbox_integer(),
                            local_set(scratch),
                            local_get(0),
                            local_get(scratch),
                            op(Instruction::I64Eq),
                            op(Instruction::Return),
                        ],
                        _ => vec![const_i32(0), op(Instruction::Return)],
                    },
                );
                (types::integer_type(), vec![ValType::I64], body)
            }
            ValueTag::Number => {
                let scratch = 2u32;
                let body = switch_value(
                    b,
                    vec![local_get(1)],
                    &[ValueTag::Number],
                    &mut |_, case| match case {
                        Case::Tag(ValueTag::Number) => vec![
                            unbox_number(),
                            local_set(scratch),
                            local_get(0),
                            local_get(scratch),
                            op(Instruction::F64Eq),
                            op(Instruction::Return),
                        ],
                        _ => vec![const_i32(0), op(Instruction::Return)],
                    },
                );
                (types::number_type(), vec![ValType::F64], body)
            }
            ValueTag::String => {
                let other = 2u32; // (ref null string)
                let i = 3u32; // i32
                let l = b.fresh_label("cmp");
                let body = switch_value(
                    b,
                    vec![local_get(1)],
                    &[ValueTag::String],
                    &mut |_, case| match case {
                        Case::Tag(ValueTag::String) => vec![
                            local_set(other),
                            local_get(0),
                            op(Instruction::ArrayLen),
                            local_tee(i),
                            local_get(other),
                            op(Instruction::ArrayLen),
                            op(Instruction::I32Eq),
                            Insn::If {
                                result: Some(ValType::I32),
                                then_body: vec![Insn::Loop {
                                    label: l.clone(),
                                    result: Some(ValType::I32),
                                    body: vec![
                                        local_get(i),
                                        Insn::If {
                                            result: Some(ValType::I32),
                                            then_body: vec![
                                                local_get(0),
                                                local_get(i),
                                                const_i32(1),
                                                op(Instruction::I32Sub),
                                                local_tee(i),
                                                op(Instruction::ArrayGetU(types::STRING)),
                                                local_get(other),
                                                local_get(i),
                                                op(Instruction::ArrayGetU(types::STRING)),
                                                op(Instruction::I32Eq),
                                                Insn::BrIf(l.clone()),
                                                const_i32(0),
                                            ],
                                            else_body: vec![const_i32(1)],
                                        },
                                    ],
                                }],
                                else_body: vec![const_i32(0)],
                            },
                            op(Instruction::Return),
                        ],
                        _ => vec![const_i32(0), op(Instruction::Return)],
                    },
                );
                (
                    ValueTag::String.val_type(),
                    vec![types::concrete(types::STRING), types::size_type()],
                    body,
                )
            }
            _ => unreachable!("keys are dispatched to integer, number or string"),
        };

        b.add_func(
            &name,
            vec![param, types::anyref()],
            vec![types::size_type()],
            locals,
            body,
        )
    }

    /// `*table_get_integer(key, table) -> anyref`
    fn table_get_integer(&mut self, b: &mut ModuleBuilder) -> FuncId {
        let name = "*table_get_integer";
        if let Some(id) = b.func_by_name(name) {
            return id;
        }
        let compare = self.key_compare(b, ValueTag::Integer);

        let arr = 2u32; // (ref null ref_array)
        let bucket = 3u32; // (ref null ref_array)
        let i = 4u32; // i32
        let l = b.fresh_label("scan");
        let body = vec![
            // array part first
            local_get(1),
            struct_get(types::TABLE, types::TBL_ARRAY_FIELD),
            local_tee(arr),
            op(Instruction::RefIsNull),
            op(Instruction::I32Eqz),
            Insn::If {
                result: None,
                then_body: vec![
                    local_get(0),
                    const_i64(1),
                    op(Instruction::I64GeS),
                    local_get(0),
                    local_get(arr),
                    op(Instruction::ArrayLen),
                    op(Instruction::I64ExtendI32U),
                    op(Instruction::I64LeS),
                    op(Instruction::I32And),
                    Insn::If {
                        result: None,
                        then_body: vec![
                            local_get(arr),
                            local_get(0),
                            op(Instruction::I32WrapI64),
                            const_i32(1),
                            op(Instruction::I32Sub),
                            op(Instruction::ArrayGet(types::REF_ARRAY)),
                            op(Instruction::Return),
                        ],
                        else_body: vec![],
                    },
                ],
                else_body: vec![],
            },
            // hash part
            local_get(1),
            struct_get(types::TABLE, types::TBL_HASH_FIELD),
            local_set(bucket),
            local_get(bucket),
            op(Instruction::ArrayLen),
            local_set(i),
            Insn::Loop {
                label: l.clone(),
                result: None,
                body: vec![
                    local_get(i),
                    Insn::If {
                        result: None,
                        then_body: vec![
                            local_get(0),
                            local_get(bucket),
                            local_get(i),
                            const_i32(2),
                            op(Instruction::I32Sub),
                            local_tee(i),
                            op(Instruction::ArrayGet(types::REF_ARRAY)),
                            Insn::Call(compare),
                            op(Instruction::I32Eqz),
                            Insn::BrIf(l.clone()),
                            local_get(bucket),
                            local_get(i),
                            const_i32(1),
                            op(Instruction::I32Add),
                            op(Instruction::ArrayGet(types::REF_ARRAY)),
                            op(Instruction::Return),
                        ],
                        else_body: vec![],
                    },
                ],
            },
            null(),
            op(Instruction::Return),
        ];
        b.add_func(
            name,
            vec![types::integer_type(), types::concrete(types::TABLE)],
            vec![types::anyref()],
            vec![
                types::ref_array(),
                types::ref_array(),
                types::size_type(),
            ],
            body,
        )
    }

    /// Hash-only scan for number and string keys.
    fn table_get_scan(&mut self, b: &mut ModuleBuilder, tag: ValueTag) -> FuncId {
        let name = format!("*table_get_{}", tag.name());
        if let Some(id) = b.func_by_name(&name) {
            return id;
        }
        let compare = self.key_compare(b, tag);
        let key_ty = match tag {
            ValueTag::Number => types::number_type(),
            _ => tag.val_type(),
        };

        let bucket = 2u32;
        let i = 3u32;
        let l = b.fresh_label("scan");
        let body = vec![
            local_get(1),
            struct_get(types::TABLE, types::TBL_HASH_FIELD),
            local_set(bucket),
            local_get(bucket),
            op(Instruction::ArrayLen),
            local_set(i),
            Insn::Loop {
                label: l.clone(),
                result: None,
                body: vec![
                    local_get(i),
                    Insn::If {
                        result: None,
                        then_body: vec![
                            local_get(0),
                            local_get(bucket),
                            local_get(i),
                            const_i32(2),
                            op(Instruction::I32Sub),
                            local_tee(i),
                            op(Instruction::ArrayGet(types::REF_ARRAY)),
                            Insn::Call(compare),
                            op(Instruction::I32Eqz),
                            Insn::BrIf(l.clone()),
                            local_get(bucket),
                            local_get(i),
                            const_i32(1),
                            op(Instruction::I32Add),
                            op(Instruction::ArrayGet(types::REF_ARRAY)),
                            op(Instruction::Return),
                        ],
                        else_body: vec![],
                    },
                ],
            },
            null(),
            op(Instruction::Return),
        ];
        b.add_func(
            &name,
            vec![key_ty, types::concrete(types::TABLE)],
            vec![types::anyref()],
            vec![types::ref_array(), types::size_type()],
            body,
        )
    }

    /// Box a typed key for storage in the hash part.
    fn boxed_key(tag: ValueTag) -> InsnList {
        match tag {
            ValueTag::Integer => vec![new_integer()],
            ValueTag::Number => vec![new_number()],
            _ => vec![],
        }
    }

    /// Shared hash-part update: overwrite a matching pair or grow by two and
    /// store the new pair at the front.
    fn hash_set_insns(
        &mut self,
        b: &mut ModuleBuilder,
        tag: ValueTag,
        bucket: u32,
        grown: u32,
        i: u32,
    ) -> InsnList {
        let compare = self.key_compare(b, tag);
        let l = b.fresh_label("scan");
        let mut out = vec![
            local_get(1),
            struct_get(types::TABLE, types::TBL_HASH_FIELD),
            local_set(bucket),
            local_get(bucket),
            op(Instruction::ArrayLen),
            local_set(i),
            Insn::Loop {
                label: l.clone(),
                result: None,
                body: vec![
                    local_get(i),
                    Insn::If {
                        result: None,
                        then_body: vec![
                            local_get(0),
                            local_get(bucket),
                            local_get(i),
                            const_i32(2),
                            op(Instruction::I32Sub),
                            local_tee(i),
                            op(Instruction::ArrayGet(types::REF_ARRAY)),
                            Insn::Call(compare),
                            op(Instruction::I32Eqz),
                            Insn::BrIf(l.clone()),
                            local_get(bucket),
                            local_get(i),
                            const_i32(1),
                            op(Instruction::I32Add),
                            local_get(2),
                            op(Instruction::ArraySet(types::REF_ARRAY)),
                            op(Instruction::Return),
                        ],
                        else_body: vec![],
                    },
                ],
            },
            // no hit: grow by two, moving the old pairs back
            null(),
            local_get(bucket),
            op(Instruction::ArrayLen),
            const_i32(2),
            op(Instruction::I32Add),
            op(Instruction::ArrayNew(types::REF_ARRAY)),
            local_set(grown),
            local_get(grown),
            const_i32(2),
            local_get(bucket),
            const_i32(0),
            local_get(bucket),
            op(Instruction::ArrayLen),
            op(Instruction::ArrayCopy {
                array_type_index_dst: types::REF_ARRAY,
                array_type_index_src: types::REF_ARRAY,
            }),
            local_get(1),
            local_get(grown),
            struct_set(types::TABLE, types::TBL_HASH_FIELD),
            local_get(grown),
            const_i32(0),
            local_get(0),
        ];
        out.extend(Self::boxed_key(tag));
        out.extend([
            op(Instruction::ArraySet(types::REF_ARRAY)),
            local_get(grown),
            const_i32(1),
            local_get(2),
            op(Instruction::ArraySet(types::REF_ARRAY)),
            op(Instruction::Return),
        ]);
        out
    }

    /// `*table_set_integer(key, table, value)`
    fn table_set_integer(&mut self, b: &mut ModuleBuilder) -> FuncId {
        let name = "*table_set_integer";
        if let Some(id) = b.func_by_name(name) {
            return id;
        }

        let arr = 3u32; // (ref null ref_array)
        let grown = 4u32; // (ref null ref_array)
        let len = 5u32; // i32
        let i = 6u32; // i32
        let hash = self.hash_set_insns(b, ValueTag::Integer, arr, grown, i);

        let mut body = vec![
            // length of the array part, treating a missing part as empty
            local_get(1),
            struct_get(types::TABLE, types::TBL_ARRAY_FIELD),
            local_tee(arr),
            op(Instruction::RefIsNull),
            Insn::If {
                result: Some(ValType::I32),
                then_body: vec![const_i32(0)],
                else_body: vec![local_get(arr), op(Instruction::ArrayLen)],
            },
            local_set(len),
            // in bounds: plain store
            local_get(0),
            const_i64(1),
            op(Instruction::I64GeS),
            local_get(0),
            local_get(len),
            op(Instruction::I64ExtendI32U),
            op(Instruction::I64LeS),
            op(Instruction::I32And),
            Insn::If {
                result: None,
                then_body: vec![
                    local_get(arr),
                    local_get(0),
                    op(Instruction::I32WrapI64),
                    const_i32(1),
                    op(Instruction::I32Sub),
                    local_get(2),
                    op(Instruction::ArraySet(types::REF_ARRAY)),
                    op(Instruction::Return),
                ],
                else_body: vec![],
            },
            // append at length + 1
            local_get(0),
            local_get(len),
            op(Instruction::I64ExtendI32U),
            const_i64(1),
            op(Instruction::I64Add),
            op(Instruction::I64Eq),
            Insn::If {
                result: None,
                then_body: vec![
                    null(),
                    local_get(len),
                    const_i32(1),
                    op(Instruction::I32Add),
                    op(Instruction::ArrayNew(types::REF_ARRAY)),
                    local_set(grown),
                    local_get(arr),
                    op(Instruction::RefIsNull),
                    op(Instruction::I32Eqz),
                    Insn::If {
                        result: None,
                        then_body: vec![
                            local_get(grown),
                            const_i32(0),
                            local_get(arr),
                            const_i32(0),
                            local_get(len),
                            op(Instruction::ArrayCopy {
                                array_type_index_dst: types::REF_ARRAY,
                                array_type_index_src: types::REF_ARRAY,
                            }),
                        ],
                        else_body: vec![],
                    },
                    local_get(grown),
                    local_get(len),
                    local_get(2),
                    op(Instruction::ArraySet(types::REF_ARRAY)),
                    local_get(1),
                    local_get(grown),
                    struct_set(types::TABLE, types::TBL_ARRAY_FIELD),
                    op(Instruction::Return),
                ],
                else_body: vec![],
            },
        ];
        body.extend(hash);
        b.add_func(
            name,
            vec![
                types::integer_type(),
                types::concrete(types::TABLE),
                types::anyref(),
            ],
            vec![],
            vec![
                types::ref_array(),
                types::ref_array(),
                types::size_type(),
                types::size_type(),
            ],
            body,
        )
    }

    /// `*table_set_<tag>(key, table, value)` for number and string keys.
    fn table_set_scan(&mut self, b: &mut ModuleBuilder, tag: ValueTag) -> FuncId {
        let name = format!("*table_set_{}", tag.name());
        if let Some(id) = b.func_by_name(&name) {
            return id;
        }
        let key_ty = match tag {
            ValueTag::Number => types::number_type(),
            _ => tag.val_type(),
        };

        let bucket = 3u32;
        let grown = 4u32;
        let i = 5u32;
        let body = self.hash_set_insns(b, tag, bucket, grown, i);
        b.add_func(
            &name,
            vec![key_ty, types::concrete(types::TABLE), types::anyref()],
            vec![],
            vec![
                types::ref_array(),
                types::ref_array(),
                types::size_type(),
            ],
            body,
        )
    }

    /// Dispatch on the key tag; integral float keys join the integer path.
    pub(super) fn table_get(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        let get_int = self.table_get_integer(b);
        let get_num = self.table_get_scan(b, ValueTag::Number);
        let get_str = self.table_get_scan(b, ValueTag::String);

        let tbl = 2u32; // (ref null table)
        let f = 3u32; // f64
        let key_casts = [ValueTag::Integer, ValueTag::Number, ValueTag::String];
        let body = switch_value(
            b,
            vec![local_get(0)],
            &[ValueTag::Table],
            &mut |b, case| match case {
                Case::Tag(ValueTag::Table) => {
                    let mut out = vec![local_set(tbl)];
                    out.extend(switch_value(
                        b,
                        vec![local_get(1)],
                        &key_casts,
                        &mut |b, case| match case {
                            Case::Tag(ValueTag::Integer) => vec![
                                unbox_integer(),
                                local_get(tbl),
                                Insn::ReturnCall(get_int),
                            ],
                            Case::Tag(ValueTag::Number) => vec![
                                unbox_number(),
                                local_tee(f),
                                local_get(f),
                                op(Instruction::F64Trunc),
                                op(Instruction::F64Eq),
                                Insn::If {
                                    result: None,
                                    then_body: vec![
                                        local_get(f),
                                        op(Instruction::I64TruncSatF64S),
                                        local_get(tbl),
                                        Insn::ReturnCall(get_int),
                                    ],
                                    else_body: vec![],
                                },
                                local_get(f),
                                local_get(tbl),
                                Insn::ReturnCall(get_num),
                            ],
                            Case::Tag(ValueTag::String) => {
                                vec![local_get(tbl), Insn::ReturnCall(get_str)]
                            }
                            Case::Nil => vec![null(), op(Instruction::Return)],
                            _ => throw_error_str(b, "unexpected type"),
                        },
                    ));
                    out
                }
                _ => throw_error_str(b, "attempt to index a non-table value"),
            },
        );
        (
            vec![types::concrete(types::TABLE), types::number_type()],
            body,
        )
    }

    pub(super) fn table_set(&mut self, b: &mut ModuleBuilder) -> (Vec<ValType>, InsnList) {
        let set_int = self.table_set_integer(b);
        let set_num = self.table_set_scan(b, ValueTag::Number);
        let set_str = self.table_set_scan(b, ValueTag::String);

        let tbl = 3u32; // (ref null table)
        let f = 4u32; // f64
        let key_casts = [ValueTag::Integer, ValueTag::Number, ValueTag::String];
        let body = switch_value(
            b,
            vec![local_get(0)],
            &[ValueTag::Table],
            &mut |b, case| match case {
                Case::Tag(ValueTag::Table) => {
                    let mut out = vec![local_set(tbl)];
                    out.extend(switch_value(
                        b,
                        vec![local_get(1)],
                        &key_casts,
                        &mut |b, case| match case {
                            Case::Tag(ValueTag::Integer) => vec![
                                unbox_integer(),
                                local_get(tbl),
                                local_get(2),
                                Insn::ReturnCall(set_int),
                            ],
                            Case::Tag(ValueTag::Number) => vec![
                                unbox_number(),
                                local_tee(f),
                                local_get(f),
                                op(Instruction::F64Trunc),
                                op(Instruction::F64Eq),
                                Insn::If {
                                    result: None,
                                    then_body: vec![
                                        local_get(f),
                                        op(Instruction::I64TruncSatF64S),
                                        local_get(tbl),
                                        local_get(2),
                                        Insn::ReturnCall(set_int),
                                    ],
                                    else_body: vec![],
                                },
                                local_get(f),
                                local_get(tbl),
                                local_get(2),
                                Insn::ReturnCall(set_num),
                            ],
                            Case::Tag(ValueTag::String) => vec![
                                local_get(tbl),
                                local_get(2),
                                Insn::ReturnCall(set_str),
                            ],
                            Case::Nil => throw_error_str(b, "table index is nil"),
                            _ => throw_error_str(b, "unexpected type"),
                        },
                    ));
                    out
                }
                _ => throw_error_str(b, "attempt to index a non-table value"),
            },
        );
        (
            vec![types::concrete(types::TABLE), types::number_type()],
            body,
        )
    }
}
