// Shared instruction-building vocabulary used by the runtime generator and
// the code generator.

use wasm_encoder::{HeapType, Instruction, RefType};

use super::insn::{Insn, InsnList};
use super::types::{self, ValueTag};
use super::ModuleBuilder;

pub fn op(i: Instruction<'static>) -> Insn {
    Insn::Op(i)
}

pub fn const_i32(v: i32) -> Insn {
    op(Instruction::I32Const(v))
}

pub fn const_i64(v: i64) -> Insn {
    op(Instruction::I64Const(v))
}

pub fn const_f64(v: f64) -> Insn {
    op(Instruction::F64Const(v))
}

/// The null reference, i.e. Lua `nil`.
pub fn null() -> Insn {
    op(Instruction::RefNull(HeapType::None))
}

pub fn local_get(index: u32) -> Insn {
    op(Instruction::LocalGet(index))
}

pub fn local_set(index: u32) -> Insn {
    op(Instruction::LocalSet(index))
}

pub fn local_tee(index: u32) -> Insn {
    op(Instruction::LocalTee(index))
}

/// Box an i64 on the stack into a Lua integer.
pub fn new_integer() -> Insn {
    op(Instruction::StructNew(types::INTEGER))
}

/// Box an f64 on the stack into a Lua number.
pub fn new_number() -> Insn {
    op(Instruction::StructNew(types::NUMBER))
}

/// Box an i32 truth value on the stack into a Lua boolean.
pub fn new_boolean() -> Insn {
    op(Instruction::RefI31)
}

pub fn unbox_integer() -> Insn {
    op(Instruction::StructGet {
        struct_type_index: types::INTEGER,
        field_index: 0,
    })
}

pub fn unbox_number() -> Insn {
    op(Instruction::StructGet {
        struct_type_index: types::NUMBER,
        field_index: 0,
    })
}

/// Materialise a string literal: a passive data segment plus `array.new_data`.
pub fn add_string(b: &mut ModuleBuilder, bytes: &[u8]) -> InsnList {
    let segment = b.add_data(bytes);
    vec![
        const_i32(0),
        const_i32(bytes.len() as i32),
        op(Instruction::ArrayNewData {
            array_type_index: types::STRING,
            array_data_index: segment,
        }),
    ]
}

/// Throw the error tag with a string payload.
pub fn throw_error_str(b: &mut ModuleBuilder, msg: &str) -> InsnList {
    let mut out = add_string(b, msg.as_bytes());
    out.push(op(Instruction::Throw(types::ERROR_TAG)));
    out
}

/// One arm of a value-tag dispatch.
pub enum Case {
    /// The scrutinee was null; nothing is on the stack.
    Nil,
    /// The downcast succeeded; the casted non-null value is on the stack.
    Tag(ValueTag),
    /// No cast matched; the value has already been dropped.
    Default,
}

/// Weave the canonical value-tag dispatch: branch on null and on each cast in
/// declaration order, falling through to a default arm. Every handler body
/// must diverge (return, return_call, throw or unreachable).
pub fn switch_value(
    b: &mut ModuleBuilder,
    scrutinee: InsnList,
    casts: &[ValueTag],
    handler: &mut dyn FnMut(&mut ModuleBuilder, Case) -> InsnList,
) -> InsnList {
    let nil_label = b.fresh_label("nil");
    let labels: Vec<_> = casts.iter().map(|c| b.fresh_label(c.name())).collect();

    let mut inner = scrutinee;
    inner.push(Insn::BrOnNull(nil_label.clone()));
    for (tag, label) in casts.iter().zip(&labels) {
        inner.push(Insn::BrOnCast {
            target: label.clone(),
            from: RefType {
                nullable: true,
                heap_type: HeapType::Any,
            },
            to: tag.ref_type(),
        });
    }
    inner.push(op(Instruction::Drop));
    inner.extend(handler(b, Case::Default));

    for (tag, label) in casts.iter().zip(&labels) {
        let mut next = vec![Insn::Block {
            label: Some(label.clone()),
            result: Some(tag.val_type()),
            body: inner,
        }];
        next.extend(handler(b, Case::Tag(*tag)));
        inner = next;
    }

    let mut out = vec![Insn::Block {
        label: Some(nil_label),
        result: None,
        body: inner,
    }];
    out.extend(handler(b, Case::Nil));
    out
}
