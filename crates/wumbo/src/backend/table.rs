// Table access wrappers and the table constructor.

use wasm_encoder::Instruction;

use crate::ast::*;
use crate::error::Result;
use crate::runtime::RuntimeFn;
use crate::wasm::types;
use crate::wasm::util::*;
use crate::wasm::InsnList;

use super::Compiler;

impl<'m> Compiler<'m> {
    pub(crate) fn table_get(&mut self, table: InsnList, key: InsnList) -> InsnList {
        let mut out = table;
        out.extend(key);
        out.push(self.rt.call(self.b, RuntimeFn::TableGet));
        out
    }

    pub(crate) fn table_set(&mut self, table: InsnList, key: InsnList, value: InsnList) -> InsnList {
        let mut out = table;
        out.extend(key);
        out.extend(value);
        out.push(self.rt.call(self.b, RuntimeFn::TableSet));
        out
    }

    /// `{ … }`: positional fields become the array part (only a trailing
    /// positional field spreads a multi-value bundle), keyed fields are
    /// stored into the hash part in declaration order.
    pub(crate) fn table_constructor(&mut self, fields: &[Field]) -> Result<InsnList> {
        let mut array_init: Vec<&Expression> = Vec::new();
        let mut keyed: Vec<(&FieldKey, &Expression)> = Vec::new();
        for field in fields {
            match &field.key {
                FieldKey::Positional => array_init.push(&field.value),
                key => keyed.push((key, &field.value)),
            }
        }
        let spread_last = matches!(
            fields.last().map(|f| &f.key),
            Some(FieldKey::Positional)
        );

        let table = self.stack.alloc_helper(types::concrete(types::TABLE));
        let mut out = Vec::new();

        // array part
        if array_init.is_empty() {
            out.push(null());
        } else if spread_last {
            let exps: Vec<Expression> = array_init.iter().map(|e| (*e).clone()).collect();
            out.extend(self.expression_list(&exps)?);
        } else {
            let mut items = Vec::new();
            for exp in &array_init {
                let value = self.expression(exp)?;
                items.push(self.single(value));
            }
            out.extend(self.make_ref_array(items));
        }

        // hash part starts empty, metatable unset
        out.extend([
            op(Instruction::ArrayNewFixed {
                array_type_index: types::REF_ARRAY,
                array_size: 0,
            }),
            null(),
            op(Instruction::StructNew(types::TABLE)),
            local_set(table as u32),
        ]);

        for (key, value) in keyed {
            let key_insns = match key {
                FieldKey::Named(name) => add_string(self.b, name.as_bytes()),
                FieldKey::Bracket(exp) => {
                    let value = self.expression(exp)?;
                    self.single(value)
                }
                FieldKey::Positional => unreachable!(),
            };
            let value_insns = {
                let v = self.expression(value)?;
                self.single(v)
            };
            let set = self.table_set(vec![local_get(table as u32)], key_insns, value_insns);
            out.extend(set);
        }

        out.push(local_get(table as u32));
        self.stack.free_local(table);
        Ok(out)
    }
}
