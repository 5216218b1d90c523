// Runtime type registry: the closed, recursive set of GC heap types that
// represents every Lua value in the emitted module.

use wasm_encoder::{
    ArrayType, CompositeType, FieldType, FuncType, HeapType, NameMap, RefType, StorageType,
    StructType, SubType, ValType,
};

// Fixed indices inside the single rec-group.
pub const REF_ARRAY: u32 = 0;
pub const UPVALUE: u32 = 1;
pub const UPVALUE_ARRAY: u32 = 2;
pub const LUA_FUNCTION: u32 = 3;
pub const HASH_ENTRY: u32 = 4;
pub const HASH_ARRAY: u32 = 5;
pub const INTEGER: u32 = 6;
pub const NUMBER: u32 = 7;
pub const STRING: u32 = 8;
pub const FUNCTION: u32 = 9;
pub const USERDATA: u32 = 10;
pub const THREAD: u32 = 11;
pub const TABLE: u32 = 12;
pub const TYPE_COUNT: u32 = 13;

/// Field order of the `function` struct.
pub const FN_REF_FIELD: u32 = 0;
pub const FN_UPVALUES_FIELD: u32 = 1;

/// Field order of the `table` struct.
pub const TBL_ARRAY_FIELD: u32 = 0;
pub const TBL_HASH_FIELD: u32 = 1;
pub const TBL_META_FIELD: u32 = 2;

/// The single exception tag carrying a Lua value, exported as `error`.
pub const ERROR_TAG: u32 = 0;

/// Runtime discriminator of a Lua value. `Nil` is the null reference and
/// `Boolean` lives in i31, so neither owns a heap-type index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueTag {
    Nil,
    Boolean,
    Integer,
    Number,
    String,
    Function,
    Userdata,
    Thread,
    Table,
}

impl ValueTag {
    pub fn name(self) -> &'static str {
        match self {
            ValueTag::Nil => "nil",
            ValueTag::Boolean => "boolean",
            ValueTag::Integer => "integer",
            ValueTag::Number => "number",
            ValueTag::String => "string",
            ValueTag::Function => "function",
            ValueTag::Userdata => "userdata",
            ValueTag::Thread => "thread",
            ValueTag::Table => "table",
        }
    }

    /// Tag number used by `get_type`, following the Lua type order.
    pub fn num(self) -> i32 {
        match self {
            ValueTag::Nil => 0,
            ValueTag::Boolean => 1,
            ValueTag::Integer => 2,
            ValueTag::Number => 3,
            ValueTag::String => 4,
            ValueTag::Function => 5,
            ValueTag::Userdata => 6,
            ValueTag::Thread => 7,
            ValueTag::Table => 8,
        }
    }

    /// Heap type matched by this tag's downcast.
    pub fn heap_type(self) -> HeapType {
        match self {
            ValueTag::Nil => HeapType::None,
            ValueTag::Boolean => HeapType::I31,
            ValueTag::Integer => HeapType::Concrete(INTEGER),
            ValueTag::Number => HeapType::Concrete(NUMBER),
            ValueTag::String => HeapType::Concrete(STRING),
            ValueTag::Function => HeapType::Concrete(FUNCTION),
            ValueTag::Userdata => HeapType::Concrete(USERDATA),
            ValueTag::Thread => HeapType::Concrete(THREAD),
            ValueTag::Table => HeapType::Concrete(TABLE),
        }
    }

    /// Non-null reference to this tag's representation.
    pub fn ref_type(self) -> RefType {
        RefType {
            nullable: false,
            heap_type: self.heap_type(),
        }
    }

    pub fn val_type(self) -> ValType {
        ValType::Ref(self.ref_type())
    }
}

pub fn anyref() -> ValType {
    ValType::Ref(RefType {
        nullable: true,
        heap_type: HeapType::Any,
    })
}

pub fn externref() -> ValType {
    ValType::Ref(RefType::EXTERNREF)
}

/// Nullable reference to a concrete heap type.
pub fn concrete(index: u32) -> ValType {
    ValType::Ref(RefType {
        nullable: true,
        heap_type: HeapType::Concrete(index),
    })
}

pub fn ref_array() -> ValType {
    concrete(REF_ARRAY)
}

pub fn upvalue() -> ValType {
    concrete(UPVALUE)
}

pub fn upvalue_array() -> ValType {
    concrete(UPVALUE_ARRAY)
}

pub fn integer_type() -> ValType {
    ValType::I64
}

pub fn number_type() -> ValType {
    ValType::F64
}

pub fn bool_type() -> ValType {
    ValType::I32
}

pub fn size_type() -> ValType {
    ValType::I32
}

pub fn char_type() -> ValType {
    ValType::I32
}

fn field(element_type: StorageType, mutable: bool) -> FieldType {
    FieldType {
        element_type,
        mutable,
    }
}

fn val(ty: ValType) -> StorageType {
    StorageType::Val(ty)
}

fn struct_type(fields: Vec<FieldType>) -> SubType {
    SubType {
        is_final: true,
        supertype_idx: None,
        composite_type: CompositeType::Struct(StructType {
            fields: fields.into_boxed_slice(),
        }),
    }
}

fn array_type(element: FieldType) -> SubType {
    SubType {
        is_final: true,
        supertype_idx: None,
        composite_type: CompositeType::Array(ArrayType(element)),
    }
}

fn func_type(params: Vec<ValType>, results: Vec<ValType>) -> SubType {
    SubType {
        is_final: true,
        supertype_idx: None,
        composite_type: CompositeType::Func(FuncType::new(params, results)),
    }
}

/// The rec-group installed at the front of the type section.
pub fn heap_types() -> Vec<SubType> {
    vec![
        // ref_array
        array_type(field(val(anyref()), true)),
        // upvalue
        struct_type(vec![field(val(anyref()), true)]),
        // upvalue_array
        array_type(field(val(upvalue()), true)),
        // lua_function: (upvalues, args) -> results
        func_type(vec![upvalue_array(), ref_array()], vec![ref_array()]),
        // hash_entry
        struct_type(vec![
            field(val(anyref()), true),
            field(val(anyref()), true),
        ]),
        // hash_array
        array_type(field(val(concrete(HASH_ENTRY)), true)),
        // integer
        struct_type(vec![field(val(integer_type()), false)]),
        // number
        struct_type(vec![field(val(number_type()), false)]),
        // string
        array_type(field(StorageType::I8, true)),
        // function
        struct_type(vec![
            field(val(concrete(LUA_FUNCTION)), false),
            field(val(upvalue_array()), true),
        ]),
        // userdata (stub)
        struct_type(vec![field(val(ValType::F32), false)]),
        // thread (stub)
        struct_type(vec![
            field(val(ValType::F32), false),
            field(val(ValType::F32), false),
        ]),
        // table
        struct_type(vec![
            field(val(ref_array()), true),
            field(val(ref_array()), true),
            field(val(concrete(TABLE)), true),
        ]),
    ]
}

/// Debug names for the rec-group, in index order.
pub fn type_names() -> NameMap {
    let names = [
        "ref_array",
        "upvalue",
        "upvalue_array",
        "lua_function",
        "hash_entry",
        "hash_array",
        "integer",
        "number",
        "string",
        "function",
        "userdata",
        "thread",
        "table",
    ];
    let mut map = NameMap::new();
    for (i, name) in names.iter().enumerate() {
        map.append(i as u32, name);
    }
    map
}
