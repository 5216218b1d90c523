// Module construction on top of wasm-encoder.
//
// Functions are declared in discovery order and may reference one another
// before their bodies exist; imports and bodies are reconciled into the
// final index space (imports first) when `finish` assembles the sections.

pub mod insn;
pub mod types;
pub mod util;

use ahash::AHashMap;
use smol_str::SmolStr;
use wasm_encoder::{
    CodeSection, DataCountSection, DataSection, ElementSection, Elements, EntityType,
    ExportKind, ExportSection, Function, FunctionSection, ImportSection, IndirectNameMap,
    Module, NameMap, NameSection, TagKind, TagSection, TagType, TypeSection, ValType,
};

pub use insn::{FuncId, Insn, InsnList};
use insn::Lowering;

enum FuncKind {
    Import {
        module: SmolStr,
        field: SmolStr,
        type_idx: u32,
    },
    Local {
        type_idx: u32,
        locals: Vec<ValType>,
        local_names: Vec<(u32, SmolStr)>,
        body: Vec<Insn>,
    },
    /// Declared so call sites can reference it; body filled in later.
    Pending { type_idx: u32 },
}

struct FuncEntry {
    name: SmolStr,
    kind: FuncKind,
}

pub struct ModuleBuilder {
    extra_types: Vec<(Vec<ValType>, Vec<ValType>)>,
    type_dedup: AHashMap<(Vec<ValType>, Vec<ValType>), u32>,
    funcs: Vec<FuncEntry>,
    func_by_name: AHashMap<SmolStr, FuncId>,
    exports: Vec<(SmolStr, FuncId)>,
    data: Vec<Vec<u8>>,
    label_counter: usize,
    /// Type of the error tag's signature, `(anyref) -> ()`.
    tag_type: u32,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        let mut builder = ModuleBuilder {
            extra_types: Vec::new(),
            type_dedup: AHashMap::new(),
            funcs: Vec::new(),
            func_by_name: AHashMap::new(),
            exports: Vec::new(),
            data: Vec::new(),
            label_counter: 0,
            tag_type: 0,
        };
        builder.tag_type = builder.func_type(vec![types::anyref()], vec![]);
        builder
    }

    /// Index of a plain function type, appended after the rec-group.
    pub fn func_type(&mut self, params: Vec<ValType>, results: Vec<ValType>) -> u32 {
        let key = (params, results);
        if let Some(&idx) = self.type_dedup.get(&key) {
            return idx;
        }
        let idx = types::TYPE_COUNT + self.extra_types.len() as u32;
        self.type_dedup.insert(key.clone(), idx);
        self.extra_types.push(key);
        idx
    }

    pub fn fresh_label(&mut self, prefix: &str) -> SmolStr {
        let mut buffer = itoa::Buffer::new();
        let label = SmolStr::new(format!("{}{}", prefix, buffer.format(self.label_counter)));
        self.label_counter += 1;
        label
    }

    pub fn has_func(&self, name: &str) -> bool {
        self.func_by_name.contains_key(name)
    }

    pub fn func_by_name(&self, name: &str) -> Option<FuncId> {
        self.func_by_name.get(name).copied()
    }

    fn push_func(&mut self, name: SmolStr, kind: FuncKind) -> FuncId {
        let id = FuncId(self.funcs.len());
        self.func_by_name.insert(name.clone(), id);
        self.funcs.push(FuncEntry { name, kind });
        id
    }

    /// Lua source functions carry their name only for debugging; they are not
    /// registered for lookup, so user names can never shadow runtime helpers
    /// or imports.
    fn push_func_anon(&mut self, name: SmolStr, kind: FuncKind) -> FuncId {
        let id = FuncId(self.funcs.len());
        self.funcs.push(FuncEntry { name, kind });
        id
    }

    /// Import a host or runtime function; repeated imports of the same name
    /// return the existing id.
    pub fn import_func(
        &mut self,
        name: &str,
        module: &str,
        field: &str,
        params: Vec<ValType>,
        results: Vec<ValType>,
    ) -> FuncId {
        if let Some(&id) = self.func_by_name.get(name) {
            return id;
        }
        let type_idx = self.func_type(params, results);
        self.push_func(
            SmolStr::new(name),
            FuncKind::Import {
                module: SmolStr::new(module),
                field: SmolStr::new(field),
                type_idx,
            },
        )
    }

    /// Declare a function whose body is produced later via [`Self::set_body`].
    pub fn declare_func(
        &mut self,
        name: &str,
        params: Vec<ValType>,
        results: Vec<ValType>,
    ) -> FuncId {
        let type_idx = self.func_type(params, results);
        self.push_func(SmolStr::new(name), FuncKind::Pending { type_idx })
    }

    pub fn set_body(
        &mut self,
        id: FuncId,
        locals: Vec<ValType>,
        local_names: Vec<(u32, SmolStr)>,
        body: Vec<Insn>,
    ) {
        let type_idx = match self.funcs[id.0].kind {
            FuncKind::Pending { type_idx } => type_idx,
            _ => panic!("set_body on a non-pending function"),
        };
        self.funcs[id.0].kind = FuncKind::Local {
            type_idx,
            locals,
            local_names,
            body,
        };
    }

    /// Add a fully built function with an explicit type index (used for Lua
    /// functions, which all share the `lua_function` heap type).
    pub fn add_func_with_type(
        &mut self,
        name: &str,
        type_idx: u32,
        locals: Vec<ValType>,
        local_names: Vec<(u32, SmolStr)>,
        body: Vec<Insn>,
    ) -> FuncId {
        self.push_func_anon(
            SmolStr::new(name),
            FuncKind::Local {
                type_idx,
                locals,
                local_names,
                body,
            },
        )
    }

    /// Add a named auxiliary function (runtime helpers and their per-tag
    /// inner functions); the name is registered so repeated builds can be
    /// detected with [`Self::has_func`].
    pub fn add_func(
        &mut self,
        name: &str,
        params: Vec<ValType>,
        results: Vec<ValType>,
        locals: Vec<ValType>,
        body: Vec<Insn>,
    ) -> FuncId {
        let type_idx = self.func_type(params, results);
        self.push_func(
            SmolStr::new(name),
            FuncKind::Local {
                type_idx,
                locals,
                local_names: Vec::new(),
                body,
            },
        )
    }

    pub fn export_func(&mut self, id: FuncId, name: &str) {
        self.exports.push((SmolStr::new(name), id));
    }

    /// Register a passive data segment and return its index.
    pub fn add_data(&mut self, bytes: &[u8]) -> u32 {
        let idx = self.data.len() as u32;
        self.data.push(bytes.to_vec());
        idx
    }

    /// Serialise the module.
    pub fn finish(&self) -> Vec<u8> {
        // Final index space: imports first, then defined functions.
        let import_count = self
            .funcs
            .iter()
            .filter(|f| matches!(f.kind, FuncKind::Import { .. }))
            .count() as u32;
        let mut index_map = vec![0u32; self.funcs.len()];
        let mut next_import = 0u32;
        let mut next_local = import_count;
        for (i, entry) in self.funcs.iter().enumerate() {
            match entry.kind {
                FuncKind::Import { .. } => {
                    index_map[i] = next_import;
                    next_import += 1;
                }
                FuncKind::Local { .. } => {
                    index_map[i] = next_local;
                    next_local += 1;
                }
                FuncKind::Pending { .. } => {
                    panic!("function `{}` declared but never built", entry.name);
                }
            }
        }

        // Lower all bodies, collecting ref.func targets on the way.
        let mut lowering = Lowering::new(&index_map);
        let mut code = CodeSection::new();
        let mut function_section = FunctionSection::new();
        let mut local_name_map = IndirectNameMap::new();
        for (i, entry) in self.funcs.iter().enumerate() {
            if let FuncKind::Local {
                type_idx,
                locals,
                local_names,
                body,
            } = &entry.kind
            {
                function_section.function(*type_idx);
                let mut func = Function::new_with_locals_types(locals.iter().copied());
                lowering.lower(body, &mut func);
                func.instruction(&wasm_encoder::Instruction::End);
                code.function(&func);
                if !local_names.is_empty() {
                    let mut map = NameMap::new();
                    for (idx, name) in local_names {
                        map.append(*idx, name);
                    }
                    local_name_map.append(index_map[i], &map);
                }
            }
        }

        let mut type_section = TypeSection::new();
        type_section.rec(types::heap_types());
        for (params, results) in &self.extra_types {
            type_section.function(params.iter().copied(), results.iter().copied());
        }

        let mut import_section = ImportSection::new();
        for entry in &self.funcs {
            if let FuncKind::Import {
                module,
                field,
                type_idx,
            } = &entry.kind
            {
                import_section.import(module, field, EntityType::Function(*type_idx));
            }
        }

        let mut tag_section = TagSection::new();
        tag_section.tag(TagType {
            kind: TagKind::Exception,
            func_type_idx: self.tag_type,
        });

        let mut export_section = ExportSection::new();
        for (name, id) in &self.exports {
            export_section.export(name, ExportKind::Func, index_map[id.0]);
        }
        export_section.export("error", ExportKind::Tag, types::ERROR_TAG);

        let mut referenced = lowering.referenced;
        referenced.sort_unstable();
        referenced.dedup();

        let mut function_names = NameMap::new();
        let mut named: Vec<(u32, &SmolStr)> = self
            .funcs
            .iter()
            .enumerate()
            .map(|(i, entry)| (index_map[i], &entry.name))
            .collect();
        named.sort_unstable_by_key(|(idx, _)| *idx);
        for (idx, name) in named {
            function_names.append(idx, name);
        }

        let mut names = NameSection::new();
        names.module("wumbo");
        names.functions(&function_names);
        names.locals(&local_name_map);
        names.types(&types::type_names());

        let mut module = Module::new();
        module.section(&type_section);
        module.section(&import_section);
        module.section(&function_section);
        module.section(&tag_section);
        module.section(&export_section);
        if !referenced.is_empty() {
            let mut elements = ElementSection::new();
            elements.declared(Elements::Functions(referenced.as_slice()));
            module.section(&elements);
        }
        if !self.data.is_empty() {
            module.section(&DataCountSection {
                count: self.data.len() as u32,
            });
        }
        module.section(&code);
        if !self.data.is_empty() {
            let mut data_section = DataSection::new();
            for segment in &self.data {
                data_section.passive(segment.iter().copied());
            }
            module.section(&data_section);
        }
        module.section(&names);
        module.finish()
    }
}

impl Default for ModuleBuilder {
    fn default() -> Self {
        Self::new()
    }
}
