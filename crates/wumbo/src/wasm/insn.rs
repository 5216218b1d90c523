// Symbolic instruction list with named labels and symbolic function ids.
//
// wasm-encoder wants branch targets as relative depths and callees as final
// function indices, neither of which is known while the code generator runs.
// The generator therefore builds `Insn` trees; `lower` resolves labels and
// ids when the module is assembled.

use std::borrow::Cow;

use smol_str::SmolStr;
use wasm_encoder::{BlockType, Catch, Function, Instruction, RefType, ValType};

/// Index into the module builder's function list; stable across the build,
/// mapped to the final wasm index (imports first) at assembly time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub usize);

#[derive(Debug, Clone)]
pub enum Insn {
    Op(Instruction<'static>),
    Block {
        label: Option<SmolStr>,
        result: Option<ValType>,
        body: Vec<Insn>,
    },
    Loop {
        label: SmolStr,
        result: Option<ValType>,
        body: Vec<Insn>,
    },
    If {
        result: Option<ValType>,
        then_body: Vec<Insn>,
        else_body: Vec<Insn>,
    },
    Br(SmolStr),
    BrIf(SmolStr),
    BrOnNull(SmolStr),
    BrOnCast {
        target: SmolStr,
        from: RefType,
        to: RefType,
    },
    BrTable {
        targets: Vec<SmolStr>,
        default: SmolStr,
    },
    Call(FuncId),
    ReturnCall(FuncId),
    RefFunc(FuncId),
    /// `try_table` with a single catch clause for the error tag.
    TryTable {
        tag: u32,
        handler: SmolStr,
        body: Vec<Insn>,
    },
}

pub type InsnList = Vec<Insn>;

fn block_type(result: Option<ValType>) -> BlockType {
    match result {
        Some(ty) => BlockType::Result(ty),
        None => BlockType::Empty,
    }
}

pub(super) struct Lowering<'a> {
    /// FuncId -> final function index.
    pub index_map: &'a [u32],
    /// Functions referenced by `ref.func`, for the declarative element segment.
    pub referenced: Vec<u32>,
    labels: Vec<Option<SmolStr>>,
}

impl<'a> Lowering<'a> {
    pub fn new(index_map: &'a [u32]) -> Self {
        Lowering {
            index_map,
            referenced: Vec::new(),
            labels: Vec::new(),
        }
    }

    fn depth_of(&self, name: &str) -> u32 {
        for (pos, label) in self.labels.iter().enumerate().rev() {
            if label.as_deref() == Some(name) {
                return (self.labels.len() - 1 - pos) as u32;
            }
        }
        panic!("unresolved label `{name}`");
    }

    fn func_index(&self, id: FuncId) -> u32 {
        self.index_map[id.0]
    }

    pub fn lower(&mut self, body: &[Insn], func: &mut Function) {
        for insn in body {
            match insn {
                Insn::Op(op) => {
                    func.instruction(op);
                }
                Insn::Block {
                    label,
                    result,
                    body,
                } => {
                    func.instruction(&Instruction::Block(block_type(*result)));
                    self.labels.push(label.clone());
                    self.lower(body, func);
                    self.labels.pop();
                    func.instruction(&Instruction::End);
                }
                Insn::Loop {
                    label,
                    result,
                    body,
                } => {
                    func.instruction(&Instruction::Loop(block_type(*result)));
                    self.labels.push(Some(label.clone()));
                    self.lower(body, func);
                    self.labels.pop();
                    func.instruction(&Instruction::End);
                }
                Insn::If {
                    result,
                    then_body,
                    else_body,
                } => {
                    func.instruction(&Instruction::If(block_type(*result)));
                    self.labels.push(None);
                    self.lower(then_body, func);
                    if !else_body.is_empty() {
                        func.instruction(&Instruction::Else);
                        self.lower(else_body, func);
                    }
                    self.labels.pop();
                    func.instruction(&Instruction::End);
                }
                Insn::Br(target) => {
                    func.instruction(&Instruction::Br(self.depth_of(target)));
                }
                Insn::BrIf(target) => {
                    func.instruction(&Instruction::BrIf(self.depth_of(target)));
                }
                Insn::BrOnNull(target) => {
                    func.instruction(&Instruction::BrOnNull(self.depth_of(target)));
                }
                Insn::BrOnCast { target, from, to } => {
                    func.instruction(&Instruction::BrOnCast {
                        relative_depth: self.depth_of(target),
                        from_ref_type: *from,
                        to_ref_type: *to,
                    });
                }
                Insn::BrTable { targets, default } => {
                    let depths: Vec<u32> = targets.iter().map(|t| self.depth_of(t)).collect();
                    func.instruction(&Instruction::BrTable(
                        Cow::Owned(depths),
                        self.depth_of(default),
                    ));
                }
                Insn::Call(id) => {
                    func.instruction(&Instruction::Call(self.func_index(*id)));
                }
                Insn::ReturnCall(id) => {
                    func.instruction(&Instruction::ReturnCall(self.func_index(*id)));
                }
                Insn::RefFunc(id) => {
                    let index = self.func_index(*id);
                    self.referenced.push(index);
                    func.instruction(&Instruction::RefFunc(index));
                }
                Insn::TryTable { tag, handler, body } => {
                    self.labels.push(None);
                    let label = self.depth_of(handler);
                    func.instruction(&Instruction::TryTable(
                        BlockType::Empty,
                        Cow::Owned(vec![Catch::One { tag: *tag, label }]),
                    ));
                    self.lower(body, func);
                    self.labels.pop();
                    func.instruction(&Instruction::End);
                }
            }
        }
    }
}
