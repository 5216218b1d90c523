// Analysis-time stack of local declarations

use super::{Name, UsageRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Local,
    Upvalue,
    Global,
}

struct LocalVar {
    name: Name,
    usage: UsageRef,
}

struct FunctionInfo {
    offset: usize,
}

/// Tracks which locals are visible while the analyser walks the tree.
/// Blocks truncate back to their entry point; function frames additionally
/// mark the boundary that turns a hit into an upvalue.
#[derive(Default)]
pub struct FunctionStack {
    blocks: Vec<usize>,
    functions: Vec<FunctionInfo>,
    vars: Vec<LocalVar>,
}

impl FunctionStack {
    pub fn push_block(&mut self) {
        self.blocks.push(self.vars.len());
    }

    pub fn pop_block(&mut self) {
        let mark = self.blocks.pop().unwrap_or(0);
        self.vars.truncate(mark);
    }

    pub fn push_function(&mut self) {
        self.functions.push(FunctionInfo {
            offset: self.vars.len(),
        });
    }

    pub fn pop_function(&mut self) {
        if let Some(func) = self.functions.pop() {
            self.vars.truncate(func.offset);
        }
    }

    fn is_index_local(&self, index: usize) -> bool {
        match self.functions.last() {
            Some(func) => index >= func.offset,
            None => true,
        }
    }

    pub fn alloc_local(&mut self, name: impl Into<Name>, usage: UsageRef) {
        self.vars.push(LocalVar {
            name: name.into(),
            usage,
        });
    }

    /// Innermost binding for `name`, or `Global` when unbound.
    pub fn find(&self, name: &str) -> (VarType, Option<UsageRef>) {
        for (pos, var) in self.vars.iter().enumerate().rev() {
            if var.name == name {
                let kind = if self.is_index_local(pos) {
                    VarType::Local
                } else {
                    VarType::Upvalue
                };
                return (kind, Some(var.usage.clone()));
            }
        }
        (VarType::Global, None)
    }
}
