// Scope analysis: a single pre-pass that classifies every name reference as
// local / upvalue / global and fills the usage record of each declaration.

use super::func_stack::{FunctionStack, VarType};
use super::*;

pub struct Analyzer {
    stack: FunctionStack,
}

/// Run scope analysis over a parsed chunk. Usage records are shared
/// (`Rc<RefCell<…>>`) between the tree and the analyser, so the tree itself
/// is not rewritten.
pub fn analyze(chunk: &Block) {
    let mut a = Analyzer::new();
    a.block(chunk);
}

impl Analyzer {
    pub fn new() -> Self {
        let mut stack = FunctionStack::default();
        // The chunk resolves globals through an ambient _ENV; the code
        // generator installs the real one in the wrapper frame.
        let env_usage = new_usage();
        {
            let mut usage = env_usage.borrow_mut();
            usage.upvalue = true;
            usage.read_count = 1;
        }
        stack.alloc_local("_ENV", env_usage);
        Analyzer { stack }
    }

    fn get_var(&mut self, name: &str) {
        let (kind, usage) = self.stack.find(name);
        match kind {
            VarType::Local | VarType::Upvalue => {
                let usage = usage.expect("bound variable carries a usage record");
                let mut usage = usage.borrow_mut();
                if kind == VarType::Upvalue {
                    usage.upvalue = true;
                }
                usage.read_count += 1;
            }
            VarType::Global => {
                debug_assert!(name != "_ENV", "no environment set");
                self.get_var("_ENV");
            }
        }
    }

    fn set_var(&mut self, name: &str) {
        let (kind, usage) = self.stack.find(name);
        match kind {
            VarType::Local | VarType::Upvalue => {
                let usage = usage.expect("bound variable carries a usage record");
                let mut usage = usage.borrow_mut();
                if kind == VarType::Upvalue {
                    usage.upvalue = true;
                }
                usage.write_count += 1;
            }
            // A global write is an _ENV read followed by a table store.
            VarType::Global => self.get_var("_ENV"),
        }
    }

    pub fn block(&mut self, block: &Block) {
        self.stack.push_block();
        for statement in &block.statements {
            self.statement(statement);
        }
        if let Some(ret) = &block.ret {
            self.expression_list(ret);
        }
        self.stack.pop_block();
    }

    /// `repeat` bodies share a scope with their condition.
    fn repeat_block(&mut self, body: &Block, condition: &Expression) {
        self.stack.push_block();
        for statement in &body.statements {
            self.statement(statement);
        }
        if let Some(ret) = &body.ret {
            self.expression_list(ret);
        }
        self.expression(condition);
        self.stack.pop_block();
    }

    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Assignment { targets, values } => {
                self.expression_list(values);
                for target in targets {
                    self.assign_target(target);
                }
            }
            Statement::Call(prefix) => self.prefix(prefix),
            Statement::Label(_) | Statement::Break | Statement::Goto(_) => {}
            Statement::Do(inner) => self.block(inner),
            Statement::While { condition, body } => {
                self.expression(condition);
                self.block(body);
            }
            Statement::Repeat { body, condition } => self.repeat_block(body, condition),
            Statement::If { arms, else_block } => {
                for (condition, body) in arms {
                    self.expression(condition);
                    self.block(body);
                }
                if let Some(body) = else_block {
                    self.block(body);
                }
            }
            Statement::NumericFor {
                var,
                usage,
                exps,
                body,
            } => {
                self.expression_list(exps);
                self.stack.push_block();
                self.stack.alloc_local(var.clone(), usage.clone());
                self.block(body);
                self.stack.pop_block();
            }
            Statement::GenericFor {
                names,
                usage,
                exps,
                body,
            } => {
                self.expression_list(exps);
                self.stack.push_block();
                for (name, usage) in names.iter().zip(usage) {
                    self.stack.alloc_local(name.clone(), usage.clone());
                }
                self.block(body);
                self.stack.pop_block();
            }
            Statement::Function { path, body } => {
                self.function_body(body);
                if path.len() == 1 {
                    self.set_var(&path[0]);
                } else {
                    self.get_var(&path[0]);
                }
            }
            Statement::LocalFunction { name, usage, body } => {
                // Visible inside its own body, and the binding itself counts
                // as a write so a captured recursive function gets a cell.
                usage.borrow_mut().write_count += 1;
                usage.borrow_mut().init = true;
                self.stack.alloc_local(name.clone(), usage.clone());
                self.function_body(body);
            }
            Statement::Local { names, usage, exps } => {
                self.expression_list(exps);
                for (name, usage) in names.iter().zip(usage) {
                    self.stack.alloc_local(name.clone(), usage.clone());
                }
            }
        }
    }

    fn assign_target(&mut self, target: &PrefixExp) {
        if target.tail.is_empty() {
            match &target.head {
                PrefixHead::Name(name) => self.set_var(name),
                PrefixHead::Paren(exp) => self.expression(exp),
            }
            return;
        }
        match &target.head {
            PrefixHead::Name(name) => self.get_var(name),
            PrefixHead::Paren(exp) => self.expression(exp),
        }
        for tail in &target.tail {
            match tail {
                PrefixTail::Field(_) => {}
                PrefixTail::Index(exp) => self.expression(exp),
                PrefixTail::Call { args, .. } => self.expression_list(args),
            }
        }
    }

    fn prefix(&mut self, prefix: &PrefixExp) {
        match &prefix.head {
            PrefixHead::Name(name) => self.get_var(name),
            PrefixHead::Paren(exp) => self.expression(exp),
        }
        for tail in &prefix.tail {
            match tail {
                PrefixTail::Field(_) => {}
                PrefixTail::Index(exp) => self.expression(exp),
                PrefixTail::Call { args, .. } => self.expression_list(args),
            }
        }
    }

    fn function_body(&mut self, body: &FunctionBody) {
        self.stack.push_function();
        for (param, usage) in body.params.iter().zip(&body.usage) {
            self.stack.alloc_local(param.clone(), usage.clone());
        }
        self.block(&body.block);
        self.stack.pop_function();
    }

    fn expression(&mut self, exp: &Expression) {
        match exp {
            Expression::Nil
            | Expression::Boolean(_)
            | Expression::Integer(_)
            | Expression::Number(_)
            | Expression::Literal(_)
            | Expression::Ellipsis => {}
            Expression::Function(body) => self.function_body(body),
            Expression::Prefix(prefix) => self.prefix(prefix),
            Expression::Table(fields) => {
                for field in fields {
                    if let FieldKey::Bracket(key) = &field.key {
                        self.expression(key);
                    }
                    self.expression(&field.value);
                }
            }
            Expression::Binary(op) => {
                self.expression(&op.lhs);
                self.expression(&op.rhs);
            }
            Expression::Unary(op) => self.expression(&op.rhs),
        }
    }

    fn expression_list(&mut self, list: &[Expression]) {
        for exp in list {
            self.expression(exp);
        }
    }
}
