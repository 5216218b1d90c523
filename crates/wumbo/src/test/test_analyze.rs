// Scope analyser tests: read/write counts and upvalue classification

use crate::ast::analyze::analyze;
use crate::ast::*;
use crate::parser::parse;

fn analyzed(source: &str) -> Block {
    let block = parse(source).unwrap();
    analyze(&block);
    block
}

fn local_usage(block: &Block, index: usize) -> Vec<UsageRef> {
    match &block.statements[index] {
        Statement::Local { usage, .. } => usage.clone(),
        other => panic!("expected local statement, got {:?}", other),
    }
}

#[test]
fn test_read_write_counts() {
    let block = analyzed("local x = 1 x = 2 x = x + x");
    let usage = local_usage(&block, 0);
    let usage = usage[0].borrow();
    assert_eq!(usage.write_count, 2);
    assert_eq!(usage.read_count, 2);
    assert!(!usage.upvalue);
}

#[test]
fn test_captured_read_only_local() {
    let block = analyzed("local x = 1 local f = function() return x end");
    let usage = local_usage(&block, 0);
    let usage = usage[0].borrow();
    assert!(usage.upvalue);
    assert_eq!(usage.write_count, 0);
    // read without writes stays a plain slot
    assert!(!usage.is_upvalue());
}

#[test]
fn test_captured_written_local_needs_cell() {
    let block = analyzed("local x = 0 local f = function() x = x + 1 end");
    let usage = local_usage(&block, 0);
    assert!(usage[0].borrow().is_upvalue());
}

#[test]
fn test_capture_across_two_frames() {
    let block = analyzed(
        "local x = 0
         local f = function() return function() x = 1 end end",
    );
    let usage = local_usage(&block, 0);
    assert!(usage[0].borrow().is_upvalue());
}

#[test]
fn test_shadowing_keeps_outer_counts() {
    let block = analyzed("local x = 1 do local x = 2 x = x end x = 3");
    let outer = local_usage(&block, 0);
    assert_eq!(outer[0].borrow().write_count, 1);
    assert_eq!(outer[0].borrow().read_count, 0);
}

#[test]
fn test_scope_ends_with_block() {
    // the inner x dies with the do-block; the final read is of the outer x
    let block = analyzed("local x = 1 do local x = 2 end return x");
    let outer = local_usage(&block, 0);
    assert_eq!(outer[0].borrow().read_count, 1);
}

#[test]
fn test_recursive_local_function() {
    let block = analyzed("local function f(n) return f(n) end");
    match &block.statements[0] {
        Statement::LocalFunction { usage, .. } => {
            let usage = usage.borrow();
            // the binding counts as a write, recursion reads through it
            assert!(usage.upvalue);
            assert!(usage.is_upvalue());
            assert_eq!(usage.read_count, 1);
        }
        other => panic!("expected local function, got {:?}", other),
    }
}

#[test]
fn test_parameters_are_locals() {
    let block = analyzed("local f = function(a) a = a + 1 return a end");
    match &block.statements[0] {
        Statement::Local { exps, .. } => match &exps[0] {
            Expression::Function(body) => {
                let usage = body.usage[0].borrow();
                assert_eq!(usage.write_count, 1);
                assert_eq!(usage.read_count, 2);
                assert!(!usage.upvalue);
            }
            other => panic!("expected function expression, got {:?}", other),
        },
        other => panic!("expected local statement, got {:?}", other),
    }
}

#[test]
fn test_for_variables_are_scoped() {
    let block = analyzed("for i = 1, 3 do print(i) end");
    match &block.statements[0] {
        Statement::NumericFor { usage, .. } => {
            assert_eq!(usage.borrow().read_count, 1);
        }
        other => panic!("expected numeric for, got {:?}", other),
    }
}

#[test]
fn test_generic_for_captured_variable() {
    let block = analyzed(
        "for k, v in next, t do
            f = function() return v end
         end",
    );
    match &block.statements[0] {
        Statement::GenericFor { usage, .. } => {
            assert!(usage[1].borrow().upvalue);
        }
        other => panic!("expected generic for, got {:?}", other),
    }
}
