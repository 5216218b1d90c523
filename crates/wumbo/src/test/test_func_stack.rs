// Backend function-stack tests: helper pooling, shadowing, upvalue lookup

use wasm_encoder::ValType;

use crate::backend::{FunctionStack, VarType};
use crate::wasm::types;

fn stack_with_frame() -> FunctionStack {
    let mut stack = FunctionStack::default();
    stack.push_function(2, None);
    stack
}

#[test]
fn test_helper_pool_reuses_freed_slot() {
    let mut stack = stack_with_frame();
    let a = stack.alloc_helper(types::anyref());
    stack.free_local(a);
    let b = stack.alloc_helper(types::anyref());
    assert_eq!(a, b);
}

#[test]
fn test_helper_pool_respects_type() {
    let mut stack = stack_with_frame();
    let a = stack.alloc_helper(types::anyref());
    stack.free_local(a);
    let b = stack.alloc_helper(ValType::I32);
    assert_ne!(a, b);
}

#[test]
fn test_lua_local_not_reused_while_live() {
    let mut stack = stack_with_frame();
    stack.push_block();
    let x = stack.alloc_lua_local("x", types::anyref());
    let h = stack.alloc_helper(types::anyref());
    assert_ne!(x, h);
}

#[test]
fn test_block_pop_releases_lua_locals() {
    let mut stack = stack_with_frame();
    stack.push_block();
    let x = stack.alloc_lua_local("x", types::anyref());
    stack.pop_block();
    // the dead slot is reusable and no longer findable
    let y = stack.alloc_lua_local("y", types::anyref());
    assert_eq!(x, y);
    let (kind, _, _) = stack.find("x");
    assert_eq!(kind, VarType::Global);
}

#[test]
fn test_shadowing_resolves_to_innermost() {
    let mut stack = stack_with_frame();
    stack.push_block();
    let outer = stack.alloc_lua_local("x", types::anyref());
    stack.push_block();
    let inner = stack.alloc_lua_local("x", types::anyref());
    let (kind, index, _) = stack.find("x");
    assert_eq!(kind, VarType::Local);
    assert_eq!(index, inner);
    stack.pop_block();
    let (kind, index, _) = stack.find("x");
    assert_eq!(kind, VarType::Local);
    assert_eq!(index, outer);
}

#[test]
fn test_cross_frame_lookup_is_upvalue() {
    let mut stack = stack_with_frame();
    stack.push_block();
    stack.alloc_lua_local("x", types::anyref());
    stack.push_function(2, None);
    let (kind, _, _) = stack.find("x");
    assert_eq!(kind, VarType::Upvalue);
    stack.pop_function();
    let (kind, _, _) = stack.find("x");
    assert_eq!(kind, VarType::Local);
}

#[test]
fn test_local_offset_accounts_for_args() {
    let mut stack = stack_with_frame();
    let first = stack.alloc_lua_local("x", types::anyref());
    // the two fixed arguments (upvalue array, arg array) come first
    assert_eq!(first, 2);
}

#[test]
fn test_local_types_lists_frame_slots() {
    let mut stack = stack_with_frame();
    stack.alloc_lua_local("x", types::anyref());
    stack.alloc_helper(ValType::I32);
    assert_eq!(stack.local_types(), vec![types::anyref(), ValType::I32]);
}
