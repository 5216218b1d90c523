// End-to-end compilation tests: every emitted module must validate with the
// GC, exception-handling, reference-types, bulk-memory and tail-call
// proposals enabled, and the module surface must match the output mode.

use wasmparser::{Parser, Payload, Validator, WasmFeatures};

use crate::{compile, compile_runtime, CompileError, Mode, Options};

fn validate(bytes: &[u8]) {
    let mut validator = Validator::new_with_features(WasmFeatures::all());
    if let Err(e) = validator.validate_all(bytes) {
        panic!("emitted module does not validate: {e}");
    }
}

fn compile_ok(source: &str) -> Vec<u8> {
    let bytes = compile(source, &Options::default()).expect("compilation succeeds");
    validate(&bytes);
    bytes
}

fn compile_err(source: &str) -> CompileError {
    compile(source, &Options::default()).expect_err("compilation fails")
}

fn exports(bytes: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    for payload in Parser::new(0).parse_all(bytes) {
        if let Payload::ExportSection(reader) = payload.unwrap() {
            for export in reader {
                names.push(export.unwrap().name.to_string());
            }
        }
    }
    names
}

fn imports(bytes: &[u8]) -> Vec<(String, String)> {
    let mut names = Vec::new();
    for payload in Parser::new(0).parse_all(bytes) {
        if let Payload::ImportSection(reader) = payload.unwrap() {
            for import in reader {
                let import = import.unwrap();
                names.push((import.module.to_string(), import.name.to_string()));
            }
        }
    }
    names
}

// ── end-to-end programs ─────────────────────────────────────────────────

#[test]
fn test_arithmetic_print() {
    compile_ok("print(1 + 2)");
}

#[test]
fn test_numeric_for_print() {
    compile_ok("for i = 1, 3 do print(i) end");
}

#[test]
fn test_user_iterator() {
    compile_ok(
        r#"
        local t = {10, 20, 30}
        local function ipairs_fallback(t)
            local i = 0
            return function()
                i = i + 1
                if t[i] ~= nil then return i, t[i] end
            end
        end
        for i, v in ipairs_fallback(t) do print(v) end
    "#,
    );
}

#[test]
fn test_pcall_error() {
    compile_ok(
        r#"
        local ok, e = pcall(function() error("boom") end)
        print(ok)
        print(e)
    "#,
    );
}

#[test]
fn test_vararg_shuffle() {
    compile_ok(
        r#"
        local function f(a, b, ...) return b, a, ... end
        print(f(1, 2, 3, 4))
    "#,
    );
}

#[test]
fn test_table_mixed_keys() {
    compile_ok(
        r#"
        local t = {}
        t.a = 1
        t["b"] = 2
        t[3] = 3
        print(t.a + t.b + t[3])
    "#,
    );
}

// ── invariant programs ──────────────────────────────────────────────────

#[test]
fn test_literal_round_trips() {
    for literal in [
        "nil", "true", "false", "0", "1", "-1", "4611686018427387904", "0.0", "-0.0", "1.5",
        "\"\"", "\"abc\"",
    ] {
        compile_ok(&format!("return {literal}"));
    }
}

#[test]
fn test_truthiness_conditional() {
    compile_ok("local v = f() if v then return 1 else return 0 end");
}

#[test]
fn test_short_circuit() {
    compile_ok(
        r#"
        local a = false and error("x")
        local b = true or error("x")
        return a, b
    "#,
    );
}

#[test]
fn test_multiple_return_narrowing() {
    compile_ok(
        r#"
        local function f() return 1, 2 end
        local function g() return 3, 4 end
        local a = f()
        local b, c = f()
        return f(), g()
    "#,
    );
}

#[test]
fn test_vararg_identity() {
    compile_ok("local function id(...) return ... end return id(1, 2, 3)");
}

#[test]
fn test_closure_counter() {
    compile_ok(
        r#"
        local function mk()
            local x = 0
            return function() x = x + 1 return x end
        end
        local f = mk()
        return f(), f(), f()
    "#,
    );
}

#[test]
fn test_lexical_shadowing() {
    compile_ok("local x = 1 do local x = 2 end return x");
}

#[test]
fn test_break_in_nested_loops() {
    compile_ok(
        r#"
        while a do
            while b do
                break
            end
            c()
        end
    "#,
    );
}

#[test]
fn test_goto_forward_and_backward() {
    compile_ok(
        r#"
        do goto done end
        ::done::
        ::again::
        x = x + 1
        if x < 3 then goto again end
    "#,
    );
}

#[test]
fn test_repeat_condition_sees_body_locals() {
    compile_ok("repeat local done = f() until done");
}

#[test]
fn test_method_definition_and_call() {
    compile_ok(
        r#"
        local t = {}
        function t:m(x) return self, x end
        t:m(1)
    "#,
    );
}

#[test]
fn test_concat_and_length() {
    compile_ok("return \"a\" .. \"b\" .. 1, #\"abc\"");
}

#[test]
fn test_generic_for_with_break() {
    compile_ok(
        r#"
        for k, v in next, t do
            if v then break end
        end
    "#,
    );
}

#[test]
fn test_table_constructor_with_spread() {
    compile_ok(
        r#"
        local function f() return 2, 3 end
        local t = {1, f()}
        local u = {f(), 1}
        local w = {x = 1, [2] = 3, f()}
    "#,
    );
}

#[test]
fn test_deeply_nested_closures() {
    compile_ok(
        r#"
        local function outer(x)
            return function(y)
                return function(z)
                    x = x + 1
                    return x + y + z
                end
            end
        end
        return outer(1)(2)(3)
    "#,
    );
}

#[test]
fn test_numeric_for_negative_step() {
    compile_ok("for i = 10, 1, -1 do print(i) end");
}

// ── semantic errors ─────────────────────────────────────────────────────

#[test]
fn test_break_outside_loop() {
    let err = compile_err("break");
    assert!(err.to_string().contains("break outside loop"));
}

#[test]
fn test_vararg_outside_vararg_function() {
    let err = compile_err("local f = function(a) return ... end");
    assert!(err.to_string().contains("outside a vararg function"));
}

#[test]
fn test_goto_without_label() {
    let err = compile_err("goto nowhere");
    assert!(err.to_string().contains("no visible label"));
}

#[test]
fn test_goto_into_inner_block_is_rejected() {
    let err = compile_err("goto inner do ::inner:: end");
    assert!(err.to_string().contains("no visible label"));
}

#[test]
fn test_duplicate_label() {
    let err = compile_err("::l:: ::l::");
    assert!(err.to_string().contains("already defined"));
}

#[test]
fn test_label_out_of_scope() {
    let err = compile_err("do ::l:: end goto l");
    assert!(err.to_string().contains("no visible label"));
}

#[test]
fn test_parse_error_reported() {
    let err = compile_err("local = 5");
    assert!(matches!(err, CompileError::Parse(_)));
}

// ── module surface per mode ─────────────────────────────────────────────

#[test]
fn test_standalone_surface() {
    let bytes = compile_ok("print(1)");
    let exported = exports(&bytes);
    assert!(exported.contains(&"start".to_string()));
    assert!(exported.contains(&"error".to_string()));
    // standalone modules import only host functions
    for (module, _) in imports(&bytes) {
        assert_ne!(module, "runtime");
    }
}

#[test]
fn test_minimal_mode_imports_runtime() {
    let bytes = compile("print(1 + 2)", &Options {
        mode: Mode::Minimal,
        optimize: 0,
    })
    .unwrap();
    validate(&bytes);
    let imported = imports(&bytes);
    assert!(imported.contains(&("runtime".to_string(), "invoke".to_string())));
    assert!(imported.contains(&("runtime".to_string(), "addition".to_string())));
    assert!(imported.contains(&("runtime".to_string(), "to_string".to_string())));
}

#[test]
fn test_runtime_module_exports_catalogue() {
    let bytes = compile_runtime(&Options::default()).unwrap();
    validate(&bytes);
    let exported = exports(&bytes);
    for name in [
        "table_get",
        "table_set",
        "to_bool",
        "addition",
        "division_floor",
        "equality",
        "concat",
        "to_string",
        "to_number",
        "lua_str_to_js_array",
        "js_array_to_lua_str",
        "invoke",
        "error",
    ] {
        assert!(
            exported.contains(&name.to_string()),
            "runtime module is missing export {name}"
        );
    }
}

#[test]
fn test_host_import_surface() {
    let bytes = compile_ok("print(tostring(1.5))");
    let imported = imports(&bytes);
    assert!(imported.contains(&("native".to_string(), "stdout".to_string())));
    assert!(imported.contains(&("native".to_string(), "toString".to_string())));
    assert!(imported.contains(&("buffer".to_string(), "new".to_string())));
    assert!(imported.contains(&("buffer".to_string(), "set".to_string())));
}

#[test]
fn test_compile_is_deterministic() {
    let source = "local t = {1, 2} for i = 1, 2 do print(t[i]) end";
    let first = compile(source, &Options::default()).unwrap();
    let second = compile(source, &Options::default()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_empty_chunk() {
    compile_ok("");
}
