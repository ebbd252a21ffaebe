mod common;

use common::{Machine, MAX_STEPS};
use ucode_compiler::ir::{BinOp, Instr, Location};
use ucode_compiler::{
    compile_statements, compile_unit, CompileError, CompileOptions, Expr, Stmt, Symbol,
    SymbolTable,
};

fn var(name: &str, expr: Expr) -> Stmt {
    Stmt::VarDecl {
        name: name.to_string(),
        expr,
        mutable: true,
    }
}

fn constant(name: &str, expr: Expr) -> Stmt {
    Stmt::VarDecl {
        name: name.to_string(),
        expr,
        mutable: false,
    }
}

fn assign(name: &str, expr: Expr) -> Stmt {
    Stmt::Assign {
        name: name.to_string(),
        expr,
    }
}

fn execute(stmts: &[Stmt], optimize: bool) -> (SymbolTable, Machine) {
    let mut symbols = SymbolTable::new();
    let options = CompileOptions {
        optimize,
        ..CompileOptions::default()
    };
    let (_, program) = compile_unit(stmts, &mut symbols, &options).expect("compiles");
    let mut machine = Machine::new();
    machine.run(&program, MAX_STEPS);
    (symbols, machine)
}

fn lower_err(stmts: &[Stmt]) -> CompileError {
    let mut symbols = SymbolTable::new();
    compile_statements(stmts, &mut symbols, &CompileOptions::default()).unwrap_err()
}

// ── Declarations ─────────────────────────────────────────────────────────

#[test]
fn declaration_copies_initializer_through_pointer() {
    let mut symbols = SymbolTable::new();
    let ir = compile_statements(&[var("x", Expr::u8(1))], &mut symbols, &CompileOptions::default())
        .unwrap();

    assert_eq!(
        ir.instrs,
        vec![
            Instr::StoreImmediate16(Location::Address(0x0010), 0x0110),
            Instr::StoreImmediate(Location::Address(0x0012), 1),
            Instr::CopyWordsIndirectDestination {
                dst_ptr: Location::Address(0x0010),
                src: Location::Address(0x0012),
                count: 1,
            },
        ]
    );
    assert_eq!(symbols.lookup("x"), Some(&Symbol::new(0x0110, 1, true)));
}

#[test]
fn declared_value_lands_in_static_storage() {
    let (_, m) = execute(&[var("x", Expr::u8(1))], true);
    assert_eq!(m.ram[0x0110], 1);
}

#[test]
fn declarations_are_packed_in_order() {
    let stmts = [
        var("a", Expr::u8(0x11)),
        var("w", Expr::u16(0x1234)),
        constant("c", Expr::u8(0x22)),
    ];
    let (symbols, m) = execute(&stmts, true);

    assert_eq!(symbols.lookup("a").map(|s| s.address), Some(0x0110));
    assert_eq!(symbols.lookup("w").map(|s| (s.address, s.size)), Some((0x0111, 2)));
    assert_eq!(symbols.lookup("c").map(|s| s.mutable), Some(false));
    assert_eq!(m.ram[0x0110], 0x11);
    assert_eq!(m.read16(0x0111), 0x1234);
    assert_eq!(m.ram[0x0113], 0x22);
}

#[test]
fn initializer_may_read_earlier_declarations() {
    let stmts = [
        constant("base", Expr::u16(1000)),
        var(
            "total",
            Expr::binary(BinOp::Add, Expr::ident("base"), Expr::u8(234)),
        ),
    ];
    let (_, m) = execute(&stmts, true);
    assert_eq!(m.read16(0x0112), 1234);
}

#[test]
fn externally_declared_symbols_are_visible() {
    let mut symbols = SymbolTable::new();
    symbols
        .declare("port", Symbol::new(0x0300, 1, true))
        .unwrap();
    let stmts = [assign("port", Expr::u8(0x5a))];
    let (_, program) = compile_unit(&stmts, &mut symbols, &CompileOptions::default()).unwrap();
    let mut m = Machine::new();
    m.run(&program, MAX_STEPS);
    assert_eq!(m.ram[0x0300], 0x5a);
}

// ── Assignment ───────────────────────────────────────────────────────────

#[test]
fn byte_assigned_to_word_is_zero_extended() {
    let stmts = [var("w", Expr::u16(0xffff)), assign("w", Expr::u8(200))];
    let (_, m) = execute(&stmts, true);
    assert_eq!(m.read16(0x0110), 200);
}

#[test]
fn comparison_result_is_zero_or_one() {
    let stmts = [
        var("a", Expr::u16(0x0201)),
        var("lt", Expr::u8(9)),
        assign(
            "lt",
            Expr::binary(BinOp::Lt, Expr::ident("a"), Expr::u16(0x0202)),
        ),
    ];
    let (_, m) = execute(&stmts, true);
    assert_eq!(m.ram[0x0112], 1);
}

// ── Control flow ─────────────────────────────────────────────────────────

fn count_down() -> Vec<Stmt> {
    vec![
        var("count", Expr::u8(3)),
        var("total", Expr::u8(0)),
        Stmt::While {
            cond: Expr::ident("count"),
            body: vec![
                assign(
                    "total",
                    Expr::binary(BinOp::Add, Expr::ident("total"), Expr::ident("count")),
                ),
                assign(
                    "count",
                    Expr::binary(BinOp::Sub, Expr::ident("count"), Expr::u8(1)),
                ),
            ],
        },
    ]
}

#[test]
fn while_loop_sums_counter() {
    for optimize in [false, true] {
        let (_, m) = execute(&count_down(), optimize);
        assert_eq!(m.ram[0x0110], 0, "count (optimize = {optimize})");
        assert_eq!(m.ram[0x0111], 6, "total (optimize = {optimize})");
    }
}

#[test]
fn while_loop_ir_tests_at_the_top() {
    let mut symbols = SymbolTable::new();
    let ir = compile_statements(&count_down(), &mut symbols, &CompileOptions::default()).unwrap();
    let lines = ir.to_lines();

    let top = lines.iter().position(|l| l == ".Lir0:").expect("loop label");
    let test = lines
        .iter()
        .position(|l| l.starts_with("JZ .Lir1"))
        .expect("exit test");
    assert!(top < test);
    assert_eq!(lines[lines.len() - 2], "JMP .Lir0");
    assert_eq!(lines[lines.len() - 1], ".Lir1:");
}

fn branch(flag: u8) -> Vec<Stmt> {
    vec![
        constant("flag", Expr::u8(flag)),
        var("out", Expr::u8(0)),
        Stmt::If {
            cond: Expr::binary(BinOp::Eq, Expr::ident("flag"), Expr::u8(0)),
            then_branch: vec![assign("out", Expr::u8(7))],
            else_branch: Some(vec![assign("out", Expr::u8(9))]),
        },
    ]
}

#[test]
fn if_else_takes_one_branch() {
    assert_eq!(execute(&branch(0), true).1.ram[0x0111], 7);
    assert_eq!(execute(&branch(5), true).1.ram[0x0111], 9);
}

#[test]
fn if_without_else_falls_through() {
    let stmts = [
        var("out", Expr::u8(1)),
        Stmt::If {
            cond: Expr::u8(0),
            then_branch: vec![assign("out", Expr::u8(2))],
            else_branch: None,
        },
    ];
    assert_eq!(execute(&stmts, true).1.ram[0x0110], 1);
}

#[test]
fn word_condition_checks_both_bytes() {
    let stmts = [
        constant("big", Expr::u16(0x0100)),
        var("out", Expr::u8(0)),
        Stmt::If {
            cond: Expr::ident("big"),
            then_branch: vec![assign("out", Expr::u8(1))],
            else_branch: None,
        },
    ];
    assert_eq!(execute(&stmts, true).1.ram[0x0112], 1);
}

#[test]
fn expression_statement_leaves_storage_alone() {
    let stmts = [
        var("x", Expr::u8(4)),
        Stmt::Expr(Expr::binary(BinOp::Mul, Expr::ident("x"), Expr::u8(3))),
    ];
    let (_, m) = execute(&stmts, true);
    assert_eq!(m.ram[0x0110], 4);
}

// ── Rejected programs ────────────────────────────────────────────────────

#[test]
fn redefinition_is_rejected() {
    let err = lower_err(&[var("x", Expr::u8(1)), var("x", Expr::u8(2))]);
    assert_eq!(err, CompileError::Redefinition("x".into()));
}

#[test]
fn undefined_names_are_rejected() {
    let err = lower_err(&[assign("nope", Expr::u8(1))]);
    assert_eq!(err, CompileError::UndefinedSymbol("nope".into()));

    let err = lower_err(&[var("x", Expr::ident("missing"))]);
    assert_eq!(err, CompileError::UndefinedSymbol("missing".into()));
}

#[test]
fn constants_cannot_be_assigned() {
    let err = lower_err(&[constant("k", Expr::u8(1)), assign("k", Expr::u8(2))]);
    assert_eq!(err, CompileError::ImmutableStore("k".into()));
}

#[test]
fn word_does_not_fit_in_byte() {
    let err = lower_err(&[var("b", Expr::u8(0)), assign("b", Expr::u16(1))]);
    assert_eq!(
        err,
        CompileError::SizeMismatch {
            name: "b".into(),
            expected: 1,
            found: 2,
        }
    );
}

#[test]
fn static_storage_runs_out() {
    let options = CompileOptions {
        static_base: 0xffff,
        ..CompileOptions::default()
    };
    let mut symbols = SymbolTable::new();
    let err = compile_statements(&[var("w", Expr::u16(0))], &mut symbols, &options).unwrap_err();
    assert_eq!(err, CompileError::OutOfStaticStorage("w".into()));
}

#[test]
fn deep_expressions_exhaust_temporaries() {
    let options = CompileOptions {
        temporaries_limit: 0x0010 + 6,
        ..CompileOptions::default()
    };
    // Every left operand stays live while the right one is evaluated.
    let mut expr = Expr::u16(1);
    for _ in 0..4 {
        expr = Expr::binary(BinOp::Add, Expr::u16(1), expr);
    }
    let mut symbols = SymbolTable::new();
    let err = compile_statements(&[Stmt::Expr(expr)], &mut symbols, &options).unwrap_err();
    assert!(matches!(err, CompileError::OutOfTemporaries { .. }), "{err:?}");
}

// ── Serialized input ─────────────────────────────────────────────────────

#[test]
fn empty_options_object_is_the_default() {
    let options: CompileOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(options, CompileOptions::default());

    let options: CompileOptions =
        serde_json::from_str(r#"{ "base": 4096, "optimize": false }"#).unwrap();
    assert_eq!(options.base, 0x1000);
    assert!(!options.optimize);
    assert_eq!(options.static_base, CompileOptions::default().static_base);
}

#[test]
fn statements_load_from_json() {
    let json = r#"[
        { "VarDecl": { "name": "x", "expr": { "Literal": { "value": 1, "width": "W8" } } } }
    ]"#;
    let stmts: Vec<Stmt> = serde_json::from_str(json).unwrap();
    assert_eq!(
        stmts,
        vec![Stmt::VarDecl {
            name: "x".into(),
            expr: Expr::u8(1),
            mutable: false,
        }]
    );
}
