use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use ucode_compiler::backend::liveness::Boundary;
use ucode_compiler::ir::Instr;
use ucode_compiler::{
    compile_ir, compile_statements, CompileOptions, ProgramIR, Stmt, Symbol, SymbolTable,
};

#[derive(Parser)]
#[command(name = "ucodec")]
#[command(about = "Lower IR to micro-operations for the ucode processor")]
struct Args {
    /// Path to a JSON compilation unit. Without one, a built-in sample is used.
    file: Option<PathBuf>,

    /// Emit IR. If none of --ir/--asm/--both is given, defaults to --asm.
    #[arg(long)]
    ir: bool,

    /// Emit the micro-op listing
    #[arg(long)]
    asm: bool,

    /// Emit both IR and the micro-op listing
    #[arg(long)]
    both: bool,

    /// JSON file with compile options; flags below override it
    #[arg(long)]
    options: Option<PathBuf>,

    /// Address of the first instruction
    #[arg(long, value_parser = parse_u16)]
    base: Option<u16>,

    /// Skip dead-store elimination
    #[arg(long)]
    no_optimize: bool,

    /// What the optimizer assumes follows the program
    #[arg(long, value_enum)]
    boundary: Option<BoundaryOpt>,

    /// Write the full ROM image, one micro-op per line
    #[arg(long)]
    rom: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum BoundaryOpt {
    Exit,
    Local,
}

/// Everything needed to compile: symbols plus either IR or statements.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Unit {
    symbols: BTreeMap<String, Symbol>,
    ir: Option<Vec<Instr>>,
    statements: Option<Vec<Stmt>>,
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid address '{s}': {e}"))
}

fn load_options(args: &Args) -> Result<CompileOptions> {
    let mut options = match &args.options {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading options '{}'", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing options '{}'", path.display()))?
        }
        None => CompileOptions::default(),
    };
    if let Some(base) = args.base {
        options.base = base;
    }
    if args.no_optimize {
        options.optimize = false;
    }
    if let Some(boundary) = args.boundary {
        options.boundary = match boundary {
            BoundaryOpt::Exit => Boundary::ProgramExit,
            BoundaryOpt::Local => Boundary::Local,
        };
    }
    Ok(options)
}

fn load_unit(path: Option<&Path>) -> Result<Unit> {
    let text = match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("reading '{}'", path.display()))?,
        None => DEFAULT_SAMPLE.trim().to_string(),
    };
    serde_json::from_str(&text).context("parsing compilation unit")
}

fn main() -> Result<()> {
    let args = Args::parse();
    let options = load_options(&args)?;
    let unit = load_unit(args.file.as_deref())?;

    // Determine outputs
    let mut want_ir = args.ir;
    let mut want_asm = args.asm;
    if args.both {
        want_ir = true;
        want_asm = true;
    }
    if !want_ir && !want_asm {
        want_asm = true;
    }

    let mut symbols = SymbolTable::new();
    for (name, symbol) in unit.symbols {
        if symbols.declare(name.clone(), symbol).is_err() {
            bail!("symbol '{name}' declared twice");
        }
    }

    let ir = match (unit.ir, unit.statements) {
        (Some(_), Some(_)) => bail!("a unit holds either `ir` or `statements`, not both"),
        (Some(instrs), None) => ProgramIR::from(instrs),
        (None, Some(stmts)) => compile_statements(&stmts, &mut symbols, &options)
            .context("lowering statements")?,
        (None, None) => ProgramIR::new(),
    };

    if want_ir {
        for line in ir.to_lines() {
            println!("{}", line);
        }
        println!();
    }

    let program = compile_ir(&ir, &symbols, &options).context("lowering IR")?;

    if want_asm {
        print!("{}", program.listing());
    }

    if let Some(path) = &args.rom {
        let rom = program.rom_image().context("building ROM image")?;
        let mut text = String::with_capacity(rom.len() * 8);
        for op in &rom {
            text.push_str(&op.to_string());
            text.push('\n');
        }
        fs::write(path, text).with_context(|| format!("writing ROM '{}'", path.display()))?;
    }

    Ok(())
}

const DEFAULT_SAMPLE: &str = r#"
{
  "statements": [
    { "VarDecl": { "name": "count", "expr": { "Literal": { "value": 3, "width": "W8" } }, "mutable": true } },
    { "VarDecl": { "name": "total", "expr": { "Literal": { "value": 0, "width": "W16" } }, "mutable": true } },
    { "While": {
        "cond": { "Binary": { "op": "Ne", "left": { "Ident": "count" }, "right": { "Literal": { "value": 0, "width": "W8" } } } },
        "body": [
          { "Assign": { "name": "total", "expr": { "Binary": { "op": "Add", "left": { "Ident": "total" }, "right": { "Ident": "count" } } } } },
          { "Assign": { "name": "count", "expr": { "Binary": { "op": "Sub", "left": { "Ident": "count" }, "right": { "Literal": { "value": 1, "width": "W8" } } } } } }
        ]
    } }
  ]
}
"#;
