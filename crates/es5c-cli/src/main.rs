use std::{env, fs, process::ExitCode};

use es5c::{compile, CompileFlags};

fn main() -> ExitCode {
    let mut file_path = None;
    let mut is_strict = false;
    let mut is_eval = false;
    let mut dump_bytecode = false;

    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--strict" => is_strict = true,
            "--eval" => is_eval = true,
            "--dump-bytecode" => dump_bytecode = true,
            _ if file_path.is_none() => file_path = Some(arg),
            other => {
                eprintln!("error: unrecognized argument `{other}`");
                return ExitCode::FAILURE;
            }
        }
    }

    let Some(file_path) = file_path else {
        eprintln!("usage: es5c [--strict] [--eval] [--dump-bytecode] <file.js>");
        return ExitCode::FAILURE;
    };

    let source = match fs::read_to_string(&file_path) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("error reading {file_path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let flags = CompileFlags { is_eval, is_strict, is_funcexpr: false };
    match compile(&source, Some(file_path.clone()), flags) {
        Ok(template) => {
            println!("compiled {file_path}: {} instructions, {} consts, nregs={}, nargs={}", template.code.len(), template.consts.len(), template.nregs, template.nargs);
            if dump_bytecode {
                dump(&template);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{file_path}: {err}");
            ExitCode::FAILURE
        }
    }
}

fn dump(template: &es5c::FunctionTemplate) {
    dump_at_depth(template, 0);
}

fn dump_at_depth(template: &es5c::FunctionTemplate, depth: usize) {
    let indent = "  ".repeat(depth);
    println!("{indent}name: {:?}", template.name);
    println!("{indent}flags: {:?}", template.flags);
    println!("{indent}formals: {:?}", template.formals);
    println!("{indent}consts:");
    for (i, c) in template.consts.iter().enumerate() {
        println!("{indent}  [{i}] {c:?}");
    }
    println!("{indent}pc2line: {:?}", template.pc2line);
    println!("{indent}code (packed words): {:?}", template.code);
    if !template.funcs.is_empty() {
        println!("{indent}nested functions:");
        for (i, nested) in template.funcs.iter().enumerate() {
            println!("{indent}  [{i}]");
            dump_at_depth(nested, depth + 2);
        }
    }
}
