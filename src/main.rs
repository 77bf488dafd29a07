use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use polyloft::diagnostics::Renderer;
use polyloft::Interpreter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Source file to evaluate.
    file: PathBuf,

    /// Evaluate the program after parsing. Execution is gated behind this
    /// flag rather than implicit, splitting "build the AST" from "do
    /// something with it".
    #[arg(short, long)]
    run: bool,

    /// Parse and build the program without evaluating it, reporting any
    /// host-level parse failure and exiting. Since Polyloft has no separate
    /// static type-checking phase, this is the closest analogue to a
    /// pre-run type-check gate.
    #[arg(long)]
    check_only: bool,

    /// Extra module search root consulted ahead of the project's `libs`/
    /// `src` directories (spec.md §4.8 resolution order).
    #[arg(long)]
    lib_path: Option<PathBuf>,
}

fn main() -> ExitCode {
    simple_logger::init_with_level(log::Level::Warn).unwrap();
    let args = Cli::parse();

    if let Some(lib_path) = &args.lib_path {
        std::env::set_var("POLYLOFT_LIB_PATH", lib_path);
    }

    let source = match std::fs::read_to_string(&args.file) {
        Ok(source) => source,
        Err(e) => {
            error!("could not read file '{}': {e}", args.file.display());
            return ExitCode::FAILURE;
        }
    };
    let file_name = args.file.to_string_lossy().into_owned();

    let ast = match polyloft::ast::parser::parse_program(&file_name, &source) {
        Ok(ast) => ast,
        Err(exc) => {
            eprintln!("{}", Renderer::for_stderr().render(&exc, Some(&source)));
            return ExitCode::FAILURE;
        }
    };

    if args.check_only || !args.run {
        return ExitCode::SUCCESS;
    }

    let mut interpreter = Interpreter::new();
    let env = polyloft::Environment::new(file_name, "main");
    if let Err(exc) = interpreter.run(&env, &ast) {
        eprintln!("{}", Renderer::for_stderr().render(&exc, Some(&source)));
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
