use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use cinder::bytecode::{compile, disasm};
use cinder::runtime::{Vm, VmConfig};

/// Upper bound on source size; longer input is truncated.
const MAX_SOURCE: usize = 256 * 1024;

#[derive(Parser)]
#[command(version, about = "A one-pass compiler and stack VM for a small C subset")]
struct Args {
    /// Print each source line with the bytecode emitted for it, then exit
    /// without executing
    #[arg(short = 's')]
    src: bool,

    /// Trace every instruction during execution
    #[arg(short = 'd')]
    debug: bool,

    /// Source file to compile and run
    file: PathBuf,

    /// Arguments passed through to the guest program's main()
    #[arg(trailing_var_arg = true)]
    guest_args: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let source = match read_source(&args.file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::from(255);
        }
    };

    // Compile errors go to stdout as `<line>: <message>` and the process
    // reports failure as -1.
    let program = match compile(&source) {
        Ok(program) => program,
        Err(e) => {
            println!("{}", e);
            return ExitCode::from(255);
        }
    };

    if args.src {
        disasm::print_listing(&source, &program);
        return ExitCode::SUCCESS;
    }

    let config = VmConfig {
        trace: args.debug,
        ..VmConfig::default()
    };

    // The guest sees the source path as argv[0], then the passthrough args.
    let mut guest_args = vec![args.file.display().to_string()];
    guest_args.extend(args.guest_args);

    match Vm::with_config(program, config).run(&guest_args) {
        Ok(status) => ExitCode::from(status as u8),
        Err(e) => {
            eprintln!("runtime error: {}", e);
            ExitCode::from(255)
        }
    }
}

fn read_source(path: &Path) -> anyhow::Result<Vec<u8>> {
    let mut source =
        fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    source.truncate(MAX_SOURCE);
    Ok(source)
}
