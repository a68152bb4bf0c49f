//! The `mcc` driver.
//!
//! Runs the pipeline over one translation unit and dumps the intermediate
//! form requested by each `-d<stage>` flag, both to `<stem>.<suffix>` next
//! to the input and to stdout (`-dasm` writes stdout only). Inputs are
//! assumed preprocessed (`.i`, or `.c` carrying `#line` directives); the
//! reference compiler's flag surface is single-dash, so known single-dash
//! long flags are normalized to double-dash before clap sees them.
//!
//! Exit codes: 0 on success, 1 on any failure (parse diagnostics, lowering
//! errors, unimplemented flags, I/O problems).

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use mcc_backend::Flavor;
use mcc_ir::{cminor, cminorsel, csharpminor, rtl, simplexpr, simpllocals};
use mcc_syntax::parser::parse_translation_unit;
use mcc_syntax::printer;

/// A small CompCert-style C compiler for studying compilation passes.
#[derive(Parser)]
#[command(name = "mcc", about = "A teaching C compiler with per-stage dumps")]
struct Cli {
    /// Dump the parsed AST to <stem>.parsed.c and stdout.
    #[arg(long)]
    dparse: bool,

    /// Dump Clight to <stem>.light.c and stdout.
    #[arg(long)]
    dclight: bool,

    /// Dump Csharpminor to <stem>.csharpminor and stdout.
    #[arg(long)]
    dcsharpminor: bool,

    /// Dump Cminor to <stem>.cminor and stdout.
    #[arg(long)]
    dcminor: bool,

    /// Dump RTL to <stem>.rtl.0 and stdout.
    #[arg(long)]
    drtl: bool,

    /// Write generated assembly to stdout.
    #[arg(long)]
    dasm: bool,

    /// Not implemented in this compiler.
    #[arg(long)]
    dc: bool,

    /// Not implemented in this compiler.
    #[arg(long)]
    dltl: bool,

    /// Not implemented in this compiler.
    #[arg(long)]
    dmach: bool,

    /// Add a directory to the include path (reserved; preprocessing is
    /// expected to have happened already).
    #[arg(short = 'I', value_name = "DIR")]
    include: Vec<PathBuf>,

    /// Input file (.c with #line directives, or preprocessed .i).
    input: Option<PathBuf>,
}

/// Flags the reference compiler spells with a single dash.
const SINGLE_DASH_LONGS: &[&str] = &[
    "dparse",
    "dclight",
    "dcsharpminor",
    "dcminor",
    "drtl",
    "dasm",
    "dc",
    "dltl",
    "dmach",
];

/// Rewrite `-dparse` to `--dparse` (and friends) so both forms parse.
fn normalize_args(args: Vec<String>) -> Vec<String> {
    args.into_iter()
        .map(|a| {
            if let Some(name) = a.strip_prefix('-') {
                if SINGLE_DASH_LONGS.contains(&name) {
                    return format!("--{}", name);
                }
            }
            a
        })
        .collect()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = normalize_args(std::env::args().collect());
    let cli = Cli::parse_from(args);
    process::exit(run(&cli));
}

fn run(cli: &Cli) -> i32 {
    for (flag, set) in [("-dc", cli.dc), ("-dltl", cli.dltl), ("-dmach", cli.dmach)] {
        if set {
            eprintln!("mcc: warning: {} is not implemented", flag);
            return 1;
        }
    }

    let Some(input) = &cli.input else {
        eprintln!("mcc: no input file");
        return 1;
    };
    let source = match std::fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("mcc: {}: {}", input.display(), e);
            return 1;
        }
    };
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());
    debug!(input = %input.display(), bytes = source.len(), "compiling");

    // Parse. Any diagnostic suppresses all later passes.
    let cabs = match parse_translation_unit(&source, &file_name) {
        Ok(p) => p,
        Err(failed) => {
            for d in &failed.diagnostics {
                eprintln!("{}", d);
            }
            return 1;
        }
    };
    if cli.dparse {
        let text = printer::print_program(&cabs);
        if dump(input, "parsed.c", &text).is_err() {
            return 1;
        }
    }

    // Clight: SimplExpr then SimplLocals.
    let clight = match simplexpr::simpl_expr(&cabs) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}: error: {}", file_name, e);
            return 1;
        }
    };
    let clight = simpllocals::simpl_locals(&clight);
    if cli.dclight {
        let text = mcc_ir::clight::print::print_program(&clight);
        if dump(input, "light.c", &text).is_err() {
            return 1;
        }
    }

    let cshm = match csharpminor::lower::lower_program(&clight) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}: error: {}", file_name, e);
            return 1;
        }
    };
    if cli.dcsharpminor {
        let text = csharpminor::print::print_program(&cshm);
        if dump(input, "csharpminor", &text).is_err() {
            return 1;
        }
    }

    let cm = match cminor::lower::lower_program(&cshm) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}: error: {}", file_name, e);
            return 1;
        }
    };
    if cli.dcminor {
        let text = cminor::print::print_program(&cm);
        if dump(input, "cminor", &text).is_err() {
            return 1;
        }
    }

    let selected = cminorsel::select::select_program(&cm);
    let rtl_program = match rtl::gen::generate_program(&selected) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}: error: {}", file_name, e);
            return 1;
        }
    };
    for f in &rtl_program.functions {
        let errors = rtl::validate(f);
        assert!(
            errors.is_empty(),
            "internal error: invalid RTL for '{}': {}",
            f.name,
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        );
    }
    if cli.drtl {
        let text = rtl::print::print_program(&rtl_program);
        if dump(input, "rtl.0", &text).is_err() {
            return 1;
        }
    }

    if cli.dasm {
        match mcc_backend::emit_program(&rtl_program, Flavor::host()) {
            Ok(text) => print!("{}", text),
            Err(e) => {
                eprintln!("{}: error: {}", file_name, e);
                return 1;
            }
        }
    }
    0
}

/// Write a stage dump to `<stem>.<suffix>` and echo it to stdout.
fn dump(input: &Path, suffix: &str, text: &str) -> Result<(), ()> {
    let path = input.with_extension(suffix);
    if let Err(e) = std::fs::write(&path, text) {
        eprintln!("mcc: {}: {}", path.display(), e);
        return Err(());
    }
    print!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_dash_longs_are_normalized() {
        let args = vec![
            "mcc".to_string(),
            "-dparse".to_string(),
            "-dasm".to_string(),
            "foo.c".to_string(),
        ];
        assert_eq!(
            normalize_args(args),
            vec!["mcc", "--dparse", "--dasm", "foo.c"]
        );
    }

    #[test]
    fn double_dash_and_other_args_pass_through() {
        let args = vec![
            "mcc".to_string(),
            "--dparse".to_string(),
            "-I".to_string(),
            "include".to_string(),
            "-x".to_string(),
        ];
        assert_eq!(
            normalize_args(args),
            vec!["mcc", "--dparse", "-I", "include", "-x"]
        );
    }

    #[test]
    fn dump_path_naming() {
        assert_eq!(
            Path::new("dir/foo.c").with_extension("parsed.c"),
            Path::new("dir/foo.parsed.c")
        );
        assert_eq!(
            Path::new("foo.i").with_extension("rtl.0"),
            Path::new("foo.rtl.0")
        );
    }
}
