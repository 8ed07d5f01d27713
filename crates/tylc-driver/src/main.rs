//! Command-line entry point: `tylc link ...` drives the five-phase linker,
//! `tylc optimize ...` runs the AST pass pipeline over a front-end-supplied
//! JSON dump, for manual pipeline experimentation without a full front end.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use tylc_linker::{LinkerConfig, Linker};
use tylc_object::{DefFile, ObjectFile};
use tylc_optimizer::run_default_pipeline;

#[derive(Parser)]
#[command(name = "tylc", about = "tylc backend driver: linker and AST optimizer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Link object files (and optionally static libraries) into a PE executable or DLL.
    Link(LinkArgs),
    /// Run the default optimization pipeline over a JSON-dumped AST.
    Optimize(OptimizeArgs),
}

#[derive(Parser)]
struct LinkArgs {
    /// Object files produced by the code generator.
    objects: Vec<PathBuf>,

    #[arg(long, default_value = "a.exe")]
    output: PathBuf,
    #[arg(long)]
    dll: bool,
    #[arg(long)]
    def: Option<PathBuf>,
    #[arg(long)]
    entry: Option<String>,
    #[arg(long)]
    image_base: Option<String>,
    #[arg(long)]
    section_align: Option<u32>,
    #[arg(long)]
    file_align: Option<u32>,
    #[arg(long)]
    import_lib: bool,
    #[arg(long)]
    map: bool,
    #[arg(long = "lib-path")]
    lib_path: Vec<PathBuf>,
    #[arg(long = "default-lib")]
    default_lib: Vec<String>,
    #[arg(long = "static-lib")]
    static_lib: Vec<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser)]
struct OptimizeArgs {
    /// Path to a JSON-serialized `tylc_core::ast::Program`.
    #[arg(long = "dump-ast")]
    dump_ast: PathBuf,
    /// Where to write the transformed AST. Defaults to overwriting the input.
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Link(args) => cmd_link(args)?,
        Command::Optimize(args) => cmd_optimize(args)?,
    };
    std::process::exit(code);
}

fn parse_image_base(s: &str) -> Result<u64> {
    let s = s.trim();
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (s, 10),
    };
    u64::from_str_radix(digits, radix).with_context(|| format!("invalid --image-base value `{s}`"))
}

fn banner(verbose: bool, text: &str) {
    if verbose {
        println!("{} {}", "==>".bold().blue(), text);
    }
}

fn cmd_link(args: LinkArgs) -> Result<i32> {
    let mut config = LinkerConfig::new(args.output.clone());
    config.generate_dll = args.dll;
    config.generate_import_lib = args.import_lib;
    config.generate_map = args.map;
    config.verbose = args.verbose;
    config.entry_point = args.entry;
    config.library_paths = args.lib_path;
    config.static_libs = args.static_lib.clone();
    if !args.default_lib.is_empty() {
        config.default_libs = args.default_lib;
    }
    if let Some(base) = &args.image_base {
        config.image_base = parse_image_base(base)?;
    }
    if let Some(align) = args.section_align {
        config.section_alignment = align;
    }
    if let Some(align) = args.file_align {
        config.file_alignment = align;
    }

    let mut linker = Linker::new(config);

    if let Some(def_path) = &args.def {
        let def_file = DefFile::from_path(def_path).with_context(|| format!("reading def file {}", def_path.display()))?;
        linker.set_def_file(def_file);
    }

    banner(args.verbose, &format!("collecting {} object(s)", args.objects.len()));
    let progress = if args.verbose && args.objects.len() > 1 {
        let bar = ProgressBar::new(args.objects.len() as u64);
        bar.set_style(ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}").unwrap());
        Some(bar)
    } else {
        None
    };

    let mut had_load_error = false;
    for path in &args.objects {
        let object = ObjectFile::read(path);
        match object {
            Ok(obj) => {
                if args.verbose {
                    println!("  {} {} ({} symbols)", "+".green(), obj.module_name, obj.symbols.len());
                }
                linker.add_object(obj);
            }
            Err(e) => {
                eprintln!("{} could not read {}: {e}", "error:".red().bold(), path.display());
                had_load_error = true;
            }
        }
        if let Some(bar) = &progress {
            bar.inc(1);
        }
    }
    if let Some(bar) = progress {
        bar.finish_and_clear();
    }

    for lib_path in &args.static_lib {
        linker.load_static_library(lib_path);
    }

    if had_load_error {
        return Ok(1);
    }

    banner(args.verbose, "resolving, laying out, relocating, emitting");
    let ok = linker.link();

    if !ok {
        for error in linker.errors() {
            eprintln!("{} {error}", "error:".red().bold());
        }
        return Ok(1);
    }

    if let Some(output) = linker.output() {
        if args.verbose {
            println!(
                "{} wrote {} (entry `{}` at RVA 0x{:08X})",
                "==>".bold().blue(),
                args.output.display(),
                output.entry_symbol,
                output.entry_rva
            );
        }
    }
    Ok(0)
}

fn cmd_optimize(args: OptimizeArgs) -> Result<i32> {
    let text = std::fs::read_to_string(&args.dump_ast).with_context(|| format!("reading {}", args.dump_ast.display()))?;
    let mut program: tylc_core::ast::Program = serde_json::from_str(&text).context("parsing AST JSON")?;

    banner(args.verbose, "running default pipeline");
    let stats = run_default_pipeline(&mut program);
    if args.verbose {
        println!("{stats:#?}");
    }

    let output_path = args.output.as_ref().unwrap_or(&args.dump_ast);
    let json = serde_json::to_string_pretty(&program).context("serializing transformed AST")?;
    std::fs::write(output_path, json).with_context(|| format!("writing {}", output_path.display()))?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn the_cli_definition_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn link_accepts_its_full_flag_surface() {
        let cli = Cli::try_parse_from([
            "tylc",
            "link",
            "a.obj",
            "b.obj",
            "--output",
            "out.exe",
            "--dll",
            "--import-lib",
            "--map",
            "--entry",
            "main",
            "--image-base",
            "0x140000000",
            "--verbose",
        ])
        .unwrap();
        match cli.command {
            Command::Link(args) => {
                assert_eq!(args.objects.len(), 2);
                assert!(args.dll);
                assert!(args.import_lib);
                assert!(args.map);
                assert_eq!(args.entry.as_deref(), Some("main"));
                assert_eq!(parse_image_base(&args.image_base.unwrap()).unwrap(), 0x1_4000_0000);
            }
            _ => panic!("expected Link"),
        }
    }

    #[test]
    fn optimize_requires_dump_ast() {
        let result = Cli::try_parse_from(["tylc", "optimize"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_image_base_accepts_hex_and_decimal() {
        assert_eq!(parse_image_base("0x1000").unwrap(), 0x1000);
        assert_eq!(parse_image_base("4096").unwrap(), 4096);
        assert!(parse_image_base("not-a-number").is_err());
    }
}
