//! Schema Walker CLI
//!
//! Command-line interface for resolving schema constraints at a pointer
//! path, checking instance values against them, and linting schema files.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};

use schema_walker::{
    lint, load_document_auto, parse_pointer_steps, validate_at_path, DirectoryResolver,
    FileStatus, PointerStep, ResolveContext, ResolveError, ResolveOptions, ResolvedVariants,
    Severity, ValidateError, Variant, VariantKind,
};

#[derive(Parser)]
#[command(name = "schema-walker")]
#[command(about = "Resolve JSON Schema constraints at a pointer path")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the schema alternatives applying at a pointer path
    Resolve {
        /// Schema source: file path or URL (http:// or https://)
        schema: String,

        /// Instance pointer path to resolve (e.g. /items/0/name)
        #[arg(long, short, default_value = "")]
        path: String,

        /// Instance document; enables strict if/then/else branch selection
        #[arg(long)]
        instance: Option<PathBuf>,

        /// Base directory for cross-file $refs (default: the schema's directory)
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Expand combinators on the terminal step's schema (default: true)
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        expand_terminal: bool,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Check an instance value against the constraints resolved at a path
    Check {
        /// Schema source: file path or URL
        schema: String,

        /// Instance document to check
        instance: PathBuf,

        /// Instance pointer path to check (e.g. /items/0/name)
        #[arg(long, short, default_value = "")]
        path: String,

        /// Base directory for cross-file $refs (default: the schema's directory)
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Lint schema files (syntax, broken refs, bad patterns, conflicts)
    Lint {
        /// File or directory to lint
        path: PathBuf,

        /// Output format: text (default) or json
        #[arg(long, default_value = "text")]
        format: String,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Suppress progress output, only show errors
        #[arg(long, short)]
        quiet: bool,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Resolve {
            schema,
            path,
            instance,
            base_dir,
            expand_terminal,
            output,
            pretty,
        } => run_resolve(ResolveArgs {
            schema,
            path,
            instance,
            base_dir,
            expand_terminal,
            output,
            pretty,
        }),

        Commands::Check {
            schema,
            instance,
            path,
            base_dir,
            json,
        } => run_check(&schema, &instance, &path, base_dir, json),

        Commands::Lint {
            path,
            format,
            strict,
            quiet,
        } => run_lint(&path, &format, strict, quiet),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

struct ResolveArgs {
    schema: String,
    path: String,
    instance: Option<PathBuf>,
    base_dir: Option<PathBuf>,
    expand_terminal: bool,
    output: Option<PathBuf>,
    pretty: bool,
}

fn run_resolve(args: ResolveArgs) -> Result<(), u8> {
    let document = load_document_auto(&args.schema).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let steps = parse_steps(&args.path)?;
    let mut options = ResolveOptions::new().expand_terminal(args.expand_terminal);
    if let Some(instance_path) = &args.instance {
        options = options.with_instance(load_json(instance_path)?);
    }

    let base_dir = resolver_base_dir(args.base_dir, &args.schema);
    let files = DirectoryResolver::new(base_dir);
    let ctx = ResolveContext::new(&files);

    let resolved = resolve(&document.root(), &steps, &options, &ctx)?;
    for reference in &resolved.broken_refs {
        eprintln!("Warning: unresolved reference: {}", reference);
    }

    let rendered = variants_json(&resolved);
    let json_output = if args.pretty {
        serde_json::to_string_pretty(&rendered)
    } else {
        serde_json::to_string(&rendered)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}

fn resolve(
    root: &schema_walker::SchemaObject,
    steps: &[PointerStep],
    options: &ResolveOptions,
    ctx: &ResolveContext<'_>,
) -> Result<ResolvedVariants, u8> {
    schema_walker::resolve_variants(root, steps, options, ctx).map_err(|e: ResolveError| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

fn variants_json(resolved: &ResolvedVariants) -> Value {
    Value::Array(resolved.variants.iter().map(variant_json).collect())
}

fn variant_json(variant: &Variant) -> Value {
    let mut out = Map::new();
    match &variant.kind {
        VariantKind::Unconstrained => {
            out.insert("unconstrained".to_string(), Value::Bool(true));
        }
        VariantKind::Schema(schema) => {
            out.insert(
                "file".to_string(),
                Value::String(schema.file_url().to_string()),
            );
            out.insert(
                "pointer".to_string(),
                Value::String(schema.pointer().to_string()),
            );
            out.insert("schema".to_string(), schema.materialize());
        }
    }
    if let Some(group) = variant.exclusion_group {
        out.insert("exclusionGroup".to_string(), Value::from(group));
    }
    if variant.conflict {
        out.insert("conflict".to_string(), Value::Bool(true));
    }
    Value::Object(out)
}

fn run_check(
    schema_source: &str,
    instance_path: &Path,
    path: &str,
    base_dir: Option<PathBuf>,
    json_output: bool,
) -> Result<(), u8> {
    let document = load_document_auto(schema_source).map_err(|e| {
        report_error(json_output, &format!("loading schema: {}", e));
        e.exit_code() as u8
    })?;
    let instance = load_json(instance_path)?;
    let steps = parse_steps(path)?;

    let files = DirectoryResolver::new(resolver_base_dir(base_dir, schema_source));
    let ctx = ResolveContext::new(&files);

    match validate_at_path(&document.root(), &steps, &instance, &ctx) {
        Ok(()) => {
            if json_output {
                println!(r#"{{"valid":true}}"#);
            } else {
                println!("Valid");
            }
            Ok(())
        }
        Err(ValidateError::Invalid { errors }) => {
            if json_output {
                let output = json!({
                    "valid": false,
                    "errors": errors
                });
                println!("{}", output);
            } else {
                eprintln!("Validation failed:");
                for error in errors {
                    eprintln!("  {}", error);
                }
            }
            Err(1)
        }
        Err(error) => {
            report_error(json_output, &error.to_string());
            Err(error.exit_code() as u8)
        }
    }
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!(r#"{{"valid":false,"error":"{}"}}"#, msg);
    } else {
        eprintln!("Error: {}", msg);
    }
}

fn parse_steps(path: &str) -> Result<Vec<PointerStep>, u8> {
    parse_pointer_steps(path).ok_or_else(|| {
        let error = ResolveError::InvalidPointer {
            pointer: path.to_string(),
        };
        eprintln!("Error: {}", error);
        error.exit_code() as u8
    })
}

fn load_json(path: &Path) -> Result<Value, u8> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: cannot read {}: {}", path.display(), e);
        3u8
    })?;
    serde_json::from_str(&content).map_err(|e| {
        eprintln!("Error: invalid JSON in {}: {}", path.display(), e);
        2u8
    })
}

fn resolver_base_dir(base_dir: Option<PathBuf>, schema_source: &str) -> PathBuf {
    base_dir.unwrap_or_else(|| {
        Path::new(schema_source)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

fn run_lint(path: &Path, format: &str, strict: bool, quiet: bool) -> Result<(), u8> {
    if !path.exists() {
        eprintln!("Error: path not found: {}", path.display());
        return Err(2);
    }

    let result = lint(path, strict);

    if format == "json" {
        match serde_json::to_string_pretty(&result) {
            Ok(rendered) => println!("{}", rendered),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                return Err(2);
            }
        }
    } else {
        // Text output
        if !quiet {
            println!("Linting {} ...\n", path.display());
        }

        for file_result in &result.results {
            let status_icon = match file_result.status {
                FileStatus::Ok => "\x1b[32m✓\x1b[0m",
                FileStatus::Warning => "\x1b[33m⚠\x1b[0m",
                FileStatus::Error => "\x1b[31m✗\x1b[0m",
            };

            if !quiet || file_result.status != FileStatus::Ok {
                println!("  {} {}", status_icon, file_result.file.display());
            }

            for diag in &file_result.diagnostics {
                let color = match diag.severity {
                    Severity::Error => "\x1b[31m",
                    Severity::Warning => "\x1b[33m",
                };
                if !quiet || diag.severity == Severity::Error {
                    println!(
                        "    {}{}[{}]\x1b[0m: {} - {}",
                        color,
                        match diag.severity {
                            Severity::Error => "error",
                            Severity::Warning => "warning",
                        },
                        diag.code,
                        diag.path,
                        diag.message
                    );
                }
            }
        }

        println!();
        if result.is_ok() && (!strict || result.warnings == 0) {
            println!(
                "\x1b[32m✓ {} files checked, all passed\x1b[0m",
                result.files_checked
            );
        } else {
            println!(
                "\x1b[31m✗ {} files checked: {} passed, {} failed ({} errors, {} warnings)\x1b[0m",
                result.files_checked, result.passed, result.failed, result.errors, result.warnings
            );
        }
    }

    if result.is_ok() && (!strict || result.warnings == 0) {
        Ok(())
    } else {
        Err(1)
    }
}
