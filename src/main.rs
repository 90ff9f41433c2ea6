use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use bitlink_config::{BridgeConfig, parse_library_list};
use bitlink_ffi::{ContainerWriter, extract_modules, library_name};
use bitlink_symbol::{IrKind, Module};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "bitlink", version, about = "Inspect and build libraries with embedded bitcode")]
struct Cli {
    /// Configuration file; the environment still takes precedence.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the modules embedded in a library.
    Inspect {
        library: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Append modules to a library file, creating it if needed.
    Pack {
        output: PathBuf,
        /// `name:export,...:import,...:payload-file`; a `.ll` payload is text IR.
        #[arg(long = "module", required = true)]
        modules: Vec<String>,
    },
    /// Tell whether a library would be dispatched through its bitcode.
    Check { library: PathBuf },
}

#[derive(Serialize)]
struct ModuleReport<'a> {
    name: &'a str,
    kind: String,
    payload_bytes: usize,
    exports: &'a [String],
    imports: &'a [String],
}

impl<'a> From<&'a Module> for ModuleReport<'a> {
    fn from(module: &'a Module) -> Self {
        Self {
            name: module.name(),
            kind: module.kind().to_string(),
            payload_bytes: module.payload().len(),
            exports: module.exports(),
            imports: module.imports(),
        }
    }
}

fn main() -> Result<()> {
    bitlink_utils::init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Inspect { library, json } => inspect(&library, json),
        Command::Pack { output, modules } => pack(&output, &modules),
        Command::Check { library } => check(&load_config(cli.config.as_deref())?, &library),
    }
}

fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    let config = match path {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    };
    Ok(config.merge_with_env())
}

fn inspect(library: &Path, json: bool) -> Result<()> {
    let modules = extract_modules(library)
        .with_context(|| format!("failed to inspect {}", library.display()))?;
    let reports: Vec<ModuleReport<'_>> = modules.iter().map(ModuleReport::from).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    if reports.is_empty() {
        println!("{}: no embedded bitcode", library.display());
        return Ok(());
    }
    println!("{}: {} module(s)", library.display(), reports.len());
    for report in &reports {
        println!(
            "  {} ({}, {} bytes)",
            report.name, report.kind, report.payload_bytes
        );
        println!("    exports: {}", report.exports.join(", "));
        if !report.imports.is_empty() {
            println!("    imports: {}", report.imports.join(", "));
        }
    }
    Ok(())
}

fn pack(output: &Path, specs: &[String]) -> Result<()> {
    let mut writer = ContainerWriter::new();
    for spec in specs {
        let module = parse_module_spec(spec)?;
        writer
            .module(&module)
            .with_context(|| format!("failed to encode module `{}`", module.name()))?;
        info!(module = %module.name(), output = %output.display(), "packed");
    }
    writer
        .append_to(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    Ok(())
}

fn check(config: &BridgeConfig, library: &Path) -> Result<()> {
    let name = library_name(library)?;
    let modules = extract_modules(library).unwrap_or_default();
    let verdict = if !config.is_configured() {
        "native (no bitcode libraries configured)"
    } else if modules.is_empty() {
        "native (no embedded bitcode)"
    } else if config.is_bitcode_enabled(&name) {
        "bitcode"
    } else {
        "native (not enabled)"
    };
    println!("{name}: {verdict}");
    Ok(())
}

fn parse_module_spec(spec: &str) -> Result<Module> {
    let parts: Vec<&str> = spec.splitn(4, ':').collect();
    let [name, exports, imports, payload] = parts.as_slice() else {
        bail!("module `{spec}` must look like name:exports:imports:payload-file");
    };
    if name.is_empty() {
        bail!("module `{spec}` has no name");
    }

    let payload_path = Path::new(payload);
    let payload = std::fs::read(payload_path)
        .with_context(|| format!("failed to read payload {}", payload_path.display()))?;
    let kind = match payload_path.extension().and_then(|ext| ext.to_str()) {
        Some("ll") => IrKind::Text,
        _ => IrKind::Binary,
    };

    Ok(Module::new(
        *name,
        kind,
        parse_library_list(exports),
        parse_library_list(imports),
        payload,
    ))
}
