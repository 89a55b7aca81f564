//! raskop - Recover Protocol Buffer definitions from compiled binaries
//!
//! Every input is scanned for embedded file descriptors, the descriptors are
//! resolved against each other, and each one is written back out as a
//! `.proto` source file under the output directory.

use anyhow::{bail, Context, Result};
use clap::Parser;
use raskop_core::{
    DiagnosticsSink, Input, NullSink, Pipeline, RecordingSink, RunConfig, RunOutput,
    ScannerConfig, TracingSink,
};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Recover Protocol Buffer definitions from compiled binaries
#[derive(Parser, Debug)]
#[command(name = "raskop")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Binary files to scan, in order
    #[arg(value_name = "FILE", required_unless_present = "directory")]
    files: Vec<PathBuf>,

    /// Also scan every binary below this directory
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Output directory for extracted .proto files
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also output google/protobuf/descriptor.proto
    #[arg(long)]
    descriptor_proto: bool,

    /// Replace imports missing from every input with placeholders
    #[arg(long)]
    unknown_dependencies: bool,

    /// Largest descriptor accepted, in bytes
    #[arg(long, default_value_t = ScannerConfig::DEFAULT_MAX_DESCRIPTOR_SIZE)]
    max_descriptor_size: usize,

    /// Dry run - don't write files, just show what would be extracted
    #[arg(long)]
    dry_run: bool,

    /// Overwrite existing files
    #[arg(long)]
    force: bool,

    /// Only list found descriptors without extracting
    #[arg(long)]
    list_only: bool,
}

impl Cli {
    fn run_config(&self) -> RunConfig {
        RunConfig::new()
            .allow_unknown_dependencies(self.unknown_dependencies)
            .include_well_known_descriptor(self.descriptor_proto)
            .scanner(ScannerConfig::new().max_descriptor_size(self.max_descriptor_size))
    }
}

/// A file read into memory, labelled for diagnostics
struct LoadedInput {
    label: String,
    data: Vec<u8>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let stdout = std::io::stdout();
    execute(&cli, &mut stdout.lock())
}

fn execute(cli: &Cli, out: &mut impl Write) -> Result<()> {
    let loaded = load_inputs(cli)?;
    let inputs: Vec<Input<'_>> = loaded
        .iter()
        .map(|input| Input::new(&input.label, &input.data))
        .collect();

    let config = cli.run_config();
    let pipeline = Pipeline::new(&config);

    if cli.list_only {
        return list_descriptors(&pipeline, &inputs, out);
    }

    let mut tracing_sink = TracingSink;
    let mut null_sink = NullSink;
    let sink: &mut dyn DiagnosticsSink = if cli.verbose > 0 {
        &mut tracing_sink
    } else {
        &mut null_sink
    };

    let output = pipeline.run(&inputs, sink)?;
    let failed = write_output(cli, &output, out)?;

    writeln!(
        out,
        "{} files, {} messages extracted",
        output.files_rendered, output.message_types_rendered
    )?;
    if failed > 0 {
        bail!("{} file(s) could not be written", failed);
    }
    Ok(())
}

/// Read every explicit file, then every binary found under `--directory`
fn load_inputs(cli: &Cli) -> Result<Vec<LoadedInput>> {
    let mut paths = Vec::new();

    for file in &cli.files {
        if !file.is_file() {
            bail!("Input path is not a file: {}", file.display());
        }
        paths.push(file.clone());
    }

    if let Some(ref directory) = cli.directory {
        if !directory.is_dir() {
            bail!("Path is not a directory: {}", directory.display());
        }
        info!("Scanning directory: {}", directory.display());
        paths.extend(discover_binaries(directory));
    }

    paths
        .into_iter()
        .map(|path| {
            trace!("Reading {}", path.display());
            let data = fs::read(&path)
                .with_context(|| format!("Failed to read input file: {}", path.display()))?;
            debug!("Read {} bytes from {}", data.len(), path.display());
            Ok(LoadedInput {
                label: path.display().to_string(),
                data,
            })
        })
        .collect()
}

/// Binaries below `directory`, in a stable order
fn discover_binaries(directory: &Path) -> Vec<PathBuf> {
    WalkDir::new(directory)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file())
        .filter(|path| {
            !path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with('.'))
                .unwrap_or(false)
        })
        .filter(|path| {
            let binary = is_likely_binary(path);
            if !binary {
                trace!("Skipping non-binary: {}", path.display());
            }
            binary
        })
        .collect()
}

/// Heuristic to determine if a file is likely a binary executable
fn is_likely_binary(path: &Path) -> bool {
    // Check by extension - skip obvious non-binaries
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        let skip_extensions = [
            "txt", "md", "json", "yaml", "yml", "xml", "html", "css", "js", "ts", "py", "rb", "go",
            "rs", "c", "h", "cpp", "hpp", "java", "proto", "toml", "ini", "cfg", "conf", "log",
            "csv", "svg", "png", "jpg", "jpeg", "gif", "pdf", "zip", "tar", "gz", "bz2", "xz",
            "7z", "rar", "sh", "bash", "zsh", "fish", "ps1", "bat", "cmd",
        ];
        if skip_extensions.contains(&ext.to_lowercase().as_str()) {
            return false;
        }
    }

    // Skip tiny files and anything over 500MB
    if let Ok(metadata) = fs::metadata(path) {
        let size = metadata.len();
        if size < 64 || size > 500 * 1024 * 1024 {
            return false;
        }
    }

    if let Ok(mut file) = fs::File::open(path) {
        use std::io::Read;
        let mut magic = [0u8; 4];
        if file.read_exact(&mut magic).is_ok() {
            // Mach-O, both byte orders, and universal binaries
            if matches!(
                magic,
                [0xCF, 0xFA, 0xED, 0xFE]
                    | [0xCE, 0xFA, 0xED, 0xFE]
                    | [0xFE, 0xED, 0xFA, 0xCF]
                    | [0xFE, 0xED, 0xFA, 0xCE]
                    | [0xCA, 0xFE, 0xBA, 0xBE]
            ) {
                return true;
            }
            // ELF
            if magic == [0x7F, b'E', b'L', b'F'] {
                return true;
            }
            // PE
            if magic[0..2] == [b'M', b'Z'] {
                return true;
            }
        }
    }

    // If we can't determine, try it anyway if it has no extension
    path.extension().is_none()
}

/// Print each collected descriptor without resolving anything
fn list_descriptors(pipeline: &Pipeline<'_>, inputs: &[Input<'_>], out: &mut impl Write) -> Result<()> {
    let mut sink = RecordingSink::default();
    let collector = pipeline.collect(inputs, &mut sink);

    for (event, raw) in sink.events.iter().zip(collector.descriptors()) {
        writeln!(
            out,
            "{}\t{:#010x}\t{}\t{}\t{}",
            event.input,
            raw.offset,
            raw.bytes.len(),
            short_digest(raw.as_bytes()),
            raw.name
        )?;
    }
    Ok(())
}

/// First 8 hex chars of the blake3 digest
fn short_digest(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex()[..8].to_string()
}

/// Resolve `name` below `root`, refusing anything that would escape it
fn output_path(root: &Path, name: &str) -> Result<PathBuf> {
    let relative = Path::new(name);
    if relative.components().count() == 0
        || !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
    {
        bail!("Refusing to write outside the output directory: {}", name);
    }
    Ok(root.join(relative))
}

/// Write every rendered file. Returns how many could not be written.
fn write_output(cli: &Cli, output: &RunOutput, out: &mut impl Write) -> Result<usize> {
    // Duplicate names render identically, so each path is written once
    let mut written = HashSet::new();
    let mut failed = 0;

    for file in &output.files {
        let path = match output_path(&cli.output, &file.name) {
            Ok(path) => path,
            Err(e) => {
                warn!("Skipping {}: {}", file.name, e);
                failed += 1;
                continue;
            }
        };
        if !written.insert(path.clone()) {
            continue;
        }

        if cli.dry_run {
            writeln!(out, "Would write: {}", path.display())?;
            if cli.verbose > 0 {
                writeln!(out, "---\n{}---", file.text)?;
            }
            continue;
        }

        match write_proto_file(&path, &file.text, cli.force) {
            Ok(()) => info!("Wrote {}", path.display()),
            Err(e) => {
                error!("Failed to write {}: {:#}", path.display(), e);
                failed += 1;
            }
        }
    }
    Ok(failed)
}

/// Write a proto file, creating parent directories as needed
fn write_proto_file(output_path: &Path, content: &str, force: bool) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    if output_path.exists() && !force {
        bail!(
            "File already exists: {} (use --force to overwrite)",
            output_path.display()
        );
    }

    fs::write(output_path, content)
        .with_context(|| format!("Failed to write file: {}", output_path.display()))?;

    Ok(())
}
