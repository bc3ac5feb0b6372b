use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use docmeta::{
    config,
    document::{Document, MediaType},
    logging,
    processing::{MetadataRecord, MetadataService},
};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

#[derive(Parser)]
#[command(
    name = "docmeta-cli",
    about = "Extract text from a PDF, DOCX, or text file and print its metadata as JSON"
)]
struct Cli {
    /// Document to process.
    file: PathBuf,
    /// Declared media type; detected from the file extension when omitted.
    #[arg(long)]
    media_type: Option<String>,
    /// Write the record to this file, or into this directory as `<name>_metadata.json`.
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Emit single-line JSON instead of indented output.
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(()) => {}
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    config::init_config();
    logging::init_tracing_stderr();

    let media_type = resolve_media_type(&cli)?;
    let bytes = fs::read(&cli.file)
        .with_context(|| format!("failed to read {}", cli.file.display()))?;
    let name = cli
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| cli.file.display().to_string());

    let service = MetadataService::from_config(config::get_config());
    let record = service
        .build_metadata(Document::new(name.clone(), media_type, bytes))
        .await?;

    let json = render(&record, cli.compact)?;
    match &cli.output {
        Some(target) => {
            let path = output_path(target, &name);
            fs::write(&path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Metadata written to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(json.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

fn resolve_media_type(cli: &Cli) -> Result<MediaType> {
    if let Some(mime) = &cli.media_type {
        return Ok(MediaType::from_mime(mime));
    }
    cli.file
        .extension()
        .and_then(|extension| extension.to_str())
        .and_then(MediaType::from_extension)
        .ok_or_else(|| {
            anyhow!(
                "cannot detect media type of {}; pass --media-type",
                cli.file.display()
            )
        })
}

/// Serialize with four-space indentation, or on one line when `compact` is set.
fn render(record: &MetadataRecord, compact: bool) -> Result<String> {
    if compact {
        return serde_json::to_string(record).context("failed to serialize metadata");
    }
    let mut buffer = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
    record
        .serialize(&mut serializer)
        .context("failed to serialize metadata")?;
    String::from_utf8(buffer).context("metadata JSON was not UTF-8")
}

fn output_path(target: &Path, name: &str) -> PathBuf {
    if target.is_dir() {
        target.join(format!("{name}_metadata.json"))
    } else {
        target.to_path_buf()
    }
}
