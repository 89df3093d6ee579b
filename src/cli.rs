use std::io::Write;
use std::path::PathBuf;

use anyhow::{Result, ensure};
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::backend::{Backend, Embedder, LoadOptions};

/// Generate reference embedding vectors from locally cached models.
///
/// Prints one floating-point value per line to stdout, in the flattening
/// order of the vector returned by the selected backend. All diagnostics
/// go to stderr.
#[derive(Parser, Debug)]
#[command(name = "embedgen")]
#[command(version)]
pub struct Cli {
    /// Local model cache directory (must exist; nothing is downloaded)
    model_dir: PathBuf,

    /// Text to embed (a single word for the word2vec backend)
    text: String,

    /// Backend tag: bert, xlm-roberta, clip, model2vec, static-embeddings, word2vec
    backend: String,

    /// Token truncation length override for encoder backends
    #[arg(long)]
    max_length: Option<usize>,

    /// Output dimensionality for the static-embeddings backend
    #[arg(long, default_value_t = 1023)]
    truncate_dim: usize,

    /// Vectors file name for the word2vec backend
    #[arg(long, default_value = "model.txt")]
    model_file: String,

    /// Verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    let stdout = std::io::stdout();
    run_with(&cli, &mut stdout.lock())
}

fn init_tracing(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    // stdout carries the vector, so logs must go to stderr
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn run_with(cli: &Cli, out: &mut impl Write) -> Result<()> {
    // Tag validation comes first: an unsupported backend fails before the
    // model directory is touched and before anything reaches stdout.
    let backend = Backend::parse(&cli.backend)?;
    ensure!(
        cli.model_dir.exists(),
        "model dir {} does not exist",
        cli.model_dir.display()
    );

    let opts = LoadOptions {
        max_length: cli.max_length,
        truncate_dim: cli.truncate_dim,
        model_file: cli.model_file.clone(),
    };
    let mut embedder = Embedder::load(backend, &cli.model_dir, &opts)?;
    let vector = embedder.embed(&cli.text)?;
    print_vector(out, &vector)
}

fn print_vector(out: &mut impl Write, values: &[f32]) -> Result<()> {
    for value in values {
        writeln!(out, "{value}")?;
    }
    Ok(())
}
