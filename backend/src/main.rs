//! Bulkedit CLI - preview and apply bulk metadata edits
//!
//! # Main Commands
//!
//! ```bash
//! bulkedit preview edits.csv          # Show what would change
//! bulkedit import edits.csv           # Preview, confirm, apply
//! bulkedit export -c 123456789/1      # Current state as CSV
//! bulkedit serve                      # Start HTTP server (port 3000)
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! bulkedit parse edits.xlsx           # Parsed lines as JSON
//! bulkedit fields                     # Registered metadata fields
//! ```

use clap::{Parser, Subcommand};
use bulkedit::{
    export_collection, load_document, run_import, BatchPolicy, BulkEditConfig, ChangeReport,
    ImportOptions, MemoryRepository, PipelineError, WorkbookOptions,
};
use bulkedit::store::memory::DEFAULT_STORE_PATH;
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "bulkedit")]
#[command(about = "Preview and apply bulk metadata edits from CSV or workbook files", long_about = None)]
struct Cli {
    /// JSON configuration file (separators, authority control, permissions)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Repository snapshot file
    #[arg(long, global = true, default_value = DEFAULT_STORE_PATH)]
    store: PathBuf,

    /// Debug output on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a document and output its lines as JSON
    Parse {
        /// Input CSV or workbook
        input: PathBuf,

        /// Collection for new workbook items
        #[arg(short, long)]
        collection: Option<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the changes a document would make
    Preview {
        /// Input CSV or workbook
        input: PathBuf,

        /// Collection for new workbook items
        #[arg(short, long)]
        collection: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Preview, confirm and apply a document
    Import {
        /// Input CSV or workbook
        input: PathBuf,

        /// Collection for new workbook items
        #[arg(short, long)]
        collection: Option<String>,

        /// Abort the whole batch on the first rejected row
        #[arg(long)]
        stop_on_error: bool,

        /// Apply without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Export current item state as CSV
    Export {
        /// Only items of this collection
        #[arg(short, long)]
        collection: Option<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the metadata fields accepted as headings
    Fields,

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // RUST_LOG overrides
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_module("bulkedit", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let result = match cli.command {
        Commands::Parse {
            ref input,
            ref collection,
            ref output,
        } => cmd_parse(&cli, input, collection.clone(), output.as_deref()),

        Commands::Preview {
            ref input,
            ref collection,
            json,
        } => cmd_preview(&cli, input, collection.clone(), json),

        Commands::Import {
            ref input,
            ref collection,
            stop_on_error,
            yes,
        } => cmd_import(&cli, input, collection.clone(), stop_on_error, yes),

        Commands::Export {
            ref collection,
            ref output,
        } => cmd_export(&cli, collection.as_deref(), output.as_deref()),

        Commands::Fields => cmd_fields(&cli),

        Commands::Serve { port } => cmd_serve(&cli, port).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<BulkEditConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => BulkEditConfig::from_file(path)?,
        None => BulkEditConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}

fn open_store(cli: &Cli) -> Result<MemoryRepository, Box<dyn std::error::Error>> {
    if !cli.store.exists() {
        eprintln!("⚠️  No repository at {}, starting empty", cli.store.display());
    }
    Ok(MemoryRepository::open(&cli.store)?)
}

fn cmd_parse(
    cli: &Cli,
    input: &Path,
    collection: Option<String>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing: {}", input.display());

    let config = load_config(cli)?;
    let repo = open_store(cli)?;
    let document = load_document(input, &config, &repo, &WorkbookOptions { collection })?;

    eprintln!("   Encoding: {}", document.encoding);
    eprintln!("   Columns: {}", document.headers.join(", "));
    eprintln!("✅ Parsed {} lines", document.lines.len());
    if !document.rejected.is_empty() {
        eprintln!("⚠️  {} rows rejected", document.rejected.len());
    }

    let json = serde_json::to_string_pretty(&document)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_preview(
    cli: &Cli,
    input: &Path,
    collection: Option<String>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", input.display());

    let config = load_config(cli)?;
    let mut repo = open_store(cli)?;
    let document = load_document(input, &config, &repo, &WorkbookOptions { collection })?;

    let batch = run_import(&mut repo, &document, &config, &ImportOptions::preview())?;
    let report = ChangeReport::from_batch(&batch, &config);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}

fn cmd_import(
    cli: &Cli,
    input: &Path,
    collection: Option<String>,
    stop_on_error: bool,
    yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", input.display());

    let config = load_config(cli)?;
    let mut repo = open_store(cli)?;
    let document = load_document(input, &config, &repo, &WorkbookOptions { collection })?;
    let policy = if stop_on_error {
        BatchPolicy::StopOnError
    } else {
        BatchPolicy::Continue
    };

    let preview = run_import(
        &mut repo,
        &document,
        &config,
        &ImportOptions {
            commit: false,
            policy,
        },
    )
    .map_err(describe_abort)?;
    let report = ChangeReport::from_batch(&preview, &config);
    println!("{}", report);

    if report.changed == 0 {
        eprintln!("\n✨ Nothing to do");
        return Ok(());
    }

    if !yes {
        let proceed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Apply changes to {} item(s)?", report.changed))
            .default(false)
            .interact()?;
        if !proceed {
            eprintln!("Aborted. No changes were made.");
            return Ok(());
        }
    }

    let batch = run_import(&mut repo, &document, &config, &ImportOptions::commit(policy))
        .map_err(describe_abort)?;
    println!("{}", ChangeReport::from_batch(&batch, &config));
    eprintln!("💾 Repository saved to: {}", cli.store.display());

    eprintln!("\n✨ Done!");
    Ok(())
}

fn describe_abort(err: PipelineError) -> Box<dyn std::error::Error> {
    match err {
        PipelineError::Aborted(failure) => format!("Import aborted: {}", failure).into(),
        other => other.into(),
    }
}

fn cmd_export(
    cli: &Cli,
    collection: Option<&str>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli)?;
    let repo = open_store(cli)?;
    let csv = export_collection(&repo, collection, &config)?;
    write_output(csv.trim_end(), output)?;
    Ok(())
}

fn cmd_fields(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli)?;
    let repo = open_store(cli)?;

    let mut fields = repo.snapshot().fields.clone();
    fields.sort_by_key(|f| f.name());

    println!("📋 {} registered fields\n", fields.len());
    for field in &fields {
        let name = field.name();
        let marker = if config.authority_controlled.contains(&name) { " [authority]" } else { "" };
        match &field.scope_note {
            Some(note) => println!("  {}{} - {}", name, marker, note),
            None => println!("  {}{}", name, marker),
        }
    }
    Ok(())
}

async fn cmd_serve(cli: &Cli, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli)?;
    let repo = open_store(cli)?;
    bulkedit::server::start_server(port, repo, config).await
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
