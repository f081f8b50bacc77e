use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use topoflow::{
    catalog::{CatalogSnapshot, InMemoryCatalog},
    command::{Command, Outcome},
    config::{Config, EngineConfig, EnvConfigSource},
    context::FlowContext,
    flow::{editor::FlowEditor, model::FlowDocument},
    logger::init_tracing,
    persistence::{read_document, write_document, FileFlowStore, FlowStore},
    realtime::{EventBus, RealtimeBridge, RealtimeEvent},
    schema::write_schema,
};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "topoflow",
    about = "Live topology graphs for message-broker monitoring",
    version
)]
struct Cli {
    /// Log level directive (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a diagram from the monitored topics of a catalog export
    Generate(GenerateArgs),

    /// Arrange a stored diagram file on the grid
    Layout(FileArgs),

    /// Print nodes and edges with their derived statuses
    Inspect { file: PathBuf },

    /// Apply a JSON-lines event log to a diagram and print the result
    Replay(ReplayArgs),

    /// List diagrams in the store
    List,

    /// Emit JSON-Schema for the wire types into `<root>/schemas`
    Schema,

    /// Run a live session fed by JSON-lines events on stdin
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Catalog export (JSON with `topics` and `connections`)
    #[arg(long)]
    catalog: PathBuf,

    /// Name of the saved diagram
    #[arg(long, default_value = "Generated topology")]
    name: String,

    /// Also arrange the result on the grid
    #[arg(long, default_value_t = false)]
    layout: bool,

    /// Write to this file instead of the store
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct FileArgs {
    file: PathBuf,

    /// Output file; defaults to overwriting the input
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    file: PathBuf,

    /// One `RealtimeEvent` JSON object per line
    #[arg(long)]
    events: PathBuf,

    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Open this stored diagram instead of the most recent one
    #[arg(long)]
    flow_id: Option<String>,
}

/// Resolve the topoflow root directory from the environment or use default.
pub fn resolve_root_dir() -> PathBuf {
    if let Ok(path) = env::var("TOPOFLOW_ROOT") {
        PathBuf::from(path)
    } else {
        PathBuf::from("./topoflow")
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let root = resolve_root_dir();

    let env_file = root.join(".env");
    let config = Config(EnvConfigSource::new(env_file.exists().then_some(env_file)));
    let engine = EngineConfig::load(&config).await;
    let log_level = cli.log_level.clone().unwrap_or_else(|| engine.log_level.clone());

    if let Err(e) = init_tracing(&root, "logs/topoflow.log", "logs/topoflow-events.json", &log_level) {
        eprintln!("could not set up logging: {:#}", e);
    }

    match cli.command {
        Commands::Generate(args) => generate(engine, args).await,
        Commands::Layout(args) => layout(args),
        Commands::Inspect { file } => {
            let editor = open_file(&file)?;
            print_graph(&editor);
            Ok(())
        }
        Commands::Replay(args) => replay(args),
        Commands::List => list(&engine).await,
        Commands::Schema => {
            let out_dir = root.join("schemas");
            let written = write_schema(&out_dir)?;
            println!("{} schemas written to {}", written.len(), out_dir.display());
            Ok(())
        }
        Commands::Run(args) => run(engine, args).await,
    }
}

fn open_store(engine: &EngineConfig) -> anyhow::Result<Arc<FileFlowStore>> {
    FileFlowStore::new(&engine.store_dir, engine.store_format())
        .with_context(|| format!("Failed to open flow store at {}", engine.store_dir.display()))
}

fn load_catalog(path: Option<&Path>) -> anyhow::Result<Arc<InMemoryCatalog>> {
    match path {
        Some(path) => InMemoryCatalog::from_file(path),
        None => Ok(InMemoryCatalog::from_snapshot(CatalogSnapshot::default())),
    }
}

fn open_file(file: &Path) -> anyhow::Result<FlowEditor> {
    let document = read_document(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let mut editor = FlowEditor::default();
    editor.load_document(document);
    Ok(editor)
}

fn report(outcome: &Outcome) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    if !outcome.success {
        bail!("{}", outcome.message);
    }
    Ok(())
}

async fn generate(engine: EngineConfig, args: GenerateArgs) -> anyhow::Result<()> {
    let catalog = load_catalog(Some(args.catalog.as_path()))?;
    let store = open_store(&engine)?;
    let ctx = FlowContext::new(engine, store, catalog, EventBus::default());

    // 1) synthesize
    let outcome = ctx.execute(Command::AutoGenerate).await;
    report(&outcome)?;

    // 2) optional grid
    if args.layout {
        report(&ctx.execute(Command::AutoLayout).await)?;
    }

    // 3) persist
    match args.out {
        Some(out) => {
            let document = ctx.editor().lock().await.to_document(Some(args.name));
            write_document(&out, &document).with_context(|| format!("Failed to write {}", out.display()))?;
            println!("Diagram written to {}", out.display());
        }
        None => report(&ctx.execute(Command::Save { name: Some(args.name) }).await)?,
    }
    Ok(())
}

fn layout(args: FileArgs) -> anyhow::Result<()> {
    let mut editor = open_file(&args.file)?;
    report(&editor.auto_layout())?;

    let out = args.out.unwrap_or(args.file);
    write_document(&out, &editor.to_document(None)).with_context(|| format!("Failed to write {}", out.display()))?;
    println!("Diagram written to {}", out.display());
    Ok(())
}

fn replay(args: ReplayArgs) -> anyhow::Result<()> {
    let mut editor = open_file(&args.file)?;
    let events = std::fs::read_to_string(&args.events)
        .with_context(|| format!("Failed to read {}", args.events.display()))?;

    let (mut applied, mut skipped) = (0usize, 0usize);
    for (line_no, line) in events.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RealtimeEvent>(line) {
            Ok(event) => {
                if RealtimeBridge::apply(&mut editor, &event) > 0 {
                    applied += 1;
                } else {
                    skipped += 1;
                }
            }
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "skipping malformed event");
                skipped += 1;
            }
        }
    }
    println!("{} events applied, {} skipped", applied, skipped);
    print_graph(&editor);

    if let Some(out) = args.out {
        write_document(&out, &editor.to_document(None))
            .with_context(|| format!("Failed to write {}", out.display()))?;
        println!("Diagram written to {}", out.display());
    }
    Ok(())
}

async fn list(engine: &EngineConfig) -> anyhow::Result<()> {
    let store = open_store(engine)?;
    let documents: Vec<FlowDocument> = store.list().await?;
    if documents.is_empty() {
        println!("No diagrams in {}", engine.store_dir.display());
        return Ok(());
    }
    for doc in documents {
        println!(
            "{:<38} {:<30} {:>4} nodes {:>4} edges  {}",
            doc.id.as_deref().unwrap_or("-"),
            doc.name,
            doc.nodes.len(),
            doc.edges.len(),
            doc.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn print_graph(editor: &FlowEditor) {
    if let Some(meta) = editor.current_flow() {
        println!("{} (live mode {})", meta.name, if editor.live_mode() { "on" } else { "off" });
    }
    for node in editor.nodes() {
        println!(
            "  node {:<40} {:<14} {:<12} {}",
            node.id,
            node.node_type.as_str(),
            node.data.status,
            node.data.label
        );
    }
    for edge in editor.edges() {
        println!(
            "  edge {:<40} {:<12} {} {}",
            edge.id,
            edge.data.status,
            edge.data.color,
            if edge.animated { "animated" } else { "" }
        );
    }
}

async fn run(engine: EngineConfig, args: RunArgs) -> anyhow::Result<()> {
    let catalog = load_catalog(args.catalog.as_deref())?;
    let store = open_store(&engine)?;
    let bus = EventBus::default();

    let ctx = FlowContext::init(engine, store, catalog.clone(), bus.clone()).await;
    ctx.attach(catalog).await;

    // 1) pick the starting diagram
    let opened = match &args.flow_id {
        Some(id) => ctx.execute(Command::Open { flow_id: id.clone() }).await,
        None => ctx.execute(Command::Load).await,
    };
    info!(success = opened.success, message = %opened.message, "Session started");
    if !opened.success && ctx.catalog().topics().await.iter().any(|t| t.monitored) {
        let generated = ctx.execute(Command::AutoGenerate).await;
        info!(message = %generated.message, "Started from the catalog");
    }

    // 2) feed stdin into the bus until EOF or ctrl-c
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match serde_json::from_str::<RealtimeEvent>(&line) {
                    Ok(event) => {
                        bus.publish(event);
                    }
                    Err(e) => warn!(error = %e, "ignoring malformed event"),
                },
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "stdin failed");
                    break;
                }
            }
        }
    }

    // 3) tear down, then flush the last edits
    ctx.dispose().await;
    let dirty = ctx.editor().lock().await.has_unsaved_changes();
    if dirty {
        let saved = ctx.execute(Command::Save { name: None }).await;
        info!(success = saved.success, message = %saved.message, "Final save");
    }
    print_graph(&*ctx.editor().lock().await);
    Ok(())
}
