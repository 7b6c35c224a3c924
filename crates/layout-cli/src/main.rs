//! layout-cli entrypoint: a demo/debug driver for the layout pipeline.
//! Loads a BPMN element model from JSON, runs it through [`layout_pipeline::run_layout`]
//! against the reference oracle, and writes the laid-out model back out as JSON.
use anyhow::{Context, Result, bail};
use clap::Parser;
use layout_config::{Compactness, Overrides, apply_scope_strategy, load_from, resolve};
use layout_model::{Element, Id, Registry};
use layout_oracle::reference::ReferenceOracle;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::info;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "layout-cli", version, about = "Run the BPMN auto-layout pipeline over a JSON element model")]
struct Args {
    /// Path to a JSON array of elements (see `Element`'s serde shape).
    /// Elements are expected in id order: array index N becomes `Id(N)`.
    input: PathBuf,
    /// Where to write the laid-out model. Defaults to stdout.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Id of the canvas/process element that roots the diagram.
    #[arg(long, default_value_t = 0)]
    canvas: u32,
    /// Optional layout config TOML (overrides discovery of `layout.toml`).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Re-layout only the subtree rooted at this element id, leaving
    /// everything outside it untouched.
    #[arg(long)]
    scope: Option<u32>,
    /// Layout direction: right, down, left, up.
    #[arg(long)]
    direction: Option<String>,
    /// Spacing preset: compact, spacious. Omit for the default.
    #[arg(long)]
    compactness: Option<String>,
    /// Print each pipeline step's name, duration, and moved-element count
    /// to stderr after the run.
    #[arg(long)]
    explain: bool,
}

fn configure_logging() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init();
    });
}

fn load_registry(path: &Path) -> Result<Registry> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let elements: Vec<Element> = serde_json::from_str(&raw).with_context(|| format!("parsing {} as a JSON element array", path.display()))?;
    let mut registry = Registry::new();
    for element in elements {
        registry.insert(element);
    }
    Ok(registry)
}

fn parse_direction(s: &str) -> Result<layout_oracle::Direction> {
    use layout_oracle::Direction::*;
    Ok(match s.to_ascii_lowercase().as_str() {
        "right" => Right,
        "down" => Down,
        "left" => Left,
        "up" => Up,
        other => bail!("unknown --direction {other:?}, expected one of right, down, left, up"),
    })
}

fn parse_compactness(s: &str) -> Result<Compactness> {
    Ok(match s.to_ascii_lowercase().as_str() {
        "compact" => Compactness::Compact,
        "spacious" => Compactness::Spacious,
        other => bail!("unknown --compactness {other:?}, expected compact or spacious"),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    configure_logging();

    let args = Args::parse();
    info!(target: "cli", input = %args.input.display(), "startup");

    let mut registry = load_registry(&args.input)?;
    let canvas = Id(args.canvas);
    if registry.get(canvas).is_none() {
        bail!("canvas element {canvas:?} not found in {}", args.input.display());
    }

    let file = load_from(args.config.as_deref());

    let overrides = Overrides {
        scope_element_id: args.scope.map(Id),
        compactness: args.compactness.as_deref().map(parse_compactness).transpose()?,
        direction: args.direction.as_deref().map(parse_direction).transpose()?,
    };
    let mut resolved = resolve(&file, &overrides);
    apply_scope_strategy(&mut resolved);

    let oracle = ReferenceOracle::new();
    let report = layout_pipeline::run_layout(&mut registry, canvas, &oracle, &resolved)
        .await
        .context("layout pipeline failed")?;

    if args.explain {
        for step in report.log.records() {
            eprintln!(
                "{:<32} {:>8.2?} moved={}",
                step.name,
                step.duration,
                step.elements_moved.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())
            );
        }
    }

    let out_json = serde_json::to_string_pretty(&registry.get_all())?;
    match args.output {
        Some(path) => std::fs::write(&path, out_json).with_context(|| format!("writing {}", path.display()))?,
        None => println!("{out_json}"),
    }

    Ok(())
}
