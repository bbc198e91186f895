//! slidemark - Markdown slide decks as web presentations and PDFs.
//!
//! # Usage
//!
//! ```bash
//! slidemark serve -i presentation.md
//! slidemark export dist/talk.pdf --slides 5
//! slidemark parse -i presentation.md
//! slidemark extract -i presentation.md --diagrams-dir public/diagrams
//! slidemark encode diagrams/flow.puml
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use slidemark::config::{
    ConfigFlags, clear_config_flags, global_config_path, load_config_flags, local_override_path,
    parse_flag_tokens, save_config_flags,
};
use slidemark::deck;
use slidemark::diagram::{
    DEFAULT_DIAGRAMS_DIR, DEFAULT_RENDER_ENDPOINT, DiagramGateway, FsDiagramStore, KrokiService,
    encoder, extract_diagrams, write_diagrams,
};
use slidemark::export::{
    ChromeLauncher, DEFAULT_OUTPUT, ExportOptions, Exporter, ServerCommand, SystemClock,
};
use slidemark::html::DiagramMode;
use slidemark::server::{self, AppState, DEFAULT_PORT};

const DEFAULT_INPUT: &str = "presentation.md";
const RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Markdown slide decks as web presentations and PDFs
#[derive(Parser, Debug)]
#[command(name = "slidemark", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory that diagram references and includes resolve against
    #[arg(long, global = true, value_name = "DIR")]
    diagrams_dir: Option<PathBuf>,

    /// Kroki-compatible diagram rendering service
    #[arg(long, global = true, value_name = "URL")]
    render_endpoint: Option<String>,

    /// PlantUML server used for linked diagrams
    #[arg(long, global = true, value_name = "URL")]
    plantuml_server: Option<String>,

    /// Link diagram images to the PlantUML server instead of serving them
    #[arg(long, global = true)]
    linked_diagrams: bool,

    /// Save current command-line flags as defaults
    #[arg(long, global = true)]
    save: bool,

    /// Clear saved defaults
    #[arg(long, global = true)]
    clear: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the presentation over HTTP
    Serve {
        /// Markdown deck
        #[arg(short, long, value_name = "FILE", default_value = DEFAULT_INPUT)]
        input: PathBuf,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },

    /// Export the presentation to a PDF
    Export {
        /// Output file
        #[arg(value_name = "OUTPUT", default_value = DEFAULT_OUTPUT)]
        output: PathBuf,

        /// Export only the first N slides
        #[arg(short, long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
        slides: Option<u64>,

        /// Markdown deck
        #[arg(short, long, value_name = "FILE", default_value = DEFAULT_INPUT)]
        input: PathBuf,

        /// Export from an already running presentation
        #[arg(long, value_name = "URL")]
        url: Option<String>,

        /// Port for the temporary presentation server
        #[arg(long)]
        port: Option<u16>,

        /// Capture slides without waiting for diagram images
        #[arg(long)]
        no_diagram_wait: bool,
    },

    /// Print the parsed deck as JSON
    Parse {
        /// Markdown deck
        #[arg(short, long, value_name = "FILE", default_value = DEFAULT_INPUT)]
        input: PathBuf,
    },

    /// Move inline diagrams into files under the diagrams directory
    Extract {
        /// Markdown deck
        #[arg(short, long, value_name = "FILE", default_value = DEFAULT_INPUT)]
        input: PathBuf,

        /// Write the rewritten deck here instead of over the input
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print the URL token for a diagram file (stdin when omitted)
    Encode {
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

fn diagrams_dir(flags: &ConfigFlags) -> PathBuf {
    flags
        .diagrams_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DIAGRAMS_DIR))
}

fn build_gateway(flags: &ConfigFlags) -> DiagramGateway {
    let dir = diagrams_dir(flags);
    let endpoint = flags
        .render_endpoint
        .clone()
        .unwrap_or_else(|| DEFAULT_RENDER_ENDPOINT.to_string());
    let gateway = DiagramGateway::new(
        Box::new(FsDiagramStore::new(dir)),
        Box::new(KrokiService::new(endpoint, RENDER_TIMEOUT)),
    );
    match &flags.plantuml_server {
        Some(server) => gateway.with_plantuml_server(server.clone()),
        None => gateway,
    }
}

const fn diagram_mode(flags: &ConfigFlags) -> DiagramMode {
    if flags.linked_diagrams {
        DiagramMode::Linked
    } else {
        DiagramMode::Served
    }
}

fn serve(input: &Path, flags: &ConfigFlags) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("File not found: {}", input.display());
    }
    let port = flags.port.unwrap_or(DEFAULT_PORT);
    let state = AppState::new(input, build_gateway(flags), diagram_mode(flags));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(server::serve(state, port))
}

fn export(
    output: PathBuf,
    slides: Option<u64>,
    input: &Path,
    url: Option<String>,
    flags: &ConfigFlags,
) -> Result<PathBuf> {
    let port = flags.port.unwrap_or(DEFAULT_PORT);

    // The child reads the same config files; only pass what it cannot know.
    let child_flags = ConfigFlags {
        port: None,
        no_diagram_wait: false,
        ..flags.clone()
    };
    let mut extra_args = vec!["--input".to_string(), input.display().to_string()];
    extra_args.extend(child_flags.to_tokens());
    let server =
        ServerCommand::current_exe(port, extra_args).context("Failed to locate executable")?;

    let mut options = ExportOptions::new(output, server);
    options.max_slides = slides.map(|n| usize::try_from(n).unwrap_or(usize::MAX));
    options.base_url = url;
    options.wait_for_diagrams = !flags.no_diagram_wait;

    if options.base_url.is_none() && !input.exists() {
        anyhow::bail!("File not found: {}", input.display());
    }

    Exporter::new(options).run(&ChromeLauncher::default(), &SystemClock::new())
}

fn extract(input: &Path, output: Option<&Path>, flags: &ConfigFlags) -> Result<()> {
    let source = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read deck {}", input.display()))?;
    let extraction = extract_diagrams(&source);
    if extraction.diagrams.is_empty() {
        println!("No inline diagrams in {}", input.display());
        return Ok(());
    }

    let dir = diagrams_dir(flags);
    for path in write_diagrams(&dir, &extraction.diagrams)? {
        println!("{}", path.display());
    }

    let target = output.unwrap_or(input);
    std::fs::write(target, &extraction.markdown)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    tracing::info!(
        diagrams = extraction.diagrams.len(),
        deck = %target.display(),
        "extracted inline diagrams"
    );
    Ok(())
}

fn read_source(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .context("Failed to read stdin")?;
            Ok(source)
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let raw_args = std::env::args().collect::<Vec<_>>();
    let cli = Cli::parse();
    let global_path = global_config_path();
    let local_path = local_override_path();
    let cli_flags = parse_flag_tokens(&raw_args);

    if cli.clear {
        clear_config_flags(&global_path)?;
    }
    if cli.save {
        save_config_flags(&global_path, &cli_flags)?;
    }

    let file_flags = if cli.clear {
        ConfigFlags::default()
    } else {
        let global_flags = load_config_flags(&global_path)?;
        let local_flags = load_config_flags(&local_path)?;
        global_flags.union(&local_flags)
    };
    let effective = file_flags.union(&cli_flags);
    tracing::debug!(?effective, "effective configuration");

    match cli.command {
        Commands::Serve { input, .. } => serve(&input, &effective),
        Commands::Export {
            output,
            slides,
            input,
            url,
            ..
        } => {
            let path = export(output, slides, &input, url, &effective)?;
            println!("{}", path.display());
            Ok(())
        }
        Commands::Parse { input } => {
            let deck = deck::load(&input)?;
            let json = serde_json::to_string_pretty(&deck).context("Failed to serialize deck")?;
            println!("{json}");
            Ok(())
        }
        Commands::Extract { input, output } => extract(&input, output.as_deref(), &effective),
        Commands::Encode { file } => {
            let source = read_source(file.as_deref())?;
            println!("{}", encoder::encode(&source));
            Ok(())
        }
    }
}
