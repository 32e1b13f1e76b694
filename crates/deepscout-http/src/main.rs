use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deepscout::config::{disk_cache_dir_from_env, split_list};
use deepscout::core::FetchOptions;
use deepscout::render::render_pdf;
use deepscout::report::{self, OutputFormat};
use deepscout::research::ResearchRequest;
use deepscout::server::{self, AppState};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "deepscout")]
#[command(about = "Iterative web research: search, fetch, summarize, refine, report", long_about = None)]
struct Cli {
    /// Model name passed to the text-generation backend.
    #[arg(long, global = true, env = "DEEPSCOUT_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API.
    Serve(ServeCmd),
    /// Run one deep-research job and print the report (json) or write a PDF.
    Research(ResearchCmd),
    /// Show resolved configuration (json; no secrets).
    Doctor,
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct ServeCmd {
    /// Address to listen on.
    #[arg(long, env = "DEEPSCOUT_BIND", default_value = "127.0.0.1:8000")]
    bind: std::net::SocketAddr,
}

#[derive(clap::Args, Debug)]
struct ResearchCmd {
    query: String,
    /// Comma-separated engine names (default: all).
    #[arg(long)]
    engines: Option<String>,
    /// markdown | json | csv | anything containing "table".
    #[arg(long, default_value = "markdown")]
    format: String,
    #[arg(long)]
    max_iterations: Option<usize>,
    #[arg(long)]
    extract_links: bool,
    #[arg(long)]
    extract_emails: bool,
    /// Write the report as a PDF here instead of printing json.
    #[arg(long)]
    pdf: Option<std::path::PathBuf>,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

/// Optional env file (`DEEPSCOUT_ENV_FILE`); never overrides variables already set.
fn load_env_file() {
    let Some(path) = std::env::var("DEEPSCOUT_ENV_FILE")
        .ok()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
    else {
        return;
    };
    if let Err(e) = dotenvy::from_path(&path) {
        eprintln!("deepscout: could not load env file {path}: {e}");
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn research(state: AppState, cmd: ResearchCmd) -> Result<()> {
    let started = std::time::Instant::now();
    let format = OutputFormat::parse(&cmd.format);
    let researcher = state.researcher();
    let config = researcher.config().clone();
    let request = ResearchRequest {
        query: cmd.query.clone(),
        engines: cmd
            .engines
            .as_deref()
            .map(split_list)
            .unwrap_or_else(|| config.default_engines.clone()),
        max_iterations: config.iterations(cmd.max_iterations),
        fetch: FetchOptions {
            snippet_len: config.deep_snippet_len,
            extract_links: cmd.extract_links,
            extract_emails: cmd.extract_emails,
        },
    };

    let outcome = researcher.run(&request).await?;
    let explanation =
        report::synthesize(researcher.llm(), &cmd.query, &format, &outcome.summaries).await?;

    if let Some(path) = cmd.pdf {
        let bytes = render_pdf(
            &cmd.query,
            &explanation.to_document_text(),
            &outcome.references,
            chrono::Local::now().date_naive(),
        )?;
        std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "pdf written");
        return Ok(());
    }

    let v = serde_json::json!({
        "explanation": report::shape_explanation(&format, &explanation)?,
        "references": outcome.references,
        "elapsed_time": format!("{:.2} seconds", started.elapsed().as_secs_f64()),
        "extracted_data": outcome.extracted,
        "current_query": outcome.current_query,
        "iteration": outcome.iterations,
    });
    println!("{}", serde_json::to_string_pretty(&v)?);
    Ok(())
}

fn doctor() -> serde_json::Value {
    fn has_env(k: &str) -> bool {
        std::env::var(k).ok().is_some_and(|v| !v.trim().is_empty())
    }
    let settings = deepscout::local::FetchSettings::from_env();
    let config = deepscout::config::ResearchConfig::from_env();
    let backend = std::env::var("DEEPSCOUT_LLM_BACKEND").unwrap_or_else(|_| "gemini".to_string());
    serde_json::json!({
        "schema_version": 1,
        "kind": "doctor",
        "name": "deepscout",
        "version": env!("CARGO_PKG_VERSION"),
        "llm": {
            "backend": backend,
            "gemini_key_configured": has_env("DEEPSCOUT_GEMINI_API_KEY")
                || has_env("GEMINI_API_KEY")
                || has_env("GOOGLE_API_KEY"),
            "openai_compat_configured": has_env("DEEPSCOUT_OPENAI_COMPAT_BASE_URL"),
            "ollama_enabled": has_env("DEEPSCOUT_OLLAMA_ENABLE"),
        },
        "cache": {
            "enabled": settings.cache_enabled,
            "ttl_s": settings.cache_ttl.as_secs(),
            "dir": settings.cache_dir.or_else(disk_cache_dir_from_env),
        },
        "research": {
            "workers": config.workers,
            "chunk_token_budget": config.chunk_token_budget,
            "max_iterations": config.max_iterations,
            "max_iterations_cap": config.max_iterations_cap,
            "engines": config.default_engines,
        },
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    let cli = Cli::parse();

    match cli.command {
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "deepscout",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("deepscout {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
        Commands::Doctor => println!("{}", doctor()),
        Commands::Serve(args) => {
            init_tracing();
            let state = AppState::from_env(cli.model)?;
            server::serve(Arc::new(state), args.bind).await?;
        }
        Commands::Research(args) => {
            init_tracing();
            let state = AppState::from_env(cli.model)?;
            research(state, args).await?;
        }
    }
    Ok(())
}
