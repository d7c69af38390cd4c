//! Command-line interface
//!
//! `serve` (the default) starts the HTTP API. The other subcommands run a
//! single operation and print the answer to stdout; logs go to stderr.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::info;

use crate::agents::{ResearchMode, ResearchPipeline};
use crate::chat::{ChatError, ConversationController};
use crate::config::Config;
use crate::models::AppState;
use crate::routes::create_router;
use crate::search::{
    build_scholar, build_web_search, SearchAdapter, SourceId, UnconfiguredAdapter, SCHOLAR_SETTING,
    WEB_SEARCH_SETTING,
};

/// Drug discovery research agent
///
/// Searches preprints, biomedical literature, molecule and clinical-trial
/// registries, and the web, then writes a cited report with a language model.
#[derive(Parser, Debug)]
#[command(
    name = "drug-discovery-agent",
    version,
    about = "Drug discovery research agent",
    after_help = "EXAMPLES:\n    \
                  drug-discovery-agent                              # Start the HTTP API\n    \
                  drug-discovery-agent ask \"KRAS G12C inhibitors\"   # One report to stdout\n    \
                  drug-discovery-agent chat --mode thorough         # Interactive session\n    \
                  drug-discovery-agent --config research.toml sources"
)]
pub struct Cli {
    /// Configuration file (defaults to research.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP API server
    Serve,

    /// Research one question and print the report
    Ask {
        query: String,

        /// Research mode: fast or thorough
        #[arg(short, long, default_value = "fast", value_parser = parse_mode)]
        mode: ResearchMode,
    },

    /// Interactive research session on stdin (`/clear` resets, `/quit` exits)
    Chat {
        #[arg(short, long, default_value = "fast", value_parser = parse_mode)]
        mode: ResearchMode,
    },

    /// Show which data sources are available
    Sources,

    /// Aggregate search without writing a report
    Search {
        query: String,

        #[arg(short, long, default_value = "fast", value_parser = parse_mode)]
        mode: ResearchMode,

        /// Results per source (overrides the mode's count)
        #[arg(short = 'n', long)]
        max_results: Option<usize>,
    },

    /// Latest news from web search
    News {
        query: String,

        #[arg(short = 'n', long)]
        max_results: Option<usize>,
    },

    /// Google Scholar author profile and publications
    Author {
        name: String,

        #[arg(short = 'n', long)]
        max_results: Option<usize>,
    },

    /// Google Scholar record of a paper and who cites it
    Cite { title: String },
}

fn parse_mode(value: &str) -> Result<ResearchMode, String> {
    ResearchMode::from_name(value).ok_or_else(|| format!("unknown mode '{}', expected fast or thorough", value))
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::load_with_file(path),
            None => Config::load(),
        }
    }
}

/// Dispatch a parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.load_config()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Ask { query, mode } => {
            let pipeline = ResearchPipeline::from_config(&config)?;
            let report = pipeline.run(&query, mode).await?;
            println!("{}", report.content);
            for url in &report.images {
                println!("[image] {}", url);
            }
            Ok(())
        }
        Commands::Chat { mode } => chat(config, mode).await,
        Commands::Sources => {
            for status in config.search.statuses() {
                let marker = if status.available { "available" } else { "unavailable" };
                println!("{:<20} {:<12} {}", status.name, marker, status.description);
            }
            Ok(())
        }
        Commands::Search { query, mode, max_results } => {
            let pipeline = ResearchPipeline::from_config(&config)?;
            let results = pipeline.search(&query, mode, max_results).await;
            println!("{}", results.render());
            Ok(())
        }
        Commands::News { query, max_results } => {
            let timeout = Duration::from_secs(config.search.http_timeout_secs);
            let text = match build_web_search(&config.search, timeout)? {
                Some(web) => web.search_news(&query, max_results).await,
                None => {
                    UnconfiguredAdapter::new(SourceId::GoogleSearch, WEB_SEARCH_SETTING)
                        .search_text(&query, None)
                        .await
                }
            };
            println!("{}", text);
            Ok(())
        }
        Commands::Author { name, max_results } => {
            let text = match build_scholar(&config.search) {
                Some(scholar) => scholar.search_author(&name, max_results).await,
                None => scholar_unavailable(&name).await,
            };
            println!("{}", text);
            Ok(())
        }
        Commands::Cite { title } => {
            let text = match build_scholar(&config.search) {
                Some(scholar) => scholar.search_citations(&title).await,
                None => scholar_unavailable(&title).await,
            };
            println!("{}", text);
            Ok(())
        }
    }
}

async fn scholar_unavailable(query: &str) -> String {
    UnconfiguredAdapter::new(SourceId::GoogleScholar, SCHOLAR_SETTING)
        .search_text(query, None)
        .await
}

async fn serve(config: Config) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::from_config(config)?;
    if !state.pipeline.llm_configured() {
        tracing::warn!("No language model configured; /api/chat will answer with an apology");
    }
    let app = create_router(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;
    Ok(())
}

async fn chat(config: Config, mut mode: ResearchMode) -> Result<()> {
    let pipeline = ResearchPipeline::from_config(&config)?;
    if !pipeline.llm_configured() {
        bail!("No language model is configured; set an API key for the LLM provider");
    }

    let mut controller = ConversationController::new();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if controller.ensure_greeting() {
            if let Some(welcome) = controller.history().last() {
                stdout.write_all(format!("{}\n", welcome.content).as_bytes()).await?;
            }
        }
        stdout.write_all(format!("\n[{}] > ", mode).as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "/quit" | "/exit" => break,
            "/clear" => {
                controller.clear();
                continue;
            }
            command if command.starts_with("/mode") => {
                let name = command.trim_start_matches("/mode").trim();
                match ResearchMode::from_name(name) {
                    Some(m) => mode = m,
                    None => eprintln!("Unknown mode '{}', expected fast or thorough", name),
                }
                continue;
            }
            _ => {}
        }

        match controller.submit(&line, mode, &pipeline).await {
            Ok(reply) => {
                stdout.write_all(format!("\n{}\n", reply.content).as_bytes()).await?;
                for url in &reply.images {
                    stdout.write_all(format!("[image] {}\n", url).as_bytes()).await?;
                }
            }
            Err(ChatError::EmptyQuery) => continue,
            Err(e) => eprintln!("{}", e),
        }
    }
    Ok(())
}
