use offerdex::cli::{Cli, Commands, ConfigAction};
use offerdex::config::Config;
use offerdex::embedding::{EmbeddingProvider, OpenAiEmbedder};
use offerdex::engine::{Engine, SearchRequest};
use offerdex::error::{OfferdexError, Result};
use offerdex::ingest::IngestionPipeline;
use offerdex::tools;

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Load { source, batch_size } => {
            cmd_load(cli.config, source, batch_size)?;
        }
        Commands::Query {
            query,
            limit,
            min_epc,
            category,
            json,
        } => {
            cmd_query(cli.config, query, limit, min_epc, category, json)?;
        }
        Commands::Categories { json } => {
            cmd_categories(cli.config, json)?;
        }
        Commands::Top {
            category,
            limit,
            json,
        } => {
            cmd_top(cli.config, category, limit, json)?;
        }
        Commands::Stats { json } => {
            cmd_stats(cli.config, json)?;
        }
        Commands::Serve => {
            cmd_serve(cli.config)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_filter = if verbose { "offerdex=debug" } else { "offerdex=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // stderr keeps the serve loop's stdout stream clean
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let api_key = std::env::var(&config.embedding.api_key_env).map_err(|_| {
        OfferdexError::Config(format!(
            "Environment variable {} is not set",
            config.embedding.api_key_env
        ))
    })?;

    let embedder = OpenAiEmbedder::new(
        &api_key,
        &config.embedding.endpoint,
        &config.embedding.model,
        config.embedding.dimension,
        Duration::from_secs(config.embedding.timeout_secs),
        config.embedding.max_attempts,
    )?;

    Ok(Arc::new(embedder))
}

fn open_engine(config: &Config) -> Result<Engine> {
    let provider = build_provider(config)?;
    Engine::open(&config.catalog_path(), provider)
}

fn cmd_load(
    config_path: Option<PathBuf>,
    source: PathBuf,
    batch_size: Option<usize>,
) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let provider = build_provider(&config)?;

    let pipeline =
        IngestionPipeline::new(provider, batch_size.unwrap_or(config.ingest.batch_size));
    let report = pipeline.run_file(&source, &config.catalog_path())?;

    println!(
        "Loaded {} products into {} ({} batches, {} duplicates dropped, {}ms)",
        report.ingested,
        config.catalog_path().display(),
        report.batches,
        report.duplicates,
        report.duration_ms
    );
    Ok(())
}

fn cmd_query(
    config_path: Option<PathBuf>,
    query: String,
    limit: i64,
    min_epc: Option<f64>,
    category: Option<String>,
    json: bool,
) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let engine = open_engine(&config)?;

    let results = engine.search(&SearchRequest {
        query,
        limit: Some(limit),
        min_epc,
        category,
    })?;

    if json {
        println!("{}", to_pretty_json(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No matching products.");
        return Ok(());
    }
    for result in &results {
        println!(
            "• {}  [{}]  epc {:.2}  relevance {:.3}",
            result.name.as_deref().unwrap_or("(unnamed)"),
            result.category.as_deref().unwrap_or("-"),
            result.epc,
            result.relevance.unwrap_or(0.0)
        );
        if let Some(url) = &result.url {
            println!("    {}", url);
        }
        if let Some(coupon) = &result.coupon {
            println!("    coupon: {}", coupon);
        }
    }
    Ok(())
}

fn cmd_categories(config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let engine = open_engine(&config)?;

    let categories = engine.categories()?;
    if json {
        println!("{}", to_pretty_json(&categories)?);
        return Ok(());
    }
    for entry in &categories {
        println!("{:6}  {}", entry.product_count, entry.category);
    }
    Ok(())
}

fn cmd_top(
    config_path: Option<PathBuf>,
    category: Option<String>,
    limit: i64,
    json: bool,
) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let engine = open_engine(&config)?;

    let results = engine.top_products(category.as_deref(), Some(limit))?;
    if json {
        println!("{}", to_pretty_json(&results)?);
        return Ok(());
    }
    for result in &results {
        println!(
            "{:8.2}  {}  [{}]",
            result.epc,
            result.name.as_deref().unwrap_or("(unnamed)"),
            result.category.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn cmd_stats(config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let engine = open_engine(&config)?;

    let stats = engine.stats()?;
    if json {
        println!("{}", to_pretty_json(&stats)?);
        return Ok(());
    }
    println!("Products:        {}", stats.total_products);
    println!("Categories:      {}", stats.categories);
    println!("Average EPC:     {:.2}", stats.average_epc);
    println!("With coupons:    {}", stats.products_with_coupons);
    println!("Top categories:");
    for entry in &stats.top_categories {
        println!("  {:6}  {}", entry.product_count, entry.category);
    }
    Ok(())
}

fn cmd_serve(config_path: Option<PathBuf>) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let engine = open_engine(&config)?;

    tracing::info!("Serving tool requests on stdin (one JSON request per line)");

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    for line in stdin.lock().lines() {
        let line = line.map_err(|e| OfferdexError::Io {
            source: e,
            context: "Failed to read request line".to_string(),
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let response = tools::handle_line(&engine, &line);
        let mut out = stdout.lock();
        writeln!(out, "{}", response).and_then(|_| out.flush()).map_err(|e| {
            OfferdexError::Io {
                source: e,
                context: "Failed to write response".to_string(),
            }
        })?;
    }
    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(p) => p,
                None => Config::default_path()?,
            };
            if path.exists() && !force {
                return Err(OfferdexError::Config(format!(
                    "Config already exists at {} (use --force to overwrite)",
                    path.display()
                )));
            }
            Config::default().save(&path)?;
            println!("Wrote default config to {}", path.display());
        }
        ConfigAction::Show => {
            let config = Config::load_or_default(config_path)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| OfferdexError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })
}
