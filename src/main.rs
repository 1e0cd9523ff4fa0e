mod cli;

use reelfetch::{config, FetchEngine, FetchOptions, Origin, Priority};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelfetch=trace,reelfetch_common=debug,reqwest=debug".to_string()
        } else {
            "reelfetch=info,reqwest=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Fetch {
            path,
            key,
            priority,
            output,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(fetch_resource(
                cli.config.as_deref(),
                &path,
                key.as_deref(),
                priority,
                output.as_deref(),
            ))
        }
        Commands::CheckEndpoints { json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_endpoints(cli.config.as_deref(), json))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("reelfetch {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn fetch_resource(
    config_path: Option<&Path>,
    path: &str,
    key: Option<&str>,
    priority: Priority,
    output: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let engine = FetchEngine::new(config).context("Failed to start fetch engine")?;

    let key = key.unwrap_or(path);
    let options = FetchOptions {
        path: Some(path.to_string()),
        priority,
        ..Default::default()
    };

    tracing::info!(key, %priority, "Fetching");
    let result = engine.fetch(key, &[], options).await;
    engine.shutdown(true).await;

    let fetched = match result {
        Ok(fetched) => fetched,
        Err(e) => {
            if let Some(report) = e.report() {
                for (endpoint, failures) in report.by_endpoint() {
                    eprintln!("  {} ({} failure(s))", endpoint, failures.len());
                    for failure in failures {
                        eprintln!("    attempt {}: {}", failure.attempt, failure.cause);
                    }
                }
            }
            return Err(e).context(format!("Failed to fetch {}", path));
        }
    };

    let resource = &fetched.resource;
    match output {
        Some(out) => {
            tokio::fs::write(out, &resource.body)
                .await
                .with_context(|| format!("Failed to write {:?}", out))?;
            println!("Wrote {} bytes to {}", resource.body.len(), out.display());
        }
        None => {
            println!("Endpoint: {}", resource.endpoint);
            println!("Status: {}", resource.status);
            if let Some(ref content_type) = resource.content_type {
                println!("Content-Type: {}", content_type);
            }
            println!("Size: {} bytes", resource.body.len());
        }
    }

    match fetched.origin {
        Origin::Cache => println!("Served from cache"),
        Origin::Network { endpoint, attempts } => {
            println!("Fetched from {} in {} attempt(s)", endpoint, attempts)
        }
        Origin::Stale { error } => println!("Served stale value ({})", error),
    }

    Ok(())
}

async fn check_endpoints(config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let engine = FetchEngine::new(config).context("Failed to start fetch engine")?;

    let summary = engine.check_endpoints().await;
    let endpoints = engine.registry().report();
    engine.shutdown(false).await;

    if json {
        let json_str = serde_json::to_string_pretty(&serde_json::json!({
            "summary": summary,
            "endpoints": endpoints,
        }))?;
        println!("{}", json_str);
        return Ok(());
    }

    println!("Checking endpoints...\n");
    for endpoint in &endpoints {
        let status = if endpoint.available { "✓" } else { "✗" };
        print!("{} [{}] {}", status, endpoint.tier, endpoint.url);
        if let Some(latency) = endpoint.avg_latency_ms {
            print!(" ({:.0}ms)", latency);
        }
        if let Some(ref error) = endpoint.last_error {
            print!(" - {}", error);
        }
        println!();
    }

    println!();
    println!(
        "{}/{} endpoints reachable ({}ms)",
        summary.reachable, summary.checked, summary.duration_ms
    );

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            config.validate()?;
            config
        }
    };

    println!("✓ Configuration is valid");
    println!(
        "  Cache: {} entries, {}s TTL",
        config.cache.max_cache_size, config.cache.default_ttl_secs
    );
    println!(
        "  Workers: {}-{} (initial {})",
        config.scheduler.min_workers(),
        config.scheduler.max_workers(),
        config.scheduler.initial_workers
    );
    println!("  Queue: {}", config.scheduler.max_queue_size);
    println!(
        "  Retries: {} (base {}ms, x{})",
        config.retry.max_retries, config.retry.base_delay_ms, config.retry.backoff_factor
    );
    println!(
        "  Endpoints: {} primary, {} fallback, {} regional",
        config.endpoints.primary.len(),
        config.endpoints.fallback.len(),
        config.endpoints.regional.len()
    );

    Ok(())
}
