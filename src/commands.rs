use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api;
use crate::config::{ProviderKind, Settings, get_config_dir};
use crate::embeddings::OllamaClient;
use crate::engine::{DEFAULT_CONTENT_TYPE, RagEngine};
use crate::experiment::TestGroup;

/// Settings from `config_dir`, or from the default directory
#[inline]
pub fn load_settings(config_dir: Option<PathBuf>) -> Result<Settings> {
    let config_dir = match config_dir {
        Some(dir) => dir,
        None => get_config_dir().context("Failed to determine config directory")?,
    };
    Settings::load(&config_dir)
}

async fn open_engine(settings: Settings) -> Result<RagEngine> {
    RagEngine::open(settings)
        .await
        .context("Failed to initialize RAG engine")
}

/// Serve the HTTP API, with periodic maintenance when enabled
#[inline]
pub async fn serve(settings: Settings) -> Result<()> {
    let maintenance_enabled = settings.maintenance.enabled;
    if settings.admin.identity.is_empty() {
        warn!("No admin identity configured; every admin request will be rejected");
    }

    let engine = Arc::new(open_engine(settings).await?);

    let maintenance = maintenance_enabled.then(|| engine.maintenance_task().spawn());

    let served = api::serve(engine).await;

    if let Some(handle) = maintenance {
        handle.abort();
    }
    served.context("API server failed")
}

#[inline]
pub fn show_settings(settings: &Settings) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Server:").bold().yellow());
    eprintln!("  Address: {}", style(settings.server.bind_address()).cyan());

    eprintln!("{}", style("Storage:").bold().yellow());
    eprintln!("  Backend: {}", style(format!("{:?}", settings.storage.backend)).cyan());
    eprintln!("  Timeout: {} ms", style(settings.storage.timeout_ms).cyan());
    eprintln!("  Read attempts: {}", style(settings.storage.read_attempts).cyan());

    eprintln!("{}", style("Embedding provider:").bold().yellow());
    eprintln!("  Kind: {}", style(format!("{:?}", settings.provider.kind)).cyan());
    match settings.provider.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Timeout: {} s", style(settings.provider.timeout_secs).cyan());

    eprintln!("{}", style("Policy:").bold().yellow());
    eprintln!(
        "  Re-vectorize delta: {}",
        style(settings.policy.re_vectorize_delta).cyan()
    );
    eprintln!(
        "  Config cache TTL: {} s",
        style(settings.policy.config_cache_ttl_secs).cyan()
    );
    eprintln!(
        "  Feedback learning rate: {}",
        style(settings.policy.feedback_learning_rate).cyan()
    );
    eprintln!("  A/B test: {}", style(&settings.experiment.test_name).cyan());

    let admin = if settings.admin.identity.is_empty() {
        style("(none)".to_string()).red()
    } else {
        style(settings.admin.identity.clone()).cyan()
    };
    eprintln!("  Admin identity: {}", admin);

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(settings.config_file_path().display()).dim()
    );
}

/// Write `settings` to disk so they can be edited by hand
#[inline]
pub fn init_settings(settings: &Settings) -> Result<()> {
    let config_path = settings.config_file_path();
    if config_path.exists() {
        eprintln!(
            "Configuration already exists at {}",
            style(config_path.display()).cyan()
        );
        return Ok(());
    }

    settings.save().context("Failed to save configuration")?;
    eprintln!("{}", style("✓ Configuration saved successfully!").green());
    eprintln!("Configuration saved to: {}", style(config_path.display()).cyan());
    Ok(())
}

/// Run one cleanup and event-pruning pass
#[inline]
pub async fn run_sweep(settings: Settings) -> Result<()> {
    let engine = open_engine(settings).await?;
    let report = engine.maintenance_task().run_once().await;

    match report.cleanup {
        Some(cleanup) if !cleanup.enabled => {
            println!("Vector cleanup is disabled in the system config.");
        }
        Some(cleanup) => {
            println!("Vector cleanup completed:");
            println!("  Scanned: {}", cleanup.scanned);
            println!("  Deleted: {}", style(cleanup.deleted).green());
            if cleanup.failed > 0 {
                println!("  Failed: {}", style(cleanup.failed).red());
            }
        }
        None => println!("{}", style("Vector cleanup failed; see logs").red()),
    }

    match report.pruned_events {
        Some(pruned) => println!("Pruned {} expired rate limit events", pruned),
        None => println!("{}", style("Pruning rate limit events failed; see logs").red()),
    }

    Ok(())
}

/// Show which A/B group `user_id` falls into
#[inline]
pub async fn show_assignment(
    settings: Settings,
    user_id: &str,
    content_type: Option<&str>,
) -> Result<()> {
    let engine = open_engine(settings).await?;
    let content_type = content_type.unwrap_or(DEFAULT_CONTENT_TYPE);
    let decision = engine
        .assignment()
        .should_enhance_with_rag(user_id, content_type)
        .await;

    let group = match decision.test_group {
        TestGroup::Rag => style("rag").green(),
        TestGroup::Baseline => style("baseline").yellow(),
    };
    println!("User: {}", user_id);
    println!("Content type: {}", content_type);
    println!("Group: {}", group);
    if let Some(bucket) = decision.bucket {
        println!("Bucket: {}", bucket);
    }
    println!("Reason: {}", decision.reason);

    Ok(())
}

/// List users with an enabled rate-limit override
#[inline]
pub async fn list_limited_users(settings: Settings) -> Result<()> {
    let engine = open_engine(settings).await?;
    let users = engine
        .rate_limiter()
        .limited_users()
        .await
        .context("Failed to list rate limit overrides")?;

    if users.is_empty() {
        println!("No users have a rate limit override.");
        return Ok(());
    }

    println!("Limited users ({} total):", users.len());
    for user in &users {
        println!(
            "  {} {}/hour, {}/day (set by {} at {})",
            style(&user.user_id).cyan(),
            user.max_per_hour,
            user.max_per_day,
            user.updated_by,
            user.updated_at.to_rfc3339()
        );
        if let Some(reason) = &user.reason {
            println!("    Reason: {}", reason);
        }
    }

    Ok(())
}

/// Show the rolling-window counters for `user_id`
#[inline]
pub async fn show_usage(settings: Settings, user_id: &str) -> Result<()> {
    let engine = open_engine(settings).await?;
    let counters = engine
        .rate_limiter()
        .usage(user_id)
        .await
        .context("Failed to read rate limit usage")?;

    info!("Read {} rate limit counters for {}", counters.len(), user_id);

    println!("Embedding usage for {}:", user_id);
    if !engine.config().load_config().await.rate_limiting.enabled {
        println!("  {}", style("Rate limiting is disabled; counts are informational").yellow());
    }
    for counter in &counters {
        let count = if counter.is_exhausted() {
            style(counter.count).red()
        } else {
            style(counter.count).green()
        };
        println!(
            "  {} {}: {} of {}",
            counter.window_kind.adjective(),
            counter.scope,
            count,
            counter.limit
        );
    }

    Ok(())
}

/// Check that the embedding provider is reachable and serves the configured model
#[inline]
pub async fn check_provider(settings: Settings) -> Result<()> {
    if settings.provider.kind != ProviderKind::Ollama {
        println!("Provider {:?} needs no connection check.", settings.provider.kind);
        return Ok(());
    }

    let client = OllamaClient::new(&settings.provider)?;
    let base_url = client.base_url().clone();
    let engine = open_engine(settings).await?;
    let model = engine.config().load_config().await.embedding.model;

    eprintln!("{}", style("Testing Ollama connection...").yellow());
    match client.check_model(&model).await {
        Ok(()) => {
            eprintln!("{}", style("✓ Ollama connection successful!").green());
            eprintln!("  URL: {}", style(base_url).cyan());
            eprintln!("  Model: {}", style(model).cyan());
            Ok(())
        }
        Err(e) => {
            eprintln!(
                "{}",
                style("⚠ Warning: Could not connect to Ollama").yellow()
            );
            Err(anyhow::Error::new(e).context(format!("Ollama at {} is not usable", base_url)))
        }
    }
}
