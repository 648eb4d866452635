use anyhow::Result;
use brandcap::cli::{Cli, Commands, StyleArgs};
use brandcap::{logging, BrandcapApp, CaptionInput, CaptionOutcome, ConfigManager, ResolveError};
use clap::Parser;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use owo_colors::OwoColorize;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(if cli.verbose {
        "brandcap=debug"
    } else {
        "brandcap=info"
    });

    let config_manager = match &cli.config {
        Some(path) => ConfigManager::load_from(path)?,
        None => ConfigManager::load()?,
    };

    match cli.command {
        Commands::Caption {
            name,
            describe,
            image,
            style,
        } => {
            let mut app = BrandcapApp::new(&config_manager)?;
            let input = CaptionInput {
                asset_name: name,
                description: describe,
                image,
                ..style.to_input()
            };
            let outcome = app.caption(&input).await;
            print_outcome(&outcome);
            report_saved(&app, &input, &outcome);
        }
        Commands::Sample { seed, style } => {
            let mut app = BrandcapApp::new(&config_manager)?;
            let input = style.to_input();
            let (row, outcome) = match seed {
                Some(seed) => {
                    app.caption_sample(&mut StdRng::seed_from_u64(seed), &input)
                        .await?
                }
                None => app.caption_sample(&mut rand::rng(), &input).await?,
            };
            println!("{} {}", "Sample:".bold(), row.image);
            print_outcome(&outcome);
            report_saved(&app, &input, &outcome);
        }
        Commands::Catalog => {
            let app = BrandcapApp::new(&config_manager)?;
            print_catalog(&app);
        }
        Commands::Tones => {
            let app = BrandcapApp::new(&config_manager)?;
            print_tones(&app);
        }
        Commands::Watch { style } => run_watch_mode(config_manager, style).await?,
    }

    Ok(())
}

fn print_outcome(outcome: &CaptionOutcome) {
    match &outcome.resolution {
        Ok(result) => {
            println!("{} {}", "Base:".bold(), result.base);
            println!("{} {}", "Marketing:".bold(), result.marketing.green());
        }
        Err(ResolveError::NoMatch { known_keys }) => {
            println!(
                "{} no catalog entry matched {:?} and no description was given",
                "⚠".yellow(),
                outcome.original_name
            );
            if known_keys.is_empty() {
                println!("  The catalog is empty.");
            } else {
                println!("  Known catalog keys: {}", known_keys.join(", "));
            }
        }
        Err(err @ ResolveError::GenerationFailed { base, .. }) => {
            if !base.is_empty() {
                println!("{} {}", "Base:".bold(), base);
            }
            println!("{} {}", "✗".red(), err);
        }
    }

    if let Some(err) = &outcome.log_error {
        println!("{} result was not saved: {}", "⚠".yellow(), err);
    }
}

fn report_saved(app: &BrandcapApp, input: &CaptionInput, outcome: &CaptionOutcome) {
    if input.save && outcome.resolution.is_ok() && outcome.log_error.is_none() {
        println!("{} saved to {}", "✓".green(), app.result_log_path().display());
    }
}

fn print_catalog(app: &BrandcapApp) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Key", "Base caption", "Marketing caption"]);
    for entry in app.resolver().catalog().iter() {
        table.add_row(vec![entry.key(), entry.base(), entry.marketing()]);
    }
    println!("{table}");
}

fn print_tones(app: &BrandcapApp) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Tone", "Temperature", "Max length", "Template"]);
    for (tone, profile) in app.resolver().tones().iter() {
        let temperature = match (profile.min_temperature, profile.max_temperature) {
            (Some(min), Some(max)) => format!("{min}..{max}"),
            (Some(min), None) => format!(">= {min}"),
            (None, Some(max)) => format!("<= {max}"),
            (None, None) => "-".to_string(),
        };
        let max_length = profile
            .max_length
            .map_or_else(|| "-".to_string(), |limit| limit.to_string());
        table.add_row(vec![
            tone.to_string(),
            temperature,
            max_length,
            profile.template.clone(),
        ]);
    }
    println!("{table}");
}

async fn run_watch_mode(config_manager: ConfigManager, style: StyleArgs) -> Result<()> {
    config_manager.start_watching();
    let mut config_rx = config_manager.subscribe();
    let mut app = BrandcapApp::new(&config_manager)?;

    info!("👀 Watch mode - one asset name per line, Ctrl+C to quit");
    info!("   Reloading on changes to {:?}", config_manager.config_path());

    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin).lines();

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT (Ctrl+C)");
            let _ = shutdown_tx.send(());
        }
    });

    loop {
        tokio::select! {
            line = reader.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let name = line.trim();
                        if name.is_empty() {
                            continue;
                        }
                        let input = CaptionInput {
                            asset_name: Some(name.to_string()),
                            ..style.to_input()
                        };
                        let outcome = app.caption(&input).await;
                        print_outcome(&outcome);
                        report_saved(&app, &input, &outcome);
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!("Error reading input: {}", err);
                        break;
                    }
                }
            }
            result = config_rx.changed() => {
                match result {
                    Ok(()) => {
                        let updated = config_rx.borrow().clone();
                        if let Err(err) = app.apply_config_update(updated) {
                            warn!("Failed to apply config update: {err:#}");
                        }
                    }
                    Err(_) => {
                        info!("Configuration watcher closed");
                        break;
                    }
                }
            }
            _ = &mut shutdown_rx => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("✅ Shutdown complete");
    Ok(())
}
