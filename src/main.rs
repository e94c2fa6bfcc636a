use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod normalize;
mod records;
mod semantic;

use config::Config;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();
    let mut config = Config::load(args.config.as_deref());

    match args.command {
        cli::Command::Build {
            products,
            categories,
            index,
            model,
            batch_size,
        } => {
            if let Some(path) = products {
                config.products_path = path.to_string_lossy().into_owned();
            }
            if let Some(path) = categories {
                config.categories_path = path.to_string_lossy().into_owned();
            }
            if let Some(path) = index {
                config.index_path = path.to_string_lossy().into_owned();
            }
            if let Some(model) = model {
                config.model = model;
            }
            if let Some(batch_size) = batch_size {
                config.batch_size = batch_size;
            }

            let report = app::build_index(&config)?;
            println!(
                "indexed {} documents ({} products, {} categories), dimension {}",
                report.indexed, report.products, report.categories, report.dimensions
            );
        }

        cli::Command::Search {
            query,
            limit,
            index,
            model,
            json,
        } => {
            if let Some(path) = index {
                config.index_path = path.to_string_lossy().into_owned();
            }
            if let Some(model) = model {
                config.model = model;
            }
            let k = limit.unwrap_or(config.search_limit);

            let hits = app::search(&config, &query, k)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else if hits.is_empty() {
                println!("no results");
            } else {
                for hit in &hits {
                    println!("{:.4}  [{}] {}", hit.score, hit.source, hit.name);
                    println!("        {}", hit.excerpt.replace('\n', " | "));
                }
            }
        }

        cli::Command::Status { index } => {
            if let Some(path) = index {
                config.index_path = path.to_string_lossy().into_owned();
            }

            let summary = app::status(&config)?;
            let model_id: String = summary
                .model_id
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect();
            println!("entries:    {}", summary.entry_count);
            println!("dimension:  {}", summary.dimensions);
            println!("scoring:    {}", summary.score_kind.label());
            println!("model id:   {model_id}");
        }
    }

    Ok(())
}
