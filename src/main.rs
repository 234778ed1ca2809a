use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use churn_scorer::config::Config;
use churn_scorer::explain::{Explainer, TreePathExplainer};
use churn_scorer::models::Feature;
use churn_scorer::{intake, report, scorer, Classifier, ModelKind, ModelSet, Verdict};

#[derive(Parser)]
#[command(name = "churn-scorer")]
#[command(about = "Gym membership churn scoring with rule-based explanations", long_about = None)]
struct Cli {
    /// Optional TOML configuration file
    #[arg(long, global = true, env = "CHURN_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the feature columns the models expect, in order
    Schema,
    /// Score one customer record
    Score {
        /// JSON object with all thirteen customer fields
        #[arg(long)]
        record: PathBuf,
        #[arg(long, value_enum)]
        model: Option<ModelKind>,
        #[arg(long)]
        threshold: Option<f64>,
        /// Include per-feature attribution
        #[arg(long)]
        explain: bool,
        #[arg(long, value_enum, default_value = "markdown")]
        format: Format,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Score every customer in a CSV file
    Batch {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, value_enum)]
        model: Option<ModelKind>,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("CHURN_LOG").unwrap_or_else(|_| "churn_scorer=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Schema => {
            for (index, feature) in Feature::ALL.iter().enumerate() {
                println!("{index:>2} {} ({})", feature.column(), feature.alias());
            }
        }
        Commands::Score {
            record,
            model,
            threshold,
            explain,
            format,
            out,
        } => {
            let models = load_models(&config)?;
            let kind = model.unwrap_or(config.default_model);
            let threshold = threshold.unwrap_or_else(|| config.thresholds.for_model(kind));
            let ensemble = models.get(kind);

            let customer = intake::load_record(&record)?;
            let result = scorer::score(&customer, ensemble.as_ref(), threshold)
                .context("scoring failed")?;
            let attribution = if explain {
                Some(TreePathExplainer.explain(&customer, ensemble.as_ref())?)
            } else {
                None
            };

            let rendered = match format {
                Format::Markdown => {
                    report::render_markdown(&result, attribution.as_ref(), chrono::Utc::now())
                }
                Format::Json => report::render_json(&result, attribution.as_ref())?,
            };

            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Report written to {}.", path.display());
                }
                None => print!("{rendered}"),
            }
        }
        Commands::Batch {
            csv,
            model,
            threshold,
            limit,
        } => {
            let models = load_models(&config)?;
            let kind = model.unwrap_or(config.default_model);
            let threshold = threshold.unwrap_or_else(|| config.thresholds.for_model(kind));
            let ensemble = models.get(kind);

            let customers = intake::records_from_csv(&csv)?;
            if customers.is_empty() {
                println!("No customers found in {}.", csv.display());
                return Ok(());
            }

            let mut results = Vec::with_capacity(customers.len());
            for customer in &customers {
                results.push(scorer::score(customer, ensemble.as_ref(), threshold)?);
            }

            let churners = results
                .iter()
                .filter(|result| result.verdict == Verdict::Churn)
                .count();
            tracing::info!(
                model = ensemble.name(),
                customers = results.len(),
                churners,
                "batch scored"
            );

            for (index, result) in results.iter().enumerate().take(limit) {
                println!("{}", report::summary_line(index + 1, result));
            }
            println!(
                "{churners} of {} customers predicted to churn at threshold {threshold:.2}.",
                results.len()
            );
        }
    }

    Ok(())
}

fn load_models(config: &Config) -> anyhow::Result<ModelSet> {
    ModelSet::load(&config.model_dir)
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))
}
