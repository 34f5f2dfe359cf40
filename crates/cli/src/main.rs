use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use data_loader::DataIndex;
use engine::{ExperimentInputs, ExperimentReport, RecommenderConfig, run_experiment};
use evaluator::Measure;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// ReelEval - fused factorization recommender evaluation
#[derive(Parser)]
#[command(name = "reel-eval")]
#[command(about = "Train a fused factorization recommender and evaluate its rankings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train on a split of the ratings and report ranking measures
    Run {
        /// Rating file: user,item,rating[,timestamp]
        #[arg(long)]
        ratings: PathBuf,

        /// Item relation file: item,related_1,related_2,...
        #[arg(long)]
        relations: Option<PathBuf>,

        /// Item content file: item,f_1,...,f_d
        #[arg(long)]
        content: Option<PathBuf>,

        /// JSON configuration, defaults apply to missing fields
        #[arg(long)]
        config: Option<PathBuf>,

        /// Latent factors (overrides the config)
        #[arg(long)]
        factors: Option<usize>,

        /// Outer training iterations (overrides the config)
        #[arg(long)]
        iterations: Option<usize>,

        /// Recommendation list length, 0 ranks every candidate (overrides the config)
        #[arg(long)]
        top_n: Option<usize>,

        /// Evaluation threads, 0 uses every core (overrides the config)
        #[arg(long)]
        threads: Option<usize>,

        /// Save the trained model into this directory
        #[arg(long)]
        save_model: Option<PathBuf>,

        /// Write the report as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show statistics of a rating file
    Stats {
        #[arg(long)]
        ratings: PathBuf,

        #[arg(long)]
        relations: Option<PathBuf>,

        #[arg(long)]
        content: Option<PathBuf>,
    },

    /// Print the default configuration as JSON
    DefaultConfig,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            ratings,
            relations,
            content,
            config,
            factors,
            iterations,
            top_n,
            threads,
            save_model,
            output,
        } => {
            let mut config = match config {
                Some(path) => RecommenderConfig::from_file(&path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?,
                None => RecommenderConfig::default(),
            };
            if let Some(factors) = factors {
                config.factors = factors;
            }
            if let Some(iterations) = iterations {
                config.iterations = iterations;
            }
            if let Some(top_n) = top_n {
                config.top_n = top_n;
            }
            if let Some(threads) = threads {
                config.num_cpus = threads;
            }
            if let Some(dir) = save_model {
                config = config.with_model_dir(dir);
            }

            let inputs = ExperimentInputs {
                ratings,
                relations,
                content,
            };
            handle_run(&config, &inputs, output.as_deref())?
        }
        Commands::Stats {
            ratings,
            relations,
            content,
        } => handle_stats(&ratings, relations.as_deref(), content.as_deref())?,
        Commands::DefaultConfig => {
            let json = serde_json::to_string_pretty(&RecommenderConfig::default())?;
            println!("{json}");
        }
    }

    Ok(())
}

/// Handle the 'run' command
fn handle_run(config: &RecommenderConfig, inputs: &ExperimentInputs, output: Option<&Path>) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    println!("Loading ratings from {}...", inputs.ratings.display());
    let start = Instant::now();
    let report = run_experiment(config, inputs)?;
    println!("{} Finished in {:.2?}", "✓".green(), start.elapsed());

    print_report(&report);

    if let Some(path) = output {
        let writer = BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        );
        serde_json::to_writer_pretty(writer, &report).context("Failed to write report")?;
        println!("{} Report written to {}", "✓".green(), path.display());
    }
    Ok(())
}

/// Handle the 'stats' command
fn handle_stats(ratings: &Path, relations: Option<&Path>, content: Option<&Path>) -> Result<()> {
    let index = DataIndex::load_from_files(ratings)
        .with_context(|| format!("Failed to load ratings from {}", ratings.display()))?;
    let side = index
        .load_side_information(relations, content)
        .context("Failed to load side information")?;

    let (users, items, num_ratings) = index.counts();
    let density = if users * items == 0 {
        0.0
    } else {
        num_ratings as f64 / (users * items) as f64
    };

    println!("{}", format!("Dataset: {}", ratings.display()).bold().blue());
    println!("{}Users: {}", "• ".green(), users);
    println!("{}Items: {}", "• ".green(), items);
    println!("{}Ratings: {}", "• ".green(), num_ratings);
    println!("{}Density: {:.4}%", "• ".green(), density * 100.0);
    if let Some(scale) = index.rating_scale() {
        println!("{}Rating scale: {:?}", "• ".cyan(), scale.levels());
    }
    if let Some((first, last)) = index.timestamp_range() {
        println!("{}Timestamps: {} .. {}", "• ".cyan(), first, last);
    }
    if let Some(relations) = &side.relations {
        println!(
            "{}Relations: {} links over {} items",
            "• ".cyan(),
            relations.len(),
            relations.nonempty_rows().count()
        );
    }
    if let Some(content) = &side.content {
        println!(
            "{}Content: {} features, {} stored values",
            "• ".cyan(),
            content.num_rows(),
            content.len()
        );
    }
    Ok(())
}

/// Print measures of a finished run, ranking measures first
fn print_report(report: &ExperimentReport) {
    println!("{}", format!("Results for {}:", report.model).bold().blue());
    println!(
        "  {} users, {} items, {} train / {} test ratings",
        report.users, report.items, report.train_ratings, report.test_ratings
    );
    let sources: Vec<&str> = [
        Some("ratings"),
        report.has_relations.then_some("relations"),
        report.has_content.then_some("content"),
    ]
    .into_iter()
    .flatten()
    .collect();
    println!("  sources: {}", sources.join(" + "));

    let result = &report.result;
    for (measure, value) in result.iter() {
        match measure {
            Measure::TrainTime | Measure::TestTime => {
                println!("  {:<14} {}", measure.to_string(), format!("{value:.0} ms").yellow())
            }
            _ => println!("  {:<14} {}", measure.to_string(), format!("{value:.6}").green()),
        }
    }

    let users = format!(
        "  evaluated {} users, skipped {}, failed {}",
        result.evaluated_users, result.skipped_users, result.failed_users
    );
    if result.failed_users > 0 {
        println!("{}", users.red());
    } else {
        println!("{users}");
    }
}
