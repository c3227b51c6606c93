//! igcse-assess CLI: weakness detection and personalized practice papers.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "igcse-assess",
    version,
    about = "IGCSE weakness analysis and practice-paper assembly"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the class and assemble practice papers
    Analyze {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output directory (overrides the config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output formats: json, csv, md, html, all (comma-separated)
        #[arg(long, default_value = "all")]
        format: String,

        /// Only analyze these students (comma-separated ids)
        #[arg(long)]
        student: Option<String>,

        /// Weak-topic threshold in [0, 1]
        #[arg(long)]
        threshold: Option<f64>,

        /// Maximum questions per paper
        #[arg(long)]
        max_questions: Option<usize>,

        /// Seed for tie-breaking between equally good questions
        #[arg(long)]
        seed: Option<u64>,

        /// Shortfall policy: fail, partial, adjacent
        #[arg(long)]
        policy: Option<String>,

        /// Max students analyzed concurrently
        #[arg(long)]
        parallelism: Option<usize>,

        /// Do not record issued questions in the usage history
        #[arg(long)]
        no_record: bool,
    },

    /// Compare two class reports
    Compare {
        /// Baseline report JSON
        #[arg(long)]
        baseline: PathBuf,

        /// Current report JSON
        #[arg(long)]
        current: PathBuf,

        /// Minimum mastery change that counts as movement
        #[arg(long, default_value = "0.05")]
        threshold: f64,

        /// Exit code 1 if regressions found
        #[arg(long)]
        fail_on_regression: bool,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Check configuration, reference data and student data
    Validate {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and sample data
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("igcse_assess=info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Analyze {
            config,
            output,
            format,
            student,
            threshold,
            max_questions,
            seed,
            policy,
            parallelism,
            no_record,
        } => {
            commands::analyze::execute(commands::analyze::AnalyzeArgs {
                config,
                output,
                format,
                student,
                threshold,
                max_questions,
                seed,
                policy,
                parallelism,
                no_record,
            })
            .await
        }
        Commands::Compare {
            baseline,
            current,
            threshold,
            fail_on_regression,
            format,
        } => commands::compare::execute(baseline, current, threshold, fail_on_regression, format),
        Commands::Validate { config } => commands::validate::execute(config),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
