//! Ziwei CLI: chart report parsing and staged analysis.
//!
//! Usage:
//!   ziwei parse <FILE>
//!   ziwei analyze <FILE> [--name N] [--model M] [--temperature T] [--max-output-tokens N] [--chunk-size N] [--concurrency N] [--timeout SECS] [--current-year Y]
//!   ziwei diagnose

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use ziwei::llm::GenerationConfig;
use ziwei::{AnalysisConfig, AnalysisRecord, GeminiClient, StageOrchestrator};

#[derive(Parser)]
#[command(
    name = "ziwei",
    version,
    about = "Zi Wei Dou Shu chart report parser and analysis engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a chart report and print it as JSON
    Parse {
        /// Path to the report text file
        file: PathBuf,
    },
    /// Parse a chart report and run the full analysis
    Analyze {
        /// Path to the report text file
        file: PathBuf,
        /// Display name stored in the record
        #[arg(long)]
        name: Option<String>,
        /// Model to use (overrides GEMINI_MODEL)
        #[arg(long)]
        model: Option<String>,
        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f32>,
        /// Output token cap per request
        #[arg(long)]
        max_output_tokens: Option<u32>,
        /// Ages covered by one yearly-fortune request
        #[arg(long, default_value_t = 5)]
        chunk_size: u32,
        /// Maximum generation calls in flight
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 300)]
        timeout: u64,
        /// Calendar year to compute ages against (defaults to this year)
        #[arg(long)]
        current_year: Option<i32>,
    },
    /// Check the API key and list the models it can reach
    Diagnose,
}

fn read_report(path: &Path) -> Result<String, i32> {
    std::fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: cannot read '{}': {}", path.display(), e);
        1
    })
}

fn runtime() -> Result<tokio::runtime::Runtime, i32> {
    tokio::runtime::Runtime::new().map_err(|e| {
        eprintln!("Error: cannot start runtime: {}", e);
        1
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_parse(file: &Path) -> i32 {
    let text = match read_report(file) {
        Ok(t) => t,
        Err(code) => return code,
    };
    let chart = ziwei::parse(&text);
    if chart.palaces.is_empty() {
        eprintln!("Warning: no palaces found in '{}'", file.display());
    }
    print_json(&chart)
}

struct AnalyzeArgs {
    name: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
    chunk_size: u32,
    concurrency: usize,
    timeout: u64,
    current_year: Option<i32>,
}

fn cmd_analyze(file: &Path, args: AnalyzeArgs) -> i32 {
    let text = match read_report(file) {
        Ok(t) => t,
        Err(code) => return code,
    };
    let chart = ziwei::parse(&text);

    let mut generation = GenerationConfig::from_env().with_timeout_seconds(args.timeout);
    if let Some(model) = args.model {
        generation = generation.with_model(model);
    }
    if let Some(temperature) = args.temperature {
        generation = generation.with_temperature(temperature);
    }
    if let Some(tokens) = args.max_output_tokens {
        generation = generation.with_max_output_tokens(tokens);
    }
    let client = match GeminiClient::new(std::env::var("GEMINI_API_KEY").ok(), generation) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let mut config = AnalysisConfig::new()
        .with_max_concurrency(args.concurrency)
        .with_unit_timeout(args.timeout)
        .with_yearly_chunk_size(args.chunk_size);
    if let Some(year) = args.current_year {
        config = config.with_current_year(year);
    }
    let orchestrator = StageOrchestrator::new(client, config);

    let rt = match runtime() {
        Ok(rt) => rt,
        Err(code) => return code,
    };
    match rt.block_on(orchestrator.analyze(&chart)) {
        Ok(analysis) => {
            let record = AnalysisRecord::new(args.name.as_deref(), chart, analysis);
            print_json(&record)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_diagnose() -> i32 {
    let client = match GeminiClient::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(code) => return code,
    };

    println!("API base: {}", client.config().api_base);
    println!("Model:    {}", client.config().model);
    match rt.block_on(client.list_models()) {
        Ok(models) => {
            let usable: Vec<_> = models
                .iter()
                .filter(|m| m.supports_generate_content())
                .collect();
            println!("{} models support generateContent:", usable.len());
            for model in &usable {
                match &model.display_name {
                    Some(display) => println!("  {} ({})", model.name, display),
                    None => println!("  {}", model.name),
                }
            }
            let configured = format!("models/{}", client.config().model);
            if !usable.iter().any(|m| m.name == configured) {
                eprintln!(
                    "Warning: configured model '{}' is not in the list",
                    client.config().model
                );
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Parse { file } => cmd_parse(&file),
        Commands::Analyze {
            file,
            name,
            model,
            temperature,
            max_output_tokens,
            chunk_size,
            concurrency,
            timeout,
            current_year,
        } => cmd_analyze(
            &file,
            AnalyzeArgs {
                name,
                model,
                temperature,
                max_output_tokens,
                chunk_size,
                concurrency,
                timeout,
                current_year,
            },
        ),
        Commands::Diagnose => cmd_diagnose(),
    };
    std::process::exit(code);
}
