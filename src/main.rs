//! Trick prediction CLI
//!
//! Parses trick-run logs, trains one GRU per skill tier and evaluates or
//! queries the trained models.

use clap::{Parser, Subcommand};
use tricks::data::tricks::{Orientation, Skis};
use tricks::{Config, Result, Tier};

#[derive(Parser)]
#[command(name = "tricks")]
#[command(about = "Next-trick prediction for water-ski trick runs", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new project with default config
    Init,
    /// Parse trick-run logs into merged and per-tier sequence files
    Parse {
        /// Log files to parse (defaults to data.input_files)
        files: Vec<String>,
    },
    /// Train tier models
    Train {
        /// Only train this tier (name or skill level)
        #[arg(long)]
        tier: Option<Tier>,
        /// Override number of epochs
        #[arg(long)]
        epochs: Option<usize>,
    },
    /// Evaluate tier models on their held-out split
    Evaluate {
        /// Only evaluate this tier (name or skill level)
        #[arg(long)]
        tier: Option<Tier>,
    },
    /// Recommend the next trick given the tricks done so far
    Predict {
        /// Tier name or skill level
        #[arg(long, visible_alias = "level", default_value = "beginner")]
        tier: Tier,
        /// Number of recommendations
        #[arg(long, default_value = "5")]
        top: usize,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
        /// Only recommend tricks that can be performed from the current position
        #[arg(long)]
        legal: bool,
        /// Ski count for the legality check (1 or 2)
        #[arg(long, default_value = "1")]
        skis: Skis,
        /// Orientation at the start of the pass
        #[arg(long, default_value = "front")]
        start: Orientation,
        /// Tricks performed so far, in order
        tricks: Vec<String>,
    },
    /// Model management commands
    Model {
        #[command(subcommand)]
        action: ModelCommands,
    },
}

#[derive(Subcommand)]
enum ModelCommands {
    /// Show model information
    Info {
        #[arg(long)]
        tier: Option<Tier>,
    },
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use table or json.", s)),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let result = match cli.command {
        Commands::Init => commands::init(&cli.config),
        Commands::Parse { files } => commands::parse(&config, files),
        Commands::Train { tier, epochs } => commands::train(&config, tier, epochs),
        Commands::Evaluate { tier } => commands::evaluate(&config, tier),
        Commands::Predict {
            tier,
            top,
            format,
            legal,
            skis,
            start,
            tricks,
        } => {
            let legality = legal.then_some((skis, start));
            commands::predict(&config, tier, top, format, legality, tricks)
        }
        Commands::Model { action } => match action {
            ModelCommands::Info { tier } => commands::model_info(&config, tier),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::{Autodiff, NdArray};
    use tricks::data::store::{bucket_by_tier, MergedSequences, TierStore};
    use tricks::data::TrickLog;
    use tricks::model::checkpoint::{Checkpoint, CheckpointPaths, ModelMetadata};
    use tricks::TrickError;

    type MyBackend = NdArray<f32>;
    type MyAutodiffBackend = Autodiff<MyBackend>;

    fn selected(tier: Option<Tier>) -> Vec<Tier> {
        tier.map(|t| vec![t]).unwrap_or_else(|| Tier::ALL.to_vec())
    }

    /// Run `f` for the requested tier, or for every tier. Without a requested
    /// tier, tiers failing with an error `skip` accepts are logged and left out.
    pub fn for_each_tier<T>(
        tier: Option<Tier>,
        skip: impl Fn(&TrickError) -> bool,
        mut f: impl FnMut(Tier) -> Result<T>,
    ) -> Result<Vec<(Tier, T)>> {
        let explicit = tier.is_some();
        let mut done = Vec::new();
        for tier in selected(tier) {
            match f(tier) {
                Ok(value) => done.push((tier, value)),
                Err(e) if !explicit && skip(&e) => log::warn!("Skipping tier {}: {}", tier, e),
                Err(e) => return Err(e),
            }
        }
        Ok(done)
    }

    fn banner(tier: Tier) {
        println!("\n{}", "=".repeat(60));
        println!("  TIER: {} ({})", tier, tier.skill_level());
        println!("{}", "=".repeat(60));
    }

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all(&config.data.sequence_dir)?;
        std::fs::create_dir_all(&config.data.model_dir)?;
        println!(
            "Created {}/ and {}/ directories",
            config.data.sequence_dir, config.data.model_dir
        );

        println!("\nNext steps:");
        println!("  1. Put trick-run logs in place and list them in {}", config_path);
        println!("  2. Run 'tricks parse' to build sequence files");
        println!("  3. Run 'tricks train' to train all tier models");
        println!("  4. Run 'tricks evaluate' or 'tricks predict --tier pro BB F'");

        Ok(())
    }

    pub fn parse(config: &Config, files: Vec<String>) -> Result<()> {
        let files = if files.is_empty() {
            config.data.input_files.clone()
        } else {
            files
        };
        if files.is_empty() {
            return Err(TrickError::Config("No input files given".to_string()));
        }

        for file in &files {
            println!("Parsing {}...", file);
        }
        let log = TrickLog::from_files(&files)?;
        println!("{}", log.stats);

        let merged = MergedSequences::new(log.sequences());
        println!("\nTOTAL sequences: {}", merged.sequences.len());
        println!("TOTAL vocab size: {}", merged.vocab.len());
        println!("Example sequences:");
        for sequence in merged.sequences.iter().take(5) {
            println!("  {}", sequence.join(" "));
        }
        merged.save(&config.data.merged_path)?;
        println!("\nSaved merged sequences to {}", config.data.merged_path);

        let tiers = bucket_by_tier(&log);
        TierStore::new(&config.data.sequence_dir).save_all(&tiers)?;
        for (tier, sequences) in &tiers {
            println!("  {:<8} {:>6} sequences", tier.name(), sequences.len());
        }

        Ok(())
    }

    pub fn train(config: &Config, tier: Option<Tier>, epochs: Option<usize>) -> Result<()> {
        let mut config = config.clone();
        if let Some(e) = epochs {
            config.training.epochs = e;
        }
        config.validate()?;

        let device = NdArrayDevice::Cpu;

        // A sparse tier shouldn't stop the others
        let insufficient = |e: &TrickError| matches!(e, TrickError::InsufficientData { .. });
        let trained = for_each_tier(tier, insufficient, |tier| {
            banner(tier);
            let summary = tricks::training::train_tier::<MyAutodiffBackend>(&config, tier, &device)?;
            println!(
                "  Sequences: {}, Vocab: {}, Samples: {} train / {} val",
                summary.sequences, summary.vocab_size, summary.train_samples, summary.val_samples
            );
            println!(
                "  Best val loss {:.4} at epoch {}",
                summary.history.best_val_loss,
                summary.history.best_epoch + 1
            );
            println!(
                "  Exported: {}",
                CheckpointPaths::new(&config.data.model_dir, tier).export().display()
            );
            Ok(())
        })?;

        println!("\nDone! {} tier model(s) trained and exported.", trained.len());
        Ok(())
    }

    pub fn evaluate(config: &Config, tier: Option<Tier>) -> Result<()> {
        let no_model = |e: &TrickError| matches!(e, TrickError::NoModel(_));
        let evaluated = for_each_tier(tier, no_model, |tier| {
            banner(tier);
            let report =
                tricks::predict::evaluate_tier::<MyBackend>(config, tier, NdArrayDevice::Cpu)?;
            print!("{}", report);
            Ok(())
        })?;

        if evaluated.is_empty() {
            println!("\nNo trained tier models in {}. Run 'tricks train' first.", config.data.model_dir);
        }
        println!("\n{}\n  Done!\n{}", "=".repeat(60), "=".repeat(60));
        Ok(())
    }

    pub fn predict(
        config: &Config,
        tier: Tier,
        top: usize,
        format: OutputFormat,
        legality: Option<(Skis, Orientation)>,
        history: Vec<String>,
    ) -> Result<()> {
        use tricks::data::tricks::TrickCatalogue;
        use tricks::predict::inference::{format_legal_predictions, format_predictions};
        use tricks::predict::Predictor;

        let predictor =
            Predictor::<MyBackend>::load(&config.data.model_dir, tier, NdArrayDevice::Cpu)?;

        if let Some((skis, start)) = legality {
            let catalogue = TrickCatalogue::new(skis);
            let legal = predictor.predict_legal(&history, &catalogue, start, top)?;
            match format {
                OutputFormat::Table => {
                    print!("{}", format_legal_predictions(tier, &history, &legal))
                }
                OutputFormat::Json => {
                    let json = serde_json::json!({
                        "tier": tier,
                        "history": history,
                        "predictions": legal,
                    });
                    println!("{}", serde_json::to_string_pretty(&json)?);
                }
            }
            return Ok(());
        }

        let predictions = predictor.predict_top(&history, top)?;

        match format {
            OutputFormat::Table => print!("{}", format_predictions(tier, &history, &predictions)),
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "tier": tier,
                    "history": history,
                    "predictions": predictions,
                });
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
        }
        Ok(())
    }

    pub fn model_info(config: &Config, tier: Option<Tier>) -> Result<()> {
        println!("Model directory: {}", config.data.model_dir);
        println!("───────────────────────────────");
        for tier in selected(tier) {
            if !Checkpoint::<MyBackend>::exists(&config.data.model_dir, tier) {
                println!("  {:<8} not trained", tier.name());
                continue;
            }
            let path = CheckpointPaths::new(&config.data.model_dir, tier).metadata();
            let metadata: ModelMetadata = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            let best = match (metadata.best_epoch, metadata.best_val_loss) {
                (Some(epoch), Some(loss)) => format!("best epoch {} val loss {:.4}", epoch, loss),
                _ => "no validation summary".to_string(),
            };
            println!(
                "  {:<8} {} vocab {:>4} | seq {} embed {} hidden {} layers {} | {} | {}",
                tier.name(),
                metadata.model_type,
                metadata.vocab_size,
                metadata.seq_len,
                metadata.embed_dim,
                metadata.hidden_dim,
                metadata.num_layers,
                best,
                metadata.created_at.format("%Y-%m-%d %H:%M")
            );
        }
        Ok(())
    }
}
