//! genre-classify - rank the genres of one audio file

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use genre_core::config::{default_config_path, load_config};
use genre_core::inference::{ModelStore, OrtClassifier};
use genre_core::{ClassificationOutcome, Classifier, ClassifierSlot, Config, Orchestrator};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Audio file to classify (any format symphonia can decode)
    file: PathBuf,

    /// Config file (default: ~/.config/genre-classifier/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// ONNX classifier, overrides the configured model path
    #[arg(long)]
    model: Option<PathBuf>,

    /// Number of genres to print, overrides the configured top_k
    #[arg(long)]
    top_k: Option<usize>,

    /// Print the full outcome as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    // Must run before anything else: child processes re-enter main here
    procspawn::init();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let mut config = load_config(&config_path);
    if let Some(model) = args.model.clone() {
        config.model.path = Some(model);
    }
    if let Some(top_k) = args.top_k {
        config.display.top_k = top_k;
    }

    let classifiers = Arc::new(ClassifierSlot::new());
    load_classifier(&config, &classifiers);

    let orchestrator = Orchestrator::new(&config, classifiers).context("Failed to start pipeline")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let outcome = runtime.block_on(async {
        orchestrator
            .open(&args.file)
            .await
            .with_context(|| format!("Failed to open {}", args.file.display()))?;
        let outcome = orchestrator.classify().await.map_err(|e| {
            anyhow::anyhow!("Classification failed ({}): {}", e.category(), e)
        })?;
        anyhow::Ok(outcome)
    })?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}

/// Resolve and load the classifier once; failure leaves the slot empty
fn load_classifier(config: &Config, classifiers: &ClassifierSlot) {
    let result = ModelStore::new()
        .and_then(|store| store.resolve(&config.model))
        .and_then(|path| {
            classifiers.load_with(|| {
                let classifier: Arc<dyn Classifier> =
                    Arc::new(OrtClassifier::load(&path, &config.model.input_name)?);
                Ok(classifier)
            })
        });

    match result {
        Ok(classifier) => log::info!("Classifier '{}' ready", classifier.name()),
        Err(e) => log::error!("Classifier unavailable: {}", e),
    }
}

fn print_outcome(outcome: &ClassificationOutcome) {
    println!("Predicted genre: {} ({:.1}%)", outcome.predicted, outcome.confidence);
    for (rank, entry) in outcome.top.iter().enumerate() {
        println!("  {:>2}. {:<12} {:>5.1}%", rank + 1, entry.label, entry.percent);
    }
}
