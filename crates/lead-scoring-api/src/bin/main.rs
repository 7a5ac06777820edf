//! Lead scoring service entry point

use anyhow::Context;
use clap::{Parser, Subcommand};
use lead_scoring_api::{lifecycle, LogFormat, ServeArgs};
use lead_scoring_client::{ClientError, PredictionClient, ReadinessPolicy};
use lead_scoring_core::{
    encode, score_batch, DecisionThreshold, ModelWrapper, PredictError, LEAD_SCHEMA,
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_INVALID_INPUT: i32 = 3;
const EXIT_UNAVAILABLE: i32 = 4;

#[derive(Parser)]
#[command(name = "lead-scoring")]
#[command(about = "Lead conversion scoring service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP prediction service
    Serve(ServeArgs),

    /// Validate and encode records locally against the feature schema
    Check {
        /// Records file (JSON or YAML; one object or an array)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Score records offline with a model artifact
    Score {
        /// Path to the model artifact
        #[arg(short, long, env = "MODEL_PATH", default_value = "model/model.json")]
        model: PathBuf,

        /// Records file (JSON or YAML; one object or an array)
        #[arg(short, long)]
        file: PathBuf,

        /// Decision threshold
        #[arg(short, long, env = "DECISION_THRESHOLD", default_value = "0.5")]
        threshold: f64,
    },

    /// Submit records to a running prediction service
    Predict {
        /// Service base URL
        #[arg(short, long, env = "PREDICTION_SERVICE_URL", default_value = "http://localhost:8000")]
        url: String,

        /// Records file (JSON or YAML; one object or an array)
        #[arg(short, long)]
        file: PathBuf,

        /// Seconds to wait for the service to become ready
        #[arg(long, default_value = "30")]
        wait_secs: u64,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
    );
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

/// Records file as a list; the flag tells whether it held a single object
fn read_records(path: &Path) -> anyhow::Result<(Vec<Map<String, Value>>, bool)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let value: Value = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
        _ => serde_json::from_str(&content)?,
    };

    match value {
        Value::Object(record) => Ok((vec![record], true)),
        Value::Array(items) => {
            let records = items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(record) => Ok(record),
                    _ => Err(anyhow::anyhow!("Record {} is not an object", i)),
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            Ok((records, false))
        }
        _ => anyhow::bail!("Records file must hold an object or an array of objects"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => {
            let config = args.resolve()?;
            init_tracing(config.log_format);

            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                schema_version = LEAD_SCHEMA.version(),
                "Starting lead scoring service"
            );

            if let Err(e) = lifecycle::serve(config).await {
                tracing::error!(error = %e, "Service stopped");
                std::process::exit(1);
            }
        }

        Commands::Check { file } => {
            init_tracing(LogFormat::Pretty);
            let (records, _) = read_records(&file)?;

            for (index, record) in records.iter().enumerate() {
                match LEAD_SCHEMA.validate(record) {
                    Ok(lead) => {
                        println!(
                            "{}",
                            serde_json::json!({
                                "index": index,
                                "record": lead,
                                "features": encode(&lead),
                            })
                        );
                    }
                    Err(e) => {
                        eprintln!(
                            "{}",
                            serde_json::json!({
                                "index": index,
                                "error": e.message,
                                "field": e.field,
                                "kind": e.kind,
                            })
                        );
                        std::process::exit(1);
                    }
                }
            }
        }

        Commands::Score {
            model,
            file,
            threshold,
        } => {
            init_tracing(LogFormat::Pretty);
            let threshold = DecisionThreshold::new(threshold)?;
            let wrapper = ModelWrapper::load(&model, &LEAD_SCHEMA, None)?;
            let (records, _) = read_records(&file)?;

            match score_batch(&LEAD_SCHEMA, &wrapper, threshold, &records) {
                Ok(results) => {
                    println!("{}", serde_json::to_string_pretty(&results)?);
                }
                Err((index, PredictError::Schema(e))) => {
                    eprintln!(
                        "{}",
                        serde_json::json!({
                            "index": index,
                            "error": e.message,
                            "field": e.field,
                        })
                    );
                    std::process::exit(EXIT_INVALID_INPUT);
                }
                Err((_, PredictError::Inference(e))) => {
                    anyhow::bail!("Inference failed: {}", e);
                }
            }
        }

        Commands::Predict {
            url,
            file,
            wait_secs,
        } => {
            init_tracing(LogFormat::Pretty);
            let (records, single) = read_records(&file)?;

            let policy = ReadinessPolicy::default().with_deadline(Duration::from_secs(wait_secs));
            let outcome = async {
                let client = PredictionClient::new(url).wait_until_ready(policy).await?;
                if single {
                    let result = client.predict(&records[0]).await?;
                    Ok::<_, ClientError>(serde_json::to_value(result))
                } else {
                    let results = client.predict_batch(&records).await?;
                    Ok(serde_json::to_value(results))
                }
            }
            .await;

            match outcome {
                Ok(value) => println!("{}", serde_json::to_string_pretty(&value?)?),
                Err(e) if e.is_user_error() => {
                    eprintln!("Invalid input: {}", e);
                    if let ClientError::InvalidInput {
                        index: Some(index), ..
                    } = e
                    {
                        eprintln!("  at record {}", index);
                    }
                    std::process::exit(EXIT_INVALID_INPUT);
                }
                Err(e) if e.is_unavailable() => {
                    eprintln!("Service unavailable: {}", e);
                    std::process::exit(EXIT_UNAVAILABLE);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}
