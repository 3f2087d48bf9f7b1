mod input;
mod logging;

use clap::{Parser, Subcommand};
use colored::Colorize;
use input::{Input, InputArgs};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tokenguard_core::{
    BudgetError, BudgetErrorKind, BudgetValidator, MatchKind, ModelLimitEntry, ModelLimitRegistry,
    TokenizerSet, ValidationResult, MODEL_LIMITS_ENV,
};

#[derive(Parser)]
#[command(name = "tokenguard")]
#[command(about = "Check prompts against model context windows before sending them")]
#[command(version)]
struct Cli {
    /// JSON file of model limit overrides, merged over the built-in table
    #[arg(long, global = true, env = MODEL_LIMITS_ENV)]
    limits: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List known models and their limits
    Models {
        /// Only show family entries
        #[arg(long)]
        family: bool,
    },
    /// Print the token count of the input under the model's tokenizer
    Count {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Print the tokens left for the response, or why the input does not fit
    Validate {
        #[command(flatten)]
        input: InputArgs,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

/// JSON shape of a failed `validate`.
#[derive(Serialize)]
struct ValidationFailure {
    model: String,
    error: BudgetErrorKind,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    overflow: Option<u32>,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logging::init_logging(cli.debug);

    let registry = load_registry(cli.limits.as_ref())?;

    match cli.command {
        Commands::Models { family } => {
            print_models(&registry, family);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Count { input } => {
            let validator = BudgetValidator::from_parts(registry, TokenizerSet::builtin()?);
            let loaded = Input::load(&input)?;
            let count = validator.count(loaded.as_tokenizable(), &input.model)?;
            println!("{count}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate { input, json } => {
            let validator = BudgetValidator::from_parts(registry, TokenizerSet::builtin()?);
            let loaded = Input::load(&input)?;
            let outcome = validator.check(loaded.as_tokenizable(), &input.model);
            if report(&input.model, outcome, json)? {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

fn load_registry(limits: Option<&PathBuf>) -> anyhow::Result<ModelLimitRegistry> {
    let registry = match limits {
        Some(path) => ModelLimitRegistry::builder()
            .with_builtin()
            .load_file(path)?
            .build()?,
        None => ModelLimitRegistry::from_default_config()?,
    };
    log::debug!("Model limit registry has {} entries", registry.len());
    Ok(registry)
}

fn print_models(registry: &ModelLimitRegistry, family_only: bool) {
    println!(
        "{:<28} {:<7} {:>8} {:>10}  {}",
        "MODEL".bold(),
        "MATCH".bold(),
        "CONTEXT".bold(),
        "COMPLETION".bold(),
        "TOKENIZER".bold()
    );

    for entry in registry
        .entries()
        .filter(|entry| !family_only || entry.match_kind == MatchKind::Family)
    {
        println!("{}", model_row(entry));
    }
}

fn model_row(entry: &ModelLimitEntry) -> String {
    let kind = match entry.match_kind {
        MatchKind::Exact => "exact",
        MatchKind::Family => "family",
    };
    let completion = entry
        .max_completion_tokens
        .map(|cap| cap.to_string())
        .unwrap_or_else(|| "-".to_string());
    let tokenizer = entry
        .tokenizer
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "(provider API)".to_string());

    format!(
        "{:<28} {:<7} {:>8} {:>10}  {}",
        entry.model_pattern, kind, entry.max_context_tokens, completion, tokenizer
    )
}

/// Print the outcome; `false` when the input cannot be sent.
fn report(
    model: &str,
    outcome: Result<ValidationResult, BudgetError>,
    json: bool,
) -> anyhow::Result<bool> {
    match outcome {
        Ok(result) if json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(true)
        }
        Ok(result) => {
            println!(
                "{} {} tokens remaining ({}/{} used, {:.1}%)",
                "✓".green(),
                result.tokens_remaining,
                result.tokens_used,
                result.limit,
                result.usage_percentage()
            );
            if result.max_completion_tokens.is_some() {
                println!(
                    "  {}",
                    format!("max response tokens: {}", result.max_response_tokens()).dimmed()
                );
            }
            Ok(true)
        }
        Err(err) if json => {
            let failure = ValidationFailure {
                model: model.to_string(),
                error: err.kind(),
                message: err.to_string(),
                overflow: err.overflow(),
            };
            println!("{}", serde_json::to_string_pretty(&failure)?);
            Ok(false)
        }
        Err(err) => {
            eprintln!("{} {}", "✗".red(), err.to_string().red());
            Ok(false)
        }
    }
}
