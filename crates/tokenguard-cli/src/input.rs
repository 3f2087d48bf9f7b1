use anyhow::Context;
use std::path::{Path, PathBuf};
use tokenguard_core::{ChatMessage, TokenizableInput};

/// Where the text to measure comes from.
#[derive(Debug, Clone, clap::Args)]
#[command(group(
    clap::ArgGroup::new("source")
        .required(true)
        .args(["text", "file", "messages"])
))]
pub struct InputArgs {
    /// Model name to resolve limits and tokenizer for
    #[arg(long, short)]
    pub model: String,

    /// Text to measure
    pub text: Option<String>,

    /// Read the text from a file
    #[arg(long, short)]
    pub file: Option<PathBuf>,

    /// JSON array of {"role", "content"} chat messages
    #[arg(long)]
    pub messages: Option<PathBuf>,
}

/// Loaded input, owning what the validator borrows.
#[derive(Debug)]
pub enum Input {
    Text(String),
    Messages(Vec<ChatMessage>),
}

impl Input {
    pub fn load(args: &InputArgs) -> anyhow::Result<Self> {
        if let Some(path) = &args.messages {
            return read_messages(path).map(Input::Messages);
        }
        if let Some(path) = &args.file {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            return Ok(Input::Text(text));
        }
        args.text
            .clone()
            .map(Input::Text)
            .context("No input given: pass TEXT, --file or --messages")
    }

    pub fn as_tokenizable(&self) -> TokenizableInput<'_> {
        match self {
            Input::Text(text) => TokenizableInput::Text(text),
            Input::Messages(messages) => TokenizableInput::Messages(messages),
        }
    }
}

fn read_messages(path: &Path) -> anyhow::Result<Vec<ChatMessage>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of chat messages", path.display()))
}
