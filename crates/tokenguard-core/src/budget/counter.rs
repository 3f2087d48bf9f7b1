//! Token counting for budget validation.
//!
//! Counts tokens with the encoding a model actually uses: tiktoken BPE for
//! OpenAI families, and a conservative character heuristic for families that
//! ship no public local tokenizer.

use crate::budget::types::BudgetError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

pub const CL100K_BASE: &str = "cl100k_base";
pub const O200K_BASE: &str = "o200k_base";
pub const P50K_BASE: &str = "p50k_base";
pub const R50K_BASE: &str = "r50k_base";
pub const HEURISTIC: &str = "heuristic";

/// Tokens a cl100k chat model spends wrapping each message
/// (`<|im_start|>{role}\n{content}<|im_end|>\n`).
pub const CHAT_MESSAGE_OVERHEAD: u32 = 4;

/// Per-message wrapping for o200k chat models.
pub const O200K_MESSAGE_OVERHEAD: u32 = 3;

/// Per-message wrapping for completion-era encodings, where chat turns are
/// rendered as `{role}: {content}\n` lines.
pub const LEGACY_MESSAGE_OVERHEAD: u32 = 4;

/// Per-message metadata allowance for the heuristic counter.
pub const HEURISTIC_MESSAGE_OVERHEAD: u32 = 10;

/// Name of a token encoding scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenizerId(Cow<'static, str>);

impl TokenizerId {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn cl100k_base() -> Self {
        Self::from_static(CL100K_BASE)
    }

    pub fn o200k_base() -> Self {
        Self::from_static(O200K_BASE)
    }

    pub fn p50k_base() -> Self {
        Self::from_static(P50K_BASE)
    }

    pub fn r50k_base() -> Self {
        Self::from_static(R50K_BASE)
    }

    pub fn heuristic() -> Self {
        Self::from_static(HEURISTIC)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenizerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One chat turn as providers receive it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// Content whose token length is measured before a request is sent.
///
/// Each shape has its own counting rule; new provider message shapes get a
/// new variant rather than a generic serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizableInput<'a> {
    /// A single prompt
    Text(&'a str),
    /// Independent texts (e.g. an embedding batch); counts are summed
    Texts(Vec<&'a str>),
    /// Chat turns; each adds the tokenizer's per-message overhead
    Messages(&'a [ChatMessage]),
}

impl<'a> From<&'a str> for TokenizableInput<'a> {
    fn from(text: &'a str) -> Self {
        Self::Text(text)
    }
}

impl<'a> From<&'a String> for TokenizableInput<'a> {
    fn from(text: &'a String) -> Self {
        Self::Text(text.as_str())
    }
}

impl<'a> From<&'a [String]> for TokenizableInput<'a> {
    fn from(texts: &'a [String]) -> Self {
        Self::Texts(texts.iter().map(String::as_str).collect())
    }
}

impl<'a> From<&'a Vec<String>> for TokenizableInput<'a> {
    fn from(texts: &'a Vec<String>) -> Self {
        Self::from(texts.as_slice())
    }
}

impl<'a> From<&'a [&'a str]> for TokenizableInput<'a> {
    fn from(texts: &'a [&'a str]) -> Self {
        Self::Texts(texts.to_vec())
    }
}

impl<'a> From<Vec<&'a str>> for TokenizableInput<'a> {
    fn from(texts: Vec<&'a str>) -> Self {
        Self::Texts(texts)
    }
}

impl<'a> From<&'a [ChatMessage]> for TokenizableInput<'a> {
    fn from(messages: &'a [ChatMessage]) -> Self {
        Self::Messages(messages)
    }
}

impl<'a> From<&'a Vec<ChatMessage>> for TokenizableInput<'a> {
    fn from(messages: &'a Vec<ChatMessage>) -> Self {
        Self::Messages(messages.as_slice())
    }
}

/// Trait for token counting implementations.
///
/// Implementations must be pure: identical input yields identical counts,
/// from any thread.
pub trait TokenCounter: Send + Sync {
    /// Encoding this counter implements.
    fn id(&self) -> TokenizerId;

    /// Count tokens in a plain text string.
    fn count_text(&self, text: &str) -> u32;

    /// Structural tokens added around each chat message.
    fn message_overhead(&self) -> u32;

    /// Count tokens in a single message.
    fn count_message(&self, message: &ChatMessage) -> u32 {
        self.count_text(&message.content)
            .saturating_add(self.message_overhead())
    }

    /// Count tokens in multiple messages.
    fn count_messages(&self, messages: &[ChatMessage]) -> u32 {
        messages
            .iter()
            .fold(0u32, |acc, m| acc.saturating_add(self.count_message(m)))
    }

    /// Count tokens in independent texts.
    fn count_texts(&self, texts: &[&str]) -> u32 {
        texts
            .iter()
            .fold(0u32, |acc, t| acc.saturating_add(self.count_text(t)))
    }

    fn count_input(&self, input: &TokenizableInput<'_>) -> u32 {
        match input {
            TokenizableInput::Text(text) => self.count_text(text),
            TokenizableInput::Texts(texts) => self.count_texts(texts),
            TokenizableInput::Messages(messages) => self.count_messages(messages),
        }
    }
}

/// Arc-wrapped token counter for easy sharing.
pub type SharedTokenCounter = Arc<dyn TokenCounter>;

/// Exact counter backed by a tiktoken BPE encoding.
pub struct BpeTokenCounter {
    id: TokenizerId,
    bpe: CoreBPE,
    message_overhead: u32,
}

impl BpeTokenCounter {
    pub fn cl100k_base() -> Result<Self, BudgetError> {
        Self::load(CL100K_BASE, tiktoken_rs::cl100k_base, CHAT_MESSAGE_OVERHEAD)
    }

    pub fn o200k_base() -> Result<Self, BudgetError> {
        Self::load(O200K_BASE, tiktoken_rs::o200k_base, O200K_MESSAGE_OVERHEAD)
    }

    pub fn p50k_base() -> Result<Self, BudgetError> {
        Self::load(P50K_BASE, tiktoken_rs::p50k_base, LEGACY_MESSAGE_OVERHEAD)
    }

    pub fn r50k_base() -> Result<Self, BudgetError> {
        Self::load(R50K_BASE, tiktoken_rs::r50k_base, LEGACY_MESSAGE_OVERHEAD)
    }

    /// Wrap an already constructed encoding under a caller-chosen name.
    pub fn from_bpe(id: TokenizerId, bpe: CoreBPE, message_overhead: u32) -> Self {
        Self {
            id,
            bpe,
            message_overhead,
        }
    }

    fn load<E: fmt::Display>(
        name: &'static str,
        loader: impl FnOnce() -> Result<CoreBPE, E>,
        message_overhead: u32,
    ) -> Result<Self, BudgetError> {
        let bpe = loader().map_err(|e| BudgetError::TokenizerInit {
            tokenizer: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_bpe(
            TokenizerId::from_static(name),
            bpe,
            message_overhead,
        ))
    }
}

impl fmt::Debug for BpeTokenCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BpeTokenCounter")
            .field("id", &self.id)
            .field("message_overhead", &self.message_overhead)
            .finish_non_exhaustive()
    }
}

impl TokenCounter for BpeTokenCounter {
    fn id(&self) -> TokenizerId {
        self.id.clone()
    }

    fn count_text(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        let tokens = self.bpe.encode_ordinary(text).len();
        u32::try_from(tokens).unwrap_or(u32::MAX)
    }

    fn message_overhead(&self) -> u32 {
        self.message_overhead
    }
}

/// Heuristic token counter using character-based estimation.
///
/// Uses the approximation: tokens ≈ characters / 4, with a 10% safety margin
/// plus additional overhead for message metadata.
///
/// This is intentionally conservative: overcounting rejects a borderline
/// request locally, undercounting lets the provider reject it after the fact.
#[derive(Debug, Clone)]
pub struct HeuristicTokenCounter {
    /// Characters per token ratio (default: 4)
    chars_per_token: f64,
    /// Safety margin multiplier (default: 1.1 = 10% extra)
    safety_margin: f64,
    /// Metadata overhead per message in tokens
    metadata_overhead: u32,
}

impl HeuristicTokenCounter {
    /// Create a new heuristic counter with custom parameters.
    pub fn new(chars_per_token: f64, safety_margin: f64, metadata_overhead: u32) -> Self {
        Self {
            chars_per_token,
            safety_margin,
            metadata_overhead,
        }
    }

    /// Create with default parameters (chars/4 + 10% margin + 10 metadata overhead).
    pub fn with_defaults() -> Self {
        Self::new(4.0, 1.1, HEURISTIC_MESSAGE_OVERHEAD)
    }
}

impl Default for HeuristicTokenCounter {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TokenCounter for HeuristicTokenCounter {
    fn id(&self) -> TokenizerId {
        TokenizerId::heuristic()
    }

    fn count_text(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }

        let char_count = text.chars().count() as f64;
        let base_tokens = char_count / self.chars_per_token;
        let adjusted_tokens = base_tokens * self.safety_margin;

        adjusted_tokens.ceil() as u32
    }

    fn message_overhead(&self) -> u32 {
        self.metadata_overhead
    }
}

/// The set of tokenizers available for counting, keyed by [`TokenizerId`].
///
/// Populated once, eagerly; read-only afterwards.
#[derive(Clone, Default)]
pub struct TokenizerSet {
    counters: HashMap<TokenizerId, SharedTokenCounter>,
}

impl TokenizerSet {
    /// Every built-in encoding, loaded up front.
    pub fn builtin() -> Result<Self, BudgetError> {
        let set = Self::default()
            .with_counter(BpeTokenCounter::cl100k_base()?)
            .with_counter(BpeTokenCounter::o200k_base()?)
            .with_counter(BpeTokenCounter::p50k_base()?)
            .with_counter(BpeTokenCounter::r50k_base()?)
            .with_counter(HeuristicTokenCounter::default());

        log::debug!("Loaded {} tokenizers", set.counters.len());
        Ok(set)
    }

    /// Register a counter under its own id, replacing any previous one.
    pub fn with_counter(self, counter: impl TokenCounter + 'static) -> Self {
        self.with_shared(Arc::new(counter))
    }

    pub fn with_shared(mut self, counter: SharedTokenCounter) -> Self {
        self.counters.insert(counter.id(), counter);
        self
    }

    pub fn get(&self, tokenizer: &TokenizerId) -> Option<&SharedTokenCounter> {
        self.counters.get(tokenizer)
    }

    pub fn contains(&self, tokenizer: &TokenizerId) -> bool {
        self.counters.contains_key(tokenizer)
    }

    /// Registered tokenizer ids, sorted by name.
    pub fn ids(&self) -> Vec<TokenizerId> {
        let mut ids: Vec<TokenizerId> = self.counters.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    /// Count `input` with the named tokenizer.
    pub fn count(
        &self,
        input: &TokenizableInput<'_>,
        tokenizer: &TokenizerId,
    ) -> Result<u32, BudgetError> {
        let counter = self
            .get(tokenizer)
            .ok_or_else(|| BudgetError::UnsupportedTokenizer {
                tokenizer: tokenizer.to_string(),
                model: None,
            })?;
        Ok(counter.count_input(input))
    }
}

impl fmt::Debug for TokenizerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenizerSet")
            .field("tokenizers", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::types::BudgetErrorKind;

    fn cl100k() -> BpeTokenCounter {
        BpeTokenCounter::cl100k_base().expect("cl100k_base should load")
    }

    #[test]
    fn bpe_counts_known_strings() {
        let counter = cl100k();
        assert_eq!(counter.count_text("hello world"), 2);
        assert_eq!(counter.count_text(&"lorem ipsum".repeat(100)), 300);
    }

    #[test]
    fn empty_inputs_count_zero() {
        let counter = cl100k();
        assert_eq!(counter.count_text(""), 0);
        assert_eq!(counter.count_texts(&[]), 0);
        assert_eq!(counter.count_messages(&[]), 0);
        assert_eq!(HeuristicTokenCounter::default().count_text(""), 0);
    }

    #[test]
    fn counting_is_deterministic() {
        let counter = cl100k();
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(20);
        assert_eq!(counter.count_text(&text), counter.count_text(&text));
    }

    #[test]
    fn concatenation_never_decreases_count() {
        let counter = cl100k();
        let pairs = [
            ("hello", " world"),
            ("lorem ipsum", "lorem ipsum"),
            ("fn main() {", " println!(\"hi\"); }"),
            ("a", "b"),
        ];
        for (a, b) in pairs {
            let joined = format!("{a}{b}");
            let whole = counter.count_text(&joined);
            assert!(whole >= counter.count_text(a), "{joined:?}");
            assert!(whole >= counter.count_text(b), "{joined:?}");
        }
    }

    #[test]
    fn texts_are_additive() {
        let counter = cl100k();
        let a = "Rust is a systems programming language.";
        let b = "It guarantees memory safety without a garbage collector.";
        assert_eq!(
            counter.count_input(&TokenizableInput::from(vec![a, b])),
            counter.count_text(a) + counter.count_text(b)
        );
    }

    #[test]
    fn messages_add_fixed_overhead_per_message() {
        let counter = cl100k();
        let messages = vec![
            ChatMessage::system("You are a helpful assistant."),
            ChatMessage::user("Hey! How are you?"),
            ChatMessage::assistant("I'm fine, thanks."),
        ];
        let raw: u32 = messages.iter().map(|m| counter.count_text(&m.content)).sum();
        assert_eq!(
            counter.count_input(&TokenizableInput::from(&messages)),
            raw + 3 * CHAT_MESSAGE_OVERHEAD
        );
    }

    #[test]
    fn heuristic_counter_counts_text() {
        let counter = HeuristicTokenCounter::default();

        // "Hello, world!" = 13 chars -> 13/4 * 1.1 ≈ 3.57 -> 4 tokens
        assert_eq!(counter.count_text("Hello, world!"), 4);
    }

    #[test]
    fn heuristic_counter_counts_user_message() {
        let counter = HeuristicTokenCounter::default();
        let tokens = counter.count_message(&ChatMessage::user("Hello, world!"));
        assert_eq!(tokens, 4 + HEURISTIC_MESSAGE_OVERHEAD);
    }

    #[test]
    fn custom_chars_per_token() {
        let counter = HeuristicTokenCounter::new(2.0, 1.0, 0);
        // With 2 chars per token, "test" (4 chars) = 2 tokens
        assert_eq!(counter.count_text("test"), 2);
    }

    #[test]
    fn safety_margin_applied() {
        let counter_no_margin = HeuristicTokenCounter::new(4.0, 1.0, 0);
        let counter_with_margin = HeuristicTokenCounter::new(4.0, 1.1, 0);

        let text = "Hello world!"; // 12 chars
        let base = counter_no_margin.count_text(text);
        let adjusted = counter_with_margin.count_text(text);

        assert!(adjusted > base, "Safety margin should increase token count");
    }

    #[test]
    fn builtin_set_has_every_encoding() {
        let set = TokenizerSet::builtin().unwrap();
        let names: Vec<String> = set.ids().iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec!["cl100k_base", "heuristic", "o200k_base", "p50k_base", "r50k_base"]
        );
    }

    #[test]
    fn set_rejects_unknown_tokenizer() {
        let set = TokenizerSet::default().with_counter(HeuristicTokenCounter::default());
        let err = set
            .count(&TokenizableInput::Text("hi"), &TokenizerId::new("sentencepiece"))
            .unwrap_err();
        assert_eq!(err.kind(), BudgetErrorKind::UnsupportedTokenizer);
    }

    #[test]
    fn set_accepts_custom_counter() {
        struct WordCounter;

        impl TokenCounter for WordCounter {
            fn id(&self) -> TokenizerId {
                TokenizerId::new("words")
            }

            fn count_text(&self, text: &str) -> u32 {
                text.split_whitespace().count() as u32
            }

            fn message_overhead(&self) -> u32 {
                1
            }
        }

        let set = TokenizerSet::default().with_counter(WordCounter);
        let id = TokenizerId::new("words");
        assert_eq!(set.count(&"one two three".into(), &id).unwrap(), 3);

        let messages = vec![ChatMessage::user("one two")];
        assert_eq!(set.count(&TokenizableInput::from(&messages), &id).unwrap(), 3);
    }

    #[test]
    fn tokenizer_id_equality_ignores_ownership() {
        assert_eq!(TokenizerId::new("cl100k_base"), TokenizerId::cl100k_base());
        let parsed: TokenizerId = serde_json::from_str("\"p50k_base\"").unwrap();
        assert_eq!(parsed, TokenizerId::p50k_base());
    }
}
