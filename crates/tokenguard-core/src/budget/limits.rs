//! Model context window limits registry.
//!
//! Provides known context window sizes for supported models, resolved by
//! exact name first and then by the longest matching model family. Built-in
//! limits can be extended with a JSON override file at initialization.

use crate::budget::counter::{
    TokenizerId, CL100K_BASE, HEURISTIC, O200K_BASE, P50K_BASE, R50K_BASE,
};
use crate::budget::types::BudgetError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Characters allowed right after a family prefix.
///
/// `gpt-4` claims `gpt-4-0613-custom` and `llama2` claims `llama2:13b`, but
/// `gpt-4` never claims `gpt-4o`.
const FAMILY_SEPARATORS: &[char] = &['-', ':', '@', '/'];

/// How an entry's pattern is compared against a model name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Only the identical model name
    #[default]
    Exact,
    /// The identical name, or any name continuing the pattern after a separator
    Family,
}

/// Row of the compiled-in limits table.
#[derive(Debug, Clone, Copy)]
pub struct KnownModel {
    pub pattern: &'static str,
    pub match_kind: MatchKind,
    pub max_context_tokens: u32,
    pub max_completion_tokens: Option<u32>,
    pub tokenizer: Option<&'static str>,
}

impl KnownModel {
    pub const fn exact(pattern: &'static str, max_context_tokens: u32) -> Self {
        Self {
            pattern,
            match_kind: MatchKind::Exact,
            max_context_tokens,
            max_completion_tokens: None,
            tokenizer: None,
        }
    }

    pub const fn family(pattern: &'static str, max_context_tokens: u32) -> Self {
        Self {
            pattern,
            match_kind: MatchKind::Family,
            max_context_tokens,
            max_completion_tokens: None,
            tokenizer: None,
        }
    }

    pub const fn tokenizer(self, name: &'static str) -> Self {
        Self {
            tokenizer: Some(name),
            ..self
        }
    }

    pub const fn completion(self, max_completion_tokens: u32) -> Self {
        Self {
            max_completion_tokens: Some(max_completion_tokens),
            ..self
        }
    }

    fn to_entry(self) -> ModelLimitEntry {
        ModelLimitEntry {
            model_pattern: self.pattern.to_string(),
            match_kind: self.match_kind,
            max_context_tokens: self.max_context_tokens,
            max_completion_tokens: self.max_completion_tokens,
            tokenizer: self.tokenizer.map(TokenizerId::from_static),
        }
    }
}

/// Provider-published context windows.
///
/// Models without a tokenizer can only be counted by the provider's own API;
/// they still resolve, and can be checked with an externally obtained count.
pub const KNOWN_MODEL_LIMITS: &[KnownModel] = &[
    // OpenAI embeddings
    KnownModel::exact("text-embedding-ada-002", 8_191).tokenizer(CL100K_BASE),
    KnownModel::exact("text-embedding-3-small", 8_191).tokenizer(CL100K_BASE),
    KnownModel::exact("text-embedding-3-large", 8_191).tokenizer(CL100K_BASE),
    // OpenAI GPT-3.5
    KnownModel::family("gpt-3.5-turbo", 4_096).tokenizer(CL100K_BASE),
    KnownModel::exact("gpt-3.5-turbo-0301", 4_096).tokenizer(CL100K_BASE),
    KnownModel::exact("gpt-3.5-turbo-0613", 4_096).tokenizer(CL100K_BASE),
    KnownModel::family("gpt-3.5-turbo-16k", 16_384).tokenizer(CL100K_BASE),
    KnownModel::exact("gpt-3.5-turbo-16k-0613", 16_384).tokenizer(CL100K_BASE),
    KnownModel::exact("gpt-3.5-turbo-1106", 16_385)
        .tokenizer(CL100K_BASE)
        .completion(4_096),
    // OpenAI GPT-4
    KnownModel::family("gpt-4", 8_192).tokenizer(CL100K_BASE),
    KnownModel::exact("gpt-4-0314", 8_192).tokenizer(CL100K_BASE),
    KnownModel::exact("gpt-4-0613", 8_192).tokenizer(CL100K_BASE),
    KnownModel::family("gpt-4-32k", 32_768).tokenizer(CL100K_BASE),
    KnownModel::exact("gpt-4-32k-0314", 32_768).tokenizer(CL100K_BASE),
    KnownModel::exact("gpt-4-32k-0613", 32_768).tokenizer(CL100K_BASE),
    KnownModel::exact("gpt-4-1106-preview", 128_000)
        .tokenizer(CL100K_BASE)
        .completion(4_096),
    KnownModel::exact("gpt-4-0125-preview", 128_000)
        .tokenizer(CL100K_BASE)
        .completion(4_096),
    KnownModel::exact("gpt-4-vision-preview", 128_000)
        .tokenizer(CL100K_BASE)
        .completion(4_096),
    KnownModel::family("gpt-4-turbo", 128_000)
        .tokenizer(CL100K_BASE)
        .completion(4_096),
    KnownModel::family("gpt-4o", 128_000)
        .tokenizer(O200K_BASE)
        .completion(16_384),
    KnownModel::family("gpt-4o-mini", 128_000)
        .tokenizer(O200K_BASE)
        .completion(16_384),
    // OpenAI legacy completions
    KnownModel::exact("text-davinci-003", 4_097).tokenizer(P50K_BASE),
    KnownModel::exact("text-davinci-002", 4_097).tokenizer(P50K_BASE),
    KnownModel::exact("code-davinci-002", 8_001).tokenizer(P50K_BASE),
    KnownModel::exact("text-curie-001", 2_049).tokenizer(R50K_BASE),
    KnownModel::exact("text-babbage-001", 2_049).tokenizer(R50K_BASE),
    KnownModel::exact("text-ada-001", 2_049).tokenizer(R50K_BASE),
    KnownModel::exact("davinci", 2_049).tokenizer(R50K_BASE),
    KnownModel::exact("curie", 2_049).tokenizer(R50K_BASE),
    KnownModel::exact("babbage", 2_049).tokenizer(R50K_BASE),
    KnownModel::exact("ada", 2_049).tokenizer(R50K_BASE),
    // Anthropic
    KnownModel::exact("claude-2", 100_000).tokenizer(HEURISTIC),
    KnownModel::exact("claude-2.0", 100_000).tokenizer(HEURISTIC),
    KnownModel::exact("claude-2.1", 200_000).tokenizer(HEURISTIC),
    KnownModel::family("claude-instant-1", 100_000).tokenizer(HEURISTIC),
    KnownModel::family("claude-3", 200_000)
        .tokenizer(HEURISTIC)
        .completion(4_096),
    KnownModel::family("claude-3-5", 200_000)
        .tokenizer(HEURISTIC)
        .completion(8_192),
    // Google PaLM (token counts come from the provider API)
    KnownModel::exact("chat-bison-001", 4_000).completion(1_024),
    KnownModel::exact("text-bison-001", 8_196).completion(1_024),
    KnownModel::exact("embedding-gecko-001", 1_024),
    // Ollama / local models
    KnownModel::family("llama2", 4_096).tokenizer(HEURISTIC),
    KnownModel::family("mistral", 8_192).tokenizer(HEURISTIC),
];

/// Limit record for one model or model family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLimitEntry {
    /// Exact model name, or family prefix for `MatchKind::Family`
    pub model_pattern: String,
    #[serde(default)]
    pub match_kind: MatchKind,
    /// Maximum context window size in tokens (prompt + response)
    pub max_context_tokens: u32,
    /// Separate cap on response tokens, if the provider publishes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    /// Encoding used to count this model's tokens locally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<TokenizerId>,
}

impl ModelLimitEntry {
    pub fn exact(model_pattern: impl Into<String>, max_context_tokens: u32) -> Self {
        Self {
            model_pattern: model_pattern.into(),
            match_kind: MatchKind::Exact,
            max_context_tokens,
            max_completion_tokens: None,
            tokenizer: None,
        }
    }

    pub fn family(model_pattern: impl Into<String>, max_context_tokens: u32) -> Self {
        Self {
            match_kind: MatchKind::Family,
            ..Self::exact(model_pattern, max_context_tokens)
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: TokenizerId) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    pub fn with_completion_limit(mut self, max_completion_tokens: u32) -> Self {
        self.max_completion_tokens = Some(max_completion_tokens);
        self
    }

    /// Whether this family entry claims `model`. Exact entries never do.
    fn claims_as_family(&self, model: &str) -> bool {
        if self.match_kind != MatchKind::Family {
            return false;
        }
        model
            .strip_prefix(self.model_pattern.as_str())
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| FAMILY_SEPARATORS.contains(&c))
    }
}

/// Read-only registry of model limits.
///
/// # Matching Strategy
/// 1. Exact match on the model name (exact entries win over a family with the
///    same pattern)
/// 2. Longest family prefix followed by a separator
/// 3. `BudgetError::UnknownModel`, never a default limit
#[derive(Debug, Clone)]
pub struct ModelLimitRegistry {
    entries: Vec<ModelLimitEntry>,
    exact: HashMap<String, usize>,
    /// Indices of family entries, longest pattern first
    families: Vec<usize>,
}

impl ModelLimitRegistry {
    /// Registry with the compiled-in table only.
    pub fn builtin() -> Self {
        Self::index(builtin_entries())
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Built-in table merged with the file at [`default_config_path`], if present.
    pub fn from_default_config() -> Result<Self, BudgetError> {
        Self::builder()
            .with_builtin()
            .load_file_if_exists(default_config_path())?
            .build()
    }

    /// Resolve the limit entry for a model name.
    pub fn limit_for(&self, model: &str) -> Result<&ModelLimitEntry, BudgetError> {
        if let Some(&idx) = self.exact.get(model) {
            return Ok(&self.entries[idx]);
        }

        self.families
            .iter()
            .map(|&idx| &self.entries[idx])
            .find(|entry| entry.claims_as_family(model))
            .ok_or_else(|| BudgetError::UnknownModel {
                model: model.to_string(),
            })
    }

    /// All entries in table order.
    pub fn entries(&self) -> impl Iterator<Item = &ModelLimitEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn index(entries: Vec<ModelLimitEntry>) -> Self {
        let mut exact: HashMap<String, usize> = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            let shadowed_by_exact = exact
                .get(&entry.model_pattern)
                .is_some_and(|&prev| entries[prev].match_kind == MatchKind::Exact);
            if !shadowed_by_exact {
                exact.insert(entry.model_pattern.clone(), idx);
            }
        }

        let mut families: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.match_kind == MatchKind::Family)
            .map(|(idx, _)| idx)
            .collect();
        families.sort_by_key(|&idx| std::cmp::Reverse(entries[idx].model_pattern.len()));

        Self {
            entries,
            exact,
            families,
        }
    }
}

impl Default for ModelLimitRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Collects entries before the registry is frozen.
///
/// An entry with the same pattern and match kind as an earlier one replaces
/// it in place.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: Vec<ModelLimitEntry>,
}

impl RegistryBuilder {
    pub fn with_builtin(self) -> Self {
        self.entries(builtin_entries())
    }

    pub fn entry(mut self, entry: ModelLimitEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn entries(mut self, entries: impl IntoIterator<Item = ModelLimitEntry>) -> Self {
        self.entries.extend(entries);
        self
    }

    /// Merge a JSON array of [`ModelLimitEntry`] records.
    pub fn load_file(self, path: impl AsRef<Path>) -> Result<Self, BudgetError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BudgetError::Config(format!("{}: {}", path.display(), e)))?;
        let limits: Vec<ModelLimitEntry> = serde_json::from_str(&content)
            .map_err(|e| BudgetError::Config(format!("{}: {}", path.display(), e)))?;

        log::info!("Loaded {} model limits from {:?}", limits.len(), path);
        Ok(self.entries(limits))
    }

    /// Like [`RegistryBuilder::load_file`], but a missing file is not an error.
    pub fn load_file_if_exists(self, path: impl AsRef<Path>) -> Result<Self, BudgetError> {
        let path = path.as_ref();
        if !path.exists() {
            log::debug!("No model limit overrides at {:?}", path);
            return Ok(self);
        }
        self.load_file(path)
    }

    pub fn build(self) -> Result<ModelLimitRegistry, BudgetError> {
        let mut merged: Vec<ModelLimitEntry> = Vec::with_capacity(self.entries.len());
        let mut positions: HashMap<(String, MatchKind), usize> = HashMap::new();

        for entry in self.entries {
            if entry.model_pattern.trim().is_empty() {
                return Err(BudgetError::Config(
                    "model_pattern must not be empty".to_string(),
                ));
            }
            if entry.max_context_tokens == 0 {
                return Err(BudgetError::Config(format!(
                    "max_context_tokens for '{}' must be positive",
                    entry.model_pattern
                )));
            }

            let key = (entry.model_pattern.clone(), entry.match_kind);
            match positions.get(&key).copied() {
                Some(idx) => {
                    log::debug!("Overriding model limit for '{}'", entry.model_pattern);
                    merged[idx] = entry;
                }
                None => {
                    positions.insert(key, merged.len());
                    merged.push(entry);
                }
            }
        }

        Ok(ModelLimitRegistry::index(merged))
    }
}

fn builtin_entries() -> Vec<ModelLimitEntry> {
    KNOWN_MODEL_LIMITS.iter().map(|known| known.to_entry()).collect()
}

/// Environment variable naming an override file in place of the default.
pub const MODEL_LIMITS_ENV: &str = "TOKENGUARD_MODEL_LIMITS";

/// Get the default override file path.
///
/// `$TOKENGUARD_MODEL_LIMITS` when set, otherwise
/// `~/.tokenguard/model_limits.json` (relative to the working directory when
/// no home directory is known).
pub fn default_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(MODEL_LIMITS_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }

    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".tokenguard").join("model_limits.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::types::BudgetErrorKind;
    use std::collections::HashSet;
    use std::io::Write;

    fn limit(registry: &ModelLimitRegistry, model: &str) -> u32 {
        registry
            .limit_for(model)
            .map(|e| e.max_context_tokens)
            .unwrap_or_else(|e| panic!("{model}: {e}"))
    }

    #[test]
    fn no_duplicate_patterns_in_builtin_table() {
        let keys: Vec<(&str, MatchKind)> = KNOWN_MODEL_LIMITS
            .iter()
            .map(|m| (m.pattern, m.match_kind))
            .collect();
        let unique: HashSet<_> = keys.iter().copied().collect();
        assert_eq!(keys.len(), unique.len());
    }

    #[test]
    fn builtin_limits_are_positive() {
        assert!(KNOWN_MODEL_LIMITS.iter().all(|m| m.max_context_tokens > 0));
    }

    #[test]
    fn registry_finds_builtin_by_exact_match() {
        let registry = ModelLimitRegistry::builtin();
        assert_eq!(limit(&registry, "gpt-4"), 8_192);
        assert_eq!(limit(&registry, "text-davinci-003"), 4_097);
        assert_eq!(limit(&registry, "text-embedding-ada-002"), 8_191);
        assert_eq!(limit(&registry, "gpt-3.5-turbo-16k-0613"), 16_384);
        assert_eq!(limit(&registry, "ada"), 2_049);
    }

    #[test]
    fn dated_variants_resolve_to_their_family() {
        let registry = ModelLimitRegistry::builtin();
        assert_eq!(limit(&registry, "gpt-4-0613-custom"), 8_192);
        assert_eq!(limit(&registry, "gpt-4-32k-0314-ft"), 32_768);
        assert_eq!(limit(&registry, "gpt-4-turbo-2024-04-09"), 128_000);
        assert_eq!(limit(&registry, "gpt-4o-2024-08-06"), 128_000);
        assert_eq!(limit(&registry, "llama2:13b"), 4_096);

        let entry = registry.limit_for("claude-3-5-sonnet-20241022").unwrap();
        assert_eq!(entry.model_pattern, "claude-3-5");
        assert_eq!(entry.max_completion_tokens, Some(8_192));
    }

    #[test]
    fn longest_family_prefix_wins() {
        let registry = ModelLimitRegistry::builtin();
        let entry = registry.limit_for("gpt-4o-mini-2024-07-18").unwrap();
        assert_eq!(entry.model_pattern, "gpt-4o-mini");

        let entry = registry.limit_for("claude-3-opus-20240229").unwrap();
        assert_eq!(entry.model_pattern, "claude-3");
    }

    #[test]
    fn family_requires_separator() {
        let registry = ModelLimitRegistry::builtin();
        let err = registry.limit_for("gpt-40").unwrap_err();
        assert_eq!(err.kind(), BudgetErrorKind::UnknownModel);

        let entry = registry.limit_for("gpt-4o").unwrap();
        assert_eq!(entry.model_pattern, "gpt-4o");
    }

    #[test]
    fn exact_entries_do_not_match_as_prefix() {
        let registry = ModelLimitRegistry::builtin();
        assert!(registry.limit_for("ada-lovelace").is_err());
        assert!(registry.limit_for("text-davinci-003-beta").is_err());
    }

    #[test]
    fn unknown_model_is_an_error() {
        let registry = ModelLimitRegistry::builtin();
        match registry.limit_for("unknown-model-xyz") {
            Err(BudgetError::UnknownModel { model }) => assert_eq!(model, "unknown-model-xyz"),
            other => panic!("expected UnknownModel, got {other:?}"),
        }
    }

    #[test]
    fn tokenizer_is_carried_by_entry() {
        let registry = ModelLimitRegistry::builtin();
        let entry = registry.limit_for("text-davinci-003").unwrap();
        assert_eq!(entry.tokenizer.as_ref().map(TokenizerId::as_str), Some("p50k_base"));

        let entry = registry.limit_for("chat-bison-001").unwrap();
        assert!(entry.tokenizer.is_none());
    }

    #[test]
    fn user_entry_overrides_builtin() {
        let registry = ModelLimitRegistry::builder()
            .with_builtin()
            .entry(
                ModelLimitEntry::family("gpt-4", 64_000)
                    .with_tokenizer(TokenizerId::cl100k_base()),
            )
            .build()
            .unwrap();

        assert_eq!(limit(&registry, "gpt-4"), 64_000);
        assert_eq!(limit(&registry, "gpt-4-custom"), 64_000);
        assert_eq!(registry.len(), KNOWN_MODEL_LIMITS.len());
    }

    #[test]
    fn exact_entry_beats_family_with_same_pattern() {
        let registry = ModelLimitRegistry::builder()
            .entry(ModelLimitEntry::family("acme", 1_000))
            .entry(ModelLimitEntry::exact("acme", 2_000))
            .build()
            .unwrap();

        assert_eq!(limit(&registry, "acme"), 2_000);
        assert_eq!(limit(&registry, "acme-v2"), 1_000);
    }

    #[test]
    fn build_rejects_zero_limit() {
        let err = ModelLimitRegistry::builder()
            .entry(ModelLimitEntry::exact("broken", 0))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), BudgetErrorKind::Config);
    }

    #[test]
    fn loads_overrides_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"model_pattern": "acme-large", "match_kind": "family", "max_context_tokens": 32000, "tokenizer": "cl100k_base"}},
                {{"model_pattern": "acme-small", "max_context_tokens": 2000, "max_completion_tokens": 500}}
            ]"#
        )
        .unwrap();

        let registry = ModelLimitRegistry::builder()
            .with_builtin()
            .load_file(file.path())
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(limit(&registry, "acme-large-2024"), 32_000);
        let small = registry.limit_for("acme-small").unwrap();
        assert_eq!(small.match_kind, MatchKind::Exact);
        assert_eq!(small.max_completion_tokens, Some(500));
        assert!(small.tokenizer.is_none());
    }

    #[test]
    fn malformed_override_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = ModelLimitRegistry::builder().load_file(file.path()).unwrap_err();
        assert_eq!(err.kind(), BudgetErrorKind::Config);
    }

    #[test]
    fn missing_override_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelLimitRegistry::builder()
            .with_builtin()
            .load_file_if_exists(dir.path().join("model_limits.json"))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(registry.len(), KNOWN_MODEL_LIMITS.len());
    }
}
