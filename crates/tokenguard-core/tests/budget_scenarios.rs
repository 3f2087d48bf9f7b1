//! End-to-end budget validation against the built-in registry

use pretty_assertions::assert_eq;
use std::thread;
use tokenguard_core::{BudgetError, BudgetErrorKind, BudgetValidator, ChatMessage, ValidationResult};

fn validator() -> BudgetValidator {
    BudgetValidator::new().expect("built-in tokenizers should load")
}

#[test]
fn text_too_long_for_davinci() {
    let content = "lorem ipsum".repeat(9000);

    let err = validator()
        .validate(content.as_str(), "text-davinci-003")
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "This model's maximum context length is 4097 tokens, but the given text is 45000 tokens long."
    );
    assert!(matches!(
        err,
        BudgetError::TokenLimitExceeded {
            limit: 4097,
            used: 45000
        }
    ));
}

#[test]
fn short_text_fits_gpt4() {
    let content = "lorem ipsum".repeat(100);

    let remaining = validator().validate(content.as_str(), "gpt-4").unwrap();

    assert_eq!(remaining, 7892);
}

#[test]
fn array_of_texts_sums_element_counts() {
    let v = validator();
    let content = vec!["lorem ipsum".repeat(100), "lorem ipsum".repeat(100)];

    let remaining = v.validate(&content, "gpt-4").unwrap();

    let first = v.count(content[0].as_str(), "gpt-4").unwrap();
    let second = v.count(content[1].as_str(), "gpt-4").unwrap();
    assert_eq!(remaining, 8192 - (first + second));
    assert_eq!(remaining, 7592);
}

#[test]
fn unknown_model_never_gets_a_default_limit() {
    let err = validator().validate("hello", "gpt-unknown-9000").unwrap_err();

    assert_eq!(err.kind(), BudgetErrorKind::UnknownModel);
    assert_eq!(err.overflow(), None);
}

#[test]
fn dated_snapshot_uses_family_limit_and_tokenizer() {
    let v = validator();
    let content = "lorem ipsum".repeat(100);

    let result = v.check(content.as_str(), "gpt-4-0613-snapshot").unwrap();

    assert_eq!(
        result,
        ValidationResult {
            model: "gpt-4-0613-snapshot".to_string(),
            limit: 8192,
            tokens_used: 300,
            tokens_remaining: 7892,
            max_completion_tokens: None,
        }
    );
}

#[test]
fn chat_history_counts_role_overhead() {
    let v = validator();
    let messages = vec![
        ChatMessage::user("Hey! How are you?"),
        ChatMessage::assistant(
            " I'm just an AI, I don't have feelings or emotions, so I can't feel well or poorly.",
        ),
        ChatMessage::user("Please help me debug my computer!"),
    ];

    let raw: u32 = messages
        .iter()
        .map(|m| v.count(m.content.as_str(), "gpt-3.5-turbo").unwrap())
        .sum();
    let result = v.check(&messages, "gpt-3.5-turbo").unwrap();

    assert_eq!(result.tokens_used, raw + 3 * 4);
    assert_eq!(result.tokens_remaining, 4096 - result.tokens_used);
}

#[test]
fn heuristic_families_overcount_rather_than_undercount() {
    let v = validator();
    let content = "lorem ipsum".repeat(100);

    let claude = v.count(content.as_str(), "claude-2").unwrap();
    let gpt = v.count(content.as_str(), "gpt-4").unwrap();

    assert!(claude >= gpt, "heuristic {claude} < bpe {gpt}");
}

#[test]
fn concurrent_validation_matches_sequential() {
    let v = validator();
    let inputs: Vec<String> = (1..=16).map(|n| "lorem ipsum ".repeat(n * 25)).collect();
    let models = ["gpt-4", "gpt-4o", "text-davinci-003", "claude-3-haiku-20240307"];

    let expected: Vec<Vec<Result<u32, String>>> = inputs
        .iter()
        .map(|input| {
            models
                .iter()
                .map(|m| v.validate(input.as_str(), m).map_err(|e| e.to_string()))
                .collect()
        })
        .collect();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let v = v.clone();
            let inputs = inputs.clone();
            thread::spawn(move || {
                inputs
                    .iter()
                    .map(|input| {
                        models
                            .iter()
                            .map(|m| v.validate(input.as_str(), m).map_err(|e| e.to_string()))
                            .collect::<Vec<_>>()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}
