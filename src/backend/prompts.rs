//! Prompt construction and generation parameters per task.
//!
//! `PromptMode::Unified` sends every provider the same prompt so that
//! benchmark numbers compare like with like. `PromptMode::Optimized` lets
//! each provider use the template it answers best.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{ProviderId, TaskKind};

/// Longest input an optimized prompt forwards to small native models.
const OPTIMIZED_INPUT_CHARS: usize = 500;

const EMPTY_INPUT_PROMPT: &str = "The text is empty.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    /// Same prompt for every provider.
    #[default]
    Unified,
    /// Provider-specific prompt templates.
    Optimized,
}

impl PromptMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unified => "unified",
            Self::Optimized => "optimized",
        }
    }
}

impl fmt::Display for PromptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unified" => Ok(Self::Unified),
            "optimized" => Ok(Self::Optimized),
            other => Err(format!("unknown prompt mode: {other}")),
        }
    }
}

/// Sampling parameters handed to native runtimes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl GenerationParams {
    pub fn for_task(task: TaskKind) -> Self {
        match task {
            TaskKind::Chat => Self { max_tokens: 1000, temperature: 0.4, top_p: 0.9 },
            TaskKind::Summarize => Self { max_tokens: 500, temperature: 0.2, top_p: 0.9 },
            TaskKind::Proofread => Self { max_tokens: 500, temperature: 0.2, top_p: 0.95 },
        }
    }
}

/// Build the prompt `provider` receives for `task` on `input`.
pub fn build_prompt(mode: PromptMode, provider: ProviderId, task: TaskKind, input: &str) -> String {
    match mode {
        PromptMode::Unified => unified_prompt(task, input),
        PromptMode::Optimized => optimized_prompt(provider, task, input),
    }
}

fn unified_prompt(task: TaskKind, input: &str) -> String {
    let clean = input.trim();
    match task {
        TaskKind::Chat => clean.to_string(),
        _ if clean.is_empty() => EMPTY_INPUT_PROMPT.to_string(),
        TaskKind::Summarize => format!("Summarize the following text concisely:\n\n{clean}"),
        TaskKind::Proofread => format!("Proofread the following text:\n\n{clean}"),
    }
}

fn optimized_prompt(provider: ProviderId, task: TaskKind, input: &str) -> String {
    match provider {
        ProviderId::NativeCpp => native_prompt(task, input),
        ProviderId::LiteRuntime => lite_prompt(task, input),
        ProviderId::OnDeviceService => service_prompt(task, input),
    }
}

// Small GGUF chat models drift into role-play without explicit guardrails.
fn native_prompt(task: TaskKind, input: &str) -> String {
    let clean: String = input.trim().chars().take(OPTIMIZED_INPUT_CHARS).collect();
    match task {
        TaskKind::Chat if clean.is_empty() => "Hello".to_string(),
        TaskKind::Chat => format!(
            "Instruction: Respond concisely in at most 2 sentences. Do NOT roleplay or write \
             multi-speaker dialogues. Write only your answer as the assistant.\n\
             Input: {clean}\nAnswer:"
        ),
        TaskKind::Summarize if clean.is_empty() => "Hello".to_string(),
        TaskKind::Summarize => format!(
            "Summarize the following text concisely in the same language as the input. \
             Output 2-3 bullet points. Do not translate. No preface or closing, only the summary.\n\n\
             Text:\n---\n{clean}\n---\n\nSummary:\n-"
        ),
        TaskKind::Proofread if clean.is_empty() => "{}".to_string(),
        TaskKind::Proofread => format!(
            "JSON only. No prose. Proofreading: minimal edits only, preserve meaning and order, \
             do not add info. Format {{\"corrected_text\":string,\"corrections\":[{{\"original\":string,\
             \"suggested\":string,\"type\":string,\"explanation\":string,\"start\":number,\"end\":number}}]}}. \
             Text: {clean}"
        ),
    }
}

fn lite_prompt(task: TaskKind, input: &str) -> String {
    let clean = input.trim();
    match task {
        TaskKind::Chat => format!("User: {clean}\nAssistant:"),
        TaskKind::Summarize => format!("Summary of: {clean}\nTL;DR:"),
        TaskKind::Proofread => format!("Original: {clean}\nCorrected:"),
    }
}

fn service_prompt(task: TaskKind, input: &str) -> String {
    let clean = input.trim();
    match task {
        TaskKind::Chat => clean.to_string(),
        TaskKind::Summarize => format!("Please summarize the following text in three sentences or fewer:\n{clean}"),
        TaskKind::Proofread => format!(
            "Correct spelling and grammar in the following text. Reply with the corrected text only:\n{clean}"
        ),
    }
}

/// Rough prompt token count: one token per four characters, at least one.
pub fn estimate_token_count(text: &str) -> usize {
    (text.chars().count() / 4).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unified_prompt_ignores_provider() {
        let a = build_prompt(PromptMode::Unified, ProviderId::NativeCpp, TaskKind::Summarize, " text ");
        let b = build_prompt(PromptMode::Unified, ProviderId::OnDeviceService, TaskKind::Summarize, "text");
        assert_eq!(a, b);
        assert_eq!(a, "Summarize the following text concisely:\n\ntext");
    }

    #[test]
    fn test_unified_chat_is_trimmed_message() {
        let p = build_prompt(PromptMode::Unified, ProviderId::LiteRuntime, TaskKind::Chat, "  hi there \n");
        assert_eq!(p, "hi there");
    }

    #[test]
    fn test_unified_empty_input() {
        let p = build_prompt(PromptMode::Unified, ProviderId::NativeCpp, TaskKind::Proofread, "   ");
        assert_eq!(p, EMPTY_INPUT_PROMPT);
    }

    #[test]
    fn test_optimized_prompts_differ_per_provider() {
        let native = build_prompt(PromptMode::Optimized, ProviderId::NativeCpp, TaskKind::Chat, "hello");
        let lite = build_prompt(PromptMode::Optimized, ProviderId::LiteRuntime, TaskKind::Chat, "hello");
        assert!(native.starts_with("Instruction:"));
        assert_eq!(lite, "User: hello\nAssistant:");
    }

    #[test]
    fn test_optimized_native_truncates_long_input() {
        let long = "x".repeat(2000);
        let p = build_prompt(PromptMode::Optimized, ProviderId::NativeCpp, TaskKind::Proofread, &long);
        assert!(p.len() < 1000);
        assert!(p.starts_with("JSON only."));
    }

    #[test]
    fn test_prompt_mode_parse() {
        assert_eq!("Optimized".parse::<PromptMode>().unwrap(), PromptMode::Optimized);
        assert!("fast".parse::<PromptMode>().is_err());
        assert_eq!(PromptMode::default(), PromptMode::Unified);
    }

    #[test]
    fn test_token_estimate_floor() {
        assert_eq!(estimate_token_count(""), 1);
        assert_eq!(estimate_token_count("abcdefgh"), 2);
    }

    #[test]
    fn test_generation_params_per_task() {
        assert_eq!(GenerationParams::for_task(TaskKind::Chat).max_tokens, 1000);
        assert_eq!(GenerationParams::for_task(TaskKind::Proofread).top_p, 0.95);
    }
}
