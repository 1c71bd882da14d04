//! Benchmark plans loaded from TOML.
//!
//! ```toml
//! name = "nightly"
//! providers = ["native_cpp", "on_device_service"]
//! suite = "quick"                      # or "all", or list ids below
//! test_cases = ["chat-coding"]
//! prompt_mode = "optimized"
//!
//! [[custom_cases]]
//! id = "ad-hoc"
//! name = "Ad hoc"
//! task = "chat"
//! input_text = "Say hi"
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::backend::{PromptMode, ProviderId};

use super::catalog;
use super::types::{BenchmarkSession, TestCase};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Failed to read plan: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid plan: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown provider in plan: {0}")]
    UnknownProvider(String),

    #[error("Unknown test case in plan: {0}")]
    UnknownTestCase(String),

    #[error("Unknown suite in plan: {0}")]
    UnknownSuite(String),

    #[error("Plan has no {0}")]
    Empty(&'static str),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkPlan {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub providers: Vec<String>,
    #[serde(default)]
    pub suite: Option<String>,
    #[serde(default)]
    pub test_cases: Vec<String>,
    #[serde(default)]
    pub custom_cases: Vec<TestCase>,
    #[serde(default)]
    pub prompt_mode: Option<PromptMode>,
}

impl BenchmarkPlan {
    pub fn from_toml(text: &str) -> Result<Self, PlanError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, PlanError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Resolve provider names and test case ids into a runnable session.
    /// Suite cases come first, then listed ids, then custom cases.
    pub fn into_session(self, default_mode: PromptMode) -> Result<BenchmarkSession, PlanError> {
        let mut providers = Vec::new();
        for name in &self.providers {
            let provider = name
                .parse::<ProviderId>()
                .map_err(|_| PlanError::UnknownProvider(name.clone()))?;
            if !providers.contains(&provider) {
                providers.push(provider);
            }
        }
        if providers.is_empty() {
            return Err(PlanError::Empty("providers"));
        }

        let mut cases = match self.suite.as_deref() {
            None => Vec::new(),
            Some("quick") => catalog::quick(),
            Some("all") => catalog::all(),
            Some(other) => return Err(PlanError::UnknownSuite(other.to_string())),
        };
        for id in &self.test_cases {
            let case = catalog::find(id).ok_or_else(|| PlanError::UnknownTestCase(id.clone()))?;
            cases.push(case);
        }
        cases.extend(self.custom_cases);
        if cases.is_empty() {
            return Err(PlanError::Empty("test cases"));
        }

        Ok(BenchmarkSession::new(self.name, cases, providers)
            .with_description(self.description)
            .with_prompt_mode(self.prompt_mode.unwrap_or(default_mode)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TaskKind;

    const PLAN: &str = r#"
        name = "nightly"
        providers = ["native_cpp", "lite-runtime", "native_cpp"]
        suite = "quick"
        test_cases = ["chat-coding"]
        prompt_mode = "optimized"

        [[custom_cases]]
        id = "ad-hoc"
        name = "Ad hoc"
        task = "proofread"
        input_text = "teh cat"
    "#;

    #[test]
    fn test_plan_resolves_to_session() {
        let session = BenchmarkPlan::from_toml(PLAN)
            .unwrap()
            .into_session(PromptMode::Unified)
            .unwrap();
        assert_eq!(session.name, "nightly");
        assert_eq!(session.providers, vec![ProviderId::NativeCpp, ProviderId::LiteRuntime]);
        assert_eq!(session.test_cases.len(), 6);
        assert_eq!(session.test_cases[4].id, "chat-coding");
        assert_eq!(session.test_cases[5].task, TaskKind::Proofread);
        assert_eq!(session.prompt_mode, PromptMode::Optimized);
    }

    #[test]
    fn test_default_mode_used_when_unset() {
        let plan = BenchmarkPlan::from_toml(
            "name = \"x\"\nproviders = [\"service\"]\ntest_cases = [\"perf-short\"]\n",
        )
        .unwrap();
        let session = plan.into_session(PromptMode::Optimized).unwrap();
        assert_eq!(session.prompt_mode, PromptMode::Optimized);
        assert_eq!(session.providers, vec![ProviderId::OnDeviceService]);
    }

    #[test]
    fn test_unknown_entries_rejected() {
        let plan = BenchmarkPlan::from_toml("name = \"x\"\nproviders = [\"onnx\"]\nsuite = \"all\"\n").unwrap();
        assert!(matches!(plan.into_session(PromptMode::Unified), Err(PlanError::UnknownProvider(_))));

        let plan = BenchmarkPlan::from_toml("name = \"x\"\nproviders = [\"litert\"]\ntest_cases = [\"zzz\"]\n").unwrap();
        assert!(matches!(plan.into_session(PromptMode::Unified), Err(PlanError::UnknownTestCase(_))));

        let plan = BenchmarkPlan::from_toml("name = \"x\"\nproviders = [\"litert\"]\n").unwrap();
        assert!(matches!(plan.into_session(PromptMode::Unified), Err(PlanError::Empty("test cases"))));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(BenchmarkPlan::from_toml("name = "), Err(PlanError::Parse(_))));
        assert!(matches!(
            BenchmarkPlan::from_toml("name = \"x\"\nproviders = []\nretries = 3\n"),
            Err(PlanError::Parse(_))
        ));
    }
}
