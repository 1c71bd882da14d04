//! Benchmark data model: test cases, sessions, progress and result rows.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{PromptMode, ProviderId, TaskKind};
use crate::sampler::{DeviceInfo, SampleSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    General,
    Coding,
    Conversation,
    Summarization,
    Proofreading,
    Creative,
    Technical,
}

impl Category {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::General => "General",
            Self::Coding => "Coding",
            Self::Conversation => "Conversation",
            Self::Summarization => "Summarization",
            Self::Proofreading => "Proofreading",
            Self::Creative => "Creative",
            Self::Technical => "Technical",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One benchmark prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub task: TaskKind,
    pub input_text: String,
    /// Rough expected output length in tokens.
    #[serde(default)]
    pub expected_output_tokens: Option<u32>,
    #[serde(default)]
    pub category: Category,
}

impl TestCase {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        task: TaskKind,
        input_text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            task,
            input_text: input_text.into(),
            expected_output_tokens: None,
            category: Category::General,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_expected_output(mut self, tokens: u32) -> Self {
        self.expected_output_tokens = Some(tokens);
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }
}

/// Session lifecycle. `Completed`, `Failed` and `Cancelled` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl BenchmarkStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(&self, next: BenchmarkStatus) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }
}

/// A planned run over the (test case x provider) matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSession {
    pub id: String,
    pub name: String,
    pub description: String,
    pub test_cases: Vec<TestCase>,
    pub providers: Vec<ProviderId>,
    pub prompt_mode: PromptMode,
    pub status: BenchmarkStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub results: Vec<BenchmarkResult>,
    pub current_test_index: usize,
    pub current_provider_index: usize,
}

impl BenchmarkSession {
    pub fn new(name: impl Into<String>, test_cases: Vec<TestCase>, providers: Vec<ProviderId>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            test_cases,
            providers,
            prompt_mode: PromptMode::default(),
            status: BenchmarkStatus::Idle,
            start_time: None,
            end_time: None,
            results: Vec::new(),
            current_test_index: 0,
            current_provider_index: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_prompt_mode(mut self, mode: PromptMode) -> Self {
        self.prompt_mode = mode;
        self
    }

    /// Number of (test case, provider) pairs.
    pub fn total_pairs(&self) -> usize {
        self.test_cases.len() * self.providers.len()
    }

    pub fn is_completed(&self) -> bool {
        self.status == BenchmarkStatus::Completed
    }

    /// Move to `next` if the lifecycle allows it. Returns false and leaves
    /// the status untouched otherwise.
    pub fn transition(&mut self, next: BenchmarkStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// A copy ready to run again: fresh id, `Idle`, no timing or results.
    pub fn rerun(&self) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: BenchmarkStatus::Idle,
            start_time: None,
            end_time: None,
            results: Vec::new(),
            current_test_index: 0,
            current_provider_index: 0,
            ..self.clone()
        }
    }
}

/// Live progress of the running session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkProgress {
    pub total_tests: usize,
    pub completed_tests: usize,
    pub current_test_case: Option<String>,
    pub current_provider: Option<ProviderId>,
    pub is_running: bool,
    pub is_completed: bool,
}

impl BenchmarkProgress {
    /// Completion in percent; 0 when there is nothing to run.
    pub fn progress_percentage(&self) -> f32 {
        if self.total_tests == 0 {
            0.0
        } else {
            self.completed_tests as f32 / self.total_tests as f32 * 100.0
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub first_token_latency_ms: u64,
    pub total_latency_ms: u64,
    pub tokens_per_second: f64,
    pub total_tokens: usize,
    pub prompt_tokens: usize,
    pub average_token_latency_ms: f64,
    /// Percent deviation of `total_latency_ms` from the task baseline.
    pub baseline_deviation_percent: f32,
}

impl LatencyMetrics {
    pub fn measured(
        task: TaskKind,
        first_token_latency_ms: u64,
        total_latency_ms: u64,
        total_tokens: usize,
        prompt_tokens: usize,
    ) -> Self {
        let average_token_latency_ms = if total_tokens > 0 {
            total_latency_ms as f64 / total_tokens as f64
        } else {
            0.0
        };
        Self {
            first_token_latency_ms,
            total_latency_ms,
            tokens_per_second: tokens_per_second(total_tokens, total_latency_ms),
            total_tokens,
            prompt_tokens,
            average_token_latency_ms,
            baseline_deviation_percent: baseline_deviation(total_latency_ms, task),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub model_size_mb: f32,
    pub peak_memory_mb: u64,
    pub average_memory_mb: u64,
    pub memory_increase_mb: i64,
    pub available_memory_mb: u64,
    pub total_memory_mb: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryMetrics {
    pub level_before: f32,
    pub level_after: f32,
    pub drain: f32,
    pub drain_per_hour: f32,
    pub charging: bool,
    pub temperature_c: Option<f32>,
}

impl BatteryMetrics {
    pub fn from_snapshot(snapshot: &SampleSnapshot) -> Self {
        Self {
            level_before: snapshot.battery_before.map_or(0.0, |b| b.level_percent),
            level_after: snapshot.battery_after.map_or(0.0, |b| b.level_percent),
            drain: snapshot.battery_drain(),
            drain_per_hour: snapshot.drain_per_hour(),
            charging: snapshot.charging(),
            temperature_c: snapshot.battery_after.and_then(|b| b.temperature_c),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub output_length: usize,
    pub output_tokens: usize,
    pub task_accomplished: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionInfo {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub provider_version: Option<String>,
    pub prompt_mode: PromptMode,
    pub configuration: BTreeMap<String, String>,
}

/// One row per attempt, failures included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub id: String,
    pub provider: ProviderId,
    pub test_case_id: String,
    pub model_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub latency: LatencyMetrics,
    pub memory: MemoryMetrics,
    pub battery: BatteryMetrics,
    pub quality: QualityMetrics,
    pub device: DeviceInfo,
    pub execution: ExecutionInfo,
    pub generated_text: String,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Tokens per second, 0 when no time elapsed.
pub fn tokens_per_second(tokens: usize, total_ms: u64) -> f64 {
    if total_ms == 0 {
        0.0
    } else {
        tokens as f64 * 1000.0 / total_ms as f64
    }
}

/// Reference latency per task on a mid-range device.
pub fn baseline_latency_ms(task: TaskKind) -> u64 {
    match task {
        TaskKind::Chat => 2000,
        TaskKind::Summarize => 3000,
        TaskKind::Proofread => 2500,
    }
}

pub fn baseline_deviation(total_ms: u64, task: TaskKind) -> f32 {
    let baseline = baseline_latency_ms(task) as f32;
    (total_ms as f32 - baseline) / baseline * 100.0
}
