//! Shared test doubles for the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use tutorloop::agent::{AgentController, LoopConfig, ReasoningLoop};
use tutorloop::llm::{BackendError, ChatMessage, GenerationBackend};
use tutorloop::policy::{PolicyConfig, PolicyUpdater};
use tutorloop::profile::{LearnerProfile, MemoryBackend, ProfileBackend, ProfileStore, StoreError};
use tutorloop::safety::SafetyValidator;
use tutorloop::tools::{
    CodeSandbox, SandboxError, SandboxLimits, SandboxOutput, SandboxRequest, SearchConfig,
    StubSearch, ToolExecutor,
};

/// Reply used once the script runs out
pub const IDLE_REPLY: &str = r#"{"thought": "still thinking"}"#;

/// JSON reply calling a tool
pub fn act(tool: &str, input: &str) -> String {
    serde_json::json!({
        "thought": format!("let me use {}", tool),
        "action": tool,
        "action_input": input,
    })
    .to_string()
}

/// JSON reply with a final answer
pub fn answer(text: &str) -> String {
    serde_json::json!({
        "thought": "ready to answer",
        "action": "none",
        "answer": text,
    })
    .to_string()
}

// ─────────────────────────────────────────────────────────────────────────
// Generation backend
// ─────────────────────────────────────────────────────────────────────────

/// Generation backend returning queued replies in order
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            ..Default::default()
        })
    }

    /// Backend whose every call fails
    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::from(vec![Err("connection refused".to_string())])),
            ..Default::default()
        })
    }

    pub fn push(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// System prompt of the n-th generation call
    pub fn system_prompt(&self, call: usize) -> Option<String> {
        self.prompts
            .lock()
            .unwrap()
            .get(call)
            .and_then(|messages| messages.first())
            .map(|m| m.content.clone())
    }

    /// Full message list of the n-th generation call
    pub fn messages(&self, call: usize) -> Vec<ChatMessage> {
        self.prompts.lock().unwrap().get(call).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(messages.to_vec());

        let mut replies = self.replies.lock().unwrap();
        match replies.front().cloned() {
            // failures stick so every later call fails too
            Some(Err(detail)) => Err(BackendError::Unavailable(detail)),
            Some(Ok(reply)) => {
                replies.pop_front();
                Ok(reply)
            }
            None => Ok(IDLE_REPLY.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Sandbox
// ─────────────────────────────────────────────────────────────────────────

/// Sandbox that never runs anything, only counts and answers
pub struct CountingSandbox {
    runs: AtomicUsize,
    stdout: String,
    timed_out: bool,
}

impl CountingSandbox {
    pub fn new(stdout: &str) -> Arc<Self> {
        Arc::new(Self {
            runs: AtomicUsize::new(0),
            stdout: stdout.to_string(),
            timed_out: false,
        })
    }

    /// Every run reports a timeout
    pub fn timing_out() -> Arc<Self> {
        Arc::new(Self {
            runs: AtomicUsize::new(0),
            stdout: String::new(),
            timed_out: true,
        })
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodeSandbox for CountingSandbox {
    async fn run(&self, request: &SandboxRequest) -> Result<SandboxOutput, SandboxError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(SandboxOutput {
            stdout: self.stdout.clone(),
            stderr: String::new(),
            exit_code: if self.timed_out { -1 } else { 0 },
            signal: if self.timed_out { Some(9) } else { None },
            duration_ms: if self.timed_out {
                request.timeout.as_millis() as f64
            } else {
                1.0
            },
            timed_out: self.timed_out,
        })
    }
}

/// Sandbox whose interpreter can never be started
pub struct BrokenSandbox;

#[async_trait]
impl CodeSandbox for BrokenSandbox {
    async fn run(&self, _request: &SandboxRequest) -> Result<SandboxOutput, SandboxError> {
        Err(SandboxError::Spawn("python3: not found".to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Profile persistence
// ─────────────────────────────────────────────────────────────────────────

/// In-memory backend whose saves can be switched to fail
#[derive(Default)]
pub struct FlakyBackend {
    inner: MemoryBackend,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl FlakyBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// What is actually persisted, bypassing the store
    pub async fn persisted(&self, id: &str) -> Option<LearnerProfile> {
        self.inner.fetch(id).await.ok().flatten()
    }
}

#[async_trait]
impl ProfileBackend for FlakyBackend {
    async fn fetch(&self, id: &str) -> Result<Option<LearnerProfile>, StoreError> {
        self.inner.fetch(id).await
    }

    async fn store(&self, profile: &LearnerProfile) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk full".to_string()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.store(profile).await
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Wiring
// ─────────────────────────────────────────────────────────────────────────

pub struct Harness {
    pub controller: AgentController,
    pub backend: Arc<ScriptedBackend>,
    pub profiles: Arc<FlakyBackend>,
}

pub fn executor(sandbox: Arc<dyn CodeSandbox>) -> Arc<ToolExecutor> {
    Arc::new(ToolExecutor::new(
        SafetyValidator::default(),
        sandbox,
        Arc::new(StubSearch),
        SandboxLimits::default(),
        SearchConfig::default(),
    ))
}

pub fn harness(
    backend: Arc<ScriptedBackend>,
    sandbox: Arc<dyn CodeSandbox>,
    loop_config: LoopConfig,
    policy: PolicyConfig,
) -> Harness {
    let profiles = FlakyBackend::new();
    let store = Arc::new(ProfileStore::new(profiles.clone(), policy.profile_defaults()));
    let reasoning = ReasoningLoop::new(backend.clone(), executor(sandbox), loop_config);
    let controller = AgentController::new(
        store,
        reasoning,
        PolicyUpdater::new(policy),
        SafetyValidator::default(),
    );
    Harness {
        controller,
        backend,
        profiles,
    }
}

/// Harness with default loop and policy settings
pub fn default_harness(backend: Arc<ScriptedBackend>, sandbox: Arc<dyn CodeSandbox>) -> Harness {
    harness(backend, sandbox, LoopConfig::default(), PolicyConfig::default())
}
