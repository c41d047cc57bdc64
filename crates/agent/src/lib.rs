//! Query agent: turns natural-language questions into partition-scoped
//! read-only queries and runs them.
//!
//! # Pipeline
//!
//! 1. **Guard** (`guardrails`) - reject questions matching injection patterns
//! 2. **Compile** (`prompt`) - render instructions and the user prompt
//! 3. **Complete** (`llm`, `providers`) - one call to the completion service
//! 4. **Normalize** - strip fences, enforce a single SELECT, scope to the partition
//! 5. **Execute** (`executor`) - page through the store, or mock records
//!
//! `QueryRuntime` (see `runtime`) wires the stages together and exposes the
//! text surface: every `*_text` call returns either query text or a report.
//!
//! # Safety Principle
//!
//! The completion service only drafts query text. Whether that text runs, and
//! against which partition, is decided deterministically after normalization.

pub mod executor;
pub mod guardrails;
pub mod llm;
pub mod mock;
pub mod prompt;
pub mod providers;
pub mod runtime;

pub use executor::QueryExecutor;
pub use guardrails::InjectionGuard;
pub use llm::LlmClient;
pub use mock::{KeywordMockStrategy, MockRecordStrategy};
pub use prompt::{CompiledPrompt, PromptCompiler};
pub use providers::HttpLlmClient;
pub use runtime::{QueryRuntime, RuntimeSettings};
