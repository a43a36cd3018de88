//! Sandboxed compilation and execution of submitted code

pub mod executor;
pub mod languages;

pub use executor::{
    CompileOutcome, CompiledArtifact, OutcomeTag, RunLimits, RunOutcome, SandboxExecutor,
};
pub use languages::LanguageHandler;
