pub mod algorithmic;
pub mod challenges;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod sandbox;
pub mod ui;
pub mod verdict;

mod engine_tests;

pub use challenges::{Challenge, ChallengeRegistry};
pub use compiler::{compile, CompiledUnit};
pub use engine::Engine;
pub use error::{CompileError, CompileErrorKind, EngineError, ExecutionError, ExecutionErrorKind};
pub use sandbox::{Execution, Limits, Sandbox};
