pub mod config;
pub mod types;
pub mod value;

pub use config::{ConfigError, EngineConfig};
pub use types::{
    ChallengeKind, ChallengeSummary, CheckResult, ErrorResponse, Submission, Verdict,
    VerifyRequest, VerifyResponse,
};
pub use value::Value;
