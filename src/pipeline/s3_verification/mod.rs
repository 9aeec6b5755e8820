//! S3: deterministic token rules stacked with the LLM
//! verifier.

pub mod processor;
pub mod rules;
pub mod verifier;

pub use processor::{S3Outcome, S3Processor, TokenVerificationDecision, VerificationInput};
pub use rules::{RuleEvaluation, TokenRuleEngine};
pub use verifier::{LlmTokenVerifier, LlmVerification};
