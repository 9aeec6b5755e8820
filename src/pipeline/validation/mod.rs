//! Validation: rule, web-evidence and LLM-entailment validators with
//! weighted aggregation.

pub mod evidence;
pub mod llm;
pub mod processor;
pub mod rules;
pub mod web;

pub use evidence::{EvidenceIndexer, EvidenceSnippet};
pub use llm::{LlmValidationResult, LlmValidator};
pub use processor::{ValidationDecision, ValidationOutcome, ValidationProcessor};
pub use rules::{RuleValidationResult, RuleValidator};
pub use web::{WebValidationResult, WebValidator};
