//! S1 Extraction
//!
//! Calls the `taxonomy.extract` prompt once per source record with bounded
//! concurrency, preserving record order in the output. Record-local failures
//! (schema violations after repair, permanent provider errors) quarantine
//! the record and the stream continues.

use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::llm::LlmClient;
use crate::types::{Result, SourceRecord, TaxonomyError};

/// Concurrent in-flight extraction calls per level.
const EXTRACTION_CONCURRENCY: usize = 4;

/// One raw candidate as returned by the extraction prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    pub label: String,
    pub normalized: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub parents: Vec<String>,
}

/// A raw candidate tied back to the record it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedCandidate {
    pub record_index: usize,
    pub raw: RawCandidate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionMetrics {
    pub records_in: u64,
    pub candidates_out: u64,
    pub invalid_json: u64,
    pub provider_errors: u64,
    pub quarantined: u64,
}

pub struct ExtractionProcessor {
    client: Arc<LlmClient>,
    pub metrics: ExtractionMetrics,
    /// `(record_index, reason, detail)` for observability quarantine.
    pub quarantined: Vec<(usize, &'static str, String)>,
}

impl ExtractionProcessor {
    pub fn new(client: Arc<LlmClient>) -> Self {
        Self {
            client,
            metrics: ExtractionMetrics::default(),
            quarantined: Vec::new(),
        }
    }

    /// Extract raw candidates for every record at `level`.
    pub async fn extract_candidates(
        &mut self,
        records: &[SourceRecord],
        level: u8,
    ) -> Result<Vec<ExtractedCandidate>> {
        self.metrics.records_in += records.len() as u64;

        let client = Arc::clone(&self.client);
        let requests: Vec<(usize, serde_json::Value)> = records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                (
                    index,
                    json!({
                        "institution": record.provenance.institution,
                        "level": level,
                        "source_text": record.text,
                    }),
                )
            })
            .collect();
        let calls = futures::stream::iter(requests.into_iter().map(|(index, variables)| {
            let client = Arc::clone(&client);
            async move {
                let outcome = client.run("taxonomy.extract", &variables).await;
                (index, outcome)
            }
            .boxed()
        }))
        .buffered(EXTRACTION_CONCURRENCY)
        .collect::<Vec<_>>()
        .await;

        let mut extracted = Vec::new();
        for (index, outcome) in calls {
            let outcome = outcome.and_then(|response| {
                serde_json::from_value::<Vec<RawCandidate>>(response.content).map_err(|e| {
                    TaxonomyError::SchemaViolation {
                        prompt: "taxonomy.extract".into(),
                        detail: e.to_string(),
                    }
                })
            });
            match outcome {
                Ok(raw) => {
                    self.metrics.candidates_out += raw.len() as u64;
                    extracted.extend(
                        raw.into_iter()
                            .map(|raw| ExtractedCandidate { record_index: index, raw }),
                    );
                }
                Err(err) if err.is_record_local() => {
                    match &err {
                        TaxonomyError::SchemaViolation { .. } => self.metrics.invalid_json += 1,
                        TaxonomyError::Provider { .. } => self.metrics.provider_errors += 1,
                        _ => {}
                    }
                    self.metrics.quarantined += 1;
                    self.quarantined
                        .push((index, err.quarantine_reason(), err.to_string()));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(extracted)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmPolicy;
    use crate::llm::{CallbackProvider, PromptRegistry, ProviderResponse};
    use crate::types::{Provenance, ProviderErrorKind};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn record(text: &str) -> SourceRecord {
        SourceRecord::new(
            text,
            Provenance::new("Example University", "https://example.edu/departments"),
        )
    }

    fn client_from(
        callback: impl Fn(&str) -> crate::types::Result<ProviderResponse> + Send + Sync + 'static,
    ) -> Arc<LlmClient> {
        let mut policy = LlmPolicy::default();
        policy.retry_attempts = 0;
        policy.retry_backoff_seconds = 0.0;
        let provider = Arc::new(CallbackProvider::new("mock", move |prompt, _| callback(prompt)));
        Arc::new(LlmClient::new(
            policy,
            Arc::new(PromptRegistry::builtin()),
            provider,
        ))
    }

    #[tokio::test]
    async fn extraction_calls_prompt_per_record() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let client = client_from(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderResponse::from_content(
                r#"[{"label": "Department of Computer Science", "normalized": "computer science",
                     "aliases": ["CS"], "parents": ["College of Engineering"]}]"#,
            ))
        });
        let mut extractor = ExtractionProcessor::new(client);

        let records = vec![
            record("Department of Computer Science (CS)"),
            record("Department of Computer Science"),
        ];
        let extracted = extractor.extract_candidates(&records, 1).await.unwrap();

        assert_eq!(extracted.len(), 2);
        assert_eq!(extractor.metrics.records_in, 2);
        assert_eq!(extractor.metrics.candidates_out, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(extracted[0].record_index, 0);
        assert_eq!(extracted[1].record_index, 1);
    }

    #[tokio::test]
    async fn permanent_failures_quarantine_the_record() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&calls);
        let client = client_from(move |_| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(crate::types::TaxonomyError::provider(
                    ProviderErrorKind::Permanent,
                    "401",
                ))
            } else {
                Ok(ProviderResponse::from_content(
                    r#"[{"label": "Robotics", "normalized": "robotics", "aliases": [], "parents": []}]"#,
                ))
            }
        });
        let mut extractor = ExtractionProcessor::new(client);

        let records = vec![record("first"), record("second")];
        let extracted = extractor.extract_candidates(&records, 2).await.unwrap();

        assert_eq!(extracted.len(), 1);
        assert_eq!(extractor.metrics.quarantined, 1);
        assert_eq!(extractor.metrics.provider_errors, 1);
        assert_eq!(extractor.quarantined[0].1, "provider_error");
    }
}
