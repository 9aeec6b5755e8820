//! Evidence Indexing
//!
//! In-memory index over crawled `PageSnapshot`s used by web validation.
//! Extracts bounded snippets around label mentions and scores source
//! authority: 1.0 for configured authoritative domains, 0.5 otherwise.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ValidationPolicy;
use crate::types::PageSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSnippet {
    pub text: String,
    pub url: String,
    pub institution: String,
    pub authority: f64,
}

pub struct EvidenceIndexer {
    policy: ValidationPolicy,
    snapshots: Vec<PageSnapshot>,
}

impl EvidenceIndexer {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self {
            policy,
            snapshots: Vec::new(),
        }
    }

    pub fn build_index(&mut self, snapshots: &[PageSnapshot]) {
        self.snapshots = snapshots.to_vec();
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// 1.0 for authoritative domains, 0.5 otherwise.
    pub fn assess_authority(&self, snapshot: &PageSnapshot) -> f64 {
        let host = Url::parse(&snapshot.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase));
        match host {
            Some(host) => {
                let authoritative = self
                    .policy
                    .web
                    .authoritative_domains
                    .iter()
                    .any(|domain| {
                        let domain = domain.to_lowercase();
                        host == domain || host.ends_with(&format!(".{domain}"))
                    });
                if authoritative { 1.0 } else { 0.5 }
            }
            None => 0.5,
        }
    }

    /// Search every indexed snapshot for the phrase, bounded by the policy's
    /// snippet length.
    pub fn search(&self, phrase: &str) -> Vec<EvidenceSnippet> {
        let max_length = self.policy.web.snippet_max_length;
        let mut snippets = Vec::new();
        for snapshot in &self.snapshots {
            snippets.extend(self.extract_snippets(snapshot, phrase, max_length));
        }
        snippets
    }

    /// Extract snippets around each occurrence of `phrase`, each at most
    /// `max_length` characters plus word-boundary slack.
    pub fn extract_snippets(
        &self,
        snapshot: &PageSnapshot,
        phrase: &str,
        max_length: usize,
    ) -> Vec<EvidenceSnippet> {
        let haystack: Vec<char> = snapshot.text.chars().collect();
        let haystack_lower: String = snapshot.text.to_lowercase();
        let needle = phrase.to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let lower_chars: Vec<char> = haystack_lower.chars().collect();
        let needle_chars: Vec<char> = needle.chars().collect();
        let authority = self.assess_authority(snapshot);

        let mut snippets = Vec::new();
        let mut cursor = 0usize;
        while cursor + needle_chars.len() <= lower_chars.len() {
            if lower_chars[cursor..cursor + needle_chars.len()] == needle_chars[..] {
                let context = max_length.saturating_sub(needle_chars.len()) / 2;
                let start = cursor.saturating_sub(context);
                let end = (cursor + needle_chars.len() + context).min(haystack.len());
                let text: String = haystack[start..end].iter().collect();
                snippets.push(EvidenceSnippet {
                    text: text.trim().to_string(),
                    url: snapshot.url.clone(),
                    institution: snapshot.institution.clone(),
                    authority,
                });
                cursor += needle_chars.len().max(1);
            } else {
                cursor += 1;
            }
        }
        snippets
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn snapshot(text: &str, url: &str) -> PageSnapshot {
        PageSnapshot {
            institution: "Example University".into(),
            url: url.into(),
            canonical_url: url.into(),
            fetched_at: Utc::now(),
            http_status: 200,
            content_type: "text/html".into(),
            html: None,
            text: text.into(),
            lang: "en".into(),
            checksum: PageSnapshot::compute_checksum(text),
            meta: BTreeMap::new(),
        }
    }

    #[test]
    fn authority_respects_policy_domains() {
        let mut policy = ValidationPolicy::default();
        policy.web.authoritative_domains = vec!["example.edu".into()];
        let mut indexer = EvidenceIndexer::new(policy);
        let authoritative = snapshot("text about robotics", "https://example.edu/robotics");
        let other = snapshot("text about robotics", "https://blog.example.com/robotics");
        indexer.build_index(&[authoritative.clone(), other.clone()]);

        assert_eq!(indexer.assess_authority(&authoritative), 1.0);
        assert_eq!(indexer.assess_authority(&other), 0.5);
    }

    #[test]
    fn subdomains_of_authoritative_domains_count() {
        let mut policy = ValidationPolicy::default();
        policy.web.authoritative_domains = vec!["example.edu".into()];
        let indexer = EvidenceIndexer::new(policy);
        let snap = snapshot("robotics", "https://cs.example.edu/robotics");
        assert_eq!(indexer.assess_authority(&snap), 1.0);
    }

    #[test]
    fn snippets_respect_length_limit() {
        let indexer = EvidenceIndexer::new(ValidationPolicy::default());
        let long_text = "AI ".repeat(200) + "applied robotics" + &" AI".repeat(200);
        let snap = snapshot(&long_text, "https://example.edu/programs");

        let snippets = indexer.extract_snippets(&snap, "applied robotics", 100);
        assert!(!snippets.is_empty());
        assert!(snippets.iter().all(|s| s.text.chars().count() <= 120));
        assert!(snippets.iter().all(|s| s.text.contains("applied robotics")));
    }

    #[test]
    fn search_finds_mentions_case_insensitively() {
        let mut indexer = EvidenceIndexer::new(ValidationPolicy::default());
        indexer.build_index(&[snapshot(
            "Our Applied Data Science program focuses on modern methods.",
            "https://example.edu/programs",
        )]);
        let snippets = indexer.search("applied data science");
        assert_eq!(snippets.len(), 1);
        assert!(snippets[0].text.contains("Applied Data Science"));
    }
}
