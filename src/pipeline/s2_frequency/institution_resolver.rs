//! Institution Identity Resolution
//!
//! Maps raw institution strings to canonical identities through the policy's
//! `canonical_mappings`, then applies the campus-vs-system rule:
//! `prefer-system` folds "University of X, Campus" into "University of X",
//! `prefer-campus` keeps campus identities distinct.

use crate::config::InstitutionPolicy;

pub struct InstitutionResolver {
    policy: InstitutionPolicy,
}

impl InstitutionResolver {
    pub fn new(policy: InstitutionPolicy) -> Self {
        Self { policy }
    }

    /// Resolve one raw institution string to its canonical identity.
    pub fn resolve_identity(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return String::new();
        }
        if let Some(canonical) = self.policy.canonical_mappings.get(&trimmed.to_lowercase()) {
            return canonical.clone();
        }
        if self.policy.campus_vs_system == "prefer-system"
            && let Some((system, _campus)) = trimmed.split_once(',')
        {
            let system = system.trim();
            if let Some(canonical) = self.policy.canonical_mappings.get(&system.to_lowercase()) {
                return canonical.clone();
            }
            return system.to_string();
        }
        trimmed.to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn canonical_mappings_and_system_folding() {
        let policy = InstitutionPolicy {
            campus_vs_system: "prefer-system".into(),
            canonical_mappings: BTreeMap::from([
                (
                    "mit".to_string(),
                    "Massachusetts Institute of Technology".to_string(),
                ),
                (
                    "massachusetts institute of technology".to_string(),
                    "Massachusetts Institute of Technology".to_string(),
                ),
            ]),
        };
        let resolver = InstitutionResolver::new(policy);

        assert_eq!(
            resolver.resolve_identity("MIT"),
            "Massachusetts Institute of Technology"
        );
        assert_eq!(
            resolver.resolve_identity("Massachusetts Institute of Technology"),
            "Massachusetts Institute of Technology"
        );
        assert_eq!(
            resolver.resolve_identity("University of California, Berkeley"),
            "University of California"
        );
    }

    #[test]
    fn prefer_campus_keeps_campus_identities() {
        let resolver = InstitutionResolver::new(InstitutionPolicy::default());
        assert_eq!(
            resolver.resolve_identity("University of California, Berkeley"),
            "University of California, Berkeley"
        );
    }

    #[test]
    fn empty_input_resolves_to_empty() {
        let resolver = InstitutionResolver::new(InstitutionPolicy::default());
        assert_eq!(resolver.resolve_identity("   "), "");
    }
}
