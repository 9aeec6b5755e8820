//! Configuration: run settings, the policy document, and the layered loader.

pub mod loader;
pub mod policies;
pub mod settings;

pub use loader::{POLICY_ENV_PREFIX, SETTINGS_ENV_PREFIX, SettingsLoader, load_settings};
pub use policies::{
    DeduplicationPolicy, DeduplicationThresholds, DisambiguationPolicy, EvidenceStorageSettings,
    FrequencyFilteringPolicy, HierarchyPolicy, InstitutionPolicy, LabelPolicy, LevelThreshold,
    LevelThresholds, LlmPolicy, LlmValidationSettings, MinimalCanonicalForm, NearDuplicatePolicy,
    ObservabilityPolicy, Policies, RawExtractionPolicy, RegistrySettings, RepairSettings,
    RuleValidationSettings, SingleTokenPolicy, ValidationAggregationSettings, ValidationPolicy,
    WebValidationSettings,
};
pub use settings::{Environment, Paths, Settings};
