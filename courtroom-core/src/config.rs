//! Case configuration: gate schedules, trial trigger points and the
//! on-disk file manifest for every supported case length.
//!
//! A [`CaseConfig`] is immutable once built. The composition root owns a
//! [`ConfigRegistry`], which loads the configuration once and hands out the
//! same [`Arc`] to every caller.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from configuration lookups and loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown case length: {0}")]
    UnknownLength(CaseLength),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Number of narrative days a case spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseLength(u8);

impl CaseLength {
    pub const fn new(days: u8) -> Self {
        Self(days)
    }

    pub fn days(self) -> u8 {
        self.0
    }
}

impl From<u8> for CaseLength {
    fn from(days: u8) -> Self {
        Self(days)
    }
}

impl fmt::Display for CaseLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which half of the case a gate belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Investigation,
    Trial,
    Unknown,
}

impl GateKind {
    pub fn name(&self) -> &'static str {
        match self {
            GateKind::Investigation => "investigation",
            GateKind::Trial => "trial",
            GateKind::Unknown => "unknown",
        }
    }
}

/// Schedule and pacing for one case length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LengthConfig {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Ordered gate schedule.
    pub gates: Vec<String>,

    /// Investigation gates that must be completed before the trial may begin.
    pub trial_trigger_point: usize,

    #[serde(default = "unknown_estimate")]
    pub estimated_time: String,
}

fn unknown_estimate() -> String {
    "unknown".to_string()
}

/// Names of the two structural gates every schedule must contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateMarkers {
    pub trial_opening: String,
    pub terminal: String,
}

impl Default for GateMarkers {
    fn default() -> Self {
        Self {
            trial_opening: "trial_opening".to_string(),
            terminal: "final_revelation".to_string(),
        }
    }
}

/// Required and optional case artifacts, keyed by directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileManifest {
    #[serde(default)]
    pub mandatory_files: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub optional_files: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateRules {
    #[serde(default = "default_min_gates")]
    pub min_gates_per_case: usize,

    #[serde(default = "default_max_gates")]
    pub max_gates_per_case: usize,
}

fn default_min_gates() -> usize {
    3
}

fn default_max_gates() -> usize {
    10
}

impl Default for GateRules {
    fn default() -> Self {
        Self {
            min_gates_per_case: default_min_gates(),
            max_gates_per_case: default_max_gates(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspirationRules {
    #[serde(default = "default_words_per_category")]
    pub words_per_category: usize,
}

fn default_words_per_category() -> usize {
    10
}

impl Default for InspirationRules {
    fn default() -> Self {
        Self {
            words_per_category: default_words_per_category(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRules {
    #[serde(default)]
    pub gate_structure: GateRules,

    #[serde(default)]
    pub inspiration_pool: InspirationRules,
}

/// Outcome of a structural validation: issues are errors, warnings are not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// The complete case configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseConfig {
    pub case_lengths: BTreeMap<CaseLength, LengthConfig>,

    pub default_length: CaseLength,

    #[serde(default)]
    pub gate_markers: GateMarkers,

    #[serde(default)]
    pub case_structure_requirements: FileManifest,

    #[serde(default)]
    pub inspiration_categories: Vec<String>,

    #[serde(default)]
    pub validation_rules: ValidationRules,
}

impl CaseConfig {
    /// The reference configuration compiled into the crate.
    pub fn builtin() -> Self {
        let length = |name: &str, description: &str, gates: &[&str], trigger: usize, time: &str| {
            LengthConfig {
                name: name.to_string(),
                description: description.to_string(),
                gates: gates.iter().map(|g| g.to_string()).collect(),
                trial_trigger_point: trigger,
                estimated_time: time.to_string(),
            }
        };
        let files = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();

        let mut case_lengths = BTreeMap::new();
        case_lengths.insert(
            CaseLength::new(1),
            length(
                "1-day case",
                "Trial only, no investigation phase",
                &["trial_opening", "first_witness_battle", "final_revelation"],
                0,
                "30-45 minutes",
            ),
        );
        case_lengths.insert(
            CaseLength::new(2),
            length(
                "2-day case",
                "One investigation day followed by the trial",
                &[
                    "investigation_start",
                    "trial_opening",
                    "witness_confrontation",
                    "final_revelation",
                ],
                1,
                "60-90 minutes",
            ),
        );
        case_lengths.insert(
            CaseLength::new(3),
            length(
                "3-day case",
                "Full investigation and multi-day trial",
                &[
                    "crime_scene_analysis",
                    "witness_interviews",
                    "evidence_breakthrough",
                    "trial_opening",
                    "cross_examination_battle",
                    "final_revelation",
                ],
                3,
                "2-3 hours",
            ),
        );

        let mut mandatory_files = BTreeMap::new();
        mandatory_files.insert(
            "backbone".to_string(),
            files(&[
                "case_structure.json",
                "character_facts.json",
                "evidence_chain.json",
                "truth_timeline.json",
                "witness_testimonies.json",
                "trial_structure.json",
            ]),
        );
        mandatory_files.insert(
            "game_state".to_string(),
            files(&["investigation_progress.json", "trial_progress.json"]),
        );

        let mut optional_files = BTreeMap::new();
        optional_files.insert("evidence".to_string(), Vec::new());
        optional_files.insert("narrative_saves".to_string(), Vec::new());
        optional_files.insert("obstacles".to_string(), Vec::new());
        optional_files.insert("saves".to_string(), Vec::new());
        optional_files.insert(
            "solution".to_string(),
            files(&[
                "evidence_requirements.json",
                "character_behaviors.json",
                "integrated_case.json",
            ]),
        );

        Self {
            case_lengths,
            default_length: CaseLength::new(2),
            gate_markers: GateMarkers::default(),
            case_structure_requirements: FileManifest {
                mandatory_files,
                optional_files,
            },
            inspiration_categories: files(&[
                "character_motivations",
                "relationship_dynamics",
                "evidence_obstacles",
                "witness_behaviors",
                "courtroom_tactics",
                "setting_details",
            ]),
            validation_rules: ValidationRules::default(),
        }
    }

    /// Parse and validate a configuration document.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Check the schedule invariants every consumer relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.case_lengths.is_empty() {
            return Err(ConfigError::Invalid("no case lengths configured".into()));
        }
        if !self.case_lengths.contains_key(&self.default_length) {
            return Err(ConfigError::Invalid(format!(
                "default length {} is not configured",
                self.default_length
            )));
        }

        let markers = &self.gate_markers;
        let mut previous: Option<(CaseLength, &LengthConfig)> = None;

        for (&length, config) in &self.case_lengths {
            let openings = config
                .gates
                .iter()
                .filter(|g| **g == markers.trial_opening)
                .count();
            if openings != 1 {
                return Err(ConfigError::Invalid(format!(
                    "{length}-day schedule must contain exactly one '{}' gate, found {openings}",
                    markers.trial_opening
                )));
            }
            if config.gates.last() != Some(&markers.terminal) {
                return Err(ConfigError::Invalid(format!(
                    "{length}-day schedule must end with '{}'",
                    markers.terminal
                )));
            }
            let opening_index = config
                .gates
                .iter()
                .position(|g| *g == markers.trial_opening)
                .unwrap_or(0);
            if config.trial_trigger_point > opening_index {
                return Err(ConfigError::Invalid(format!(
                    "{length}-day trial trigger {} exceeds its {opening_index} investigation gates",
                    config.trial_trigger_point
                )));
            }

            if let Some((prev_length, prev)) = previous {
                if config.gates.len() <= prev.gates.len() {
                    return Err(ConfigError::Invalid(format!(
                        "{length}-day schedule must be longer than the {prev_length}-day schedule"
                    )));
                }
                if config.trial_trigger_point < prev.trial_trigger_point {
                    return Err(ConfigError::Invalid(format!(
                        "{length}-day trial trigger must not be below the {prev_length}-day trigger"
                    )));
                }
            }
            previous = Some((length, config));
        }

        Ok(())
    }

    // =========================================================================
    // Case Lengths
    // =========================================================================

    /// Configured lengths in ascending order.
    pub fn lengths(&self) -> impl Iterator<Item = CaseLength> + '_ {
        self.case_lengths.keys().copied()
    }

    pub fn default_length(&self) -> CaseLength {
        self.default_length
    }

    pub fn length_config(&self, length: CaseLength) -> Result<&LengthConfig, ConfigError> {
        self.case_lengths
            .get(&length)
            .ok_or(ConfigError::UnknownLength(length))
    }

    /// Gate schedule for a case length.
    pub fn gates_for_length(&self, length: CaseLength) -> Result<&[String], ConfigError> {
        self.length_config(length).map(|c| c.gates.as_slice())
    }

    /// Gate schedule for a case length, or an empty schedule if unknown.
    pub fn gates_for_length_or_empty(&self, length: CaseLength) -> &[String] {
        match self.gates_for_length(length) {
            Ok(gates) => gates,
            Err(e) => {
                warn!(error = %e, "no gate schedule, using empty schedule");
                &[]
            }
        }
    }

    pub fn try_trial_trigger_point(&self, length: CaseLength) -> Result<usize, ConfigError> {
        self.length_config(length).map(|c| c.trial_trigger_point)
    }

    /// Trial trigger point, failing open to zero for unknown lengths.
    pub fn trial_trigger_point(&self, length: CaseLength) -> usize {
        self.try_trial_trigger_point(length).unwrap_or_else(|e| {
            warn!(error = %e, "no trial trigger point, allowing trial immediately");
            0
        })
    }

    /// Number of gates before the trial-opening gate.
    pub fn investigation_gate_count(&self, length: CaseLength) -> usize {
        self.gates_for_length_or_empty(length)
            .iter()
            .position(|g| *g == self.gate_markers.trial_opening)
            .unwrap_or(0)
    }

    /// Classify a gate list into the case length whose schedule shares the
    /// most gate names. Ties go to the smaller length; no overlap at all
    /// yields the default length.
    pub fn detect_length_from_gates<S: AsRef<str>>(&self, gates: &[S]) -> CaseLength {
        let given: HashSet<&str> = gates.iter().map(|g| g.as_ref()).collect();

        let mut best: Option<(CaseLength, usize)> = None;
        for (&length, config) in &self.case_lengths {
            let overlap = config
                .gates
                .iter()
                .filter(|g| given.contains(g.as_str()))
                .count();
            if overlap > best.map_or(0, |(_, o)| o) {
                best = Some((length, overlap));
            }
        }

        match best {
            Some((length, overlap)) => {
                debug!(%length, overlap, "detected case length from gates");
                length
            }
            None => self.default_length,
        }
    }

    // =========================================================================
    // Gate Classification
    // =========================================================================

    pub fn trial_opening_gate(&self) -> &str {
        &self.gate_markers.trial_opening
    }

    pub fn terminal_gate(&self) -> &str {
        &self.gate_markers.terminal
    }

    /// Classify a gate by its position relative to the trial-opening gate in
    /// the first schedule that contains it.
    pub fn classify_gate(&self, gate: &str) -> GateKind {
        for config in self.case_lengths.values() {
            let Some(position) = config.gates.iter().position(|g| g == gate) else {
                continue;
            };
            let opening = config
                .gates
                .iter()
                .position(|g| *g == self.gate_markers.trial_opening)
                .unwrap_or(0);
            return if position < opening {
                GateKind::Investigation
            } else {
                GateKind::Trial
            };
        }
        GateKind::Unknown
    }

    pub fn is_investigation_gate(&self, gate: &str) -> bool {
        self.classify_gate(gate) == GateKind::Investigation
    }

    pub fn is_trial_gate(&self, gate: &str) -> bool {
        self.classify_gate(gate) == GateKind::Trial
    }

    /// Check an arbitrary gate list against the gate-structure rules.
    pub fn validate_gate_structure<S: AsRef<str>>(&self, gates: &[S]) -> ValidationReport {
        let rules = &self.validation_rules.gate_structure;
        let mut report = ValidationReport::default();

        if gates.len() > rules.max_gates_per_case {
            report.issues.push(format!(
                "Too many gates: {} > {}",
                gates.len(),
                rules.max_gates_per_case
            ));
        }
        if gates.len() < rules.min_gates_per_case {
            report.issues.push(format!(
                "Too few gates: {} < {}",
                gates.len(),
                rules.min_gates_per_case
            ));
        }

        let kinds: HashSet<GateKind> = gates
            .iter()
            .map(|g| self.classify_gate(g.as_ref()))
            .collect();
        // Cases whose trial starts immediately have no investigation gates.
        let detected = self.detect_length_from_gates(gates);
        if self.trial_trigger_point(detected) > 0 && !kinds.contains(&GateKind::Investigation) {
            report.issues.push(format!(
                "Missing required gate type: {}",
                GateKind::Investigation.name()
            ));
        }
        if !kinds.contains(&GateKind::Trial) {
            report
                .issues
                .push(format!("Missing required gate type: {}", GateKind::Trial.name()));
        }

        for gate in gates {
            if self.classify_gate(gate.as_ref()) == GateKind::Unknown {
                report
                    .warnings
                    .push(format!("Unrecognized gate: {}", gate.as_ref()));
            }
        }

        report
    }

    // =========================================================================
    // File Structure
    // =========================================================================

    pub fn mandatory_files(&self) -> &BTreeMap<String, Vec<String>> {
        &self.case_structure_requirements.mandatory_files
    }

    pub fn optional_files(&self) -> &BTreeMap<String, Vec<String>> {
        &self.case_structure_requirements.optional_files
    }

    /// Every directory named by the mandatory or optional manifest.
    pub fn required_directories(&self) -> Vec<String> {
        self.mandatory_files()
            .keys()
            .chain(self.optional_files().keys())
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Compare a case directory against the file manifest.
    pub async fn validate_case_structure(&self, case_dir: impl AsRef<Path>) -> ValidationReport {
        let case_dir = case_dir.as_ref();
        let mut report = ValidationReport::default();

        for (directory, files) in self.mandatory_files() {
            let dir_path = case_dir.join(directory);
            if !tokio::fs::try_exists(&dir_path).await.unwrap_or(false) {
                report
                    .issues
                    .push(format!("Missing mandatory directory: {directory}"));
                continue;
            }
            for file in files {
                if !tokio::fs::try_exists(dir_path.join(file)).await.unwrap_or(false) {
                    report
                        .issues
                        .push(format!("Missing mandatory file: {directory}/{file}"));
                }
            }
        }

        for directory in self.optional_files().keys() {
            if !tokio::fs::try_exists(case_dir.join(directory)).await.unwrap_or(false) {
                report
                    .warnings
                    .push(format!("Optional directory not found: {directory}"));
            }
        }

        report
    }

    // =========================================================================
    // Inspiration
    // =========================================================================

    pub fn inspiration_categories(&self) -> &[String] {
        &self.inspiration_categories
    }

    pub fn words_per_category(&self) -> usize {
        self.validation_rules.inspiration_pool.words_per_category
    }

    /// One-line description of each configured length.
    pub fn case_length_summary(&self) -> BTreeMap<CaseLength, String> {
        self.case_lengths
            .iter()
            .map(|(&length, c)| {
                let line = if c.description.is_empty() {
                    format!("{}: {} gates, {}", c.name, c.gates.len(), c.estimated_time)
                } else {
                    format!(
                        "{}: {} gates, {} ({})",
                        c.name,
                        c.gates.len(),
                        c.estimated_time,
                        c.description
                    )
                };
                (length, line)
            })
            .collect()
    }
}

/// Where the case configuration is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Builtin,
    File(PathBuf),
}

/// Loads the case configuration once and shares it by reference.
#[derive(Debug)]
pub struct ConfigRegistry {
    source: ConfigSource,
    loaded: OnceCell<Arc<CaseConfig>>,
}

impl ConfigRegistry {
    pub fn new(source: ConfigSource) -> Self {
        Self {
            source,
            loaded: OnceCell::new(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(ConfigSource::Builtin)
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(ConfigSource::File(path.into()))
    }

    pub fn source(&self) -> &ConfigSource {
        &self.source
    }

    /// The shared configuration. Every call returns the same instance.
    pub fn get(&self) -> Arc<CaseConfig> {
        Arc::clone(self.loaded.get_or_init(|| Arc::new(self.load_or_builtin())))
    }

    /// Read the configuration source without any fallback.
    pub fn try_load(&self) -> Result<CaseConfig, ConfigError> {
        match &self.source {
            ConfigSource::Builtin => Ok(CaseConfig::builtin()),
            ConfigSource::File(path) => CaseConfig::from_path(path),
        }
    }

    fn load_or_builtin(&self) -> CaseConfig {
        match self.try_load() {
            Ok(config) => {
                debug!(source = ?self.source, "loaded case configuration");
                config
            }
            Err(e) => {
                warn!(source = ?self.source, error = %e, "falling back to built-in case configuration");
                CaseConfig::builtin()
            }
        }
    }
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn len(days: u8) -> CaseLength {
        CaseLength::new(days)
    }

    #[test]
    fn test_builtin_is_valid() {
        CaseConfig::builtin().validate().unwrap();
    }

    #[test]
    fn test_schedule_lengths_strictly_increase() {
        let config = CaseConfig::builtin();
        let sizes: Vec<usize> = config
            .lengths()
            .map(|l| config.gates_for_length(l).unwrap().len())
            .collect();
        assert!(sizes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_trigger_points_within_bounds() {
        let config = CaseConfig::builtin();
        let mut previous = 0;
        for length in config.lengths() {
            let trigger = config.trial_trigger_point(length);
            assert!(trigger <= config.gates_for_length(length).unwrap().len());
            assert!(trigger >= previous);
            previous = trigger;
        }
    }

    #[test]
    fn test_one_day_case() {
        let config = CaseConfig::builtin();
        let gates = config.gates_for_length(len(1)).unwrap();
        assert_eq!(gates.len(), 3);
        assert_eq!(gates.iter().filter(|g| *g == "trial_opening").count(), 1);
        assert_eq!(gates.last().unwrap(), "final_revelation");
        assert_eq!(config.trial_trigger_point(len(1)), 0);
    }

    #[test]
    fn test_three_day_case() {
        let config = CaseConfig::builtin();
        assert_eq!(config.gates_for_length(len(3)).unwrap().len(), 6);
        assert_eq!(config.trial_trigger_point(len(3)), 3);
        assert_eq!(config.investigation_gate_count(len(3)), 3);
    }

    #[test]
    fn test_unknown_length() {
        let config = CaseConfig::builtin();
        assert!(matches!(
            config.gates_for_length(len(5)),
            Err(ConfigError::UnknownLength(l)) if l == len(5)
        ));
        assert!(config.gates_for_length_or_empty(len(5)).is_empty());
        assert_eq!(config.trial_trigger_point(len(5)), 0);
        assert!(config.try_trial_trigger_point(len(5)).is_err());
    }

    #[test]
    fn test_detect_exact_schedules() {
        let config = CaseConfig::builtin();
        for length in config.lengths() {
            let gates = config.gates_for_length(length).unwrap();
            assert_eq!(config.detect_length_from_gates(gates), length);
        }
    }

    #[test]
    fn test_detect_partial_and_unordered() {
        let config = CaseConfig::builtin();
        let gates = [
            "final_revelation",
            "witness_interviews",
            "trial_opening",
            "crime_scene_analysis",
            "cross_examination_battle",
        ];
        assert_eq!(config.detect_length_from_gates(&gates), len(3));
    }

    #[test]
    fn test_detect_defaults() {
        let config = CaseConfig::builtin();
        let empty: &[&str] = &[];
        assert_eq!(config.detect_length_from_gates(empty), len(2));
        assert_eq!(
            config.detect_length_from_gates(&["unknown_gate1", "unknown_gate2"]),
            len(2)
        );
    }

    #[test]
    fn test_detect_tie_prefers_smaller_length() {
        let config = CaseConfig::builtin();
        assert_eq!(
            config.detect_length_from_gates(&["trial_opening", "final_revelation"]),
            len(1)
        );
    }

    #[test]
    fn test_classify_gate() {
        let config = CaseConfig::builtin();
        assert_eq!(config.classify_gate("investigation_start"), GateKind::Investigation);
        assert_eq!(config.classify_gate("trial_opening"), GateKind::Trial);
        assert_eq!(config.classify_gate("final_revelation"), GateKind::Trial);
        assert_eq!(config.classify_gate("lunch_break"), GateKind::Unknown);
        assert!(config.is_investigation_gate("evidence_breakthrough"));
        assert!(config.is_trial_gate("cross_examination_battle"));
    }

    #[test]
    fn test_validate_gate_structure() {
        let config = CaseConfig::builtin();
        for length in config.lengths() {
            let report = config.validate_gate_structure(config.gates_for_length(length).unwrap());
            assert!(report.is_valid(), "{length}: {:?}", report.issues);
        }

        let report = config.validate_gate_structure(&["investigation_start"]);
        assert!(!report.is_valid());
        assert!(report.issues.iter().any(|i| i.contains("Too few gates")));
        assert!(report.issues.iter().any(|i| i.contains("trial")));
    }

    #[test]
    fn test_file_manifest() {
        let config = CaseConfig::builtin();
        let game_state = &config.mandatory_files()["game_state"];
        assert!(game_state.contains(&"investigation_progress.json".to_string()));
        assert!(game_state.contains(&"trial_progress.json".to_string()));
        assert!(config.optional_files().contains_key("saves"));
        assert!(config.optional_files().contains_key("evidence"));
        assert!(config.required_directories().contains(&"backbone".to_string()));
    }

    #[test]
    fn test_inspiration_settings() {
        let config = CaseConfig::builtin();
        for category in [
            "character_motivations",
            "relationship_dynamics",
            "evidence_obstacles",
            "witness_behaviors",
        ] {
            assert!(config.inspiration_categories().iter().any(|c| c == category));
        }
        assert_eq!(config.words_per_category(), 10);
    }

    #[test]
    fn test_json_round_trip_keeps_length_keys() {
        let config = CaseConfig::builtin();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"1\":"));
        let parsed = CaseConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_rejects_schedule_without_terminal_gate() {
        let mut config = CaseConfig::builtin();
        config
            .case_lengths
            .get_mut(&len(2))
            .unwrap()
            .gates
            .pop();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_shrinking_schedule() {
        let mut config = CaseConfig::builtin();
        let two = config.case_lengths[&len(2)].clone();
        config.case_lengths.insert(len(4), two);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_registry_shares_one_instance() {
        let registry = ConfigRegistry::builtin();
        let a = registry.get();
        let b = registry.get();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_registry_falls_back_on_missing_file() {
        let registry = ConfigRegistry::from_path("/nonexistent/case_patterns.json");
        assert!(registry.try_load().is_err());
        assert_eq!(*registry.get(), CaseConfig::builtin());
    }

    #[test]
    fn test_registry_falls_back_on_malformed_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("case_patterns.json");
        std::fs::write(&path, "{ \"case_lengths\": [").unwrap();

        let registry = ConfigRegistry::from_path(&path);
        assert!(matches!(registry.try_load(), Err(ConfigError::Json(_))));
        assert_eq!(*registry.get(), CaseConfig::builtin());
    }

    #[test]
    fn test_registry_falls_back_on_invalid_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("case_patterns.json");
        let mut config = CaseConfig::builtin();
        config.default_length = len(9);
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let registry = ConfigRegistry::from_path(&path);
        assert!(matches!(registry.try_load(), Err(ConfigError::Invalid(_))));
        let loaded = registry.get();
        assert_eq!(loaded.default_length(), len(2));
        assert_eq!(*loaded, CaseConfig::builtin());
    }

    #[test]
    fn test_registry_reads_valid_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("case_patterns.json");
        let mut config = CaseConfig::builtin();
        config.default_length = len(3);
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let registry = ConfigRegistry::from_path(&path);
        assert_eq!(registry.get().default_length(), len(3));
    }

    #[test]
    fn test_case_length_summary() {
        let summary = CaseConfig::builtin().case_length_summary();
        assert!(summary[&len(3)].contains("6 gates"));
    }
}
