//! Investigation and trial progress records.
//!
//! These mirror the JSON files under `game_state/`. Keys this crate does not
//! know about are kept in `extra`, so a record read and written back is
//! unchanged apart from the fields that were deliberately edited.

use crate::config::CaseLength;
use crate::persist::{self, CaseFiles, PersistError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Default trust for characters the player has not dealt with yet.
pub const DEFAULT_TRUST: i32 = 5;

pub const MIN_TRUST: i32 = 0;
pub const MAX_TRUST: i32 = 10;

/// Phase of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Briefing,
    Investigation,
    Trial,
    Resolved,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Briefing => "briefing",
            Phase::Investigation => "investigation",
            Phase::Trial => "trial",
            Phase::Resolved => "resolved",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Status of a single gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

/// A piece of evidence the player has collected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Gate that was active when the evidence turned up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_at: Option<String>,
}

impl EvidenceItem {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            discovered_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationNote {
    pub note: String,
    pub gate: String,
}

/// How a character currently regards the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Hostile,
    Neutral,
    Friendly,
}

impl Disposition {
    pub fn from_trust(trust: i32) -> Self {
        if trust <= 3 {
            Disposition::Hostile
        } else if trust <= 6 {
            Disposition::Neutral
        } else {
            Disposition::Friendly
        }
    }
}

/// The investigation progress record (`investigation_progress.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvestigationProgress {
    #[serde(default)]
    pub investigation_gates: BTreeMap<String, GateStatus>,

    #[serde(default)]
    pub current_phase: Phase,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_length: Option<CaseLength>,

    #[serde(default)]
    pub evidence_collected: Vec<EvidenceItem>,

    #[serde(default)]
    pub character_trust_levels: BTreeMap<String, i32>,

    #[serde(default)]
    pub witnesses_interviewed: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_location: Option<String>,

    #[serde(default)]
    pub available_locations: Vec<String>,

    #[serde(default)]
    pub investigation_notes: Vec<InvestigationNote>,

    /// Keys not modelled above, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InvestigationProgress {
    /// A fresh record with every scheduled gate pending.
    pub fn new(length: CaseLength, schedule: &[String]) -> Self {
        let mut progress = Self {
            case_length: Some(length),
            ..Self::default()
        };
        progress.seed_gates(schedule);
        progress
    }

    /// Read the record; a missing file yields `None`.
    pub async fn load(files: &CaseFiles) -> Result<Option<Self>, PersistError> {
        persist::read_json_optional(files.investigation_progress()).await
    }

    /// Read the record; a missing file yields an empty record.
    pub async fn load_or_default(files: &CaseFiles) -> Result<Self, PersistError> {
        Ok(Self::load(files).await?.unwrap_or_default())
    }

    pub async fn save(&self, files: &CaseFiles) -> Result<(), PersistError> {
        persist::write_json_atomic(files.investigation_progress(), self).await
    }

    // =========================================================================
    // Gates
    // =========================================================================

    /// Add any scheduled gate missing from the record as pending.
    pub fn seed_gates(&mut self, schedule: &[String]) {
        for gate in schedule {
            self.investigation_gates.entry(gate.clone()).or_default();
        }
    }

    pub fn gate_status(&self, gate: &str) -> Option<GateStatus> {
        self.investigation_gates.get(gate).copied()
    }

    /// Recorded gates in schedule order, followed by any unscheduled ones.
    pub fn ordered_gates<'a>(&'a self, schedule: &'a [String]) -> Vec<&'a str> {
        let mut ordered: Vec<&str> = schedule
            .iter()
            .filter(|g| self.investigation_gates.contains_key(g.as_str()))
            .map(String::as_str)
            .collect();
        ordered.extend(
            self.investigation_gates
                .keys()
                .filter(|g| !schedule.contains(g))
                .map(String::as_str),
        );
        ordered
    }

    /// Gates with the given status, in schedule order.
    pub fn gates_with_status<'a>(
        &'a self,
        schedule: &'a [String],
        status: GateStatus,
    ) -> Vec<&'a str> {
        self.ordered_gates(schedule)
            .into_iter()
            .filter(|g| self.gate_status(g) == Some(status))
            .collect()
    }

    pub fn completed_count(&self) -> usize {
        self.investigation_gates
            .values()
            .filter(|s| **s == GateStatus::Completed)
            .count()
    }

    pub fn progress_percentage(&self) -> f32 {
        if self.investigation_gates.is_empty() {
            return 0.0;
        }
        self.completed_count() as f32 / self.investigation_gates.len() as f32 * 100.0
    }

    // =========================================================================
    // Evidence, characters and locations
    // =========================================================================

    pub fn evidence(&self, name: &str) -> Option<&EvidenceItem> {
        self.evidence_collected.iter().find(|e| e.name == name)
    }

    /// Record new evidence. Returns `false` if it was already collected.
    pub fn add_evidence(&mut self, item: EvidenceItem) -> bool {
        if self.evidence(&item.name).is_some() {
            return false;
        }
        self.evidence_collected.push(item);
        true
    }

    pub fn trust(&self, character: &str) -> i32 {
        self.character_trust_levels
            .get(character)
            .copied()
            .unwrap_or(DEFAULT_TRUST)
    }

    /// Shift a character's trust, clamped to 0..=10. Returns the new level.
    pub fn update_trust(&mut self, character: &str, change: i32) -> i32 {
        let updated = self
            .trust(character)
            .saturating_add(change)
            .clamp(MIN_TRUST, MAX_TRUST);
        self.character_trust_levels
            .insert(character.to_string(), updated);
        updated
    }

    /// Characters grouped by disposition.
    pub fn dispositions(&self) -> BTreeMap<String, Disposition> {
        self.character_trust_levels
            .iter()
            .map(|(name, &trust)| (name.clone(), Disposition::from_trust(trust)))
            .collect()
    }

    /// Move to an available location. Returns `false` if it is not available.
    pub fn set_location(&mut self, location: &str) -> bool {
        if !self.available_locations.iter().any(|l| l == location) {
            return false;
        }
        self.current_location = Some(location.to_string());
        true
    }

    pub fn set_location_available(&mut self, location: &str, available: bool) {
        let present = self.available_locations.iter().any(|l| l == location);
        if available && !present {
            self.available_locations.push(location.to_string());
        } else if !available {
            self.available_locations.retain(|l| l != location);
        }
    }

    /// Record a witness interview. Returns `false` if already interviewed.
    pub fn interview_witness(&mut self, witness: &str) -> bool {
        if self.witnesses_interviewed.iter().any(|w| w == witness) {
            return false;
        }
        self.witnesses_interviewed.push(witness.to_string());
        true
    }

    pub fn add_note(&mut self, note: impl Into<String>, gate: impl Into<String>) {
        self.investigation_notes.push(InvestigationNote {
            note: note.into(),
            gate: gate.into(),
        });
    }
}

/// Where the trial stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    #[default]
    NotStarted,
    InProgress,
    Concluded,
}

/// The trial progress record (`trial_progress.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialProgress {
    #[serde(default)]
    pub trial_status: TrialStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_day: Option<u32>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TrialProgress {
    pub fn trial_started(&self) -> bool {
        self.trial_status != TrialStatus::NotStarted
    }

    pub async fn load_or_default(files: &CaseFiles) -> Result<Self, PersistError> {
        Ok(persist::read_json_optional(files.trial_progress())
            .await?
            .unwrap_or_default())
    }

    pub async fn save(&self, files: &CaseFiles) -> Result<(), PersistError> {
        persist::write_json_atomic(files.trial_progress(), self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schedule() -> Vec<String> {
        ["investigation_start", "trial_opening", "witness_confrontation", "final_revelation"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_new_progress_seeds_pending_gates() {
        let progress = InvestigationProgress::new(CaseLength::new(2), &schedule());
        assert_eq!(progress.investigation_gates.len(), 4);
        assert_eq!(progress.gate_status("trial_opening"), Some(GateStatus::Pending));
        assert_eq!(progress.current_phase, Phase::Briefing);
        assert_eq!(progress.progress_percentage(), 0.0);
    }

    #[test]
    fn test_ordered_gates_follow_schedule() {
        let mut progress = InvestigationProgress::new(CaseLength::new(2), &schedule());
        progress
            .investigation_gates
            .insert("bonus_gate".to_string(), GateStatus::Pending);
        let schedule = schedule();
        let ordered = progress.ordered_gates(&schedule);
        assert_eq!(ordered[0], "investigation_start");
        assert_eq!(ordered[3], "final_revelation");
        assert_eq!(ordered[4], "bonus_gate");
    }

    #[test]
    fn test_progress_percentage() {
        let mut progress = InvestigationProgress::new(CaseLength::new(2), &schedule());
        progress
            .investigation_gates
            .insert("investigation_start".into(), GateStatus::Completed);
        assert_eq!(progress.progress_percentage(), 25.0);
    }

    #[test]
    fn test_evidence_is_not_duplicated() {
        let mut progress = InvestigationProgress::default();
        assert!(progress.add_evidence(EvidenceItem::new("Lighter", "Brass, engraved")));
        assert!(!progress.add_evidence(EvidenceItem::new("Lighter", "Another one")));
        assert_eq!(progress.evidence_collected.len(), 1);
        assert_eq!(progress.evidence("Lighter").unwrap().description, "Brass, engraved");
    }

    #[test]
    fn test_trust_defaults_and_clamps() {
        let mut progress = InvestigationProgress::default();
        assert_eq!(progress.trust("Sandra"), DEFAULT_TRUST);
        assert_eq!(progress.update_trust("Sandra", 3), 8);
        assert_eq!(progress.update_trust("Sandra", 9), 10);
        assert_eq!(progress.update_trust("David", -20), 0);
        assert_eq!(progress.dispositions()["David"], Disposition::Hostile);
        assert_eq!(progress.dispositions()["Sandra"], Disposition::Friendly);
    }

    #[test]
    fn test_locations() {
        let mut progress = InvestigationProgress::default();
        assert!(!progress.set_location("courthouse"));
        progress.set_location_available("courthouse", true);
        progress.set_location_available("courthouse", true);
        assert_eq!(progress.available_locations.len(), 1);
        assert!(progress.set_location("courthouse"));
        assert_eq!(progress.current_location.as_deref(), Some("courthouse"));
        progress.set_location_available("courthouse", false);
        assert!(progress.available_locations.is_empty());
    }

    #[test]
    fn test_witness_interviews() {
        let mut progress = InvestigationProgress::default();
        assert!(progress.interview_witness("Sandra Watts"));
        assert!(!progress.interview_witness("Sandra Watts"));
    }

    #[test]
    fn test_unknown_keys_survive_round_trip() {
        let raw = json!({
            "investigation_gates": {"investigation_start": "completed"},
            "current_phase": "investigation",
            "case_length": 2,
            "evidence_collected": [{"name": "Lighter", "description": "Brass"}],
            "day": 2,
            "time_until_trial": "1 day"
        });
        let progress: InvestigationProgress = serde_json::from_value(raw).unwrap();
        assert_eq!(progress.current_phase, Phase::Investigation);
        assert_eq!(progress.case_length, Some(CaseLength::new(2)));
        assert_eq!(progress.extra["day"], json!(2));

        let back = serde_json::to_value(&progress).unwrap();
        assert_eq!(back["time_until_trial"], json!("1 day"));
        assert_eq!(back["investigation_gates"]["investigation_start"], json!("completed"));
    }

    #[test]
    fn test_trial_progress_defaults() {
        let trial: TrialProgress = serde_json::from_value(json!({})).unwrap();
        assert_eq!(trial.trial_status, TrialStatus::NotStarted);
        assert!(!trial.trial_started());
    }
}
