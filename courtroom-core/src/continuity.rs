//! Narrative snapshots taken at stage gates.
//!
//! A snapshot pairs the story context supplied by the caller with a copy of
//! the investigation record as it stood on disk. Snapshots are append-only:
//! once written they are never changed, and a second snapshot under the same
//! handle is refused rather than overwriting the first.

use crate::persist::{sanitize_component, timestamp_slug, CaseFiles, PersistError};
use crate::state::{EvidenceItem, InvestigationProgress, Phase};
use crate::store::{FileRecordStore, RecordStore, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Snapshot format version written by this crate.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Placeholder rendered for any missing field in a summary.
pub const UNKNOWN: &str = "Unknown";

/// Errors from snapshot operations.
#[derive(Debug, Error)]
pub enum ContinuityError {
    #[error("Snapshot already exists: {0}")]
    DuplicateSnapshot(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("Snapshot {handle} is corrupt: {source}")]
    SnapshotCorrupt {
        handle: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Snapshot {handle} has unsupported version {version}")]
    VersionMismatch { handle: String, version: u32 },

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StoreError> for ContinuityError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(id) => ContinuityError::DuplicateSnapshot(id),
            StoreError::NotFound(id) => ContinuityError::SnapshotNotFound(id),
            other => ContinuityError::Store(other),
        }
    }
}

// ============================================================================
// Context records
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Charges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    #[serde(default)]
    pub related: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// A named party to the case: the victim or the defendant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartyFacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
}

impl PartyFacts {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_relationship(mut self, relationship: impl Into<String>) -> Self {
        self.relationship = Some(relationship.into());
        self
    }

    pub fn with_occupation(mut self, occupation: impl Into<String>) -> Self {
        self.occupation = Some(occupation.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentFacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_inconsistency: Option<String>,
}

/// The fixed facts of the case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseFacts {
    #[serde(default)]
    pub charges: Charges,
    #[serde(default)]
    pub victim: PartyFacts,
    #[serde(default)]
    pub defendant: PartyFacts,
    #[serde(default)]
    pub incident: IncidentFacts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stakes: Option<String>,
}

/// Where the story stands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativeState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_summary: Option<String>,
    #[serde(default)]
    pub current_phase: Phase,
    #[serde(default)]
    pub key_revelations: Vec<String>,
    #[serde(default)]
    pub unresolved_mysteries: Vec<String>,
    #[serde(default)]
    pub plot_threads: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub key_traits: Vec<String>,
    #[serde(default)]
    pub secrets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_relationship: Option<String>,
}

/// Caller-supplied reading of a piece of evidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub significance: Option<String>,
    #[serde(default)]
    pub implications: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_value: Option<String>,
}

/// An evidence item with every analysis field filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSignificance {
    pub name: String,
    pub description: String,
    pub significance: String,
    pub implications: Vec<String>,
    pub trial_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_strategy: Option<String>,
    #[serde(default)]
    pub key_arguments: Vec<String>,
    #[serde(default)]
    pub evidence_plan: Vec<String>,
    #[serde(default)]
    pub objections: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionalStakes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_investment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dramatic_tension: Option<String>,
    #[serde(default)]
    pub motivations: BTreeMap<String, String>,
}

/// Story context handed in when a snapshot is taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativeContext {
    #[serde(default)]
    pub case_facts: CaseFacts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_summary: Option<String>,
    #[serde(default)]
    pub key_revelations: Vec<String>,
    #[serde(default)]
    pub unresolved_mysteries: Vec<String>,
    #[serde(default)]
    pub plot_threads: Vec<String>,
    #[serde(default)]
    pub characters: BTreeMap<String, CharacterProfile>,
    #[serde(default)]
    pub evidence_analysis: BTreeMap<String, EvidenceAnalysis>,
    #[serde(default)]
    pub trial: TrialContext,
    #[serde(default)]
    pub emotional: EmotionalStakes,
}

impl NarrativeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_primary_charge(mut self, charge: impl Into<String>) -> Self {
        self.case_facts.charges.primary = Some(charge.into());
        self
    }

    pub fn with_victim(mut self, victim: PartyFacts) -> Self {
        self.case_facts.victim = victim;
        self
    }

    pub fn with_defendant(mut self, defendant: PartyFacts) -> Self {
        self.case_facts.defendant = defendant;
        self
    }

    pub fn with_incident_summary(mut self, summary: impl Into<String>) -> Self {
        self.case_facts.incident.summary = Some(summary.into());
        self
    }

    pub fn with_stakes(mut self, stakes: impl Into<String>) -> Self {
        self.case_facts.stakes = Some(stakes.into());
        self
    }

    pub fn with_case_summary(mut self, summary: impl Into<String>) -> Self {
        self.case_summary = Some(summary.into());
        self
    }

    pub fn with_revelation(mut self, revelation: impl Into<String>) -> Self {
        self.key_revelations.push(revelation.into());
        self
    }

    pub fn with_mystery(mut self, mystery: impl Into<String>) -> Self {
        self.unresolved_mysteries.push(mystery.into());
        self
    }

    pub fn with_plot_thread(mut self, thread: impl Into<String>) -> Self {
        self.plot_threads.push(thread.into());
        self
    }

    pub fn with_character(mut self, name: impl Into<String>, profile: CharacterProfile) -> Self {
        self.characters.insert(name.into(), profile);
        self
    }

    pub fn with_evidence_analysis(
        mut self,
        evidence: impl Into<String>,
        analysis: EvidenceAnalysis,
    ) -> Self {
        self.evidence_analysis.insert(evidence.into(), analysis);
        self
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.trial.legal_strategy = Some(strategy.into());
        self
    }

    pub fn with_dramatic_tension(mut self, tension: impl Into<String>) -> Self {
        self.emotional.dramatic_tension = Some(tension.into());
        self
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Identifier of a stored snapshot: `{gate}_{YYYYmmdd_HHMMSS}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotHandle(String);

impl SnapshotHandle {
    pub fn for_gate(gate: &str, at: DateTime<Utc>) -> Self {
        Self(format!("{}_{}", sanitize_component(gate), timestamp_slug(at)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SnapshotHandle {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SnapshotHandle {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SnapshotHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub gate_name: String,
    pub timestamp: DateTime<Utc>,
    pub case_name: String,
}

/// A complete point-in-time capture of a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeSnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    pub metadata: SnapshotMetadata,
    #[serde(default)]
    pub case_facts: CaseFacts,
    #[serde(default)]
    pub narrative_state: NarrativeState,
    #[serde(default)]
    pub character_dynamics: BTreeMap<String, CharacterProfile>,
    #[serde(default)]
    pub evidence_significance: Vec<EvidenceSignificance>,
    #[serde(default)]
    pub trial_context: TrialContext,
    #[serde(default)]
    pub emotional_stakes: EmotionalStakes,
    #[serde(default)]
    pub game_state_snapshot: InvestigationProgress,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl NarrativeSnapshot {
    /// Assemble a snapshot from caller context and the current game state.
    pub fn build(
        gate: &str,
        case_name: &str,
        context: NarrativeContext,
        game_state: InvestigationProgress,
        at: DateTime<Utc>,
    ) -> Self {
        let evidence_significance =
            enrich_evidence(&game_state.evidence_collected, &context.evidence_analysis);

        Self {
            version: SNAPSHOT_VERSION,
            metadata: SnapshotMetadata {
                gate_name: gate.to_string(),
                timestamp: at,
                case_name: case_name.to_string(),
            },
            case_facts: context.case_facts,
            narrative_state: NarrativeState {
                case_summary: context.case_summary,
                current_phase: game_state.current_phase,
                key_revelations: context.key_revelations,
                unresolved_mysteries: context.unresolved_mysteries,
                plot_threads: context.plot_threads,
            },
            character_dynamics: context.characters,
            evidence_significance,
            trial_context: context.trial,
            emotional_stakes: context.emotional,
            game_state_snapshot: game_state,
        }
    }
}

/// Listing entry for a stored snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotInfo {
    pub handle: SnapshotHandle,
    pub gate_name: String,
    pub timestamp: DateTime<Utc>,
    pub primary_charge: Option<String>,
}

/// Pair each evidence item with its analysis by exact name.
///
/// Items without an analysis fall back to their own description, no
/// implications and an unknown trial value.
pub fn enrich_evidence(
    evidence: &[EvidenceItem],
    analysis: &BTreeMap<String, EvidenceAnalysis>,
) -> Vec<EvidenceSignificance> {
    evidence
        .iter()
        .map(|item| {
            let found = analysis.get(&item.name);
            EvidenceSignificance {
                name: item.name.clone(),
                description: item.description.clone(),
                significance: found
                    .and_then(|a| a.significance.clone())
                    .unwrap_or_else(|| item.description.clone()),
                implications: found.map(|a| a.implications.clone()).unwrap_or_default(),
                trial_value: found
                    .and_then(|a| a.trial_value.clone())
                    .unwrap_or_else(|| UNKNOWN.to_string()),
                discovered_at: item.discovered_at.clone(),
            }
        })
        .collect()
}

fn or_unknown(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(UNKNOWN)
}

/// Render the restoration briefing for a snapshot.
pub fn summarize(snapshot: &NarrativeSnapshot) -> String {
    let facts = &snapshot.case_facts;
    let narrative = &snapshot.narrative_state;
    let mut out = String::new();

    out.push_str("=== CASE CONTEXT RESTORATION ===\n\n");
    out.push_str(&format!("Case: {}\n", snapshot.metadata.case_name));
    out.push_str(&format!("Stage: {}\n", snapshot.metadata.gate_name));
    out.push_str(&format!("Phase: {}\n\n", narrative.current_phase));

    out.push_str(&format!("CHARGES: {}\n", or_unknown(&facts.charges.primary)));
    out.push_str(&format!(
        "VICTIM: {} - {}\n",
        or_unknown(&facts.victim.name),
        or_unknown(&facts.victim.status)
    ));
    out.push_str(&format!(
        "DEFENDANT: {} - {}\n\n",
        or_unknown(&facts.defendant.name),
        or_unknown(&facts.defendant.relationship)
    ));

    out.push_str("INCIDENT SUMMARY:\n");
    out.push_str(&format!("{}\n\n", or_unknown(&facts.incident.summary)));

    out.push_str("KEY EVIDENCE:\n");
    if snapshot.evidence_significance.is_empty() {
        out.push_str("- None collected\n");
    }
    for evidence in &snapshot.evidence_significance {
        out.push_str(&format!("- {}: {}\n", evidence.name, evidence.significance));
    }
    out.push('\n');

    out.push_str(&format!(
        "CURRENT STRATEGY: {}\n\n",
        or_unknown(&snapshot.trial_context.legal_strategy)
    ));

    out.push_str("UNRESOLVED MYSTERIES:\n");
    if narrative.unresolved_mysteries.is_empty() {
        out.push_str("- None recorded\n");
    }
    for mystery in &narrative.unresolved_mysteries {
        out.push_str(&format!("- {}\n", mystery));
    }
    out.push('\n');

    out.push_str(&format!(
        "DRAMATIC STAKES: {}\n",
        or_unknown(&snapshot.emotional_stakes.dramatic_tension)
    ));

    out
}

// ============================================================================
// Store
// ============================================================================

/// Writes and reads the snapshots of one case.
pub struct NarrativeStore<S = FileRecordStore> {
    files: CaseFiles,
    store: S,
}

impl NarrativeStore<FileRecordStore> {
    /// Snapshots kept under the case's `narrative_saves/` directory.
    pub fn open(files: CaseFiles) -> Self {
        let store = FileRecordStore::new(files.narrative_saves_dir());
        Self { files, store }
    }
}

impl<S: RecordStore> NarrativeStore<S> {
    pub fn with_store(files: CaseFiles, store: S) -> Self {
        Self { files, store }
    }

    pub fn files(&self) -> &CaseFiles {
        &self.files
    }

    pub async fn create_snapshot(
        &self,
        gate: &str,
        context: NarrativeContext,
    ) -> Result<SnapshotHandle, ContinuityError> {
        self.create_snapshot_at(gate, context, Utc::now()).await
    }

    /// Capture `context` with the investigation record as it is on disk now.
    pub async fn create_snapshot_at(
        &self,
        gate: &str,
        context: NarrativeContext,
        at: DateTime<Utc>,
    ) -> Result<SnapshotHandle, ContinuityError> {
        let game_state = InvestigationProgress::load_or_default(&self.files).await?;
        let snapshot =
            NarrativeSnapshot::build(gate, &self.files.case_name(), context, game_state, at);
        let handle = SnapshotHandle::for_gate(gate, at);

        let contents = serde_json::to_string_pretty(&snapshot)?;
        self.store.append(handle.as_str(), &contents).await?;

        debug!(%handle, gate = %gate, "created snapshot");
        Ok(handle)
    }

    pub async fn restore_snapshot(
        &self,
        handle: &SnapshotHandle,
    ) -> Result<NarrativeSnapshot, ContinuityError> {
        let contents = self
            .store
            .read(handle.as_str())
            .await
            .map_err(|e| match e {
                StoreError::InvalidId(id) => ContinuityError::SnapshotNotFound(id),
                other => other.into(),
            })?;
        let snapshot: NarrativeSnapshot =
            serde_json::from_str(&contents).map_err(|source| ContinuityError::SnapshotCorrupt {
                handle: handle.to_string(),
                source,
            })?;

        if snapshot.version > SNAPSHOT_VERSION {
            return Err(ContinuityError::VersionMismatch {
                handle: handle.to_string(),
                version: snapshot.version,
            });
        }
        Ok(snapshot)
    }

    /// All readable snapshots, newest first. Unreadable records are skipped.
    pub async fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, ContinuityError> {
        let mut infos = Vec::new();
        for (handle, snapshot) in self.load_all().await? {
            infos.push(SnapshotInfo {
                gate_name: snapshot.metadata.gate_name,
                timestamp: snapshot.metadata.timestamp,
                primary_charge: snapshot.case_facts.charges.primary,
                handle,
            });
        }
        infos.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.handle.cmp(&a.handle))
        });
        Ok(infos)
    }

    /// The newest readable snapshot, if any.
    pub async fn latest(&self) -> Result<Option<(SnapshotHandle, NarrativeSnapshot)>, ContinuityError> {
        let newest = self.list_snapshots().await?.into_iter().next();
        match newest {
            Some(info) => {
                let snapshot = self.restore_snapshot(&info.handle).await?;
                Ok(Some((info.handle, snapshot)))
            }
            None => Ok(None),
        }
    }

    /// A snapshot for `gate` whose embedded game state equals `state`.
    pub async fn find_for_gate_state(
        &self,
        gate: &str,
        state: &InvestigationProgress,
    ) -> Result<Option<SnapshotHandle>, ContinuityError> {
        let found = self
            .load_all()
            .await?
            .into_iter()
            .filter(|(_, s)| s.metadata.gate_name == gate && s.game_state_snapshot == *state)
            .map(|(handle, _)| handle)
            .max();
        Ok(found)
    }

    async fn load_all(&self) -> Result<Vec<(SnapshotHandle, NarrativeSnapshot)>, ContinuityError> {
        let mut loaded = Vec::new();
        for id in self.store.list().await? {
            let handle = SnapshotHandle::from(id);
            match self.restore_snapshot(&handle).await {
                Ok(snapshot) => loaded.push((handle, snapshot)),
                Err(e) => warn!(%handle, error = %e, "skipping unreadable snapshot"),
            }
        }
        Ok(loaded)
    }
}
