//! CaseSession - the primary public API for playing a case.
//!
//! A session owns one case directory: its progress records, its snapshot
//! store and its roll history. Every gate-boundary transition writes a
//! narrative snapshot first and only then commits the new state, so a crash
//! between the two leaves the case where it was and a retry reuses the
//! snapshot already written.

use crate::config::{CaseConfig, CaseLength, ConfigError, GateKind};
use crate::consult::{continuity_brief_prompt, ConsultError, Consultant};
use crate::continuity::{
    summarize, ContinuityError, NarrativeContext, NarrativeStore, SnapshotHandle,
};
use crate::dice::{
    evidence_modifier, trust_modifier, DiceError, Die, Difficulty, OutcomeResolver, RollOutcome,
};
use crate::persist::{CaseFiles, PersistError};
use crate::state::{
    EvidenceItem, GateStatus, InvestigationProgress, Phase, TrialProgress, TrialStatus,
};
use crate::store::{FileRecordStore, RecordStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Errors from CaseSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Continuity error: {0}")]
    Continuity(#[from] ContinuityError),

    #[error("Dice error: {0}")]
    Dice(#[from] DiceError),

    #[error("Consultant error: {0}")]
    Consult(#[from] ConsultError),

    #[error("No investigation record at {0}")]
    MissingRecord(PathBuf),

    #[error("Case already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("Unknown gate: {0}")]
    UnknownGate(String),

    #[error("Cannot {action} during {phase}")]
    WrongPhase { action: String, phase: Phase },

    #[error("Gate already completed: {0}")]
    GateAlreadyCompleted(String),

    #[error("Trial not ready: {completed} of {required} investigation gates completed")]
    TrialNotReady { completed: usize, required: usize },

    #[error("Location not available: {0}")]
    LocationUnavailable(String),
}

/// Appended to the trial-opening gate name for the snapshot taken on entering
/// trial, keeping it apart from the one taken when that gate completes.
pub const TRIAL_ENTRY_SUFFIX: &str = "_entry";

/// Source of snapshot timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// An uncertain action to be settled by a roll.
#[derive(Debug, Clone)]
pub struct ActionCheck {
    pub description: String,
    pub difficulty: Difficulty,
    /// Supporting evidence pieces brought to bear.
    pub evidence_count: Option<usize>,
    /// Trust of the character involved, if any.
    pub trust_level: Option<i32>,
    pub extra_modifier: i32,
    /// Target for a skill check; a plain roll when absent.
    pub target: Option<i32>,
}

impl ActionCheck {
    pub fn new(description: impl Into<String>, difficulty: Difficulty) -> Self {
        Self {
            description: description.into(),
            difficulty,
            evidence_count: None,
            trust_level: None,
            extra_modifier: 0,
            target: None,
        }
    }

    pub fn with_evidence(mut self, count: usize) -> Self {
        self.evidence_count = Some(count);
        self
    }

    pub fn with_trust(mut self, level: i32) -> Self {
        self.trust_level = Some(level);
        self
    }

    pub fn with_modifier(mut self, modifier: i32) -> Self {
        self.extra_modifier = modifier;
        self
    }

    pub fn against(mut self, target: i32) -> Self {
        self.target = Some(target);
        self
    }

    /// Sum of every modifier that applies.
    pub fn total_modifier(&self) -> i32 {
        self.difficulty.modifier()
            + self.evidence_count.map(evidence_modifier).unwrap_or(0)
            + self.trust_level.map(trust_modifier).unwrap_or(0)
            + self.extra_modifier
    }
}

/// How close the case is to trial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialReadiness {
    pub ready: bool,
    pub completed: usize,
    pub required: usize,
    pub gates_remaining: usize,
    /// Investigation gates still to complete, in order.
    pub next_gates: Vec<String>,
}

/// A point-in-time overview of the case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseStatus {
    pub case_name: String,
    pub case_length: CaseLength,
    pub phase: Phase,
    pub next_gate: Option<String>,
    pub completed_gates: Vec<String>,
    pub pending_gates: Vec<String>,
    pub progress_percentage: f32,
    pub evidence_count: usize,
    pub trial_ready: bool,
    pub trial_status: TrialStatus,
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({} day case)", self.case_name, self.case_length)?;
        writeln!(f, "Phase: {}", self.phase)?;
        writeln!(f, "Progress: {:.0}%", self.progress_percentage)?;
        if let Some(gate) = &self.next_gate {
            writeln!(f, "Next gate: {gate}")?;
        }
        write!(f, "Evidence collected: {}", self.evidence_count)
    }
}

/// Something the player can do right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailableAction {
    CheckStatus,
    BeginInvestigation,
    WorkOnGate(String),
    GoTo(String),
    ReviewEvidence,
    TalkTo(String),
    StartTrial,
}

impl fmt::Display for AvailableAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvailableAction::CheckStatus => write!(f, "Check current status"),
            AvailableAction::BeginInvestigation => write!(f, "Begin the investigation"),
            AvailableAction::WorkOnGate(gate) => write!(f, "Work on {gate}"),
            AvailableAction::GoTo(location) => write!(f, "Go to {location}"),
            AvailableAction::ReviewEvidence => write!(f, "Review evidence"),
            AvailableAction::TalkTo(character) => write!(f, "Talk to {character}"),
            AvailableAction::StartTrial => write!(f, "Start trial"),
        }
    }
}

/// A case being played.
pub struct CaseSession<S = FileRecordStore> {
    config: Arc<CaseConfig>,
    files: CaseFiles,
    length: CaseLength,
    schedule: Vec<String>,
    progress: InvestigationProgress,
    trial: TrialProgress,
    narrative: NarrativeStore<S>,
    resolver: OutcomeResolver,
    clock: Box<dyn Clock>,
}

impl CaseSession<FileRecordStore> {
    /// Start a new case in `case_dir` with fresh progress records.
    pub async fn create(
        case_dir: impl AsRef<Path>,
        config: Arc<CaseConfig>,
        length: CaseLength,
    ) -> Result<Self, SessionError> {
        let files = CaseFiles::new(case_dir.as_ref());
        let store = FileRecordStore::new(files.narrative_saves_dir());
        Self::create_with_store(case_dir, config, length, store).await
    }

    /// Open an existing case in `case_dir`.
    pub async fn open(
        case_dir: impl AsRef<Path>,
        config: Arc<CaseConfig>,
    ) -> Result<Self, SessionError> {
        let files = CaseFiles::new(case_dir.as_ref());
        let store = FileRecordStore::new(files.narrative_saves_dir());
        Self::open_with_store(case_dir, config, store).await
    }
}

impl<S: RecordStore> CaseSession<S> {
    pub async fn create_with_store(
        case_dir: impl AsRef<Path>,
        config: Arc<CaseConfig>,
        length: CaseLength,
        store: S,
    ) -> Result<Self, SessionError> {
        let files = CaseFiles::new(case_dir.as_ref());
        if InvestigationProgress::load(&files).await?.is_some() {
            return Err(SessionError::AlreadyExists(files.root().to_path_buf()));
        }

        let schedule = config.gates_for_length(length)?.to_vec();
        let progress = InvestigationProgress::new(length, &schedule);
        let trial = TrialProgress::default();
        trial.save(&files).await?;
        progress.save(&files).await?;

        info!(case = %files.case_name(), %length, "created case");
        Ok(Self::assemble(config, files, length, schedule, progress, trial, store).await)
    }

    pub async fn open_with_store(
        case_dir: impl AsRef<Path>,
        config: Arc<CaseConfig>,
        store: S,
    ) -> Result<Self, SessionError> {
        let files = CaseFiles::new(case_dir.as_ref());
        let mut progress = InvestigationProgress::load(&files)
            .await?
            .ok_or_else(|| SessionError::MissingRecord(files.investigation_progress()))?;
        let trial = TrialProgress::load_or_default(&files).await?;

        let length = match progress.case_length {
            Some(length) if config.length_config(length).is_ok() => length,
            recorded => {
                let gates: Vec<&String> = progress.investigation_gates.keys().collect();
                let detected = config.detect_length_from_gates(&gates);
                if let Some(unknown) = recorded {
                    warn!(
                        case = %files.case_name(),
                        recorded = %unknown,
                        using = %detected,
                        "recorded case length is not configured"
                    );
                }
                detected
            }
        };
        let schedule = config.gates_for_length(length)?.to_vec();

        // Keep the record on disk identical to the one held in memory.
        let before = progress.clone();
        progress.case_length = Some(length);
        progress.seed_gates(&schedule);
        if progress != before {
            progress.save(&files).await?;
            debug!(case = %files.case_name(), "filled in missing gate schedule");
        }

        Ok(Self::assemble(config, files, length, schedule, progress, trial, store).await)
    }

    async fn assemble(
        config: Arc<CaseConfig>,
        files: CaseFiles,
        length: CaseLength,
        schedule: Vec<String>,
        progress: InvestigationProgress,
        trial: TrialProgress,
        store: S,
    ) -> Self {
        let resolver = OutcomeResolver::for_case(files.clone()).await;
        let narrative = NarrativeStore::with_store(files.clone(), store);
        Self {
            config,
            files,
            length,
            schedule,
            progress,
            trial,
            narrative,
            resolver,
            clock: Box::new(SystemClock),
        }
    }

    /// Replace the die (useful for testing).
    pub fn with_die(mut self, die: impl Die + 'static) -> Self {
        self.resolver = std::mem::take(&mut self.resolver).with_die(die);
        self
    }

    /// Replace the snapshot clock (useful for testing).
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn files(&self) -> &CaseFiles {
        &self.files
    }

    pub fn case_length(&self) -> CaseLength {
        self.length
    }

    pub fn schedule(&self) -> &[String] {
        &self.schedule
    }

    pub fn phase(&self) -> Phase {
        self.progress.current_phase
    }

    pub fn progress(&self) -> &InvestigationProgress {
        &self.progress
    }

    pub fn trial(&self) -> &TrialProgress {
        &self.trial
    }

    pub fn narrative(&self) -> &NarrativeStore<S> {
        &self.narrative
    }

    pub fn resolver(&self) -> &OutcomeResolver {
        &self.resolver
    }

    pub fn gate_status(&self, gate: &str) -> Option<GateStatus> {
        self.progress.gate_status(gate)
    }

    /// Where a gate sits relative to this case's trial-opening gate.
    pub fn gate_kind(&self, gate: &str) -> GateKind {
        let opening = self
            .schedule
            .iter()
            .position(|g| g == self.config.trial_opening_gate());
        match (self.schedule.iter().position(|g| g == gate), opening) {
            (Some(pos), Some(open)) if pos < open => GateKind::Investigation,
            (Some(_), _) => GateKind::Trial,
            (None, _) => self.config.classify_gate(gate),
        }
    }

    fn investigation_gates(&self) -> impl Iterator<Item = &String> {
        self.schedule
            .iter()
            .filter(move |g| self.gate_kind(g) == GateKind::Investigation)
    }

    // =========================================================================
    // Phase Transitions
    // =========================================================================

    /// Leave the briefing and start investigating.
    #[instrument(skip(self), fields(case = %self.files.case_name()))]
    pub async fn begin(&mut self) -> Result<(), SessionError> {
        match self.phase() {
            Phase::Briefing => {}
            Phase::Investigation => return Ok(()),
            phase => {
                return Err(SessionError::WrongPhase {
                    action: "begin the investigation".into(),
                    phase,
                })
            }
        }

        let mut next = self.progress.clone();
        next.current_phase = Phase::Investigation;
        self.commit(next).await?;

        info!(phase = %Phase::Investigation, "investigation started");
        Ok(())
    }

    /// Mark a gate as being worked on.
    #[instrument(skip(self), fields(case = %self.files.case_name()))]
    pub async fn start_gate(&mut self, gate: &str) -> Result<(), SessionError> {
        match self.check_gate(gate, "start")? {
            GateStatus::InProgress => return Ok(()),
            GateStatus::Completed => return Err(SessionError::GateAlreadyCompleted(gate.into())),
            GateStatus::Pending => {}
        }

        let mut next = self.progress.clone();
        next.investigation_gates
            .insert(gate.to_string(), GateStatus::InProgress);
        self.commit(next).await?;

        debug!(gate = %gate, "gate started");
        Ok(())
    }

    /// Complete a gate, snapshotting the case first.
    ///
    /// Completing the terminal gate resolves the case.
    #[instrument(skip(self, context), fields(case = %self.files.case_name()))]
    pub async fn complete_gate(
        &mut self,
        gate: &str,
        context: NarrativeContext,
    ) -> Result<SnapshotHandle, SessionError> {
        if self.check_gate(gate, "complete")? == GateStatus::Completed {
            return Err(SessionError::GateAlreadyCompleted(gate.into()));
        }

        let handle = self.snapshot(gate, context).await?;

        let mut next = self.progress.clone();
        next.investigation_gates
            .insert(gate.to_string(), GateStatus::Completed);

        let resolved = gate == self.config.terminal_gate();
        if resolved {
            next.current_phase = Phase::Resolved;
            let mut trial = self.trial.clone();
            trial.trial_status = TrialStatus::Concluded;
            self.commit_with_trial(next, trial).await?;
        } else {
            self.commit(next).await?;
        }

        info!(gate = %gate, %handle, "gate completed");
        if resolved {
            info!(phase = %Phase::Resolved, "case resolved");
        }
        Ok(handle)
    }

    /// Move from investigation to trial once enough gates are done.
    #[instrument(skip(self, context), fields(case = %self.files.case_name()))]
    pub async fn enter_trial(
        &mut self,
        context: NarrativeContext,
    ) -> Result<SnapshotHandle, SessionError> {
        if self.phase() != Phase::Investigation {
            return Err(SessionError::WrongPhase {
                action: "enter trial".into(),
                phase: self.phase(),
            });
        }
        let readiness = self.predict_trial_readiness();
        if !readiness.ready {
            info!(
                completed = readiness.completed,
                required = readiness.required,
                "trial requested too early"
            );
            return Err(SessionError::TrialNotReady {
                completed: readiness.completed,
                required: readiness.required,
            });
        }

        let opening = self.config.trial_opening_gate().to_string();
        let handle = self
            .snapshot(&format!("{opening}{TRIAL_ENTRY_SUFFIX}"), context)
            .await?;

        let mut trial = self.trial.clone();
        trial.trial_status = TrialStatus::InProgress;
        trial.trial_day = Some(1);

        let mut next = self.progress.clone();
        next.current_phase = Phase::Trial;
        next.investigation_gates
            .insert(opening.clone(), GateStatus::InProgress);
        self.commit_with_trial(next, trial).await?;

        info!(phase = %Phase::Trial, %handle, "trial started");
        Ok(handle)
    }

    /// Check a gate may be touched in the current phase; returns its status.
    fn check_gate(&self, gate: &str, action: &str) -> Result<GateStatus, SessionError> {
        let status = self
            .progress
            .gate_status(gate)
            .ok_or_else(|| SessionError::UnknownGate(gate.to_string()))?;

        let required = match self.gate_kind(gate) {
            GateKind::Investigation => Phase::Investigation,
            GateKind::Trial | GateKind::Unknown => Phase::Trial,
        };
        if self.phase() != required {
            return Err(SessionError::WrongPhase {
                action: format!("{action} {gate}"),
                phase: self.phase(),
            });
        }
        Ok(status)
    }

    /// Reuse a snapshot left by an interrupted attempt, or write a new one.
    async fn snapshot(
        &self,
        gate: &str,
        context: NarrativeContext,
    ) -> Result<SnapshotHandle, SessionError> {
        if let Some(handle) = self
            .narrative
            .find_for_gate_state(gate, &self.progress)
            .await?
        {
            info!(%handle, "reusing snapshot from interrupted transition");
            return Ok(handle);
        }
        Ok(self
            .narrative
            .create_snapshot_at(gate, context, self.clock.now())
            .await?)
    }

    /// Persist `next` and adopt it; on failure memory keeps the old record.
    async fn commit(&mut self, next: InvestigationProgress) -> Result<(), SessionError> {
        next.save(&self.files).await?;
        self.progress = next;
        Ok(())
    }

    /// Persist both records and adopt them together.
    ///
    /// The trial record is written first. If the progress write then fails,
    /// the previous trial record is written back and memory is untouched.
    async fn commit_with_trial(
        &mut self,
        next: InvestigationProgress,
        trial: TrialProgress,
    ) -> Result<(), SessionError> {
        trial.save(&self.files).await?;
        if let Err(e) = next.save(&self.files).await {
            if let Err(restore) = self.trial.save(&self.files).await {
                warn!(error = %restore, "failed to restore trial record");
            }
            return Err(e.into());
        }
        self.trial = trial;
        self.progress = next;
        Ok(())
    }

    // =========================================================================
    // Progress Queries
    // =========================================================================

    /// Completed gates among those before the trial-opening gate.
    pub fn completed_investigation_gates(&self) -> usize {
        self.investigation_gates()
            .filter(|g| self.progress.gate_status(g) == Some(GateStatus::Completed))
            .count()
    }

    pub fn is_trial_ready(&self) -> bool {
        self.completed_investigation_gates() >= self.config.trial_trigger_point(self.length)
    }

    pub fn predict_trial_readiness(&self) -> TrialReadiness {
        let completed = self.completed_investigation_gates();
        let required = self.config.trial_trigger_point(self.length);
        let gates_remaining = required.saturating_sub(completed);
        let next_gates = self
            .investigation_gates()
            .filter(|g| self.progress.gate_status(g) != Some(GateStatus::Completed))
            .take(gates_remaining)
            .cloned()
            .collect();

        TrialReadiness {
            ready: gates_remaining == 0,
            completed,
            required,
            gates_remaining,
            next_gates,
        }
    }

    /// First gate in schedule order that is not yet completed.
    pub fn next_gate(&self) -> Option<&str> {
        self.progress
            .ordered_gates(&self.schedule)
            .into_iter()
            .find(|g| self.progress.gate_status(g) != Some(GateStatus::Completed))
    }

    pub fn progress_percentage(&self) -> f32 {
        self.progress.progress_percentage()
    }

    pub fn status(&self) -> CaseStatus {
        CaseStatus {
            case_name: self.files.case_name(),
            case_length: self.length,
            phase: self.phase(),
            next_gate: self.next_gate().map(String::from),
            completed_gates: self.gates_named(GateStatus::Completed),
            pending_gates: self.gates_named(GateStatus::Pending),
            progress_percentage: self.progress_percentage(),
            evidence_count: self.progress.evidence_collected.len(),
            trial_ready: self.is_trial_ready(),
            trial_status: self.trial.trial_status,
        }
    }

    fn gates_named(&self, status: GateStatus) -> Vec<String> {
        self.progress
            .gates_with_status(&self.schedule, status)
            .into_iter()
            .map(String::from)
            .collect()
    }

    pub fn available_actions(&self) -> Vec<AvailableAction> {
        let mut actions = vec![AvailableAction::CheckStatus];

        if self.phase() == Phase::Briefing {
            actions.push(AvailableAction::BeginInvestigation);
            return actions;
        }
        if self.phase() == Phase::Resolved {
            return actions;
        }

        if let Some(gate) = self.next_gate() {
            actions.push(AvailableAction::WorkOnGate(gate.to_string()));
        }
        for location in &self.progress.available_locations {
            if self.progress.current_location.as_ref() != Some(location) {
                actions.push(AvailableAction::GoTo(location.clone()));
            }
        }
        if !self.progress.evidence_collected.is_empty() {
            actions.push(AvailableAction::ReviewEvidence);
        }
        for (character, &trust) in &self.progress.character_trust_levels {
            if trust > 3 {
                actions.push(AvailableAction::TalkTo(character.clone()));
            }
        }
        if self.phase() == Phase::Investigation && self.is_trial_ready() {
            actions.push(AvailableAction::StartTrial);
        }
        actions
    }

    // =========================================================================
    // Investigation Records
    // =========================================================================

    /// The gate the player is working on, for tagging records.
    fn active_gate(&self) -> Option<&str> {
        self.progress
            .gates_with_status(&self.schedule, GateStatus::InProgress)
            .into_iter()
            .next()
            .or_else(|| self.next_gate())
    }

    /// Record new evidence. Returns `false` if it was already collected.
    pub async fn add_evidence(
        &mut self,
        name: &str,
        description: &str,
    ) -> Result<bool, SessionError> {
        let mut item = EvidenceItem::new(name, description);
        item.discovered_at = self.active_gate().map(|g| format!("Gate: {g}"));

        let mut next = self.progress.clone();
        if !next.add_evidence(item) {
            return Ok(false);
        }
        self.commit(next).await?;
        debug!(evidence = %name, "evidence added");
        Ok(true)
    }

    pub fn trust(&self, character: &str) -> i32 {
        self.progress.trust(character)
    }

    pub async fn update_trust(&mut self, character: &str, change: i32) -> Result<i32, SessionError> {
        let mut next = self.progress.clone();
        let level = next.update_trust(character, change);
        self.commit(next).await?;
        Ok(level)
    }

    pub async fn set_location_available(
        &mut self,
        location: &str,
        available: bool,
    ) -> Result<(), SessionError> {
        let mut next = self.progress.clone();
        next.set_location_available(location, available);
        self.commit(next).await
    }

    pub async fn set_location(&mut self, location: &str) -> Result<(), SessionError> {
        let mut next = self.progress.clone();
        if !next.set_location(location) {
            return Err(SessionError::LocationUnavailable(location.to_string()));
        }
        self.commit(next).await
    }

    /// Record a witness interview. Returns `false` if already interviewed.
    pub async fn interview_witness(&mut self, witness: &str) -> Result<bool, SessionError> {
        let mut next = self.progress.clone();
        if !next.interview_witness(witness) {
            return Ok(false);
        }
        self.commit(next).await?;
        Ok(true)
    }

    pub async fn add_note(&mut self, note: &str) -> Result<(), SessionError> {
        let tag = self
            .active_gate()
            .map(String::from)
            .unwrap_or_else(|| self.phase().to_string());
        let mut next = self.progress.clone();
        next.add_note(note, tag);
        self.commit(next).await
    }

    // =========================================================================
    // Outcomes and Continuity
    // =========================================================================

    /// Settle an uncertain action with a roll.
    pub async fn adjudicate(&mut self, check: &ActionCheck) -> Result<RollOutcome, SessionError> {
        let modifier = check.total_modifier();
        let outcome = match check.target {
            Some(target) => {
                self.resolver
                    .skill_check(target, modifier, &check.description)
                    .await?
            }
            None => self.resolver.roll_check(modifier, &check.description).await?,
        };
        Ok(outcome)
    }

    /// Restoration summary of the newest snapshot, if any.
    pub async fn resume_summary(&self) -> Result<Option<String>, SessionError> {
        Ok(self
            .narrative
            .latest()
            .await?
            .map(|(_, snapshot)| summarize(&snapshot)))
    }

    /// Ask the consultant for a continuity brief built from a stored snapshot.
    pub async fn request_brief(
        &self,
        consultant: &dyn Consultant,
        handle: &SnapshotHandle,
    ) -> Result<String, SessionError> {
        let snapshot = self.narrative.restore_snapshot(handle).await?;
        let prompt = continuity_brief_prompt(&summarize(&snapshot));
        let brief = consultant.consult(&prompt).await?;
        if brief.trim().is_empty() {
            return Err(ConsultError::EmptyResponse.into());
        }
        Ok(brief)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{LoadedDie, SteppingClock};
    use tempfile::TempDir;

    fn config() -> Arc<CaseConfig> {
        Arc::new(CaseConfig::builtin())
    }

    async fn new_case(temp_dir: &TempDir, days: u8) -> CaseSession {
        CaseSession::create(temp_dir.path().join("harbor_fire"), config(), CaseLength::new(days))
            .await
            .expect("Failed to create case")
            .with_clock(SteppingClock::default())
    }

    #[tokio::test]
    async fn test_create_seeds_schedule() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let session = new_case(&temp_dir, 2).await;

        assert_eq!(session.phase(), Phase::Briefing);
        assert_eq!(session.schedule().len(), 4);
        assert_eq!(session.next_gate(), Some("investigation_start"));
        assert_eq!(session.gate_kind("investigation_start"), GateKind::Investigation);
        assert_eq!(session.gate_kind("witness_confrontation"), GateKind::Trial);
    }

    #[tokio::test]
    async fn test_create_refuses_existing_case() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        new_case(&temp_dir, 2).await;
        let again = CaseSession::create(
            temp_dir.path().join("harbor_fire"),
            config(),
            CaseLength::new(2),
        )
        .await;
        assert!(matches!(again, Err(SessionError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_open_missing_case() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let result = CaseSession::open(temp_dir.path().join("nowhere"), config()).await;
        assert!(matches!(result, Err(SessionError::MissingRecord(_))));
    }

    #[tokio::test]
    async fn test_gates_require_matching_phase() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut session = new_case(&temp_dir, 2).await;

        let early = session
            .complete_gate("investigation_start", NarrativeContext::new())
            .await;
        assert!(matches!(early, Err(SessionError::WrongPhase { .. })));

        session.begin().await.unwrap();
        let trial_gate = session
            .complete_gate("witness_confrontation", NarrativeContext::new())
            .await;
        assert!(matches!(trial_gate, Err(SessionError::WrongPhase { .. })));

        let unknown = session.start_gate("closing_arguments").await;
        assert!(matches!(unknown, Err(SessionError::UnknownGate(_))));
    }

    #[tokio::test]
    async fn test_one_day_case_can_go_straight_to_trial() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut session = new_case(&temp_dir, 1).await;
        session.begin().await.unwrap();

        assert!(session.is_trial_ready());
        session.enter_trial(NarrativeContext::new()).await.unwrap();
        assert_eq!(session.phase(), Phase::Trial);
        assert_eq!(session.trial().trial_day, Some(1));
        assert_eq!(session.gate_status("trial_opening"), Some(GateStatus::InProgress));
    }

    #[tokio::test]
    async fn test_failed_progress_write_leaves_trial_record_alone() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut session = new_case(&temp_dir, 1).await;
        session.begin().await.unwrap();

        // A directory where the staging file belongs makes the progress write fail.
        let files = session.files().clone();
        let blocker = crate::persist::temp_sibling(&files.investigation_progress()).unwrap();
        std::fs::create_dir_all(&blocker).unwrap();

        let result = session.enter_trial(NarrativeContext::new()).await;
        assert!(matches!(result, Err(SessionError::Persist(_))));
        assert_eq!(session.phase(), Phase::Investigation);
        assert_eq!(session.trial().trial_status, TrialStatus::NotStarted);
        assert_eq!(session.trial().trial_day, None);
        let on_disk = TrialProgress::load_or_default(&files).await.unwrap();
        assert_eq!(on_disk.trial_status, TrialStatus::NotStarted);

        // Once the write can go through, the retry reuses the snapshot.
        std::fs::remove_dir(&blocker).unwrap();
        let handle = session.enter_trial(NarrativeContext::new()).await.unwrap();
        assert_eq!(session.phase(), Phase::Trial);
        assert_eq!(session.trial().trial_status, TrialStatus::InProgress);
        let snapshots = session.narrative().list_snapshots().await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].handle, handle);
    }

    #[tokio::test]
    async fn test_failed_resolution_keeps_trial_in_progress() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut session = new_case(&temp_dir, 1).await;
        session.begin().await.unwrap();
        session.enter_trial(NarrativeContext::new()).await.unwrap();
        for gate in ["trial_opening", "first_witness_battle"] {
            session.complete_gate(gate, NarrativeContext::new()).await.unwrap();
        }

        let files = session.files().clone();
        let blocker = crate::persist::temp_sibling(&files.investigation_progress()).unwrap();
        std::fs::create_dir_all(&blocker).unwrap();

        let result = session
            .complete_gate("final_revelation", NarrativeContext::new())
            .await;
        assert!(matches!(result, Err(SessionError::Persist(_))));
        assert_eq!(session.phase(), Phase::Trial);
        assert_eq!(session.trial().trial_status, TrialStatus::InProgress);
        let on_disk = TrialProgress::load_or_default(&files).await.unwrap();
        assert_eq!(on_disk.trial_status, TrialStatus::InProgress);
    }

    #[tokio::test]
    async fn test_trial_entry_snapshot_is_kept_apart_from_opening_gate() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut session = new_case(&temp_dir, 1).await;
        session.begin().await.unwrap();

        let entry = session.enter_trial(NarrativeContext::new()).await.unwrap();
        let opening = session
            .complete_gate("trial_opening", NarrativeContext::new())
            .await
            .unwrap();
        assert!(entry.as_str().starts_with("trial_opening_entry_"));
        assert_ne!(entry, opening);
    }

    #[tokio::test]
    async fn test_readiness_prediction() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut session = new_case(&temp_dir, 3).await;
        session.begin().await.unwrap();
        session
            .complete_gate("crime_scene_analysis", NarrativeContext::new())
            .await
            .unwrap();

        let readiness = session.predict_trial_readiness();
        assert!(!readiness.ready);
        assert_eq!(readiness.completed, 1);
        assert_eq!(readiness.required, 3);
        assert_eq!(
            readiness.next_gates,
            vec!["witness_interviews".to_string(), "evidence_breakthrough".to_string()]
        );
    }

    #[tokio::test]
    async fn test_evidence_is_tagged_with_gate() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut session = new_case(&temp_dir, 2).await;
        session.begin().await.unwrap();
        session.start_gate("investigation_start").await.unwrap();

        assert!(session.add_evidence("Kerosene receipt", "Dated the night before").await.unwrap());
        assert!(!session.add_evidence("Kerosene receipt", "Duplicate").await.unwrap());

        let item = session.progress().evidence("Kerosene receipt").unwrap();
        assert_eq!(item.discovered_at.as_deref(), Some("Gate: investigation_start"));
    }

    #[tokio::test]
    async fn test_location_must_be_available() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut session = new_case(&temp_dir, 2).await;

        let result = session.set_location("pier_7").await;
        assert!(matches!(result, Err(SessionError::LocationUnavailable(_))));

        session.set_location_available("pier_7", true).await.unwrap();
        session.set_location("pier_7").await.unwrap();
        assert_eq!(session.progress().current_location.as_deref(), Some("pier_7"));
    }

    #[tokio::test]
    async fn test_available_actions() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut session = new_case(&temp_dir, 1).await;
        assert_eq!(
            session.available_actions(),
            vec![AvailableAction::CheckStatus, AvailableAction::BeginInvestigation]
        );

        session.begin().await.unwrap();
        session.update_trust("Dock foreman", 2).await.unwrap();
        session.update_trust("Arsonist", -4).await.unwrap();

        let actions = session.available_actions();
        assert!(actions.contains(&AvailableAction::WorkOnGate("trial_opening".into())));
        assert!(actions.contains(&AvailableAction::TalkTo("Dock foreman".into())));
        assert!(!actions.contains(&AvailableAction::TalkTo("Arsonist".into())));
        assert!(actions.contains(&AvailableAction::StartTrial));
    }

    #[tokio::test]
    async fn test_adjudicate_combines_modifiers() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut session = new_case(&temp_dir, 2).await.with_die(LoadedDie::new([10]));

        let check = ActionCheck::new("Press the foreman", Difficulty::Hard)
            .with_evidence(2)
            .with_trust(8)
            .against(12);
        assert_eq!(check.total_modifier(), 3);

        let outcome = session.adjudicate(&check).await.unwrap();
        assert_eq!(outcome.total, 13);
        assert_eq!(outcome.succeeded, Some(true));
        assert_eq!(session.resolver().history().len(), 1);
    }

    #[tokio::test]
    async fn test_status_report() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let session = new_case(&temp_dir, 2).await;
        let status = session.status();
        assert_eq!(status.case_name, "harbor_fire");
        assert_eq!(status.pending_gates.len(), 4);
        assert!(status.to_string().contains("Phase: briefing"));
    }
}
