//! Outcome resolution for uncertain player actions.
//!
//! Every check rolls a d20, adds a situational modifier and clamps the total
//! back into 1..=20, so no stack of modifiers can make an outcome certain.
//! The total then maps onto a fixed ladder of [`SuccessTier`]s.
//!
//! Modifiers are derived by the caller from the pure lookup helpers
//! ([`Difficulty::modifier`], [`evidence_modifier`], [`trust_modifier`]) and
//! summed before the roll; the resolver never looks at game state itself.

use crate::persist::{self, CaseFiles, PersistError};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Lowest possible check total.
pub const MIN_TOTAL: u8 = 1;

/// Highest possible check total.
pub const MAX_TOTAL: u8 = 20;

/// Number of outcomes kept in a case's roll history.
pub const MAX_HISTORY: usize = 100;

/// Error type for outcome resolution.
#[derive(Debug, Error)]
pub enum DiceError {
    #[error("Target difficulty must be between 1 and 20, got {0}")]
    InvalidTarget(i32),

    #[error("Unknown difficulty: {0}")]
    UnknownDifficulty(String),

    #[error("Failed to record roll: {0}")]
    Persist(#[from] PersistError),
}

/// Success ladder for a clamped check total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessTier {
    CriticalFailure,
    BadFailure,
    Failure,
    PartialSuccess,
    Success,
    GreatSuccess,
    CriticalSuccess,
}

impl SuccessTier {
    /// Classify a check total.
    pub fn from_total(total: u8) -> Self {
        match total {
            18.. => SuccessTier::CriticalSuccess,
            15..=17 => SuccessTier::GreatSuccess,
            12..=14 => SuccessTier::Success,
            8..=11 => SuccessTier::PartialSuccess,
            5..=7 => SuccessTier::Failure,
            2..=4 => SuccessTier::BadFailure,
            _ => SuccessTier::CriticalFailure,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SuccessTier::CriticalFailure => "critical_failure",
            SuccessTier::BadFailure => "bad_failure",
            SuccessTier::Failure => "failure",
            SuccessTier::PartialSuccess => "partial_success",
            SuccessTier::Success => "success",
            SuccessTier::GreatSuccess => "great_success",
            SuccessTier::CriticalSuccess => "critical_success",
        }
    }

    /// Partial success or better.
    pub fn is_success(&self) -> bool {
        *self >= SuccessTier::PartialSuccess
    }
}

impl fmt::Display for SuccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How hard an action is, independent of who attempts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Trivial,
    Easy,
    Moderate,
    Hard,
    VeryHard,
    NearlyImpossible,
}

impl Difficulty {
    pub fn modifier(&self) -> i32 {
        match self {
            Difficulty::Trivial => 5,
            Difficulty::Easy => 3,
            Difficulty::Moderate => 0,
            Difficulty::Hard => -2,
            Difficulty::VeryHard => -4,
            Difficulty::NearlyImpossible => -6,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Difficulty::Trivial => "trivial",
            Difficulty::Easy => "easy",
            Difficulty::Moderate => "moderate",
            Difficulty::Hard => "hard",
            Difficulty::VeryHard => "very_hard",
            Difficulty::NearlyImpossible => "nearly_impossible",
        }
    }
}

impl FromStr for Difficulty {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "trivial" => Ok(Difficulty::Trivial),
            "easy" => Ok(Difficulty::Easy),
            "moderate" => Ok(Difficulty::Moderate),
            "hard" => Ok(Difficulty::Hard),
            "very_hard" => Ok(Difficulty::VeryHard),
            "nearly_impossible" => Ok(Difficulty::NearlyImpossible),
            _ => Err(DiceError::UnknownDifficulty(s.to_string())),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Modifier for a difficulty label; unknown labels count as moderate.
pub fn difficulty_modifier(label: &str) -> i32 {
    label.parse::<Difficulty>().map(|d| d.modifier()).unwrap_or(0)
}

/// Modifier for the number of supporting evidence pieces.
pub fn evidence_modifier(evidence_count: usize) -> i32 {
    match evidence_count {
        0 => 0,
        1 => 1,
        2 => 2,
        _ => 3,
    }
}

/// Modifier for a character's trust in the player.
pub fn trust_modifier(trust_level: i32) -> i32 {
    match trust_level {
        8.. => 3,
        5..=7 => 1,
        0..=4 => 0,
        -3..=-1 => -1,
        _ => -3,
    }
}

/// Unique identifier for a roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RollId(Uuid);

impl RollId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RollId {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a single check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollOutcome {
    pub id: RollId,
    pub base_roll: u8,
    pub modifier: i32,
    /// Base plus modifier, clamped into 1..=20.
    pub total: u8,
    pub success_level: SuccessTier,
    pub description: String,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_difficulty: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub succeeded: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<i32>,
}

impl RollOutcome {
    /// Build an outcome from an already rolled base value.
    pub fn new(base_roll: u8, modifier: i32, description: impl Into<String>) -> Self {
        let total = (i64::from(base_roll) + i64::from(modifier))
            .clamp(i64::from(MIN_TOTAL), i64::from(MAX_TOTAL)) as u8;

        Self {
            id: RollId::new(),
            base_roll,
            modifier,
            total,
            success_level: SuccessTier::from_total(total),
            description: description.into(),
            timestamp: Utc::now(),
            target_difficulty: None,
            succeeded: None,
            margin: None,
        }
    }

    /// Evaluate this outcome against a target difficulty.
    pub fn against(mut self, target: u8) -> Self {
        self.target_difficulty = Some(target);
        self.succeeded = Some(self.total >= target);
        self.margin = Some(i32::from(self.total) - i32::from(target));
        self
    }

    pub fn is_skill_check(&self) -> bool {
        self.target_difficulty.is_some()
    }
}

impl fmt::Display for RollOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} {} {} = {} ({})",
            self.description,
            self.base_roll,
            if self.modifier < 0 { '-' } else { '+' },
            self.modifier.unsigned_abs(),
            self.total,
            self.success_level
        )?;
        if let (Some(target), Some(succeeded)) = (self.target_difficulty, self.succeeded) {
            let verdict = if succeeded { "SUCCESS" } else { "FAILURE" };
            write!(f, " vs {target}: {verdict}")?;
        }
        Ok(())
    }
}

/// Source of d20 values.
pub trait Die: Send {
    /// Roll a value in 1..=20.
    fn roll_d20(&mut self) -> u8;
}

/// A fair d20 backed by a seedable RNG.
#[derive(Debug)]
pub struct RandomDie {
    rng: StdRng,
}

impl RandomDie {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// A reproducible die.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomDie {
    fn default() -> Self {
        Self::new()
    }
}

impl Die for RandomDie {
    fn roll_d20(&mut self) -> u8 {
        self.rng.gen_range(MIN_TOTAL..=MAX_TOTAL)
    }
}

/// Rolls checks and keeps the rolling history for one case.
pub struct OutcomeResolver {
    die: Box<dyn Die>,
    history: Vec<RollOutcome>,
    files: Option<CaseFiles>,
}

impl OutcomeResolver {
    /// A resolver that keeps its history in memory only.
    pub fn new() -> Self {
        Self {
            die: Box::new(RandomDie::new()),
            history: Vec::new(),
            files: None,
        }
    }

    /// A resolver bound to a case; the persisted history is loaded best-effort.
    pub async fn for_case(files: CaseFiles) -> Self {
        let history = load_history(&files).await;
        Self {
            die: Box::new(RandomDie::new()),
            history,
            files: Some(files),
        }
    }

    /// Replace the die (useful for testing).
    pub fn with_die(mut self, die: impl Die + 'static) -> Self {
        self.die = Box::new(die);
        self
    }

    /// Roll a d20 plus `modifier` and classify the clamped total.
    pub async fn roll_check(
        &mut self,
        modifier: i32,
        description: &str,
    ) -> Result<RollOutcome, DiceError> {
        let outcome = RollOutcome::new(self.die.roll_d20(), modifier, description);
        self.record(outcome).await
    }

    /// Roll a check and compare it against a target difficulty in 1..=20.
    pub async fn skill_check(
        &mut self,
        target_difficulty: i32,
        modifier: i32,
        description: &str,
    ) -> Result<RollOutcome, DiceError> {
        let target = u8::try_from(target_difficulty)
            .ok()
            .filter(|t| (MIN_TOTAL..=MAX_TOTAL).contains(t))
            .ok_or(DiceError::InvalidTarget(target_difficulty))?;

        let outcome =
            RollOutcome::new(self.die.roll_d20(), modifier, description).against(target);
        self.record(outcome).await
    }

    /// All retained outcomes, oldest first.
    pub fn history(&self) -> &[RollOutcome] {
        &self.history
    }

    /// The most recent `count` outcomes, oldest first.
    pub fn recent(&self, count: usize) -> &[RollOutcome] {
        let start = self.history.len().saturating_sub(count);
        &self.history[start..]
    }

    async fn record(&mut self, outcome: RollOutcome) -> Result<RollOutcome, DiceError> {
        if let Some(files) = &self.files {
            append_to_log(files, &outcome).await?;
        }

        debug!(
            description = %outcome.description,
            total = outcome.total,
            tier = %outcome.success_level,
            "resolved check"
        );

        self.history.push(outcome.clone());
        truncate_oldest(&mut self.history);
        Ok(outcome)
    }
}

impl Default for OutcomeResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Load a case's roll log. Missing or corrupt logs read as empty.
pub async fn load_history(files: &CaseFiles) -> Vec<RollOutcome> {
    let path = files.dice_log();
    match persist::read_json_optional::<Vec<RollOutcome>>(&path).await {
        Ok(Some(mut rolls)) => {
            truncate_oldest(&mut rolls);
            rolls
        }
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable roll log, starting fresh");
            Vec::new()
        }
    }
}

/// Append one outcome to the persisted log, keeping the newest entries.
pub async fn append_to_log(files: &CaseFiles, outcome: &RollOutcome) -> Result<(), PersistError> {
    let mut rolls = load_history(files).await;
    rolls.push(outcome.clone());
    truncate_oldest(&mut rolls);
    persist::write_json_atomic(files.dice_log(), &rolls).await
}

fn truncate_oldest(rolls: &mut Vec<RollOutcome>) {
    if rolls.len() > MAX_HISTORY {
        let excess = rolls.len() - MAX_HISTORY;
        rolls.drain(..excess);
    }
}
