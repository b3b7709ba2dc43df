//! Testing utilities for case sessions.
//!
//! This module provides deterministic stand-ins for everything a session
//! would otherwise take from the outside world:
//! - `LoadedDie` for scripted rolls
//! - `SteppingClock` for predictable snapshot timestamps
//! - `ScriptedConsultant` for briefs without a model behind them
//! - `UnwritableStore` for exercising failed snapshot writes

use crate::consult::{ConsultError, Consultant};
use crate::continuity::{CharacterProfile, EvidenceAnalysis, NarrativeContext, PartyFacts};
use crate::dice::{Die, MAX_TOTAL, MIN_TOTAL};
use crate::session::Clock;
use crate::store::{RecordStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;

/// A die that rolls scripted faces in order.
///
/// Once the script runs out the last face repeats.
#[derive(Debug, Clone)]
pub struct LoadedDie {
    faces: VecDeque<u8>,
    last: u8,
}

impl LoadedDie {
    pub fn new(faces: impl IntoIterator<Item = u8>) -> Self {
        let faces: VecDeque<u8> = faces
            .into_iter()
            .map(|f| f.clamp(MIN_TOTAL, MAX_TOTAL))
            .collect();
        Self { faces, last: 10 }
    }
}

impl Die for LoadedDie {
    fn roll_d20(&mut self) -> u8 {
        if let Some(face) = self.faces.pop_front() {
            self.last = face;
        }
        self.last
    }
}

/// A clock that advances one second every time it is read.
#[derive(Debug)]
pub struct SteppingClock {
    start: DateTime<Utc>,
    ticks: AtomicI64,
}

impl SteppingClock {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            start,
            ticks: AtomicI64::new(0),
        }
    }
}

impl Default for SteppingClock {
    fn default() -> Self {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
            .single()
            .unwrap_or_default();
        Self::starting_at(start)
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        self.start + Duration::seconds(tick)
    }
}

/// A consultant that replays scripted replies and remembers its prompts.
#[derive(Debug, Default)]
pub struct ScriptedConsultant {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConsultant {
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far, in order.
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl Consultant for ScriptedConsultant {
    async fn consult(&self, prompt: &str) -> Result<String, ConsultError> {
        self.prompts.lock().await.push(prompt.to_string());
        self.replies
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| ConsultError::Unavailable {
                reason: "no scripted replies left".to_string(),
            })
    }
}

/// A record store whose writes always fail.
#[derive(Debug, Default)]
pub struct UnwritableStore;

#[async_trait]
impl RecordStore for UnwritableStore {
    async fn append(&self, _id: &str, _contents: &str) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "store is read-only",
        )))
    }

    async fn read(&self, id: &str) -> Result<String, StoreError> {
        Err(StoreError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }
}

/// A filled-in context for the harbor fire sample case.
pub fn sample_context() -> NarrativeContext {
    NarrativeContext::new()
        .with_primary_charge("Arson")
        .with_victim(PartyFacts::named("Harbor Warehouse 7").with_status("Destroyed"))
        .with_defendant(
            PartyFacts::named("Marcus Reed")
                .with_relationship("Night watchman")
                .with_occupation("Security guard"),
        )
        .with_incident_summary("The warehouse burned shortly after midnight.")
        .with_stakes("Ten years in prison")
        .with_case_summary("A watchman is accused of burning the warehouse he guarded.")
        .with_revelation("The fire started in two places at once")
        .with_mystery("Who bought the kerosene?")
        .with_character(
            "Sandra Watts",
            CharacterProfile {
                role: Some("Witness".to_string()),
                key_traits: vec!["Nervous".to_string()],
                secrets: vec!["Owes money to the owner".to_string()],
                player_relationship: Some("Wary".to_string()),
            },
        )
        .with_evidence_analysis(
            "Kerosene receipt",
            EvidenceAnalysis {
                significance: Some("Purchased by someone other than the defendant".to_string()),
                implications: vec!["Points to a second person".to_string()],
                trial_value: Some("High".to_string()),
            },
        )
        .with_strategy("Show the fire was set while the defendant was on patrol")
        .with_dramatic_tension("The owner is pressing for a quick conviction")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loaded_die_repeats_last_face() {
        let mut die = LoadedDie::new([3, 25]);
        assert_eq!(die.roll_d20(), 3);
        assert_eq!(die.roll_d20(), 20);
        assert_eq!(die.roll_d20(), 20);
    }

    #[test]
    fn test_stepping_clock_advances() {
        let clock = SteppingClock::default();
        let first = clock.now();
        let second = clock.now();
        assert_eq!(second - first, Duration::seconds(1));
    }

    #[tokio::test]
    async fn test_scripted_consultant() {
        let consultant = ScriptedConsultant::new(["Brief one"]);
        assert_eq!(consultant.consult("first").await.unwrap(), "Brief one");
        assert!(consultant.consult("second").await.is_err());
        assert_eq!(consultant.prompts().await, vec!["first", "second"]);
    }
}
