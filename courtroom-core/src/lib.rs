//! Case progression and narrative continuity for courtroom mystery games.
//!
//! This crate provides:
//! - Case length configuration: gate schedules and trial trigger points
//! - d20 outcome resolution with a persisted roll history
//! - Write-once narrative snapshots taken at every stage gate
//! - A session that walks a case from briefing through trial to resolution
//!
//! # Quick Start
//!
//! ```ignore
//! use courtroom_core::{CaseLength, CaseSession, ConfigRegistry, NarrativeContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ConfigRegistry::builtin();
//!     let mut session =
//!         CaseSession::create("cases/harbor_fire", registry.get(), CaseLength::new(2)).await?;
//!
//!     session.begin().await?;
//!     let context = NarrativeContext::new().with_primary_charge("Arson");
//!     session.complete_gate("investigation_start", context.clone()).await?;
//!     session.enter_trial(context).await?;
//!
//!     println!("{}", session.status());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod consult;
pub mod continuity;
pub mod dice;
pub mod persist;
pub mod session;
pub mod state;
pub mod store;
pub mod testing;

// Primary public API
pub use config::{CaseConfig, CaseLength, ConfigError, ConfigRegistry, ConfigSource, GateKind};
pub use consult::{ConsultError, Consultant};
pub use continuity::{
    summarize, ContinuityError, NarrativeContext, NarrativeSnapshot, NarrativeStore,
    SnapshotHandle, SnapshotInfo,
};
pub use dice::{Difficulty, OutcomeResolver, RollOutcome, SuccessTier};
pub use persist::CaseFiles;
pub use session::{ActionCheck, AvailableAction, CaseSession, CaseStatus, SessionError};
pub use state::{GateStatus, InvestigationProgress, Phase, TrialProgress, TrialStatus};
pub use store::{FileRecordStore, MemoryRecordStore, RecordStore, StoreError};
