//! Port to the text-generation service that narrates the case.
//!
//! The engine never talks to a model directly. It builds prompts from stored
//! snapshots and hands them to whatever [`Consultant`] the host supplies.

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a consultant.
#[derive(Debug, Error)]
pub enum ConsultError {
    #[error("Consultant unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Consultant request failed: {reason}")]
    Failed { reason: String },

    #[error("Consultant returned an empty response")]
    EmptyResponse,
}

/// Turns a prompt into prose.
#[async_trait]
pub trait Consultant: Send + Sync {
    async fn consult(&self, prompt: &str) -> Result<String, ConsultError>;
}

/// Prompt asking for a short continuity brief from a case summary.
pub fn continuity_brief_prompt(summary: &str) -> String {
    format!(
        "You are resuming an ongoing courtroom case. Using only the facts below, \
         write a short continuity brief for the player: who is accused, what is \
         known so far, and what remains unresolved. Do not invent new facts.\n\n{summary}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brief_prompt_embeds_summary() {
        let prompt = continuity_brief_prompt("CHARGES: Arson");
        assert!(prompt.ends_with("CHARGES: Arson"));
        assert!(prompt.contains("Do not invent new facts"));
    }
}
