//! Prompts for chunk review.
//!
//! Every prompt lives here so a wording change touches one file and tests can
//! inspect the exact text without a live model. Callers can replace the
//! system prompt via [`crate::config::ReviewConfig::system_prompt`].

use crate::model::Chunk;
use crate::profile::ToleranceProfile;
use crate::tokens::canonical_items;

/// Default system message. Every provider is asked for a JSON object.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that responds in JSON. You review TAB (Testing, Adjusting, \
and Balancing) reports for HVAC systems and only ever answer with a single JSON object.";

/// Fixed output instruction appended to every review prompt.
pub const OUTPUT_INSTRUCTION: &str = r#"Identify every reading that is outside the specified tolerances.
For each issue, give the page number (for spreadsheets, the sheet index) and a
clear description of the problem. Quote the offending reading or label exactly
as it appears in the report data so it can be located in the document.

Respond with a JSON object of the form:
{"findings": [{"page": <int>, "issue": "<description>", "severity": "low|medium|high|critical"}]}

"severity" is optional. If there are no issues, respond with {"findings": []}."#;

/// The two messages sent for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewPrompt {
    pub chunk_index: usize,
    pub system: String,
    pub user: String,
}

/// Build the review prompt for `chunk` against `profile`.
///
/// Both payloads use their canonical JSON form so identical inputs always
/// produce byte-identical prompts.
pub fn review_prompt(
    chunk: &Chunk,
    profile: &ToleranceProfile,
    system_override: Option<&str>,
) -> ReviewPrompt {
    let user = format!(
        "You are an expert TAB (Testing, Adjusting, and Balancing) report analyst.\n\
Review the following data extracted from a TAB report and identify any issues\n\
based on the provided tolerance profile.\n\n\
Tolerance Profile:\n{}\n\n\
Report Data Chunk:\n{}\n\n{}",
        profile.canonical_json(),
        canonical_items(&chunk.items),
        OUTPUT_INSTRUCTION
    );
    ReviewPrompt {
        chunk_index: chunk.index,
        system: system_override.unwrap_or(DEFAULT_SYSTEM_PROMPT).to_string(),
        user,
    }
}
