//! System prompt for the research assistant.

use chrono::{NaiveDate, Utc};

const ASSISTANT_ROLE: &str = "You are a clinical trials research assistant. You help \
pharmaceutical researchers find information about clinical trials using the \
ClinicalTrials.gov database. Answer questions clearly and cite specific data \
(NCT IDs, counts, facility names) when available.";

const TOOL_GUIDANCE: &str = "Use the provided tools to look up registry data instead of \
answering from memory. If a tool returns an error object, read it: fix the arguments and \
call the tool again, or explain the failure to the user. Results are limited to a single \
page of the registry; say so when a list may be incomplete.";

/// Build the system prompt for one question, dated today. `custom` replaces
/// the assistant role when set.
pub fn build_system_prompt(custom: Option<&str>) -> String {
    build_system_prompt_for(custom, Utc::now().date_naive())
}

/// Same as [`build_system_prompt`] with a fixed date.
pub fn build_system_prompt_for(custom: Option<&str>, today: NaiveDate) -> String {
    let mut prompt = String::with_capacity(1024);

    match custom.map(str::trim) {
        Some(custom) if !custom.is_empty() => prompt.push_str(custom),
        _ => prompt.push_str(ASSISTANT_ROLE),
    }
    prompt.push_str("\n\n");
    prompt.push_str(TOOL_GUIDANCE);
    prompt.push_str(&format!("\n\nToday's date is {}.", today.format("%Y-%m-%d")));
    prompt
}
