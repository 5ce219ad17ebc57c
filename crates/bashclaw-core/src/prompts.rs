// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! System prompt assembly.
//!
//! Grounded on the section-stitching pattern in the teacher's prompt
//! builder: a fixed stable preamble, followed by optional blocks appended
//! only when they have content, with a custom per-agent prompt taking the
//! place of the teacher's free-form `append` block.

use chrono::Local;

const BASE_PREAMBLE: &str = "You are a tool-using assistant reachable over multiple \
channels. Use the tools available to you when they help answer the request; reply \
directly when they don't. Keep responses concise and relevant to the channel you were \
addressed on.";

/// Assembles the system prompt for one turn: the base preamble, the current
/// date/time (so date-relative requests resolve correctly), the list of tool
/// names the agent may call this turn, and an optional per-agent override
/// appended verbatim.
pub fn system_prompt(custom: Option<&str>, effective_tools: &[String]) -> String {
    let mut sections = vec![BASE_PREAMBLE.to_string()];

    sections.push(format!(
        "Current date/time: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S %Z")
    ));

    if !effective_tools.is_empty() {
        sections.push(format!("Tools available this turn: {}", effective_tools.join(", ")));
    } else {
        sections.push("No tools are available this turn.".to_string());
    }

    if let Some(custom) = custom {
        if !custom.trim().is_empty() {
            sections.push(custom.trim().to_string());
        }
    }

    sections.join("\n\n")
}
