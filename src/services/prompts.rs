//! System-prompt assembly.
//!
//! The system prompt is an ordered list of blocks, arranged for cache
//! efficiency: a stable phase prefix, then the large codebase snapshot,
//! then small per-iteration blocks. Exactly one block carries the
//! ephemeral cache marker (the snapshot when present, otherwise the
//! prefix); any byte change before the marker invalidates the
//! vendor-side cache.

use crate::domain::models::Phase;
use crate::domain::ports::{IterationContext, SystemBlock};

const PLANNER_PREFIX: &str = "\
You are an autonomous software engineer improving one repository over many \
iterations. Each iteration you choose a single concrete, small, mergeable \
change. Study the codebase snapshot and the context blocks below, use your \
tools to investigate, then call submit_plan exactly once with a short title \
and a PR-ready description. Prefer changes that fix real defects, improve \
test coverage, or complete pending ideas from your notes.";

const BUILDER_PREFIX: &str = "\
You are an autonomous software engineer implementing a planned change in \
one repository. Use the read tools to understand the code, then make the \
change with edit_file / create_file / delete_file. Edits use exact string \
replacement: the old string must match exactly one location. Keep the \
change minimal and consistent with the surrounding style. Stop when the \
change is complete.";

const FIXER_PREFIX: &str = "\
You are fixing a change of yours that failed continuous integration. The \
CI failure report and the current diff follow. Diagnose the failure, then \
repair the branch with the edit tools. Do not start over; amend the \
existing work.";

const REFLECT_PREFIX: &str = "\
You review one completed iteration of an autonomous software agent. Given \
the outcome and the full transcript, write a short reflection: what \
worked, what failed, and what to do differently next iteration. Be \
specific; this text is stored and read before future planning.";

const MEMORY_PREFIX: &str = "\
You maintain the working memory of an autonomous software agent. Answer \
with exactly what is asked for, without preamble.";

/// Stable per-phase prefix (the first system block).
pub fn phase_prefix(phase: Phase) -> &'static str {
    match phase {
        Phase::Planner => PLANNER_PREFIX,
        Phase::Builder => BUILDER_PREFIX,
        Phase::Fixer => FIXER_PREFIX,
        Phase::Reflect => REFLECT_PREFIX,
        Phase::Memory => MEMORY_PREFIX,
    }
}

/// Assemble the ordered system blocks for one call.
pub fn system_blocks(phase: Phase, context: &IterationContext) -> Vec<SystemBlock> {
    let mut blocks = Vec::new();

    match &context.codebase_snapshot {
        Some(snapshot) => {
            blocks.push(SystemBlock::plain(phase_prefix(phase)));
            blocks.push(SystemBlock::cached(format!(
                "# Codebase snapshot\n\n{snapshot}"
            )));
        }
        None => {
            blocks.push(SystemBlock::cached(phase_prefix(phase)));
        }
    }

    if phase == Phase::Planner {
        if let Some(coverage) = &context.coverage_summary {
            blocks.push(SystemBlock::plain(format!(
                "# Latest CI coverage\n\n{coverage}"
            )));
        }
        if let Some(git_log) = &context.git_log {
            blocks.push(SystemBlock::plain(format!(
                "# Recent commits\n\n{git_log}"
            )));
        }
        if let Some(memory) = &context.memory_context {
            blocks.push(SystemBlock::plain(format!("# Memory\n\n{memory}")));
        }
        if let Some(dead) = &context.dead_functions {
            blocks.push(SystemBlock::plain(format!(
                "# Possibly dead functions\n\n{dead}"
            )));
        }
    }

    blocks
}

/// Prompt for the memory phase: one-line summarization.
pub fn summarize_prompt(content: &str) -> String {
    format!(
        "Summarize the following note in one short line (under 100 \
         characters). Reply with the summary only.\n\n{content}"
    )
}

/// Prompt for the reflect phase.
pub fn reflect_prompt(outcome: &str, transcript: &str) -> String {
    format!(
        "Iteration outcome: {outcome}\n\nTranscript of the iteration \
         follows.\n\n{transcript}\n\nWrite your reflection."
    )
}

/// Prompt asking the model for improvement ideas.
pub fn ideas_prompt(recent_memories: &str) -> String {
    format!(
        "Given these recent outcomes, list up to three concrete \
         improvement ideas for the repository, one per line. Reply with \
         the ideas only.\n\n{recent_memories}"
    )
}
