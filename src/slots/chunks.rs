//! Streamed partial output of an in-flight run.
//!
//! The service re-sends the full partial state on every event, so each chunk
//! replaces the accumulator wholesale. Nothing is merged across chunks.

use serde_json::Value;

use super::Slot;
use crate::types::{ReasoningStep, RunChunk, ToolCall};

/// Latest partial result of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamAccumulator {
    pub output: Option<Value>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub reasoning_steps: Option<Vec<ReasoningStep>>,
}

impl From<&RunChunk> for StreamAccumulator {
    fn from(chunk: &RunChunk) -> Self {
        Self {
            output: chunk.task_output.clone(),
            tool_calls: chunk.tool_calls.clone(),
            reasoning_steps: chunk.reasoning_steps.clone(),
        }
    }
}

/// Replace the slot's accumulator with `chunk`, or clear it on `None`.
pub fn apply_chunk(slot: &mut Slot, chunk: Option<&RunChunk>) {
    slot.stream = chunk.map(StreamAccumulator::from);
}
