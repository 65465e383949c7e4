//! Per-phase state machine
//!
//! Every phase moves through `pending -> running -> {validated, degraded,
//! failed}`. A phase may re-enter `running` through `retrying` at most
//! `RETRY_BUDGET` times; any other move is rejected.

use thiserror::Error;

use crate::model::{PhaseName, PhaseRecord, PhaseState};

pub const RETRY_BUDGET: u8 = 1;

const PHASES: [PhaseName; 4] = [
    PhaseName::Identity,
    PhaseName::Extraction,
    PhaseName::Validation,
    PhaseName::Synthesis,
];

#[derive(Debug, Clone, Error, PartialEq)]
#[non_exhaustive]
pub enum TransitionError {
    #[error("Illegal transition for {phase:?}: {from:?} -> {to:?}")]
    Illegal {
        phase: PhaseName,
        from: PhaseState,
        to: PhaseState,
    },

    #[error("Retry budget exhausted for {0:?}")]
    BudgetExhausted(PhaseName),
}

fn is_legal(from: PhaseState, to: PhaseState) -> bool {
    use PhaseState::*;
    matches!(
        (from, to),
        (Pending, Running)
            | (Running, Validated)
            | (Running, Degraded)
            | (Running, Failed)
            | (Running, Retrying)
            | (Validated, Retrying)
            | (Degraded, Retrying)
            | (Retrying, Running)
    )
}

#[derive(Debug, Clone)]
pub struct PhaseTracker {
    records: Vec<PhaseRecord>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            records: PHASES
                .iter()
                .map(|phase| PhaseRecord {
                    phase: *phase,
                    state: PhaseState::Pending,
                    retries_used: 0,
                    retry_budget: RETRY_BUDGET,
                    notes: Vec::new(),
                })
                .collect(),
        }
    }

    pub fn state(&self, phase: PhaseName) -> PhaseState {
        self.record(phase).state
    }

    pub fn can_retry(&self, phase: PhaseName) -> bool {
        let record = self.record(phase);
        record.retries_remaining() > 0 && is_legal(record.state, PhaseState::Retrying)
    }

    pub fn start(&mut self, phase: PhaseName) -> Result<(), TransitionError> {
        self.transition(phase, PhaseState::Running)
    }

    /// Enter `retrying` and immediately resume `running`, spending one retry
    pub fn retry(&mut self, phase: PhaseName, reason: impl Into<String>) -> Result<(), TransitionError> {
        if self.record(phase).retries_remaining() == 0 {
            return Err(TransitionError::BudgetExhausted(phase));
        }
        self.transition(phase, PhaseState::Retrying)?;
        self.transition(phase, PhaseState::Running)?;

        let reason = reason.into();
        tracing::info!(phase = ?phase, reason = %reason, "Retrying phase");
        let record = self.record_mut(phase);
        record.retries_used += 1;
        record.notes.push(format!("retry: {}", reason));
        Ok(())
    }

    pub fn validated(&mut self, phase: PhaseName) -> Result<(), TransitionError> {
        self.transition(phase, PhaseState::Validated)
    }

    pub fn degraded(&mut self, phase: PhaseName, note: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(phase, PhaseState::Degraded)?;
        self.note(phase, note);
        Ok(())
    }

    pub fn failed(&mut self, phase: PhaseName, note: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(phase, PhaseState::Failed)?;
        self.note(phase, note);
        Ok(())
    }

    pub fn note(&mut self, phase: PhaseName, note: impl Into<String>) {
        self.record_mut(phase).notes.push(note.into());
    }

    pub fn into_records(self) -> Vec<PhaseRecord> {
        self.records
    }

    fn transition(&mut self, phase: PhaseName, to: PhaseState) -> Result<(), TransitionError> {
        let from = self.record(phase).state;
        if !is_legal(from, to) {
            return Err(TransitionError::Illegal { phase, from, to });
        }
        tracing::debug!(phase = ?phase, from = ?from, to = ?to, "Phase transition");
        self.record_mut(phase).state = to;
        Ok(())
    }

    fn record(&self, phase: PhaseName) -> &PhaseRecord {
        let index = PHASES.iter().position(|p| *p == phase).unwrap_or_default();
        &self.records[index]
    }

    fn record_mut(&mut self, phase: PhaseName) -> &mut PhaseRecord {
        let index = PHASES.iter().position(|p| *p == phase).unwrap_or_default();
        &mut self.records[index]
    }
}
