//! Finalized call aggregate.

use crate::leg::{CallDirection, Leg};

/// One finalized call, emitted to the sink with its ordered legs.
#[derive(Debug, Clone, Default)]
pub struct Call {
    pub global_call_id: String,
    pub thread_id: Option<String>,
    pub call_direction: CallDirection,
    pub total_legs: usize,
    pub is_answered: bool,
    /// Maximum (not sum) of answered-leg durations, in seconds.
    pub total_duration: u64,
    pub caller_extension: Option<String>,
    pub caller_external: Option<String>,
    pub dialed_number: Option<String>,
    pub original_dialed_digits: Option<String>,
    pub hunt_group_number: Option<String>,
    pub extension: Option<String>,
    pub legs: Vec<Leg>,
}

impl Call {
    /// Earliest leg connect time, used for deterministic emission order.
    pub fn earliest_connect_time(&self) -> &str {
        self.legs
            .iter()
            .map(|l| l.in_leg_connect_time.as_deref().unwrap_or(""))
            .min()
            .unwrap_or("")
    }
}
