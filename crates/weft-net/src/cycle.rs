use serde::{Deserialize, Serialize};
use weft_smt::value::Decoded;

/// One append-only record of a priority's claim on a port cycle's slots.
///
/// The ledger is bookkeeping, not an allocator: entries are recorded as the
/// extractor visits fragments, never reused or conflict-checked here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotUse {
    pub priority: u32,
    pub starts: Vec<Decoded>,
    pub durations: Vec<Decoded>,
}

/// A port's recurring schedule window, divided into priority-indexed slots.
///
/// `start` and `duration` stay `None` until a solved model is walked back
/// into the topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    pub num_priorities: u32,
    pub num_slots: u32,
    pub start: Option<f64>,
    pub duration: Option<f64>,
    pub slot_ledger: Vec<SlotUse>,
}

impl Cycle {
    pub fn new(num_priorities: u32, num_slots: u32) -> Self {
        Self {
            num_priorities,
            num_slots,
            start: None,
            duration: None,
            slot_ledger: Vec::new(),
        }
    }

    /// Record that `priority` consumed the given slot start/duration lists.
    pub fn record_slot_use(
        &mut self,
        priority: u32,
        starts: Vec<Decoded>,
        durations: Vec<Decoded>,
    ) {
        self.slot_ledger.push(SlotUse {
            priority,
            starts,
            durations,
        });
    }
}
