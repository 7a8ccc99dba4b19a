use crate::error::PipelineError;
use resmon_addon::ResourceKind;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::SystemTime;

const MAX_FAULTS: usize = 128;

/// One reported operational fault.
#[derive(Debug, Clone)]
pub struct Fault {
    pub kind: Option<ResourceKind>,
    pub error: PipelineError,
    pub at: SystemTime,
}

/// Bounded log of the most recent faults; older entries fall off the front.
#[derive(Debug, Default)]
pub struct FaultLog {
    entries: Mutex<VecDeque<Fault>>,
}

impl FaultLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, error: PipelineError) {
        let fault = Fault {
            kind: error.kind(),
            error,
            at: SystemTime::now(),
        };

        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if entries.len() >= MAX_FAULTS {
            entries.pop_front();
        }
        entries.push_back(fault);
    }

    /// All retained faults, oldest first.
    pub fn all(&self) -> Vec<Fault> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Retained faults scoped to one kind.
    pub fn for_kind(&self, kind: ResourceKind) -> Vec<Fault> {
        self.all()
            .into_iter()
            .filter(|fault| fault.kind == Some(kind))
            .collect()
    }
}
