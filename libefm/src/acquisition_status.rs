use std::path::PathBuf;

/// Progress messages sent from the acquisition thread to whoever drives it (UI or CLI)
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionStatus {
    Started {
        log_path: PathBuf,
    },
    /// An accepted round, already offset-corrected
    Round {
        timestamp: f64,
        values: Vec<i64>,
        clients: usize,
    },
    Rejected {
        line: String,
        reason: String,
    },
    PortFailed(String),
    Finished(AcquisitionCounters),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionCounters {
    pub logged: u64,
    pub rejected: u64,
    pub broadcast: u64,
}

impl AcquisitionCounters {
    pub fn total(&self) -> u64 {
        self.logged + self.rejected
    }
}
