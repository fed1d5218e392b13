//! Backend selection.
//!
//! A [`Backend`] names a scheduling discipline. Each
//! [`ExecutionContext`](crate::context::ExecutionContext) is built for
//! exactly one backend; there is no process-wide current backend.
//!
//! # Supported Backends
//!
//! - `Cpu` — synchronous rayon pool (default)
//! - `Queued` — accelerator-style command queue with explicit barriers and sync

use crate::error::ContextError;
use crate::scheduler::{CpuScheduler, QueuedScheduler, Scheduler};
use core::convert::TryFrom;
use core::fmt;
use core::str::FromStr;

/// Enumeration of supported execution backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Backend {
    /// Blocking multi-worker CPU execution (default).
    #[default]
    Cpu = 0,
    /// Queued execution drained by [`sync`](crate::scheduler::Scheduler::sync).
    Queued,
}

impl Backend {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Queued => "queued",
        }
    }

    /// Creates the scheduler of this backend with `workers` threads.
    pub fn scheduler(self, workers: usize) -> Result<Box<dyn Scheduler>, ContextError> {
        Ok(match self {
            Self::Cpu => Box::new(CpuScheduler::new(workers)?),
            Self::Queued => Box::new(QueuedScheduler::new(workers)?),
        })
    }
}

impl TryFrom<u8> for Backend {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Cpu),
            1 => Ok(Self::Queued),
            _ => Err(()),
        }
    }
}

impl FromStr for Backend {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" | "sync" => Ok(Self::Cpu),
            "queued" | "queue" | "async" => Ok(Self::Queued),
            other => Err(ContextError::InvalidConfig(format!("unknown backend `{other}`"))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Discipline;

    #[test]
    fn parse_and_convert() {
        assert_eq!("CPU".parse::<Backend>().unwrap(), Backend::Cpu);
        assert_eq!(" queued ".parse::<Backend>().unwrap(), Backend::Queued);
        assert!("cuda".parse::<Backend>().is_err());
        assert_eq!(Backend::try_from(1), Ok(Backend::Queued));
        assert_eq!(Backend::try_from(7), Err(()));
        assert_eq!(Backend::default(), Backend::Cpu);
    }

    #[test]
    fn schedulers_match_backend() {
        let cpu = Backend::Cpu.scheduler(2).unwrap();
        let queued = Backend::Queued.scheduler(2).unwrap();
        assert_eq!(cpu.discipline(), Discipline::Synchronous);
        assert_eq!(queued.discipline(), Discipline::Queued);
    }
}
