//! Capability state machine.
//!
//! ```text
//! Uninit --initialize--> Baseline --want/need(c)--> Elevated(c)
//!                           ^                           |
//!                           +----------drop-------------+
//! any --drop_forever--> DroppedForever (terminal)
//! ```
//!
//! Outside a bracket the effective set is empty. Inside one it holds exactly
//! one capability, taken from the baseline computed at initialization.

use super::{Capability, CapabilityMask, CapabilitySets, PrivilegeBackend};
use crate::config::types::{PrivilegeError, Result};
use crate::observability::{DiagnosticKind, DiagnosticSink, LogSink, WarnOnce};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninit,
    Baseline(CapabilityMask),
    Elevated {
        baseline: CapabilityMask,
        active: Capability,
    },
    DroppedForever,
}

/// Owner of the process capability sets during jail construction.
///
/// Owned by the launcher and lent out by `&mut`, so only one bracket can be
/// open at any time.
pub struct CapabilityState<B: PrivilegeBackend> {
    backend: B,
    phase: Phase,
    warnings: WarnOnce,
    sink: Box<dyn DiagnosticSink>,
}

/// Baseline for a given set of starting capabilities: the candidates the
/// process actually holds in its permitted set. SYS_ADMIN is mandatory.
pub fn compute_baseline(current: &CapabilitySets) -> Result<CapabilityMask> {
    let baseline = current.permitted.intersection(CapabilityMask::candidates());
    if !baseline.contains(Capability::SysAdmin) {
        return Err(PrivilegeError::MissingSysAdmin);
    }
    Ok(baseline)
}

impl<B: PrivilegeBackend> CapabilityState<B> {
    pub fn new(backend: B) -> Self {
        Self::with_sink(backend, Box::new(LogSink))
    }

    pub fn with_sink(backend: B, sink: Box<dyn DiagnosticSink>) -> Self {
        Self {
            backend,
            phase: Phase::Uninit,
            warnings: WarnOnce::new(),
            sink,
        }
    }

    /// Compute the baseline and install it: permitted = baseline, effective
    /// and inheritable empty. Later calls return the existing baseline untouched.
    pub fn initialize(&mut self) -> Result<CapabilityMask> {
        match self.phase {
            Phase::Uninit => {}
            Phase::Baseline(baseline) | Phase::Elevated { baseline, .. } => return Ok(baseline),
            Phase::DroppedForever => return Err(PrivilegeError::DroppedForever),
        }

        let current = self.backend.read().map_err(PrivilegeError::CapabilityRead)?;
        let baseline = compute_baseline(&current)?;
        self.backend
            .apply(&CapabilitySets::baseline(baseline))
            .map_err(PrivilegeError::Restore)?;
        self.phase = Phase::Baseline(baseline);

        log::info!("Capability baseline: {}", baseline);
        Ok(baseline)
    }

    /// Raise `cap` as the only effective capability.
    ///
    /// Unavailable capabilities and capset failures are recoverable and leave
    /// the effective set empty.
    pub fn want(&mut self, cap: Capability) -> Result<()> {
        let baseline = match self.phase {
            Phase::Baseline(baseline) => baseline,
            Phase::Uninit => return Err(PrivilegeError::NotInitialized),
            Phase::Elevated { active, .. } => {
                return Err(PrivilegeError::AlreadyElevated {
                    active,
                    requested: cap,
                })
            }
            Phase::DroppedForever => return Err(PrivilegeError::DroppedForever),
        };

        if !baseline.contains(cap) {
            log::debug!("{} requested but not in baseline {}", cap, baseline);
            return Err(PrivilegeError::Unavailable(cap));
        }

        let sets = CapabilitySets {
            permitted: baseline,
            effective: CapabilityMask::of(cap),
            inheritable: CapabilityMask::empty(),
        };
        self.backend
            .apply(&sets)
            .map_err(|source| PrivilegeError::Elevation {
                capability: cap,
                source,
            })?;
        self.phase = Phase::Elevated {
            baseline,
            active: cap,
        };

        log::debug!("Raised {}", cap);
        Ok(())
    }

    /// Like [`want`](Self::want), for callers with no fallback: any failure is fatal.
    pub fn need(&mut self, cap: Capability) -> Result<()> {
        self.want(cap).map_err(|err| {
            if err.is_internal() {
                err
            } else {
                PrivilegeError::Required {
                    capability: cap,
                    source: Box::new(err),
                }
            }
        })
    }

    /// Return to the baseline projection. A no-op raise-wise when nothing is active.
    pub fn drop(&mut self) -> Result<()> {
        let (baseline, active) = match self.phase {
            Phase::Baseline(baseline) => (baseline, None),
            Phase::Elevated { baseline, active } => (baseline, Some(active)),
            Phase::Uninit => return Err(PrivilegeError::NotInitialized),
            Phase::DroppedForever => return Err(PrivilegeError::DroppedForever),
        };

        self.backend
            .apply(&CapabilitySets::baseline(baseline))
            .map_err(PrivilegeError::Restore)?;
        self.phase = Phase::Baseline(baseline);

        if let Some(active) = active {
            log::debug!("Dropped {}", active);
        }
        Ok(())
    }

    /// Empty all three sets and forget the baseline. Irreversible.
    pub fn drop_forever(&mut self) -> Result<()> {
        self.backend
            .apply(&CapabilitySets::empty())
            .map_err(PrivilegeError::Restore)?;
        self.phase = Phase::DroppedForever;

        log::info!("Dropped all capabilities for good");
        Ok(())
    }

    pub fn baseline(&self) -> Option<CapabilityMask> {
        match self.phase {
            Phase::Baseline(baseline) | Phase::Elevated { baseline, .. } => Some(baseline),
            Phase::Uninit | Phase::DroppedForever => None,
        }
    }

    /// The capability currently raised, if a bracket is open.
    pub fn active(&self) -> Option<Capability> {
        match self.phase {
            Phase::Elevated { active, .. } => Some(active),
            _ => None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.phase, Phase::Baseline(_) | Phase::Elevated { .. })
    }

    pub fn is_dropped_forever(&self) -> bool {
        self.phase == Phase::DroppedForever
    }

    /// Report `kind` through the sink the first time it happens in this process.
    pub(crate) fn warn_once(&mut self, kind: DiagnosticKind) -> bool {
        self.warnings.warn(self.sink.as_ref(), kind)
    }
}
