//! Pairing state machine.
//!
//! [`PairingMachine`] owns the current [`PairState`] and the discovery
//! record being assembled. Every transition is a named method that runs
//! under one mutex and returns what the caller must do next; the caller
//! issues receiver commands only after the method has returned, so no
//! register exchange ever happens with the lock held.
//!
//! ```text
//!               start (bolt)                 record filled
//! NotPairing ───────────────▶ Discovering ───────────────▶ FindingPasskey
//!     ▲  │                        │                             │
//!     │  │ start (legacy)         │ discovering = false          │ passkey
//!     │  └──────────────▶ Pairing ◀───────────────────────────────┘
//!     │                      │
//!     └──────────────────────┘ pairing = false (also from FindingPasskey)
//! ```
//!
//! `stop` returns to `NotPairing` from any state. Reports that do not fit
//! the current state change nothing.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use rxmon_types::{DiscoveryRecord, DiscoveryStatus, PairStatus, ParseResult, Report};

use crate::error::{Error, Result};
use crate::receiver::ReceiverKind;

/// Phase of a pairing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PairState {
    /// No pairing attempt is running.
    #[default]
    NotPairing,
    /// A Bolt receiver is looking for devices.
    Discovering,
    /// A device was found; waiting for the receiver to request a passkey.
    FindingPasskey,
    /// The receiver accepts a pairing.
    Pairing,
}

impl fmt::Display for PairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairState::NotPairing => write!(f, "not pairing"),
            PairState::Discovering => write!(f, "discovering"),
            PairState::FindingPasskey => write!(f, "finding passkey"),
            PairState::Pairing => write!(f, "pairing"),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: PairState,
    record: DiscoveryRecord,
}

impl Inner {
    fn reset(&mut self, state: PairState) {
        self.state = state;
        self.record = DiscoveryRecord::default();
    }
}

/// Mutex-guarded pairing state and discovery record.
#[derive(Debug, Default)]
pub struct PairingMachine {
    inner: Mutex<Inner>,
}

impl PairingMachine {
    /// Create a machine in [`PairState::NotPairing`].
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state.
    pub fn state(&self) -> PairState {
        self.lock().state
    }

    /// Snapshot of the discovery record being assembled.
    pub fn record(&self) -> DiscoveryRecord {
        self.lock().record.clone()
    }

    /// Begin a pairing attempt and return the state entered.
    ///
    /// Bolt receivers enter [`PairState::Discovering`], legacy receivers
    /// [`PairState::Pairing`]. The caller then issues the matching start
    /// command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PairingInProgress`] if an attempt is already
    /// running; the state is left unchanged.
    pub fn begin(&self, kind: ReceiverKind) -> Result<PairState> {
        let mut inner = self.lock();
        if inner.state != PairState::NotPairing {
            return Err(Error::PairingInProgress);
        }
        let next = match kind {
            ReceiverKind::Bolt => PairState::Discovering,
            ReceiverKind::Unifying => PairState::Pairing,
        };
        inner.reset(next);
        Ok(next)
    }

    /// Undo [`PairingMachine::begin`] after its start command failed.
    ///
    /// Does nothing if the state moved on in the meantime.
    pub fn revert(&self, entered: PairState) {
        let mut inner = self.lock();
        if inner.state == entered {
            inner.reset(PairState::NotPairing);
        }
    }

    /// End any pairing attempt and return the state it was in.
    pub fn stop(&self) -> PairState {
        let mut inner = self.lock();
        let previous = inner.state;
        inner.reset(PairState::NotPairing);
        previous
    }

    /// Merge a `DeviceDiscovered` report.
    ///
    /// Returns the completed record when this report filled it, after
    /// moving to [`PairState::FindingPasskey`]. Outside of
    /// [`PairState::Discovering`] the report is ignored.
    pub fn device_discovered(&self, report: &Report) -> ParseResult<Option<DiscoveryRecord>> {
        let mut inner = self.lock();
        if inner.state != PairState::Discovering {
            return Ok(None);
        }
        if inner.record.fill(report)? {
            inner.state = PairState::FindingPasskey;
            return Ok(Some(inner.record.clone()));
        }
        Ok(None)
    }

    /// Handle a passkey request.
    ///
    /// In [`PairState::FindingPasskey`] moves to [`PairState::Pairing`]
    /// and returns the record captured at that moment; otherwise ignored.
    pub fn passkey_requested(&self) -> Option<DiscoveryRecord> {
        let mut inner = self.lock();
        if inner.state != PairState::FindingPasskey {
            return None;
        }
        inner.state = PairState::Pairing;
        Some(inner.record.clone())
    }

    /// Handle a discovery status report. Returns whether it ended the
    /// attempt.
    pub fn discovery_status(&self, status: &DiscoveryStatus) -> bool {
        let mut inner = self.lock();
        if inner.state == PairState::Discovering && !status.discovering {
            inner.reset(PairState::NotPairing);
            return true;
        }
        false
    }

    /// Handle a pair status report (legacy or Bolt). Returns whether it
    /// ended the attempt.
    pub fn pair_status(&self, status: &PairStatus) -> bool {
        let mut inner = self.lock();
        let active = matches!(inner.state, PairState::FindingPasskey | PairState::Pairing);
        if active && !status.pairing {
            inner.reset(PairState::NotPairing);
            return true;
        }
        false
    }
}
