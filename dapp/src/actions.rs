//! User-initiated write actions: local precondition checks and the single
//! in-flight action tracker.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use parking_lot::Mutex;
use tracing::debug;

use crate::capacity::{DerivedCapacity, ReserveSnapshot, UnitScale};
use crate::errors::ValidationError;
use crate::provider::Signer;
use crate::roles::Capability;
use crate::session::Session;
use crate::units::parse_units;

// ============================================================================
// REQUESTS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    Mint,
    Burn,
    SetReserve,
    SetFeed,
    Pause,
    Unpause,
}

impl ActionKind {
    pub fn capability(self) -> Capability {
        match self {
            ActionKind::Mint => Capability::Mint,
            ActionKind::Burn => Capability::Burn,
            ActionKind::SetReserve => Capability::SetReserve,
            ActionKind::SetFeed => Capability::SetFeed,
            ActionKind::Pause | ActionKind::Unpause => Capability::Pause,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ActionKind::Mint => "Mint",
            ActionKind::Burn => "Burn",
            ActionKind::SetReserve => "Reserve update",
            ActionKind::SetFeed => "Feed update",
            ActionKind::Pause => "Pause",
            ActionKind::Unpause => "Unpause",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionPayload {
    Amount(U256),
    Address(Address),
    None,
}

/// A fully parsed action, ready for precondition checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionRequest {
    Mint { amount: U256 },
    Burn { amount: U256 },
    /// New feed answer in feed units (mock feeds only)
    SetReserve { value: U256 },
    SetFeed { feed: Address },
    Pause,
    Unpause,
}

impl ActionRequest {
    pub fn mint_from_input(input: &str, token_decimals: u8) -> Result<Self, ValidationError> {
        Ok(ActionRequest::Mint {
            amount: parse_units(input, token_decimals)?,
        })
    }

    pub fn burn_from_input(input: &str, token_decimals: u8) -> Result<Self, ValidationError> {
        Ok(ActionRequest::Burn {
            amount: parse_units(input, token_decimals)?,
        })
    }

    /// `input` is a BTC amount such as `"0.0002"`
    pub fn set_reserve_from_input(input: &str, feed_decimals: u8) -> Result<Self, ValidationError> {
        Ok(ActionRequest::SetReserve {
            value: parse_units(input, feed_decimals)?,
        })
    }

    pub fn set_feed_from_input(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if !trimmed.starts_with("0x") || trimmed.len() != 42 {
            return Err(ValidationError::InvalidAddress);
        }
        let feed = Address::from_str(trimmed).map_err(|_| ValidationError::InvalidAddress)?;
        Ok(ActionRequest::SetFeed { feed })
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            ActionRequest::Mint { .. } => ActionKind::Mint,
            ActionRequest::Burn { .. } => ActionKind::Burn,
            ActionRequest::SetReserve { .. } => ActionKind::SetReserve,
            ActionRequest::SetFeed { .. } => ActionKind::SetFeed,
            ActionRequest::Pause => ActionKind::Pause,
            ActionRequest::Unpause => ActionKind::Unpause,
        }
    }

    pub fn payload(&self) -> ActionPayload {
        match self {
            ActionRequest::Mint { amount } | ActionRequest::Burn { amount } => {
                ActionPayload::Amount(*amount)
            }
            ActionRequest::SetReserve { value } => ActionPayload::Amount(*value),
            ActionRequest::SetFeed { feed } => ActionPayload::Address(*feed),
            ActionRequest::Pause | ActionRequest::Unpause => ActionPayload::None,
        }
    }
}

// ============================================================================
// PRECONDITIONS
// ============================================================================

/// Everything the client knows before deciding whether to submit.
pub struct Preconditions<'a> {
    pub session: &'a Session,
    pub snapshot: Option<&'a ReserveSnapshot>,
    pub capacity: Option<&'a DerivedCapacity>,
    pub allowed_chain_id: u64,
    pub feed_is_mock: bool,
    pub scale: UnitScale,
}

/// Rejects anything the client can already prove would fail on-chain and
/// returns the signer to submit with otherwise.
pub fn validate(request: &ActionRequest, pre: &Preconditions<'_>) -> Result<Signer, ValidationError> {
    let session = pre.session;
    if !session.is_connected() {
        return Err(ValidationError::NotConnected);
    }
    if !session.network_allowed(pre.allowed_chain_id) {
        return Err(ValidationError::WrongNetwork);
    }
    let signer = session
        .signer_for(request.kind().capability())
        .cloned()
        .ok_or(ValidationError::NotAuthorized)?;

    match request {
        ActionRequest::Mint { amount } => {
            let snapshot = pre.snapshot.ok_or(ValidationError::NoSnapshot)?;
            let capacity = pre.capacity.ok_or(ValidationError::NoSnapshot)?;
            if snapshot.paused {
                return Err(ValidationError::Paused);
            }
            if amount.is_zero() {
                return Err(ValidationError::NonPositiveAmount);
            }
            if *amount > capacity.mintable_max {
                return Err(ValidationError::ExceedsReserve);
            }
        }
        ActionRequest::Burn { amount } => {
            let snapshot = pre.snapshot.ok_or(ValidationError::NoSnapshot)?;
            if snapshot.paused {
                return Err(ValidationError::Paused);
            }
            if amount.is_zero() {
                return Err(ValidationError::NonPositiveAmount);
            }
            if *amount > snapshot.balance {
                return Err(ValidationError::InsufficientBalance);
            }
        }
        ActionRequest::SetReserve { value } => {
            if !pre.feed_is_mock {
                return Err(ValidationError::MockFeedOnly);
            }
            let snapshot = pre.snapshot.ok_or(ValidationError::NoSnapshot)?;
            if pre.scale.reserve_capacity(*value) < snapshot.total_supply {
                return Err(ValidationError::BelowTotalSupply);
            }
        }
        ActionRequest::SetFeed { feed } => {
            if *feed == Address::ZERO {
                return Err(ValidationError::InvalidAddress);
            }
        }
        ActionRequest::Pause | ActionRequest::Unpause => {}
    }

    Ok(signer)
}

// ============================================================================
// TRACKER
// ============================================================================

/// Status of the current action. Idle is the absence of one: a claimed slot
/// shows nothing until the wallet accepts the transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionStatus {
    Submitted,
    Confirmed,
    Failed,
}

impl ActionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionStatus::Confirmed | ActionStatus::Failed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingAction {
    pub kind: ActionKind,
    pub payload: ActionPayload,
    pub status: ActionStatus,
    pub tx_hash: Option<B256>,
    pub failure: Option<String>,
}

#[derive(Default)]
struct TrackerState {
    current: Option<PendingAction>,
    generation: u64,
    in_flight: bool,
}

/// Holds at most one action. A second `begin` while one is in flight is
/// refused rather than queued.
#[derive(Default)]
pub struct ActionTracker {
    state: Mutex<TrackerState>,
}

impl ActionTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claims the slot, or `None` while another action is in flight.
    pub fn begin(self: &Arc<Self>, request: &ActionRequest) -> Option<ActionGuard> {
        let mut state = self.state.lock();
        if state.in_flight {
            debug!(kind = %request.kind(), "action refused, another one is in flight");
            return None;
        }
        state.generation += 1;
        state.in_flight = true;
        state.current = None;
        Some(ActionGuard {
            tracker: Arc::clone(self),
            generation: state.generation,
            kind: request.kind(),
            payload: request.payload(),
            finished: false,
        })
    }

    pub fn current(&self) -> Option<PendingAction> {
        self.state.lock().current.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().in_flight
    }

    /// Returns a finished action to idle unless a newer one replaced it.
    pub fn clear_if(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        let finished = state
            .current
            .as_ref()
            .is_some_and(|action| action.status.is_terminal());
        if state.generation == generation && finished {
            state.current = None;
            return true;
        }
        false
    }

    fn update(&self, generation: u64, apply: impl FnOnce(&mut TrackerState)) {
        let mut state = self.state.lock();
        if state.generation == generation {
            apply(&mut state);
        }
    }
}

/// Ownership of the in-flight slot. Dropping it without a terminal call
/// marks the action failed, so no path leaves it `Submitted`.
pub struct ActionGuard {
    tracker: Arc<ActionTracker>,
    generation: u64,
    kind: ActionKind,
    payload: ActionPayload,
    finished: bool,
}

impl ActionGuard {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn action(&self, status: ActionStatus) -> PendingAction {
        PendingAction {
            kind: self.kind,
            payload: self.payload.clone(),
            status,
            tx_hash: None,
            failure: None,
        }
    }

    pub fn submitted(&mut self, tx_hash: B256) {
        let action = PendingAction {
            tx_hash: Some(tx_hash),
            ..self.action(ActionStatus::Submitted)
        };
        self.tracker.update(self.generation, |state| {
            state.current = Some(action);
        });
    }

    pub fn confirmed(mut self) -> u64 {
        self.finish(ActionStatus::Confirmed, None);
        self.generation
    }

    pub fn failed(mut self, reason: impl Into<String>) -> u64 {
        self.finish(ActionStatus::Failed, Some(reason.into()));
        self.generation
    }

    /// Rejected before submission: the slot goes straight back to idle.
    pub fn release(mut self) {
        self.finished = true;
        self.tracker.update(self.generation, |state| {
            state.current = None;
            state.in_flight = false;
        });
    }

    /// Failures before submission still leave a visible terminal action.
    fn finish(&mut self, status: ActionStatus, failure: Option<String>) {
        self.finished = true;
        let fresh = self.action(status);
        self.tracker.update(self.generation, |state| {
            let action = state.current.get_or_insert(fresh);
            action.status = status;
            action.failure = failure;
            state.in_flight = false;
        });
    }
}

impl Drop for ActionGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(ActionStatus::Failed, Some("action interrupted".to_string()));
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
