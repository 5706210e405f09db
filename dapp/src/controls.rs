//! Presentational units: the network banner and the action controls.
//!
//! Each control is a plain value built from read-only state. It answers
//! whether its button is disabled and which inline warning to show; the root
//! client owns every callback.

use alloy_primitives::U256;

use crate::actions::ActionRequest;
use crate::capacity::UnitScale;
use crate::roles::{Capabilities, Capability};
use crate::units::{format_units, parse_units};

// ============================================================================
// NETWORK BANNER
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkBanner {
    pub chain_id: Option<u64>,
    pub allowed_chain_id: u64,
}

impl NetworkBanner {
    pub fn is_allowed(&self) -> bool {
        self.chain_id == Some(self.allowed_chain_id)
    }

    /// Prompt shown whenever mutating controls are off for network reasons.
    pub fn warning(&self) -> Option<String> {
        match self.chain_id {
            Some(chain_id) if chain_id == self.allowed_chain_id => None,
            Some(chain_id) => Some(format!(
                "This dApp only works on chain {}. You're on {chain_id}. Please switch network in your wallet.",
                self.allowed_chain_id
            )),
            None => Some(format!(
                "Network unknown. Connect a wallet on chain {} to continue.",
                self.allowed_chain_id
            )),
        }
    }
}

// ============================================================================
// SHARED GATING
// ============================================================================

/// What every mutating control needs to know about the session
#[derive(Clone, Debug, Default)]
pub struct ControlGate {
    pub busy: bool,
    pub network_allowed: bool,
    pub capabilities: Capabilities,
    pub authorized: bool,
}

impl ControlGate {
    fn blocks(&self, capability: Capability) -> bool {
        self.busy
            || !self.network_allowed
            || !self.authorized
            || !self.capabilities.allows(capability)
    }
}

fn parse_positive(input: &str, decimals: u8) -> Option<U256> {
    parse_units(input, decimals).ok().filter(|amount| !amount.is_zero())
}

// ============================================================================
// MINT
// ============================================================================

pub struct MintControl<'a> {
    pub input: &'a str,
    pub mintable_max: U256,
    pub token_decimals: u8,
    pub gate: &'a ControlGate,
}

impl MintControl<'_> {
    pub fn input_disabled(&self) -> bool {
        self.gate.busy || !self.gate.network_allowed
    }

    pub fn is_disabled(&self) -> bool {
        if self.gate.blocks(Capability::Mint) {
            return true;
        }
        match parse_positive(self.input, self.token_decimals) {
            Some(amount) => amount > self.mintable_max,
            None => true,
        }
    }

    /// Exact value for the "max" quick-fill.
    pub fn max_fill(&self) -> String {
        format_units(self.mintable_max, self.token_decimals)
    }

    pub fn max_disabled(&self) -> bool {
        self.mintable_max.is_zero()
    }

    pub fn warning(&self) -> Option<&'static str> {
        match parse_units(self.input, self.token_decimals) {
            Ok(amount) if amount > self.mintable_max => Some("Not enough BTC reserve for this mint."),
            _ => None,
        }
    }
}

// ============================================================================
// BURN
// ============================================================================

pub struct BurnControl<'a> {
    pub input: &'a str,
    pub balance: U256,
    pub token_decimals: u8,
    pub gate: &'a ControlGate,
}

impl BurnControl<'_> {
    pub fn is_disabled(&self) -> bool {
        if self.gate.blocks(Capability::Burn) {
            return true;
        }
        match parse_positive(self.input, self.token_decimals) {
            Some(amount) => amount > self.balance,
            None => true,
        }
    }

    pub fn warning(&self) -> Option<&'static str> {
        match parse_units(self.input, self.token_decimals) {
            Ok(amount) if amount > self.balance => Some("Insufficient token balance to burn."),
            _ => None,
        }
    }
}

// ============================================================================
// OWNER PANEL (mock reserve)
// ============================================================================

pub struct ReserveControl<'a> {
    /// BTC amount typed by the operator
    pub input: &'a str,
    pub total_supply: U256,
    pub scale: UnitScale,
    pub feed_is_mock: bool,
    pub gate: &'a ControlGate,
}

impl ReserveControl<'_> {
    fn below_supply(&self) -> Option<bool> {
        parse_units(self.input, self.scale.feed_decimals)
            .ok()
            .map(|value| self.scale.reserve_capacity(value) < self.total_supply)
    }

    pub fn is_disabled(&self) -> bool {
        self.gate.blocks(Capability::SetReserve)
            || !self.feed_is_mock
            || self.below_supply().unwrap_or(true)
    }

    pub fn warning(&self) -> Option<&'static str> {
        if !self.feed_is_mock {
            return Some("Reserve updates are only available with a mock feed.");
        }
        match self.below_supply() {
            Some(true) => Some("Reserve cannot be set below current total supply!"),
            _ => None,
        }
    }
}

// ============================================================================
// FEED ADDRESS AND PAUSE
// ============================================================================

pub struct FeedControl<'a> {
    pub input: &'a str,
    pub gate: &'a ControlGate,
}

impl FeedControl<'_> {
    pub fn is_disabled(&self) -> bool {
        self.gate.blocks(Capability::SetFeed)
            || ActionRequest::set_feed_from_input(self.input).is_err()
    }
}

pub struct PauseToggle<'a> {
    pub paused: bool,
    pub gate: &'a ControlGate,
}

impl PauseToggle<'_> {
    pub fn is_disabled(&self) -> bool {
        self.gate.blocks(Capability::Pause)
    }

    pub fn label(&self) -> &'static str {
        if self.paused {
            "Unpause"
        } else {
            "Pause"
        }
    }
}
