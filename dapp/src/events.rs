//! Live contract event log
//!
//! Raw contract events are normalized into a description and a severity and
//! kept most-recent-first in a bounded buffer. Unknown kinds are logged with a
//! generic description rather than dropped.

use std::collections::VecDeque;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::{Address, B256};

use crate::provider::{ContractEvent, EventKind};
use crate::roles::role_display_name;
use crate::units::{format_fixed, shorten_address};

/// Fraction digits for amounts in event descriptions
const EVENT_AMOUNT_DIGITS: u8 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventLogEntry {
    pub kind: String,
    pub description: String,
    pub severity: Severity,
    /// Unix seconds at arrival
    pub timestamp: u64,
    pub tx_hash: Option<B256>,
    pub block_number: Option<u64>,
}

/// Token parameters needed to render amounts
#[derive(Clone, Debug)]
pub struct EventFormat {
    pub token_decimals: u8,
    pub token_symbol: String,
}

/// Maps every event kind to a description and severity.
pub fn describe(kind: &EventKind, format: &EventFormat) -> (String, Severity) {
    let symbol = &format.token_symbol;
    let amount = |value| format_fixed(value, format.token_decimals, EVENT_AMOUNT_DIGITS);
    match kind {
        EventKind::Transfer { from, to, value } if *from == Address::ZERO => (
            format!("Minted {} {symbol} to {}", amount(*value), shorten_address(to)),
            Severity::Success,
        ),
        EventKind::Transfer { from, to, value } if *to == Address::ZERO => (
            format!("Burned {} {symbol} from {}", amount(*value), shorten_address(from)),
            Severity::Warning,
        ),
        EventKind::Transfer { from, to, value } => (
            format!(
                "Transfer {} {symbol}: {} → {}",
                amount(*value),
                shorten_address(from),
                shorten_address(to)
            ),
            Severity::Info,
        ),
        EventKind::Paused { account } => (
            format!("Contract paused by {}", shorten_address(account)),
            Severity::Error,
        ),
        EventKind::Unpaused { account } => (
            format!("Contract unpaused by {}", shorten_address(account)),
            Severity::Success,
        ),
        EventKind::RoleGranted { role, account, .. } => (
            format!(
                "Role \"{}\" granted to {}",
                role_display_name(role),
                shorten_address(account)
            ),
            Severity::Success,
        ),
        EventKind::RoleRevoked { role, account, .. } => (
            format!(
                "Role \"{}\" revoked from {}",
                role_display_name(role),
                shorten_address(account)
            ),
            Severity::Warning,
        ),
        EventKind::ReserveFeedChanged { old_feed, new_feed } => (
            format!(
                "Reserve feed changed: {} → {}",
                shorten_address(old_feed),
                shorten_address(new_feed)
            ),
            Severity::Info,
        ),
        EventKind::Other { name } => (format!("{name} event occurred"), Severity::Info),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

pub fn normalize(event: &ContractEvent, format: &EventFormat) -> EventLogEntry {
    let (description, severity) = describe(&event.kind, format);
    EventLogEntry {
        kind: event.kind.name().to_string(),
        description,
        severity,
        timestamp: unix_now(),
        tx_hash: event.tx_hash,
        block_number: event.block_number,
    }
}

/// Most-recent-first log with a fixed capacity.
#[derive(Clone, Debug)]
pub struct EventFeed {
    capacity: usize,
    entries: VecDeque<EventLogEntry>,
}

impl EventFeed {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, entry: EventLogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &EventLogEntry> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
