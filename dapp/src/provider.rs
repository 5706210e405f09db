//! Boundaries to the external collaborators: the injected wallet, the token
//! contract and the reserve feed.
//!
//! Nothing in this crate owns the ledger. Every read, write and event goes
//! through these traits; [`crate::local::LocalNetwork`] implements all of them
//! in memory for tests and demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::errors::{ProviderError, TxError};
use crate::roles::{Capabilities, Role};

// ============================================================================
// SUBSCRIPTIONS
// ============================================================================

/// Fan-out of notifications to any number of listeners.
pub struct ListenerRegistry<E> {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<u64, mpsc::UnboundedSender<E>>>,
}

impl<E: Clone + Send + 'static> ListenerRegistry<E> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(0),
            listeners: Mutex::new(HashMap::new()),
        })
    }

    pub fn subscribe(self: &Arc<Self>) -> Subscription<E> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.listeners.lock().insert(id, sender);
        let registry: Weak<Self> = Arc::downgrade(self);
        Subscription {
            id,
            receiver,
            registry: Some(registry),
        }
    }

    /// Delivers to every live listener and forgets the closed ones.
    pub fn emit(&self, event: E) {
        self.listeners
            .lock()
            .retain(|_, sender| sender.send(event.clone()).is_ok());
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn remove(&self, id: u64) {
        self.listeners.lock().remove(&id);
    }
}

/// Receiving end of a registration. Dropping it deregisters the listener.
pub struct Subscription<E: Clone + Send + 'static> {
    id: u64,
    receiver: mpsc::UnboundedReceiver<E>,
    registry: Option<Weak<ListenerRegistry<E>>>,
}

impl<E: Clone + Send + 'static> Subscription<E> {
    pub async fn recv(&mut self) -> Option<E> {
        self.receiver.recv().await
    }

    /// Explicit teardown; equivalent to dropping the handle.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(registry) = self.registry.take().and_then(|weak| weak.upgrade()) {
            registry.remove(self.id);
        }
    }
}

impl<E: Clone + Send + 'static> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.detach();
    }
}

// ============================================================================
// WALLET
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletEvent {
    ChainChanged(u64),
    AccountsChanged(Vec<Address>),
}

/// Authority to sign for one wallet account. Handed out by the wallet only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signer {
    address: Address,
}

impl Signer {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Prompts the user for account access.
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError>;

    async fn chain_id(&self) -> Result<u64, ProviderError>;

    fn signer(&self, account: Address) -> Result<Signer, ProviderError>;

    /// `chainChanged` and `accountsChanged` notifications
    fn subscribe(&self) -> Subscription<WalletEvent>;
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: B256,
    pub block_number: u64,
}

/// A transaction accepted by the wallet and awaiting inclusion.
pub struct PendingTx {
    hash: B256,
    confirmation: oneshot::Receiver<Result<Receipt, TxError>>,
}

impl PendingTx {
    pub fn new(hash: B256, confirmation: oneshot::Receiver<Result<Receipt, TxError>>) -> Self {
        Self { hash, confirmation }
    }

    pub fn hash(&self) -> B256 {
        self.hash
    }

    /// Waits for inclusion. There is no client-side timeout.
    pub async fn wait(self) -> Result<Receipt, TxError> {
        self.confirmation.await.unwrap_or(Err(TxError::Dropped))
    }
}

// ============================================================================
// CONTRACT
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Transfer {
        from: Address,
        to: Address,
        value: U256,
    },
    Paused {
        account: Address,
    },
    Unpaused {
        account: Address,
    },
    RoleGranted {
        role: B256,
        account: Address,
        sender: Address,
    },
    RoleRevoked {
        role: B256,
        account: Address,
        sender: Address,
    },
    ReserveFeedChanged {
        old_feed: Address,
        new_feed: Address,
    },
    /// Anything the client has no dedicated mapping for
    Other {
        name: String,
    },
}

impl EventKind {
    pub fn name(&self) -> &str {
        match self {
            EventKind::Transfer { .. } => "Transfer",
            EventKind::Paused { .. } => "Paused",
            EventKind::Unpaused { .. } => "Unpaused",
            EventKind::RoleGranted { .. } => "RoleGranted",
            EventKind::RoleRevoked { .. } => "RoleRevoked",
            EventKind::ReserveFeedChanged { .. } => "ReserveFeedChanged",
            EventKind::Other { name } => name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractEvent {
    pub kind: EventKind,
    pub tx_hash: Option<B256>,
    pub block_number: Option<u64>,
}

#[async_trait]
pub trait TokenContract: Send + Sync {
    async fn balance_of(&self, account: Address) -> Result<U256, ProviderError>;

    async fn total_supply(&self) -> Result<U256, ProviderError>;

    async fn paused(&self) -> Result<bool, ProviderError>;

    async fn has_role(&self, role: Role, account: Address) -> Result<bool, ProviderError>;

    /// Every role of `account` in one round.
    async fn capabilities(&self, account: Address) -> Result<Capabilities, ProviderError> {
        let (admin, operator, minter, pauser) = tokio::try_join!(
            self.has_role(Role::Admin, account),
            self.has_role(Role::Operator, account),
            self.has_role(Role::Minter, account),
            self.has_role(Role::Pauser, account),
        )?;
        Ok(Role::ALL
            .into_iter()
            .zip([admin, operator, minter, pauser])
            .filter_map(|(role, held)| held.then_some(role))
            .collect())
    }

    async fn reserve_feed(&self) -> Result<Address, ProviderError>;

    async fn mint(&self, signer: &Signer, to: Address, amount: U256) -> Result<PendingTx, TxError>;

    async fn burn(&self, signer: &Signer, from: Address, amount: U256)
        -> Result<PendingTx, TxError>;

    async fn set_reserve_feed(&self, signer: &Signer, feed: Address) -> Result<PendingTx, TxError>;

    async fn pause(&self, signer: &Signer) -> Result<PendingTx, TxError>;

    async fn unpause(&self, signer: &Signer) -> Result<PendingTx, TxError>;

    fn subscribe_events(&self) -> Subscription<ContractEvent>;
}

// ============================================================================
// RESERVE FEED
// ============================================================================

#[async_trait]
pub trait ReserveFeed: Send + Sync {
    /// Latest reserve in the feed's smallest unit
    async fn latest_answer(&self) -> Result<U256, ProviderError>;

    /// Only mock feeds accept writes
    fn is_mock(&self) -> bool {
        false
    }

    async fn set(&self, _signer: &Signer, _value: U256) -> Result<PendingTx, TxError> {
        Err(TxError::Unsupported(
            "reserve can only be set on a mock feed".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_fans_out_and_deregisters() {
        let registry = ListenerRegistry::<u32>::new();
        let mut first = registry.subscribe();
        let second = registry.subscribe();
        assert_eq!(registry.listener_count(), 2);

        registry.emit(7);
        assert_eq!(first.recv().await, Some(7));

        second.unsubscribe();
        assert_eq!(registry.listener_count(), 1);

        drop(first);
        assert_eq!(registry.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_confirmation_is_terminal() {
        let (sender, receiver) = oneshot::channel();
        let pending = PendingTx::new(B256::repeat_byte(1), receiver);
        drop(sender);
        assert_eq!(pending.wait().await, Err(TxError::Dropped));
    }
}
