//! In-memory local network
//!
//! Plays the injected wallet, the token contract and its mock reserve feed so
//! the client can be exercised without a node. Contract rules follow the
//! deployed token: role-gated mint bounded by the reserve, pausing, feed
//! switching, and the events the client listens for. Transactions queue until
//! a block is mined (immediately when `auto_mine` is on).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tokio::sync::oneshot;
use tracing::debug;

use crate::capacity::UnitScale;
use crate::errors::{ProviderError, TxError};
use crate::provider::{
    ContractEvent, EventKind, ListenerRegistry, PendingTx, Receipt, ReserveFeed, Signer,
    Subscription, TokenContract, WalletEvent, WalletProvider,
};
use crate::roles::Role;

/// Revert strings of the deployed token
pub const REVERT_EXCEEDS_RESERVE: &str = "Exceeds BTC reserve";
pub const REVERT_MISSING_ROLE: &str = "AccessControl: account is missing role";
pub const REVERT_PAUSED: &str = "Pausable: paused";
pub const REVERT_NOT_PAUSED: &str = "Pausable: not paused";
pub const REVERT_BURN_EXCEEDS_BALANCE: &str = "ERC20: burn amount exceeds balance";
pub const REVERT_NOT_MOCK: &str = "feed does not accept writes";

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Clone, Debug)]
pub struct LocalNetworkConfig {
    pub chain_id: u64,
    /// Initial answer of the wired feed, in feed units
    pub reserve: U256,
    pub feed_is_mock: bool,
    pub auto_mine: bool,
    pub scale: UnitScale,
    pub seed: u64,
}

impl Default for LocalNetworkConfig {
    fn default() -> Self {
        Self {
            chain_id: crate::config::DEFAULT_CHAIN_ID,
            reserve: U256::ZERO,
            feed_is_mock: true,
            auto_mine: true,
            scale: UnitScale::default(),
            seed: 42,
        }
    }
}

// ============================================================================
// STATE
// ============================================================================

#[derive(Clone, Debug)]
struct FeedState {
    answer: U256,
    mock: bool,
}

#[derive(Clone, Debug)]
enum Call {
    Mint { to: Address, amount: U256 },
    Burn { from: Address, amount: U256 },
    SetReserveFeed { feed: Address },
    Pause,
    Unpause,
    SetAnswer { feed: Address, value: U256 },
}

struct QueuedTx {
    hash: B256,
    sender: Address,
    call: Call,
    reply: oneshot::Sender<Result<Receipt, TxError>>,
}

struct Ledger {
    chain_id: u64,
    wallet_installed: bool,
    accounts: Vec<Address>,
    reject_next_request: bool,
    decline_next_signature: bool,
    fail_reads: bool,
    unreadable_balances: HashSet<Address>,
    read_delay: Duration,
    auto_mine: bool,
    block_number: u64,
    rng: StdRng,
    scale: UnitScale,
    deployer: Address,
    balances: HashMap<Address, U256>,
    total_supply: U256,
    paused: bool,
    roles: HashMap<Role, HashSet<Address>>,
    reserve_feed: Address,
    feeds: HashMap<Address, FeedState>,
    mempool: VecDeque<QueuedTx>,
}

impl Ledger {
    fn random_bytes<const N: usize>(&mut self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.rng.fill_bytes(&mut bytes);
        bytes
    }

    fn has_any(&self, account: Address, roles: &[Role]) -> bool {
        roles.iter().any(|role| {
            self.roles
                .get(role)
                .is_some_and(|holders| holders.contains(&account))
        })
    }

    fn reserve_answer(&self) -> U256 {
        self.feeds
            .get(&self.reserve_feed)
            .map(|feed| feed.answer)
            .unwrap_or_default()
    }

    fn ensure_reads(&self) -> Result<(), ProviderError> {
        if self.fail_reads {
            return Err(ProviderError::Rpc("local network unavailable".to_string()));
        }
        Ok(())
    }

    /// Applies one call with contract semantics and returns the emitted events.
    fn execute(&mut self, sender: Address, call: Call) -> Result<Vec<EventKind>, String> {
        match call {
            Call::Mint { to, amount } => {
                if !self.has_any(sender, &[Role::Admin, Role::Operator, Role::Minter]) {
                    return Err(REVERT_MISSING_ROLE.to_string());
                }
                if self.paused {
                    return Err(REVERT_PAUSED.to_string());
                }
                let capacity = self.scale.reserve_capacity(self.reserve_answer());
                let new_supply = self.total_supply.saturating_add(amount);
                if new_supply > capacity {
                    return Err(REVERT_EXCEEDS_RESERVE.to_string());
                }
                self.total_supply = new_supply;
                *self.balances.entry(to).or_default() += amount;
                Ok(vec![EventKind::Transfer {
                    from: Address::ZERO,
                    to,
                    value: amount,
                }])
            }
            Call::Burn { from, amount } => {
                if !self.has_any(sender, &Role::ALL) {
                    return Err(REVERT_MISSING_ROLE.to_string());
                }
                if self.paused {
                    return Err(REVERT_PAUSED.to_string());
                }
                let balance = self.balances.get(&from).copied().unwrap_or_default();
                if balance < amount {
                    return Err(REVERT_BURN_EXCEEDS_BALANCE.to_string());
                }
                self.balances.insert(from, balance - amount);
                self.total_supply -= amount;
                Ok(vec![EventKind::Transfer {
                    from,
                    to: Address::ZERO,
                    value: amount,
                }])
            }
            Call::SetReserveFeed { feed } => {
                if !self.has_any(sender, &[Role::Admin, Role::Operator]) {
                    return Err(REVERT_MISSING_ROLE.to_string());
                }
                let old_feed = std::mem::replace(&mut self.reserve_feed, feed);
                Ok(vec![EventKind::ReserveFeedChanged {
                    old_feed,
                    new_feed: feed,
                }])
            }
            Call::Pause | Call::Unpause => {
                if !self.has_any(sender, &[Role::Admin, Role::Operator, Role::Pauser]) {
                    return Err(REVERT_MISSING_ROLE.to_string());
                }
                let pausing = matches!(call, Call::Pause);
                if pausing && self.paused {
                    return Err(REVERT_PAUSED.to_string());
                }
                if !pausing && !self.paused {
                    return Err(REVERT_NOT_PAUSED.to_string());
                }
                self.paused = pausing;
                let event = if pausing {
                    EventKind::Paused { account: sender }
                } else {
                    EventKind::Unpaused { account: sender }
                };
                Ok(vec![event])
            }
            Call::SetAnswer { feed, value } => match self.feeds.get_mut(&feed) {
                Some(state) if state.mock => {
                    state.answer = value;
                    Ok(Vec::new())
                }
                _ => Err(REVERT_NOT_MOCK.to_string()),
            },
        }
    }
}

// ============================================================================
// NETWORK
// ============================================================================

pub struct LocalNetwork {
    ledger: Mutex<Ledger>,
    wallet_events: Arc<ListenerRegistry<WalletEvent>>,
    contract_events: Arc<ListenerRegistry<ContractEvent>>,
}

impl LocalNetwork {
    pub fn new(config: LocalNetworkConfig) -> Arc<Self> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut deployer = [0u8; 20];
        rng.fill_bytes(&mut deployer);
        let mut feed = [0u8; 20];
        rng.fill_bytes(&mut feed);
        let deployer = Address::from(deployer);
        let feed = Address::from(feed);

        let mut roles: HashMap<Role, HashSet<Address>> = HashMap::new();
        roles.entry(Role::Admin).or_default().insert(deployer);

        let ledger = Ledger {
            chain_id: config.chain_id,
            wallet_installed: true,
            accounts: Vec::new(),
            reject_next_request: false,
            decline_next_signature: false,
            fail_reads: false,
            unreadable_balances: HashSet::new(),
            read_delay: Duration::ZERO,
            auto_mine: config.auto_mine,
            block_number: 0,
            rng,
            scale: config.scale,
            deployer,
            balances: HashMap::new(),
            total_supply: U256::ZERO,
            paused: false,
            roles,
            reserve_feed: feed,
            feeds: HashMap::from([(
                feed,
                FeedState {
                    answer: config.reserve,
                    mock: config.feed_is_mock,
                },
            )]),
            mempool: VecDeque::new(),
        };

        Arc::new(Self {
            ledger: Mutex::new(ledger),
            wallet_events: ListenerRegistry::new(),
            contract_events: ListenerRegistry::new(),
        })
    }

    /// Account holding the admin role from deployment
    pub fn deployer(&self) -> Address {
        self.ledger.lock().deployer
    }

    pub fn reserve_feed_address(&self) -> Address {
        self.ledger.lock().reserve_feed
    }

    // ------------------------------------------------------------------------
    // Wallet side
    // ------------------------------------------------------------------------

    /// Replaces the wallet's accounts and notifies listeners.
    pub fn set_accounts(&self, accounts: Vec<Address>) {
        self.ledger.lock().accounts = accounts.clone();
        self.wallet_events.emit(WalletEvent::AccountsChanged(accounts));
    }

    pub fn switch_chain(&self, chain_id: u64) {
        self.ledger.lock().chain_id = chain_id;
        self.wallet_events.emit(WalletEvent::ChainChanged(chain_id));
    }

    pub fn uninstall_wallet(&self) {
        self.ledger.lock().wallet_installed = false;
    }

    pub fn reject_next_request(&self) {
        self.ledger.lock().reject_next_request = true;
    }

    pub fn decline_next_signature(&self) {
        self.ledger.lock().decline_next_signature = true;
    }

    pub fn wallet_listener_count(&self) -> usize {
        self.wallet_events.listener_count()
    }

    // ------------------------------------------------------------------------
    // Chain side
    // ------------------------------------------------------------------------

    pub fn set_fail_reads(&self, fail: bool) {
        self.ledger.lock().fail_reads = fail;
    }

    /// Makes `balance_of(account)` fail while other reads keep working.
    pub fn fail_balance_reads(&self, account: Address) {
        self.ledger.lock().unreadable_balances.insert(account);
    }

    /// Latency applied to every contract and feed read.
    pub fn set_read_delay(&self, delay: Duration) {
        self.ledger.lock().read_delay = delay;
    }

    async fn read_latency(&self) {
        let delay = self.ledger.lock().read_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn set_auto_mine(&self, auto_mine: bool) {
        self.ledger.lock().auto_mine = auto_mine;
    }

    pub fn pending_count(&self) -> usize {
        self.ledger.lock().mempool.len()
    }

    pub fn event_listener_count(&self) -> usize {
        self.contract_events.listener_count()
    }

    pub fn grant_role(&self, role: Role, account: Address) {
        let sender = {
            let mut ledger = self.ledger.lock();
            ledger.roles.entry(role).or_default().insert(account);
            ledger.deployer
        };
        self.contract_events.emit(ContractEvent {
            kind: EventKind::RoleGranted {
                role: role.id(),
                account,
                sender,
            },
            tx_hash: None,
            block_number: None,
        });
    }

    pub fn revoke_role(&self, role: Role, account: Address) {
        let sender = {
            let mut ledger = self.ledger.lock();
            if let Some(holders) = ledger.roles.get_mut(&role) {
                holders.remove(&account);
            }
            ledger.deployer
        };
        self.contract_events.emit(ContractEvent {
            kind: EventKind::RoleRevoked {
                role: role.id(),
                account,
                sender,
            },
            tx_hash: None,
            block_number: None,
        });
    }

    /// Deploys another feed, not yet wired to the token.
    pub fn deploy_feed(&self, answer: U256, mock: bool) -> Address {
        let mut ledger = self.ledger.lock();
        let address = Address::from(ledger.random_bytes::<20>());
        ledger.feeds.insert(address, FeedState { answer, mock });
        address
    }

    /// Feed owner's direct update, as the maintenance scripts do it.
    pub fn set_feed_answer(&self, feed: Address, answer: U256) {
        if let Some(state) = self.ledger.lock().feeds.get_mut(&feed) {
            state.answer = answer;
        }
    }

    /// Emits an event the client has no mapping for.
    pub fn emit_raw_event(&self, name: &str) {
        self.contract_events.emit(ContractEvent {
            kind: EventKind::Other {
                name: name.to_string(),
            },
            tx_hash: None,
            block_number: None,
        });
    }

    /// Includes every queued transaction in one block. Returns how many.
    pub fn mine(&self) -> usize {
        let mut ledger = self.ledger.lock();
        self.mine_locked(&mut ledger)
    }

    fn mine_locked(&self, ledger: &mut Ledger) -> usize {
        if ledger.mempool.is_empty() {
            return 0;
        }
        ledger.block_number += 1;
        let block_number = ledger.block_number;
        let mut included = 0;
        while let Some(tx) = ledger.mempool.pop_front() {
            included += 1;
            let outcome = match ledger.execute(tx.sender, tx.call) {
                Ok(events) => {
                    for kind in events {
                        self.contract_events.emit(ContractEvent {
                            kind,
                            tx_hash: Some(tx.hash),
                            block_number: Some(block_number),
                        });
                    }
                    Ok(Receipt {
                        tx_hash: tx.hash,
                        block_number,
                    })
                }
                Err(reason) => {
                    debug!(tx = %tx.hash, %reason, "local transaction reverted");
                    Err(TxError::Reverted(Some(reason)))
                }
            };
            // The submitter may have stopped listening
            let _ = tx.reply.send(outcome);
        }
        included
    }

    fn submit(&self, signer: &Signer, call: Call) -> Result<PendingTx, TxError> {
        let mut ledger = self.ledger.lock();
        if !ledger.wallet_installed {
            return Err(ProviderError::NoWallet.into());
        }
        if !ledger.accounts.contains(&signer.address()) {
            return Err(ProviderError::Rpc("signer is not a wallet account".to_string()).into());
        }
        if std::mem::take(&mut ledger.decline_next_signature) {
            return Err(TxError::Declined);
        }

        let hash = B256::from(ledger.random_bytes::<32>());
        let (reply, confirmation) = oneshot::channel();
        ledger.mempool.push_back(QueuedTx {
            hash,
            sender: signer.address(),
            call,
            reply,
        });
        if ledger.auto_mine {
            self.mine_locked(&mut ledger);
        }
        Ok(PendingTx::new(hash, confirmation))
    }
}

#[async_trait]
impl WalletProvider for LocalNetwork {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        let mut ledger = self.ledger.lock();
        if !ledger.wallet_installed {
            return Err(ProviderError::NoWallet);
        }
        if std::mem::take(&mut ledger.reject_next_request) {
            return Err(ProviderError::UserRejected);
        }
        Ok(ledger.accounts.clone())
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        let ledger = self.ledger.lock();
        if !ledger.wallet_installed {
            return Err(ProviderError::NoWallet);
        }
        Ok(ledger.chain_id)
    }

    fn signer(&self, account: Address) -> Result<Signer, ProviderError> {
        let ledger = self.ledger.lock();
        if !ledger.accounts.contains(&account) {
            return Err(ProviderError::Rpc("account is not managed by the wallet".to_string()));
        }
        Ok(Signer::new(account))
    }

    fn subscribe(&self) -> Subscription<WalletEvent> {
        self.wallet_events.subscribe()
    }
}

#[async_trait]
impl TokenContract for LocalNetwork {
    async fn balance_of(&self, account: Address) -> Result<U256, ProviderError> {
        self.read_latency().await;
        let ledger = self.ledger.lock();
        ledger.ensure_reads()?;
        if ledger.unreadable_balances.contains(&account) {
            return Err(ProviderError::Rpc(format!("balance of {account} unavailable")));
        }
        Ok(ledger.balances.get(&account).copied().unwrap_or_default())
    }

    async fn total_supply(&self) -> Result<U256, ProviderError> {
        self.read_latency().await;
        let ledger = self.ledger.lock();
        ledger.ensure_reads()?;
        Ok(ledger.total_supply)
    }

    async fn paused(&self) -> Result<bool, ProviderError> {
        self.read_latency().await;
        let ledger = self.ledger.lock();
        ledger.ensure_reads()?;
        Ok(ledger.paused)
    }

    async fn has_role(&self, role: Role, account: Address) -> Result<bool, ProviderError> {
        self.read_latency().await;
        let ledger = self.ledger.lock();
        ledger.ensure_reads()?;
        Ok(ledger.has_any(account, &[role]))
    }

    async fn reserve_feed(&self) -> Result<Address, ProviderError> {
        self.read_latency().await;
        let ledger = self.ledger.lock();
        ledger.ensure_reads()?;
        Ok(ledger.reserve_feed)
    }

    async fn mint(&self, signer: &Signer, to: Address, amount: U256) -> Result<PendingTx, TxError> {
        self.submit(signer, Call::Mint { to, amount })
    }

    async fn burn(
        &self,
        signer: &Signer,
        from: Address,
        amount: U256,
    ) -> Result<PendingTx, TxError> {
        self.submit(signer, Call::Burn { from, amount })
    }

    async fn set_reserve_feed(&self, signer: &Signer, feed: Address) -> Result<PendingTx, TxError> {
        self.submit(signer, Call::SetReserveFeed { feed })
    }

    async fn pause(&self, signer: &Signer) -> Result<PendingTx, TxError> {
        self.submit(signer, Call::Pause)
    }

    async fn unpause(&self, signer: &Signer) -> Result<PendingTx, TxError> {
        self.submit(signer, Call::Unpause)
    }

    fn subscribe_events(&self) -> Subscription<ContractEvent> {
        self.contract_events.subscribe()
    }
}

/// Reads the feed the token is currently wired to.
#[async_trait]
impl ReserveFeed for LocalNetwork {
    async fn latest_answer(&self) -> Result<U256, ProviderError> {
        self.read_latency().await;
        let ledger = self.ledger.lock();
        ledger.ensure_reads()?;
        Ok(ledger.reserve_answer())
    }

    fn is_mock(&self) -> bool {
        let ledger = self.ledger.lock();
        ledger
            .feeds
            .get(&ledger.reserve_feed)
            .is_some_and(|feed| feed.mock)
    }

    async fn set(&self, signer: &Signer, value: U256) -> Result<PendingTx, TxError> {
        let feed = self.reserve_feed_address();
        self.submit(signer, Call::SetAnswer { feed, value })
    }
}
