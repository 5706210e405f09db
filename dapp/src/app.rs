//! Root application
//!
//! [`DappClient`] owns the connector, the reserve snapshot, the single
//! action slot, the transient banner and the event log. Listener tasks for
//! wallet and contract notifications live between `mount` and `unmount`
//! (or drop); their subscriptions are released with them.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::Address;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::actions::{validate, ActionKind, ActionRequest, ActionTracker, PendingAction, Preconditions};
use crate::capacity::{derive_capacity, DerivedCapacity, ReserveSnapshot};
use crate::config::DappConfig;
use crate::controls::{
    BurnControl, ControlGate, FeedControl, MintControl, NetworkBanner, PauseToggle, ReserveControl,
};
use crate::errors::{ConnectError, TxError, ValidationError};
use crate::events::{normalize, EventFeed, EventFormat, EventLogEntry};
use crate::local::LocalNetwork;
use crate::provider::{
    PendingTx, Receipt, ReserveFeed, Signer, TokenContract, WalletEvent, WalletProvider,
};
use crate::session::{Connector, Session, SessionChange, SessionView};
use crate::units::{format_btc_reserve, format_token, shorten_address};

// ============================================================================
// BANNERS AND OUTCOMES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BannerKind {
    Success,
    Error,
    Info,
}

/// Transient user-facing message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Banner {
    pub kind: BannerKind,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Another action was in flight; nothing happened
    Busy,
    /// Refused locally, nothing was submitted
    Rejected(ValidationError),
    Confirmed(Receipt),
    Failed(String),
}

/// Reserve, capacity, supply and usage in display units.
#[derive(Clone, Debug, PartialEq)]
pub struct CapacityReport {
    pub reserve: String,
    pub capacity: String,
    pub total_supply: String,
    pub mintable: String,
    pub balance: String,
    pub usage_percent: f64,
    pub low_reserve_warning: bool,
    pub paused: bool,
    /// Feed the token reported at the last read
    pub feed: Address,
}

impl fmt::Display for CapacityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BTC reserve:     {} (feed {})", self.reserve, shorten_address(&self.feed))?;
        writeln!(f, "Reserve capacity: {}", self.capacity)?;
        writeln!(f, "Total supply:    {}", self.total_supply)?;
        writeln!(f, "Mintable:        {}", self.mintable)?;
        writeln!(f, "Your balance:    {}", self.balance)?;
        write!(f, "Reserve usage:   {:.2}%", self.usage_percent)?;
        if self.low_reserve_warning {
            write!(f, " (low reserve)")?;
        }
        if self.paused {
            write!(f, " [paused]")?;
        }
        Ok(())
    }
}

// ============================================================================
// STATE
// ============================================================================

#[derive(Default)]
struct AppState {
    snapshot: Option<ReserveSnapshot>,
    capacity: Option<DerivedCapacity>,
    /// Address whose balance the snapshot holds
    owner: Option<Address>,
    feed: Option<Address>,
    banner: Option<Banner>,
    banner_generation: u64,
}

struct Inner {
    config: DappConfig,
    wallet: Arc<dyn WalletProvider>,
    token: Arc<dyn TokenContract>,
    feed: Arc<dyn ReserveFeed>,
    connector: Connector,
    state: Mutex<AppState>,
    tracker: Arc<ActionTracker>,
    events: Mutex<EventFeed>,
    format: EventFormat,
}

impl Inner {
    /// Replaces the banner and clears it after the display timeout unless a
    /// newer one took its place.
    fn show(self: &Arc<Self>, kind: BannerKind, text: impl Into<String>) {
        let generation = {
            let mut state = self.state.lock();
            state.banner_generation += 1;
            state.banner = Some(Banner {
                kind,
                text: text.into(),
            });
            state.banner_generation
        };

        let inner = Arc::clone(self);
        let timeout = self.config.message_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut state = inner.state.lock();
            if state.banner_generation == generation {
                state.banner = None;
            }
        });
    }

    fn schedule_action_clear(self: &Arc<Self>, generation: u64) {
        let tracker = Arc::clone(&self.tracker);
        let timeout = self.config.message_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            tracker.clear_if(generation);
        });
    }

    fn clear_snapshot(&self) {
        let mut state = self.state.lock();
        state.snapshot = None;
        state.capacity = None;
        state.owner = None;
        state.feed = None;
    }

    /// One batched read. On failure the previous snapshot stays in place if
    /// it belongs to `address`. Results for a session that ended or moved to
    /// another address while the reads ran are dropped.
    async fn fetch_snapshot(&self, address: Address) -> bool {
        let reads = tokio::try_join!(
            self.token.balance_of(address),
            self.feed.latest_answer(),
            self.token.total_supply(),
            self.token.paused(),
            self.token.reserve_feed(),
        );
        match reads {
            Ok((balance, reserve, total_supply, paused, feed)) => {
                let snapshot = ReserveSnapshot {
                    reserve,
                    total_supply,
                    balance,
                    paused,
                };
                let capacity = derive_capacity(&snapshot, &self.config.unit_scale());
                debug!(
                    mintable = %capacity.mintable_max,
                    usage = capacity.usage_fraction,
                    "reserve snapshot refreshed"
                );
                let mut state = self.state.lock();
                let session = self.connector.current();
                if !session.is_authorized() || session.address != Some(address) {
                    debug!(%address, "session changed during snapshot read, discarding");
                    return false;
                }
                state.snapshot = Some(snapshot);
                state.capacity = Some(capacity);
                state.owner = Some(address);
                state.feed = Some(feed);
                true
            }
            Err(err) => {
                let mut state = self.state.lock();
                if state.owner == Some(address) {
                    warn!("reserve snapshot read failed, keeping previous values: {err}");
                } else {
                    warn!(%address, "reserve snapshot read failed: {err}");
                    state.snapshot = None;
                    state.capacity = None;
                    state.owner = None;
                    state.feed = None;
                }
                false
            }
        }
    }

    async fn refresh(&self) -> bool {
        let session = self.connector.current();
        match session.address {
            Some(address) if session.is_authorized() => self.fetch_snapshot(address).await,
            _ => false,
        }
    }

    async fn on_wallet_event(self: &Arc<Self>, event: WalletEvent) {
        match self.connector.handle_event(event).await {
            SessionChange::Reauthorized(session) => match session.address {
                Some(address) if session.is_authorized() => {
                    let switched = self.state.lock().owner != Some(address);
                    if switched {
                        self.clear_snapshot();
                    }
                    self.fetch_snapshot(address).await;
                }
                _ => {
                    self.clear_snapshot();
                    self.show(BannerKind::Error, ACCESS_DENIED);
                }
            },
            SessionChange::Disconnected => {
                self.clear_snapshot();
                self.show(BannerKind::Info, "Wallet disconnected");
            }
            SessionChange::ChainChanged(_) | SessionChange::Unchanged => {}
        }
    }

    async fn dispatch(&self, request: &ActionRequest, signer: &Signer) -> Result<PendingTx, TxError> {
        match request {
            ActionRequest::Mint { amount } => {
                self.token.mint(signer, signer.address(), *amount).await
            }
            ActionRequest::Burn { amount } => {
                self.token.burn(signer, signer.address(), *amount).await
            }
            ActionRequest::SetReserve { value } => self.feed.set(signer, *value).await,
            ActionRequest::SetFeed { feed } => self.token.set_reserve_feed(signer, *feed).await,
            ActionRequest::Pause => self.token.pause(signer).await,
            ActionRequest::Unpause => self.token.unpause(signer).await,
        }
    }

    fn success_message(&self, request: &ActionRequest) -> String {
        let config = &self.config;
        match request {
            ActionRequest::Mint { amount } => format!(
                "Minted {}",
                format_token(*amount, config.token_decimals, &config.token_symbol)
            ),
            ActionRequest::Burn { amount } => format!(
                "Burned {}",
                format_token(*amount, config.token_decimals, &config.token_symbol)
            ),
            ActionRequest::SetReserve { value } => format!(
                "Reserve set to {}",
                format_btc_reserve(*value, config.feed_decimals)
            ),
            ActionRequest::SetFeed { feed } => {
                format!("Reserve feed set to {}", shorten_address(feed))
            }
            ActionRequest::Pause => "Contract paused".to_string(),
            ActionRequest::Unpause => "Contract unpaused".to_string(),
        }
    }
}

const ACCESS_DENIED: &str = "Access denied: this address holds no SATSTD role";

fn connect_failure_message(err: &ConnectError) -> String {
    match err {
        ConnectError::NoWallet => "No wallet detected. Install a browser wallet to continue.".to_string(),
        ConnectError::Rejected => "Connection request rejected".to_string(),
        other => format!("Connection failed: {other}"),
    }
}

// ============================================================================
// CLIENT
// ============================================================================

pub struct DappClient {
    inner: Arc<Inner>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl DappClient {
    pub fn new(
        config: DappConfig,
        wallet: Arc<dyn WalletProvider>,
        token: Arc<dyn TokenContract>,
        feed: Arc<dyn ReserveFeed>,
    ) -> Self {
        let connector = Connector::new(Arc::clone(&wallet), Arc::clone(&token));
        let format = EventFormat {
            token_decimals: config.token_decimals,
            token_symbol: config.token_symbol.clone(),
        };
        let events = Mutex::new(EventFeed::new(config.event_feed_capacity));
        Self {
            inner: Arc::new(Inner {
                config,
                wallet,
                token,
                feed,
                connector,
                state: Mutex::new(AppState::default()),
                tracker: ActionTracker::new(),
                events,
                format,
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Client whose wallet, token and feed are all served by `network`.
    pub fn local(config: DappConfig, network: &Arc<LocalNetwork>) -> Self {
        Self::new(
            config,
            Arc::clone(network) as Arc<dyn WalletProvider>,
            Arc::clone(network) as Arc<dyn TokenContract>,
            Arc::clone(network) as Arc<dyn ReserveFeed>,
        )
    }

    pub fn config(&self) -> &DappConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Starts the wallet and contract listeners and reads the current chain.
    /// Mounting twice is a no-op.
    pub async fn mount(&self) {
        {
            let mut listeners = self.listeners.lock();
            if !listeners.is_empty() {
                return;
            }

            let mut wallet_events = self.inner.wallet.subscribe();
            let inner = Arc::clone(&self.inner);
            listeners.push(tokio::spawn(async move {
                while let Some(event) = wallet_events.recv().await {
                    inner.on_wallet_event(event).await;
                }
            }));

            let mut contract_events = self.inner.token.subscribe_events();
            let inner = Arc::clone(&self.inner);
            listeners.push(tokio::spawn(async move {
                while let Some(event) = contract_events.recv().await {
                    let entry = normalize(&event, &inner.format);
                    debug!(kind = %entry.kind, "contract event");
                    inner.events.lock().push(entry);
                }
            }));
        }

        self.inner.connector.refresh_chain_id().await;
    }

    /// Stops the listeners and waits until their subscriptions are released.
    pub async fn unmount(&self) {
        let handles: Vec<_> = self.listeners.lock().drain(..).collect();
        for handle in handles {
            handle.abort();
            let _ = handle.await;
        }
    }

    pub fn is_mounted(&self) -> bool {
        !self.listeners.lock().is_empty()
    }

    // ------------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------------

    pub async fn connect(&self) -> Result<Session, ConnectError> {
        let inner = &self.inner;
        match inner.connector.connect().await {
            Ok(session) => {
                match session.address {
                    Some(address) if session.is_authorized() => {
                        inner.show(BannerKind::Success, "Wallet connected");
                        inner.fetch_snapshot(address).await;
                    }
                    _ => {
                        inner.clear_snapshot();
                        inner.show(BannerKind::Error, ACCESS_DENIED);
                    }
                }
                Ok(session)
            }
            Err(err) => {
                if !matches!(err, ConnectError::InProgress | ConnectError::Superseded) {
                    inner.show(BannerKind::Error, connect_failure_message(&err));
                }
                Err(err)
            }
        }
    }

    pub fn disconnect(&self) {
        self.inner.connector.disconnect();
        self.inner.clear_snapshot();
    }

    /// Re-reads the snapshot for the connected address.
    pub async fn refresh(&self) -> bool {
        self.inner.refresh().await
    }

    // ------------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------------

    /// Runs one action to a terminal state.
    pub async fn submit(&self, request: ActionRequest) -> ActionOutcome {
        let inner = &self.inner;
        let Some(mut guard) = inner.tracker.begin(&request) else {
            return ActionOutcome::Busy;
        };
        let kind = request.kind();

        let session = inner.connector.current();
        let feed_is_mock = inner.feed.is_mock();
        let checked = {
            let state = inner.state.lock();
            validate(
                &request,
                &Preconditions {
                    session: &session,
                    snapshot: state.snapshot.as_ref(),
                    capacity: state.capacity.as_ref(),
                    allowed_chain_id: inner.config.allowed_chain_id,
                    feed_is_mock,
                    scale: inner.config.unit_scale(),
                },
            )
        };
        let signer = match checked {
            Ok(signer) => signer,
            Err(reason) => {
                debug!(action = %kind, %reason, "action rejected locally");
                guard.release();
                inner.show(BannerKind::Error, format!("{kind} rejected: {reason}"));
                return ActionOutcome::Rejected(reason);
            }
        };

        inner.show(
            BannerKind::Info,
            format!("Processing {}...", kind.label().to_lowercase()),
        );
        let outcome = match inner.dispatch(&request, &signer).await {
            Ok(pending) => {
                let tx_hash = pending.hash();
                guard.submitted(tx_hash);
                info!(action = %kind, tx = %tx_hash, "transaction submitted");
                inner.show(BannerKind::Info, format!("{kind} transaction sent..."));
                pending.wait().await
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(receipt) => {
                info!(
                    action = %kind,
                    tx = %receipt.tx_hash,
                    block = receipt.block_number,
                    "transaction confirmed"
                );
                let generation = guard.confirmed();
                inner.refresh().await;
                inner.show(BannerKind::Success, inner.success_message(&request));
                inner.schedule_action_clear(generation);
                ActionOutcome::Confirmed(receipt)
            }
            Err(err) => {
                let reason = err.reason().unwrap_or_else(|| failed_message(kind));
                warn!(action = %kind, "transaction failed: {err}");
                let generation = guard.failed(reason.clone());
                inner.show(BannerKind::Error, reason.clone());
                inner.schedule_action_clear(generation);
                ActionOutcome::Failed(reason)
            }
        }
    }

    async fn submit_parsed(&self, parsed: Result<ActionRequest, ValidationError>) -> ActionOutcome {
        match parsed {
            Ok(request) => self.submit(request).await,
            Err(_) if self.inner.tracker.is_busy() => ActionOutcome::Busy,
            Err(reason) => {
                self.inner.show(BannerKind::Error, reason.to_string());
                ActionOutcome::Rejected(reason)
            }
        }
    }

    /// Mints `amount` (token units, e.g. `"1.5"`) to the connected address.
    pub async fn mint(&self, amount: &str) -> ActionOutcome {
        let parsed = ActionRequest::mint_from_input(amount, self.inner.config.token_decimals);
        self.submit_parsed(parsed).await
    }

    pub async fn burn(&self, amount: &str) -> ActionOutcome {
        let parsed = ActionRequest::burn_from_input(amount, self.inner.config.token_decimals);
        self.submit_parsed(parsed).await
    }

    /// Sets the mock feed to a BTC amount such as `"0.0002"`.
    pub async fn set_reserve(&self, btc: &str) -> ActionOutcome {
        let parsed = ActionRequest::set_reserve_from_input(btc, self.inner.config.feed_decimals);
        self.submit_parsed(parsed).await
    }

    pub async fn set_feed(&self, address: &str) -> ActionOutcome {
        self.submit_parsed(ActionRequest::set_feed_from_input(address))
            .await
    }

    /// Pauses or unpauses depending on the last known contract state.
    pub async fn toggle_pause(&self) -> ActionOutcome {
        let paused = self
            .snapshot()
            .map(|snapshot| snapshot.paused)
            .unwrap_or(false);
        let request = if paused {
            ActionRequest::Unpause
        } else {
            ActionRequest::Pause
        };
        self.submit(request).await
    }

    // ------------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------------

    pub fn session(&self) -> Session {
        self.inner.connector.current()
    }

    pub fn session_view(&self) -> SessionView {
        self.inner.connector.view()
    }

    pub fn snapshot(&self) -> Option<ReserveSnapshot> {
        self.inner.state.lock().snapshot.clone()
    }

    pub fn capacity(&self) -> Option<DerivedCapacity> {
        self.inner.state.lock().capacity.clone()
    }

    pub fn banner(&self) -> Option<Banner> {
        self.inner.state.lock().banner.clone()
    }

    pub fn pending_action(&self) -> Option<PendingAction> {
        self.inner.tracker.current()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.tracker.is_busy()
    }

    pub fn feed_is_mock(&self) -> bool {
        self.inner.feed.is_mock()
    }

    /// Event log, newest first.
    pub fn events(&self) -> Vec<EventLogEntry> {
        self.inner.events.lock().entries().cloned().collect()
    }

    pub fn clear_events(&self) {
        self.inner.events.lock().clear();
    }

    pub fn explorer_link(&self, entry: &EventLogEntry) -> Option<String> {
        entry
            .tx_hash
            .as_ref()
            .map(|hash| self.inner.config.explorer_link(hash))
    }

    pub fn network_banner(&self) -> NetworkBanner {
        NetworkBanner {
            chain_id: self.session().chain_id,
            allowed_chain_id: self.inner.config.allowed_chain_id,
        }
    }

    pub fn control_gate(&self) -> ControlGate {
        let session = self.session();
        ControlGate {
            busy: self.is_busy(),
            network_allowed: session.network_allowed(self.inner.config.allowed_chain_id),
            capabilities: session.capabilities.clone(),
            authorized: session.is_authorized(),
        }
    }

    pub fn mint_control<'a>(&self, input: &'a str, gate: &'a ControlGate) -> MintControl<'a> {
        MintControl {
            input,
            mintable_max: self
                .capacity()
                .map(|capacity| capacity.mintable_max)
                .unwrap_or_default(),
            token_decimals: self.inner.config.token_decimals,
            gate,
        }
    }

    pub fn burn_control<'a>(&self, input: &'a str, gate: &'a ControlGate) -> BurnControl<'a> {
        BurnControl {
            input,
            balance: self
                .snapshot()
                .map(|snapshot| snapshot.balance)
                .unwrap_or_default(),
            token_decimals: self.inner.config.token_decimals,
            gate,
        }
    }

    pub fn reserve_control<'a>(&self, input: &'a str, gate: &'a ControlGate) -> ReserveControl<'a> {
        ReserveControl {
            input,
            total_supply: self
                .snapshot()
                .map(|snapshot| snapshot.total_supply)
                .unwrap_or_default(),
            scale: self.inner.config.unit_scale(),
            feed_is_mock: self.feed_is_mock(),
            gate,
        }
    }

    pub fn feed_control<'a>(&self, input: &'a str, gate: &'a ControlGate) -> FeedControl<'a> {
        FeedControl { input, gate }
    }

    pub fn pause_toggle<'a>(&self, gate: &'a ControlGate) -> PauseToggle<'a> {
        PauseToggle {
            paused: self.snapshot().is_some_and(|snapshot| snapshot.paused),
            gate,
        }
    }

    pub fn capacity_report(&self) -> Option<CapacityReport> {
        let (snapshot, capacity, feed) = {
            let state = self.inner.state.lock();
            (state.snapshot.clone()?, state.capacity.clone()?, state.feed?)
        };
        let config = &self.inner.config;
        let tokens = |raw| format_token(raw, config.token_decimals, &config.token_symbol);
        Some(CapacityReport {
            reserve: format_btc_reserve(snapshot.reserve, config.feed_decimals),
            capacity: tokens(capacity.reserve_capacity),
            total_supply: tokens(snapshot.total_supply),
            mintable: tokens(capacity.mintable_max),
            balance: tokens(snapshot.balance),
            usage_percent: capacity.usage_percent(),
            low_reserve_warning: capacity.low_reserve_warning,
            paused: snapshot.paused,
            feed,
        })
    }
}

fn failed_message(kind: ActionKind) -> String {
    format!("{kind} failed")
}

impl Drop for DappClient {
    fn drop(&mut self) {
        for handle in self.listeners.lock().drain(..) {
            handle.abort();
        }
    }
}
