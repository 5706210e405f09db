//! Wallet connection and authorization state machine
//!
//! `Disconnected -> Connecting -> ConnectedUnauthorized | ConnectedAuthorized`,
//! back to `Disconnected` on disconnect or an empty accounts notification.
//! [`Connector`] is the only writer; everyone else holds a [`SessionView`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy_primitives::Address;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::errors::ConnectError;
use crate::provider::{Signer, TokenContract, WalletEvent, WalletProvider};
use crate::roles::{Capabilities, Capability};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    ConnectedUnauthorized,
    ConnectedAuthorized,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub state: ConnectionState,
    pub address: Option<Address>,
    pub chain_id: Option<u64>,
    pub capabilities: Capabilities,
    /// Present only in `ConnectedAuthorized`
    pub signer: Option<Signer>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            address: None,
            chain_id: None,
            capabilities: Capabilities::none(),
            signer: None,
        }
    }
}

impl Session {
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::ConnectedAuthorized | ConnectionState::ConnectedUnauthorized
        )
    }

    pub fn is_authorized(&self) -> bool {
        self.state == ConnectionState::ConnectedAuthorized
    }

    pub fn network_allowed(&self, allowed_chain_id: u64) -> bool {
        self.chain_id == Some(allowed_chain_id)
    }

    /// Signer usable for `capability`, if the session grants it
    pub fn signer_for(&self, capability: Capability) -> Option<&Signer> {
        self.signer
            .as_ref()
            .filter(|_| self.is_authorized() && self.capabilities.allows(capability))
    }
}

/// Read-only view of the session
pub type SessionView = watch::Receiver<Session>;

/// What an account-change or chain-change notification did to the session
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionChange {
    ChainChanged(u64),
    Reauthorized(Session),
    Disconnected,
    Unchanged,
}

pub struct Connector {
    wallet: Arc<dyn WalletProvider>,
    token: Arc<dyn TokenContract>,
    state: watch::Sender<Session>,
    /// Bumped by every connect, re-authorization and reset. An awaited result
    /// is published only while its epoch is still the latest.
    epoch: AtomicU64,
}

impl Connector {
    pub fn new(wallet: Arc<dyn WalletProvider>, token: Arc<dyn TokenContract>) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            wallet,
            token,
            state,
            epoch: AtomicU64::new(0),
        }
    }

    fn next_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Applies `update` if nothing started since `epoch`, returning the
    /// published session.
    fn commit(&self, epoch: u64, update: impl FnOnce(&mut Session)) -> Option<Session> {
        let mut committed = None;
        self.state.send_if_modified(|session| {
            if !self.is_current(epoch) {
                return false;
            }
            update(session);
            committed = Some(session.clone());
            true
        });
        committed
    }

    pub fn view(&self) -> SessionView {
        self.state.subscribe()
    }

    pub fn current(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Requests accounts and authorizes the first one.
    ///
    /// # Errors
    /// Connectivity failures leave the session `Disconnected`. An address with
    /// no role is not an error: the session ends `ConnectedUnauthorized`.
    pub async fn connect(&self) -> Result<Session, ConnectError> {
        let mut started = None;
        self.state.send_if_modified(|session| {
            if session.state == ConnectionState::Connecting {
                return false;
            }
            started = Some(self.next_epoch());
            session.state = ConnectionState::Connecting;
            true
        });
        let Some(epoch) = started else {
            return Err(ConnectError::InProgress);
        };

        match self.establish().await {
            Ok(session) => self
                .commit(epoch, |current| *current = session)
                .ok_or_else(|| {
                    debug!("connection attempt superseded");
                    ConnectError::Superseded
                }),
            Err(err) => {
                warn!("wallet connection failed: {err}");
                if self.commit(epoch, disconnected).is_none() {
                    return Err(ConnectError::Superseded);
                }
                Err(err)
            }
        }
    }

    async fn establish(&self) -> Result<Session, ConnectError> {
        let accounts = self.wallet.request_accounts().await?;
        let address = *accounts.first().ok_or(ConnectError::NoAccounts)?;
        let chain_id = self.wallet.chain_id().await?;
        self.authorize(address, Some(chain_id)).await
    }

    async fn authorize(
        &self,
        address: Address,
        chain_id: Option<u64>,
    ) -> Result<Session, ConnectError> {
        let capabilities = self.token.capabilities(address).await?;

        if !capabilities.is_authorized() {
            info!(%address, "connected address holds no recognized role");
            return Ok(Session {
                state: ConnectionState::ConnectedUnauthorized,
                address: Some(address),
                chain_id,
                capabilities,
                signer: None,
            });
        }

        let signer = self.wallet.signer(address)?;
        info!(%address, roles = ?capabilities.roles().collect::<Vec<_>>(), "wallet authorized");
        Ok(Session {
            state: ConnectionState::ConnectedAuthorized,
            address: Some(address),
            chain_id,
            capabilities,
            signer: Some(signer),
        })
    }

    pub fn disconnect(&self) {
        debug!("session reset");
        self.reset();
    }

    /// Back to `Disconnected`, dropping any authorization still in flight.
    fn reset(&self) {
        self.state.send_modify(|session| {
            self.next_epoch();
            disconnected(session);
        });
    }

    /// Reads the chain id without requesting account access.
    pub async fn refresh_chain_id(&self) -> Option<u64> {
        match self.wallet.chain_id().await {
            Ok(chain_id) => {
                self.state.send_modify(|session| session.chain_id = Some(chain_id));
                Some(chain_id)
            }
            Err(err) => {
                debug!("chain id unavailable: {err}");
                None
            }
        }
    }

    /// Applies one wallet notification.
    pub async fn handle_event(&self, event: WalletEvent) -> SessionChange {
        match event {
            WalletEvent::ChainChanged(chain_id) => {
                debug!(chain_id, "chain changed");
                self.state.send_modify(|session| session.chain_id = Some(chain_id));
                SessionChange::ChainChanged(chain_id)
            }
            WalletEvent::AccountsChanged(accounts) => {
                let Some(address) = accounts.first().copied() else {
                    self.disconnect();
                    return SessionChange::Disconnected;
                };
                let current = self.current();
                if !current.is_connected() {
                    // Account switches before an explicit connect are not authorization
                    return SessionChange::Unchanged;
                }
                let epoch = self.next_epoch();
                let authorized = self.authorize(address, current.chain_id).await;
                let committed = match authorized {
                    // Chain notifications that arrived meanwhile win
                    Ok(session) => self
                        .commit(epoch, |latest| {
                            *latest = Session {
                                chain_id: latest.chain_id,
                                ..session
                            }
                        })
                        .map(SessionChange::Reauthorized),
                    Err(err) => {
                        warn!(%address, "re-authorization failed: {err}");
                        self.commit(epoch, disconnected)
                            .map(|_| SessionChange::Disconnected)
                    }
                };
                committed.unwrap_or_else(|| {
                    debug!(%address, "re-authorization superseded");
                    SessionChange::Unchanged
                })
            }
        }
    }
}

/// The chain id belongs to the wallet and survives a disconnect.
fn disconnected(session: &mut Session) {
    *session = Session {
        chain_id: session.chain_id,
        ..Session::default()
    };
}
