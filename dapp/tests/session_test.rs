//! Satoshi Standard - connection and authorization tests
//! Drives the session state machine against the in-memory network

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{address, Address};
use anyhow::Result;
use satstd_dapp::errors::ConnectError;
use satstd_dapp::provider::{TokenContract, WalletEvent, WalletProvider};
use satstd_dapp::roles::{Capability, Role};
use satstd_dapp::session::{ConnectionState, Connector, SessionChange};
use satstd_dapp::{LocalNetwork, LocalNetworkConfig};

const MINTER: Address = address!("1111111111111111111111111111111111111111");
const OTHER: Address = address!("3333333333333333333333333333333333333333");
const STRANGER: Address = address!("9999999999999999999999999999999999999999");

/// Role queries take this long once `slow_roles` is applied.
const ROLE_LATENCY: Duration = Duration::from_millis(50);

fn slow_roles(network: &LocalNetwork) {
    network.set_read_delay(ROLE_LATENCY);
}

fn setup() -> (Arc<LocalNetwork>, Connector) {
    let network = LocalNetwork::new(LocalNetworkConfig::default());
    network.grant_role(Role::Minter, MINTER);
    let connector = Connector::new(
        Arc::clone(&network) as Arc<dyn WalletProvider>,
        Arc::clone(&network) as Arc<dyn TokenContract>,
    );
    (network, connector)
}

#[tokio::test]
async fn test_connect_with_role_is_authorized() -> Result<()> {
    let (network, connector) = setup();
    network.set_accounts(vec![MINTER, STRANGER]);

    let session = connector.connect().await?;
    assert_eq!(session.state, ConnectionState::ConnectedAuthorized);
    assert_eq!(session.address, Some(MINTER));
    assert_eq!(session.chain_id, Some(11_155_111));
    assert!(session.capabilities.holds(Role::Minter));
    assert!(session.signer_for(Capability::Mint).is_some());
    assert!(session.signer_for(Capability::Pause).is_none());

    // Watch views see the same state
    let view = connector.view();
    assert_eq!(view.borrow().state, ConnectionState::ConnectedAuthorized);
    Ok(())
}

#[tokio::test]
async fn test_connect_without_role_has_no_signer() -> Result<()> {
    let (network, connector) = setup();
    network.set_accounts(vec![STRANGER]);

    let session = connector.connect().await?;
    assert_eq!(session.state, ConnectionState::ConnectedUnauthorized);
    assert!(session.signer.is_none());
    assert!(!session.capabilities.is_authorized());
    Ok(())
}

#[tokio::test]
async fn test_connectivity_failures_stay_disconnected() -> Result<()> {
    let (network, connector) = setup();
    network.set_accounts(vec![MINTER]);

    network.reject_next_request();
    assert_eq!(connector.connect().await, Err(ConnectError::Rejected));
    assert_eq!(connector.current().state, ConnectionState::Disconnected);

    network.set_accounts(Vec::new());
    assert_eq!(connector.connect().await, Err(ConnectError::NoAccounts));

    network.uninstall_wallet();
    assert_eq!(connector.connect().await, Err(ConnectError::NoWallet));
    assert_eq!(connector.current().state, ConnectionState::Disconnected);
    Ok(())
}

#[tokio::test]
async fn test_account_switch_reauthorizes() -> Result<()> {
    let (network, connector) = setup();
    network.set_accounts(vec![MINTER]);
    connector.connect().await?;

    network.set_accounts(vec![STRANGER]);
    let change = connector
        .handle_event(WalletEvent::AccountsChanged(vec![STRANGER]))
        .await;
    let session = match change {
        SessionChange::Reauthorized(session) => session,
        other => panic!("expected re-authorization, got {other:?}"),
    };
    assert_eq!(session.state, ConnectionState::ConnectedUnauthorized);
    assert_eq!(session.address, Some(STRANGER));
    assert!(session.signer.is_none());
    Ok(())
}

#[tokio::test]
async fn test_empty_accounts_disconnects() -> Result<()> {
    let (network, connector) = setup();
    network.set_accounts(vec![MINTER]);
    connector.connect().await?;

    let change = connector
        .handle_event(WalletEvent::AccountsChanged(Vec::new()))
        .await;
    assert_eq!(change, SessionChange::Disconnected);

    let session = connector.current();
    assert_eq!(session.state, ConnectionState::Disconnected);
    assert!(session.address.is_none());
    assert!(session.signer.is_none());
    // The wallet is still on the same chain
    assert_eq!(session.chain_id, Some(11_155_111));
    Ok(())
}

#[tokio::test]
async fn test_chain_change_updates_chain_only() -> Result<()> {
    let (network, connector) = setup();
    network.set_accounts(vec![MINTER]);
    connector.connect().await?;

    let change = connector.handle_event(WalletEvent::ChainChanged(1)).await;
    assert_eq!(change, SessionChange::ChainChanged(1));

    let session = connector.current();
    assert_eq!(session.state, ConnectionState::ConnectedAuthorized);
    assert_eq!(session.chain_id, Some(1));
    assert!(!session.network_allowed(11_155_111));
    Ok(())
}

#[tokio::test]
async fn test_account_change_before_connect_is_ignored() -> Result<()> {
    let (_network, connector) = setup();
    let change = connector
        .handle_event(WalletEvent::AccountsChanged(vec![MINTER]))
        .await;
    assert_eq!(change, SessionChange::Unchanged);
    assert_eq!(connector.current().state, ConnectionState::Disconnected);
    Ok(())
}

#[tokio::test]
async fn test_dropped_subscription_deregisters() -> Result<()> {
    let (network, _connector) = setup();
    let mut subscription = network.subscribe();
    assert_eq!(network.wallet_listener_count(), 1);

    network.switch_chain(31337);
    assert_eq!(subscription.recv().await, Some(WalletEvent::ChainChanged(31337)));

    drop(subscription);
    assert_eq!(network.wallet_listener_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_reauthorization_wins() -> Result<()> {
    let (network, connector) = setup();
    network.grant_role(Role::Minter, OTHER);
    network.set_accounts(vec![MINTER, OTHER]);
    connector.connect().await?;
    slow_roles(&network);

    let connector = Arc::new(connector);
    let switching = tokio::spawn({
        let connector = Arc::clone(&connector);
        async move {
            connector
                .handle_event(WalletEvent::AccountsChanged(vec![OTHER]))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    connector.disconnect();

    assert_eq!(switching.await?, SessionChange::Unchanged);
    let session = connector.current();
    assert_eq!(session.state, ConnectionState::Disconnected);
    assert!(session.address.is_none());
    assert!(session.signer.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_empty_accounts_during_connect_wins() -> Result<()> {
    let (network, connector) = setup();
    network.set_accounts(vec![MINTER]);
    slow_roles(&network);

    let connector = Arc::new(connector);
    let connecting = tokio::spawn({
        let connector = Arc::clone(&connector);
        async move { connector.connect().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(connector.current().state, ConnectionState::Connecting);

    let change = connector
        .handle_event(WalletEvent::AccountsChanged(Vec::new()))
        .await;
    assert_eq!(change, SessionChange::Disconnected);

    assert_eq!(connecting.await?, Err(ConnectError::Superseded));
    let session = connector.current();
    assert_eq!(session.state, ConnectionState::Disconnected);
    assert!(session.signer.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_second_connect_while_connecting_is_refused() -> Result<()> {
    let (network, connector) = setup();
    network.set_accounts(vec![MINTER]);
    slow_roles(&network);

    let connector = Arc::new(connector);
    let first = tokio::spawn({
        let connector = Arc::clone(&connector);
        async move { connector.connect().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(connector.connect().await, Err(ConnectError::InProgress));
    let session = first.await??;
    assert_eq!(session.state, ConnectionState::ConnectedAuthorized);
    assert_eq!(connector.current(), session);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_chain_change_during_reauthorization_is_kept() -> Result<()> {
    let (network, connector) = setup();
    network.grant_role(Role::Minter, OTHER);
    network.set_accounts(vec![MINTER, OTHER]);
    connector.connect().await?;
    slow_roles(&network);

    let connector = Arc::new(connector);
    let switching = tokio::spawn({
        let connector = Arc::clone(&connector);
        async move {
            connector
                .handle_event(WalletEvent::AccountsChanged(vec![OTHER]))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    connector.handle_event(WalletEvent::ChainChanged(1)).await;

    let session = match switching.await? {
        SessionChange::Reauthorized(session) => session,
        other => panic!("expected re-authorization, got {other:?}"),
    };
    assert_eq!(session.address, Some(OTHER));
    assert_eq!(session.chain_id, Some(1));
    assert_eq!(connector.current().chain_id, Some(1));
    Ok(())
}
