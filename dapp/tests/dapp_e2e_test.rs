//! Satoshi Standard - End-to-End Tests
//!
//! Full client flows against the in-memory network: connect, read the
//! reserve, submit actions, follow banners and the event log.
//! The clock is paused so display timeouts are deterministic.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{address, Address};
use anyhow::{Context, Result};
use satstd_dapp::actions::ActionStatus;
use satstd_dapp::errors::ValidationError;
use satstd_dapp::events::Severity;
use satstd_dapp::local::REVERT_EXCEEDS_RESERVE;
use satstd_dapp::roles::Role;
use satstd_dapp::session::ConnectionState;
use satstd_dapp::units::parse_units;
use satstd_dapp::{
    ActionOutcome, BannerKind, DappClient, DappConfig, LocalNetwork, LocalNetworkConfig,
};

const MINTER: Address = address!("1111111111111111111111111111111111111111");
const ADMIN: Address = address!("2222222222222222222222222222222222222222");
const OTHER: Address = address!("3333333333333333333333333333333333333333");
const STRANGER: Address = address!("9999999999999999999999999999999999999999");

fn tokens(amount: &str) -> alloy_primitives::U256 {
    parse_units(amount, 18).unwrap()
}

/// Network with `reserve` BTC behind the token and `account` in the wallet.
fn setup(reserve: &str, account: Address, role: Option<Role>) -> (Arc<LocalNetwork>, DappClient) {
    setup_on_chain(reserve, account, role, 11_155_111)
}

fn setup_on_chain(
    reserve: &str,
    account: Address,
    role: Option<Role>,
    chain_id: u64,
) -> (Arc<LocalNetwork>, DappClient) {
    let network = LocalNetwork::new(LocalNetworkConfig {
        chain_id,
        reserve: parse_units(reserve, 18).unwrap(),
        ..Default::default()
    });
    if let Some(role) = role {
        network.grant_role(role, account);
    }
    network.set_accounts(vec![account]);
    let client = DappClient::local(DappConfig::default(), &network);
    (network, client)
}

/// Lets listener tasks drain their queues.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_mint_against_small_reserve() -> Result<()> {
    let (_network, client) = setup("0.0002", MINTER, Some(Role::Minter));
    client.mount().await;

    let session = client.connect().await?;
    assert_eq!(session.state, ConnectionState::ConnectedAuthorized);
    let banner = client.banner().context("no banner after connect")?;
    assert_eq!(banner.kind, BannerKind::Success);
    assert_eq!(banner.text, "Wallet connected");

    let capacity = client.capacity().context("capacity not derived")?;
    assert_eq!(capacity.reserve_capacity, tokens("20000"));
    assert_eq!(capacity.mintable_max, tokens("20000"));
    assert_eq!(client.mint_control("", &client.control_gate()).max_fill(), "20000");

    let outcome = client.mint("1").await;
    assert!(matches!(outcome, ActionOutcome::Confirmed(_)), "{outcome:?}");

    let capacity = client.capacity().context("capacity not derived")?;
    assert_eq!(capacity.mintable_max, tokens("19999"));
    assert_eq!(client.snapshot().context("no snapshot")?.balance, tokens("1"));
    assert_eq!(client.banner().map(|banner| banner.text), Some("Minted 1 SATSTD".to_string()));

    let action = client.pending_action().context("no action")?;
    assert_eq!(action.status, ActionStatus::Confirmed);
    assert!(action.tx_hash.is_some());

    settle().await;
    let events = client.events();
    let latest = events.first().context("event log is empty")?;
    assert!(latest.description.starts_with("Minted 1.0000 SATSTD to 0x1111"));
    assert_eq!(latest.severity, Severity::Success);
    assert!(client
        .explorer_link(latest)
        .is_some_and(|link| link.starts_with("https://sepolia.etherscan.io/tx/0x")));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_burn_without_balance_never_submits() -> Result<()> {
    let (network, client) = setup("0.0002", MINTER, Some(Role::Minter));
    network.set_auto_mine(false);
    client.mount().await;
    client.connect().await?;

    let outcome = client.burn("1").await;
    assert_eq!(outcome, ActionOutcome::Rejected(ValidationError::InsufficientBalance));
    assert_eq!(network.pending_count(), 0);
    assert!(client.pending_action().is_none());
    assert!(!client.is_busy());

    let banner = client.banner().context("no banner")?;
    assert_eq!(banner.kind, BannerKind::Error);
    assert!(banner.text.contains("insufficient balance"));

    settle().await;
    assert!(client.events().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_address_without_role_disables_everything() -> Result<()> {
    let (network, client) = setup("1", STRANGER, None);
    client.mount().await;

    let session = client.connect().await?;
    assert_eq!(session.state, ConnectionState::ConnectedUnauthorized);
    assert!(session.signer.is_none());
    assert!(client.snapshot().is_none());
    assert!(client
        .banner()
        .is_some_and(|banner| banner.kind == BannerKind::Error && banner.text.starts_with("Access denied")));

    let gate = client.control_gate();
    assert!(client.mint_control("1", &gate).is_disabled());
    assert!(client.burn_control("1", &gate).is_disabled());
    assert!(client.reserve_control("1", &gate).is_disabled());
    assert!(client.feed_control(&network.reserve_feed_address().to_string(), &gate).is_disabled());
    assert!(client.pause_toggle(&gate).is_disabled());

    assert_eq!(client.mint("1").await, ActionOutcome::Rejected(ValidationError::NotAuthorized));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_wrong_chain_shows_banner_and_blocks_writes() -> Result<()> {
    let (network, client) = setup_on_chain("1", ADMIN, Some(Role::Admin), 1);
    client.mount().await;
    client.connect().await?;

    let warning = client.network_banner().warning().context("no network warning")?;
    assert!(warning.contains("only works on chain 11155111"));
    assert!(warning.contains("You're on 1"));

    let gate = client.control_gate();
    assert!(!gate.network_allowed);
    assert!(client.mint_control("1", &gate).input_disabled());
    assert!(client.mint_control("1", &gate).is_disabled());
    assert!(client.pause_toggle(&gate).is_disabled());
    assert_eq!(client.mint("1").await, ActionOutcome::Rejected(ValidationError::WrongNetwork));

    network.switch_chain(11_155_111);
    settle().await;
    assert!(client.network_banner().warning().is_none());
    assert!(!client.mint_control("1", &client.control_gate()).is_disabled());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_second_action_while_pending_is_a_no_op() -> Result<()> {
    let (network, client) = setup("0.0002", MINTER, Some(Role::Minter));
    network.set_auto_mine(false);
    let client = Arc::new(client);
    client.mount().await;
    client.connect().await?;

    let first = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.mint("1").await }
    });
    settle().await;

    assert!(client.is_busy());
    let action = client.pending_action().context("no action in flight")?;
    assert_eq!(action.status, ActionStatus::Submitted);
    assert_eq!(client.banner().map(|banner| banner.text), Some("Mint transaction sent...".to_string()));
    assert!(client.mint_control("1", &client.control_gate()).is_disabled());

    assert_eq!(client.mint("2").await, ActionOutcome::Busy);
    assert_eq!(client.burn("1").await, ActionOutcome::Busy);
    assert_eq!(network.pending_count(), 1);

    assert_eq!(network.mine(), 1);
    let outcome = first.await?;
    assert!(matches!(outcome, ActionOutcome::Confirmed(_)), "{outcome:?}");
    assert_eq!(client.snapshot().context("no snapshot")?.total_supply, tokens("1"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_revert_reason_is_surfaced_verbatim() -> Result<()> {
    let (network, client) = setup("0.0002", MINTER, Some(Role::Minter));
    client.mount().await;
    client.connect().await?;

    // The client still believes 20,000 are mintable
    network.set_feed_answer(network.reserve_feed_address(), tokens("0"));
    let outcome = client.mint("1").await;
    assert_eq!(outcome, ActionOutcome::Failed(REVERT_EXCEEDS_RESERVE.to_string()));

    let action = client.pending_action().context("no action")?;
    assert_eq!(action.status, ActionStatus::Failed);
    assert_eq!(action.failure.as_deref(), Some(REVERT_EXCEEDS_RESERVE));
    assert_eq!(client.banner().map(|banner| banner.text), Some(REVERT_EXCEEDS_RESERVE.to_string()));

    network.set_feed_answer(network.reserve_feed_address(), parse_units("0.0002", 18)?);
    network.decline_next_signature();
    let outcome = client.mint("1").await;
    assert_eq!(outcome, ActionOutcome::Failed("user rejected transaction".to_string()));
    assert!(!client.is_busy());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_read_failure_keeps_previous_snapshot() -> Result<()> {
    let (network, client) = setup("0.0002", MINTER, Some(Role::Minter));
    client.mount().await;
    client.connect().await?;
    let before = client.snapshot().context("no snapshot")?;

    network.set_fail_reads(true);
    assert!(!client.refresh().await);
    assert_eq!(client.snapshot(), Some(before));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_messages_and_actions_clear_after_timeout() -> Result<()> {
    let (_network, client) = setup("0.0002", MINTER, Some(Role::Minter));
    client.mount().await;
    client.connect().await?;

    assert!(matches!(client.mint("1").await, ActionOutcome::Confirmed(_)));
    assert!(client.banner().is_some());
    assert!(client.pending_action().is_some());

    tokio::time::sleep(client.config().message_timeout() / 2).await;
    assert!(client.banner().is_some());

    tokio::time::sleep(client.config().message_timeout()).await;
    assert!(client.banner().is_none());
    assert!(client.pending_action().is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_pause_blocks_mint_and_burn() -> Result<()> {
    let (_network, client) = setup("1", ADMIN, Some(Role::Admin));
    client.mount().await;
    client.connect().await?;

    assert!(matches!(client.mint("5").await, ActionOutcome::Confirmed(_)));
    assert_eq!(client.pause_toggle(&client.control_gate()).label(), "Pause");
    assert!(matches!(client.toggle_pause().await, ActionOutcome::Confirmed(_)));
    assert!(client.snapshot().is_some_and(|snapshot| snapshot.paused));
    assert_eq!(client.pause_toggle(&client.control_gate()).label(), "Unpause");

    assert_eq!(client.mint("1").await, ActionOutcome::Rejected(ValidationError::Paused));
    assert_eq!(client.burn("1").await, ActionOutcome::Rejected(ValidationError::Paused));

    settle().await;
    let paused = client
        .events()
        .into_iter()
        .find(|entry| entry.kind == "Paused")
        .context("no Paused event")?;
    assert_eq!(paused.severity, Severity::Error);
    assert!(paused.description.starts_with("Contract paused by 0x2222"));

    assert!(matches!(client.toggle_pause().await, ActionOutcome::Confirmed(_)));
    assert!(matches!(client.burn("1").await, ActionOutcome::Confirmed(_)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reserve_and_feed_administration() -> Result<()> {
    let (network, client) = setup("0.0002", ADMIN, Some(Role::Admin));
    client.mount().await;
    client.connect().await?;
    assert!(client.feed_is_mock());

    assert!(matches!(client.set_reserve("0.001").await, ActionOutcome::Confirmed(_)));
    let capacity = client.capacity().context("capacity not derived")?;
    assert_eq!(capacity.reserve_capacity, tokens("100000"));
    assert_eq!(client.banner().map(|banner| banner.text), Some("Reserve set to 0.001 BTC".to_string()));

    assert!(matches!(client.mint("50000").await, ActionOutcome::Confirmed(_)));
    assert_eq!(
        client.set_reserve("0.0001").await,
        ActionOutcome::Rejected(ValidationError::BelowTotalSupply)
    );

    let live_feed = network.deploy_feed(parse_units("0.01", 18)?, false);
    assert!(matches!(
        client.set_feed(&live_feed.to_string()).await,
        ActionOutcome::Confirmed(_)
    ));
    assert!(!client.feed_is_mock());
    assert_eq!(
        client.capacity().context("capacity not derived")?.reserve_capacity,
        tokens("1000000")
    );
    let report = client.capacity_report().context("no report")?;
    assert_eq!(report.feed, live_feed);
    assert_eq!(
        client.set_reserve("1").await,
        ActionOutcome::Rejected(ValidationError::MockFeedOnly)
    );
    assert_eq!(
        client.set_feed("0x1234").await,
        ActionOutcome::Rejected(ValidationError::InvalidAddress)
    );

    settle().await;
    assert!(client
        .events()
        .iter()
        .any(|entry| entry.description.starts_with("Reserve feed changed:")));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_account_switch_and_unmount() -> Result<()> {
    let (network, client) = setup("0.0002", MINTER, Some(Role::Minter));
    client.mount().await;
    assert_eq!(network.wallet_listener_count(), 1);
    assert_eq!(network.event_listener_count(), 1);
    client.connect().await?;

    network.set_accounts(vec![STRANGER]);
    settle().await;
    assert_eq!(client.session().state, ConnectionState::ConnectedUnauthorized);
    assert!(client.snapshot().is_none());

    network.set_accounts(Vec::new());
    settle().await;
    assert_eq!(client.session().state, ConnectionState::Disconnected);

    network.emit_raw_event("OwnershipTransferred");
    settle().await;
    assert_eq!(
        client.events().first().map(|entry| entry.description.clone()),
        Some("OwnershipTransferred event occurred".to_string())
    );
    client.clear_events();
    assert!(client.events().is_empty());

    client.unmount().await;
    assert!(!client.is_mounted());
    assert_eq!(network.wallet_listener_count(), 0);
    assert_eq!(network.event_listener_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_switch_to_unreadable_account_drops_previous_balance() -> Result<()> {
    let (network, client) = setup("0.0002", MINTER, Some(Role::Minter));
    network.grant_role(Role::Minter, OTHER);
    client.mount().await;
    client.connect().await?;
    assert!(matches!(client.mint("5").await, ActionOutcome::Confirmed(_)));
    assert_eq!(client.snapshot().context("no snapshot")?.balance, tokens("5"));

    network.fail_balance_reads(OTHER);
    network.set_accounts(vec![OTHER]);
    settle().await;
    let session = client.session();
    assert_eq!(session.address, Some(OTHER));
    assert!(session.is_authorized());
    assert!(client.snapshot().is_none());
    assert!(client.capacity_report().is_none());

    assert_eq!(client.burn("5").await, ActionOutcome::Rejected(ValidationError::NoSnapshot));
    assert_eq!(network.pending_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_snapshot_read_stays_empty() -> Result<()> {
    let (network, client) = setup("0.0002", MINTER, Some(Role::Minter));
    client.mount().await;
    network.set_read_delay(Duration::from_millis(50));
    let client = Arc::new(client);

    let connecting = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.connect().await }
    });
    // Roles resolve at 50ms, the snapshot reads at 100ms
    tokio::time::sleep(Duration::from_millis(75)).await;
    assert!(client.session().is_authorized());
    client.disconnect();

    let session = connecting.await??;
    assert_eq!(session.address, Some(MINTER));
    assert_eq!(client.session().state, ConnectionState::Disconnected);
    assert!(client.snapshot().is_none());
    assert!(client.capacity().is_none());
    Ok(())
}
