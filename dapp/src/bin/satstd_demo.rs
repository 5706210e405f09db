//! Satoshi Standard - Local Demo Script
//!
//! Walks through the client flow on an in-memory network:
//! 1. Connect a minter wallet
//! 2. Read the reserve (0.0002 BTC backs 20,000 SATSTD)
//! 3. Mint and burn
//! 4. Local rejections that never reach the chain
//! 5. Wrong network and an address without roles
//! 6. The live event log

use std::time::Duration;

use alloy_primitives::Address;
use anyhow::{bail, Context, Result};
use satstd_dapp::roles::Role;
use satstd_dapp::units::parse_units;
use satstd_dapp::{ActionOutcome, DappClient, DappConfig, LocalNetwork, LocalNetworkConfig};
use tracing_subscriber::EnvFilter;

fn print_step(num: u32, text: &str) {
    println!("\n━━━ Step {num}: {text} ━━━\n");
}

fn expect_confirmed(outcome: ActionOutcome, what: &str) -> Result<()> {
    match outcome {
        ActionOutcome::Confirmed(receipt) => {
            println!("✓ {what} confirmed in block {}", receipt.block_number);
            println!("  tx: {}", receipt.tx_hash);
            Ok(())
        }
        other => bail!("{what} did not confirm: {other:?}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║          SATOSHI STANDARD - Local Network Demo             ║");
    println!("║             BTC-reserve-backed SATSTD token                ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let config = DappConfig {
        message_timeout_ms: 200,
        ..Default::default()
    };
    let network = LocalNetwork::new(LocalNetworkConfig {
        chain_id: config.allowed_chain_id,
        reserve: parse_units("0.0002", config.feed_decimals).context("invalid reserve")?,
        ..Default::default()
    });

    // =========================================================================
    // STEP 1: Connect
    // =========================================================================
    print_step(1, "Connecting a minter wallet");

    let minter = Address::repeat_byte(0x11);
    network.grant_role(Role::Minter, minter);
    network.set_accounts(vec![minter]);

    let client = DappClient::local(config.clone(), &network);
    client.mount().await;
    let session = client.connect().await.context("connect failed")?;
    println!("✓ Connected as {minter}");
    println!("  State: {:?}", session.state);
    println!(
        "  Roles: {:?}",
        session.capabilities.roles().collect::<Vec<_>>()
    );

    // =========================================================================
    // STEP 2: Reserve snapshot
    // =========================================================================
    print_step(2, "Reading the BTC reserve");

    let report = client.capacity_report().context("snapshot not loaded")?;
    println!("{report}");
    let gate = client.control_gate();
    println!("  Max quick-fill: {}", client.mint_control("", &gate).max_fill());

    // =========================================================================
    // STEP 3: Mint and burn
    // =========================================================================
    print_step(3, "Minting and burning");

    expect_confirmed(client.mint("1").await, "Mint 1 SATSTD")?;
    let gate = client.control_gate();
    println!("  Mintable now: {}", client.mint_control("", &gate).max_fill());
    expect_confirmed(client.burn("0.25").await, "Burn 0.25 SATSTD")?;
    if let Some(report) = client.capacity_report() {
        println!("{report}");
    }

    // =========================================================================
    // STEP 4: Local rejections
    // =========================================================================
    print_step(4, "Requests rejected before submission");

    for (label, outcome) in [
        ("mint 1,000,000", client.mint("1000000").await),
        ("burn 5", client.burn("5").await),
        ("mint 0", client.mint("0").await),
        ("pause as minter", client.toggle_pause().await),
    ] {
        match outcome {
            ActionOutcome::Rejected(reason) => println!("✓ {label}: {reason}"),
            other => bail!("{label} should have been rejected, got {other:?}"),
        }
    }
    println!("  Transactions waiting: {}", network.pending_count());

    // =========================================================================
    // STEP 5: Network and authorization
    // =========================================================================
    print_step(5, "Wrong network and unauthorized address");

    network.switch_chain(1);
    tokio::time::sleep(Duration::from_millis(20)).await;
    if let Some(warning) = client.network_banner().warning() {
        println!("✓ {warning}");
    }
    let gate = client.control_gate();
    println!(
        "  Mint button disabled: {}",
        client.mint_control("1", &gate).is_disabled()
    );
    network.switch_chain(config.allowed_chain_id);

    let stranger = Address::repeat_byte(0x99);
    network.set_accounts(vec![stranger]);
    tokio::time::sleep(Duration::from_millis(20)).await;
    println!("✓ Switched to {stranger}: {:?}", client.session().state);
    if let Some(banner) = client.banner() {
        println!("  Banner: {}", banner.text);
    }

    // =========================================================================
    // STEP 6: Event log
    // =========================================================================
    print_step(6, "Live event log");

    for entry in client.events().iter().rev() {
        println!("  [{}] {}", entry.severity, entry.description);
        if let Some(link) = client.explorer_link(entry) {
            println!("        {link}");
        }
    }

    client.unmount().await;
    println!("\n✓ Demo complete");
    Ok(())
}

