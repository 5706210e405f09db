//! Satoshi Standard - operator console
//!
//! Drives a [`DappClient`] against an in-memory network, one command per
//! line, either interactively or from a script. Also writes a default
//! configuration file.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use satstd_dapp::roles::Role;
use satstd_dapp::units::parse_units;
use satstd_dapp::{ActionOutcome, DappClient, DappConfig, LocalNetwork, LocalNetworkConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "satstd-console", version, about = "Satoshi Standard operator console")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, env = "SATSTD_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a console against a local network
    Run {
        /// Read commands from a file instead of stdin
        #[arg(long)]
        script: Option<PathBuf>,
        /// Initial BTC reserve of the mock feed
        #[arg(long, default_value = "0.0002")]
        reserve: String,
        /// Role granted to the console's wallet account
        #[arg(long, value_enum, default_value_t = RoleArg::Admin)]
        role: RoleArg,
    },
    /// Write a configuration file with default values
    GenerateConfig {
        #[arg(long, default_value = "satstd.toml")]
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleArg {
    Admin,
    Operator,
    Minter,
    Pauser,
    None,
}

impl RoleArg {
    fn role(self) -> Option<Role> {
        match self {
            RoleArg::Admin => Some(Role::Admin),
            RoleArg::Operator => Some(Role::Operator),
            RoleArg::Minter => Some(Role::Minter),
            RoleArg::Pauser => Some(Role::Pauser),
            RoleArg::None => None,
        }
    }
}

const HELP: &str = "\
commands:
  connect | disconnect | status | check-network | report
  mint <amount> | burn <amount> | max
  set-reserve <btc> | set-feed <address> | deploy-feed <btc> [live] | pause
  events | clear-events
  switch-chain <id> | switch-account <address> [role]
  help | quit";

/// Time for listener tasks to apply wallet notifications before printing.
const SETTLE: Duration = Duration::from_millis(20);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    execute_cli(Cli::parse()).await
}

async fn execute_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Command::GenerateConfig { path, force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            DappConfig::default()
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✓ Wrote {}", path.display());
            Ok(())
        }
        Command::Run {
            script,
            reserve,
            role,
        } => {
            let config = load_config(cli.config.as_deref())?;
            run(config, script, &reserve, role).await
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<DappConfig> {
    match path {
        Some(path) => DappConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(DappConfig::default()),
    }
}

async fn run(config: DappConfig, script: Option<PathBuf>, reserve: &str, role: RoleArg) -> Result<()> {
    let network = LocalNetwork::new(LocalNetworkConfig {
        chain_id: config.allowed_chain_id,
        reserve: parse_units(reserve, config.feed_decimals).context("Invalid --reserve")?,
        scale: config.unit_scale(),
        ..Default::default()
    });
    let account = Address::repeat_byte(0x11);
    if let Some(role) = role.role() {
        network.grant_role(role, account);
    }
    network.set_accounts(vec![account]);

    let client = DappClient::local(config, &network);
    client.mount().await;
    info!(%account, "console ready");

    let interactive = script.is_none();
    let input: Box<dyn BufRead> = match script {
        Some(path) => {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read script {}", path.display()))?;
            Box::new(io::Cursor::new(content))
        }
        None => {
            println!("{HELP}");
            Box::new(io::BufReader::new(io::stdin()))
        }
    };

    let mut lines = input.lines();
    loop {
        if interactive {
            print!("satstd> ");
            io::stdout().flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !interactive {
            println!("> {line}");
        }
        match execute(&client, &network, line).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => println!("error: {err:#}"),
        }
    }

    client.unmount().await;
    Ok(())
}

/// Runs one console command. Returns `false` on quit.
async fn execute(client: &DappClient, network: &LocalNetwork, line: &str) -> Result<bool> {
    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default();
    let arg = words.next();

    match command {
        "help" => println!("{HELP}"),
        "quit" | "exit" => return Ok(false),
        "connect" => match client.connect().await {
            Ok(session) => println!("✓ {:?} as {:?}", session.state, session.address),
            Err(err) => println!("✗ {err}"),
        },
        "disconnect" => {
            client.disconnect();
            println!("✓ Disconnected");
        }
        "status" => print_status(client),
        "check-network" => {
            let banner = client.network_banner();
            match banner.warning() {
                Some(warning) => println!("✗ {warning}"),
                None => println!("✓ Chain {} is supported", banner.allowed_chain_id),
            }
            let config = client.config();
            println!("  Token: {}", config.token_address);
            println!("  Feed:  {} (configured)", config.feed_address);
        }
        "report" => {
            client.refresh().await;
            match client.capacity_report() {
                Some(report) => println!("{report}"),
                None => println!("  Reserve data not loaded (connect an authorized wallet)"),
            }
        }
        "max" => {
            let gate = client.control_gate();
            let control = client.mint_control("", &gate);
            if control.max_disabled() {
                println!("✗ Nothing left to mint");
            } else {
                println!("{}", control.max_fill());
            }
        }
        "mint" => print_outcome(client, client.mint(required(arg, "amount")?).await),
        "burn" => print_outcome(client, client.burn(required(arg, "amount")?).await),
        "set-reserve" => print_outcome(client, client.set_reserve(required(arg, "btc")?).await),
        "set-feed" => print_outcome(client, client.set_feed(required(arg, "address")?).await),
        "pause" => print_outcome(client, client.toggle_pause().await),
        "deploy-feed" => {
            let btc = required(arg, "btc")?;
            let answer = parse_units(btc, client.config().feed_decimals)?;
            let mock = words.next() != Some("live");
            let address = network.deploy_feed(answer, mock);
            println!("✓ Feed deployed at {address} (mock: {mock})");
        }
        "events" => {
            let events = client.events();
            if events.is_empty() {
                println!("  No events yet");
            }
            for entry in events {
                println!("  [{}] {}", entry.severity, entry.description);
                if let Some(link) = client.explorer_link(&entry) {
                    println!("        {link}");
                }
            }
        }
        "clear-events" => client.clear_events(),
        "switch-chain" => {
            let chain_id: u64 = required(arg, "chain id")?
                .parse()
                .context("chain id must be a number")?;
            network.switch_chain(chain_id);
            tokio::time::sleep(SETTLE).await;
            println!("✓ Wallet on chain {chain_id}");
        }
        "switch-account" => {
            let address = Address::from_str(required(arg, "address")?).context("invalid address")?;
            if let Some(role) = words.next() {
                let role = RoleArg::from_str(role, true).map_err(anyhow::Error::msg)?;
                if let Some(role) = role.role() {
                    network.grant_role(role, address);
                }
            }
            network.set_accounts(vec![address]);
            tokio::time::sleep(SETTLE).await;
            println!("✓ Wallet account {address}: {:?}", client.session().state);
        }
        other => bail!("unknown command {other:?}, try help"),
    }
    Ok(true)
}

fn required<'a>(arg: Option<&'a str>, name: &str) -> Result<&'a str> {
    arg.with_context(|| format!("missing <{name}>"))
}

fn print_outcome(client: &DappClient, outcome: ActionOutcome) {
    match outcome {
        ActionOutcome::Confirmed(receipt) => {
            if let Some(banner) = client.banner() {
                println!("✓ {}", banner.text);
            }
            println!("  block {} tx {}", receipt.block_number, receipt.tx_hash);
        }
        ActionOutcome::Rejected(reason) => println!("✗ Rejected: {reason}"),
        ActionOutcome::Failed(reason) => println!("✗ Failed: {reason}"),
        ActionOutcome::Busy => println!("✗ Another action is in progress"),
    }
}

fn print_status(client: &DappClient) {
    let session = client.session();
    println!("  State:   {:?}", session.state);
    if let Some(address) = session.address {
        println!("  Account: {address}");
    }
    match session.chain_id {
        Some(chain_id) => println!("  Chain:   {chain_id}"),
        None => println!("  Chain:   unknown"),
    }
    let roles: Vec<_> = session.capabilities.roles().map(|role| role.to_string()).collect();
    println!("  Roles:   {}", if roles.is_empty() { "none".to_string() } else { roles.join(", ") });
    if let Some(warning) = client.network_banner().warning() {
        println!("  ! {warning}");
    }

    let gate = client.control_gate();
    let pause = client.pause_toggle(&gate);
    println!(
        "  Controls: amount inputs {} | {} button {}",
        enabled(!client.mint_control("", &gate).input_disabled()),
        pause.label(),
        enabled(!pause.is_disabled()),
    );
    if let Some(capacity) = client.capacity() {
        println!("  Usage:   {}", progress_bar(capacity.usage_percent()));
    }
    if let Some(action) = client.pending_action() {
        println!("  Action:  {} {:?}", action.kind, action.status);
    }
    if let Some(banner) = client.banner() {
        println!("  Message: [{:?}] {}", banner.kind, banner.text);
    }
}

fn enabled(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

fn progress_bar(percent: f64) -> String {
    const WIDTH: usize = 30;
    let filled = ((percent / 100.0) * WIDTH as f64).round() as usize;
    let filled = filled.min(WIDTH);
    format!("[{}{}] {percent:.2}%", "#".repeat(filled), "-".repeat(WIDTH - filled))
}
