//! gc-cli: command-line client for the GovChain document registry.
//!
//! Talks to the chain through a JSON-RPC endpoint that holds the account
//! (a wallet bridge or a node with unlocked accounts). Contract events arrive
//! over an optional WebSocket endpoint.
//!
//! ## Usage
//!
//! ```bash
//! # Follow the document list
//! gc-cli --rpc-url http://127.0.0.1:8545 --ws-url ws://127.0.0.1:8546 watch
//!
//! # Also print completion events for documents 1 and 4
//! gc-cli watch --events --topic completion --token 1 --token 4
//!
//! # Start a transfer and approve it as owner
//! gc-cli request-transfer 1 0x1111111111111111111111111111111111111111
//! gc-cli approve-owner 1
//! ```

mod render;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gc_document_sync::{
    ContentStore, DocumentRegistryApi, DocumentSnapshot, FileSessionStore, JsonRpcClient,
    LogSubscriber, PinataStore, PropertyDetails, RegistryClient, RegistryConfig, RegistryError,
    RegistryPorts, SyncConfig,
};
use gc_telemetry::{encode_metrics, init_telemetry, TelemetryConfig};
use primitive_types::U256;
use shared_bus::{EventFilter, EventStream, EventTopic, InMemoryEventBus, RegistryEvent};
use shared_types::{Address, TokenId};
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::StreamExt;
use tracing::warn;

/// GovChain document registry client
#[derive(Parser, Debug)]
#[command(name = "gc-cli")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON-RPC endpoint URL (overrides GOVCHAIN_RPC_URL)
    #[arg(long)]
    rpc_url: Option<String>,

    /// WebSocket endpoint URL (overrides GOVCHAIN_WS_URL)
    #[arg(long)]
    ws_url: Option<String>,

    /// Registry contract address (overrides GOVCHAIN_CONTRACT_ADDRESS)
    #[arg(long)]
    contract: Option<String>,

    /// Government approver address (overrides GOVCHAIN_GOVT_ADDRESS)
    #[arg(long)]
    government: Option<String>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print Prometheus metrics to stderr when the command finishes
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the document list and notices until interrupted
    Watch {
        /// Rescan every N seconds even without events (0 disables)
        #[arg(long, default_value = "30")]
        refresh_secs: u64,
        /// Print contract events as they arrive
        #[arg(long)]
        events: bool,
        /// Only print events of this kind (repeatable)
        #[arg(long = "topic", value_enum, requires = "events")]
        topics: Vec<TopicArg>,
        /// Only print events about this document (repeatable)
        #[arg(long = "token", requires = "events")]
        tokens: Vec<u64>,
    },
    /// Print the documents visible to the connected account
    List {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print transfers addressed to the connected account
    Incoming,
    /// Print completed transfers involving the connected account
    History,
    /// Pin a file and register it as a new document
    Upload {
        /// File to upload
        file: PathBuf,
    },
    /// Propose transferring a document
    RequestTransfer {
        /// Document id
        token_id: u64,
        /// Recipient address
        recipient: String,
    },
    /// Approve a pending transfer as the owner
    ApproveOwner {
        /// Document id
        token_id: u64,
    },
    /// Approve a pending transfer as the government
    ApproveGovt {
        /// Document id
        token_id: u64,
    },
    /// Register a property
    RegisterProperty {
        /// Property type, e.g. residential
        #[arg(long = "type")]
        property_type: String,
        /// Location
        #[arg(long)]
        location: String,
        /// Area in square feet
        #[arg(long)]
        area: String,
        /// Declared value
        #[arg(long)]
        value: String,
        /// Description
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Forget the saved account
    Disconnect,
}

/// Contract event kinds selectable with `--topic`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TopicArg {
    Creation,
    Request,
    Approval,
    Completion,
}

impl From<TopicArg> for EventTopic {
    fn from(topic: TopicArg) -> Self {
        match topic {
            TopicArg::Creation => EventTopic::Creation,
            TopicArg::Request => EventTopic::Request,
            TopicArg::Approval => EventTopic::Approval,
            TopicArg::Completion => EventTopic::Completion,
        }
    }
}

fn event_filter(topics: &[TopicArg], tokens: &[u64]) -> EventFilter {
    EventFilter::topics(topics.iter().copied().map(EventTopic::from).collect())
        .with_tokens(tokens.iter().copied().map(TokenId).collect())
}

impl Args {
    fn apply(&self, mut config: RegistryConfig) -> Result<RegistryConfig> {
        if let Some(url) = &self.rpc_url {
            config.rpc_url = url.clone();
        }
        if let Some(url) = &self.ws_url {
            config.ws_url = Some(url.clone());
        }
        if let Some(contract) = &self.contract {
            config.contract_address = parse_address(contract, "--contract")?;
        }
        if let Some(government) = &self.government {
            config.government_address = Some(parse_address(government, "--government")?);
        }
        Ok(config)
    }
}

fn parse_address(value: &str, flag: &str) -> Result<Address> {
    value
        .parse()
        .with_context(|| format!("{flag}: '{value}' is not an address"))
}

fn parse_amount(value: &str, flag: &str) -> Result<U256> {
    U256::from_dec_str(value.trim()).map_err(|err| anyhow!("{flag}: '{value}' is not a number: {err:?}"))
}

fn user_error(err: RegistryError) -> anyhow::Error {
    anyhow!("{} ({err})", err.user_message())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut telemetry = TelemetryConfig::from_env();
    match args.verbose {
        0 => {}
        1 => telemetry = telemetry.with_log_level("debug"),
        _ => telemetry = telemetry.with_log_level("trace"),
    }
    let _telemetry = init_telemetry(telemetry).context("Failed to initialize logging")?;

    let config = args.apply(RegistryConfig::from_env()?)?;
    let sync_config = SyncConfig::default();

    let rpc = Arc::new(JsonRpcClient::from_config(&config, &sync_config));
    let content_store = PinataStore::from_config(&config)
        .map(|store| Arc::new(store) as Arc<dyn ContentStore>);
    let ports = RegistryPorts {
        reader: rpc.clone(),
        writer: rpc.clone(),
        wallet: rpc,
        session_store: Arc::new(FileSessionStore::new(config.session_file.clone())),
        content_store,
    };
    let client = RegistryClient::new(config, sync_config, ports, Arc::new(InMemoryEventBus::new()));

    let result = run(&client, args.command).await;
    client.shutdown().await;
    if args.metrics {
        eprint!("{}", encode_metrics().context("Failed to encode metrics")?);
    }
    result
}

async fn run(client: &RegistryClient, command: Command) -> Result<()> {
    let config = client.config();

    if !matches!(command, Command::Disconnect) {
        let account = ensure_connected(client).await?;
        println!("Connected as {account}");
    }

    match command {
        Command::Disconnect => {
            client.disconnect().map_err(user_error)?;
            println!("Disconnected.");
        }
        Command::Watch {
            refresh_secs,
            events,
            topics,
            tokens,
        } => {
            let filter = events.then(|| event_filter(&topics, &tokens));
            watch(client, refresh_secs, filter).await?
        }
        Command::List { json } => {
            let snapshot = settled_snapshot(client).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print!("{}", render::documents(&snapshot, config));
            }
        }
        Command::Incoming => {
            let entries = client.incoming_transfers().await.map_err(user_error)?;
            print!("{}", render::incoming(&entries));
        }
        Command::History => {
            let entries = client.transfer_history().await.map_err(user_error)?;
            print!("{}", render::history(&entries, config));
        }
        Command::Upload { file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document".to_string());
            let token_id = client.upload_file(&file_name, bytes).await.map_err(user_error)?;
            println!("Registered as document {token_id}");
        }
        Command::RequestTransfer {
            token_id,
            recipient,
        } => {
            let receipt = client
                .request_transfer(TokenId(token_id), &recipient)
                .await
                .map_err(user_error)?;
            println!("{}", render::receipt(&receipt, config));
        }
        Command::ApproveOwner { token_id } => {
            let receipt = client
                .approve_as_owner(TokenId(token_id))
                .await
                .map_err(user_error)?;
            println!("{}", render::receipt(&receipt, config));
        }
        Command::ApproveGovt { token_id } => {
            let receipt = client
                .approve_as_government(TokenId(token_id))
                .await
                .map_err(user_error)?;
            println!("{}", render::receipt(&receipt, config));
        }
        Command::RegisterProperty {
            property_type,
            location,
            area,
            value,
            description,
        } => {
            let details = PropertyDetails {
                property_type,
                location,
                area: parse_amount(&area, "--area")?,
                value: parse_amount(&value, "--value")?,
                description,
            };
            let receipt = client.register_property(details).await.map_err(user_error)?;
            println!("{}", render::receipt(&receipt, config));
        }
    }
    Ok(())
}

/// Resume the saved session, or ask the wallet for an account.
async fn ensure_connected(client: &RegistryClient) -> Result<Address> {
    if let Some(account) = client.restore().await.map_err(user_error)? {
        return Ok(account);
    }
    client.connect().await.map_err(user_error)
}

/// The first completed scan for the connected account.
async fn settled_snapshot(client: &RegistryClient) -> Result<DocumentSnapshot> {
    let mut snapshots = client.sync().subscribe_snapshots();
    let snapshot = snapshots
        .wait_for(|s| s.viewer.is_some() && s.scanned_at.is_some() && !s.refreshing)
        .await
        .map_err(|_| anyhow!("sync loop stopped"))?;
    Ok(snapshot.clone())
}

async fn next_event(events: &mut Option<EventStream>) -> Option<RegistryEvent> {
    match events {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn watch(client: &RegistryClient, refresh_secs: u64, filter: Option<EventFilter>) -> Result<()> {
    let config = client.config();
    let mut subscriber = config
        .ws_url
        .as_ref()
        .map(|url| LogSubscriber::new(url.clone(), config.contract_address, client.bus().clone()));
    match subscriber.as_mut() {
        Some(subscriber) => subscriber.start(),
        None => warn!("No WebSocket endpoint configured, contract events will not be received"),
    }
    if refresh_secs == 0 && subscriber.is_none() {
        bail!("nothing would trigger a rescan: set --ws-url or a non-zero --refresh-secs");
    }
    let mut events = filter.map(|filter| client.bus().event_stream(filter));

    let mut snapshots = client.sync().subscribe_snapshots();
    let mut notices = client.sync().subscribe_notices();
    let mut ticker = tokio::time::interval(Duration::from_secs(refresh_secs.max(1)));
    ticker.tick().await;
    let mut last_generation = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if !snapshot.refreshing && last_generation != Some(snapshot.generation) {
                    last_generation = Some(snapshot.generation);
                    print!("{}", render::documents(&snapshot, config));
                }
            }
            notice = notices.recv() => match notice {
                Ok(notice) => println!("{}", render::notice(&notice)),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Notices dropped"),
                Err(RecvError::Closed) => break,
            },
            Some(event) = next_event(&mut events) => println!("{}", render::event(&event)),
            _ = ticker.tick(), if refresh_secs > 0 => client.refresh(),
        }
    }

    if let Some(mut subscriber) = subscriber {
        subscriber.stop().await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "gc-cli",
            "--rpc-url",
            "http://node:8545",
            "--government",
            "0x9999999999999999999999999999999999999999",
            "list",
        ]);
        let config = args.apply(RegistryConfig::default()).unwrap();
        assert_eq!(config.rpc_url, "http://node:8545");
        assert_eq!(config.government_address, Some(Address([0x99; 20])));
        assert!(matches!(args.command, Command::List { json: false }));
        assert!(!args.metrics);
    }

    #[test]
    fn test_watch_event_filter_args() {
        let args = Args::parse_from([
            "gc-cli", "watch", "--events", "--topic", "completion", "--token", "1", "--token", "4",
        ]);
        let Command::Watch {
            events,
            topics,
            tokens,
            ..
        } = args.command
        else {
            panic!("expected watch");
        };
        assert!(events);
        let filter = event_filter(&topics, &tokens);
        assert_eq!(filter.topics, vec![EventTopic::Completion]);
        assert_eq!(filter.token_ids, vec![TokenId(1), TokenId(4)]);

        // Topic and token filters only make sense with --events.
        assert!(Args::try_parse_from(["gc-cli", "watch", "--token", "1"]).is_err());
    }

    #[test]
    fn test_bad_contract_flag() {
        let args = Args::parse_from(["gc-cli", "--contract", "0x12", "history"]);
        assert!(args.apply(RegistryConfig::default()).is_err());
    }

    #[test]
    fn test_register_property_args() {
        let args = Args::parse_from([
            "gc-cli",
            "register-property",
            "--type",
            "residential",
            "--location",
            "Plot 7",
            "--area",
            "1200",
            "--value",
            "50000",
        ]);
        match args.command {
            Command::RegisterProperty { area, description, .. } => {
                assert_eq!(parse_amount(&area, "--area").unwrap(), U256::from(1200));
                assert!(description.is_empty());
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(parse_amount("12a", "--area").is_err());
    }
}
