use std::{
    path::PathBuf,
    time::Duration,
};

use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use tokio::{
    io::{
        AsyncBufReadExt,
        BufReader,
    },
    sync::mpsc,
};
use tracing_subscriber::EnvFilter;
use wordpot_client::{
    HttpScoringClient,
    KeystoreWallet,
    RpcContractClient,
    Session,
    SessionConfig,
    SledLogStorage,
    SubmissionError,
    SyncCommand,
    SyncEvent,
    SyncEventKind,
    WalletConnector,
    model::DEFAULT_STAKE,
    poller::{
        DEFAULT_POLL_INTERVAL,
        sane_poll_interval,
        sync_worker,
    },
    wallet,
};

const DEFAULT_RPC_URL: &str = "http://localhost:8545/";
const DEFAULT_BACKEND_URL: &str = "http://localhost:3001/";

#[derive(Clone, Debug)]
struct AppConfig {
    rpc_url: String,
    backend_url: String,
    contract_address: String,
    wallet_name: String,
    wallet_dir: Option<String>,
    data_dir: Option<String>,
    poll_interval: Duration,
    stake: u64,
}

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: wordpot-client --contract <address> --wallet <name>\n\
         [--rpc-url <url>] [--backend-url <url>]\n\
         [--wallet-dir <path>] [--data-dir <path>]\n\
         [--poll-secs <n>] [--stake <smallest-units>]\n\
         \n\
         Flags:\n\
           --contract <address>  Word-guessing contract address (or WORDPOT_CONTRACT)\n\
           --wallet <name>       Keystore wallet to play with\n\
           --rpc-url <url>       Contract gateway RPC (default {DEFAULT_RPC_URL}, or WORDPOT_RPC_URL)\n\
           --backend-url <url>   Scoring backend base URL (default {DEFAULT_BACKEND_URL}, or WORDPOT_BACKEND_URL)\n\
           --wallet-dir <path>   Override wallet directory (defaults to ~/.wordpot/wallets)\n\
           --data-dir <path>     Where session logs are persisted (defaults to ~/.wordpot/data)\n\
           --poll-secs <n>       Game state poll interval in seconds (default 5, minimum 1)\n\
           --stake <n>           Wager per guess in smallest units (default {DEFAULT_STAKE})"
    );
    std::process::exit(0);
}

fn parse_cli_args() -> Result<AppConfig> {
    let mut args = std::env::args().skip(1);
    let mut rpc_url: Option<String> = None;
    let mut backend_url: Option<String> = None;
    let mut contract_address: Option<String> = None;
    let mut wallet_name: Option<String> = None;
    let mut wallet_dir: Option<String> = None;
    let mut data_dir: Option<String> = None;
    let mut poll_secs: Option<u64> = None;
    let mut stake: Option<u64> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--rpc-url" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--rpc-url requires a URL argument"))?;
                if rpc_url.is_some() {
                    return Err(eyre!("--rpc-url may only be specified once"));
                }
                rpc_url = Some(url);
            }
            "--backend-url" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--backend-url requires a URL argument"))?;
                if backend_url.is_some() {
                    return Err(eyre!("--backend-url may only be specified once"));
                }
                backend_url = Some(url);
            }
            "--contract" => {
                let address = args
                    .next()
                    .ok_or_else(|| eyre!("--contract requires an address argument"))?;
                if contract_address.is_some() {
                    return Err(eyre!("--contract may only be specified once"));
                }
                contract_address = Some(address);
            }
            "--wallet" => {
                let name = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet requires a wallet name"))?;
                if wallet_name.is_some() {
                    return Err(eyre!("--wallet may only be specified once"));
                }
                wallet_name = Some(name);
            }
            "--wallet-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet-dir requires a path argument"))?;
                if wallet_dir.is_some() {
                    return Err(eyre!("--wallet-dir may only be specified once"));
                }
                wallet_dir = Some(dir);
            }
            "--data-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--data-dir requires a path argument"))?;
                if data_dir.is_some() {
                    return Err(eyre!("--data-dir may only be specified once"));
                }
                data_dir = Some(dir);
            }
            "--poll-secs" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--poll-secs requires a number"))?;
                poll_secs = Some(
                    raw.parse()
                        .wrap_err("--poll-secs must be a whole number of seconds")?,
                );
            }
            "--stake" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--stake requires a number"))?;
                stake = Some(raw.parse().wrap_err("--stake must be a whole number")?);
            }
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let rpc_url = rpc_url
        .or_else(|| std::env::var("WORDPOT_RPC_URL").ok())
        .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
    let backend_url = backend_url
        .or_else(|| std::env::var("WORDPOT_BACKEND_URL").ok())
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
    let contract_address = contract_address
        .or_else(|| std::env::var("WORDPOT_CONTRACT").ok())
        .ok_or_else(|| {
            eyre!("Specify --contract <address> (or set WORDPOT_CONTRACT)")
        })?;
    let wallet_name = wallet_name
        .ok_or_else(|| eyre!("Specify --wallet <name> to select a keystore wallet"))?;
    let poll_interval = sane_poll_interval(
        poll_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL),
    );

    Ok(AppConfig {
        rpc_url,
        backend_url,
        contract_address,
        wallet_name,
        wallet_dir,
        data_dir,
        poll_interval,
        stake: stake.unwrap_or(DEFAULT_STAKE),
    })
}

fn default_data_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").wrap_err("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".wordpot").join("data"))
}

fn init_tracing(data_dir: &PathBuf) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender =
        tracing_appender::rolling::daily(data_dir.join("logs"), "wordpot-client.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    guard
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let config = parse_cli_args()?;
    let data_dir = match &config.data_dir {
        Some(raw) => PathBuf::from(shellexpand::tilde(raw).into_owned()),
        None => default_data_dir()?,
    };
    let _log_guard = init_tracing(&data_dir);
    tracing::info!(?config, "starting wordpot client");
    run_app(config, data_dir).await
}

async fn run_app(config: AppConfig, data_dir: PathBuf) -> Result<()> {
    let contract =
        RpcContractClient::new(config.rpc_url.clone(), config.contract_address.clone())?;
    let backend = HttpScoringClient::new(config.backend_url.clone())?;
    let storage = SledLogStorage::open(data_dir.join("session-logs"))?;

    let session_config = SessionConfig {
        stake: config.stake,
        ..SessionConfig::default()
    };
    let mut session =
        Session::new(contract.clone(), backend.clone(), storage, session_config)?;

    let wallet_dir = wallet::resolve_wallet_dir(config.wallet_dir.as_deref())?;
    let keystore = KeystoreWallet::new(wallet_dir);
    let address = keystore.connect(&config.wallet_name)?;
    let mut account_rx = keystore.subscribe();
    session.connect(address);
    println!("{}", session.status());

    session.refresh_owner().await;
    session.refresh_game_state().await;
    if let Err(err) = session.refresh_game_logs().await {
        tracing::warn!(error = %format!("{err:#}"), "initial log fetch failed");
    }
    print_game_state(&session);

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<SyncEvent>();
    let worker = tokio::spawn(sync_worker(
        config.poll_interval,
        session.sequence(),
        contract,
        backend,
        cmd_rx,
        event_tx,
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Type a word to guess it, :state, :logs, or :quit.");

    loop {
        tokio::select! {
            maybe_event = event_rx.recv() => {
                let Some(event) = maybe_event else {
                    tracing::warn!("sync worker channel closed");
                    break;
                };
                apply_sync_event(&mut session, event);
            }
            changed = account_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let account = account_rx.borrow_and_update().clone();
                session.handle_account_change(account);
                println!("{}", session.status());
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = cmd_tx.send(SyncCommand::Shutdown);
                break;
            }
            maybe_line = lines.next_line() => {
                let Some(line) = maybe_line.wrap_err("reading stdin failed")? else {
                    let _ = cmd_tx.send(SyncCommand::Shutdown);
                    break;
                };
                match line.trim() {
                    ":quit" | ":q" => {
                        let _ = cmd_tx.send(SyncCommand::Shutdown);
                        break;
                    }
                    ":state" => print_game_state(&session),
                    ":logs" => print_logs(&session),
                    word => {
                        submit_and_report(&mut session, word).await;
                        let _ = cmd_tx.send(SyncCommand::FetchNow);
                    }
                }
            }
        }
    }

    let _ = worker.await;
    Ok(())
}

fn apply_sync_event<C, B, S>(session: &mut Session<C, B, S>, event: SyncEvent)
where
    C: wordpot_client::ContractClient,
    B: wordpot_client::ScoringBackend,
    S: wordpot_client::LogStorage,
{
    match event.kind {
        SyncEventKind::GameState(state) => {
            if session.ingest_game_state(event.seq, state) && state.ended {
                println!("The game has ended. Prize pool: {}", state.display_prize_pool());
            }
        }
        SyncEventKind::Logs(entries) => {
            session.ingest_log_snapshot(event.seq, entries);
        }
    }
}

async fn submit_and_report<C, B, S>(session: &mut Session<C, B, S>, word: &str)
where
    C: wordpot_client::ContractClient,
    B: wordpot_client::ScoringBackend,
    S: wordpot_client::LogStorage,
{
    match session.submit_guess(word).await {
        Ok(entry) => {
            println!(
                "Your guess \"{}\" has been submitted. Similarity: {:.2} | Proximity: {}",
                entry.guess, entry.similarity, entry.proximity
            );
        }
        Err(err @ SubmissionError::BackendSubmissionFailed { .. }) => {
            // Post-wager failure: money was spent, scoring is pending.
            println!("{err}");
            println!("Your wager was accepted on-chain; retry scoring or contact support.");
        }
        Err(err) => {
            println!("Failed to submit your guess: {err}");
        }
    }
}

fn print_game_state<C, B, S>(session: &Session<C, B, S>)
where
    C: wordpot_client::ContractClient,
    B: wordpot_client::ScoringBackend,
    S: wordpot_client::LogStorage,
{
    let state = session.game_state();
    let suffix = if state.ended { " (ended)" } else { "" };
    let owner = if session.is_owner() { " [owner]" } else { "" };
    println!("Prize pool: {}{suffix}{owner}", state.display_prize_pool());
}

fn print_logs<C, B, S>(session: &Session<C, B, S>)
where
    C: wordpot_client::ContractClient,
    B: wordpot_client::ScoringBackend,
    S: wordpot_client::LogStorage,
{
    if session.logs().is_empty() {
        println!("No guesses yet.");
        return;
    }
    for entry in session.logs() {
        println!(
            "Player: {} | Guess: {} | Similarity: {:.2} | Proximity: {}",
            entry.player, entry.guess, entry.similarity, entry.proximity
        );
    }
}
