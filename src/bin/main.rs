//! Beeconnect CLI - inspect and exercise connection sessions
//!
//! The persisted record is plain JSON:
//!   beeconnect keys              → ["MetaMask"]
//!   beeconnect forget <key>      → {"forgotten": "MetaMask", "keys": []}
//!   beeconnect clear             → {"cleared": true}
//!
//! A simulated session against an in-memory MetaMask-style provider:
//!   beeconnect demo --accounts 0xabc,0xdef --chain 0x1
//!
//! Configuration:
//!   --app <name> --root <dir> --record <name>   (env: BEECONNECT_APP, BEECONNECT_ROOT)
//!
//! Output format:
//!   --json     Output raw JSON (default for non-tty)
//!   --pretty   Pretty-print JSON (default for tty)

use anyhow::{anyhow, bail, Context};
use beeconnect::core::paths::{eip1193, DEFAULT_PROVIDER_KEY};
use beeconnect::testing::MockProvider;
use beeconnect::{init_logging, Connectors, KeyStore, ProviderKey, Session, SessionConfig};
use serde_json::{json, Value};
use std::env;
use std::io::IsTerminal;
use std::sync::Arc;
use tracing::{debug, info};

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("beeconnect {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = match opts.command.as_deref() {
        Some("keys") | Some("ls") => cmd_keys(&opts),
        Some("forget") => cmd_forget(&opts),
        Some("clear") => cmd_clear(&opts),
        Some("demo") => cmd_demo(&opts),
        Some(cmd) => Err(anyhow!("Unknown command: {}", cmd)),
        None => {
            print_usage();
            return;
        }
    };

    let pretty = !opts.json && (opts.pretty || std::io::stdout().is_terminal());
    match result {
        Ok(output) => println!("{}", render(&output, pretty)),
        Err(e) => {
            eprintln!("{}", render(&json!({"error": format!("{:#}", e)}), pretty));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, pretty: bool) -> String {
    let rendered = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
    rendered.unwrap_or_else(|_| value.to_string())
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    key: Option<String>,
    // Store options
    app: Option<String>,
    root: Option<String>,
    record: Option<String>,
    // Demo options
    accounts: Vec<String>,
    chain: Option<String>,
    // Output options
    json: bool,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            let value = args.get(i + 1).cloned();
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--json" => opts.json = true,
                "--pretty" => opts.pretty = true,
                "--app" | "-a" if value.is_some() => {
                    opts.app = value;
                    i += 1;
                }
                "--root" | "-r" if value.is_some() => {
                    opts.root = value;
                    i += 1;
                }
                "--record" if value.is_some() => {
                    opts.record = value;
                    i += 1;
                }
                "--accounts" if value.is_some() => {
                    opts.accounts = split_list(value.as_deref().unwrap_or_default());
                    i += 1;
                }
                "--chain" | "-c" if value.is_some() => {
                    opts.chain = value;
                    i += 1;
                }
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }

        // First positional is command, second the provider key
        let mut positional = positional.into_iter();
        opts.command = positional.next();
        opts.key = positional.next();

        // Environment is lower priority than CLI args; the root falls back
        // to BEECONNECT_ROOT inside the store itself.
        if opts.app.is_none() {
            opts.app = env::var("BEECONNECT_APP").ok().filter(|s| !s.is_empty());
        }

        opts
    }

    fn config(&self) -> anyhow::Result<SessionConfig> {
        let mut config = SessionConfig::new(self.app.as_deref().unwrap_or("beeconnect"));
        if let Some(root) = &self.root {
            config = config.with_root(root);
        }
        if let Some(record) = &self.record {
            config = config.with_record(record.as_str());
        }
        config.validate()?;
        Ok(config)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

fn print_usage() {
    println!(
        r#"beeconnect - wallet connection sessions

USAGE:
    beeconnect <command> [key] [options]

COMMANDS:
    keys                    List provider keys persisted from the last session
    forget <key>            Remove one key from the persisted record
    clear                   Drop the persisted record
    demo                    Run a simulated MetaMask session, print each transition

STORE OPTIONS:
    --app, -a <name>        Application name (default: beeconnect, env: BEECONNECT_APP)
    --root, -r <dir>        Storage root (env: BEECONNECT_ROOT)
    --record <name>         Record name (default: beeconnect_keys)

DEMO OPTIONS:
    --accounts <a,b>        Accounts the simulated wallet hands out (default: 0x1)
    --chain, -c <id>        Chain id the simulated wallet reports (default: 0x1)

OUTPUT OPTIONS:
    --json                  Raw JSON output
    --pretty                Pretty-print JSON
    --version, -V           Print version

LOGGING:
    RUST_LOG=debug          Log filter (default: info)
    BEECONNECT_LOG_JSON=1   JSON log lines on stderr

EXAMPLES:
    beeconnect demo --accounts 0xabc,0xdef --chain 0x89
    beeconnect keys --app mydapp
    beeconnect forget MetaMask --app mydapp"#
    );
}

fn cmd_keys(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let store = opts.config()?.open_store();
    Ok(json!(store.keys()))
}

fn cmd_forget(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let key = opts.key.as_deref().context("Usage: beeconnect forget <key>")?;
    let store = opts.config()?.open_store();
    let key = ProviderKey::from(key);
    if !store.keys().contains(&key) {
        bail!("Key not persisted: {}", key);
    }
    store.remove_key(&key);
    info!(%key, "forgot provider key");
    Ok(json!({"forgotten": key, "keys": store.keys()}))
}

fn cmd_clear(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let store = opts.config()?.open_store();
    store.clear();
    info!(record = store.record(), "cleared key record");
    Ok(json!({"cleared": true}))
}

fn cmd_demo(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let config = opts.config()?;
    let accounts = if opts.accounts.is_empty() { vec!["0x1".to_string()] } else { opts.accounts.clone() };
    let chain = opts.chain.clone().unwrap_or_else(|| "0x1".into());

    let provider = Arc::new(MockProvider::metamask());
    provider.mock_chain_id(&chain);
    provider.mock_accounts(&accounts.iter().map(String::as_str).collect::<Vec<_>>());
    if config.open_store().keys().iter().any(|k| k == DEFAULT_PROVIDER_KEY) {
        debug!("key persisted from an earlier run, wallet pre-authorized");
        provider.authorize();
    }

    let session = Session::from_config(&config, Connectors::injected_default(Some(provider.clone())))?;

    let rt = tokio::runtime::Runtime::new().context("Failed to create runtime")?;
    let (steps, observed) = rt.block_on(async {
        let watcher = watch_transitions(&session);
        let mut steps = vec![step(&session, "created")];

        session.synchronize().await;
        steps.push(step(&session, "synchronized"));

        if !session.state().is_connected(DEFAULT_PROVIDER_KEY) {
            session.connect(DEFAULT_PROVIDER_KEY).await?;
            steps.push(step(&session, "connected"));
        }

        let mut rotated = accounts.clone();
        rotated.rotate_left(1);
        provider.emit(eip1193::ACCOUNTS_CHANGED, json!(rotated));
        steps.push(step(&session, "accountsChanged"));

        provider.emit(eip1193::CHAIN_CHANGED, json!(137));
        steps.push(step(&session, "chainChanged"));

        session.close();
        let observed = watcher.await.context("Transition watcher failed")?;
        Ok::<_, anyhow::Error>((steps, observed))
    })?;

    Ok(json!({"steps": steps, "observedTransitions": observed, "persisted": config.open_store().keys()}))
}

/// Logs published snapshots until the session shuts down. Bursts of
/// synchronous transitions coalesce, so the count is a lower bound.
fn watch_transitions(session: &Session) -> tokio::task::JoinHandle<usize> {
    let mut rx = session.watch();
    let shutdown = session.shutdown().clone();
    tokio::spawn(async move {
        let mut observed = 0;
        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    observed += 1;
                    let status = rx.borrow_and_update().status();
                    debug!(?status, "session transition");
                }
                _ = shutdown.wait() => break,
            }
        }
        observed
    })
}

fn step(session: &Session, name: &str) -> Value {
    json!({
        "step": name,
        "status": session.global_status(),
        "state": session.snapshot(),
        "providers": session.providers(),
    })
}
