//! # Vitrine Admin
//!
//! A command-line walkthrough of the Vitrine content store against an
//! in-memory remote. Each subcommand plays one scenario an admin site runs
//! into: plain saves, two admins editing the same collection, disjoint
//! edits merged under whole-document writes, and a flaky remote.
//!
//! ```text
//! vitrine-admin demo
//! vitrine-admin --seed site.json --config store.json conflict
//! RUST_LOG=vitrine_sdk=debug vitrine-admin outage
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::*;
use serde_json::{json, Value};
use vitrine_sdk::{
    AppData, AppStore, ConflictPolicy, HydrationState, MemoryRemote, RemoteError,
    Revision, SaveReceipt, Snapshot, StoreConfig, StoreError, StoreEvent, WriteStrategy,
};

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

const READY: Duration = Duration::from_secs(5);

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "vitrine-admin")]
#[command(about = "Site content store walkthrough (Vitrine SDK)")]
#[command(version)]
struct Cli {
    /// JSON file holding the initial site document
    #[arg(long, global = true)]
    seed: Option<PathBuf>,

    /// JSON file holding the store configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Basic demo: hydrate, save one collection, skip a no-op save
    Demo,
    /// Two admins edit the same collection; the stale save is refused
    Conflict,
    /// Whole-document writes: disjoint edits are rebased, strict policy refuses
    Merge,
    /// Remote outage: hydration retries, failed writes leave the snapshot intact
    Outage,
    /// Print the seed document and the effective configuration
    Show,
}

/// Seed document and configuration shared by every admin in a scenario.
struct Setup {
    seed: AppData,
    config: StoreConfig,
}

impl Setup {
    fn load(cli: &Cli) -> CliResult<Self> {
        let seed = match &cli.seed {
            Some(path) => AppData::from_json_str(&std::fs::read_to_string(path)?)?,
            None => default_site()?,
        };
        let config = match &cli.config {
            Some(path) => StoreConfig::from_file(path)?,
            None => StoreConfig::default(),
        };
        Ok(Self { seed, config })
    }

    fn remote(&self) -> Arc<MemoryRemote> {
        Arc::new(MemoryRemote::seeded(&self.config.path, self.seed.clone()))
    }

    /// Configuration for one admin session.
    fn admin(&self, name: &str) -> StoreConfig {
        StoreConfig {
            client_id: name.to_string(),
            ..self.config.clone()
        }
    }
}

fn default_site() -> CliResult<AppData> {
    Ok(AppData::from_value(json!({
        "models": [
            {"id": "m1", "name": "Ana", "city": "Lisbon"},
            {"id": "m2", "name": "Noor", "city": "Milan"}
        ],
        "articles": [
            {"slug": "spring-campaign", "title": "Spring campaign"}
        ],
        "news": [],
        "books": []
    }))?)
}

async fn open(remote: &Arc<MemoryRemote>, config: StoreConfig) -> CliResult<AppStore<MemoryRemote>> {
    let store = AppStore::new(remote.clone(), config);
    store.start()?;
    store.wait_ready(READY).await?;
    Ok(store)
}

/// Wait until `store` has seen at least `revision`.
async fn reload(store: &AppStore<MemoryRemote>, revision: Revision) -> CliResult<Snapshot> {
    Ok(store.wait_for_revision(revision, READY).await?)
}

fn with_record(snapshot: &Snapshot, collection: &str, record: Value) -> AppData {
    let mut records = snapshot
        .document()
        .collection(collection)
        .map(|records| records.to_vec())
        .unwrap_or_default();
    records.push(record);
    snapshot.document().with(collection, Value::Array(records))
}

// ─── Pretty printing ──────────────────────────────────────────────────────

fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("\n{}", bar.bright_cyan());
    println!("  {}", text.bold().bright_white());
    println!("{}", bar.bright_cyan());
}

fn section(text: &str) {
    println!("\n{} {}", "▸".bright_yellow(), text.bold());
}

fn step(text: &str) {
    println!("  {} {}", "•".bright_green(), text);
}

fn show_snapshot(label: &str, snapshot: &Snapshot) {
    let border = "─".repeat(44);
    println!("  ┌{}┐", border);
    println!(
        "  │ {:^42} │",
        format!("{} @ {}", label, snapshot.revision()).bright_yellow().to_string()
    );
    println!("  ├{}┤", border);

    if snapshot.document().is_empty() {
        println!("  │ {:^42} │", "(empty document)".dimmed().to_string());
    }
    for (key, value) in snapshot.document().iter() {
        let size = match value {
            Value::Array(records) => format!("{} records", records.len()),
            other => other.to_string(),
        };
        let line = format!("{:<12} {:<18} {}", key, size, snapshot.key_revision(key));
        println!("  │ {:<42} │", line);
    }
    println!("  └{}┘", border);
}

fn show_receipt(who: &str, receipt: &SaveReceipt) {
    if receipt.is_noop() {
        step(&format!("{}: nothing changed, no write sent", who.bright_magenta()));
        return;
    }
    let merged = if receipt.merged {
        " (rebased)".bright_cyan().to_string()
    } else {
        String::new()
    };
    println!(
        "  {} {} saved {:?} at {}{}",
        "✓".bright_green(),
        who.bright_magenta(),
        receipt.written_keys,
        receipt.revision,
        merged
    );
}

fn show_error(who: &str, err: &StoreError) {
    println!("  {} {}: {}", "✗".bright_red().bold(), who.bright_magenta(), err.to_string().bright_red());
    if err.needs_reload() {
        println!("    {}", "reload the snapshot and apply the edit again".dimmed());
    }
}

fn show_state(store: &AppStore<MemoryRemote>) {
    let state = match store.hydration_state() {
        HydrationState::Ready => "ready".bright_green(),
        HydrationState::Retrying { attempt, .. } => format!("retrying (attempt {})", attempt).bright_yellow(),
        HydrationState::Unavailable { attempts, .. } => {
            format!("unavailable after {} attempts", attempts).bright_red()
        }
        HydrationState::Stopped => "stopped".dimmed(),
        HydrationState::Uninitialized => "waiting for first delivery".dimmed(),
    };
    step(&format!("{}: {}", store.client_id().bright_magenta(), state));
}

fn show_metrics(store: &AppStore<MemoryRemote>) -> CliResult {
    section(&format!("Metrics for {}", store.client_id()));
    println!("{}", serde_json::to_string_pretty(&store.metrics())?);
    Ok(())
}

// ─── Demo ──────────────────────────────────────────────────────────────────

async fn run_demo(setup: &Setup) -> CliResult {
    header("DEMO — Hydrate, Save One Collection, Skip No-op Saves");

    section("Phase 1: Hydrate from the remote");
    let remote = setup.remote();
    let admin = open(&remote, setup.admin("alice")).await?;
    let snapshot = admin.snapshot();
    show_snapshot("alice", &snapshot);

    section("Phase 2: Add a model and save the whole derived document");
    let next = with_record(&snapshot, "models", json!({"id": "m3", "name": "Iris", "city": "Paris"}));
    let receipt = admin.save_data(&snapshot, next).await?;
    show_receipt("alice", &receipt);
    step(&format!("remote writes so far: {}", remote.write_count()));
    show_snapshot("alice", &admin.snapshot());

    section("Phase 3: Save the same document again");
    let current = admin.snapshot();
    let receipt = admin.save_data(&current, current.document().clone()).await?;
    show_receipt("alice", &receipt);
    step(&format!("remote writes so far: {}", remote.write_count()));

    show_metrics(&admin)?;
    admin.stop();
    Ok(())
}

// ─── Conflict ──────────────────────────────────────────────────────────────

async fn run_conflict(setup: &Setup) -> CliResult {
    header("CONFLICT — Two Admins Edit the Same Collection");

    section("Phase 1: alice and bob open the models editor");
    let remote = setup.remote();
    let alice = open(&remote, setup.admin("alice")).await?;
    let bob = open(&remote, setup.admin("bob")).await?;
    let alice_base = alice.snapshot();
    let bob_base = bob.snapshot();
    step(&format!("both read {}", alice_base.revision()));

    section("Phase 2: alice saves first");
    let receipt = alice
        .save_data(&alice_base, with_record(&alice_base, "models", json!({"id": "m3", "name": "Iris"})))
        .await?;
    show_receipt("alice", &receipt);

    section("Phase 3: bob saves from his stale snapshot");
    let bob_edit = json!({"id": "m4", "name": "Zoe"});
    match bob.save_data(&bob_base, with_record(&bob_base, "models", bob_edit.clone())).await {
        Ok(receipt) => show_receipt("bob", &receipt),
        Err(err) => show_error("bob", &err),
    }

    section("Phase 4: bob reloads and retries");
    let fresh = reload(&bob, receipt.revision).await?;
    let receipt = bob.save_data(&fresh, with_record(&fresh, "models", bob_edit)).await?;
    show_receipt("bob", &receipt);

    let final_alice = reload(&alice, receipt.revision).await?;
    show_snapshot("alice", &final_alice);
    show_snapshot("bob", &bob.snapshot());

    let models = final_alice.document().collection("models").map_or(0, |m| m.len());
    println!(
        "\n  {} {}",
        "✓".bright_green().bold(),
        format!("no edit lost: {} models stored", models).bright_green().bold()
    );
    alice.stop();
    bob.stop();
    Ok(())
}

// ─── Merge ─────────────────────────────────────────────────────────────────

async fn run_merge(setup: &Setup) -> CliResult {
    header("MERGE — Whole-Document Writes From Stale Snapshots");

    for policy in [ConflictPolicy::MergeDisjoint, ConflictPolicy::Reject] {
        section(&format!("Policy {:?}", policy));
        let remote = setup.remote();
        let config = |name: &str| StoreConfig {
            write_strategy: WriteStrategy::WholeDocument,
            conflict_policy: policy,
            ..setup.admin(name)
        };
        let alice = open(&remote, config("alice")).await?;
        let bob = open(&remote, config("bob")).await?;
        let alice_base = alice.snapshot();
        let bob_base = bob.snapshot();

        let receipt = alice
            .save_data(&alice_base, with_record(&alice_base, "models", json!({"id": "m3"})))
            .await?;
        show_receipt("alice", &receipt);

        let bob_next = with_record(&bob_base, "articles", json!({"slug": "summer-lookbook"}));
        match bob.save_data(&bob_base, bob_next).await {
            Ok(receipt) => show_receipt("bob", &receipt),
            Err(err) => show_error("bob", &err),
        }

        if let Some(stored) = remote.document(&setup.config.path) {
            step(&format!(
                "stored: {} models, {} articles at {}",
                stored.document.collection("models").map_or(0, |m| m.len()),
                stored.document.collection("articles").map_or(0, |a| a.len()),
                stored.revision
            ));
        }
        alice.stop();
        bob.stop();
    }
    Ok(())
}

// ─── Outage ────────────────────────────────────────────────────────────────

async fn run_outage(setup: &Setup) -> CliResult {
    header("OUTAGE — Hydration Retries and Failed Writes");

    section("Phase 1: the remote refuses the first listeners");
    let remote = setup.remote();
    remote.fail_subscribes(3);
    let config = StoreConfig {
        backoff: vitrine_sdk::BackoffConfig {
            initial_delay_ms: 50,
            max_delay_ms: 400,
            ..setup.config.backoff.clone()
        },
        ..setup.admin("alice")
    };
    let admin = AppStore::new(remote.clone(), config);
    let mut events = admin.events();
    admin.start()?;
    let snapshot = admin.wait_ready(READY).await?;
    while let Ok(event) = events.try_recv() {
        match event {
            StoreEvent::HydrationRetrying { attempt, error } => {
                step(&format!("retry {} after: {}", attempt, error.bright_yellow()))
            }
            StoreEvent::Hydrated { revision, initial: true } => {
                step(&format!("hydrated at {}", revision))
            }
            _ => {}
        }
    }
    show_state(&admin);

    section("Phase 2: a write fails in transit");
    remote.fail_next_write(RemoteError::Unavailable("connection reset".to_string()));
    let next = with_record(&snapshot, "news", json!({"id": "n1", "title": "New faces"}));
    match admin.save_data(&snapshot, next.clone()).await {
        Ok(receipt) => show_receipt("alice", &receipt),
        Err(err) => show_error("alice", &err),
    }
    let unchanged = admin.snapshot() == snapshot;
    step(&format!("snapshot unchanged: {}", unchanged.to_string().bright_green()));

    section("Phase 3: retry the same edit");
    let receipt = admin.save_data(&snapshot, next).await?;
    show_receipt("alice", &receipt);

    section("Phase 4: the remote goes offline and comes back");
    remote.set_offline(true);
    tokio::time::sleep(Duration::from_millis(100)).await;
    show_state(&admin);
    remote.set_offline(false);
    let mut states = admin.watch_hydration();
    tokio::time::timeout(READY, states.wait_for(|s| *s == HydrationState::Ready)).await??;
    show_state(&admin);

    show_metrics(&admin)?;
    admin.stop();
    Ok(())
}

// ─── Show ──────────────────────────────────────────────────────────────────

fn run_show(setup: &Setup) -> CliResult {
    header("SHOW — Seed Document and Configuration");
    section("Seed document");
    println!("{}", serde_json::to_string_pretty(&setup.seed)?);
    section("Store configuration");
    println!("{}", serde_json::to_string_pretty(&setup.config)?);
    Ok(())
}

// ─── Entry point ───────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let result = match Setup::load(&cli) {
        Ok(setup) => match cli.command {
            Commands::Demo => run_demo(&setup).await,
            Commands::Conflict => run_conflict(&setup).await,
            Commands::Merge => run_merge(&setup).await,
            Commands::Outage => run_outage(&setup).await,
            Commands::Show => run_show(&setup),
        },
        Err(err) => Err(err),
    };

    if let Err(err) = result {
        eprintln!("{} {}", "error:".bright_red().bold(), err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_sdk::DocPath;

    fn setup() -> Setup {
        Setup {
            seed: default_site().unwrap(),
            config: StoreConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_scenarios_run() {
        let setup = setup();
        run_demo(&setup).await.unwrap();
        run_conflict(&setup).await.unwrap();
        run_merge(&setup).await.unwrap();
        run_outage(&setup).await.unwrap();
        run_show(&setup).unwrap();
    }

    #[test]
    fn test_admin_config_keeps_shared_settings() {
        let setup = setup();
        let config = setup.admin("bob");
        assert_eq!(config.client_id, "bob");
        assert_eq!(config.path, DocPath::default());
        assert_eq!(config.write_strategy, setup.config.write_strategy);
    }
}
