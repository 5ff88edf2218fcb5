use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use threatwatch_demo::DemoDataSource;
use threatwatch_engine::{Engine, EngineConfig, EngineEvent, EngineHandle, EngineSnapshot};
use threatwatch_fetch::HttpDataSource;
use threatwatch_store::{FilePreferenceStore, PreferenceStore, PreferenceStoreExt, keys};
use threatwatch_types::Settings;

#[derive(Parser)]
#[command(name = "threatwatch", about = "Security threat acquisition engine")]
struct Cli {
    /// State directory (defaults to ~/.threatwatch or $THREATWATCH_STATE_DIR)
    #[arg(long)]
    state_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and stream threat updates until interrupted
    Watch {
        /// Serve generated sample data instead of contacting endpoints
        #[arg(long)]
        demo: bool,
        /// Blockchain endpoint URL
        #[arg(long)]
        blockchain_url: Option<String>,
        /// Threat feed endpoint URL
        #[arg(long)]
        api_url: Option<String>,
        /// Bearer token for both endpoints
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Connect, fetch once, print a summary and exit
    Fetch {
        #[arg(long)]
        demo: bool,
        #[arg(long)]
        blockchain_url: Option<String>,
        #[arg(long)]
        api_url: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Stored settings and alert preferences
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Show stored connection settings and alert preferences
    Show,
    /// Update stored connection settings
    Set {
        #[arg(long)]
        blockchain_url: Option<String>,
        #[arg(long)]
        api_url: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        demo: Option<bool>,
    },
    /// Update alert preferences
    Alerts {
        /// Play a sound for new high-severity threats
        #[arg(long)]
        sound: Option<bool>,
        /// Announce batches of new threats
        #[arg(long)]
        notifications: Option<bool>,
        /// Alert volume, 0-100
        #[arg(long)]
        volume: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let state_dir = cli
        .state_dir
        .unwrap_or_else(FilePreferenceStore::default_state_dir);
    let store: Arc<dyn PreferenceStore> = Arc::new(FilePreferenceStore::new(&state_dir));

    match cli.command {
        Commands::Watch {
            demo,
            blockchain_url,
            api_url,
            api_key,
        } => {
            let settings = resolve_settings(&*store, demo, blockchain_url, api_url, api_key)?;
            watch(store, settings).await
        }
        Commands::Fetch {
            demo,
            blockchain_url,
            api_url,
            api_key,
        } => {
            let settings = resolve_settings(&*store, demo, blockchain_url, api_url, api_key)?;
            fetch_once(store, settings).await
        }
        Commands::Settings { action } => handle_settings(&*store, action),
    }
}

/// Stored settings overridden by whatever flags were passed; the merged
/// result is persisted so the next run reuses it.
fn resolve_settings(
    store: &dyn PreferenceStore,
    demo: bool,
    blockchain_url: Option<String>,
    api_url: Option<String>,
    api_key: Option<String>,
) -> Result<Settings> {
    let mut settings: Settings = store.get_or(keys::CONNECTION_SETTINGS, Settings::default());
    if let Some(url) = blockchain_url {
        settings.blockchain_url = url;
    }
    if let Some(url) = api_url {
        settings.api_url = url;
    }
    if let Some(key) = api_key {
        settings.api_key = key;
    }
    settings.demo_mode = demo;

    if !settings.demo_mode && !settings.has_blockchain() {
        bail!("no blockchain URL configured; pass --blockchain-url or --demo");
    }
    store.put(keys::CONNECTION_SETTINGS, &settings)?;
    Ok(settings)
}

fn spawn_engine(
    store: Arc<dyn PreferenceStore>,
) -> Result<(EngineHandle, mpsc::Receiver<EngineEvent>)> {
    let live = Arc::new(HttpDataSource::new()?);
    let fallback = Arc::new(DemoDataSource::new());
    Ok(Engine::spawn(EngineConfig::default(), live, fallback, store))
}

async fn watch(store: Arc<dyn PreferenceStore>, settings: Settings) -> Result<()> {
    let (handle, mut events) = spawn_engine(store)?;
    handle.connect_to_sources(settings).await;
    print_summary(&handle.snapshot());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                handle.disconnect().await;
                println!("Stopped.");
                return Ok(());
            }
            event = events.recv() => match event {
                Some(event) => report(&handle, event),
                None => return Ok(()),
            }
        }
    }
}

async fn fetch_once(store: Arc<dyn PreferenceStore>, settings: Settings) -> Result<()> {
    let (handle, _events) = spawn_engine(store)?;
    handle.connect_to_sources(settings).await;
    let snap = handle.snapshot();
    print_summary(&snap);
    handle.disconnect().await;

    if let Some(error) = snap.connection_error {
        bail!("fetch failed: {error}");
    }
    Ok(())
}

fn handle_settings(store: &dyn PreferenceStore, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show => {
            let settings: Settings = store.get_or(keys::CONNECTION_SETTINGS, Settings::default());
            println!("Blockchain URL:  {}", display_or_unset(&settings.blockchain_url));
            println!("Threat feed URL: {}", display_or_unset(&settings.api_url));
            println!(
                "API key:         {}",
                if settings.api_key.is_empty() { "(unset)" } else { "(set)" }
            );
            println!("Demo mode:       {}", settings.demo_mode);
            println!("Sound:           {}", store.get_or(keys::SOUND_ENABLED, true));
            println!(
                "Notifications:   {}",
                store.get_or(keys::NOTIFICATIONS_ENABLED, true)
            );
            println!("Volume:          {}", store.get_or(keys::SOUND_VOLUME, 70u32));
        }
        SettingsAction::Set {
            blockchain_url,
            api_url,
            api_key,
            demo,
        } => {
            let mut settings: Settings =
                store.get_or(keys::CONNECTION_SETTINGS, Settings::default());
            if let Some(url) = blockchain_url {
                settings.blockchain_url = url;
            }
            if let Some(url) = api_url {
                settings.api_url = url;
            }
            if let Some(key) = api_key {
                settings.api_key = key;
            }
            if let Some(demo) = demo {
                settings.demo_mode = demo;
            }
            store.put(keys::CONNECTION_SETTINGS, &settings)?;
            println!("Settings saved.");
        }
        SettingsAction::Alerts {
            sound,
            notifications,
            volume,
        } => {
            if let Some(sound) = sound {
                store.put(keys::SOUND_ENABLED, &sound)?;
            }
            if let Some(notifications) = notifications {
                store.put(keys::NOTIFICATIONS_ENABLED, &notifications)?;
            }
            if let Some(volume) = volume {
                store.put(keys::SOUND_VOLUME, &volume.min(100))?;
            }
            println!("Preferences saved.");
        }
    }
    Ok(())
}

fn display_or_unset(value: &str) -> &str {
    if value.is_empty() { "(unset)" } else { value }
}

fn report(handle: &EngineHandle, event: EngineEvent) {
    match event {
        EngineEvent::Connected => println!("Connected."),
        EngineEvent::Reconnected => println!("Reconnected."),
        EngineEvent::Disconnected => println!("Disconnected."),
        EngineEvent::ConnectionLost { error } => println!("Connection lost: {error}"),
        EngineEvent::ReconnectScheduled { attempt, delay_ms } => {
            println!("Retry #{attempt} in {delay_ms}ms");
        }
        EngineEvent::FallbackEngaged => println!("Serving generated sample data."),
        EngineEvent::NewThreats { count } => {
            println!("{count} new threat(s)");
            print_summary(&handle.snapshot());
        }
        EngineEvent::ThreatAlertRaised { threat_id, volume } => {
            println!("ALERT: high-severity threat {threat_id} (volume {volume})");
        }
    }
}

fn print_summary(snap: &EngineSnapshot) {
    let stats = snap.threat_stats;
    println!(
        "[{:?}] threats: {} (high {}, medium {}, low {}) active {} mitigated {}{}",
        snap.connection_state,
        stats.total,
        stats.high,
        stats.medium,
        stats.low,
        stats.active,
        stats.mitigated,
        if snap.using_fallback_data {
            "  [sample data]"
        } else {
            ""
        }
    );
    if let Some(chain) = &snap.blockchain_data {
        println!("chain length: {}", chain.length);
    }
    if let Some(error) = &snap.connection_error {
        println!("last error: {error}");
    }
}
