//! # herald
//!
//! Command-line front end: runs the reference hub, or one of the client
//! roles (subscriber display, publisher, history browser) against it.

#![deny(unsafe_code)]

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use herald_client::{
    spawn_connection, AudioCoordinator, AudioSink, ClientEvent, ClientRuntime, Command,
    CommandSink, ConnectionConfig, Connectivity, HistoryBrowser, HttpHistoryApi, Notice, NullSink,
    RuntimeConfig, SubmissionController, UiUpdate,
};
use herald_client::render::{format_timestamp, preview};
use herald_client::BannerKind;
use herald_core::{languages, AnnouncementId, ClientRequest, LanguageCode, Priority};
use herald_settings::{load_settings, load_settings_from_path, HeraldSettings};
use herald_store::{Database, DraftRepo};
use herald_telemetry::{init_telemetry, TelemetryConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long one-shot commands wait on the hub.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a replay waits for a "not found" before assuming success.
const REPLAY_GRACE: Duration = Duration::from_secs(2);

/// Multi-language public announcement system.
#[derive(Parser, Debug)]
#[command(name = "herald", about = "Multi-language public announcement system")]
struct Cli {
    /// Settings file (defaults to `~/.herald/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run the reference hub.
    Hub {
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Display announcements as they arrive.
    ///
    /// Press enter once to allow audio. `:lang CODE` switches the display
    /// language, `:sound` toggles audio, `:play ID CODE` plays a logged
    /// announcement's clip, `:reset` clears recent history and `:quit` exits.
    Listen {
        #[arg(long)]
        lang: Option<String>,
        /// Start with audio off.
        #[arg(long)]
        mute: bool,
    },
    /// Publish one announcement.
    Announce {
        /// Announcement text. Falls back to the saved draft when omitted.
        text: Option<String>,
        #[arg(long, default_value = "normal")]
        priority: Priority,
        /// Target language; repeat for several.
        #[arg(long = "lang", default_value = "en")]
        languages: Vec<String>,
    },
    /// Show, replace or discard the saved publisher draft.
    Draft {
        text: Option<String>,
        #[arg(long, conflicts_with = "text")]
        clear: bool,
    },
    /// Browse the hub's announcement log.
    History {
        #[command(subcommand)]
        action: HistoryCmd,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCmd {
    /// List logged announcements, newest first.
    List,
    /// Ask the hub to deliver a logged announcement again.
    Replay { id: u64 },
    /// Erase the log (requires the admin token).
    Clear {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("failed to load settings")?;

    let _telemetry = init_telemetry(TelemetryConfig::from_level_str(
        &settings.logging.level,
        settings.logging.json,
    ));

    match cli.command {
        Cmd::Hub { host, port } => run_hub(&settings, host, port).await,
        Cmd::Listen { lang, mute } => run_listen(&settings, lang, mute).await,
        Cmd::Announce {
            text,
            priority,
            languages,
        } => run_announce(&settings, text, priority, languages).await,
        Cmd::Draft { text, clear } => run_draft(&settings, text, clear),
        Cmd::History { action } => run_history(&settings, action).await,
    }
}

// ── Hub ─────────────────────────────────────────────────────────────

async fn run_hub(settings: &HeraldSettings, host: Option<String>, port: Option<u16>) -> Result<()> {
    let config = herald_hub::ServerConfig {
        host: host.unwrap_or_else(|| settings.hub.host.clone()),
        port: port.unwrap_or(settings.hub.port),
        max_send_queue: settings.hub.max_send_queue,
        history_limit: settings.hub.history_limit,
        admin_token: settings.hub.admin_token.clone(),
    };
    let handle = herald_hub::start(config)
        .await
        .context("failed to start hub")?;
    info!(port = handle.port, "hub ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;
    info!("shutting down");
    handle.shutdown();
    Ok(())
}

// ── Client plumbing ─────────────────────────────────────────────────

/// A client runtime plus its connection task.
struct Session {
    events: mpsc::UnboundedSender<ClientEvent>,
    ui: mpsc::UnboundedReceiver<UiUpdate>,
    cancel: CancellationToken,
    runtime: JoinHandle<()>,
    connection: JoinHandle<()>,
}

impl Session {
    fn start(
        settings: &HeraldSettings,
        build: impl FnOnce(
            RuntimeConfig,
            mpsc::UnboundedSender<ClientRequest>,
            mpsc::UnboundedSender<UiUpdate>,
        ) -> ClientRuntime,
        config: RuntimeConfig,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (ui_tx, ui) = mpsc::unbounded_channel();
        let runtime = build(config, outbound_tx, ui_tx);
        let events = runtime.events();
        let cancel = CancellationToken::new();
        let connection = spawn_connection(
            ConnectionConfig {
                ws_url: settings.client.ws_url(),
                reconnect_delay: Duration::from_millis(settings.client.reconnect_delay_ms),
            },
            runtime.events(),
            outbound_rx,
            cancel.clone(),
        );
        Self {
            events,
            ui,
            cancel,
            runtime: tokio::spawn(runtime.run()),
            connection,
        }
    }

    fn command(&self, command: Command) {
        if self.events.send(ClientEvent::Command(command)).is_err() {
            warn!("client runtime already stopped");
        }
    }

    async fn next_update(&mut self) -> Result<UiUpdate> {
        match timeout(REQUEST_TIMEOUT, self.ui.recv()).await {
            Ok(Some(update)) => Ok(update),
            Ok(None) => bail!("client runtime stopped"),
            Err(_) => bail!("timed out waiting for the hub"),
        }
    }

    async fn wait_connected(&mut self) -> Result<()> {
        loop {
            if let UiUpdate::Connectivity {
                state: Connectivity::Connected,
                ..
            } = self.next_update().await?
            {
                return Ok(());
            }
        }
    }

    async fn stop(self) {
        self.command(Command::Shutdown);
        self.cancel.cancel();
        let _ = self.runtime.await;
        let _ = self.connection.await;
    }
}

fn require_language(code: &str) -> Result<LanguageCode> {
    if !languages::is_supported(code) {
        bail!("unsupported language: {code}");
    }
    Ok(LanguageCode::from(code))
}

fn open_drafts(settings: &HeraldSettings) -> Result<DraftRepo> {
    let path = settings.client.draft_db_path();
    let db = Database::open(&path)
        .with_context(|| format!("failed to open client database: {}", path.display()))?;
    Ok(DraftRepo::new(db))
}

// ── Subscriber ──────────────────────────────────────────────────────

async fn run_listen(settings: &HeraldSettings, lang: Option<String>, mute: bool) -> Result<()> {
    let language = require_language(lang.as_deref().unwrap_or(&settings.client.default_language))?;
    let sink: Box<dyn AudioSink> = match settings
        .client
        .audio_player
        .as_deref()
        .and_then(|player| CommandSink::new(player, settings.client.hub_url.clone()))
    {
        Some(sink) => Box::new(sink),
        None => Box::new(NullSink),
    };

    let history = Arc::new(HttpHistoryApi::new(
        settings.client.hub_url.clone(),
        settings.client.admin_token.clone(),
    ));
    let config = RuntimeConfig::new(language, settings.client.sound_enabled && !mute);
    let mut session = Session::start(
        settings,
        |config, outbound, ui| {
            ClientRuntime::new(config, outbound, ui)
                .with_subscriber(AudioCoordinator::new(sink))
                .with_history(history)
        },
        config,
    );

    println!("Connecting to {} ... (press enter to enable audio)", settings.client.hub_url);

    let commands = session.events.clone();
    let _stdin = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let command = match parse_listen_input(&line) {
                Ok(command) => command,
                Err(message) => {
                    eprintln!("{message}");
                    continue;
                }
            };
            let quit = command == Command::Shutdown;
            if commands.send(ClientEvent::Command(command)).is_err() || quit {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            update = session.ui.recv() => match update {
                Some(update) => print_listen_update(&update),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    session.stop().await;
    Ok(())
}

fn parse_listen_input(line: &str) -> std::result::Result<Command, String> {
    let line = line.trim();
    let mut parts = line.split_whitespace();
    match parts.next() {
        None => Ok(Command::Unlock),
        Some(":lang") => match parts.next() {
            Some(code) if languages::is_supported(code) => {
                Ok(Command::SetLanguage(LanguageCode::from(code)))
            }
            Some(code) => Err(format!("unsupported language: {code}")),
            None => Err("usage: :lang CODE".into()),
        },
        Some(":sound") => Ok(Command::ToggleSound),
        Some(":play") => match (parts.next().map(str::parse::<u64>), parts.next()) {
            (Some(Ok(id)), Some(code)) => Ok(Command::PlayHistoryEntry {
                id: AnnouncementId::new(id),
                language: LanguageCode::from(code),
            }),
            _ => Err("usage: :play ID CODE".into()),
        },
        Some(":reset") => Ok(Command::ResetSession),
        Some(":quit") => Ok(Command::Shutdown),
        Some(_) => Ok(Command::Unlock),
    }
}

fn print_listen_update(update: &UiUpdate) {
    match update {
        UiUpdate::Connectivity { state, status_line } => {
            println!("{} {status_line}", state.indicator());
        }
        UiUpdate::Announcement {
            rendering,
            status_line,
        } => {
            println!("\n{rendering}");
            println!("{status_line}");
        }
        UiUpdate::Rerendered(rendering) => println!("\n{rendering}"),
        UiUpdate::RecentHistory(recent) => {
            println!("Recent:");
            for summary in recent {
                println!("  {summary}");
            }
        }
        UiUpdate::Notice(Notice::Rejected(message)) => eprintln!("hub error: {message}"),
        UiUpdate::Notice(Notice::PlaybackFailed(err)) => eprintln!("audio: {err}"),
        UiUpdate::Notice(Notice::QueryFailed(err)) => eprintln!("history: {err}"),
        _ => {}
    }
}

// ── Publisher ───────────────────────────────────────────────────────

async fn run_announce(
    settings: &HeraldSettings,
    text: Option<String>,
    priority: Priority,
    languages: Vec<String>,
) -> Result<()> {
    let languages = languages
        .iter()
        .map(|code| require_language(code))
        .collect::<Result<Vec<_>>>()?;
    let controller = SubmissionController::load(Box::new(open_drafts(settings)?));
    let text = match text {
        Some(text) => text,
        None => controller.text().to_owned(),
    };

    let config = RuntimeConfig::new(settings.client.default_language.as_str(), false);
    let mut session = Session::start(
        settings,
        |config, outbound, ui| ClientRuntime::new(config, outbound, ui).with_publisher(controller),
        config,
    );
    session.wait_connected().await?;
    session.command(Command::Submit {
        text,
        priority: Some(priority),
        languages,
    });

    let result = loop {
        match session.next_update().await {
            Ok(UiUpdate::Validation(Some(err))) => break Err(anyhow::anyhow!(err)),
            Ok(UiUpdate::Banner(Some(banner))) => {
                break match banner.kind {
                    BannerKind::Success => {
                        println!("{}", banner.message);
                        Ok(())
                    }
                    BannerKind::Error => Err(anyhow::anyhow!(banner.message)),
                };
            }
            Ok(_) => {}
            Err(err) => break Err(err),
        }
    };
    session.stop().await;
    result
}

fn run_draft(settings: &HeraldSettings, text: Option<String>, clear: bool) -> Result<()> {
    let drafts = open_drafts(settings)?;
    if clear {
        drafts.clear()?;
        println!("Draft discarded");
        return Ok(());
    }
    match text {
        Some(text) => {
            drafts.save(&text)?;
            println!("Draft saved ({} characters)", text.chars().count());
        }
        None => match drafts.load()? {
            Some(row) => {
                println!("{}", row.body);
                println!("({} characters, saved {})", row.body.chars().count(), row.updated_at);
            }
            None => println!("No saved draft"),
        },
    }
    Ok(())
}

// ── History browser ─────────────────────────────────────────────────

async fn run_history(settings: &HeraldSettings, action: HistoryCmd) -> Result<()> {
    let api = Arc::new(HttpHistoryApi::new(
        settings.client.hub_url.clone(),
        settings.client.admin_token.clone(),
    ));
    match action {
        HistoryCmd::List => {
            let mut browser = HistoryBrowser::new(api);
            let entries = browser.load_history().await?;
            if entries.is_empty() {
                println!("No announcements logged");
            }
            for entry in entries {
                let codes: Vec<&str> = entry.languages.iter().map(LanguageCode::as_str).collect();
                println!(
                    "{:>5}  {}  {:<9}  [{}]  {}",
                    entry.id,
                    format_timestamp(entry.timestamp),
                    entry.priority,
                    codes.join(","),
                    preview(&entry.original_text, 60),
                );
            }
            Ok(())
        }
        HistoryCmd::Replay { id } => {
            let id = AnnouncementId::new(id);
            let config = RuntimeConfig::new(settings.client.default_language.as_str(), false);
            let mut session = Session::start(
                settings,
                |config, outbound, ui| ClientRuntime::new(config, outbound, ui).with_history(api),
                config,
            );
            session.wait_connected().await?;
            session.command(Command::Replay(id));
            let result = await_replay(&mut session, id).await;
            session.stop().await;
            result
        }
        HistoryCmd::Clear { yes } => {
            let mut browser = HistoryBrowser::new(api);
            let resp = browser.clear_history(|| yes || confirm_clear()).await?;
            println!("{}", resp.message);
            Ok(())
        }
    }
}

async fn await_replay(session: &mut Session, id: AnnouncementId) -> Result<()> {
    loop {
        match session.next_update().await? {
            UiUpdate::Notice(Notice::ReplayRequested(requested)) if requested == id => break,
            UiUpdate::Notice(Notice::Rejected(message)) => bail!(message),
            _ => {}
        }
    }
    // The hub only answers a replay when it fails.
    let rejected = timeout(REPLAY_GRACE, async {
        while let Some(update) = session.ui.recv().await {
            if let UiUpdate::Notice(Notice::Rejected(message)) = update {
                return Some(message);
            }
        }
        None
    })
    .await;
    match rejected {
        Ok(Some(message)) => bail!(message),
        _ => {
            println!("Replay of {id} requested");
            Ok(())
        }
    }
}

fn confirm_clear() -> bool {
    print!("Clear all announcement history? [y/N] ");
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
