use std::env;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use log::{LevelFilter, debug, info};
use serde_json::json;

use msgbridge::config::{self, APP_NAME, AppConfig};
use msgbridge::history::HistoryPage;
use msgbridge::native::fixture::{FixtureFile, FixtureSource};
use msgbridge::recall::RecallCache;
use msgbridge::{BridgeError, Collaborators, DestinationSpec, Direction, MessageBridge, Peer};
use msgbridge_protocol::{ActionResponse, WireMessage};

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_history(ctx: RuntimeContext, cmd: HistoryCommand) -> Result<()> {
    handle_history(&ctx, cmd).await
}

#[tokio::main]
async fn async_forward(ctx: RuntimeContext, cmd: ForwardCommand) -> Result<()> {
    handle_forward(&ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging()?;
    debug!("config file: {}", ctx.config_path.display());

    match cli.command {
        Command::History(cmd) => async_history(ctx, cmd),
        Command::Forward(cmd) => async_forward(ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "msgbridge - chat history bridge for bot wire protocols.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON
    #[arg(long, global = true)]
    json: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
    /// Do not change anything on disk
    #[arg(long = "dry-run", global = true)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Page through a fixture's history the way a wire client would
    History(HistoryCommand),
    /// Forward a fixture message to another conversation
    Forward(ForwardCommand),
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct HistoryCommand {
    /// Fixture file with exported native history (defaults to fixture.path)
    #[arg(value_name = "FIXTURE")]
    fixture: Option<PathBuf>,
    /// Conversation as <type>:<id>, e.g. group:5001
    #[arg(long)]
    peer: Peer,
    /// Number of messages to return
    #[arg(short = 'n', long, default_value_t = 20)]
    count: usize,
    /// Walk toward older or newer messages from the anchor
    #[arg(long, value_enum, default_value_t = Direction::Older)]
    direction: Direction,
    /// Seq to page from (exclusive); omit to start at the latest message
    #[arg(long)]
    anchor: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct ForwardCommand {
    /// Fixture file with exported native history (defaults to fixture.path)
    #[arg(value_name = "FIXTURE")]
    fixture: Option<PathBuf>,
    /// Conversation holding the message, as <type>:<id>
    #[arg(long)]
    peer: Peer,
    /// Message id (wire id or long-form native id)
    #[arg(long = "message-id", allow_negative_numbers = true)]
    message_id: i64,
    /// Destination as <type>:<target>
    #[arg(long)]
    to: DestinationSpec,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    config_path: PathBuf,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let config_path = match common.config.clone() {
            Some(path) => expand_path(path)?,
            None => config::default_config_path()?,
        };
        let config = config::load_or_init_config(&config_path, common.dry_run)?;
        Ok(Self {
            common,
            config_path,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        let level = match self.effective_log_level() {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        };

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("msgbridge={level}")));

        if let Some(ref file) = self.config.logging.file {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .with_context(|| format!("opening log file {file}"))?;
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
                .try_init()
                .ok();
        } else if self.common.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .ok();
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(!disable_color)
                        .with_writer(io::stderr),
                )
                .try_init()
                .ok();
        }

        // The registry logs through the `log` facade.
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        builder.filter_level(self.effective_log_level());
        builder.try_init().ok();

        Ok(())
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.trace {
            LevelFilter::Trace
        } else if self.common.debug {
            LevelFilter::Debug
        } else {
            match self.common.verbose {
                0 => self
                    .config
                    .logging
                    .level
                    .parse()
                    .unwrap_or(LevelFilter::Info),
                1 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }

    fn fixture_path(&self, explicit: Option<PathBuf>) -> Result<PathBuf> {
        match explicit {
            Some(path) => expand_path(path),
            None => self
                .config
                .fixture
                .path
                .as_deref()
                .map(PathBuf::from)
                .ok_or_else(|| anyhow!("no fixture given and fixture.path is not configured")),
        }
    }

    /// Build a bridge over a fixture, seeding the recall cache from its
    /// snapshots.
    async fn fixture_bridge(&self, explicit: Option<PathBuf>) -> Result<MessageBridge> {
        let path = self.fixture_path(explicit)?;
        let mut file = FixtureFile::load(&path)?;
        let snapshots = std::mem::take(&mut file.snapshots);

        let recall = Arc::new(RecallCache::from_config(&self.config.recall));
        for snapshot in &snapshots {
            recall.remember(snapshot).await;
        }

        let source = Arc::new(FixtureSource::from_file(file));
        let collaborators = Collaborators {
            source: source.clone(),
            relay: source.clone(),
            peers: source,
            recall,
        };
        MessageBridge::from_config(collaborators, &self.config)
            .context("initializing message bridge")
    }
}

async fn handle_history(ctx: &RuntimeContext, cmd: HistoryCommand) -> Result<()> {
    let bridge = ctx.fixture_bridge(cmd.fixture).await?;
    let result = bridge
        .fetch_history(&cmd.peer, cmd.count, cmd.direction, cmd.anchor)
        .await;

    match result {
        Ok(page) => {
            info!(
                "fetched {} message(s) from {} ({:?})",
                page.messages.len(),
                cmd.peer,
                page.outcome
            );
            if ctx.common.json {
                print_json(&ActionResponse::ok(serde_json::to_value(&page)?))
            } else {
                print_page(&page)
            }
        }
        Err(err) => report_failure(ctx, err),
    }
}

async fn handle_forward(ctx: &RuntimeContext, cmd: ForwardCommand) -> Result<()> {
    let bridge = ctx.fixture_bridge(cmd.fixture).await?;
    match bridge
        .forward_message(cmd.message_id, &cmd.peer, &cmd.to)
        .await
    {
        Ok(id) => {
            if ctx.common.json {
                return print_json(&ActionResponse::ok(json!({ "message_id": id })));
            }
            let key = bridge.resolve_id(id)?;
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "forwarded as message {id} ({key})")?;
            Ok(())
        }
        Err(err) => report_failure(ctx, err),
    }
}

fn report_failure(ctx: &RuntimeContext, err: BridgeError) -> Result<()> {
    if ctx.common.json {
        print_json(&ActionResponse::from(&err))?;
    }
    Err(anyhow!(err))
}

fn print_page(page: &HistoryPage) -> Result<()> {
    let mut stdout = io::stdout().lock();
    for msg in &page.messages {
        writeln!(stdout, "{}", format_message(msg))?;
    }
    writeln!(
        stdout,
        "-- {} message(s), {}",
        page.messages.len(),
        serde_json::to_value(page.outcome)?
            .as_str()
            .unwrap_or_default()
    )?;
    Ok(())
}

fn format_message(msg: &WireMessage) -> String {
    let time = chrono::DateTime::from_timestamp(msg.time, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| msg.time.to_string());
    let name = msg
        .sender
        .card
        .as_deref()
        .unwrap_or(msg.sender.nickname.as_str());
    format!(
        "[{:>6}] #{:<6} {} {}: {}",
        msg.message_seq, msg.message_id, time, name, msg.raw_message
    )
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            if ctx.common.json {
                print_json(&ctx.config)
            } else {
                let body = toml::to_string_pretty(&ctx.config)
                    .context("serializing config to TOML")?;
                print!("{body}");
                Ok(())
            }
        }
        ConfigCommand::Path => {
            println!("{}", ctx.config_path.display());
            Ok(())
        }
        ConfigCommand::Init { force } => init_config(ctx, &ctx.config_path, force),
    }
}

fn init_config(ctx: &RuntimeContext, path: &Path, force: bool) -> Result<()> {
    // load_or_init_config already wrote a missing file at startup.
    if path.exists() && !force {
        info!("config already exists at {}", path.display());
        return Ok(());
    }
    if ctx.common.dry_run {
        info!("dry-run: would write default config to {}", path.display());
        return Ok(());
    }
    config::write_default_config(path)?;
    info!("wrote default config to {}", path.display());
    Ok(())
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        config::expand_str_path(text)
    } else {
        Ok(path)
    }
}
