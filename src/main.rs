use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use klipper_console::api::moonraker::MoonrakerClient;
use klipper_console::api::PrinterApi;
use klipper_console::completion::ShellHelper;
use klipper_console::dispatcher::Dispatcher;
use klipper_console::error::ShellError;
use klipper_console::paths::{default_config_dir, settings_path};
use klipper_console::registry::CommandRegistry;
use klipper_console::settings::{load_settings, save_settings, ShellSettings};
use klipper_console::shell::{run_once, Repl, RustylineEditor};
use klipper_console::state::Session;

/// Console workers still blocked at exit get this long before being abandoned.
const WORKER_GRACE: Duration = Duration::from_secs(1);

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "klipper-console",
    about = "Interactive command shell for Klipper printers via Moonraker",
    version
)]
struct Cli {
    /// Moonraker base URL
    #[arg(long, env = "MOONRAKER_URL")]
    url: Option<String>,

    /// Moonraker API key
    #[arg(long, env = "MOONRAKER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Show a status line at the top of console mode
    #[arg(long)]
    split_screen: bool,

    /// Output raw JSON instead of formatted text
    #[arg(long)]
    json: bool,

    /// Config directory override
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Log filter (e.g. debug, klipper_console=trace); defaults to RUST_LOG or warn
    #[arg(long)]
    log_level: Option<String>,

    /// Run one command line and exit
    #[arg(short = 'c', long = "command", value_name = "LINE")]
    command: Option<String>,

    /// Write the effective settings to the config directory and exit
    #[arg(long)]
    init_config: bool,
}

impl Cli {
    /// Flags win over the settings file.
    fn apply(&self, settings: &mut ShellSettings) {
        if let Some(url) = &self.url {
            settings.url.clone_from(url);
        }
        if let Some(key) = &self.api_key {
            settings.api_key = Some(key.clone());
        }
        if let Some(timeout) = self.timeout {
            settings.timeout_secs = timeout;
        }
        if self.split_screen {
            settings.split_screen = true;
        }
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn connect(settings: &ShellSettings) -> Result<(MoonrakerClient, MoonrakerClient), ShellError> {
    let config_err = |e: klipper_console::error::ApiError| ShellError::Config {
        message: e.to_string(),
    };
    let client = MoonrakerClient::new(&settings.url, settings.api_key.clone(), settings.timeout())
        .map_err(config_err)?;
    let lookup = client
        .with_timeout(settings.lookup_timeout())
        .map_err(config_err)?;
    Ok((client, lookup))
}

fn run(cli: Cli) -> Result<ExitCode, ShellError> {
    let config_dir = cli.config_dir.clone().unwrap_or_else(default_config_dir);
    let mut settings = load_settings(&config_dir)?;
    cli.apply(&mut settings);

    if cli.init_config {
        save_settings(&config_dir, &settings)?;
        println!("Wrote {}", settings_path(&config_dir).display());
        return Ok(ExitCode::SUCCESS);
    }

    let (client, lookup) = connect(&settings)?;
    match client.server_info() {
        Ok(info) => info!(
            url = %settings.url,
            klippy_state = info.get("klippy_state").and_then(|s| s.as_str()).unwrap_or("unknown"),
            "connected"
        ),
        Err(e) => {
            eprintln!("Error: cannot reach Moonraker at {}: {e}", settings.url);
            return Ok(ExitCode::FAILURE);
        }
    }

    let cwd = std::env::current_dir().unwrap_or_else(|e| {
        warn!(error = %e, "cannot read current directory");
        PathBuf::from(".")
    });
    let session = Arc::new(Session::new(Arc::new(client), Arc::new(lookup), settings, cwd));
    let dispatcher = Dispatcher::new(Arc::new(CommandRegistry::with_builtins()?));

    if let Some(line) = &cli.command {
        let ok = run_once(&dispatcher, &session, line, cli.json, &mut io::stdout().lock())?;
        session.join_workers(WORKER_GRACE);
        return Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE });
    }

    let helper = ShellHelper::new(Arc::clone(&session), dispatcher.shared_registry());
    let editor = RustylineEditor::new(helper)?;
    Repl::new(editor, Arc::clone(&session), dispatcher)
        .with_json(cli.json)
        .run(&mut io::stdout())?;
    session.join_workers(WORKER_GRACE);
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
