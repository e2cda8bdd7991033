//! Command line and layered configuration.
//!
//! Precedence, lowest first: built-in defaults, the config file
//! (`--config`/`CONFIG_FILE`, else an optional `./config.yaml`), environment
//! variables `SCRAPER_<SECTION>__<KEY>`, then command line flags.

use std::path::Path;

use clap::Parser;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

/// File picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Prefix of environment overrides, e.g. `SCRAPER_SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "SCRAPER";

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_KEEPALIVE_SECS: u64 = 30;
const DEFAULT_USER_AGENT: &str = "Agentic-Web-Scraper/1.0 (Educational Purpose)";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_REDIRECTS: usize = 10;
const DEFAULT_MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;
const DEFAULT_CONCURRENT_LIMIT: i64 = 5;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about = "Web scraping and research tool server", long_about = None)]
pub struct Cli {
    /// Serve line-delimited JSON on stdin/stdout (default)
    #[arg(long, conflicts_with_all = ["sse", "cli"])]
    pub stdio: bool,

    /// Serve the HTTP push and call endpoints
    #[arg(long, conflicts_with = "cli")]
    pub sse: bool,

    /// Start the interactive console
    #[arg(long)]
    pub cli: bool,

    /// Bind address for --sse
    #[arg(long)]
    pub host: Option<String>,

    /// Port for --sse
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Log filter, e.g. `debug` or `agentic_web_scraper=trace`
    #[arg(long)]
    pub log_level: Option<String>,
}

/// How the process talks to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Stdio,
    Sse,
    Console,
}

impl Cli {
    /// Selected mode; stdio when no mode flag is given.
    pub fn mode(&self) -> Mode {
        if self.sse {
            Mode::Sse
        } else if self.cli {
            Mode::Console
        } else {
            Mode::Stdio
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub scraper: ScraperConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Interval between push-channel keep-alive events.
    pub keepalive_secs: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_redirects: usize,
    /// Responses larger than this many bytes are rejected.
    pub max_content_length: usize,
    /// Default chunk size for batch fetches.
    pub concurrent_limit: i64,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit JSON lines instead of the compact human format.
    pub json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
                keepalive_secs: DEFAULT_KEEPALIVE_SECS,
            },
            scraper: ScraperConfig::default(),
            logging: LoggingConfig {
                level: DEFAULT_LOG_LEVEL.to_string(),
                json: false,
            },
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            concurrent_limit: DEFAULT_CONCURRENT_LIMIT,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).map_err(|e| ConfigError::Message(e.to_string()))?;
        Self::from_cli(&cli)
    }

    /// Builds the layered configuration for already-parsed flags.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", defaults.server.port)?
            .set_default("server.keepalive_secs", defaults.server.keepalive_secs)?
            .set_default("scraper.user_agent", defaults.scraper.user_agent)?
            .set_default("scraper.timeout_secs", defaults.scraper.timeout_secs)?
            .set_default("scraper.max_redirects", defaults.scraper.max_redirects as u64)?
            .set_default(
                "scraper.max_content_length",
                defaults.scraper.max_content_length as u64,
            )?
            .set_default("scraper.concurrent_limit", defaults.scraper.concurrent_limit)?
            .set_default("logging.level", defaults.logging.level)?
            .set_default("logging.json", defaults.logging.json)?;

        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder.add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml))
            }
            None => builder,
        };

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(host) = &cli.host {
            builder = builder.set_override("server.host", host.as_str())?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(level) = &cli.log_level {
            builder = builder.set_override("logging.level", level.as_str())?;
        }

        builder.build()?.try_deserialize()
    }
}
