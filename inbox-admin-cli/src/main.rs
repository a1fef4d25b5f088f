//! Inbox Administration CLI

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use inbox_core::{
    CredentialSource, EventPublisher, FileEventProcessor, HashScheme, HttpCredentialSource, InboxConfig,
    InboxGateway, LogPublisher, Operation, PublicKey, StorageBackend, password,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "inbox-admin")]
#[command(author = "Inbox Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Inbox configuration, credential and event tool")]
struct Cli {
    /// Configuration file (TOML); built-in defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration and print the effective settings
    CheckConfig,

    /// Fetch a user's credential record from the identity service
    Lookup { user: String },

    /// Check a password against a stored hash
    VerifyPassword {
        #[arg(long)]
        hash: String,
        /// Password to check; read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Decode an authorized-keys style public key line
    ParseKey {
        /// Key line; read from stdin when omitted
        line: Option<String>,
    },

    /// Run a login against the identity service without a session
    Authenticate {
        #[arg(short, long)]
        user: String,
        /// Password to check; read from stdin unless --key-file is given
        #[arg(long)]
        password: Option<String>,
        /// Public key file to authenticate with instead of a password
        #[arg(long)]
        key_file: Option<PathBuf>,
    },

    /// Process a file operation by hand and publish its descriptor
    Emit {
        #[arg(short, long)]
        user: String,
        /// upload, rename or remove
        #[arg(short, long)]
        operation: Operation,
        /// Session path of the target
        path: String,
        /// Previous session path (rename only)
        #[arg(long)]
        old_path: Option<String>,
    },
}

fn init_tracing(debug: bool) {
    let env_filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<InboxConfig> {
    match path {
        Some(path) => InboxConfig::load(path).with_context(|| format!("Failed to load config {:?}", path)),
        None => {
            tracing::debug!("No config file given, using defaults");
            Ok(InboxConfig::default())
        }
    }
}

fn read_stdin_line(what: &str) -> Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .with_context(|| format!("Failed to read {} from stdin", what))?;
    let line = line.trim_end_matches(['\r', '\n']).to_string();
    if line.is_empty() {
        bail!("No {} given", what);
    }
    Ok(line)
}

fn describe_key(key: &PublicKey) -> String {
    format!("{} ({} bits)", key.algorithm(), key.bits())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Commands::CheckConfig => {
            let config = load_config(cli.config.as_ref())?;
            println!("Configuration OK");
            println!("  identity endpoint: {}", config.identity.endpoint);
            println!("  cache ttl:         {}s", config.identity.cache_ttl_secs);
            println!("  storage:           {:?} at {}", config.storage.backend, config.storage.root.display());
            println!("  checksum:          {}", config.events.checksum_algorithm);
            println!(
                "  exchange:          {} ({} / {})",
                config.events.exchange, config.events.routing_key_files, config.events.routing_key_checksums
            );
        }

        Commands::Lookup { user } => {
            let config = load_config(cli.config.as_ref())?;
            let identity = &config.identity;
            let source = HttpCredentialSource::new(
                &identity.endpoint,
                &identity.username,
                &identity.password,
                identity.timeout(),
            )?;
            let record = source.fetch(&user).await?;

            let scheme = HashScheme::detect(&record.password_hash)
                .map(|s| s.name())
                .unwrap_or("none/unknown");
            let key = if record.public_key.is_empty() {
                "none".to_string()
            } else {
                match PublicKey::parse(&record.public_key) {
                    Ok(key) => describe_key(&key),
                    Err(e) => format!("unusable: {}", e),
                }
            };

            println!("User:          {}", user);
            println!("Password hash: {}", scheme);
            println!("Public key:    {}", key);
            println!("Cache TTL:     {:?}", record.ttl(identity.cache_ttl()));
        }

        Commands::VerifyPassword { hash, password } => {
            let password = match password {
                Some(p) => p,
                None => read_stdin_line("password")?,
            };
            let scheme = HashScheme::detect(&hash).map(|s| s.name()).unwrap_or("unknown");
            if password::verify(&password, &hash) {
                println!("Password matches ({})", scheme);
            } else {
                println!("Password does NOT match ({})", scheme);
                std::process::exit(1);
            }
        }

        Commands::ParseKey { line } => {
            let line = match line {
                Some(l) => l,
                None => read_stdin_line("key line")?,
            };
            let key = PublicKey::parse(&line)?;
            println!("{}", describe_key(&key));
        }

        Commands::Authenticate { user, password, key_file } => {
            let config = load_config(cli.config.as_ref())?;
            let publisher: Arc<dyn EventPublisher> = Arc::new(LogPublisher::new(config.events.clone()));
            let gateway = InboxGateway::from_config(&config, publisher).await?;

            let accepted = match key_file {
                Some(path) => {
                    let line = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read key file {:?}", path))?;
                    let key = PublicKey::parse(line.trim())?;
                    gateway.authenticator().authenticate_by_public_key(&user, &key).await
                }
                None => {
                    let password = match password {
                        Some(p) => p,
                        None => read_stdin_line("password")?,
                    };
                    gateway.authenticator().authenticate_by_password(&user, &password).await
                }
            };

            if !accepted {
                println!("Authentication failed for {}", user);
                std::process::exit(1);
            }
            println!("Authentication succeeded for {}", user);
            if let Some(root) = gateway.authenticator().storage_root(&user).await {
                println!("Home:   {}", root.home.display());
                if let Some(bucket) = root.bucket {
                    println!("Bucket: {}", bucket);
                }
            }
        }

        Commands::Emit { user, operation, path, old_path } => {
            let config = load_config(cli.config.as_ref())?;
            if operation == Operation::Rename && old_path.is_none() {
                bail!("--old-path is required for rename");
            }

            let storage = StorageBackend::from_config(&config.storage)
                .await
                .context("Failed to open storage")?;
            storage
                .prepare(&user)
                .await
                .with_context(|| format!("Failed to prepare storage for {}", user))?;

            let publisher = Arc::new(LogPublisher::new(config.events.clone()));
            let processor = FileEventProcessor::new(Arc::new(storage), publisher, config.events.checksum_algorithm);

            match processor.process(operation, &user, old_path.as_deref(), &path).await {
                Some((destination, descriptor)) => {
                    println!("{} -> {}", destination, config.events.routing_key(destination));
                    println!("{}", serde_json::to_string_pretty(&descriptor)?);
                }
                None => {
                    println!("Nothing to publish for {}", path);
                }
            }
        }
    }

    Ok(())
}
