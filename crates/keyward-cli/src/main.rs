//! keyward: deterministic password manager CLI
//!
//! Commands:
//!   generate <domain>   - derive (and remember settings for) a site password
//!   list                - list stored domains
//!   show <domain>       - print the stored settings of one domain
//!   delete <domain>     - forget a domain
//!   export              - print the vault as a base64 sync blob
//!   import <blob>       - merge a sync blob into the vault
//!   sync                - pull, merge and push against the configured remote
//!   config show         - display current configuration

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use keyward_core::config::KeywardConfig;
use keyward_core::domain::extract_full_domain;
use keyward_core::{ClassSelection, Template};
use keyward_crypto::{generate_for_entry, KdfParams, MasterSecretManager};
use keyward_sync::{ConfigurationStore, ContainerFile, FileTransport, SyncOutcome};
use rand::rngs::OsRng;
use secrecy::SecretString;
use std::io::Read;
use std::path::{Path, PathBuf};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "keyward",
    version,
    about = "Deterministic password manager",
    long_about = "keyward: derive site passwords from one master password and sync their settings"
)]
struct Cli {
    /// Path to keyward.toml configuration file
    #[arg(long, short = 'c', env = "KEYWARD_CONFIG", default_value = "~/.config/keyward/config.toml")]
    config: PathBuf,

    /// Vault container file (overrides config)
    #[arg(long, env = "KEYWARD_VAULT")]
    vault: Option<PathBuf>,

    /// Log level filter (overrides config; RUST_LOG wins over both)
    #[arg(long)]
    log: Option<String>,

    /// Log output format: text or json (overrides config)
    #[arg(long)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Derive the password for a domain, creating its settings if needed
    Generate {
        /// Domain, or a URL to take the domain from
        domain: String,
        /// Login name; part of the derivation input
        #[arg(long, short = 'u')]
        username: Option<String>,
        /// Password length (recomputes the template)
        #[arg(long, short = 'l')]
        length: Option<usize>,
        /// PBKDF2 rounds for this domain
        #[arg(long, short = 'i')]
        iterations: Option<i64>,
    },

    /// List stored domains
    List,

    /// Print the stored settings of a domain
    Show { domain: String },

    /// Remove a domain; the deletion reaches other devices on the next sync
    Delete { domain: String },

    /// Print the vault as a base64 sync blob
    Export,

    /// Merge a sync blob into the vault ("-" reads it from stdin)
    Import { blob: String },

    /// Pull, merge and push against the configured remote
    Sync,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let (mut config, found) = load_config(&config_path)?;

    if let Some(level) = &cli.log {
        config.log.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.log.format = format.clone();
    }
    if let Some(vault) = &cli.vault {
        config.vault.path = vault.clone();
    }
    init_logging(&config.log.level, &config.log.format);
    if !found {
        tracing::warn!(path = %config_path.display(), "no config file, using defaults");
    }

    match cli.command {
        Commands::Generate {
            domain,
            username,
            length,
            iterations,
        } => cmd_generate(&config, &domain, username, length, iterations),
        Commands::List => cmd_list(&config),
        Commands::Show { domain } => cmd_show(&config, &domain),
        Commands::Delete { domain } => cmd_delete(&config, &domain),
        Commands::Export => cmd_export(&config),
        Commands::Import { blob } => cmd_import(&config, &blob),
        Commands::Sync => cmd_sync(&config),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path, found),
    }
}

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries passwords and blobs; logs go to stderr
    if format == "json" {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

/// Parsed config and whether the file existed.
fn load_config(path: &Path) -> Result<(KeywardConfig, bool)> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((KeywardConfig::default(), false))
    }
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

/// Master password from `KEYWARD_PASSWORD`, else prompted on the terminal.
fn read_master_password() -> Result<SecretString> {
    if let Ok(password) = std::env::var("KEYWARD_PASSWORD") {
        return Ok(SecretString::from(password));
    }
    let password = rpassword::prompt_password("Master password: ").context("reading master password")?;
    Ok(SecretString::from(password))
}

// ── Vault session ─────────────────────────────────────────────────────────────

/// An unlocked vault: container file, settings and master secret.
struct Vault {
    file: ContainerFile,
    store: ConfigurationStore,
    manager: MasterSecretManager,
    password: SecretString,
}

impl Vault {
    fn open(config: &KeywardConfig) -> Result<Self> {
        let file = ContainerFile::new(expand_tilde(&config.vault.path));
        let password = read_master_password()?;
        let mut manager = MasterSecretManager::new(KdfParams {
            wrap_iterations: config.vault.wrap_iterations,
            settings_iterations: config.vault.settings_iterations,
        });
        let mut store = ConfigurationStore::new();
        let bytes = file.read()?;
        store
            .open(&bytes, &password, &mut manager, &mut OsRng)
            .with_context(|| format!("opening vault: {}", file.path().display()))?;
        tracing::debug!(path = %file.path().display(), entries = store.len(), "vault unlocked");
        Ok(Self {
            file,
            store,
            manager,
            password,
        })
    }

    fn save(&mut self) -> Result<()> {
        let bytes = self.store.serialize(&mut self.manager, &mut OsRng)?;
        self.file
            .write(&bytes)
            .with_context(|| format!("saving vault: {}", self.file.path().display()))
    }
}

// ── `keyward generate` ────────────────────────────────────────────────────────

fn cmd_generate(
    config: &KeywardConfig,
    input: &str,
    username: Option<String>,
    length: Option<usize>,
    iterations: Option<i64>,
) -> Result<()> {
    let (domain, url) = if input.contains("://") {
        (extract_full_domain(input), Some(input.to_string()))
    } else {
        (input.to_string(), None)
    };
    if domain.is_empty() {
        bail!("no domain in '{input}'");
    }

    let mut vault = Vault::open(config)?;
    let is_new = vault.store.get(&domain).is_none();
    let entry = vault.store.get_or_create(&domain, &mut OsRng);

    let length = length.or(is_new.then_some(config.generator.default_length));
    if let Some(length) = length.filter(|&l| l != entry.template().len()) {
        let selection = match entry.template().selection() {
            s if s.is_empty() => ClassSelection::ALL,
            s => s,
        };
        let template = Template::calculate(length, selection, &mut OsRng);
        entry.edit(|s| s.template = template);
    }
    let iterations = iterations.or(is_new.then_some(i64::from(config.generator.default_iterations)));
    entry.edit(|s| {
        if let Some(iterations) = iterations {
            s.iterations = iterations;
        }
        if username.is_some() {
            s.username = username;
        }
        if url.is_some() {
            s.url = url;
        }
    });

    let password = match entry.settings().legacy_password.as_deref() {
        Some(legacy) if !legacy.is_empty() => {
            eprintln!("note: {domain} has a stored legacy password");
            legacy.to_string()
        }
        _ => {
            let secret = vault
                .manager
                .secret()
                .context("master secret not loaded")?;
            generate_for_entry(entry, secret, config.generator.pepper.as_bytes())
        }
    };

    vault.save()?;
    println!("{password}");
    Ok(())
}

// ── `keyward list` / `show` / `delete` ────────────────────────────────────────

fn cmd_list(config: &KeywardConfig) -> Result<()> {
    let vault = Vault::open(config)?;
    if vault.store.is_empty() {
        println!("No domains stored.");
        return Ok(());
    }
    for entry in vault.store.entries() {
        let mark = if entry.is_synced() { ' ' } else { '*' };
        println!("{mark} {:<32} {}", entry.domain(), entry.username());
    }
    let pending = vault.store.pending_deletions().count();
    if pending > 0 {
        println!();
        println!("{pending} deletion(s) not yet synced");
    }
    Ok(())
}

fn cmd_show(config: &KeywardConfig, domain: &str) -> Result<()> {
    let vault = Vault::open(config)?;
    let entry = vault
        .store
        .get(domain)
        .with_context(|| format!("no settings stored for {domain}"))?;
    let s = entry.settings();

    println!("Domain:     {}", entry.domain());
    println!("Username:   {}", entry.username());
    if let Some(url) = s.url.as_deref().filter(|u| !u.is_empty()) {
        println!("URL:        {url}");
    }
    println!("Template:   {}", entry.template().full_template());
    println!("Extras:     {}", entry.extra_characters());
    println!("Iterations: {}", s.iterations);
    println!("Created:    {}", keyward_core::timestamp::format(&entry.created()));
    println!("Modified:   {}", keyward_core::timestamp::format(&entry.modified()));
    println!("Synced:     {}", if entry.is_synced() { "yes" } else { "no" });
    if let Some(notes) = s.notes.as_deref().filter(|n| !n.is_empty()) {
        println!();
        println!("{notes}");
    }
    Ok(())
}

fn cmd_delete(config: &KeywardConfig, domain: &str) -> Result<()> {
    let mut vault = Vault::open(config)?;
    if vault.store.delete(domain).is_none() {
        bail!("no settings stored for {domain}");
    }
    vault.save()?;
    println!("Deleted {domain}");
    Ok(())
}

// ── `keyward export` / `import` ───────────────────────────────────────────────

fn cmd_export(config: &KeywardConfig) -> Result<()> {
    let mut vault = Vault::open(config)?;
    let blob = vault.store.export(&mut vault.manager, &mut OsRng)?;
    println!("{blob}");
    Ok(())
}

fn cmd_import(config: &KeywardConfig, blob: &str) -> Result<()> {
    let blob = if blob == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading blob from stdin")?;
        buf
    } else {
        blob.to_string()
    };

    let mut vault = Vault::open(config)?;
    let remote = vault
        .store
        .import(&blob, &vault.password, &mut vault.manager)
        .context("importing blob")?;
    let report = vault.store.merge_remote(&remote, &mut OsRng);
    vault.save()?;

    println!("Import complete:");
    println!("  inserted: {}", report.inserted);
    println!("  updated:  {}", report.updated);
    println!("  removed:  {}", report.removed);
    if report.needs_push {
        println!("  local changes are newer than the blob; run `keyward sync` or export again");
    }
    Ok(())
}

// ── `keyward sync` ────────────────────────────────────────────────────────────

/// Transport for a remote address. Plain paths and `file://` URLs are
/// served from the filesystem.
fn transport_for(address: &str) -> Result<FileTransport> {
    match address.split_once("://") {
        None => Ok(FileTransport::new(expand_tilde(Path::new(address)))),
        Some(("file", _)) => Ok(FileTransport::from_address(address)),
        Some((scheme, _)) => bail!("unsupported remote scheme '{scheme}': only file:// remotes are built in"),
    }
}

fn cmd_sync(config: &KeywardConfig) -> Result<()> {
    if !config.sync.enabled {
        println!("Sync is disabled (set [sync] enabled = true in the config).");
        return Ok(());
    }
    let mut vault = Vault::open(config)?;
    let address = config
        .sync
        .server_address
        .clone()
        .or_else(|| vault.store.endpoint().map(|e| e.server_address.clone()))
        .context("no sync server address configured")?;
    let transport = transport_for(&address)?;

    let outcome = vault
        .store
        .sync(&transport, &mut vault.manager, &vault.password, &mut OsRng)?;
    vault.save()?;

    match outcome {
        SyncOutcome::Skipped => println!("Remote unreachable, nothing synced."),
        SyncOutcome::UpToDate => println!("Up to date with {address}"),
        SyncOutcome::Pushed => println!("Pushed {} domain(s) to {address}", vault.store.len()),
        SyncOutcome::PushRejected => bail!("remote {address} rejected the update"),
    }
    Ok(())
}

// ── `keyward config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &KeywardConfig, config_path: &Path, found: bool) -> Result<()> {
    if found {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
