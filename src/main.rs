//! # Admin Resilience CLI (`adminres`)
//!
//! The `adminres` binary exposes the normalization layer for scripting and
//! debugging: extract collections from saved responses, inspect asset
//! fallback chains, evaluate role records, and fetch live collections through
//! the coalescing client.
//!
//! ## Usage
//!
//! ```bash
//! adminres --config ./config/adminres.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `adminres extract <file>` | Print the record collection found in a saved response |
//! | `adminres assets <file>` | Print media references found in a saved response |
//! | `adminres candidates <ref>` | Print the candidate URLs for an asset reference |
//! | `adminres resolve <ref>` | Probe candidates and print the first that loads |
//! | `adminres access --role <file> <module> <action>` | Print `allow` or `deny` |
//! | `adminres fetch <endpoint>` | Fetch and extract a collection from the backend |
//! | `adminres completions <shell>` | Generate shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # What does the rentals endpoint actually return?
//! curl -s https://api.example.com/rentals | adminres extract -
//!
//! # Where might this thumbnail live?
//! adminres candidates "beach-house.jpg"
//!
//! # Can this role edit campaigns?
//! adminres access --role ./role.json campaign edit
//!
//! # Fetch page 2 of properties
//! adminres fetch /properties --param page=2
//! ```

use admin_resilience::{access, assets_cmd, config, fetch, inspect};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Admin Resilience CLI: tolerant normalization of an inconsistent REST
/// backend.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Offline commands fall back to built-in defaults when the file is
/// missing. See `config/adminres.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "adminres",
    about = "Admin Resilience: tolerant response normalization and resource resolution",
    version,
    long_about = "Admin Resilience normalizes inconsistent REST responses into record \
    collections, coalesces duplicate requests, resolves asset references through an ordered \
    fallback chain, and evaluates role permissions across structured and legacy schemas."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/adminres.toml`.
    #[arg(long, global = true, default_value = "./config/adminres.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Extract the record collection from a saved JSON response.
    ///
    /// Prints the records as a JSON array, or `not found` when the
    /// response holds no collection within the depth budget.
    Extract {
        /// JSON file to read, or `-` for stdin.
        input: PathBuf,
    },

    /// List media references found anywhere in a saved JSON response.
    Assets {
        /// JSON file to read, or `-` for stdin.
        input: PathBuf,

        /// Maximum number of references to print.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the ordered candidate URLs for an asset reference.
    Candidates {
        /// Absolute URL, root-relative path, or bare filename.
        reference: String,
    },

    /// Probe candidate URLs over HTTP and print the first that loads.
    ///
    /// Prints `placeholder` when every candidate fails.
    Resolve {
        /// Absolute URL, root-relative path, or bare filename.
        reference: String,
    },

    /// Evaluate a role record against a module and action.
    Access {
        /// JSON file holding the role record, or `-` for stdin.
        #[arg(long)]
        role: PathBuf,

        /// Module name (aliases such as `organizations` are resolved).
        module: String,

        /// One of `view`, `add` (or `create`), `edit`, `delete`.
        action: Option<String>,

        /// List every granted action instead of checking one.
        #[arg(long)]
        all: bool,
    },

    /// Fetch a collection from the backend through the coalescing client.
    Fetch {
        /// Endpoint path relative to `api.base_url`.
        endpoint: String,

        /// Query parameter (repeatable).
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,

        /// Print media references instead of records.
        #[arg(long)]
        assets: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Target shell.
        shell: clap_complete::Shell,
    },
}

/// Parse a `key=value` pair for `--param` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "adminres", &mut std::io::stdout());
        return Ok(());
    }

    // Only `fetch` needs the backend; everything else can run on defaults.
    let cfg = match &cli.command {
        Commands::Fetch { .. } => config::load_config(&cli.config)?,
        _ if cli.config.exists() => config::load_config(&cli.config)?,
        _ => config::Config::minimal(),
    };

    match cli.command {
        Commands::Extract { input } => {
            inspect::run_extract(&cfg, &input)?;
        }
        Commands::Assets { input, limit } => {
            inspect::run_assets(&cfg, &input, limit)?;
        }
        Commands::Candidates { reference } => {
            assets_cmd::run_candidates(&cfg, &reference)?;
        }
        Commands::Resolve { reference } => {
            assets_cmd::run_resolve(&cfg, &reference).await?;
        }
        Commands::Access {
            role,
            module,
            action,
            all,
        } => {
            access::run_access(&cfg, &role, &module, action.as_deref(), all)?;
        }
        Commands::Fetch {
            endpoint,
            params,
            assets,
        } => {
            fetch::run_fetch(&cfg, &endpoint, params, assets).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
