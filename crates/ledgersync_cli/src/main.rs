//! ledgersync CLI
//!
//! Command-line tools for inspecting sync traffic and local mirrors.
//!
//! # Commands
//!
//! - `decode` - Decode a captured sync request or response body
//! - `derive-key` - Derive a file key from a password and salt
//! - `inspect` - Show the cursor and row counts of a mirror journal
//! - `timestamp` - Issue a logical timestamp
//! - `encode-value` / `decode-value` - Convert between JSON scalars and tagged values

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// ledgersync command-line tools.
#[derive(Parser)]
#[command(name = "ledgersync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Which message a captured body holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BodyKind {
    /// A client request
    Request,
    /// A server response
    Response,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a captured sync body
    Decode {
        /// File holding the raw body, or `-` for stdin
        input: PathBuf,

        /// Whether the body is a request or a response
        #[arg(short, long, value_enum, default_value = "response")]
        kind: BodyKind,

        /// File password, to decrypt encrypted envelopes
        #[arg(long, requires_all = ["salt", "key_id"])]
        password: Option<String>,

        /// Key salt (base64 text, as served by the key endpoint)
        #[arg(long)]
        salt: Option<String>,

        /// Key id
        #[arg(long)]
        key_id: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Derive a file key from a password
    DeriveKey {
        /// The password
        #[arg(long)]
        password: String,

        /// Salt; a fresh one is generated when omitted
        #[arg(long)]
        salt: Option<String>,
    },

    /// Show the state of a mirror journal
    Inspect {
        /// Path of the journal file
        path: PathBuf,

        /// Rewrite the journal as a single snapshot afterwards
        #[arg(long)]
        compact: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Issue a logical timestamp
    Timestamp {
        /// Issue the zero timestamp instead of the current time
        #[arg(long)]
        zero: bool,

        /// Node id; generated when omitted
        #[arg(long)]
        client_id: Option<String>,
    },

    /// Encode a JSON scalar as a tagged wire value
    EncodeValue {
        /// JSON text, e.g. `"Checking"`, `42`, `true` or `null`
        json: String,
    },

    /// Decode a tagged wire value to JSON
    DecodeValue {
        /// Tagged value, e.g. `S:Checking`
        value: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Decode {
            input,
            kind,
            password,
            salt,
            key_id,
            format,
        } => {
            let key = match (password, salt, key_id) {
                (Some(password), Some(salt), Some(key_id)) => Some(commands::decode::KeyArgs {
                    password,
                    salt,
                    key_id,
                }),
                _ => None,
            };
            commands::decode::run(&input, kind, key.as_ref(), format)?;
        }
        Commands::DeriveKey { password, salt } => {
            commands::derive_key::run(&password, salt.as_deref())?;
        }
        Commands::Inspect {
            path,
            compact,
            format,
        } => {
            commands::inspect::run(&path, compact, format)?;
        }
        Commands::Timestamp { zero, client_id } => {
            commands::timestamp::run(zero, client_id.as_deref())?;
        }
        Commands::EncodeValue { json } => {
            println!("{}", commands::value::encode(&json)?);
        }
        Commands::DecodeValue { value } => {
            println!("{}", commands::value::decode(&value)?);
        }
    }

    Ok(())
}
