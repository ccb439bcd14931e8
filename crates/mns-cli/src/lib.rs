//! # MNS CLI
//!
//! Operator tooling for MNS envelopes:
//! - Compute the signature the client would attach to a trace id
//! - Build an encoded message body by hand
//! - Decode a message body and check its signature
//! - Validate and inspect the resolved client configuration
//!
//! The signing secret comes from `--secret` or from the client
//! configuration (`config/mns.*`, `--config`, or `MNS__ACCESS_KEY_SECRET`).

use clap::{Parser, Subcommand};
use mns_runtime::{
    ConfigurationError, Envelope, MnsConfig, SerializationError, SharedSecret, Signer,
};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// MNS CLI - sign, encode and inspect message envelopes
#[derive(Parser)]
#[command(name = "mns")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sign, encode and inspect MNS message envelopes")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MNS_CONFIG_FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Signing secret, overriding the configured one
    #[arg(long, global = true)]
    pub secret: Option<String>,

    /// Logging level
    #[arg(short, long, default_value = "warn", global = true)]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print the signature of a payload (normally a trace id)
    Sign {
        /// Payload to sign
        payload: String,
    },

    /// Build an encoded message body
    Encode {
        /// Envelope content; parsed as JSON when possible, otherwise used as text
        #[arg(long)]
        content: String,

        /// Envelope tag
        #[arg(short, long, default_value = "")]
        tag: String,

        /// Trace id; generated when omitted
        #[arg(long)]
        trace_id: Option<String>,

        /// Signature; computed from the secret when omitted
        #[arg(long)]
        sign: Option<String>,
    },

    /// Decode a message body and print the envelope as JSON
    Decode {
        /// Encoded message body
        body: String,

        /// Fail unless the signature matches the trace id
        #[arg(long)]
        verify: bool,
    },

    /// Validate configuration
    Config {
        /// Show resolved configuration
        #[arg(short, long)]
        show: bool,
    },
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("No signing secret available; pass --secret or set MNS__ACCESS_KEY_SECRET")]
    MissingSecret,

    #[error("Invalid message body: {0}")]
    InvalidBody(#[from] SerializationError),

    #[error("Signature does not match trace id '{trace_id}'")]
    SignatureMismatch { trace_id: String },

    #[error("Logging initialization failed: {message}")]
    Logging { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::MissingSecret => 2,
            Self::InvalidBody(_) => 3,
            Self::SignatureMismatch { .. } => 4,
            Self::Logging { .. } => 5,
            Self::Io(_) => 6,
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Parse arguments, set up logging and run the command against stdout
pub fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(cli, &mut out)
}

/// Run a parsed command, writing its output to `out`
pub fn execute(cli: Cli, out: &mut dyn Write) -> Result<(), CliError> {
    match cli.command {
        Commands::Sign { ref payload } => {
            let signer = signer(&cli)?;
            writeln!(out, "{}", signer.sign(payload))?;
        }
        Commands::Encode {
            ref content,
            ref tag,
            ref trace_id,
            ref sign,
        } => {
            let body = encode_body(&cli, content, tag, trace_id.as_deref(), sign.as_deref())?;
            writeln!(out, "{}", body)?;
        }
        Commands::Decode { ref body, verify } => {
            let envelope = Envelope::decode(body.trim())?;

            if verify {
                let signer = signer(&cli)?;
                if !envelope.verify(&signer) {
                    return Err(CliError::SignatureMismatch {
                        trace_id: envelope.trace_id,
                    });
                }
                info!(trace_id = %envelope.trace_id, "Signature verified");
            }

            let rendered = serde_json::to_string_pretty(&envelope)
                .map_err(SerializationError::from)?;
            writeln!(out, "{}", rendered)?;
        }
        Commands::Config { show } => {
            let config = MnsConfig::load(cli.config.as_deref())?;
            config.validate()?;

            if show {
                writeln!(out, "endpoint: {}", config.endpoint)?;
                writeln!(out, "access_key_id: {}", config.access_key_id)?;
                writeln!(
                    out,
                    "access_key_secret: <REDACTED> ({} characters)",
                    config.access_key_secret.len()
                )?;
            } else {
                writeln!(out, "Configuration is valid")?;
            }
        }
    }

    Ok(())
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Initialize logging based on CLI arguments.
///
/// `RUST_LOG` wins over `--log-level` when set.
fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "mns={level},mns_cli={level},mns_runtime={level}",
            level = cli.log_level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    let result = if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| CliError::Logging {
        message: e.to_string(),
    })
}

/// Secret from `--secret`, falling back to the layered configuration
fn resolve_secret(cli: &Cli) -> Result<SharedSecret, CliError> {
    if let Some(secret) = cli.secret.as_deref().filter(|s| !s.is_empty()) {
        debug!("Using secret from command line");
        return Ok(SharedSecret::new(secret));
    }

    let config = MnsConfig::load(cli.config.as_deref())?;
    if config.access_key_secret.is_empty() {
        return Err(CliError::MissingSecret);
    }

    debug!("Using secret from configuration");
    Ok(config.access_key_secret)
}

fn signer(cli: &Cli) -> Result<Signer, CliError> {
    Ok(Signer::new(resolve_secret(cli)?))
}

fn encode_body(
    cli: &Cli,
    content: &str,
    tag: &str,
    trace_id: Option<&str>,
    sign: Option<&str>,
) -> Result<String, CliError> {
    let content = serde_json::from_str(content)
        .unwrap_or_else(|_| serde_json::Value::String(content.to_string()));

    let mut envelope = Envelope::new(content).with_tag(tag);
    if let Some(trace_id) = trace_id {
        envelope = envelope.with_trace_id(trace_id);
    }

    // A caller-supplied signature needs no secret
    let signer = match sign.filter(|s| !s.is_empty()) {
        Some(sign) => {
            envelope = envelope.with_sign(sign);
            Signer::new(SharedSecret::default())
        }
        None => signer(cli)?,
    };
    envelope.seal(&signer);

    Ok(envelope.encode()?)
}
