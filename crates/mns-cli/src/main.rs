use mns_cli::{run_cli, CliError};
use tracing::error;

fn main() {
    if let Err(e) = run_cli() {
        match e {
            // No subscriber to report through
            CliError::Logging { .. } => eprintln!("error: {}", e),
            _ => error!(error = %e, "Command failed"),
        }

        std::process::exit(e.exit_code());
    }
}
