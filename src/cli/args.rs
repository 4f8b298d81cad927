use clap::Parser;
use std::path::PathBuf;

/// Replay credit operations against a fresh engine
#[derive(Parser, Debug)]
#[command(name = "tutorbridge-engine")]
#[command(about = "Replay lead-credit operations and report final balances", long_about = None)]
pub struct CliArgs {
    /// Input CSV file of operations (op,tutor,lead,amount,order)
    #[arg(value_name = "INPUT", help = "Path to the ops CSV file")]
    pub input_file: PathBuf,

    /// Engine configuration file
    #[arg(
        long = "config",
        value_name = "FILE",
        help = "TOML configuration file (defaults apply when omitted)"
    )]
    pub config: Option<PathBuf>,
}
