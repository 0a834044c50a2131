use clap::{Parser, Subcommand, Args};

#[derive(Parser)]
#[command(name = "openvas-agent", version, about = "OpenVAS scan orchestration and reporting agent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// YAML configuration file (built-in defaults when omitted)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API and the telemetry loops
    Serve(ServeArgs),
    /// Launch a scan against a single target
    Scan(ScanArgs),
    /// Block until a task reports Done
    Wait(WaitArgs),
    /// Show engine readiness and the active scan count
    Status,
    /// Print normalized findings as JSON
    Results(ResultsArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

#[derive(Args, Clone)]
pub struct ServeArgs {
    /// Listen port
    #[arg(long, default_value = "8011")]
    pub port: u16,

    /// Listen address
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,
}

#[derive(Args, Clone)]
pub struct ScanArgs {
    /// Host address, CIDR block or hostname
    #[arg(short, long)]
    pub target: String,

    /// Scan configuration id (defaults to "Full and fast")
    #[arg(long)]
    pub config_id: Option<String>,

    /// Block and poll until the task is done
    #[arg(long)]
    pub wait: bool,
}

#[derive(Args, Clone)]
pub struct WaitArgs {
    /// Task id returned by `scan`
    pub task_id: String,
}

#[derive(Args, Clone)]
pub struct ResultsArgs {
    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Config file to validate
    pub config: String,
}
