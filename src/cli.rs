use clap::Parser;

/// Family finance API server.
#[derive(Parser, Debug)]
#[command(name = "family-finance", version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "CONFIG_PATH")]
    pub config: Option<String>,

    /// Apply migrations and exit
    #[arg(long)]
    pub migrate_only: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
