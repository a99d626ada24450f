//! CLI definitions using clap.

use std::path::PathBuf;

use clap::Parser;

/// Stepline - server-driven step pipelines
#[derive(Parser, Debug)]
#[command(name = "stepline")]
#[command(version)]
#[command(about = "Serve linear step pipelines that advance the client one step at a time")]
#[command(
    long_about = "Stepline serves an ordered sequence of steps per pipeline id. Every answered step tells the client which step to fetch next; reverting clears later answers; finalizing locks the whole pipeline."
)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind, overrides the configuration and STEPLINE_BIND
    #[arg(short, long)]
    pub bind: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from(["stepline", "--config", "stepline.toml", "-b", "0.0.0.0:9000"]);
        assert!(cli.as_ref().is_ok_and(|c| c.config == Some(PathBuf::from("stepline.toml"))));
        assert!(cli.is_ok_and(|c| c.bind.as_deref() == Some("0.0.0.0:9000")));
    }

    #[test]
    fn test_flags_are_optional() {
        let cli = Cli::try_parse_from(["stepline"]);
        assert!(cli.is_ok_and(|c| c.config.is_none() && c.bind.is_none()));
    }
}
