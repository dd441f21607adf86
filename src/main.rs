use anyhow::Result;
use clap::error::ErrorKind;
use clap::Parser;

use minroot::cli::Cli;
use minroot::config::Config;
use minroot::engine::Engine;
use minroot::logging;

fn main() -> Result<()> {
    let cli = Cli::try_parse().unwrap_or_else(|e| {
        let code = match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
            _ => 1,
        };
        let _ = e.print();
        std::process::exit(code);
    });

    logging::init(cli.quiet, cli.verbose, cli.debug, cli.logfile.as_deref())?;

    let config = Config::from_cli(&cli)?;
    Engine::new(config)?.run()
}
