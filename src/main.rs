use alsavo_pro_tools::commands;
use clap::Parser as _;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

const LOG_FILTER_VARIABLE: &str = "ALSAVO_PRO_TOOLS_LOG";

#[derive(clap::Parser)]
#[clap(version, about, author)]
enum Commands {
    Registers(commands::registers::Args),
    Read(commands::read::Args),
}

fn end<E: std::error::Error>(r: Result<(), E>) {
    std::process::exit(match r {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            let mut cause = e.source();
            while let Some(e) = cause {
                eprintln!("  because: {e}");
                cause = e.source();
            }
            1
        }
    });
}

fn main() {
    let filter = match std::env::var(LOG_FILTER_VARIABLE) {
        Ok(description) => description.parse::<Targets>(),
        Err(_) => Ok(Targets::new().with_default(LevelFilter::WARN)),
    };
    let filter = match filter {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("warning: ignoring the invalid {LOG_FILTER_VARIABLE} filter: {e}");
            Targets::new().with_default(LevelFilter::WARN)
        }
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
    match Commands::parse() {
        Commands::Registers(args) => end(commands::registers::run(args)),
        Commands::Read(args) => end(commands::read::run(args)),
    }
}
