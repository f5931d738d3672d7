use render_core::{config, logging};

mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    if logging::init_logging().is_err() {
        logging::init_logging_stderr();
    }

    let render_config = match config::load_or_init() {
        Ok(c) => c,
        Err(err) => {
            eprintln!("render-core: configuration error: {:#}", err);
            std::process::exit(2);
        }
    };

    match CliCommand::run_from_args(render_config).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("render-core: {:#}", err);
            std::process::exit(1);
        }
    }
}
