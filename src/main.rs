use anyhow::Result;
use std::process;
use log::error;

use rhino_plugins::{app, cli, logging};

fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("Application panicked: {:?}", panic_info);
        eprintln!("Panic: {:?}", panic_info);
        process::exit(101);
    }));

    if let Err(e) = run() {
        error!("Application error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = cli::args::parse_args();

    cli::args::validate_args(&args)?;

    let config_manager = app::load_configuration(&args)?;

    let log_config = app::configure_logging(&args, &config_manager)?;
    logging::init_logger(log_config)?;

    let colours = app::create_colour_manager(&args, &config_manager);
    let service = app::create_registry_service(&args, &config_manager)?;

    // Single current-thread runtime; parsing work goes to the rayon pool
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let text = runtime.block_on(app::execute_command(&service, &args.command, &colours))?;
    if !text.is_empty() {
        println!("{}", text.trim_end());
    }

    Ok(())
}
