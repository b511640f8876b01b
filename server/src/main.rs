use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};

use server::network::Server;
use server::simulator::StubSimulator;
use shared::constants::SERVER_PORT;

/// Authoritative server for the cubes physics sandbox.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// UDP port to listen on.
    #[arg(short, long, default_value_t = SERVER_PORT)]
    port: u16,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let quit = Arc::new(AtomicBool::new(false));
    if let Err(e) = signal_hook::flag::register(signal_hook::consts::SIGINT, quit.clone()) {
        error!("failed to install SIGINT handler: {e}");
        std::process::exit(1);
    }

    let mut server = match Server::bind(args.port, Box::new(StubSimulator::default())) {
        Ok(server) => server,
        Err(e) => {
            error!("failed to bind UDP socket on port {}: {e}", args.port);
            std::process::exit(1);
        }
    };

    info!("server started on port {}", args.port);
    if let Err(e) = server.run(&quit) {
        error!("server loop exited with error: {e}");
        std::process::exit(1);
    }

    info!("server shut down cleanly");
}
