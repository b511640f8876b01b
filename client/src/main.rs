use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};

use client::network::{Client, InputSource};
use shared::constants::SERVER_PORT;
use shared::packet::Input;

/// No platform input sampling is wired into the core; this stands in for it.
struct NoInput;

impl InputSource for NoInput {
    fn sample(&mut self) -> Input {
        Input::default()
    }
}

/// Connects to the cubes physics sandbox server.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server address, as "host:port". Defaults to localhost on the well-known server port.
    #[arg(default_value_t = format!("127.0.0.1:{SERVER_PORT}"))]
    server: String,
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let quit = Arc::new(AtomicBool::new(false));
    if let Err(e) = signal_hook::flag::register(signal_hook::consts::SIGINT, quit.clone()) {
        error!("failed to install SIGINT handler: {e}");
        std::process::exit(1);
    }

    let mut client = match Client::connect(&args.server) {
        Ok(client) => client,
        Err(e) => {
            error!("failed to open UDP socket: {e}");
            std::process::exit(1);
        }
    };

    info!("connecting to {}", args.server);
    let mut inputs = NoInput;
    if let Err(e) = client.run(&quit, &mut inputs) {
        error!("client loop exited with error: {e}");
        std::process::exit(1);
    }

    info!("final state: {:?}", client.state());
}
