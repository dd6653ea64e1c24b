use std::io;

use hostresolv::{config::ResolverConfig, socket::SyncResolver};
use log::LevelFilter;

fn main() -> io::Result<()> {
    // This one requires passing the hostname to resolve as an argument (there's
    // no default we could use).
    let hostname = std::env::args()
        .nth(1)
        .expect("expected hostname to resolve");

    env_logger::Builder::new()
        .filter_module("hostresolv", LevelFilter::Trace)
        .filter_module(env!("CARGO_CRATE_NAME"), LevelFilter::Trace)
        .init();

    let mut client = SyncResolver::new(ResolverConfig::default().with_responder(false))?;
    match client.resolve(&hostname)? {
        Some(ip) => println!("Received IP: {}", ip),
        None => println!("{} could not be resolved", hostname),
    }
    Ok(())
}
