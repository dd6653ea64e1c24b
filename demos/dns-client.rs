use std::{io, net::UdpSocket};

use hostresolv::{config::ResolverConfig, socket::SyncResolver};
use log::LevelFilter;

fn main() -> io::Result<()> {
    env_logger::Builder::new()
        .filter_module("hostresolv", LevelFilter::Trace)
        .filter_module(env!("CARGO_CRATE_NAME"), LevelFilter::Trace)
        .init();

    let hostname = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "example.com".to_string());

    let config = ResolverConfig::default()
        .with_mdns(false)
        .with_dns_server("8.8.8.8".parse().unwrap());
    let mut client = SyncResolver::with_socket(config, UdpSocket::bind("0.0.0.0:0")?)?;
    match client.resolve(&hostname)? {
        Some(ip) => println!("Received IP: {}", ip),
        None => println!("{} could not be resolved", hostname),
    }
    Ok(())
}
