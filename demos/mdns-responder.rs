use std::{env, io, net::IpAddr, process, time::Duration};

use hostresolv::{config::ResolverConfig, resolver::ResolverEvent, socket::SyncResolver};
use log::LevelFilter;

fn main() -> io::Result<()> {
    env_logger::Builder::new()
        .filter_module(env!("CARGO_PKG_NAME"), LevelFilter::Debug)
        .filter_module(env!("CARGO_CRATE_NAME"), LevelFilter::Trace)
        .init();

    let args = env::args().skip(1).collect::<Vec<_>>();
    let hostname = match &*args {
        [] => "hostresolv-demo".to_string(),
        [name] => name.clone(),
        _ => {
            eprintln!("usage: mdns-responder [hostname]");
            process::exit(1);
        }
    };

    let local_addrs = if_addrs::get_if_addrs()?
        .into_iter()
        .map(|interface| interface.ip())
        .filter(|ip| match ip {
            IpAddr::V4(ip) => ip.is_private(),
            IpAddr::V6(_) => false,
        })
        .collect::<Vec<_>>();
    if local_addrs.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no local network interface with private IPv4 address found",
        ));
    }
    log::info!("announcing {}.local at {:?}", hostname, local_addrs);

    let config = ResolverConfig::default()
        .with_hostname(hostname)
        .with_local_addrs(local_addrs);
    let mut responder = SyncResolver::new(config)?;
    loop {
        responder.poll(Duration::from_secs(1))?;
        while let Some(event) = responder.poll_event() {
            match event {
                ResolverEvent::HostnameReady(name) => println!("now answering for {}.local", name),
                ResolverEvent::HostnameConflict { previous, renamed } => {
                    println!("{}.local is taken, trying {}.local", previous, renamed)
                }
                ResolverEvent::Found { name, addr } => println!("{}: {:?}", name, addr),
            }
        }
    }
}
