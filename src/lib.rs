//! Hostname resolution: a unicast DNS client plus an mDNS client and responder.
//!
//! The core is [`resolver::Resolver`], a sans-I/O engine holding a fixed-size cache of
//! resolutions. It schedules queries with linear backoff, parses responses, answers mDNS
//! requests for the local hostname and defends that hostname against conflicts.
//! [`socket::SyncResolver`] drives it over a real UDP socket.

#![forbid(unaligned_references)]

mod hex;
mod num;

pub mod cache;
pub mod config;
pub mod packet;
pub mod resolver;
pub mod socket;

pub use packet::Error;

/// Size of unicast DNS message buffers.
///
/// Unicast DNS messages are limited to 512 Bytes.
pub const DNS_BUFFER_SIZE: usize = 512;

/// Size of multicast DNS message buffers.
///
/// DNS messages are limited to 512 Bytes, but mDNS works entirely within a local network, so it can
/// use larger messages.
///
/// This constant is the size of packet receive buffers and does not have to accomodate IP and UDP
/// headers. It still does, because I cannot be bothered.
pub const MDNS_BUFFER_SIZE: usize = 1500;

/// Port of unicast DNS servers.
pub const DNS_PORT: u16 = 53;

/// Port mDNS queries and announcements are multicast on.
pub const MDNS_PORT: u16 = 5353;

/// Secondary port for one-shot mDNS queriers expecting a unicast reply.
///
/// Requests from any port other than [`MDNS_PORT`] are answered directly to the sender.
pub const MDNS_RESPONDER_PORT: u16 = 5354;
