//! Client/server classification of the hosts in a capture.
//! Collects per-packet evidence for every source address, settles each host on a role,
//! and can summarise the server side as CIDR blocks for router-style replay.
pub mod cidr;
pub mod config;
pub mod containers;
pub mod core;
pub mod dispatch;
pub mod packet;
pub mod store;
pub mod utils;
