//! Network infrastructure: implements `PortProbe` using `spawn_blocking`.

use std::net::{Ipv4Addr, TcpListener};

use crate::application::ports::PortProbe;

/// Bind test on `0.0.0.0`, the address published container ports use.
pub struct TcpBindProbe;

impl PortProbe for TcpBindProbe {
    async fn is_free(&self, port: u16) -> bool {
        tokio::task::spawn_blocking(move || {
            // Dropping the listener releases the port immediately.
            TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
        })
        .await
        .unwrap_or(false)
    }
}
