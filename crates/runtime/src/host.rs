//! Localhost port probes.

use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

/// Returns `true` when `port` can be bound on localhost.
pub fn port_available(port: u16) -> bool {
	TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
}

/// Returns `true` when something accepts TCP connections on `port` within `timeout`.
pub fn port_listening(port: u16, timeout: Duration) -> bool {
	let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
	TcpStream::connect_timeout(&addr, timeout).is_ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bound_port_is_reported_unavailable() {
		let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
		let port = listener.local_addr().unwrap().port();
		assert!(!port_available(port));
		assert!(port_listening(port, Duration::from_millis(200)));
		drop(listener);
		assert!(port_available(port));
	}

	#[test]
	fn closed_port_is_not_listening() {
		let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
		let port = listener.local_addr().unwrap().port();
		drop(listener);
		assert!(!port_listening(port, Duration::from_millis(100)));
	}
}
