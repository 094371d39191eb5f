//! Thin traits over `mio`/`std` TCP types so the reactor can be driven by
//! either in tests.

pub mod tcp_listener;
pub mod tcp_stream;

pub use tcp_listener::TcpListener;
pub use tcp_stream::TcpStream;
