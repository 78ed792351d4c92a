//! Concrete links implementing [`Sender`](crate::sender::Sender).

pub mod udp;

pub use udp::UdpLink;
