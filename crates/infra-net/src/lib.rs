// pixagent Infrastructure - Network Adapters
// Implements: AssignmentSource over TCP

pub mod image_sink;
pub mod receiver;
pub mod tcp_source;

pub use image_sink::ImageSink;
pub use receiver::{receive_assignment, AddressFraming};
pub use tcp_source::{TcpAssignmentSource, TcpChannel};
