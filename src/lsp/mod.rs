pub mod transport;

pub use transport::{LspEvent, LspTransport};
