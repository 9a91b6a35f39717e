//! # Transport Layer
//!
//! Byte channels a service link runs over.
//!
//! ## Components
//! - **Channel**: the read/write/close contract a link drives
//! - **StreamChannel**: `Channel` over any tokio byte stream
//! - **TCP**: accept loop spawning one link per connection

pub mod channel;
pub mod stream;
pub mod tcp;

pub use channel::Channel;
pub use stream::StreamChannel;
