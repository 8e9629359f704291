//! i6p-core — identity, cryptographic primitives, the message-key ratchet,
//! the forward-secret secure channel, and the control-stream protocol codec.
//! All other I6P crates depend on this one.
//!
//! Nothing here touches the network. The frame codec reads and writes
//! arbitrary async byte streams; transports live in the `i6p` crate.

pub mod aead;
pub mod channel;
pub mod frame;
pub mod hello;
pub mod identity;
pub mod kx;
pub mod ratchet;

pub use aead::{Aead, CryptoError};
pub use channel::{ChannelError, Role, SecureChannel};
pub use frame::{Frame, FrameError, MessageType};
pub use hello::{Hello, HelloError};
pub use identity::{IdentityError, KeyPair, PeerId};
