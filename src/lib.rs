//! Client for the Bevy Remote Protocol.
//!
//! ARCHITECTURE
//! ============
//! ```text
//! Session (protocol)      typed method catalogue
//!   └─ HttpTransport      one POST per call, streaming bodies for +watch
//!        ├─ frame         JSON-RPC envelopes, stream frame cutting
//!        └─ Translator    internal <-> host type-path spellings
//! value                   path navigation over serde_json::Value
//! ```
//!
//! Component data is schema-less and stays `serde_json::Value` end to end.
//! Type paths are always in internal (newest) spelling on this side of the
//! transport; the configured [`ServerVersion`] decides what goes on the wire.

pub mod config;
pub mod frame;
pub mod protocol;
pub mod translate;
pub mod transport;
pub mod types;
pub mod value;

#[cfg(test)]
mod test_helpers;

pub use config::ClientConfig;
pub use frame::RpcError;
pub use protocol::{QueryParams, Session};
pub use translate::{ServerVersion, Translator};
pub use transport::{HttpTransport, StreamDecodePolicy};
pub use types::{ClientError, EntityId, ErrorCode, Response, TypePath, short_type_name};
pub use value::{PathSegment, SharedValue, ValuePath};
