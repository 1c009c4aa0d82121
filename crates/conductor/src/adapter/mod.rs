//! The streaming provider adapter: normalizes a provider's raw event
//! stream into the `start → {block}_start/delta/end → done/error` sequence
//! the rest of the runtime consumes, maintaining a running `partial`
//! assistant message along the way.

mod decode;
mod raw;

pub use decode::{decode_stream, NormalizedEvent};
pub use raw::{BlockDelta, BlockStart, RawProviderEvent};
