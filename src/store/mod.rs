//! Monitor state storage: model types, compaction codec, and the
//! key-value backend the compacted blob lives in.

mod codec;
mod kv;
mod models;

pub use codec::*;
pub use kv::*;
pub use models::*;
