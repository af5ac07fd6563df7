//! Model loading and the shared model handle
//!
//! - [`resolve`]: locate the snapshot files (explicit path, local caches, registry)
//! - [`device`]: pick the compute device and precision
//! - [`codec`]: tokenizer and candle model adapters
//! - [`loader`]: assemble a [`ModelEngine`] from a [`ServiceConfig`](crate::config::ServiceConfig)
//! - [`engine`]: the loaded model handle used by every request

pub mod codec;
pub mod device;
pub mod engine;
pub mod loader;
pub mod resolve;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use codec::{CandleQwen2, TokenizerCodec};
pub use device::Placement;
pub use engine::{EngineInfo, ModelEngine};
pub use loader::ModelLoader;
pub use resolve::{
    default_chain, ExplicitPathResolver, HubResolver, LocalSnapshotResolver, ModelFiles,
    ModelResolver, ResolverChain,
};

use crate::error::SomniaError;

/// Convert a candle error raised during loading
pub(crate) fn load_err(context: &str) -> impl FnOnce(candle_core::Error) -> SomniaError + '_ {
    move |e| SomniaError::ModelLoad {
        reason: format!("{context}: {e}"),
    }
}

/// Convert a candle error raised during a forward pass
pub(crate) fn inference_err(e: candle_core::Error) -> SomniaError {
    SomniaError::InferenceError(e.to_string())
}
