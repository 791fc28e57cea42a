//! Generation engine contract
//!
//! A provider turns a [`ChatRequest`](canopy_core::ChatRequest) into a finite
//! stream of [`ChatChunk`](canopy_core::ChatChunk) events. The relay only
//! depends on [`LLMProvider`]; [`OpenAiProvider`] is the stock implementation.

pub mod error;
pub mod provider;
pub mod providers;
pub mod transformer;

pub use error::{ConversionError, LLMError, Result};
pub use provider::{LLMProvider, LLMStream, ProviderConfig};
pub use providers::OpenAiProvider;
pub use transformer::OpenAiTransformer;
