//! LLM Provider implementations for Roleplayer.
//!
//! All providers implement the `roleplayer_core::Provider` trait.

pub mod meta_template;
pub mod openai_compat;

pub use meta_template::MetaTemplate;
pub use openai_compat::OpenAiCompatProvider;
