pub mod engine;
pub mod agents;

pub mod prompt_builder;
pub mod llm_client;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{ArticlePolisher, Engine, IdentityPolisher, Retriever, Stage};
