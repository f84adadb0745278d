pub mod fact;
pub mod knowledge_store;
pub mod message;
pub mod llm_decode;
pub mod run_artifacts;
