//! Curates knowledge about a topic through a simulated writer/expert
//! dialogue, then turns what was learned into an outline and an article.

pub mod config;
pub mod engine;
pub mod error;
pub mod model;

pub use config::CuratorConfig;
pub use engine::Engine;
