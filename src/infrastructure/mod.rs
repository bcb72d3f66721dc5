pub mod aggregate_pool;
pub mod async_service;
pub mod batching_pool;
pub mod cache;
pub mod config;
pub mod html;
pub mod inference_backend;
pub mod response_builder;
pub mod splitter;
pub mod text_processor;
pub mod threadsafe_pool;
pub mod tokenizer;
pub mod translation_model;

pub use aggregate_pool::*;
pub use async_service::*;
pub use batching_pool::*;
pub use cache::*;
pub use config::*;
pub use html::*;
pub use inference_backend::*;
pub use splitter::*;
pub use text_processor::*;
pub use threadsafe_pool::*;
pub use tokenizer::*;
pub use translation_model::*;
