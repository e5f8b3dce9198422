pub mod documents;
pub mod llm;
pub mod pipeline;
pub mod queue;
pub mod tools;
