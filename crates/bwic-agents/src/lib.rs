pub mod claude_cli;
pub mod context;
pub mod demo;
pub mod error;
pub mod formatter;
pub mod gateway;
pub mod gemini;
mod http;
pub mod openai;
pub mod parser;
pub mod pipeline;
pub mod prompts;
pub mod registry;

pub mod test_support;

pub use claude_cli::ClaudeCliGateway;
pub use context::{AnalysisContext, ContextBuilder, Urgency};
pub use error::{AgentError, ErrorKind};
pub use formatter::format_analysis;
pub use gateway::{invoke_with_retry, ModelGateway, RetryPolicy};
pub use gemini::GeminiGateway;
pub use openai::OpenAiGateway;
pub use parser::{parse, ParseOutcome};
pub use pipeline::AnalysisPipeline;
pub use prompts::{compile, ModelRequest};
pub use registry::{resolve_model, ModelSpec, Provider};
