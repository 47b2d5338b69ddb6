pub mod context;
pub mod registry;
pub mod responder;
pub mod session;
pub mod turn;

pub type OpenAIClientType = async_openai::Client<async_openai::config::OpenAIConfig>;
