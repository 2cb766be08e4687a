pub mod anthropic;
pub mod did;
pub mod google;
pub mod openai;
pub mod replicate;

pub use anthropic::AnthropicProvider;
pub use did::DidProvider;
pub use google::GoogleAiProvider;
pub use openai::OpenAiProvider;
pub use replicate::ReplicateProvider;
