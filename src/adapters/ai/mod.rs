//! AI Adapters.
//!
//! ## Available Adapters
//!
//! - `AnthropicProvider` - Anthropic Messages API (AIProvider)
//! - `MockAIProvider` - Configurable mock provider for testing
//! - `LlmAiGateway` - AiGateway built on any AIProvider
//! - `ScriptedAiGateway` - Deterministic gateway for pipeline tests

mod anthropic_provider;
mod llm_gateway;
mod mock_provider;
mod scripted_gateway;

pub use anthropic_provider::{AnthropicConfig, AnthropicProvider};
pub use llm_gateway::{LlmAiGateway, LlmGatewayConfig};
pub use mock_provider::{MockAIProvider, MockError, MockResponse};
pub use scripted_gateway::{GatewayCall, ScriptedAiGateway};
