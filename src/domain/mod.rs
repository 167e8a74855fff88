pub mod cache_key;
pub mod code_bundle;
pub mod error;
pub mod llm_config;
pub mod locator;
pub mod pipeline;
pub mod stage;
pub mod stage_profile;
pub mod test_case;
pub mod ticket;
pub mod verdict;
