pub mod code_synthesis;
pub mod export;
pub mod generation;
pub mod llm_output;
pub mod locator_extraction;
pub mod pipeline;
pub mod prompts;
pub mod retry;
pub mod test_case_synthesis;
pub mod validation;
