pub mod artifact_store;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod llm_clients;
pub mod storage;
pub mod ticket_source;
