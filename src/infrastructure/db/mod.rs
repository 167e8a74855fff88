pub mod artifact_cache;
