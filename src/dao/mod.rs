/// Durable best-score storage.
pub mod high_score;
/// Serialized entity definitions.
pub mod models;
/// Quiz provider contract and loaders.
pub mod quiz_store;
/// Storage error types shared by the stores.
pub mod storage;
