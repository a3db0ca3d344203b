//! Default values for configuration

/// Default embedding gateway URL
pub fn default_embedding_url() -> String {
    std::env::var("ANALYST_EMBEDDING_URL").unwrap_or_else(|_| "http://127.0.0.1:7997".to_string())
}

/// Default embedding model
pub fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

/// Default embedding dimension (matches the default model)
pub fn default_embedding_dimension() -> usize {
    384
}

/// Default batch size for embedding schema documents
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default text-generation gateway URL
pub fn default_generation_url() -> String {
    std::env::var("ANALYST_GENERATION_URL").unwrap_or_else(|_| "http://127.0.0.1:8091".to_string())
}

/// Default text-generation model
pub fn default_generation_model() -> String {
    "qwen2.5-7b-instruct".to_string()
}

/// Default maximum tokens for a generated completion
pub fn default_generation_max_tokens() -> u32 {
    1024
}

/// Default sampling temperature: query synthesis wants determinism
pub fn default_generation_temperature() -> f32 {
    0.0
}

/// Default shared attempt budget for synthesis + execution retries
pub fn default_max_attempts() -> u32 {
    3
}

/// Default number of schema documents retrieved per question
pub fn default_top_k_schema() -> usize {
    5
}

/// Default per-call timeout for gateway and backend operations
pub fn default_timeout_ms() -> u64 {
    30_000
}

/// Default maximum concurrent in-flight workflows
pub fn default_max_concurrency() -> usize {
    8
}

/// Default row cap when degrading to a raw-row preview
pub fn default_raw_row_preview() -> usize {
    10
}

/// Default top-N when the question asks for "top" without a number
pub fn default_top_n() -> usize {
    10
}
