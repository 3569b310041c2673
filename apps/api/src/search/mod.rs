pub mod handlers;

use serde::Deserialize;

pub const DEFAULT_SEMANTIC_LIMIT: u32 = 10;
pub const DEFAULT_KEYWORD_LIMIT: u32 = 20;
pub const MAX_SEARCH_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u32>,
}

impl SearchParams {
    /// Resolves the result cap, rejecting 0 and anything above the maximum.
    pub fn limit_or(&self, default: u32) -> Result<u32, String> {
        match self.limit.unwrap_or(default) {
            0 => Err("limit must be at least 1".to_string()),
            n if n > MAX_SEARCH_LIMIT => {
                Err(format!("limit must not exceed {MAX_SEARCH_LIMIT}, got {n}"))
            }
            n => Ok(n),
        }
    }
}
