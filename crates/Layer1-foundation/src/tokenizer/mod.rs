//! Token estimation - 절약된 토큰 추정
//!
//! 캐시는 토큰 수를 보고용으로만 사용하므로 정확한 BPE 토크나이저 대신
//! 문자 수 기반 추정을 사용합니다. 다른 추정기는 `TokenEstimator`로 주입합니다.

mod estimator;

pub use estimator::{CharRatioEstimator, ScriptAwareEstimator};

/// 토큰 추정 트레이트
pub trait TokenEstimator: Send + Sync {
    /// Estimated tokens for a piece of text
    fn estimate_text(&self, text: &str) -> u64;

    /// Estimated tokens for `len` bytes of unknown content
    fn estimate_len(&self, len: u64) -> u64;

    /// Estimated tokens for raw output bytes; invalid UTF-8 falls back to length
    fn estimate_bytes(&self, bytes: &[u8]) -> u64 {
        match std::str::from_utf8(bytes) {
            Ok(text) => self.estimate_text(text),
            Err(_) => self.estimate_len(bytes.len() as u64),
        }
    }

    /// Tokens saved by returning `returned_len` bytes instead of `original_len`
    fn tokens_saved(&self, original_len: u64, returned_len: u64) -> u64 {
        self.estimate_len(original_len)
            .saturating_sub(self.estimate_len(returned_len))
    }
}
