//! Fingerprints - 캐시 키 및 소스 지문
//!
//! - `key`: 네임스페이스 + 입력 조각 → SHA-256 캐시 키
//! - `source`: 원본 소스(파일 내용 / 수정 시각)의 지문

mod key;
mod source;

pub use key::{fingerprint, FingerprintBuilder, Part};
pub use source::SourceFingerprint;
