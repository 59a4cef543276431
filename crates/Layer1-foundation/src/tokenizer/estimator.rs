//! Character-ratio estimators

use super::TokenEstimator;

/// Fixed chars-per-token ratio, rounded up (`chars / 4` by default)
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    chars_per_token: f64,
}

impl CharRatioEstimator {
    /// Ratios below 1.0 are raised to 1.0
    pub fn new(chars_per_token: f64) -> Self {
        Self {
            chars_per_token: if chars_per_token.is_finite() {
                chars_per_token.max(1.0)
            } else {
                4.0
            },
        }
    }

    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate_text(&self, text: &str) -> u64 {
        self.estimate_len(text.chars().count() as u64)
    }

    fn estimate_len(&self, len: u64) -> u64 {
        if len == 0 {
            return 0;
        }
        (len as f64 / self.chars_per_token).ceil() as u64
    }
}

/// Like `CharRatioEstimator`, but CJK text tokenizes denser
///
/// ASCII at 4 chars/token, CJK at 1.5, other scripts at 2.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptAwareEstimator;

impl TokenEstimator for ScriptAwareEstimator {
    fn estimate_text(&self, text: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }

        // Single pass, no allocation
        let mut ascii_count = 0u64;
        let mut cjk_count = 0u64;
        let mut other_count = 0u64;

        for c in text.chars() {
            if c.is_ascii() {
                ascii_count += 1;
            } else if is_cjk(c) {
                cjk_count += 1;
            } else {
                other_count += 1;
            }
        }

        let tokens = ascii_count as f64 / 4.0 + cjk_count as f64 / 1.5 + other_count as f64 / 2.0;
        tokens.ceil() as u64
    }

    fn estimate_len(&self, len: u64) -> u64 {
        CharRatioEstimator::default().estimate_len(len)
    }
}

fn is_cjk(c: char) -> bool {
    let code = c as u32;

    // ASCII and Latin are never CJK
    if code < 0x1100 {
        return false;
    }

    matches!(
        code,
        0xAC00..=0xD7AF     // Hangul syllables
            | 0x4E00..=0x9FFF // CJK unified ideographs
            | 0x3040..=0x30FF // Hiragana, Katakana
            | 0x1100..=0x11FF // Hangul jamo
            | 0x3130..=0x318F // Hangul compatibility jamo
            | 0x3400..=0x4DBF // CJK extension A
    )
}
