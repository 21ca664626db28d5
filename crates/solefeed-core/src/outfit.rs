//! Outfit rating payloads.
//!
//! The classification service is an untrusted third party. Its input is
//! validated here before any quota is spent, and its output is sanitized here
//! before it is returned to a browser.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Largest accepted image, measured after base64 decoding (10 MB).
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Lowest score the classifier may report.
pub const MIN_RATING: f64 = 0.0;

/// Highest score the classifier may report.
pub const MAX_RATING: f64 = 10.0;

/// Maximum number of style or color labels kept.
pub const MAX_LABELS: usize = 8;

/// Maximum characters kept per label.
pub const MAX_LABEL_CHARS: usize = 40;

/// Maximum characters kept in the free-text feedback.
pub const MAX_FEEDBACK_CHARS: usize = 1000;

/// Maximum characters kept in the detected-shoe description.
pub const MAX_DETECTED_CHARS: usize = 200;

/// A validated base64 image ready to forward to the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    encoded: String,
    decoded_len: usize,
}

impl ImagePayload {
    /// Validate a base64 image, optionally wrapped in a `data:` URL.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` if the input is empty, is not valid
    /// standard base64, or decodes to more than [`MAX_IMAGE_BYTES`].
    pub fn from_base64(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let encoded = match trimmed.split_once(";base64,") {
            Some((prefix, data)) if prefix.starts_with("data:") => data,
            _ => trimmed,
        };

        if encoded.is_empty() {
            return Err(CoreError::InvalidInput("image is required".into()));
        }

        // Reject oversized payloads before allocating for the decode.
        if encoded.len() / 4 * 3 > MAX_IMAGE_BYTES + 3 {
            return Err(CoreError::InvalidInput("image exceeds 10 MB".into()));
        }

        let decoded = STANDARD
            .decode(encoded)
            .map_err(|_| CoreError::InvalidInput("image is not valid base64".into()))?;

        if decoded.is_empty() {
            return Err(CoreError::InvalidInput("image is empty".into()));
        }
        if decoded.len() > MAX_IMAGE_BYTES {
            return Err(CoreError::InvalidInput("image exceeds 10 MB".into()));
        }

        Ok(Self {
            encoded: encoded.to_string(),
            decoded_len: decoded.len(),
        })
    }

    /// The base64 text, without any `data:` prefix.
    #[must_use]
    pub fn as_base64(&self) -> &str {
        &self.encoded
    }

    /// Size of the decoded image in bytes.
    #[must_use]
    pub const fn decoded_len(&self) -> usize {
        self.decoded_len
    }
}

/// Structured judgment returned by the classification service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutfitAnalysis {
    /// Score between [`MIN_RATING`] and [`MAX_RATING`].
    pub rating: f64,
    /// Short free-text comment.
    pub feedback: String,
    /// Style labels.
    #[serde(default)]
    pub style_tags: Vec<String>,
    /// Color labels.
    #[serde(default)]
    pub dominant_colors: Vec<String>,
    /// Description of the shoe in the photo, if one was found.
    #[serde(default)]
    pub detected_shoe: Option<String>,
}

impl OutfitAnalysis {
    /// Make the analysis safe to hand to a browser.
    ///
    /// Clamps the rating, caps every string and label list, drops empty
    /// labels, and HTML-escapes all text.
    #[must_use]
    pub fn sanitize(self) -> Self {
        let rating = if self.rating.is_finite() {
            self.rating.clamp(MIN_RATING, MAX_RATING)
        } else {
            MIN_RATING
        };

        Self {
            rating,
            feedback: clean_text(&self.feedback, MAX_FEEDBACK_CHARS),
            style_tags: clean_labels(self.style_tags),
            dominant_colors: clean_labels(self.dominant_colors),
            detected_shoe: self
                .detected_shoe
                .map(|s| clean_text(&s, MAX_DETECTED_CHARS))
                .filter(|s| !s.is_empty()),
        }
    }
}

/// Escape the characters HTML treats specially.
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            c => out.push(c),
        }
    }
    out
}

fn clean_text(input: &str, max_chars: usize) -> String {
    let truncated: String = input
        .trim()
        .chars()
        .filter(|c| !c.is_control() || *c == '\n')
        .take(max_chars)
        .collect();
    escape_html(&truncated)
}

fn clean_labels(labels: Vec<String>) -> Vec<String> {
    labels
        .into_iter()
        .map(|label| clean_text(&label, MAX_LABEL_CHARS))
        .filter(|label| !label.is_empty())
        .take(MAX_LABELS)
        .collect()
}
