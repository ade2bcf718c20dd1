mod detector;
mod normalizer;

pub use detector::ChangeDetector;
pub use normalizer::{extract_by_selector, extract_text, normalize, NormalizedContent};
