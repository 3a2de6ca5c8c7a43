//! Filename-based ATP document classifier.
//!
//! Each category owns a keyword table. Every keyword found as a substring of
//! the lower-cased filename adds its weight to the category score; the best
//! score wins and confidence is its share of all scores.

use serde::Serialize;

use super::error::WorkflowError;
use crate::models::enums::Category;

pub const METHOD_FILENAME: &str = "filename_analysis";
pub const METHOD_GENERIC_MARKER: &str = "generic_marker";
pub const METHOD_NO_SIGNAL: &str = "no_signal";
pub const METHOD_CALLER_HINT: &str = "caller_hint";

const MAX_CONFIDENCE: f64 = 0.95;
const GENERIC_MARKER_CONFIDENCE: f64 = 0.5;
const GENERIC_MARKER: &str = "atp";

/// Table order doubles as the tie-break order.
const KEYWORD_TABLES: &[(Category, &[(&str, u32)])] = &[
    (
        Category::SoftwareLicense,
        &[
            ("sw license", 100),
            ("sw lic", 100),
            ("sw licen", 100),
            ("license ug", 90),
            ("ug bw", 80),
            ("bw ug", 80),
            (" ug ", 50),
            (" bw ", 50),
            ("modulation", 70),
            ("modulations", 70),
            ("software", 60),
            ("license", 60),
        ],
    ),
    (
        Category::PlnUpgrade,
        &[("pln", 100), ("power", 80), ("rectifier", 60), ("battery", 60)],
    ),
    (
        Category::DismantleDrop,
        &[("dismantle drop", 120), ("dismantle-drop", 120), ("drop", 50)],
    ),
    (
        Category::DismantleKeep,
        &[("dismantle keep", 120), ("dismantle-keep", 120), ("keep", 50)],
    ),
    (
        Category::RanMw,
        &[
            ("ran", 80),
            ("mw", 60),
            ("microwave", 80),
            ("reroute", 70),
            ("upgrade", 60),
            ("new", 40),
        ],
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryScore {
    pub category: Category,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub category: Category,
    pub confidence: f64,
    pub method: &'static str,
    pub scores: Vec<CategoryScore>,
}

/// Classify a filename. Total and deterministic.
pub fn classify(filename: &str) -> Classification {
    let lower = filename.to_lowercase();

    let scores: Vec<CategoryScore> = KEYWORD_TABLES
        .iter()
        .map(|(category, keywords)| CategoryScore {
            category: *category,
            score: keywords
                .iter()
                .filter(|(keyword, _)| lower.contains(keyword))
                .map(|(_, weight)| weight)
                .sum(),
        })
        .collect();

    let total: u32 = scores.iter().map(|s| s.score).sum();

    // Strict `>` keeps the earliest category on ties.
    let mut best: Option<CategoryScore> = None;
    for candidate in &scores {
        if candidate.score > best.map_or(0, |b| b.score) {
            best = Some(*candidate);
        }
    }

    match best {
        Some(winner) => Classification {
            category: winner.category,
            confidence: (f64::from(winner.score) / (f64::from(total) + 1.0)).min(MAX_CONFIDENCE),
            method: METHOD_FILENAME,
            scores,
        },
        None if lower.contains(GENERIC_MARKER) => Classification {
            category: Category::RanMw,
            confidence: GENERIC_MARKER_CONFIDENCE,
            method: METHOD_GENERIC_MARKER,
            scores,
        },
        None => Classification {
            category: Category::Unknown,
            confidence: 0.0,
            method: METHOD_NO_SIGNAL,
            scores,
        },
    }
}

impl Classification {
    /// Apply a caller-supplied category hint.
    ///
    /// The hint is always validated but only replaces the category when the
    /// filename signal is weaker than `threshold`.
    pub fn with_hint(mut self, hint: Option<&str>, threshold: f64) -> Result<Self, WorkflowError> {
        let Some(raw) = hint.filter(|h| !h.trim().is_empty()) else {
            return Ok(self);
        };
        let category = Category::from_hint(raw)
            .ok_or_else(|| WorkflowError::Validation(format!("unknown category hint '{raw}'")))?;

        if self.confidence < threshold {
            tracing::debug!(
                hinted = %category,
                classified = %self.category,
                confidence = self.confidence,
                "Caller hint overrides weak classification"
            );
            self.category = category;
            self.method = METHOD_CALLER_HINT;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn software_license_filename() {
        let result = classify("XLSmart MW ATP (SW License UG BW)");
        assert_eq!(result.category, Category::SoftwareLicense);
        assert!(result.confidence > 0.8, "confidence {}", result.confidence);
        assert_eq!(result.method, METHOD_FILENAME);
        // 580 / (580 + 60 + 1)
        assert!((result.confidence - 580.0 / 641.0).abs() < 1e-9);
    }

    #[test]
    fn power_upgrade_filename() {
        let result = classify("PLN Rectifier Battery Replacement.pdf");
        assert_eq!(result.category, Category::PlnUpgrade);
    }

    #[test]
    fn dismantle_variants() {
        assert_eq!(classify("Site Dismantle-Drop report").category, Category::DismantleDrop);
        assert_eq!(classify("dismantle keep JKT").category, Category::DismantleKeep);
    }

    #[test]
    fn microwave_filename() {
        let result = classify("Microwave reroute JKT001.xlsx");
        assert_eq!(result.category, Category::RanMw);
        assert!(result.confidence <= MAX_CONFIDENCE);
    }

    #[test]
    fn confidence_is_capped() {
        // Only one category scores, so the raw share approaches 1.
        let result = classify("sw license license ug ug bw software modulations");
        assert_eq!(result.category, Category::SoftwareLicense);
        assert_eq!(result.confidence, MAX_CONFIDENCE);
    }

    #[test]
    fn tie_prefers_table_order() {
        // "drop" and "keep" both score 50.
        let result = classify("keep drop");
        assert_eq!(result.category, Category::DismantleDrop);
    }

    #[test]
    fn generic_marker_falls_back_to_ran_mw() {
        let result = classify("ATP_site_42.pdf");
        assert_eq!(result.category, Category::RanMw);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.method, METHOD_GENERIC_MARKER);
    }

    #[test]
    fn no_signal_is_unknown() {
        let result = classify("scan_0001.pdf");
        assert_eq!(result.category, Category::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.method, METHOD_NO_SIGNAL);
    }

    #[test]
    fn deterministic() {
        let name = "XLSmart Power Upgrade ATP";
        assert_eq!(classify(name), classify(name));
    }

    #[test]
    fn hint_overrides_only_weak_signal() {
        let weak = classify("ATP_site_42.pdf").with_hint(Some("software"), 0.6).unwrap();
        assert_eq!(weak.category, Category::SoftwareLicense);
        assert_eq!(weak.method, METHOD_CALLER_HINT);

        let strong = classify("XLSmart MW ATP (SW License UG BW)")
            .with_hint(Some("PLN_UPGRADE"), 0.6)
            .unwrap();
        assert_eq!(strong.category, Category::SoftwareLicense);
        assert_eq!(strong.method, METHOD_FILENAME);
    }

    #[test]
    fn invalid_hint_is_rejected() {
        let err = classify("scan.pdf").with_hint(Some("satellite"), 0.6).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert!(classify("scan.pdf").with_hint(Some("  "), 0.6).is_ok());
    }
}
