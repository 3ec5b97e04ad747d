use crate::domain::creative::Angle;
use serde::{Deserialize, Serialize};

/// What the classifier is asked to emit, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAngleAnalysis {
    pub angle: String,
    #[serde(default)]
    pub hook_type: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub key_claim: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleAnalysis {
    pub angle: Angle,
    /// The label exactly as the model wrote it, kept for auditing `Other` mappings.
    pub raw_angle: String,
    pub hook_type: Option<String>,
    pub tone: Option<String>,
    pub key_claim: Option<String>,
    pub confidence: Option<f64>,
}

impl LlmAngleAnalysis {
    pub fn into_analysis(self) -> AngleAnalysis {
        let raw_angle = self.angle.trim().to_string();
        let angle = Angle::normalize(&raw_angle);
        if angle == Angle::Other && !raw_angle.eq_ignore_ascii_case("other") {
            tracing::debug!(raw_angle = %raw_angle, "classifier label outside the fixed set; using Other");
        }

        AngleAnalysis {
            angle,
            raw_angle,
            hook_type: trimmed(self.hook_type),
            tone: trimmed(self.tone),
            key_claim: trimmed(self.key_claim),
            confidence: self
                .confidence
                .filter(|c| c.is_finite())
                .map(|c| c.clamp(0.0, 1.0)),
        }
    }
}

fn trimmed(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(angle: &str, confidence: Option<f64>) -> LlmAngleAnalysis {
        LlmAngleAnalysis {
            angle: angle.to_string(),
            hook_type: Some("  Question hook ".to_string()),
            tone: Some("".to_string()),
            key_claim: None,
            confidence,
        }
    }

    #[test]
    fn maps_known_labels_and_trims_fields() {
        let a = raw("Social Proof", Some(0.8)).into_analysis();
        assert_eq!(a.angle, Angle::SocialProof);
        assert_eq!(a.hook_type.as_deref(), Some("Question hook"));
        assert_eq!(a.tone, None);
        assert_eq!(a.confidence, Some(0.8));
    }

    #[test]
    fn unknown_labels_become_other_but_keep_raw_text() {
        let a = raw("Urgency/Scarcity", None).into_analysis();
        assert_eq!(a.angle, Angle::Other);
        assert_eq!(a.raw_angle, "Urgency/Scarcity");
    }

    #[test]
    fn confidence_is_clamped_and_nan_dropped() {
        assert_eq!(raw("Other", Some(1.7)).into_analysis().confidence, Some(1.0));
        assert_eq!(raw("Other", Some(-0.2)).into_analysis().confidence, Some(0.0));
        assert_eq!(raw("Other", Some(f64::NAN)).into_analysis().confidence, None);
    }
}
