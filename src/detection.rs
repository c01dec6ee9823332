use serde::{Deserialize, Deserializer, Serialize};

/// Rectangle expressed as fractions of the image width (`x`, `w`) and height
/// (`y`, `h`), origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default = "default_label", deserialize_with = "label_or_default")]
    pub label: String,
    #[serde(default, deserialize_with = "confidence_or_default")]
    pub confidence: f64,
    #[serde(default, rename = "box")]
    pub bbox: Option<NormalizedBox>,
}

fn default_label() -> String {
    "obj".to_string()
}

// An explicit `null` gets the same default as a missing field.
fn label_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_label))
}

fn confidence_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_default())
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f64, bbox: NormalizedBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox: Some(bbox),
        }
    }

    pub fn confidence_percent(&self) -> String {
        format!("{:.1}%", self.confidence * 100.0)
    }

    /// Text drawn in the label tag, e.g. `hardhat 92.0%`.
    pub fn display_text(&self) -> String {
        format!("{} {}", self.label, self.confidence_percent())
    }
}

/// Body returned by the detection backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    #[serde(default)]
    pub results: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectionResult {
    /// The backend-reported error, if any. Empty strings do not count.
    pub fn reported_error(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

pub fn demo_detections() -> Vec<Detection> {
    vec![
        Detection::new(
            "hardhat",
            0.92,
            NormalizedBox {
                x: 0.12,
                y: 0.18,
                w: 0.25,
                h: 0.28,
            },
        ),
        Detection::new(
            "person",
            0.88,
            NormalizedBox {
                x: 0.42,
                y: 0.12,
                w: 0.26,
                h: 0.6,
            },
        ),
    ]
}
