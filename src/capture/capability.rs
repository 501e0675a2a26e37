use serde::Serialize;

use super::backend::CaptureSurface;

/// What the current surface can do right now. Probed fresh for every capture
/// attempt; nothing here is cached between requests.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityProfile {
    /// Frame stream capture and a recorder are both present.
    pub can_stream_capture: bool,
    pub can_extract_still: bool,
    pub still_during_recording: bool,
    /// The subset of the preference list the recorder accepts, in preference order.
    pub supported_encodings: Vec<String>,
}

impl CapabilityProfile {
    pub fn probe(surface: &dyn CaptureSurface, preferences: &[String]) -> Self {
        let can_stream_capture = surface.can_stream_frames() && surface.has_recorder();
        let supported_encodings = if can_stream_capture {
            preferences
                .iter()
                .filter(|encoding| surface.is_encoding_supported(encoding))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        Self {
            can_stream_capture,
            can_extract_still: surface.can_extract_still(),
            still_during_recording: surface.still_during_recording(),
            supported_encodings,
        }
    }

    pub fn negotiate_encoding(&self) -> Option<&str> {
        self.supported_encodings.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendPlan {
    Real { encoding: String },
    Simulated { reason: String },
}

pub fn plan_backend(profile: &CapabilityProfile) -> BackendPlan {
    if !profile.can_stream_capture {
        return BackendPlan::Simulated {
            reason: "stream capture or recorder not available".to_string(),
        };
    }

    match profile.negotiate_encoding() {
        Some(encoding) => BackendPlan::Real {
            encoding: encoding.to_string(),
        },
        None => BackendPlan::Simulated {
            reason: "no supported recording encoding".to_string(),
        },
    }
}
