//! Wire protocol frames and codec for the research service connection.
//!
//! The protocol is deliberately small: one outbound frame shape
//! ([`JobRequest`]) and four inbound frame kinds distinguished by a `type`
//! tag. Decoding is total — every byte string maps to either a [`Frame`] or
//! a [`DecodeError`], never a panic — because inbound frames cross a trust
//! boundary and a malformed one must be droppable, not fatal.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// Outbound job submission frame.
///
/// Wire shape: `{"topic": string, "model": string | null}`. An absent model
/// means "use the backend default".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Research topic. Validated non-empty before submission.
    pub topic: String,
    /// Model identifier, if the caller picked one.
    pub model: Option<String>,
}

impl JobRequest {
    /// Encode to the wire text representation.
    #[must_use]
    pub fn encode(&self) -> String {
        serde_json::json!({ "topic": self.topic, "model": self.model }).to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// Inbound frame, decoded from a `type`-tagged JSON object.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Incremental status report for the in-flight job.
    Progress {
        /// Human-readable status line.
        message: String,
        /// Fraction complete in `[0.0, 1.0]`, when the backend reports one.
        step: Option<f64>,
    },
    /// Terminal success payload for the in-flight job.
    Result {
        /// The final research text.
        data: String,
    },
    /// Terminal failure for the in-flight job.
    Error {
        /// Backend-supplied failure text.
        data: String,
    },
    /// Idle-connection no-op. Never surfaced to callers.
    Keepalive,
    /// Well-formed frame with a `type` this client does not know.
    ///
    /// Kept decodable so newer servers can add frame kinds without breaking
    /// older clients; the session layer discards these.
    Unknown {
        /// The unrecognized `type` tag.
        kind: String,
    },
}

impl Frame {
    /// Short tag for logging.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Result { .. } => "result",
            Self::Error { .. } => "error",
            Self::Keepalive => "keepalive",
            Self::Unknown { kind } => kind,
        }
    }

    /// Whether this frame advances the in-flight job.
    ///
    /// Only job-relevant frames may touch the deadline timer; keepalives and
    /// unknown frames must not keep a silent job alive.
    #[must_use]
    pub fn is_job_relevant(&self) -> bool {
        matches!(
            self,
            Self::Progress { .. } | Self::Result { .. } | Self::Error { .. }
        )
    }
}

/// Why a byte string failed to decode into a [`Frame`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Not UTF-8 JSON at all.
    #[error("frame is not valid JSON: {0}")]
    Syntax(String),

    /// Valid JSON, but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// Object without a string `type` field.
    #[error("frame has no string \"type\" field")]
    MissingType,

    /// Recognized `type` with a missing or mistyped payload field.
    #[error("invalid {kind} frame: missing or invalid \"{field}\"")]
    BadPayload {
        /// The frame kind being decoded.
        kind: &'static str,
        /// The offending payload field.
        field: &'static str,
    },
}

/// Decode one inbound frame.
///
/// Total over all byte strings: returns `Err` for anything that is not a
/// well-formed frame. A structurally valid object with an unrecognized
/// `type` decodes to [`Frame::Unknown`] rather than an error.
pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|error| DecodeError::Syntax(error.to_string()))?;
    let object = value.as_object().ok_or(DecodeError::NotAnObject)?;
    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?;

    match kind {
        "progress" => {
            let message = object
                .get("message")
                .and_then(Value::as_str)
                .ok_or(DecodeError::BadPayload {
                    kind: "progress",
                    field: "message",
                })?
                .to_owned();
            // Absent or non-numeric step degrades to None; the fraction is
            // advisory and not worth rejecting an otherwise good frame over.
            let step = object.get("step").and_then(Value::as_f64);
            Ok(Frame::Progress { message, step })
        }
        "result" => {
            let data = object
                .get("data")
                .and_then(Value::as_str)
                .ok_or(DecodeError::BadPayload {
                    kind: "result",
                    field: "data",
                })?
                .to_owned();
            Ok(Frame::Result { data })
        }
        "error" => {
            let data = object
                .get("data")
                .and_then(Value::as_str)
                .ok_or(DecodeError::BadPayload {
                    kind: "error",
                    field: "data",
                })?
                .to_owned();
            Ok(Frame::Error { data })
        }
        "keepalive" => Ok(Frame::Keepalive),
        other => Ok(Frame::Unknown {
            kind: other.to_owned(),
        }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    use super::*;

    // -- encode --

    #[test]
    fn encode_with_model() {
        let request = JobRequest {
            topic: "Apple M4 Max".into(),
            model: Some("gemma-3-27b-it".into()),
        };
        let value: Value = serde_json::from_str(&request.encode()).unwrap();
        assert_eq!(value["topic"], "Apple M4 Max");
        assert_eq!(value["model"], "gemma-3-27b-it");
    }

    #[test]
    fn encode_without_model_is_null() {
        let request = JobRequest {
            topic: "quantum error correction".into(),
            model: None,
        };
        let value: Value = serde_json::from_str(&request.encode()).unwrap();
        assert_eq!(value["topic"], "quantum error correction");
        assert!(value["model"].is_null());
        assert!(value.as_object().unwrap().contains_key("model"));
    }

    // -- decode: recognized kinds --

    #[test]
    fn decode_progress_with_step() {
        let frame =
            decode(br#"{"type":"progress","message":"Starting research","step":0.1}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Progress {
                message: "Starting research".into(),
                step: Some(0.1),
            }
        );
    }

    #[test]
    fn decode_progress_without_step() {
        let frame = decode(br#"{"type":"progress","message":"Searching the web"}"#).unwrap();
        assert_matches!(frame, Frame::Progress { step: None, .. });
    }

    #[test]
    fn decode_progress_with_integer_step() {
        let frame = decode(br#"{"type":"progress","message":"done","step":1}"#).unwrap();
        assert_matches!(frame, Frame::Progress { step: Some(s), .. } if (s - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn decode_progress_with_bad_step_degrades() {
        let frame = decode(br#"{"type":"progress","message":"m","step":"half"}"#).unwrap();
        assert_matches!(frame, Frame::Progress { step: None, .. });
    }

    #[test]
    fn decode_result() {
        let frame = decode(br#"{"type":"result","data":"<final text>"}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Result {
                data: "<final text>".into()
            }
        );
    }

    #[test]
    fn decode_error_frame() {
        let frame = decode(br#"{"type":"error","data":"Topic is required"}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Error {
                data: "Topic is required".into()
            }
        );
    }

    #[test]
    fn decode_keepalive() {
        let frame = decode(br#"{"type":"keepalive"}"#).unwrap();
        assert_eq!(frame, Frame::Keepalive);
    }

    #[test]
    fn decode_unknown_kind() {
        let frame = decode(br#"{"type":"status","detail":"warming up"}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Unknown {
                kind: "status".into()
            }
        );
    }

    // -- decode: rejected inputs --

    #[test]
    fn decode_not_json() {
        assert_matches!(decode(b"{not json"), Err(DecodeError::Syntax(_)));
    }

    #[test]
    fn decode_non_object() {
        assert_eq!(decode(b"[1,2,3]"), Err(DecodeError::NotAnObject));
        assert_eq!(decode(b"\"progress\""), Err(DecodeError::NotAnObject));
    }

    #[test]
    fn decode_missing_type() {
        assert_eq!(
            decode(br#"{"message":"no tag"}"#),
            Err(DecodeError::MissingType)
        );
    }

    #[test]
    fn decode_non_string_type() {
        assert_eq!(decode(br#"{"type":42}"#), Err(DecodeError::MissingType));
    }

    #[test]
    fn decode_progress_missing_message() {
        assert_eq!(
            decode(br#"{"type":"progress","step":0.5}"#),
            Err(DecodeError::BadPayload {
                kind: "progress",
                field: "message",
            })
        );
    }

    #[test]
    fn decode_result_missing_data() {
        assert_eq!(
            decode(br#"{"type":"result"}"#),
            Err(DecodeError::BadPayload {
                kind: "result",
                field: "data",
            })
        );
    }

    #[test]
    fn decode_result_non_string_data() {
        assert_eq!(
            decode(br#"{"type":"result","data":{"text":"nested"}}"#),
            Err(DecodeError::BadPayload {
                kind: "result",
                field: "data",
            })
        );
    }

    #[test]
    fn decode_error_missing_data() {
        assert_eq!(
            decode(br#"{"type":"error"}"#),
            Err(DecodeError::BadPayload {
                kind: "error",
                field: "data",
            })
        );
    }

    #[test]
    fn decode_invalid_utf8() {
        assert_matches!(decode(&[0xff, 0xfe, 0x80]), Err(DecodeError::Syntax(_)));
    }

    #[test]
    fn decode_empty_input() {
        assert_matches!(decode(b""), Err(DecodeError::Syntax(_)));
    }

    // -- frame helpers --

    #[test]
    fn job_relevant_frames() {
        assert!(
            Frame::Progress {
                message: "m".into(),
                step: None
            }
            .is_job_relevant()
        );
        assert!(Frame::Result { data: "d".into() }.is_job_relevant());
        assert!(Frame::Error { data: "e".into() }.is_job_relevant());
        assert!(!Frame::Keepalive.is_job_relevant());
        assert!(
            !Frame::Unknown {
                kind: "status".into()
            }
            .is_job_relevant()
        );
    }

    #[test]
    fn frame_kind_names() {
        assert_eq!(Frame::Keepalive.kind(), "keepalive");
        assert_eq!(
            Frame::Unknown {
                kind: "status".into()
            }
            .kind(),
            "status"
        );
    }

    // -- totality --

    proptest! {
        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            // Err is fine; panicking is not.
            let _ = decode(&bytes);
        }

        #[test]
        fn decode_arbitrary_json_objects(topic in "[a-z]{0,16}", step in any::<f64>()) {
            // Non-finite steps render as non-JSON tokens and are rejected;
            // everything else must decode to a Progress frame.
            let text = format!(r#"{{"type":"progress","message":"{topic}","step":{step}}}"#);
            match decode(text.as_bytes()) {
                Ok(frame) => {
                    let is_progress = matches!(frame, Frame::Progress { .. });
                    prop_assert!(is_progress);
                }
                Err(error) => {
                    prop_assert!(!step.is_finite(), "finite step failed to decode: {error}");
                }
            }
        }
    }
}
