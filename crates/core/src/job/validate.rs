//! Request validation. Runs before any dispatch; failures are never retried.

use thiserror::Error;

use super::keys;
use super::types::{JobType, Privacy, RenderRequest};

/// A request that cannot be rendered as specified.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid output name '{name}': {reason}")]
    OutName { name: String, reason: String },

    #[error("codec {codec} does not accept a CRF value")]
    CrfNotSupported { codec: String },

    #[error("CRF {crf} is outside {min}..={max} for codec {codec}")]
    CrfOutOfRange {
        codec: String,
        crf: u8,
        min: u8,
        max: u8,
    },

    #[error("audio codec {audio_codec} cannot be used with codec {codec}")]
    IncompatibleAudioCodec { codec: String, audio_codec: String },

    #[error("privacy setting conflict: {0}")]
    Privacy(String),

    #[error("fps must be between 1 and 240, got {0}")]
    Fps(u32),

    #[error("{0}")]
    Shape(String),
}

/// Checks a request for conflicts before any work is planned.
pub fn validate_request(request: &RenderRequest) -> Result<(), ValidationError> {
    if request.fps == 0 || request.fps > 240 {
        return Err(ValidationError::Fps(request.fps));
    }

    match request.job_type {
        JobType::Still => {
            if request.codec.is_some() {
                return Err(ValidationError::Shape(
                    "still jobs do not take a codec".to_string(),
                ));
            }
            if request.still_frame.checked_add(1).is_none() {
                return Err(ValidationError::Shape(
                    "still frame is out of range".to_string(),
                ));
            }
        }
        JobType::Video => {
            if request.codec.is_none() {
                return Err(ValidationError::Shape(
                    "video jobs require a codec".to_string(),
                ));
            }
        }
    }

    if let Some(codec) = request.codec {
        let codec_name = format!("{:?}", codec).to_lowercase();

        if let Some(crf) = request.crf {
            match codec.crf_range() {
                None => {
                    return Err(ValidationError::CrfNotSupported { codec: codec_name });
                }
                Some((min, max)) if crf < min || crf > max => {
                    return Err(ValidationError::CrfOutOfRange {
                        codec: codec_name,
                        crf,
                        min,
                        max,
                    });
                }
                Some(_) => {}
            }
        }

        if let Some(audio_codec) = request.audio_codec {
            let compatible = if !codec.supports_audio() {
                false
            } else if codec.is_audio_only() {
                codec.default_audio_codec() == Some(audio_codec)
            } else {
                true
            };
            if !compatible {
                return Err(ValidationError::IncompatibleAudioCodec {
                    codec: codec_name,
                    audio_codec: format!("{:?}", audio_codec).to_lowercase(),
                });
            }
        }
    }

    if request.privacy == Privacy::NoAcl && !request.custom_output {
        return Err(ValidationError::Privacy(
            "no-acl is only valid when writing to a custom output destination".to_string(),
        ));
    }

    if let Some(ref name) = request.out_name {
        validate_out_name(name, request)?;
    }

    Ok(())
}

fn validate_out_name(name: &str, request: &RenderRequest) -> Result<(), ValidationError> {
    let fail = |reason: &str| ValidationError::OutName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(fail("must not be empty"));
    }
    if name.starts_with('/') {
        return Err(fail("must be relative"));
    }
    if name.split('/').any(|part| part == ".." || part == ".") {
        return Err(fail("must not contain '.' or '..' segments"));
    }
    if keys::is_reserved_name(name) {
        return Err(fail("collides with an intermediate or metadata object"));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(fail("must not contain control characters"));
    }

    let expected = match request.codec {
        Some(codec) => codec.file_extension(request.resolved_audio_codec()),
        None => "png",
    };
    let matches_extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.eq_ignore_ascii_case(expected))
        .unwrap_or(false);
    if !matches_extension {
        return Err(fail(&format!("must end with .{}", expected)));
    }

    Ok(())
}
