// Video codec and container format support for exports
//
// This module defines the codecs and containers the format negotiator ranks.
// To add a new codec:
// 1. Add variant to VideoCodec enum and to VideoCodec::PRIORITY
// 2. Add its id/label mapping in id() and codec_label()
// 3. Add candidate variants in candidates.rs
// 4. Add encoder/parser element names below if GStreamer should probe it

pub mod candidates;
pub mod negotiate;

#[cfg(feature = "gst-runtime")]
pub mod gst_probe;

pub use candidates::{EncoderSignature, FormatVariant};
pub use negotiate::{
    list_codec_support, resolve_format, CodecAvailability, NegotiationError, NegotiationOutcome,
    ResolvedFormat, SupportTest,
};

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Codecs the negotiator can be asked for explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// AV1 - royalty-free, best compression
    Av1,
    /// H.265/HEVC - better compression than H.264
    Hevc,
    /// H.264/AVC - widely supported
    H264,
    /// VP9 - royalty-free, universally available in WebM
    Vp9,
}

impl VideoCodec {
    /// Fixed ranking, best first
    pub const PRIORITY: &'static [VideoCodec] = &[
        VideoCodec::Av1,
        VideoCodec::Hevc,
        VideoCodec::H264,
        VideoCodec::Vp9,
    ];

    /// Lowercase identifier, shared with config files and [`ResolvedFormat::codec`]
    pub fn id(&self) -> &'static str {
        match self {
            VideoCodec::Av1 => "av1",
            VideoCodec::Hevc => "hevc",
            VideoCodec::H264 => "h264",
            VideoCodec::Vp9 => "vp9",
        }
    }

    pub fn from_id(id: &str) -> Option<VideoCodec> {
        VideoCodec::PRIORITY.iter().copied().find(|c| c.id() == id)
    }

    /// Human-readable display name
    pub fn display_name(&self) -> &'static str {
        match self {
            VideoCodec::Av1 => "AV1",
            VideoCodec::Hevc => "HEVC",
            VideoCodec::H264 => "H.264",
            VideoCodec::Vp9 => "VP9",
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for VideoCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "av1" => Ok(VideoCodec::Av1),
            "hevc" | "h265" => Ok(VideoCodec::Hevc),
            "h264" | "avc" => Ok(VideoCodec::H264),
            "vp9" => Ok(VideoCodec::Vp9),
            other => Err(format!("unknown codec '{}'", other)),
        }
    }
}

/// Supported container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// Matroska (.mkv) - flexible, supports any codec
    Mkv,
    /// MP4 (.mp4) - widely compatible
    Mp4,
    /// WebM (.webm) - web-optimized, VP8/VP9/AV1 only
    WebM,
}

impl ContainerFormat {
    /// Fixed ranking, best first
    pub const PRIORITY: &'static [ContainerFormat] = &[
        ContainerFormat::Mkv,
        ContainerFormat::Mp4,
        ContainerFormat::WebM,
    ];

    /// Get the file extension for this container
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Mkv => "mkv",
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::WebM => "webm",
        }
    }

    /// MIME type used as the prefix of encoder signatures
    pub fn mime_type(&self) -> &'static str {
        match self {
            ContainerFormat::Mkv => "video/x-matroska",
            ContainerFormat::Mp4 => "video/mp4",
            ContainerFormat::WebM => "video/webm",
        }
    }

    pub fn from_mime_type(mime: &str) -> Option<ContainerFormat> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "video/x-matroska" | "video/matroska" => Some(ContainerFormat::Mkv),
            "video/mp4" => Some(ContainerFormat::Mp4),
            "video/webm" => Some(ContainerFormat::WebM),
            _ => None,
        }
    }

    /// Uppercase label used inside display labels
    pub fn label(&self) -> &'static str {
        match self {
            ContainerFormat::Mkv => "MKV",
            ContainerFormat::Mp4 => "MP4",
            ContainerFormat::WebM => "WEBM",
        }
    }

    /// Whether the container can carry the given codec id
    pub fn accepts(&self, codec_id: &str) -> bool {
        match self {
            ContainerFormat::Mkv => true,
            ContainerFormat::Mp4 => matches!(codec_id, "av1" | "hevc" | "h264" | "vp9"),
            ContainerFormat::WebM => matches!(codec_id, "av1" | "vp9" | "vp8"),
        }
    }

    /// Get the GStreamer muxer element name
    pub fn gst_muxer(&self) -> &'static str {
        match self {
            ContainerFormat::Mkv => "matroskamux",
            ContainerFormat::Mp4 => "mp4mux",
            ContainerFormat::WebM => "webmmux",
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ContainerFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mkv" | "matroska" => Ok(ContainerFormat::Mkv),
            "mp4" => Ok(ContainerFormat::Mp4),
            "webm" => Ok(ContainerFormat::WebM),
            other => Err(format!("unknown container '{}'", other)),
        }
    }
}

/// A user preference that is either a concrete value or "auto"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preference<T> {
    Auto,
    Explicit(T),
}

impl<T> Default for Preference<T> {
    fn default() -> Self {
        Preference::Auto
    }
}

impl<T: Copy> Preference<T> {
    pub fn explicit(&self) -> Option<T> {
        match self {
            Preference::Auto => None,
            Preference::Explicit(value) => Some(*value),
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Preference::Auto)
    }
}

impl<T> From<T> for Preference<T> {
    fn from(value: T) -> Self {
        Preference::Explicit(value)
    }
}

impl<T: fmt::Display> fmt::Display for Preference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preference::Auto => f.write_str("auto"),
            Preference::Explicit(value) => value.fmt(f),
        }
    }
}

impl<T: FromStr> FromStr for Preference<T> {
    type Err = T::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(Preference::Auto)
        } else {
            s.parse().map(Preference::Explicit)
        }
    }
}

impl<T: fmt::Display> Serialize for Preference<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de, T> Deserialize<'de> for Preference<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

pub type CodecPreference = Preference<VideoCodec>;
pub type ContainerPreference = Preference<ContainerFormat>;

/// Canonical uppercase label for a codec id.
/// Unknown ids are shown uppercased as-is.
pub fn codec_label(id: &str) -> String {
    match VideoCodec::from_id(id) {
        Some(codec) => codec.display_name().to_string(),
        None if id == "vp8" => "VP8".to_string(),
        None => id.to_uppercase(),
    }
}

/// Build the `"<CODEC> (<CONTAINER>)"` display label
pub fn format_label(codec_id: &str, container: ContainerFormat) -> String {
    format!("{} ({})", codec_label(codec_id), container.label())
}

/// GStreamer encoder elements for a codec id, hardware first
pub fn gst_encoders(codec_id: &str) -> &'static [&'static str] {
    match codec_id {
        "av1" => &["nvav1enc", "amfav1enc", "qsvav1enc", "vaav1enc", "svtav1enc", "av1enc"],
        "hevc" => &["nvh265enc", "amfh265enc", "qsvh265enc", "vah265enc", "x265enc"],
        "h264" => &["nvh264enc", "amfh264enc", "qsvh264enc", "vah264enc", "x264enc", "openh264enc"],
        "vp9" => &["qsvvp9enc", "vavp9enc", "vp9enc"],
        "vp8" => &["vavp8enc", "vp8enc"],
        _ => &[],
    }
}

/// Get the GStreamer parser element name for a codec id, if it needs one
pub fn gst_parser(codec_id: &str) -> Option<&'static str> {
    match codec_id {
        "av1" => Some("av1parse"),
        "hevc" => Some("h265parse"),
        "h264" => Some("h264parse"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(format_label("vp9", ContainerFormat::WebM), "VP9 (WEBM)");
        assert_eq!(format_label("h264", ContainerFormat::Mp4), "H.264 (MP4)");
        assert_eq!(format_label("hevc", ContainerFormat::Mkv), "HEVC (MKV)");
        assert_eq!(format_label("theora", ContainerFormat::Mkv), "THEORA (MKV)");
    }

    #[test]
    fn test_preference_parsing() {
        assert_eq!("auto".parse::<CodecPreference>(), Ok(Preference::Auto));
        assert_eq!("AUTO".parse::<ContainerPreference>(), Ok(Preference::Auto));
        assert_eq!(
            "h264".parse::<CodecPreference>(),
            Ok(Preference::Explicit(VideoCodec::H264))
        );
        assert_eq!(
            "webm".parse::<ContainerPreference>(),
            Ok(Preference::Explicit(ContainerFormat::WebM))
        );
        assert!("mpeg2".parse::<CodecPreference>().is_err());
    }

    #[test]
    fn test_preference_serde() {
        let json = serde_json::to_string(&Preference::Explicit(VideoCodec::Hevc)).unwrap();
        assert_eq!(json, "\"hevc\"");
        let auto: ContainerPreference = serde_json::from_str("\"auto\"").unwrap();
        assert!(auto.is_auto());
    }

    #[test]
    fn test_container_accepts() {
        assert!(ContainerFormat::WebM.accepts("vp8"));
        assert!(!ContainerFormat::WebM.accepts("h264"));
        assert!(!ContainerFormat::Mp4.accepts("vp8"));
        assert!(ContainerFormat::Mkv.accepts("hevc"));
    }

    #[test]
    fn test_codec_ids_round_trip() {
        for codec in VideoCodec::PRIORITY {
            assert_eq!(VideoCodec::from_id(codec.id()), Some(*codec));
        }
        assert_eq!(VideoCodec::from_id("vp8"), None);
    }
}
