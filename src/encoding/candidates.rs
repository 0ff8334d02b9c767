//! Ranked encoder candidate table
//!
//! Every codec maps to an ordered list of `(signature, container)` variants.
//! Signatures are MIME strings in the `type; codecs="tag"` form the runtime
//! support test is asked about. The table is static data: it is never rebuilt
//! per negotiation and never mutated.

use super::ContainerFormat::{Mkv, Mp4, WebM};
use super::{ContainerFormat, VideoCodec};

/// One encoder configuration the runtime may or may not support
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatVariant {
    /// Codec identifier (`"av1"`, `"vp8"`, ...)
    pub codec_id: &'static str,
    pub container: ContainerFormat,
    /// Encoder signature handed to the support test and to the encoder
    pub signature: &'static str,
}

const fn variant(
    codec_id: &'static str,
    container: ContainerFormat,
    signature: &'static str,
) -> FormatVariant {
    FormatVariant {
        codec_id,
        container,
        signature,
    }
}

const AV1_VARIANTS: &[FormatVariant] = &[
    variant("av1", Mp4, "video/mp4; codecs=\"av01.0.05M.08\""),
    variant("av1", Mkv, "video/x-matroska; codecs=\"av01\""),
    variant("av1", WebM, "video/webm; codecs=\"av01.0.05M.08\""),
    variant("av1", WebM, "video/webm; codecs=\"av1\""),
];

const HEVC_VARIANTS: &[FormatVariant] = &[
    variant("hevc", Mp4, "video/mp4; codecs=\"hvc1.1.6.L93.B0\""),
    variant("hevc", Mp4, "video/mp4; codecs=\"hev1\""),
    variant("hevc", Mkv, "video/x-matroska; codecs=\"hvc1\""),
];

const H264_VARIANTS: &[FormatVariant] = &[
    variant("h264", Mp4, "video/mp4; codecs=\"avc1.42E01E\""),
    variant("h264", Mp4, "video/mp4; codecs=\"avc1\""),
    variant("h264", Mkv, "video/x-matroska; codecs=\"avc1\""),
    variant("h264", WebM, "video/webm; codecs=\"h264\""),
];

const VP9_VARIANTS: &[FormatVariant] = &[
    variant("vp9", WebM, "video/webm; codecs=\"vp9\""),
    variant("vp9", Mkv, "video/x-matroska; codecs=\"vp9\""),
    variant("vp9", Mp4, "video/mp4; codecs=\"vp09.00.10.08\""),
];

/// Codec -> variants, in codec priority order
pub static CANDIDATES: &[(VideoCodec, &[FormatVariant])] = &[
    (VideoCodec::Av1, AV1_VARIANTS),
    (VideoCodec::Hevc, HEVC_VARIANTS),
    (VideoCodec::H264, H264_VARIANTS),
    (VideoCodec::Vp9, VP9_VARIANTS),
];

/// Codec id used for signatures that leave the codec up to the runtime
pub const UNSPECIFIED_CODEC: &str = "default";

/// Minimal formats tried when nothing in [`CANDIDATES`] is supported
pub static LAST_RESORT: &[FormatVariant] = &[
    variant("vp8", WebM, "video/webm; codecs=\"vp8\""),
    variant(UNSPECIFIED_CODEC, WebM, "video/webm"),
];

/// Variants for one codec, in listed order
pub fn variants_for(codec: VideoCodec) -> &'static [FormatVariant] {
    CANDIDATES
        .iter()
        .find(|(c, _)| *c == codec)
        .map(|(_, variants)| *variants)
        .unwrap_or(&[])
}

/// A parsed encoder signature: container plus optional codec tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderSignature<'a> {
    pub container: ContainerFormat,
    pub codec_tag: Option<&'a str>,
}

impl<'a> EncoderSignature<'a> {
    /// Parse `video/webm; codecs="vp9"` style strings.
    /// Returns None for unknown MIME types.
    pub fn parse(signature: &'a str) -> Option<Self> {
        let mut parts = signature.split(';');
        let container = ContainerFormat::from_mime_type(parts.next()?)?;

        let codec_tag = parts.find_map(|param| {
            let (key, value) = param.split_once('=')?;
            if !key.trim().eq_ignore_ascii_case("codecs") {
                return None;
            }
            // Only the first codec of a list is the video track
            let value = value.trim().trim_matches('"');
            value.split(',').next().map(str::trim).filter(|v| !v.is_empty())
        });

        Some(Self {
            container,
            codec_tag,
        })
    }

    /// Codec id the tag refers to; untagged signatures map to [`UNSPECIFIED_CODEC`]
    pub fn codec_id(&self) -> Option<&'static str> {
        match self.codec_tag {
            None => Some(UNSPECIFIED_CODEC),
            Some(tag) => codec_id_for_tag(tag),
        }
    }
}

/// Map a codecs-parameter tag (`avc1.42E01E`, `vp09.00.10.08`, ...) to a codec id
pub fn codec_id_for_tag(tag: &str) -> Option<&'static str> {
    let tag = tag.to_ascii_lowercase();
    let family = tag.split('.').next().unwrap_or_default();
    match family {
        "av01" | "av1" => Some("av1"),
        "hvc1" | "hev1" | "hevc" | "h265" => Some("hevc"),
        "avc1" | "avc3" | "h264" => Some("h264"),
        "vp09" | "vp9" => Some("vp9"),
        "vp08" | "vp8" => Some("vp8"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_ordered_by_codec_priority() {
        let codecs: Vec<VideoCodec> = CANDIDATES.iter().map(|(c, _)| *c).collect();
        assert_eq!(codecs, VideoCodec::PRIORITY);
    }

    #[test]
    fn test_variants_agree_with_their_signatures() {
        let all = CANDIDATES
            .iter()
            .flat_map(|(_, v)| v.iter())
            .chain(LAST_RESORT.iter());
        for v in all {
            let parsed = EncoderSignature::parse(v.signature)
                .unwrap_or_else(|| panic!("unparseable signature {}", v.signature));
            assert_eq!(parsed.container, v.container, "{}", v.signature);
            assert_eq!(parsed.codec_id(), Some(v.codec_id), "{}", v.signature);
        }
    }

    #[test]
    fn test_parse_signature() {
        let sig = EncoderSignature::parse("video/webm; codecs=\"vp9, opus\"").unwrap();
        assert_eq!(sig.container, ContainerFormat::WebM);
        assert_eq!(sig.codec_tag, Some("vp9"));

        let bare = EncoderSignature::parse("video/webm").unwrap();
        assert_eq!(bare.codec_tag, None);
        assert_eq!(bare.codec_id(), Some(UNSPECIFIED_CODEC));

        assert!(EncoderSignature::parse("video/ogg; codecs=\"theora\"").is_none());
    }

    #[test]
    fn test_codec_tags() {
        assert_eq!(codec_id_for_tag("avc1.42E01E"), Some("h264"));
        assert_eq!(codec_id_for_tag("hev1"), Some("hevc"));
        assert_eq!(codec_id_for_tag("AV01.0.05M.08"), Some("av1"));
        assert_eq!(codec_id_for_tag("theora"), None);
    }
}
