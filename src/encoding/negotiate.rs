//! Codec/container negotiation for exports
//!
//! Picks one encoder configuration the runtime supports, given a codec
//! preference, a container preference and a support test. Priority policy:
//!
//! - **Both explicit**: exact `(codec, container)` first; then any other
//!   codec (in codec priority) that fits the requested container; then any
//!   supported variant of the requested codec.
//! - **Either auto**: codecs in priority order, containers in priority order
//!   within each codec. An explicit half is only used to report whether it
//!   was honoured.
//! - **Last resort**: the minimal formats in [`LAST_RESORT`].
//!
//! The decision is always reported back through [`ResolvedFormat::outcome`].
//! Negotiation holds no state between calls.

use serde::Serialize;

use super::candidates::{variants_for, FormatVariant, LAST_RESORT};
use super::{format_label, CodecPreference, ContainerFormat, ContainerPreference, VideoCodec};

/// Runtime capability check for an encoder signature
pub trait SupportTest {
    fn is_supported(&self, signature: &str) -> bool;
}

impl<F> SupportTest for F
where
    F: Fn(&str) -> bool,
{
    fn is_supported(&self, signature: &str) -> bool {
        self(signature)
    }
}

/// Error type for format negotiation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationError {
    #[error("No supported video format (requested codec: {codec}, container: {container})")]
    NoSupportedFormat {
        codec: CodecPreference,
        container: ContainerPreference,
    },
}

/// How the chosen format relates to what was asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationOutcome {
    /// Every explicit preference is honoured ("auto" accepts anything)
    AsRequested,
    /// The explicitly requested codec was replaced
    CodecSubstituted,
    /// The explicitly requested container was replaced
    ContainerSubstituted,
    /// Both explicit preferences were replaced
    BothSubstituted,
    /// Nothing in the candidate table worked; a minimal format was used
    LastResort,
}

/// The encoder configuration chosen for one export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedFormat {
    /// Codec id (`"vp9"`, `"vp8"`, ...)
    pub codec: &'static str,
    pub container: ContainerFormat,
    /// Signature to hand to the encoder
    pub signature: &'static str,
    /// Display label, e.g. `"VP9 (WEBM)"`
    pub label: String,
    pub outcome: NegotiationOutcome,
}

impl ResolvedFormat {
    fn from_variant(
        variant: &FormatVariant,
        codec: CodecPreference,
        container: ContainerPreference,
        last_resort: bool,
    ) -> Self {
        let outcome = if last_resort {
            NegotiationOutcome::LastResort
        } else {
            let codec_changed = codec.explicit().is_some_and(|c| c.id() != variant.codec_id);
            let container_changed = container.explicit().is_some_and(|k| k != variant.container);
            match (codec_changed, container_changed) {
                (false, false) => NegotiationOutcome::AsRequested,
                (true, false) => NegotiationOutcome::CodecSubstituted,
                (false, true) => NegotiationOutcome::ContainerSubstituted,
                (true, true) => NegotiationOutcome::BothSubstituted,
            }
        };

        Self {
            codec: variant.codec_id,
            container: variant.container,
            signature: variant.signature,
            label: format_label(variant.codec_id, variant.container),
            outcome,
        }
    }

    /// Known codec, if this isn't a VP8 or runtime-default fallback
    pub fn video_codec(&self) -> Option<VideoCodec> {
        VideoCodec::from_id(self.codec)
    }

    pub fn file_extension(&self) -> &'static str {
        self.container.extension()
    }
}

/// Per-codec availability for informational display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodecAvailability {
    pub codec: VideoCodec,
    pub label: &'static str,
    pub supported: bool,
}

/// Resolve the encoder configuration for an export
pub fn resolve_format<S>(
    codec: CodecPreference,
    container: ContainerPreference,
    support: &S,
) -> Result<ResolvedFormat, NegotiationError>
where
    S: SupportTest + ?Sized,
{
    let picked = match (codec.explicit(), container.explicit()) {
        (Some(c), Some(k)) => resolve_explicit(c, k, support),
        _ => resolve_ranked(support),
    };

    if let Some(variant) = picked {
        let resolved = ResolvedFormat::from_variant(variant, codec, container, false);
        if resolved.outcome == NegotiationOutcome::AsRequested {
            log::info!("Export format: {} ({})", resolved.label, resolved.signature);
        } else {
            log::info!(
                "Export format: {} ({}), requested codec={} container={}",
                resolved.label,
                resolved.signature,
                codec,
                container
            );
        }
        return Ok(resolved);
    }

    log::warn!("No candidate format supported, trying last-resort formats");
    if let Some(variant) = first_supported(LAST_RESORT.iter(), support) {
        let resolved = ResolvedFormat::from_variant(variant, codec, container, true);
        log::warn!("Export format fell back to {} ({})", resolved.label, resolved.signature);
        return Ok(resolved);
    }

    log::error!("No supported export format at all");
    Err(NegotiationError::NoSupportedFormat { codec, container })
}

/// Report whether any variant of each codec is supported, in priority order
pub fn list_codec_support<S>(support: &S) -> Vec<CodecAvailability>
where
    S: SupportTest + ?Sized,
{
    VideoCodec::PRIORITY
        .iter()
        .map(|&codec| CodecAvailability {
            codec,
            label: codec.display_name(),
            supported: first_supported(variants_for(codec).iter(), support).is_some(),
        })
        .collect()
}

fn first_supported<'a, S>(
    mut variants: impl Iterator<Item = &'a FormatVariant>,
    support: &S,
) -> Option<&'a FormatVariant>
where
    S: SupportTest + ?Sized,
{
    variants.find(|v| support.is_supported(v.signature))
}

fn resolve_explicit<S>(
    codec: VideoCodec,
    container: ContainerFormat,
    support: &S,
) -> Option<&'static FormatVariant>
where
    S: SupportTest + ?Sized,
{
    let requested = variants_for(codec);

    if let Some(exact) = first_supported(requested.iter().filter(|v| v.container == container), support) {
        return Some(exact);
    }

    // Keep the container, swap the codec
    let same_container = VideoCodec::PRIORITY
        .iter()
        .filter(|&&other| other != codec)
        .flat_map(|&other| variants_for(other).iter())
        .filter(|v| v.container == container);
    if let Some(variant) = first_supported(same_container, support) {
        return Some(variant);
    }

    first_supported(requested.iter(), support)
}

fn resolve_ranked<S>(support: &S) -> Option<&'static FormatVariant>
where
    S: SupportTest + ?Sized,
{
    VideoCodec::PRIORITY.iter().find_map(|&codec| {
        let variants = variants_for(codec);
        let by_container = ContainerFormat::PRIORITY
            .iter()
            .flat_map(|&k| variants.iter().filter(move |v| v.container == k));
        first_supported(by_container, support)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Preference::{Auto, Explicit};

    fn only(supported: &'static [&'static str]) -> impl Fn(&str) -> bool {
        move |sig: &str| supported.iter().any(|s| *s == sig)
    }

    fn nothing(_: &str) -> bool {
        false
    }

    #[test]
    fn test_auto_picks_only_supported_vp9_webm() {
        let support = only(&["video/webm; codecs=\"vp9\""]);
        let resolved = resolve_format(Auto, Auto, &support).unwrap();
        assert_eq!(resolved.codec, "vp9");
        assert_eq!(resolved.container, ContainerFormat::WebM);
        assert_eq!(resolved.label, "VP9 (WEBM)");
        assert_eq!(resolved.outcome, NegotiationOutcome::AsRequested);
    }

    #[test]
    fn test_explicit_pair_exact_match() {
        let support = only(&[
            "video/mp4; codecs=\"avc1\"",
            "video/webm; codecs=\"vp9\"",
        ]);
        let resolved =
            resolve_format(Explicit(VideoCodec::H264), Explicit(ContainerFormat::Mp4), &support)
                .unwrap();
        assert_eq!(resolved.signature, "video/mp4; codecs=\"avc1\"");
        assert_eq!(resolved.label, "H.264 (MP4)");
        assert_eq!(resolved.outcome, NegotiationOutcome::AsRequested);
    }

    #[test]
    fn test_explicit_container_wins_over_codec() {
        let support = only(&[
            "video/mp4; codecs=\"avc1.42E01E\"",
            "video/x-matroska; codecs=\"vp9\"",
        ]);
        let resolved =
            resolve_format(Explicit(VideoCodec::H264), Explicit(ContainerFormat::Mkv), &support)
                .unwrap();
        assert_eq!(resolved.codec, "vp9");
        assert_eq!(resolved.container, ContainerFormat::Mkv);
        assert_eq!(resolved.outcome, NegotiationOutcome::CodecSubstituted);
    }

    #[test]
    fn test_explicit_container_scan_follows_codec_priority() {
        let support = only(&[
            "video/x-matroska; codecs=\"vp9\"",
            "video/x-matroska; codecs=\"hvc1\"",
        ]);
        let resolved =
            resolve_format(Explicit(VideoCodec::H264), Explicit(ContainerFormat::Mkv), &support)
                .unwrap();
        assert_eq!(resolved.codec, "hevc");
    }

    #[test]
    fn test_explicit_falls_back_to_requested_codec_any_container() {
        let support = only(&["video/mp4; codecs=\"avc1\"", "video/webm; codecs=\"vp9\""]);
        let resolved =
            resolve_format(Explicit(VideoCodec::H264), Explicit(ContainerFormat::Mkv), &support)
                .unwrap();
        assert_eq!(resolved.codec, "h264");
        assert_eq!(resolved.container, ContainerFormat::Mp4);
        assert_eq!(resolved.outcome, NegotiationOutcome::ContainerSubstituted);
    }

    #[test]
    fn test_auto_prefers_codec_then_container_ranking() {
        let support = only(&[
            "video/webm; codecs=\"vp9\"",
            "video/mp4; codecs=\"avc1\"",
            "video/x-matroska; codecs=\"avc1\"",
        ]);
        let resolved = resolve_format(Auto, Auto, &support).unwrap();
        assert_eq!(resolved.codec, "h264");
        assert_eq!(resolved.container, ContainerFormat::Mkv);
    }

    #[test]
    fn test_explicit_codec_auto_container_uses_ranked_order() {
        let support = only(&[
            "video/x-matroska; codecs=\"av01\"",
            "video/webm; codecs=\"vp9\"",
        ]);
        let resolved = resolve_format(Explicit(VideoCodec::Vp9), Auto, &support).unwrap();
        assert_eq!(resolved.label, "AV1 (MKV)");
        assert_eq!(resolved.outcome, NegotiationOutcome::CodecSubstituted);

        let support = only(&["video/webm; codecs=\"vp9\""]);
        let resolved = resolve_format(Explicit(VideoCodec::Vp9), Auto, &support).unwrap();
        assert_eq!(resolved.codec, "vp9");
        assert_eq!(resolved.outcome, NegotiationOutcome::AsRequested);
    }

    #[test]
    fn test_auto_codec_explicit_container_uses_ranked_order() {
        let support = only(&[
            "video/x-matroska; codecs=\"vp9\"",
            "video/webm; codecs=\"vp9\"",
        ]);
        let resolved = resolve_format(Auto, Explicit(ContainerFormat::WebM), &support).unwrap();
        assert_eq!(resolved.label, "VP9 (MKV)");
        assert_eq!(resolved.outcome, NegotiationOutcome::ContainerSubstituted);

        let support = only(&["video/webm; codecs=\"vp9\""]);
        let resolved = resolve_format(Auto, Explicit(ContainerFormat::WebM), &support).unwrap();
        assert_eq!(resolved.container, ContainerFormat::WebM);
        assert_eq!(resolved.outcome, NegotiationOutcome::AsRequested);
    }

    #[test]
    fn test_last_resort_in_order() {
        let support = only(&["video/webm", "video/webm; codecs=\"vp8\""]);
        let resolved = resolve_format(Auto, Auto, &support).unwrap();
        assert_eq!(resolved.codec, "vp8");
        assert_eq!(resolved.label, "VP8 (WEBM)");
        assert_eq!(resolved.outcome, NegotiationOutcome::LastResort);

        let support = only(&["video/webm"]);
        let resolved =
            resolve_format(Explicit(VideoCodec::Av1), Explicit(ContainerFormat::Mp4), &support)
                .unwrap();
        assert_eq!(resolved.signature, "video/webm");
        assert_eq!(resolved.outcome, NegotiationOutcome::LastResort);
    }

    #[test]
    fn test_nothing_supported() {
        let err = resolve_format(Auto, Auto, &nothing).unwrap_err();
        assert_eq!(
            err,
            NegotiationError::NoSupportedFormat {
                codec: Auto,
                container: Auto
            }
        );
    }

    #[test]
    fn test_negotiation_is_deterministic() {
        let support = only(&[
            "video/mp4; codecs=\"hev1\"",
            "video/webm; codecs=\"vp9\"",
            "video/x-matroska; codecs=\"vp9\"",
        ]);
        let prefs = [
            (Auto, Auto),
            (Explicit(VideoCodec::H264), Explicit(ContainerFormat::Mkv)),
            (Explicit(VideoCodec::Hevc), Auto),
        ];
        for (codec, container) in prefs {
            let first = resolve_format(codec, container, &support);
            let second = resolve_format(codec, container, &support);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_list_codec_support() {
        let support = only(&["video/mp4; codecs=\"avc1\"", "video/webm; codecs=\"vp9\""]);
        let report = list_codec_support(&support);
        let flags: Vec<(VideoCodec, bool)> = report.iter().map(|a| (a.codec, a.supported)).collect();
        assert_eq!(
            flags,
            vec![
                (VideoCodec::Av1, false),
                (VideoCodec::Hevc, false),
                (VideoCodec::H264, true),
                (VideoCodec::Vp9, true),
            ]
        );

        let json = serde_json::to_value(&report[2]).unwrap();
        assert_eq!(json["codec"], "h264");
        assert_eq!(json["label"], "H.264");
        assert_eq!(json["supported"], true);
    }

    #[test]
    fn test_dyn_support_test() {
        let boxed: Box<dyn SupportTest> = Box::new(only(&["video/webm; codecs=\"vp9\""]));
        let resolved = resolve_format(Auto, Auto, boxed.as_ref()).unwrap();
        assert_eq!(resolved.codec, "vp9");
    }
}
