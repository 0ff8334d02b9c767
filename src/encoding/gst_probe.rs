// GStreamer-backed support test
//
// A signature is supported when its container's muxer exists, the container
// can carry the codec, and at least one encoder element for the codec is
// installed. Results are cached per signature since registry lookups are
// not free and negotiation asks about the same strings repeatedly.

use std::collections::HashMap;

use gstreamer as gst;
use parking_lot::Mutex;

use super::candidates::{EncoderSignature, UNSPECIFIED_CODEC};
use super::{gst_encoders, ContainerFormat, SupportTest};
use crate::gstreamer_init::init_gstreamer;

/// Codec the runtime picks for untagged WebM signatures
const WEBM_DEFAULT_CODEC: &str = "vp8";

/// Answers support queries from the GStreamer plugin registry
pub struct GstSupportTest {
    cache: Mutex<HashMap<String, bool>>,
}

impl GstSupportTest {
    /// Returns None when GStreamer failed to initialize
    pub fn new() -> Option<Self> {
        if !init_gstreamer() {
            return None;
        }
        Some(Self {
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// First installed encoder element for a codec id
    pub fn find_encoder(codec_id: &str) -> Option<&'static str> {
        let codec_id = if codec_id == UNSPECIFIED_CODEC {
            WEBM_DEFAULT_CODEC
        } else {
            codec_id
        };
        gst_encoders(codec_id)
            .iter()
            .copied()
            .find(|name| gst::ElementFactory::find(name).is_some())
    }

    fn probe(signature: &str) -> bool {
        let Some(parsed) = EncoderSignature::parse(signature) else {
            log::debug!("Unrecognised signature {:?}", signature);
            return false;
        };
        let Some(codec_id) = parsed.codec_id() else {
            return false;
        };

        let muxer = parsed.container.gst_muxer();
        if gst::ElementFactory::find(muxer).is_none() {
            log::debug!("{} unavailable for {:?}", muxer, signature);
            return false;
        }

        let carriable = codec_id == UNSPECIFIED_CODEC && parsed.container == ContainerFormat::WebM
            || parsed.container.accepts(codec_id);
        if !carriable {
            return false;
        }

        match Self::find_encoder(codec_id) {
            Some(encoder) => {
                log::debug!("{:?} supported via {}", signature, encoder);
                true
            }
            None => {
                log::debug!("No encoder element for {:?}", signature);
                false
            }
        }
    }
}

impl SupportTest for GstSupportTest {
    fn is_supported(&self, signature: &str) -> bool {
        if let Some(&known) = self.cache.lock().get(signature) {
            return known;
        }
        let supported = Self::probe(signature);
        self.cache.lock().insert(signature.to_string(), supported);
        supported
    }
}
