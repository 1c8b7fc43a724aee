//! Image liveness probing and tolerant decoding.

use std::io::Read;

use image::DynamicImage;
use log::debug;
use zune_core::{colorspace::ColorSpace, options::DecoderOptions};
use zune_jpeg::JpegDecoder;

use crate::booru::danbooru::build_agent;
use crate::config::ApiConfig;

/// Downloads larger than this are treated as broken.
const MAX_PROBE_BYTES: u64 = 64 * 1024 * 1024;

/// Answers whether an image URL still serves a decodable image.
pub trait ImageProbe: Send + Sync {
    fn probe(&self, url: &str) -> bool;
}

/// Probe that downloads the image and decodes it.
pub struct HttpImageProbe {
    http_client: ureq::Agent,
}

impl HttpImageProbe {
    pub fn new(api: &ApiConfig) -> Self {
        Self {
            http_client: build_agent(api),
        }
    }

    fn download(&self, url: &str) -> Option<Vec<u8>> {
        let response = match self.http_client.get(url).call() {
            Ok(response) => response,
            Err(error) => {
                debug!("Image probe request for {} failed: {}", url, error);
                return None;
            }
        };
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_PROBE_BYTES + 1)
            .read_to_end(&mut bytes)
            .ok()?;
        if bytes.is_empty() || bytes.len() as u64 > MAX_PROBE_BYTES {
            debug!("Image probe for {} read {} bytes", url, bytes.len());
            return None;
        }
        Some(bytes)
    }
}

impl ImageProbe for HttpImageProbe {
    fn probe(&self, url: &str) -> bool {
        self.download(url)
            .is_some_and(|bytes| decode_image_from_memory_with_fallback(&bytes).is_some())
    }
}

fn looks_like_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0xff && bytes[1] == 0xd8
}

fn decode_jpeg_non_strict(bytes: &[u8]) -> Option<DynamicImage> {
    if !looks_like_jpeg(bytes) {
        return None;
    }

    let options = DecoderOptions::new_cmd()
        .set_strict_mode(false)
        .jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(bytes, options);
    let pixels = decoder.decode().ok()?;
    let (width, height) = decoder.dimensions()?;
    let image = image::RgbaImage::from_raw(width as u32, height as u32, pixels)?;
    Some(DynamicImage::ImageRgba8(image))
}

/// Decodes with the `image` crate first, then retries JPEG bytes leniently.
pub fn decode_image_from_memory_with_fallback(bytes: &[u8]) -> Option<DynamicImage> {
    image::load_from_memory(bytes)
        .ok()
        .or_else(|| decode_jpeg_non_strict(bytes))
}
