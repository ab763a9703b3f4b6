//! resvg-backed rasterizer backend.
//!
//! Decodes the SVG-wrapped payload with `usvg` and renders it with
//! `resvg` into a `Pixmap`. Fidelity for foreign-content islands is
//! bounded by what the resvg feature set supports; unsupported content
//! rasterizes to its supported subset rather than failing the capture.

use base64::Engine as _;
use tiny_skia::Pixmap;

use crate::capture::Rasterize;
use crate::{Error, Result};

const BASE64_PREFIX: &str = "data:image/svg+xml;base64,";
const PLAIN_PREFIX: &str = "data:image/svg+xml";

/// Stateless [`Rasterize`] implementation over resvg.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResvgRasterizer;

impl ResvgRasterizer {
    pub fn new() -> Self {
        Self
    }
}

impl Rasterize for ResvgRasterizer {
    async fn decode(&self, data_uri: &str) -> Result<Pixmap> {
        let svg = svg_bytes(data_uri)?;
        let options = usvg::Options::default();
        let tree = usvg::Tree::from_data(&svg, &options)
            .map_err(|e| Error::RasterizeError(format!("SVG parse failed: {e}")))?;

        let size = tree.size().to_int_size();
        let mut pixmap = Pixmap::new(size.width(), size.height())
            .ok_or(Error::BufferError(size.width(), size.height()))?;
        resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());
        Ok(pixmap)
    }
}

fn svg_bytes(data_uri: &str) -> Result<Vec<u8>> {
    if let Some(encoded) = data_uri.strip_prefix(BASE64_PREFIX) {
        return base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::RasterizeError(format!("invalid base64 payload: {e}")));
    }
    if let Some(rest) = data_uri.strip_prefix(PLAIN_PREFIX) {
        // "data:image/svg+xml;charset=utf-8,<svg .../>" style URIs
        if let Some((_, body)) = rest.split_once(',') {
            return Ok(body.as_bytes().to_vec());
        }
    }
    Err(Error::RasterizeError(
        "expected a data:image/svg+xml URI".to_string(),
    ))
}
