//! The capture pipeline: measure, clone, synchronize, package, rasterize.
//!
//! Each capture is internally sequential apart from one genuine parallel
//! wait, the fan-out over descendant image loads. Captures share no
//! mutable state; a caller may run many concurrently as long as it does
//! not hand the same reuse buffer to two of them at once.

use base64::Engine as _;
use futures::future::join_all;
use log::debug;
use serde::Serialize;
use tiny_skia::{Pixmap, PixmapPaint, Transform};

use crate::dom::NodeHandle;
use crate::style::{Priority, StyleSource};
use crate::{geometry, packager, sync};
use crate::{CaptureConfig, DeviceMetrics, Error, Result};

const SVG_NS: &str = "http://www.w3.org/2000/svg";

/// Decodes an SVG-wrapped markup payload into pixels.
///
/// The wrapped markup arrives as a `data:image/svg+xml;base64,` URI. A
/// decode failure is fatal to the capture that submitted it; it is never
/// retried.
pub trait Rasterize {
    fn decode(&self, data_uri: &str) -> impl std::future::Future<Output = Result<Pixmap>>;
}

/// A reusable raster surface owned by the caller.
///
/// Its stored dimensions always equal the device-pixel dimensions of the
/// last successful capture into it.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pixmap: Pixmap,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let pixmap = Pixmap::new(width, height).ok_or(Error::BufferError(width, height))?;
        Ok(Self { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// Raw premultiplied RGBA bytes.
    pub fn data(&self) -> &[u8] {
        self.pixmap.data()
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn into_pixmap(self) -> Pixmap {
        self.pixmap
    }

    fn clear(&mut self) {
        self.pixmap.fill(tiny_skia::Color::TRANSPARENT);
    }

    // Maps the decoded image onto the CSS-pixel extent, then applies the
    // device-pixel-ratio scale, filling the buffer edge to edge.
    fn draw_scaled(&mut self, image: &Pixmap, css_width: u32, css_height: u32, scale: f64) {
        if image.width() == 0 || image.height() == 0 {
            return;
        }
        let sx = scale as f32 * css_width as f32 / image.width() as f32;
        let sy = scale as f32 * css_height as f32 / image.height() as f32;
        self.pixmap.draw_pixmap(
            0,
            0,
            image.as_ref(),
            &PixmapPaint::default(),
            Transform::from_scale(sx, sy),
            None,
        );
    }
}

/// Self-describing rasterization request. Given a deterministic
/// rasterizer, the outcome is a pure function of these fields.
#[derive(Debug, Clone, Serialize)]
pub struct RasterRequest {
    /// Embeddable markup payload
    pub payload: String,
    /// Intrinsic width in CSS pixels
    pub css_width: u32,
    /// Intrinsic height in CSS pixels
    pub css_height: u32,
    /// Device pixel ratio applied by the rasterizer
    pub scale: f64,
    /// Backing-store width in device pixels
    pub device_width: u32,
    /// Backing-store height in device pixels
    pub device_height: u32,
}

impl RasterRequest {
    /// Wrap the payload in an SVG document declaring the device-pixel
    /// canvas size and a CSS-pixel viewBox, so the rasterizer applies the
    /// scale itself.
    pub fn to_svg(&self) -> String {
        format!(
            "<svg xmlns=\"{ns}\" width=\"{dw}\" height=\"{dh}\" viewBox=\"0 0 {cw} {ch}\"><foreignObject x=\"0\" y=\"0\" width=\"{cw}\" height=\"{ch}\">{payload}</foreignObject></svg>",
            ns = SVG_NS,
            dw = self.device_width,
            dh = self.device_height,
            cw = self.css_width,
            ch = self.css_height,
            payload = self.payload,
        )
    }

    pub fn to_data_uri(&self) -> String {
        format!(
            "data:image/svg+xml;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(self.to_svg())
        )
    }
}

/// Per-capture options.
#[derive(Debug)]
pub struct CaptureOptions {
    /// Opacity forced onto the clone root, clamped to `[0, 1]`
    pub opacity: f64,
    /// Buffer to reuse when its device-pixel dimensions match exactly
    pub reuse: Option<PixelBuffer>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            reuse: None,
        }
    }
}

impl CaptureOptions {
    pub fn with_opacity(opacity: f64) -> Self {
        Self {
            opacity,
            ..Self::default()
        }
    }

    pub fn reusing(buffer: PixelBuffer) -> Self {
        Self {
            reuse: Some(buffer),
            ..Self::default()
        }
    }
}

/// Drives the full capture pipeline against host-supplied collaborators.
pub struct Capturer<S, R, D> {
    styles: S,
    rasterizer: R,
    metrics: D,
    config: CaptureConfig,
}

impl<S, R, D> Capturer<S, R, D>
where
    S: StyleSource,
    R: Rasterize,
    D: DeviceMetrics,
{
    pub fn new(styles: S, rasterizer: R, metrics: D) -> Self {
        Self::with_config(styles, rasterizer, metrics, CaptureConfig::default())
    }

    pub fn with_config(styles: S, rasterizer: R, metrics: D, config: CaptureConfig) -> Self {
        Self {
            styles,
            rasterizer,
            metrics,
            config,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn styles(&self) -> &S {
        &self.styles
    }

    /// Rasterize `element` into a pixel buffer sized for the current
    /// device pixel ratio.
    ///
    /// Waits for every descendant image to settle first (a failed load
    /// counts as settled; a never-settling one suspends this capture
    /// indefinitely). The supplied reuse buffer is returned when its
    /// dimensions match the computed device-pixel dimensions exactly;
    /// otherwise a fresh buffer is allocated.
    pub async fn capture(
        &self,
        element: &NodeHandle,
        options: CaptureOptions,
    ) -> Result<PixelBuffer> {
        let CaptureOptions { opacity, reuse } = options;

        let images: Vec<NodeHandle> = element
            .descendant_elements()
            .into_iter()
            .filter(|n| n.tag() == Some("img"))
            .collect();
        join_all(images.iter().map(|img| img.image_ready())).await;

        let rect = self.styles.bounding_box(element);
        let full_height = geometry::full_element_height(element, &self.styles, &self.config);
        let css_width = rect.width.max(0.0).ceil() as u32;
        let css_height = (full_height.max(0.0).ceil() + self.config.edge_buffer_px) as u32;

        let scale = {
            let ratio = self.metrics.device_pixel_ratio();
            if ratio.is_finite() && ratio > 0.0 {
                ratio
            } else {
                1.0
            }
        };
        let device_width = (css_width as f64 * scale).ceil() as u32;
        let device_height = (css_height as f64 * scale).ceil() as u32;

        let mut buffer = match reuse {
            Some(existing)
                if existing.width() == device_width && existing.height() == device_height =>
            {
                existing
            }
            _ => PixelBuffer::new(device_width, device_height)?,
        };

        let clone = element.clone_subtree();
        let report = sync::sync_subtree(element, &clone, &self.styles);
        debug!(
            "synchronized {} elements ({} properties, {} dropped, {} subtrees skipped)",
            report.elements_visited,
            report.properties_written,
            report.property_failures,
            report.subtree_failures
        );

        let forced = [
            ("opacity", format!("{}", opacity.clamp(0.0, 1.0))),
            ("margin", "0px".to_string()),
            ("width", format!("{css_width}px")),
            ("height", format!("{css_height}px")),
            ("overflow", "visible".to_string()),
        ];
        for (name, value) in &forced {
            let _ = clone.set_style_property(name, value, Priority::Normal);
        }

        let payload = packager::package_markup(&clone)?;
        let request = RasterRequest {
            payload,
            css_width,
            css_height,
            scale,
            device_width,
            device_height,
        };
        debug!(
            "rasterizing {}x{} css at scale {} into {}x{} device pixels",
            request.css_width,
            request.css_height,
            request.scale,
            request.device_width,
            request.device_height
        );

        let image = self.rasterizer.decode(&request.to_data_uri()).await?;

        buffer.clear();
        buffer.draw_scaled(&image, css_width, css_height, scale);
        Ok(buffer)
    }
}
