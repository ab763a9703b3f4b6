//! Domsnap
//!
//! Rasterizes a live, styled element subtree into a pixel buffer that
//! matches its on-screen appearance — computed styles, form-control
//! state and arbitrary nested markup included. Layout, cascade
//! resolution and pixel decoding stay with the host: domsnap captures a
//! computed visual state onto a detached clone, serializes it as an SVG
//! foreign-content island, and drives it through a pluggable rasterizer
//! into a reusable pixel buffer.
//!
//! # Features
//!
//! - **resvg backend** (default): decodes the wrapped payload via
//!   `usvg`/`resvg`
//! - **Pluggable collaborators**: the style/layout engine, rasterizer
//!   and device metrics are traits the host implements
//! - **Best-effort capture**: partial style-sync failures degrade the
//!   image instead of aborting it
//!
//! # Example
//!
//! ```no_run
//! use domsnap::dom::NodeHandle;
//! use domsnap::resvg_backend::ResvgRasterizer;
//! use domsnap::style::{BoundingBox, ComputedStyle, StyleTable};
//! use domsnap::{CaptureOptions, Capturer, StaticDeviceMetrics};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let card = NodeHandle::parse("<div class=\"card\"><p>Hello</p></div>")?;
//! let mut styles = StyleTable::new();
//! styles.insert(
//!     &card,
//!     ComputedStyle::from_pairs([("background-color", "white")]),
//!     BoundingBox::new(0.0, 0.0, 320.0, 120.0),
//! );
//!
//! let capturer = Capturer::new(styles, ResvgRasterizer::new(), StaticDeviceMetrics::new(2.0));
//! let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build()?;
//! let buffer = runtime.block_on(capturer.capture(&card, CaptureOptions::default()))?;
//! println!("captured {}x{} device pixels", buffer.width(), buffer.height());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod dom;
pub mod style;

pub mod geometry;
pub mod packager;
pub mod sync;

pub mod capture;

// resvg-backed rasterizer (default backend)
#[cfg(feature = "resvg")]
pub mod resvg_backend;

// Re-export the pipeline types at the crate root for ergonomic use
pub use capture::{CaptureOptions, Capturer, PixelBuffer, RasterRequest, Rasterize};
pub use style::StyleSource;
pub use sync::SyncReport;

/// Configuration for the capture pipeline
///
/// The defaults reproduce the empirically tuned margins of the capture
/// path: a 20px buffer below the measured element so nothing is clipped
/// at the bottom edge, and a 5px safety margin absorbing sub-pixel
/// rounding in border-box height resolution.
///
/// # Examples
///
/// ```
/// let cfg = domsnap::CaptureConfig::default();
/// assert_eq!(cfg.edge_buffer_px, 20.0);
/// ```
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Extra CSS pixels reserved below the measured element
    pub edge_buffer_px: f64,
    /// Safety margin added to border-box height resolution
    pub rounding_safety_px: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            edge_buffer_px: 20.0,
            rounding_safety_px: 5.0,
        }
    }
}

/// Reports the scale factor between CSS pixels and device pixels.
pub trait DeviceMetrics {
    fn device_pixel_ratio(&self) -> f64;
}

/// Fixed device-pixel-ratio source. Defaults to 1.0, the fallback used
/// when the host has no display metric available.
#[derive(Debug, Clone, Copy)]
pub struct StaticDeviceMetrics {
    ratio: f64,
}

impl StaticDeviceMetrics {
    pub fn new(ratio: f64) -> Self {
        Self { ratio }
    }
}

impl Default for StaticDeviceMetrics {
    fn default() -> Self {
        Self { ratio: 1.0 }
    }
}

impl DeviceMetrics for StaticDeviceMetrics {
    fn device_pixel_ratio(&self) -> f64 {
        self.ratio
    }
}
