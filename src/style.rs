//! Computed-style snapshots and the style-source collaborator.
//!
//! The crate never resolves the cascade itself. A host embeds its layout
//! and style engine behind [`StyleSource`], handing the replicator fully
//! resolved per-element snapshots and viewport-relative bounding boxes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::dom::NodeHandle;

/// Declaration priority, mirroring the `!important` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    Important,
}

/// One resolved declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleEntry {
    pub name: String,
    pub value: String,
    #[serde(default = "Priority::normal")]
    pub priority: Priority,
}

impl Priority {
    fn normal() -> Self {
        Priority::Normal
    }
}

/// Ordered snapshot of every resolved style property for one element.
///
/// Captured per synchronization call and discarded afterwards; snapshots
/// are never cached across calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComputedStyle {
    entries: Vec<StyleEntry>,
}

impl ComputedStyle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from `(name, value)` pairs at normal priority.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut style = Self::new();
        for (name, value) in pairs {
            style.push(name, value, Priority::Normal);
        }
        style
    }

    pub fn push(&mut self, name: &str, value: &str, priority: Priority) {
        self.entries.push(StyleEntry {
            name: name.to_string(),
            value: value.to_string(),
            priority,
        });
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &StyleEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Viewport-relative box of an element, in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Resolves computed styles and geometry for live elements.
///
/// Implementations typically bridge to the host's layout/style engine.
/// An element unknown to the source resolves to an empty snapshot and a
/// zero box rather than an error; capture degrades instead of aborting.
pub trait StyleSource {
    fn computed_style(&self, element: &NodeHandle) -> ComputedStyle;
    fn bounding_box(&self, element: &NodeHandle) -> BoundingBox;
}

/// In-memory [`StyleSource`] keyed by node identity.
///
/// Useful for hosts that precompute resolved styles, and for driving the
/// pipeline in tests.
#[derive(Debug, Default)]
pub struct StyleTable {
    styles: HashMap<usize, ComputedStyle>,
    boxes: HashMap<usize, BoundingBox>,
}

impl StyleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_style(&mut self, element: &NodeHandle, style: ComputedStyle) {
        self.styles.insert(element.id(), style);
    }

    pub fn insert_box(&mut self, element: &NodeHandle, bounds: BoundingBox) {
        self.boxes.insert(element.id(), bounds);
    }

    pub fn insert(&mut self, element: &NodeHandle, style: ComputedStyle, bounds: BoundingBox) {
        self.insert_style(element, style);
        self.insert_box(element, bounds);
    }
}

impl StyleSource for StyleTable {
    fn computed_style(&self, element: &NodeHandle) -> ComputedStyle {
        self.styles.get(&element.id()).cloned().unwrap_or_default()
    }

    fn bounding_box(&self, element: &NodeHandle) -> BoundingBox {
        self.boxes.get(&element.id()).copied().unwrap_or_default()
    }
}

/// Parse a CSS pixel length ("12.5px") into its numeric value.
///
/// Malformed or non-px values resolve to 0.0, matching the lenient
/// number handling of the measurement path.
pub fn parse_px(value: &str) -> f64 {
    let trimmed = value.trim();
    let number = trimmed.strip_suffix("px").unwrap_or(trimmed).trim_end();
    number.parse::<f64>().unwrap_or(0.0)
}
