//! Overlay-window scoring.
//!
//! Each visible top-level window is scored by style and geometry traits
//! typical of cheating overlays (layered, topmost, click-through,
//! transparent, small and pinned to a screen edge). The per-window weights
//! are a contract; downstream consumers depend on them.

use crate::platform::types::{ScreenBounds, WindowRecord};
use serde::{Deserialize, Serialize};

/// Windows scoring below this are not considered overlays.
pub const OVERLAY_KEEP_THRESHOLD: f64 = 0.30;

/// Area under which a window counts as "small".
const SMALL_AREA_PX: i64 = 10_000;

/// Distance to a screen edge under which a small window counts as pinned.
const EDGE_MARGIN_PX: i32 = 5;

/// Process-name fragments that mark overlay tooling.
pub const SUSPICIOUS_PROCESS_NAMES: &[&str] = &[
    "cheat", "hack", "overlay", "inject", "hook", "bot", "trainer", "mod", "exploit", "bypass",
    "assist",
];

/// A window kept as an overlay candidate, with its score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayWindow {
    pub window_handle: String,
    pub pid: u32,
    pub process_name: String,
    pub bounds: OverlayBounds,
    pub z_order: i32,
    /// Effective opacity in [0,1]; 1.0 when no layered alpha is set.
    pub alpha: f64,
    pub extended_styles: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayBounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

fn is_small(window: &WindowRecord) -> bool {
    (window.width as i64) * (window.height as i64) < SMALL_AREA_PX
}

fn near_screen_edge(window: &WindowRecord, screens: &[ScreenBounds]) -> bool {
    screens.iter().any(|screen| {
        let right = screen.x + screen.width;
        let bottom = screen.y + screen.height;
        (window.x - screen.x).abs() <= EDGE_MARGIN_PX
            || (window.y - screen.y).abs() <= EDGE_MARGIN_PX
            || ((window.x + window.width) - right).abs() <= EDGE_MARGIN_PX
            || ((window.y + window.height) - bottom).abs() <= EDGE_MARGIN_PX
    })
}

fn has_suspicious_name(process_name: &str) -> bool {
    let name = process_name.to_lowercase();
    SUSPICIOUS_PROCESS_NAMES
        .iter()
        .any(|fragment| name.contains(fragment))
}

/// Score one window. The contributions and their weights are contractual.
pub fn score_window(window: &WindowRecord, screens: &[ScreenBounds]) -> f64 {
    let mut confidence: f64 = 0.0;

    if window.layered {
        confidence += 0.25;
    }
    if window.topmost {
        confidence += 0.30;
    }
    if window.tool_window {
        confidence += 0.15;
    }
    if let Some(alpha) = window.alpha {
        if alpha > 0 && alpha < 255 {
            confidence += ((255 - alpha as i32) as f64 / 255.0) * 0.35;
        }
    }
    if window.color_key {
        confidence += 0.20;
    }
    if is_small(window) {
        confidence += 0.15;
        if near_screen_edge(window, screens) {
            confidence += 0.10;
        }
    }
    if has_suspicious_name(&window.process_name) {
        confidence += 0.40;
    }
    if window.click_through {
        confidence += 0.25;
    }
    if window.no_activate {
        confidence += 0.15;
    }

    confidence.min(1.0)
}

fn extended_styles(window: &WindowRecord) -> Vec<String> {
    let mut styles = Vec::new();
    if window.layered {
        styles.push("layered".to_string());
    }
    if window.topmost {
        styles.push("topmost".to_string());
    }
    if window.tool_window {
        styles.push("toolwindow".to_string());
    }
    if window.click_through {
        styles.push("transparent".to_string());
    }
    if window.no_activate {
        styles.push("noactivate".to_string());
    }
    if window.color_key {
        styles.push("colorkey".to_string());
    }
    styles
}

/// Score all candidates and keep those at or above the keep threshold.
pub fn collect_overlays(windows: &[WindowRecord], screens: &[ScreenBounds]) -> Vec<OverlayWindow> {
    windows
        .iter()
        .filter_map(|window| {
            let confidence = score_window(window, screens);
            if confidence < OVERLAY_KEEP_THRESHOLD {
                return None;
            }
            Some(OverlayWindow {
                window_handle: window.handle.clone(),
                pid: window.pid,
                process_name: window.process_name.clone(),
                bounds: OverlayBounds {
                    x: window.x,
                    y: window.y,
                    width: window.width,
                    height: window.height,
                },
                z_order: window.z_order,
                alpha: window.alpha.map(|a| a as f64 / 255.0).unwrap_or(1.0),
                extended_styles: extended_styles(window),
                confidence,
            })
        })
        .collect()
}

/// Aggregate confidence over the kept overlay set.
///
/// `0.6·avg + 0.15·(n−1) + (max ≥ 0.8 ? 0.25 : 0) + 0.10·hi`, clamped to
/// [0,1], where hi counts windows at confidence ≥ 0.7. Empty set scores 0.
pub fn aggregate_confidence(overlays: &[OverlayWindow]) -> f64 {
    if overlays.is_empty() {
        return 0.0;
    }

    let n = overlays.len() as f64;
    let sum: f64 = overlays.iter().map(|o| o.confidence).sum();
    let avg = sum / n;
    let max = overlays
        .iter()
        .map(|o| o.confidence)
        .fold(0.0_f64, f64::max);
    let hi = overlays.iter().filter(|o| o.confidence >= 0.7).count() as f64;

    let score = 0.6 * avg + 0.15 * (n - 1.0) + if max >= 0.8 { 0.25 } else { 0.0 } + 0.10 * hi;
    score.clamp(0.0, 1.0)
}
