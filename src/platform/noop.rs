//! Noop probe implementations.
//!
//! These exist so the crate compiles and the pure detection logic stays
//! testable on targets without a supported window system, clipboard, or
//! idle clock. They observe nothing.

use crate::platform::types::{
    ClipboardCapture, DisplayRecord, ForegroundInfo, ScreenBounds, WindowRecord,
};
use crate::platform::{ClipboardSource, InputStateSource, ScreenSource};

pub struct NoopScreenSource;

impl ScreenSource for NoopScreenSource {
    fn overlay_candidates(&mut self) -> Vec<WindowRecord> {
        Vec::new()
    }

    fn screens(&mut self) -> Vec<ScreenBounds> {
        Vec::new()
    }

    fn displays(&mut self) -> Vec<DisplayRecord> {
        Vec::new()
    }

    fn virtual_cameras(&mut self) -> Vec<String> {
        Vec::new()
    }
}

pub struct NoopInputStateSource;

impl InputStateSource for NoopInputStateSource {
    fn idle_seconds(&mut self) -> Option<u64> {
        None
    }

    fn foreground(&mut self) -> Option<ForegroundInfo> {
        None
    }
}

pub struct NoopClipboardSource;

impl ClipboardSource for NoopClipboardSource {
    fn poll(&mut self) -> Option<ClipboardCapture> {
        None
    }
}
