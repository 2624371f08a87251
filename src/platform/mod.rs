//! Platform probe layer.
//!
//! Watchers consume typed observations through the source traits below;
//! platform-specific modules implement them over OS facilities. The
//! portable sources (sysinfo-backed) work on every target and are the
//! fallback wherever an OS module has nothing better to offer.

pub mod generic;
pub mod noop;
pub mod types;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "windows")]
pub mod windows;

use types::{
    ClipboardCapture, DisplayRecord, ForegroundInfo, InputDeviceRecord, NetworkInterfaceRecord,
    ProcessRecord, ScreenBounds, StorageDevice, WindowRecord,
};

/// Lists running processes with pid/name/path and, where the platform can,
/// loaded modules.
pub trait ProcessSource: Send {
    fn processes(&mut self) -> Vec<ProcessRecord>;
}

/// Enumerates storage devices; removable devices are marked external.
pub trait StorageSource: Send {
    fn devices(&mut self) -> Vec<StorageDevice>;
}

/// Window, display and virtual-camera observations for the screen watcher.
pub trait ScreenSource: Send {
    /// Visible top-level windows with overlay-relevant attributes.
    fn overlay_candidates(&mut self) -> Vec<WindowRecord>;

    /// Bounds of each attached screen, for edge-adjacency checks.
    fn screens(&mut self) -> Vec<ScreenBounds>;

    fn displays(&mut self) -> Vec<DisplayRecord>;

    fn virtual_cameras(&mut self) -> Vec<String>;

    /// Whether a desktop-duplication consumer is actively pulling frames.
    fn duplication_active(&mut self) -> bool {
        false
    }
}

/// Idle clock and foreground window state for the focus/idle watcher.
pub trait InputStateSource: Send {
    /// Seconds since the last user input, when the platform exposes it.
    fn idle_seconds(&mut self) -> Option<u64>;

    /// Foreground window / frontmost application. None when unavailable
    /// (e.g. missing accessibility permission); the watcher then assumes
    /// focused to avoid false positives.
    fn foreground(&mut self) -> Option<ForegroundInfo>;

    fn accessibility_granted(&self) -> bool {
        true
    }
}

/// Clipboard change observations.
pub trait ClipboardSource: Send {
    /// Return a capture when the clipboard changed since the last poll.
    fn poll(&mut self) -> Option<ClipboardCapture>;
}

/// Peripheral inventory for the smart-device policy engine.
pub trait InventorySource: Send {
    fn input_devices(&mut self) -> Vec<InputDeviceRecord>;
    fn network_interfaces(&mut self) -> Vec<NetworkInterfaceRecord>;
    fn display_count(&mut self) -> usize;
}

pub fn default_process_source() -> Box<dyn ProcessSource> {
    #[cfg(target_os = "windows")]
    {
        return Box::new(windows::WindowsProcessSource::new());
    }
    #[allow(unreachable_code)]
    Box::new(generic::PortableProcessSource::new())
}

pub fn default_storage_source() -> Box<dyn StorageSource> {
    Box::new(generic::PortableStorageSource::new())
}

pub fn default_screen_source() -> Box<dyn ScreenSource> {
    #[cfg(target_os = "windows")]
    {
        return Box::new(windows::WindowsScreenSource::new());
    }
    #[cfg(target_os = "macos")]
    {
        return Box::new(macos::MacScreenSource::new());
    }
    #[allow(unreachable_code)]
    Box::new(noop::NoopScreenSource)
}

pub fn default_input_state_source() -> Box<dyn InputStateSource> {
    #[cfg(target_os = "windows")]
    {
        return Box::new(windows::WindowsInputStateSource::new());
    }
    #[cfg(target_os = "macos")]
    {
        return Box::new(macos::MacInputStateSource::new());
    }
    #[allow(unreachable_code)]
    Box::new(noop::NoopInputStateSource)
}

pub fn default_clipboard_source() -> Box<dyn ClipboardSource> {
    #[cfg(target_os = "windows")]
    {
        return Box::new(windows::WindowsClipboardSource::new());
    }
    #[cfg(target_os = "macos")]
    {
        return Box::new(macos::MacClipboardSource::new());
    }
    #[allow(unreachable_code)]
    Box::new(noop::NoopClipboardSource)
}

pub fn default_inventory_source() -> Box<dyn InventorySource> {
    #[cfg(target_os = "windows")]
    {
        return Box::new(windows::WindowsInventorySource::new());
    }
    #[cfg(target_os = "macos")]
    {
        return Box::new(macos::MacInventorySource::new());
    }
    #[allow(unreachable_code)]
    Box::new(generic::PortableInventorySource::new())
}
