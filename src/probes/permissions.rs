//! Permission predicates.
//!
//! Read-only checks for the privacy permissions the sensors depend on.
//! The `request_*` variants open the OS privacy pane and return
//! immediately; nothing here ever blocks on user interaction. Platforms
//! without a permission model report everything granted.

/// Whether the process may drive the accessibility APIs (window titles,
/// frontmost application).
pub fn accessibility_granted() -> bool {
    #[cfg(target_os = "macos")]
    {
        return macos::accessibility_trusted();
    }
    #[allow(unreachable_code)]
    true
}

/// Whether the process may capture screen contents / enumerate windows
/// with titles.
pub fn screen_recording_granted() -> bool {
    #[cfg(target_os = "macos")]
    {
        return core_graphics::access::ScreenCaptureAccess::default().preflight();
    }
    #[allow(unreachable_code)]
    true
}

/// Whether the process may observe global input (idle timing).
pub fn input_monitoring_granted() -> bool {
    #[cfg(target_os = "macos")]
    {
        return macos::input_monitoring_granted();
    }
    #[allow(unreachable_code)]
    true
}

/// Open the accessibility privacy pane. Returns without waiting.
pub fn request_accessibility() {
    #[cfg(target_os = "macos")]
    macos::open_privacy_pane("Privacy_Accessibility");
}

/// Open the screen-recording privacy pane. Returns without waiting.
pub fn request_screen_recording() {
    #[cfg(target_os = "macos")]
    macos::open_privacy_pane("Privacy_ScreenCapture");
}

/// Open the input-monitoring privacy pane. Returns without waiting.
pub fn request_input_monitoring() {
    #[cfg(target_os = "macos")]
    macos::open_privacy_pane("Privacy_ListenEvent");
}

#[cfg(target_os = "macos")]
mod macos {
    #[link(name = "ApplicationServices", kind = "framework")]
    extern "C" {
        fn AXIsProcessTrusted() -> bool;
    }

    #[link(name = "IOKit", kind = "framework")]
    extern "C" {
        // kIOHIDRequestTypeListenEvent = 1; returns kIOHIDAccessTypeGranted = 0.
        fn IOHIDCheckAccess(request: u32) -> u32;
    }

    pub fn accessibility_trusted() -> bool {
        unsafe { AXIsProcessTrusted() }
    }

    pub fn input_monitoring_granted() -> bool {
        unsafe { IOHIDCheckAccess(1) == 0 }
    }

    pub fn open_privacy_pane(anchor: &str) {
        let url = format!("x-apple.systempreferences:com.apple.preference.security?{anchor}");
        if let Err(e) = std::process::Command::new("open").arg(url).spawn() {
            tracing::warn!(error = %e, anchor, "could not open privacy pane");
        }
    }
}
