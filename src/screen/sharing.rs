//! Screen-sharing session classification.
//!
//! Fuses desktop-duplication activity, graphics-capture module indicators,
//! browser WebRTC module names and remote-desktop process names into typed
//! sessions. Sessions under the confidence threshold are discarded.

use crate::platform::types::{DisplayRecord, ProcessRecord};
use serde::{Deserialize, Serialize};

/// Sessions below this confidence are discarded.
pub const SESSION_CONFIDENCE_THRESHOLD: f64 = 0.75;

const BROWSER_NAMES: &[&str] = &["chrome", "firefox", "edge", "opera", "brave", "vivaldi"];

const WEBRTC_INDICATORS: &[&str] = &["webrtc", "getdisplaymedia", "screenshare", "desktop_capture"];

const GRAPHICS_CAPTURE_INDICATORS: &[&str] = &["graphicscapture", "windows.graphics.capture"];

const REMOTE_DESKTOP_NAMES: &[&str] = &[
    "mstsc", "teamviewer", "anydesk", "vncserver", "vncviewer", "rustdesk", "parsec",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SharingMethod {
    None,
    BrowserWebrtc,
    DesktopDuplication,
    Screencapturekit,
    ApplicationSharing,
    VirtualCamera,
    DisplayMirroring,
    RemoteDesktop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenSharingSession {
    pub method: SharingMethod,
    pub process_name: String,
    pub pid: u32,
    pub target_url: String,
    pub description: String,
    pub confidence: f64,
    pub is_active: bool,
}

fn module_hit(process: &ProcessRecord, indicators: &[&str]) -> bool {
    process.loaded_modules.iter().any(|module| {
        let module = module.to_lowercase();
        indicators.iter().any(|needle| module.contains(needle))
    })
}

fn is_browser(process: &ProcessRecord) -> bool {
    let name = process.name.to_lowercase();
    BROWSER_NAMES.iter().any(|browser| name.contains(browser))
}

/// Classify active sharing sessions from one probe's observations.
pub fn classify_sessions(
    processes: &[ProcessRecord],
    duplication_active: bool,
) -> Vec<ScreenSharingSession> {
    let mut sessions = Vec::new();

    if duplication_active {
        sessions.push(ScreenSharingSession {
            method: SharingMethod::DesktopDuplication,
            process_name: String::new(),
            pid: 0,
            target_url: String::new(),
            description: "DXGI output duplication is actively acquiring frames".to_string(),
            confidence: 0.8,
            is_active: true,
        });
    }

    for process in processes {
        if module_hit(process, GRAPHICS_CAPTURE_INDICATORS) {
            sessions.push(ScreenSharingSession {
                method: SharingMethod::ApplicationSharing,
                process_name: process.name.clone(),
                pid: process.pid,
                target_url: String::new(),
                description: "Windows Graphics Capture modules loaded".to_string(),
                confidence: 0.8,
                is_active: true,
            });
        }

        if is_browser(process) && module_hit(process, WEBRTC_INDICATORS) {
            sessions.push(ScreenSharingSession {
                method: SharingMethod::BrowserWebrtc,
                process_name: process.name.clone(),
                pid: process.pid,
                target_url: String::new(),
                description: "Browser WebRTC screen-capture modules loaded".to_string(),
                confidence: 0.8,
                is_active: true,
            });
        }

        let name = process.name.to_lowercase();
        if REMOTE_DESKTOP_NAMES.iter().any(|rd| name.contains(rd)) {
            sessions.push(ScreenSharingSession {
                method: SharingMethod::RemoteDesktop,
                process_name: process.name.clone(),
                pid: process.pid,
                target_url: String::new(),
                description: "Remote desktop tool running".to_string(),
                confidence: 0.85,
                is_active: true,
            });
        }
    }

    sessions.retain(|s| s.confidence >= SESSION_CONFIDENCE_THRESHOLD);
    sessions
}

/// A mirroring session when any display reports itself mirrored.
pub fn mirroring_session(displays: &[DisplayRecord]) -> Option<ScreenSharingSession> {
    let mirrored = displays.iter().find(|d| d.is_mirrored)?;
    Some(ScreenSharingSession {
        method: SharingMethod::DisplayMirroring,
        process_name: String::new(),
        pid: 0,
        target_url: String::new(),
        description: format!("Display '{}' is mirrored", mirrored.name),
        confidence: 0.9,
        is_active: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(name: &str, modules: &[&str]) -> ProcessRecord {
        let mut p = ProcessRecord::new(5, name, "");
        p.loaded_modules = modules.iter().map(|m| m.to_string()).collect();
        p
    }

    #[test]
    fn test_duplication_session() {
        let sessions = classify_sessions(&[], true);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].method, SharingMethod::DesktopDuplication);
    }

    #[test]
    fn test_browser_webrtc_requires_browser_process() {
        // A non-browser process with WebRTC modules is not a browser session.
        let sessions = classify_sessions(&[process("zoom.exe", &["webrtc.dll"])], false);
        assert!(sessions
            .iter()
            .all(|s| s.method != SharingMethod::BrowserWebrtc));

        let sessions = classify_sessions(&[process("chrome.exe", &["webrtc_capture.dll"])], false);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].method, SharingMethod::BrowserWebrtc);
        assert_eq!(sessions[0].pid, 5);
    }

    #[test]
    fn test_remote_desktop_by_name() {
        let sessions = classify_sessions(&[process("TeamViewer.exe", &[])], false);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].method, SharingMethod::RemoteDesktop);
    }

    #[test]
    fn test_mirroring_session() {
        let displays = vec![DisplayRecord {
            name: "HDMI-1".to_string(),
            width: 1920,
            height: 1080,
            is_primary: false,
            is_external: true,
            is_mirrored: true,
        }];
        let session = mirroring_session(&displays).unwrap();
        assert_eq!(session.method, SharingMethod::DisplayMirroring);
        assert!(mirroring_session(&[]).is_none());
    }

    #[test]
    fn test_method_wire_format() {
        let json = serde_json::to_string(&SharingMethod::BrowserWebrtc).unwrap();
        assert_eq!(json, "\"browser-webrtc\"");
        let json = serde_json::to_string(&SharingMethod::DesktopDuplication).unwrap();
        assert_eq!(json, "\"desktop-duplication\"");
    }
}
