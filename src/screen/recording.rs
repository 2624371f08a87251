//! Recording-source detection and confidence fusion.
//!
//! Candidate recording processes are found by blacklist match on name/path
//! and by capture-framework modules among their loaded libraries. Module
//! evidence is advisory: platforms that cannot enumerate modules simply
//! contribute none.

use crate::platform::types::ProcessRecord;

/// Strong capture indicators: +0.8 each hit.
const STRONG_MODULES: &[&str] = &["dxgi", "screencapturekit"];

/// Graphics-stack indicators: +0.25.
const GRAPHICS_MODULES: &[&str] = &["d3d9", "d3d11", "avfoundation"];

/// Media Foundation indicators: +0.25.
const MEDIA_FOUNDATION_MODULES: &[&str] = &["mfplat", "mfreadwrite", "mfcaptureengine"];

/// Per-evidence confidence weights. Contractual.
const WEIGHT_BLACKLIST: f64 = 0.6;
const WEIGHT_STRONG_MODULE: f64 = 0.8;
const WEIGHT_GRAPHICS_MODULE: f64 = 0.25;
const WEIGHT_MEDIA_FOUNDATION: f64 = 0.25;
const WEIGHT_VIRTUAL_CAMERA: f64 = 0.3;

fn matches_any(haystack: &str, needles: &[&'static str]) -> Option<&'static str> {
    needles
        .iter()
        .find(|needle| haystack.contains(*needle))
        .copied()
}

/// Find processes that look like recording sources. Each returned record
/// carries its evidence tags (`blacklist:<entry>` / `module:<name>`).
pub fn find_recording_sources(
    processes: &[ProcessRecord],
    blacklist: &[String],
) -> Vec<ProcessRecord> {
    let needles: Vec<String> = blacklist.iter().map(|b| b.to_lowercase()).collect();

    processes
        .iter()
        .filter_map(|process| {
            let mut evidence = Vec::new();

            let name = process.name.to_lowercase();
            let path = process.path.to_lowercase();
            for needle in &needles {
                if !needle.is_empty() && (name.contains(needle) || path.contains(needle)) {
                    evidence.push(format!("blacklist:{needle}"));
                    break;
                }
            }

            for module in &process.loaded_modules {
                let module = module.to_lowercase();
                if let Some(hit) = matches_any(&module, STRONG_MODULES) {
                    evidence.push(format!("module:{hit}"));
                } else if let Some(hit) = matches_any(&module, GRAPHICS_MODULES) {
                    evidence.push(format!("module:{hit}"));
                } else if let Some(hit) = matches_any(&module, MEDIA_FOUNDATION_MODULES) {
                    evidence.push(format!("module:{hit}"));
                }
            }

            if evidence.is_empty() {
                return None;
            }
            evidence.dedup();
            let mut source = process.clone();
            source.evidence = evidence;
            Some(source)
        })
        .collect()
}

/// Fuse per-process evidence and virtual cameras into one confidence.
///
/// Per process: blacklist hit +0.6; any strong module +0.8; any graphics
/// module +0.25; any Media Foundation module +0.25. Each virtual camera
/// +0.3. Clamped to 1.0.
pub fn recording_confidence(sources: &[ProcessRecord], virtual_cameras: &[String]) -> f64 {
    let mut confidence: f64 = 0.0;

    for source in sources {
        let has = |prefix: &str, table: &[&str]| {
            source.evidence.iter().any(|tag| {
                tag.strip_prefix(prefix)
                    .map(|rest| table.iter().any(|m| rest.contains(m)))
                    .unwrap_or(false)
            })
        };

        if source.evidence.iter().any(|tag| tag.starts_with("blacklist:")) {
            confidence += WEIGHT_BLACKLIST;
        }
        if has("module:", STRONG_MODULES) {
            confidence += WEIGHT_STRONG_MODULE;
        }
        if has("module:", GRAPHICS_MODULES) {
            confidence += WEIGHT_GRAPHICS_MODULE;
        }
        if has("module:", MEDIA_FOUNDATION_MODULES) {
            confidence += WEIGHT_MEDIA_FOUNDATION;
        }
    }

    confidence += virtual_cameras.len() as f64 * WEIGHT_VIRTUAL_CAMERA;
    confidence.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(name: &str, modules: &[&str]) -> ProcessRecord {
        let mut p = ProcessRecord::new(1, name, "");
        p.loaded_modules = modules.iter().map(|m| m.to_string()).collect();
        p
    }

    fn blacklist() -> Vec<String> {
        vec!["obs".to_string(), "bandicam".to_string()]
    }

    #[test]
    fn test_blacklist_detection() {
        let processes = vec![process("obs64.exe", &[]), process("editor.exe", &[])];
        let sources = find_recording_sources(&processes, &blacklist());
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].evidence, vec!["blacklist:obs"]);
    }

    #[test]
    fn test_module_detection_without_blacklist() {
        let processes = vec![process("custom-capture.exe", &["dxgi.dll", "d3d11.dll"])];
        let sources = find_recording_sources(&processes, &blacklist());
        assert_eq!(sources.len(), 1);
        assert!(sources[0].evidence.contains(&"module:dxgi".to_string()));
        assert!(sources[0].evidence.contains(&"module:d3d11".to_string()));
    }

    #[test]
    fn test_blacklisted_process_with_dxgi_modules_crosses_threshold() {
        // A blacklisted process that also loaded two DXGI-family modules
        // must land at or above the 0.75 recording threshold.
        let processes = vec![process("obs64.exe", &["dxgi.dll", "dxgidebug.dll"])];
        let sources = find_recording_sources(&processes, &blacklist());
        let confidence = recording_confidence(&sources, &[]);
        assert!(confidence >= 0.75);
        assert!(confidence <= 1.0);
    }

    #[test]
    fn test_virtual_cameras_contribute() {
        let cams = vec!["OBS Virtual Camera".to_string()];
        assert!((recording_confidence(&[], &cams) - 0.3).abs() < 1e-9);

        // Three cameras alone do not exceed the clamp.
        let cams: Vec<String> = (0..4).map(|i| format!("cam{i}")).collect();
        assert_eq!(recording_confidence(&[], &cams), 1.0);
    }

    #[test]
    fn test_confidence_in_unit_interval() {
        let processes = vec![
            process("obs64.exe", &["dxgi.dll", "mfplat.dll", "d3d9.dll"]),
            process("bandicam.exe", &["dxgi.dll"]),
        ];
        let sources = find_recording_sources(&processes, &blacklist());
        let confidence = recording_confidence(&sources, &["cam".to_string()]);
        assert!((0.0..=1.0).contains(&confidence));
        assert_eq!(confidence, 1.0);
    }

    #[test]
    fn test_clean_system_scores_zero() {
        let processes = vec![process("editor.exe", &["kernel32.dll"])];
        let sources = find_recording_sources(&processes, &blacklist());
        assert!(sources.is_empty());
        assert_eq!(recording_confidence(&sources, &[]), 0.0);
    }
}
