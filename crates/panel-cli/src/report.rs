//! Human-readable status output.

use panel_sync::document::KNOWN_SECTIONS;
use panel_sync::{LocalStore, RemoteStore, SaveStatus, SectionStatus, SyncController};
use std::fmt::Write;

fn save_status_label(status: SaveStatus) -> &'static str {
    match status {
        SaveStatus::Idle => "idle",
        SaveStatus::Saving => "saving",
        SaveStatus::Saved => "saved",
        SaveStatus::Error => "error",
    }
}

/// Mode, save state and per-section status, one item per line.
///
/// Known sections are always listed; other sections present in the
/// document follow in name order.
pub fn status_report<L: LocalStore, R: RemoteStore>(ctrl: &SyncController<L, R>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Storage mode: {}", ctrl.mode());
    let _ = writeln!(out, "Save status:  {}", save_status_label(ctrl.save_status()));

    let dirty = ctrl.dirty_sections();
    if dirty.is_empty() {
        let _ = writeln!(out, "Unsaved:      none");
    } else {
        let _ = writeln!(out, "Unsaved:      {}", dirty.join(", "));
    }

    let mut names: Vec<&str> = KNOWN_SECTIONS.to_vec();
    names.extend(
        ctrl.document()
            .sections()
            .filter(|name| !KNOWN_SECTIONS.contains(name)),
    );
    let _ = writeln!(out, "Sections:");
    for name in names {
        let status = match ctrl.section_status(name) {
            SectionStatus::Active => "active",
            SectionStatus::Empty => "empty",
        };
        let _ = writeln!(out, "  {:<12} {}", name, status);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use panel_sync::InMemoryLocal;
    use serde_json::json;

    #[tokio::test]
    async fn test_report_lists_known_and_extra_sections() {
        let mut ctrl = SyncController::local_only(InMemoryLocal::new());
        ctrl.initialize().await.unwrap();
        ctrl.update_section("albums", json!({"data": [1]})).unwrap();
        ctrl.update_section("retreats", json!({"data": []})).unwrap();

        let report = status_report(&ctrl);
        assert!(report.contains("Storage mode: local"));
        assert!(report.contains("Save status:  saved"));
        assert!(report.contains("Unsaved:      none"));
        assert!(report.contains("  albums       active"));
        assert!(report.contains("  songs        empty"));
        assert!(report.contains("  retreats     empty"));
    }
}
