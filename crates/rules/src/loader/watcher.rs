//! Filesystem event handler for the notify watcher (hot-reload).

use notify::event::ModifyKind;
use notify::{Event, EventKind};
use tracing::{info, warn};

use super::core::{is_dotfile, is_trigger_file, parse_document, SharedState};

/// Handle a single filesystem event from the notify watcher.
pub(super) fn handle_fs_event(event: &Event, state: &SharedState) {
    for path in &event.paths {
        // Skips our own .tmp files too.
        if !is_trigger_file(path) || is_dotfile(path) {
            continue;
        }

        match &event.kind {
            EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any) => {
                // Rename-from reports the old path, which no longer exists.
                if !path.exists() {
                    if let Some(id) = state.remove_path(path) {
                        info!(
                            document_id = %id,
                            path = %path.display(),
                            "removed trigger document after rename"
                        );
                    }
                    continue;
                }
                match parse_document(path) {
                    Ok(doc) => {
                        info!(
                            document_id = %doc.metadata.id,
                            triggers = doc.triggers.len(),
                            path = %path.display(),
                            "hot-reloaded trigger document"
                        );
                        state.upsert(path, doc);
                    }
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "hot-reload failed, keeping previous version"
                        );
                    }
                }
            }
            EventKind::Remove(_) => {
                if let Some(id) = state.remove_path(path) {
                    info!(
                        document_id = %id,
                        path = %path.display(),
                        "removed trigger document after file deletion"
                    );
                }
            }
            _ => {}
        }
    }
}
