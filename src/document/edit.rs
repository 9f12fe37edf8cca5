// User text edits on a manga document
//
// Edits are pure replacements: the input document is never touched and the
// returned document differs in at most one text field.

use crate::core::types::{MangaDocument, Panel, TextEdit, TextEditKind};

/// Replace one dialogue line or the narration of a panel.
///
/// Returns an unchanged copy when `page_id`/`panel_id` match nothing, when a
/// dialogue edit has no index, or when the index is out of range.
/// For narration edits `dialogue_index` is ignored and the narration is set
/// even if the panel had none.
pub fn apply_text_edit(
    document: &MangaDocument,
    page_id: &str,
    panel_id: &str,
    kind: TextEditKind,
    new_text: &str,
    dialogue_index: Option<usize>,
) -> MangaDocument {
    let mut updated = document.clone();

    for page in updated.pages.iter_mut().filter(|p| p.id == page_id) {
        for panel in page.panels.iter_mut().filter(|p| p.id == panel_id) {
            replace_text(panel, kind, new_text, dialogue_index);
        }
    }

    updated
}

/// Apply a deserialized [`TextEdit`]
pub fn apply_edit(document: &MangaDocument, edit: &TextEdit) -> MangaDocument {
    apply_text_edit(
        document,
        &edit.page_id,
        &edit.panel_id,
        edit.kind,
        &edit.new_text,
        edit.dialogue_index,
    )
}

fn replace_text(panel: &mut Panel, kind: TextEditKind, new_text: &str, dialogue_index: Option<usize>) {
    match kind {
        TextEditKind::Narration => panel.narration = Some(new_text.to_string()),
        TextEditKind::Dialogue => {
            if let Some(line) = dialogue_index.and_then(|i| panel.dialogue.get_mut(i)) {
                line.text = new_text.to_string();
            }
        }
    }
}
