// Image merges into a manga document
//
// Images only ever go from absent to present. Both functions are pure and
// return a new document.

use crate::core::types::MangaDocument;

/// Attach a panel illustration located by (page id, panel id).
///
/// Panels that already carry an image keep it. Unknown ids leave the
/// document unchanged.
pub fn merge_panel_image(
    document: &MangaDocument,
    page_id: &str,
    panel_id: &str,
    image: &str,
) -> MangaDocument {
    let mut updated = document.clone();

    for page in updated.pages.iter_mut().filter(|p| p.id == page_id) {
        for panel in page.panels.iter_mut().filter(|p| p.id == panel_id) {
            if panel.image_url.is_none() {
                panel.image_url = Some(image.to_string());
            }
        }
    }

    updated
}

/// Attach character reference images by position.
///
/// `images[i]` belongs to `characters[i]`; extra images are ignored and
/// existing reference images are kept.
pub fn with_character_images(document: &MangaDocument, images: Vec<String>) -> MangaDocument {
    let mut updated = document.clone();

    for (profile, image) in updated.characters.iter_mut().zip(images) {
        if profile.reference_image.is_none() {
            profile.reference_image = Some(image);
        }
    }

    updated
}
