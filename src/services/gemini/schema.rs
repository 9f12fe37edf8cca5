// Structured-output schema for script generation (Gemini OpenAPI subset)

use serde_json::{json, Value};

/// Response schema matching the MangaDocument shape, minus images
pub fn script_response_schema() -> Value {
    let dialogue = json!({
        "type": "OBJECT",
        "properties": {
            "character": { "type": "STRING", "description": "The name of the character speaking." },
            "text": { "type": "STRING", "description": "The dialogue text." }
        },
        "required": ["character", "text"]
    });

    let panel = json!({
        "type": "OBJECT",
        "properties": {
            "id": { "type": "STRING", "description": "A unique ID for the panel, e.g., 'page-1-panel-1'." },
            "description": {
                "type": "STRING",
                "description": "A detailed visual description of the scene, characters, actions, and mood for the artist. Be specific about camera angles and character expressions."
            },
            "dialogue": {
                "type": "ARRAY",
                "description": "Dialogue spoken by characters in this panel.",
                "items": dialogue
            },
            "narration": { "type": "STRING", "description": "Narration text for a narrator box, if any." }
        },
        "required": ["id", "description", "dialogue", "narration"]
    });

    let page = json!({
        "type": "OBJECT",
        "properties": {
            "id": { "type": "STRING", "description": "A unique ID for the page, e.g., 'page-1'." },
            "pageNumber": { "type": "INTEGER", "description": "The page number, starting from 1." },
            "layout": {
                "type": "STRING",
                "description": "A layout style for this page based on panel count. E.g., '2-panel-vertical', '3-panel-pyramid', '4-panel-grid'."
            },
            "panels": { "type": "ARRAY", "description": "The panels on this page.", "items": panel }
        },
        "required": ["id", "pageNumber", "layout", "panels"]
    });

    json!({
        "type": "OBJECT",
        "properties": {
            "title": { "type": "STRING", "description": "A catchy manga title for the story." },
            "characters": {
                "type": "ARRAY",
                "description": "A list of main characters in the story.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING", "description": "Character's name." },
                        "description": {
                            "type": "STRING",
                            "description": "A detailed visual description of the character's appearance, clothing, and personality for the artist."
                        }
                    },
                    "required": ["name", "description"]
                }
            },
            "pages": { "type": "ARRAY", "description": "The pages of the manga.", "items": page }
        },
        "required": ["title", "characters", "pages"]
    })
}
