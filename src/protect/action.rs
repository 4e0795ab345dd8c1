//! Installs the compiled gate as the document's open action.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, StringFormat};
use tracing::{debug, warn};

use crate::error::Result;
use crate::protect::layers::{catalog_id, resolve};
use crate::script::encode_utf16be;

/// Key of the gate entry in the `/Names /JavaScript` tree.
pub const SCRIPT_NAME: &str = "pdfgate";

/// Adds a JavaScript action running `script` and returns its id.
pub fn create_javascript_action(doc: &mut Document, script: &str) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => Object::Name(b"Action".to_vec()),
        "S" => Object::Name(b"JavaScript".to_vec()),
        "JS" => Object::String(encode_utf16be(script), StringFormat::Hexadecimal),
    })
}

/// Points the catalog's `/OpenAction` at a new action running `script` and
/// registers the same action as a document-level script when the document
/// has none. Returns the action id.
pub fn install_open_action(doc: &mut Document, script: &str) -> Result<ObjectId> {
    let catalog = catalog_id(doc)?;
    let action = create_javascript_action(doc, script);

    let names = {
        let catalog_dict = doc.get_object(catalog)?.as_dict()?;
        if catalog_dict.get(b"OpenAction").is_ok() {
            warn!("Replacing existing /OpenAction");
        }
        match catalog_dict.get(b"Names") {
            Ok(Object::Reference(id)) => NamesLocation::Indirect(*id),
            Ok(value) => match resolve(doc, value)? {
                Object::Dictionary(dict) => NamesLocation::Inline(dict.clone()),
                _ => NamesLocation::Inline(Dictionary::new()),
            },
            Err(_) => NamesLocation::Inline(Dictionary::new()),
        }
    };

    let script_tree = dictionary! {
        "Names" => vec![Object::string_literal(SCRIPT_NAME), Object::Reference(action)],
    };
    match names {
        NamesLocation::Indirect(id) => {
            if let Object::Dictionary(dict) = doc.get_object_mut(id)? {
                add_script_tree(dict, script_tree);
            }
        }
        NamesLocation::Inline(mut dict) => {
            add_script_tree(&mut dict, script_tree);
            doc.get_object_mut(catalog)?.as_dict_mut()?.set("Names", dict);
        }
    }

    doc.get_object_mut(catalog)?
        .as_dict_mut()?
        .set("OpenAction", Object::Reference(action));
    Ok(action)
}

enum NamesLocation {
    Indirect(ObjectId),
    Inline(Dictionary),
}

fn add_script_tree(names: &mut Dictionary, tree: Dictionary) {
    if names.get(b"JavaScript").is_ok() {
        debug!("Document already has a JavaScript name tree, leaving it untouched");
        return;
    }
    names.set("JavaScript", tree);
}
