//! Page-level plumbing for the overlay layers: optional content groups, Form
//! XObjects, page content wrapping and catalog registration.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::error::{Result, StructureError};
use crate::gate::{EXPIRY_MASK_PREFIX, EXPIRY_NOTICE_PREFIX};

/// US Letter, used when no MediaBox is found up the page tree.
pub const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

const MAX_TREE_DEPTH: usize = 32;

/// What a layer draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// White cover hiding the page.
    Mask,
    /// Expiry message, left visible when access is denied.
    ExpiredText,
    /// White cover hiding the expiry message in viewers without scripting.
    ExpiredMask,
    /// Notice for viewers that cannot run the gate.
    UnsupportedNotice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSpec {
    pub name: String,
    pub kind: LayerKind,
}

impl LayerSpec {
    fn new(name: String, kind: LayerKind) -> Self {
        Self { name, kind }
    }

    /// Resource name of the layer's Form XObject on the page.
    pub fn xobject_name(&self) -> String {
        format!("Gate_{}", self.name)
    }
}

/// Layers for 1-based page `page`, in drawing order.
pub fn plan_page_layers(page: u32, mask_layers: usize, with_expired: bool, with_notice: bool) -> Vec<LayerSpec> {
    let mut layers: Vec<LayerSpec> = (1..=mask_layers)
        .map(|k| LayerSpec::new(format!("mask_{:02}_{:02}", page, k), LayerKind::Mask))
        .collect();

    if with_expired {
        layers.push(LayerSpec::new(format!("expired_{:02}", page), LayerKind::ExpiredText));
        layers.push(LayerSpec::new(
            format!("{}{:02}", EXPIRY_MASK_PREFIX, page),
            LayerKind::ExpiredMask,
        ));
    }
    if with_notice {
        layers.push(LayerSpec::new(
            format!("{}{:02}", EXPIRY_NOTICE_PREFIX, page),
            LayerKind::UnsupportedNotice,
        ));
    }
    layers
}

/// Follows a reference to the object it names; direct objects pass through.
pub fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object> {
    match object {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn number_object(value: f64) -> Object {
    if value.fract() == 0.0 {
        Object::Integer(value as i64)
    } else {
        Object::Real(value as _)
    }
}

/// Looks up `key` on the page, then on its ancestors.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Result<Option<&'a Object>> {
    let mut node = doc.get_object(page_id)?.as_dict()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Ok(Some(resolve(doc, value)?));
        }
        match node.get(b"Parent") {
            Ok(parent) => node = resolve(doc, parent)?.as_dict()?,
            Err(_) => return Ok(None),
        }
    }
    Err(StructureError::InvalidPageTree(format!("page tree deeper than {} levels", MAX_TREE_DEPTH)).into())
}

/// The page's MediaBox, normalised so `x0 <= x1` and `y0 <= y1`.
pub fn media_box(doc: &Document, page_id: ObjectId) -> Result<[f64; 4]> {
    let array = match inherited(doc, page_id, b"MediaBox")? {
        Some(Object::Array(items)) if items.len() >= 4 => items,
        _ => return Ok(DEFAULT_MEDIA_BOX),
    };

    let mut values = [0.0; 4];
    for (slot, item) in values.iter_mut().zip(array.iter()) {
        match number(resolve(doc, item)?) {
            Some(v) => *slot = v,
            None => return Ok(DEFAULT_MEDIA_BOX),
        }
    }
    let [x0, y0, x1, y1] = values;
    Ok([x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)])
}

/// Effective resources of the page as an owned dictionary, with the
/// `/XObject` and `/Properties` sub-dictionaries inlined so they can be
/// extended without touching objects shared with other pages.
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let mut resources = match inherited(doc, page_id, b"Resources")? {
        Some(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };

    for key in [&b"XObject"[..], &b"Properties"[..]] {
        let inline = match resources.get(key) {
            Ok(value) => match resolve(doc, value)? {
                Object::Dictionary(dict) => dict.clone(),
                _ => Dictionary::new(),
            },
            Err(_) => Dictionary::new(),
        };
        resources.set(key.to_vec(), inline);
    }
    Ok(resources)
}

/// Mutable access to a sub-dictionary inlined by [`page_resources`].
pub fn sub_dictionary<'a>(resources: &'a mut Dictionary, key: &[u8]) -> Result<&'a mut Dictionary> {
    Ok(resources.get_mut(key)?.as_dict_mut()?)
}

/// Adds an optional content group named `name`.
pub fn create_ocg(doc: &mut Document, name: &str) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => Object::Name(b"OCG".to_vec()),
        "Name" => Object::string_literal(name),
    })
}

/// Adds a Form XObject with the given bounding box and content.
pub fn create_form_xobject(
    doc: &mut Document,
    bbox: [f64; 4],
    content: Vec<u8>,
    resources: Option<Dictionary>,
) -> ObjectId {
    let mut dict = dictionary! {
        "Type" => Object::Name(b"XObject".to_vec()),
        "Subtype" => Object::Name(b"Form".to_vec()),
        "BBox" => bbox.iter().copied().map(number_object).collect::<Vec<_>>(),
    };
    if let Some(resources) = resources {
        dict.set("Resources", resources);
    }
    doc.add_object(Stream::new(dict, content))
}

/// Operators drawing `xobject` inside the marked-content section of `ocg`.
pub fn layer_operators(ocg: &str, xobject: &str) -> String {
    format!("/OC /{} BDC\n/{} Do\nEMC\n", ocg, xobject)
}

/// Replaces the page's `/Contents` with `[q, original..., Q overlay]`, so the
/// original content cannot leak graphics state into the overlay.
pub fn wrap_page_contents(doc: &mut Document, page_id: ObjectId, overlay: Vec<u8>) -> Result<()> {
    let original: Vec<Object> = {
        let page = doc.get_object(page_id)?.as_dict()?;
        match page.get(b"Contents") {
            Ok(Object::Array(items)) => items.clone(),
            Ok(Object::Reference(id)) => match doc.get_object(*id)? {
                Object::Array(items) => items.clone(),
                _ => vec![Object::Reference(*id)],
            },
            Ok(Object::Stream(_)) | Ok(Object::Null) => Vec::new(),
            Ok(_) => {
                return Err(StructureError::Corrupted(format!("page {:?} has malformed /Contents", page_id)).into())
            }
            Err(_) => Vec::new(),
        }
    };

    let open = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let mut close_content = b"Q\n".to_vec();
    close_content.extend_from_slice(&overlay);
    let close = doc.add_object(Stream::new(Dictionary::new(), close_content));

    let mut contents = Vec::with_capacity(original.len() + 2);
    contents.push(Object::Reference(open));
    contents.extend(original);
    contents.push(Object::Reference(close));

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Contents", contents);
    Ok(())
}

/// Identifier of the document catalog.
pub fn catalog_id(doc: &Document) -> Result<ObjectId> {
    doc.trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| StructureError::MissingObject("trailer /Root".into()).into())
}

fn references(object: Option<&Object>) -> Vec<ObjectId> {
    match object {
        Some(Object::Array(items)) => items.iter().filter_map(|item| item.as_reference().ok()).collect(),
        _ => Vec::new(),
    }
}

/// Registers `new_groups` in the catalog's `/OCProperties`. Existing groups
/// keep their default state; new groups default to ON and are appended to
/// the display order.
pub fn register_ocgs(doc: &mut Document, new_groups: &[ObjectId]) -> Result<()> {
    let catalog = catalog_id(doc)?;

    let existing = {
        let catalog_dict = doc.get_object(catalog)?.as_dict()?;
        match catalog_dict.get(b"OCProperties") {
            Ok(value) => match resolve(doc, value)? {
                Object::Dictionary(dict) => dict.clone(),
                _ => Dictionary::new(),
            },
            Err(_) => Dictionary::new(),
        }
    };
    let defaults = match existing.get(b"D") {
        Ok(value) => match resolve(doc, value)? {
            Object::Dictionary(dict) => dict.clone(),
            _ => Dictionary::new(),
        },
        Err(_) => Dictionary::new(),
    };

    let mut groups = references(existing.get(b"OCGs").ok());
    let off = references(defaults.get(b"OFF").ok());
    let mut on = match defaults.get(b"ON") {
        Ok(value) => references(Some(value)),
        Err(_) => groups.iter().copied().filter(|id| !off.contains(id)).collect(),
    };
    let mut order = match defaults.get(b"Order") {
        Ok(Object::Array(items)) => items.clone(),
        _ => groups.iter().copied().map(Object::Reference).collect(),
    };

    for id in new_groups {
        if !groups.contains(id) {
            groups.push(*id);
            on.push(*id);
            order.push(Object::Reference(*id));
        }
    }
    debug!("Registering {} optional content groups ({} new)", groups.len(), new_groups.len());

    let to_array = |ids: Vec<ObjectId>| ids.into_iter().map(Object::Reference).collect::<Vec<_>>();
    let mut defaults = defaults;
    defaults.set("ON", to_array(on));
    defaults.set("OFF", to_array(off));
    defaults.set("Order", order);

    let mut properties = existing;
    properties.set("OCGs", to_array(groups));
    properties.set("D", defaults);

    let catalog_dict = doc.get_object_mut(catalog)?.as_dict_mut()?;
    catalog_dict.set("OCProperties", properties);
    Ok(())
}
