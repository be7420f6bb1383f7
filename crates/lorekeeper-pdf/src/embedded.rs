//! # Embedded images
//!
//! Walks a page's resource dictionary and collects its image XObjects in
//! the order the resource dictionary lists them.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use sha2::{Digest, Sha256};

use crate::error::{PdfError, Result};

/// Resource inheritance is bounded so a cyclic `/Parent` chain cannot hang us.
const MAX_PARENT_DEPTH: usize = 64;

/// SHA-256 digest of an image's raw stream bytes.
pub type ContentHash = [u8; 32];

/// An image XObject as stored in the PDF, before decoding.
#[derive(Debug, Clone)]
pub struct RawImage<'a> {
    /// Object the image stream lives in.
    pub object_id: ObjectId,
    /// Resource name the page refers to the image by (`Im1`, ...).
    pub name: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// `None` for JPEG streams, which carry their own depth.
    pub bits_per_component: Option<u8>,
    /// Filter names in application order.
    pub filters: Vec<Vec<u8>>,
    /// The `/ColorSpace` entry, unresolved.
    pub color_space: Option<&'a Object>,
    /// The `/SMask` stream, if the image has a soft mask.
    pub soft_mask: Option<ObjectId>,
    /// Whether the image is a 1-bit stencil mask (`/ImageMask true`).
    pub image_mask: bool,
    pub stream: &'a Stream,
}

impl RawImage<'_> {
    /// SHA-256 over the raw (still encoded) stream bytes.
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        Sha256::digest(&self.stream.content).into()
    }

    /// Whether both dimensions reach `min_dimension` pixels.
    #[must_use]
    pub fn meets_min_dimension(&self, min_dimension: u32) -> bool {
        self.width >= min_dimension && self.height >= min_dimension
    }

    /// Whether the colour space is a name that must be looked up in the
    /// page's `/ColorSpace` resources rather than a device colour space.
    #[must_use]
    pub fn has_named_color_space(&self) -> bool {
        matches!(self.color_space, Some(Object::Name(name)) if !is_device_color_space(name))
    }
}

pub(crate) fn is_device_color_space(name: &[u8]) -> bool {
    matches!(
        name,
        b"DeviceGray" | b"DeviceRGB" | b"DeviceCMYK" | b"G" | b"RGB" | b"CMYK" | b"Pattern"
    )
}

pub(crate) fn object_kind(object: &Object) -> &'static str {
    match object {
        Object::Null => "null",
        Object::Boolean(_) => "boolean",
        Object::Integer(_) => "integer",
        Object::Real(_) => "real",
        Object::Name(_) => "name",
        Object::String(..) => "string",
        Object::Array(_) => "array",
        Object::Dictionary(_) => "dictionary",
        Object::Stream(_) => "stream",
        Object::Reference(_) => "reference",
    }
}

/// Follows references until a direct object is reached.
pub(crate) fn resolve<'a>(doc: &'a Document, mut object: &'a Object) -> Result<&'a Object> {
    for _ in 0..MAX_PARENT_DEPTH {
        match object {
            Object::Reference(id) => object = doc.get_object(*id)?,
            direct => return Ok(direct),
        }
    }
    Err(PdfError::MalformedImage("reference chain too deep".into()))
}

pub(crate) fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Dictionary> {
    match resolve(doc, object)? {
        Object::Dictionary(dict) => Ok(dict),
        Object::Stream(stream) => Ok(&stream.dict),
        other => Err(PdfError::MalformedImage(format!(
            "expected dictionary, found {}",
            object_kind(other)
        ))),
    }
}

pub(crate) fn dict_u32(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<u32> {
    let value = dict.get(key).ok()?;
    match resolve(doc, value).ok()? {
        Object::Integer(v) => u32::try_from(*v).ok(),
        Object::Real(v) if *v >= 0.0 => Some(*v as u32),
        _ => None,
    }
}

pub(crate) fn filter_names(doc: &Document, dict: &Dictionary) -> Result<Vec<Vec<u8>>> {
    let Ok(filter) = dict.get(b"Filter") else {
        return Ok(Vec::new());
    };
    match resolve(doc, filter)? {
        Object::Name(name) => Ok(vec![name.clone()]),
        Object::Array(items) => items
            .iter()
            .map(|item| match resolve(doc, item)? {
                Object::Name(name) => Ok(name.clone()),
                other => Err(PdfError::MalformedImage(format!(
                    "filter entry is {}",
                    object_kind(other)
                ))),
            })
            .collect(),
        other => Err(PdfError::MalformedImage(format!(
            "/Filter is {}",
            object_kind(other)
        ))),
    }
}

/// The page's `/Resources` dictionary, inherited from ancestors if needed.
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Result<Option<&Dictionary>> {
    let mut node = doc.get_dictionary(page_id)?;
    for _ in 0..MAX_PARENT_DEPTH {
        if let Ok(resources) = node.get(b"Resources") {
            return resolve_dict(doc, resources).map(Some);
        }
        match node.get(b"Parent") {
            Ok(parent) => node = resolve_dict(doc, parent)?,
            Err(_) => return Ok(None),
        }
    }
    Ok(None)
}

/// Builds a [`RawImage`] view over an image XObject stream.
pub fn raw_image<'a>(
    doc: &'a Document,
    object_id: ObjectId,
    name: Vec<u8>,
    stream: &'a Stream,
) -> Result<RawImage<'a>> {
    let dict = &stream.dict;
    let width = dict_u32(doc, dict, b"Width")
        .ok_or_else(|| PdfError::MalformedImage("missing /Width".into()))?;
    let height = dict_u32(doc, dict, b"Height")
        .ok_or_else(|| PdfError::MalformedImage("missing /Height".into()))?;
    let bits_per_component = dict_u32(doc, dict, b"BitsPerComponent").map(|b| b as u8);
    let image_mask = matches!(
        dict.get(b"ImageMask").ok().map(|o| resolve(doc, o)),
        Some(Ok(Object::Boolean(true)))
    );
    let soft_mask = match dict.get(b"SMask") {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    };

    Ok(RawImage {
        object_id,
        name,
        width,
        height,
        bits_per_component,
        filters: filter_names(doc, dict)?,
        color_space: dict.get(b"ColorSpace").ok(),
        soft_mask,
        image_mask,
        stream,
    })
}

/// Image XObjects drawn by a page, in resource-dictionary order.
///
/// A malformed image comes back as an error in its own slot, so the rest
/// of the page keeps its positions. Form XObjects are not descended into,
/// matching what a page's own image list reports.
pub fn page_images(doc: &Document, page_id: ObjectId) -> Result<Vec<Result<RawImage<'_>>>> {
    let Some(resources) = page_resources(doc, page_id)? else {
        return Ok(Vec::new());
    };
    let Ok(xobjects) = resources.get(b"XObject") else {
        return Ok(Vec::new());
    };
    let xobjects = resolve_dict(doc, xobjects)?;

    let mut images = Vec::new();
    for (name, value) in xobjects.iter() {
        let Object::Reference(id) = value else {
            continue;
        };
        let Ok(Object::Stream(stream)) = doc.get_object(*id) else {
            continue;
        };
        let is_image = matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image");
        if is_image {
            images.push(raw_image(doc, *id, name.clone(), stream));
        }
    }
    Ok(images)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::dictionary;

    fn valid_images(doc: &Document, page_id: ObjectId) -> Vec<RawImage<'_>> {
        page_images(doc, page_id)
            .unwrap()
            .into_iter()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    /// Builds a document whose pages draw the given images.
    ///
    /// Each image is `(width, height, rgb)`, stored as an unfiltered
    /// `DeviceRGB` stream filled with that colour.
    pub(crate) fn document_with_pages(pages: &[Vec<(u32, u32, [u8; 3])>]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut kids = Vec::new();
        for page_images in pages {
            let mut xobjects = Dictionary::new();
            let mut content = Vec::new();
            for (i, (width, height, rgb)) in page_images.iter().enumerate() {
                let pixels: Vec<u8> = rgb
                    .iter()
                    .copied()
                    .cycle()
                    .take((*width * *height * 3) as usize)
                    .collect();
                let stream = Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => *width as i64,
                        "Height" => *height as i64,
                        "ColorSpace" => "DeviceRGB",
                        "BitsPerComponent" => 8,
                    },
                    pixels,
                );
                let image_id = doc.add_object(stream);
                let name = format!("Im{}", i + 1);
                content.extend_from_slice(
                    format!("q {width} 0 0 {height} 0 0 cm /{name} Do Q\n").as_bytes(),
                );
                xobjects.set(name, image_id);
            }
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => dictionary! { "XObject" => xobjects },
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    #[test]
    fn lists_images_in_resource_order() {
        let doc = document_with_pages(&[vec![], vec![(40, 40, [255, 0, 0]), (200, 120, [0, 0, 255])]]);
        let pages = doc.get_pages();

        let first = valid_images(&doc, pages[&1]);
        assert!(first.is_empty());

        let second = valid_images(&doc, pages[&2]);
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].name, b"Im1");
        assert_eq!((second[0].width, second[0].height), (40, 40));
        assert_eq!((second[1].width, second[1].height), (200, 120));
        assert_eq!(second[1].bits_per_component, Some(8));
        assert!(second[1].filters.is_empty());
        assert!(second[1].soft_mask.is_none());
    }

    #[test]
    fn min_dimension_checks_both_axes() {
        let doc = document_with_pages(&[vec![(200, 49, [0, 0, 0]), (50, 50, [0, 0, 0])]]);
        let images = valid_images(&doc, doc.get_pages()[&1]);
        assert!(!images[0].meets_min_dimension(50));
        assert!(images[1].meets_min_dimension(50));
    }

    #[test]
    fn identical_content_hashes_match() {
        let doc = document_with_pages(&[vec![
            (60, 60, [1, 2, 3]),
            (60, 60, [1, 2, 3]),
            (60, 60, [3, 2, 1]),
        ]]);
        let images = valid_images(&doc, doc.get_pages()[&1]);
        assert_eq!(images[0].content_hash(), images[1].content_hash());
        assert_ne!(images[0].content_hash(), images[2].content_hash());
    }

    #[test]
    fn resources_are_inherited_from_parent() {
        let mut doc = document_with_pages(&[vec![(64, 64, [9, 9, 9])]]);
        let page_id = doc.get_pages()[&1];

        let resources = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Resources")
            .unwrap()
            .clone();
        let pages_id = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Parent")
            .unwrap()
            .as_reference()
            .unwrap();

        doc.get_object_mut(page_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .remove(b"Resources");
        doc.get_object_mut(pages_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Resources", resources);

        let images = valid_images(&doc, page_id);
        assert_eq!(images.len(), 1);
    }

    #[test]
    fn malformed_image_keeps_its_slot() {
        let mut doc = document_with_pages(&[vec![(100, 100, [1, 1, 1]), (100, 100, [2, 2, 2])]]);
        let page_id = doc.get_pages()[&1];
        let first_id = match page_images(&doc, page_id).unwrap()[0].as_ref() {
            Ok(raw) => raw.object_id,
            Err(e) => panic!("fixture image is malformed: {e}"),
        };
        doc.get_object_mut(first_id)
            .unwrap()
            .as_stream_mut()
            .unwrap()
            .dict
            .remove(b"Width");

        let images = page_images(&doc, page_id).unwrap();
        assert_eq!(images.len(), 2);
        assert!(matches!(images[0], Err(PdfError::MalformedImage(_))));
        assert_eq!(images[1].as_ref().map(|raw| raw.name.clone()).ok(), Some(b"Im2".to_vec()));
    }
}
