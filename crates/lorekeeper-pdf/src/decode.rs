//! # Image decoding
//!
//! Turns an image XObject into pixels. JPEG streams go through the JPEG
//! codec; everything else is unpacked from its samples according to the
//! colour space and bit depth.
//!
//! Images with a soft mask or a named colour space are always converted to
//! RGB. The soft mask becomes the alpha channel.

use std::borrow::Cow;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::embedded::{RawImage, dict_u32, filter_names, object_kind, raw_image, resolve, resolve_dict};
use crate::error::{PdfError, Result};

/// Named colour spaces may refer to other named colour spaces; bound the chase.
const MAX_COLOR_SPACE_DEPTH: usize = 8;

/// A colour space reduced to what sample unpacking needs.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    /// Palette of `hival + 1` entries in `base`.
    Indexed {
        base: Box<ColorSpace>,
        hival: u8,
        lookup: Vec<u8>,
    },
}

impl ColorSpace {
    /// Components per sample.
    #[must_use]
    pub fn components(&self) -> usize {
        match self {
            Self::Gray | Self::Indexed { .. } => 1,
            Self::Rgb => 3,
            Self::Cmyk => 4,
        }
    }

    fn is_gray(&self) -> bool {
        match self {
            Self::Gray => true,
            Self::Indexed { base, .. } => base.is_gray(),
            _ => false,
        }
    }
}

/// How the bytes left after the byte-level filters are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Jpeg,
    Samples,
}

/// Filters that only transform bytes, ahead of any image codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteFilter {
    Flate,
    Lzw,
    Ascii85,
    AsciiHex,
    RunLength,
}

impl ByteFilter {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"FlateDecode" | b"Fl" => Some(Self::Flate),
            b"LZWDecode" | b"LZW" => Some(Self::Lzw),
            b"ASCII85Decode" | b"A85" => Some(Self::Ascii85),
            b"ASCIIHexDecode" | b"AHx" => Some(Self::AsciiHex),
            b"RunLengthDecode" | b"RL" => Some(Self::RunLength),
            _ => None,
        }
    }

    fn lopdf_name(self) -> &'static str {
        match self {
            Self::Flate => "FlateDecode",
            Self::Lzw => "LZWDecode",
            Self::Ascii85 => "ASCII85Decode",
            Self::AsciiHex => "ASCIIHexDecode",
            Self::RunLength => "RunLengthDecode",
        }
    }
}

/// Splits a filter chain into its byte-level prefix and the final encoding.
/// A DCT filter is only accepted as the last entry.
fn classify_filters(filters: &[Vec<u8>]) -> Result<(&[Vec<u8>], Encoding)> {
    let (byte_filters, encoding) = match filters.split_last() {
        Some((last, rest)) if matches!(last.as_slice(), b"DCTDecode" | b"DCT") => (rest, Encoding::Jpeg),
        _ => (filters, Encoding::Samples),
    };
    if let Some(unsupported) = byte_filters.iter().find(|f| ByteFilter::from_name(f).is_none()) {
        return Err(PdfError::UnsupportedFilter(name_str(unsupported)));
    }
    Ok((byte_filters, encoding))
}

/// `/DecodeParms` for the filter at `index`, from a single dictionary or an
/// array parallel to `/Filter`.
fn decode_params<'a>(doc: &'a Document, dict: &'a Dictionary, index: usize) -> Option<&'a Dictionary> {
    match resolve(doc, dict.get(b"DecodeParms").ok()?).ok()? {
        Object::Dictionary(params) => Some(params),
        Object::Array(items) => match resolve(doc, items.get(index)?).ok()? {
            Object::Dictionary(params) => Some(params),
            _ => None,
        },
        _ => None,
    }
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

fn ascii_hex_decode(input: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(input.len() / 2);
    let mut high: Option<u8> = None;
    for &byte in input {
        if byte == b'>' {
            break;
        }
        if byte.is_ascii_whitespace() {
            continue;
        }
        let value = hex_value(byte)
            .ok_or_else(|| PdfError::MalformedImage(format!("invalid hex digit 0x{byte:02x}")))?;
        match high.take() {
            Some(h) => output.push((h << 4) | value),
            None => high = Some(value),
        }
    }
    // An odd final digit is followed by an implicit zero.
    if let Some(h) = high {
        output.push(h << 4);
    }
    Ok(output)
}

fn run_length_decode(input: &[u8]) -> Result<Vec<u8>> {
    let truncated = || PdfError::MalformedImage("truncated run-length data".into());
    let mut output = Vec::with_capacity(input.len() * 2);
    let mut i = 0;
    while let Some(&length) = input.get(i) {
        match length {
            128 => break,
            0..=127 => {
                let run = input.get(i + 1..i + 2 + length as usize).ok_or_else(truncated)?;
                output.extend_from_slice(run);
                i += 2 + length as usize;
            }
            _ => {
                let byte = *input.get(i + 1).ok_or_else(truncated)?;
                output.extend(std::iter::repeat_n(byte, 257 - length as usize));
                i += 2;
            }
        }
    }
    Ok(output)
}

fn apply_filter(filter: ByteFilter, input: &[u8], params: Option<&Dictionary>) -> Result<Vec<u8>> {
    match filter {
        ByteFilter::AsciiHex => ascii_hex_decode(input),
        ByteFilter::RunLength => run_length_decode(input),
        _ => {
            // lopdf refuses to decompress streams marked as images, so the
            // filter runs on a bare stream carrying only the filter entries.
            let mut dict = Dictionary::new();
            dict.set("Filter", Object::Name(filter.lopdf_name().as_bytes().to_vec()));
            if let Some(params) = params {
                dict.set("DecodeParms", Object::Dictionary(params.clone()));
            }
            Ok(Stream::new(dict, input.to_vec()).decompressed_content()?)
        }
    }
}

/// Runs the byte-level filters over a stream's content, predictors included.
fn unfilter<'a>(doc: &Document, stream: &'a Stream, filters: &[Vec<u8>]) -> Result<Cow<'a, [u8]>> {
    let mut data = Cow::Borrowed(stream.content.as_slice());
    for (index, name) in filters.iter().enumerate() {
        let filter = ByteFilter::from_name(name).ok_or_else(|| PdfError::UnsupportedFilter(name_str(name)))?;
        data = Cow::Owned(apply_filter(filter, &data, decode_params(doc, &stream.dict, index))?);
    }
    Ok(data)
}

fn name_str(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

/// Resolves a `/ColorSpace` entry, looking named colour spaces up in the
/// page's `/ColorSpace` resources.
pub fn resolve_color_space(
    doc: &Document,
    resources: Option<&Dictionary>,
    object: &Object,
) -> Result<ColorSpace> {
    resolve_color_space_at(doc, resources, object, 0)
}

fn resolve_color_space_at(
    doc: &Document,
    resources: Option<&Dictionary>,
    object: &Object,
    depth: usize,
) -> Result<ColorSpace> {
    if depth > MAX_COLOR_SPACE_DEPTH {
        return Err(PdfError::UnsupportedColorSpace("colour space chain too deep".into()));
    }

    match resolve(doc, object)? {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"G" | b"CalGray" => Ok(ColorSpace::Gray),
            b"DeviceRGB" | b"RGB" | b"CalRGB" => Ok(ColorSpace::Rgb),
            b"DeviceCMYK" | b"CMYK" => Ok(ColorSpace::Cmyk),
            named => {
                let table = match resources.and_then(|r| r.get(b"ColorSpace").ok()) {
                    Some(table) => resolve_dict(doc, table)?,
                    None => {
                        return Err(PdfError::UnsupportedColorSpace(format!(
                            "named colour space {} without resources",
                            name_str(named)
                        )));
                    }
                };
                let entry = table.get(named).map_err(|_| {
                    PdfError::UnsupportedColorSpace(format!(
                        "named colour space {} not found",
                        name_str(named)
                    ))
                })?;
                resolve_color_space_at(doc, resources, entry, depth + 1)
            }
        },
        Object::Array(items) => {
            let family = match items.first().map(|f| resolve(doc, f)) {
                Some(Ok(Object::Name(family))) => family.as_slice(),
                _ => return Err(PdfError::MalformedImage("colour space array without family".into())),
            };
            match family {
                b"DeviceGray" | b"G" | b"CalGray" => Ok(ColorSpace::Gray),
                b"DeviceRGB" | b"RGB" | b"CalRGB" => Ok(ColorSpace::Rgb),
                b"DeviceCMYK" | b"CMYK" => Ok(ColorSpace::Cmyk),
                b"ICCBased" => {
                    let profile = items
                        .get(1)
                        .ok_or_else(|| PdfError::MalformedImage("ICCBased without profile".into()))?;
                    let profile = resolve_dict(doc, profile)?;
                    match dict_u32(doc, profile, b"N") {
                        Some(1) => Ok(ColorSpace::Gray),
                        Some(3) => Ok(ColorSpace::Rgb),
                        Some(4) => Ok(ColorSpace::Cmyk),
                        _ => match profile.get(b"Alternate") {
                            Ok(alternate) => resolve_color_space_at(doc, resources, alternate, depth + 1),
                            Err(_) => Err(PdfError::UnsupportedColorSpace("ICCBased without /N".into())),
                        },
                    }
                }
                b"Indexed" | b"I" => {
                    let [_, base, hival, lookup] = items.as_slice() else {
                        return Err(PdfError::MalformedImage("Indexed needs four entries".into()));
                    };
                    let base = resolve_color_space_at(doc, resources, base, depth + 1)?;
                    if matches!(base, ColorSpace::Indexed { .. }) {
                        return Err(PdfError::UnsupportedColorSpace("nested Indexed".into()));
                    }
                    let hival = match resolve(doc, hival)? {
                        Object::Integer(v) => (*v).clamp(0, 255) as u8,
                        other => {
                            return Err(PdfError::MalformedImage(format!(
                                "Indexed hival is {}",
                                object_kind(other)
                            )));
                        }
                    };
                    let lookup = match resolve(doc, lookup)? {
                        Object::String(bytes, _) => bytes.clone(),
                        Object::Stream(stream) => {
                            let filters = filter_names(doc, &stream.dict)?;
                            unfilter(doc, stream, &filters)?.into_owned()
                        }
                        other => {
                            return Err(PdfError::MalformedImage(format!(
                                "Indexed lookup is {}",
                                object_kind(other)
                            )));
                        }
                    };
                    Ok(ColorSpace::Indexed {
                        base: Box::new(base),
                        hival,
                        lookup,
                    })
                }
                other => Err(PdfError::UnsupportedColorSpace(name_str(other))),
            }
        }
        other => Err(PdfError::MalformedImage(format!(
            "/ColorSpace is {}",
            object_kind(other)
        ))),
    }
}

fn read_sample(row: &[u8], index: usize, bpc: u8) -> u16 {
    match bpc {
        8 => u16::from(row[index]),
        16 => u16::from_be_bytes([row[2 * index], row[2 * index + 1]]),
        _ => {
            let bit = index * bpc as usize;
            let shift = 8 - bpc as usize - (bit % 8);
            let mask = (1u16 << bpc) - 1;
            (u16::from(row[bit / 8]) >> shift) & mask
        }
    }
}

fn scale_sample(sample: u16, bpc: u8) -> u8 {
    match bpc {
        8 => sample as u8,
        16 => (sample >> 8) as u8,
        _ => (u32::from(sample) * 255 / ((1u32 << bpc) - 1)) as u8,
    }
}

fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8) -> [u8; 3] {
    let channel = |v: u8| ((255 - u32::from(v)) * (255 - u32::from(k)) / 255) as u8;
    [channel(c), channel(m), channel(y)]
}

fn push_color(out: &mut Vec<u8>, space: &ColorSpace, components: &[u8]) {
    match space {
        ColorSpace::Gray => out.push(components[0]),
        ColorSpace::Rgb => out.extend_from_slice(&components[..3]),
        ColorSpace::Cmyk => out.extend_from_slice(&cmyk_to_rgb(
            components[0],
            components[1],
            components[2],
            components[3],
        )),
        ColorSpace::Indexed { .. } => {}
    }
}

/// Unpacks raw samples into an 8-bit gray or RGB image.
pub fn samples_to_image(
    width: u32,
    height: u32,
    bits_per_component: u8,
    space: &ColorSpace,
    data: &[u8],
) -> Result<DynamicImage> {
    let bpc = bits_per_component;
    if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
        return Err(PdfError::MalformedImage(format!("{bpc} bits per component")));
    }
    if matches!(space, ColorSpace::Indexed { .. }) && bpc == 16 {
        return Err(PdfError::MalformedImage("16-bit Indexed image".into()));
    }
    if width == 0 || height == 0 {
        return Err(PdfError::MalformedImage("empty image".into()));
    }

    let components = space.components();
    let stride = (width as usize * components * bpc as usize).div_ceil(8);
    let needed = stride * height as usize;
    if data.len() < needed {
        return Err(PdfError::MalformedImage(format!(
            "expected {needed} bytes of samples, found {}",
            data.len()
        )));
    }

    let gray = space.is_gray();
    let out_components = if gray { 1 } else { 3 };
    let mut pixels = Vec::with_capacity(width as usize * height as usize * out_components);
    let mut scratch = [0u8; 4];

    for row in data.chunks_exact(stride).take(height as usize) {
        for x in 0..width as usize {
            match space {
                ColorSpace::Indexed { base, hival, lookup } => {
                    let index = read_sample(row, x, bpc).min(u16::from(*hival)) as usize;
                    let n = base.components();
                    let entry = lookup
                        .get(index * n..index * n + n)
                        .map_or([0u8; 4], |e| {
                            let mut buf = [0u8; 4];
                            buf[..n].copy_from_slice(e);
                            buf
                        });
                    push_color(&mut pixels, base, &entry[..n]);
                }
                _ => {
                    for (c, slot) in scratch.iter_mut().enumerate().take(components) {
                        *slot = scale_sample(read_sample(row, x * components + c, bpc), bpc);
                    }
                    push_color(&mut pixels, space, &scratch[..components]);
                }
            }
        }
    }

    let malformed = || PdfError::MalformedImage("sample buffer size mismatch".into());
    if gray {
        GrayImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(malformed)
    } else {
        RgbImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(malformed)
    }
}

fn decode_base(doc: &Document, resources: Option<&Dictionary>, raw: &RawImage<'_>) -> Result<DynamicImage> {
    let (byte_filters, encoding) = classify_filters(&raw.filters)?;
    let data = unfilter(doc, raw.stream, byte_filters)?;
    match encoding {
        Encoding::Jpeg => Ok(image::load_from_memory_with_format(&data, ImageFormat::Jpeg)?),
        Encoding::Samples => {
            if raw.image_mask {
                return samples_to_image(raw.width, raw.height, 1, &ColorSpace::Gray, &data);
            }
            let color_space = raw
                .color_space
                .ok_or_else(|| PdfError::MalformedImage("missing /ColorSpace".into()))?;
            let space = resolve_color_space(doc, resources, color_space)?;
            let bpc = raw.bits_per_component.unwrap_or(8);
            samples_to_image(raw.width, raw.height, bpc, &space, &data)
        }
    }
}

fn apply_soft_mask(doc: &Document, base: DynamicImage, mask_id: ObjectId) -> Result<DynamicImage> {
    let Object::Stream(stream) = doc.get_object(mask_id)? else {
        return Err(PdfError::MalformedImage("/SMask is not a stream".into()));
    };
    let mask_raw = raw_image(doc, mask_id, b"SMask".to_vec(), stream)?;
    let mut mask = decode_base(doc, None, &mask_raw)?.to_luma8();

    let mut rgba = base.to_rgba8();
    if mask.dimensions() != rgba.dimensions() {
        mask = image::imageops::resize(&mask, rgba.width(), rgba.height(), FilterType::Triangle);
    }
    for (pixel, alpha) in rgba.pixels_mut().zip(mask.pixels()) {
        pixel[3] = alpha[0];
    }
    Ok(DynamicImage::ImageRgba8(rgba))
}

/// Decodes an embedded image to pixels ready to be written as PNG.
///
/// `resources` is the page's resource dictionary, used to resolve named
/// colour spaces.
pub fn decode_image(
    doc: &Document,
    resources: Option<&Dictionary>,
    raw: &RawImage<'_>,
) -> Result<DynamicImage> {
    let base = decode_base(doc, resources, raw)?;
    match raw.soft_mask {
        Some(mask_id) => apply_soft_mask(doc, base, mask_id),
        None if raw.has_named_color_space() => Ok(DynamicImage::ImageRgb8(base.to_rgb8())),
        None => Ok(base),
    }
}
