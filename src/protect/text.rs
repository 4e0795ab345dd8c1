//! Notice text rendering for the overlay layers.
//!
//! Printable ASCII is shown with Helvetica under WinAnsi. Every other
//! character goes through the predefined `STSong-Light` CID font, whose
//! `UniGB-UCS2-H` CMap takes big-endian UCS-2 codes directly.

use lopdf::{dictionary, Dictionary, Document, Object};

pub const LATIN_FONT: &str = "F2";
pub const CJK_FONT: &str = "F1";

const FONT_SIZE: u32 = 10;
const LEFT_MARGIN: f64 = 10.0;
const TOP_MARGIN: f64 = 40.0;

/// A run of text shown with a single font.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextRun {
    Latin(Vec<u8>),
    Cjk(Vec<u8>),
}

impl TextRun {
    fn font(&self) -> &'static str {
        match self {
            TextRun::Latin(_) => LATIN_FONT,
            TextRun::Cjk(_) => CJK_FONT,
        }
    }

    fn bytes(&self) -> &[u8] {
        match self {
            TextRun::Latin(bytes) | TextRun::Cjk(bytes) => bytes,
        }
    }
}

/// Splits `text` into font runs. Characters outside the BMP have no UCS-2
/// code and are shown as `?`.
pub fn split_runs(text: &str) -> Vec<TextRun> {
    let mut runs: Vec<TextRun> = Vec::new();
    for c in text.chars() {
        let code = c as u32;
        if (0x20..=0x7E).contains(&code) {
            match runs.last_mut() {
                Some(TextRun::Latin(bytes)) => bytes.push(code as u8),
                _ => runs.push(TextRun::Latin(vec![code as u8])),
            }
            continue;
        }

        let unit = if code <= 0xFFFF { code as u16 } else { u16::from(b'?') };
        match runs.last_mut() {
            Some(TextRun::Cjk(bytes)) => bytes.extend_from_slice(&unit.to_be_bytes()),
            _ => runs.push(TextRun::Cjk(unit.to_be_bytes().to_vec())),
        }
    }
    runs
}

/// Content stream drawing `text` in grey near the top-left of `media_box`.
pub fn notice_content(text: &str, media_box: [f64; 4]) -> Vec<u8> {
    let x = media_box[0] + LEFT_MARGIN;
    let y = media_box[3] - TOP_MARGIN;

    let mut out = String::from("q\n0.5 0.5 0.5 rg\nBT\n");
    out.push_str(&format!("1 0 0 1 {} {} Tm\n", format_number(x), format_number(y)));
    for run in split_runs(text) {
        out.push_str(&format!(
            "/{} {} Tf\n<{}> Tj\n",
            run.font(),
            FONT_SIZE,
            hex::encode_upper(run.bytes())
        ));
    }
    out.push_str("ET\nQ\n");
    out.into_bytes()
}

/// Opaque white rectangle covering `media_box`.
pub fn cover_content(media_box: [f64; 4]) -> Vec<u8> {
    let [x0, y0, x1, y1] = media_box;
    format!(
        "q\n1 1 1 rg\n{} {} {} {} re\nf\nQ\n",
        format_number(x0),
        format_number(y0),
        format_number(x1 - x0),
        format_number(y1 - y0)
    )
    .into_bytes()
}

/// Adds both notice fonts to `doc` and returns a `/Font` resource dictionary
/// referencing them.
pub fn install_fonts(doc: &mut Document) -> Dictionary {
    let descriptor = doc.add_object(dictionary! {
        "Type" => Object::Name(b"FontDescriptor".to_vec()),
        "FontName" => Object::Name(b"STSong-Light".to_vec()),
        "Flags" => 4,
        "FontBBox" => vec![
            Object::Integer(-500),
            Object::Integer(-500),
            Object::Integer(1500),
            Object::Integer(1500),
        ],
        "ItalicAngle" => 0,
        "Ascent" => 880,
        "Descent" => -120,
        "CapHeight" => 880,
        "StemV" => 80,
    });
    let descendant = doc.add_object(dictionary! {
        "Type" => Object::Name(b"Font".to_vec()),
        "Subtype" => Object::Name(b"CIDFontType0".to_vec()),
        "BaseFont" => Object::Name(b"STSong-Light".to_vec()),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("GB1"),
            "Supplement" => 2,
        },
        "FontDescriptor" => descriptor,
    });
    let cjk = doc.add_object(dictionary! {
        "Type" => Object::Name(b"Font".to_vec()),
        "Subtype" => Object::Name(b"Type0".to_vec()),
        "BaseFont" => Object::Name(b"STSong-Light".to_vec()),
        "Encoding" => Object::Name(b"UniGB-UCS2-H".to_vec()),
        "DescendantFonts" => vec![Object::Reference(descendant)],
    });
    let latin = doc.add_object(dictionary! {
        "Type" => Object::Name(b"Font".to_vec()),
        "Subtype" => Object::Name(b"Type1".to_vec()),
        "BaseFont" => Object::Name(b"Helvetica".to_vec()),
        "Encoding" => Object::Name(b"WinAnsiEncoding".to_vec()),
    });

    dictionary! {
        CJK_FONT => cjk,
        LATIN_FONT => latin,
    }
}

/// Shortest decimal form, without a trailing `.0`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let s = format!("{:.4}", value);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
