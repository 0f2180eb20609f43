//! Texto libre: chunks `tEXt`/`zTXt`/`iTXt`/`tIME` de PNG y comentarios JPEG.

use super::{DecodeOutcome, DecodedTag};
use crate::container::{Marker, be_u16};
use crate::error::DecodeIssue;
use crate::tag::{Namespace, TagId};
use encoding_rs::WINDOWS_1252;

pub fn decode(payload: &[u8], marker: Marker) -> DecodeOutcome {
    let tag = match marker {
        Marker::PngChunk(kind) => match &kind {
            b"tEXt" => latin1_text(payload),
            b"zTXt" => compressed_text(payload),
            b"iTXt" => international_text(payload),
            b"tIME" => modification_time(payload),
            _ => None,
        },
        Marker::Jpeg(_) => Some(comment(payload)),
        _ => None,
    };

    match tag {
        Some(tag) => DecodeOutcome {
            tags: vec![tag],
            issues: Vec::new(),
        },
        None => DecodeOutcome::failed(DecodeIssue::malformed(
            0,
            format!("bloque de texto {marker} ilegible"),
        )),
    }
}

fn text_tag(keyword: &str, value: String) -> DecodedTag {
    DecodedTag::new(Namespace::Text, TagId::Key(keyword.to_string()), keyword, value)
}

/// Separa la palabra clave Latin-1 del resto del chunk.
fn split_keyword(payload: &[u8]) -> Option<(String, &[u8])> {
    let end = payload.iter().position(|b| *b == 0)?;
    if end == 0 || end > 79 {
        return None;
    }
    let keyword = WINDOWS_1252.decode_without_bom_handling(&payload[..end]).0;
    Some((keyword.into_owned(), &payload[end + 1..]))
}

fn latin1_text(payload: &[u8]) -> Option<DecodedTag> {
    let (keyword, text) = split_keyword(payload)?;
    let value = WINDOWS_1252.decode_without_bom_handling(text).0;
    Some(text_tag(&keyword, value.trim().to_string()))
}

fn compressed_text(payload: &[u8]) -> Option<DecodedTag> {
    let (keyword, rest) = split_keyword(payload)?;
    let compressed = rest.len().saturating_sub(1);
    Some(text_tag(&keyword, format!("(texto comprimido, {compressed} bytes)")))
}

fn international_text(payload: &[u8]) -> Option<DecodedTag> {
    let (keyword, _) = split_keyword(payload)?;
    let value = match crate::container::png::itxt_text_range(payload) {
        Some(range) => String::from_utf8_lossy(range.slice(payload)?).trim().to_string(),
        None => format!("(texto comprimido, {} bytes)", payload.len()),
    };
    Some(text_tag(&keyword, value))
}

fn modification_time(payload: &[u8]) -> Option<DecodedTag> {
    let [_, _, month, day, hour, minute, second] = payload.get(..7)? else {
        return None;
    };
    let year = be_u16(payload, 0)?;
    let value = format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}");
    Some(text_tag("ModificationTime", value))
}

fn comment(payload: &[u8]) -> DecodedTag {
    let text = match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => WINDOWS_1252.decode_without_bom_handling(payload).0.into_owned(),
    };
    text_tag(
        "Comment",
        text.trim_matches(|c: char| c == '\0' || c.is_whitespace())
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_text_chunks() {
        let outcome = decode(b"Author\0Ana P\xe9rez", Marker::PngChunk(*b"tEXt"));
        assert_eq!(outcome.tags[0].name, "Author");
        assert_eq!(outcome.tags[0].value, "Ana Pérez");

        let outcome = decode(b"Comment\0\0\0es\0\0hola", Marker::PngChunk(*b"iTXt"));
        assert_eq!(outcome.tags[0].value, "hola");

        let outcome = decode(b"Software\0\0\x78\x9c\x01", Marker::PngChunk(*b"zTXt"));
        assert_eq!(outcome.tags[0].value, "(texto comprimido, 3 bytes)");
    }

    #[test]
    fn png_time_is_iso() {
        let payload = [0x07, 0xE8, 5, 1, 10, 20, 30];
        let outcome = decode(&payload, Marker::PngChunk(*b"tIME"));
        assert_eq!(outcome.tags[0].name, "ModificationTime");
        assert_eq!(outcome.tags[0].value, "2024-05-01T10:20:30");
    }

    #[test]
    fn jpeg_comment_and_broken_chunk() {
        let outcome = decode(b"Hecho con mi camara\0", Marker::Jpeg(0xFE));
        assert_eq!(outcome.tags[0].value, "Hecho con mi camara");

        let outcome = decode(b"sin separador", Marker::PngChunk(*b"tEXt"));
        assert!(outcome.tags.is_empty());
        assert_eq!(outcome.issues.len(), 1);
    }
}
