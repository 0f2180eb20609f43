//! Imágenes sintéticas para pruebas.
//!
//! Cada generador produce un archivo pequeño pero estructuralmente válido
//! (CRCs PNG correctos, tamaños RIFF coherentes, IFDs ordenados) con la
//! metadata que los tests esperan encontrar.

use crate::container::ifd::{
    Endian, IFD_ENTRY_LEN, TIFF_HEADER_LEN, TIFF_MAGIC, TYPE_ASCII, TYPE_BYTE, TYPE_LONG,
    TYPE_RATIONAL, TYPE_SHORT, TYPE_UNDEFINED,
};

/// Paquete XMP con autoría, palabras clave, contacto y coordenadas.
pub const XMP_PACKET: &str = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/">
 <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
  <rdf:Description rdf:about=""
    xmlns:dc="http://purl.org/dc/elements/1.1/"
    xmlns:xmp="http://ns.adobe.com/xap/1.0/"
    xmlns:exif="http://ns.adobe.com/exif/1.0/"
    xmlns:Iptc4xmpCore="http://iptc.org/std/Iptc4xmpCore/1.0/xmlns/"
    xmp:CreatorTool="Adobe Lightroom">
   <dc:creator>
    <rdf:Seq>
     <rdf:li>Ana Fotografa</rdf:li>
    </rdf:Seq>
   </dc:creator>
   <dc:subject>
    <rdf:Bag>
     <rdf:li>playa</rdf:li>
     <rdf:li>verano</rdf:li>
    </rdf:Bag>
   </dc:subject>
   <Iptc4xmpCore:CreatorContactInfo rdf:parseType="Resource">
    <Iptc4xmpCore:CiEmailWork>ana@example.com</Iptc4xmpCore:CiEmailWork>
   </Iptc4xmpCore:CreatorContactInfo>
   <exif:GPSLatitude>40,26.766667N</exif:GPSLatitude>
   <exif:GPSLongitude>79,58.933333W</exif:GPSLongitude>
  </rdf:Description>
 </rdf:RDF>
</x:xmpmeta>"#;

/// Flujo zlib de una imagen 1x1 en escala de grises de 8 bits.
pub const GRAY_1X1_IDAT: [u8; 13] = [
    0x78, 0x01, 0x01, 0x02, 0x00, 0xFD, 0xFF, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01,
];

/// Bitstream VP8L de una imagen 1x1.
pub const VP8L_1X1: [u8; 13] = [
    0x2F, 0x00, 0x00, 0x00, 0x10, 0x07, 0x10, 0x11, 0x11, 0x88, 0x88, 0xFE, 0x07,
];

/// Tira de píxeles de un TIFF 2x2 en escala de grises.
pub const TIFF_STRIP: &[u8] = &[0x00, 0x40, 0x80, 0xFF];

// ---------------------------------------------------------------------------
// TIFF / EXIF
// ---------------------------------------------------------------------------

/// Valor de una entrada de IFD sintética.
#[derive(Clone, Debug)]
pub enum Value {
    Ascii(Vec<u8>),
    Byte(Vec<u8>),
    Undefined(Vec<u8>),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Rational(Vec<(u32, u32)>),
    /// Offset (LONG) del IFD con ese índice dentro de la lista.
    Pointer(usize),
    /// Offset (LONG) del bloque final de datos.
    Tail,
}

impl Value {
    pub fn ascii(text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        Value::Ascii(bytes)
    }

    fn field_type(&self) -> u16 {
        match self {
            Value::Ascii(_) => TYPE_ASCII,
            Value::Byte(_) => TYPE_BYTE,
            Value::Undefined(_) => TYPE_UNDEFINED,
            Value::Short(_) => TYPE_SHORT,
            Value::Long(_) | Value::Pointer(_) | Value::Tail => TYPE_LONG,
            Value::Rational(_) => TYPE_RATIONAL,
        }
    }

    fn count(&self) -> u32 {
        let count = match self {
            Value::Ascii(bytes) | Value::Byte(bytes) | Value::Undefined(bytes) => bytes.len(),
            Value::Short(values) => values.len(),
            Value::Long(values) => values.len(),
            Value::Rational(values) => values.len(),
            Value::Pointer(_) | Value::Tail => 1,
        };
        count as u32
    }

    fn byte_len(&self) -> usize {
        match self {
            Value::Ascii(bytes) | Value::Byte(bytes) | Value::Undefined(bytes) => bytes.len(),
            Value::Short(values) => values.len() * 2,
            Value::Long(values) => values.len() * 4,
            Value::Rational(values) => values.len() * 8,
            Value::Pointer(_) | Value::Tail => 4,
        }
    }

    fn encode(&self, endian: Endian, ifd_offsets: &[usize], tail: usize) -> Vec<u8> {
        match self {
            Value::Ascii(bytes) | Value::Byte(bytes) | Value::Undefined(bytes) => bytes.clone(),
            Value::Short(values) => values.iter().flat_map(|v| endian.u16_bytes(*v)).collect(),
            Value::Long(values) => values.iter().flat_map(|v| endian.u32_bytes(*v)).collect(),
            Value::Rational(values) => values
                .iter()
                .flat_map(|(n, d)| {
                    let mut pair = endian.u32_bytes(*n).to_vec();
                    pair.extend_from_slice(&endian.u32_bytes(*d));
                    pair
                })
                .collect(),
            Value::Pointer(index) => {
                let target = ifd_offsets.get(*index).copied().unwrap_or_default();
                endian.u32_bytes(target as u32).to_vec()
            }
            Value::Tail => endian.u32_bytes(tail as u32).to_vec(),
        }
    }
}

/// IFD sintético: entradas (ordenadas al serializar) y enlace opcional al
/// siguiente IFD de la cadena.
#[derive(Clone, Debug)]
pub struct FixtureIfd {
    pub entries: Vec<(u16, Value)>,
    pub next: Option<usize>,
}

impl FixtureIfd {
    pub fn new(entries: Vec<(u16, Value)>) -> Self {
        Self {
            entries,
            next: None,
        }
    }

    /// Enlaza este IFD con el de índice `index` mediante el puntero "siguiente".
    pub fn next(mut self, index: usize) -> Self {
        self.next = Some(index);
        self
    }

    fn encoded_len(&self) -> usize {
        let table = 2 + self.entries.len() * IFD_ENTRY_LEN + 4;
        let area: usize = self
            .entries
            .iter()
            .map(|(_, value)| value.byte_len())
            .filter(|len| *len > 4)
            .map(|len| len + (len & 1))
            .sum();
        table + area
    }
}

/// Serializa una estructura TIFF. El primer IFD de la lista es el IFD0.
pub fn tiff_bytes(endian: Endian, ifds: &[FixtureIfd]) -> Vec<u8> {
    tiff_bytes_with_tail(endian, ifds, &[])
}

/// Como [`tiff_bytes`], añadiendo `tail` al final; [`Value::Tail`] apunta a él.
pub fn tiff_bytes_with_tail(endian: Endian, ifds: &[FixtureIfd], tail: &[u8]) -> Vec<u8> {
    let mut offsets = Vec::with_capacity(ifds.len());
    let mut cursor = TIFF_HEADER_LEN;
    for ifd in ifds {
        offsets.push(cursor);
        cursor += ifd.encoded_len();
    }
    let tail_offset = cursor;

    let mut out = Vec::with_capacity(cursor + tail.len());
    out.extend_from_slice(&endian.marker());
    out.extend_from_slice(&endian.u16_bytes(TIFF_MAGIC));
    let first = offsets.first().copied().unwrap_or_default();
    out.extend_from_slice(&endian.u32_bytes(first as u32));

    for (ifd, &offset) in ifds.iter().zip(&offsets) {
        let mut entries: Vec<&(u16, Value)> = ifd.entries.iter().collect();
        entries.sort_by_key(|(tag, _)| *tag);

        let table_len = 2 + entries.len() * IFD_ENTRY_LEN + 4;
        let mut area = Vec::new();
        out.extend_from_slice(&endian.u16_bytes(entries.len() as u16));
        for (tag, value) in entries {
            out.extend_from_slice(&endian.u16_bytes(*tag));
            out.extend_from_slice(&endian.u16_bytes(value.field_type()));
            out.extend_from_slice(&endian.u32_bytes(value.count()));
            let mut bytes = value.encode(endian, &offsets, tail_offset);
            if bytes.len() <= 4 {
                bytes.resize(4, 0);
                out.extend_from_slice(&bytes);
            } else {
                let at = offset + table_len + area.len();
                out.extend_from_slice(&endian.u32_bytes(at as u32));
                area.extend_from_slice(&bytes);
                if area.len() % 2 == 1 {
                    area.push(0);
                }
            }
        }
        let next = ifd
            .next
            .and_then(|index| offsets.get(index).copied())
            .unwrap_or_default();
        out.extend_from_slice(&endian.u32_bytes(next as u32));
        out.extend_from_slice(&area);
    }

    out.extend_from_slice(tail);
    out
}

/// EXIF con cámara, número de serie y posición GPS completa.
///
/// IFD0 apunta a un sub-IFD EXIF y a uno GPS; no hay IFD1.
pub fn gps_exif() -> Vec<u8> {
    let ifd0 = FixtureIfd::new(vec![
        (0x010F, Value::ascii("Canon")),
        (0x0110, Value::ascii("Canon EOS R6")),
        (0x0112, Value::Short(vec![1])),
        (0x0131, Value::ascii("Adobe Lightroom")),
        (0x0132, Value::ascii("2024:05:01 10:20:30")),
        (0x8769, Value::Pointer(1)),
        (0x8825, Value::Pointer(2)),
    ]);
    let exif = FixtureIfd::new(vec![
        (0x829A, Value::Rational(vec![(1, 125)])),
        (0x829D, Value::Rational(vec![(28, 10)])),
        (0xA431, Value::ascii("SN-0042")),
    ]);
    let gps = FixtureIfd::new(vec![
        (0x0000, Value::Byte(vec![2, 3, 0, 0])),
        (0x0001, Value::ascii("N")),
        (0x0002, Value::Rational(vec![(40, 1), (26, 1), (46, 1)])),
        (0x0003, Value::ascii("W")),
        (0x0004, Value::Rational(vec![(79, 1), (58, 1), (56, 1)])),
        (0x0005, Value::Byte(vec![0])),
        (0x0006, Value::Rational(vec![(300, 1)])),
    ]);
    tiff_bytes(Endian::Little, &[ifd0, exif, gps])
}

/// EXIF cuyo puntero al sub-IFD EXIF apunta al propio IFD0.
pub fn cyclic_exif() -> Vec<u8> {
    let ifd0 = FixtureIfd::new(vec![
        (0x010F, Value::ascii("Canon")),
        (0x8769, Value::Pointer(0)),
    ]);
    tiff_bytes(Endian::Little, &[ifd0])
}

/// Entradas estructurales de un TIFF 2x2 con una sola tira al final del archivo.
fn strip_entries() -> Vec<(u16, Value)> {
    vec![
        (0x0100, Value::Short(vec![2])),
        (0x0101, Value::Short(vec![2])),
        (0x0102, Value::Short(vec![8])),
        (0x0103, Value::Short(vec![1])),
        (0x0106, Value::Short(vec![1])),
        (0x0111, Value::Tail),
        (0x0115, Value::Short(vec![1])),
        (0x0116, Value::Short(vec![2])),
        (0x0117, Value::Long(vec![TIFF_STRIP.len() as u32])),
    ]
}

/// TIFF nativo con autoría, XMP e IPTC embebidos y un sub-IFD GPS.
///
/// La tira de píxeles es lo último del archivo.
pub fn tiff_with_metadata() -> Vec<u8> {
    let mut entries = strip_entries();
    entries.extend([
        (0x010F, Value::ascii("Canon")),
        (0x0131, Value::ascii("GIMP 2.10")),
        (0x013B, Value::ascii("Ana Fotografa")),
        (0x02BC, Value::Byte(XMP_PACKET.as_bytes().to_vec())),
        (0x83BB, Value::Undefined(iptc_sample())),
        (0x8825, Value::Pointer(1)),
    ]);
    let gps = FixtureIfd::new(vec![
        (0x0001, Value::ascii("N")),
        (0x0002, Value::Rational(vec![(40, 1), (26, 1), (46, 1)])),
        (0x0003, Value::ascii("W")),
        (0x0004, Value::Rational(vec![(79, 1), (58, 1), (56, 1)])),
    ]);
    tiff_bytes_with_tail(Endian::Little, &[FixtureIfd::new(entries), gps], TIFF_STRIP)
}

/// TIFF sin metadata: solo las etiquetas que describen los píxeles.
pub fn bare_tiff() -> Vec<u8> {
    tiff_bytes_with_tail(Endian::Big, &[FixtureIfd::new(strip_entries())], TIFF_STRIP)
}

/// TIFF de tres páginas; solo la tercera lleva autoría.
pub fn three_page_tiff() -> Vec<u8> {
    let mut last = strip_entries();
    last.push((0x013B, Value::ascii("Ana Fotografa")));
    let pages = [
        FixtureIfd::new(strip_entries()).next(1),
        FixtureIfd::new(strip_entries()).next(2),
        FixtureIfd::new(last),
    ];
    tiff_bytes_with_tail(Endian::Little, &pages, TIFF_STRIP)
}

/// Tablas JPEG abreviadas (SOI, DQT, EOI) para `JPEGTables`.
pub const JPEG_TABLES: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xDB, 0x00, 0x06, 0x00, 0x01, 0x02, 0x03, 0xFF, 0xD9,
];

/// TIFF con compresión JPEG (7) que depende de `JPEGTables` y `FillOrder`,
/// más un autor.
pub fn tiff_with_jpeg_tables() -> Vec<u8> {
    let mut entries: Vec<(u16, Value)> = strip_entries()
        .into_iter()
        .filter(|(tag, _)| *tag != 0x0103)
        .collect();
    entries.extend([
        (0x0103, Value::Short(vec![7])),
        (0x010A, Value::Short(vec![1])),
        (0x013B, Value::ascii("Ana Fotografa")),
        (0x015B, Value::Undefined(JPEG_TABLES.to_vec())),
    ]);
    tiff_bytes_with_tail(Endian::Little, &[FixtureIfd::new(entries)], TIFF_STRIP)
}

/// IFD0 estructural más una etiqueta privada sin nombre conocido.
pub fn tiff_with_private_tag() -> Vec<u8> {
    let mut entries = strip_entries();
    entries.push((0xC0DE, Value::Long(vec![1])));
    tiff_bytes_with_tail(Endian::Little, &[FixtureIfd::new(entries)], TIFF_STRIP)
}

/// Paquete XMP con `depth` elementos anidados dentro de una propiedad.
pub fn deeply_nested_xmp(depth: usize) -> String {
    let mut packet = String::from(
        r#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"><rdf:Description xmlns:dc="http://purl.org/dc/elements/1.1/">"#,
    );
    packet.push_str(&"<dc:a>".repeat(depth));
    packet.push_str(&"</dc:a>".repeat(depth));
    packet.push_str("</rdf:Description></rdf:RDF></x:xmpmeta>");
    packet
}

/// TIFF cuyo IFD0 se enlaza consigo mismo como siguiente página.
pub fn tiff_with_ifd_loop() -> Vec<u8> {
    let ifd0 = FixtureIfd::new(strip_entries()).next(0);
    tiff_bytes_with_tail(Endian::Little, &[ifd0], TIFF_STRIP)
}

// ---------------------------------------------------------------------------
// IPTC
// ---------------------------------------------------------------------------

/// Dataset IIM con longitud estándar de 2 bytes.
pub fn iptc_dataset(record: u8, dataset: u8, value: &[u8]) -> Vec<u8> {
    let mut out = vec![0x1C, record, dataset];
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value);
    out
}

/// Autor, ciudad, copyright y pie de foto en UTF-8.
pub fn iptc_sample() -> Vec<u8> {
    let mut out = iptc_dataset(1, 90, &[0x1B, 0x25, 0x47]);
    out.extend(iptc_dataset(2, 0, &[0, 4]));
    out.extend(iptc_dataset(2, 80, "Ana Fotógrafa".as_bytes()));
    out.extend(iptc_dataset(2, 90, b"Pittsburgh"));
    out.extend(iptc_dataset(2, 116, "© 2024 Ana".as_bytes()));
    out.extend(iptc_dataset(2, 120, b"Atardecer en el puerto"));
    out
}

/// Bloque Photoshop 3.0 con un único recurso `8BIM` 0x0404.
pub fn photoshop_irb(iptc: &[u8]) -> Vec<u8> {
    let mut out = b"Photoshop 3.0\0".to_vec();
    out.extend_from_slice(b"8BIM");
    out.extend_from_slice(&0x0404u16.to_be_bytes());
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&(iptc.len() as u32).to_be_bytes());
    out.extend_from_slice(iptc);
    if iptc.len() % 2 == 1 {
        out.push(0);
    }
    out
}

// ---------------------------------------------------------------------------
// JPEG
// ---------------------------------------------------------------------------

/// Marcador JPEG con campo de longitud.
pub fn jpeg_segment(code: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, code];
    out.extend_from_slice(&((body.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(body);
    out
}

pub fn jpeg_app1_exif(tiff: &[u8]) -> Vec<u8> {
    let mut body = b"Exif\0\0".to_vec();
    body.extend_from_slice(tiff);
    jpeg_segment(0xE1, &body)
}

pub fn jpeg_app1_xmp(packet: &str) -> Vec<u8> {
    let mut body = b"http://ns.adobe.com/xap/1.0/\0".to_vec();
    body.extend_from_slice(packet.as_bytes());
    jpeg_segment(0xE1, &body)
}

/// Cabecera SOS, datos de entropía con un byte `FF 00` y EOI.
pub fn jpeg_scan() -> Vec<u8> {
    let mut out = jpeg_segment(0xDA, &[0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
    out.extend_from_slice(&[0x12, 0x34, 0xFF, 0x00, 0x56, 0x78]);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

/// SOI, APP0 JFIF, los segmentos indicados, una DQT y el escaneo.
pub fn jpeg_with_segments(segments: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    out.extend(jpeg_segment(
        0xE0,
        &[b'J', b'F', b'I', b'F', 0, 1, 1, 0, 0, 1, 0, 1, 0, 0],
    ));
    for segment in segments {
        out.extend_from_slice(segment);
    }
    let mut dqt = vec![0x00];
    dqt.extend_from_slice(&[1u8; 64]);
    out.extend(jpeg_segment(0xDB, &dqt));
    out.extend(jpeg_scan());
    out
}

/// JPEG con EXIF (GPS incluido), XMP, IPTC y un comentario, en ese orden.
pub fn jpeg_with_everything() -> Vec<u8> {
    jpeg_with_segments(&[
        jpeg_app1_exif(&gps_exif()),
        jpeg_app1_xmp(XMP_PACKET),
        jpeg_segment(0xED, &photoshop_irb(&iptc_sample())),
        jpeg_segment(0xFE, b"Hecho con mi camara"),
    ])
}

// ---------------------------------------------------------------------------
// PNG
// ---------------------------------------------------------------------------

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Chunk PNG con CRC correcto.
pub fn png_chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = (data.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(kind);
    hasher.update(data);
    out.extend_from_slice(&hasher.finalize().to_be_bytes());
    out
}

/// Firma, IHDR de 1x1 en gris, los chunks indicados e IEND.
pub fn png_from_chunks(chunks: &[Vec<u8>]) -> Vec<u8> {
    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&1u32.to_be_bytes());
    ihdr.extend_from_slice(&1u32.to_be_bytes());
    ihdr.extend_from_slice(&[8, 0, 0, 0, 0]);

    let mut out = PNG_SIGNATURE.to_vec();
    out.extend(png_chunk(b"IHDR", &ihdr));
    for chunk in chunks {
        out.extend_from_slice(chunk);
    }
    out.extend(png_chunk(b"IEND", &[]));
    out
}

/// PNG 1x1 sin metadata.
pub fn bare_png() -> Vec<u8> {
    png_from_chunks(&[png_chunk(b"IDAT", &GRAY_1X1_IDAT)])
}

/// PNG con texto, eXIf, XMP en iTXt y tIME antes de los datos de imagen.
pub fn png_with_everything() -> Vec<u8> {
    let mut xmp = b"XML:com.adobe.xmp\0\0\0\0\0".to_vec();
    xmp.extend_from_slice(XMP_PACKET.as_bytes());
    png_from_chunks(&[
        png_chunk(b"tEXt", b"Author\0Ana Fotografa"),
        png_chunk(b"eXIf", &gps_exif()),
        png_chunk(b"iTXt", &xmp),
        png_chunk(b"tIME", &[0x07, 0xE8, 5, 1, 10, 20, 30]),
        png_chunk(b"IDAT", &GRAY_1X1_IDAT),
    ])
}

// ---------------------------------------------------------------------------
// WebP
// ---------------------------------------------------------------------------

/// Chunk RIFF con relleno a longitud par.
pub fn webp_chunk(fourcc: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = fourcc.to_vec();
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    if body.len() % 2 == 1 {
        out.push(0);
    }
    out
}

/// Cabecera `RIFF....WEBP` seguida de los chunks indicados.
pub fn webp_from_chunks(chunks: &[Vec<u8>]) -> Vec<u8> {
    let body_len: usize = chunks.iter().map(Vec::len).sum();
    let mut out = b"RIFF".to_vec();
    out.extend_from_slice(&((body_len + 4) as u32).to_le_bytes());
    out.extend_from_slice(b"WEBP");
    for chunk in chunks {
        out.extend_from_slice(chunk);
    }
    out
}

/// Chunk VP8X de un lienzo 1x1 con las banderas indicadas.
pub fn vp8x_chunk(flags: u8) -> Vec<u8> {
    webp_chunk(b"VP8X", &[flags, 0, 0, 0, 0, 0, 0, 0, 0, 0])
}

/// WebP 1x1 simple, sin metadata.
pub fn bare_webp() -> Vec<u8> {
    webp_from_chunks(&[webp_chunk(b"VP8L", &VP8L_1X1)])
}

/// WebP extendido con EXIF (GPS incluido) y XMP.
pub fn webp_with_everything() -> Vec<u8> {
    webp_from_chunks(&[
        vp8x_chunk(0x04 | 0x08),
        webp_chunk(b"VP8L", &VP8L_1X1),
        webp_chunk(b"EXIF", &gps_exif()),
        webp_chunk(b"XMP ", XMP_PACKET.as_bytes()),
    ])
}
