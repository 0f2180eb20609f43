//! Nombres legibles de etiquetas TIFF/EXIF, GPS e Interop.

/// Directorio del que procede una entrada EXIF.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IfdKind {
    /// IFD0 (imagen principal).
    Primary,
    /// IFD1 (miniatura).
    Thumbnail,
    /// Página N (desde 2) de un TIFF nativo de varias páginas.
    Page(usize),
    Exif,
    Gps,
    Interop,
}

pub const TAG_EXIF_POINTER: u16 = 0x8769;
pub const TAG_GPS_POINTER: u16 = 0x8825;
pub const TAG_INTEROP_POINTER: u16 = 0xA005;
pub const TAG_SUB_IFDS: u16 = 0x014A;

/// IFD0 y sub-IFD EXIF comparten espacio de etiquetas.
const TIFF_TAGS: &[(u16, &str)] = &[
    (0x000B, "ProcessingSoftware"),
    (0x00FE, "NewSubfileType"),
    (0x00FF, "SubfileType"),
    (0x0100, "ImageWidth"),
    (0x0101, "ImageLength"),
    (0x0102, "BitsPerSample"),
    (0x0103, "Compression"),
    (0x0106, "PhotometricInterpretation"),
    (0x0107, "Thresholding"),
    (0x0108, "CellWidth"),
    (0x0109, "CellLength"),
    (0x010A, "FillOrder"),
    (0x010D, "DocumentName"),
    (0x010E, "ImageDescription"),
    (0x010F, "Make"),
    (0x0110, "Model"),
    (0x0111, "StripOffsets"),
    (0x0112, "Orientation"),
    (0x0115, "SamplesPerPixel"),
    (0x0116, "RowsPerStrip"),
    (0x0117, "StripByteCounts"),
    (0x0118, "MinSampleValue"),
    (0x0119, "MaxSampleValue"),
    (0x011A, "XResolution"),
    (0x011B, "YResolution"),
    (0x011C, "PlanarConfiguration"),
    (0x0120, "FreeOffsets"),
    (0x0121, "FreeByteCounts"),
    (0x0122, "GrayResponseUnit"),
    (0x0123, "GrayResponseCurve"),
    (0x0124, "T4Options"),
    (0x0125, "T6Options"),
    (0x0128, "ResolutionUnit"),
    (0x0129, "PageNumber"),
    (0x012D, "TransferFunction"),
    (0x0131, "Software"),
    (0x0132, "DateTime"),
    (0x013B, "Artist"),
    (0x013C, "HostComputer"),
    (0x013D, "Predictor"),
    (0x013E, "WhitePoint"),
    (0x013F, "PrimaryChromaticities"),
    (0x0140, "ColorMap"),
    (0x0141, "HalftoneHints"),
    (0x0142, "TileWidth"),
    (0x0143, "TileLength"),
    (0x0144, "TileOffsets"),
    (0x0145, "TileByteCounts"),
    (0x014A, "SubIFDs"),
    (0x014C, "InkSet"),
    (0x014D, "InkNames"),
    (0x014E, "NumberOfInks"),
    (0x0150, "DotRange"),
    (0x0152, "ExtraSamples"),
    (0x0153, "SampleFormat"),
    (0x0154, "SMinSampleValue"),
    (0x0155, "SMaxSampleValue"),
    (0x0156, "TransferRange"),
    (0x015B, "JPEGTables"),
    (0x0201, "JPEGInterchangeFormat"),
    (0x0202, "JPEGInterchangeFormatLength"),
    (0x0211, "YCbCrCoefficients"),
    (0x0212, "YCbCrSubSampling"),
    (0x0213, "YCbCrPositioning"),
    (0x0214, "ReferenceBlackWhite"),
    (0x02BC, "XMLPacket"),
    (0x4746, "Rating"),
    (0x4749, "RatingPercent"),
    (0x828D, "CFARepeatPatternDim"),
    (0x828E, "CFAPattern2"),
    (0x8298, "Copyright"),
    (0x829A, "ExposureTime"),
    (0x829D, "FNumber"),
    (0x83BB, "IPTCNAA"),
    (0x8649, "PhotoshopSettings"),
    (0x8769, "ExifOffset"),
    (0x8773, "ICCProfile"),
    (0x8822, "ExposureProgram"),
    (0x8824, "SpectralSensitivity"),
    (0x8825, "GPSInfo"),
    (0x8827, "ISOSpeedRatings"),
    (0x8830, "SensitivityType"),
    (0x9000, "ExifVersion"),
    (0x9003, "DateTimeOriginal"),
    (0x9004, "DateTimeDigitized"),
    (0x9010, "OffsetTime"),
    (0x9011, "OffsetTimeOriginal"),
    (0x9012, "OffsetTimeDigitized"),
    (0x9101, "ComponentsConfiguration"),
    (0x9102, "CompressedBitsPerPixel"),
    (0x9201, "ShutterSpeedValue"),
    (0x9202, "ApertureValue"),
    (0x9203, "BrightnessValue"),
    (0x9204, "ExposureBiasValue"),
    (0x9205, "MaxApertureValue"),
    (0x9206, "SubjectDistance"),
    (0x9207, "MeteringMode"),
    (0x9208, "LightSource"),
    (0x9209, "Flash"),
    (0x920A, "FocalLength"),
    (0x9214, "SubjectArea"),
    (0x927C, "MakerNote"),
    (0x9286, "UserComment"),
    (0x9290, "SubSecTime"),
    (0x9291, "SubSecTimeOriginal"),
    (0x9292, "SubSecTimeDigitized"),
    (0x9C9B, "XPTitle"),
    (0x9C9C, "XPComment"),
    (0x9C9D, "XPAuthor"),
    (0x9C9E, "XPKeywords"),
    (0x9C9F, "XPSubject"),
    (0xA000, "FlashpixVersion"),
    (0xA001, "ColorSpace"),
    (0xA002, "PixelXDimension"),
    (0xA003, "PixelYDimension"),
    (0xA004, "RelatedSoundFile"),
    (0xA005, "InteropOffset"),
    (0xA20E, "FocalPlaneXResolution"),
    (0xA20F, "FocalPlaneYResolution"),
    (0xA210, "FocalPlaneResolutionUnit"),
    (0xA215, "ExposureIndex"),
    (0xA217, "SensingMethod"),
    (0xA300, "FileSource"),
    (0xA301, "SceneType"),
    (0xA302, "CFAPattern"),
    (0xA401, "CustomRendered"),
    (0xA402, "ExposureMode"),
    (0xA403, "WhiteBalance"),
    (0xA404, "DigitalZoomRatio"),
    (0xA405, "FocalLengthIn35mmFilm"),
    (0xA406, "SceneCaptureType"),
    (0xA407, "GainControl"),
    (0xA408, "Contrast"),
    (0xA409, "Saturation"),
    (0xA40A, "Sharpness"),
    (0xA40C, "SubjectDistanceRange"),
    (0xA420, "ImageUniqueID"),
    (0xA430, "CameraOwnerName"),
    (0xA431, "BodySerialNumber"),
    (0xA432, "LensSpecification"),
    (0xA433, "LensMake"),
    (0xA434, "LensModel"),
    (0xA435, "LensSerialNumber"),
    (0xC4A5, "PrintIM"),
    (0xC612, "DNGVersion"),
    (0xC614, "UniqueCameraModel"),
    (0xC62F, "CameraSerialNumber"),
];

const GPS_TAGS: &[(u16, &str)] = &[
    (0x0000, "GPSVersionID"),
    (0x0001, "GPSLatitudeRef"),
    (0x0002, "GPSLatitude"),
    (0x0003, "GPSLongitudeRef"),
    (0x0004, "GPSLongitude"),
    (0x0005, "GPSAltitudeRef"),
    (0x0006, "GPSAltitude"),
    (0x0007, "GPSTimeStamp"),
    (0x0008, "GPSSatellites"),
    (0x0009, "GPSStatus"),
    (0x000A, "GPSMeasureMode"),
    (0x000B, "GPSDOP"),
    (0x000C, "GPSSpeedRef"),
    (0x000D, "GPSSpeed"),
    (0x000E, "GPSTrackRef"),
    (0x000F, "GPSTrack"),
    (0x0010, "GPSImgDirectionRef"),
    (0x0011, "GPSImgDirection"),
    (0x0012, "GPSMapDatum"),
    (0x0013, "GPSDestLatitudeRef"),
    (0x0014, "GPSDestLatitude"),
    (0x0015, "GPSDestLongitudeRef"),
    (0x0016, "GPSDestLongitude"),
    (0x0017, "GPSDestBearingRef"),
    (0x0018, "GPSDestBearing"),
    (0x0019, "GPSDestDistanceRef"),
    (0x001A, "GPSDestDistance"),
    (0x001B, "GPSProcessingMethod"),
    (0x001C, "GPSAreaInformation"),
    (0x001D, "GPSDateStamp"),
    (0x001E, "GPSDifferential"),
    (0x001F, "GPSHPositioningError"),
];

const INTEROP_TAGS: &[(u16, &str)] = &[
    (0x0001, "InteropIndex"),
    (0x0002, "InteropVersion"),
    (0x1000, "RelatedImageFileFormat"),
    (0x1001, "RelatedImageWidth"),
    (0x1002, "RelatedImageLength"),
];

/// Etiquetas que describen o hacen falta para decodificar los píxeles de un TIFF.
///
/// Se conservan al reescribir un TIFF y no se informan como metadata.
pub const STRUCTURAL_TAGS: &[u16] = &[
    0x00FE, 0x00FF, 0x0100, 0x0101, 0x0102, 0x0103, 0x0106, 0x0107, 0x0108, 0x0109, 0x010A,
    0x0111, 0x0115, 0x0116, 0x0117, 0x0118, 0x0119, 0x011A, 0x011B, 0x011C, 0x0122, 0x0123,
    0x0124, 0x0125, 0x0128, 0x0129, 0x012D, 0x013D, 0x013E, 0x013F, 0x0140, 0x0141, 0x0142,
    0x0143, 0x0144, 0x0145, 0x014C, 0x014D, 0x014E, 0x0150, 0x0152, 0x0153, 0x0154, 0x0155,
    0x0156, 0x015B, 0x0211, 0x0212, 0x0213, 0x0214, 0x828D, 0x828E, 0x8773,
];

/// Etiquetas TIFF que transportan otra carga (XMP, IPTC, IRB de Photoshop).
pub const EMBEDDED_PAYLOAD_TAGS: &[u16] = &[0x02BC, 0x83BB, 0x8649];

fn table(kind: IfdKind) -> &'static [(u16, &'static str)] {
    match kind {
        IfdKind::Gps => GPS_TAGS,
        IfdKind::Interop => INTEROP_TAGS,
        IfdKind::Primary | IfdKind::Thumbnail | IfdKind::Page(_) | IfdKind::Exif => TIFF_TAGS,
    }
}

pub fn tag_name(kind: IfdKind, tag: u16) -> Option<&'static str> {
    table(kind)
        .iter()
        .find(|(id, _)| *id == tag)
        .map(|(_, name)| *name)
}

/// Nombre para informes; las etiquetas desconocidas conservan su id.
pub fn display_name(kind: IfdKind, tag: u16) -> String {
    tag_name(kind, tag)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Unknown_0x{tag:04X}"))
}

/// Busca una etiqueta de IFD0/EXIF por nombre, sin distinguir mayúsculas.
pub fn tiff_tag_by_name(name: &str) -> Option<u16> {
    TIFF_TAGS
        .iter()
        .find(|(_, candidate)| candidate.eq_ignore_ascii_case(name))
        .map(|(id, _)| *id)
}

pub fn is_structural(tag: u16) -> bool {
    STRUCTURAL_TAGS.contains(&tag)
}

/// Etiqueta de IFD0/EXIF con nombre conocido.
pub fn is_known_tiff_tag(tag: u16) -> bool {
    tag_name(IfdKind::Primary, tag).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_depend_on_directory() {
        assert_eq!(tag_name(IfdKind::Gps, 0x0002), Some("GPSLatitude"));
        assert_eq!(tag_name(IfdKind::Interop, 0x0002), Some("InteropVersion"));
        assert_eq!(tag_name(IfdKind::Exif, 0xA431), Some("BodySerialNumber"));
        assert_eq!(display_name(IfdKind::Primary, 0xBEEF), "Unknown_0xBEEF");
    }

    #[test]
    fn lookup_by_name_ignores_case() {
        assert_eq!(tiff_tag_by_name("orientation"), Some(0x0112));
        assert_eq!(tiff_tag_by_name("GPSLatitude"), None);
    }

    #[test]
    fn decoding_tags_are_structural() {
        for tag in [0x010A, 0x0124, 0x0125, 0x0154, 0x0155, 0x015B] {
            assert!(is_structural(tag), "{tag:#06x}");
            assert!(is_known_tiff_tag(tag), "{tag:#06x}");
        }
        assert!(!is_structural(0x013B));
        assert!(!is_known_tiff_tag(0xC0DE));
    }
}
