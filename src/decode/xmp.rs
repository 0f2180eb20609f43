//! Decodificador XMP.
//!
//! Extrae pares (clave con prefijo, valor) de los `rdf:Description` sin
//! resolver el grafo RDF. Las listas `rdf:Seq`/`rdf:Bag`/`rdf:Alt` se unen
//! con comas y las estructuras anidadas se aplanan como `padre/hijo`. Un XML
//! mal formado produce cero etiquetas y una nota, nunca un error fatal. Antes
//! de construir el árbol se mide el anidamiento con un lector de eventos.

use super::{DecodeOutcome, DecodedTag};
use crate::config::Limits;
use crate::error::DecodeIssue;
use crate::tag::{Namespace, TagId};
use std::collections::HashSet;
use xml::reader::{EventReader, XmlEvent};
use xmltree::{Element, XMLNode};

const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
/// Profundidad máxima de estructuras anidadas que se aplanan.
const MAX_DEPTH: usize = 16;
/// Anidamiento máximo de elementos XML que se acepta construir como árbol.
const MAX_XML_DEPTH: usize = 64;

pub fn decode(payload: &[u8], limits: &Limits) -> DecodeOutcome {
    let packet = String::from_utf8_lossy(payload);
    let packet = packet.trim_start_matches('\u{feff}');
    let Some(xml) = extract_xmp_xml(packet) else {
        return DecodeOutcome::failed(DecodeIssue::malformed(0, "no se encontró un paquete XMP"));
    };
    if !depth_within(xml, MAX_XML_DEPTH) {
        return DecodeOutcome::failed(DecodeIssue::LimitExceeded {
            resource: "niveles de anidamiento XML",
            limit: MAX_XML_DEPTH,
        });
    }
    let root = match Element::parse(xml.as_bytes()) {
        Ok(root) => root,
        Err(err) => {
            return DecodeOutcome::failed(DecodeIssue::malformed(0, format!("XML inválido: {err}")));
        }
    };

    let mut collector = Collector {
        limits,
        outcome: DecodeOutcome::default(),
        seen: HashSet::new(),
        full: false,
    };
    let mut descriptions = Vec::new();
    find_descriptions(&root, &mut descriptions);
    for description in descriptions {
        collector.description(description);
    }
    collector.outcome
}

/// Recorre los eventos sin construir el árbol. Un error de sintaxis corta el
/// recorrido y queda para el parser de árbol.
fn depth_within(xml: &str, limit: usize) -> bool {
    let mut depth = 0usize;
    for event in EventReader::new(xml.as_bytes()) {
        match event {
            Ok(XmlEvent::StartElement { .. }) => {
                depth += 1;
                if depth > limit {
                    return false;
                }
            }
            Ok(XmlEvent::EndElement { .. }) => depth = depth.saturating_sub(1),
            Ok(_) => {}
            Err(_) => break,
        }
    }
    true
}

/// Recorta el paquete al elemento `x:xmpmeta` o `rdf:RDF`.
fn extract_xmp_xml(packet: &str) -> Option<&str> {
    if let Some(xml) = slice_between(packet, "<x:xmpmeta", "</x:xmpmeta>") {
        return Some(xml);
    }
    if let Some(xml) = slice_between(packet, "<rdf:RDF", "</rdf:RDF>") {
        return Some(xml);
    }
    if packet.contains("<xmpmeta") || packet.contains("<rdf:RDF") {
        return Some(packet);
    }
    None
}

fn slice_between<'a>(value: &'a str, start_tag: &str, end_tag: &str) -> Option<&'a str> {
    let start = value.find(start_tag)?;
    let end = value[start..].find(end_tag)?;
    Some(&value[start..start + end + end_tag.len()])
}

fn is_rdf(element: &Element, local: &str) -> bool {
    element.name == local
        && (element.prefix.as_deref() == Some("rdf") || element.namespace.as_deref() == Some(RDF_NS))
}

/// `rdf:Description` de primer nivel; los anidados son estructuras.
fn find_descriptions<'a>(root: &'a Element, found: &mut Vec<&'a Element>) {
    let mut pending = vec![root];
    while let Some(element) = pending.pop() {
        if is_rdf(element, "Description") {
            found.push(element);
            continue;
        }
        let children: Vec<&Element> = child_elements(element).collect();
        pending.extend(children.into_iter().rev());
    }
}

fn child_elements(element: &Element) -> impl Iterator<Item = &Element> {
    element.children.iter().filter_map(|node| match node {
        XMLNode::Element(child) => Some(child),
        _ => None,
    })
}

fn qualified_name(element: &Element) -> String {
    match &element.prefix {
        Some(prefix) => format!("{prefix}:{}", element.name),
        None => element.name.clone(),
    }
}

/// Atributos RDF o de espacio de nombres que no son propiedades.
fn is_syntax_attribute(key: &str) -> bool {
    let local = key.rsplit(':').next().unwrap_or(key);
    key.starts_with("xmlns")
        || key.starts_with("rdf:")
        || key.starts_with("xml:")
        || matches!(local, "about" | "parseType" | "resource" | "lang" | "nodeID" | "ID")
}

fn attribute<'a>(element: &'a Element, local: &str) -> Option<&'a String> {
    element.attributes.iter().find_map(|(key, value)| {
        (key == local || key.rsplit(':').next() == Some(local)).then_some(value)
    })
}

fn text_of(element: &Element) -> String {
    let mut parts = Vec::new();
    for node in &element.children {
        match node {
            XMLNode::Text(text) | XMLNode::CData(text) => parts.push(text.trim().to_string()),
            _ => {}
        }
    }
    parts.retain(|part| !part.is_empty());
    parts.join(" ")
}

struct Collector<'a> {
    limits: &'a Limits,
    outcome: DecodeOutcome,
    seen: HashSet<(String, String)>,
    full: bool,
}

impl Collector<'_> {
    fn description(&mut self, description: &Element) {
        self.attributes(description, None);
        for property in child_elements(description) {
            self.property(property, &qualified_name(property), 0);
        }
    }

    fn attributes(&mut self, element: &Element, parent: Option<&str>) {
        let mut attributes: Vec<(&String, &String)> = element.attributes.iter().collect();
        attributes.sort();
        for (key, value) in attributes {
            if is_syntax_attribute(key) {
                continue;
            }
            let key = match parent {
                Some(parent) => format!("{parent}/{key}"),
                None => key.clone(),
            };
            self.push(key, value.trim().to_string());
        }
    }

    fn property(&mut self, element: &Element, key: &str, depth: usize) {
        if depth > MAX_DEPTH {
            self.outcome.issue(DecodeIssue::LimitExceeded {
                resource: "niveles de anidamiento XMP",
                limit: MAX_DEPTH,
            });
            return;
        }

        let children: Vec<&Element> = child_elements(element).collect();
        if let Some(container) = children
            .iter()
            .find(|child| is_rdf(child, "Seq") || is_rdf(child, "Bag") || is_rdf(child, "Alt"))
        {
            let items: Vec<&Element> = child_elements(container)
                .filter(|item| is_rdf(item, "li"))
                .collect();
            let mut values = Vec::new();
            for item in items {
                if child_elements(item).next().is_some() || is_resource(item) {
                    self.structure(item, key, depth + 1);
                } else {
                    let text = text_of(item);
                    if !text.is_empty() && !values.contains(&text) {
                        values.push(text);
                    }
                }
            }
            self.push(key.to_string(), values.join(", "));
            return;
        }

        if !children.is_empty() || is_resource(element) {
            self.structure(element, key, depth + 1);
            return;
        }

        if let Some(resource) = attribute(element, "resource") {
            self.push(key.to_string(), resource.trim().to_string());
            return;
        }
        let value = text_of(element);
        let value = match element.name.as_str() {
            "GPSLatitude" | "GPSLongitude" | "GPSDestLatitude" | "GPSDestLongitude" => {
                xmp_coordinate(&value).map_or(value, |decimal| format!("{decimal:.6}"))
            }
            _ => value,
        };
        self.push(key.to_string(), value);
    }

    /// Aplana una estructura (`rdf:parseType="Resource"` o `rdf:Description` anidado).
    fn structure(&mut self, element: &Element, key: &str, depth: usize) {
        self.attributes(element, Some(key));
        for child in child_elements(element) {
            if is_rdf(child, "Description") {
                self.structure(child, key, depth + 1);
                continue;
            }
            let child_key = format!("{key}/{}", qualified_name(child));
            self.property(child, &child_key, depth);
        }
    }

    fn push(&mut self, key: String, value: String) {
        if value.is_empty() || self.full {
            return;
        }
        if !self.seen.insert((key.clone(), value.clone())) {
            return;
        }
        if self.outcome.tags.len() >= self.limits.max_tags {
            self.full = true;
            self.outcome.issue(DecodeIssue::LimitExceeded {
                resource: "etiquetas",
                limit: self.limits.max_tags,
            });
            return;
        }
        self.outcome.tags.push(DecodedTag::new(
            Namespace::Xmp,
            TagId::Key(key.clone()),
            key,
            value,
        ));
    }
}

fn is_resource(element: &Element) -> bool {
    attribute(element, "parseType").is_some_and(|value| value == "Resource")
}

/// Coordenada XMP (`DDD,MM.mmk`, `DDD,MM,SSk` o decimal) a grados decimales.
pub(crate) fn xmp_coordinate(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let last = raw.chars().last()?;
    let hemisphere = matches!(last.to_ascii_uppercase(), 'N' | 'S' | 'E' | 'W')
        .then(|| last.to_ascii_uppercase());
    let body = if hemisphere.is_some() {
        &raw[..raw.len() - last.len_utf8()]
    } else {
        raw
    };
    let parts = body
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    let decimal = match parts.as_slice() {
        [decimal] => *decimal,
        [degrees, minutes] => degrees.abs() + minutes.abs() / 60.0,
        [degrees, minutes, seconds] => {
            degrees.abs() + minutes.abs() / 60.0 + seconds.abs() / 3600.0
        }
        _ => return None,
    };
    let decimal = match hemisphere {
        Some('S' | 'W') => -decimal.abs(),
        Some(_) => decimal.abs(),
        None => decimal,
    };
    decimal.is_finite().then_some(decimal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn value<'a>(outcome: &'a DecodeOutcome, key_suffix: &str) -> Option<&'a str> {
        outcome
            .tags
            .iter()
            .find(|tag| tag.name.ends_with(key_suffix))
            .map(|tag| tag.value.as_str())
    }

    #[test]
    fn flattens_lists_attributes_and_structures() {
        let outcome = decode(fixtures::XMP_PACKET.as_bytes(), &Limits::default());
        assert!(outcome.issues.is_empty(), "{:?}", outcome.issues);
        assert_eq!(value(&outcome, "dc:creator"), Some("Ana Fotografa"));
        assert_eq!(value(&outcome, "dc:subject"), Some("playa, verano"));
        assert_eq!(value(&outcome, "CreatorTool"), Some("Adobe Lightroom"));
        assert_eq!(
            value(&outcome, "Iptc4xmpCore:CreatorContactInfo/Iptc4xmpCore:CiEmailWork"),
            Some("ana@example.com")
        );
        assert_eq!(value(&outcome, "exif:GPSLatitude"), Some("40.446111"));
        assert_eq!(value(&outcome, "exif:GPSLongitude"), Some("-79.982222"));
        assert!(outcome.tags.iter().all(|tag| tag.namespace == Namespace::Xmp));
    }

    #[test]
    fn malformed_xml_yields_note_without_tags() {
        let outcome = decode(b"<x:xmpmeta><rdf:RDF></x:xmpmeta>", &Limits::default());
        assert!(outcome.tags.is_empty());
        assert!(matches!(
            outcome.issues[0],
            DecodeIssue::MalformedSegment { .. }
        ));

        let outcome = decode(b"not xml at all", &Limits::default());
        assert!(outcome.tags.is_empty());
        assert_eq!(outcome.issues.len(), 1);
    }

    #[test]
    fn deep_nesting_is_refused_before_building_the_tree() {
        let packet = fixtures::deeply_nested_xmp(9000);
        let outcome = decode(packet.as_bytes(), &Limits::default());
        assert!(outcome.tags.is_empty());
        assert!(matches!(
            outcome.issues.as_slice(),
            [DecodeIssue::LimitExceeded { limit: MAX_XML_DEPTH, .. }]
        ));
    }

    #[test]
    fn nesting_under_the_limit_still_decodes() {
        let packet = fixtures::deeply_nested_xmp(8);
        let outcome = decode(packet.as_bytes(), &Limits::default());
        assert!(
            outcome
                .issues
                .iter()
                .all(|issue| !matches!(issue, DecodeIssue::LimitExceeded { .. }))
        );
    }

    #[test]
    fn descriptions_are_found_in_document_order() {
        let xml = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
            <rdf:Description rdf:about="a"/><rdf:Description rdf:about="b"/>
        </rdf:RDF>"#;
        let root = Element::parse(xml.as_bytes()).unwrap();
        let mut found = Vec::new();
        find_descriptions(&root, &mut found);
        let about: Vec<_> = found
            .iter()
            .filter_map(|element| attribute(element, "about").cloned())
            .collect();
        assert_eq!(about, ["a", "b"]);
    }

    #[test]
    fn coordinates_in_xmp_notation() {
        assert_eq!(xmp_coordinate("40,26.766667N").map(|v| (v * 1e4).round()), Some(404461.0));
        assert_eq!(xmp_coordinate("79,58,56W"), Some(-(79.0 + 58.0 / 60.0 + 56.0 / 3600.0)));
        assert_eq!(xmp_coordinate("-12.5"), Some(-12.5));
        assert_eq!(xmp_coordinate("nowhere"), None);
    }
}
