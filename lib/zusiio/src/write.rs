use crate::model::ElementNr;
use log::*;
use roxmltree as xml;
use std::collections::BTreeMap;
use std::ops::Range;

#[derive(Debug)]
pub enum PatchErr {
    Xml(String),
    UnterminatedTag(usize),
}

fn fmt_f64(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}

/// Byte range of the start tag beginning at `start`, including `<` and `>`.
fn start_tag(data: &str, start: usize) -> Result<Range<usize>, PatchErr> {
    let mut quote: Option<u8> = None;
    for (i, &c) in data.as_bytes()[start..].iter().enumerate() {
        match (quote, c) {
            (None, b'"') | (None, b'\'') => quote = Some(c),
            (Some(q), c) if q == c => quote = None,
            (None, b'>') => return Ok(start..start + i + 1),
            _ => {}
        }
    }
    Err(PatchErr::UnterminatedTag(start))
}

/// Range of the value of attribute `name` inside a start tag (without quotes).
fn attribute_value(tag: &str, name: &str) -> Option<Range<usize>> {
    let bytes = tag.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None if c == b'"' || c == b'\'' => quote = Some(c),
            None if c.is_ascii_whitespace() && tag[i + 1..].starts_with(name) => {
                let rest = &tag[i + 1 + name.len()..];
                let trimmed = rest.trim_start();
                if trimmed.starts_with('=') {
                    let after_eq = trimmed[1..].trim_start();
                    let value_start = tag.len() - after_eq.len();
                    let q = *after_eq.as_bytes().first()?;
                    if q != b'"' && q != b'\'' {
                        return None;
                    }
                    let len = after_eq[1..].find(q as char)?;
                    return Some(value_start + 1..value_start + 1 + len);
                }
            }
            None => {}
        }
        i += 1;
    }
    None
}

/// Sets the `kr` attribute of every `StrElement` whose number is a key of
/// `corrections`. Everything else in `data` is left untouched.
pub fn patch_curvatures(
    data: &str,
    corrections: &BTreeMap<ElementNr, f64>,
) -> Result<String, PatchErr> {
    let doc = xml::Document::parse(data).map_err(|e| PatchErr::Xml(e.to_string()))?;

    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    let mut found = 0;
    for node in doc.descendants().filter(|n| n.has_tag_name("StrElement")) {
        let nr = match node.attribute("Nr").and_then(|n| n.parse::<ElementNr>().ok()) {
            Some(nr) => nr,
            None => continue,
        };
        let kr = match corrections.get(&nr) {
            Some(kr) => *kr,
            None => continue,
        };
        found += 1;

        let tag = start_tag(data, node.range().start)?;
        let tag_text = &data[tag.clone()];
        match attribute_value(tag_text, "kr") {
            Some(value) => {
                edits.push((tag.start + value.start..tag.start + value.end, fmt_f64(kr)));
            }
            None => {
                let at = tag.start + "<StrElement".len();
                edits.push((at..at, format!(" kr=\"{}\"", fmt_f64(kr))));
            }
        }
        debug!("Element {}: kr -> {}", nr, fmt_f64(kr));
    }

    if found < corrections.len() {
        warn!(
            "{} corrected element(s) not present in the document",
            corrections.len() - found
        );
    }

    edits.sort_by_key(|(r, _)| r.start);
    let mut out = String::with_capacity(data.len() + 16 * edits.len());
    let mut pos = 0;
    for (range, text) in edits {
        out.push_str(&data[pos..range.start]);
        out.push_str(&text);
        pos = range.end;
    }
    out.push_str(&data[pos..]);
    Ok(out)
}
