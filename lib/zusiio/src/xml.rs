use crate::model::*;
use roxmltree as xml;
use std::str::FromStr;

pub type BoxResult<T> = Result<T, Box<dyn std::error::Error>>;

pub fn parse_zusi(data: &str) -> BoxResult<Zusi> {
    let doc = roxmltree::Document::parse(data)?;
    parse_zusi_xml(&doc.root_element()).map_err(|e| format!("{:?}", e).into())
}

pub type ByteOffset = usize;
#[derive(Debug)]
pub enum DocErr {
    ElementMissing(&'static str, ByteOffset),
    AttributeMissing(&'static str, ByteOffset),
    UnexpectedElement(String, ByteOffset),
    NumberError(&'static str, ByteOffset),
    DuplicateElement(ElementNr, ByteOffset),
}

fn parse_zusi_xml(root: &xml::Node) -> Result<Zusi, DocErr> {
    if !root.has_tag_name("Zusi") {
        return Err(DocErr::UnexpectedElement(
            root.tag_name().name().to_string(),
            root.range().start,
        ));
    }

    Ok(Zusi {
        info: root
            .children()
            .find(|c| c.has_tag_name("Info"))
            .map(|i| parse_info(&i)),
        strecke: match root.children().find(|c| c.has_tag_name("Strecke")) {
            Some(s) => Some(parse_strecke(&s)?),
            None => None,
        },
    })
}

fn parse_info(node: &xml::Node) -> Info {
    Info {
        file_type: node.attribute("DateiTyp").map(|x| x.to_string()),
        description: node.attribute("Beschreibung").unwrap_or_default().to_string(),
    }
}

/// Element numbers may have gaps, but not many more than there are elements.
const NR_SPREAD: usize = 16;
const NR_SLACK: usize = 1024;

fn parse_strecke(node: &xml::Node) -> Result<Strecke, DocErr> {
    let count = node.children().filter(|c| c.has_tag_name("StrElement")).count();
    let max_nr = NR_SPREAD * count + NR_SLACK;
    let mut elements: Vec<Option<TrackElement>> = Vec::new();
    for e in node.children().filter(|c| c.has_tag_name("StrElement")) {
        let el = parse_element(&e)?;
        let nr = el.nr;
        if nr > max_nr {
            return Err(DocErr::NumberError("Nr", e.range().start));
        }
        if nr >= elements.len() {
            elements.resize_with(nr + 1, || None);
        }
        if elements[nr].is_some() {
            return Err(DocErr::DuplicateElement(nr, e.range().start));
        }
        elements[nr] = Some(el);
    }
    Ok(Strecke { elements })
}

/// Numeric attribute; the format leaves out attributes with default value.
fn number_attr<T: FromStr + Default>(node: &xml::Node, name: &'static str) -> Result<T, DocErr> {
    match node.attribute(name) {
        Some(v) => v
            .trim()
            .parse::<T>()
            .map_err(|_e| DocErr::NumberError(name, node.range().start)),
        None => Ok(T::default()),
    }
}

fn parse_element(node: &xml::Node) -> Result<TrackElement, DocErr> {
    Ok(TrackElement {
        nr: node
            .attribute("Nr")
            .ok_or(DocErr::AttributeMissing("Nr", node.range().start))?
            .parse::<ElementNr>()
            .map_err(|_e| DocErr::NumberError("Nr", node.range().start))?,
        g: parse_point(
            &node
                .children()
                .find(|c| c.has_tag_name("g"))
                .ok_or(DocErr::ElementMissing("g", node.range().start))?,
        )?,
        b: parse_point(
            &node
                .children()
                .find(|c| c.has_tag_name("b"))
                .ok_or(DocErr::ElementMissing("b", node.range().start))?,
        )?,
        kr: number_attr(node, "kr")?,
        fkt: number_attr(node, "Fkt")?,
        anschluss: number_attr(node, "Anschluss")?,
        next_norm: parse_successors(node, "NachNorm")?,
        next_gegen: parse_successors(node, "NachGegen")?,
        info_norm: match node.children().find(|c| c.has_tag_name("InfoNormRichtung")) {
            Some(i) => Some(parse_direction_info(&i)?),
            None => None,
        },
        info_gegen: match node.children().find(|c| c.has_tag_name("InfoGegenRichtung")) {
            Some(i) => Some(parse_direction_info(&i)?),
            None => None,
        },
    })
}

fn parse_point(node: &xml::Node) -> Result<Vec3, DocErr> {
    Ok(Vec3 {
        x: number_attr(node, "X")?,
        y: number_attr(node, "Y")?,
        z: number_attr(node, "Z")?,
    })
}

fn parse_successors(node: &xml::Node, tag: &'static str) -> Result<Vec<Successor>, DocErr> {
    let mut res = Vec::new();
    for n in node.children().filter(|c| c.has_tag_name(tag)) {
        res.push(Successor {
            nr: n
                .attribute("Nr")
                .ok_or(DocErr::AttributeMissing("Nr", n.range().start))?
                .parse::<i64>()
                .map_err(|_e| DocErr::NumberError("Nr", n.range().start))?,
        });
    }
    Ok(res)
}

fn parse_direction_info(node: &xml::Node) -> Result<DirectionInfo, DocErr> {
    Ok(DirectionInfo {
        signal: match node.children().find(|c| c.has_tag_name("Signal")) {
            Some(s) => Some(parse_signal(&s)?),
            None => None,
        },
    })
}

fn parse_signal(node: &xml::Node) -> Result<Signal, DocErr> {
    let mut frames = Vec::new();
    for f in node.children().filter(|c| c.has_tag_name("SignalFrame")) {
        frames.push(parse_signal_frame(&f)?);
    }
    let mut matrix = Vec::new();
    for m in node.children().filter(|c| c.has_tag_name("MatrixEintrag")) {
        matrix.push(MatrixEntry {
            aspect: number_attr(&m, "Signalbild")?,
        });
    }
    Ok(Signal {
        name: node.attribute("Signalname").map(|x| x.to_string()),
        frames,
        matrix,
    })
}

fn parse_signal_frame(node: &xml::Node) -> Result<SignalFrame, DocErr> {
    let file = node
        .children()
        .find(|c| c.has_tag_name("Datei"))
        .ok_or(DocErr::ElementMissing("Datei", node.range().start))?;
    Ok(SignalFrame {
        file_name: file.attribute("Dateiname").unwrap_or_default().to_string(),
        offset: match node.children().find(|c| c.has_tag_name("p")) {
            Some(p) => parse_point(&p)?,
            None => Vec3::default(),
        },
    })
}
