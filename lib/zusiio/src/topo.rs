use crate::model::*;
use log::*;
use serde::Serialize;
use std::collections::HashSet;
use std::convert::TryFrom;

//
// Walking switches:
//
//   vertex --+-- branch 0 (successor slot 0) ...
//            |
//            +-- branch 1 (successor slot 1) ...
//

#[derive(Copy,Clone,PartialEq,Eq,Hash)]
#[derive(Debug, Serialize)]
pub enum Direction { Norm, Gegen }

impl Direction {
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Norm => Direction::Gegen,
            Direction::Gegen => Direction::Norm,
        }
    }

    /// Factor turning a Norm-direction value into one in this direction (and back).
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Norm => 1.0,
            Direction::Gegen => -1.0,
        }
    }

    /// `Anschluss` bit of successor `slot`; low byte for Norm, next byte for Gegen.
    pub fn anschluss_mask(&self, slot :usize) -> u32 {
        let base :u32 = match self {
            Direction::Norm => 0x1,
            Direction::Gegen => 0x100,
        };
        base << slot
    }
}

/// A track element together with the direction it is travelled in.
#[derive(Copy,Clone,Debug)]
pub struct DirectedElement<'a> {
    pub element :&'a TrackElement,
    pub dir :Direction,
}

impl<'a> DirectedElement<'a> {
    pub fn new(element :&'a TrackElement, dir :Direction) -> Self {
        DirectedElement { element, dir }
    }

    pub fn nr(&self) -> ElementNr {
        self.element.nr
    }

    pub fn curvature(&self) -> f64 {
        self.dir.sign() * self.element.kr
    }

    /// Converts a curvature in travel direction into the stored (Norm) convention.
    pub fn stored_curvature(&self, kr_in_direction :f64) -> f64 {
        self.dir.sign() * kr_in_direction
    }

    pub fn start(&self) -> &'a Vec3 {
        match self.dir {
            Direction::Norm => &self.element.g,
            Direction::Gegen => &self.element.b,
        }
    }

    pub fn end(&self) -> &'a Vec3 {
        match self.dir {
            Direction::Norm => &self.element.b,
            Direction::Gegen => &self.element.g,
        }
    }

    pub fn successor_count(&self) -> usize {
        self.element.successors(self.dir).len()
    }
}

/// Follows successor `slot` of `el`. Missing slots and dangling numbers give `None`.
pub fn successor<'a>(strecke :&'a Strecke, el :DirectedElement<'a>, slot :usize) -> Option<DirectedElement<'a>> {
    let next = el.element.successors(el.dir).get(slot)?;
    let nr = ElementNr::try_from(next.nr).ok()?;
    let target = strecke.get(nr)?;
    // a set bit means the successor is attached the other way round
    let dir = if el.element.anschluss & el.dir.anschluss_mask(slot) == 0 {
        el.dir
    } else {
        el.dir.opposite()
    };
    Some(DirectedElement::new(target, dir))
}

/// Lazy walk along slot 0 while elements stay switch-class and unbranched.
pub struct BranchWalk<'a> {
    strecke :&'a Strecke,
    next :Option<DirectedElement<'a>>,
    visited :HashSet<ElementNr>,
}

impl<'a> Iterator for BranchWalk<'a> {
    type Item = DirectedElement<'a>;

    fn next(&mut self) -> Option<DirectedElement<'a>> {
        let cur = self.next.take()?;
        if !cur.element.is_switch_class() || cur.successor_count() > 1 {
            return None;
        }
        if !self.visited.insert(cur.nr()) {
            warn!("Branch walk ran into a loop at element {}", cur.nr());
            return None;
        }
        self.next = successor(self.strecke, cur, 0);
        Some(cur)
    }
}

pub fn walk_branch<'a>(strecke :&'a Strecke, start :Option<DirectedElement<'a>>) -> BranchWalk<'a> {
    BranchWalk { strecke, next: start, visited: HashSet::new() }
}

pub type Branch<'a> = Vec<DirectedElement<'a>>;

#[derive(Debug)]
pub struct Switch<'a> {
    pub signal :&'a Signal,
    /// File name of the signal's first frame, names the switch model.
    pub file_name :&'a str,
    pub vertex :DirectedElement<'a>,
    /// Successor slot 0 as found; the straight branch once classified.
    pub straight :Branch<'a>,
    /// Successor slot 1 as found; the diverging branch once classified.
    pub diverging :Branch<'a>,
}

impl<'a> Switch<'a> {
    pub fn swap_branches(&mut self) {
        std::mem::swap(&mut self.straight, &mut self.diverging);
    }
}

#[derive(Debug)]
pub enum SwitchAnomaly {
    MissingDirectionInfo(ElementNr, Direction),
    MissingSignal(ElementNr, Direction),
    NoSignalFrames(ElementNr, Direction),
}

impl SwitchAnomaly {
    pub fn element(&self) -> ElementNr {
        match self {
            SwitchAnomaly::MissingDirectionInfo(nr, _) |
            SwitchAnomaly::MissingSignal(nr, _) |
            SwitchAnomaly::NoSignalFrames(nr, _) => *nr,
        }
    }
}

/// Which switches a scan keeps, by the first frame's file name.
#[derive(Debug, Clone, Default)]
pub struct SwitchFilter {
    pub required_marker :Option<String>,
    pub exclude :Vec<String>,
}

impl SwitchFilter {
    pub fn accepts(&self, file_name :&str) -> bool {
        if let Some(marker) = &self.required_marker {
            if !file_name.contains(marker.as_str()) { return false; }
        }
        !self.exclude.iter().any(|x| file_name.contains(x.as_str()))
    }
}

#[derive(Debug, Default)]
pub struct SwitchScan<'a> {
    pub switches :Vec<Switch<'a>>,
    pub anomalies :Vec<SwitchAnomaly>,
}

/// The direction in which `el` splits into two, if any. Norm wins when both do.
pub fn branching_direction(el :&TrackElement) -> Option<Direction> {
    if !el.is_switch_class() { return None; }
    if el.next_norm.len() == 2 {
        Some(Direction::Norm)
    } else if el.next_gegen.len() == 2 {
        Some(Direction::Gegen)
    } else {
        None
    }
}

pub fn find_switches<'a>(strecke :&'a Strecke, filter :&SwitchFilter) -> SwitchScan<'a> {
    let mut scan = SwitchScan::default();

    for el in strecke.iter() {
        let dir = match branching_direction(el) {
            Some(d) => d,
            None => continue,
        };

        let signal = match el.direction_info(dir) {
            None => {
                scan.anomalies.push(SwitchAnomaly::MissingDirectionInfo(el.nr, dir));
                continue;
            },
            Some(info) => match &info.signal {
                None => {
                    scan.anomalies.push(SwitchAnomaly::MissingSignal(el.nr, dir));
                    continue;
                },
                Some(s) => s,
            },
        };

        let file_name = match signal.frames.first() {
            Some(f) => f.file_name.as_str(),
            None => {
                scan.anomalies.push(SwitchAnomaly::NoSignalFrames(el.nr, dir));
                continue;
            },
        };

        if !filter.accepts(file_name) {
            debug!("Skipping switch at element {} ({})", el.nr, file_name);
            continue;
        }

        let vertex = DirectedElement::new(el, dir);
        scan.switches.push(Switch {
            signal,
            file_name,
            vertex,
            straight: walk_branch(strecke, successor(strecke, vertex, 0)).collect(),
            diverging: walk_branch(strecke, successor(strecke, vertex, 1)).collect(),
        });
    }

    scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_zusi;

    fn element(nr :ElementNr, kr :f64, fkt :u32) -> TrackElement {
        TrackElement {
            nr,
            g: Vec3::new(nr as f64 * 10.0, 0.0, 0.0),
            b: Vec3::new(nr as f64 * 10.0 + 10.0, 0.0, 0.0),
            kr,
            fkt,
            ..TrackElement::default()
        }
    }

    fn strecke(elements :Vec<TrackElement>) -> Strecke {
        let mut s = Strecke::default();
        for e in elements {
            if e.nr >= s.elements.len() { s.elements.resize_with(e.nr + 1, || None); }
            let nr = e.nr;
            s.elements[nr] = Some(e);
        }
        s
    }

    const SWITCH_NETWORK :&str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Zusi>
<Info DateiTyp="Strecke" Beschreibung="test"/>
<Strecke>
<StrElement Nr="1" Fkt="4">
<InfoNormRichtung>
<Signal Signalname="W1">
<SignalFrame><Datei Dateiname="Weichen\EW_gebogen.ls3"/><p X="1"/></SignalFrame>
<MatrixEintrag Signalbild="1"/>
<MatrixEintrag Signalbild="2"/>
</Signal>
</InfoNormRichtung>
<g X="-10"/><b/>
<NachNorm Nr="2"/><NachNorm Nr="4"/>
</StrElement>
<StrElement Nr="2" Fkt="4"><g/><b X="10"/><NachNorm Nr="3"/></StrElement>
<StrElement Nr="3" Fkt="4" Anschluss="1"><g X="10"/><b X="20"/><NachNorm Nr="7"/></StrElement>
<StrElement Nr="7" Fkt="4"><g X="30"/><b X="20"/><NachGegen Nr="9"/></StrElement>
<StrElement Nr="9" Fkt="0"><g X="30"/><b X="40"/></StrElement>
<StrElement Nr="4" kr="0.01" Fkt="4"><g/><b X="9.99" Y="0.5"/></StrElement>
</Strecke>
</Zusi>"#;

    #[test]
    fn curvature_sign_follows_direction() {
        let el = element(0, 0.0125, FKT_SWITCH);
        let norm = DirectedElement::new(&el, Direction::Norm);
        let gegen = DirectedElement::new(&el, Direction::Gegen);
        assert_eq!(norm.curvature(), -gegen.curvature());
        assert_eq!(norm.curvature(), 0.0125);
        assert_eq!(gegen.stored_curvature(gegen.curvature()), el.kr);
        assert_eq!(gegen.start(), &el.b);
        assert_eq!(gegen.end(), &el.g);
    }

    #[test]
    fn successor_direction_from_anschluss() {
        let mut a = element(0, 0.0, FKT_SWITCH);
        a.next_norm = vec![Successor { nr: 1 }, Successor { nr: 2 }];
        a.next_gegen = vec![Successor { nr: 1 }];
        a.anschluss = 0x2 | 0x100;
        let s = strecke(vec![a, element(1, 0.0, 0), element(2, 0.0, 0)]);
        let a = DirectedElement::new(s.get(0).unwrap(), Direction::Norm);

        let first = successor(&s, a, 0).unwrap();
        assert_eq!((first.nr(), first.dir), (1, Direction::Norm));
        let second = successor(&s, a, 1).unwrap();
        assert_eq!((second.nr(), second.dir), (2, Direction::Gegen));

        let back = successor(&s, DirectedElement::new(a.element, Direction::Gegen), 0).unwrap();
        assert_eq!((back.nr(), back.dir), (1, Direction::Norm));
    }

    #[test]
    fn successor_rejects_dangling_numbers() {
        let mut a = element(0, 0.0, FKT_SWITCH);
        a.next_norm = vec![Successor { nr: -1 }, Successor { nr: 5 }, Successor { nr: 1 }];
        let s = strecke(vec![a, element(2, 0.0, 0)]);
        let a = DirectedElement::new(s.get(0).unwrap(), Direction::Norm);
        assert!(successor(&s, a, 0).is_none());
        assert!(successor(&s, a, 1).is_none());
        // number 1 is inside the range but unused
        assert!(successor(&s, a, 2).is_none());
        assert!(successor(&s, a, 3).is_none());
    }

    #[test]
    fn walk_stops_at_second_branch_point() {
        let mut e0 = element(0, 0.0, FKT_SWITCH);
        e0.next_norm = vec![Successor { nr: 1 }];
        let mut e1 = element(1, 0.0, FKT_SWITCH);
        e1.next_norm = vec![Successor { nr: 2 }, Successor { nr: 3 }];
        let s = strecke(vec![e0, e1, element(2, 0.0, FKT_SWITCH), element(3, 0.0, FKT_SWITCH)]);
        let start = DirectedElement::new(s.get(0).unwrap(), Direction::Norm);
        let walked :Vec<_> = walk_branch(&s, Some(start)).map(|e| e.nr()).collect();
        assert_eq!(walked, vec![0]);
    }

    #[test]
    fn walk_terminates_on_loops() {
        let mut e0 = element(0, 0.0, FKT_SWITCH);
        e0.next_norm = vec![Successor { nr: 1 }];
        let mut e1 = element(1, 0.0, FKT_SWITCH);
        e1.next_norm = vec![Successor { nr: 0 }];
        let s = strecke(vec![e0, e1]);
        let start = DirectedElement::new(s.get(0).unwrap(), Direction::Norm);
        assert_eq!(walk_branch(&s, Some(start)).count(), 2);
    }

    #[test]
    fn finds_switch_and_walks_both_branches() {
        let zusi = parse_zusi(SWITCH_NETWORK).expect("parse failed");
        let s = zusi.strecke.as_ref().unwrap();
        let scan = find_switches(s, &SwitchFilter::default());
        assert!(scan.anomalies.is_empty());
        assert_eq!(scan.switches.len(), 1);

        let sw = &scan.switches[0];
        assert_eq!(sw.vertex.nr(), 1);
        assert_eq!(sw.vertex.dir, Direction::Norm);
        assert_eq!(sw.file_name, "Weichen\\EW_gebogen.ls3");
        assert_eq!(sw.signal.matrix.len(), 2);

        let straight :Vec<_> = sw.straight.iter().map(|e| (e.nr(), e.dir)).collect();
        // element 3 hands over to 7 reversed; 9 is no longer part of the switch
        assert_eq!(straight, vec![(2, Direction::Norm), (3, Direction::Norm), (7, Direction::Gegen)]);
        let diverging :Vec<_> = sw.diverging.iter().map(|e| e.nr()).collect();
        assert_eq!(diverging, vec![4]);
    }

    #[test]
    fn filter_by_marker_and_exclusions() {
        let zusi = parse_zusi(SWITCH_NETWORK).unwrap();
        let s = zusi.strecke.as_ref().unwrap();

        let only_bent = SwitchFilter { required_marker: Some("gebogen".into()), exclude: vec![] };
        assert_eq!(find_switches(s, &only_bent).switches.len(), 1);

        let other = SwitchFilter { required_marker: Some("DKW".into()), exclude: vec![] };
        assert!(find_switches(s, &other).switches.is_empty());

        let excluded = SwitchFilter { required_marker: None, exclude: vec!["EW_".into()] };
        let scan = find_switches(s, &excluded);
        assert!(scan.switches.is_empty());
        assert!(scan.anomalies.is_empty());
    }

    #[test]
    fn anomalies_are_reported_not_fatal() {
        let mut no_info = element(0, 0.0, FKT_SWITCH);
        no_info.next_gegen = vec![Successor { nr: 2 }, Successor { nr: 3 }];
        let mut no_frames = element(1, 0.0, FKT_SWITCH);
        no_frames.next_norm = vec![Successor { nr: 2 }, Successor { nr: 3 }];
        no_frames.info_norm = Some(DirectionInfo { signal: Some(Signal::default()) });
        let mut no_signal = element(4, 0.0, FKT_SWITCH);
        no_signal.next_norm = vec![Successor { nr: 2 }, Successor { nr: 3 }];
        no_signal.info_norm = Some(DirectionInfo { signal: None });
        let mut not_a_switch = element(5, 0.0, 0);
        not_a_switch.next_norm = vec![Successor { nr: 2 }, Successor { nr: 3 }];

        let s = strecke(vec![no_info, no_frames, element(2, 0.0, FKT_SWITCH),
                             element(3, 0.0, FKT_SWITCH), no_signal, not_a_switch]);
        let scan = find_switches(&s, &SwitchFilter::default());
        assert!(scan.switches.is_empty());
        let found :Vec<_> = scan.anomalies.iter().map(|a| a.element()).collect();
        assert_eq!(found, vec![0, 1, 4]);
        assert!(matches!(scan.anomalies[0], SwitchAnomaly::MissingDirectionInfo(0, Direction::Gegen)));
        assert!(matches!(scan.anomalies[1], SwitchAnomaly::NoSignalFrames(1, Direction::Norm)));
        assert!(matches!(scan.anomalies[2], SwitchAnomaly::MissingSignal(4, Direction::Norm)));
    }

    #[test]
    fn norm_takes_priority_when_both_directions_branch() {
        let mut e = element(0, 0.0, FKT_SWITCH);
        e.next_norm = vec![Successor { nr: 1 }, Successor { nr: 2 }];
        e.next_gegen = vec![Successor { nr: 1 }, Successor { nr: 2 }];
        assert_eq!(branching_direction(&e), Some(Direction::Norm));
        e.next_norm.pop();
        assert_eq!(branching_direction(&e), Some(Direction::Gegen));
        e.fkt = 0;
        assert_eq!(branching_direction(&e), None);
    }
}
