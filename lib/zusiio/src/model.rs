#![allow(dead_code)]

use serde::Serialize;

use crate::topo::Direction;

//
// track network document model (the parts the switch tools need)
//

pub type ElementNr = usize;

/// `Fkt` bit marking an element as part of a switch.
pub const FKT_SWITCH: u32 = 1 << 2;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vec3 { x, y, z }
    }
}

#[derive(Debug, Clone)]
pub struct Zusi {
    pub info: Option<Info>,
    pub strecke: Option<Strecke>,
}

#[derive(Debug, Clone, Default)]
pub struct Info {
    pub file_type: Option<String>,
    pub description: String,
}

/// All track elements of a network, indexed by element number.
/// Numbers not used in the document are `None`.
#[derive(Debug, Clone, Default)]
pub struct Strecke {
    pub elements: Vec<Option<TrackElement>>,
}

impl Strecke {
    pub fn get(&self, nr: ElementNr) -> Option<&TrackElement> {
        self.elements.get(nr).and_then(|e| e.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackElement> {
        self.elements.iter().filter_map(|e| e.as_ref())
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrackElement {
    pub nr: ElementNr,
    pub g: Vec3,
    pub b: Vec3,
    /// Curvature in Norm direction.
    pub kr: f64,
    pub fkt: u32,
    pub anschluss: u32,
    pub next_norm: Vec<Successor>,
    pub next_gegen: Vec<Successor>,
    pub info_norm: Option<DirectionInfo>,
    pub info_gegen: Option<DirectionInfo>,
}

impl TrackElement {
    pub fn is_switch_class(&self) -> bool {
        self.fkt & FKT_SWITCH != 0
    }

    pub fn successors(&self, dir: Direction) -> &[Successor] {
        match dir {
            Direction::Norm => &self.next_norm,
            Direction::Gegen => &self.next_gegen,
        }
    }

    pub fn direction_info(&self, dir: Direction) -> Option<&DirectionInfo> {
        match dir {
            Direction::Norm => self.info_norm.as_ref(),
            Direction::Gegen => self.info_gegen.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Successor {
    /// May be negative or dangling in damaged files.
    pub nr: i64,
}

#[derive(Debug, Clone, Default)]
pub struct DirectionInfo {
    pub signal: Option<Signal>,
}

#[derive(Debug, Clone, Default)]
pub struct Signal {
    pub name: Option<String>,
    pub frames: Vec<SignalFrame>,
    pub matrix: Vec<MatrixEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct SignalFrame {
    pub file_name: String,
    pub offset: Vec3,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MatrixEntry {
    pub aspect: u64,
}
