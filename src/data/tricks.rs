//! IWWF trick catalogue
//!
//! Points and body orientation for every listed trick, on one or two skis.
//! Reverse variants (`R` + code) score the same as the trick they reverse and
//! exist for every trick that may be reversed.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::TrickError;

/// Marker appended to tricks performed without credit
const NO_CREDIT_SUFFIX: &str = " (NC)";

/// Trick code with any no-credit marker removed
pub fn clean_trick(trick: &str) -> &str {
    let trick = trick.trim();
    trick.strip_suffix(NO_CREDIT_SUFFIX).unwrap_or(trick)
}

/// Which way the skier faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Front,
    Back,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Front => write!(f, "front"),
            Orientation::Back => write!(f, "back"),
        }
    }
}

impl FromStr for Orientation {
    type Err = TrickError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "front" | "f" => Ok(Orientation::Front),
            "back" | "b" => Ok(Orientation::Back),
            _ => Err(TrickError::Parse(format!("Unknown orientation: {}", s))),
        }
    }
}

/// Number of skis, which decides the point table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Skis {
    One,
    Two,
}

impl FromStr for Skis {
    type Err = TrickError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "1" | "one" => Ok(Skis::One),
            "2" | "two" => Ok(Skis::Two),
            _ => Err(TrickError::Parse(format!("Unknown ski count: {}", s))),
        }
    }
}

/// One catalogue entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrickDef {
    pub code: String,
    pub points: u32,
    pub description: String,
    pub start: Orientation,
    pub end: Orientation,
    /// Any kind of 180 turn, which may sit between a turn and its reverse
    pub turn_180: bool,
    pub can_reverse: bool,
    pub reverse: bool,
}

impl TrickDef {
    pub fn changes_orientation(&self) -> bool {
        self.start != self.end
    }
}

struct Row {
    code: &'static str,
    points: u32,
    description: &'static str,
    start: Orientation,
    end: Orientation,
    turn_180: bool,
    can_reverse: bool,
}

const FR: Orientation = Orientation::Front;
const BK: Orientation = Orientation::Back;

const fn row(
    code: &'static str,
    points: u32,
    description: &'static str,
    start: Orientation,
    end: Orientation,
) -> Row {
    Row {
        code,
        points,
        description,
        start,
        end,
        turn_180: false,
        can_reverse: true,
    }
}

impl Row {
    const fn turn(self) -> Row {
        Row {
            turn_180: true,
            ..self
        }
    }

    const fn no_reverse(self) -> Row {
        Row {
            can_reverse: false,
            ..self
        }
    }
}

const TWO_SKI: &[Row] = &[
    // spins
    row("S", 20, "Side Slide", FR, FR),
    row("B", 30, "180 F-B", FR, BK).turn(),
    row("F", 30, "B-F", BK, FR).turn(),
    row("O", 40, "360 F-F", FR, FR),
    row("BB", 40, "B-B", BK, BK),
    row("5B", 50, "540 F-B", FR, BK),
    row("5F", 50, "B-F", BK, FR),
    row("7F", 60, "720 F-F", FR, FR),
    row("7B", 60, "B-B", BK, BK),
    // steps
    row("LB", 70, "180 F-B Stepover", FR, BK).turn(),
    row("LF", 70, "B-F Stepover", BK, FR).turn(),
    // wake spins
    row("WB", 50, "Wake 180 F-B", FR, BK).turn(),
    row("WF", 50, "Wake B-F", BK, FR).turn(),
    row("WO", 110, "Wake 360 F-F", FR, FR),
    row("WBB", 110, "Wake B-B", BK, BK),
    row("W5B", 310, "Wake 540 F-B", FR, BK),
    row("W5F", 310, "Wake B-F", BK, FR),
    row("W7F", 800, "Wake 720 F-F", FR, FR),
    row("W7B", 480, "Wake B-B", BK, BK),
    row("W9B", 850, "Wake 900 F-B", FR, BK),
    row("W9F", 850, "Wake B-F", BK, FR),
    // wake steps
    row("WLB", 110, "Wake 180 F-B Stepover", FR, BK).turn(),
    row("WLF", 110, "Wake B-F Stepover", BK, FR).turn(),
    row("WLO", 200, "Wake 360 F-F Stepover", FR, FR),
    row("WLBB", 200, "Wake B-B Stepover", BK, BK),
    row("WL5B", 300, "Wake 540 F-B Stepover", FR, BK),
    row("WL5F", 300, "Wake 540 B-F Stepover", BK, FR),
    row("WL7F", 700, "Wake 720 F-F Stepover", FR, FR),
    row("WL7B", 550, "Wake 720 B-B Stepover", BK, BK),
    row("WL9B", 800, "Wake 900 F-B Stepover", FR, BK),
    row("WL9F", 800, "Wake 900 B-F Stepover", BK, FR),
    // flips
    row("BFL", 500, "Backward Somersault", FR, FR),
    row("BFLB", 750, "Wake Flip Half Twist F-B", FR, BK),
    row("BFLBB", 800, "Wake Flip Full Twist B-B", BK, BK).no_reverse(),
    row("FFL", 800, "Forward Somersault", FR, FR),
    row("FFLB", 850, "Forward Somersault F-B", FR, BK).no_reverse(),
    row("FFLF", 850, "Forward Somersault B-F", BK, FR).no_reverse(),
    row("FFLBB", 900, "Forward Somersault B-B", BK, BK).no_reverse(),
    row("FFL5F", 950, "Forward Somersault 540 B-F", BK, FR).no_reverse(),
    row("DBFL", 1000, "Wake Double Flip", FR, FR).no_reverse(),
    row("BFLLB", 800, "Wake Flip Twist Line Back", FR, BK),
    row("BFLSLBB", 900, "Wake Flip Ski Line 360 B-B", BK, BK).no_reverse(),
    row("BFLSL5F", 950, "Wake Flip Ski Line 540 B-F", BK, FR).no_reverse(),
];

const ONE_SKI: &[Row] = &[
    // spins
    row("S", 40, "Side Slide", FR, FR),
    row("B", 60, "180 F-B", FR, BK).turn(),
    row("F", 60, "B-F", BK, FR).turn(),
    row("O", 90, "360 F-F", FR, FR),
    row("BB", 90, "B-B", BK, BK),
    row("5B", 110, "540 F-B", FR, BK),
    row("5F", 110, "B-F", BK, FR),
    row("7F", 130, "720 F-F", FR, FR),
    row("7B", 130, "B-B", BK, BK),
    // steps
    row("LB", 110, "180 F-B Stepover", FR, BK).turn().no_reverse(),
    row("LF", 110, "B-F Stepover", BK, FR).turn().no_reverse(),
    // ski line
    row("SLB", 350, "F-B Ski Line", FR, BK).turn(),
    row("SLF", 400, "B-F Ski Line", BK, FR).turn(),
    row("SLO", 400, "360 F-F Ski Line", FR, FR),
    row("SLBB", 450, "B-B Ski Line", BK, BK),
    row("SL5B", 550, "540 F-B Ski Line", FR, BK),
    row("SL5F", 550, "B-F Ski Line", BK, FR),
    row("SL7B", 750, "720 B-B Ski Line", BK, BK),
    row("SL7F", 800, "F-F Ski Line", FR, FR),
    // flips
    row("BFL", 500, "Backward Somersault", FR, FR),
    row("BFLB", 750, "Wake Flip Half Twist F-B", FR, BK),
    row("BFLF", 550, "Wake Flip Half Twist B-F", BK, FR),
    row("BFLBB", 800, "Wake Flip Full Twist B-B", BK, BK),
    row("BFLO", 800, "Wake Flip Full Twist F-F", FR, FR),
    row("BFL5B", 900, "Wake Flip 540 F-B", FR, BK),
    row("BFL5F", 850, "Wake Flip 540 B-F", BK, FR),
    row("FFL", 800, "Forward Somersault", FR, FR),
    row("FFLB", 850, "Forward Somersault F-B", FR, BK).no_reverse(),
    row("FFLF", 850, "Forward Somersault B-F", BK, FR),
    row("FFLBB", 900, "Forward Somersault B-B", BK, BK).no_reverse(),
    row("FFL5F", 950, "Forward Somersault 540 B-F", BK, FR).no_reverse(),
    row("DBFL", 1000, "Wake Double Flip", FR, FR).no_reverse(),
    row("BFLLB", 800, "Wake Flip Twist Line Back", FR, BK),
    row("BFLSLB", 850, "Wake Flip Ski Line 180 F-B", FR, BK).no_reverse(),
    row("BFLSLBB", 900, "Wake Flip Ski Line 360 B-B", BK, BK).no_reverse(),
    row("BFLSLO", 900, "Wake Flip Ski Line 360 F-F", FR, FR).no_reverse(),
    row("BFLSL5F", 950, "Wake Flip Ski Line 540 B-F", BK, FR).no_reverse(),
    row("FFLSL5F", 950, "Forward Somersault Ski Line 540 B-F", BK, FR).no_reverse(),
    // wake spins
    row("WB", 80, "Wake 180 F-B", FR, BK).turn(),
    row("WF", 80, "Wake B-F", BK, FR).turn(),
    row("WO", 150, "Wake 360 F-F", FR, FR),
    row("WBB", 150, "Wake B-B", BK, BK),
    row("W5B", 310, "Wake 540 F-B", FR, BK),
    row("W5F", 310, "Wake B-F", BK, FR),
    row("W7F", 800, "Wake 720 F-F", FR, FR),
    row("W7B", 480, "Wake B-B", BK, BK),
    row("W9B", 850, "Wake 900 F-B", FR, BK),
    row("W9F", 850, "Wake B-F", BK, FR),
    // wake steps
    row("WLB", 160, "Wake 180 F-B Stepover", FR, BK).turn().no_reverse(),
    row("WLF", 160, "Wake B-F Stepover", BK, FR).turn().no_reverse(),
    row("WLO", 260, "Wake 360 F-F Stepover", FR, FR),
    row("WLBB", 260, "Wake B-B Stepover", BK, BK),
    row("WL5B", 420, "Wake 540 F-B Stepover", FR, BK),
    row("WL5F", 420, "Wake 540 B-F Stepover", BK, FR),
    row("WL5LB", 500, "Wake F-B Double Stepover", FR, BK),
    row("WL5LF", 500, "Wake B-F Double Stepover", BK, FR),
    row("WL7F", 700, "Wake 720 F-F Stepover", FR, FR),
    row("WL7B", 550, "Wake 720 B-B Stepover", BK, BK),
    row("WL9B", 800, "Wake 900 F-B Stepover", FR, BK),
    row("WL9F", 800, "Wake 900 B-F Stepover", BK, FR),
    // toe spins
    row("TS", 130, "Toehold Side Slide", FR, FR),
    row("TB", 100, "Toe 180 F-B", FR, BK).turn(),
    row("TF", 100, "Toe B-F", BK, FR).turn(),
    row("TO", 200, "Toe 360 F-F", FR, FR),
    row("TBB", 200, "Toe B-B", BK, BK),
    row("T5B", 350, "Toe 540 F-B", FR, BK),
    row("T5F", 350, "Toe 540 B-F", BK, FR).no_reverse(),
    row("T7F", 450, "Toe 720 F-F", FR, FR).no_reverse(),
    // toe wake steps
    row("TWLB", 320, "Toe Wake 180 F-B Stepover", FR, BK).turn().no_reverse(),
    row("TWLF", 380, "Toe Wake B-F Stepover", BK, FR).turn().no_reverse(),
    row("TWLO", 480, "Toe Wake 360 F-F Stepover", FR, FR),
    row("TWLBB", 480, "Toe Wake B-B Stepover", BK, BK),
    row("TWL5B", 600, "Toe Wake 540 F-B Stepover", FR, BK),
    row("TWL5F", 700, "Toe Wake B-F Stepover", BK, FR).no_reverse(),
    row("TWL7F", 800, "Toe Wake 720 F-F Stepover", FR, FR).no_reverse(),
    // toe wake spins
    row("TWB", 150, "Toe Wake 180 F-B", FR, BK).turn(),
    row("TWF", 150, "Toe Wake B-F", BK, FR).turn(),
    row("TWO", 300, "Toe Wake 360 F-F", FR, FR),
    row("TWBB", 330, "Toe Wake B-B", BK, BK),
    row("TW5B", 500, "Toe Wake 540 F-B", FR, BK),
    row("TW5F", 500, "Toe Wake B-F", BK, FR).no_reverse(),
    row("TW7F", 650, "Toe Wake 720 F-F", FR, FR),
    row("TW7B", 650, "Toe Wake B-B", BK, BK).no_reverse(),
];

static ONE_SKI_CATALOGUE: Lazy<TrickCatalogue> = Lazy::new(|| TrickCatalogue::new(Skis::One));
static TWO_SKI_CATALOGUE: Lazy<TrickCatalogue> = Lazy::new(|| TrickCatalogue::new(Skis::Two));

/// Catalogue points for a trick code, preferring the one-ski table
pub fn standard_points(code: &str) -> Option<u32> {
    ONE_SKI_CATALOGUE
        .points(code)
        .or_else(|| TWO_SKI_CATALOGUE.points(code))
}

/// All tricks available on a given number of skis
#[derive(Debug, Clone)]
pub struct TrickCatalogue {
    skis: Skis,
    tricks: Vec<TrickDef>,
    index: HashMap<String, usize>,
}

impl TrickCatalogue {
    pub fn new(skis: Skis) -> Self {
        let rows = match skis {
            Skis::One => ONE_SKI,
            Skis::Two => TWO_SKI,
        };

        let base: Vec<TrickDef> = rows
            .iter()
            .map(|r| TrickDef {
                code: r.code.to_string(),
                points: r.points,
                description: r.description.to_string(),
                start: r.start,
                end: r.end,
                turn_180: r.turn_180,
                can_reverse: r.can_reverse,
                reverse: false,
            })
            .collect();

        let reverses: Vec<TrickDef> = base
            .iter()
            .filter(|t| t.can_reverse)
            .map(|t| TrickDef {
                code: format!("R{}", t.code),
                description: format!("Reverse {}", t.description),
                reverse: true,
                ..t.clone()
            })
            .collect();

        let tricks: Vec<TrickDef> = base.into_iter().chain(reverses).collect();
        let index = tricks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.code.clone(), i))
            .collect();

        TrickCatalogue { skis, tricks, index }
    }

    pub fn skis(&self) -> Skis {
        self.skis
    }

    pub fn get(&self, code: &str) -> Option<&TrickDef> {
        self.index.get(clean_trick(code)).map(|&i| &self.tricks[i])
    }

    pub fn points(&self, code: &str) -> Option<u32> {
        self.get(code).map(|t| t.points)
    }

    pub fn tricks(&self) -> &[TrickDef] {
        &self.tricks
    }
}

/// Position within a pass: current orientation and which earlier tricks may
/// still be reversed.
#[derive(Debug, Clone)]
pub struct PassState<'a> {
    catalogue: &'a TrickCatalogue,
    pub orientation: Orientation,
    last: Option<&'a TrickDef>,
    second_last: Option<&'a TrickDef>,
}

impl<'a> PassState<'a> {
    pub fn new(catalogue: &'a TrickCatalogue, start: Orientation) -> Self {
        PassState {
            catalogue,
            orientation: start,
            last: None,
            second_last: None,
        }
    }

    /// State after performing `history` from `start`
    pub fn replay<S: AsRef<str>>(catalogue: &'a TrickCatalogue, start: Orientation, history: &[S]) -> Self {
        let mut state = PassState::new(catalogue, start);
        for trick in history {
            state.apply(trick.as_ref());
        }
        state
    }

    /// Record one performed trick. Codes outside the catalogue are ignored.
    pub fn apply(&mut self, code: &str) {
        let Some(trick) = self.catalogue.get(code) else {
            log::debug!("{} is not in the {:?} ski catalogue", code, self.catalogue.skis());
            return;
        };

        if trick.reverse {
            let reverses = |t: Option<&TrickDef>| t.is_some_and(|t| trick.code[1..] == t.code);
            if reverses(self.second_last) {
                self.second_last = None;
            } else if reverses(self.last) {
                self.last = None;
                self.second_last = None;
            }
            self.orientation = trick.end;
            return;
        }

        // Only a 180 turn may separate an orientation-changing trick from its reverse
        self.second_last = match self.last {
            Some(last) if last.changes_orientation() && trick.turn_180 => Some(last),
            _ => None,
        };
        self.last = trick.can_reverse.then_some(trick);
        self.orientation = trick.end;
    }

    /// Reverse codes that may be performed next
    pub fn available_reverses(&self) -> Vec<String> {
        [self.second_last, self.last]
            .into_iter()
            .flatten()
            .filter(|t| !t.changes_orientation() || t.start == self.orientation)
            .map(|t| format!("R{}", t.code))
            .collect()
    }
}
