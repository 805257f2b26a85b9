//! Character classes and password templates.
//!
//! A template is one symbol per output character:
//!
//! ```text
//! a  lowercase      A  uppercase      n  digit
//! o  extra set      x  full set (every class the template enables)
//! ```
//!
//! The full set is the enabled subsets concatenated as digits, lowercase,
//! uppercase, extra. A template enabling none of them (all `x`) falls back
//! to [`DEFAULT_CHARACTER_SET`].

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{KeywardError, KeywardResult};

pub const LOWER_CASE: &str = "abcdefghijklmnopqrstuvwxyz";
pub const UPPER_CASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const DIGITS: &str = "0123456789";
pub const DEFAULT_EXTRA: &str = "#!\"§$%&/()[]{}=-_+*<>;:.";

/// Full set for templates that enable no specific class.
pub const DEFAULT_CHARACTER_SET: &str = concat!(
    "abcdefghijklmnopqrstuvwxyz",
    "ABCDEFGHIJKLMNOPQRSTUVWXYZ",
    "0123456789",
    "#!\"§$%&/()[]{}=-_+*<>;:."
);

/// Template length used when nothing else is specified.
pub const DEFAULT_LENGTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharClass {
    Lower,
    Upper,
    Digit,
    Extra,
    Any,
}

impl CharClass {
    pub fn symbol(self) -> char {
        match self {
            CharClass::Lower => 'a',
            CharClass::Upper => 'A',
            CharClass::Digit => 'n',
            CharClass::Extra => 'o',
            CharClass::Any => 'x',
        }
    }

    pub fn from_symbol(c: char) -> Option<Self> {
        match c {
            'a' => Some(CharClass::Lower),
            'A' => Some(CharClass::Upper),
            'n' => Some(CharClass::Digit),
            'o' => Some(CharClass::Extra),
            'x' => Some(CharClass::Any),
            _ => None,
        }
    }
}

/// Which of the four concrete classes a template enables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassSelection {
    pub lower: bool,
    pub upper: bool,
    pub digits: bool,
    pub extra: bool,
}

impl ClassSelection {
    pub const ALL: ClassSelection = ClassSelection {
        lower: true,
        upper: true,
        digits: true,
        extra: true,
    };

    pub fn is_empty(&self) -> bool {
        !(self.lower || self.upper || self.digits || self.extra)
    }

    /// Class set encoded by a complexity digit (0-7).
    pub fn from_complexity(complexity: u8) -> Option<Self> {
        let (digits, lower, upper, extra) = match complexity {
            0 => (true, false, false, false),
            1 => (false, true, false, false),
            2 => (false, false, true, false),
            3 => (true, true, false, false),
            4 => (false, true, true, false),
            5 => (true, true, true, false),
            6 => (true, true, true, true),
            7 => (false, false, false, true),
            _ => return None,
        };
        Some(ClassSelection {
            lower,
            upper,
            digits,
            extra,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    classes: Vec<CharClass>,
}

impl Template {
    pub fn new(classes: Vec<CharClass>) -> Self {
        Self { classes }
    }

    /// All-`x` template of the given length.
    pub fn any(length: usize) -> Self {
        Self::new(vec![CharClass::Any; length])
    }

    /// Build a template of `length` positions holding each selected class
    /// once (lower, upper, digits, extra priority) and `x` everywhere else,
    /// then shuffle the positions.
    ///
    /// The shuffle only avoids a fixed visual pattern; it carries no security
    /// weight and its order is not reproducible across RNGs.
    pub fn calculate<R: Rng + ?Sized>(
        length: usize,
        selection: ClassSelection,
        rng: &mut R,
    ) -> Self {
        let mut pending = [
            (selection.lower, CharClass::Lower),
            (selection.upper, CharClass::Upper),
            (selection.digits, CharClass::Digit),
            (selection.extra, CharClass::Extra),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, class)| class);

        let mut classes: Vec<CharClass> = (0..length)
            .map(|_| pending.next().unwrap_or(CharClass::Any))
            .collect();
        classes.shuffle(rng);
        Self { classes }
    }

    /// Parse `([0-7];)?[aAnox]+`. The complexity prefix is validated but the
    /// symbols themselves are authoritative.
    pub fn parse_full(full: &str) -> KeywardResult<Self> {
        let body = match full.split_once(';') {
            Some((prefix, body)) => {
                let valid_prefix = prefix.len() == 1
                    && prefix
                        .parse::<u8>()
                        .ok()
                        .and_then(ClassSelection::from_complexity)
                        .is_some();
                if !valid_prefix {
                    return Err(KeywardError::Config(format!(
                        "invalid template complexity prefix: {prefix:?}"
                    )));
                }
                body
            }
            None => full,
        };
        body.parse()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> &[CharClass] {
        &self.classes
    }

    pub fn uses(&self, class: CharClass) -> bool {
        self.classes.contains(&class)
    }

    pub fn selection(&self) -> ClassSelection {
        ClassSelection {
            lower: self.uses(CharClass::Lower),
            upper: self.uses(CharClass::Upper),
            digits: self.uses(CharClass::Digit),
            extra: self.uses(CharClass::Extra),
        }
    }

    /// Compact 0-6 code for the set of classes in use, position independent.
    /// Returns -1 for any combination without a code.
    pub fn complexity(&self) -> i8 {
        let s = self.selection();
        match (s.digits, s.lower, s.upper, s.extra) {
            (true, false, false, false) => 0,
            (false, true, false, false) => 1,
            (false, false, true, false) => 2,
            (true, true, false, false) => 3,
            (false, true, true, false) => 4,
            (true, true, true, false) => 5,
            (true, true, true, true) => 6,
            _ => -1,
        }
    }

    /// `"<complexity>;<template>"`, or the bare template when non-standard.
    pub fn full_template(&self) -> String {
        match self.complexity() {
            c if c >= 0 => format!("{c};{self}"),
            _ => self.to_string(),
        }
    }

    /// Characters a position of the given class draws from.
    pub fn alphabet(&self, class: CharClass, extra: &str) -> Vec<char> {
        match class {
            CharClass::Lower => LOWER_CASE.chars().collect(),
            CharClass::Upper => UPPER_CASE.chars().collect(),
            CharClass::Digit => DIGITS.chars().collect(),
            CharClass::Extra => extra.chars().collect(),
            CharClass::Any => self.full_alphabet(extra),
        }
    }

    pub fn full_alphabet(&self, extra: &str) -> Vec<char> {
        let s = self.selection();
        if s.is_empty() {
            return DEFAULT_CHARACTER_SET.chars().collect();
        }
        let mut set = String::new();
        if s.digits {
            set.push_str(DIGITS);
        }
        if s.lower {
            set.push_str(LOWER_CASE);
        }
        if s.upper {
            set.push_str(UPPER_CASE);
        }
        if s.extra {
            set.push_str(extra);
        }
        set.chars().collect()
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::any(DEFAULT_LENGTH)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.classes
            .iter()
            .try_for_each(|c| write!(f, "{}", c.symbol()))
    }
}

impl FromStr for Template {
    type Err = KeywardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(KeywardError::Config("empty password template".into()));
        }
        let classes = s
            .chars()
            .map(|c| {
                CharClass::from_symbol(c).ok_or_else(|| {
                    KeywardError::Config(format!("invalid template symbol {c:?} in {s:?}"))
                })
            })
            .collect::<KeywardResult<Vec<_>>>()?;
        Ok(Self { classes })
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Template::parse_full(&s).map_err(serde::de::Error::custom)
    }
}
