//! The three record kinds kept by the store.
//!
//! Every record is a fixed-arity tuple of scalar fields with two canonical encodings:
//! a compact JSON object with a fixed key order (sent to clients) and a tab separated line
//! (kept on disk). Records are immutable, an "edit" in the store replaces a whole record.
//!
//! | kind           | JSON shape                                                         |
//! |----------------|--------------------------------------------------------------------|
//! | [`Occurrence`] | `{"id":1,"skull":2,"amount":1.5,"millis":1000}`                     |
//! | [`Quick`]      | `{"skull":2,"amount":1.5}`                                         |
//! | [`Skull`]      | `{"id":1,"name":"coffee","color":"brown","icon":"cup","unitPrice":2.5}` |
//!
//! Each kind decides on its own what "the same record" means, see the `PartialEq` impls.
//! Removal by value uses exactly that rule.
use std::fmt;
use std::fmt::Write as FmtWrite;
use std::io;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::store::{Collection, UserCollections};
use crate::{Result, SkullError};

/// The closed set of record kinds.
///
/// The declaration order is the global lock order used whenever more than one collection
/// of a user has to be locked at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// a category definition
    Skull,
    /// a favorite / shortcut preset
    Quick,
    /// a logged quantity entry
    Occurrence,
}

impl RecordKind {
    /// every kind, in lock order
    pub const ALL: [RecordKind; 3] = [RecordKind::Skull, RecordKind::Quick, RecordKind::Occurrence];

    /// lower case name, used on the wire and on the command line
    pub fn name(self) -> &'static str {
        match self {
            RecordKind::Skull => "skull",
            RecordKind::Quick => "quick",
            RecordKind::Occurrence => "occurrence",
        }
    }

    /// the file name used inside a user's directory unless configured otherwise
    pub fn default_file_name(self) -> &'static str {
        match self {
            RecordKind::Skull => "skull.tsv",
            RecordKind::Quick => "quick.tsv",
            RecordKind::Occurrence => "occurrence.tsv",
        }
    }

    /// number of fields of a record of this kind
    pub fn arity(self) -> usize {
        match self {
            RecordKind::Skull => Skull::ARITY,
            RecordKind::Quick => Quick::ARITY,
            RecordKind::Occurrence => Occurrence::ARITY,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RecordKind {
    type Err = SkullError;

    fn from_str(s: &str) -> Result<Self> {
        RecordKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| SkullError::Parse(format!("unknown record kind: {}", s)))
    }
}

/// Behaviour shared by all record kinds.
///
/// The associated data replaces any runtime lookup: a store operation on `T` finds the
/// kind's collection through [`Record::collection`], its file through [`Record::KIND`] and
/// validates stored lines against [`Record::ARITY`].
pub trait Record: Serialize + PartialEq + Clone + fmt::Debug + Send + Sync + 'static {
    /// which kind this is
    const KIND: RecordKind;

    /// number of fields, a TSV line holds `ARITY - 1` tabs
    const ARITY: usize;

    /// builds a record from its raw string fields, in JSON/TSV field order
    ///
    /// # Errors
    /// returns [`SkullError::Parse`] on a wrong field count or any field that does not parse
    fn from_fields(fields: &[&str]) -> Result<Self>;

    /// appends this record's TSV encoding (no line terminator) to `out`
    fn write_tsv(&self, out: &mut String);

    /// selects this kind's collection out of a user's collections
    fn collection(collections: &UserCollections) -> &Collection<Self>;

    /// the TSV encoding of this record, without a line terminator
    fn to_tsv(&self) -> String {
        let mut line = String::new();
        self.write_tsv(&mut line);
        line
    }

    /// parses one stored line
    fn from_tsv(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != Self::ARITY {
            return Err(SkullError::Parse(format!(
                "expected {} tab separators, found {}",
                Self::ARITY - 1,
                fields.len() - 1
            )));
        }
        Self::from_fields(&fields)
    }

    /// writes the compact JSON object for this record
    fn write_json<W: io::Write>(&self, out: W) -> serde_json::Result<()> {
        serde_json::to_writer(out, self)
    }

    /// the compact JSON object for this record
    fn to_json(&self) -> String {
        // serializing plain scalars and strings into memory cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A logged quantity of some [`Skull`] at a point in time.
///
/// Two occurrences are the same record when their `id`s match.
#[derive(Debug, Clone, Serialize)]
pub struct Occurrence {
    id: u64,
    skull: u64,
    amount: f64,
    millis: u64,
}

impl Occurrence {
    /// creates a new occurrence
    ///
    /// # Errors
    /// returns [`SkullError::Parse`] if `amount` is not finite
    pub fn new(id: u64, skull: u64, amount: f64, millis: u64) -> Result<Self> {
        Ok(Occurrence {
            id,
            skull,
            amount: finite("amount", amount)?,
            millis,
        })
    }

    /// the occurrence id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// id of the skull this occurrence counts
    pub fn skull(&self) -> u64 {
        self.skull
    }

    /// how much was logged
    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// when it was logged, milliseconds since the unix epoch
    pub fn millis(&self) -> u64 {
        self.millis
    }
}

impl PartialEq for Occurrence {
    fn eq(&self, rhs: &Self) -> bool {
        self.id == rhs.id
    }
}

impl Record for Occurrence {
    const KIND: RecordKind = RecordKind::Occurrence;
    const ARITY: usize = 4;

    fn from_fields(fields: &[&str]) -> Result<Self> {
        check_arity::<Self>(fields)?;
        Occurrence::new(
            unsigned("id", fields[0])?,
            unsigned("skull", fields[1])?,
            float("amount", fields[2])?,
            unsigned("millis", fields[3])?,
        )
    }

    fn write_tsv(&self, out: &mut String) {
        // infallible on a String
        let _ = write!(out, "{}\t{}\t{}\t{}", self.id, self.skull, self.amount, self.millis);
    }

    fn collection(collections: &UserCollections) -> &Collection<Self> {
        &collections.occurrences
    }
}

/// A preset amount of some [`Skull`] that can be logged with a single tap.
///
/// Two quicks are the same record when every field matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quick {
    skull: u64,
    amount: f64,
}

impl Quick {
    /// creates a new quick
    ///
    /// # Errors
    /// returns [`SkullError::Parse`] if `amount` is not finite
    pub fn new(skull: u64, amount: f64) -> Result<Self> {
        Ok(Quick {
            skull,
            amount: finite("amount", amount)?,
        })
    }

    /// id of the skull this preset logs
    pub fn skull(&self) -> u64 {
        self.skull
    }

    /// the preset amount
    pub fn amount(&self) -> f64 {
        self.amount
    }
}

impl Record for Quick {
    const KIND: RecordKind = RecordKind::Quick;
    const ARITY: usize = 2;

    fn from_fields(fields: &[&str]) -> Result<Self> {
        check_arity::<Self>(fields)?;
        Quick::new(unsigned("skull", fields[0])?, float("amount", fields[1])?)
    }

    fn write_tsv(&self, out: &mut String) {
        // infallible on a String
        let _ = write!(out, "{}\t{}", self.skull, self.amount);
    }

    fn collection(collections: &UserCollections) -> &Collection<Self> {
        &collections.quicks
    }
}

/// A category of things that can be logged, e.g. "coffee".
///
/// Two skulls are the same record when their `id`s match OR their `name`s match, so a
/// skull can be removed knowing either of the two.
#[derive(Debug, Clone, Serialize)]
pub struct Skull {
    id: u64,
    name: String,
    color: String,
    icon: String,
    #[serde(rename = "unitPrice")]
    unit_price: f64,
}

impl Skull {
    /// creates a new skull
    ///
    /// # Errors
    /// returns [`SkullError::Parse`] if a text field holds a tab or line break, or if
    /// `unit_price` is not finite
    pub fn new(
        id: u64,
        name: impl Into<String>,
        color: impl Into<String>,
        icon: impl Into<String>,
        unit_price: f64,
    ) -> Result<Self> {
        Ok(Skull {
            id,
            name: text("name", name.into())?,
            color: text("color", color.into())?,
            icon: text("icon", icon.into())?,
            unit_price: finite("unitPrice", unit_price)?,
        })
    }

    /// the skull id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// display color
    pub fn color(&self) -> &str {
        &self.color
    }

    /// display icon
    pub fn icon(&self) -> &str {
        &self.icon
    }

    /// price of one unit
    pub fn unit_price(&self) -> f64 {
        self.unit_price
    }
}

impl PartialEq for Skull {
    fn eq(&self, rhs: &Self) -> bool {
        self.id == rhs.id || self.name == rhs.name
    }
}

impl Record for Skull {
    const KIND: RecordKind = RecordKind::Skull;
    const ARITY: usize = 5;

    fn from_fields(fields: &[&str]) -> Result<Self> {
        check_arity::<Self>(fields)?;
        Skull::new(
            unsigned("id", fields[0])?,
            fields[1],
            fields[2],
            fields[3],
            float("unitPrice", fields[4])?,
        )
    }

    fn write_tsv(&self, out: &mut String) {
        // infallible on a String
        let _ = write!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            self.id, self.name, self.color, self.icon, self.unit_price
        );
    }

    fn collection(collections: &UserCollections) -> &Collection<Self> {
        &collections.skulls
    }
}

fn check_arity<T: Record>(fields: &[&str]) -> Result<()> {
    if fields.len() != T::ARITY {
        return Err(SkullError::Parse(format!(
            "a {} has {} fields, got {}",
            T::KIND,
            T::ARITY,
            fields.len()
        )));
    }
    Ok(())
}

/// parses an unsigned id-like field. Signs other than a leading `+`, fractions and values
/// above `u64::MAX` are rejected.
fn unsigned(name: &str, field: &str) -> Result<u64> {
    field
        .parse::<u64>()
        .map_err(|e| SkullError::Parse(format!("{}: {:?} is not an unsigned integer ({})", name, field, e)))
}

fn float(name: &str, field: &str) -> Result<f64> {
    let value = field
        .parse::<f64>()
        .map_err(|e| SkullError::Parse(format!("{}: {:?} is not a number ({})", name, field, e)))?;
    finite(name, value)
}

// NaN and the infinities have no JSON representation
fn finite(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SkullError::Parse(format!("{}: {} is not a finite number", name, value)))
    }
}

fn text(name: &str, value: String) -> Result<String> {
    if value.contains(|c: char| c == '\t' || c == '\n' || c == '\r') {
        Err(SkullError::Parse(format!("{}: {:?} contains a tab or line break", name, value)))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skull_json() {
        let skull = Skull::from_fields(&["1", "nome", "cor", "icone", "2.5"]).unwrap();
        assert_eq!(
            skull.to_json(),
            r#"{"id":1,"name":"nome","color":"cor","icon":"icone","unitPrice":2.5}"#
        );
    }

    #[test]
    fn skull_json_escapes_strings() {
        let skull = Skull::new(1, r#"say "hi""#, "cor", "ico\\ne", 2.5).unwrap();
        assert_eq!(
            skull.to_json(),
            r#"{"id":1,"name":"say \"hi\"","color":"cor","icon":"ico\\ne","unitPrice":2.5}"#
        );
    }

    #[test]
    fn skull_tsv() {
        let skull = Skull::from_fields(&["1", "nome", "cor", "icone", "2"]).unwrap();
        assert_eq!(skull.to_tsv(), "1\tnome\tcor\ticone\t2");
    }

    #[test]
    fn quick_json_and_tsv() {
        let quick = Quick::from_fields(&["1", "2.5"]).unwrap();
        assert_eq!(quick.to_json(), r#"{"skull":1,"amount":2.5}"#);
        assert_eq!(quick.to_tsv(), "1\t2.5");
    }

    #[test]
    fn occurrence_json_and_tsv() {
        let occurrence = Occurrence::from_fields(&["1", "2", "3.5", "4"]).unwrap();
        assert_eq!(occurrence.to_json(), r#"{"id":1,"skull":2,"amount":3.5,"millis":4}"#);
        assert_eq!(occurrence.to_tsv(), "1\t2\t3.5\t4");
    }

    #[test]
    fn skull_equals_by_id_or_name() {
        let skull = Skull::new(1, "nome", "farge", "ikon", 3.0).unwrap();
        let same_id = Skull::new(1, "navn", "cor", "icone", 2.0).unwrap();
        let same_name = Skull::new(2, "nome", "cor", "icone", 2.0).unwrap();
        let different = Skull::new(2, "navn", "cor", "icone", 2.0).unwrap();

        assert_eq!(skull, same_id);
        assert_eq!(skull, same_name);
        assert_ne!(skull, different);
    }

    #[test]
    fn quick_equals_by_all_fields() {
        let quick = Quick::new(1, 2.0).unwrap();
        assert_eq!(quick, Quick::new(1, 2.0).unwrap());
        assert_ne!(quick, Quick::new(2, 2.0).unwrap());
        assert_ne!(quick, Quick::new(1, 3.0).unwrap());
    }

    #[test]
    fn occurrence_equals_by_id() {
        let occurrence = Occurrence::new(1, 2, 3.0, 4).unwrap();
        let same = Occurrence::new(1, 5, 6.0, 7).unwrap();
        let different = Occurrence::new(5, 2, 3.0, 4).unwrap();

        assert_eq!(occurrence, same);
        assert_ne!(occurrence, different);
    }

    #[test]
    fn unsigned_fields_reject_negative_and_overflow() {
        assert!(Quick::from_fields(&["-1", "2"]).is_err());
        assert!(Quick::from_fields(&["18446744073709551616", "2"]).is_err());
        assert!(Quick::from_fields(&["1.5", "2"]).is_err());
        assert!(Quick::from_fields(&["", "2"]).is_err());
        assert!(Quick::from_fields(&["18446744073709551615", "2"]).is_ok());
    }

    #[test]
    fn float_fields_must_be_finite_numbers() {
        assert!(Quick::from_fields(&["1", "abc"]).is_err());
        assert!(Quick::from_fields(&["1", "NaN"]).is_err());
        assert!(Quick::from_fields(&["1", "inf"]).is_err());
        assert_eq!(Quick::from_fields(&["1", "-0.25"]).unwrap().amount(), -0.25);
        assert!(Quick::new(1, f64::NAN).is_err());
    }

    #[test]
    fn text_fields_reject_separators() {
        assert!(Skull::new(1, "a\tb", "c", "i", 1.0).is_err());
        assert!(Skull::new(1, "a", "c\nd", "i", 1.0).is_err());
        assert!(Skull::new(1, "a", "c", "i\r", 1.0).is_err());
    }

    #[test]
    fn wrong_field_count_is_a_parse_error() {
        assert!(matches!(Quick::from_fields(&["1"]), Err(SkullError::Parse(_))));
        assert!(matches!(Occurrence::from_fields(&["1", "2", "3", "4", "5"]), Err(SkullError::Parse(_))));
        assert!(Occurrence::from_tsv("1\t2\t3").is_err());
        assert!(Occurrence::from_tsv("1\t2\t3\t4\t").is_err());
    }

    #[test]
    fn tsv_round_trip() {
        let skull = Skull::new(7, "coffee beans", "dark brown", "cup", 0.35).unwrap();
        let parsed = Skull::from_tsv(&skull.to_tsv()).unwrap();
        assert_eq!(parsed.id(), 7);
        assert_eq!(parsed.name(), "coffee beans");
        assert_eq!(parsed.color(), "dark brown");
        assert_eq!(parsed.icon(), "cup");
        assert_eq!(parsed.unit_price(), 0.35);

        let quick = Quick::new(3, 1e-7).unwrap();
        assert_eq!(Quick::from_tsv(&quick.to_tsv()).unwrap(), quick);

        let occurrence = Occurrence::new(u64::MAX, 0, 12345.678, 1_600_000_000_000).unwrap();
        let parsed = Occurrence::from_tsv(&occurrence.to_tsv()).unwrap();
        assert_eq!(parsed.to_json(), occurrence.to_json());
    }

    #[test]
    fn kinds_parse_from_their_names() {
        for kind in RecordKind::ALL.iter() {
            assert_eq!(kind.name().parse::<RecordKind>().unwrap(), *kind);
        }
        assert!("skulls".parse::<RecordKind>().is_err());
        assert_eq!(RecordKind::Skull.arity(), 5);
        assert_eq!(
            serde_json::to_string(&RecordKind::Occurrence).unwrap(),
            r#""occurrence""#
        );
    }
}
