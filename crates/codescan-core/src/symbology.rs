use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Optical code standard that a recognizer can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Symbology {
    #[serde(rename = "qr")]
    Qr,
    #[serde(rename = "micro-qr")]
    MicroQr,
    #[serde(rename = "aztec")]
    Aztec,
    #[serde(rename = "data-matrix")]
    DataMatrix,
    #[serde(rename = "pdf417")]
    Pdf417,
    #[serde(rename = "code-39")]
    Code39,
    #[serde(rename = "code-39-mod-43")]
    Code39Mod43,
    #[serde(rename = "code-93")]
    Code93,
    #[serde(rename = "code-128")]
    Code128,
    #[serde(rename = "codabar")]
    Codabar,
    #[serde(rename = "ean-8")]
    Ean8,
    #[serde(rename = "ean-13")]
    Ean13,
    #[serde(rename = "upc-e")]
    UpcE,
    #[serde(rename = "interleaved-2-of-5")]
    Interleaved2of5,
    #[serde(rename = "itf-14")]
    Itf14,
}

impl Symbology {
    pub const ALL: [Symbology; 15] = [
        Symbology::Qr,
        Symbology::MicroQr,
        Symbology::Aztec,
        Symbology::DataMatrix,
        Symbology::Pdf417,
        Symbology::Code39,
        Symbology::Code39Mod43,
        Symbology::Code93,
        Symbology::Code128,
        Symbology::Codabar,
        Symbology::Ean8,
        Symbology::Ean13,
        Symbology::UpcE,
        Symbology::Interleaved2of5,
        Symbology::Itf14,
    ];

    /// Stable identifier, identical to the serialized form.
    pub fn name(self) -> &'static str {
        match self {
            Symbology::Qr => "qr",
            Symbology::MicroQr => "micro-qr",
            Symbology::Aztec => "aztec",
            Symbology::DataMatrix => "data-matrix",
            Symbology::Pdf417 => "pdf417",
            Symbology::Code39 => "code-39",
            Symbology::Code39Mod43 => "code-39-mod-43",
            Symbology::Code93 => "code-93",
            Symbology::Code128 => "code-128",
            Symbology::Codabar => "codabar",
            Symbology::Ean8 => "ean-8",
            Symbology::Ean13 => "ean-13",
            Symbology::UpcE => "upc-e",
            Symbology::Interleaved2of5 => "interleaved-2-of-5",
            Symbology::Itf14 => "itf-14",
        }
    }

    /// Two-dimensional (matrix or stacked) symbologies.
    pub fn is_two_dimensional(self) -> bool {
        matches!(
            self,
            Symbology::Qr
                | Symbology::MicroQr
                | Symbology::Aztec
                | Symbology::DataMatrix
                | Symbology::Pdf417
        )
    }
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown symbology `{0}`")]
pub struct ParseSymbologyError(pub String);

impl FromStr for Symbology {
    type Err = ParseSymbologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        Symbology::ALL
            .into_iter()
            .find(|sym| sym.name() == key)
            .ok_or_else(|| ParseSymbologyError(s.to_string()))
    }
}

/// Set of symbologies a session should recognize.
///
/// The type allows the empty set so capability queries can answer for it;
/// configuring a session with an empty set is rejected upstream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbologySet(BTreeSet<Symbology>);

impl SymbologySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(symbology: Symbology) -> Self {
        Self(BTreeSet::from([symbology]))
    }

    /// Every symbology this crate knows about.
    pub fn all() -> Self {
        Symbology::ALL.into_iter().collect()
    }

    pub fn insert(&mut self, symbology: Symbology) -> bool {
        self.0.insert(symbology)
    }

    #[inline]
    pub fn contains(&self, symbology: Symbology) -> bool {
        self.0.contains(&symbology)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Symbology> + '_ {
        self.0.iter().copied()
    }

    pub fn is_subset(&self, other: &SymbologySet) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Members of `self` that are missing from `other`.
    pub fn missing_from(&self, other: &SymbologySet) -> Vec<Symbology> {
        self.0.difference(&other.0).copied().collect()
    }
}

impl FromIterator<Symbology> for SymbologySet {
    fn from_iter<T: IntoIterator<Item = Symbology>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Symbology; N]> for SymbologySet {
    fn from(value: [Symbology; N]) -> Self {
        value.into_iter().collect()
    }
}

impl fmt::Display for SymbologySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Symbology::name).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}
