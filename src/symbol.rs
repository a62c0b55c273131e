use std::{ops::Range, str::FromStr};

use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use miette::SourceSpan;

type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Label token (including its trailing `:`) -> index of the significant line it was declared on.
///
/// Lives for a single assembly. Redeclaring a label overwrites the previous index.
#[derive(Default, Debug)]
pub struct LabelTable(FxMap<String, u8>);

impl LabelTable {
    pub fn new() -> Self {
        LabelTable(IndexMap::with_hasher(FxBuildHasher::default()))
    }

    pub fn insert(&mut self, label: &str, index: u8) {
        self.0.insert(label.to_owned(), index);
    }

    pub fn get(&self, label: &str) -> Option<u8> {
        self.0.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Labels in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u8)> {
        self.0.iter().map(|(label, idx)| (label.as_str(), *idx))
    }
}

/// Whether a token is a label declaration or reference.
pub fn is_label(token: &str) -> bool {
    token.ends_with(':')
}

/// Location within source
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Span {
    offs: usize,
    len: usize,
}

impl Span {
    pub fn new(offs: usize, len: usize) -> Self {
        Span { offs, len }
    }

    /// Span of `part`, which must be a subslice of `src`.
    pub fn of(src: &str, part: &str) -> Self {
        let offs = part.as_ptr() as usize - src.as_ptr() as usize;
        debug_assert!(offs + part.len() <= src.len());
        Span::new(offs, part.len())
    }

    pub fn offs(&self) -> usize {
        self.offs
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn end(&self) -> usize {
        self.offs + self.len
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

impl From<Span> for Range<usize> {
    fn from(value: Span) -> Self {
        value.offs()..value.end()
    }
}

/// One of the sixteen general purpose registers. `r0` always reads as zero.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Register(u8);

impl Register {
    pub fn index(self) -> u8 {
        self.0
    }
}

/// Why a register token failed to parse.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RegisterError {
    NotANumber,
    OutOfRange,
}

impl FromStr for Register {
    type Err = RegisterError;

    /// Accepts `r7` or `7`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('r').unwrap_or(s);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RegisterError::NotANumber);
        }
        match digits.parse::<u8>() {
            Ok(idx) if idx < 16 => Ok(Register(idx)),
            _ => Err(RegisterError::OutOfRange),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_parse() {
        assert_eq!("r0".parse::<Register>().map(Register::index), Ok(0));
        assert_eq!("15".parse::<Register>().map(Register::index), Ok(15));
        assert_eq!("r7".parse::<Register>().map(Register::index), Ok(7));
        assert_eq!("r16".parse::<Register>(), Err(RegisterError::OutOfRange));
        assert_eq!("r99999999999".parse::<Register>(), Err(RegisterError::OutOfRange));
        assert_eq!("r+1".parse::<Register>(), Err(RegisterError::NotANumber));
        assert_eq!("R1".parse::<Register>(), Err(RegisterError::NotANumber));
        assert_eq!("r".parse::<Register>(), Err(RegisterError::NotANumber));
        assert_eq!("r-1".parse::<Register>(), Err(RegisterError::NotANumber));
    }

    #[test]
    fn label_table_last_write_wins() {
        let mut table = LabelTable::new();
        table.insert("loop:", 2);
        table.insert("end:", 4);
        table.insert("loop:", 7);
        assert_eq!(table.get("loop:"), Some(7));
        assert_eq!(table.get("loop"), None);
        assert_eq!(table.len(), 2);
        assert_eq!(table.iter().collect::<Vec<_>>(), vec![("loop:", 7), ("end:", 4)]);
    }

    #[test]
    fn span_of_subslice() {
        let src = "ADD r1 r2 r3";
        let tok = src.split_whitespace().nth(2).unwrap();
        let span = Span::of(src, tok);
        assert_eq!(Range::from(span), 7..9);
        assert_eq!(&src[Range::from(span)], "r2");
    }
}
