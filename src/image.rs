/// Program memory holds exactly this many instruction words.
pub const PROM_SIZE: usize = 256;

/// Assembled program: 256 instruction words plus the count of real instructions.
///
/// Words at or past `len` are always zero.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ProgramImage {
    words: [u16; PROM_SIZE],
    len: usize,
}

impl ProgramImage {
    pub fn empty() -> Self {
        ProgramImage {
            words: [0; PROM_SIZE],
            len: 0,
        }
    }

    /// Build from up to 256 words. Returns `None` if `words` does not fit.
    pub fn from_words(words: &[u16]) -> Option<Self> {
        if words.len() > PROM_SIZE {
            return None;
        }
        let mut image = Self::empty();
        image.words[..words.len()].copy_from_slice(words);
        image.len = words.len();
        Some(image)
    }

    /// Number of real instructions, 0 to 256.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// All 256 words, including the zero padding.
    pub fn words(&self) -> &[u16; PROM_SIZE] {
        &self.words
    }

    /// Only the assembled instructions.
    pub fn program(&self) -> &[u16] {
        &self.words[..self.len]
    }

    /// Raw image as little-endian words, padding included.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}

impl Default for ProgramImage {
    fn default() -> Self {
        Self::empty()
    }
}
