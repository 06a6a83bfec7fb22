//! Sortable cart identifiers.
//!
//! Identifiers are UUIDv7 values (millisecond timestamp followed by random
//! bits) rendered as 26 symbols of a 32-symbol alphabet, most significant
//! symbol first. With an ascending alphabet the rendered token sorts the
//! same way as the underlying value, so tokens sort by creation time.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Crockford Base32, the default identifier alphabet.
pub const CROCKFORD_ALPHABET: &str = "0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Number of symbols in a rendered identifier.
pub const ID_LENGTH: usize = 26;

const ALPHABET_SIZE: usize = 32;

/// Malformed alphabets and identifiers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    /// The alphabet does not have exactly 32 symbols.
    #[error("alphabet must contain exactly {ALPHABET_SIZE} symbols, got {0}")]
    AlphabetLength(usize),

    /// The alphabet is not strictly ascending printable ASCII without `:`.
    #[error("alphabet symbols must be printable ASCII in strictly ascending order, excluding ':'")]
    AlphabetOrder,

    /// An identifier has the wrong length.
    #[error("identifier must be {ID_LENGTH} characters, got {0}")]
    Length(usize),

    /// An identifier uses a symbol outside the alphabet.
    #[error("identifier contains a symbol outside the alphabet")]
    Symbol,
}

/// Symbol table used to render identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAlphabet {
    symbols: [u8; ALPHABET_SIZE],
}

impl IdAlphabet {
    /// Build an alphabet from 32 ascending printable ASCII symbols.
    ///
    /// # Errors
    ///
    /// Returns an error when the symbol count is wrong, a symbol is not
    /// printable ASCII, is `:`, or the symbols are not strictly ascending.
    pub fn new(symbols: &str) -> Result<Self, IdError> {
        let bytes = symbols.as_bytes();

        let symbols: [u8; ALPHABET_SIZE] = bytes
            .try_into()
            .map_err(|_wrong_length| IdError::AlphabetLength(symbols.chars().count()))?;

        let printable = symbols
            .iter()
            .all(|symbol| symbol.is_ascii_graphic() && *symbol != b':');

        let ascending = symbols.windows(2).all(|pair| match pair {
            [lower, higher] => lower < higher,
            _ => true,
        });

        if !printable || !ascending {
            return Err(IdError::AlphabetOrder);
        }

        Ok(Self { symbols })
    }

    /// The Crockford Base32 alphabet.
    #[must_use]
    pub fn crockford() -> Self {
        let mut symbols = [0_u8; ALPHABET_SIZE];

        symbols.copy_from_slice(CROCKFORD_ALPHABET.as_bytes());

        Self { symbols }
    }

    fn encode(&self, value: u128) -> String {
        let mut rendered = [0_u8; ID_LENGTH];
        let mut rest = value;

        for slot in rendered.iter_mut().rev() {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "masked to the low five bits"
            )]
            let digit = (rest & 0x1f) as usize;

            #[expect(clippy::indexing_slicing, reason = "digit is always below 32")]
            {
                *slot = self.symbols[digit];
            }

            rest >>= 5;
        }

        rendered.iter().map(|symbol| char::from(*symbol)).collect()
    }

    fn contains(&self, symbol: u8) -> bool {
        self.symbols.binary_search(&symbol).is_ok()
    }

    /// Render the symbols back into a string.
    #[must_use]
    pub fn as_string(&self) -> String {
        self.symbols.iter().map(|symbol| char::from(*symbol)).collect()
    }
}

impl Default for IdAlphabet {
    fn default() -> Self {
        Self::crockford()
    }
}

/// Cart session identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartId(String);

impl CartId {
    /// The rendered id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CartId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CartId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Generates and validates cart identifiers for a fixed alphabet.
#[derive(Debug, Clone, Default)]
pub struct CartIdGenerator {
    alphabet: IdAlphabet,
}

impl CartIdGenerator {
    /// Generator rendering ids in `alphabet`.
    #[must_use]
    pub fn new(alphabet: IdAlphabet) -> Self {
        Self { alphabet }
    }

    /// Generate a fresh identifier.
    #[must_use]
    pub fn generate(&self) -> CartId {
        CartId(self.alphabet.encode(Uuid::now_v7().as_u128()))
    }

    /// Validate a client-supplied identifier.
    ///
    /// # Errors
    ///
    /// Returns an error when the length is wrong or a symbol is not part of
    /// the alphabet.
    pub fn parse(&self, raw: &str) -> Result<CartId, IdError> {
        if raw.len() != ID_LENGTH {
            return Err(IdError::Length(raw.chars().count()));
        }

        if !raw.bytes().all(|symbol| self.alphabet.contains(symbol)) {
            return Err(IdError::Symbol);
        }

        Ok(CartId(raw.to_string()))
    }
}
