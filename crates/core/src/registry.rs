//! Registry share codes.
//!
//! A share code is what a registry owner sends to guests: eight characters
//! from an alphabet without look-alikes (`0`/`O`, `1`/`I`), so codes survive
//! being read aloud or copied from a printed card.

use core::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Characters a share code is drawn from.
pub const SHARE_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Number of characters in a share code.
pub const SHARE_CODE_LENGTH: usize = 8;

/// Errors from parsing a share code.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ShareCodeError {
    /// Wrong number of characters.
    #[error("share code must be {SHARE_CODE_LENGTH} characters")]
    Length,
    /// Contains a character outside the alphabet.
    #[error("share code contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// A validated, upper-case registry share code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShareCode(String);

impl ShareCode {
    /// Draw a fresh random code.
    ///
    /// Uniqueness is enforced by the database; callers retry on conflict.
    #[must_use]
    pub fn generate<R: Rng>(rng: &mut R) -> Self {
        let code = (0..SHARE_CODE_LENGTH)
            .map(|_| {
                let idx = rng.random_range(0..SHARE_CODE_ALPHABET.len());
                char::from(SHARE_CODE_ALPHABET.get(idx).copied().unwrap_or(b'A'))
            })
            .collect();
        Self(code)
    }

    /// Parse user input: trims whitespace and accepts lower case.
    ///
    /// # Errors
    ///
    /// Returns [`ShareCodeError`] for a wrong length or unknown character.
    pub fn parse(input: &str) -> Result<Self, ShareCodeError> {
        let code = input.trim().to_ascii_uppercase();
        if code.chars().count() != SHARE_CODE_LENGTH {
            return Err(ShareCodeError::Length);
        }
        if let Some(bad) = code
            .chars()
            .find(|c| !c.is_ascii() || !SHARE_CODE_ALPHABET.contains(&(*c as u8)))
        {
            return Err(ShareCodeError::InvalidCharacter(bad));
        }
        Ok(Self(code))
    }

    /// The code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShareCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ShareCode {
    type Error = ShareCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ShareCode> for String {
    fn from(code: ShareCode) -> Self {
        code.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for ShareCode {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ShareCode {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for ShareCode {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0.as_str(), buf)
    }
}

/// Units of a registry item guests can still buy.
#[must_use]
pub const fn remaining(requested: i32, purchased: i32) -> i32 {
    let left = requested - purchased;
    if left < 0 { 0 } else { left }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_generate_uses_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let code = ShareCode::generate(&mut rng);
            assert_eq!(code.as_str().len(), SHARE_CODE_LENGTH);
            assert!(ShareCode::parse(code.as_str()).is_ok());
        }
    }

    #[test]
    fn test_parse_normalizes_input() {
        let code = ShareCode::parse("  abcd2345 ").unwrap();
        assert_eq!(code.as_str(), "ABCD2345");
    }

    #[test]
    fn test_parse_rejects_lookalikes_and_length() {
        assert_eq!(
            ShareCode::parse("ABCD0123"),
            Err(ShareCodeError::InvalidCharacter('0'))
        );
        assert_eq!(
            ShareCode::parse("ABCDEFGI"),
            Err(ShareCodeError::InvalidCharacter('I'))
        );
        assert_eq!(ShareCode::parse("ABC"), Err(ShareCodeError::Length));
        assert_eq!(ShareCode::parse("ABCDEFGHJ"), Err(ShareCodeError::Length));
    }

    #[test]
    fn test_remaining_never_negative() {
        assert_eq!(remaining(3, 1), 2);
        assert_eq!(remaining(3, 5), 0);
    }
}
