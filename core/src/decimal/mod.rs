//! PICTURE clauses and fixed-point decoding for `COMP-4` fields.
//!
//! Decoding is pure: the functions here return a [`DecodeError`] and leave it
//! to the declaration pass to turn that into a positioned diagnostic.


use core::fmt;

use num_bigint::BigInt;
use num_traits::Zero;
use tracing::trace;

use crate::options::FractionPolicy;

/// Most significant digits a `COMP-4` value may hold.
pub const MAX_COMP4_DIGITS: u32 = 18;

/// One run of a PICTURE clause, e.g. `9(5)` is `{ character: '9', size: 5 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PictureSegment {
    pub character: char,
    pub size: u32,
}

impl PictureSegment {
    pub fn new(character: char, size: u32) -> Self {
        Self { character, size }
    }

    /// Expand the textual form (`S9(5)V99`, `X(10)`) into merged segments.
    ///
    /// A repeat count that is not a positive integer, or a `(` without its
    /// `)`, is [`DecodeError::Malformed`].
    pub fn expand(text: &str) -> Result<Vec<PictureSegment>, DecodeError> {
        let mut segments = Vec::new();
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            let mut size = 1;
            if chars.peek() == Some(&'(') {
                chars.next();
                let mut count = String::new();
                loop {
                    match chars.next() {
                        Some(')') => break,
                        Some(digit) => count.push(digit),
                        None => return Err(DecodeError::Malformed),
                    }
                }
                size = match count.trim().parse() {
                    Ok(n) if n > 0 => n,
                    _ => return Err(DecodeError::Malformed),
                };
            }
            segments.push(PictureSegment::new(c.to_ascii_uppercase(), size));
        }
        Ok(merge_segments(segments))
    }
}

impl fmt::Display for PictureSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.size == 1 {
            write!(f, "{}", self.character)
        } else {
            write!(f, "{}({})", self.character, self.size)
        }
    }
}

/// Merge adjacent segments with the same character: `9 9(3) V 9` becomes `9(4) V 9`.
pub fn merge_segments(segments: Vec<PictureSegment>) -> Vec<PictureSegment> {
    let mut merged: Vec<PictureSegment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match merged.last_mut() {
            Some(last) if last.character == segment.character => last.size += segment.size,
            _ => merged.push(segment),
        }
    }
    merged
}

/// A decimal number as `value / 10^scale`, with `precision` significant digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FixedPoint {
    pub precision: u32,
    pub scale: u32,
    pub value: BigInt,
}

impl FixedPoint {
    pub fn zero(precision: u32, scale: u32) -> Self {
        Self {
            precision,
            scale,
            value: BigInt::zero(),
        }
    }

    /// Decimal digits of the scaled value, with a leading `-` when negative.
    pub fn digits(&self) -> String {
        self.value.to_string()
    }
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}.{}", self.value, self.precision, self.scale)
    }
}

/// Decoded shape and default of a `COMP-4` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comp4Field {
    pub signed: bool,
    pub precision: u32,
    pub scale: u32,
    /// Scaled default value; `None` when the field has no default.
    pub value: Option<BigInt>,
}

impl Comp4Field {
    /// The field's initial value, zero when it has no default.
    pub fn initial_value(&self) -> FixedPoint {
        FixedPoint {
            precision: self.precision,
            scale: self.scale,
            value: self.value.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// More significant digits than the declared (or maximum) precision.
    TooBig,
    /// Negative value for an unsigned PICTURE.
    BadSign,
    /// Not a decimal number.
    Malformed,
    /// More fractional digits than the PICTURE scale, under [`FractionPolicy::Reject`].
    ExcessFraction,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::TooBig => write!(f, "value does not fit the declared precision"),
            DecodeError::BadSign => write!(f, "negative value for an unsigned picture"),
            DecodeError::Malformed => write!(f, "not a decimal number"),
            DecodeError::ExcessFraction => {
                write!(f, "more fractional digits than the picture allows")
            }
        }
    }
}

/// Sign and digit parts of a decimal literal.
struct Literal<'a> {
    negative: bool,
    integer: &'a str,
    fraction: &'a str,
}

fn split_literal(text: &str) -> Result<Literal<'_>, DecodeError> {
    let text = text.trim();
    let (negative, unsigned) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let (integer, fraction) = match unsigned.split_once('.') {
        Some((integer, fraction)) => (integer, fraction),
        None => (unsigned, ""),
    };
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if integer.len() + fraction.len() == 0 || !all_digits(integer) || !all_digits(fraction) {
        return Err(DecodeError::Malformed);
    }
    Ok(Literal {
        negative,
        integer,
        fraction,
    })
}

fn parse_digits(digits: &str, negative: bool) -> Result<BigInt, DecodeError> {
    let magnitude: BigInt = digits.parse().map_err(|_| DecodeError::Malformed)?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Check that `text` is a decimal number; used for `COMP-2` defaults.
pub fn validate_number(text: &str) -> Result<(), DecodeError> {
    split_literal(text).map(|_| ())
}

/// Decode a numeric literal on its own: precision is its digit count and
/// scale its fractional digit count.
pub fn decode_literal(text: &str) -> Result<FixedPoint, DecodeError> {
    let literal = split_literal(text)?;
    let digits = [literal.integer, literal.fraction].concat();
    if digits.len() > MAX_COMP4_DIGITS as usize {
        return Err(DecodeError::TooBig);
    }
    Ok(FixedPoint {
        precision: digits.len() as u32,
        scale: literal.fraction.len() as u32,
        value: parse_digits(&digits, literal.negative)?,
    })
}

/// Decode a `COMP-4` field from its (merged) PICTURE and optional default.
///
/// With a PICTURE, precision is the number of `9` positions and scale the
/// number after `V`. The default is aligned to the most significant digit of
/// that precision: `9(5)V99` with `123.45` gives `1234500`.
///
/// Without a PICTURE the shape comes from the literal itself, and a field
/// with neither is a signed single digit.
pub fn decode_comp4(
    picture: Option<&[PictureSegment]>,
    literal: Option<&str>,
    policy: FractionPolicy,
) -> Result<Comp4Field, DecodeError> {
    let Some(picture) = picture else {
        return Ok(match literal {
            None => Comp4Field {
                signed: true,
                precision: 1,
                scale: 0,
                value: None,
            },
            Some(text) => {
                let fixed = decode_literal(text)?;
                Comp4Field {
                    signed: text.trim_start().starts_with('-'),
                    precision: fixed.precision,
                    scale: fixed.scale,
                    value: Some(fixed.value),
                }
            }
        });
    };

    let signed = picture.first().is_some_and(|s| s.character == 'S');
    let mut integer_digits = 0;
    let mut scale = 0;
    let mut after_point = false;
    for segment in picture {
        match segment.character {
            'V' => after_point = true,
            '9' if after_point => scale += segment.size,
            '9' => integer_digits += segment.size,
            _ => {}
        }
    }
    let precision = integer_digits + scale;

    let Some(text) = literal else {
        return Ok(Comp4Field {
            signed,
            precision,
            scale,
            value: None,
        });
    };

    let literal = split_literal(text)?;
    if literal.negative && !signed {
        return Err(DecodeError::BadSign);
    }

    let mut fraction = literal.fraction.to_string();
    if fraction.len() > scale as usize {
        match policy {
            FractionPolicy::Truncate => {
                trace!(literal = text, scale, "Truncating fractional digits");
                fraction.truncate(scale as usize);
            }
            FractionPolicy::Reject => return Err(DecodeError::ExcessFraction),
        }
    }
    while fraction.len() < scale as usize {
        fraction.push('0');
    }

    let digits = [literal.integer, fraction.as_str()].concat();
    if digits.len() > precision as usize {
        return Err(DecodeError::TooBig);
    }

    let shift = precision as usize - digits.len();
    let value = parse_digits(&digits, literal.negative)? * num_traits::pow(BigInt::from(10), shift);
    Ok(Comp4Field {
        signed,
        precision,
        scale,
        value: Some(value),
    })
}
