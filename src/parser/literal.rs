//! Integer and string literal parsing.
//!
//! Integers are base 10 with an optional sign, or base 16 with a `0x`
//! prefix. Strings are double-quoted and expand later to one word per code
//! point.

use std::num::ParseIntError;
use std::str::FromStr;

use nom::branch::alt;
use nom::bytes::complete::{escaped_transform, tag_no_case, take_while1};
use nom::character::complete::{char, none_of};
use nom::combinator::{cut, map, map_res, opt, value};
use nom::{AsChar, IResult};

fn from_decimal(input: &str) -> Result<i64, ParseIntError> {
    i64::from_str(input)
}

fn from_hexadecimal(input: &str) -> Result<i64, ParseIntError> {
    i64::from_str_radix(input, 16)
}

fn parse_hexadecimal(input: &str) -> IResult<&str, i64> {
    let (input, _) = tag_no_case("0x")(input)?;
    cut(map_res(
        take_while1(|c: char| c.is_hex_digit()),
        from_hexadecimal,
    ))(input)
}

fn parse_decimal(input: &str) -> IResult<&str, i64> {
    map_res(take_while1(|c: char| c.is_dec_digit()), from_decimal)(input)
}

/// Parse a possibly-negative integer literal
pub(crate) fn parse_integer(input: &str) -> IResult<&str, i64> {
    let (input, sign) = opt(char('-'))(input)?;
    let (input, magnitude) = alt((parse_hexadecimal, parse_decimal))(input)?;
    let value = if sign.is_some() { -magnitude } else { magnitude };
    Ok((input, value))
}

/// Parse a double-quoted string literal with `\\`, `\"` and `\n` escapes
pub(crate) fn parse_string_literal(input: &str) -> IResult<&str, String> {
    let (input, _) = char('"')(input)?;
    let (input, string) = map(
        opt(escaped_transform(none_of("\"\\"), '\\', |input| {
            alt((
                value("\\", char('\\')),
                value("\"", char('"')),
                value("\n", char('n')),
            ))(input)
        })),
        Option::unwrap_or_default,
    )(input)?;
    let (input, _) = char('"')(input)?;
    Ok((input, string))
}
