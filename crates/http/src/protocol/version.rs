//! HTTP version token parsing.
//!
//! The request line carries its protocol version as `HTTP/<major>.<minor>`. Both
//! components are plain decimal digit runs; anything else, including a sign,
//! surrounding whitespace or trailing bytes, is rejected.

use std::fmt;
use std::str::FromStr;

use crate::protocol::ParseError;

const PREFIX: &str = "HTTP/";

/// Longest accepted digit run for either version component; longer runs are
/// treated as overflow.
const MAX_COMPONENT_DIGITS: usize = 3;

/// A parsed `HTTP/<major>.<minor>` protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HttpVersion {
    major: u32,
    minor: u32,
}

impl HttpVersion {
    pub const HTTP_10: HttpVersion = HttpVersion { major: 1, minor: 0 };
    pub const HTTP_11: HttpVersion = HttpVersion { major: 1, minor: 1 };

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parses a version token such as `HTTP/1.1`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidVersion`] when the `HTTP/` prefix is missing,
    /// when a component is empty or contains anything but ASCII digits, when
    /// bytes trail the minor version, or when a component has more than three
    /// digits.
    pub fn parse(token: &str) -> Result<Self, ParseError> {
        // fast path for the versions seen in practice
        match token {
            "HTTP/1.1" => return Ok(Self::HTTP_11),
            "HTTP/1.0" => return Ok(Self::HTTP_10),
            _ => {}
        }

        let rest = token.strip_prefix(PREFIX).ok_or_else(|| ParseError::invalid_version(token))?;
        let (major, minor) = rest.split_once('.').ok_or_else(|| ParseError::invalid_version(token))?;

        let major = parse_component(major).ok_or_else(|| ParseError::invalid_version(token))?;
        let minor = parse_component(minor).ok_or_else(|| ParseError::invalid_version(token))?;

        Ok(Self { major, minor })
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// The `(major, minor)` pair
    pub fn as_tuple(&self) -> (u32, u32) {
        (self.major, self.minor)
    }

    /// Whether a message of this version keeps the connection open by default.
    pub fn is_persistent_by_default(&self) -> bool {
        *self >= Self::HTTP_11
    }

    /// Maps onto the `http` crate's version type when it has a matching constant.
    pub fn to_http(self) -> Option<http::Version> {
        match self.as_tuple() {
            (0, 9) => Some(http::Version::HTTP_09),
            (1, 0) => Some(http::Version::HTTP_10),
            (1, 1) => Some(http::Version::HTTP_11),
            (2, 0) => Some(http::Version::HTTP_2),
            (3, 0) => Some(http::Version::HTTP_3),
            _ => None,
        }
    }
}

/// Parses a run of ASCII digits, `None` on any other byte, on an empty run or
/// on a run longer than [`MAX_COMPONENT_DIGITS`].
fn parse_component(digits: &str) -> Option<u32> {
    if digits.is_empty() || digits.len() > MAX_COMPONENT_DIGITS {
        return None;
    }

    digits.bytes().try_fold(0u32, |value, b| b.is_ascii_digit().then(|| value * 10 + u32::from(b - b'0')))
}

/// Parses an HTTP version token into its `(major, minor)` pair.
///
/// # Errors
///
/// See [`HttpVersion::parse`].
pub fn parse_version(token: &str) -> Result<(u32, u32), ParseError> {
    HttpVersion::parse(token).map(|version| version.as_tuple())
}

impl FromStr for HttpVersion {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<http::Version> for HttpVersion {
    type Error = ParseError;

    fn try_from(version: http::Version) -> Result<Self, Self::Error> {
        Ok(match version {
            http::Version::HTTP_09 => HttpVersion::new(0, 9),
            http::Version::HTTP_10 => HttpVersion::HTTP_10,
            http::Version::HTTP_11 => HttpVersion::HTTP_11,
            http::Version::HTTP_2 => HttpVersion::new(2, 0),
            http::Version::HTTP_3 => HttpVersion::new(3, 0),
            v => return Err(ParseError::invalid_version(format!("{v:?}"))),
        })
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}.{}", self.major, self.minor)
    }
}
