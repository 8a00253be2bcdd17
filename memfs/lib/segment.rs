use std::{
    borrow::Borrow,
    fmt::{self, Display},
    str::FromStr,
};

use crate::FsError;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The maximum length of a single name in bytes.
pub const MAX_NAME_LEN: usize = 255;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A single directory entry name.
///
/// Names are case-sensitive and may begin with `.` or contain arbitrary characters, except that
/// they can't be empty, be `.` or `..`, contain a `/` or a NUL byte, or exceed [`MAX_NAME_LEN`]
/// bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathSegment(String);

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PathSegment {
    /// Returns the string representation of the segment.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the bytes representation of the segment.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Returns the length of the segment in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the segment is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromStr for PathSegment {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PathSegment::try_from(s)
    }
}

impl Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for PathSegment {
    type Error = FsError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(FsError::EmptyPathSegment);
        }

        if value.len() > MAX_NAME_LEN {
            return Err(FsError::NameTooLong(value.len()));
        }

        if value == "." || value == ".." || value.contains(['/', '\0']) {
            return Err(FsError::InvalidPathComponent(value.to_string()));
        }

        Ok(PathSegment(value.to_string()))
    }
}

impl TryFrom<String> for PathSegment {
    type Error = FsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PathSegment::try_from(value.as_str())
    }
}

impl AsRef<str> for PathSegment {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for PathSegment {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl From<PathSegment> for String {
    fn from(segment: PathSegment) -> Self {
        segment.0
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
