//! Identity newtypes shared by every device-facing module.

use crate::{Error, ThisError};
use derive_more::{Deref, Display};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

///
/// IdError
///

#[derive(Debug, Eq, PartialEq, ThisError)]
pub enum IdError {
    #[error("invalid component name '{0}', expected 'package/class'")]
    InvalidComponent(String),

    #[error("invalid package name '{0}'")]
    InvalidPackage(String),

    #[error("invalid numeric id '{0}'")]
    InvalidNumber(String),
}

impl From<IdError> for Error {
    fn from(err: IdError) -> Self {
        Self::assertion(err.to_string())
    }
}

// first byte must be a letter, the rest may be alphanumeric or underscore
const fn is_pkg_component(s: &[u8]) -> bool {
    let [first, rest @ ..] = s else {
        return false;
    };
    if !first.is_ascii_alphabetic() {
        return false;
    }

    let mut i = 0;
    while i < rest.len() {
        let b = rest[i];
        if !(b.is_ascii_alphanumeric() || b == b'_') {
            return false;
        }
        i += 1;
    }

    true
}

///
/// PackageName
///
/// Dotted application id, at least two components. The framework package
/// `android` is the one single-component name accepted.
///

#[derive(Clone, Debug, Deref, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct PackageName(String);

impl PackageName {
    pub const FRAMEWORK: &'static str = "android";

    pub fn new(name: impl Into<String>) -> Result<Self, IdError> {
        let name = name.into();
        if Self::is_valid(&name) {
            Ok(Self(name))
        } else {
            Err(IdError::InvalidPackage(name))
        }
    }

    #[must_use]
    pub fn is_valid(name: &str) -> bool {
        if name == Self::FRAMEWORK {
            return true;
        }

        let mut components = name.split('.');
        for _ in 0..2 {
            if !components
                .next()
                .is_some_and(|comp| is_pkg_component(comp.as_bytes()))
            {
                return false;
            }
        }

        components.all(|comp| is_pkg_component(comp.as_bytes()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for PackageName {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for PackageName {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;

        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

///
/// UserId
///

#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct UserId(pub u32);

impl UserId {
    pub const SYSTEM: Self = Self(0);
}

impl FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse()
            .map(Self)
            .map_err(|_| IdError::InvalidNumber(s.to_string()))
    }
}

///
/// SessionId
/// Install session id as reported by `pm install-create`.
///

#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(transparent)]
pub struct SessionId(pub u32);

impl FromStr for SessionId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse()
            .map(Self)
            .map_err(|_| IdError::InvalidNumber(s.to_string()))
    }
}

///
/// ComponentName
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ComponentName {
    pub package: PackageName,
    pub class: String,
}

impl ComponentName {
    /// Build a component; a class starting with `.` is relative to `package`.
    pub fn new(package: PackageName, class: impl Into<String>) -> Self {
        let class = class.into();
        let class = if class.starts_with('.') {
            format!("{package}{class}")
        } else {
            class
        };

        Self { package, class }
    }

    /// Parse the `package/class` form used by `am` and `ime`.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let (package, class) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| IdError::InvalidComponent(s.to_string()))?;
        if class.is_empty() {
            return Err(IdError::InvalidComponent(s.to_string()));
        }

        Ok(Self::new(PackageName::new(package)?, class))
    }

    /// `package/class` with the class written out in full.
    #[must_use]
    pub fn flatten(&self) -> String {
        format!("{}/{}", self.package, self.class)
    }

    /// `package/.Class` when the class lives under the package, else `flatten`.
    #[must_use]
    pub fn flatten_short(&self) -> String {
        match self.class.strip_prefix(self.package.as_str()) {
            Some(rest) if rest.starts_with('.') => format!("{}/{rest}", self.package),
            _ => self.flatten(),
        }
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.flatten())
    }
}

impl FromStr for ComponentName {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_package_names() {
        for name in [
            "", ".", "a", "a.", ".a", "1.a", "a.1", "_a.b", "com..x", "com.ex-ample", "com. x",
        ] {
            assert!(PackageName::new(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn valid_package_names() {
        for name in [
            "android",
            "x.X",
            "com.android.cts.install.lib.testapp.A",
            "com.github.w1nst0n",
            "this_.String_.is_.not_.real_",
        ] {
            assert!(PackageName::new(name).is_ok(), "{name:?} should be accepted");
        }
    }

    #[test]
    fn component_shorthand_resolves_against_package() {
        let cmp = ComponentName::parse("com.example.app/.MainActivity").unwrap();

        assert_eq!(cmp.class, "com.example.app.MainActivity");
        assert_eq!(cmp.flatten(), "com.example.app/com.example.app.MainActivity");
        assert_eq!(cmp.flatten_short(), "com.example.app/.MainActivity");
    }

    #[test]
    fn component_without_class_is_rejected() {
        assert!(ComponentName::parse("com.example.app/").is_err());
        assert!(ComponentName::parse("com.example.app").is_err());
    }

    #[test]
    fn numeric_ids_trim_whitespace() {
        assert_eq!(" 10 \n".parse::<UserId>().unwrap(), UserId(10));
        assert_eq!("12345".parse::<SessionId>().unwrap(), SessionId(12345));
        assert!("ten".parse::<UserId>().is_err());
    }
}
