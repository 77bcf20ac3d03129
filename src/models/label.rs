//! Correlation labels threaded through every call for diagnostics.

use std::borrow::Cow;
use std::fmt;

/// Opaque correlation tag. Carried into log fields only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(Cow<'static, str>);

impl Label {
    /// A label with a fixed, caller-chosen name.
    pub const fn named(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// A fresh label unique to this call.
    pub fn generate() -> Self {
        Self(Cow::Owned(format!("lbl_{}", uuid::Uuid::new_v4().simple())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

impl From<&'static str> for Label {
    fn from(value: &'static str) -> Self {
        Self::named(value)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
