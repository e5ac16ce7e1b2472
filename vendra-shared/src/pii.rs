use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A wrapper for sensitive data (shipping addresses, contact details) that
/// masks its value in Debug output and can be customized for Serialization.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Masked<T>(pub T);

impl<T: fmt::Display> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: fmt::Display> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // API responses and persistence need the real value; the wrapper
        // exists to prevent accidental leakage through log macros like
        // tracing::info!("{:?}", order).
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<T> for Masked<T> {
    fn from(value: T) -> Self {
        Masked(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_output_is_masked() {
        let address: Masked<String> = "12 Harbor Lane, Springfield".to_string().into();
        assert_eq!(format!("{:?}", address), "********");
        assert_eq!(format!("{}", address), "********");
    }

    #[test]
    fn test_serialization_passes_through() {
        let address: Masked<String> = "12 Harbor Lane".to_string().into();
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, "\"12 Harbor Lane\"");
    }
}
