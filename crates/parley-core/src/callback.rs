//! Inline-button callback data codec.
//!
//! Buttons emitted by handlers carry their intent as a small string of the
//! form `query:<key> , value:<value>`. The callback filter in the router
//! decodes that string again when the button is pressed, so the two sides
//! must agree on this exact layout.
//!
//! ```
//! use parley_core::CallbackData;
//!
//! let data = CallbackData::try_new("add_to_cart", "pizza-42").unwrap();
//! assert_eq!(data.encode().unwrap(), "query:add_to_cart , value:pizza-42");
//! assert_eq!("query:add_to_cart , value:pizza-42".parse::<CallbackData>().unwrap(), data);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CallbackParseError;

const QUERY_PREFIX: &str = "query:";
const VALUE_SEPARATOR: &str = " , value:";

/// Decoded callback data of an inline button.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallbackData {
    /// The routing key matched by callback filters.
    pub query: String,
    /// Free-form argument; may be empty and may contain any text.
    pub value: String,
}

impl CallbackData {
    /// Builds callback data without checking the key. Use
    /// [`try_new`](Self::try_new) for keys that are not literals.
    pub fn new(query: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            value: value.into(),
        }
    }

    /// Builds callback data whose encoding decodes back to it.
    pub fn try_new(
        query: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, CallbackParseError> {
        let data = Self::new(query, value);
        data.check_query()?;
        Ok(data)
    }

    /// The key may hold any text except the separator. The value is
    /// unrestricted since decoding splits at the first separator.
    fn check_query(&self) -> Result<(), CallbackParseError> {
        if self.query.is_empty() {
            Err(CallbackParseError::EmptyQuery)
        } else if self.query.contains(VALUE_SEPARATOR) {
            Err(CallbackParseError::SeparatorInQuery)
        } else {
            Ok(())
        }
    }

    /// Encodes this callback data into its wire form, refusing keys that
    /// would not decode back to the same data.
    pub fn encode(&self) -> Result<String, CallbackParseError> {
        self.check_query()?;
        Ok(self.to_string())
    }

    /// Decodes a wire payload.
    ///
    /// The key ends at the first separator; everything after it belongs to
    /// the value.
    pub fn parse(raw: &str) -> Result<Self, CallbackParseError> {
        let rest = raw
            .strip_prefix(QUERY_PREFIX)
            .ok_or(CallbackParseError::MissingQuery)?;
        let (query, value) = rest
            .split_once(VALUE_SEPARATOR)
            .ok_or(CallbackParseError::MissingValue)?;
        if query.is_empty() {
            return Err(CallbackParseError::EmptyQuery);
        }
        Ok(Self::new(query, value))
    }
}

/// The raw wire layout, with no check on the key.
impl fmt::Display for CallbackData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{QUERY_PREFIX}{}{VALUE_SEPARATOR}{}", self.query, self.value)
    }
}

impl FromStr for CallbackData {
    type Err = CallbackParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
