use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// First/last name pair derived from a single full-name string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    pub first_name: String,
    pub last_name: String,
}

/// Splits a full name at the first run of whitespace.
///
/// The first word becomes the first name and every remaining word, joined by
/// single spaces, becomes the last name. A single word yields an empty last
/// name. Blank input is rejected since it would erase an existing name.
pub fn split_full_name(full_name: &str) -> Result<PersonName> {
    let mut words = full_name.split_whitespace();
    let first_name = words
        .next()
        .ok_or_else(|| CoreError::invalid_value("full_name", "name is empty"))?
        .to_string();
    let last_name = words.collect::<Vec<_>>().join(" ");
    Ok(PersonName {
        first_name,
        last_name,
    })
}
