// small helpers shared across modules

use std::fmt::Display;

// convert any displayable value to a string
pub fn as_str<T: Display>(value: T) -> String {
    value.to_string()
}
