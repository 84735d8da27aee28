//! Helpers for closed string-backed enumerations.

/// Implements `as_str`, `ALL`, `Display` and `FromStr` for a fieldless enum
/// whose wire form is the variant name.
///
/// Parsing an unknown value fails with `DomainError::Argument` naming `$field`.
#[macro_export]
macro_rules! string_enum {
    ($t:ident, $field:literal, [$($variant:ident),+ $(,)?]) => {
        impl $t {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$t] = &[$($t::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($t::$variant => stringify!($variant)),+
                }
            }
        }

        impl ::core::fmt::Display for $t {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::core::str::FromStr for $t {
            type Err = $crate::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s == stringify!($variant) {
                        return Ok($t::$variant);
                    }
                )+
                Err($crate::DomainError::argument(
                    $field,
                    format!("unknown value `{}`", s),
                ))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    enum Colour {
        Red,
        DarkBlue,
    }

    crate::string_enum!(Colour, "colour", [Red, DarkBlue]);

    #[test]
    fn wire_form_matches_serde() {
        for colour in Colour::ALL {
            let json = serde_json::to_string(colour).unwrap();
            assert_eq!(json, format!("\"{}\"", colour.as_str()));
            assert_eq!(colour.as_str().parse::<Colour>().unwrap(), *colour);
        }
        assert!("Green".parse::<Colour>().is_err());
    }
}
