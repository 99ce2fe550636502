/// Generate `as_str`, `Display`, `From<T> for String`, and `TryFrom<String> for T`
/// for a closed enum (unknown strings return an error).
///
/// The enum must already have its definition with derives. Add
/// `#[serde(into = "String", try_from = "String")]` to get Serialize/Deserialize
/// through these impls.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $str,)+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> Self {
                v.as_str().to_string()
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                $name::parse(&s).ok_or_else(|| format!("unknown {}: {s}", stringify!($name)))
            }
        }

        impl $name {
            /// Parse from the exact string form.
            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($str => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

/// Like [`string_enum!`] but with a named fallback variant carrying the raw
/// string, so unknown values map to `$fallback(s)` instead of failing.
///
/// Empty strings return an error.
macro_rules! string_enum_open {
    ($name:ident, $label:expr, $fallback:ident, { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $($name::$variant => $str,)+
                    $name::$fallback(s) => s,
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> Self {
                match v {
                    $name::$fallback(s) => s,
                    other => other.as_str().to_string(),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                match s.as_str() {
                    $($str => Ok($name::$variant),)+
                    "" => Err(format!("{} cannot be empty", $label)),
                    _ => Ok($name::$fallback(s)),
                }
            }
        }
    };
}
