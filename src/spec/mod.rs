//! Version specifier parsing.
//!
//! A version spec names an item and optionally pins a point in its history:
//!
//! ```text
//! spec  = name *(abs / shift)
//! abs   = "#" id / ":" label
//! shift = "~" [digits]          ; bare "~" means 1
//! ```
//!
//! - `/app/db#3` - version 3 of a parameter
//! - `api-key#6f1c2a9e...` - a secret version by ID
//! - `api-key:previous` - the secret version carrying the `previous` label
//! - `/app/db~` / `/app/db~2` - one / two versions before current
//! - `/app/db#7~1` - one version before version 7
//!
//! At most one absolute marker (`#` or `:`) is allowed. Shifts accumulate
//! (`~~` is 2) and may appear before or after the absolute marker. Which
//! absolute markers are accepted depends on the service's [`Scheme`].
//!
//! Resolution against remote history lives in the strategies; this module
//! only parses.

/// Characters that start a specifier component.
const MARKERS: [char; 3] = ['#', ':', '~'];

/// Versioning scheme of a remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Sequential numeric versions (`#<n>` only)
    Numeric,
    /// Opaque version IDs (`#<id>`) plus mutable labels (`:<label>`)
    Labeled,
}

impl Scheme {
    fn item(&self) -> &'static str {
        match self {
            Self::Numeric => "parameter",
            Self::Labeled => "secret",
        }
    }

    fn allowed_absolute(&self) -> &'static str {
        match self {
            Self::Numeric => "'#'",
            Self::Labeled => "'#' or ':'",
        }
    }
}

/// Errors from parsing a version specifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("name is empty")]
    EmptyName,

    #[error("'{marker}' must be followed by {expected}")]
    MissingValue { marker: char, expected: &'static str },

    #[error("only one of {allowed} may be given, found a second '{marker}'")]
    MultipleAbsolute { marker: char, allowed: &'static str },

    #[error("'{marker}' is not supported for {item}s")]
    Unsupported { marker: char, item: &'static str },

    #[error("invalid version '{value}' after '#': expected a positive integer")]
    InvalidVersion { value: String },

    #[error("invalid shift '{value}' after '~': expected a number")]
    InvalidShift { value: String },

    #[error("'{input}' must be a bare name without '#', ':' or '~'")]
    NotBareName { input: String },

    #[error("unexpected argument '{arg}': the second part of a version spec must start with '#', ':' or '~'")]
    UnexpectedArg { arg: String },

    #[error("expected 1 or 2 arguments for a version spec, got {count}")]
    ArgCount { count: usize },
}

/// The absolute point a spec pins in history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Absolute {
    /// No absolute component: the current version
    #[default]
    Current,
    /// Numeric version (numeric scheme)
    Version(u64),
    /// Opaque version ID (labeled scheme)
    Id(String),
    /// Stage label (labeled scheme)
    Label(String),
}

impl std::fmt::Display for Absolute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Current => write!(f, "current"),
            Self::Version(v) => write!(f, "#{}", v),
            Self::Id(id) => write!(f, "#{}", id),
            Self::Label(label) => write!(f, ":{}", label),
        }
    }
}

/// A parsed version specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSpec {
    pub name: String,
    pub absolute: Absolute,
    /// Versions to walk back from `absolute` (0 = none)
    pub shift: u32,
}

impl VersionSpec {
    /// Parse `input` for a service using `scheme`.
    pub fn parse(input: &str, scheme: Scheme) -> Result<Self, SpecError> {
        let start = input.find(is_marker).unwrap_or(input.len());
        let name = &input[..start];
        if name.is_empty() {
            return Err(SpecError::EmptyName);
        }

        let mut spec = VersionSpec {
            name: name.to_string(),
            absolute: Absolute::Current,
            shift: 0,
        };

        let mut rest = &input[start..];
        while let Some(marker) = rest.chars().next() {
            rest = &rest[marker.len_utf8()..];
            let end = rest.find(is_marker).unwrap_or(rest.len());
            let value = &rest[..end];
            rest = &rest[end..];

            match marker {
                '~' => {
                    let step = if value.is_empty() {
                        1
                    } else {
                        value.parse::<u32>().map_err(|_| SpecError::InvalidShift {
                            value: value.to_string(),
                        })?
                    };
                    spec.shift = spec.shift.checked_add(step).ok_or_else(|| {
                        SpecError::InvalidShift {
                            value: value.to_string(),
                        }
                    })?;
                }
                _ => {
                    spec.absolute = parse_absolute(marker, value, scheme, &spec.absolute)?;
                }
            }
        }

        Ok(spec)
    }

    /// True when the spec pins anything other than the current version.
    pub fn has_version(&self) -> bool {
        self.absolute != Absolute::Current || self.shift > 0
    }
}

fn is_marker(c: char) -> bool {
    MARKERS.contains(&c)
}

fn parse_absolute(
    marker: char,
    value: &str,
    scheme: Scheme,
    current: &Absolute,
) -> Result<Absolute, SpecError> {
    if scheme == Scheme::Numeric && marker == ':' {
        return Err(SpecError::Unsupported {
            marker,
            item: scheme.item(),
        });
    }

    if value.is_empty() {
        let expected = match (scheme, marker) {
            (Scheme::Numeric, _) => "a version number",
            (Scheme::Labeled, '#') => "a version ID",
            _ => "a label",
        };
        return Err(SpecError::MissingValue { marker, expected });
    }

    if *current != Absolute::Current {
        return Err(SpecError::MultipleAbsolute {
            marker,
            allowed: scheme.allowed_absolute(),
        });
    }

    match (scheme, marker) {
        (Scheme::Numeric, _) => match value.parse::<u64>() {
            Ok(v) if v > 0 => Ok(Absolute::Version(v)),
            _ => Err(SpecError::InvalidVersion {
                value: value.to_string(),
            }),
        },
        (Scheme::Labeled, '#') => Ok(Absolute::Id(value.to_string())),
        _ => Ok(Absolute::Label(value.to_string())),
    }
}

/// Parse a name that must not carry any specifier.
pub fn parse_name(input: &str) -> Result<String, SpecError> {
    if input.is_empty() {
        return Err(SpecError::EmptyName);
    }
    if input.contains(is_marker) {
        return Err(SpecError::NotBareName {
            input: input.to_string(),
        });
    }
    Ok(input.to_string())
}

/// Join a spec given as one or two command-line arguments.
///
/// `["/app/db", "#3"]` becomes `/app/db#3`. The second argument must start
/// with a marker character.
pub fn join_spec_args<S: AsRef<str>>(args: &[S]) -> Result<String, SpecError> {
    match args {
        [single] => Ok(single.as_ref().to_string()),
        [name, suffix] => {
            let suffix = suffix.as_ref();
            if suffix.starts_with(is_marker) {
                Ok(format!("{}{}", name.as_ref(), suffix))
            } else {
                Err(SpecError::UnexpectedArg {
                    arg: suffix.to_string(),
                })
            }
        }
        _ => Err(SpecError::ArgCount { count: args.len() }),
    }
}

/// Index reached by walking `shift` steps back from `start` in a newest-first
/// history of `len` entries, or `None` if that runs past the oldest entry.
pub fn shifted_index(start: usize, shift: u32, len: usize) -> Option<usize> {
    let index = start.checked_add(shift as usize)?;
    (index < len).then_some(index)
}
