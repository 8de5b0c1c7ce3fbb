//! String shape predicates backing the text-derived leaf types
//! ([`TypeDescriptor::Identifier`] and friends).
//!
//! Every predicate returns [`Ok`] or the full list of problems found, which the
//! type engine turns into the reason of a validation error.
//!
//! [`TypeDescriptor::Identifier`]: crate::types::TypeDescriptor::Identifier
use std::{fmt::Display, net::Ipv4Addr, sync::LazyLock};

use const_format::concatcp;
use regex::Regex;
use snafu::Snafu;

/// Maximum length of an object name, same as a DNS subdomain (RFC 1123).
const IDENTIFIER_MAX_LENGTH: usize = 253;

const IDENTIFIER_CHARS: &str = "a-z0-9.-";
const IDENTIFIER_FMT: &str = concatcp!("[", IDENTIFIER_CHARS, "]+");
const IDENTIFIER_ERROR_MSG: &str =
    "an identifier must consist of lower case alphanumeric characters, '-' or '.'";

const CASE_IDENTIFIER_FMT: &str = concatcp!("[A-Z", IDENTIFIER_CHARS, "]+");
const CASE_IDENTIFIER_ERROR_MSG: &str =
    "a case identifier must consist of alphanumeric characters, '-' or '.'";

const SYSTEM_IDENTIFIER_FMT: &str = concatcp!("[:", IDENTIFIER_CHARS, "]+");
const SYSTEM_IDENTIFIER_ERROR_MSG: &str =
    "a system identifier must consist of lower case alphanumeric characters, '-', '.' or ':'";

const ARN_PREFIXES: [&str; 2] = ["arn:aws:", "arn:aws-"];

const MEMORY_FMT: &str = r"[0-9]+(\.[0-9]+)?(Ki|Mi|Gi)";
const MEMORY_ERROR_MSG: &str = "a memory quantity must be a non-negative number followed by Ki, Mi or Gi";

const AWS_VOLUME_ID_FMT: &str = "vol-[0-9a-f]+";
const AWS_VOLUME_ID_ERROR_MSG: &str =
    "an EBS volume id must be 'vol-' followed by lower case hex digits";

// Lazily initialized regular expressions
static IDENTIFIER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{IDENTIFIER_FMT}$")).expect("failed to compile identifier regex")
});

static CASE_IDENTIFIER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{CASE_IDENTIFIER_FMT}$"))
        .expect("failed to compile case identifier regex")
});

static SYSTEM_IDENTIFIER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{SYSTEM_IDENTIFIER_FMT}$"))
        .expect("failed to compile system identifier regex")
});

static MEMORY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{MEMORY_FMT}$")).expect("failed to compile memory regex")
});

static AWS_VOLUME_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{AWS_VOLUME_ID_FMT}$")).expect("failed to compile EBS volume id regex")
});

type Result<T = (), E = Errors> = std::result::Result<T, E>;

/// A collection of errors discovered during validation.
#[derive(Debug)]
pub struct Errors(Vec<Error>);

impl Display for Errors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            let prefix = match i {
                0 => "",
                _ => ", ",
            };
            write!(f, "{prefix}{error}")?;
        }
        Ok(())
    }
}
impl std::error::Error for Errors {}

/// A single validation error.
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(transparent)]
    Regex { source: RegexError },

    #[snafu(display("input is empty but must contain at least one character"))]
    Empty,

    #[snafu(display("input is {length} characters long but must be no more than {max_length}"))]
    TooLong { length: usize, max_length: usize },

    #[snafu(display("a path must be empty or start with '/'"))]
    NotAbsolute,

    #[snafu(display("an ARN must start with one of {ARN_PREFIXES:?}"))]
    NotAnArn,

    #[snafu(display("input is not a dotted-quad IPv4 address"))]
    NotAnIpv4Address { source: std::net::AddrParseError },
}

#[derive(Debug)]
pub struct RegexError {
    /// The primary error message.
    msg: &'static str,

    /// The regex that the input must match.
    regex: &'static str,

    /// Examples of valid inputs (if non-empty).
    examples: &'static [&'static str],
}

impl Display for RegexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            msg,
            regex,
            examples,
        } = self;
        write!(f, "{msg} (")?;
        if !examples.is_empty() {
            for (i, example) in examples.iter().enumerate() {
                let prefix = match i {
                    0 => "e.g.",
                    _ => "or",
                };
                write!(f, "{prefix} {example:?}, ")?;
            }
        }
        write!(f, "regex used for validation is {regex:?})")
    }
}

impl std::error::Error for RegexError {}

/// Returns [`Ok`] if `value` is non-empty and its length fits within `max_length`.
fn validate_str_length(value: &str, max_length: usize) -> Result<(), Error> {
    let length = value.chars().count();
    if length == 0 {
        EmptySnafu.fail()
    } else if length > max_length {
        TooLongSnafu { length, max_length }.fail()
    } else {
        Ok(())
    }
}

/// Returns [`Ok`] if `value` matches `regex`.
fn validate_str_regex(
    value: &str,
    regex: &'static Regex,
    error_msg: &'static str,
    examples: &'static [&'static str],
) -> Result<(), Error> {
    if regex.is_match(value) {
        Ok(())
    } else {
        Err(RegexError {
            msg: error_msg,
            regex: regex
                .as_str()
                // Clean up start/end-of-line markers
                .trim_start_matches('^')
                .trim_end_matches('$'),
            examples,
        }
        .into())
    }
}

/// Returns [`Ok`] if *all* validations are [`Ok`], otherwise returns all errors.
fn validate_all(validations: impl IntoIterator<Item = Result<(), Error>>) -> Result {
    let errors = validations
        .into_iter()
        .filter_map(Result::err)
        .collect::<Vec<_>>();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Errors(errors))
    }
}

/// Tests for an object identifier: 1 to 253 characters of `a-z`, `0-9`, `.` and `-`.
pub fn is_identifier(value: &str) -> Result {
    validate_all([
        validate_str_length(value, IDENTIFIER_MAX_LENGTH),
        validate_str_regex(
            value,
            &IDENTIFIER_REGEX,
            IDENTIFIER_ERROR_MSG,
            &["my-app", "my-app.v1"],
        ),
    ])
}

/// Like [`is_identifier`], but upper case letters are allowed as well.
pub fn is_case_identifier(value: &str) -> Result {
    validate_all([
        validate_str_length(value, IDENTIFIER_MAX_LENGTH),
        validate_str_regex(
            value,
            &CASE_IDENTIFIER_REGEX,
            CASE_IDENTIFIER_ERROR_MSG,
            &["ServiceAccount", "SystemGroup"],
        ),
    ])
}

/// Like [`is_identifier`], but colons are allowed, as used in `system:` names.
pub fn is_system_identifier(value: &str) -> Result {
    validate_all([
        validate_str_length(value, IDENTIFIER_MAX_LENGTH),
        validate_str_regex(
            value,
            &SYSTEM_IDENTIFIER_REGEX,
            SYSTEM_IDENTIFIER_ERROR_MSG,
            &["system:serviceaccounts", "my-user"],
        ),
    ])
}

/// Tests for a filesystem path: either empty or absolute.
pub fn is_path(value: &str) -> Result {
    validate_all([if value.is_empty() || value.starts_with('/') {
        Ok(())
    } else {
        NotAbsoluteSnafu.fail()
    }])
}

/// Tests for an Amazon resource name.
pub fn is_arn(value: &str) -> Result {
    validate_all([if ARN_PREFIXES.iter().any(|p| value.starts_with(p)) {
        Ok(())
    } else {
        NotAnArnSnafu.fail()
    }])
}

/// Tests for a dotted-quad IPv4 address.
pub fn is_ipv4(value: &str) -> Result {
    validate_all([value
        .parse::<Ipv4Addr>()
        .map(|_| ())
        .map_err(|source| Error::NotAnIpv4Address { source })])
}

/// Tests for a storage quantity such as `512Mi` or `1.5Gi`.
pub fn is_memory(value: &str) -> Result {
    validate_all([validate_str_regex(
        value,
        &MEMORY_REGEX,
        MEMORY_ERROR_MSG,
        &["512Mi", "1.5Gi"],
    )])
}

/// Tests for an EBS volume id. The `aws://<zone>/vol-...` form is accepted,
/// only its last path segment is checked.
pub fn is_aws_volume_id(value: &str) -> Result {
    let id = match value.strip_prefix("aws://") {
        Some(url) => url.rsplit('/').next().unwrap_or_default(),
        None => value,
    };
    validate_all([validate_str_regex(
        id,
        &AWS_VOLUME_ID_REGEX,
        AWS_VOLUME_ID_ERROR_MSG,
        &["vol-0a1b2c3d", "aws://eu-west-1a/vol-0a1b2c3d"],
    )])
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("")]
    #[case("ABCDEF")]
    #[case("abc_def")]
    #[case("arn:aws:12345::::")]
    #[case("a b")]
    #[case(&"a".repeat(254))]
    fn is_identifier_fail(#[case] value: &str) {
        assert!(is_identifier(value).is_err());
    }

    #[rstest]
    #[case("my-foo-bar")]
    #[case("my-foo-bar0")]
    #[case("my-foo-bar0.1")]
    #[case(&"a".repeat(253))]
    fn is_identifier_pass(#[case] value: &str) {
        assert!(is_identifier(value).is_ok());
    }

    #[rstest]
    #[case("ServiceAccount", true)]
    #[case("Service_Account", false)]
    #[case("", false)]
    fn case_identifier(#[case] value: &str, #[case] ok: bool) {
        assert_eq!(is_case_identifier(value).is_ok(), ok);
    }

    #[rstest]
    #[case("system:serviceaccounts:team", true)]
    #[case("System:Users", false)]
    fn system_identifier(#[case] value: &str, #[case] ok: bool) {
        assert_eq!(is_system_identifier(value).is_ok(), ok);
    }

    #[rstest]
    #[case("foo:bar:12345")]
    #[case("::foo:bar:12345")]
    #[case("foo/bar/12345")]
    fn is_path_fail(#[case] value: &str) {
        assert!(is_path(value).is_err());
    }

    #[rstest]
    #[case("")]
    #[case("/a")]
    #[case("/a/b/c")]
    fn is_path_pass(#[case] value: &str) {
        assert!(is_path(value).is_ok());
    }

    #[rstest]
    #[case("arn:aws:iam:12345:....", true)]
    #[case("arn:aws-beijing:iam:12345:....", true)]
    #[case("arn:aws", false)]
    #[case("arn:aws1", false)]
    #[case("foo:bar:12345", false)]
    fn arn(#[case] value: &str, #[case] ok: bool) {
        assert_eq!(is_arn(value).is_ok(), ok);
    }

    #[rstest]
    #[case("10.0.0.1", true)]
    #[case("255.255.255.255", true)]
    #[case("256.0.0.1", false)]
    #[case("10.0.0", false)]
    fn ipv4(#[case] value: &str, #[case] ok: bool) {
        assert_eq!(is_ipv4(value).is_ok(), ok);
    }

    #[rstest]
    #[case("512Mi", true)]
    #[case("0.5Gi", true)]
    #[case("100Ki", true)]
    #[case("-1Gi", false)]
    #[case("1 Gi", false)]
    #[case("Gi", false)]
    #[case("1G", false)]
    fn memory(#[case] value: &str, #[case] ok: bool) {
        assert_eq!(is_memory(value).is_ok(), ok);
    }

    #[rstest]
    #[case("vol-0a1b2c", true)]
    #[case("aws://eu-west-1a/vol-0a1b2c", true)]
    #[case("vol-", false)]
    #[case("vol-XYZ", false)]
    #[case("volume-0a1b", false)]
    #[case("aws://eu-west-1a/", false)]
    fn aws_volume_id(#[case] value: &str, #[case] ok: bool) {
        assert_eq!(is_aws_volume_id(value).is_ok(), ok);
    }

    #[test]
    fn errors_are_joined() {
        let err = is_identifier(&"A".repeat(300)).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("must be no more than 253"));
        assert!(message.contains("lower case alphanumeric"));
    }
}
