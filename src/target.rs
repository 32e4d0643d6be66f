use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::LaunchError;

static SCHEME_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(https?|ftps?)://").expect("scheme regex"));
static USERINFO_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@]+@").expect("userinfo regex"));
static TRAILING_PORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":(\d+)(?:/.*)?$").expect("port regex"));
static IPV4: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").expect("ipv4 regex"));
static LEADING_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+").expect("digits regex"));
static ILLEGAL_PATH_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>"/\\|?*]"#).expect("illegal chars regex"));
static EDGE_DOTS_SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[.\s]+|[.\s]+$").expect("edge trim regex"));
static SEPARATOR_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[._\s]+").expect("separator regex"));
static TRAILING_DOTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.+$").expect("trailing dots regex"));

/// Scheme the probe (and later the client config) will use, derived from
/// the resolved port: 443 means https, anything else http.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn standard_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host, port and scheme resolved from the raw target input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTarget {
    pub host: String,
    pub port: u16,
    pub scheme: Scheme,
    pub is_ip_address: bool,
}

/// Resolves a raw target string (URL, hostname or IP, with optional port
/// and path) into host, port and scheme.
///
/// The port decides the scheme, not the other way around: an explicit valid
/// port wins, otherwise 443 is assumed; 443 means https, everything else
/// http. Scheme prefixes and userinfo in the input are stripped before the
/// port is looked for, an out-of-range port falls back to the default, and
/// anything after the first slash is ignored.
pub fn parse_target_string(input: &str) -> Result<ParsedTarget, LaunchError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(LaunchError::Parse("target address is empty".into()));
    }

    let without_scheme = SCHEME_PREFIX.replace(trimmed, "");
    let stripped = USERINFO_PREFIX.replace(&without_scheme, "");
    log::debug!("target after scheme/userinfo strip: '{stripped}'");

    let mut port: u16 = 443;
    let host_part = match TRAILING_PORT.captures(&stripped) {
        Some(caps) => match caps[1].parse::<u32>() {
            Ok(explicit) if (1..=65535).contains(&explicit) => {
                port = explicit as u16;
                let full = caps.get(0).map(|m| m.start()).unwrap_or(stripped.len());
                stripped[..full].to_string()
            }
            Ok(explicit) => {
                log::warn!("port '{explicit}' is out of range, falling back to 443");
                stripped.to_string()
            }
            Err(_) => {
                log::warn!("could not parse port from '{}', falling back to 443", &caps[1]);
                stripped.to_string()
            }
        },
        None => stripped.to_string(),
    };

    let scheme = if port == 443 { Scheme::Https } else { Scheme::Http };

    let host = host_part
        .split('/')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    if host.is_empty() {
        return Err(LaunchError::Parse(format!(
            "could not extract a host from '{trimmed}'"
        )));
    }

    let is_ip_address = IPV4.is_match(&host)
        && host
            .split('.')
            .all(|octet| octet.parse::<u16>().map(|o| o <= 255).unwrap_or(false));

    log::debug!("parsed target: host='{host}' port={port} scheme={scheme} ip={is_ip_address}");
    Ok(ParsedTarget {
        host,
        port,
        scheme,
        is_ip_address,
    })
}

/// Compresses a dotted version string into the first digit of each of its
/// first three segments ("8.1.3.775" becomes "813"). When no digits can be
/// extracted at all the raw string is returned unchanged.
pub fn format_version(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let mut digits = String::new();
    for part in raw.split('.') {
        if let Some(m) = LEADING_DIGITS.find(part) {
            if let Some(first) = m.as_str().chars().next() {
                digits.push(first);
            }
        }
        if digits.len() == 3 {
            break;
        }
    }

    if digits.is_empty() {
        log::warn!("no digits found in version '{raw}', using it verbatim");
        return raw.to_string();
    }
    digits
}

/// Makes a string safe to use as a single Windows path component.
///
/// Colons become dashes (to keep host-port inputs readable), other illegal
/// characters become underscores, leading/trailing dots and spaces are
/// stripped, and runs of dots, underscores and spaces collapse into one
/// underscore. An input that sanitizes to nothing yields "default_name".
pub fn sanitize_for_path(input: &str) -> String {
    let sanitized = input.replace(':', "-");
    let sanitized = ILLEGAL_PATH_CHARS.replace_all(&sanitized, "_");
    let sanitized = EDGE_DOTS_SPACES.replace_all(&sanitized, "");
    let sanitized = SEPARATOR_RUNS.replace_all(&sanitized, "_");
    let sanitized = TRAILING_DOTS.replace_all(&sanitized, "");

    if sanitized.is_empty() {
        log::warn!("'{input}' sanitized to an empty string, using 'default_name'");
        return "default_name".to_string();
    }
    sanitized.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_defaults_to_https_443() {
        let target = parse_target_string("office.example.com").unwrap();
        assert_eq!(target.host, "office.example.com");
        assert_eq!(target.port, 443);
        assert_eq!(target.scheme, Scheme::Https);
        assert!(!target.is_ip_address);
    }

    #[test]
    fn explicit_port_decides_scheme() {
        let target = parse_target_string("10.20.30.40:8080").unwrap();
        assert_eq!(target.host, "10.20.30.40");
        assert_eq!(target.port, 8080);
        assert_eq!(target.scheme, Scheme::Http);
        assert!(target.is_ip_address);

        let target = parse_target_string("10.20.30.40:443").unwrap();
        assert_eq!(target.scheme, Scheme::Https);
    }

    #[test]
    fn scheme_userinfo_and_path_are_stripped() {
        let target = parse_target_string("https://user:pw@back.example.com:9080/resto/").unwrap();
        assert_eq!(target.host, "back.example.com");
        assert_eq!(target.port, 9080);
        assert_eq!(target.scheme, Scheme::Http);

        let target = parse_target_string("HTTP://back.example.com/some/path").unwrap();
        assert_eq!(target.host, "back.example.com");
        assert_eq!(target.port, 443);
    }

    #[test]
    fn out_of_range_port_falls_back_to_default() {
        let target = parse_target_string("back.example.com:70000").unwrap();
        assert_eq!(target.port, 443);
        assert_eq!(target.scheme, Scheme::Https);
        // The bogus port suffix stays glued to the host, as in a host-only
        // parse of the unmodified string.
        assert_eq!(target.host, "back.example.com:70000");
    }

    #[test]
    fn empty_or_hostless_input_is_a_parse_error() {
        assert!(matches!(
            parse_target_string("   "),
            Err(LaunchError::Parse(_))
        ));
        assert!(matches!(
            parse_target_string("https://"),
            Err(LaunchError::Parse(_))
        ));
    }

    #[test]
    fn ipv4_detection_validates_octets() {
        assert!(parse_target_string("192.168.1.1").unwrap().is_ip_address);
        assert!(!parse_target_string("999.168.1.1").unwrap().is_ip_address);
        assert!(!parse_target_string("server.local").unwrap().is_ip_address);
    }

    #[test]
    fn version_takes_first_digit_of_first_three_segments() {
        assert_eq!(format_version("8.1.3.775"), "813");
        assert_eq!(format_version("12.3.4"), "134");
        assert_eq!(format_version("9.0"), "90");
    }

    #[test]
    fn version_edge_cases() {
        assert_eq!(format_version(""), "");
        assert_eq!(format_version("beta"), "beta");
        assert_eq!(format_version("8.x.3"), "83");
    }

    #[test]
    fn sanitize_replaces_and_collapses() {
        assert_eq!(sanitize_for_path("10.0.0.1:443"), "10_0_0_1-443");
        assert_eq!(sanitize_for_path("a<b>c|d"), "a_b_c_d");
        assert_eq!(sanitize_for_path("  .name.  "), "name");
        assert_eq!(sanitize_for_path("a...b   c"), "a_b_c");
    }

    #[test]
    fn sanitize_never_returns_empty() {
        assert_eq!(sanitize_for_path("..."), "default_name");
        assert_eq!(sanitize_for_path(""), "default_name");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for input in [
            "10.0.0.1:443",
            "a<b>c|d",
            "  .name.  ",
            "a...b   c",
            "back.example.com",
            "...",
            "",
        ] {
            let once = sanitize_for_path(input);
            assert_eq!(sanitize_for_path(&once), once, "input '{input}'");
        }
    }
}
