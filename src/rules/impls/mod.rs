//! Concrete rules, one module per settings key family.

pub mod actions;
pub mod auth_key;
pub mod external_authentication;
pub mod groups_provider;
pub mod headers;
pub mod hosts;
pub mod indices;
pub mod indices_rewrite;
pub mod max_body_length;
pub mod methods;
pub mod proxy_auth;
pub mod uri_re;
pub mod users;
pub mod x_forwarded_for;

use std::net::IpAddr;

use ipnet::IpNet;

pub(crate) const X_FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";

/// An address entry of `hosts` or `x_forwarded_for`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AddressPattern {
    Network(IpNet),
    Ip(IpAddr),
    /// Anything that is not an IP, compared literally and case-insensitively.
    Name(String),
}

impl AddressPattern {
    pub(crate) fn parse(entry: &str) -> Self {
        let entry = entry.trim();
        if let Ok(net) = entry.parse::<IpNet>() {
            return Self::Network(net);
        }
        if let Ok(ip) = entry.parse::<IpAddr>() {
            return Self::Ip(ip);
        }
        Self::Name(entry.to_string())
    }

    pub(crate) fn matches(
        &self,
        address: &str,
    ) -> bool {
        let address = address.trim();
        match self {
            Self::Network(net) => address
                .parse::<IpAddr>()
                .map(|ip| net.contains(&ip))
                .unwrap_or(false),
            Self::Ip(ip) => address.parse::<IpAddr>().map(|a| a == *ip).unwrap_or(false),
            Self::Name(name) => name.eq_ignore_ascii_case(address),
        }
    }
}

/// First entry of an `X-Forwarded-For` value: the originating client.
pub(crate) fn first_forwarded_for(value: &str) -> Option<&str> {
    value
        .split(',')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("10.0.0.0/8", "10.1.2.3", true)]
    #[case("10.0.0.0/8", "11.1.2.3", false)]
    #[case("192.168.1.10", "192.168.1.10", true)]
    #[case("192.168.1.10", "192.168.1.11", false)]
    #[case("::1", "::1", true)]
    #[case("fd00::/8", "fd12::1", true)]
    #[case("localhost", "LOCALHOST", true)]
    #[case("10.0.0.0/8", "not-an-ip", false)]
    fn test_address_pattern(
        #[case] pattern: &str,
        #[case] address: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(AddressPattern::parse(pattern).matches(address), expected);
    }

    #[test]
    fn test_first_forwarded_for() {
        assert_eq!(first_forwarded_for("1.2.3.4, 5.6.7.8"), Some("1.2.3.4"));
        assert_eq!(first_forwarded_for(" 1.2.3.4 "), Some("1.2.3.4"));
        assert_eq!(first_forwarded_for(""), None);
    }
}
