//! String conversions for fieldless domain enums
//!
//! Failure kinds, drain triggers and encoding choices appear in logs, config
//! files and the CLI as lowercase snake-case words. This macro derives the
//! matching `Display` and case-insensitive `FromStr` from one table.
//!
//! # Example
//!
//! ```rust
//! use tern_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Delivery {
//!     Sent,
//!     Queued,
//! }
//!
//! impl_domain_status_conversions!(Delivery {
//!     Sent => "sent",
//!     Queued => "queued",
//! });
//!
//! assert_eq!(Delivery::Queued.to_string(), "queued");
//! assert_eq!("SENT".parse::<Delivery>(), Ok(Delivery::Sent));
//! ```

/// Implements `Display` and `FromStr` for a fieldless enum.
///
/// Parsing lowercases the input first, so the string side of every mapping
/// must itself be lowercase. Unknown input yields `Err("Invalid <Enum>: ..")`.
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Channel {
        Loopback,
        RateLimited,
    }

    impl_domain_status_conversions!(Channel {
        Loopback => "loopback",
        RateLimited => "rate_limited",
    });

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(Channel::from_str("Rate_Limited"), Ok(Channel::RateLimited));
        assert_eq!(Channel::from_str("LOOPBACK"), Ok(Channel::Loopback));
        assert_eq!(Channel::RateLimited.to_string(), "rate_limited");
    }

    #[test]
    fn reports_unknown_values() {
        assert_eq!(Channel::from_str("carrier pigeon"), Err("Invalid Channel: carrier pigeon".into()));
        assert!(Channel::from_str("").is_err());
    }
}
