use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{Error, Result};

use super::accessor::ProcessMemory;

/// An address written either absolutely (`0x7FF6A000`) or relative to a
/// module (`game.exe+0x1A2B`, `engine.dll-0x10`, `game.exe`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum AddressExpr {
    Absolute(u64),
    Module { module: String, offset: i64 },
}

impl AddressExpr {
    pub fn resolve<M: ProcessMemory + ?Sized>(&self, mem: &M) -> Result<u64> {
        match self {
            Self::Absolute(address) => Ok(*address),
            Self::Module { module, offset } => {
                let info = mem
                    .find_module(module)
                    .ok_or_else(|| Error::ModuleNotFound(module.clone()))?;
                Ok(info.base.wrapping_add_signed(*offset))
            }
        }
    }
}

/// Parse `0x`-prefixed hex or plain decimal
pub fn parse_number(text: &str) -> Option<u64> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16).ok(),
        None => text.replace('_', "").parse().ok(),
    }
}

/// Parse a signed offset: `0x10`, `-0x10`, `16`, `-16`
pub fn parse_offset(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, magnitude) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let magnitude = i64::try_from(parse_number(magnitude)?).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

impl FromStr for AddressExpr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidAddress("empty address".to_string()));
        }
        if let Some(address) = parse_number(s) {
            return Ok(Self::Absolute(address));
        }

        let (module, offset) = match s.rfind(['+', '-']) {
            Some(pos) if pos > 0 => match parse_offset(&s[pos..]) {
                Some(offset) => (s[..pos].trim(), offset),
                // A dash that is not followed by a number is part of the name
                None if s[pos..].starts_with('-') => (s, 0),
                None => return Err(Error::InvalidAddress(format!("bad offset in {s:?}"))),
            },
            _ => (s, 0),
        };

        let bad_start = |c: char| c.is_ascii_digit() || c == '+' || c == '-';
        if module.is_empty() || module.starts_with(bad_start) {
            return Err(Error::InvalidAddress(format!("bad module name in {s:?}")));
        }

        Ok(Self::Module {
            module: module.to_string(),
            offset,
        })
    }
}

impl TryFrom<String> for AddressExpr {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for AddressExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute(address) => write!(f, "{address:#x}"),
            Self::Module { module, offset: 0 } => write!(f, "{module}"),
            Self::Module { module, offset } if *offset < 0 => {
                write!(f, "{module}-{:#x}", offset.unsigned_abs())
            }
            Self::Module { module, offset } => write!(f, "{module}+{offset:#x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::mock::MockMemoryBuilder;

    #[test]
    fn test_parse_absolute() {
        assert_eq!(
            "0x7FF6A000".parse::<AddressExpr>().unwrap(),
            AddressExpr::Absolute(0x7FF6_A000)
        );
        assert_eq!("4096".parse::<AddressExpr>().unwrap(), AddressExpr::Absolute(4096));
    }

    #[test]
    fn test_parse_module_relative() {
        assert_eq!(
            "game.exe+0x1A2B".parse::<AddressExpr>().unwrap(),
            AddressExpr::Module {
                module: "game.exe".to_string(),
                offset: 0x1A2B
            }
        );
        assert_eq!(
            "engine-x64.dll-0x10".parse::<AddressExpr>().unwrap(),
            AddressExpr::Module {
                module: "engine-x64.dll".to_string(),
                offset: -0x10
            }
        );
        assert_eq!(
            "engine-x64.dll".parse::<AddressExpr>().unwrap(),
            AddressExpr::Module {
                module: "engine-x64.dll".to_string(),
                offset: 0
            }
        );
        assert_eq!(
            "libgame.so".parse::<AddressExpr>().unwrap(),
            AddressExpr::Module {
                module: "libgame.so".to_string(),
                offset: 0
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!("".parse::<AddressExpr>().is_err());
        assert!("game.exe+zz".parse::<AddressExpr>().is_err());
        assert!("+0x10".parse::<AddressExpr>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for text in ["0x1000", "game.exe+0x20", "game.exe-0x8", "game.exe"] {
            let expr: AddressExpr = text.parse().unwrap();
            assert_eq!(expr.to_string(), text);
        }
    }

    #[test]
    fn test_resolve() {
        let mem = MockMemoryBuilder::new()
            .with_module("Game.exe", 0x14000_0000, 0x200_0000)
            .build();

        let expr: AddressExpr = "game.exe+0x100".parse().unwrap();
        assert_eq!(expr.resolve(&mem).unwrap(), 0x1_4000_0100);

        let expr: AddressExpr = "missing.dll".parse().unwrap();
        assert!(matches!(expr.resolve(&mem), Err(Error::ModuleNotFound(_))));
    }

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("0x10"), Some(16));
        assert_eq!(parse_offset("-0x10"), Some(-16));
        assert_eq!(parse_offset("+8"), Some(8));
        assert_eq!(parse_offset("nope"), None);
    }
}
