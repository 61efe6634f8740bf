// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// Set of travel modes allowed to traverse a street.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Permission(u8);

impl Permission {
    pub const NONE: Self = Self(0);
    pub const CAR: Self = Self(1);
    pub const BICYCLE: Self = Self(2);
    pub const PEDESTRIAN: Self = Self(4);
    pub const PEDESTRIAN_AND_BICYCLE: Self = Self(4 | 2);
    pub const PEDESTRIAN_AND_CAR: Self = Self(4 | 1);
    pub const BICYCLE_AND_CAR: Self = Self(2 | 1);
    pub const ALL: Self = Self(4 | 2 | 1);

    /// Named permissions, in the order used for parsing and display.
    const NAMES: [(&'static str, Self); 8] = [
        ("NONE", Self::NONE),
        ("CAR", Self::CAR),
        ("BICYCLE", Self::BICYCLE),
        ("PEDESTRIAN", Self::PEDESTRIAN),
        ("PEDESTRIAN_AND_BICYCLE", Self::PEDESTRIAN_AND_BICYCLE),
        ("PEDESTRIAN_AND_CAR", Self::PEDESTRIAN_AND_CAR),
        ("BICYCLE_AND_CAR", Self::BICYCLE_AND_CAR),
        ("ALL", Self::ALL),
    ];

    /// Returns a permission with all modes of `other` allowed in addition to `self`.
    pub fn add(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns a permission with all modes of `other` disallowed.
    pub fn remove(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Returns a permission allowing modes allowed by either `self` or `other`.
    pub fn union(self, other: Self) -> Self {
        self.add(other)
    }

    /// Checks if all modes from `other` are allowed.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Checks if no mode is allowed.
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

impl BitOr for Permission {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = Self::NAMES
            .iter()
            .find_map(|&(name, p)| if p == *self { Some(name) } else { None })
            .unwrap_or("INVALID");
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission: {0:?}")]
pub struct UnknownPermission(pub String);

impl FromStr for Permission {
    type Err = UnknownPermission;

    /// Parses a permission name (e.g. `PEDESTRIAN_AND_BICYCLE`), or
    /// several names joined by `|` (e.g. `CAR|BICYCLE`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split('|').try_fold(Self::NONE, |acc, part| {
            let part = part.trim();
            Self::NAMES
                .iter()
                .find_map(|&(name, p)| if name == part { Some(p) } else { None })
                .map(|p| acc.union(p))
                .ok_or_else(|| UnknownPermission(s.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Permission;

    #[test]
    fn add_remove() {
        assert_eq!(Permission::NONE.add(Permission::CAR), Permission::CAR);
        assert_eq!(
            Permission::ALL.remove(Permission::PEDESTRIAN),
            Permission::BICYCLE_AND_CAR
        );
        assert_eq!(
            Permission::PEDESTRIAN.remove(Permission::PEDESTRIAN),
            Permission::NONE
        );
        assert_eq!(
            Permission::PEDESTRIAN | Permission::BICYCLE,
            Permission::PEDESTRIAN_AND_BICYCLE
        );
        assert!(Permission::ALL.contains(Permission::BICYCLE));
        assert!(!Permission::CAR.contains(Permission::BICYCLE));
        assert!(Permission::NONE.is_none());
    }

    #[test]
    fn parse() {
        assert_eq!("CAR".parse(), Ok(Permission::CAR));
        assert_eq!("ALL".parse(), Ok(Permission::ALL));
        assert_eq!(
            "CAR | PEDESTRIAN".parse(),
            Ok(Permission::PEDESTRIAN_AND_CAR)
        );
        assert!("TRAIN".parse::<Permission>().is_err());
        assert!("CAR|".parse::<Permission>().is_err());
    }

    #[test]
    fn display() {
        assert_eq!(Permission::BICYCLE_AND_CAR.to_string(), "BICYCLE_AND_CAR");
        assert_eq!(Permission::NONE.to_string(), "NONE");
    }
}
