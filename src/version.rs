//! Release version naming.

use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Which component a release bumps. Precedence is breaking > feature > patch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bump {
    pub breaking: bool,
    pub feature: bool,
    pub patch: bool,
}

impl Bump {
    pub const BREAKING: Bump = Bump {
        breaking: true,
        feature: false,
        patch: false,
    };
    pub const FEATURE: Bump = Bump {
        breaking: false,
        feature: true,
        patch: false,
    };
    pub const PATCH: Bump = Bump {
        breaking: false,
        feature: false,
        patch: true,
    };
}

/// Computes the next version of a release channel.
pub trait VersionNamer: Send + Sync {
    fn next(&self, current: &str, channel: &str, bump: Bump) -> String;
}

/// Numeric value of the leading digits of `segment`; 0 when there are none.
fn leading_number(segment: &str) -> u64 {
    let digits: String = segment
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

/// Bumps exactly one component and leaves the others untouched, so
/// `1.2.3` with a breaking bump becomes `2.2.3`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltInVersionNamer;

impl VersionNamer for BuiltInVersionNamer {
    fn next(&self, current: &str, _channel: &str, bump: Bump) -> String {
        let mut parts = [0u64; 3];
        for (slot, segment) in parts.iter_mut().zip(current.trim().split('.')) {
            *slot = leading_number(segment);
        }

        let index = if bump.breaking {
            0
        } else if bump.feature {
            1
        } else {
            2
        };
        parts[index] = parts[index].saturating_add(1);

        format!("{}.{}.{}", parts[0], parts[1], parts[2])
    }
}

/// Numeric, segment-wise comparison; the shorter version is padded with zeros.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left: Vec<u64> = a.split('.').map(leading_number).collect();
    let right: Vec<u64> = b.split('.').map(leading_number).collect();
    let len = left.len().max(right.len());
    for index in 0..len {
        let l = left.get(index).copied().unwrap_or(0);
        let r = right.get(index).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

pub const BUILTIN_STRATEGY: &str = "builtin";

/// Named version strategies a release channel can select with `"versioner"`.
pub struct VersionStrategies {
    strategies: BTreeMap<String, Box<dyn VersionNamer>>,
}

impl Default for VersionStrategies {
    fn default() -> Self {
        let mut strategies = Self {
            strategies: BTreeMap::new(),
        };
        strategies.register(BUILTIN_STRATEGY, Box::new(BuiltInVersionNamer));
        strategies
    }
}

impl VersionStrategies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, namer: Box<dyn VersionNamer>) {
        self.strategies.insert(name.to_string(), namer);
    }

    /// `None` selects the built-in strategy.
    pub fn resolve(&self, name: Option<&str>) -> Option<&dyn VersionNamer> {
        self.strategies
            .get(name.unwrap_or(BUILTIN_STRATEGY))
            .map(|namer| &**namer)
    }

    pub fn names(&self) -> Vec<&str> {
        self.strategies.keys().map(String::as_str).collect()
    }
}
