//! Package names, aliases and dependency expressions.

/// Prefix that turns a lookup key into an alias lookup, e.g. `@@core`.
pub const ALIAS_PREFIX: &str = "@@";

const MAX_NAME_LENGTH: usize = 214;

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.' | '_' | '~'))
}

/// Whether `name` is a well-formed (lower-case) registry package name,
/// optionally scoped as `@scope/name`.
pub fn is_valid_package_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        return false;
    }
    match name.strip_prefix('@') {
        Some(scoped) => match scoped.split_once('/') {
            Some((scope, rest)) => is_valid_segment(scope) && is_valid_segment(rest),
            None => false,
        },
        None => is_valid_segment(name),
    }
}

/// Aliases are a single unscoped segment.
pub fn is_valid_alias(alias: &str) -> bool {
    !alias.is_empty() && alias.len() <= MAX_NAME_LENGTH && is_valid_segment(alias)
}

/// Lower-case a lookup key. Names are case-insensitive.
pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A parsed `name[@tag]` dependency expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencySpec {
    pub name: String,
    pub tag: Option<String>,
}

impl DependencySpec {
    /// Split at the last `@` that is not the first character.
    ///
    /// `lodash@^4` is `lodash` at `^4`; `@org/a` has no tag; `@@core` is an
    /// alias reference and never carries a tag.
    pub fn parse(expression: &str) -> Self {
        let expression = expression.trim();
        if let Some(alias) = expression.strip_prefix(ALIAS_PREFIX) {
            return Self {
                name: format!("{}{}", ALIAS_PREFIX, normalize(alias)),
                tag: None,
            };
        }
        match expression.rfind('@') {
            Some(index) if index > 0 => {
                let tag = &expression[index + 1..];
                Self {
                    name: normalize(&expression[..index]),
                    tag: (!tag.is_empty()).then(|| tag.to_string()),
                }
            }
            _ => Self {
                name: normalize(expression),
                tag: None,
            },
        }
    }

    /// Expression handed to the package manager.
    pub fn expression(&self) -> String {
        match &self.tag {
            Some(tag) => format!("{}@{}", self.name, tag),
            None => self.name.clone(),
        }
    }
}
