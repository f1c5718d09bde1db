use std::collections::BTreeMap;
use std::fmt::Write;

use crate::package::{ALIAS_PREFIX, PackageInfo};

/// One line per package: name, alias and version.
pub fn format_list(packages: &[PackageInfo]) -> String {
    if packages.is_empty() {
        return "No packages.\n".to_string();
    }
    let mut out = String::new();
    for package in packages {
        let _ = write!(out, "{}", package.name);
        if let Some(alias) = &package.alias {
            let _ = write!(out, " ({}{})", ALIAS_PREFIX, alias);
        }
        let _ = writeln!(out, " {}", package.version.as_deref().unwrap_or("-"));
    }
    out
}

/// Detailed view of a single package.
pub fn format_package(package: &PackageInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Package: {}", package.name);
    if let Some(alias) = &package.alias {
        let _ = writeln!(out, "Alias: {}{}", ALIAS_PREFIX, alias);
    }
    let _ = writeln!(out, "Directory: {}", package.root.display());
    if let Some(version) = &package.version {
        let _ = writeln!(out, "Version: {}", version);
    }
    let _ = writeln!(out, "Release: {}", if package.no_release { "no" } else { "yes" });
    let _ = writeln!(
        out,
        "Access: {}",
        if package.private_access { "private" } else { "public" }
    );

    for (title, deps) in [
        ("Dependencies", &package.dependencies),
        ("Dev dependencies", &package.dev_dependencies),
        ("Peer dependencies", &package.peer_dependencies),
    ] {
        write_dependencies(&mut out, title, deps);
    }

    if !package.scripts.is_empty() {
        let _ = writeln!(out, "\nScripts:");
        for (name, command) in &package.scripts {
            let _ = writeln!(out, "  {}: {}", name, command);
        }
    }
    out
}

fn write_dependencies(out: &mut String, title: &str, deps: &BTreeMap<String, String>) {
    let _ = writeln!(out, "\n{}:", title);
    if deps.is_empty() {
        let _ = writeln!(out, "  (none)");
    }
    for (name, version) in deps {
        let _ = writeln!(out, "  {}@{}", name, version);
    }
}
