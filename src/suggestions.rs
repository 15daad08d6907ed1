//! # Command Hints
//!
//! `anyhow` errors for the failures users run into most, each followed by
//! `hint:` lines naming the fix.
//!
//! ```rust,ignore
//! use caas::suggestions;
//!
//! let organization = system
//!     .organization(name)
//!     .map_err(|_| suggestions::organization_not_found(name, &known))?;
//! ```

use std::path::Path;

/// A system has no properties file in any of the searched locations.
pub fn properties_not_found(system: &str, searched: &[&Path]) -> anyhow::Error {
    let locations: Vec<String> = searched
        .iter()
        .map(|path| format!("  {}", path.display()))
        .collect();
    anyhow::anyhow!(
        "No properties file for system '{system}'. Searched:\n{locations}\n\n\
         hint: Create {system}.properties with at least url=<gateway url>\n\
         hint: Use --properties to point at a different file\n\
         hint: Set the CAAS_PROPERTIES environment variable",
        locations = locations.join("\n")
    )
}

/// No `--org` was given and the properties do not name one.
pub fn organization_required(system: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "No organization selected for system '{system}'\n\n\
         hint: Pass --org <NAME>\n\
         hint: Add organization=<NAME> to {system}.properties"
    )
}

/// The named organization does not exist.
pub fn organization_not_found(name: &str, known: &[&str]) -> anyhow::Error {
    let did_you_mean = find_similar(name, known)
        .map(|s| format!("\nhint: Did you mean '{s}'?"))
        .unwrap_or_default();
    anyhow::anyhow!(
        "Organization not found: {name}{did_you_mean}\n\n\
         Known organizations are: {known}\n\
         hint: Run 'caas tree' to list the organizations of the system",
        known = known.join(", ")
    )
}

/// A template file does not exist.
pub fn template_not_found(path: &Path) -> anyhow::Error {
    anyhow::anyhow!(
        "Template file not found: {path}\n\n\
         hint: Run 'caas export --output {path}' to capture an organization first",
        path = path.display()
    )
}

/// A `--var` argument is not a `name=value` assignment.
pub fn invalid_variable(text: &str, error: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "Invalid variable assignment: {text}\n\
         error: {error}\n\n\
         hint: Use --var name=value; names start with a letter or underscore\n\
         hint: Write ${{dollar}} in templates for a literal '$'"
    )
}

/// A check run found differences.
pub fn differences_found(differences: usize, errors: usize) -> anyhow::Error {
    anyhow::anyhow!(
        "Organization does not match the template: {differences} difference(s), {errors} error(s)\n\n\
         hint: Run 'caas apply' with the same template to fix the differences"
    )
}

/// An apply or purge run recorded failures.
pub fn run_failed(operation: &str, errors: usize) -> anyhow::Error {
    anyhow::anyhow!(
        "{operation} finished with {errors} failed element(s)\n\n\
         hint: Rerun with --log-level debug for the remote requests and responses"
    )
}

/// The candidate closest to `input`, ignoring case, if at most two edits
/// away.
fn find_similar<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let input = input.to_lowercase();
    let mut best: Option<(&'a str, usize)> = None;
    for &candidate in candidates {
        let distance = edit_distance(&input, &candidate.to_lowercase());
        if distance > 2 || distance >= input.len() {
            continue;
        }
        if best.map_or(true, |(_, closest)| distance < closest) {
            best = Some((candidate, distance));
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Levenshtein distance, keeping a single row of the table.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = diagonal + usize::from(ca != *cb);
            diagonal = row[j + 1];
            row[j + 1] = substitution.min(row[j] + 1).min(diagonal + 1);
        }
    }
    row[b.len()]
}
