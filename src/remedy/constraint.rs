//! Requirement parsing, constraint intersection, and version ordering.
//!
//! All version semantics in the engine funnel through here so the quirks
//! live in one place:
//! - `"latest"` is rewritten to the wildcard. A point-in-time "latest" tag
//!   is meaningless once a lockfile exists, so matching it against anything
//!   is the documented approximation.
//! - A bare version literal (`"1.0.0"`) is an exact pin, npm-style. The
//!   semver crate would otherwise read it as a caret range.
//! - Comparison of version strings prefers semantic order and falls back to
//!   lexical order for strings that don't parse.

use semver::{Version, VersionReq};

/// Parses one requirement string into a matchable [`VersionReq`].
///
/// # Errors
///
/// Returns the underlying parse error for strings that are neither a bare
/// version nor a valid range expression.
pub fn parse_requirement(raw: &str) -> Result<VersionReq, semver::Error> {
    let raw = if raw == "latest" { "*" } else { raw };

    // A bare version literal is an exact pin. Build metadata is dropped
    // (it never participates in precedence).
    if let Ok(v) = Version::parse(raw) {
        let mut exact = format!("={}.{}.{}", v.major, v.minor, v.patch);
        if !v.pre.is_empty() {
            exact.push('-');
            exact.push_str(v.pre.as_str());
        }
        return VersionReq::parse(&exact);
    }

    VersionReq::parse(raw)
}

/// The intersection of every dependent's requirement on one package.
///
/// Represented as a conjunction of parsed requirements: a version is in the
/// set iff it satisfies all of them. This makes intersection exact and
/// infallible — an unsatisfiable combination is representable and simply
/// matches nothing, it is not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintSet {
    reqs: Vec<VersionReq>,
}

impl ConstraintSet {
    /// Narrows the set by one more requirement. Duplicates are ignored;
    /// intersection is associative, so order doesn't matter.
    pub fn intersect(&mut self, req: VersionReq) {
        if !self.reqs.contains(&req) {
            self.reqs.push(req);
        }
    }

    /// Whether `version` satisfies every requirement in the set.
    ///
    /// # Errors
    ///
    /// Fails if `version` is not a parseable concrete version.
    pub fn matches(&self, version: &str) -> Result<bool, semver::Error> {
        let v = Version::parse(version)?;
        Ok(self.reqs.iter().all(|r| r.matches(&v)))
    }
}

/// Builds the intersected constraint set from the requirement strings of
/// every dependent edge terminating on a vulnerable version.
///
/// # Errors
///
/// Propagates the first requirement string that fails to parse. The
/// orchestrator logs and skips the package in that case, leaving it
/// unconstrained (see `compute_in_place_patches`).
pub fn build_constraint_set<'a, I>(required: I) -> Result<ConstraintSet, semver::Error>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut set = ConstraintSet::default();
    for raw in required {
        set.intersect(parse_requirement(raw)?);
    }
    Ok(set)
}

/// Orders two version strings: semantic order when both parse, lexical
/// otherwise. Used to sort registry version lists before the
/// highest-first candidate scan.
pub fn cmp_version_strings(a: &str, b: &str) -> std::cmp::Ordering {
    match (Version::parse(a), Version::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb),
        _ => a.cmp(b),
    }
}

/// Whether moving from `orig` to `candidate` crosses a major version
/// boundary.
///
/// # Errors
///
/// Fails if either string is not a parseable concrete version; the caller
/// treats that as a rejected candidate when major bumps are disallowed.
pub fn is_major_bump(orig: &str, candidate: &str) -> Result<bool, semver::Error> {
    let o = Version::parse(orig)?;
    let c = Version::parse(candidate)?;
    Ok(o.major != c.major)
}
