//! Gentoo-style version comparison
//!
//! A version is decomposed into three parts:
//! - a dot-separated numeric sequence (`1.2.3`), where trailing letters on a
//!   component are dropped (`1.0a` -> `[1, 0]`)
//! - an optional release suffix (`_alpha`, `_beta`, `_pre`, `_rc`, `_p`) with
//!   its own counter (`_rc2`)
//! - an optional revision (`-r3`)
//!
//! Ordering is numeric sequence, then suffix rank, then suffix counter, then
//! revision. Nothing falls back to string comparison.

use std::cmp::Ordering;

/// Release suffix, declared in ascending rank
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Suffix {
    Alpha,
    Beta,
    Pre,
    Rc,
    Release,
    Patch,
}

impl Suffix {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "alpha" => Some(Suffix::Alpha),
            "beta" => Some(Suffix::Beta),
            "pre" => Some(Suffix::Pre),
            "rc" => Some(Suffix::Rc),
            "p" => Some(Suffix::Patch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct GentooVersion {
    numbers: Vec<u64>,
    suffix: Suffix,
    suffix_number: u64,
    revision: u64,
}

/// Parse a run of leading ASCII digits, treating an empty run as zero.
fn leading_number(s: &str) -> u64 {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return 0;
    }
    s[..end].parse().unwrap_or(u64::MAX)
}

impl GentooVersion {
    fn parse(version: &str) -> Self {
        let version = version.trim();
        let version = version
            .strip_prefix('v')
            .or_else(|| version.strip_prefix('V'))
            .unwrap_or(version);

        let (rest, revision) = match version.rsplit_once("-r") {
            Some((head, rev)) if !rev.is_empty() && rev.bytes().all(|b| b.is_ascii_digit()) => {
                (head, leading_number(rev))
            }
            _ => (version, 0),
        };

        let (base, suffix, suffix_number) = match rest.rsplit_once('_') {
            Some((head, tail)) => {
                let digits = tail.find(|c: char| c.is_ascii_digit()).unwrap_or(tail.len());
                match Suffix::from_tag(&tail[..digits]) {
                    Some(suffix) => (head, suffix, leading_number(&tail[digits..])),
                    None => (rest, Suffix::Release, 0),
                }
            }
            None => (rest, Suffix::Release, 0),
        };

        let numbers = base.split('.').map(leading_number).collect();

        Self {
            numbers,
            suffix,
            suffix_number,
            revision,
        }
    }

    fn cmp_numbers(&self, other: &Self) -> Ordering {
        let len = self.numbers.len().max(other.numbers.len());
        (0..len)
            .map(|i| {
                let a = self.numbers.get(i).copied().unwrap_or(0);
                let b = other.numbers.get(i).copied().unwrap_or(0);
                a.cmp(&b)
            })
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl Ord for GentooVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_numbers(other)
            .then(self.suffix.cmp(&other.suffix))
            .then(self.suffix_number.cmp(&other.suffix_number))
            .then(self.revision.cmp(&other.revision))
    }
}

impl PartialOrd for GentooVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two version strings under Gentoo ordering rules.
pub fn compare(v1: &str, v2: &str) -> Ordering {
    GentooVersion::parse(v1).cmp(&GentooVersion::parse(v2))
}

/// Returns true when `candidate` is strictly newer than `current`.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare(candidate, current) == Ordering::Greater
}

/// Returns true for live (rolling) versions such as `9999`.
///
/// A live version has a single all-nines base component of at least four digits,
/// with or without a revision.
pub fn is_live(version: &str) -> bool {
    let version = version.trim();
    let base = version
        .rsplit_once("-r")
        .map(|(head, _)| head)
        .unwrap_or(version);
    base.len() >= 4 && base.bytes().all(|b| b == b'9')
}

/// Pick the highest non-live version.
pub fn highest_release<'a, I>(versions: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .filter(|v| !is_live(v))
        .max_by(|a, b| compare(a, b))
}
