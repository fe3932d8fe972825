use std::cmp::Ordering;

/// Compare two free-form version strings.
///
/// Both strings are normalized first: surrounding whitespace is trimmed, one
/// leading `v` is stripped, and `-`/`_` are treated as segment separators
/// equivalent to `.`. Segments are then compared positionally: numerically
/// when both sides parse fully as non-negative integers (with a raw-string
/// tie-break, so `beta-1` sorts before `beta-2`), lexicographically
/// otherwise.
///
/// A missing trailing segment compares equal to a numeric `0`, so distinct
/// strings such as `1.0` and `1.0.0` compare equal. That is defined
/// behavior: upstream tags are not semver and the index only needs a total
/// preorder to pick a maximum.
pub fn compare(a: &str, b: &str) -> Ordering {
    let seg_a = segments(a);
    let seg_b = segments(b);

    let len = seg_a.len().max(seg_b.len());
    for i in 0..len {
        let result = match (seg_a.get(i), seg_b.get(i)) {
            (Some(x), Some(y)) => compare_segments(x, y),
            (Some(x), None) => compare_present_missing(x),
            (None, Some(y)) => compare_present_missing(y).reverse(),
            (None, None) => Ordering::Equal,
        };
        if result != Ordering::Equal {
            return result;
        }
    }
    Ordering::Equal
}

fn segments(v: &str) -> Vec<&str> {
    let v = v.trim();
    let v = v.strip_prefix('v').unwrap_or(v);
    v.split(['.', '-', '_']).collect()
}

fn compare_segments(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => match x.cmp(&y) {
            // Numeric tie with different raw text (e.g. "01" vs "1"):
            // fall back to the raw segment so the ordering stays total.
            Ordering::Equal => a.cmp(b),
            other => other,
        },
        _ => a.cmp(b),
    }
}

/// Ordering of a present segment against a conceptually padded empty one.
fn compare_present_missing(present: &str) -> Ordering {
    match present.parse::<u64>() {
        Ok(0) => Ordering::Equal,
        Ok(_) => Ordering::Greater,
        Err(_) => present.cmp(""),
    }
}

/// Returns the comparator-maximum of an iterator of version strings.
pub fn max_version<'a, I>(versions: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .max_by(|a, b| compare(a, b).then_with(|| a.cmp(b)))
}

const DEFAULT_PRERELEASE_KEYWORDS: &[&str] = &["alpha", "beta", "rc", "snapshot", "pre", "dev"];

/// Classifies version strings as stable or pre-release by keyword search.
///
/// This is a heuristic over free-form upstream tags, not a semver parse: the
/// rule set is an ordered list of case-insensitive substrings whose presence
/// marks a version as unstable. The list is injectable so a stricter parser
/// can replace it without touching the latest-resolution algorithm.
#[derive(Debug, Clone)]
pub struct StabilityClassifier {
    keywords: Vec<String>,
}

impl StabilityClassifier {
    pub fn new(keywords: Vec<String>) -> Self {
        Self {
            keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    pub fn is_stable(&self, version: &str) -> bool {
        let lower = version.to_lowercase();
        !self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}

impl Default for StabilityClassifier {
    fn default() -> Self {
        Self::new(
            DEFAULT_PRERELEASE_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        )
    }
}
