//! The originals-criteria chain (`--rank-by` in the original tool), used
//! to decide which member of a duplicate group is the "original" and which
//! are the redundant copies. Grounded on `lib/rank.c`'s `rm_rank_criterion`:
//! a string of letters, each one a comparison, applied in order until one
//! returns non-zero. Uppercasing a letter reverses its sign.

use std::cmp::Ordering;

use regex::Regex;

use crate::error::{Result, ShredError};

/// Anything the ranking chain can compare. `FileRecord` implements this;
/// the trait exists so `criteria.rs` doesn't need to know the record's
/// internal layout.
pub trait Rankable {
    fn mtime(&self) -> f64;
    fn basename(&self) -> &str;
    fn dirname(&self) -> &str;
    fn path(&self) -> &str;
    fn depth(&self) -> u32;
    fn link_count(&self) -> u64;
    /// Hardlinks outside the traversed trees that point at the same inode.
    fn outer_link_count(&self) -> u64;
    /// Index into the ordered list of root paths this file was found under.
    fn path_index(&self) -> u32;
    /// Whether this came from a path tagged preferred (`--preferred`). A
    /// preferred file always outranks a non-preferred one, ahead of the
    /// whole rank-by chain.
    fn preferred_path(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Letter {
    Mtime,
    Basename,
    DirPath,
    BasenameLen,
    Depth,
    LinkCount,
    OuterLinkCount,
    PathIndex,
}

#[derive(Debug, Clone)]
enum Criterion {
    Simple { letter: Letter, invert: bool },
    BasenameRegex { regex: Regex, invert: bool },
    PathRegex { regex: Regex, invert: bool },
}

/// An ordered chain of comparisons. Applied left to right; the first one
/// that doesn't tie decides the order.
#[derive(Debug, Clone, Default)]
pub struct Criteria(Vec<Criterion>);

impl Criteria {
    /// Parses a rank-by string such as `"pOma"` (prefer lower path index,
    /// then more outer hardlinks, then older mtime, then basename order).
    pub fn parse(spec: &str) -> Result<Self> {
        let mut criteria = Vec::new();
        let chars: Vec<char> = spec.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let invert = c.is_ascii_uppercase();
            let lower = c.to_ascii_lowercase();

            match lower {
                'm' => criteria.push(Criterion::Simple { letter: Letter::Mtime, invert }),
                'a' => criteria.push(Criterion::Simple { letter: Letter::Basename, invert }),
                'f' => criteria.push(Criterion::Simple { letter: Letter::DirPath, invert }),
                'l' => criteria.push(Criterion::Simple { letter: Letter::BasenameLen, invert }),
                'd' => criteria.push(Criterion::Simple { letter: Letter::Depth, invert }),
                'h' => criteria.push(Criterion::Simple { letter: Letter::LinkCount, invert }),
                'o' => criteria.push(Criterion::Simple { letter: Letter::OuterLinkCount, invert }),
                'p' => criteria.push(Criterion::Simple { letter: Letter::PathIndex, invert }),
                'x' | 'r' => {
                    let (pattern, consumed) = parse_bracketed_pattern(&chars[i + 1..])?;
                    let regex = Regex::new(&pattern)
                        .map_err(|e| ShredError::Config(format!("invalid rank-by regex: {e}")))?;
                    if lower == 'x' {
                        criteria.push(Criterion::BasenameRegex { regex, invert });
                    } else {
                        criteria.push(Criterion::PathRegex { regex, invert });
                    }
                    i += consumed;
                }
                other => {
                    return Err(ShredError::Config(format!(
                        "unknown rank-by criterion letter: {other}"
                    )))
                }
            }
            i += 1;
        }
        Ok(Criteria(criteria))
    }

    /// A file in a preferred path always outranks one in a non-preferred
    /// path, regardless of the configured criteria chain; only once that's
    /// tied (both or neither preferred) does the chain itself get a say.
    pub fn compare<T: Rankable>(&self, a: &T, b: &T) -> Ordering {
        let preferred = b.preferred_path().cmp(&a.preferred_path());
        if preferred != Ordering::Equal {
            return preferred;
        }
        for criterion in &self.0 {
            let ord = criterion.compare(a, b);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl Criterion {
    fn compare<T: Rankable>(&self, a: &T, b: &T) -> Ordering {
        let (ord, invert) = match self {
            Criterion::Simple { letter, invert } => {
                let ord = match letter {
                    Letter::Mtime => a.mtime().partial_cmp(&b.mtime()).unwrap_or(Ordering::Equal),
                    Letter::Basename => a.basename().to_lowercase().cmp(&b.basename().to_lowercase()),
                    Letter::DirPath => a.dirname().cmp(b.dirname()),
                    Letter::BasenameLen => a.basename().len().cmp(&b.basename().len()),
                    Letter::Depth => a.depth().cmp(&b.depth()),
                    Letter::LinkCount => a.link_count().cmp(&b.link_count()),
                    Letter::OuterLinkCount => a.outer_link_count().cmp(&b.outer_link_count()),
                    Letter::PathIndex => a.path_index().cmp(&b.path_index()),
                };
                (ord, *invert)
            }
            Criterion::BasenameRegex { regex, invert } => {
                let ord = regex_rank(regex, a.basename(), b.basename());
                (ord, *invert)
            }
            Criterion::PathRegex { regex, invert } => {
                let ord = regex_rank(regex, a.path(), b.path());
                (ord, *invert)
            }
        };
        if invert {
            ord.reverse()
        } else {
            ord
        }
    }
}

/// A path that matches outranks one that doesn't; matching both or neither
/// ties. Mirrors `rm_rank_by_regex`'s boolean-match comparison.
fn regex_rank(regex: &Regex, a: &str, b: &str) -> Ordering {
    let ma = regex.is_match(a);
    let mb = regex.is_match(b);
    mb.cmp(&ma)
}

/// Parses the `<pattern>` following an `x`/`r` criterion letter, respecting
/// nested, unescaped `<`/`>` pairs the way `rm_rank_parse_pattern` does.
/// Returns the pattern text and the number of input characters consumed
/// (including the brackets).
fn parse_bracketed_pattern(rest: &[char]) -> Result<(String, usize)> {
    if rest.first() != Some(&'<') {
        return Err(ShredError::Config("rank-by pattern must start with `<`".into()));
    }
    let mut balance = 1i32;
    let mut idx = 1;
    let mut end = None;
    while idx < rest.len() {
        match rest[idx] {
            '<' if rest[idx - 1] != '\\' => balance += 1,
            '>' if rest[idx - 1] != '\\' => {
                balance -= 1;
                if balance == 0 {
                    end = Some(idx);
                    break;
                }
            }
            _ => {}
        }
        idx += 1;
    }
    let end = end.ok_or_else(|| ShredError::Config("unbalanced `<`/`>` in rank-by pattern".into()))?;
    if end == 1 {
        return Err(ShredError::Config("empty rank-by pattern".into()));
    }
    let pattern: String = rest[1..end].iter().collect();
    Ok((pattern, end + 1))
}
