//! Character-sequence similarity for fuzzy entity matching.
//!
//! Ratcliff/Obershelp "gestalt" matching: find the longest common block,
//! recurse on the pieces to its left and right, and score
//! `2 * matched / (len(a) + len(b))`.
//!
//! Long second strings (200+ chars) get the usual "popular character"
//! heuristic: characters making up more than 1% of `b` are not used to seed
//! a block, though blocks may still extend across them.

use std::collections::HashMap;

/// A matched run: `a[a_start..a_start+size] == b[b_start..b_start+size]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchBlock {
    pub a_start: usize,
    pub b_start: usize,
    pub size: usize,
}

struct SequenceMatcher<'s> {
    a: &'s [char],
    b: &'s [char],
    /// Positions of each character in `b`, ascending.
    b2j: HashMap<char, Vec<usize>>,
}

impl<'s> SequenceMatcher<'s> {
    fn new(a: &'s [char], b: &'s [char]) -> Self {
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, &c) in b.iter().enumerate() {
            b2j.entry(c).or_default().push(j);
        }

        let n = b.len();
        if n >= 200 {
            let ntest = n / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= ntest);
        }

        Self { a, b, b2j }
    }

    /// Longest block within `a[alo..ahi]` x `b[blo..bhi]`. Earliest block wins ties.
    fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> MatchBlock {
        let (a, b) = (self.a, self.b);
        let (mut besti, mut bestj, mut bestsize) = (alo, blo, 0usize);

        // j2len[j] = length of the block ending at a[i-1], b[j]
        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for i in alo..ahi {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b2j.get(&a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| j2len.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next.insert(j, k);
                    if k > bestsize {
                        besti = i + 1 - k;
                        bestj = j + 1 - k;
                        bestsize = k;
                    }
                }
            }
            j2len = next;
        }

        // Popular characters never seed a block; let the block grow over them.
        while besti > alo && bestj > blo && a[besti - 1] == b[bestj - 1] {
            besti -= 1;
            bestj -= 1;
            bestsize += 1;
        }
        while besti + bestsize < ahi && bestj + bestsize < bhi && a[besti + bestsize] == b[bestj + bestsize] {
            bestsize += 1;
        }

        MatchBlock { a_start: besti, b_start: bestj, size: bestsize }
    }

    fn matching_blocks(&self) -> Vec<MatchBlock> {
        let mut blocks = Vec::new();
        let mut queue = vec![(0, self.a.len(), 0, self.b.len())];

        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let m = self.find_longest_match(alo, ahi, blo, bhi);
            if m.size == 0 {
                continue;
            }
            blocks.push(m);
            if alo < m.a_start && blo < m.b_start {
                queue.push((alo, m.a_start, blo, m.b_start));
            }
            if m.a_start + m.size < ahi && m.b_start + m.size < bhi {
                queue.push((m.a_start + m.size, ahi, m.b_start + m.size, bhi));
            }
        }

        blocks.sort_by_key(|m| (m.a_start, m.b_start));
        blocks
    }
}

/// Matching blocks between two strings, ordered by position.
pub fn matching_blocks(a: &str, b: &str) -> Vec<MatchBlock> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    SequenceMatcher::new(&a, &b).matching_blocks()
}

/// Raw sequence ratio in [0, 1]. Two empty strings score 1.0.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched: usize = SequenceMatcher::new(&a, &b)
        .matching_blocks()
        .iter()
        .map(|m| m.size)
        .sum();
    2.0 * matched as f64 / total as f64
}

/// Similarity of two already-normalized names.
///
/// 0.0 when either side is empty, 1.0 on equality, otherwise [`ratio`].
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    ratio(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_and_empty() {
        assert_eq!(similarity("porcupine tree", "porcupine tree"), 1.0);
        assert_eq!(similarity("", "anything"), 0.0);
        assert_eq!(similarity("anything", ""), 0.0);
        assert_eq!(ratio("", ""), 1.0);
    }

    #[test]
    fn test_ratio_known_values() {
        assert!((ratio("abcd", "bcde") - 0.75).abs() < 1e-10);
        // Asymmetric: the block found first constrains the recursion
        assert!((ratio("tide", "diet") - 0.25).abs() < 1e-10);
        assert!((ratio("diet", "tide") - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_spacing_variant_above_strong() {
        let s = similarity("closure / continuation", "closure/continuation");
        assert!((s - 40.0 / 42.0).abs() < 1e-10);
        assert!(s >= 0.85);
    }

    #[test]
    fn test_single_typo() {
        let s = similarity("fear inoculum", "fear innoculum");
        assert!((s - 26.0 / 27.0).abs() < 1e-10);
    }

    #[test]
    fn test_unrelated_names_low() {
        assert!(similarity("dream theater", "opeth") < 0.5);
    }

    #[test]
    fn test_matching_blocks_ordered() {
        let blocks = matching_blocks("closure / continuation", "closure/continuation");
        let sizes: Vec<usize> = blocks.iter().map(|m| m.size).collect();
        assert_eq!(sizes, vec![7, 1, 12]);
        assert!(blocks.windows(2).all(|w| w[0].a_start < w[1].a_start));
    }
}
