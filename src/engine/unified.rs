//! Line-based unified diff.

use std::fmt::Write;

/// Unchanged lines shown around each change.
pub const CONTEXT_LINES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal(usize, usize),
    Delete(usize),
    Insert(usize),
}

/// Line-level edit script from `old` to `new` via longest common subsequence.
fn edit_script(old: &[&str], new: &[&str]) -> Vec<Op> {
    let (n, m) = (old.len(), new.len());
    // lcs[i][j] = LCS length of old[i..] and new[j..]
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut ops = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            ops.push(Op::Equal(i, j));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            ops.push(Op::Delete(i));
            i += 1;
        } else {
            ops.push(Op::Insert(j));
            j += 1;
        }
    }
    ops.extend((i..n).map(Op::Delete));
    ops.extend((j..m).map(Op::Insert));
    ops
}

/// Marker following a final line that has no newline, as git prints it.
const NO_NEWLINE: &str = "\\ No newline at end of file";

/// Render a unified diff of `old` → `new`.
///
/// Lines keep their terminators, so inputs that differ only in a trailing
/// newline or `\r` still produce a diff. Returns an empty string only when
/// the inputs are identical.
pub fn unified_diff(old: &str, new: &str, old_label: &str, new_label: &str) -> String {
    let old_lines: Vec<&str> = old.split_inclusive('\n').collect();
    let new_lines: Vec<&str> = new.split_inclusive('\n').collect();
    // Only flag a missing final newline when the two sides disagree on it
    let mark_eof = old.ends_with('\n') != new.ends_with('\n');
    let ops = edit_script(&old_lines, &new_lines);

    // Group changes into hunks of op indices [start, end)
    let mut hunks: Vec<(usize, usize)> = Vec::new();
    for (index, op) in ops.iter().enumerate() {
        if matches!(op, Op::Equal(..)) {
            continue;
        }
        let start = index.saturating_sub(CONTEXT_LINES);
        let end = (index + 1 + CONTEXT_LINES).min(ops.len());
        match hunks.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => hunks.push((start, end)),
        }
    }
    if hunks.is_empty() {
        return String::new();
    }

    // Line positions before each op
    let mut old_pos = Vec::with_capacity(ops.len());
    let mut new_pos = Vec::with_capacity(ops.len());
    let (mut o, mut n) = (0, 0);
    for op in &ops {
        old_pos.push(o);
        new_pos.push(n);
        match op {
            Op::Equal(..) => {
                o += 1;
                n += 1;
            }
            Op::Delete(_) => o += 1,
            Op::Insert(_) => n += 1,
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "--- {}", old_label);
    let _ = writeln!(out, "+++ {}", new_label);

    for (start, end) in hunks {
        let slice = &ops[start..end];
        let old_count = slice.iter().filter(|op| !matches!(op, Op::Insert(_))).count();
        let new_count = slice.iter().filter(|op| !matches!(op, Op::Delete(_))).count();
        let old_start = old_pos[start] + usize::from(old_count > 0);
        let new_start = new_pos[start] + usize::from(new_count > 0);
        let _ = writeln!(
            out,
            "@@ -{},{} +{},{} @@",
            old_start, old_count, new_start, new_count
        );

        for op in slice {
            let (prefix, line) = match *op {
                Op::Equal(i, _) => (' ', old_lines[i]),
                Op::Delete(i) => ('-', old_lines[i]),
                Op::Insert(j) => ('+', new_lines[j]),
            };
            match line.strip_suffix('\n') {
                Some(text) => {
                    let _ = writeln!(out, "{}{}", prefix, text);
                }
                None => {
                    let _ = writeln!(out, "{}{}", prefix, line);
                    if mark_eof {
                        let _ = writeln!(out, "{}", NO_NEWLINE);
                    }
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_is_empty() {
        assert_eq!(unified_diff("a\nb\n", "a\nb\n", "old", "new"), "");
        assert_eq!(unified_diff("", "", "old", "new"), "");
    }

    #[test]
    fn test_single_line_change() {
        let diff = unified_diff("v1", "v2", "x#3", "x (staged)");
        assert_eq!(diff, "--- x#3\n+++ x (staged)\n@@ -1,1 +1,1 @@\n-v1\n+v2\n");
    }

    #[test]
    fn test_from_empty() {
        let diff = unified_diff("", "a\nb", "old", "new");
        assert_eq!(diff, "--- old\n+++ new\n@@ -0,0 +1,2 @@\n+a\n+b\n");
    }

    #[test]
    fn test_to_empty() {
        let diff = unified_diff("a\nb", "", "old", "new");
        assert_eq!(diff, "--- old\n+++ new\n@@ -1,2 +0,0 @@\n-a\n-b\n");
    }

    #[test]
    fn test_trailing_newline_only_difference() {
        let diff = unified_diff("v", "v\n", "x#1", "x (staged)");
        assert_eq!(
            diff,
            "--- x#1\n+++ x (staged)\n@@ -1,1 +1,1 @@\n-v\n\\ No newline at end of file\n+v\n"
        );
    }

    #[test]
    fn test_carriage_return_only_difference() {
        let diff = unified_diff("v\r\n", "v\n", "old", "new");
        assert!(diff.contains("-v\r\n+v\n"));
        assert!(!diff.contains("No newline"));
    }

    #[test]
    fn test_context_is_limited() {
        let old: Vec<String> = (1..=10).map(|i| i.to_string()).collect();
        let mut new = old.clone();
        new[4] = "five".to_string();
        let diff = unified_diff(&old.join("\n"), &new.join("\n"), "old", "new");

        assert!(diff.contains("@@ -2,7 +2,7 @@"));
        assert!(diff.contains("-5\n+five\n"));
        assert!(!diff.contains(" 1\n"));
        assert!(!diff.contains(" 9\n"));
    }

    #[test]
    fn test_distant_changes_make_separate_hunks() {
        let old: Vec<String> = (1..=20).map(|i| i.to_string()).collect();
        let mut new = old.clone();
        new[0] = "one".to_string();
        new[19] = "twenty".to_string();
        let diff = unified_diff(&old.join("\n"), &new.join("\n"), "old", "new");

        assert_eq!(diff.matches("@@ -").count(), 2);
        assert!(diff.contains("@@ -1,4 +1,4 @@"));
        assert!(diff.contains("@@ -17,4 +17,4 @@"));
    }
}
