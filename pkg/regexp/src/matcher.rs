use crate::node::{Alternation, Branch, Node, Quantifier, Regex};

/// Per-attempt state threaded through a single backtracking search.
///
/// `captures[i]` holds the `(start, end)` byte offsets last recorded for
/// group `i` (index 0 is unused; groups are 1-based). Cloning a `Cursor` is
/// O(number of groups), which is what lets each choice point snapshot and
/// restore it cheaply.
#[derive(Clone)]
struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
    captures: Vec<Option<(usize, usize)>>,
}

/// A continuation: "the rest of the match", invoked once the node in front
/// of it has consumed its share of the input. Returning `false` tells the
/// caller to undo its own progress and try an alternative.
type Continuation<'a> = dyn Fn(&mut Cursor<'a>) -> bool;

/// Reports whether `regex` matches anywhere in `input` (unanchored search;
/// `^`/`$` are still position-sensitive within `input`).
pub fn matches(regex: &Regex, input: &[u8]) -> bool {
    for start in 0..=input.len() {
        let mut cursor = Cursor {
            input,
            pos: start,
            captures: vec![None; regex.capture_group_count + 1],
        };

        if match_alternation(&regex.root, &mut cursor, &|_| true) {
            return true;
        }
    }

    false
}

fn match_alternation<'a>(alt: &Alternation, cursor: &mut Cursor<'a>, k: &Continuation<'a>) -> bool {
    for branch in alt {
        let snapshot = cursor.clone();

        if match_branch(branch, 0, cursor, k) {
            return true;
        }

        *cursor = snapshot;
    }

    false
}

fn match_branch<'a>(branch: &Branch, index: usize, cursor: &mut Cursor<'a>, k: &Continuation<'a>) -> bool {
    match branch.get(index) {
        None => k(cursor),
        Some(node) => {
            match_node(node, cursor, &|cursor| match_branch(branch, index + 1, cursor, k))
        }
    }
}

fn match_node<'a>(node: &Node, cursor: &mut Cursor<'a>, k: &Continuation<'a>) -> bool {
    match node {
        Node::Literal(b) => match_single_byte(cursor, k, |actual| actual == *b),
        Node::Dot => match_single_byte(cursor, k, |_| true),
        Node::CharacterClass(class) => match_single_byte(cursor, k, |b| class.matches(b)),
        Node::StartOfLineAnchor => {
            let ok = cursor.pos == 0 || cursor.input[cursor.pos - 1] == b'\n';
            ok && k(cursor)
        }
        Node::EndOfLineAnchor => {
            let ok = cursor.pos == cursor.input.len() || cursor.input[cursor.pos] == b'\n';
            ok && k(cursor)
        }
        Node::CaptureGroup { index, body } => match_capture_group(*index as usize, body, cursor, k),
        Node::Alternation(alt) => match_alternation(alt, cursor, k),
        Node::Quantified { q, inner } => match_quantified(q, inner, 0, cursor, k),
        Node::Backreference(group) => match_backreference(*group as usize, cursor, k),
    }
}

fn match_single_byte<'a>(cursor: &mut Cursor<'a>, k: &Continuation<'a>, pred: impl Fn(u8) -> bool) -> bool {
    if cursor.pos >= cursor.input.len() || !pred(cursor.input[cursor.pos]) {
        return false;
    }

    let start = cursor.pos;
    cursor.pos += 1;

    if k(cursor) {
        true
    } else {
        cursor.pos = start;
        false
    }
}

fn match_capture_group<'a>(index: usize, body: &Alternation, cursor: &mut Cursor<'a>, k: &Continuation<'a>) -> bool {
    let start = cursor.pos;

    match_alternation(body, cursor, &|cursor| {
        let end = cursor.pos;
        let previous = cursor.captures[index];
        cursor.captures[index] = Some((start, end));

        if k(cursor) {
            true
        } else {
            cursor.captures[index] = previous;
            false
        }
    })
}

fn match_backreference<'a>(group: usize, cursor: &mut Cursor<'a>, k: &Continuation<'a>) -> bool {
    let Some((start, end)) = cursor.captures[group] else {
        return false;
    };

    let len = end - start;
    if cursor.pos + len > cursor.input.len() {
        return false;
    }
    if cursor.input[cursor.pos..cursor.pos + len] != cursor.input[start..end] {
        return false;
    }

    let saved = cursor.pos;
    cursor.pos += len;

    if k(cursor) {
        true
    } else {
        cursor.pos = saved;
        false
    }
}

/// Matches `inner` repeated between `q.min` and `q.max` times, greedily
/// trying the longest repetition count first and backtracking down to
/// `q.min` on failure. A repetition that consumes zero bytes stops the
/// search from repeating further (it would otherwise loop forever), the
/// same way the reference algorithm in the design notes does.
fn match_quantified<'a>(
    q: &Quantifier,
    inner: &Node,
    count: usize,
    cursor: &mut Cursor<'a>,
    k: &Continuation<'a>,
) -> bool {
    let under_max = q.max.map_or(true, |max| count < max);

    if under_max {
        let start = cursor.pos;
        let snapshot = cursor.captures.clone();

        let matched = match_node(inner, cursor, &|cursor| {
            if cursor.pos == start {
                // Zero-width repetition: count it once and stop, rather than
                // recursing into an identical state forever.
                count + 1 >= q.min && k(cursor)
            } else {
                match_quantified(q, inner, count + 1, cursor, k)
            }
        });

        if matched {
            return true;
        }

        cursor.pos = start;
        cursor.captures = snapshot;
    }

    if count >= q.min {
        return k(cursor);
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::token::tokenize;

    fn is_match(pattern: &str, input: &str) -> bool {
        let tokens = tokenize(pattern.as_bytes()).unwrap();
        let regex = parse(&tokens).unwrap();
        matches(&regex, input.as_bytes())
    }

    #[test]
    fn s1_digit_class_and_literal() {
        assert!(is_match("\\d\\d\\d apple", "100 apples"));
    }

    #[test]
    fn s2_plus_quantifier() {
        assert!(is_match("ca+ats", "caaats"));
    }

    #[test]
    fn s3_backreference() {
        assert!(is_match("(\\w+) and \\1", "cat and cat"));
        assert!(!is_match("(\\w+) and \\1", "cat and dog"));
    }

    #[test]
    fn s4_two_backreferences() {
        assert!(is_match("(\\d+) (\\w+) and \\1 \\2", "3 red and 3 red"));
    }

    #[test]
    fn literal_law() {
        assert!(is_match("apple", "a big apple pie"));
        assert!(!is_match("orange", "a big apple pie"));
    }

    #[test]
    fn anchors() {
        assert!(is_match("^abc", "abc def"));
        assert!(!is_match("^abc", "xabc"));
        assert!(is_match("^abc", "x\nabc"));
        assert!(is_match("abc$", "xyz abc"));
        assert!(!is_match("abc$", "abcx"));
    }

    #[test]
    fn quantifier_bounds() {
        assert!(is_match("a?b", "b"));
        assert!(is_match("a?b", "ab"));
        assert!(!is_match("^a?b$", "aab"));
        assert!(is_match("a*b", "b"));
        assert!(is_match("a*b", "aaaab"));
        assert!(!is_match("a+b", "b"));
    }

    #[test]
    fn character_class_negation() {
        assert!(is_match("[^abc]", "d"));
        assert!(!is_match("^[^abc]$", "a"));
    }

    #[test]
    fn dot_matches_newline() {
        assert!(is_match("a.b", "a\nb"));
    }
}
