// Copyright (c) The verdict Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Whitespace-insensitive output comparison.
//!
//! Two outputs are equal if they split into the same sequence of whitespace-separated tokens.
//! Line-break styles, trailing spaces and reflowed whitespace are ignored; numeric formatting is
//! not, so `1.0` and `1` are different answers.

/// Returns true if `a` and `b` consist of the same whitespace-separated tokens, in order.
pub fn outputs_equal(a: &str, b: &str) -> bool {
    a.split_whitespace().eq(b.split_whitespace())
}

/// The first position at which two outputs differ, token-wise.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TokenDiff<'a> {
    /// The zero-based index of the first differing token.
    pub index: usize,

    /// The token in the first output, or `None` if the first output ended early.
    pub left: Option<&'a str>,

    /// The token in the second output, or `None` if the second output ended early.
    pub right: Option<&'a str>,
}

/// Returns the first token position where `a` and `b` differ, or `None` if they are equal under
/// [`outputs_equal`].
pub fn first_difference<'a>(a: &'a str, b: &'a str) -> Option<TokenDiff<'a>> {
    let mut left = a.split_whitespace();
    let mut right = b.split_whitespace();
    let mut index = 0;
    loop {
        match (left.next(), right.next()) {
            (None, None) => return None,
            (l, r) if l == r => index += 1,
            (l, r) => {
                return Some(TokenDiff {
                    index,
                    left: l,
                    right: r,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;
    use test_strategy::proptest;

    #[test_case("1 2\n3", "1\n2 3", true ; "reflowed whitespace")]
    #[test_case("1.0", "1", false ; "numeric formatting")]
    #[test_case("6\n", "6", true ; "trailing newline")]
    #[test_case("5", "5 ", true ; "trailing space")]
    #[test_case("a\r\nb\r\n", "a\nb\n", true ; "crlf")]
    #[test_case("", "  \n\t", true ; "empty and blank")]
    #[test_case("1 2", "2 1", false ; "order sensitive")]
    #[test_case("1 2", "1 2 3", false ; "prefix")]
    fn test_outputs_equal(a: &str, b: &str, expected: bool) {
        assert_eq!(outputs_equal(a, b), expected);
        assert_eq!(first_difference(a, b).is_none(), expected);
    }

    #[test]
    fn test_first_difference() {
        assert_eq!(
            first_difference("1 2 3", "1 2 4"),
            Some(TokenDiff {
                index: 2,
                left: Some("3"),
                right: Some("4"),
            })
        );
        assert_eq!(
            first_difference("1 2", "1 2\n3"),
            Some(TokenDiff {
                index: 2,
                left: None,
                right: Some("3"),
            })
        );
    }

    #[proptest]
    fn proptest_reflexive(text: String) {
        assert!(outputs_equal(&text, &text));
    }

    #[proptest]
    fn proptest_symmetric(a: String, b: String) {
        assert_eq!(outputs_equal(&a, &b), outputs_equal(&b, &a));
    }

    #[proptest]
    fn proptest_whitespace_normalizing(
        #[strategy(proptest::collection::vec("[a-z0-9.]{1,5}", 0..8))] tokens: Vec<String>,
        #[strategy(proptest::collection::vec("[ \t\r\n]{1,3}", 9))] separators: Vec<String>,
    ) {
        let spaced = tokens.join(" ");
        let mut reflowed = separators[0].clone();
        for (token, sep) in tokens.iter().zip(&separators[1..]) {
            reflowed.push_str(token);
            reflowed.push_str(sep);
        }
        assert!(outputs_equal(&spaced, &reflowed), "{spaced:?} vs {reflowed:?}");
    }
}
