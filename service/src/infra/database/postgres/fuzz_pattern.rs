//! [`FuzzPattern`] definition.

use derive_more::Display;
use itertools::Itertools as _;
use postgres_types::{FromSql, ToSql};

/// `SIMILAR TO` pattern matching any string containing any of the words.
#[derive(Clone, Debug, Display, Eq, FromSql, PartialEq, ToSql)]
#[postgres(transparent)]
pub struct FuzzPattern(String);

impl FuzzPattern {
    /// Creates a new [`FuzzPattern`] out of the given `words`.
    #[must_use]
    pub fn new<'w>(words: impl IntoIterator<Item = &'w str>) -> Self {
        Self(format!(
            "({})",
            words.into_iter().format_with("|", |word, f| {
                f(&format_args!("%{}%", Self::escape(word)))
            }),
        ))
    }

    /// Escapes `SIMILAR TO` metacharacters in the provided `word`.
    fn escape(word: &str) -> String {
        let mut escaped = String::with_capacity(word.len());
        for c in word.chars() {
            if matches!(
                c,
                '\\' | '%'
                    | '_'
                    | '|'
                    | '*'
                    | '+'
                    | '?'
                    | '{'
                    | '}'
                    | '('
                    | ')'
                    | '['
                    | ']'
            ) {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }
}

#[cfg(test)]
mod spec {
    use super::FuzzPattern;

    #[test]
    fn matches_any_word() {
        assert_eq!(
            FuzzPattern::new(["A-12", "north"]).to_string(),
            "(%A-12%|%north%)",
        );
    }

    #[test]
    fn escapes_metacharacters() {
        assert_eq!(
            FuzzPattern::new(["50%_(x)"]).to_string(),
            r"(%50\%\_\(x\)%)",
        );
    }
}
