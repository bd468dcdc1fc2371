use std::fmt;

/// Tokens currently being resolved on one recursive call chain.
///
/// Every branch of the search gets its own copy, so sibling branches never
/// see each other's tokens; only ancestors block a counterpart.
#[derive(Debug, Clone)]
pub(crate) struct RoutePath {
    tokens: Vec<String>,
    max_depth: usize,
}

impl RoutePath {
    pub(crate) fn root(token_id: &str, max_depth: usize) -> Self {
        Self {
            tokens: vec![token_id.to_string()],
            max_depth: max_depth.max(1),
        }
    }

    pub(crate) fn contains(&self, token_id: &str) -> bool {
        self.tokens.iter().any(|t| t == token_id)
    }

    /// Path with `token_id` appended, or `None` if that would revisit a
    /// token or exceed the depth limit.
    pub(crate) fn extend(&self, token_id: &str) -> Option<RoutePath> {
        if self.contains(token_id) || self.tokens.len() >= self.max_depth {
            return None;
        }

        let mut next = self.clone();
        next.tokens.push(token_id.to_string());
        Some(next)
    }
}

impl fmt::Display for RoutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(" -> "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_rejects_cycles_and_depth() {
        let root = RoutePath::root("a", 3);
        let ab = root.extend("b").unwrap();
        assert!(ab.extend("a").is_none());
        assert!(ab.extend("b").is_none());

        let abc = ab.extend("c").unwrap();
        assert_eq!(abc.to_string(), "a -> b -> c");
        assert!(abc.extend("d").is_none());

        // siblings are independent
        assert!(root.extend("c").unwrap().extend("b").is_some());
    }
}
