//! A trie keyed by path segments
//!
//! Filter groups and join paths share this structure; each use goes through
//! its own wrapper (`FilterGroups`, `JoinPaths`) so the two are never mixed.

/// Node holding values and named child branches in insertion order
#[derive(Debug, Clone, PartialEq)]
pub struct PathTree<T> {
    values: Vec<T>,
    branches: Vec<(String, PathTree<T>)>,
}

impl<T> Default for PathTree<T> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            branches: Vec::new(),
        }
    }
}

impl<T> PathTree<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` at the node addressed by `path`, creating nodes on the way
    pub fn put<S: AsRef<str>>(&mut self, path: &[S], value: T) {
        self.ensure(path).values.push(value);
    }

    /// The node addressed by `path`, created when missing
    pub fn ensure<S: AsRef<str>>(&mut self, path: &[S]) -> &mut Self {
        let mut node = self;
        for segment in path {
            let segment = segment.as_ref();
            let index = match node.branches.iter().position(|(key, _)| key == segment) {
                Some(index) => index,
                None => {
                    node.branches.push((segment.to_string(), Self::new()));
                    node.branches.len() - 1
                }
            };
            node = &mut node.branches[index].1;
        }
        node
    }

    #[must_use]
    pub fn branch(&self, key: &str) -> Option<&Self> {
        self.branches
            .iter()
            .find(|(branch, _)| branch == key)
            .map(|(_, tree)| tree)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.branches.iter().map(|(key, _)| key.as_str())
    }

    pub fn branches(&self) -> impl Iterator<Item = (&str, &Self)> {
        self.branches.iter().map(|(key, tree)| (key.as_str(), tree))
    }

    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.branches.is_empty()
    }

    /// Every root-to-leaf path of branch keys
    #[must_use]
    pub fn paths(&self) -> Vec<Vec<String>> {
        if self.branches.is_empty() {
            return vec![vec![]];
        }
        let mut paths = Vec::new();
        for (key, tree) in &self.branches {
            for mut rest in tree.paths() {
                rest.insert(0, key.clone());
                paths.push(rest);
            }
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let mut tree = PathTree::new();
        tree.put(&["1"], "a");
        tree.put(&["1", "b"], "b");
        tree.put::<&str>(&[], "root");
        tree.put(&["1"], "c");

        assert_eq!(tree.values(), &["root"]);
        let one = tree.branch("1").unwrap();
        assert_eq!(one.values(), &["a", "c"]);
        assert_eq!(one.branch("b").unwrap().values(), &["b"]);
        assert!(tree.branch("2").is_none());
    }

    #[test]
    fn test_keys_keep_insertion_order() {
        let mut tree: PathTree<()> = PathTree::new();
        tree.ensure(&["users"]);
        tree.ensure(&["comments", "users"]);
        tree.ensure(&["categories"]);
        assert_eq!(
            tree.keys().collect::<Vec<_>>(),
            vec!["users", "comments", "categories"]
        );
        assert_eq!(
            tree.paths(),
            vec![
                vec!["users".to_string()],
                vec!["comments".to_string(), "users".to_string()],
                vec!["categories".to_string()],
            ]
        );
    }

    #[test]
    fn test_empty() {
        let tree: PathTree<u8> = PathTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.paths(), vec![Vec::<String>::new()]);
    }
}
