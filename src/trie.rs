//! Prefix tree over the command names the line editor can complete.

use std::collections::BTreeMap;

/// One prefix position in the trie.
///
/// Children are kept in a `BTreeMap`, so a depth-first walk visits words in
/// ascending order.
#[derive(Debug, Default)]
struct TrieNode {
    is_terminal: bool,
    children: BTreeMap<char, TrieNode>,
}

/// Result of a completion query.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Completions {
    /// Every registered word starting with the queried prefix, sorted ascending.
    pub words: Vec<String>,
    /// The first complete word met while the walk below the prefix had not yet
    /// seen a node with more than one child. Empty when the walk branched before
    /// reaching any complete word.
    ///
    /// This is a heuristic, not a longest common prefix: with `{"ab", "abc"}` and
    /// prefix `"a"` it yields `"ab"`, while with `{"abc", "abd"}` it yields nothing
    /// even though `"ab"` is shared. A complete word sitting on a branching node
    /// does not count either: `{"ab", "abc", "abd"}` yields nothing.
    pub common: String,
}

/// Completion trie built once from builtin and executable names.
#[derive(Debug, Default)]
pub struct Trie {
    root: TrieNode,
}

impl Trie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert every word from `words`.
    pub fn load_words<I, S>(&mut self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for word in words {
            self.insert(word.as_ref());
        }
    }

    /// Adds `word`; inserting an already present word is a no-op.
    pub fn insert(&mut self, word: &str) {
        let mut current = &mut self.root;
        for ch in word.chars() {
            current = current.children.entry(ch).or_default();
        }
        current.is_terminal = true;
    }

    /// Exact membership test.
    pub fn search(&self, word: &str) -> bool {
        self.find(word).is_some_and(|node| node.is_terminal)
    }

    /// True iff some registered word starts with `prefix`.
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.find(prefix).is_some()
    }

    /// Un-marks `word` as complete. Returns whether it was registered.
    ///
    /// Branches left without any complete word are not pruned.
    pub fn delete(&mut self, word: &str) -> bool {
        if word.is_empty() {
            return false;
        }
        let mut current = &mut self.root;
        for ch in word.chars() {
            match current.children.get_mut(&ch) {
                Some(child) => current = child,
                None => return false,
            }
        }
        std::mem::replace(&mut current.is_terminal, false)
    }

    /// Collect every registered word beginning with `prefix`.
    ///
    /// An unknown prefix yields empty words and an empty common completion.
    pub fn all_words(&self, prefix: &str) -> Completions {
        let mut completions = Completions::default();
        if let Some(node) = self.find(prefix) {
            let mut branched = false;
            let mut word = prefix.to_string();
            collect(node, &mut word, &mut completions, &mut branched);
        }
        completions
    }

    fn find(&self, prefix: &str) -> Option<&TrieNode> {
        let mut current = &self.root;
        for ch in prefix.chars() {
            current = current.children.get(&ch)?;
        }
        Some(current)
    }
}

fn collect(node: &TrieNode, word: &mut String, out: &mut Completions, branched: &mut bool) {
    if node.children.len() > 1 {
        *branched = true;
    }
    if node.is_terminal {
        if out.common.is_empty() && !*branched {
            out.common = word.clone();
        }
        out.words.push(word.clone());
    }
    for (ch, child) in &node.children {
        word.push(*ch);
        collect(child, word, out, branched);
        word.pop();
    }
}

impl<S: AsRef<str>> FromIterator<S> for Trie {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut trie = Trie::new();
        trie.load_words(iter);
        trie
    }
}
