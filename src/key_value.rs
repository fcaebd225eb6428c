use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
/// One tag (`Tag-Name: value`) or one manifest entry (path and digest)
pub struct KeyValuePair {
    /// Tag label, or manifest path
    pub key: String,
    /// Tag value, or manifest digest
    pub value: String,
}

impl KeyValuePair {
    /// Pair from any string-like key and value
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Ordered list of key/value pairs where the same key may appear many times.
///
/// BagIt requires tag order to be preserved, so every projection follows insertion order.
pub struct KeyValueCollection {
    items: Vec<KeyValuePair>,
}

impl KeyValueCollection {
    /// Empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pair at the end, existing pairs with the same key are kept
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.items.push(KeyValuePair::new(key, value));
    }

    /// Every pair with this exact key
    pub fn find_by_key(&self, key: &str) -> Vec<&KeyValuePair> {
        self.items.iter().filter(|pair| pair.key == key).collect()
    }

    /// Every pair with this exact value
    pub fn find_by_value(&self, value: &str) -> Vec<&KeyValuePair> {
        self.items.iter().filter(|pair| pair.value == value).collect()
    }

    /// Distinct keys, in order of first appearance
    pub fn keys(&self) -> Vec<&str> {
        unique(self.items.iter().map(|pair| pair.key.as_str()))
    }

    /// Distinct values, in order of first appearance
    pub fn values(&self) -> Vec<&str> {
        unique(self.items.iter().map(|pair| pair.value.as_str()))
    }

    /// Every value stored under `key`, duplicates included
    pub fn values_for_key(&self, key: &str) -> Vec<&str> {
        self.items
            .iter()
            .filter(|pair| pair.key == key)
            .map(|pair| pair.value.as_str())
            .collect()
    }

    /// First value stored under `key`, or an empty string
    pub fn first_value_for_key(&self, key: &str) -> &str {
        self.items
            .iter()
            .find(|pair| pair.key == key)
            .map(|pair| pair.value.as_str())
            .unwrap_or_default()
    }

    /// Remove the first pair equal to `pair`, returns whether one was found
    pub fn delete(&mut self, pair: &KeyValuePair) -> bool {
        match self.items.iter().position(|item| item == pair) {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove every pair with this key, returns how many were removed
    pub fn delete_by_key(&mut self, key: &str) -> usize {
        let before = self.items.len();
        self.items.retain(|pair| pair.key != key);
        before - self.items.len()
    }

    /// Number of pairs
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// No pair at all
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remove every pair
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &KeyValuePair> {
        self.items.iter()
    }
}

fn unique<'a>(items: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(*item)).collect()
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for KeyValueCollection {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            items: iter
                .into_iter()
                .map(|(key, value)| KeyValuePair::new(key, value))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a KeyValueCollection {
    type Item = &'a KeyValuePair;
    type IntoIter = std::slice::Iter<'a, KeyValuePair>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod test {
    use super::{KeyValueCollection, KeyValuePair};

    fn sample() -> KeyValueCollection {
        KeyValueCollection::from_iter([
            ("Source-Organization", "Bag Makers Inc."),
            ("Contact-Name", "Jo Doe"),
            ("Internal-Sender-Identifier", "1234"),
            ("Contact-Name", "Sam Roe"),
            ("Bag-Group-Identifier", "1234"),
        ])
    }

    #[test]
    fn projections_follow_insertion_order() {
        let tags = sample();

        assert_eq!(tags.count(), 5);
        assert_eq!(
            tags.keys(),
            vec![
                "Source-Organization",
                "Contact-Name",
                "Internal-Sender-Identifier",
                "Bag-Group-Identifier",
            ]
        );
        assert_eq!(
            tags.values(),
            vec!["Bag Makers Inc.", "Jo Doe", "1234", "Sam Roe"]
        );
        assert_eq!(tags.values_for_key("Contact-Name"), vec!["Jo Doe", "Sam Roe"]);
        assert_eq!(tags.first_value_for_key("Contact-Name"), "Jo Doe");
    }

    #[test]
    fn lookups_are_case_sensitive() {
        let tags = sample();

        assert!(tags.find_by_key("contact-name").is_empty());
        assert_eq!(tags.find_by_key("Contact-Name").len(), 2);
        assert_eq!(
            tags.find_by_value("1234"),
            vec![
                &KeyValuePair::new("Internal-Sender-Identifier", "1234"),
                &KeyValuePair::new("Bag-Group-Identifier", "1234"),
            ]
        );
        assert_eq!(tags.first_value_for_key("Missing-Tag"), "");
    }

    #[test]
    fn delete_keeps_remaining_order() {
        let mut tags = sample();

        assert!(tags.delete(&KeyValuePair::new("Contact-Name", "Jo Doe")));
        assert!(!tags.delete(&KeyValuePair::new("Contact-Name", "Jo Doe")));
        assert_eq!(tags.values_for_key("Contact-Name"), vec!["Sam Roe"]);

        tags.append("Contact-Name", "Alex Poe");
        assert_eq!(tags.delete_by_key("Contact-Name"), 2);
        assert_eq!(
            tags.keys(),
            vec![
                "Source-Organization",
                "Internal-Sender-Identifier",
                "Bag-Group-Identifier",
            ]
        );
        assert_eq!(tags.count(), 3);
    }

    #[test]
    fn interleaved_appends() {
        let mut tags = KeyValueCollection::new();
        for (key, value) in [("b", "2"), ("a", "1"), ("b", "3"), ("c", "1"), ("a", "4")] {
            tags.append(key, value);
        }

        assert_eq!(tags.keys(), vec!["b", "a", "c"]);
        assert_eq!(tags.values(), vec!["2", "1", "3", "4"]);
        assert_eq!(
            tags.iter().map(|pair| pair.key.as_str()).collect::<Vec<_>>(),
            vec!["b", "a", "b", "c", "a"]
        );
    }
}
