use std::collections::HashMap;

/// Extracted contents of a save archive: a mutable key → bytes mapping,
/// readable and replaceable by key. Produced by the host's extractor and
/// shared between the parse pipeline and the primary load routine.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArchiveContents {
    files: HashMap<String, Vec<u8>>,
}

impl ArchiveContents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, bytes: Vec<u8>) {
        self.files.insert(key.into(), bytes);
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.files.get(key).map(Vec::as_slice)
    }

    /// Swap the bytes stored under an existing key, returning the previous
    /// contents. Absent keys are left absent.
    pub fn replace(&mut self, key: &str, bytes: Vec<u8>) -> Option<Vec<u8>> {
        self.files
            .get_mut(key)
            .map(|slot| std::mem::replace(slot, bytes))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(|bytes| bytes.len() as u64).sum()
    }
}

impl FromIterator<(String, Vec<u8>)> for ArchiveContents {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_swaps_existing_and_ignores_absent() {
        let mut archive = ArchiveContents::new();
        archive.insert("ships/a.json", b"old".to_vec());

        let previous = archive.replace("ships/a.json", b"new".to_vec());
        assert_eq!(previous.as_deref(), Some(b"old".as_slice()));
        assert_eq!(archive.get("ships/a.json"), Some(b"new".as_slice()));

        assert_eq!(archive.replace("missing", b"x".to_vec()), None);
        assert_eq!(archive.get("missing"), None);
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn total_bytes_sums_all_entries() {
        let archive: ArchiveContents = [
            ("a".to_string(), vec![0u8; 10]),
            ("b".to_string(), vec![0u8; 32]),
        ]
        .into_iter()
        .collect();
        assert_eq!(archive.total_bytes(), 42);
    }
}
