use std::{collections::BTreeMap, fs, path::Path};

use crate::error::{Error, Result};

pub const IDENPROF_LABELS: [&str; 10] = [
    "chef",
    "doctor",
    "engineer",
    "farmer",
    "firefighter",
    "judge",
    "mechanic",
    "pilot",
    "police",
    "waiter",
];

/// Index to label mapping of the classifier outputs.
///
/// Output `i` of the network is the probability of `labels[i]`. On disk the
/// dictionary is a JSON object keyed by the decimal index, e.g.
/// `{"0": "chef", "1": "doctor"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDictionary {
    labels: Vec<String>,
}

impl ClassDictionary {
    pub fn idenprof() -> Self {
        Self {
            labels: IDENPROF_LABELS.iter().map(|label| label.to_string()).collect(),
        }
    }

    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(Error::ClassDictionary("no labels".to_string()));
        }

        for (index, label) in labels.iter().enumerate() {
            if label.is_empty() {
                return Err(Error::ClassDictionary(format!("label {index} is empty")));
            }
            if labels[..index].contains(label) {
                return Err(Error::ClassDictionary(format!(
                    "label '{label}' appears more than once"
                )));
            }
        }

        Ok(Self { labels })
    }

    pub fn from_index_map(map: BTreeMap<String, String>) -> Result<Self> {
        let mut labels = vec![None; map.len()];

        for (key, label) in map {
            let index = key
                .parse::<usize>()
                .ok()
                .filter(|index| index.to_string() == key)
                .ok_or_else(|| Error::ClassDictionary(format!("key '{key}' is not an index")))?;

            let slot = labels.get_mut(index).ok_or_else(|| {
                Error::ClassDictionary(format!("index {index} leaves a gap in the key range"))
            })?;
            *slot = Some(label);
        }

        // Canonical keys are unique, so every slot is filled once in-range keys are checked.
        Self::new(labels.into_iter().flatten().collect())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let map: BTreeMap<String, String> = serde_json::from_str(&fs::read_to_string(path)?)?;
        Self::from_index_map(map)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let map: BTreeMap<String, &str> = self
            .labels
            .iter()
            .enumerate()
            .map(|(index, label)| (index.to_string(), label.as_str()))
            .collect();

        fs::write(path, serde_json::to_string_pretty(&map)?)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(key, label)| (key.to_string(), label.to_string()))
            .collect()
    }

    #[test]
    fn idenprof_has_ten_professions_in_index_order() {
        let classes = ClassDictionary::idenprof();

        assert_eq!(classes.len(), 10);
        assert_eq!(classes.labels()[0], "chef");
        assert_eq!(classes.labels()[9], "waiter");
        assert_eq!(classes.labels()[5], "judge");
    }

    #[test]
    fn index_map_orders_by_numeric_key() {
        // Lexical order would put "10" before "2".
        let entries: Vec<(String, String)> =
            (0..11).map(|i| (i.to_string(), format!("class{i}"))).collect();
        let classes = ClassDictionary::from_index_map(entries.into_iter().collect()).unwrap();

        assert_eq!(classes.labels()[2], "class2");
        assert_eq!(classes.labels()[10], "class10");
    }

    #[test]
    fn index_map_rejects_gaps() {
        let err = ClassDictionary::from_index_map(map(&[("0", "chef"), ("2", "farmer")]));
        assert!(matches!(err, Err(Error::ClassDictionary(_))));
    }

    #[test]
    fn index_map_rejects_non_canonical_keys() {
        for key in ["01", "one", "-1", " 1"] {
            let err = ClassDictionary::from_index_map(map(&[("0", "chef"), (key, "doctor")]));
            assert!(matches!(err, Err(Error::ClassDictionary(_))), "{key}");
        }
    }

    #[test]
    fn duplicate_and_empty_labels_are_rejected() {
        assert!(ClassDictionary::new(vec!["chef".into(), "chef".into()]).is_err());
        assert!(ClassDictionary::new(vec!["chef".into(), String::new()]).is_err());
        assert!(ClassDictionary::new(vec![]).is_err());
    }

    #[test]
    fn save_then_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classes.json");

        ClassDictionary::idenprof().save(&path).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("\"9\": \"waiter\""));

        assert_eq!(ClassDictionary::load(&path).unwrap(), ClassDictionary::idenprof());
    }

    #[test]
    fn loads_an_index_keyed_dictionary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classes.json");
        fs::write(&path, r#"{"1": "doctor", "0": "chef"}"#).unwrap();

        let classes = ClassDictionary::load(&path).unwrap();
        assert_eq!(classes.labels(), ["chef", "doctor"]);
    }
}
