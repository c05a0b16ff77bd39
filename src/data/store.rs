//! Tier sequence store and vocabularies
//!
//! Sequences are written as JSON, one merged file for everything and one file
//! per tier. Each tier gets its own vocabulary built from its own sequences.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::parser::TrickLog;
use crate::{Result, Tier, TrickSequence};

/// Merged output of all parsed logs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergedSequences {
    pub sequences: Vec<TrickSequence>,
    pub vocab: Vec<String>,
}

impl MergedSequences {
    pub fn new(sequences: Vec<TrickSequence>) -> Self {
        let vocab = Vocabulary::from_sequences(&sequences).tokens().to_vec();
        MergedSequences { sequences, vocab }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(path.as_ref(), self)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }
}

/// Contents of a sequences_<tier>.json file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SequenceFile {
    pub sequences: Vec<TrickSequence>,
}

/// Sorted trick vocabulary. Id 0 doubles as the padding token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    itos: Vec<String>,
    stoi: HashMap<String, usize>,
}

impl Vocabulary {
    /// Build from arbitrary tokens; duplicates are removed and order is sorted
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sorted: BTreeSet<String> = tokens.into_iter().map(Into::into).collect();
        let itos: Vec<String> = sorted.into_iter().collect();
        let stoi = itos
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        Vocabulary { itos, stoi }
    }

    pub fn from_sequences(sequences: &[TrickSequence]) -> Self {
        Self::from_tokens(sequences.iter().flatten().cloned())
    }

    pub fn len(&self) -> usize {
        self.itos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.itos.is_empty()
    }

    pub fn id(&self, token: &str) -> Option<usize> {
        self.stoi.get(token).copied()
    }

    pub fn token(&self, id: usize) -> Option<&str> {
        self.itos.get(id).map(String::as_str)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.stoi.contains_key(token)
    }

    /// Tokens in id order
    pub fn tokens(&self) -> &[String] {
        &self.itos
    }

    /// Map a sequence to ids, `None` for unknown tricks
    pub fn encode(&self, sequence: &[String]) -> Vec<Option<usize>> {
        sequence.iter().map(|t| self.id(t)).collect()
    }

    /// Token to id, serialized as stoi_<tier>.json
    pub fn stoi_map(&self) -> BTreeMap<String, usize> {
        self.stoi.iter().map(|(t, &i)| (t.clone(), i)).collect()
    }

    /// Id to token, serialized as itos_<tier>.json with string keys
    pub fn itos_map(&self) -> BTreeMap<usize, String> {
        self.itos.iter().cloned().enumerate().collect()
    }
}

/// Bucket every retained pass by its skier's tier
pub fn bucket_by_tier(log: &TrickLog) -> BTreeMap<Tier, Vec<TrickSequence>> {
    let mut tiers: BTreeMap<Tier, Vec<TrickSequence>> =
        Tier::ALL.iter().map(|t| (*t, Vec::new())).collect();

    for skier in log.skiers() {
        let tier = Tier::for_score(skier.best_score);
        tiers.entry(tier).or_default().extend(skier.sequences());
    }

    tiers
}

/// Directory of per-tier sequence files
#[derive(Debug, Clone)]
pub struct TierStore {
    dir: PathBuf,
}

impl TierStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        TierStore { dir: dir.into() }
    }

    pub fn path(&self, tier: Tier) -> PathBuf {
        self.dir.join(format!("sequences_{}.json", tier.name()))
    }

    pub fn save(&self, tier: Tier, sequences: &[TrickSequence]) -> Result<()> {
        let file = SequenceFile {
            sequences: sequences.to_vec(),
        };
        write_json(&self.path(tier), &file)
    }

    pub fn save_all(&self, tiers: &BTreeMap<Tier, Vec<TrickSequence>>) -> Result<()> {
        for (tier, sequences) in tiers {
            self.save(*tier, sequences)?;
            log::info!(
                "Tier {}: {} sequences -> {}",
                tier,
                sequences.len(),
                self.path(*tier).display()
            );
        }
        Ok(())
    }

    pub fn load(&self, tier: Tier) -> Result<Vec<TrickSequence>> {
        let file: SequenceFile = read_json(&self.path(tier))?;
        Ok(file.sequences)
    }

    pub fn exists(&self, tier: Tier) -> bool {
        self.path(tier).exists()
    }
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content)?;
    Ok(())
}

pub(crate) fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(tricks: &[&str]) -> TrickSequence {
        tricks.iter().map(|t| t.to_string()).collect()
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tricks-store-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_vocabulary_sorted_and_stable() {
        let seqs = vec![seq(&["O", "BB", "S"]), seq(&["B", "O"])];
        let vocab = Vocabulary::from_sequences(&seqs);
        assert_eq!(vocab.tokens(), &["B", "BB", "O", "S"]);
        assert_eq!(vocab.id("B"), Some(0));
        assert_eq!(vocab.id("S"), Some(3));
        assert_eq!(vocab.token(2), Some("O"));
        assert_eq!(vocab.id("WB"), None);

        let reversed: Vec<TrickSequence> = seqs.into_iter().rev().collect();
        assert_eq!(Vocabulary::from_sequences(&reversed), vocab);
    }

    #[test]
    fn test_encode_marks_unknown() {
        let vocab = Vocabulary::from_tokens(["F", "B"]);
        assert_eq!(vocab.encode(&seq(&["B", "X", "F"])), vec![Some(0), None, Some(1)]);
    }

    #[test]
    fn test_itos_serializes_with_string_keys() {
        let vocab = Vocabulary::from_tokens(["F", "B"]);
        let json = serde_json::to_string(&vocab.itos_map()).unwrap();
        assert_eq!(json, r#"{"0":"B","1":"F"}"#);
        let back: BTreeMap<usize, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vocab.itos_map());
    }

    #[test]
    fn test_bucket_by_tier() {
        let text = "\
Pro P1 x 1 W5B Credit 7200
Pro P1 x 1 W5F Credit 310
Kid K1 x 1 S Credit 40
Kid K1 x 1 B Credit 60
";
        let log = TrickLog::parse_str(text).unwrap();
        let tiers = bucket_by_tier(&log);
        assert_eq!(tiers.len(), 4);
        assert_eq!(tiers[&Tier::Pro], vec![seq(&["W5B", "W5F"])]);
        assert_eq!(tiers[&Tier::Beginner], vec![seq(&["S", "B"])]);
        assert!(tiers[&Tier::Advanced].is_empty());
    }

    #[test]
    fn test_store_roundtrip_and_missing_tier() {
        let dir = temp_dir("roundtrip");
        let store = TierStore::new(&dir);
        let seqs = vec![seq(&["S", "B", "F"])];
        store.save(Tier::Intermediate, &seqs).unwrap();

        assert!(store.exists(Tier::Intermediate));
        assert_eq!(store.load(Tier::Intermediate).unwrap(), seqs);
        assert!(matches!(store.load(Tier::Pro), Err(crate::TrickError::Io(_))));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_merged_sequences_vocab() {
        let merged = MergedSequences::new(vec![seq(&["O", "B"]), seq(&["B", "S"])]);
        assert_eq!(merged.vocab, vec!["B", "O", "S"]);
    }
}
