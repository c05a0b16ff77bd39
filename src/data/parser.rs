//! Trick-run log parser
//!
//! Competition logs are loosely formatted, tab or whitespace separated lines.
//! Each usable line names a skier, a pass number and one trick followed by its
//! outcome. Lines that don't fit are skipped and counted, never fatal.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::data::tricks;
use crate::{Result, TrickSequence};

/// Below this many tab-separated fields a line is re-split on whitespace
const MIN_TAB_FIELDS: usize = 10;

/// Judged outcome of a trick attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Credit,
    Repeat,
    OutOfCourse,
    Fall,
    NoCredit,
}

impl Outcome {
    /// Match an outcome keyword exactly as it appears in the logs
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "Credit" => Some(Outcome::Credit),
            "Repeat" => Some(Outcome::Repeat),
            "OOC" => Some(Outcome::OutOfCourse),
            "Fall" => Some(Outcome::Fall),
            "No" | "NoCredit" | "No-Credit" => Some(Outcome::NoCredit),
            _ => None,
        }
    }

    pub fn is_credited(&self) -> bool {
        matches!(self, Outcome::Credit)
    }
}

/// Skier identity as written in the log
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SkierKey {
    pub name: String,
    pub id: String,
}

/// One trick attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrickEntry {
    pub code: String,
    pub outcome: Outcome,
    /// Points column following the outcome, when the log has one
    pub points: Option<u32>,
}

impl TrickEntry {
    /// Points this attempt adds to the run score. Without a points column the
    /// catalogue value is used.
    pub fn credited_points(&self) -> u32 {
        if !self.outcome.is_credited() {
            return 0;
        }
        self.points
            .or_else(|| tricks::standard_points(&self.code))
            .unwrap_or(0)
    }
}

/// A successfully parsed log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub skier: SkierKey,
    pub pass: u64,
    pub trick: TrickEntry,
}

/// Why a line was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    Blank,
    TooFewFields,
    NoPassNumber,
    NoOutcome,
    NumericTrickCode,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::Blank => "blank",
            SkipReason::TooFewFields => "too few fields",
            SkipReason::NoPassNumber => "no pass number",
            SkipReason::NoOutcome => "no outcome keyword",
            SkipReason::NumericTrickCode => "numeric trick code",
        };
        write!(f, "{}", s)
    }
}

fn is_ascii_number(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

fn split_fields(line: &str) -> Vec<&str> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < MIN_TAB_FIELDS {
        line.split_whitespace().collect()
    } else {
        fields
    }
}

/// Parse a single log line
pub fn parse_line(line: &str) -> std::result::Result<ParsedLine, SkipReason> {
    let line = line.trim();
    if line.is_empty() {
        return Err(SkipReason::Blank);
    }

    let fields = split_fields(line);
    if fields.len() < 2 {
        return Err(SkipReason::TooFewFields);
    }

    // First purely numeric token is taken as the pass number
    let pass = fields
        .iter()
        .find(|t| is_ascii_number(t))
        .and_then(|t| t.parse::<u64>().ok())
        .ok_or(SkipReason::NoPassNumber)?;

    let outcome_idx = fields
        .iter()
        .position(|t| Outcome::from_token(t).is_some())
        .filter(|&i| i > 0)
        .ok_or(SkipReason::NoOutcome)?;

    let code = fields[outcome_idx - 1];
    if is_ascii_number(code) {
        return Err(SkipReason::NumericTrickCode);
    }

    let outcome = Outcome::from_token(fields[outcome_idx]).ok_or(SkipReason::NoOutcome)?;
    let points = fields
        .get(outcome_idx + 1)
        .filter(|t| is_ascii_number(t))
        .and_then(|t| t.parse::<u32>().ok());

    Ok(ParsedLine {
        skier: SkierKey {
            name: fields[0].to_string(),
            id: fields[1].to_string(),
        },
        pass,
        trick: TrickEntry {
            code: code.to_string(),
            outcome,
            points,
        },
    })
}

/// Line counts from a parse
#[derive(Debug, Clone, Default)]
pub struct ParseStats {
    pub lines: usize,
    pub parsed: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
}

impl ParseStats {
    pub fn skipped_total(&self) -> usize {
        self.skipped.iter().filter(|(r, _)| **r != SkipReason::Blank).map(|(_, n)| n).sum()
    }

    pub fn merge(&mut self, other: &ParseStats) {
        self.lines += other.lines;
        self.parsed += other.parsed;
        for (reason, count) in &other.skipped {
            *self.skipped.entry(*reason).or_default() += count;
        }
    }
}

impl fmt::Display for ParseStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lines, {} tricks, {} skipped",
            self.lines,
            self.parsed,
            self.skipped_total()
        )?;
        for (reason, count) in &self.skipped {
            if *reason != SkipReason::Blank {
                write!(f, " [{}: {}]", reason, count)?;
            }
        }
        Ok(())
    }
}

/// All passes of one skier
#[derive(Debug, Clone)]
pub struct SkierRecord {
    pub key: SkierKey,
    /// Tricks per pass number, in log order
    pub passes: BTreeMap<u64, Vec<TrickEntry>>,
    /// Best single-log run score (credited points over all passes)
    pub best_score: u32,
}

impl SkierRecord {
    fn new(key: SkierKey) -> Self {
        SkierRecord {
            key,
            passes: BTreeMap::new(),
            best_score: 0,
        }
    }

    fn run_score(&self) -> u32 {
        self.passes
            .values()
            .flatten()
            .fold(0u32, |score, trick| score.saturating_add(trick.credited_points()))
    }

    /// Pass sequences with more than one trick, in pass order
    pub fn sequences(&self) -> impl Iterator<Item = TrickSequence> + '_ {
        self.passes
            .values()
            .filter(|tricks| tricks.len() > 1)
            .map(|tricks| tricks.iter().map(|t| t.code.clone()).collect())
    }
}

/// Tricks accumulated per skier and pass, keeping first-seen skier order
#[derive(Debug, Clone, Default)]
pub struct TrickLog {
    skiers: Vec<SkierRecord>,
    index: HashMap<SkierKey, usize>,
    pub stats: ParseStats,
}

impl TrickLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn skier_mut(&mut self, key: &SkierKey) -> &mut SkierRecord {
        let idx = match self.index.get(key) {
            Some(&idx) => idx,
            None => {
                self.skiers.push(SkierRecord::new(key.clone()));
                self.index.insert(key.clone(), self.skiers.len() - 1);
                self.skiers.len() - 1
            }
        };
        &mut self.skiers[idx]
    }

    /// Parse one log from a reader. Scores are computed per log.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut log = TrickLog::new();

        for line in reader.lines() {
            let line = line?;
            log.stats.lines += 1;

            match parse_line(&line) {
                Ok(parsed) => {
                    log.stats.parsed += 1;
                    log.skier_mut(&parsed.skier)
                        .passes
                        .entry(parsed.pass)
                        .or_default()
                        .push(parsed.trick);
                }
                Err(reason) => {
                    if reason != SkipReason::Blank {
                        log::debug!("Skipping line {} ({}): {}", log.stats.lines, reason, line);
                    }
                    *log.stats.skipped.entry(reason).or_default() += 1;
                }
            }
        }

        for skier in &mut log.skiers {
            skier.best_score = skier.run_score();
        }

        Ok(log)
    }

    pub fn parse_str(text: &str) -> Result<Self> {
        Self::from_reader(text.as_bytes())
    }

    /// Parse one log file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let log = Self::from_reader(BufReader::new(file))?;
        log::info!("Parsed {}: {}", path.display(), log.stats);
        Ok(log)
    }

    /// Parse several files and merge them in order
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut merged = TrickLog::new();
        for path in paths {
            merged.merge(Self::from_file(path)?);
        }
        Ok(merged)
    }

    /// Merge another log into this one. Matching passes are extended in order
    /// and each skier keeps their best single-log score.
    pub fn merge(&mut self, other: TrickLog) {
        self.stats.merge(&other.stats);
        for record in other.skiers {
            let skier = self.skier_mut(&record.key);
            for (pass, tricks) in record.passes {
                skier.passes.entry(pass).or_default().extend(tricks);
            }
            skier.best_score = skier.best_score.max(record.best_score);
        }
    }

    pub fn skiers(&self) -> &[SkierRecord] {
        &self.skiers
    }

    /// All retained pass sequences
    pub fn sequences(&self) -> Vec<TrickSequence> {
        self.skiers.iter().flat_map(|s| s.sequences()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_whitespace_line() {
        let parsed = parse_line("Smith 1234 Open 1 BB Credit 40").unwrap();
        assert_eq!(parsed.skier.name, "Smith");
        assert_eq!(parsed.skier.id, "1234");
        // skier id is the first numeric token
        assert_eq!(parsed.pass, 1234);
        assert_eq!(parsed.trick.code, "BB");
        assert_eq!(parsed.trick.outcome, Outcome::Credit);
        assert_eq!(parsed.trick.points, Some(40));
    }

    #[test]
    fn test_parse_tab_line() {
        let line = "Doe\tA12\tM1\tx\ty\tz\t2\t3\tWB\tNo-Credit\t";
        let parsed = parse_line(line).unwrap();
        assert_eq!(parsed.pass, 2);
        assert_eq!(parsed.trick.code, "WB");
        assert_eq!(parsed.trick.outcome, Outcome::NoCredit);
        assert_eq!(parsed.trick.points, None);
        assert_eq!(parsed.trick.credited_points(), 0);
    }

    #[test]
    fn test_skip_reasons() {
        assert_eq!(parse_line("   "), Err(SkipReason::Blank));
        assert_eq!(parse_line("Solo"), Err(SkipReason::TooFewFields));
        assert_eq!(parse_line("Doe AB BB Credit"), Err(SkipReason::NoPassNumber));
        assert_eq!(parse_line("Doe AB 1 BB Landed"), Err(SkipReason::NoOutcome));
        assert_eq!(parse_line("Doe AB 1 2 Fall"), Err(SkipReason::NumericTrickCode));
    }

    #[test]
    fn test_first_outcome_keyword_wins() {
        let parsed = parse_line("Doe AB 1 O Repeat F Credit").unwrap();
        assert_eq!(parsed.trick.code, "O");
        assert_eq!(parsed.trick.outcome, Outcome::Repeat);
    }

    #[test]
    fn test_accumulate_passes_and_drop_singletons() {
        let text = "\
Ann A1 P 1 S Credit 40
Ann A1 P 1 B Credit 60
Bob B1 P 1 O Fall
Ann A1 P 2 F Credit 60
Ann A1 P 2 BB OOC
garbage
Bob B1 P 1 BB Credit 90
";
        let log = TrickLog::parse_str(text).unwrap();
        assert_eq!(log.stats.lines, 7);
        assert_eq!(log.stats.parsed, 6);
        assert_eq!(log.stats.skipped_total(), 1);

        let seqs = log.sequences();
        assert_eq!(
            seqs,
            vec![
                vec!["S".to_string(), "B".to_string()],
                vec!["F".to_string(), "BB".to_string()],
                vec!["O".to_string(), "BB".to_string()],
            ]
        );

        let ann = &log.skiers()[0];
        assert_eq!(ann.best_score, 160);
        assert_eq!(log.skiers()[1].best_score, 90);
    }

    #[test]
    fn test_passes_sorted_numerically() {
        let text = "\
Ann X 10 S Credit
Ann X 10 B Credit
Ann X 9 O Credit
Ann X 9 F Credit
";
        let log = TrickLog::parse_str(text).unwrap();
        assert_eq!(log.sequences()[0], vec!["O".to_string(), "F".to_string()]);
    }

    #[test]
    fn test_merge_extends_passes_and_keeps_best_score() {
        let first = TrickLog::parse_str("Ann X 1 S Credit 300\n").unwrap();
        let second = TrickLog::parse_str("Ann X 1 B Credit 100\nAnn X 1 O Fall\n").unwrap();

        let mut merged = TrickLog::new();
        merged.merge(first);
        merged.merge(second);

        assert_eq!(merged.skiers().len(), 1);
        assert_eq!(
            merged.sequences(),
            vec![vec!["S".to_string(), "B".to_string(), "O".to_string()]]
        );
        assert_eq!(merged.skiers()[0].best_score, 300);
        assert_eq!(merged.stats.parsed, 3);
    }

    #[test]
    fn test_huge_points_saturate_score() {
        let log =
            TrickLog::parse_str("Ann X 1 S Credit 4000000000\nAnn X 1 B Credit 4000000000\n")
                .unwrap();
        assert_eq!(log.skiers()[0].best_score, u32::MAX);
    }

    #[test]
    fn test_catalogue_points_without_points_column() {
        let text = "\
Ann X 1 W5B Credit
Ann X 1 RW5B Credit
Ann X 1 WO Fall
Ann X 1 ZZ Credit
";
        let log = TrickLog::parse_str(text).unwrap();
        assert_eq!(log.skiers()[0].best_score, 620);
    }
}
