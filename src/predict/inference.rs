//! Model inference for next-trick recommendations

use std::collections::HashSet;
use std::path::Path;

use burn::tensor::backend::Backend;
use serde::Serialize;

use crate::data::dataset::left_pad;
use crate::data::tricks::{clean_trick, Orientation, PassState, TrickCatalogue};
use crate::model::checkpoint::Checkpoint;
use crate::{Result, Tier};

/// Pseudo-tricks that may exist in a vocabulary but are never recommended
pub const EXCLUDED_TRICKS: [&str; 2] = ["END", "FALL"];

/// A candidate next trick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrickPrediction {
    pub trick: String,
    pub probability: f32,
}

/// A prediction the skier can actually perform next
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegalPrediction {
    pub trick: String,
    pub probability: f32,
    /// Position among the legal predictions, 0 = most likely
    pub rank: usize,
    /// Points on offer, 0 when the trick was already performed
    pub points: u32,
    pub already_performed: bool,
}

/// Keep predictions that start from `orientation`, or are one of the
/// `available_reverses`, and price them against what was already performed.
/// Input order is kept.
pub fn filter_legal<S: AsRef<str>, R: AsRef<str>>(
    predictions: &[TrickPrediction],
    orientation: Orientation,
    performed: &[S],
    catalogue: &TrickCatalogue,
    available_reverses: &[R],
) -> Vec<LegalPrediction> {
    let performed: HashSet<&str> = performed.iter().map(|t| clean_trick(t.as_ref())).collect();
    let reverses: HashSet<&str> = available_reverses.iter().map(|r| r.as_ref()).collect();

    predictions
        .iter()
        .filter_map(|p| {
            let def = catalogue.get(&p.trick)?;
            let legal = if def.reverse {
                reverses.contains(def.code.as_str())
            } else {
                def.start == orientation
            };
            legal.then_some((p, def))
        })
        .enumerate()
        .map(|(rank, (p, def))| {
            let already_performed = performed.contains(def.code.as_str());
            LegalPrediction {
                trick: p.trick.clone(),
                probability: p.probability,
                rank,
                points: if already_performed { 0 } else { def.points },
                already_performed,
            }
        })
        .collect()
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Predictor for one tier
pub struct Predictor<B: Backend> {
    checkpoint: Checkpoint<B>,
    device: B::Device,
}

impl<B: Backend> Predictor<B>
where
    B::FloatElem: serde::Serialize + serde::de::DeserializeOwned,
    B::IntElem: serde::Serialize + serde::de::DeserializeOwned,
{
    pub fn new(checkpoint: Checkpoint<B>, device: B::Device) -> Self {
        Predictor { checkpoint, device }
    }

    /// Load predictor from a saved tier checkpoint
    pub fn load(model_dir: impl AsRef<Path>, tier: Tier, device: B::Device) -> Result<Self> {
        let checkpoint = Checkpoint::load(model_dir, tier, &device)?;
        Ok(Self::new(checkpoint, device))
    }

    pub fn tier(&self) -> Tier {
        self.checkpoint.tier()
    }

    /// Encode a history into a model window. Unknown tricks are dropped.
    pub fn encode_history<S: AsRef<str>>(&self, history: &[S]) -> Vec<usize> {
        let ids: Vec<usize> = history
            .iter()
            .filter_map(|t| self.checkpoint.vocab.id(clean_trick(t.as_ref())))
            .collect();
        left_pad(&ids, self.checkpoint.seq_len())
    }

    /// All recommendable tricks with probabilities, most likely first
    pub fn predict<S: AsRef<str>>(&self, history: &[S]) -> Result<Vec<TrickPrediction>> {
        let window = self.encode_history(history);
        let logits = self.checkpoint.model.logits_for(&[window], &self.device)?;
        let probabilities = logits.first().map(|row| softmax(row)).unwrap_or_default();

        let mut predictions: Vec<TrickPrediction> = probabilities
            .into_iter()
            .enumerate()
            .filter_map(|(id, probability)| {
                let trick = self.checkpoint.vocab.token(id)?;
                (!EXCLUDED_TRICKS.contains(&trick)).then(|| TrickPrediction {
                    trick: trick.to_string(),
                    probability,
                })
            })
            .collect();

        predictions.sort_by(|a, b| {
            b.probability
                .partial_cmp(&a.probability)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(predictions)
    }

    /// The `n` most likely next tricks
    pub fn predict_top<S: AsRef<str>>(&self, history: &[S], n: usize) -> Result<Vec<TrickPrediction>> {
        let mut predictions = self.predict(history)?;
        predictions.truncate(n);
        Ok(predictions)
    }

    /// The `n` most likely next tricks that are legal after replaying
    /// `history` from `start`
    pub fn predict_legal<S: AsRef<str>>(
        &self,
        history: &[S],
        catalogue: &TrickCatalogue,
        start: Orientation,
        n: usize,
    ) -> Result<Vec<LegalPrediction>> {
        let state = PassState::replay(catalogue, start, history);
        let reverses = state.available_reverses();
        let mut legal = filter_legal(
            &self.predict(history)?,
            state.orientation,
            history,
            catalogue,
            reverses.as_slice(),
        );
        legal.truncate(n);
        Ok(legal)
    }
}

/// Format predictions for display
pub fn format_predictions(tier: Tier, history: &[String], predictions: &[TrickPrediction]) -> String {
    let mut out = String::new();
    out.push_str("┌─────────────────────────────────────────────────┐\n");
    out.push_str(&format!("│  Tier {} ({})\n", tier, tier.skill_level()));
    out.push_str(&format!("│  History: {}\n", if history.is_empty() { "-".to_string() } else { history.join(" ") }));
    out.push_str("├─────────────────────────────────────────────────┤\n");
    for (rank, p) in predictions.iter().enumerate() {
        out.push_str(&format!("│  {:>2}. {:<8} {:>5.1}%\n", rank + 1, p.trick, p.probability * 100.0));
    }
    out.push_str("└─────────────────────────────────────────────────┘\n");
    out
}

/// Format legal predictions with their points for display
pub fn format_legal_predictions(
    tier: Tier,
    history: &[String],
    predictions: &[LegalPrediction],
) -> String {
    let mut out = String::new();
    out.push_str("┌─────────────────────────────────────────────────┐\n");
    out.push_str(&format!("│  Tier {} ({}), legal next tricks\n", tier, tier.skill_level()));
    out.push_str(&format!("│  History: {}\n", if history.is_empty() { "-".to_string() } else { history.join(" ") }));
    out.push_str("├─────────────────────────────────────────────────┤\n");
    for p in predictions {
        let note = if p.already_performed { "  (done)" } else { "" };
        out.push_str(&format!(
            "│  {:>2}. {:<8} {:>5.1}%  {:>4} pts{}\n",
            p.rank + 1,
            p.trick,
            p.probability * 100.0,
            p.points,
            note
        ));
    }
    if predictions.is_empty() {
        out.push_str("│  No legal tricks in this tier's vocabulary\n");
    }
    out.push_str("└─────────────────────────────────────────────────┘\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::store::Vocabulary;
    use crate::data::tricks::Skis;
    use crate::model::checkpoint::ModelMetadata;
    use crate::model::gru::{TrickGru, TrickGruConfig};
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn predictor() -> Predictor<TestBackend> {
        let device = Default::default();
        let vocab = Vocabulary::from_tokens(["B", "END", "F", "FALL", "O"]);
        let config = TrickGruConfig {
            vocab_size: vocab.len(),
            embed_dim: 4,
            hidden_dim: 8,
            num_layers: 1,
        };
        let checkpoint = Checkpoint {
            model: TrickGru::new(&device, &config),
            metadata: ModelMetadata::new(Tier::Beginner, &config, 4),
            vocab,
        };
        Predictor::new(checkpoint, device)
    }

    #[test]
    fn test_softmax() {
        let p = softmax(&[1.0, 1.0, 1000.0]);
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(p[2] > 0.99);
    }

    #[test]
    fn test_encode_history_drops_unknown() {
        let predictor = predictor();
        // B=0, END=1, F=2, FALL=3, O=4
        assert_eq!(predictor.encode_history(&["O", "XX", "F (NC)"]), vec![0, 0, 4, 2]);
        assert_eq!(
            predictor.encode_history(&["B", "F", "O", "B", "F"]),
            vec![2, 4, 0, 2]
        );
    }

    #[test]
    fn test_predict_excludes_pseudo_tricks() {
        let predictor = predictor();
        let predictions = predictor.predict(&["B", "F"]).unwrap();

        assert_eq!(predictions.len(), 3);
        assert!(predictions.iter().all(|p| p.trick != "END" && p.trick != "FALL"));
        assert!(predictions.windows(2).all(|w| w[0].probability >= w[1].probability));

        let top = predictor.predict_top(&Vec::<String>::new(), 1).unwrap();
        assert_eq!(top.len(), 1);
    }

    fn prediction(trick: &str, probability: f32) -> TrickPrediction {
        TrickPrediction {
            trick: trick.to_string(),
            probability,
        }
    }

    #[test]
    fn test_filter_legal_by_orientation_and_reverses() {
        let catalogue = TrickCatalogue::new(Skis::One);
        let predictions = vec![
            prediction("BB", 0.3),
            prediction("RO", 0.2),
            prediction("O", 0.15),
            prediction("RB", 0.1),
            prediction("END", 0.1),
            prediction("B", 0.05),
        ];

        let legal = filter_legal(
            &predictions,
            Orientation::Front,
            &["O (NC)"],
            &catalogue,
            &["RO"],
        );

        let tricks: Vec<&str> = legal.iter().map(|p| p.trick.as_str()).collect();
        assert_eq!(tricks, vec!["RO", "O", "B"]);
        assert_eq!(legal.iter().map(|p| p.rank).collect::<Vec<_>>(), vec![0, 1, 2]);

        // O was already done this run
        assert!(legal[1].already_performed);
        assert_eq!(legal[1].points, 0);
        assert_eq!(legal[0].points, 90);
        assert_eq!(legal[2].points, 60);
    }

    #[test]
    fn test_predict_legal_follows_pass_state() {
        let predictor = predictor();
        let catalogue = TrickCatalogue::new(Skis::One);

        // After B the skier faces back: only F (B-F) of B, F, O is legal
        let legal = predictor
            .predict_legal(&["B"], &catalogue, Orientation::Front, 5)
            .unwrap();
        assert_eq!(legal.len(), 1);
        assert_eq!(legal[0].trick, "F");
        assert_eq!(legal[0].rank, 0);

        let table = format_legal_predictions(Tier::Beginner, &["B".to_string()], &legal);
        assert!(table.contains("60 pts"));
    }
}
