//! Trainable sequence classifiers.

use log::debug;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::classifier::softmax::SoftmaxWeights;
use crate::classifier::{Classifier, SoftmaxParams, SoftmaxRegression};
use crate::dataset::Example;
use crate::encoder::Encoder;
use crate::error::{Result, SheafError};
use crate::features::{BatchProducer, EncoderBatchProducer, FeatureMatrix, LabelVector, ScoreMatrix};
use crate::tokenizer::{TokenizeOptions, Tokenizer};

/// A text classifier trained epoch by epoch.
///
/// Weights are exchanged as opaque byte snapshots, which serve both as the
/// in-memory copy of the best epoch and as the checkpoint file contents.
pub trait SequenceClassifier {
    fn name(&self) -> &str;

    /// One pass over `examples`; returns the mean training loss.
    fn train_epoch(&mut self, examples: &[Example], rng: &mut StdRng) -> Result<f64>;

    /// Mean loss on `examples` without updating weights.
    fn loss(&self, examples: &[Example]) -> Result<f64>;

    fn predict_proba(&self, examples: &[Example]) -> Result<ScoreMatrix>;

    fn snapshot(&self) -> Result<Vec<u8>>;

    fn restore(&mut self, snapshot: &[u8]) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct HeadSnapshot {
    encoder: String,
    weights: SoftmaxWeights,
}

/// A frozen encoder followed by a softmax classification head.
///
/// Examples are tokenized and encoded on every call and the flattened encoder
/// output feeds the head; only the head is trained.
pub struct EncoderClassifier {
    tokenizer: Box<dyn Tokenizer>,
    encoder: Box<dyn Encoder>,
    options: TokenizeOptions,
    batch_size: usize,
    head: SoftmaxRegression,
}

impl EncoderClassifier {
    pub fn new(
        tokenizer: Box<dyn Tokenizer>,
        encoder: Box<dyn Encoder>,
        options: TokenizeOptions,
        batch_size: usize,
        head: SoftmaxParams,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(SheafError::invalid_argument("batch_size must be positive"));
        }
        Ok(EncoderClassifier {
            tokenizer,
            encoder,
            options,
            batch_size,
            head: SoftmaxRegression::new(head),
        })
    }

    pub fn head(&self) -> &SoftmaxRegression {
        &self.head
    }

    fn features(&self, examples: &[Example]) -> Result<(FeatureMatrix, LabelVector)> {
        let producer = EncoderBatchProducer::new(
            self.tokenizer.as_ref(),
            self.encoder.as_ref(),
            self.options,
            self.batch_size,
        )?;
        let refs: Vec<&Example> = examples.iter().collect();
        let matrix = FeatureMatrix::from_rows(producer.produce(&refs)?)?;
        let labels = examples.iter().map(|e| e.label).collect();
        Ok((matrix, labels))
    }
}

impl SequenceClassifier for EncoderClassifier {
    fn name(&self) -> &str {
        self.encoder.name()
    }

    fn train_epoch(&mut self, examples: &[Example], rng: &mut StdRng) -> Result<f64> {
        let (x, y) = self.features(examples)?;
        if !self.head.is_fitted() {
            let n_classes = y
                .num_classes()
                .max(self.head.params().num_classes.unwrap_or(0));
            debug!("initialising head: {} features, {n_classes} classes", x.cols());
            self.head.initialize(x.cols(), n_classes);
        }
        self.head.train_epoch(&x, &y, rng)
    }

    fn loss(&self, examples: &[Example]) -> Result<f64> {
        let (x, y) = self.features(examples)?;
        self.head.loss(&x, &y)
    }

    fn predict_proba(&self, examples: &[Example]) -> Result<ScoreMatrix> {
        let (x, _) = self.features(examples)?;
        self.head.predict_proba(&x)
    }

    fn snapshot(&self) -> Result<Vec<u8>> {
        let weights = self
            .head
            .weights()
            .ok_or_else(|| SheafError::training("classification head is not initialised"))?;
        let snapshot = HeadSnapshot {
            encoder: self.encoder.name().to_string(),
            weights: weights.clone(),
        };
        Ok(bincode::serialize(&snapshot)?)
    }

    fn restore(&mut self, snapshot: &[u8]) -> Result<()> {
        let snapshot: HeadSnapshot = bincode::deserialize(snapshot)?;
        if snapshot.encoder != self.encoder.name() {
            return Err(SheafError::model(format!(
                "checkpoint was trained on encoder '{}', not '{}'",
                snapshot.encoder,
                self.encoder.name()
            )));
        }
        self.head.set_weights(snapshot.weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::hashing::HashingEncoder;
    use crate::tokenizer::HashingTokenizer;
    use rand::SeedableRng;

    fn model(name: &str) -> EncoderClassifier {
        EncoderClassifier::new(
            Box::new(HashingTokenizer::default()),
            Box::new(HashingEncoder::new(name, 4, 7).unwrap()),
            TokenizeOptions {
                max_length: 4,
                ..Default::default()
            },
            2,
            SoftmaxParams {
                learning_rate: 0.5,
                num_classes: Some(3),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn examples() -> Vec<Example> {
        vec![
            Example::new("good", 0),
            Example::new("bad", 1),
            Example::new("good good", 0),
            Example::new("bad bad", 1),
        ]
    }

    #[test]
    fn test_training_lowers_loss() {
        let mut model = model("hashing");
        let mut rng = StdRng::seed_from_u64(0);
        let first = model.train_epoch(&examples(), &mut rng).unwrap();
        for _ in 0..30 {
            model.train_epoch(&examples(), &mut rng).unwrap();
        }
        assert!(model.loss(&examples()).unwrap() < first);

        let scores = model.predict_proba(&examples()).unwrap();
        assert_eq!(scores.shape(), (4, 3));
    }

    #[test]
    fn test_snapshot_roundtrip_and_encoder_check() {
        let mut trained = model("hashing");
        let mut rng = StdRng::seed_from_u64(0);
        trained.train_epoch(&examples(), &mut rng).unwrap();
        let snapshot = trained.snapshot().unwrap();

        let mut fresh = model("hashing");
        assert!(fresh.snapshot().is_err());
        fresh.restore(&snapshot).unwrap();
        assert_eq!(fresh.head().weights(), trained.head().weights());

        let mut other = model("hashing-other");
        assert!(matches!(other.restore(&snapshot), Err(SheafError::Model(_))));
    }
}
