use crate::model_service::ModelError;
use serde::{ser::SerializeMap, Serialize, Serializer};

pub const CLASS_COUNT: usize = 4;

// Softmax outputs can drift slightly past the unit interval.
const PROBABILITY_TOLERANCE: f32 = 1e-4;

/// Diagnostic classes in the order the model emits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TumorClass {
    Glioma,
    Meningioma,
    NoTumor,
    Pituitary,
}

impl TumorClass {
    pub const ALL: [TumorClass; CLASS_COUNT] = [
        TumorClass::Glioma,
        TumorClass::Meningioma,
        TumorClass::NoTumor,
        TumorClass::Pituitary,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TumorClass::Glioma => "Glioma",
            TumorClass::Meningioma => "Meningioma",
            TumorClass::NoTumor => "No Tumor",
            TumorClass::Pituitary => "Pituitary",
        }
    }

    pub fn labels() -> Vec<&'static str> {
        Self::ALL.iter().map(TumorClass::label).collect()
    }
}

/// Per-class probabilities for one image. Serializes as `{label: probability}`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    probabilities: [f32; CLASS_COUNT],
}

impl Prediction {
    pub fn from_scores(scores: &[f32]) -> Result<Self, ModelError> {
        if scores.len() != CLASS_COUNT {
            return Err(ModelError::OutputShape {
                expected: CLASS_COUNT,
                actual: scores.len(),
            });
        }

        let mut probabilities = [0.0; CLASS_COUNT];
        for (index, (slot, &score)) in probabilities.iter_mut().zip(scores).enumerate() {
            if !score.is_finite()
                || score < -PROBABILITY_TOLERANCE
                || score > 1.0 + PROBABILITY_TOLERANCE
            {
                return Err(ModelError::InvalidProbability {
                    label: TumorClass::ALL[index].label(),
                    value: score,
                });
            }
            *slot = score.clamp(0.0, 1.0);
        }

        Ok(Self { probabilities })
    }

    pub fn iter(&self) -> impl Iterator<Item = (TumorClass, f32)> + '_ {
        TumorClass::ALL
            .iter()
            .copied()
            .zip(self.probabilities.iter().copied())
    }

    /// Highest scoring class; the earliest class wins ties.
    pub fn top_class(&self) -> TumorClass {
        self.iter()
            .reduce(|best, next| if next.1 > best.1 { next } else { best })
            .map(|(class, _)| class)
            .unwrap_or(TumorClass::Glioma)
    }
}

impl Serialize for Prediction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(CLASS_COUNT))?;
        for (class, probability) in self.iter() {
            map.serialize_entry(class.label(), &probability)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probability(prediction: &Prediction, class: TumorClass) -> f32 {
        prediction
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, p)| p)
            .unwrap()
    }

    #[test]
    fn test_from_scores_maps_labels_in_order() {
        let prediction = Prediction::from_scores(&[0.1, 0.2, 0.3, 0.4]).unwrap();

        assert_eq!(probability(&prediction, TumorClass::Glioma), 0.1);
        assert_eq!(probability(&prediction, TumorClass::Meningioma), 0.2);
        assert_eq!(probability(&prediction, TumorClass::NoTumor), 0.3);
        assert_eq!(probability(&prediction, TumorClass::Pituitary), 0.4);
        assert_eq!(prediction.top_class(), TumorClass::Pituitary);
    }

    #[test]
    fn test_serializes_all_four_labels() {
        let prediction = Prediction::from_scores(&[0.7, 0.1, 0.15, 0.05]).unwrap();
        let value = serde_json::to_value(prediction).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.len(), CLASS_COUNT);
        for label in TumorClass::labels() {
            let probability = object[label].as_f64().unwrap();
            assert!((0.0..=1.0).contains(&probability));
        }
        assert!((object["Glioma"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_serialization_keeps_label_order() {
        let prediction = Prediction::from_scores(&[0.25; CLASS_COUNT]).unwrap();
        let json = serde_json::to_string(&prediction).unwrap();

        let positions: Vec<usize> = TumorClass::labels()
            .iter()
            .map(|label| json.find(&format!("\"{}\"", label)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        let err = Prediction::from_scores(&[0.5, 0.5]).unwrap_err();
        assert!(matches!(
            err,
            ModelError::OutputShape {
                expected: 4,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_out_of_range_scores_are_rejected() {
        assert!(Prediction::from_scores(&[3.2, -1.0, 0.0, 0.0]).is_err());
        assert!(Prediction::from_scores(&[f32::NAN, 0.0, 0.0, 1.0]).is_err());
    }

    #[test]
    fn test_rounding_drift_is_clamped() {
        let prediction = Prediction::from_scores(&[1.00001, -0.00001, 0.0, 0.0]).unwrap();

        assert_eq!(probability(&prediction, TumorClass::Glioma), 1.0);
        assert_eq!(probability(&prediction, TumorClass::Meningioma), 0.0);
    }

    #[test]
    fn test_top_class_prefers_first_on_tie() {
        let prediction = Prediction::from_scores(&[0.0, 0.5, 0.5, 0.0]).unwrap();
        assert_eq!(prediction.top_class(), TumorClass::Meningioma);
    }
}
