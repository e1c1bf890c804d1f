use crate::{
    classes::ClassDictionary,
    error::{Error, Result},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedPrediction<'a> {
    pub label: &'a str,
    pub probability: f32,
}

/// Ranks one softmax row and keeps the `top` most probable labels.
///
/// The sort is stable, so classes with equal probability keep ascending
/// class-index order. `top` larger than the class count returns every class.
pub fn decode_predictions<'a>(
    probabilities: &[f32],
    classes: &'a ClassDictionary,
    top: usize,
) -> Result<Vec<RankedPrediction<'a>>> {
    if probabilities.len() != classes.len() {
        return Err(Error::LengthMismatch {
            expected: classes.len(),
            actual: probabilities.len(),
        });
    }

    if let Some(index) = probabilities.iter().position(|p| !p.is_finite()) {
        return Err(Error::NonFiniteProbability { index });
    }

    let mut ranked: Vec<_> = classes
        .labels()
        .iter()
        .zip(probabilities)
        .map(|(label, &probability)| RankedPrediction {
            label: label.as_str(),
            probability,
        })
        .collect();

    ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    ranked.truncate(top);

    Ok(ranked)
}

/// Decodes a row-major `[rows, classes]` block, one ranking per row.
pub fn decode_batch<'a>(
    probabilities: &[f32],
    classes: &'a ClassDictionary,
    top: usize,
) -> Result<Vec<Vec<RankedPrediction<'a>>>> {
    let rows = probabilities.chunks_exact(classes.len());
    let remainder = rows.remainder();

    if !remainder.is_empty() {
        return Err(Error::LengthMismatch {
            expected: classes.len(),
            actual: remainder.len(),
        });
    }

    rows.map(|row| decode_predictions(row, classes, top)).collect()
}
