//! Rolling statistics used by the detectors
//!
//! All functions return one slot per input value; slots before the warm-up
//! period is filled are `None`.

/// Calculate Simple Moving Average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        if i + 1 < period {
            result.push(None);
        } else {
            let sum: f64 = values[i + 1 - period..=i].iter().sum();
            result.push(Some(sum / period as f64));
        }
    }

    result
}

/// Calculate rolling population standard deviation
pub fn rolling_std(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let means = sma(values, period);
    let mut result = Vec::with_capacity(values.len());

    for i in 0..values.len() {
        if let Some(mean) = means[i] {
            let window = &values[i + 1 - period..=i];
            let variance: f64 = window
                .iter()
                .map(|&x| {
                    let diff = x - mean;
                    diff * diff
                })
                .sum::<f64>()
                / period as f64;
            result.push(Some(variance.sqrt()));
        } else {
            result.push(None);
        }
    }

    result
}
