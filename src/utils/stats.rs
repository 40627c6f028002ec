//! Ranking helpers shared by time features and evaluation

use std::cmp::Ordering;

/// Average-method ranks (1-based) of the given values
///
/// Tied values share the mean of the positions they occupy, so `[5, 5, 9]`
/// ranks as `[1.5, 1.5, 3.0]`. Incomparable values (NaN) rank as equal to
/// each other and above everything else.
#[must_use]
pub fn average_ranks<T: PartialOrd>(values: &[T]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| compare(&values[a], &values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len()
            && compare(&values[order[start]], &values[order[end]]) == Ordering::Equal
        {
            end += 1;
        }
        // Positions start..end are 1-based start+1..=end
        let rank = (start + 1 + end) as f64 / 2.0;
        for &index in &order[start..end] {
            ranks[index] = rank;
        }
        start = end;
    }
    ranks
}

#[allow(clippy::eq_op)]
fn compare<T: PartialOrd>(a: &T, b: &T) -> Ordering {
    // Only NaN-like values are unequal to themselves
    a.partial_cmp(b).unwrap_or_else(|| match (a == a, b == b) {
        (false, false) => Ordering::Equal,
        (false, true) => Ordering::Greater,
        _ => Ordering::Less,
    })
}

/// Pearson correlation of two equally long slices
///
/// Returns `None` when fewer than two values are given or either side is
/// constant.
#[must_use]
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// Spearman rank correlation: Pearson correlation of average ranks
#[must_use]
pub fn spearman(x: &[f64], y: &[f64]) -> Option<f64> {
    pearson(&average_ranks(x), &average_ranks(y))
}
