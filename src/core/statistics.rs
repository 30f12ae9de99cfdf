pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Coefficient of variation in percent. Zero when the mean is zero.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let sd = std_dev(values)?;
    if m == 0.0 {
        return Some(0.0);
    }
    Some(sd / m.abs() * 100.0)
}

/// Least-squares line through `(x, y)` points as `(slope, intercept)`.
pub fn linear_fit(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let mut num = 0.0;
    let mut den = 0.0;
    for (x, y) in points {
        num += (x - mean_x) * (y - mean_y);
        den += (x - mean_x).powi(2);
    }
    if den == 0.0 {
        return Some((0.0, mean_y));
    }
    let slope = num / den;
    Some((slope, mean_y - slope * mean_x))
}

/// Count sign changes between consecutive differences. Flat steps are ignored.
pub fn direction_reversals(values: &[f64]) -> usize {
    let mut last_sign = 0i8;
    let mut reversals = 0;
    for pair in values.windows(2) {
        let delta = pair[1] - pair[0];
        let sign = if delta > 0.0 {
            1
        } else if delta < 0.0 {
            -1
        } else {
            0
        };
        if sign == 0 {
            continue;
        }
        if last_sign != 0 && sign != last_sign {
            reversals += 1;
        }
        last_sign = sign;
    }
    reversals
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
