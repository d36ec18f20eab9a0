//! Approach-angle folding.

/// Fold an angle in degrees into `(-180, 180]`.
///
/// The result is computed through `atan2(sin θ, cos θ)`, so it points in the
/// same direction as the input for any finite `θ`.
pub fn fold_degrees(theta: f64) -> f64 {
    let rad = theta.to_radians();
    let folded = rad.sin().atan2(rad.cos()).to_degrees();
    // atan2 may land a hair above -180 for an input of exactly -180.
    if folded <= -180.0 + 1e-9 { folded + 360.0 } else { folded }
}

/// `true` when `a` lies strictly within `tol` degrees of `b`.
pub fn within(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() < tol
}
