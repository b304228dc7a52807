//! Formatting a Burgers vector as a fractional string, e.g. `[1/2 1/2 0]`.
//!
//! Ported from the reference engine's `Burgers.hpp` `toFraction`/`burgersToFractionalString`:
//! try a fixed set of denominators in order, accept the first whose rounded numerator
//! reproduces the component within tolerance, reduce by GCD, and fall back to a plain
//! 3-decimal string per component when none match.

const CANDIDATE_DENOMINATORS: [i64; 6] = [1, 2, 3, 4, 6, 12];
const FRACTION_TOLERANCE: f64 = 1e-3;

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    if a == 0 { 1 } else { a }
}

/// Express `value` as a reduced fraction string (e.g. `"1/2"`, `"-1/3"`, `"0"`), or `None` if
/// no candidate denominator reproduces it within tolerance.
fn to_fraction(value: f64) -> Option<String> {
    if value.abs() < FRACTION_TOLERANCE {
        return Some("0".to_string());
    }
    for &den in &CANDIDATE_DENOMINATORS {
        let numerator = (value * den as f64).round() as i64;
        if (numerator as f64 / den as f64 - value).abs() <= FRACTION_TOLERANCE {
            let g = gcd(numerator, den);
            let (n, d) = (numerator / g, den / g);
            return Some(if d == 1 { n.to_string() } else { format!("{n}/{d}") });
        }
    }
    None
}

/// Format one component, falling back to a 3-decimal string when no fraction matches.
fn format_component(value: f64) -> String {
    to_fraction(value).unwrap_or_else(|| format!("{value:.3}"))
}

/// Format a Burgers vector as `[xFrac yFrac zFrac]`.
pub fn burgers_to_fractional_string(vector: nalgebra::Vector3<f64>) -> String {
    format!("[{} {} {}]", format_component(vector.x), format_component(vector.y), format_component(vector.z))
}
