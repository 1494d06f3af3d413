/// Cosine similarity over the common prefix of `a` and `b`.
///
/// Empty or zero-norm inputs score `-1.0`. The result is clamped to `[-1.0, 1.0]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
	let len = a.len().min(b.len());

	if len == 0 {
		return -1.0;
	}

	let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);

	for (x, y) in a[..len].iter().zip(&b[..len]) {
		let (x, y) = (f64::from(*x), f64::from(*y));

		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a == 0.0 || norm_b == 0.0 || !norm_a.is_finite() || !norm_b.is_finite() {
		return -1.0;
	}

	let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());

	if similarity.is_nan() {
		return -1.0;
	}

	similarity.clamp(-1.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identical_vectors_score_one() {
		let score = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);

		assert!((score - 1.0).abs() < 1e-6);
	}

	#[test]
	fn opposite_vectors_score_minus_one() {
		let score = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);

		assert!((score + 1.0).abs() < 1e-6);
	}

	#[test]
	fn zero_and_empty_vectors_score_minus_one() {
		assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), -1.0);
		assert_eq!(cosine_similarity(&[], &[1.0]), -1.0);
	}

	#[test]
	fn mismatched_lengths_use_common_prefix() {
		let score = cosine_similarity(&[1.0, 0.0, 5.0], &[1.0, 0.0]);

		assert!((score - 1.0).abs() < 1e-6);
	}

	#[test]
	fn scores_stay_in_bounds() {
		let vectors: [&[f32]; 4] =
			[&[0.3, -7.0, 2.5], &[1e-20, 1e-20, 1e-20], &[-4.0, 9.0, 0.1], &[3e30, -3e30, 1.0]];

		for a in vectors {
			for b in vectors {
				let score = cosine_similarity(a, b);

				assert!((-1.0..=1.0).contains(&score), "Out of bounds: {score}");
			}
		}
	}
}
