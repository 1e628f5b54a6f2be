//! Post-binding completeness and unknown-key checks.

use tracing::debug;

use crate::error::{AggregateValidationError, Defect};
use crate::instance::MappingInstance;
use crate::query;

/// Unknown-property suggestions must be at most this many edits away.
const SUGGESTION_DISTANCE: usize = 3;

/// Per-root validation switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
	validate_unknown: bool,
}

impl Default for ValidationPolicy {
	fn default() -> Self {
		Self {
			validate_unknown: true,
		}
	}
}

impl ValidationPolicy {
	pub fn new(validate_unknown: bool) -> Self {
		Self { validate_unknown }
	}

	pub fn validate_unknown(&self) -> bool {
		self.validate_unknown
	}

	/// Forces conversion of every realized leaf and collects every defect.
	///
	/// `unmatched` holds the input keys routed to this instance's root that
	/// no schema node consumed; they are reported only when unknown-key
	/// validation is on.
	///
	/// # Errors
	///
	/// Returns every missing leaf, rejected map key, conversion failure and
	/// unknown key together.
	pub fn validate(
		&self,
		bound: &MappingInstance,
		unmatched: &[String],
	) -> Result<(), AggregateValidationError> {
		let data = bound.data();
		let mut defects = data.defects.clone();

		for slot in &data.slots {
			if let Some(Err(err)) = slot.value() {
				defects.push(Defect::Conversion(err.clone()));
			}
		}

		if self.validate_unknown && !unmatched.is_empty() {
			let mut known: Vec<String> = query::leaf_paths(&data.tree, bound.prefix());
			known.extend(data.slots.iter().map(|s| s.path.to_string()));
			for name in unmatched {
				defects.push(Defect::UnknownProperty {
					name: name.clone(),
					suggestion: suggest(name, &known),
				});
			}
		}

		let result = AggregateValidationError::new(defects).into_result();
		if let Err(err) = &result {
			debug!(
				type_name = %bound.type_name(),
				prefix = bound.prefix(),
				defects = err.len(),
				"validation failed"
			);
		}
		result
	}
}

/// Closest known name within [`SUGGESTION_DISTANCE`] edits.
pub(crate) fn suggest(name: &str, known: &[String]) -> Option<String> {
	known
		.iter()
		.map(|candidate| (strsim::levenshtein(name, candidate), candidate))
		.filter(|(distance, _)| *distance <= SUGGESTION_DISTANCE)
		.min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)))
		.map(|(_, candidate)| candidate.clone())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_suggest_picks_closest() {
		let known = vec![
			"app.server.port".to_string(),
			"app.server.host".to_string(),
		];
		assert_eq!(suggest("app.servr.port", &known).as_deref(), Some("app.server.port"));
		assert_eq!(suggest("app.database", &known), None);
	}
}
