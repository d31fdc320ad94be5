//! Match rules: a base predicate plus an optional call-count filter and a
//! bound response plan.
//!
//! Rules are evaluated in registration order, first satisfied rule wins. Two
//! rules sharing a structurally equal base predicate are evaluated against
//! the same counter value for a given call, which is how "the Nth call
//! behaves specially, all others behave normally" is expressed without the
//! rules knowing about each other.

use std::collections::BTreeSet;

use crate::dispatch::plan::ResponsePlan;
use crate::dispatch::predicate::RequestPredicate;
use crate::error::ConfigError;

/// Call-count filter of a rule, derived at registration from the builder's
/// position sets. At most one kind per rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountFilter {
    /// Matches only when the group counter is in the set.
    At(BTreeSet<u64>),
    /// Matches whenever the group counter is not in the set.
    Except(BTreeSet<u64>),
}

impl CountFilter {
    pub fn admits(&self, n: u64) -> bool {
        match self {
            CountFilter::At(positions) => positions.contains(&n),
            CountFilter::Except(positions) => !positions.contains(&n),
        }
    }
}

/// One ordered member of the dispatcher's rule list.
#[derive(Clone)]
pub struct MatchRule {
    pub predicate: RequestPredicate,
    pub plan: ResponsePlan,
    /// `None` until a position builder is called; a configured-but-empty set
    /// is a registration error, distinct from "no filter".
    exact_positions: Option<BTreeSet<u64>>,
    excluded_positions: Option<BTreeSet<u64>>,
}

impl MatchRule {
    /// Start a rule from its base predicate. The default plan is an empty
    /// 200 response until `respond` replaces it.
    pub fn when(predicate: RequestPredicate) -> Self {
        Self {
            predicate,
            plan: ResponsePlan::ok(),
            exact_positions: None,
            excluded_positions: None,
        }
    }

    pub fn respond(mut self, plan: ResponsePlan) -> Self {
        self.plan = plan;
        self
    }

    /// Restrict the rule to the `n`th call satisfying the base predicate.
    pub fn with_match_count(mut self, n: u64) -> Self {
        self.exact_positions.get_or_insert_with(BTreeSet::new).insert(n);
        self
    }

    pub fn with_match_counts(mut self, positions: impl IntoIterator<Item = u64>) -> Self {
        self.exact_positions
            .get_or_insert_with(BTreeSet::new)
            .extend(positions);
        self
    }

    /// Exclude the `n`th call satisfying the base predicate from this rule.
    pub fn with_not_match_count(mut self, n: u64) -> Self {
        self.excluded_positions
            .get_or_insert_with(BTreeSet::new)
            .insert(n);
        self
    }

    pub fn with_not_match_counts(mut self, positions: impl IntoIterator<Item = u64>) -> Self {
        self.excluded_positions
            .get_or_insert_with(BTreeSet::new)
            .extend(positions);
        self
    }

    /// Resolve the builder's position sets into a single filter. Setting both
    /// kinds, an empty position set, or a position of zero (counters are
    /// 1-based) fails fast here.
    pub(crate) fn count_filter(&self) -> Result<Option<CountFilter>, ConfigError> {
        match (&self.exact_positions, &self.excluded_positions) {
            (None, None) => Ok(None),
            (Some(_), Some(_)) => Err(ConfigError::ConflictingCountFilter),
            (Some(positions), None) => {
                Self::validate_positions(positions)?;
                Ok(Some(CountFilter::At(positions.clone())))
            }
            (None, Some(positions)) => {
                Self::validate_positions(positions)?;
                Ok(Some(CountFilter::Except(positions.clone())))
            }
        }
    }

    fn validate_positions(positions: &BTreeSet<u64>) -> Result<(), ConfigError> {
        if positions.is_empty() {
            return Err(ConfigError::EmptyCountFilter);
        }
        if positions.contains(&0) {
            return Err(ConfigError::ZeroMatchPosition);
        }
        Ok(())
    }
}

impl std::fmt::Debug for MatchRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchRule")
            .field("predicate", &self.predicate)
            .field("exact_positions", &self.exact_positions)
            .field("excluded_positions", &self.excluded_positions)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predicate() -> RequestPredicate {
        RequestPredicate::endpoint("POST", "/x")
    }

    #[test]
    fn no_positions_means_no_filter() {
        let rule = MatchRule::when(predicate());
        assert_eq!(rule.count_filter().unwrap(), None);
    }

    #[test]
    fn exact_filter_admits_only_listed_positions() {
        let rule = MatchRule::when(predicate()).with_match_counts([2, 4]);
        let filter = rule.count_filter().unwrap().unwrap();
        assert!(!filter.admits(1));
        assert!(filter.admits(2));
        assert!(!filter.admits(3));
        assert!(filter.admits(4));
    }

    #[test]
    fn exclusion_filter_admits_everything_else() {
        let rule = MatchRule::when(predicate()).with_not_match_counts([1, 3]);
        let filter = rule.count_filter().unwrap().unwrap();
        assert!(!filter.admits(1));
        assert!(filter.admits(2));
        assert!(!filter.admits(3));
        assert!(filter.admits(4));
    }

    #[test]
    fn both_filter_kinds_are_rejected() {
        let rule = MatchRule::when(predicate())
            .with_match_count(2)
            .with_not_match_count(3);
        assert!(matches!(
            rule.count_filter(),
            Err(ConfigError::ConflictingCountFilter)
        ));
    }

    #[test]
    fn position_zero_is_rejected() {
        let rule = MatchRule::when(predicate()).with_match_count(0);
        assert!(matches!(
            rule.count_filter(),
            Err(ConfigError::ZeroMatchPosition)
        ));
    }

    #[test]
    fn empty_position_set_is_rejected() {
        let rule = MatchRule::when(predicate()).with_match_counts(Vec::new());
        assert!(matches!(
            rule.count_filter(),
            Err(ConfigError::EmptyCountFilter)
        ));

        let rule = MatchRule::when(predicate()).with_not_match_counts(Vec::new());
        assert!(matches!(
            rule.count_filter(),
            Err(ConfigError::EmptyCountFilter)
        ));
    }
}
