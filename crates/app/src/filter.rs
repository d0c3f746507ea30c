//! Per-adapter device filters applied before inbound mapping.

use serde::Deserialize;

/// Explicit include/exclude lists over native ids.
///
/// Exclude wins when both lists match. An empty include list means
/// "no include restriction".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl DeviceFilter {
    /// Whether a native id passes the filter.
    #[must_use]
    pub fn allows(&self, native_id: &str) -> bool {
        if self.exclude.iter().any(|id| id == native_id) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|id| id == native_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(include: &[&str], exclude: &[&str]) -> DeviceFilter {
        DeviceFilter {
            include: include.iter().map(ToString::to_string).collect(),
            exclude: exclude.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn should_allow_everything_when_both_lists_empty() {
        assert!(filter(&[], &[]).allows("anything"));
    }

    #[test]
    fn should_restrict_to_include_list_when_present() {
        let f = filter(&["a", "b"], &[]);
        assert!(f.allows("a"));
        assert!(!f.allows("c"));
    }

    #[test]
    fn should_reject_excluded_ids() {
        let f = filter(&[], &["bad"]);
        assert!(!f.allows("bad"));
        assert!(f.allows("good"));
    }

    #[test]
    fn should_let_exclude_win_when_both_lists_match() {
        let f = filter(&["dual"], &["dual"]);
        assert!(!f.allows("dual"));
    }
}
