//! Internal-extension classification from configured number ranges.

use std::collections::HashSet;

use thiserror::Error;

/// A malformed extension pattern in configuration.
#[derive(Debug, Error)]
pub enum ExtensionPlanError {
    #[error("malformed extension range '{0}': expected N or LOW-HIGH")]
    Malformed(String),

    #[error("inverted extension range '{0}': LOW must not exceed HIGH")]
    Inverted(String),
}

/// The set of numbers considered internal extensions.
///
/// Built from patterns that are either an exact number (`"5200"`) or a
/// hyphenated inclusive range (`"5000-5099"`). An empty plan puts the
/// pipeline into discovery mode: nothing classifies as an extension and the
/// builder collects candidate extensions from party-id markers instead.
#[derive(Debug, Clone, Default)]
pub struct ExtensionPlan {
    singles: HashSet<String>,
    ranges: Vec<(u64, u64)>,
}

impl ExtensionPlan {
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ExtensionPlanError> {
        let mut plan = ExtensionPlan::default();
        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            match pattern.split_once('-') {
                Some((low, high)) => {
                    let low: u64 = low
                        .trim()
                        .parse()
                        .map_err(|_| ExtensionPlanError::Malformed(pattern.to_string()))?;
                    let high: u64 = high
                        .trim()
                        .parse()
                        .map_err(|_| ExtensionPlanError::Malformed(pattern.to_string()))?;
                    if low > high {
                        return Err(ExtensionPlanError::Inverted(pattern.to_string()));
                    }
                    plan.ranges.push((low, high));
                }
                None => {
                    plan.singles.insert(pattern.to_string());
                }
            }
        }
        Ok(plan)
    }

    /// No patterns configured; downstream runs in discovery mode.
    pub fn is_empty(&self) -> bool {
        self.singles.is_empty() && self.ranges.is_empty()
    }

    /// Whether `number` is an internal extension.
    ///
    /// Besides the literal and range match, two retries cover trunk-prefix
    /// variants: a 10+ digit number gains a leading `1`, and a number already
    /// carrying a leading `1` is retried with it stripped so that
    /// five-digit dialing recorded with the trunk prefix still classifies.
    pub fn is_extension(&self, number: &str) -> bool {
        let number = number.trim();
        if number.is_empty() {
            return false;
        }
        if self.matches(number) {
            return true;
        }
        if !number.starts_with('1') && number.len() >= 10 {
            return self.matches(&format!("1{number}"));
        }
        if let Some(stripped) = number.strip_prefix('1') {
            if !stripped.is_empty() {
                return self.matches(stripped);
            }
        }
        false
    }

    fn matches(&self, number: &str) -> bool {
        if self.singles.contains(number) {
            return true;
        }
        match number.parse::<u64>() {
            Ok(n) => self.ranges.iter().any(|(low, high)| n >= *low && n <= *high),
            Err(_) => false,
        }
    }
}
