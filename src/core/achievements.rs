//! Badge evaluation.

use crate::core::predicate::Badge;
use crate::core::progress::StudentProgress;

/// Awards badges whose predicates hold for a progress snapshot.
///
/// Badges already held are never re-awarded and never revoked.
#[derive(Debug, Clone, Copy)]
pub struct AchievementDispatcher<'a> {
    badges: &'a [Badge],
}

impl<'a> AchievementDispatcher<'a> {
    /// Create a dispatcher over a set of badge definitions.
    pub fn new(badges: &'a [Badge]) -> Self {
        Self { badges }
    }

    /// Badges that would be newly awarded, in definition order.
    pub fn pending(&self, progress: &StudentProgress) -> Vec<&'a str> {
        self.badges
            .iter()
            .filter(|badge| !progress.badges.contains(&badge.id))
            .filter(|badge| badge.predicate.evaluate(progress))
            .map(|badge| badge.id.as_str())
            .collect()
    }

    /// Award every pending badge and return the new ids.
    pub fn evaluate(&self, progress: &mut StudentProgress) -> Vec<String> {
        let awarded: Vec<String> = self
            .pending(progress)
            .into_iter()
            .map(str::to_string)
            .collect();
        progress.badges.extend(awarded.iter().cloned());
        awarded
    }
}
